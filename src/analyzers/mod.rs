// =============================================================================
// Analyzer Suite — ten independent scoring functions with a joined deadline
// =============================================================================
//
// Every analyzer takes the same context and produces a score in [0, 10] plus
// a typed detail record. All ten run concurrently on signal evaluation and
// are joined with a per-analyzer deadline; a late or failed analyzer yields
// the neutral sentinel `(5.0, Neutral)` and the pipeline proceeds. Errors
// never cross the analyzer boundary.

pub mod btc_correlation;
pub mod candle_structure;
pub mod cross_pair;
pub mod funding;
pub mod liquidation;
pub mod multi_timeframe;
pub mod open_interest;
pub mod orderbook;
pub mod precision;
pub mod volume_profile;

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use serde::Serialize;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::detector::PumpEvent;
use crate::exchange::{MarketFeed, OrderbookDepth};
use crate::market_data::Candle;
use crate::runtime_config::AnalyzerParams;

pub use candle_structure::CandleDetail;
pub use liquidation::{LiquidationMap, LiquidationZone};

/// The neutral score every analyzer falls back to on missing data, error, or
/// deadline overrun.
pub const NEUTRAL_SCORE: f64 = 5.0;

/// The fixed analyzer roster, in reporting order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum AnalyzerKind {
    Orderbook,
    OpenInterest,
    Funding,
    Liquidation,
    BtcCorrelation,
    MultiTimeframe,
    VolumeProfile,
    CrossPair,
    Precision,
    CandleStructure,
}

impl AnalyzerKind {
    pub const ALL: [AnalyzerKind; 10] = [
        Self::Orderbook,
        Self::OpenInterest,
        Self::Funding,
        Self::Liquidation,
        Self::BtcCorrelation,
        Self::MultiTimeframe,
        Self::VolumeProfile,
        Self::CrossPair,
        Self::Precision,
        Self::CandleStructure,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::Orderbook => "orderbook",
            Self::OpenInterest => "open_interest",
            Self::Funding => "funding",
            Self::Liquidation => "liquidation",
            Self::BtcCorrelation => "btc_correlation",
            Self::MultiTimeframe => "multi_timeframe",
            Self::VolumeProfile => "volume_profile",
            Self::CrossPair => "cross_pair",
            Self::Precision => "precision",
            Self::CandleStructure => "candle_structure",
        }
    }
}

impl std::fmt::Display for AnalyzerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Typed per-analyzer detail. Consumers match on the variant; `Neutral`
/// stands in for any analyzer that could not produce a real result.
#[derive(Debug, Clone, Serialize)]
pub enum AnalyzerDetail {
    Neutral,
    Orderbook(orderbook::OrderbookPressure),
    OpenInterest(open_interest::OiDelta),
    Funding(funding::FundingDetail),
    Liquidation(LiquidationMap),
    BtcCorrelation(btc_correlation::BtcDetail),
    MultiTimeframe(multi_timeframe::MtfDetail),
    VolumeProfile(volume_profile::VolumeProfileDetail),
    CrossPair(cross_pair::CrossPairDetail),
    Precision(precision::PrecisionDetail),
    Candle(CandleDetail),
}

/// One analyzer's verdict for one signal attempt.
#[derive(Debug, Clone, Serialize)]
pub struct AnalyzerOutcome {
    pub kind: AnalyzerKind,
    /// Score in [0, 10]; higher favors the short.
    pub score: f64,
    pub detail: AnalyzerDetail,
}

impl AnalyzerOutcome {
    pub fn new(kind: AnalyzerKind, score: f64, detail: AnalyzerDetail) -> Self {
        Self {
            kind,
            score: score.clamp(0.0, 10.0),
            detail,
        }
    }

    /// The sentinel returned on any failure path.
    pub fn neutral(kind: AnalyzerKind) -> Self {
        Self {
            kind,
            score: NEUTRAL_SCORE,
            detail: AnalyzerDetail::Neutral,
        }
    }
}

/// Flat per-analyzer score vector in roster order; persisted with every
/// signal and fed to the classifier.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct AnalyzerScores {
    pub orderbook: f64,
    pub open_interest: f64,
    pub funding: f64,
    pub liquidation: f64,
    pub btc_correlation: f64,
    pub multi_timeframe: f64,
    pub volume_profile: f64,
    pub cross_pair: f64,
    pub precision: f64,
    pub candle_structure: f64,
}

impl AnalyzerScores {
    pub fn from_outcomes(outcomes: &[AnalyzerOutcome]) -> Self {
        let mut scores = Self::neutral();
        for o in outcomes {
            *scores.slot_mut(o.kind) = o.score;
        }
        scores
    }

    pub fn neutral() -> Self {
        let mut s = Self::default();
        for kind in AnalyzerKind::ALL {
            *s.slot_mut(kind) = NEUTRAL_SCORE;
        }
        s
    }

    fn slot_mut(&mut self, kind: AnalyzerKind) -> &mut f64 {
        match kind {
            AnalyzerKind::Orderbook => &mut self.orderbook,
            AnalyzerKind::OpenInterest => &mut self.open_interest,
            AnalyzerKind::Funding => &mut self.funding,
            AnalyzerKind::Liquidation => &mut self.liquidation,
            AnalyzerKind::BtcCorrelation => &mut self.btc_correlation,
            AnalyzerKind::MultiTimeframe => &mut self.multi_timeframe,
            AnalyzerKind::VolumeProfile => &mut self.volume_profile,
            AnalyzerKind::CrossPair => &mut self.cross_pair,
            AnalyzerKind::Precision => &mut self.precision,
            AnalyzerKind::CandleStructure => &mut self.candle_structure,
        }
    }

    /// Scores in roster order.
    pub fn as_array(&self) -> [f64; 10] {
        [
            self.orderbook,
            self.open_interest,
            self.funding,
            self.liquidation,
            self.btc_correlation,
            self.multi_timeframe,
            self.volume_profile,
            self.cross_pair,
            self.precision,
            self.candle_structure,
        ]
    }

    /// Unweighted mean of the ten scores.
    pub fn mean(&self) -> f64 {
        self.as_array().iter().sum::<f64>() / 10.0
    }
}

/// Bounded per-symbol open-interest history shared with the poller-free OI
/// analyzer (a single ticker read cannot produce a delta).
pub type OiHistory = Arc<RwLock<HashMap<String, VecDeque<(i64, f64)>>>>;

/// Everything an analyzer may need for one signal attempt. Built once per
/// evaluation and shared behind `Arc`.
pub struct AnalyzerContext {
    pub symbol: String,
    pub pump: PumpEvent,
    pub entry_price: f64,
    /// 1-minute candles, oldest first (synthetic when the exchange has none).
    pub klines: Vec<Candle>,
    pub orderbook: Option<OrderbookDepth>,
    pub feed: Arc<dyn MarketFeed>,
    pub oi_history: OiHistory,
    pub params: AnalyzerParams,
}

/// Run all ten analyzers concurrently and join them with the configured
/// per-analyzer deadline. The returned vector is in roster order; any
/// analyzer that timed out, panicked, or failed reports as neutral.
pub async fn run_suite(ctx: Arc<AnalyzerContext>) -> Vec<AnalyzerOutcome> {
    let deadline = Duration::from_secs(ctx.params.timeout_secs);
    let mut join_set: JoinSet<AnalyzerOutcome> = JoinSet::new();

    for kind in AnalyzerKind::ALL {
        let ctx = ctx.clone();
        join_set.spawn(async move {
            match tokio::time::timeout(deadline, dispatch(kind, &ctx)).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    debug!(symbol = %ctx.symbol, analyzer = %kind, "analyzer deadline hit — neutral");
                    AnalyzerOutcome::neutral(kind)
                }
            }
        });
    }

    let mut by_kind: HashMap<AnalyzerKind, AnalyzerOutcome> = HashMap::new();
    while let Some(joined) = join_set.join_next().await {
        match joined {
            Ok(outcome) => {
                by_kind.insert(outcome.kind, outcome);
            }
            Err(e) => {
                warn!(symbol = %ctx.symbol, error = %e, "analyzer task failed — neutral");
            }
        }
    }

    AnalyzerKind::ALL
        .iter()
        .map(|kind| {
            by_kind
                .remove(kind)
                .unwrap_or_else(|| AnalyzerOutcome::neutral(*kind))
        })
        .collect()
}

async fn dispatch(kind: AnalyzerKind, ctx: &AnalyzerContext) -> AnalyzerOutcome {
    match kind {
        AnalyzerKind::Orderbook => orderbook::analyze(ctx),
        AnalyzerKind::OpenInterest => open_interest::analyze(ctx).await,
        AnalyzerKind::Funding => funding::analyze(ctx).await,
        AnalyzerKind::Liquidation => liquidation::analyze(ctx),
        AnalyzerKind::BtcCorrelation => btc_correlation::analyze(ctx).await,
        AnalyzerKind::MultiTimeframe => multi_timeframe::analyze(ctx).await,
        AnalyzerKind::VolumeProfile => volume_profile::analyze(ctx).await,
        AnalyzerKind::CrossPair => cross_pair::analyze(ctx).await,
        AnalyzerKind::Precision => precision::analyze(ctx),
        AnalyzerKind::CandleStructure => candle_structure::analyze(ctx),
    }
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scores_from_outcomes_fills_missing_with_neutral() {
        let outcomes = vec![AnalyzerOutcome::new(
            AnalyzerKind::Funding,
            9.0,
            AnalyzerDetail::Neutral,
        )];
        let scores = AnalyzerScores::from_outcomes(&outcomes);
        assert!((scores.funding - 9.0).abs() < 1e-9);
        assert!((scores.orderbook - NEUTRAL_SCORE).abs() < 1e-9);
        assert!((scores.candle_structure - NEUTRAL_SCORE).abs() < 1e-9);
    }

    #[test]
    fn mean_of_neutral_is_neutral() {
        let scores = AnalyzerScores::neutral();
        assert!((scores.mean() - NEUTRAL_SCORE).abs() < 1e-9);
    }

    #[test]
    fn outcome_scores_are_clamped() {
        let hi = AnalyzerOutcome::new(AnalyzerKind::Funding, 14.0, AnalyzerDetail::Neutral);
        let lo = AnalyzerOutcome::new(AnalyzerKind::Funding, -3.0, AnalyzerDetail::Neutral);
        assert!((hi.score - 10.0).abs() < 1e-9);
        assert!(lo.score.abs() < 1e-9);
    }

    #[test]
    fn roster_order_is_stable() {
        assert_eq!(AnalyzerKind::ALL.len(), 10);
        assert_eq!(AnalyzerKind::ALL[0], AnalyzerKind::Orderbook);
        assert_eq!(AnalyzerKind::ALL[9], AnalyzerKind::CandleStructure);
    }
}
