// =============================================================================
// Multi-Timeframe Trend Analyzer
// =============================================================================
//
// A pump against a higher-timeframe downtrend is the best short setup; a
// pump riding a broad uptrend is the worst. Four intervals are labelled
// UP / DOWN / SIDEWAYS / UNKNOWN via an 8/21 EMA crossover plus 10-bar
// momentum, then aggregated into a weighted confluence:
//
//   interval:  5m     15m    1h     4h
//   weight:    0.15   0.25   0.35   0.25
//
// Per-interval score: DOWN => 5 + strength/2, UP => 5 - strength/2,
// SIDEWAYS => 5. Confluence label from the down/up interval counts.

use futures_util::future::join_all;
use serde::Serialize;

use crate::analyzers::{AnalyzerContext, AnalyzerDetail, AnalyzerKind, AnalyzerOutcome};
use crate::indicators::{ema, roc};
use crate::market_data::KlineInterval;
use crate::types::{Confluence, TrendLabel};

/// (interval, weight) pairs evaluated per symbol.
const TIMEFRAMES: [(KlineInterval, f64); 4] = [
    (KlineInterval::Min5, 0.15),
    (KlineInterval::Min15, 0.25),
    (KlineInterval::Min60, 0.35),
    (KlineInterval::Hour4, 0.25),
];

/// Candles fetched per interval.
const CANDLES_PER_TF: usize = 20;

/// EMA crossover band: the fast EMA must clear the slow one by this fraction.
const EMA_BAND: f64 = 0.005;

/// Trend assessment for one interval.
#[derive(Debug, Clone, Serialize)]
pub struct TimeframeTrend {
    pub interval: String,
    pub label: TrendLabel,
    /// Conviction in [0, 10].
    pub strength: f64,
    /// 10-bar momentum, percent.
    pub momentum_pct: f64,
}

/// Aggregated multi-timeframe detail.
#[derive(Debug, Clone, Serialize)]
pub struct MtfDetail {
    pub confluence: Confluence,
    pub timeframes: Vec<TimeframeTrend>,
    pub down_count: usize,
    pub up_count: usize,
}

pub async fn analyze(ctx: &AnalyzerContext) -> AnalyzerOutcome {
    // All four interval fetches go out concurrently.
    let fetches = TIMEFRAMES.map(|(interval, _)| {
        let feed = ctx.feed.clone();
        let symbol = ctx.symbol.clone();
        async move { feed.klines(&symbol, interval, CANDLES_PER_TF).await }
    });
    let results = join_all(fetches).await;

    let mut timeframes = Vec::with_capacity(TIMEFRAMES.len());
    let mut weighted_score = 0.0;
    let mut total_weight = 0.0;
    let mut down_count = 0;
    let mut up_count = 0;

    for ((interval, weight), result) in TIMEFRAMES.into_iter().zip(results) {
        let candles = match result {
            Ok(c) if c.len() >= 10 => c,
            _ => {
                timeframes.push(TimeframeTrend {
                    interval: interval.to_string(),
                    label: TrendLabel::Unknown,
                    strength: 0.0,
                    momentum_pct: 0.0,
                });
                continue;
            }
        };

        let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
        let trend = assess_trend(&closes, interval);

        let tf_score = match trend.label {
            TrendLabel::Down => {
                down_count += 1;
                5.0 + trend.strength * 0.5
            }
            TrendLabel::Up => {
                up_count += 1;
                5.0 - trend.strength * 0.5
            }
            _ => 5.0,
        };

        weighted_score += tf_score * weight;
        total_weight += weight;
        timeframes.push(trend);
    }

    if total_weight <= 0.0 {
        return AnalyzerOutcome::neutral(AnalyzerKind::MultiTimeframe);
    }

    let score = weighted_score / total_weight;
    let confluence = classify_confluence(down_count, up_count);

    AnalyzerOutcome::new(
        AnalyzerKind::MultiTimeframe,
        score,
        AnalyzerDetail::MultiTimeframe(MtfDetail {
            confluence,
            timeframes,
            down_count,
            up_count,
        }),
    )
}

/// Label the trend of one interval from its closes.
fn assess_trend(closes: &[f64], interval: KlineInterval) -> TimeframeTrend {
    let momentum_pct = roc::current_roc(closes, 10).unwrap_or(0.0);

    let label = match ema::ema_crossover(closes, 8, 21, EMA_BAND) {
        Some(true) => TrendLabel::Up,
        Some(false) => TrendLabel::Down,
        None if closes.len() >= 21 => TrendLabel::Sideways,
        None => TrendLabel::Unknown,
    };

    // Conviction: distance from the slow EMA, boosted by momentum when the
    // trend points down (that momentum is what the short rides).
    let mut strength = match ema::current_ema(closes, 21) {
        Some(slow) if slow > 0.0 => {
            let current = *closes.last().unwrap_or(&slow);
            ((current - slow).abs() / slow * 100.0 * 2.0).min(10.0)
        }
        _ => 0.0,
    };
    if label == TrendLabel::Down {
        strength = (strength + momentum_pct.abs() * 0.5).min(10.0);
    }

    TimeframeTrend {
        interval: interval.to_string(),
        label,
        strength,
        momentum_pct,
    }
}

fn classify_confluence(down: usize, up: usize) -> Confluence {
    if down >= 3 {
        Confluence::StrongShort
    } else if down >= 2 {
        Confluence::WeakShort
    } else if up >= 3 {
        Confluence::AvoidShort
    } else {
        Confluence::Neutral
    }
}
