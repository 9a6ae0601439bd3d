// =============================================================================
// Open Interest Delta Analyzer
// =============================================================================
//
// Fetches the current open interest, records it into the shared per-symbol
// history, and scores the change over the look-back window (default 5 min).
//
// During a pump BOTH directions of movement are informative:
//
//   rising OI  => shorts are being squeezed/liquidated into the move — the
//                 peak is near => high score
//   falling OI => longs are unwinding into strength => also high score
//   flat OI    => no positioning change, the move may still be building
//                 => low score

use serde::Serialize;

use crate::analyzers::{AnalyzerContext, AnalyzerDetail, AnalyzerKind, AnalyzerOutcome};

/// Retained OI observations per symbol.
const MAX_OI_HISTORY: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum OiTrend {
    Rising,
    Falling,
    Flat,
}

/// Open-interest delta over the look-back window.
#[derive(Debug, Clone, Serialize)]
pub struct OiDelta {
    pub current_contracts: f64,
    pub change_pct: f64,
    pub trend: OiTrend,
    pub lookback_min: f64,
}

pub async fn analyze(ctx: &AnalyzerContext) -> AnalyzerOutcome {
    let Ok(oi) = ctx.feed.open_interest(&ctx.symbol).await else {
        return AnalyzerOutcome::neutral(AnalyzerKind::OpenInterest);
    };
    if oi.contracts <= 0.0 {
        return AnalyzerOutcome::neutral(AnalyzerKind::OpenInterest);
    }

    let now_ms = chrono::Utc::now().timestamp_millis();
    let lookback_ms = (ctx.params.oi_lookback_min * 60_000.0) as i64;

    // Record the observation and compute the delta inside one lock scope.
    let change_pct = {
        let mut history = ctx.oi_history.write();
        let ring = history.entry(ctx.symbol.clone()).or_default();
        ring.push_back((now_ms, oi.contracts));
        while ring.len() > MAX_OI_HISTORY {
            ring.pop_front();
        }

        let cutoff = now_ms - lookback_ms;
        let baseline = ring.iter().find(|(ts, _)| *ts >= cutoff).copied();
        match baseline {
            Some((ts, start_oi)) if ts < now_ms && start_oi > 0.0 => {
                Some((oi.contracts - start_oi) / start_oi * 100.0)
            }
            _ => None,
        }
    };

    // A single observation carries no delta information.
    let Some(change_pct) = change_pct else {
        return AnalyzerOutcome::neutral(AnalyzerKind::OpenInterest);
    };

    let (score, trend) = score_change(change_pct);

    AnalyzerOutcome::new(
        AnalyzerKind::OpenInterest,
        score,
        AnalyzerDetail::OpenInterest(OiDelta {
            current_contracts: oi.contracts,
            change_pct,
            trend,
            lookback_min: ctx.params.oi_lookback_min,
        }),
    )
}

fn score_change(change_pct: f64) -> (f64, OiTrend) {
    if change_pct >= 2.0 {
        let trend = OiTrend::Rising;
        // Short liquidations feeding the pump — the sharper the better.
        if change_pct >= 10.0 {
            (9.5, trend)
        } else if change_pct >= 5.0 {
            (8.5, trend)
        } else {
            (7.0, trend)
        }
    } else if change_pct <= -2.0 {
        let trend = OiTrend::Falling;
        // Longs unwinding into strength.
        if change_pct <= -10.0 {
            (9.0, trend)
        } else if change_pct <= -5.0 {
            (8.0, trend)
        } else {
            (6.5, trend)
        }
    } else {
        (3.5, OiTrend::Flat)
    }
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strong_rise_scores_high() {
        let (score, trend) = score_change(12.0);
        assert_eq!(trend, OiTrend::Rising);
        assert!(score >= 9.0);
    }

    #[test]
    fn strong_fall_scores_high() {
        let (score, trend) = score_change(-12.0);
        assert_eq!(trend, OiTrend::Falling);
        assert!(score >= 8.5);
    }

    #[test]
    fn flat_scores_low() {
        let (score, trend) = score_change(0.5);
        assert_eq!(trend, OiTrend::Flat);
        assert!(score < 5.0);
    }

    #[test]
    fn moderate_moves_score_between() {
        let (rising, _) = score_change(3.0);
        let (falling, _) = score_change(-3.0);
        assert!(rising > 6.0 && rising < 8.0);
        assert!(falling > 6.0 && falling < 8.0);
    }
}
