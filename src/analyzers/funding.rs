// =============================================================================
// Funding Rate Analyzer
// =============================================================================
//
// Positive funding means longs pay shorts, which favors the short side.
// The score is a piecewise-linear map over the funding rate percentage:
//
//   rate <= 0      => 0
//   rate = 0.01 %  => 2
//   rate = 0.05 %  => 5
//   rate = 0.10 %  => 7
//   rate >= 0.20 % => 10
//
// with linear interpolation between the anchor points.

use serde::Serialize;

use crate::analyzers::{AnalyzerContext, AnalyzerDetail, AnalyzerKind, AnalyzerOutcome};

/// (rate_pct, score) anchor points for the piecewise-linear mapping.
const ANCHORS: [(f64, f64); 5] = [
    (0.0, 0.0),
    (0.01, 2.0),
    (0.05, 5.0),
    (0.10, 7.0),
    (0.20, 10.0),
];

/// Funding detail for the signal breakdown.
#[derive(Debug, Clone, Serialize)]
pub struct FundingDetail {
    /// Raw rate as a decimal.
    pub rate: f64,
    /// Rate as a percentage.
    pub rate_pct: f64,
    /// Timestamp (ms) of the next funding settlement.
    pub next_settle_ts: i64,
}

pub async fn analyze(ctx: &AnalyzerContext) -> AnalyzerOutcome {
    let Ok(funding) = ctx.feed.funding_rate(&ctx.symbol).await else {
        return AnalyzerOutcome::neutral(AnalyzerKind::Funding);
    };

    let rate_pct = funding.rate_pct();
    let score = map_rate(rate_pct);

    AnalyzerOutcome::new(
        AnalyzerKind::Funding,
        score,
        AnalyzerDetail::Funding(FundingDetail {
            rate: funding.rate,
            rate_pct,
            next_settle_ts: funding.next_settle_ts,
        }),
    )
}

/// Piecewise-linear interpolation over [`ANCHORS`].
fn map_rate(rate_pct: f64) -> f64 {
    if rate_pct <= ANCHORS[0].0 {
        return ANCHORS[0].1;
    }
    let last = ANCHORS[ANCHORS.len() - 1];
    if rate_pct >= last.0 {
        return last.1;
    }

    for pair in ANCHORS.windows(2) {
        let (x0, y0) = pair[0];
        let (x1, y1) = pair[1];
        if rate_pct <= x1 {
            let t = (rate_pct - x0) / (x1 - x0);
            return y0 + t * (y1 - y0);
        }
    }
    last.1
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anchor_points_map_exactly() {
        assert!(map_rate(0.0).abs() < 1e-9);
        assert!((map_rate(0.01) - 2.0).abs() < 1e-9);
        assert!((map_rate(0.05) - 5.0).abs() < 1e-9);
        assert!((map_rate(0.10) - 7.0).abs() < 1e-9);
        assert!((map_rate(0.20) - 10.0).abs() < 1e-9);
    }

    #[test]
    fn negative_rate_scores_zero() {
        assert!(map_rate(-0.05).abs() < 1e-9);
    }

    #[test]
    fn extreme_rate_caps_at_ten() {
        assert!((map_rate(0.5) - 10.0).abs() < 1e-9);
    }

    #[test]
    fn interpolation_between_anchors() {
        // Midway between 0.05% (5.0) and 0.10% (7.0) => 6.0.
        assert!((map_rate(0.075) - 6.0).abs() < 1e-9);
        // Midway between 0 (0.0) and 0.01% (2.0) => 1.0.
        assert!((map_rate(0.005) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn mapping_is_monotonic() {
        let mut prev = -1.0;
        let mut r = 0.0;
        while r <= 0.25 {
            let s = map_rate(r);
            assert!(s >= prev);
            prev = s;
            r += 0.001;
        }
    }
}
