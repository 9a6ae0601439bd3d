// =============================================================================
// Reference-Asset Correlation Analyzer
// =============================================================================
//
// Checks which way the reference asset (BTC by default) moved over the last
// 24 h. A dumping reference market drags altcoins down with it — ideal for a
// short into an isolated pump. A strongly rising reference market makes
// every short a fight against the tide.
//
//   change <= -3 %  => 9
//   change >= +3 %  => 2
//   in between      => graded bands through the neutral 5.

use serde::Serialize;

use crate::analyzers::{AnalyzerContext, AnalyzerDetail, AnalyzerKind, AnalyzerOutcome};

#[derive(Debug, Clone, Serialize)]
pub struct BtcDetail {
    pub reference_symbol: String,
    /// Reference asset's 24 h change, percent.
    pub change_24h_pct: f64,
}

pub async fn analyze(ctx: &AnalyzerContext) -> AnalyzerOutcome {
    let reference = &ctx.params.reference_symbol;

    let Ok(ticker) = ctx.feed.ticker(reference).await else {
        return AnalyzerOutcome::neutral(AnalyzerKind::BtcCorrelation);
    };

    let change = ticker.change_24h_pct;
    let score = score_change(change);

    AnalyzerOutcome::new(
        AnalyzerKind::BtcCorrelation,
        score,
        AnalyzerDetail::BtcCorrelation(BtcDetail {
            reference_symbol: reference.clone(),
            change_24h_pct: change,
        }),
    )
}

fn score_change(change_pct: f64) -> f64 {
    if change_pct <= -3.0 {
        9.0
    } else if change_pct <= -1.0 {
        7.0
    } else if change_pct < 1.0 {
        5.0
    } else if change_pct < 3.0 {
        3.5
    } else {
        2.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dumping_reference_scores_high() {
        assert!((score_change(-5.0) - 9.0).abs() < 1e-9);
        assert!((score_change(-3.0) - 9.0).abs() < 1e-9);
    }

    #[test]
    fn rising_reference_scores_low() {
        assert!((score_change(3.0) - 2.0).abs() < 1e-9);
        assert!((score_change(8.0) - 2.0).abs() < 1e-9);
    }

    #[test]
    fn flat_reference_is_neutral() {
        assert!((score_change(0.0) - 5.0).abs() < 1e-9);
        assert!((score_change(0.9) - 5.0).abs() < 1e-9);
    }

    #[test]
    fn graded_bands_between() {
        assert!((score_change(-2.0) - 7.0).abs() < 1e-9);
        assert!((score_change(2.0) - 3.5).abs() < 1e-9);
    }
}
