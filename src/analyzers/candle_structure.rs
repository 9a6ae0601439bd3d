// =============================================================================
// Candle Structure Analyzer
// =============================================================================
//
// Reads the shape of the most recent candle. Reversal shapes after a pump
// (shooting star, long upper wick, bearish engulfing) score the short up;
// an indecisive doji scores it down. The derived multiplier is also fed to
// the level calculator to stretch or shrink the TP ladder.
//
//   long upper wick (> 0.6 of range)          => x1.3
//   shooting star (wick > 0.4, body < 0.3)    => x1.2
//   bearish engulfing                         => x1.15 (per pattern scan)
//   strong bearish body (> 0.7 of range)      => x1.15
//   doji (body < 0.1 of range)                => x0.9

use serde::Serialize;

use crate::analyzers::{AnalyzerContext, AnalyzerDetail, AnalyzerKind, AnalyzerOutcome};
use crate::market_data::Candle;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CandlePattern {
    ShootingStar,
    BearishEngulfing,
    LongUpperWick,
    StrongBearishBody,
    Doji,
    Plain,
}

/// Last-candle shape detail; the multiplier feeds the level calculator.
#[derive(Debug, Clone, Serialize)]
pub struct CandleDetail {
    pub pattern: CandlePattern,
    pub upper_wick_ratio: f64,
    pub body_ratio: f64,
    /// TP-ladder multiplier derived from the shape.
    pub multiplier: f64,
}

impl CandleDetail {
    pub fn neutral() -> Self {
        Self {
            pattern: CandlePattern::Plain,
            upper_wick_ratio: 0.0,
            body_ratio: 0.0,
            multiplier: 1.0,
        }
    }
}

pub fn analyze(ctx: &AnalyzerContext) -> AnalyzerOutcome {
    let Some(last) = ctx.klines.last() else {
        return AnalyzerOutcome::neutral(AnalyzerKind::CandleStructure);
    };
    let prev = ctx.klines.len().checked_sub(2).map(|i| &ctx.klines[i]);

    let Some(detail) = assess(last, prev) else {
        return AnalyzerOutcome::neutral(AnalyzerKind::CandleStructure);
    };

    let score = match detail.pattern {
        CandlePattern::ShootingStar => 8.5,
        CandlePattern::BearishEngulfing => 8.0,
        CandlePattern::LongUpperWick => 7.5,
        CandlePattern::StrongBearishBody => 7.0,
        CandlePattern::Doji => 4.5,
        CandlePattern::Plain => 5.0,
    };

    AnalyzerOutcome::new(
        AnalyzerKind::CandleStructure,
        score,
        AnalyzerDetail::Candle(detail),
    )
}

/// Classify the last candle's shape. `None` only when the candle has no
/// range at all.
pub fn assess(last: &Candle, prev: Option<&Candle>) -> Option<CandleDetail> {
    let range = last.range();
    if range <= 0.0 {
        return None;
    }

    let upper_wick_ratio = last.upper_wick() / range;
    let body_ratio = last.body() / range;

    // Engulfing takes precedence over pure-shape reads: a red candle whose
    // body swallows the previous green body.
    if let Some(prev) = prev {
        let prev_green = prev.close > prev.open;
        if last.is_bearish()
            && prev_green
            && last.close < prev.open
            && last.open > prev.close
        {
            return Some(CandleDetail {
                pattern: CandlePattern::BearishEngulfing,
                upper_wick_ratio,
                body_ratio,
                multiplier: 1.15,
            });
        }
    }

    let (pattern, multiplier) = if upper_wick_ratio > 0.6 {
        (CandlePattern::LongUpperWick, 1.3)
    } else if upper_wick_ratio > 0.4 && body_ratio < 0.3 {
        (CandlePattern::ShootingStar, 1.2)
    } else if body_ratio < 0.1 {
        (CandlePattern::Doji, 0.9)
    } else if last.is_bearish() && body_ratio > 0.7 {
        (CandlePattern::StrongBearishBody, 1.15)
    } else {
        (CandlePattern::Plain, 1.0)
    };

    Some(CandleDetail {
        pattern,
        upper_wick_ratio,
        body_ratio,
        multiplier,
    })
}
