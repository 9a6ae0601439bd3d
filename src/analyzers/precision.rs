// =============================================================================
// Precision Indicators Analyzer
// =============================================================================
//
// A composite of five sub-factors over the 1-minute candle series, each
// contributing a multiplicative nudge to a neutral 5.0 base:
//
//   1. Bollinger-band position — price stretched above the upper band is a
//      mean-reversion setup.
//   2. 9/21 EMA crossover — a bearish cross confirms the rollover.
//   3. ADX strength — only meaningful when the move has directional force.
//   4. Volume-profile POC distance — price far above the point of control
//      tends to revert to it.
//   5. Momentum divergence — price making a higher high while momentum
//      fades.
//
// The composite is `clamp(5.0 * product_of_multipliers, 0, 10)`.

use serde::Serialize;

use crate::analyzers::{AnalyzerContext, AnalyzerDetail, AnalyzerKind, AnalyzerOutcome};
use crate::indicators::{adx, bollinger, ema, roc};
use crate::market_data::Candle;

/// Per-sub-factor readings exposed in the signal breakdown.
#[derive(Debug, Clone, Serialize)]
pub struct PrecisionDetail {
    /// Price position within the Bollinger bands (1.0 = at the upper band).
    pub bollinger_position: Option<f64>,
    pub ema_bearish_cross: Option<bool>,
    pub adx: Option<f64>,
    /// Distance from the point of control, percent of the POC.
    pub poc_distance_pct: Option<f64>,
    pub momentum_divergence: bool,
    /// Product of all sub-factor multipliers.
    pub composite_multiplier: f64,
}

pub fn analyze(ctx: &AnalyzerContext) -> AnalyzerOutcome {
    if ctx.klines.len() < 15 {
        return AnalyzerOutcome::neutral(AnalyzerKind::Precision);
    }

    let closes: Vec<f64> = ctx.klines.iter().map(|c| c.close).collect();
    let current = *closes.last().unwrap_or(&0.0);
    if current <= 0.0 {
        return AnalyzerOutcome::neutral(AnalyzerKind::Precision);
    }

    let mut mult: f64 = 1.0;

    // 1. Bollinger position.
    let bollinger_position = bollinger::calculate_bollinger(&closes, 20, 2.0)
        .and_then(|bb| bb.position(current));
    if let Some(pos) = bollinger_position {
        if pos > 1.0 {
            mult *= 1.2;
        } else if pos > 0.85 {
            mult *= 1.1;
        } else if pos < 0.2 {
            mult *= 0.85;
        }
    }

    // 2. 9/21 EMA crossover.
    let ema_bearish_cross = ema::ema_crossover(&closes, 9, 21, 0.0).map(|bullish| !bullish);
    match ema_bearish_cross {
        Some(true) => mult *= 1.15,
        Some(false) => mult *= 0.9,
        None => {}
    }

    // 3. ADX strength — direction comes from the EMA factor; ADX only
    //    scales conviction.
    let adx_val = adx::calculate_adx(&ctx.klines, 14);
    if let Some(a) = adx_val {
        if a > 40.0 {
            mult *= 1.15;
        } else if a > 25.0 {
            mult *= 1.05;
        } else if a < 15.0 {
            mult *= 0.95;
        }
    }

    // 4. POC distance.
    let poc_distance_pct = point_of_control(&ctx.klines).map(|poc| (current - poc) / poc * 100.0);
    if let Some(dist) = poc_distance_pct {
        if dist > 5.0 {
            mult *= 1.15;
        } else if dist > 2.0 {
            mult *= 1.05;
        } else if dist < -5.0 {
            mult *= 0.9;
        }
    }

    // 5. Momentum divergence.
    let momentum_divergence = detect_momentum_divergence(&closes);
    if momentum_divergence {
        mult *= 1.2;
    }

    let score = (5.0 * mult).clamp(0.0, 10.0);

    AnalyzerOutcome::new(
        AnalyzerKind::Precision,
        score,
        AnalyzerDetail::Precision(PrecisionDetail {
            bollinger_position,
            ema_bearish_cross,
            adx: adx_val,
            poc_distance_pct,
            momentum_divergence,
            composite_multiplier: mult,
        }),
    )
}

/// Volume-weighted point of control: the price level carrying the most
/// traded volume across the series.
fn point_of_control(candles: &[Candle]) -> Option<f64> {
    let mut best: Option<(f64, f64)> = None;
    for c in candles {
        if c.volume <= 0.0 {
            continue;
        }
        let mid = (c.high + c.low) / 2.0;
        match best {
            Some((_, vol)) if vol >= c.volume => {}
            _ => best = Some((mid, c.volume)),
        }
    }
    best.map(|(price, _)| price)
}

/// Price making a higher high over the recent half while 10-bar momentum
/// shrinks: the move is running out of buyers.
fn detect_momentum_divergence(closes: &[f64]) -> bool {
    if closes.len() < 20 {
        return false;
    }
    let momentum = roc::calculate_roc(closes, 10);
    if momentum.len() < 4 {
        return false;
    }

    let half = closes.len() / 2;
    let early_high = closes[..half].iter().copied().fold(f64::MIN, f64::max);
    let late_high = closes[half..].iter().copied().fold(f64::MIN, f64::max);

    let m_half = momentum.len() / 2;
    let early_peak_mom = momentum[..m_half].iter().copied().fold(f64::MIN, f64::max);
    let late_peak_mom = momentum[m_half..].iter().copied().fold(f64::MIN, f64::max);

    late_high > early_high && late_peak_mom < early_peak_mom * 0.7
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    fn candle(close: f64, volume: f64) -> Candle {
        Candle::new(0, close, close + 0.5, close - 0.5, close, volume)
    }

    #[test]
    fn poc_picks_highest_volume_level() {
        let candles = vec![candle(100.0, 10.0), candle(105.0, 500.0), candle(110.0, 20.0)];
        let poc = point_of_control(&candles).unwrap();
        assert!((poc - 105.0).abs() < 1e-9);
    }

    #[test]
    fn poc_none_without_volume() {
        let candles = vec![candle(100.0, 0.0)];
        assert!(point_of_control(&candles).is_none());
    }

    #[test]
    fn divergence_on_fading_momentum() {
        // First half: sharp rise. Second half: grinding marginal highs.
        let mut closes: Vec<f64> = (0..20).map(|i| 100.0 + i as f64 * 3.0).collect();
        for i in 0..20 {
            closes.push(157.0 + i as f64 * 0.15);
        }
        assert!(detect_momentum_divergence(&closes));
    }

    #[test]
    fn no_divergence_on_steady_climb() {
        let closes: Vec<f64> = (0..40).map(|i| 100.0 * 1.02f64.powi(i)).collect();
        assert!(!detect_momentum_divergence(&closes));
    }

    #[test]
    fn no_divergence_on_short_series() {
        let closes: Vec<f64> = (0..10).map(|i| 100.0 + i as f64).collect();
        assert!(!detect_momentum_divergence(&closes));
    }
}
