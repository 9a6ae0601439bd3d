// =============================================================================
// Exponential Moving Average (EMA)
// =============================================================================
//
// EMA gives more weight to recent prices, making it more responsive to new
// information than the Simple Moving Average (SMA).
//
// Formula:
//   multiplier = 2 / (period + 1)
//   EMA_t      = close_t * multiplier + EMA_{t-1} * (1 - multiplier)
//
// The very first EMA value is seeded with the SMA of the first `period` closes.
// =============================================================================

/// Compute the EMA series for the given `closes` slice and look-back `period`.
///
/// Returns an empty `Vec` when the input is too short or the period is zero.
/// Each output element corresponds to a close starting at index `period - 1`.
pub fn calculate_ema(closes: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || closes.len() < period {
        return Vec::new();
    }

    let multiplier = 2.0 / (period + 1) as f64;

    // Seed: SMA of the first `period` values.
    let sma: f64 = closes[..period].iter().sum::<f64>() / period as f64;
    if !sma.is_finite() {
        return Vec::new();
    }

    let mut result = Vec::with_capacity(closes.len() - period + 1);
    result.push(sma);

    let mut prev_ema = sma;
    for &close in &closes[period..] {
        let ema = close * multiplier + prev_ema * (1.0 - multiplier);
        if !ema.is_finite() {
            // Downstream consumers should not trust a broken series.
            break;
        }
        result.push(ema);
        prev_ema = ema;
    }

    result
}

/// Most recent EMA value, or `None` when the series cannot be computed.
pub fn current_ema(closes: &[f64], period: usize) -> Option<f64> {
    calculate_ema(closes, period).last().copied()
}

/// Fast/slow EMA crossover state for the trend analyzers.
///
/// Returns `Some(true)` when the fast EMA sits above the slow one by more
/// than `band` (fraction, e.g. 0.005 = 0.5 %), `Some(false)` when below by
/// the same margin, and `None` when inside the band or when either EMA is
/// unavailable.
pub fn ema_crossover(closes: &[f64], fast: usize, slow: usize, band: f64) -> Option<bool> {
    let f = current_ema(closes, fast)?;
    let s = current_ema(closes, slow)?;
    if s == 0.0 {
        return None;
    }
    if f > s * (1.0 + band) {
        Some(true)
    } else if f < s * (1.0 - band) {
        Some(false)
    } else {
        None
    }
}
