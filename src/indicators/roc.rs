// =============================================================================
// Rate of Change (ROC) — Momentum Indicator
// =============================================================================
//
// ROC measures the percentage change in price over a look-back period:
//   ROC = ((close - close_n) / close_n) * 100
//
// The multi-timeframe analyzer uses 10-bar ROC as its momentum measure.

/// Calculate the ROC series for the given closing prices and period.
///
/// Returns a vector of ROC values, one per close starting at index `period`.
pub fn calculate_roc(closes: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || closes.len() <= period {
        return Vec::new();
    }

    let mut result = Vec::with_capacity(closes.len() - period);
    for i in period..closes.len() {
        let prev = closes[i - period];
        if prev == 0.0 {
            result.push(0.0);
        } else {
            result.push(((closes[i] - prev) / prev) * 100.0);
        }
    }
    result
}

/// Return the most recent ROC value.
pub fn current_roc(closes: &[f64], period: usize) -> Option<f64> {
    calculate_roc(closes, period).last().copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roc_basic() {
        let closes: Vec<f64> = (1..=20).map(|x| x as f64).collect();
        let roc = calculate_roc(&closes, 10);
        assert!(!roc.is_empty());
        // From 1 to 11: (11-1)/1 * 100 = 1000%
        assert!((roc[0] - 1000.0).abs() < 1e-10);
    }

    #[test]
    fn roc_insufficient_data() {
        assert!(calculate_roc(&[1.0, 2.0, 3.0], 10).is_empty());
    }

    #[test]
    fn roc_negative_momentum() {
        let closes: Vec<f64> = (1..=20).rev().map(|x| x as f64).collect();
        let last = current_roc(&closes, 10).unwrap();
        assert!(last < 0.0);
    }
}
