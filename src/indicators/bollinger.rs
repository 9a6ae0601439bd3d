// =============================================================================
// Bollinger Bands
// =============================================================================
//
// A middle band (SMA), an upper band (SMA + k*σ), and a lower band
// (SMA - k*σ). The precision analyzer scores the position of the current
// price relative to the bands: closing above the upper band after a pump is
// a mean-reversion setup for a short.

/// Result of a Bollinger Band calculation.
#[derive(Debug, Clone)]
pub struct BollingerResult {
    pub upper: f64,
    pub middle: f64,
    pub lower: f64,
    pub width: f64,
}

impl BollingerResult {
    /// Position of `price` within the bands as a fraction:
    /// 0.0 at the lower band, 1.0 at the upper band, >1.0 above it.
    pub fn position(&self, price: f64) -> Option<f64> {
        let span = self.upper - self.lower;
        if span <= 0.0 {
            return None;
        }
        Some((price - self.lower) / span)
    }
}

/// Calculate Bollinger Bands over the trailing `period` closes.
///
/// Returns `None` on fewer than `period` points or a degenerate (zero)
/// middle band.
pub fn calculate_bollinger(closes: &[f64], period: usize, num_std: f64) -> Option<BollingerResult> {
    if period == 0 || closes.len() < period {
        return None;
    }

    let window = &closes[closes.len() - period..];
    let middle = window.iter().sum::<f64>() / period as f64;

    if middle == 0.0 {
        return None;
    }

    let variance = window.iter().map(|x| (x - middle).powi(2)).sum::<f64>() / period as f64;
    let std_dev = variance.sqrt();

    let upper = middle + num_std * std_dev;
    let lower = middle - num_std * std_dev;
    let width = (upper - lower) / middle * 100.0;

    width.is_finite().then_some(BollingerResult {
        upper,
        middle,
        lower,
        width,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bollinger_basic() {
        let closes: Vec<f64> = (1..=20).map(|x| x as f64).collect();
        let bb = calculate_bollinger(&closes, 20, 2.0).unwrap();
        assert!(bb.upper > bb.middle);
        assert!(bb.lower < bb.middle);
        assert!(bb.width > 0.0);
    }

    #[test]
    fn bollinger_insufficient_data() {
        assert!(calculate_bollinger(&[1.0, 2.0, 3.0], 20, 2.0).is_none());
    }

    #[test]
    fn bollinger_flat() {
        let closes = vec![100.0; 20];
        let bb = calculate_bollinger(&closes, 20, 2.0).unwrap();
        assert!(bb.width.abs() < 1e-10);
        // Degenerate span — position undefined.
        assert!(bb.position(100.0).is_none());
    }

    #[test]
    fn position_above_upper_band() {
        let mut closes = vec![100.0, 101.0, 99.0, 100.5, 99.5];
        closes.extend_from_slice(&[100.0, 101.0, 99.0, 100.5, 99.5]);
        closes.extend_from_slice(&[100.0, 101.0, 99.0, 100.5, 99.5]);
        closes.extend_from_slice(&[100.0, 101.0, 99.0, 100.5, 99.5]);
        let bb = calculate_bollinger(&closes, 20, 2.0).unwrap();
        let pos = bb.position(bb.upper + 1.0).unwrap();
        assert!(pos > 1.0);
    }
}
