// =============================================================================
// Volume Profile Analyzer
// =============================================================================
//
// Builds a 24 h volume-at-price profile from hourly candles. Each candle's
// volume is spread uniformly across five levels between its low and high.
// Levels holding >= 1.5x the mean volume become zones: support when below
// the current price, resistance when above.
//
// For a short: many resistances overhead and few supports underneath means
// the bounce is capped and the floor is thin.

use serde::Serialize;

use crate::analyzers::{AnalyzerContext, AnalyzerDetail, AnalyzerKind, AnalyzerOutcome};
use crate::market_data::{Candle, KlineInterval};

/// Hourly candles fetched for the 24 h profile.
const PROFILE_HOURS: usize = 24;

/// Uniform levels per candle range.
const LEVELS_PER_CANDLE: usize = 5;

/// Zone threshold as a multiple of mean level volume.
const ZONE_VOLUME_FACTOR: f64 = 1.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ZoneKind {
    Support,
    Resistance,
}

/// A high-volume price zone.
#[derive(Debug, Clone, Serialize)]
pub struct VolumeZone {
    pub price: f64,
    pub volume: f64,
    pub kind: ZoneKind,
}

/// Volume-profile detail for the signal breakdown.
#[derive(Debug, Clone, Serialize)]
pub struct VolumeProfileDetail {
    pub zones: Vec<VolumeZone>,
    pub support_count: usize,
    pub resistance_count: usize,
    pub nearest_support: Option<f64>,
    pub nearest_resistance: Option<f64>,
}

pub async fn analyze(ctx: &AnalyzerContext) -> AnalyzerOutcome {
    let candles = match ctx
        .feed
        .klines(&ctx.symbol, KlineInterval::Min60, PROFILE_HOURS)
        .await
    {
        Ok(c) if !c.is_empty() => c,
        _ => return AnalyzerOutcome::neutral(AnalyzerKind::VolumeProfile),
    };

    let current_price = ctx.pump.current_price;
    if current_price <= 0.0 {
        return AnalyzerOutcome::neutral(AnalyzerKind::VolumeProfile);
    }

    let Some(detail) = build_profile(&candles, current_price) else {
        return AnalyzerOutcome::neutral(AnalyzerKind::VolumeProfile);
    };

    let score = score_profile(&detail);
    AnalyzerOutcome::new(
        AnalyzerKind::VolumeProfile,
        score,
        AnalyzerDetail::VolumeProfile(detail),
    )
}

/// Bucket candle volume into price levels and extract high-volume zones.
pub fn build_profile(candles: &[Candle], current_price: f64) -> Option<VolumeProfileDetail> {
    let mut levels: Vec<(f64, f64)> = Vec::new();

    for candle in candles {
        let range = candle.range();
        if range <= 0.0 || candle.volume <= 0.0 {
            continue;
        }
        let step_price = range / LEVELS_PER_CANDLE as f64;
        let step_vol = candle.volume / LEVELS_PER_CANDLE as f64;
        for i in 0..LEVELS_PER_CANDLE {
            levels.push((candle.low + step_price * i as f64, step_vol));
        }
    }

    if levels.is_empty() {
        return None;
    }

    let mean_vol = levels.iter().map(|(_, v)| v).sum::<f64>() / levels.len() as f64;

    let mut zones: Vec<VolumeZone> = levels
        .iter()
        .filter(|(_, v)| *v >= mean_vol * ZONE_VOLUME_FACTOR)
        .map(|&(price, volume)| VolumeZone {
            price,
            volume,
            kind: if price < current_price {
                ZoneKind::Support
            } else {
                ZoneKind::Resistance
            },
        })
        .collect();

    zones.sort_by(|a, b| b.volume.total_cmp(&a.volume));
    zones.truncate(5);

    let support_count = zones.iter().filter(|z| z.kind == ZoneKind::Support).count();
    let resistance_count = zones.len() - support_count;

    let nearest_support = zones
        .iter()
        .filter(|z| z.kind == ZoneKind::Support)
        .map(|z| z.price)
        .max_by(f64::total_cmp);
    let nearest_resistance = zones
        .iter()
        .filter(|z| z.kind == ZoneKind::Resistance)
        .map(|z| z.price)
        .min_by(f64::total_cmp);

    Some(VolumeProfileDetail {
        zones,
        support_count,
        resistance_count,
        nearest_support,
        nearest_resistance,
    })
}

fn score_profile(detail: &VolumeProfileDetail) -> f64 {
    if detail.resistance_count > detail.support_count {
        7.0
    } else if detail.support_count > detail.resistance_count {
        4.0
    } else {
        5.5
    }
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    fn candle(low: f64, high: f64, volume: f64) -> Candle {
        Candle::new(0, low, high, low, high, volume)
    }

    #[test]
    fn empty_profile_is_none() {
        assert!(build_profile(&[], 100.0).is_none());
        // Zero-range candles contribute nothing.
        let flat = vec![Candle::new(0, 100.0, 100.0, 100.0, 100.0, 50.0)];
        assert!(build_profile(&flat, 100.0).is_none());
    }

    #[test]
    fn heavy_overhead_volume_becomes_resistance() {
        // Light trade below 100, heavy trade above.
        let mut candles = vec![candle(90.0, 95.0, 10.0)];
        candles.push(candle(105.0, 110.0, 500.0));
        let detail = build_profile(&candles, 100.0).unwrap();
        assert!(detail.resistance_count > 0);
        assert!(detail.nearest_resistance.is_some());
        assert!((score_profile(&detail) - 7.0).abs() < 1e-9);
    }

    #[test]
    fn heavy_floor_volume_becomes_support() {
        let mut candles = vec![candle(90.0, 95.0, 500.0)];
        candles.push(candle(105.0, 110.0, 10.0));
        let detail = build_profile(&candles, 100.0).unwrap();
        assert!(detail.support_count > 0);
        assert!((score_profile(&detail) - 4.0).abs() < 1e-9);
    }

    #[test]
    fn nearest_resistance_is_the_closest_heavy_zone() {
        // One thin candle below price, one heavy candle above: the heavy
        // levels become resistance and the nearest one is its low edge.
        let candles = vec![candle(90.0, 95.0, 10.0), candle(104.0, 106.0, 500.0)];
        let detail = build_profile(&candles, 100.0).unwrap();
        assert_eq!(detail.support_count, 0);
        assert!(detail.resistance_count > 0);
        assert!(detail.nearest_support.is_none());
        let res = detail.nearest_resistance.unwrap();
        assert!((res - 104.0).abs() < 1e-9, "got {res}");
    }
}
