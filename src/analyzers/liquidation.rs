// =============================================================================
// Liquidation Heatmap Analyzer
// =============================================================================
//
// Pure computation over the pump geometry. For each typical leverage tier
// {5, 10, 20, 50, 100} the implied liquidation price is derived for:
//
//   - a hypothetical average long entered between `start` and `peak`
//     (liquidated BELOW the current price — a magnet for the dump), and
//   - a hypothetical average short entered at the peak
//     (liquidated ABOVE the current price).
//
// Liquidation at 90% margin consumption: long_liq = entry * (1 - 0.9/lev),
// short_liq = entry * (1 + 0.9/lev).
//
// Score rises with (a) evidence the upside short liquidity was already swept
// (pump >= 10 %) and (b) clustered high-intensity long-liquidation levels
// below. The ranked long zones also feed the level calculator as TP magnets.

use serde::Serialize;

use crate::analyzers::{AnalyzerContext, AnalyzerDetail, AnalyzerKind, AnalyzerOutcome};

/// Typical leverage tiers on the exchange.
const LEVERAGE_TIERS: [u32; 5] = [5, 10, 20, 50, 100];

/// Margin fraction consumed at liquidation.
const MARGIN_FACTOR: f64 = 0.9;

/// Estimated crowd density at a leverage tier. Low tiers carry far more
/// positions than 50–100x.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum ZoneIntensity {
    Low,
    Medium,
    High,
}

/// One implied liquidation level.
#[derive(Debug, Clone, Serialize)]
pub struct LiquidationZone {
    pub price: f64,
    pub leverage: u32,
    /// Distance from the current price, percent (positive either direction).
    pub distance_pct: f64,
    pub intensity: ZoneIntensity,
}

/// Ranked liquidation structure around the current price.
#[derive(Debug, Clone, Serialize)]
pub struct LiquidationMap {
    /// Long liquidations below the current price, nearest first.
    pub long_zones: Vec<LiquidationZone>,
    /// Short liquidations above the current price, nearest first.
    pub short_zones: Vec<LiquidationZone>,
    /// Pump was large enough to have swept the short liquidity above.
    pub swept_above: bool,
}

impl LiquidationMap {
    /// TP targets implied by the long-liquidation magnets, nearest first.
    pub fn tp_targets(&self, count: usize) -> Vec<f64> {
        self.long_zones.iter().take(count).map(|z| z.price).collect()
    }
}

pub fn analyze(ctx: &AnalyzerContext) -> AnalyzerOutcome {
    let pump = &ctx.pump;
    if pump.current_price <= 0.0 || pump.price_start <= 0.0 {
        return AnalyzerOutcome::neutral(AnalyzerKind::Liquidation);
    }

    let map = build_map(
        pump.current_price,
        pump.price_peak,
        pump.price_start,
        pump.pump_pct,
    );
    let score = score_map(&map, pump.pump_pct);

    AnalyzerOutcome::new(
        AnalyzerKind::Liquidation,
        score,
        AnalyzerDetail::Liquidation(map),
    )
}

/// Derive the liquidation structure for the given pump geometry.
pub fn build_map(current: f64, peak: f64, start: f64, pump_pct: f64) -> LiquidationMap {
    let avg_long_entry = (start + peak) / 2.0;
    let avg_short_entry = peak;

    let mut long_zones = Vec::new();
    let mut short_zones = Vec::new();

    for lev in LEVERAGE_TIERS {
        let long_liq = avg_long_entry * (1.0 - MARGIN_FACTOR / lev as f64);
        if long_liq < current && long_liq > 0.0 {
            long_zones.push(LiquidationZone {
                price: long_liq,
                leverage: lev,
                distance_pct: (current - long_liq) / current * 100.0,
                intensity: intensity(lev),
            });
        }

        let short_liq = avg_short_entry * (1.0 + MARGIN_FACTOR / lev as f64);
        if short_liq > current {
            short_zones.push(LiquidationZone {
                price: short_liq,
                leverage: lev,
                distance_pct: (short_liq - current) / current * 100.0,
                intensity: intensity(lev),
            });
        }
    }

    long_zones.sort_by(|a, b| a.distance_pct.total_cmp(&b.distance_pct));
    short_zones.sort_by(|a, b| a.distance_pct.total_cmp(&b.distance_pct));

    LiquidationMap {
        long_zones,
        short_zones,
        swept_above: pump_pct >= 10.0,
    }
}

fn intensity(leverage: u32) -> ZoneIntensity {
    if leverage <= 10 {
        ZoneIntensity::High
    } else if leverage <= 25 {
        ZoneIntensity::Medium
    } else {
        ZoneIntensity::Low
    }
}

fn score_map(map: &LiquidationMap, pump_pct: f64) -> f64 {
    let mut score = 5.0;

    // Upside liquidity already taken.
    if map.swept_above {
        score += 2.0;
    }

    // Clustered high-intensity long liquidations below act as magnets.
    let high_zones = map
        .long_zones
        .iter()
        .filter(|z| z.intensity == ZoneIntensity::High)
        .count();
    if high_zones >= 2 {
        score += 2.0;
    } else if high_zones >= 1 {
        score += 1.0;
    }

    // A violent pump liquidates more shorts on the way up.
    if pump_pct >= 20.0 {
        score += 1.0;
    }

    score
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn long_zones_sit_below_current() {
        let map = build_map(110.0, 112.0, 100.0, 12.0);
        assert!(!map.long_zones.is_empty());
        for z in &map.long_zones {
            assert!(z.price < 110.0);
            assert!(z.distance_pct > 0.0);
        }
    }

    #[test]
    fn short_zones_sit_above_current() {
        let map = build_map(110.0, 112.0, 100.0, 12.0);
        assert!(!map.short_zones.is_empty());
        for z in &map.short_zones {
            assert!(z.price > 110.0);
        }
    }

    #[test]
    fn zones_ranked_nearest_first() {
        let map = build_map(110.0, 112.0, 100.0, 12.0);
        for pair in map.long_zones.windows(2) {
            assert!(pair[0].distance_pct <= pair[1].distance_pct);
        }
    }

    #[test]
    fn sweep_flag_requires_ten_percent() {
        assert!(build_map(110.0, 112.0, 100.0, 12.0).swept_above);
        assert!(!build_map(104.0, 105.0, 100.0, 5.0).swept_above);
    }

    #[test]
    fn low_leverage_is_high_intensity() {
        assert_eq!(intensity(5), ZoneIntensity::High);
        assert_eq!(intensity(10), ZoneIntensity::High);
        assert_eq!(intensity(20), ZoneIntensity::Medium);
        assert_eq!(intensity(100), ZoneIntensity::Low);
    }

    #[test]
    fn swept_pump_with_magnets_scores_high() {
        let map = build_map(110.0, 112.0, 100.0, 25.0);
        let score = score_map(&map, 25.0);
        assert!(score >= 8.0, "got {score}");
    }

    #[test]
    fn small_move_scores_near_neutral() {
        // 5% pump: no sweep, the 5x/10x long liqs sit ~17% below entry mid —
        // still below current, so magnet credit applies but no sweep bonus.
        let map = build_map(104.0, 105.0, 100.0, 5.0);
        let score = score_map(&map, 5.0);
        assert!(score <= 7.0, "got {score}");
    }

    #[test]
    fn tp_targets_take_nearest_zones() {
        let map = build_map(110.0, 112.0, 100.0, 12.0);
        let targets = map.tp_targets(3);
        assert!(targets.len() <= 3);
        if targets.len() >= 2 {
            assert!(targets[0] > targets[1], "nearest (highest price) first");
        }
    }
}
