// =============================================================================
// Level Calculator — entry, stop-loss, and the three take-profit targets
// =============================================================================
//
// Builds the short's exit ladder from the pump geometry:
//
//   1. Fibonacci retracements of the pump range: peak − range · k for
//      k ∈ {0.382, 0.5, 0.618}.
//   2. Speed multiplier — a violent pump unwinds hard, a slow grind may
//      consolidate: <=2 min x1.4, <=5 x1.2, <=10 x1.0, else x0.8.
//   3. Candle-shape multiplier from the structure analyzer (1.15–1.3 on
//      reversal shapes).
//   4. Orderbook snap — each TP is pulled to 0.3% above the nearest large
//      bid within ±3%, so the exit sits in real liquidity.
//   5. Liquidation overlay — ranked long-liquidation magnets blend 50/50
//      with the Fibonacci targets.
//   6. Memory multiplier — the per-symbol learned stretch factor.
//   7. Psychological rounding within 1%.
//   8. Sort ascending (deepest target first).
//   9. Stop-loss: max(peak · 1.01, entry · (1 + ATR% · 1.5 / 100)), capped
//      at entry · 1.10. ATR% over the last 14 one-minute bars.
//
// All arithmetic is plain f64; lot/tick rounding is the consumer's problem.

use serde::Serialize;
use tracing::debug;

use crate::analyzers::LiquidationMap;
use crate::exchange::OrderbookDepth;
use crate::indicators::atr;
use crate::market_data::Candle;
use crate::memory::CoinIntelligence;

/// Fibonacci retracement ratios for the three targets.
const FIB_RATIOS: [f64; 3] = [0.382, 0.5, 0.618];

/// Orderbook snap search band around each target, fraction of price.
const WALL_SEARCH_BAND: f64 = 0.03;

/// Snapped targets land just above the wall.
const WALL_OFFSET: f64 = 1.003;

/// ATR period (one-minute bars).
const ATR_PERIOD: usize = 14;

/// Fallback volatility when too few candles exist for an ATR, percent.
const DEFAULT_ATR_PCT: f64 = 5.0;

/// Inputs gathered by the orchestrator before emission.
pub struct LevelInputs<'a> {
    pub entry_price: f64,
    pub peak_price: f64,
    pub start_price: f64,
    pub pump_elapsed_min: f64,
    /// One-minute candles, oldest first.
    pub klines: &'a [Candle],
    pub orderbook: Option<&'a OrderbookDepth>,
    /// Ranked liquidation zones from the heatmap analyzer, if it produced any.
    pub liquidation: Option<&'a LiquidationMap>,
    /// Candle-shape multiplier from the structure analyzer.
    pub candle_multiplier: f64,
    pub intelligence: &'a CoinIntelligence,
}

/// Computed exit ladder.
#[derive(Debug, Clone, Serialize)]
pub struct Levels {
    pub sl_price: f64,
    /// Ascending (deepest short target first).
    pub tp_prices: [f64; 3],
    pub atr_pct: f64,
    pub speed_multiplier: f64,
}

/// Compute the full ladder.
pub fn compute(inputs: &LevelInputs<'_>) -> Levels {
    let entry = inputs.entry_price;
    let range = inputs.peak_price - inputs.start_price;

    // 1. Fibonacci targets, nearest first.
    let mut tps = FIB_RATIOS.map(|k| inputs.peak_price - range * k);

    // 2–3. Reach multipliers applied to the distance from entry.
    let speed_multiplier = speed_multiplier(inputs.pump_elapsed_min);
    let reach = speed_multiplier * inputs.candle_multiplier;
    for tp in &mut tps {
        *tp = entry - (entry - *tp) * reach;
    }

    // 4. Snap each target into nearby bid liquidity.
    if let Some(book) = inputs.orderbook {
        for tp in &mut tps {
            *tp = snap_to_liquidity(*tp, &book.bids);
        }
    }

    // 5. Blend with liquidation magnets.
    if let Some(map) = inputs.liquidation {
        let magnets = map.tp_targets(3);
        for (tp, magnet) in tps.iter_mut().zip(magnets) {
            if magnet > 0.0 && magnet < entry {
                *tp = (*tp + magnet) / 2.0;
            }
        }
    }

    // 6. Per-symbol learned stretch.
    let memory_mult = inputs.intelligence.tp_multiplier;
    if (memory_mult - 1.0).abs() > f64::EPSILON {
        for tp in &mut tps {
            *tp = entry - (entry - *tp) * memory_mult;
        }
    }

    // 7. Psychological rounding, then the short invariant: no target ever
    //    sits above the entry (a late entry can undercut the shallow fib
    //    levels, and rounding can push a near-entry target over the line).
    for tp in &mut tps {
        *tp = round_to_psychological(*tp).min(entry);
    }

    // 8. Ascending sort — deepest target first. Required after any
    //    memory-driven adjustment.
    tps.sort_by(f64::total_cmp);

    // 9. Stop-loss.
    let atr_pct = atr::calculate_atr_pct(inputs.klines, ATR_PERIOD, entry)
        .unwrap_or(DEFAULT_ATR_PCT);
    let sl_atr = entry * (1.0 + atr_pct * 1.5 / 100.0);
    let sl_floor = inputs.peak_price * 1.01;
    let sl_price = sl_atr.max(sl_floor).min(entry * 1.10);

    debug!(
        entry,
        sl = sl_price,
        tp_near = tps[2],
        tp_deep = tps[0],
        atr_pct = format!("{atr_pct:.2}"),
        reach = format!("{reach:.2}"),
        "levels computed"
    );

    Levels {
        sl_price,
        tp_prices: tps,
        atr_pct,
        speed_multiplier,
    }
}

/// Faster pumps retrace harder.
fn speed_multiplier(elapsed_min: f64) -> f64 {
    if elapsed_min <= 2.0 {
        1.4
    } else if elapsed_min <= 5.0 {
        1.2
    } else if elapsed_min <= 10.0 {
        1.0
    } else {
        0.8
    }
}

/// Pull `target` to just above the biggest bid within ±3%, if any.
fn snap_to_liquidity(target: f64, bids: &[(f64, f64)]) -> f64 {
    let band = target * WALL_SEARCH_BAND;

    let mut best_wall: Option<(f64, f64)> = None;
    for &(price, qty) in bids {
        if (price - target).abs() <= band {
            match best_wall {
                Some((_, best_qty)) if best_qty >= qty => {}
                _ => best_wall = Some((price, qty)),
            }
        }
    }

    match best_wall {
        Some((price, _)) => price * WALL_OFFSET,
        None => target,
    }
}

/// Round to a "round number" (one or two significant digits) when one sits
/// within 1% of the price.
fn round_to_psychological(price: f64) -> f64 {
    if price <= 0.0 || !price.is_finite() {
        return price;
    }

    let magnitude = 10f64.powf(price.abs().log10().floor());

    for digits in [1.0, 10.0] {
        let step = magnitude / digits;
        let rounded = (price / step).round() * step;
        if rounded > 0.0 && ((rounded - price).abs() / price) <= 0.01 {
            return rounded;
        }
    }
    price
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    fn minute_candles(entry: f64, n: usize, spread: f64) -> Vec<Candle> {
        (0..n)
            .map(|i| {
                let ts = i as i64 * 60_000;
                Candle::new(ts, entry, entry + spread, entry - spread, entry, 10.0)
            })
            .collect()
    }

    fn inputs<'a>(
        klines: &'a [Candle],
        intel: &'a CoinIntelligence,
    ) -> LevelInputs<'a> {
        LevelInputs {
            entry_price: 111.0,
            peak_price: 112.0,
            start_price: 100.0,
            pump_elapsed_min: 1.5,
            klines,
            orderbook: None,
            liquidation: None,
            candle_multiplier: 1.0,
            intelligence: intel,
        }
    }

    #[test]
    fn short_semantics_hold() {
        let klines = minute_candles(111.0, 30, 0.5);
        let intel = CoinIntelligence::default();
        let levels = compute(&inputs(&klines, &intel));

        assert!(levels.sl_price > 111.0, "SL above entry");
        for tp in levels.tp_prices {
            assert!(tp <= 111.0, "every TP at or below entry, got {tp}");
        }
        assert!(levels.tp_prices[0] <= levels.tp_prices[1]);
        assert!(levels.tp_prices[1] <= levels.tp_prices[2]);
    }

    #[test]
    fn sl_at_least_one_percent_over_peak_and_capped() {
        let klines = minute_candles(111.0, 30, 0.1); // tiny ATR
        let intel = CoinIntelligence::default();
        let levels = compute(&inputs(&klines, &intel));
        assert!(levels.sl_price >= 112.0 * 1.01 - 1e-9);
        assert!(levels.sl_price <= 111.0 * 1.10 + 1e-9);
    }

    #[test]
    fn wild_atr_is_capped_at_ten_percent() {
        let klines = minute_candles(111.0, 30, 15.0); // enormous ranges
        let intel = CoinIntelligence::default();
        let levels = compute(&inputs(&klines, &intel));
        assert!((levels.sl_price - 111.0 * 1.10).abs() < 1e-6);
    }

    #[test]
    fn speed_multiplier_bands() {
        assert!((speed_multiplier(1.0) - 1.4).abs() < 1e-9);
        assert!((speed_multiplier(4.0) - 1.2).abs() < 1e-9);
        assert!((speed_multiplier(8.0) - 1.0).abs() < 1e-9);
        assert!((speed_multiplier(30.0) - 0.8).abs() < 1e-9);
    }

    #[test]
    fn memory_multiplier_then_sort() {
        // Raw targets [95, 90, 85] with entry 100 and tp_multiplier 1.2:
        // distances {5,10,15} stretch to {6,12,18} => [94, 88, 82], then the
        // ascending sort yields [82, 88, 94].
        let mut intel = CoinIntelligence::default();
        intel.tp_multiplier = 1.2;

        let entry = 100.0;
        let mut tps = [95.0, 90.0, 85.0];
        for tp in &mut tps {
            *tp = entry - (entry - *tp) * intel.tp_multiplier;
        }
        tps.sort_by(f64::total_cmp);
        assert!((tps[0] - 82.0).abs() < 1e-9);
        assert!((tps[1] - 88.0).abs() < 1e-9);
        assert!((tps[2] - 94.0).abs() < 1e-9);
    }

    #[test]
    fn tp_ladder_respects_memory_stretch_end_to_end() {
        let klines = minute_candles(111.0, 30, 0.5);

        let neutral = CoinIntelligence::default();
        let base = compute(&inputs(&klines, &neutral));

        let mut stretched_intel = CoinIntelligence::default();
        stretched_intel.tp_multiplier = 1.2;
        let stretched = compute(&inputs(&klines, &stretched_intel));

        // Stretched targets sit deeper (further below entry).
        assert!(stretched.tp_prices[0] < base.tp_prices[0]);
    }

    #[test]
    fn snap_moves_target_onto_wall() {
        let bids = vec![(95.5, 500.0), (94.0, 10.0)];
        let snapped = snap_to_liquidity(95.0, &bids);
        assert!((snapped - 95.5 * WALL_OFFSET).abs() < 1e-9);
    }

    #[test]
    fn snap_ignores_walls_outside_band() {
        let bids = vec![(80.0, 500.0)];
        let snapped = snap_to_liquidity(95.0, &bids);
        assert!((snapped - 95.0).abs() < 1e-9);
    }

    #[test]
    fn psychological_rounding_within_one_percent() {
        // 99.6 is within 1% of 100.
        assert!((round_to_psychological(99.6) - 100.0).abs() < 1e-9);
        // 0.0497 rounds to 0.05.
        assert!((round_to_psychological(0.0497) - 0.05).abs() < 1e-12);
        // 87.3 has no round number within 1%.
        assert!((round_to_psychological(87.3) - 87.0).abs() < 1e-9);
        // 53.7 — nearest candidates 50 and 54; 54 is within 1%.
        assert!((round_to_psychological(53.7) - 54.0).abs() < 1e-9);
    }

    #[test]
    fn late_entry_never_produces_targets_above_entry() {
        // Entry already halfway down the pump: the shallow fib levels sit
        // above it and must be clamped.
        let klines = minute_candles(106.0, 30, 0.5);
        let intel = CoinIntelligence::default();
        let mut input = inputs(&klines, &intel);
        input.entry_price = 106.0; // peak 112, start 100 => fib 38.2% at 107.4
        let levels = compute(&input);
        for tp in levels.tp_prices {
            assert!(tp <= 106.0 + 1e-9, "target {tp} above entry");
        }
        assert!(levels.sl_price > 106.0);
    }

    #[test]
    fn fibonacci_targets_from_pump_range() {
        // Entry at peak, multipliers neutral: targets are exactly the fib
        // retracements (modulo rounding).
        let klines = minute_candles(112.0, 30, 0.5);
        let intel = CoinIntelligence::default();
        let mut input = inputs(&klines, &intel);
        input.entry_price = 112.0;
        input.pump_elapsed_min = 8.0; // speed x1.0

        let levels = compute(&input);
        // range = 12; fib targets 107.416 / 106.0 / 104.584, each possibly
        // pulled <= 1% by the psychological rounding step.
        assert!((levels.tp_prices[2] - 107.416).abs() < 0.6);
        assert!((levels.tp_prices[1] - 106.0).abs() < 0.6);
        assert!((levels.tp_prices[0] - 104.584).abs() < 0.6);
    }
}
