// =============================================================================
// Orderbook Pressure Analyzer
// =============================================================================
//
// Reads the depth snapshot fetched for this signal attempt:
//
//   1. Depth bands — aggregated bid vs ask volume within ±{0.5, 1, 2, 5}% of
//      the current price.
//   2. Walls — single orders holding at least `wall_threshold_pct` of their
//      side's total volume.
//   3. Imbalance — (bid − ask) / (bid + ask) over the full book.
//   4. Spread health — EXCELLENT .. ILLIQUID bands on the top-of-book spread.
//
// Higher score when aggregated bids < aggregated asks: sellers dominate the
// book, which favors the short.

use serde::Serialize;

use crate::analyzers::{AnalyzerContext, AnalyzerDetail, AnalyzerKind, AnalyzerOutcome};
use crate::exchange::OrderbookDepth;

/// Depth bands evaluated around the current price, percent.
const DEPTH_BANDS_PCT: [f64; 4] = [0.5, 1.0, 2.0, 5.0];

/// Top-of-book spread quality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SpreadHealth {
    Excellent,
    Good,
    Normal,
    Wide,
    Illiquid,
}

/// A single resting order large enough to block movement.
#[derive(Debug, Clone, Serialize)]
pub struct Wall {
    pub price: f64,
    pub quantity: f64,
    /// Share of the side's total volume, percent.
    pub pct_of_side: f64,
}

/// Volume aggregated within one band of the current price.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct DepthBand {
    pub band_pct: f64,
    pub bid_volume: f64,
    pub ask_volume: f64,
}

/// Full orderbook-pressure detail.
#[derive(Debug, Clone, Serialize)]
pub struct OrderbookPressure {
    pub bands: Vec<DepthBand>,
    /// (total_bid − total_ask) / (total_bid + total_ask), in [−1, +1].
    pub imbalance: f64,
    pub total_bid: f64,
    pub total_ask: f64,
    pub sell_walls: Vec<Wall>,
    pub buy_walls: Vec<Wall>,
    pub spread_pct: f64,
    pub spread_health: SpreadHealth,
}

pub fn analyze(ctx: &AnalyzerContext) -> AnalyzerOutcome {
    let Some(book) = ctx.orderbook.as_ref() else {
        return AnalyzerOutcome::neutral(AnalyzerKind::Orderbook);
    };
    if book.bids.is_empty() || book.asks.is_empty() {
        return AnalyzerOutcome::neutral(AnalyzerKind::Orderbook);
    }

    let current_price = ctx.pump.current_price;
    if current_price <= 0.0 {
        return AnalyzerOutcome::neutral(AnalyzerKind::Orderbook);
    }

    let pressure = measure(book, current_price, ctx.params.wall_threshold_pct);
    let score = score(&pressure);

    AnalyzerOutcome::new(
        AnalyzerKind::Orderbook,
        score,
        AnalyzerDetail::Orderbook(pressure),
    )
}

fn measure(book: &OrderbookDepth, current_price: f64, wall_threshold_pct: f64) -> OrderbookPressure {
    let total_bid: f64 = book.bids.iter().map(|(_, q)| q).sum();
    let total_ask: f64 = book.asks.iter().map(|(_, q)| q).sum();

    let bands = DEPTH_BANDS_PCT
        .iter()
        .map(|&band_pct| {
            let bid_floor = current_price * (1.0 - band_pct / 100.0);
            let ask_ceiling = current_price * (1.0 + band_pct / 100.0);
            DepthBand {
                band_pct,
                bid_volume: book
                    .bids
                    .iter()
                    .filter(|(p, _)| *p >= bid_floor)
                    .map(|(_, q)| q)
                    .sum(),
                ask_volume: book
                    .asks
                    .iter()
                    .filter(|(p, _)| *p <= ask_ceiling)
                    .map(|(_, q)| q)
                    .sum(),
            }
        })
        .collect();

    let combined = total_bid + total_ask;
    let imbalance = if combined > 0.0 {
        (total_bid - total_ask) / combined
    } else {
        0.0
    };

    let spread_pct = {
        let best_bid = book.bids.first().map(|(p, _)| *p).unwrap_or(0.0);
        let best_ask = book.asks.first().map(|(p, _)| *p).unwrap_or(0.0);
        if best_bid > 0.0 && best_ask > 0.0 {
            (best_ask - best_bid) / current_price * 100.0
        } else {
            0.0
        }
    };

    OrderbookPressure {
        bands,
        imbalance,
        total_bid,
        total_ask,
        sell_walls: find_walls(&book.asks, total_ask, wall_threshold_pct),
        buy_walls: find_walls(&book.bids, total_bid, wall_threshold_pct),
        spread_pct,
        spread_health: classify_spread(spread_pct),
    }
}

fn find_walls(levels: &[(f64, f64)], side_total: f64, threshold_pct: f64) -> Vec<Wall> {
    if side_total <= 0.0 {
        return Vec::new();
    }
    let threshold = threshold_pct / 100.0 * side_total;

    let mut walls: Vec<Wall> = levels
        .iter()
        .filter(|(_, qty)| *qty >= threshold)
        .map(|&(price, quantity)| Wall {
            price,
            quantity,
            pct_of_side: quantity / side_total * 100.0,
        })
        .collect();

    walls.sort_by(|a, b| b.quantity.total_cmp(&a.quantity));
    walls.truncate(5);
    walls
}

fn classify_spread(spread_pct: f64) -> SpreadHealth {
    if spread_pct < 0.05 {
        SpreadHealth::Excellent
    } else if spread_pct < 0.1 {
        SpreadHealth::Good
    } else if spread_pct < 0.3 {
        SpreadHealth::Normal
    } else if spread_pct < 1.0 {
        SpreadHealth::Wide
    } else {
        SpreadHealth::Illiquid
    }
}

fn score(p: &OrderbookPressure) -> f64 {
    let mut score = 5.0;

    // Bid/ask dominance: fewer bids than asks favors the short.
    let ratio = if p.total_ask > 0.0 {
        p.total_bid / p.total_ask
    } else {
        1.0
    };
    if ratio < 0.7 {
        score += 2.0;
    } else if ratio < 0.9 {
        score += 1.0;
    } else if ratio > 1.3 {
        score -= 2.0;
    } else if ratio > 1.1 {
        score -= 1.0;
    }

    // Sell walls cap the upside.
    if p.sell_walls.len() >= 2 {
        score += 2.0;
    } else if !p.sell_walls.is_empty() {
        score += 1.0;
    }
    for wall in &p.sell_walls {
        if wall.pct_of_side >= 10.0 {
            score += 0.5;
        }
    }

    // Overall imbalance.
    if p.imbalance < -0.3 {
        score += 1.5;
    } else if p.imbalance < -0.1 {
        score += 0.5;
    } else if p.imbalance > 0.3 {
        score -= 1.5;
    } else if p.imbalance > 0.1 {
        score -= 0.5;
    }

    // Illiquid books make exits unreliable.
    match p.spread_health {
        SpreadHealth::Illiquid => score -= 1.0,
        SpreadHealth::Wide => score -= 0.5,
        _ => {}
    }

    score
}
