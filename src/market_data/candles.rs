// =============================================================================
// Candles — OHLCV type, kline intervals, synthetic-candle fallback
// =============================================================================

use serde::{Deserialize, Serialize};

use crate::market_data::Snapshot;

/// A single OHLCV candle, oldest-first in every slice the engine passes
/// around.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candle {
    /// Open time in milliseconds since the UNIX epoch.
    pub ts_ms: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Candle {
    pub fn new(ts_ms: i64, open: f64, high: f64, low: f64, close: f64, volume: f64) -> Self {
        Self { ts_ms, open, high, low, close, volume }
    }

    /// Candle range (high − low).
    pub fn range(&self) -> f64 {
        self.high - self.low
    }

    /// Absolute body size.
    pub fn body(&self) -> f64 {
        (self.close - self.open).abs()
    }

    /// Upper wick length.
    pub fn upper_wick(&self) -> f64 {
        self.high - self.open.max(self.close)
    }

    pub fn is_bearish(&self) -> bool {
        self.close < self.open
    }
}

/// Kline intervals supported by the contract API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KlineInterval {
    Min1,
    Min5,
    Min15,
    Min60,
    Hour4,
}

impl KlineInterval {
    /// The interval token the exchange REST API expects.
    pub fn api_token(self) -> &'static str {
        match self {
            Self::Min1 => "Min1",
            Self::Min5 => "Min5",
            Self::Min15 => "Min15",
            Self::Min60 => "Min60",
            Self::Hour4 => "Hour4",
        }
    }
}

impl std::fmt::Display for KlineInterval {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Min1 => write!(f, "1m"),
            Self::Min5 => write!(f, "5m"),
            Self::Min15 => write!(f, "15m"),
            Self::Min60 => write!(f, "1h"),
            Self::Hour4 => write!(f, "4h"),
        }
    }
}

/// Build synthetic 1-minute candles from a snapshot series.
///
/// Fallback for symbols where the exchange returns no klines (fresh listings
/// mostly): snapshots are bucketed per minute and each bucket becomes one
/// OHLCV candle. Volume is the bucket mean since ticker volume is a rolling
/// 24 h figure, not per-trade.
pub fn synthetic_klines(snapshots: &[Snapshot]) -> Vec<Candle> {
    if snapshots.is_empty() {
        return Vec::new();
    }

    let mut candles: Vec<Candle> = Vec::new();

    for snap in snapshots {
        let minute_ts = snap.ts_ms / 60_000 * 60_000;

        match candles.last_mut() {
            Some(last) if last.ts_ms == minute_ts => {
                last.high = last.high.max(snap.price);
                last.low = last.low.min(snap.price);
                last.close = snap.price;
                // Running mean of the bucket's volumes.
                last.volume = (last.volume + snap.volume) / 2.0;
            }
            _ => {
                candles.push(Candle::new(
                    minute_ts,
                    snap.price,
                    snap.price,
                    snap.price,
                    snap.price,
                    snap.volume,
                ));
            }
        }
    }

    candles
}
