// =============================================================================
// Exchange Module — abstract market feed + concrete MEXC contract adapter
// =============================================================================
//
// The core consumes the `MarketFeed` trait; one concrete adapter exists per
// exchange. Keeping the seam here lets every monitor/analyzer/tracker test
// run against an in-memory mock instead of the network.

pub mod mexc;

use std::collections::HashMap;

use async_trait::async_trait;

use crate::market_data::{Candle, KlineInterval};

pub use mexc::MexcFeed;

/// One row of the batch ticker response.
#[derive(Debug, Clone, Copy)]
pub struct TickerEntry {
    pub last_price: f64,
    pub volume_24h: f64,
    /// 24 h change as a percentage (+5.0 = up five percent).
    pub change_24h_pct: f64,
    pub ts_ms: i64,
}

/// Aggregated orderbook depth, best levels first.
#[derive(Debug, Clone, Default)]
pub struct OrderbookDepth {
    /// (price, quantity), descending price.
    pub bids: Vec<(f64, f64)>,
    /// (price, quantity), ascending price.
    pub asks: Vec<(f64, f64)>,
}

/// Current funding rate for a perpetual contract.
#[derive(Debug, Clone, Copy)]
pub struct FundingInfo {
    /// Raw rate as a decimal (0.0001 = 0.01 %).
    pub rate: f64,
    /// Timestamp (ms) of the next funding settlement.
    pub next_settle_ts: i64,
}

impl FundingInfo {
    pub fn rate_pct(&self) -> f64 {
        self.rate * 100.0
    }
}

/// Open interest snapshot.
#[derive(Debug, Clone, Copy)]
pub struct OpenInterestInfo {
    /// Outstanding contracts.
    pub contracts: f64,
    pub contract_size: f64,
}

/// Read-only market data interface the engine consumes.
///
/// Implementations must be cheap to clone behind `Arc` and safe to call from
/// many tasks concurrently. Every method carries its own network timeout;
/// errors are transient and the caller simply tries again next tick.
#[async_trait]
pub trait MarketFeed: Send + Sync {
    /// All listed contract symbols.
    async fn list_symbols(&self) -> anyhow::Result<Vec<String>>;

    /// Every symbol's latest price/volume in one request.
    async fn batch_ticker(&self) -> anyhow::Result<HashMap<String, TickerEntry>>;

    /// Latest ticker for a single symbol.
    async fn ticker(&self, symbol: &str) -> anyhow::Result<TickerEntry>;

    /// OHLCV candles, oldest first.
    async fn klines(
        &self,
        symbol: &str,
        interval: KlineInterval,
        limit: usize,
    ) -> anyhow::Result<Vec<Candle>>;

    /// Orderbook depth snapshot.
    async fn orderbook(&self, symbol: &str, limit: usize) -> anyhow::Result<OrderbookDepth>;

    /// Current funding rate.
    async fn funding_rate(&self, symbol: &str) -> anyhow::Result<FundingInfo>;

    /// Current open interest.
    async fn open_interest(&self, symbol: &str) -> anyhow::Result<OpenInterestInfo>;
}
