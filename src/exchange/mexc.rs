// =============================================================================
// MEXC Contract REST Adapter
// =============================================================================
//
// Thin adapter over the public MEXC perpetual-futures endpoints. No
// authentication: every endpoint the engine needs is public.
//
// The shared reqwest client caps idle connections per host and keeps them
// alive for the configured window, so a burst of concurrent analyzer
// fetches re-uses sockets instead of exhausting the exchange.
//
// Response envelope: `{ "success": bool, "data": ... }`.
// =============================================================================

use std::collections::HashMap;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, warn};

use crate::exchange::{FundingInfo, MarketFeed, OpenInterestInfo, OrderbookDepth, TickerEntry};
use crate::market_data::{Candle, KlineInterval};
use crate::runtime_config::ExchangeParams;

/// REST client for the MEXC contract API.
#[derive(Clone)]
pub struct MexcFeed {
    base_url: String,
    client: reqwest::Client,
}

impl MexcFeed {
    /// Build a feed from the exchange configuration.
    pub fn new(params: &ExchangeParams) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(params.request_timeout_secs))
            .pool_max_idle_per_host(params.max_connections_per_host)
            .pool_idle_timeout(std::time::Duration::from_secs(params.keepalive_secs))
            .build()
            .context("failed to build reqwest client for MexcFeed")?;

        debug!(base_url = %params.rest_endpoint, "MexcFeed initialised");

        Ok(Self {
            base_url: params.rest_endpoint.clone(),
            client,
        })
    }

    /// GET a contract endpoint and unwrap the `{success, data}` envelope.
    async fn get_data(&self, path: &str) -> Result<serde_json::Value> {
        let url = format!("{}{}", self.base_url, path);

        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("GET {path} request failed"))?;

        let status = resp.status();
        let body: serde_json::Value = resp
            .json()
            .await
            .with_context(|| format!("failed to parse {path} response"))?;

        if !status.is_success() {
            anyhow::bail!("MEXC GET {} returned {}: {}", path, status, body);
        }

        if !body["success"].as_bool().unwrap_or(false) {
            anyhow::bail!("MEXC GET {} returned success=false: {}", path, body);
        }

        Ok(body["data"].clone())
    }

    /// Parse a JSON value that may be either a string or a number into `f64`.
    fn json_f64(val: &serde_json::Value) -> f64 {
        if let Some(n) = val.as_f64() {
            n
        } else if let Some(s) = val.as_str() {
            s.parse().unwrap_or(0.0)
        } else {
            0.0
        }
    }

    fn parse_ticker(entry: &serde_json::Value, now_ms: i64) -> Option<(String, TickerEntry)> {
        let symbol = entry["symbol"].as_str()?.to_string();
        let last_price = Self::json_f64(&entry["lastPrice"]);
        if last_price <= 0.0 {
            return None;
        }
        let ticker = TickerEntry {
            last_price,
            volume_24h: Self::json_f64(&entry["volume24"]),
            change_24h_pct: Self::json_f64(&entry["riseFallRate"]) * 100.0,
            ts_ms: entry["timestamp"].as_i64().unwrap_or(now_ms),
        };
        Some((symbol, ticker))
    }

    fn parse_levels(raw: &serde_json::Value) -> Vec<(f64, f64)> {
        raw.as_array()
            .map(|levels| {
                levels
                    .iter()
                    .filter_map(|lvl| {
                        let arr = lvl.as_array()?;
                        let price = Self::json_f64(arr.first()?);
                        let qty = Self::json_f64(arr.get(1)?);
                        (price > 0.0 && qty > 0.0).then_some((price, qty))
                    })
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[async_trait]
impl MarketFeed for MexcFeed {
    async fn list_symbols(&self) -> Result<Vec<String>> {
        let data = self.get_data("/api/v1/contract/detail").await?;

        let symbols: Vec<String> = data
            .as_array()
            .context("contract detail response is not an array")?
            .iter()
            .filter_map(|c| c["symbol"].as_str().map(str::to_string))
            .collect();

        debug!(count = symbols.len(), "contract symbols listed");
        Ok(symbols)
    }

    async fn batch_ticker(&self) -> Result<HashMap<String, TickerEntry>> {
        let data = self.get_data("/api/v1/contract/ticker").await?;
        let now_ms = Utc::now().timestamp_millis();

        let tickers: HashMap<String, TickerEntry> = data
            .as_array()
            .context("ticker response is not an array")?
            .iter()
            .filter_map(|entry| Self::parse_ticker(entry, now_ms))
            .collect();

        debug!(count = tickers.len(), "batch ticker fetched");
        Ok(tickers)
    }

    async fn ticker(&self, symbol: &str) -> Result<TickerEntry> {
        let data = self
            .get_data(&format!("/api/v1/contract/ticker?symbol={symbol}"))
            .await?;
        let now_ms = Utc::now().timestamp_millis();

        Self::parse_ticker(&data, now_ms)
            .map(|(_, t)| t)
            .with_context(|| format!("malformed ticker for {symbol}"))
    }

    async fn klines(
        &self,
        symbol: &str,
        interval: KlineInterval,
        limit: usize,
    ) -> Result<Vec<Candle>> {
        let data = self
            .get_data(&format!(
                "/api/v1/contract/kline/{symbol}?interval={}&limit={limit}",
                interval.api_token()
            ))
            .await?;

        // MEXC returns either a column-oriented object or an array of rows.
        let mut candles = Vec::new();

        if let Some(rows) = data.as_array() {
            for row in rows {
                let Some(ts) = row["time"].as_i64() else {
                    warn!(symbol, "skipping kline row without time field");
                    continue;
                };
                candles.push(Candle::new(
                    ts * 1000,
                    Self::json_f64(&row["open"]),
                    Self::json_f64(&row["high"]),
                    Self::json_f64(&row["low"]),
                    Self::json_f64(&row["close"]),
                    Self::json_f64(&row["vol"]),
                ));
            }
        } else if data["time"].is_array() {
            let times = data["time"].as_array().cloned().unwrap_or_default();
            let get = |name: &str, i: usize| {
                data[name]
                    .as_array()
                    .and_then(|a| a.get(i))
                    .map(Self::json_f64)
                    .unwrap_or(0.0)
            };
            for (i, t) in times.iter().enumerate() {
                let ts = t.as_i64().unwrap_or(0);
                candles.push(Candle::new(
                    ts * 1000,
                    get("open", i),
                    get("high", i),
                    get("low", i),
                    get("close", i),
                    get("vol", i),
                ));
            }
        }

        candles.sort_by_key(|c| c.ts_ms);
        debug!(symbol, interval = %interval, count = candles.len(), "klines fetched");
        Ok(candles)
    }

    async fn orderbook(&self, symbol: &str, limit: usize) -> Result<OrderbookDepth> {
        let data = self
            .get_data(&format!("/api/v1/contract/depth/{symbol}?limit={limit}"))
            .await?;

        let depth = OrderbookDepth {
            bids: Self::parse_levels(&data["bids"]),
            asks: Self::parse_levels(&data["asks"]),
        };

        debug!(
            symbol,
            bids = depth.bids.len(),
            asks = depth.asks.len(),
            "orderbook fetched"
        );
        Ok(depth)
    }

    async fn funding_rate(&self, symbol: &str) -> Result<FundingInfo> {
        let data = self
            .get_data(&format!("/api/v1/contract/funding_rate/{symbol}"))
            .await?;

        Ok(FundingInfo {
            rate: Self::json_f64(&data["fundingRate"]),
            next_settle_ts: data["nextSettleTime"].as_i64().unwrap_or(0),
        })
    }

    async fn open_interest(&self, symbol: &str) -> Result<OpenInterestInfo> {
        // The contract API exposes OI only on the detail endpoint.
        let data = self.get_data("/api/v1/contract/detail").await?;

        let contract = data
            .as_array()
            .context("contract detail response is not an array")?
            .iter()
            .find(|c| c["symbol"].as_str() == Some(symbol))
            .with_context(|| format!("symbol {symbol} not found in contract detail"))?;

        Ok(OpenInterestInfo {
            contracts: Self::json_f64(&contract["positionSize"]),
            contract_size: {
                let size = Self::json_f64(&contract["contractSize"]);
                if size > 0.0 {
                    size
                } else {
                    1.0
                }
            },
        })
    }
}

impl std::fmt::Debug for MexcFeed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MexcFeed")
            .field("base_url", &self.base_url)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_f64_accepts_strings_and_numbers() {
        assert!((MexcFeed::json_f64(&serde_json::json!("1.5")) - 1.5).abs() < 1e-9);
        assert!((MexcFeed::json_f64(&serde_json::json!(2.5)) - 2.5).abs() < 1e-9);
        assert!((MexcFeed::json_f64(&serde_json::json!(null)) - 0.0).abs() < 1e-9);
    }

    #[test]
    fn parse_ticker_rejects_zero_price() {
        let entry = serde_json::json!({
            "symbol": "BTC_USDT",
            "lastPrice": 0.0,
            "volume24": 100.0,
            "riseFallRate": 0.01
        });
        assert!(MexcFeed::parse_ticker(&entry, 0).is_none());
    }

    #[test]
    fn parse_ticker_converts_rate_to_pct() {
        let entry = serde_json::json!({
            "symbol": "BTC_USDT",
            "lastPrice": "50000.5",
            "volume24": "123.0",
            "riseFallRate": "-0.031",
            "timestamp": 1_700_000_000_000_i64
        });
        let (sym, t) = MexcFeed::parse_ticker(&entry, 0).unwrap();
        assert_eq!(sym, "BTC_USDT");
        assert!((t.last_price - 50000.5).abs() < 1e-9);
        assert!((t.change_24h_pct + 3.1).abs() < 1e-9);
        assert_eq!(t.ts_ms, 1_700_000_000_000);
    }

    #[test]
    fn parse_levels_skips_malformed_rows() {
        let raw = serde_json::json!([[100.0, 2.0], [99.5], "junk", [98.0, 0.0], [97.0, 1.5]]);
        let levels = MexcFeed::parse_levels(&raw);
        assert_eq!(levels.len(), 2);
        assert!((levels[0].0 - 100.0).abs() < 1e-9);
        assert!((levels[1].0 - 97.0).abs() < 1e-9);
    }
}
