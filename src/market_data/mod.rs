// =============================================================================
// Market Data Module
// =============================================================================
//
// In-process market data for the engine:
// - Per-symbol snapshot series with adaptive (drift-head) insertion
// - OHLCV candle type shared by the analyzers and the level calculator,
//   plus the synthetic-candle fallback built from snapshots

pub mod candles;
pub mod snapshot_store;

pub use candles::{synthetic_klines, Candle, KlineInterval};
pub use snapshot_store::{Snapshot, SnapshotStore};
