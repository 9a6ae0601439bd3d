// =============================================================================
// Signal Memory Store — durable SQLite log of signals and outcomes
// =============================================================================
//
// Two tables:
//
//   signal_memory     — one row per emitted signal: pump parameters, all ten
//                       analyzer scores, levels, and the outcome fields
//                       (NULL until finalization). Indexed by
//                       (symbol, created_at) and final_result.
//   coin_intelligence — one row per symbol holding the derived aggregate as
//                       JSON. Write-through snapshot; the in-memory cache is
//                       rebuilt from signal_memory rows at startup, so the
//                       aggregate stays reproducible by replay.
//
// The store is blocking (rusqlite) and is only ever touched from the memory
// writer thread.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use tracing::info;

use crate::analyzers::AnalyzerScores;
use crate::memory::{MemoryRow, OutcomeData, Signal};
use crate::memory::intelligence::CoinIntelligence;
use crate::types::{FinalResult, PumpKind, Tier};

pub struct MemoryStore {
    conn: Connection,
}

impl MemoryStore {
    /// Open (and migrate) the store at `path`, creating parent directories.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("failed to create data dir {}", dir.display()))?;
        }

        let conn = Connection::open(path)
            .with_context(|| format!("failed to open memory store at {}", path.display()))?;

        let store = Self { conn };
        store.init_schema()?;
        info!(path = %path.display(), "signal memory store opened");
        Ok(store)
    }

    /// In-memory store for tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("failed to open in-memory store")?;
        let store = Self { conn };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<()> {
        self.conn
            .execute_batch(
                "CREATE TABLE IF NOT EXISTS signal_memory (
                    id                 TEXT PRIMARY KEY,
                    symbol             TEXT NOT NULL,
                    created_at         TEXT NOT NULL,
                    kind               TEXT NOT NULL,
                    pump_pct           REAL NOT NULL,
                    pump_speed_minutes REAL NOT NULL,
                    entry_price        REAL NOT NULL,
                    peak_price         REAL NOT NULL,
                    start_price        REAL NOT NULL,

                    orderbook_score        REAL NOT NULL DEFAULT 5.0,
                    open_interest_score    REAL NOT NULL DEFAULT 5.0,
                    funding_score          REAL NOT NULL DEFAULT 5.0,
                    liquidation_score      REAL NOT NULL DEFAULT 5.0,
                    btc_correlation_score  REAL NOT NULL DEFAULT 5.0,
                    multi_timeframe_score  REAL NOT NULL DEFAULT 5.0,
                    volume_profile_score   REAL NOT NULL DEFAULT 5.0,
                    cross_pair_score       REAL NOT NULL DEFAULT 5.0,
                    precision_score        REAL NOT NULL DEFAULT 5.0,
                    candle_structure_score REAL NOT NULL DEFAULT 5.0,

                    combined_score REAL NOT NULL DEFAULT 5.0,
                    ml_probability REAL,
                    tier           TEXT NOT NULL,

                    sl_price  REAL NOT NULL,
                    tp1_price REAL NOT NULL,
                    tp2_price REAL NOT NULL,
                    tp3_price REAL NOT NULL,

                    price_5m  REAL,
                    price_15m REAL,
                    price_30m REAL,
                    price_1h  REAL,
                    price_4h  REAL,

                    hit_tp1 INTEGER NOT NULL DEFAULT 0,
                    hit_tp2 INTEGER NOT NULL DEFAULT 0,
                    hit_tp3 INTEGER NOT NULL DEFAULT 0,
                    hit_sl  INTEGER NOT NULL DEFAULT 0,

                    max_profit_pct   REAL,
                    max_drawdown_pct REAL,
                    final_result     TEXT
                );
                CREATE INDEX IF NOT EXISTS idx_memory_symbol_created
                    ON signal_memory(symbol, created_at);
                CREATE INDEX IF NOT EXISTS idx_memory_result
                    ON signal_memory(final_result);

                CREATE TABLE IF NOT EXISTS coin_intelligence (
                    symbol     TEXT PRIMARY KEY,
                    payload    TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );",
            )
            .context("failed to initialise memory schema")?;
        Ok(())
    }

    /// Append a freshly emitted signal (outcome fields left NULL).
    pub fn insert_signal(&self, signal: &Signal) -> Result<()> {
        let s = signal.scores.as_array();
        self.conn
            .execute(
                "INSERT OR IGNORE INTO signal_memory (
                    id, symbol, created_at, kind, pump_pct, pump_speed_minutes,
                    entry_price, peak_price, start_price,
                    orderbook_score, open_interest_score, funding_score,
                    liquidation_score, btc_correlation_score, multi_timeframe_score,
                    volume_profile_score, cross_pair_score, precision_score,
                    candle_structure_score,
                    combined_score, ml_probability, tier,
                    sl_price, tp1_price, tp2_price, tp3_price
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13,
                          ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24,
                          ?25, ?26)",
                params![
                    signal.id,
                    signal.symbol,
                    signal.created_at.to_rfc3339(),
                    signal.kind.to_string(),
                    signal.pump_pct,
                    signal.pump_speed_minutes,
                    signal.entry_price,
                    signal.peak_price,
                    signal.start_price,
                    s[0],
                    s[1],
                    s[2],
                    s[3],
                    s[4],
                    s[5],
                    s[6],
                    s[7],
                    s[8],
                    s[9],
                    signal.combined_score,
                    signal.ml_probability,
                    signal.tier.to_string(),
                    signal.sl_price,
                    signal.tp1(),
                    signal.tp2(),
                    signal.tp3(),
                ],
            )
            .with_context(|| format!("failed to insert signal {}", signal.id))?;
        Ok(())
    }

    /// Fill the outcome fields for a signal. First writer wins: returns
    /// `false` without touching the row when the signal is already
    /// finalized (or unknown), keeping outcomes monotonic.
    pub fn update_outcome(&self, signal_id: &str, outcome: &OutcomeData) -> Result<bool> {
        let changed = self
            .conn
            .execute(
                "UPDATE signal_memory SET
                    price_5m = ?2, price_15m = ?3, price_30m = ?4,
                    price_1h = ?5, price_4h = ?6,
                    hit_tp1 = ?7, hit_tp2 = ?8, hit_tp3 = ?9, hit_sl = ?10,
                    max_profit_pct = ?11, max_drawdown_pct = ?12,
                    final_result = ?13
                 WHERE id = ?1 AND final_result IS NULL",
                params![
                    signal_id,
                    outcome.price_5m,
                    outcome.price_15m,
                    outcome.price_30m,
                    outcome.price_1h,
                    outcome.price_4h,
                    outcome.hit_tp1,
                    outcome.hit_tp2,
                    outcome.hit_tp3,
                    outcome.hit_sl,
                    outcome.max_profit_pct,
                    outcome.max_drawdown_pct,
                    outcome.final_result.as_str(),
                ],
            )
            .with_context(|| format!("failed to update outcome for {signal_id}"))?;
        Ok(changed > 0)
    }

    /// All rows ordered by creation time (oldest first).
    pub fn load_rows(&self) -> Result<Vec<MemoryRow>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, symbol, created_at, kind, pump_pct, pump_speed_minutes,
                        entry_price, peak_price, start_price,
                        orderbook_score, open_interest_score, funding_score,
                        liquidation_score, btc_correlation_score,
                        multi_timeframe_score, volume_profile_score,
                        cross_pair_score, precision_score, candle_structure_score,
                        combined_score, ml_probability, tier,
                        sl_price, tp1_price, tp2_price, tp3_price,
                        price_5m, price_15m, price_30m, price_1h, price_4h,
                        hit_tp1, hit_tp2, hit_tp3, hit_sl,
                        max_profit_pct, max_drawdown_pct, final_result
                 FROM signal_memory ORDER BY created_at ASC",
            )
            .context("failed to prepare row query")?;

        let rows = stmt
            .query_map([], |row| {
                let created_at: String = row.get(2)?;
                let kind: String = row.get(3)?;
                let tier: String = row.get(21)?;
                let final_result: Option<String> = row.get(37)?;

                let scores = AnalyzerScores {
                    orderbook: row.get(9)?,
                    open_interest: row.get(10)?,
                    funding: row.get(11)?,
                    liquidation: row.get(12)?,
                    btc_correlation: row.get(13)?,
                    multi_timeframe: row.get(14)?,
                    volume_profile: row.get(15)?,
                    cross_pair: row.get(16)?,
                    precision: row.get(17)?,
                    candle_structure: row.get(18)?,
                };

                let tp1: f64 = row.get(23)?;
                let tp2: f64 = row.get(24)?;
                let tp3: f64 = row.get(25)?;

                let signal = Signal {
                    id: row.get(0)?,
                    symbol: row.get(1)?,
                    created_at: parse_timestamp(&created_at),
                    kind: parse_kind(&kind),
                    pump_pct: row.get(4)?,
                    pump_speed_minutes: row.get(5)?,
                    entry_price: row.get(6)?,
                    peak_price: row.get(7)?,
                    start_price: row.get(8)?,
                    scores,
                    combined_score: row.get(19)?,
                    ml_probability: row.get(20)?,
                    tier: parse_tier(&tier),
                    sl_price: row.get(22)?,
                    // Stored nearest-first; the array invariant is ascending.
                    tp_prices: [tp3, tp2, tp1],
                };

                let outcome = final_result
                    .as_deref()
                    .and_then(FinalResult::parse)
                    .map(|final_result| OutcomeData {
                        price_5m: row.get(26).ok().flatten(),
                        price_15m: row.get(27).ok().flatten(),
                        price_30m: row.get(28).ok().flatten(),
                        price_1h: row.get(29).ok().flatten(),
                        price_4h: row.get(30).ok().flatten(),
                        hit_tp1: row.get(31).unwrap_or(false),
                        hit_tp2: row.get(32).unwrap_or(false),
                        hit_tp3: row.get(33).unwrap_or(false),
                        hit_sl: row.get(34).unwrap_or(false),
                        max_profit_pct: row.get(35).ok().flatten().unwrap_or(0.0),
                        max_drawdown_pct: row.get(36).ok().flatten().unwrap_or(0.0),
                        final_result,
                    });

                Ok(MemoryRow::new(signal, outcome))
            })
            .context("failed to query memory rows")?
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("failed to decode memory rows")?;

        Ok(rows)
    }

    /// Write-through snapshot of a derived per-symbol aggregate.
    pub fn save_intelligence(&self, symbol: &str, intel: &CoinIntelligence) -> Result<()> {
        let payload =
            serde_json::to_string(intel).context("failed to serialise coin intelligence")?;
        self.conn
            .execute(
                "INSERT INTO coin_intelligence (symbol, payload, updated_at)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(symbol) DO UPDATE SET
                    payload = excluded.payload,
                    updated_at = excluded.updated_at",
                params![symbol, payload, Utc::now().to_rfc3339()],
            )
            .with_context(|| format!("failed to save intelligence for {symbol}"))?;
        Ok(())
    }
}

fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn parse_kind(raw: &str) -> PumpKind {
    match raw {
        "ELITE" => PumpKind::Elite,
        _ => PumpKind::Fast,
    }
}

fn parse_tier(raw: &str) -> Tier {
    match raw {
        "A" => Tier::A,
        "B" => Tier::B,
        _ => Tier::Reject,
    }
}
