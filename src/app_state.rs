// =============================================================================
// Central Engine State — Meridian Short Sentinel
// =============================================================================
//
// The single source of truth for the engine. Subsystems manage their own
// interior mutability; `EngineState` ties them together and carries the
// small shared tables (cooldowns, OI history, active monitors) plus the
// counters behind the status/stats text surfaces.
//
// Thread safety:
//   - Atomic counters for lock-free statistics.
//   - parking_lot::RwLock for the shared mutable tables (small per-symbol
//     critical sections).
//   - Arc wrappers for subsystems with their own interior state.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tokio::task::JoinHandle;

use crate::analyzers::OiHistory;
use crate::broadcast::Broadcaster;
use crate::exchange::MarketFeed;
use crate::market_data::SnapshotStore;
use crate::memory::MemoryHandle;
use crate::runtime_config::RuntimeConfig;
use crate::tracker::OutcomeTracker;
use crate::types::PumpKind;

/// Per-symbol debounce and serialization state.
#[derive(Debug, Clone, Default)]
pub struct CooldownEntry {
    pub last_notified_peak: f64,
    pub last_notified_tier: Option<PumpKind>,
    pub last_notify_time: Option<DateTime<Utc>>,
    pub last_signal_time: Option<DateTime<Utc>>,
    pub last_no_signal_notify_time: Option<DateTime<Utc>>,
    /// At most one monitoring actor per symbol.
    pub active_analysis: bool,
    /// Identifies the run holding the flag, so a replaced actor's cleanup
    /// cannot release its successor's claim.
    pub active_run_id: u64,
}

/// Central engine state shared across all async tasks via `Arc<EngineState>`.
pub struct EngineState {
    pub config: Arc<RwLock<RuntimeConfig>>,

    // ── Market data ─────────────────────────────────────────────────────
    pub snapshots: Arc<SnapshotStore>,
    pub feed: Arc<dyn MarketFeed>,

    // ── Outbound ────────────────────────────────────────────────────────
    pub broadcaster: Arc<dyn Broadcaster>,

    // ── Learning / tracking ─────────────────────────────────────────────
    pub memory: MemoryHandle,
    pub tracker: Arc<OutcomeTracker>,

    // ── Shared tables ───────────────────────────────────────────────────
    pub cooldowns: RwLock<HashMap<String, CooldownEntry>>,
    pub oi_history: OiHistory,
    /// Running monitor tasks by symbol (run id + handle); the REPLACED
    /// transition aborts the stored handle.
    pub monitors: RwLock<HashMap<String, (u64, JoinHandle<()>)>>,

    // ── Statistics ──────────────────────────────────────────────────────
    pub scan_count: AtomicU64,
    pub pump_count: AtomicU64,
    pub signal_count: AtomicU64,
    pub start_time: std::time::Instant,
}

impl EngineState {
    pub fn new(
        config: RuntimeConfig,
        feed: Arc<dyn MarketFeed>,
        broadcaster: Arc<dyn Broadcaster>,
        memory: MemoryHandle,
        tracker: Arc<OutcomeTracker>,
    ) -> Self {
        let retention = config.retention_minutes;
        Self {
            config: Arc::new(RwLock::new(config)),
            snapshots: Arc::new(SnapshotStore::new(retention)),
            feed,
            broadcaster,
            memory,
            tracker,
            cooldowns: RwLock::new(HashMap::new()),
            oi_history: Arc::new(RwLock::new(HashMap::new())),
            monitors: RwLock::new(HashMap::new()),
            scan_count: AtomicU64::new(0),
            pump_count: AtomicU64::new(0),
            signal_count: AtomicU64::new(0),
            start_time: std::time::Instant::now(),
        }
    }

    // ── Counters ────────────────────────────────────────────────────────

    pub fn record_scan(&self) -> u64 {
        self.scan_count.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn record_pump(&self) {
        self.pump_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_signal_emitted(&self) {
        self.signal_count.fetch_add(1, Ordering::Relaxed);
    }

    // ── Text surfaces ───────────────────────────────────────────────────

    /// Status block for the chat surface.
    pub fn render_status(&self) -> String {
        let config = self.config.read();
        let uptime_min = self.start_time.elapsed().as_secs() / 60;

        format!(
            "📊 Status\n\n\
             Uptime: {} min\n\
             Scans: {}\n\
             Pumps detected: {}\n\
             Signals emitted: {}\n\
             Symbols tracked: {}\n\
             Active monitors: {}\n\
             Outcomes in flight: {}\n\n\
             Poll interval: {} ms\n\
             FAST: ≥{:.0}% in {:.0} min | ELITE: ≥{:.0}% in {:.0} min",
            uptime_min,
            self.scan_count.load(Ordering::Relaxed),
            self.pump_count.load(Ordering::Relaxed),
            self.signal_count.load(Ordering::Relaxed),
            self.snapshots.symbol_count(),
            self.monitors.read().len(),
            self.tracker.active_count(),
            config.poll_interval_ms,
            config.detection.fast_threshold_pct,
            config.detection.fast_window_min,
            config.detection.elite_threshold_pct,
            config.detection.elite_window_min,
        )
    }

    /// Learning statistics block for the chat surface.
    pub fn render_stats(&self) -> String {
        let stats = self.memory.stats();
        format!(
            "🧠 Learning stats\n\n\
             Signals recorded: {}\n\
             Finalized: {}\n\
             Wins: {} | Losses: {}\n\
             Win rate: {:.0}%\n\
             Symbols with history: {}\n\
             Classifier: {} ({} samples)",
            stats.total_signals,
            stats.finalized,
            stats.wins,
            stats.losses,
            stats.win_rate * 100.0,
            stats.unique_symbols,
            if stats.classifier_trained {
                "trained"
            } else {
                "untrained"
            },
            stats.classifier_samples,
        )
    }
}
