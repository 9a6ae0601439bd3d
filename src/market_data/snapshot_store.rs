// =============================================================================
// Snapshot Store — per-symbol bounded price series with adaptive granularity
// =============================================================================
//
// The poll loop feeds every ticker into this store.  Insertion keeps fine
// resolution during fast moves and coarse resolution during calm periods by
// mutating the most-recent element in place (the "drift head") instead of
// appending, so the series never grows unbounded while nothing happens.
//
// Insertion rules, evaluated in order (Δp = |price − head.price| in percent,
// Δt = seconds since the previous *historical* snapshot):
//
//   empty series                  => append
//   single element and Δt > 1 s   => append
//   Δp >= 0.5 %                   => append (fast move — keep every tick)
//   Δp >= 0.2 % and Δt > 2 s      => append
//   Δt > 5 s                      => append
//   otherwise                     => overwrite the head in place (drift)
//
// After every insert, snapshots older than the retention window are pruned.
// The store never fails a call: all inputs are accepted.
// =============================================================================

use std::collections::HashMap;
use std::collections::VecDeque;

use parking_lot::RwLock;

/// One (timestamp, price, volume) observation. Immutable value; the head of a
/// series may be replaced wholesale under the drift rule.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Snapshot {
    /// Milliseconds since the UNIX epoch.
    pub ts_ms: i64,
    pub price: f64,
    pub volume: f64,
}

impl Snapshot {
    pub fn new(ts_ms: i64, price: f64, volume: f64) -> Self {
        Self { ts_ms, price, volume }
    }
}

/// Thread-safe per-symbol snapshot series.  Writes happen only from the poll
/// loop; reads come from many monitor tasks concurrently.
pub struct SnapshotStore {
    series: RwLock<HashMap<String, VecDeque<Snapshot>>>,
    /// Retention window in milliseconds.
    retention_ms: i64,
}

impl SnapshotStore {
    /// Create a store that retains `retention_minutes` of history per symbol.
    pub fn new(retention_minutes: i64) -> Self {
        Self {
            series: RwLock::new(HashMap::new()),
            retention_ms: retention_minutes * 60_000,
        }
    }

    /// Append-or-drift insertion followed by age-based pruning.
    ///
    /// Inserting a snapshot with the same timestamp as the head replaces the
    /// head (idempotent — no duplicate entries).
    pub fn insert(&self, symbol: &str, snap: Snapshot) {
        let mut map = self.series.write();
        let ring = map.entry(symbol.to_string()).or_default();

        if Self::should_append(ring, &snap) {
            ring.push_back(snap);
        } else if let Some(head) = ring.back_mut() {
            *head = snap;
        }

        // Prune by age against the just-inserted poll timestamp.
        let cutoff = snap.ts_ms - self.retention_ms;
        while ring.front().is_some_and(|s| s.ts_ms < cutoff) {
            ring.pop_front();
        }
    }

    fn should_append(ring: &VecDeque<Snapshot>, snap: &Snapshot) -> bool {
        let Some(head) = ring.back() else {
            return true;
        };

        // Same-timestamp re-insert drifts (idempotence).
        if snap.ts_ms == head.ts_ms {
            return false;
        }

        // Δt is measured against the previous *historical* element so a
        // drifting head cannot starve the series of real appends.
        let prev_historical = if ring.len() >= 2 {
            ring[ring.len() - 2]
        } else {
            *head
        };
        let dt_secs = (snap.ts_ms - prev_historical.ts_ms) as f64 / 1000.0;

        if ring.len() == 1 && dt_secs > 1.0 {
            return true;
        }

        let dp_pct = if head.price != 0.0 {
            (snap.price - head.price).abs() / head.price * 100.0
        } else {
            0.0
        };

        if dp_pct >= 0.5 {
            return true;
        }
        if dp_pct >= 0.2 && dt_secs > 2.0 {
            return true;
        }
        dt_secs > 5.0
    }

    /// Snapshots for `symbol` within the last `window_ms` milliseconds of the
    /// series head, oldest first.
    pub fn recent(&self, symbol: &str, window_ms: i64) -> Vec<Snapshot> {
        let map = self.series.read();
        match map.get(symbol) {
            Some(ring) => {
                let Some(head) = ring.back() else {
                    return Vec::new();
                };
                let cutoff = head.ts_ms - window_ms;
                ring.iter().filter(|s| s.ts_ms >= cutoff).copied().collect()
            }
            None => Vec::new(),
        }
    }

    /// The full retained series for `symbol`, oldest first.
    pub fn all(&self, symbol: &str) -> Vec<Snapshot> {
        let map = self.series.read();
        map.get(symbol)
            .map(|ring| ring.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Most recent snapshot for `symbol`, if any.
    pub fn latest(&self, symbol: &str) -> Option<Snapshot> {
        let map = self.series.read();
        map.get(symbol).and_then(|ring| ring.back().copied())
    }

    /// Number of retained snapshots for `symbol`.
    pub fn len(&self, symbol: &str) -> usize {
        let map = self.series.read();
        map.get(symbol).map_or(0, VecDeque::len)
    }

    /// Number of symbols currently tracked.
    pub fn symbol_count(&self) -> usize {
        self.series.read().len()
    }
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    fn snap(ts_ms: i64, price: f64) -> Snapshot {
        Snapshot::new(ts_ms, price, 10.0)
    }

    #[test]
    fn first_snapshot_appends() {
        let store = SnapshotStore::new(40);
        store.insert("BTC_USDT", snap(0, 100.0));
        assert_eq!(store.len("BTC_USDT"), 1);
    }

    #[test]
    fn second_snapshot_appends_after_one_second() {
        let store = SnapshotStore::new(40);
        store.insert("BTC_USDT", snap(0, 100.0));
        // 0.5s later with no price change — drifts.
        store.insert("BTC_USDT", snap(500, 100.0));
        assert_eq!(store.len("BTC_USDT"), 1);
        // >1s since the only element — appends.
        store.insert("BTC_USDT", snap(1_500, 100.0));
        assert_eq!(store.len("BTC_USDT"), 2);
    }

    #[test]
    fn big_move_appends_even_within_first_second() {
        let store = SnapshotStore::new(40);
        store.insert("X_USDT", snap(0, 100.0));
        // 0.8% jump only 300ms later still appends via the fast-move rule.
        store.insert("X_USDT", snap(300, 100.8));
        assert_eq!(store.len("X_USDT"), 2);
    }

    #[test]
    fn fast_move_keeps_every_tick() {
        let store = SnapshotStore::new(40);
        store.insert("X_USDT", snap(0, 100.0));
        store.insert("X_USDT", snap(1_100, 100.0));
        // 0.6% jumps 100ms apart — all appended.
        store.insert("X_USDT", snap(1_200, 100.6));
        store.insert("X_USDT", snap(1_300, 101.3));
        assert_eq!(store.len("X_USDT"), 4);
    }

    #[test]
    fn calm_period_drifts_head() {
        let store = SnapshotStore::new(40);
        store.insert("X_USDT", snap(0, 100.0));
        store.insert("X_USDT", snap(2_000, 100.0));
        let before = store.len("X_USDT");
        // Tiny move, 1s after the previous historical point — drift.
        store.insert("X_USDT", snap(3_000, 100.05));
        assert_eq!(store.len("X_USDT"), before);
        assert!((store.latest("X_USDT").unwrap().price - 100.05).abs() < 1e-9);
    }

    #[test]
    fn medium_move_appends_after_two_seconds() {
        let store = SnapshotStore::new(40);
        store.insert("X_USDT", snap(0, 100.0));
        store.insert("X_USDT", snap(1_100, 100.0));
        // 0.3% move, Δt (vs previous historical at t=0) > 2s — appends.
        store.insert("X_USDT", snap(3_200, 100.3));
        assert_eq!(store.len("X_USDT"), 3);
    }

    #[test]
    fn slow_heartbeat_appends_after_five_seconds() {
        let store = SnapshotStore::new(40);
        store.insert("X_USDT", snap(0, 100.0));
        store.insert("X_USDT", snap(1_100, 100.0));
        // No price move at all, but >5s elapsed — keeps a live tail.
        store.insert("X_USDT", snap(7_000, 100.0));
        assert_eq!(store.len("X_USDT"), 3);
    }

    #[test]
    fn identical_timestamp_is_idempotent() {
        let store = SnapshotStore::new(40);
        store.insert("X_USDT", snap(0, 100.0));
        store.insert("X_USDT", snap(1_100, 101.0));
        let before = store.len("X_USDT");
        store.insert("X_USDT", snap(1_100, 101.0));
        assert_eq!(store.len("X_USDT"), before);
    }

    #[test]
    fn pruning_respects_retention_window() {
        let store = SnapshotStore::new(40);
        let window_ms = 40 * 60_000;
        // One snapshot every 6s for 50 minutes (always appends via the 5s rule).
        let mut ts = 0i64;
        while ts <= 50 * 60_000 {
            store.insert("X_USDT", snap(ts, 100.0));
            ts += 6_000;
        }
        let all = store.all("X_USDT");
        let oldest = all.first().unwrap().ts_ms;
        let newest = all.last().unwrap().ts_ms;
        assert!(newest - oldest <= window_ms, "series spans beyond retention");
    }

    #[test]
    fn recent_restricts_to_window() {
        let store = SnapshotStore::new(40);
        for i in 0..10 {
            store.insert("X_USDT", snap(i * 60_000, 100.0 + i as f64));
        }
        let recent = store.recent("X_USDT", 3 * 60_000);
        assert!(!recent.is_empty());
        let head_ts = store.latest("X_USDT").unwrap().ts_ms;
        for s in &recent {
            assert!(head_ts - s.ts_ms <= 3 * 60_000);
        }
    }

    #[test]
    fn unknown_symbol_is_empty() {
        let store = SnapshotStore::new(40);
        assert!(store.latest("NOPE_USDT").is_none());
        assert!(store.recent("NOPE_USDT", 60_000).is_empty());
        assert_eq!(store.len("NOPE_USDT"), 0);
    }
}
