// =============================================================================
// Outcome Tracker — scheduled price sampling + trailing take-profit follower
// =============================================================================
//
// Two cooperating mechanisms per emitted signal:
//
//   Scheduled sampler — price reads at {5, 15, 30, 60, 240} minutes after
//   emission. Each sample updates hit flags (short semantics: TP hit iff
//   sample <= tp, SL hit iff sample >= sl) and the max-profit/drawdown
//   envelope. At the 240-minute horizon the final result is derived:
//   SL-before-any-TP => LOSS_SL, else the deepest TP hit wins, else
//   BREAKEVEN within +/-0.5% of entry, else TIMEOUT.
//
//   Trailing follower — inactive until profit reaches the activation
//   threshold, then ratchets `trailing_tp = lowest_price * (1 + dist/100)`
//   on every new low and closes when the price climbs back through it.
//
// Exactly one mechanism (config `outcome.source`) finalizes a signal; the
// other still contributes observations. Finalizations flow out through an
// event channel — the tracker knows nothing about the memory layer, the
// wiring in main subscribes it.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::exchange::MarketFeed;
use crate::memory::{OutcomeData, Signal};
use crate::runtime_config::OutcomeParams;
use crate::types::{FinalResult, OutcomeSource};

/// Sampling offsets after emission, minutes.
pub const SAMPLE_OFFSETS_MIN: [i64; 5] = [5, 15, 30, 60, 240];

/// A finalized outcome leaving the tracker.
#[derive(Debug)]
pub enum TrackerEvent {
    Finalized {
        signal_id: String,
        symbol: String,
        outcome: OutcomeData,
    },
}

// =============================================================================
// Scheduled sampler state
// =============================================================================

#[derive(Debug, Clone)]
struct ScheduledState {
    signal: Signal,
    /// One slot per entry of [`SAMPLE_OFFSETS_MIN`].
    samples: [Option<f64>; 5],
    hit_tp1: bool,
    hit_tp2: bool,
    hit_tp3: bool,
    hit_sl: bool,
    /// SL was struck before any TP.
    sl_before_tp: bool,
    max_profit_pct: f64,
    max_drawdown_pct: f64,
}

impl ScheduledState {
    fn new(signal: Signal) -> Self {
        Self {
            signal,
            samples: [None; 5],
            hit_tp1: false,
            hit_tp2: false,
            hit_tp3: false,
            hit_sl: false,
            sl_before_tp: false,
            max_profit_pct: 0.0,
            max_drawdown_pct: 0.0,
        }
    }

    /// Record the sample for `offset_idx`, updating hits and the envelope.
    fn record_sample(&mut self, offset_idx: usize, price: f64) {
        self.samples[offset_idx] = Some(price);

        let entry = self.signal.entry_price;
        if entry > 0.0 {
            let profit_pct = (entry - price) / entry * 100.0;
            self.max_profit_pct = self.max_profit_pct.max(profit_pct);
            self.max_drawdown_pct = self.max_drawdown_pct.max(-profit_pct);
        }

        // Short semantics: a TP is hit when the sample trades at or below it.
        if price <= self.signal.tp1() {
            self.hit_tp1 = true;
        }
        if price <= self.signal.tp2() {
            self.hit_tp2 = true;
        }
        if price <= self.signal.tp3() {
            self.hit_tp3 = true;
        }

        if price >= self.signal.sl_price {
            if !(self.hit_tp1 || self.hit_tp2 || self.hit_tp3) {
                self.sl_before_tp = true;
            }
            self.hit_sl = true;
        }
    }

    fn all_sampled(&self) -> bool {
        self.samples.iter().all(Option::is_some)
    }

    /// Derive the final result at the horizon.
    fn final_result(&self, breakeven_band_pct: f64) -> FinalResult {
        if self.sl_before_tp {
            return FinalResult::LossSl;
        }
        if self.hit_tp3 {
            return FinalResult::WinTp3;
        }
        if self.hit_tp2 {
            return FinalResult::WinTp2;
        }
        if self.hit_tp1 {
            return FinalResult::WinTp1;
        }
        if self.hit_sl {
            return FinalResult::LossSl;
        }

        let last = self.samples.iter().rev().flatten().next().copied();
        match last {
            Some(price) if self.signal.entry_price > 0.0 => {
                let dev_pct =
                    (price - self.signal.entry_price).abs() / self.signal.entry_price * 100.0;
                if dev_pct <= breakeven_band_pct {
                    FinalResult::Breakeven
                } else {
                    FinalResult::Timeout
                }
            }
            _ => FinalResult::Timeout,
        }
    }

    fn outcome(&self, final_result: FinalResult) -> OutcomeData {
        OutcomeData {
            price_5m: self.samples[0],
            price_15m: self.samples[1],
            price_30m: self.samples[2],
            price_1h: self.samples[3],
            price_4h: self.samples[4],
            hit_tp1: self.hit_tp1,
            hit_tp2: self.hit_tp2,
            hit_tp3: self.hit_tp3,
            hit_sl: self.hit_sl,
            max_profit_pct: self.max_profit_pct,
            max_drawdown_pct: self.max_drawdown_pct,
            final_result,
        }
    }
}

// =============================================================================
// Trailing follower state
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TrailAction {
    None,
    Activated,
    NewLow,
    TpHit,
    SlHit,
    Expired,
}

#[derive(Debug, Clone)]
struct TrailState {
    signal: Signal,
    activated: bool,
    lowest_price: f64,
    trailing_tp: Option<f64>,
    last_price: f64,
    max_profit_pct: f64,
    max_drawdown_pct: f64,
}

impl TrailState {
    fn new(signal: Signal) -> Self {
        let entry = signal.entry_price;
        Self {
            signal,
            activated: false,
            lowest_price: entry,
            trailing_tp: None,
            last_price: entry,
            max_profit_pct: 0.0,
            max_drawdown_pct: 0.0,
        }
    }

    /// One price update through the follower state machine.
    fn tick(&mut self, price: f64, elapsed_min: f64, params: &OutcomeParams) -> TrailAction {
        let entry = self.signal.entry_price;
        if entry <= 0.0 || price <= 0.0 {
            return TrailAction::None;
        }

        self.last_price = price;
        let profit_pct = (entry - price) / entry * 100.0;
        self.max_profit_pct = self.max_profit_pct.max(profit_pct);
        self.max_drawdown_pct = self.max_drawdown_pct.max(-profit_pct);

        // SL check every tick.
        if price >= self.signal.sl_price {
            return TrailAction::SlHit;
        }

        if elapsed_min >= params.max_tracking_minutes {
            return TrailAction::Expired;
        }

        if !self.activated {
            if profit_pct >= params.activation_pct {
                self.activated = true;
                self.lowest_price = price;
                self.trailing_tp = Some(price * (1.0 + params.trail_distance_pct / 100.0));
                return TrailAction::Activated;
            }
            return TrailAction::None;
        }

        if price < self.lowest_price {
            self.lowest_price = price;
            self.trailing_tp = Some(price * (1.0 + params.trail_distance_pct / 100.0));
            return TrailAction::NewLow;
        }

        match self.trailing_tp {
            Some(tp) if price >= tp => TrailAction::TpHit,
            _ => TrailAction::None,
        }
    }

    /// Build the outcome for a terminal action.
    fn outcome(&self, action: TrailAction, breakeven_band_pct: f64) -> OutcomeData {
        let entry = self.signal.entry_price;
        let low = self.lowest_price;

        let hit_tp1 = low <= self.signal.tp1();
        let hit_tp2 = low <= self.signal.tp2();
        let hit_tp3 = low <= self.signal.tp3();
        let hit_sl = action == TrailAction::SlHit;

        let final_result = match action {
            TrailAction::SlHit => FinalResult::LossSl,
            TrailAction::TpHit => {
                if hit_tp3 {
                    FinalResult::WinTp3
                } else if hit_tp2 {
                    FinalResult::WinTp2
                } else {
                    // Trailing only fires in profit; the shallowest win
                    // bucket covers a close above the fixed ladder.
                    FinalResult::WinTp1
                }
            }
            _ => {
                let dev_pct = if entry > 0.0 {
                    (self.last_price - entry).abs() / entry * 100.0
                } else {
                    f64::MAX
                };
                if dev_pct <= breakeven_band_pct {
                    FinalResult::Breakeven
                } else {
                    FinalResult::Timeout
                }
            }
        };

        OutcomeData {
            price_5m: None,
            price_15m: None,
            price_30m: None,
            price_1h: None,
            price_4h: None,
            hit_tp1,
            hit_tp2,
            hit_tp3,
            hit_sl,
            max_profit_pct: self.max_profit_pct,
            max_drawdown_pct: self.max_drawdown_pct,
            final_result,
        }
    }
}

// =============================================================================
// OutcomeTracker
// =============================================================================

/// Tracks every emitted signal until its outcome is finalized.
pub struct OutcomeTracker {
    feed: Arc<dyn MarketFeed>,
    params: OutcomeParams,
    events: mpsc::Sender<TrackerEvent>,
    scheduled: RwLock<HashMap<String, ScheduledState>>,
    trailing: RwLock<HashMap<String, TrailState>>,
}

impl OutcomeTracker {
    pub fn new(
        feed: Arc<dyn MarketFeed>,
        params: OutcomeParams,
        events: mpsc::Sender<TrackerEvent>,
    ) -> Self {
        Self {
            feed,
            params,
            events,
            scheduled: RwLock::new(HashMap::new()),
            trailing: RwLock::new(HashMap::new()),
        }
    }

    /// Register a freshly emitted signal for tracking.
    pub fn track(&self, signal: Signal) {
        info!(
            signal_id = %signal.id,
            symbol = %signal.symbol,
            entry = signal.entry_price,
            "tracking signal outcome"
        );

        if self.params.trailing_enabled {
            self.trailing
                .write()
                .insert(signal.id.clone(), TrailState::new(signal.clone()));
        }
        self.scheduled
            .write()
            .insert(signal.id.clone(), ScheduledState::new(signal));
    }

    /// Number of signals still being tracked.
    pub fn active_count(&self) -> usize {
        self.scheduled.read().len()
    }

    async fn emit(&self, signal_id: String, symbol: String, outcome: OutcomeData) {
        let event = TrackerEvent::Finalized {
            signal_id,
            symbol,
            outcome,
        };
        if self.events.send(event).await.is_err() {
            warn!("tracker event channel closed — outcome dropped");
        }
    }

    /// Scheduled sampler loop. Spawn once at startup.
    pub async fn run_scheduled(self: Arc<Self>) {
        let mut ticker =
            tokio::time::interval(std::time::Duration::from_secs(self.params.check_interval_secs));
        info!(
            interval_secs = self.params.check_interval_secs,
            "scheduled outcome sampler started"
        );

        loop {
            ticker.tick().await;

            let ids: Vec<String> = self.scheduled.read().keys().cloned().collect();
            for id in ids {
                let Some((symbol, due)) = self.scheduled.read().get(&id).map(|s| {
                    let elapsed_min =
                        (Utc::now() - s.signal.created_at).num_seconds() as f64 / 60.0;
                    let due: Vec<usize> = SAMPLE_OFFSETS_MIN
                        .iter()
                        .enumerate()
                        .filter(|(i, offset)| {
                            s.samples[*i].is_none() && elapsed_min >= **offset as f64
                        })
                        .map(|(i, _)| i)
                        .collect();
                    (s.signal.symbol.clone(), due)
                }) else {
                    continue;
                };
                if due.is_empty() {
                    continue;
                }

                // One price read covers every offset that just came due.
                let price = match self.feed.ticker(&symbol).await {
                    Ok(t) => t.last_price,
                    Err(e) => {
                        debug!(symbol = %symbol, error = %e, "outcome sample fetch failed — next tick retries");
                        continue;
                    }
                };

                let mut finalize: Option<OutcomeData> = None;
                {
                    let mut map = self.scheduled.write();
                    if let Some(state) = map.get_mut(&id) {
                        for idx in due {
                            state.record_sample(idx, price);
                            debug!(
                                signal_id = %id,
                                offset_min = SAMPLE_OFFSETS_MIN[idx],
                                price,
                                "outcome sample recorded"
                            );
                        }
                        if state.all_sampled() {
                            let result = state.final_result(self.params.breakeven_band_pct);
                            finalize = Some(state.outcome(result));
                        }
                    }
                }

                if let Some(outcome) = finalize {
                    info!(
                        signal_id = %id,
                        symbol = %symbol,
                        result = %outcome.final_result,
                        max_profit = format!("{:.1}%", outcome.max_profit_pct),
                        "scheduled sampling horizon reached"
                    );
                    self.scheduled.write().remove(&id);
                    if self.params.source == OutcomeSource::Scheduled {
                        self.emit(id, symbol, outcome).await;
                    }
                }
            }
        }
    }

    /// Trailing follower loop. Spawn once at startup when enabled.
    pub async fn run_trailing(self: Arc<Self>) {
        let mut ticker = tokio::time::interval(std::time::Duration::from_secs(
            self.params.trailing_check_secs,
        ));
        info!(
            interval_secs = self.params.trailing_check_secs,
            activation_pct = self.params.activation_pct,
            trail_distance_pct = self.params.trail_distance_pct,
            "trailing TP follower started"
        );

        loop {
            ticker.tick().await;

            let ids: Vec<String> = self.trailing.read().keys().cloned().collect();
            for id in ids {
                let Some((symbol, created_at)) = self
                    .trailing
                    .read()
                    .get(&id)
                    .map(|t| (t.signal.symbol.clone(), t.signal.created_at))
                else {
                    continue;
                };

                let price = match self.feed.ticker(&symbol).await {
                    Ok(t) => t.last_price,
                    Err(e) => {
                        debug!(symbol = %symbol, error = %e, "trailing price fetch failed");
                        continue;
                    }
                };

                let elapsed_min = (Utc::now() - created_at).num_seconds() as f64 / 60.0;

                let terminal = {
                    let mut map = self.trailing.write();
                    let Some(state) = map.get_mut(&id) else {
                        continue;
                    };
                    match state.tick(price, elapsed_min, &self.params) {
                        TrailAction::Activated => {
                            info!(
                                signal_id = %id,
                                symbol = %symbol,
                                price,
                                trailing_tp = ?state.trailing_tp,
                                "trailing TP activated"
                            );
                            None
                        }
                        TrailAction::NewLow => {
                            debug!(
                                signal_id = %id,
                                low = state.lowest_price,
                                trailing_tp = ?state.trailing_tp,
                                "trailing TP ratcheted"
                            );
                            None
                        }
                        action @ (TrailAction::TpHit | TrailAction::SlHit | TrailAction::Expired) => {
                            Some(state.outcome(action, self.params.breakeven_band_pct))
                        }
                        TrailAction::None => None,
                    }
                };

                if let Some(outcome) = terminal {
                    info!(
                        signal_id = %id,
                        symbol = %symbol,
                        result = %outcome.final_result,
                        max_profit = format!("{:.1}%", outcome.max_profit_pct),
                        "trailing follower closed position"
                    );
                    self.trailing.write().remove(&id);
                    if self.params.source == OutcomeSource::Trailing {
                        self.emit(id, symbol, outcome).await;
                    }
                }
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::tests_support::sample_signal;

    fn params() -> OutcomeParams {
        OutcomeParams::default()
    }

    // sample_signal: entry 100, sl 105, tps ascending [85, 90, 95].

    #[test]
    fn tp1_hit_classification() {
        // 5m: 96, 15m: 94, then recovery — WIN_TP1.
        let mut state = ScheduledState::new(sample_signal("X_USDT", 12.0, 7.0));
        state.record_sample(0, 96.0);
        state.record_sample(1, 94.0);
        state.record_sample(2, 96.0);
        state.record_sample(3, 96.0);
        state.record_sample(4, 97.0);

        assert!(state.hit_tp1);
        assert!(!state.hit_tp2);
        assert!(!state.hit_sl);
        assert_eq!(state.final_result(0.5), FinalResult::WinTp1);
    }

    #[test]
    fn deepest_tp_wins() {
        let mut state = ScheduledState::new(sample_signal("X_USDT", 12.0, 7.0));
        state.record_sample(0, 96.0);
        state.record_sample(1, 89.0); // through TP1 and TP2
        state.record_sample(2, 84.0); // through TP3
        state.record_sample(3, 92.0);
        state.record_sample(4, 95.0);
        assert_eq!(state.final_result(0.5), FinalResult::WinTp3);
    }

    #[test]
    fn sl_before_tp_is_loss() {
        let mut state = ScheduledState::new(sample_signal("X_USDT", 12.0, 7.0));
        state.record_sample(0, 106.0); // SL first
        state.record_sample(1, 94.0); // later dip does not rescue it
        state.record_sample(2, 94.0);
        state.record_sample(3, 94.0);
        state.record_sample(4, 94.0);
        assert!(state.sl_before_tp);
        assert_eq!(state.final_result(0.5), FinalResult::LossSl);
    }

    #[test]
    fn tp_before_sl_still_wins() {
        let mut state = ScheduledState::new(sample_signal("X_USDT", 12.0, 7.0));
        state.record_sample(0, 94.0); // TP1 first
        state.record_sample(1, 106.0); // SL later
        state.record_sample(2, 100.0);
        state.record_sample(3, 100.0);
        state.record_sample(4, 100.0);
        assert!(state.hit_sl);
        assert!(!state.sl_before_tp);
        assert_eq!(state.final_result(0.5), FinalResult::WinTp1);
    }

    #[test]
    fn breakeven_within_band() {
        let mut state = ScheduledState::new(sample_signal("X_USDT", 12.0, 7.0));
        for (i, price) in [99.0, 98.0, 101.0, 100.2, 100.3].into_iter().enumerate() {
            state.record_sample(i, price);
        }
        assert_eq!(state.final_result(0.5), FinalResult::Breakeven);
    }

    #[test]
    fn timeout_outside_band() {
        let mut state = ScheduledState::new(sample_signal("X_USDT", 12.0, 7.0));
        for (i, price) in [99.0, 98.0, 101.0, 102.0, 103.0].into_iter().enumerate() {
            state.record_sample(i, price);
        }
        assert_eq!(state.final_result(0.5), FinalResult::Timeout);
    }

    #[test]
    fn profit_envelope_tracked() {
        let mut state = ScheduledState::new(sample_signal("X_USDT", 12.0, 7.0));
        state.record_sample(0, 90.0); // +10% profit
        state.record_sample(1, 104.0); // -4% drawdown
        assert!((state.max_profit_pct - 10.0).abs() < 1e-9);
        assert!((state.max_drawdown_pct - 4.0).abs() < 1e-9);
    }

    #[test]
    fn trailing_activation_ratchet_and_hit() {
        let mut trail = TrailState::new(sample_signal("X_USDT", 12.0, 7.0));
        let p = params();

        // Not yet in profit.
        assert_eq!(trail.tick(99.5, 1.0, &p), TrailAction::None);
        assert!(!trail.activated);

        // 2% profit activates: trailing_tp = 98 * 1.01 = 98.98.
        assert_eq!(trail.tick(98.0, 2.0, &p), TrailAction::Activated);
        assert!((trail.trailing_tp.unwrap() - 98.98).abs() < 1e-9);

        // New low ratchets the stop down.
        assert_eq!(trail.tick(96.0, 3.0, &p), TrailAction::NewLow);
        assert!((trail.trailing_tp.unwrap() - 96.96).abs() < 1e-9);

        // Rebound through the trail closes the position.
        assert_eq!(trail.tick(97.0, 4.0, &p), TrailAction::TpHit);

        let outcome = trail.outcome(TrailAction::TpHit, p.breakeven_band_pct);
        assert!(outcome.final_result.is_win());
        assert!((outcome.max_profit_pct - 4.0).abs() < 1e-9);
    }

    #[test]
    fn trailing_sl_hit() {
        let mut trail = TrailState::new(sample_signal("X_USDT", 12.0, 7.0));
        let p = params();
        assert_eq!(trail.tick(105.5, 1.0, &p), TrailAction::SlHit);
        let outcome = trail.outcome(TrailAction::SlHit, p.breakeven_band_pct);
        assert_eq!(outcome.final_result, FinalResult::LossSl);
        assert!(outcome.hit_sl);
    }

    #[test]
    fn trailing_expiry_without_profit() {
        let mut trail = TrailState::new(sample_signal("X_USDT", 12.0, 7.0));
        let p = params();
        assert_eq!(trail.tick(100.2, 500.0, &p), TrailAction::Expired);
        let outcome = trail.outcome(TrailAction::Expired, p.breakeven_band_pct);
        assert_eq!(outcome.final_result, FinalResult::Breakeven);
    }

    #[test]
    fn trailing_win_depth_classification() {
        let mut trail = TrailState::new(sample_signal("X_USDT", 12.0, 7.0));
        let p = params();
        trail.tick(98.0, 1.0, &p); // activate
        trail.tick(84.0, 2.0, &p); // below TP3 (85)
        assert_eq!(trail.tick(86.0, 3.0, &p), TrailAction::TpHit);
        let outcome = trail.outcome(TrailAction::TpHit, p.breakeven_band_pct);
        assert_eq!(outcome.final_result, FinalResult::WinTp3);
        assert!(outcome.hit_tp1 && outcome.hit_tp2 && outcome.hit_tp3);
    }
}
