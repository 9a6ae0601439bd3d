// =============================================================================
// Signal Orchestrator — per-symbol monitoring state machine
// =============================================================================
//
// One logical actor per active symbol, driven by PumpEvents from the poll
// loop:
//
//   IDLE → NOTIFIED    debounce rules decide whether the pump alert goes
//                      out; analysis proceeds either way.
//   NOTIFIED → CONFIRMING
//                      kind-adaptive reversal confirmation (FAST: 60 s /
//                      0.5% / 0.5 s ticks; ELITE: 120 s / 1.0% / 1 s).
//   CONFIRMING → EMITTED
//                      instant short: entry fixed at the confirming price,
//                      analyzers run afterwards for attribution.
//   CONFIRMING → ANALYZING
//                      confirmation timed out; bounded monitoring loop
//                      (<= 15 min, 2 s ticks for the first 2 min then 5 s)
//                      re-evaluating the full suite until a tier emits.
//   ANALYZING → ABANDONED
//                      the pump unwound without an entry (price below
//                      peak − 0.7·range, or back to <= start·1.01).
//   any → REPLACED     a peak >= 5% above the last-notified peak cancels
//                      the actor and restarts the pipeline.
//
// The `active_analysis` flag plus a per-run id guarantee at most one actor
// per symbol, with guaranteed flag release on every exit path (the guard's
// Drop also runs when a replaced actor is aborted).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::Instant;
use tracing::{debug, info};

use crate::analyzers::{self, AnalyzerContext, AnalyzerDetail, AnalyzerOutcome, AnalyzerScores};
use crate::app_state::{CooldownEntry, EngineState};
use crate::broadcast;
use crate::detector::PumpEvent;
use crate::levels::{self, LevelInputs};
use crate::market_data::{synthetic_klines, KlineInterval};
use crate::memory::Signal;
use crate::runtime_config::DebounceParams;
use crate::scoring;
use crate::types::PumpKind;

/// Price drop from peak below which the pump has already unwound,
/// as a fraction of the pump range.
const ABANDON_RETRACE_FRACTION: f64 = 0.7;

/// Price back at start (with 1% grace) also abandons the attempt.
const ABANDON_START_BAND: f64 = 1.01;

/// Minute candles fetched per evaluation.
const KLINE_LIMIT: usize = 100;

/// Orderbook depth fetched per evaluation.
const DEPTH_LIMIT: usize = 50;

static NEXT_RUN_ID: AtomicU64 = AtomicU64::new(1);

/// Releases the per-symbol claim on every exit path, including abort.
struct ActiveGuard {
    state: Arc<EngineState>,
    symbol: String,
    run_id: u64,
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        {
            let mut cooldowns = self.state.cooldowns.write();
            if let Some(entry) = cooldowns.get_mut(&self.symbol) {
                if entry.active_run_id == self.run_id {
                    entry.active_analysis = false;
                }
            }
        }
        let mut monitors = self.state.monitors.write();
        if monitors
            .get(&self.symbol)
            .is_some_and(|(id, _)| *id == self.run_id)
        {
            monitors.remove(&self.symbol);
        }
    }
}

/// Entry point from the poll loop: apply the debounce/replace rules and
/// spawn the monitoring actor when the symbol is free.
pub fn handle_pump_event(state: &Arc<EngineState>, event: PumpEvent) {
    let debounce = state.config.read().debounce.clone();
    let now = Utc::now();
    let symbol = event.symbol.clone();

    let notify;
    let run_id = NEXT_RUN_ID.fetch_add(1, Ordering::Relaxed);
    {
        let mut cooldowns = state.cooldowns.write();
        let entry = cooldowns.entry(symbol.clone()).or_default();

        if entry.active_analysis {
            let replace_floor =
                entry.last_notified_peak * (1.0 + debounce.replace_rise_pct / 100.0);
            if entry.last_notified_peak > 0.0 && event.price_peak >= replace_floor {
                info!(
                    symbol = %symbol,
                    old_peak = entry.last_notified_peak,
                    new_peak = event.price_peak,
                    "REPLACED — higher peak restarts the monitor"
                );
                if let Some((_, handle)) = state.monitors.write().remove(&symbol) {
                    handle.abort();
                }
            } else {
                return;
            }
        }

        // Per-symbol signal cooldown.
        if let Some(last_signal) = entry.last_signal_time {
            let elapsed_min = (now - last_signal).num_seconds() as f64 / 60.0;
            if elapsed_min < debounce.signal_cooldown_minutes {
                return;
            }
        }

        notify = should_notify(entry, &event, &debounce, now);
        if notify {
            entry.last_notified_peak = event.price_peak;
            entry.last_notified_tier = Some(event.kind);
            entry.last_notify_time = Some(now);
        }
        entry.active_analysis = true;
        entry.active_run_id = run_id;
    }

    let task_state = state.clone();
    let handle = tokio::spawn(run_monitor(task_state, event, notify, run_id));
    state.monitors.write().insert(symbol, (run_id, handle));
}

/// Debounce decision for the pump notification. Analysis proceeds
/// regardless of the outcome.
fn should_notify(
    entry: &CooldownEntry,
    event: &PumpEvent,
    params: &DebounceParams,
    now: DateTime<Utc>,
) -> bool {
    let is_new = entry.last_notify_time.is_none();
    let tier_rose = entry
        .last_notified_tier
        .is_some_and(|last| event.kind.rank() > last.rank());
    let peak_advanced = entry.last_notified_peak > 0.0
        && event.price_peak
            >= entry.last_notified_peak * (1.0 + params.repeat_threshold_pct / 100.0);

    if !(is_new || tier_rose || peak_advanced) {
        return false;
    }

    // Optional time cooldown (0 disables it).
    if params.cooldown_minutes > 0.0 {
        if let Some(last) = entry.last_notify_time {
            let elapsed_min = (now - last).num_seconds() as f64 / 60.0;
            if elapsed_min < params.cooldown_minutes {
                return false;
            }
        }
    }

    true
}

/// Reversal check for the confirming loop.
fn reversal_confirmed(peak: f64, current: f64, threshold_pct: f64) -> bool {
    peak > 0.0 && (peak - current) / peak * 100.0 >= threshold_pct
}

/// The monitoring actor: confirmation, analysis, emission or abandonment.
async fn run_monitor(state: Arc<EngineState>, event: PumpEvent, notify: bool, run_id: u64) {
    let symbol = event.symbol.clone();
    let _guard = ActiveGuard {
        state: state.clone(),
        symbol: symbol.clone(),
        run_id,
    };

    if notify {
        state.record_pump();
        let alert = broadcast::render_pump_alert(&event);
        broadcast::send_or_log(&*state.broadcaster, &alert).await;
    }

    let confirmation = state.config.read().confirmation.clone();
    let (timeout_secs, reversal_pct, poll_ms) = match event.kind {
        PumpKind::Fast => (
            confirmation.fast_timeout_secs,
            confirmation.fast_reversal_pct,
            confirmation.fast_poll_ms,
        ),
        PumpKind::Elite => (
            confirmation.elite_timeout_secs,
            confirmation.elite_reversal_pct,
            confirmation.elite_poll_ms,
        ),
    };

    // ── CONFIRMING ──────────────────────────────────────────────────────
    debug!(symbol = %symbol, kind = %event.kind, "CONFIRMING — waiting for reversal");
    let deadline = Instant::now() + Duration::from_secs_f64(timeout_secs);
    let mut peak = event.price_peak;
    let mut current = event.current_price;
    let mut confirmed = reversal_confirmed(peak, current, reversal_pct);

    while !confirmed && Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(poll_ms)).await;

        match state.feed.ticker(&symbol).await {
            Ok(t) if t.last_price > 0.0 => current = t.last_price,
            _ => continue,
        }

        if current > peak {
            // Still pumping — follow the peak up.
            peak = current;
            continue;
        }
        confirmed = reversal_confirmed(peak, current, reversal_pct);
    }

    if confirmed {
        info!(
            symbol = %symbol,
            peak,
            price = current,
            "reversal confirmed — attempting instant short"
        );
        if try_emit(&state, &event, peak, current).await {
            return;
        }
        // Rejected or data missing: keep watching on the slow path.
    } else {
        debug!(symbol = %symbol, "confirmation timed out — extended monitoring");
    }

    // ── ANALYZING ───────────────────────────────────────────────────────
    let analyzing = state.config.read().analyzing.clone();
    let started = Instant::now();
    let max_duration = Duration::from_secs_f64(analyzing.max_minutes * 60.0);
    let fast_phase = Duration::from_secs_f64(analyzing.fast_phase_minutes * 60.0);

    while started.elapsed() < max_duration {
        let tick = if started.elapsed() < fast_phase {
            Duration::from_secs(analyzing.fast_poll_secs)
        } else {
            Duration::from_secs(analyzing.slow_poll_secs)
        };
        tokio::time::sleep(tick).await;

        match state.feed.ticker(&symbol).await {
            Ok(t) if t.last_price > 0.0 => current = t.last_price,
            _ => continue,
        }
        if current > peak {
            peak = current;
        }

        // ABANDONED: the dump already happened without us.
        let retrace_floor = peak - ABANDON_RETRACE_FRACTION * (peak - event.price_start);
        if current < retrace_floor || current <= event.price_start * ABANDON_START_BAND {
            info!(
                symbol = %symbol,
                price = current,
                peak,
                start = event.price_start,
                "ABANDONED — pump unwound before entry"
            );
            notify_no_signal(&state, &symbol, "pump unwound before entry").await;
            return;
        }

        if try_emit(&state, &event, peak, current).await {
            return;
        }
    }

    info!(symbol = %symbol, "monitoring window exhausted without a signal");
    notify_no_signal(&state, &symbol, "no qualifying entry in the window").await;
}

/// One full evaluation: data fetch, analyzer fan-out, scoring, levels,
/// emission. Returns `true` when a signal was emitted (terminal for the
/// actor); `false` keeps the monitoring loop alive.
async fn try_emit(state: &Arc<EngineState>, event: &PumpEvent, peak: f64, entry_price: f64) -> bool {
    let symbol = &event.symbol;
    let (analyzer_params, scoring_params) = {
        let config = state.config.read();
        (config.analyzers.clone(), config.scoring.clone())
    };

    // Entry is fixed before the analyzers run; the pump geometry is
    // refreshed to the confirmed peak.
    let mut pump = event.clone();
    pump.price_peak = peak;
    pump.current_price = entry_price;
    if pump.price_start > 0.0 {
        pump.pump_pct = (peak - pump.price_start) / pump.price_start * 100.0;
    }

    // Klines with the snapshot-derived fallback for fresh listings.
    let klines = match state
        .feed
        .klines(symbol, KlineInterval::Min1, KLINE_LIMIT)
        .await
    {
        Ok(k) if !k.is_empty() => k,
        _ => {
            let snaps = state.snapshots.all(symbol);
            let synthetic = synthetic_klines(&snaps);
            if synthetic.is_empty() {
                // No data from either source: abandon this attempt quietly.
                info!(symbol = %symbol, "no klines and no snapshots — skipping evaluation");
                return false;
            }
            debug!(
                symbol = %symbol,
                candles = synthetic.len(),
                "exchange returned no klines — using synthetic candles"
            );
            synthetic
        }
    };

    let orderbook = state.feed.orderbook(symbol, DEPTH_LIMIT).await.ok();

    let ctx = Arc::new(AnalyzerContext {
        symbol: symbol.clone(),
        pump: pump.clone(),
        entry_price,
        klines: klines.clone(),
        orderbook: orderbook.clone(),
        feed: state.feed.clone(),
        oi_history: state.oi_history.clone(),
        params: analyzer_params,
    });

    let outcomes = analyzers::run_suite(ctx).await;
    let scores = AnalyzerScores::from_outcomes(&outcomes);

    let breakdown = scoring::evaluate(&state.memory, &scoring_params, &pump, &scores);
    if !breakdown.tier.emits() {
        debug!(
            symbol = %symbol,
            score = format!("{:.2}", breakdown.final_score),
            "score below tier B — no signal"
        );
        return false;
    }

    let intel = state.memory.intelligence(symbol);
    let levels = levels::compute(&LevelInputs {
        entry_price,
        peak_price: peak,
        start_price: pump.price_start,
        pump_elapsed_min: pump.elapsed_minutes,
        klines: &klines,
        orderbook: orderbook.as_ref(),
        liquidation: liquidation_detail(&outcomes),
        candle_multiplier: candle_multiplier(&outcomes),
        intelligence: &intel,
    });

    let signal = Signal {
        id: uuid::Uuid::new_v4().to_string(),
        symbol: symbol.clone(),
        created_at: Utc::now(),
        kind: pump.kind,
        pump_pct: pump.pump_pct,
        pump_speed_minutes: pump.elapsed_minutes,
        entry_price,
        peak_price: peak,
        start_price: pump.price_start,
        scores,
        combined_score: breakdown.final_score,
        ml_probability: breakdown.ml_probability,
        tier: breakdown.tier,
        sl_price: levels.sl_price,
        tp_prices: levels.tp_prices,
    };

    info!(
        symbol = %symbol,
        signal_id = %signal.id,
        tier = %signal.tier,
        score = format!("{:.2}", signal.combined_score),
        entry = entry_price,
        sl = signal.sl_price,
        "EMITTED — short signal"
    );

    // Broadcast first; persistence failures must not hold the message.
    let message = broadcast::render_signal(&signal);
    broadcast::send_or_log(&*state.broadcaster, &message).await;

    state.memory.record_signal(signal.clone());
    state.tracker.track(signal);
    state.record_signal_emitted();

    if let Some(entry) = state.cooldowns.write().get_mut(symbol) {
        entry.last_signal_time = Some(Utc::now());
    }

    true
}

fn candle_multiplier(outcomes: &[AnalyzerOutcome]) -> f64 {
    outcomes
        .iter()
        .find_map(|o| match &o.detail {
            AnalyzerDetail::Candle(d) => Some(d.multiplier),
            _ => None,
        })
        .unwrap_or(1.0)
}

fn liquidation_detail(outcomes: &[AnalyzerOutcome]) -> Option<&crate::analyzers::LiquidationMap> {
    outcomes.iter().find_map(|o| match &o.detail {
        AnalyzerDetail::Liquidation(map) => Some(map),
        _ => None,
    })
}

/// Bounded "entry not found" notice: at most one per symbol per cooldown
/// window.
async fn notify_no_signal(state: &Arc<EngineState>, symbol: &str, reason: &str) {
    let cooldown_min = state.config.read().debounce.no_signal_cooldown_minutes;
    let now = Utc::now();

    let should_send = {
        let mut cooldowns = state.cooldowns.write();
        let entry = cooldowns.entry(symbol.to_string()).or_default();
        let quiet = entry
            .last_no_signal_notify_time
            .is_none_or(|t| (now - t).num_seconds() as f64 / 60.0 >= cooldown_min);
        if quiet {
            entry.last_no_signal_notify_time = Some(now);
        }
        quiet
    };

    if should_send {
        let text = broadcast::render_no_signal(symbol, reason);
        broadcast::send_or_log(&*state.broadcaster, &text).await;
    } else {
        debug!(symbol = %symbol, "no-signal notice suppressed by cooldown");
    }
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::{FundingInfo, MarketFeed, OpenInterestInfo, OrderbookDepth, TickerEntry};
    use crate::market_data::{Candle, Snapshot};
    use crate::memory::spawn_memory_service;
    use crate::runtime_config::{LearningParams, RuntimeConfig};
    use crate::tracker::OutcomeTracker;
    use crate::types::OutcomeSource;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::HashMap;

    // ── Mocks ───────────────────────────────────────────────────────────

    struct MockFeed {
        price: Mutex<f64>,
        klines: Vec<Candle>,
    }

    impl MockFeed {
        fn new(price: f64) -> Self {
            let klines = (0..40)
                .map(|i| {
                    let ts = i as i64 * 60_000;
                    Candle::new(ts, price, price + 0.5, price - 0.5, price, 10.0)
                })
                .collect();
            Self {
                price: Mutex::new(price),
                klines,
            }
        }
    }

    #[async_trait]
    impl MarketFeed for MockFeed {
        async fn list_symbols(&self) -> anyhow::Result<Vec<String>> {
            Ok(vec!["BTC_USDT".into()])
        }

        async fn batch_ticker(&self) -> anyhow::Result<HashMap<String, TickerEntry>> {
            Ok(HashMap::new())
        }

        async fn ticker(&self, _symbol: &str) -> anyhow::Result<TickerEntry> {
            Ok(TickerEntry {
                last_price: *self.price.lock(),
                volume_24h: 1000.0,
                change_24h_pct: -2.0,
                ts_ms: 0,
            })
        }

        async fn klines(
            &self,
            _symbol: &str,
            _interval: KlineInterval,
            _limit: usize,
        ) -> anyhow::Result<Vec<Candle>> {
            Ok(self.klines.clone())
        }

        async fn orderbook(&self, _symbol: &str, _limit: usize) -> anyhow::Result<OrderbookDepth> {
            let price = *self.price.lock();
            Ok(OrderbookDepth {
                bids: vec![(price * 0.999, 10.0), (price * 0.99, 15.0)],
                asks: vec![(price * 1.001, 30.0), (price * 1.01, 35.0)],
            })
        }

        async fn funding_rate(&self, _symbol: &str) -> anyhow::Result<FundingInfo> {
            Ok(FundingInfo {
                rate: 0.001,
                next_settle_ts: 0,
            })
        }

        async fn open_interest(&self, _symbol: &str) -> anyhow::Result<OpenInterestInfo> {
            Ok(OpenInterestInfo {
                contracts: 1_000_000.0,
                contract_size: 1.0,
            })
        }
    }

    #[derive(Default)]
    struct CapturingBroadcaster {
        messages: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl crate::broadcast::Broadcaster for CapturingBroadcaster {
        async fn broadcast(&self, text: &str) -> anyhow::Result<()> {
            self.messages.lock().push(text.to_string());
            Ok(())
        }
    }

    fn engine_with(feed: Arc<MockFeed>, broadcaster: Arc<CapturingBroadcaster>) -> Arc<EngineState> {
        let dir = tempfile::tempdir().unwrap();
        let learning = LearningParams {
            database_path: dir
                .path()
                .join("memory.db")
                .to_string_lossy()
                .into_owned(),
            model_path: dir
                .path()
                .join("model.json")
                .to_string_lossy()
                .into_owned(),
            ..LearningParams::default()
        };
        // Leak the tempdir so the database survives the test body.
        std::mem::forget(dir);

        let memory = spawn_memory_service(&learning).unwrap();

        let mut config = RuntimeConfig::default();
        config.learning = learning;
        // Neutral analyzer scores land near 5.5; let everything emit as B.
        config.scoring.tier_b_min = 0.0;

        let (events_tx, _events_rx) = tokio::sync::mpsc::channel(64);
        let mut outcome_params = config.outcome.clone();
        outcome_params.source = OutcomeSource::Scheduled;
        let tracker = Arc::new(OutcomeTracker::new(
            feed.clone(),
            outcome_params,
            events_tx,
        ));

        Arc::new(EngineState::new(
            config,
            feed,
            broadcaster,
            memory,
            tracker,
        ))
    }

    fn fast_event(symbol: &str, start: f64, peak: f64, current: f64) -> PumpEvent {
        PumpEvent {
            symbol: symbol.into(),
            kind: PumpKind::Fast,
            pump_pct: (peak - start) / start * 100.0,
            elapsed_minutes: 1.5,
            price_start: start,
            price_peak: peak,
            current_price: current,
            detected_at: Utc::now(),
        }
    }

    // ── Debounce matrix ─────────────────────────────────────────────────

    #[test]
    fn notify_on_new_symbol() {
        let entry = CooldownEntry::default();
        let event = fast_event("X_USDT", 100.0, 112.0, 111.0);
        assert!(should_notify(&entry, &event, &DebounceParams::default(), Utc::now()));
    }

    #[test]
    fn suppress_repeat_below_threshold() {
        let now = Utc::now();
        let entry = CooldownEntry {
            last_notified_peak: 112.0,
            last_notified_tier: Some(PumpKind::Fast),
            last_notify_time: Some(now),
            ..CooldownEntry::default()
        };
        // Peak only 5% above the notified one — below the 10% repeat bar.
        let event = fast_event("X_USDT", 100.0, 117.0, 116.0);
        assert!(!should_notify(&entry, &event, &DebounceParams::default(), now));
    }

    #[test]
    fn notify_when_peak_advances_ten_percent() {
        let now = Utc::now();
        let entry = CooldownEntry {
            last_notified_peak: 112.0,
            last_notified_tier: Some(PumpKind::Fast),
            last_notify_time: Some(now),
            ..CooldownEntry::default()
        };
        let event = fast_event("X_USDT", 100.0, 124.0, 123.0);
        assert!(should_notify(&entry, &event, &DebounceParams::default(), now));
    }

    #[test]
    fn notify_when_tier_rises() {
        let now = Utc::now();
        let entry = CooldownEntry {
            last_notified_peak: 112.0,
            last_notified_tier: Some(PumpKind::Elite),
            last_notify_time: Some(now),
            ..CooldownEntry::default()
        };
        let event = fast_event("X_USDT", 100.0, 113.0, 112.5);
        assert!(should_notify(&entry, &event, &DebounceParams::default(), now));
    }

    #[test]
    fn time_cooldown_suppresses_when_enabled() {
        let now = Utc::now();
        let entry = CooldownEntry {
            last_notified_peak: 100.0,
            last_notified_tier: Some(PumpKind::Elite),
            last_notify_time: Some(now),
            ..CooldownEntry::default()
        };
        let mut params = DebounceParams::default();
        params.cooldown_minutes = 5.0;
        // Tier rose, but inside the 5-minute window.
        let event = fast_event("X_USDT", 100.0, 113.0, 112.5);
        assert!(!should_notify(&entry, &event, &params, now));
    }

    // ── Reversal math ───────────────────────────────────────────────────

    #[test]
    fn reversal_threshold_boundary() {
        // Peak 112, FAST threshold 0.5% => boundary at 111.44.
        assert!(!reversal_confirmed(112.0, 111.6, 0.5));
        assert!(reversal_confirmed(112.0, 111.44, 0.5));
        assert!(reversal_confirmed(112.0, 111.2, 0.5));
        // The end-to-end sequence: (112 − 111) / 112 = 0.89% > 0.5%.
        assert!(reversal_confirmed(112.0, 111.0, 0.5));
    }

    // ── End-to-end: detection → confirmation → instant emission ─────────

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn pump_event_confirms_and_emits_instant_signal() {
        let feed = Arc::new(MockFeed::new(111.0));
        let broadcaster = Arc::new(CapturingBroadcaster::default());
        let state = engine_with(feed.clone(), broadcaster.clone());

        // Seed the snapshot store with the canonical pump sequence.
        for (ts, price) in [
            (0i64, 100.0),
            (30_000, 104.0),
            (60_000, 110.0),
            (90_000, 112.0),
            (120_000, 111.0),
        ] {
            state
                .snapshots
                .insert("BTC_USDT", Snapshot::new(ts, price, 10.0));
        }

        let series = state.snapshots.all("BTC_USDT");
        let detection = state.config.read().detection.clone();
        let event = crate::detector::detect("BTC_USDT", &series, 120_000, &detection)
            .expect("the sequence is a FAST pump");
        assert!((event.pump_pct - 12.0).abs() < 1e-6);

        handle_pump_event(&state, event);

        // Reversal is already past the FAST threshold, so the actor should
        // confirm on its first tick and emit immediately after the suite.
        for _ in 0..600 {
            if broadcaster.messages.lock().len() >= 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        let messages = broadcaster.messages.lock().clone();
        assert!(messages.len() >= 2, "expected pump alert + signal, got {messages:?}");
        assert!(messages[0].contains("PUMP DETECTED"));
        assert!(messages[0].contains("FAST"));

        let signal_msg = &messages[1];
        assert!(signal_msg.contains("BTC_USDT"));
        assert!(signal_msg.contains("Entry: 111.0"));
        assert!(signal_msg.contains("+12.0%"));

        // The actor released its claim and the tracker took over.
        assert_eq!(state.tracker.active_count(), 1);
        for _ in 0..100 {
            if !state
                .cooldowns
                .read()
                .get("BTC_USDT")
                .map(|e| e.active_analysis)
                .unwrap_or(false)
            {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(!state.cooldowns.read().get("BTC_USDT").unwrap().active_analysis);
        assert!(state.cooldowns.read().get("BTC_USDT").unwrap().last_signal_time.is_some());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn second_event_respects_active_analysis() {
        let feed = Arc::new(MockFeed::new(150.0)); // far above peak: no reversal
        let broadcaster = Arc::new(CapturingBroadcaster::default());
        let state = engine_with(feed.clone(), broadcaster.clone());

        let event = fast_event("ETH_USDT", 100.0, 112.0, 111.9);
        handle_pump_event(&state, event.clone());
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(state.cooldowns.read().get("ETH_USDT").unwrap().active_analysis);

        // Same pump again: the busy actor keeps its claim, no second task.
        let monitors_before = state.monitors.read().len();
        handle_pump_event(&state, event);
        assert_eq!(state.monitors.read().len(), monitors_before);

        // Tear down: abort the running monitor.
        let removed = state.monitors.write().remove("ETH_USDT");
        if let Some((_, handle)) = removed {
            handle.abort();
        }
    }
}
