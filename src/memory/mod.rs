// =============================================================================
// Memory / Intelligence Store — the learning subsystem
// =============================================================================
//
// Durable append-only log of signals and outcomes (SQLite) plus derived
// per-symbol CoinIntelligence and the outcome classifier.
//
// Concurrency model (shared-resource rule): all writes funnel through ONE
// writer thread fed by an mpsc channel; reads are served concurrently from
// in-memory caches under RwLock. The caches are rebuilt from the row log at
// startup, so every derived aggregate is reproducible by replay.
//
// Failure policy: a store write failure is logged at WARN and the engine
// continues — the signal still ships, and the next successful write
// reconciles the caches with disk.

pub mod classifier;
pub mod intelligence;
pub mod store;

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Timelike, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::analyzers::AnalyzerScores;
use crate::runtime_config::LearningParams;
use crate::types::{FinalResult, PumpKind, Tier};

pub use classifier::{feature_vector, OutcomeClassifier, Prediction, FEATURE_COUNT};
pub use intelligence::{CoinIntelligence, SmartPrediction};
pub use store::MemoryStore;

/// An emitted short signal. Immutable after creation; its outcome is a
/// separate child record.
#[derive(Debug, Clone, Serialize)]
pub struct Signal {
    pub id: String,
    pub symbol: String,
    pub created_at: DateTime<Utc>,
    pub kind: PumpKind,
    pub pump_pct: f64,
    pub pump_speed_minutes: f64,
    pub entry_price: f64,
    pub peak_price: f64,
    pub start_price: f64,
    pub scores: AnalyzerScores,
    pub combined_score: f64,
    pub ml_probability: Option<f64>,
    pub tier: Tier,
    pub sl_price: f64,
    /// Take-profit prices sorted ascending (deepest target first).
    pub tp_prices: [f64; 3],
}

impl Signal {
    /// Nearest take-profit (highest price — first target for a short).
    pub fn tp1(&self) -> f64 {
        self.tp_prices[2]
    }

    pub fn tp2(&self) -> f64 {
        self.tp_prices[1]
    }

    /// Deepest take-profit (lowest price).
    pub fn tp3(&self) -> f64 {
        self.tp_prices[0]
    }
}

/// Outcome fields filled in by the tracker; finalized exactly once.
#[derive(Debug, Clone, Serialize)]
pub struct OutcomeData {
    pub price_5m: Option<f64>,
    pub price_15m: Option<f64>,
    pub price_30m: Option<f64>,
    pub price_1h: Option<f64>,
    pub price_4h: Option<f64>,
    pub hit_tp1: bool,
    pub hit_tp2: bool,
    pub hit_tp3: bool,
    pub hit_sl: bool,
    pub max_profit_pct: f64,
    pub max_drawdown_pct: f64,
    pub final_result: FinalResult,
}

/// One signal row in memory, with its outcome once finalized.
#[derive(Debug, Clone, Serialize)]
pub struct MemoryRow {
    pub record: Signal,
    pub outcome: Option<OutcomeData>,
    /// Hour of day (UTC) at signal creation; a model feature.
    pub hour_of_day: u32,
}

impl MemoryRow {
    pub fn new(record: Signal, outcome: Option<OutcomeData>) -> Self {
        let hour_of_day = record.created_at.hour();
        Self {
            record,
            outcome,
            hour_of_day,
        }
    }
}

/// Aggregate totals across every symbol, for the stats surface.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MemoryStats {
    pub total_signals: usize,
    pub finalized: usize,
    pub wins: usize,
    pub losses: usize,
    pub win_rate: f64,
    pub unique_symbols: usize,
    pub classifier_trained: bool,
    pub classifier_samples: usize,
}

enum MemoryCommand {
    RecordSignal(Box<Signal>),
    UpdateOutcome {
        signal_id: String,
        symbol: String,
        outcome: Box<OutcomeData>,
    },
}

type RowsCache = Arc<RwLock<HashMap<String, Vec<MemoryRow>>>>;
type IntelCache = Arc<RwLock<HashMap<String, CoinIntelligence>>>;

/// Cloneable front door to the learning subsystem.
#[derive(Clone)]
pub struct MemoryHandle {
    tx: mpsc::Sender<MemoryCommand>,
    rows: RowsCache,
    intelligence: IntelCache,
    classifier: Arc<RwLock<OutcomeClassifier>>,
    params: LearningParams,
}

impl MemoryHandle {
    /// Queue a freshly emitted signal for persistence.
    pub fn record_signal(&self, signal: Signal) {
        if let Err(e) = self.tx.try_send(MemoryCommand::RecordSignal(Box::new(signal))) {
            warn!(error = %e, "memory channel full — signal record dropped");
        }
    }

    /// Queue an outcome finalization.
    pub fn update_outcome(&self, signal_id: String, symbol: String, outcome: OutcomeData) {
        let cmd = MemoryCommand::UpdateOutcome {
            signal_id,
            symbol,
            outcome: Box::new(outcome),
        };
        if let Err(e) = self.tx.try_send(cmd) {
            warn!(error = %e, "memory channel full — outcome update dropped");
        }
    }

    /// Per-symbol intelligence (default profile for unseen symbols).
    pub fn intelligence(&self, symbol: &str) -> CoinIntelligence {
        self.intelligence
            .read()
            .get(symbol)
            .cloned()
            .unwrap_or_default()
    }

    /// Smart-prediction overlay for the current attempt.
    pub fn smart_prediction(
        &self,
        symbol: &str,
        pump_pct: f64,
        combined_score: f64,
        hour: u32,
    ) -> SmartPrediction {
        let intel = self.intelligence(symbol);
        let rows = self.rows.read();
        let symbol_rows = rows.get(symbol).map(Vec::as_slice).unwrap_or(&[]);
        intelligence::smart_prediction(symbol_rows, &intel, pump_pct, combined_score, hour)
    }

    /// Classifier win probability. `None` until the model has been trained
    /// on at least the configured minimum of finalized outcomes.
    pub fn classifier_probability(&self, features: &[f64; FEATURE_COUNT]) -> Option<f64> {
        let model = self.classifier.read();
        if model.training_samples < self.params.min_training_samples {
            return None;
        }
        model.predict(features).map(|p| p.probability)
    }

    /// Aggregate totals across all symbols.
    pub fn stats(&self) -> MemoryStats {
        let rows = self.rows.read();
        let mut stats = MemoryStats::default();
        for symbol_rows in rows.values() {
            stats.total_signals += symbol_rows.len();
            for row in symbol_rows {
                if let Some(outcome) = &row.outcome {
                    stats.finalized += 1;
                    if outcome.final_result.is_win() {
                        stats.wins += 1;
                    } else if outcome.final_result == FinalResult::LossSl {
                        stats.losses += 1;
                    }
                }
            }
        }
        stats.unique_symbols = rows.len();
        stats.win_rate = if stats.finalized > 0 {
            stats.wins as f64 / stats.finalized as f64
        } else {
            0.0
        };

        let model = self.classifier.read();
        stats.classifier_trained = model.trained;
        stats.classifier_samples = model.training_samples;
        stats
    }

    #[cfg(test)]
    pub fn rows_for(&self, symbol: &str) -> Vec<MemoryRow> {
        self.rows.read().get(symbol).cloned().unwrap_or_default()
    }
}

/// Open the store, replay the row log into the caches, load the classifier,
/// and start the single writer thread.
pub fn spawn_memory_service(params: &LearningParams) -> anyhow::Result<MemoryHandle> {
    let store = MemoryStore::open(&params.database_path)?;
    spawn_with_store(store, params)
}

/// Build the service over an already-open store.
fn spawn_with_store(store: MemoryStore, params: &LearningParams) -> anyhow::Result<MemoryHandle> {
    // Replay the durable log into the caches.
    let mut by_symbol: HashMap<String, Vec<MemoryRow>> = HashMap::new();
    for row in store.load_rows()? {
        by_symbol.entry(row.record.symbol.clone()).or_default().push(row);
    }

    let mut intel_map = HashMap::new();
    for (symbol, rows) in &by_symbol {
        intel_map.insert(
            symbol.clone(),
            intelligence::derive(rows, params.decay_factor),
        );
    }

    let classifier = OutcomeClassifier::load(&params.model_path).unwrap_or_else(|e| {
        warn!(error = %e, "failed to load classifier model — starting untrained");
        OutcomeClassifier::default()
    });

    info!(
        symbols = by_symbol.len(),
        rows = by_symbol.values().map(Vec::len).sum::<usize>(),
        classifier_trained = classifier.trained,
        "memory caches rebuilt from row log"
    );

    let rows: RowsCache = Arc::new(RwLock::new(by_symbol));
    let intelligence_cache: IntelCache = Arc::new(RwLock::new(intel_map));
    let classifier = Arc::new(RwLock::new(classifier));

    let (tx, rx) = mpsc::channel(4096);

    let handle = MemoryHandle {
        tx,
        rows: rows.clone(),
        intelligence: intelligence_cache.clone(),
        classifier: classifier.clone(),
        params: params.clone(),
    };

    let writer_params = params.clone();
    std::thread::Builder::new()
        .name("memory-writer".into())
        .spawn(move || {
            writer_loop(store, rx, rows, intelligence_cache, classifier, writer_params);
        })
        .map_err(|e| anyhow::anyhow!("failed to spawn memory writer thread: {e}"))?;

    Ok(handle)
}

/// The single writer: applies commands to disk and the caches in order.
fn writer_loop(
    store: MemoryStore,
    mut rx: mpsc::Receiver<MemoryCommand>,
    rows: RowsCache,
    intel_cache: IntelCache,
    classifier: Arc<RwLock<OutcomeClassifier>>,
    params: LearningParams,
) {
    while let Some(cmd) = rx.blocking_recv() {
        match cmd {
            MemoryCommand::RecordSignal(signal) => {
                if let Err(e) = store.insert_signal(&signal) {
                    warn!(signal_id = %signal.id, error = %e, "memory store write failed — continuing");
                }
                rows.write()
                    .entry(signal.symbol.clone())
                    .or_default()
                    .push(MemoryRow::new(*signal, None));
            }
            MemoryCommand::UpdateOutcome {
                signal_id,
                symbol,
                outcome,
            } => {
                // Cache check keeps outcomes monotonic even if the disk row
                // is missing (earlier write failure).
                let already_final = rows
                    .read()
                    .get(&symbol)
                    .and_then(|rs| rs.iter().find(|r| r.record.id == signal_id))
                    .is_some_and(|r| r.outcome.is_some());
                if already_final {
                    debug!(signal_id = %signal_id, "outcome already finalized — ignored");
                    continue;
                }

                match store.update_outcome(&signal_id, &outcome) {
                    Ok(true) => {}
                    Ok(false) => {
                        debug!(signal_id = %signal_id, "store row missing or finalized — cache only")
                    }
                    Err(e) => {
                        warn!(signal_id = %signal_id, error = %e, "memory store write failed — continuing")
                    }
                }

                {
                    let mut rows_guard = rows.write();
                    if let Some(row) = rows_guard
                        .get_mut(&symbol)
                        .and_then(|rs| rs.iter_mut().find(|r| r.record.id == signal_id))
                    {
                        row.outcome = Some(*outcome);
                    }
                }

                // Recompute the symbol aggregate and snapshot it.
                let intel = {
                    let rows_guard = rows.read();
                    let symbol_rows = rows_guard.get(&symbol).map(Vec::as_slice).unwrap_or(&[]);
                    intelligence::derive(symbol_rows, params.decay_factor)
                };
                if let Err(e) = store.save_intelligence(&symbol, &intel) {
                    warn!(symbol = %symbol, error = %e, "intelligence snapshot write failed");
                }
                info!(
                    symbol = %symbol,
                    total = intel.total_signals,
                    win_rate = format!("{:.0}%", intel.win_rate * 100.0),
                    action = %intel.recommended_action,
                    "coin intelligence updated"
                );
                intel_cache.write().insert(symbol.clone(), intel);

                retrain_classifier(&rows, &classifier, &params);
            }
        }
    }

    debug!("memory writer loop terminated");
}

/// Retrain after every finalized outcome once the minimum sample count is
/// reached; persist the refreshed model.
fn retrain_classifier(
    rows: &RowsCache,
    classifier: &Arc<RwLock<OutcomeClassifier>>,
    params: &LearningParams,
) {
    let rows_guard = rows.read();
    let all_rows: Vec<&MemoryRow> = rows_guard.values().flatten().collect();

    let mut model = classifier.write();
    if model.train(&all_rows, params.min_training_samples) {
        if let Err(e) = model.save(&params.model_path) {
            warn!(error = %e, "classifier model save failed");
        }
    }
}

// =============================================================================
// Test support + tests
// =============================================================================

/// Row builders shared by the memory/intelligence/classifier tests.
#[cfg(test)]
pub mod tests_support {
    use super::*;

    pub fn sample_signal(symbol: &str, pump_pct: f64, combined_score: f64) -> Signal {
        signal_with(symbol, pump_pct, combined_score, AnalyzerScores::neutral(), 12)
    }

    pub fn signal_with(
        symbol: &str,
        pump_pct: f64,
        combined_score: f64,
        scores: AnalyzerScores,
        hour: u32,
    ) -> Signal {
        let entry = 100.0;
        let created_at = Utc::now()
            .date_naive()
            .and_hms_opt(hour % 24, 0, 0)
            .expect("valid hour")
            .and_utc();
        Signal {
            id: uuid::Uuid::new_v4().to_string(),
            symbol: symbol.to_string(),
            created_at,
            kind: PumpKind::Fast,
            pump_pct,
            pump_speed_minutes: 3.0,
            entry_price: entry,
            peak_price: entry * 1.01,
            start_price: entry / (1.0 + pump_pct / 100.0),
            scores,
            combined_score,
            ml_probability: None,
            tier: Tier::B,
            sl_price: entry * 1.05,
            tp_prices: [entry * 0.85, entry * 0.90, entry * 0.95],
        }
    }

    pub fn sample_outcome(final_result: FinalResult) -> OutcomeData {
        OutcomeData {
            price_5m: Some(98.0),
            price_15m: Some(96.0),
            price_30m: Some(95.0),
            price_1h: Some(94.0),
            price_4h: Some(93.0),
            hit_tp1: final_result.is_win(),
            hit_tp2: matches!(final_result, FinalResult::WinTp2 | FinalResult::WinTp3),
            hit_tp3: matches!(final_result, FinalResult::WinTp3),
            hit_sl: final_result == FinalResult::LossSl,
            max_profit_pct: 5.0,
            max_drawdown_pct: 1.0,
            final_result,
        }
    }

    pub fn open_row(symbol: &str, pump_pct: f64, combined_score: f64, hour: u32) -> MemoryRow {
        MemoryRow::new(
            signal_with(symbol, pump_pct, combined_score, AnalyzerScores::neutral(), hour),
            None,
        )
    }

    pub fn finalized_row(
        symbol: &str,
        result: FinalResult,
        pump_pct: f64,
        combined_score: f64,
        hour: u32,
    ) -> MemoryRow {
        MemoryRow::new(
            signal_with(symbol, pump_pct, combined_score, AnalyzerScores::neutral(), hour),
            Some(sample_outcome(result)),
        )
    }

    pub fn finalized_row_with_scores(
        symbol: &str,
        result: FinalResult,
        pump_pct: f64,
        combined_score: f64,
        orderbook_score: f64,
        hour: u32,
    ) -> MemoryRow {
        let mut scores = AnalyzerScores::neutral();
        scores.orderbook = orderbook_score;
        MemoryRow::new(
            signal_with(symbol, pump_pct, combined_score, scores, hour),
            Some(sample_outcome(result)),
        )
    }
}
