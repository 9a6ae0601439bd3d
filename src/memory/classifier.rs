// =============================================================================
// Outcome Classifier — difference-of-means model with sigmoid scoring
// =============================================================================
//
// Trained on finalized memory rows (label 1 when final_result is a WIN).
// Per feature:
//
//   weight    = mean(feature | win) − mean(feature | loss)
//   threshold = midpoint of the two means
//
// Prediction:
//
//   p = σ( Σ (x_i − threshold_i) · weight_i · 0.1 )
//
// `predict` is pure for a fixed trained model. The model is consulted only
// once at least `min_training_samples` outcomes exist; until then callers
// ignore it. Weights persist as JSON next to the database (atomic
// tmp + rename, like the runtime config).

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::memory::MemoryRow;

/// Number of model features.
pub const FEATURE_COUNT: usize = 14;

/// The ten per-analyzer score features, in roster order.
pub const ANALYZER_FEATURE_NAMES: [&str; 10] = [
    "orderbook",
    "open_interest",
    "funding",
    "liquidation",
    "btc_correlation",
    "multi_timeframe",
    "volume_profile",
    "cross_pair",
    "precision",
    "candle_structure",
];

/// All feature names, in vector order.
pub const FEATURE_NAMES: [&str; FEATURE_COUNT] = [
    "pump_pct",
    "combined_score",
    "orderbook",
    "open_interest",
    "funding",
    "liquidation",
    "btc_correlation",
    "multi_timeframe",
    "volume_profile",
    "cross_pair",
    "precision",
    "candle_structure",
    "pump_speed_min",
    "hour_of_day",
];

/// Sample-size confidence bands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModelConfidence {
    High,
    Medium,
    Low,
    NoModel,
}

/// One prediction from the trained model.
#[derive(Debug, Clone, Serialize)]
pub struct Prediction {
    /// P(win) in [0, 1].
    pub probability: f64,
    pub predicted_win: bool,
    pub confidence: ModelConfidence,
    /// Per-feature signed contribution to the raw score.
    pub feature_contributions: Vec<(String, f64)>,
}

/// Feature vector for one signal attempt.
pub fn feature_vector(row: &MemoryRow) -> [f64; FEATURE_COUNT] {
    let scores = row.record.scores.as_array();
    [
        row.record.pump_pct,
        row.record.combined_score,
        scores[0],
        scores[1],
        scores[2],
        scores[3],
        scores[4],
        scores[5],
        scores[6],
        scores[7],
        scores[8],
        scores[9],
        row.record.pump_speed_minutes,
        row.hour_of_day as f64,
    ]
}

/// The trained model: per-feature weights and thresholds.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct OutcomeClassifier {
    pub weights: Vec<f64>,
    pub thresholds: Vec<f64>,
    pub trained: bool,
    pub training_samples: usize,
}

impl OutcomeClassifier {
    /// Train on the finalized rows. Returns `false` (leaving any previous
    /// model intact) when fewer than `min_samples` are available.
    pub fn train(&mut self, rows: &[&MemoryRow], min_samples: usize) -> bool {
        let finalized: Vec<&&MemoryRow> = rows.iter().filter(|r| r.outcome.is_some()).collect();
        if finalized.len() < min_samples {
            debug!(
                available = finalized.len(),
                required = min_samples,
                "classifier training postponed — not enough samples"
            );
            return false;
        }

        let mut win_sums = [0.0f64; FEATURE_COUNT];
        let mut loss_sums = [0.0f64; FEATURE_COUNT];
        let mut win_count = 0usize;
        let mut loss_count = 0usize;

        for row in &finalized {
            let features = feature_vector(row);
            let is_win = row
                .outcome
                .as_ref()
                .is_some_and(|o| o.final_result.is_win());
            if is_win {
                win_count += 1;
                for (slot, f) in win_sums.iter_mut().zip(features) {
                    *slot += f;
                }
            } else {
                loss_count += 1;
                for (slot, f) in loss_sums.iter_mut().zip(features) {
                    *slot += f;
                }
            }
        }

        let mut weights = Vec::with_capacity(FEATURE_COUNT);
        let mut thresholds = Vec::with_capacity(FEATURE_COUNT);
        for i in 0..FEATURE_COUNT {
            let win_mean = if win_count > 0 {
                win_sums[i] / win_count as f64
            } else {
                5.0
            };
            let loss_mean = if loss_count > 0 {
                loss_sums[i] / loss_count as f64
            } else {
                5.0
            };
            weights.push(win_mean - loss_mean);
            thresholds.push((win_mean + loss_mean) / 2.0);
        }

        self.weights = weights;
        self.thresholds = thresholds;
        self.trained = true;
        self.training_samples = finalized.len();

        info!(
            samples = self.training_samples,
            wins = win_count,
            losses = loss_count,
            "classifier retrained"
        );
        true
    }

    /// Calibrated win probability for a feature vector. Pure for a fixed
    /// model; `None` until the model is trained.
    pub fn predict(&self, features: &[f64; FEATURE_COUNT]) -> Option<Prediction> {
        if !self.trained || self.weights.len() != FEATURE_COUNT {
            return None;
        }

        let mut raw = 0.0f64;
        let mut contributions = Vec::with_capacity(FEATURE_COUNT);
        for i in 0..FEATURE_COUNT {
            let contrib = (features[i] - self.thresholds[i]) * self.weights[i] * 0.1;
            raw += contrib;
            contributions.push((FEATURE_NAMES[i].to_string(), contrib));
        }

        let probability = if raw.abs() < 10.0 {
            1.0 / (1.0 + (-raw).exp())
        } else if raw > 0.0 {
            1.0
        } else {
            0.0
        };

        let confidence = if self.training_samples >= 50 {
            ModelConfidence::High
        } else if self.training_samples >= 20 {
            ModelConfidence::Medium
        } else {
            ModelConfidence::Low
        };

        Some(Prediction {
            probability,
            predicted_win: probability >= 0.5,
            confidence,
            feature_contributions: contributions,
        })
    }

    /// Load a persisted model; default (untrained) when the file is missing.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read classifier model from {}", path.display()))?;
        let model: Self = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse classifier model from {}", path.display()))?;
        info!(
            path = %path.display(),
            trained = model.trained,
            samples = model.training_samples,
            "classifier model loaded"
        );
        Ok(model)
    }

    /// Persist the model atomically (tmp + rename).
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("failed to create model dir {}", dir.display()))?;
        }

        let content =
            serde_json::to_string_pretty(self).context("failed to serialise classifier model")?;

        let tmp_path = path.with_extension("json.tmp");
        std::fs::write(&tmp_path, &content)
            .with_context(|| format!("failed to write tmp model to {}", tmp_path.display()))?;
        std::fs::rename(&tmp_path, path)
            .with_context(|| format!("failed to rename tmp model to {}", path.display()))?;

        debug!(path = %path.display(), "classifier model saved");
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::tests_support::finalized_row_with_scores;
    use crate::types::FinalResult;

    /// Wins carry high orderbook scores, losses low ones — the model must
    /// learn a positive orderbook weight.
    fn training_rows() -> Vec<MemoryRow> {
        let mut rows = Vec::new();
        for i in 0..12 {
            rows.push(finalized_row_with_scores(
                "X",
                FinalResult::WinTp1,
                20.0,
                8.0,
                8.5,
                i,
            ));
            rows.push(finalized_row_with_scores(
                "X",
                FinalResult::LossSl,
                10.0,
                5.0,
                2.5,
                i,
            ));
        }
        rows
    }

    #[test]
    fn training_requires_min_samples() {
        let rows = training_rows();
        let refs: Vec<&MemoryRow> = rows.iter().take(5).collect();
        let mut model = OutcomeClassifier::default();
        assert!(!model.train(&refs, 20));
        assert!(!model.trained);
    }

    #[test]
    fn training_learns_separating_weights() {
        let rows = training_rows();
        let refs: Vec<&MemoryRow> = rows.iter().collect();
        let mut model = OutcomeClassifier::default();
        assert!(model.train(&refs, 20));
        assert!(model.trained);

        // pump_pct (index 0) and orderbook (index 2) separate wins from losses.
        assert!(model.weights[0] > 0.0);
        assert!(model.weights[2] > 0.0);
    }

    #[test]
    fn prediction_separates_win_and_loss_profiles() {
        let rows = training_rows();
        let refs: Vec<&MemoryRow> = rows.iter().collect();
        let mut model = OutcomeClassifier::default();
        model.train(&refs, 20);

        let win_like = feature_vector(&rows[0]);
        let loss_like = feature_vector(&rows[1]);

        let p_win = model.predict(&win_like).unwrap();
        let p_loss = model.predict(&loss_like).unwrap();
        assert!(p_win.probability > 0.5);
        assert!(p_loss.probability < 0.5);
        assert!(p_win.predicted_win);
        assert!(!p_loss.predicted_win);
    }

    #[test]
    fn predict_is_pure() {
        let rows = training_rows();
        let refs: Vec<&MemoryRow> = rows.iter().collect();
        let mut model = OutcomeClassifier::default();
        model.train(&refs, 20);

        let features = feature_vector(&rows[0]);
        let a = model.predict(&features).unwrap();
        let b = model.predict(&features).unwrap();
        assert!((a.probability - b.probability).abs() < 1e-12);
    }

    #[test]
    fn untrained_model_predicts_nothing() {
        let model = OutcomeClassifier::default();
        assert!(model.predict(&[5.0; FEATURE_COUNT]).is_none());
    }

    #[test]
    fn model_roundtrips_through_disk() {
        let rows = training_rows();
        let refs: Vec<&MemoryRow> = rows.iter().collect();
        let mut model = OutcomeClassifier::default();
        model.train(&refs, 20);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.json");
        model.save(&path).unwrap();

        let loaded = OutcomeClassifier::load(&path).unwrap();
        assert_eq!(loaded.training_samples, model.training_samples);
        let features = feature_vector(&rows[0]);
        assert!(
            (loaded.predict(&features).unwrap().probability
                - model.predict(&features).unwrap().probability)
                .abs()
                < 1e-12
        );
    }

    #[test]
    fn missing_model_file_loads_default() {
        let model = OutcomeClassifier::load("does/not/exist.json").unwrap();
        assert!(!model.trained);
    }
}
