// =============================================================================
// Scoring Engine — analyzer fusion, memory adjustment, classifier blend, tier
// =============================================================================
//
// Combination pipeline for one signal attempt:
//
//   1. base     = unweighted mean of the ten analyzer scores. Per-analyzer
//                 weights were an over-fitting surface; each analyzer's own
//                 scale already encodes its confidence, and the per-symbol
//                 adaptation lives in the memory layer instead.
//   2. adjusted = clamp(base + memory.confidence_adjustment, 0, 10)
//   3. blended  = (adjusted + P(win) * 10) / 2 when the classifier is
//                 trained; otherwise adjusted.
//   4. final    = clamp(blended + clamp(overlay - 5, -2, +2), 0, 10) — the
//                 smart-prediction overlay contributes its displacement from
//                 the neutral 5.0, capped at +/- 2.
//   5. tier     = A (>= 8.0) | B (>= 6.0) | REJECT.
//
// REJECT is logged and returned; it never broadcasts.

use chrono::Timelike;
use serde::Serialize;
use tracing::debug;

use crate::analyzers::AnalyzerScores;
use crate::detector::PumpEvent;
use crate::memory::{self, MemoryHandle, SmartPrediction};
use crate::runtime_config::ScoringParams;
use crate::types::Tier;

/// Full scoring trace for one attempt; persisted with the signal and shown
/// in the broadcast breakdown.
#[derive(Debug, Clone, Serialize)]
pub struct ScoreBreakdown {
    pub base: f64,
    pub memory_adjustment: f64,
    pub adjusted: f64,
    pub ml_probability: Option<f64>,
    pub blended: f64,
    pub overlay: SmartPrediction,
    pub overlay_correction: f64,
    pub final_score: f64,
    pub tier: Tier,
}

/// Run the full combination pipeline against the learning store.
pub fn evaluate(
    memory: &MemoryHandle,
    params: &ScoringParams,
    pump: &PumpEvent,
    scores: &AnalyzerScores,
) -> ScoreBreakdown {
    let intel = memory.intelligence(&pump.symbol);
    let hour = pump.detected_at.hour();

    let base = scores.mean();
    let adjusted = (base + intel.confidence_adjustment).clamp(0.0, 10.0);

    // Classifier blend: ignored entirely until the model has enough
    // finalized outcomes behind it.
    let features = feature_vector_for(pump, adjusted, scores, hour);
    let ml_probability = memory.classifier_probability(&features);
    let blended = blend(adjusted, ml_probability);

    let overlay = memory.smart_prediction(&pump.symbol, pump.pump_pct, blended, hour);
    let overlay_correction = overlay_correction(overlay.score);

    let final_score = (blended + overlay_correction).clamp(0.0, 10.0);
    let tier = classify_tier(final_score, params);

    debug!(
        symbol = %pump.symbol,
        base = format!("{base:.2}"),
        adjusted = format!("{adjusted:.2}"),
        ml = ?ml_probability,
        overlay = format!("{:.2}", overlay.score),
        final_score = format!("{final_score:.2}"),
        tier = %tier,
        "score combined"
    );

    ScoreBreakdown {
        base,
        memory_adjustment: intel.confidence_adjustment,
        adjusted,
        ml_probability,
        blended,
        overlay,
        overlay_correction,
        final_score,
        tier,
    }
}

/// Assemble the classifier feature vector for the current attempt.
fn feature_vector_for(
    pump: &PumpEvent,
    combined_score: f64,
    scores: &AnalyzerScores,
    hour: u32,
) -> [f64; memory::FEATURE_COUNT] {
    let s = scores.as_array();
    [
        pump.pump_pct,
        combined_score,
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
        pump.elapsed_minutes,
        hour as f64,
    ]
}

/// Blend the adjusted score with the classifier probability.
pub fn blend(adjusted: f64, ml_probability: Option<f64>) -> f64 {
    match ml_probability {
        Some(p) => (adjusted + p * 10.0) / 2.0,
        None => adjusted,
    }
}

/// The overlay's displacement from its neutral 5.0 baseline, capped at ±2.
pub fn overlay_correction(overlay_score: f64) -> f64 {
    (overlay_score - 5.0).clamp(-2.0, 2.0)
}

/// Tier from the final score.
pub fn classify_tier(score: f64, params: &ScoringParams) -> Tier {
    if score >= params.tier_a_min {
        Tier::A
    } else if score >= params.tier_b_min {
        Tier::B
    } else {
        Tier::Reject
    }
}
