// =============================================================================
// Coin Intelligence — pure derivation over a symbol's finalized outcomes
// =============================================================================
//
// Everything in this file is a deterministic function of the memory rows for
// one symbol: re-deriving from the rows must reproduce the stored aggregate
// exactly (the stored copy is only a fast-start cache).
//
//   win_rate          = wins / total
//   weighted_win_rate = Σ(decay^i · is_win_i) / Σ(decay^i), newest first
//   tp_k_rate, sl_rate — plain hit frequencies
//   tp/sl multipliers — learned stretch factors (the TP multiplier feeds
//   the level calculator; the SL multiplier is recorded for the profile)
//   confidence_adjustment — [-2, +2] step function of win_rate
//
// The smart-prediction overlay combines all of the above with the current
// attempt's pump size, combined score, and hour of day into a 0–10 score
// plus a textual reasoning bundle.

use serde::{Deserialize, Serialize};

use crate::memory::MemoryRow;
use crate::types::RecommendedAction;

/// Similar-signal window: |Δpump| < 10 % and |Δscore| < 2.
const SIMILAR_PUMP_BAND: f64 = 10.0;
const SIMILAR_SCORE_BAND: f64 = 2.0;
const SIMILAR_MIN_COUNT: usize = 5;

/// Mined entry conditions from winning rows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimalConditions {
    pub pump_min_pct: f64,
    pub pump_max_pct: f64,
    pub mean_combined_score: f64,
    /// Top-3 winning hours of day (UTC), most wins first.
    pub top_hours: Vec<u32>,
    /// Per-analyzer mean delta between wins and losses, most decisive first.
    pub feature_importance: Vec<(String, f64)>,
}

/// Per-symbol aggregate derived from all finalized outcomes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoinIntelligence {
    pub total_signals: usize,
    pub wins: usize,
    pub losses: usize,
    pub win_rate: f64,
    pub weighted_win_rate: f64,
    pub tp_hit_rates: [f64; 3],
    pub sl_hit_rate: f64,
    pub tp_multiplier: f64,
    pub sl_multiplier: f64,
    /// Score adjustment in [-2, +2] applied by the scoring engine.
    pub confidence_adjustment: f64,
    pub recommended_action: RecommendedAction,
    /// Signed length of the run ending at the newest outcome (+ wins, − losses).
    pub current_streak: i64,
    pub max_win_streak: usize,
    pub max_loss_streak: usize,
    pub is_hot: bool,
    pub is_cold: bool,
    pub optimal_conditions: Option<OptimalConditions>,
}

impl Default for CoinIntelligence {
    fn default() -> Self {
        Self {
            total_signals: 0,
            wins: 0,
            losses: 0,
            win_rate: 0.5,
            weighted_win_rate: 0.5,
            tp_hit_rates: [0.0; 3],
            sl_hit_rate: 0.0,
            tp_multiplier: 1.0,
            sl_multiplier: 1.0,
            confidence_adjustment: 0.0,
            recommended_action: RecommendedAction::Trade,
            current_streak: 0,
            max_win_streak: 0,
            max_loss_streak: 0,
            is_hot: false,
            is_cold: false,
            optimal_conditions: None,
        }
    }
}

/// Smart-prediction overlay output.
#[derive(Debug, Clone, Serialize)]
pub struct SmartPrediction {
    /// Overlay score in [0, 10]; 5.0 is neutral.
    pub score: f64,
    /// Confidence in percent, stepped by sample count.
    pub confidence_pct: u32,
    pub reasoning: Vec<String>,
}

impl SmartPrediction {
    pub fn neutral() -> Self {
        Self {
            score: 5.0,
            confidence_pct: 30,
            reasoning: Vec::new(),
        }
    }
}

/// Derive the full intelligence record from a symbol's rows (oldest first).
/// Rows without a finalized outcome are ignored.
pub fn derive(rows: &[MemoryRow], decay: f64) -> CoinIntelligence {
    let finalized: Vec<&MemoryRow> = rows.iter().filter(|r| r.outcome.is_some()).collect();
    if finalized.is_empty() {
        return CoinIntelligence::default();
    }

    let total = finalized.len();
    let results: Vec<bool> = finalized
        .iter()
        .map(|r| r.outcome.as_ref().is_some_and(|o| o.final_result.is_win()))
        .collect();

    let wins = results.iter().filter(|w| **w).count();
    let losses = finalized
        .iter()
        .filter(|r| {
            r.outcome
                .as_ref()
                .is_some_and(|o| o.final_result == crate::types::FinalResult::LossSl)
        })
        .count();

    let win_rate = wins as f64 / total as f64;
    let weighted_win_rate = weighted_win_rate(&results, decay);

    let hit_count = |f: fn(&crate::memory::OutcomeData) -> bool| {
        finalized
            .iter()
            .filter(|r| r.outcome.as_ref().is_some_and(f))
            .count() as f64
            / total as f64
    };
    let tp_hit_rates = [
        hit_count(|o| o.hit_tp1),
        hit_count(|o| o.hit_tp2),
        hit_count(|o| o.hit_tp3),
    ];
    let sl_hit_rate = hit_count(|o| o.hit_sl);

    // Learned level stretch: frequent early SL with weak TP1 => pull the
    // targets in; consistent TP3 => reach further.
    let (tp_multiplier, sl_multiplier) = if sl_hit_rate > 0.5 && tp_hit_rates[0] < 0.3 {
        (0.8, 1.2)
    } else if tp_hit_rates[2] > 0.5 {
        (1.2, 1.0)
    } else {
        (1.0, 1.0)
    };

    let (confidence_adjustment, recommended_action) = if win_rate >= 0.7 && total >= 5 {
        (1.0, RecommendedAction::Trade)
    } else if win_rate >= 0.5 {
        (0.0, RecommendedAction::Trade)
    } else if win_rate >= 0.3 {
        (-1.0, RecommendedAction::Caution)
    } else {
        (-2.0, RecommendedAction::Avoid)
    };

    let streaks = streak_info(&results);

    CoinIntelligence {
        total_signals: total,
        wins,
        losses,
        win_rate,
        weighted_win_rate,
        tp_hit_rates,
        sl_hit_rate,
        tp_multiplier,
        sl_multiplier,
        confidence_adjustment,
        recommended_action,
        current_streak: streaks.current,
        max_win_streak: streaks.max_win,
        max_loss_streak: streaks.max_loss,
        is_hot: streaks.current >= 3,
        is_cold: streaks.current <= -3,
        optimal_conditions: mine_optimal_conditions(&finalized),
    }
}

/// Exponentially decayed win rate; recent outcomes dominate.
/// `results` is oldest-first; the decay runs newest-first.
fn weighted_win_rate(results: &[bool], decay: f64) -> f64 {
    if results.is_empty() {
        return 0.5;
    }
    let mut weighted = 0.0;
    let mut total_weight = 0.0;
    for (i, is_win) in results.iter().rev().enumerate() {
        let weight = decay.powi(i as i32);
        if *is_win {
            weighted += weight;
        }
        total_weight += weight;
    }
    if total_weight > 0.0 {
        weighted / total_weight
    } else {
        0.5
    }
}

struct StreakInfo {
    current: i64,
    max_win: usize,
    max_loss: usize,
}

/// Consecutive-result runs; `results` oldest-first.
fn streak_info(results: &[bool]) -> StreakInfo {
    let Some(&newest) = results.last() else {
        return StreakInfo { current: 0, max_win: 0, max_loss: 0 };
    };

    let mut current = 0i64;
    for &r in results.iter().rev() {
        if r == newest {
            current += 1;
        } else {
            break;
        }
    }
    if !newest {
        current = -current;
    }

    let mut max_win = 0usize;
    let mut max_loss = 0usize;
    let mut run_win = 0usize;
    let mut run_loss = 0usize;
    for &r in results {
        if r {
            run_win += 1;
            run_loss = 0;
            max_win = max_win.max(run_win);
        } else {
            run_loss += 1;
            run_win = 0;
            max_loss = max_loss.max(run_loss);
        }
    }

    StreakInfo { current, max_win, max_loss }
}

/// Mine winning-entry conditions. Needs at least five finalized rows and one
/// win to say anything.
fn mine_optimal_conditions(finalized: &[&MemoryRow]) -> Option<OptimalConditions> {
    if finalized.len() < 5 {
        return None;
    }

    let (wins, losses): (Vec<&&MemoryRow>, Vec<&&MemoryRow>) = finalized.iter().partition(|r| {
        r.outcome.as_ref().is_some_and(|o| o.final_result.is_win())
    });
    if wins.is_empty() {
        return None;
    }

    let win_pumps: Vec<f64> = wins.iter().map(|r| r.record.pump_pct).collect();
    let pump_min_pct = win_pumps.iter().copied().fold(f64::MAX, f64::min);
    let pump_max_pct = win_pumps.iter().copied().fold(f64::MIN, f64::max);

    let mean_combined_score =
        wins.iter().map(|r| r.record.combined_score).sum::<f64>() / wins.len() as f64;

    // Top-3 winning hours.
    let mut hour_counts = [0usize; 24];
    for r in &wins {
        hour_counts[r.hour_of_day as usize % 24] += 1;
    }
    let mut hours: Vec<(u32, usize)> = hour_counts
        .iter()
        .enumerate()
        .filter(|(_, c)| **c > 0)
        .map(|(h, c)| (h as u32, *c))
        .collect();
    hours.sort_by(|a, b| b.1.cmp(&a.1));
    let top_hours = hours.into_iter().take(3).map(|(h, _)| h).collect();

    // Per-analyzer mean(win) − mean(loss): which factors actually separated
    // the outcomes for this symbol.
    let names = crate::memory::classifier::ANALYZER_FEATURE_NAMES;
    let mean_scores = |rows: &[&&MemoryRow]| -> [f64; 10] {
        let mut sums = [0.0f64; 10];
        for r in rows {
            for (slot, value) in sums.iter_mut().zip(r.record.scores.as_array()) {
                *slot += value;
            }
        }
        let n = rows.len().max(1) as f64;
        sums.map(|s| s / n)
    };
    let win_means = mean_scores(&wins);
    let loss_means = if losses.is_empty() {
        [5.0; 10]
    } else {
        mean_scores(&losses)
    };

    let mut feature_importance: Vec<(String, f64)> = names
        .iter()
        .zip(win_means.iter().zip(loss_means.iter()))
        .map(|(name, (w, l))| (name.to_string(), w - l))
        .collect();
    feature_importance.sort_by(|a, b| b.1.abs().total_cmp(&a.1.abs()));

    Some(OptimalConditions {
        pump_min_pct,
        pump_max_pct,
        mean_combined_score,
        top_hours,
        feature_importance,
    })
}

/// The smart-prediction overlay (reasoning-based corrections around 5.0).
pub fn smart_prediction(
    rows: &[MemoryRow],
    intel: &CoinIntelligence,
    pump_pct: f64,
    combined_score: f64,
    hour: u32,
) -> SmartPrediction {
    let total = intel.total_signals;
    if total == 0 {
        return SmartPrediction::neutral();
    }

    let mut score = 5.0f64;
    let mut reasoning = Vec::new();

    // Historical win rate.
    if intel.win_rate >= 0.7 {
        score += 2.0;
        reasoning.push(format!(
            "strong historical win rate {:.0}%",
            intel.win_rate * 100.0
        ));
    } else if intel.win_rate >= 0.5 {
        score += 0.5;
    } else if intel.win_rate < 0.3 && total >= 5 {
        score -= 2.0;
        reasoning.push(format!(
            "poor historical win rate {:.0}%",
            intel.win_rate * 100.0
        ));
    }

    // Recent-form divergence from the lifetime rate.
    if intel.weighted_win_rate > intel.win_rate + 0.1 {
        score += 0.5;
        reasoning.push(format!(
            "recent signals improving ({:.0}%)",
            intel.weighted_win_rate * 100.0
        ));
    } else if intel.weighted_win_rate < intel.win_rate - 0.1 {
        score -= 0.5;
        reasoning.push(format!(
            "recent signals degrading ({:.0}%)",
            intel.weighted_win_rate * 100.0
        ));
    }

    // Similar historical setups.
    let similar: Vec<&MemoryRow> = rows
        .iter()
        .filter(|r| r.outcome.is_some())
        .filter(|r| {
            (r.record.pump_pct - pump_pct).abs() < SIMILAR_PUMP_BAND
                && (r.record.combined_score - combined_score).abs() < SIMILAR_SCORE_BAND
        })
        .collect();
    if similar.len() >= SIMILAR_MIN_COUNT {
        let similar_wins = similar
            .iter()
            .filter(|r| r.outcome.as_ref().is_some_and(|o| o.final_result.is_win()))
            .count();
        let similar_wr = similar_wins as f64 / similar.len() as f64;
        if similar_wr >= 0.7 {
            score += 1.0;
            reasoning.push(format!(
                "{} similar setups won {:.0}%",
                similar.len(),
                similar_wr * 100.0
            ));
        } else if similar_wr <= 0.3 {
            score -= 1.0;
            reasoning.push(format!(
                "{} similar setups won only {:.0}%",
                similar.len(),
                similar_wr * 100.0
            ));
        }
    }

    // Streaks.
    if intel.is_hot {
        score += 0.5;
        reasoning.push(format!("hot streak: {} wins in a row", intel.current_streak));
    } else if intel.is_cold {
        score -= 0.5;
        reasoning.push(format!(
            "cold streak: {} losses in a row",
            intel.current_streak.abs()
        ));
    }

    // Mined optimal conditions.
    if let Some(opt) = &intel.optimal_conditions {
        if pump_pct >= opt.pump_min_pct && pump_pct <= opt.pump_max_pct {
            score += 0.5;
            reasoning.push(format!(
                "pump inside the optimal {:.1}–{:.1}% range",
                opt.pump_min_pct, opt.pump_max_pct
            ));
        }
        if opt.top_hours.contains(&hour) {
            score += 0.5;
            reasoning.push(format!("hour {hour}:00 UTC is a top winning hour"));
        }
    }

    // Raw combined score.
    if combined_score >= 8.0 {
        score += 1.0;
    } else if combined_score >= 7.0 {
        score += 0.5;
    } else if combined_score < 5.0 {
        score -= 1.0;
    }

    let confidence_pct = if total >= 20 {
        90
    } else if total >= 10 {
        70
    } else if total >= 5 {
        50
    } else {
        30
    };

    SmartPrediction {
        score: score.clamp(0.0, 10.0),
        confidence_pct,
        reasoning,
    }
}
