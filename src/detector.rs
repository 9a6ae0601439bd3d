// =============================================================================
// Pump Detector — two-window FAST / ELITE detection over a snapshot series
// =============================================================================
//
// Pure function over a symbol's snapshot series.  Two fixed windows are
// evaluated against the same series:
//
//   | Kind  | Window    | Threshold  | Priority |
//   |-------|-----------|------------|----------|
//   | FAST  | <= 5 min  | >= 10 %    | higher   |
//   | ELITE | <= 20 min | >= 20 %    | lower    |
//
// FAST wins every tie: the faster classification is strictly more
// informative for entry quality.
//
// Staleness filter: a pump whose peak is old (> 3 min) but has not begun
// reversing (< 1.5 % below the peak) is discarded — waiting longer on it is
// wasted. A pump that HAS begun falling stays valuable: entry at the start
// of the reversal.
// =============================================================================

use chrono::{DateTime, Utc};

use crate::market_data::Snapshot;
use crate::runtime_config::DetectionParams;
use crate::types::PumpKind;

/// Elapsed-minutes floor; guards division downstream when the start and the
/// peak land on the same tick.
const MIN_ELAPSED_MINUTES: f64 = 0.1;

/// A detected pump, handed to the signal orchestrator.
#[derive(Debug, Clone)]
pub struct PumpEvent {
    pub symbol: String,
    pub kind: PumpKind,
    /// Rise from window start to peak, percent.
    pub pump_pct: f64,
    /// Minutes from the window-start snapshot to the peak snapshot.
    pub elapsed_minutes: f64,
    pub price_start: f64,
    pub price_peak: f64,
    pub current_price: f64,
    pub detected_at: DateTime<Utc>,
}

/// Candidate produced by a single window before the tie-break.
struct WindowCandidate {
    kind: PumpKind,
    pump_pct: f64,
    elapsed_minutes: f64,
    price_start: f64,
    price_peak: f64,
    peak_ts_ms: i64,
}

/// Run pump detection on `series` (oldest first) as of `now_ms`.
///
/// Returns `None` when no window qualifies or the staleness filter rejects
/// the winning candidate.
pub fn detect(
    symbol: &str,
    series: &[Snapshot],
    now_ms: i64,
    params: &DetectionParams,
) -> Option<PumpEvent> {
    if series.len() < 2 {
        return None;
    }

    let current = series.last()?;

    let fast = evaluate_window(
        series,
        now_ms,
        PumpKind::Fast,
        params.fast_window_min,
        params.fast_threshold_pct,
    );
    let elite = evaluate_window(
        series,
        now_ms,
        PumpKind::Elite,
        params.elite_window_min,
        params.elite_threshold_pct,
    );

    // FAST outranks ELITE when both qualify.
    let candidate = fast.or(elite)?;

    // Staleness: old peak that has not begun reversing.
    let peak_age_min = (now_ms - candidate.peak_ts_ms) as f64 / 60_000.0;
    let drop_from_peak_pct = if candidate.price_peak > 0.0 {
        (candidate.price_peak - current.price) / candidate.price_peak * 100.0
    } else {
        0.0
    };
    if peak_age_min > params.stale_peak_age_min && drop_from_peak_pct < params.stale_drop_pct {
        return None;
    }

    Some(PumpEvent {
        symbol: symbol.to_string(),
        kind: candidate.kind,
        pump_pct: candidate.pump_pct,
        elapsed_minutes: candidate.elapsed_minutes,
        price_start: candidate.price_start,
        price_peak: candidate.price_peak,
        current_price: current.price,
        detected_at: Utc::now(),
    })
}

fn evaluate_window(
    series: &[Snapshot],
    now_ms: i64,
    kind: PumpKind,
    window_min: f64,
    threshold_pct: f64,
) -> Option<WindowCandidate> {
    let cutoff = now_ms - (window_min * 60_000.0) as i64;
    let slice: Vec<&Snapshot> = series.iter().filter(|s| s.ts_ms >= cutoff).collect();
    if slice.len() < 2 {
        return None;
    }

    let start = slice
        .iter()
        .min_by(|a, b| a.price.total_cmp(&b.price))?;
    let peak = slice
        .iter()
        .max_by(|a, b| a.price.total_cmp(&b.price))?;

    if start.price <= 0.0 {
        return None;
    }

    let rise_pct = (peak.price - start.price) / start.price * 100.0;
    if rise_pct < threshold_pct {
        return None;
    }

    let elapsed_minutes =
        ((peak.ts_ms - start.ts_ms) as f64 / 60_000.0).max(MIN_ELAPSED_MINUTES);

    Some(WindowCandidate {
        kind,
        pump_pct: rise_pct,
        elapsed_minutes,
        price_start: start.price,
        price_peak: peak.price,
        peak_ts_ms: peak.ts_ms,
    })
}
