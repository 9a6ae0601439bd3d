// =============================================================================
// Runtime Configuration — Hot-loadable engine settings with atomic save
// =============================================================================
//
// Central configuration hub for the Meridian engine.  Every tunable parameter
// lives here so the engine can be re-tuned without a rebuild.
//
// Persistence uses an atomic tmp + rename pattern to prevent corruption on
// crash.  All fields carry `#[serde(default)]` so that adding new fields
// never breaks loading an older config file.
// =============================================================================

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::types::OutcomeSource;

// =============================================================================
// Default-value helpers (required by serde `default = "..."` attribute)
// =============================================================================

fn default_poll_interval_ms() -> u64 {
    50
}

fn default_retention_minutes() -> i64 {
    40
}

fn default_fast_window_min() -> f64 {
    5.0
}

fn default_fast_threshold_pct() -> f64 {
    10.0
}

fn default_elite_window_min() -> f64 {
    20.0
}

fn default_elite_threshold_pct() -> f64 {
    20.0
}

fn default_stale_peak_age_min() -> f64 {
    3.0
}

fn default_stale_drop_pct() -> f64 {
    1.5
}

fn default_repeat_threshold_pct() -> f64 {
    10.0
}

fn default_replace_rise_pct() -> f64 {
    5.0
}

fn default_signal_cooldown_minutes() -> f64 {
    30.0
}

fn default_no_signal_cooldown_minutes() -> f64 {
    30.0
}

fn default_fast_confirm_timeout_secs() -> f64 {
    60.0
}

fn default_fast_reversal_pct() -> f64 {
    0.5
}

fn default_fast_confirm_poll_ms() -> u64 {
    500
}

fn default_elite_confirm_timeout_secs() -> f64 {
    120.0
}

fn default_elite_reversal_pct() -> f64 {
    1.0
}

fn default_elite_confirm_poll_ms() -> u64 {
    1000
}

fn default_analyzing_max_minutes() -> f64 {
    15.0
}

fn default_analyzing_fast_phase_minutes() -> f64 {
    2.0
}

fn default_analyzing_fast_poll_secs() -> u64 {
    2
}

fn default_analyzing_slow_poll_secs() -> u64 {
    5
}

fn default_analyzer_timeout_secs() -> u64 {
    3
}

fn default_wall_threshold_pct() -> f64 {
    5.0
}

fn default_oi_lookback_min() -> f64 {
    5.0
}

fn default_reference_symbol() -> String {
    "BTC_USDT".to_string()
}

fn default_tier_a_min() -> f64 {
    8.0
}

fn default_tier_b_min() -> f64 {
    6.0
}

fn default_outcome_check_secs() -> u64 {
    30
}

fn default_breakeven_band_pct() -> f64 {
    0.5
}

fn default_trailing_enabled() -> bool {
    true
}

fn default_activation_pct() -> f64 {
    2.0
}

fn default_trail_distance_pct() -> f64 {
    1.0
}

fn default_max_tracking_minutes() -> f64 {
    240.0
}

fn default_trailing_check_secs() -> u64 {
    5
}

fn default_min_training_samples() -> usize {
    20
}

fn default_decay_factor() -> f64 {
    0.95
}

fn default_database_path() -> String {
    "data/memory.db".to_string()
}

fn default_model_path() -> String {
    "data/classifier.json".to_string()
}

fn default_rest_endpoint() -> String {
    "https://contract.mexc.com".to_string()
}

fn default_request_timeout_secs() -> u64 {
    10
}

fn default_max_connections() -> usize {
    100
}

fn default_max_connections_per_host() -> usize {
    50
}

fn default_keepalive_secs() -> u64 {
    30
}

// =============================================================================
// Parameter groups
// =============================================================================

/// Two-window pump detection thresholds plus the staleness filter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionParams {
    /// FAST window length in minutes.
    #[serde(default = "default_fast_window_min")]
    pub fast_window_min: f64,

    /// Minimum rise for a FAST pump, percent.
    #[serde(default = "default_fast_threshold_pct")]
    pub fast_threshold_pct: f64,

    /// ELITE window length in minutes.
    #[serde(default = "default_elite_window_min")]
    pub elite_window_min: f64,

    /// Minimum rise for an ELITE pump, percent.
    #[serde(default = "default_elite_threshold_pct")]
    pub elite_threshold_pct: f64,

    /// A pump whose peak is older than this many minutes...
    #[serde(default = "default_stale_peak_age_min")]
    pub stale_peak_age_min: f64,

    /// ...and has not yet dropped this far from the peak is discarded.
    #[serde(default = "default_stale_drop_pct")]
    pub stale_drop_pct: f64,
}

impl Default for DetectionParams {
    fn default() -> Self {
        Self {
            fast_window_min: default_fast_window_min(),
            fast_threshold_pct: default_fast_threshold_pct(),
            elite_window_min: default_elite_window_min(),
            elite_threshold_pct: default_elite_threshold_pct(),
            stale_peak_age_min: default_stale_peak_age_min(),
            stale_drop_pct: default_stale_drop_pct(),
        }
    }
}

/// Notification debounce and per-symbol cooldown settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DebounceParams {
    /// Peak must exceed the last-notified peak by this much to re-notify.
    #[serde(default = "default_repeat_threshold_pct")]
    pub repeat_threshold_pct: f64,

    /// Minimum minutes between notifications for one symbol (0 disables).
    #[serde(default)]
    pub cooldown_minutes: f64,

    /// A new peak this far above the last-notified peak replaces the
    /// running monitor.
    #[serde(default = "default_replace_rise_pct")]
    pub replace_rise_pct: f64,

    /// Minimum minutes between emitted signals for one symbol.
    #[serde(default = "default_signal_cooldown_minutes")]
    pub signal_cooldown_minutes: f64,

    /// Minimum minutes between "entry not found" notices for one symbol.
    #[serde(default = "default_no_signal_cooldown_minutes")]
    pub no_signal_cooldown_minutes: f64,
}

impl Default for DebounceParams {
    fn default() -> Self {
        Self {
            repeat_threshold_pct: default_repeat_threshold_pct(),
            cooldown_minutes: 0.0,
            replace_rise_pct: default_replace_rise_pct(),
            signal_cooldown_minutes: default_signal_cooldown_minutes(),
            no_signal_cooldown_minutes: default_no_signal_cooldown_minutes(),
        }
    }
}

/// Kind-adaptive reversal-confirmation parameters (§ monitor loop).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfirmationParams {
    #[serde(default = "default_fast_confirm_timeout_secs")]
    pub fast_timeout_secs: f64,

    #[serde(default = "default_fast_reversal_pct")]
    pub fast_reversal_pct: f64,

    #[serde(default = "default_fast_confirm_poll_ms")]
    pub fast_poll_ms: u64,

    #[serde(default = "default_elite_confirm_timeout_secs")]
    pub elite_timeout_secs: f64,

    #[serde(default = "default_elite_reversal_pct")]
    pub elite_reversal_pct: f64,

    #[serde(default = "default_elite_confirm_poll_ms")]
    pub elite_poll_ms: u64,
}

impl Default for ConfirmationParams {
    fn default() -> Self {
        Self {
            fast_timeout_secs: default_fast_confirm_timeout_secs(),
            fast_reversal_pct: default_fast_reversal_pct(),
            fast_poll_ms: default_fast_confirm_poll_ms(),
            elite_timeout_secs: default_elite_confirm_timeout_secs(),
            elite_reversal_pct: default_elite_reversal_pct(),
            elite_poll_ms: default_elite_confirm_poll_ms(),
        }
    }
}

/// Extended (slow-path) monitoring loop bounds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzingParams {
    #[serde(default = "default_analyzing_max_minutes")]
    pub max_minutes: f64,

    /// The first phase polls faster than the rest of the loop.
    #[serde(default = "default_analyzing_fast_phase_minutes")]
    pub fast_phase_minutes: f64,

    #[serde(default = "default_analyzing_fast_poll_secs")]
    pub fast_poll_secs: u64,

    #[serde(default = "default_analyzing_slow_poll_secs")]
    pub slow_poll_secs: u64,
}

impl Default for AnalyzingParams {
    fn default() -> Self {
        Self {
            max_minutes: default_analyzing_max_minutes(),
            fast_phase_minutes: default_analyzing_fast_phase_minutes(),
            fast_poll_secs: default_analyzing_fast_poll_secs(),
            slow_poll_secs: default_analyzing_slow_poll_secs(),
        }
    }
}

/// Settings shared by the analyzer suite.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzerParams {
    /// Per-analyzer deadline; late results are discarded as neutral.
    #[serde(default = "default_analyzer_timeout_secs")]
    pub timeout_secs: u64,

    /// Orders at or above this share of side volume count as walls.
    #[serde(default = "default_wall_threshold_pct")]
    pub wall_threshold_pct: f64,

    /// Open-interest delta look-back in minutes.
    #[serde(default = "default_oi_lookback_min")]
    pub oi_lookback_min: f64,

    /// Reference asset for the correlation analyzer.
    #[serde(default = "default_reference_symbol")]
    pub reference_symbol: String,
}

impl Default for AnalyzerParams {
    fn default() -> Self {
        Self {
            timeout_secs: default_analyzer_timeout_secs(),
            wall_threshold_pct: default_wall_threshold_pct(),
            oi_lookback_min: default_oi_lookback_min(),
            reference_symbol: default_reference_symbol(),
        }
    }
}

/// Tier thresholds for the scoring engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringParams {
    #[serde(default = "default_tier_a_min")]
    pub tier_a_min: f64,

    #[serde(default = "default_tier_b_min")]
    pub tier_b_min: f64,
}

impl Default for ScoringParams {
    fn default() -> Self {
        Self {
            tier_a_min: default_tier_a_min(),
            tier_b_min: default_tier_b_min(),
        }
    }
}

/// Outcome tracking settings (scheduled sampler + trailing follower).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutcomeParams {
    /// Which mechanism finalizes outcomes.
    #[serde(default)]
    pub source: OutcomeSource,

    /// Scheduled sampler wake-up interval, seconds.
    #[serde(default = "default_outcome_check_secs")]
    pub check_interval_secs: u64,

    /// |last − entry| within this percent at horizon => BREAKEVEN.
    #[serde(default = "default_breakeven_band_pct")]
    pub breakeven_band_pct: f64,

    /// Run the trailing follower alongside the sampler.
    #[serde(default = "default_trailing_enabled")]
    pub trailing_enabled: bool,

    /// Profit percent at which trailing activates.
    #[serde(default = "default_activation_pct")]
    pub activation_pct: f64,

    /// Trailing distance above the lowest seen price, percent.
    #[serde(default = "default_trail_distance_pct")]
    pub trail_distance_pct: f64,

    /// Maximum minutes a trailing position is tracked.
    #[serde(default = "default_max_tracking_minutes")]
    pub max_tracking_minutes: f64,

    /// Trailing follower tick interval, seconds.
    #[serde(default = "default_trailing_check_secs")]
    pub trailing_check_secs: u64,
}

impl Default for OutcomeParams {
    fn default() -> Self {
        Self {
            source: OutcomeSource::default(),
            check_interval_secs: default_outcome_check_secs(),
            breakeven_band_pct: default_breakeven_band_pct(),
            trailing_enabled: default_trailing_enabled(),
            activation_pct: default_activation_pct(),
            trail_distance_pct: default_trail_distance_pct(),
            max_tracking_minutes: default_max_tracking_minutes(),
            trailing_check_secs: default_trailing_check_secs(),
        }
    }
}

/// Learning subsystem settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LearningParams {
    /// Finalized outcomes required before the classifier is consulted.
    #[serde(default = "default_min_training_samples")]
    pub min_training_samples: usize,

    /// Per-step decay for the weighted win rate (newest first).
    #[serde(default = "default_decay_factor")]
    pub decay_factor: f64,

    #[serde(default = "default_database_path")]
    pub database_path: String,

    #[serde(default = "default_model_path")]
    pub model_path: String,
}

impl Default for LearningParams {
    fn default() -> Self {
        Self {
            min_training_samples: default_min_training_samples(),
            decay_factor: default_decay_factor(),
            database_path: default_database_path(),
            model_path: default_model_path(),
        }
    }
}

/// Exchange REST endpoint and HTTP pool limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExchangeParams {
    #[serde(default = "default_rest_endpoint")]
    pub rest_endpoint: String,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    #[serde(default = "default_max_connections")]
    pub max_connections: usize,

    #[serde(default = "default_max_connections_per_host")]
    pub max_connections_per_host: usize,

    #[serde(default = "default_keepalive_secs")]
    pub keepalive_secs: u64,
}

impl Default for ExchangeParams {
    fn default() -> Self {
        Self {
            rest_endpoint: default_rest_endpoint(),
            request_timeout_secs: default_request_timeout_secs(),
            max_connections: default_max_connections(),
            max_connections_per_host: default_max_connections_per_host(),
            keepalive_secs: default_keepalive_secs(),
        }
    }
}

// =============================================================================
// RuntimeConfig
// =============================================================================

/// Top-level runtime configuration for the Meridian engine.
///
/// Every field has a serde default so older JSON files missing new fields
/// still deserialise correctly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Explicit symbol list; empty means "every listed contract".
    #[serde(default)]
    pub symbols: Vec<String>,

    /// Ticker poll cadence in milliseconds (~20 Hz default).
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Snapshot retention window in minutes.
    #[serde(default = "default_retention_minutes")]
    pub retention_minutes: i64,

    #[serde(default)]
    pub detection: DetectionParams,

    #[serde(default)]
    pub debounce: DebounceParams,

    #[serde(default)]
    pub confirmation: ConfirmationParams,

    #[serde(default)]
    pub analyzing: AnalyzingParams,

    #[serde(default)]
    pub analyzers: AnalyzerParams,

    #[serde(default)]
    pub scoring: ScoringParams,

    #[serde(default)]
    pub outcome: OutcomeParams,

    #[serde(default)]
    pub learning: LearningParams,

    #[serde(default)]
    pub exchange: ExchangeParams,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            symbols: Vec::new(),
            poll_interval_ms: default_poll_interval_ms(),
            retention_minutes: default_retention_minutes(),
            detection: DetectionParams::default(),
            debounce: DebounceParams::default(),
            confirmation: ConfirmationParams::default(),
            analyzing: AnalyzingParams::default(),
            analyzers: AnalyzerParams::default(),
            scoring: ScoringParams::default(),
            outcome: OutcomeParams::default(),
            learning: LearningParams::default(),
            exchange: ExchangeParams::default(),
        }
    }
}

impl RuntimeConfig {
    /// Load configuration from a JSON file at `path`.
    ///
    /// If the file does not exist, returns an error so the caller can fall
    /// back to defaults with a warning.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read runtime config from {}", path.display()))?;

        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse runtime config from {}", path.display()))?;

        info!(
            path = %path.display(),
            poll_interval_ms = config.poll_interval_ms,
            retention_minutes = config.retention_minutes,
            "runtime config loaded"
        );

        Ok(config)
    }

    /// Persist the current configuration to `path` using an atomic write
    /// (write to `.tmp`, then rename).
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        let content = serde_json::to_string_pretty(self)
            .context("failed to serialise runtime config to JSON")?;

        let tmp_path = path.with_extension("json.tmp");

        std::fs::write(&tmp_path, &content)
            .with_context(|| format!("failed to write tmp config to {}", tmp_path.display()))?;

        std::fs::rename(&tmp_path, path)
            .with_context(|| format!("failed to rename tmp config to {}", path.display()))?;

        info!(path = %path.display(), "runtime config saved (atomic)");
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_expected_values() {
        let cfg = RuntimeConfig::default();
        assert_eq!(cfg.poll_interval_ms, 50);
        assert_eq!(cfg.retention_minutes, 40);
        assert!((cfg.detection.fast_threshold_pct - 10.0).abs() < f64::EPSILON);
        assert!((cfg.detection.elite_threshold_pct - 20.0).abs() < f64::EPSILON);
        assert!((cfg.debounce.repeat_threshold_pct - 10.0).abs() < f64::EPSILON);
        assert!((cfg.debounce.cooldown_minutes - 0.0).abs() < f64::EPSILON);
        assert_eq!(cfg.analyzers.timeout_secs, 3);
        assert_eq!(cfg.learning.min_training_samples, 20);
        assert_eq!(cfg.outcome.source, OutcomeSource::Scheduled);
        assert_eq!(cfg.exchange.max_connections, 100);
        assert_eq!(cfg.exchange.max_connections_per_host, 50);
    }

    #[test]
    fn deserialise_empty_json_uses_defaults() {
        let cfg: RuntimeConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg.poll_interval_ms, 50);
        assert!((cfg.confirmation.fast_reversal_pct - 0.5).abs() < f64::EPSILON);
        assert!((cfg.confirmation.elite_reversal_pct - 1.0).abs() < f64::EPSILON);
        assert!(cfg.outcome.trailing_enabled);
    }

    #[test]
    fn deserialise_partial_json_fills_defaults() {
        let json = r#"{ "symbols": ["ETH_USDT"], "outcome": { "source": "trailing" } }"#;
        let cfg: RuntimeConfig = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.symbols, vec!["ETH_USDT"]);
        assert_eq!(cfg.outcome.source, OutcomeSource::Trailing);
        assert_eq!(cfg.outcome.check_interval_secs, 30);
        assert!((cfg.detection.stale_peak_age_min - 3.0).abs() < f64::EPSILON);
    }

    #[test]
    fn roundtrip_serialisation() {
        let cfg = RuntimeConfig::default();
        let json = serde_json::to_string(&cfg).unwrap();
        let cfg2: RuntimeConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(cfg.poll_interval_ms, cfg2.poll_interval_ms);
        assert_eq!(cfg.learning.database_path, cfg2.learning.database_path);
        assert_eq!(cfg.outcome.source, cfg2.outcome.source);
    }
}
