// =============================================================================
// Shared types used across the Meridian short-signal engine
// =============================================================================

use serde::{Deserialize, Serialize};

/// Classification of a detected pump by window/threshold.
///
/// FAST outranks ELITE: the faster classification is strictly more
/// informative for entry quality, so it wins every tie-break.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PumpKind {
    Fast,
    Elite,
}

impl PumpKind {
    /// Numeric rank used by the debounce rules (higher = better tier).
    pub fn rank(self) -> u8 {
        match self {
            Self::Fast => 2,
            Self::Elite => 1,
        }
    }
}

impl std::fmt::Display for PumpKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Fast => write!(f, "FAST"),
            Self::Elite => write!(f, "ELITE"),
        }
    }
}

/// Signal quality tier derived from the combined score.
///
/// `Reject` is logged but never broadcast.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Tier {
    A,
    B,
    Reject,
}

impl Tier {
    pub fn emits(self) -> bool {
        !matches!(self, Self::Reject)
    }

    /// Glyph used in broadcast messages.
    pub fn glyph(self) -> &'static str {
        match self {
            Self::A => "🔥",
            Self::B => "📉",
            Self::Reject => "✖",
        }
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::A => write!(f, "A"),
            Self::B => write!(f, "B"),
            Self::Reject => write!(f, "REJECT"),
        }
    }
}

/// Final classification of a tracked signal outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FinalResult {
    WinTp1,
    WinTp2,
    WinTp3,
    LossSl,
    Breakeven,
    Timeout,
}

impl FinalResult {
    pub fn is_win(self) -> bool {
        matches!(self, Self::WinTp1 | Self::WinTp2 | Self::WinTp3)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::WinTp1 => "WIN_TP1",
            Self::WinTp2 => "WIN_TP2",
            Self::WinTp3 => "WIN_TP3",
            Self::LossSl => "LOSS_SL",
            Self::Breakeven => "BREAKEVEN",
            Self::Timeout => "TIMEOUT",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "WIN_TP1" => Some(Self::WinTp1),
            "WIN_TP2" => Some(Self::WinTp2),
            "WIN_TP3" => Some(Self::WinTp3),
            "LOSS_SL" => Some(Self::LossSl),
            "BREAKEVEN" => Some(Self::Breakeven),
            "TIMEOUT" => Some(Self::Timeout),
            _ => None,
        }
    }
}

impl std::fmt::Display for FinalResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Per-symbol trading recommendation derived from the learning store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecommendedAction {
    Trade,
    Caution,
    Avoid,
}

impl RecommendedAction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Trade => "TRADE",
            Self::Caution => "CAUTION",
            Self::Avoid => "AVOID",
        }
    }
}

impl std::fmt::Display for RecommendedAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Trend direction on a single timeframe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrendLabel {
    Up,
    Down,
    Sideways,
    Unknown,
}

impl std::fmt::Display for TrendLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Up => write!(f, "UP"),
            Self::Down => write!(f, "DOWN"),
            Self::Sideways => write!(f, "SIDEWAYS"),
            Self::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

/// Multi-timeframe trend confluence for a short entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Confluence {
    StrongShort,
    WeakShort,
    Neutral,
    AvoidShort,
}

impl std::fmt::Display for Confluence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::StrongShort => write!(f, "STRONG_SHORT"),
            Self::WeakShort => write!(f, "WEAK_SHORT"),
            Self::Neutral => write!(f, "NEUTRAL"),
            Self::AvoidShort => write!(f, "AVOID_SHORT"),
        }
    }
}

/// Which mechanism finalizes a signal's outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeSource {
    Scheduled,
    Trailing,
}

impl Default for OutcomeSource {
    fn default() -> Self {
        Self::Scheduled
    }
}
