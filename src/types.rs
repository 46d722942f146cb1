// =============================================================================
// Shared types used across the risk engine
// =============================================================================

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Anomaly signals
// ---------------------------------------------------------------------------

/// Closed set of signal kinds the aggregator understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyKind {
    MentionSpike,
    PriceSpike,
    VolumeSpike,
    PatternMatch,
    SentimentShift,
}

impl std::fmt::Display for AnomalyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MentionSpike => write!(f, "mention_spike"),
            Self::PriceSpike => write!(f, "price_spike"),
            Self::VolumeSpike => write!(f, "volume_spike"),
            Self::PatternMatch => write!(f, "pattern_match"),
            Self::SentimentShift => write!(f, "sentiment_shift"),
        }
    }
}

/// One detector finding.  Immutable once built; consumed by the aggregator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalySignal {
    pub kind: AnomalyKind,
    /// Fixed per-check confidence in [0, 1].
    pub confidence: f64,
    /// The measured quantity (ratio, z-score, delta, return).
    pub value: f64,
    pub detail: String,
    #[serde(default)]
    pub timeframe: String,
}

impl AnomalySignal {
    pub fn new(kind: AnomalyKind, confidence: f64, value: f64, detail: impl Into<String>) -> Self {
        Self {
            kind,
            confidence: confidence.clamp(0.0, 1.0),
            value,
            detail: detail.into(),
            timeframe: String::new(),
        }
    }

    pub fn with_timeframe(mut self, timeframe: impl Into<String>) -> Self {
        self.timeframe = timeframe.into();
        self
    }
}

// ---------------------------------------------------------------------------
// Risk assessment
// ---------------------------------------------------------------------------

/// A single scored contributor to an assessment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskFactor {
    pub description: String,
    /// Points added (or removed, when negative) by this factor.
    pub contribution: i32,
}

impl RiskFactor {
    pub fn new(description: impl Into<String>, contribution: i32) -> Self {
        Self {
            description: description.into(),
            contribution,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

/// Terminal output of the aggregator.  Built fresh per call, never persisted
/// here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskAssessment {
    /// Bounded score in [0, 100].
    pub score: u8,
    pub level: RiskLevel,
    pub factors: Vec<RiskFactor>,
    /// Misleading / suspicious verdict.
    pub flagged: bool,
    /// Names of the hard overrides that fired, if any.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub overrides: Vec<String>,
}

// ---------------------------------------------------------------------------
// Market data fetch mode
// ---------------------------------------------------------------------------

/// Fast mode fetches weekly bars, full mode daily bars.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FetchMode {
    Fast,
    Full,
}

impl FetchMode {
    pub fn from_fast_flag(fast: bool) -> Self {
        if fast {
            Self::Fast
        } else {
            Self::Full
        }
    }

    /// Bar interval requested from the market-data collaborator.
    pub fn interval(&self) -> &'static str {
        match self {
            Self::Fast => "1wk",
            Self::Full => "1d",
        }
    }
}

impl std::fmt::Display for FetchMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Fast => write!(f, "fast"),
            Self::Full => write!(f, "full"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_serialise_snake_case() {
        let json = serde_json::to_string(&AnomalyKind::MentionSpike).unwrap();
        assert_eq!(json, "\"mention_spike\"");
        assert_eq!(AnomalyKind::PatternMatch.to_string(), "pattern_match");
    }

    #[test]
    fn signal_confidence_is_clamped() {
        let s = AnomalySignal::new(AnomalyKind::PriceSpike, 1.4, 3.0, "z");
        assert!((s.confidence - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn fetch_mode_interval() {
        assert_eq!(FetchMode::from_fast_flag(true).interval(), "1wk");
        assert_eq!(FetchMode::Full.interval(), "1d");
        assert_eq!(FetchMode::Fast.to_string(), "fast");
    }
}
