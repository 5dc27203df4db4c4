//! Threat signal domain model.
//!
//! Threat levels form a total order; the threat→hold bridge compares the
//! overall level of a fetched signal against a threshold. Anything the
//! fetcher cannot parse degrades to the fail-closed signal (critical).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Totally ordered threat level: low < medium < high < critical.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum ThreatLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl ThreatLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            "critical" => Some(Self::Critical),
            _ => None,
        }
    }

    /// Parse a wire-level string, mapping unknown or missing values to
    /// critical (fail-closed).
    pub fn parse_fail_closed(s: Option<&str>) -> Self {
        s.and_then(Self::from_str).unwrap_or(Self::Critical)
    }
}

impl std::fmt::Display for ThreatLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One individual threat carried by a signal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Threat {
    /// Threat type tag (e.g. "creeper", "fetch_failure")
    #[serde(rename = "type")]
    pub kind: String,
    /// Distance to the threat in blocks
    pub distance: f64,
    /// Level of this individual threat
    pub level: ThreatLevel,
}

impl Threat {
    /// Resume hint rendered for hold records: "{type} at {distance}m".
    pub fn resume_hint(&self) -> String {
        format!("{} at {}m", self.kind, self.distance)
    }
}

/// A fetched threat sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreatSignal {
    pub overall_level: ThreatLevel,
    pub threats: Vec<Threat>,
    pub fetched_at: DateTime<Utc>,
}

impl ThreatSignal {
    /// The signal substituted for any failed or unparseable fetch: overall
    /// critical, with a single synthetic `fetch_failure` threat.
    pub fn fail_closed(now: DateTime<Utc>) -> Self {
        Self {
            overall_level: ThreatLevel::Critical,
            threats: vec![Threat {
                kind: "fetch_failure".to_string(),
                distance: 0.0,
                level: ThreatLevel::Critical,
            }],
            fetched_at: now,
        }
    }
}

/// Summary emitted after every bridge evaluation pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreatBridgeReport {
    pub signal: ThreatSignal,
    /// Whether the signal met the hold threshold
    pub hold_decision: bool,
    /// Tasks newly held this pass, id-ascending
    pub tasks_held: Vec<Uuid>,
    /// Tasks released this pass, id-ascending
    pub tasks_released: Vec<Uuid>,
    pub threshold: ThreatLevel,
}
