//! Goal binding domain model.
//!
//! A [`GoalBinding`] is the record attached to a task's metadata that makes
//! the task a goal: a content-addressed identity (provisional in Phase A,
//! anchored to a concrete site in Phase B), a completion state fed by
//! verifiers, and an optional structured hold.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Integer block coordinates used as hashable anchors.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockPos {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl BlockPos {
    pub fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// Euclidean distance to another position.
    pub fn distance_to(&self, other: &Self) -> f64 {
        let dx = f64::from(self.x - other.x);
        let dy = f64::from(self.y - other.y);
        let dz = f64::from(self.z - other.z);
        (dx * dx + dy * dy + dz * dz).sqrt()
    }
}

impl std::fmt::Display for BlockPos {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}:{}", self.x, self.y, self.z)
    }
}

/// Cardinal facing of an anchored site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Facing {
    N,
    S,
    E,
    W,
}

impl Facing {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::N => "N",
            Self::S => "S",
            Self::E => "E",
            Self::W => "W",
        }
    }
}

/// Axis-aligned bounding box of an anchored site's footprint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FootprintBounds {
    pub min: BlockPos,
    pub max: BlockPos,
}

impl FootprintBounds {
    /// Whether a position lies inside the bounds expanded by `margin` on
    /// every axis.
    pub fn contains_with_margin(&self, pos: &BlockPos, margin: i32) -> bool {
        pos.x >= self.min.x - margin
            && pos.x <= self.max.x + margin
            && pos.y >= self.min.y - margin
            && pos.y <= self.max.y + margin
            && pos.z >= self.min.z - margin
            && pos.z <= self.max.z + margin
    }
}

/// Site commitment recorded by the Phase A→B anchor transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiteSignature {
    /// Representative position of the site
    pub position: BlockPos,
    /// Reference corner the anchored key is derived from
    pub ref_corner: BlockPos,
    /// Site facing
    pub facing: Facing,
    /// Footprint of the structure
    pub footprint_bounds: FootprintBounds,
}

/// Coarse location hint carried by Phase A (provisional) goals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionHint {
    /// Center of the hinted region
    pub center: BlockPos,
    /// Radius of the hinted region
    pub radius: f64,
}

/// Spatial anchors of a binding: at most one site signature (Phase B) and an
/// optional coarse region hint (Phase A).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GoalAnchors {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub site_signature: Option<SiteSignature>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region_hint: Option<RegionHint>,
}

/// Outcome of one verifier invocation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VerificationResult {
    pub done: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    #[serde(default)]
    pub blockers: Vec<String>,
    #[serde(default)]
    pub evidence: Vec<String>,
}

impl VerificationResult {
    pub fn passing(evidence: Vec<String>) -> Self {
        Self {
            done: true,
            score: None,
            blockers: Vec::new(),
            evidence,
        }
    }

    pub fn failing(blockers: Vec<String>) -> Self {
        Self {
            done: false,
            score: None,
            blockers,
            evidence: Vec::new(),
        }
    }
}

/// Completion tracking attached to a binding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionState {
    /// Name of the registered verifier
    pub verifier: String,
    /// Version of the completion definition
    pub definition_version: u32,
    /// Consecutive passing verifications (stability window counter)
    pub consecutive_passes: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_verified_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_result: Option<VerificationResult>,
}

impl CompletionState {
    pub fn new(verifier: impl Into<String>) -> Self {
        Self {
            verifier: verifier.into(),
            definition_version: 1,
            consecutive_passes: 0,
            last_verified_at: None,
            last_result: None,
        }
    }
}

/// Reason a goal is held.
///
/// The set is open: unknown reasons are carried as [`HoldReason::Other`] and
/// flagged by `is_known`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum HoldReason {
    /// A higher-priority goal displaced this one
    Preempted,
    /// The environment is currently unsafe (threat bridge)
    Unsafe,
    /// Required materials are missing
    MaterialsMissing,
    /// An operator paused the goal; no automated path may clear this
    ManualPause,
    /// A reason outside the recognized set
    Other(String),
}

impl HoldReason {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Preempted => "preempted",
            Self::Unsafe => "unsafe",
            Self::MaterialsMissing => "materials_missing",
            Self::ManualPause => "manual_pause",
            Self::Other(s) => s.as_str(),
        }
    }

    /// Whether this reason is a member of the recognized set.
    pub fn is_known(&self) -> bool {
        !matches!(self, Self::Other(_))
    }
}

impl From<String> for HoldReason {
    fn from(s: String) -> Self {
        match s.as_str() {
            "preempted" => Self::Preempted,
            "unsafe" => Self::Unsafe,
            "materials_missing" => Self::MaterialsMissing,
            "manual_pause" => Self::ManualPause,
            _ => Self::Other(s),
        }
    }
}

impl From<HoldReason> for String {
    fn from(r: HoldReason) -> Self {
        r.as_str().to_string()
    }
}

impl std::fmt::Display for HoldReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Who or what applied a hold.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HoldWitness {
    /// Acting component or operator
    pub actor: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// A structured reason for a task being paused, with a review deadline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoalHold {
    pub reason: HoldReason,
    pub held_at: DateTime<Utc>,
    #[serde(default)]
    pub resume_hints: Vec<String>,
    pub next_review_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub witness: Option<HoldWitness>,
}

/// The record attached to a task that makes it a goal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoalBinding {
    /// Immutable caller-generated instance id
    pub goal_instance_id: Uuid,
    /// Current 16-hex content address
    pub goal_key: String,
    /// Previous keys, oldest first; anchoring always records one
    #[serde(default)]
    pub goal_key_aliases: Vec<String>,
    /// Goal type tag
    pub goal_type: String,
    /// Upstream goal id, if the goal manager supplied one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub goal_id: Option<String>,
    /// Spatial anchors
    #[serde(default)]
    pub anchors: GoalAnchors,
    /// Completion tracking
    pub completion: CompletionState,
    /// Structured hold, present iff the task is paused
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hold: Option<GoalHold>,
    /// Exempt from threat-driven holds
    #[serde(default)]
    pub combat_exempt: bool,
}

impl GoalBinding {
    /// Create a Phase A (provisional) binding.
    pub fn provisional(
        goal_instance_id: Uuid,
        goal_type: impl Into<String>,
        goal_key: impl Into<String>,
        verifier: impl Into<String>,
    ) -> Self {
        Self {
            goal_instance_id,
            goal_key: goal_key.into(),
            goal_key_aliases: Vec::new(),
            goal_type: goal_type.into(),
            goal_id: None,
            anchors: GoalAnchors::default(),
            completion: CompletionState::new(verifier),
            hold: None,
            combat_exempt: false,
        }
    }

    /// Set the upstream goal id (builder method).
    pub fn with_goal_id(mut self, goal_id: impl Into<String>) -> Self {
        self.goal_id = Some(goal_id.into());
        self
    }

    /// Set a region hint (builder method).
    pub fn with_region_hint(mut self, center: BlockPos, radius: f64) -> Self {
        self.anchors.region_hint = Some(RegionHint { center, radius });
        self
    }

    /// Mark the goal exempt from threat-driven holds (builder method).
    pub fn combat_exempt(mut self) -> Self {
        self.combat_exempt = true;
        self
    }

    /// Whether the binding has committed to a site (Phase B).
    pub fn is_anchored(&self) -> bool {
        self.anchors.site_signature.is_some()
    }

    /// Whether a key matches the current key or any alias.
    pub fn matches_key(&self, key: &str) -> bool {
        self.goal_key == key || self.goal_key_aliases.iter().any(|k| k == key)
    }
}
