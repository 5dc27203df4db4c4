//! Candidate scoring for goal resolution.
//!
//! Scoring is a pure function of a task, its binding, and the resolution
//! input. The weights favour key identity heavily; anchors, proximity,
//! progress, and recency refine ties between plausible candidates.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde_json::Value;
use uuid::Uuid;

use crate::domain::models::{BlockPos, GoalBinding, Task, TaskStatus};
use crate::services::config::{PlannerConfig, SATISFACTION_FOOTPRINT_MARGIN};
use crate::services::identity::compute_provisional_key;

const KEY_MATCH_WEIGHT: f64 = 0.65;
const ANCHOR_MATCH_WEIGHT: f64 = 0.15;
const PROXIMITY_WEIGHT: f64 = 0.10;
const PROGRESS_WEIGHT: f64 = 0.05;

/// Input to one resolution attempt.
#[derive(Debug, Clone)]
pub struct ResolutionInput {
    pub goal_type: String,
    pub intent_params: BTreeMap<String, Value>,
    pub bot_position: BlockPos,
    pub now: DateTime<Utc>,
    pub goal_id: Option<String>,
}

impl ResolutionInput {
    pub fn new(
        goal_type: impl Into<String>,
        bot_position: BlockPos,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            goal_type: goal_type.into(),
            intent_params: BTreeMap::new(),
            bot_position,
            now,
            goal_id: None,
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: Value) -> Self {
        self.intent_params.insert(key.into(), value);
        self
    }

    pub fn with_goal_id(mut self, goal_id: impl Into<String>) -> Self {
        self.goal_id = Some(goal_id.into());
        self
    }

    /// The provisional key this input resolves under.
    pub fn provisional_key(&self) -> String {
        compute_provisional_key(&self.goal_type, &self.intent_params, &self.bot_position)
    }
}

/// Component-wise score of one candidate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreBreakdown {
    pub key_match: f64,
    pub anchor_match: f64,
    pub proximity: f64,
    pub progress: f64,
    pub recency: f64,
    pub total: f64,
}

/// A candidate task with its computed score.
#[derive(Debug, Clone)]
pub struct ScoredCandidate {
    pub task_id: Uuid,
    pub status: TaskStatus,
    pub score: f64,
    pub key_match: bool,
}

/// Score one candidate against the input.
///
/// `provisional_key` is the precomputed key for the input, shared across the
/// candidate scan.
pub fn score_candidate(
    task: &Task,
    binding: &GoalBinding,
    provisional_key: &str,
    input: &ResolutionInput,
    config: &PlannerConfig,
) -> ScoreBreakdown {
    let key_match = if binding.matches_key(provisional_key) {
        1.0
    } else {
        0.0
    };

    let anchor_match = match &binding.anchors.site_signature {
        Some(site) if site.ref_corner == input.bot_position => 1.0,
        Some(_) => 0.3,
        None => 0.0,
    };

    let proximity = proximity_score(binding, &input.bot_position, config);

    let progress = match &task.metadata.build {
        Some(build) => build.fraction(),
        None => task.progress,
    };

    let reference = task
        .metadata
        .started_at
        .unwrap_or(task.metadata.created_at);
    let recency = if (input.now - reference).num_milliseconds() < config.recency_window_ms {
        config.recency_bonus
    } else {
        0.0
    };

    let total = KEY_MATCH_WEIGHT * key_match
        + ANCHOR_MATCH_WEIGHT * anchor_match
        + PROXIMITY_WEIGHT * proximity
        + PROGRESS_WEIGHT * progress
        + recency;

    ScoreBreakdown {
        key_match,
        anchor_match,
        proximity,
        progress,
        recency,
        total,
    }
}

/// Proximity in [0, 1]: 1 at distance zero, 0 at the max distance and
/// beyond. Anchored bindings measure to the site; provisional ones to the
/// region hint; bindings with no anchors score zero.
fn proximity_score(binding: &GoalBinding, position: &BlockPos, config: &PlannerConfig) -> f64 {
    let distance = match (&binding.anchors.site_signature, &binding.anchors.region_hint) {
        (Some(site), _) => site.position.distance_to(position),
        (None, Some(hint)) => hint.center.distance_to(position),
        (None, None) => return 0.0,
    };
    (1.0 - distance / config.proximity_max_distance).max(0.0)
}

/// Score every candidate of the input's goal type, best first.
///
/// Ties break by task id ascending so repeated scans are deterministic.
pub fn find_candidates(
    tasks: &[Task],
    input: &ResolutionInput,
    config: &PlannerConfig,
) -> Vec<ScoredCandidate> {
    let provisional_key = input.provisional_key();
    let mut candidates: Vec<ScoredCandidate> = tasks
        .iter()
        .filter_map(|task| {
            let binding = task.binding()?;
            if binding.goal_type != input.goal_type {
                return None;
            }
            let breakdown = score_candidate(task, binding, &provisional_key, input, config);
            Some(ScoredCandidate {
                task_id: task.id,
                status: task.status,
                score: breakdown.total,
                key_match: breakdown.key_match > 0.0,
            })
        })
        .collect();

    candidates.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.task_id.cmp(&b.task_id))
    });
    candidates
}

/// Whether the bot position falls inside the binding's satisfaction scope.
///
/// Anchored: inside the footprint expanded by the margin. Provisional:
/// within the scope radius of the region hint.
pub fn is_within_satisfaction_scope(
    binding: &GoalBinding,
    position: &BlockPos,
    config: &PlannerConfig,
) -> bool {
    if let Some(site) = &binding.anchors.site_signature {
        return site
            .footprint_bounds
            .contains_with_margin(position, SATISFACTION_FOOTPRINT_MARGIN);
    }
    if let Some(hint) = &binding.anchors.region_hint {
        return hint.center.distance_to(position) <= config.provisional_scope_radius;
    }
    false
}
