//! Configuration for the planning core.
//!
//! Every tunable knob lives on [`PlannerConfig`] with the canonical defaults
//! exposed as module constants. Environment overrides use the `WAYSTONE_`
//! prefix; the `STRICT_REQUIREMENTS` variable is read verbatim because its
//! contract predates this crate: the literal string `"false"` is the only
//! opt-out, everything else means strict.

use figment::providers::{Env, Serialized};
use figment::Figment;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Minimum candidate score to continue an existing non-terminal task.
pub const CONTINUE_THRESHOLD: f64 = 0.6;
/// Minimum candidate score before a completed task is even checked for
/// satisfaction.
pub const SATISFACTION_CHECK_THRESHOLD: f64 = 0.3;
/// Distance at which the proximity score component reaches zero.
pub const PROXIMITY_MAX_DISTANCE: f64 = 128.0;
/// Satisfaction scope radius around the region hint for provisional goals.
pub const PROVISIONAL_SCOPE_RADIUS: f64 = 32.0;
/// Footprint expansion margin for anchored satisfaction scope.
pub const SATISFACTION_FOOTPRINT_MARGIN: i32 = 8;
/// Window within which a recently touched task earns the recency bonus.
pub const RECENCY_WINDOW_MS: i64 = 30 * 60 * 1000;
/// Score bonus for recently touched tasks.
pub const RECENCY_BONUS: f64 = 0.1;
/// Consecutive verifier passes required before completion.
pub const STABILITY_THRESHOLD: u32 = 2;
/// Review deadline stamped on new holds. Distinct from the review cadence.
pub const HOLD_REVIEW_WINDOW_MS: i64 = 5 * 60 * 1000;
/// How often the periodic review pass is expected to run. Distinct from the
/// hold review window.
pub const REVIEW_CADENCE_MS: i64 = 60 * 1000;
/// Stale holds processed per periodic review cycle.
pub const MAX_STALE_HOLDS_PER_CYCLE: usize = 5;
/// Candidates the activation reactor considers per tick.
pub const MAX_RECONSIDER_PER_TICK: usize = 3;
/// Reactivations allowed per rolling minute.
pub const MAX_REACTIVATE_PER_MINUTE: usize = 2;
/// Cooldown after a deactivation before a task may reactivate.
pub const REACTIVATION_COOLDOWN_MS: i64 = 30_000;
/// Dijkstra iteration bound for macro planning.
pub const MAX_MACRO_DEPTH: usize = 10;
/// EMA learning rate for edge cost updates.
pub const COST_LEARNING_RATE: f64 = 0.3;
/// Multiplicative cost penalty on edge failure.
pub const FAILURE_PENALTY: f64 = 1.5;
/// Consecutive edge failures before a replan is recommended.
pub const DEFAULT_REPLAN_THRESHOLD: u32 = 3;
/// Wall-clock budget for one verifier invocation.
pub const VERIFIER_TIME_BUDGET_MS: u64 = 100;
/// Capacity of the lifecycle event ring.
pub const EVENT_RING_CAPACITY: usize = 1000;

/// Errors from configuration loading and validation.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Figment extraction failed
    #[error("failed to extract configuration: {0}")]
    Extraction(String),

    /// A field has an invalid value
    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}

/// All recognized tuning knobs, with the canonical defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
    pub continue_threshold: f64,
    pub satisfaction_check_threshold: f64,
    pub proximity_max_distance: f64,
    pub provisional_scope_radius: f64,
    pub recency_window_ms: i64,
    pub recency_bonus: f64,
    pub stability_threshold: u32,
    pub hold_review_window_ms: i64,
    pub review_cadence_ms: i64,
    pub max_stale_holds_per_cycle: usize,
    pub max_reconsider_per_tick: usize,
    pub max_reactivate_per_minute: usize,
    pub reactivation_cooldown_ms: i64,
    pub max_macro_depth: usize,
    pub cost_learning_rate: f64,
    pub failure_penalty: f64,
    pub default_replan_threshold: u32,
    pub verifier_time_budget_ms: u64,
    pub event_ring_capacity: usize,
    /// Strict requirement routing; see [`strict_requirements_from_env`]
    pub strict_requirements: bool,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            continue_threshold: CONTINUE_THRESHOLD,
            satisfaction_check_threshold: SATISFACTION_CHECK_THRESHOLD,
            proximity_max_distance: PROXIMITY_MAX_DISTANCE,
            provisional_scope_radius: PROVISIONAL_SCOPE_RADIUS,
            recency_window_ms: RECENCY_WINDOW_MS,
            recency_bonus: RECENCY_BONUS,
            stability_threshold: STABILITY_THRESHOLD,
            hold_review_window_ms: HOLD_REVIEW_WINDOW_MS,
            review_cadence_ms: REVIEW_CADENCE_MS,
            max_stale_holds_per_cycle: MAX_STALE_HOLDS_PER_CYCLE,
            max_reconsider_per_tick: MAX_RECONSIDER_PER_TICK,
            max_reactivate_per_minute: MAX_REACTIVATE_PER_MINUTE,
            reactivation_cooldown_ms: REACTIVATION_COOLDOWN_MS,
            max_macro_depth: MAX_MACRO_DEPTH,
            cost_learning_rate: COST_LEARNING_RATE,
            failure_penalty: FAILURE_PENALTY,
            default_replan_threshold: DEFAULT_REPLAN_THRESHOLD,
            verifier_time_budget_ms: VERIFIER_TIME_BUDGET_MS,
            event_ring_capacity: EVENT_RING_CAPACITY,
            strict_requirements: true,
        }
    }
}

impl PlannerConfig {
    /// Load configuration with environment overrides.
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults
    /// 2. Environment variables with the `WAYSTONE_` prefix
    /// 3. `STRICT_REQUIREMENTS` (legacy spelling, read verbatim)
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config: Self = Figment::new()
            .merge(Serialized::defaults(Self::default()))
            .merge(Env::prefixed("WAYSTONE_"))
            .extract()
            .map_err(|e| ConfigError::Extraction(e.to_string()))?;

        config.strict_requirements = strict_requirements_from_env();
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration after loading.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let unit_interval = [
            ("continue_threshold", self.continue_threshold),
            (
                "satisfaction_check_threshold",
                self.satisfaction_check_threshold,
            ),
            ("recency_bonus", self.recency_bonus),
            ("cost_learning_rate", self.cost_learning_rate),
        ];
        for (field, value) in unit_interval {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::InvalidValue {
                    field: field.to_string(),
                    reason: format!("must be in [0, 1], got {value}"),
                });
            }
        }
        if self.failure_penalty < 1.0 {
            return Err(ConfigError::InvalidValue {
                field: "failure_penalty".to_string(),
                reason: format!("must be >= 1, got {}", self.failure_penalty),
            });
        }
        if self.proximity_max_distance <= 0.0 {
            return Err(ConfigError::InvalidValue {
                field: "proximity_max_distance".to_string(),
                reason: "must be positive".to_string(),
            });
        }
        if self.max_macro_depth == 0 {
            return Err(ConfigError::InvalidValue {
                field: "max_macro_depth".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        if self.hold_review_window_ms == self.review_cadence_ms {
            // The two review knobs are distinct concepts; equal values are
            // legal but a historical source of confusion, so they must be
            // set deliberately rather than by aliasing one to the other.
            tracing::debug!(
                window_ms = self.hold_review_window_ms,
                "hold review window equals review cadence"
            );
        }
        Ok(())
    }
}

/// Read the strict-requirements toggle.
///
/// Strict is the default; the literal, case-sensitive string `"false"` is the
/// only opt-out.
pub fn strict_requirements_from_env() -> bool {
    std::env::var("STRICT_REQUIREMENTS").map_or(true, |v| v != "false")
}
