//! Activation reactor: budgeted, hysteretic reactivation of idle goals.
//!
//! Each tick considers a bounded number of pending or paused goal tasks for
//! activation, respecting a per-minute rate limit, a post-deactivation
//! cooldown, hold review deadlines, and the manual-pause wall. The hysteresis
//! keeps the executor from thrashing between competing goals.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::models::{BlockPos, Task, TaskStatus};
use crate::services::config::PlannerConfig;
use crate::services::hold_manager::is_manually_paused;

const PRIORITY_WEIGHT: f64 = 0.4;
const URGENCY_WEIGHT: f64 = 0.3;
const PROGRESS_WEIGHT: f64 = 0.2;
const PROXIMITY_WEIGHT: f64 = 0.1;

/// Rolling window for the reactivation rate limit.
const RATE_WINDOW_MS: i64 = 60_000;

/// Context for one reactor tick.
#[derive(Debug, Clone, Default)]
pub struct TickContext {
    /// Tasks the executor is currently running
    pub active_task_ids: HashSet<Uuid>,
    /// Bot position for the proximity component
    pub bot_position: Option<BlockPos>,
}

/// Outcome of one reactor tick.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Candidates examined this tick, in consideration order
    pub considered: Vec<Uuid>,
    /// Tasks the caller should activate
    pub activated: Vec<Uuid>,
    /// Candidates skipped, with the reason
    pub skipped: Vec<(Uuid, String)>,
    /// Whether the tick stopped on the per-tick budget rather than running
    /// out of candidates
    pub budget_exhausted: bool,
}

/// Stateful reactivation driver.
#[derive(Debug)]
pub struct ActivationReactor {
    config: PlannerConfig,
    /// When each task was last deactivated
    deactivated_at: HashMap<Uuid, DateTime<Utc>>,
    /// Timestamps of recent reactivations (pruned to the rate window)
    reactivation_log: Vec<DateTime<Utc>>,
}

impl Default for ActivationReactor {
    fn default() -> Self {
        Self::new(PlannerConfig::default())
    }
}

impl ActivationReactor {
    pub fn new(config: PlannerConfig) -> Self {
        Self {
            config,
            deactivated_at: HashMap::new(),
            reactivation_log: Vec::new(),
        }
    }

    /// Record that the executor deactivated a task; starts its cooldown.
    pub fn record_deactivation(&mut self, task_id: Uuid, now: DateTime<Utc>) {
        self.deactivated_at.insert(task_id, now);
    }

    /// Forget a task's cooldown (e.g. after terminal transition).
    pub fn clear_deactivation(&mut self, task_id: Uuid) {
        self.deactivated_at.remove(&task_id);
    }

    /// How many reactivations remain in the current rate window.
    pub fn remaining_reactivations(&self, now: DateTime<Utc>) -> usize {
        let used = self
            .reactivation_log
            .iter()
            .filter(|t| (now - **t).num_milliseconds() < RATE_WINDOW_MS)
            .count();
        self.config.max_reactivate_per_minute.saturating_sub(used)
    }

    fn in_cooldown(&self, task_id: Uuid, now: DateTime<Utc>) -> bool {
        self.deactivated_at.get(&task_id).is_some_and(|t| {
            (now - *t).num_milliseconds() < self.config.reactivation_cooldown_ms
        })
    }

    fn relevance(&self, task: &Task, ctx: &TickContext) -> f64 {
        let proximity = match (&ctx.bot_position, task.binding()) {
            (Some(pos), Some(binding)) => {
                let distance = binding
                    .anchors
                    .site_signature
                    .as_ref()
                    .map(|site| site.position.distance_to(pos))
                    .or_else(|| {
                        binding
                            .anchors
                            .region_hint
                            .as_ref()
                            .map(|hint| hint.center.distance_to(pos))
                    });
                distance.map_or(0.0, |d| {
                    (1.0 - d / self.config.proximity_max_distance).max(0.0)
                })
            }
            _ => 0.0,
        };

        PRIORITY_WEIGHT * task.priority
            + URGENCY_WEIGHT * task.urgency
            + PROGRESS_WEIGHT * task.progress
            + PROXIMITY_WEIGHT * proximity
    }

    /// Run one tick over the task set.
    pub fn tick(&mut self, tasks: &[Task], ctx: &TickContext, now: DateTime<Utc>) -> TickReport {
        // 1. Prune the rate-limit log to the rolling window.
        self.reactivation_log
            .retain(|t| (now - *t).num_milliseconds() < RATE_WINDOW_MS);

        // 2. Collect candidates.
        let mut candidates: Vec<&Task> = tasks
            .iter()
            .filter(|task| {
                task.is_goal_bound()
                    && matches!(task.status, TaskStatus::Pending | TaskStatus::Paused)
                    && !ctx.active_task_ids.contains(&task.id)
                    && !is_manually_paused(task)
                    && !self.in_cooldown(task.id, now)
            })
            .collect();

        // 3. Most relevant first; ties break by id for determinism.
        candidates.sort_by(|a, b| {
            self.relevance(b, ctx)
                .partial_cmp(&self.relevance(a, ctx))
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });

        let budget_exhausted = candidates.len() > self.config.max_reconsider_per_tick;
        let mut report = TickReport {
            budget_exhausted,
            ..TickReport::default()
        };

        // 4. Consider up to the per-tick budget.
        for task in candidates.into_iter().take(self.config.max_reconsider_per_tick) {
            report.considered.push(task.id);

            if self.remaining_reactivations(now) == 0 {
                report.skipped.push((task.id, "rate limit".to_string()));
                continue;
            }

            let hold_not_due = task
                .binding()
                .and_then(|b| b.hold.as_ref())
                .is_some_and(|hold| hold.next_review_at > now);
            if hold_not_due {
                report.skipped.push((task.id, "not yet due".to_string()));
                continue;
            }

            self.reactivation_log.push(now);
            report.activated.push(task.id);
            tracing::debug!(task_id = %task.id, "goal task selected for reactivation");
        }

        report
    }
}
