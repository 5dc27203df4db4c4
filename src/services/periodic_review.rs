//! Periodic review backstop.
//!
//! A pure pass over the task set that surfaces holds whose review deadline
//! has lapsed and drift between tasks and their goals. The pass emits effects
//! for the caller to apply; manual pauses are reported but never released.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::models::{GoalStatus, HoldReason, Task, TaskStatus};
use crate::services::config::MAX_STALE_HOLDS_PER_CYCLE;
use crate::services::sync_reducer::{
    detect_goal_task_drift, resolve_drift, DriftReport, SyncEffect,
};

/// A hold whose review deadline has passed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StaleHold {
    pub task_id: Uuid,
    pub reason: HoldReason,
    pub next_review_at: DateTime<Utc>,
    pub is_manual_pause: bool,
}

/// Result of one review pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewReport {
    pub reviewed_at: DateTime<Utc>,
    pub stale_holds: Vec<StaleHold>,
    pub drift_reports: Vec<DriftReport>,
    pub effects: Vec<SyncEffect>,
    /// Goal-bound tasks inspected this pass
    pub tasks_scanned: usize,
}

/// Run one periodic review pass.
///
/// Phase 1 collects lapsed holds; manual pauses are surfaced on every pass
/// for operator visibility even though their deadline never lapses. Phase 2
/// emits release effects for at most [`MAX_STALE_HOLDS_PER_CYCLE`] of them
/// (manual pauses produce a noop). Phase 3 appends drift-corrective effects.
pub fn run_periodic_review(
    tasks: &[Task],
    get_goal_status: &dyn Fn(&str) -> Option<GoalStatus>,
    now: DateTime<Utc>,
) -> ReviewReport {
    let mut sorted: Vec<&Task> = tasks.iter().filter(|t| t.is_goal_bound()).collect();
    sorted.sort_by_key(|t| t.id);
    let tasks_scanned = sorted.len();

    let mut stale_holds = Vec::new();
    for task in &sorted {
        let Some(hold) = task.binding().and_then(|b| b.hold.as_ref()) else {
            continue;
        };
        if hold.next_review_at <= now || hold.reason == HoldReason::ManualPause {
            stale_holds.push(StaleHold {
                task_id: task.id,
                reason: hold.reason.clone(),
                next_review_at: hold.next_review_at,
                is_manual_pause: hold.reason == HoldReason::ManualPause,
            });
        }
    }

    let mut effects = Vec::new();
    for stale in stale_holds.iter().take(MAX_STALE_HOLDS_PER_CYCLE) {
        if stale.is_manual_pause {
            effects.push(SyncEffect::Noop {
                reason: format!(
                    "task {} held by manual_pause; periodic review does not release it",
                    stale.task_id
                ),
            });
        } else {
            effects.push(SyncEffect::ClearHold {
                task_id: stale.task_id,
            });
            effects.push(SyncEffect::UpdateTaskStatus {
                task_id: stale.task_id,
                status: TaskStatus::Pending,
            });
        }
    }

    let drift_reports = detect_goal_task_drift(tasks, get_goal_status);
    effects.extend(resolve_drift(&drift_reports));

    ReviewReport {
        reviewed_at: now,
        stale_holds,
        drift_reports,
        effects,
        tasks_scanned,
    }
}
