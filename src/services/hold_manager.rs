//! Hold manager: apply and clear holds under the manual-pause hard wall.
//!
//! A hold pauses a goal without losing why. Manual pauses are operator-owned:
//! no automated caller may clear one. The `force_manual` flag exists solely
//! for explicit operator paths and must never be set by reactors, reviews,
//! reducers, or the threat bridge.

use chrono::{DateTime, Duration, Utc};

use crate::domain::models::{GoalHold, HoldReason, HoldWitness, Task};
use crate::services::binding_normalizer::{apply_hold, clear_hold, sync_hold_to_task_fields};
use crate::services::config::HOLD_REVIEW_WINDOW_MS;

/// Result of a hold request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HoldOutcome {
    /// Hold assigned and mirrored. The caller transitions status itself.
    Applied,
    /// A hold already exists; it is returned unchanged.
    AlreadyHeld { existing: HoldReason },
    /// The task is terminal and can no longer be held.
    Rejected { detail: String },
    /// The task carries no goal binding.
    NotGoalBound,
}

/// Result of a clear request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClearOutcome {
    /// The hold was removed and the mirrors cleared.
    Cleared { reason: HoldReason },
    /// The hold is a manual pause and `force_manual` was not set.
    BlockedManualPause,
    /// There was no hold to clear.
    NoHold,
    /// The task carries no goal binding.
    NotGoalBound,
}

/// Optional knobs for a hold request.
#[derive(Debug, Clone, Default)]
pub struct HoldOptions {
    pub resume_hints: Vec<String>,
    /// Override the default review deadline
    pub next_review_at: Option<DateTime<Utc>>,
    pub witness: Option<HoldWitness>,
}

/// Default review deadline for a new hold.
///
/// Manual pauses never come due on their own; their deadline is effectively
/// infinite.
fn default_review_deadline(reason: &HoldReason, now: DateTime<Utc>) -> DateTime<Utc> {
    if *reason == HoldReason::ManualPause {
        DateTime::<Utc>::MAX_UTC
    } else {
        now + Duration::milliseconds(HOLD_REVIEW_WINDOW_MS)
    }
}

/// Request a hold on a task.
///
/// An applied hold does not change `status`; callers transition to paused
/// themselves so the reducer's effect ordering stays observable.
pub fn request_hold(
    task: &mut Task,
    reason: HoldReason,
    options: HoldOptions,
    now: DateTime<Utc>,
) -> HoldOutcome {
    let Some(binding) = task.binding() else {
        return HoldOutcome::NotGoalBound;
    };

    if task.status.is_terminal() {
        return HoldOutcome::Rejected {
            detail: format!("task is terminal ({})", task.status),
        };
    }

    if let Some(existing) = &binding.hold {
        return HoldOutcome::AlreadyHeld {
            existing: existing.reason.clone(),
        };
    }

    let next_review_at = options
        .next_review_at
        .unwrap_or_else(|| default_review_deadline(&reason, now));
    let hold = GoalHold {
        reason: reason.clone(),
        held_at: now,
        resume_hints: options.resume_hints,
        next_review_at,
        witness: options.witness,
    };

    // The binding was checked above, so this cannot fail.
    if apply_hold(task, hold).is_err() {
        return HoldOutcome::NotGoalBound;
    }
    tracing::debug!(task_id = %task.id, reason = %reason, "hold applied");
    HoldOutcome::Applied
}

/// Request that a task's hold be cleared.
///
/// Hard wall: a manual pause is only cleared when `force_manual` is true,
/// and that flag is reserved for explicit operator paths.
pub fn request_clear_hold(task: &mut Task, force_manual: bool) -> ClearOutcome {
    let Some(binding) = task.binding() else {
        return ClearOutcome::NotGoalBound;
    };
    let Some(hold) = &binding.hold else {
        return ClearOutcome::NoHold;
    };

    let reason = hold.reason.clone();
    if reason == HoldReason::ManualPause && !force_manual {
        tracing::info!(task_id = %task.id, "manual pause hold left in place");
        return ClearOutcome::BlockedManualPause;
    }

    clear_hold(task);
    tracing::debug!(task_id = %task.id, reason = %reason, "hold cleared");
    ClearOutcome::Cleared { reason }
}

/// Push a hold's review deadline out by `ms`. Returns whether a hold existed.
pub fn extend_hold_review(task: &mut Task, ms: i64) -> bool {
    let extended = match task.binding_mut().and_then(|b| b.hold.as_mut()) {
        Some(hold) => {
            hold.next_review_at = hold
                .next_review_at
                .checked_add_signed(Duration::milliseconds(ms))
                .unwrap_or(DateTime::<Utc>::MAX_UTC);
            true
        }
        None => false,
    };
    if extended {
        sync_hold_to_task_fields(task);
    }
    extended
}

/// Whether the task's hold has a review deadline in the past.
pub fn is_hold_due_for_review(task: &Task, now: DateTime<Utc>) -> bool {
    task.binding()
        .and_then(|b| b.hold.as_ref())
        .is_some_and(|hold| hold.next_review_at <= now)
}

/// Whether the task is held by a manual pause.
pub fn is_manually_paused(task: &Task) -> bool {
    task.binding()
        .and_then(|b| b.hold.as_ref())
        .is_some_and(|hold| hold.reason == HoldReason::ManualPause)
}
