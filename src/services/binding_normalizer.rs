//! Binding normalizer: illegal-state detection and hold↔task mirroring.
//!
//! The binding's hold is the source of truth; `blocked_reason` and
//! `next_eligible_at` on the task metadata are mirrors kept in lockstep here.
//! Detection reports every violation, not just the first, so a caller can log
//! a complete picture before deciding to repair or abort.

use chrono::{DateTime, Utc};

use crate::domain::error::BindingError;
use crate::domain::models::{GoalHold, HoldReason, Task, TaskStatus, VerificationResult};
use crate::services::config::STABILITY_THRESHOLD;

/// One detected violation of the goal-state invariants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateViolation {
    /// Status is paused but the binding carries no hold
    PausedWithoutHold,
    /// A hold is present but the task is neither paused nor terminal
    HeldWithoutPaused { reason: HoldReason },
    /// A manual-pause hold is not mirrored into `blocked_reason`
    ManualPauseMirrorMissing,
    /// Enough consecutive passes accumulated but status never completed
    StablePassesNotCompleted { passes: u32 },
    /// A site signature exists but no alias records the key transition
    AnchoredWithoutAliases,
    /// The hold mirrors on metadata disagree with the hold itself
    HoldMirrorDrift { detail: String },
}

impl std::fmt::Display for StateViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PausedWithoutHold => write!(f, "paused task has no hold"),
            Self::HeldWithoutPaused { reason } => {
                write!(f, "hold '{reason}' present but task is not paused")
            }
            Self::ManualPauseMirrorMissing => {
                write!(f, "manual_pause hold not mirrored into blocked_reason")
            }
            Self::StablePassesNotCompleted { passes } => {
                write!(f, "{passes} consecutive passes but status is not completed")
            }
            Self::AnchoredWithoutAliases => {
                write!(f, "site signature present but goal_key_aliases is empty")
            }
            Self::HoldMirrorDrift { detail } => write!(f, "hold mirror drift: {detail}"),
        }
    }
}

/// Apply every invariant rule to a task, returning all violations.
///
/// Non-goal tasks vacuously satisfy every rule.
pub fn detect_illegal_states(task: &Task) -> Vec<StateViolation> {
    let Some(binding) = task.binding() else {
        return Vec::new();
    };
    let mut violations = Vec::new();

    // Paused ⇔ hold present, terminal statuses exempt.
    if !task.status.is_terminal() {
        if task.status == TaskStatus::Paused && binding.hold.is_none() {
            violations.push(StateViolation::PausedWithoutHold);
        }
        if let Some(hold) = &binding.hold {
            if task.status != TaskStatus::Paused {
                violations.push(StateViolation::HeldWithoutPaused {
                    reason: hold.reason.clone(),
                });
            }
        }
    }

    // Manual pause must be visible on the task itself.
    if let Some(hold) = &binding.hold {
        if hold.reason == HoldReason::ManualPause
            && task.metadata.blocked_reason.as_deref() != Some("manual_pause")
        {
            violations.push(StateViolation::ManualPauseMirrorMissing);
        }
    }

    // A stable pass streak must have produced completion.
    if binding.completion.consecutive_passes >= STABILITY_THRESHOLD
        && task.status != TaskStatus::Completed
    {
        violations.push(StateViolation::StablePassesNotCompleted {
            passes: binding.completion.consecutive_passes,
        });
    }

    // Phase B implies the key transition was recorded.
    if binding.anchors.site_signature.is_some() && binding.goal_key_aliases.is_empty() {
        violations.push(StateViolation::AnchoredWithoutAliases);
    }

    // Mirror fields reflect the current hold or are both absent.
    match &binding.hold {
        Some(hold) => {
            if task.metadata.blocked_reason.as_deref() != Some(hold.reason.as_str()) {
                violations.push(StateViolation::HoldMirrorDrift {
                    detail: format!(
                        "blocked_reason is {:?}, hold reason is '{}'",
                        task.metadata.blocked_reason, hold.reason
                    ),
                });
            }
            if task.metadata.next_eligible_at != Some(hold.next_review_at) {
                violations.push(StateViolation::HoldMirrorDrift {
                    detail: "next_eligible_at does not match hold review deadline".to_string(),
                });
            }
        }
        None => {
            if task.metadata.blocked_reason.is_some() || task.metadata.next_eligible_at.is_some() {
                violations.push(StateViolation::HoldMirrorDrift {
                    detail: "mirror fields set without a hold".to_string(),
                });
            }
        }
    }

    violations
}

/// Fail fast on any invariant violation. Used at write boundaries.
pub fn assert_consistent_goal_state(task: &Task) -> Result<(), BindingError> {
    let violations = detect_illegal_states(task);
    if violations.is_empty() {
        Ok(())
    } else {
        Err(BindingError::IllegalState {
            task_id: task.id,
            violations: violations.iter().map(ToString::to_string).collect(),
        })
    }
}

/// Mirror the binding's hold into `blocked_reason` / `next_eligible_at`, or
/// clear both when no hold is present. Returns whether anything changed.
pub fn sync_hold_to_task_fields(task: &mut Task) -> bool {
    let (reason, deadline) = match task.binding().and_then(|b| b.hold.as_ref()) {
        Some(hold) => (
            Some(hold.reason.as_str().to_string()),
            Some(hold.next_review_at),
        ),
        None => (None, None),
    };

    let mut mutated = false;
    if task.metadata.blocked_reason != reason {
        task.metadata.blocked_reason = reason;
        mutated = true;
    }
    if task.metadata.next_eligible_at != deadline {
        task.metadata.next_eligible_at = deadline;
        mutated = true;
    }
    mutated
}

/// Assign a hold and mirror it. Fails if the task has no binding.
pub fn apply_hold(task: &mut Task, hold: GoalHold) -> Result<(), BindingError> {
    let Some(binding) = task.binding_mut() else {
        return Err(BindingError::NoBinding(task.id));
    };
    binding.hold = Some(hold);
    sync_hold_to_task_fields(task);
    Ok(())
}

/// Remove any hold and clear the mirrors. No-op on non-goal tasks.
pub fn clear_hold(task: &mut Task) {
    if let Some(binding) = task.binding_mut() {
        binding.hold = None;
    }
    sync_hold_to_task_fields(task);
}

/// Record one verifier outcome on the binding's completion state.
///
/// A passing result extends the streak; a failing one resets it to zero.
pub fn record_verification_result(
    task: &mut Task,
    result: VerificationResult,
    now: DateTime<Utc>,
) -> Result<(), BindingError> {
    let task_id = task.id;
    let Some(binding) = task.binding_mut() else {
        return Err(BindingError::NoBinding(task_id));
    };
    let completion = &mut binding.completion;
    completion.last_verified_at = Some(now);
    if result.done {
        completion.consecutive_passes += 1;
    } else {
        completion.consecutive_passes = 0;
    }
    completion.last_result = Some(result);
    Ok(())
}
