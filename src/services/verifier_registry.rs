//! Completion verifier registry and the stability window.
//!
//! Verifiers are short, idempotent, side-effect-free checks registered by
//! name. The registry contains misbehavior: unknown names and panicking or
//! over-budget verifiers all degrade to failing results with a blocker, never
//! an unwind. Completion requires a stable streak of passes; a failing check
//! on an already-completed task is a regression and reopens it.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::domain::error::{BindingError, VerifierError};
use crate::domain::models::{
    LifecycleEvent, LifecycleEventKind, Task, TaskStatus, VerificationResult,
};
use crate::services::binding_normalizer::record_verification_result;
use crate::services::config::{STABILITY_THRESHOLD, VERIFIER_TIME_BUDGET_MS};
use crate::services::lifecycle_events::LifecycleEventCollector;

/// A registered completion checker.
pub type VerifierFn = dyn Fn(&Task, Option<&Value>) -> VerificationResult + Send + Sync;

/// Strict done predicate for verifier authors: a check is done iff it found
/// no blockers and at least one positive evidence item.
pub fn strict_done(blockers: &[String], evidence: &[String]) -> bool {
    blockers.is_empty() && !evidence.is_empty()
}

/// Named registry of completion verifiers.
#[derive(Default)]
pub struct VerifierRegistry {
    verifiers: HashMap<String, Arc<VerifierFn>>,
}

impl VerifierRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a verifier. Duplicate names fail.
    pub fn register<F>(&mut self, name: impl Into<String>, verifier: F) -> Result<(), VerifierError>
    where
        F: Fn(&Task, Option<&Value>) -> VerificationResult + Send + Sync + 'static,
    {
        let name = name.into();
        if self.verifiers.contains_key(&name) {
            return Err(VerifierError::DuplicateName(name));
        }
        self.verifiers.insert(name, Arc::new(verifier));
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.verifiers.contains_key(name)
    }

    /// Invoke a verifier by name.
    ///
    /// Unknown names, panics, and budget overruns all produce failing
    /// results; this function never unwinds.
    pub fn verify(&self, name: &str, task: &Task, world: Option<&Value>) -> VerificationResult {
        let Some(verifier) = self.verifiers.get(name) else {
            return VerificationResult::failing(vec!["verifier not registered".to_string()]);
        };

        let started = Instant::now();
        let outcome = catch_unwind(AssertUnwindSafe(|| verifier(task, world)));
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match outcome {
            Ok(result) => {
                if elapsed_ms > VERIFIER_TIME_BUDGET_MS {
                    tracing::warn!(verifier = name, elapsed_ms, "verifier exceeded time budget");
                    return VerificationResult::failing(vec![format!(
                        "verifier exceeded time budget ({elapsed_ms}ms > {VERIFIER_TIME_BUDGET_MS}ms)"
                    )]);
                }
                result
            }
            Err(panic) => {
                let msg = panic_message(&panic);
                tracing::warn!(verifier = name, error = %msg, "verifier panicked");
                VerificationResult::failing(vec![format!("verifier threw: {msg}")])
            }
        }
    }
}

fn panic_message(panic: &Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// What one completion check concluded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionProgress {
    /// Passing, but the stability streak is not long enough yet.
    Progressing,
    /// The stability threshold was reached; the task is now completed.
    Completed,
    /// Failing, on a task that was not completed.
    Failed,
    /// Failing, on a completed task: completion is revoked.
    Regression,
}

/// Run the task's verifier, record the result, and apply the outcome.
pub fn check_completion(
    task: &mut Task,
    registry: &VerifierRegistry,
    world: Option<&Value>,
    collector: Option<&LifecycleEventCollector>,
    now: DateTime<Utc>,
) -> Result<CompletionProgress, BindingError> {
    let task_id = task.id;
    let Some(binding) = task.binding() else {
        return Err(BindingError::NoBinding(task_id));
    };
    let verifier_name = binding.completion.verifier.clone();

    let result = registry.verify(&verifier_name, task, world);
    record_verification_result(task, result.clone(), now)?;
    let progress = apply_completion_outcome(task, &result, now);

    if let Some(collector) = collector {
        let passes = task
            .binding()
            .map_or(0, |b| b.completion.consecutive_passes);
        collector.record(LifecycleEvent::new(
            LifecycleEventKind::GoalVerification {
                done: result.done,
                consecutive_passes: passes,
            },
            Some(task_id),
            now,
        ));
        match progress {
            CompletionProgress::Completed => collector.record(LifecycleEvent::new(
                LifecycleEventKind::GoalCompleted,
                Some(task_id),
                now,
            )),
            CompletionProgress::Regression => collector.record(LifecycleEvent::new(
                LifecycleEventKind::GoalRegression,
                Some(task_id),
                now,
            )),
            _ => {}
        }
    }

    Ok(progress)
}

/// Apply a recorded verification result to the task's status.
///
/// Must run after the result has been recorded on the binding: the pass
/// streak drives the completion decision.
pub fn apply_completion_outcome(
    task: &mut Task,
    result: &VerificationResult,
    now: DateTime<Utc>,
) -> CompletionProgress {
    let passes = task
        .binding()
        .map_or(0, |b| b.completion.consecutive_passes);

    if result.done {
        if passes >= STABILITY_THRESHOLD {
            task.status = TaskStatus::Completed;
            task.metadata.completed_at = Some(now);
            task.touch(now);
            return CompletionProgress::Completed;
        }
        return CompletionProgress::Progressing;
    }

    if task.status == TaskStatus::Completed {
        // Completion is revoked: the world no longer satisfies the goal.
        task.status = TaskStatus::Active;
        task.metadata.completed_at = None;
        task.touch(now);
        return CompletionProgress::Regression;
    }
    CompletionProgress::Failed
}
