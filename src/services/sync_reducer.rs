//! Pure reducer mapping task and goal events to effects.
//!
//! The reducer never mutates its arguments and never fails: impossible
//! events degrade to a `Noop` effect carrying a human-readable reason. The
//! emitted order of effects is the required application order; callers apply
//! them verbatim.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::models::{GoalStatus, HoldReason, Task, TaskStatus};
use crate::services::config::HOLD_REVIEW_WINDOW_MS;

/// One effect the caller must apply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "effect", rename_all = "snake_case")]
pub enum SyncEffect {
    UpdateGoalStatus {
        goal_id: String,
        status: GoalStatus,
    },
    UpdateTaskStatus {
        task_id: Uuid,
        status: TaskStatus,
    },
    ApplyHold {
        task_id: Uuid,
        reason: HoldReason,
        next_review_at: DateTime<Utc>,
    },
    ClearHold {
        task_id: Uuid,
    },
    UpdateGoalPriority {
        goal_id: String,
        priority: f64,
    },
    Noop {
        reason: String,
    },
}

/// Executor-side task events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TaskEvent {
    TaskStatusChanged { task_id: Uuid, status: TaskStatus },
    TaskProgressUpdated { task_id: Uuid, progress: f64 },
    TaskStepsRegenerated { task_id: Uuid },
}

/// Upstream goal events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GoalEvent {
    GoalPaused { goal_id: String, reason: HoldReason },
    GoalResumed { goal_id: String },
    GoalCancelled { goal_id: String, reason: String },
    GoalReprioritized { goal_id: String, priority: f64 },
}

/// Map a task status onto the goal status axis.
pub fn task_status_to_goal_status(status: TaskStatus) -> GoalStatus {
    match status {
        TaskStatus::Pending | TaskStatus::PendingPlanning => GoalStatus::Pending,
        TaskStatus::Active => GoalStatus::Active,
        TaskStatus::Completed => GoalStatus::Completed,
        TaskStatus::Failed | TaskStatus::Unplannable => GoalStatus::Failed,
        TaskStatus::Paused => GoalStatus::Suspended,
    }
}

/// Reduce one task event to effects.
pub fn reduce_task_event(event: &TaskEvent, tasks: &[Task]) -> Vec<SyncEffect> {
    match event {
        TaskEvent::TaskStatusChanged { task_id, status } => {
            let Some(task) = tasks.iter().find(|t| t.id == *task_id) else {
                return vec![SyncEffect::Noop {
                    reason: format!("task {task_id} not found"),
                }];
            };
            match task.binding().and_then(|b| b.goal_id.clone()) {
                Some(goal_id) => vec![SyncEffect::UpdateGoalStatus {
                    goal_id,
                    status: task_status_to_goal_status(*status),
                }],
                None => vec![SyncEffect::Noop {
                    reason: "task has no upstream goal".to_string(),
                }],
            }
        }
        TaskEvent::TaskProgressUpdated { .. } => vec![SyncEffect::Noop {
            reason: "progress updates do not affect goal status".to_string(),
        }],
        TaskEvent::TaskStepsRegenerated { .. } => vec![SyncEffect::Noop {
            reason: "step regeneration does not affect goal status".to_string(),
        }],
    }
}

/// Tasks bound to a goal, id ascending for deterministic effect emission.
fn bound_tasks<'a>(tasks: &'a [Task], goal_id: &str) -> Vec<&'a Task> {
    let mut bound: Vec<&Task> = tasks
        .iter()
        .filter(|t| {
            t.binding()
                .and_then(|b| b.goal_id.as_deref())
                .is_some_and(|g| g == goal_id)
        })
        .collect();
    bound.sort_by_key(|t| t.id);
    bound
}

/// Reduce one goal event over the tasks bound to it.
pub fn reduce_goal_event(event: &GoalEvent, tasks: &[Task], now: DateTime<Utc>) -> Vec<SyncEffect> {
    let mut effects = Vec::new();

    match event {
        GoalEvent::GoalPaused { goal_id, reason } => {
            for task in bound_tasks(tasks, goal_id) {
                if task.status.is_terminal() || task.status == TaskStatus::Paused {
                    continue;
                }
                effects.push(SyncEffect::ApplyHold {
                    task_id: task.id,
                    reason: reason.clone(),
                    next_review_at: now + Duration::milliseconds(HOLD_REVIEW_WINDOW_MS),
                });
                effects.push(SyncEffect::UpdateTaskStatus {
                    task_id: task.id,
                    status: TaskStatus::Paused,
                });
            }
            if effects.is_empty() {
                effects.push(SyncEffect::Noop {
                    reason: format!("no pausable tasks bound to goal {goal_id}"),
                });
            }
        }

        GoalEvent::GoalResumed { goal_id } => {
            for task in bound_tasks(tasks, goal_id) {
                if task.status != TaskStatus::Paused {
                    continue;
                }
                match task.binding().and_then(|b| b.hold.as_ref()) {
                    Some(hold) if hold.reason == HoldReason::ManualPause => {
                        effects.push(SyncEffect::Noop {
                            reason: format!(
                                "task {} held by manual_pause; resume does not override it",
                                task.id
                            ),
                        });
                    }
                    Some(_) => {
                        // Clear before the status change; the order is
                        // observable and required.
                        effects.push(SyncEffect::ClearHold { task_id: task.id });
                        effects.push(SyncEffect::UpdateTaskStatus {
                            task_id: task.id,
                            status: TaskStatus::Pending,
                        });
                    }
                    None => {
                        effects.push(SyncEffect::UpdateTaskStatus {
                            task_id: task.id,
                            status: TaskStatus::Pending,
                        });
                    }
                }
            }
            if effects.is_empty() {
                effects.push(SyncEffect::Noop {
                    reason: format!("no paused tasks bound to goal {goal_id}"),
                });
            }
        }

        GoalEvent::GoalCancelled { goal_id, reason } => {
            for task in bound_tasks(tasks, goal_id) {
                if task.status.is_terminal() {
                    continue;
                }
                if task.binding().is_some_and(|b| b.hold.is_some()) {
                    effects.push(SyncEffect::ClearHold { task_id: task.id });
                }
                effects.push(SyncEffect::UpdateTaskStatus {
                    task_id: task.id,
                    status: TaskStatus::Failed,
                });
            }
            if effects.is_empty() {
                effects.push(SyncEffect::Noop {
                    reason: format!("no cancellable tasks bound to goal {goal_id} ({reason})"),
                });
            }
        }

        GoalEvent::GoalReprioritized { .. } => {
            effects.push(SyncEffect::Noop {
                reason: "priority is managed separately".to_string(),
            });
        }
    }

    effects
}

/// One detected divergence between a task and its upstream goal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriftReport {
    pub task_id: Uuid,
    pub goal_id: String,
    pub task_status: TaskStatus,
    pub goal_status: GoalStatus,
    /// The corrective goal status (the task is canonical)
    pub corrected: GoalStatus,
}

/// Detect tasks whose mapped status disagrees with their goal's status.
///
/// Goals that do not exist are skipped; the reducer cannot correct what it
/// cannot see.
pub fn detect_goal_task_drift(
    tasks: &[Task],
    get_goal_status: &dyn Fn(&str) -> Option<GoalStatus>,
) -> Vec<DriftReport> {
    let mut reports = Vec::new();
    let mut sorted: Vec<&Task> = tasks.iter().collect();
    sorted.sort_by_key(|t| t.id);

    for task in sorted {
        let Some(goal_id) = task.binding().and_then(|b| b.goal_id.clone()) else {
            continue;
        };
        let Some(goal_status) = get_goal_status(&goal_id) else {
            continue;
        };
        let mapped = task_status_to_goal_status(task.status);
        if mapped != goal_status {
            reports.push(DriftReport {
                task_id: task.id,
                goal_id,
                task_status: task.status,
                goal_status,
                corrected: mapped,
            });
        }
    }
    reports
}

/// Emit corrective effects for drift reports. Task status is canonical.
pub fn resolve_drift(reports: &[DriftReport]) -> Vec<SyncEffect> {
    reports
        .iter()
        .map(|report| SyncEffect::UpdateGoalStatus {
            goal_id: report.goal_id.clone(),
            status: report.corrected,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{GoalBinding, GoalHold};
    use chrono::TimeZone;

    fn frozen_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    fn goal_task(goal_id: &str) -> Task {
        let binding = GoalBinding::provisional(
            Uuid::new_v4(),
            "build_shelter",
            "aaaaaaaaaaaaaaaa",
            "verify_shelter",
        )
        .with_goal_id(goal_id);
        Task::new("Build a shelter", "build_shelter", frozen_now()).with_binding(binding)
    }

    fn held(mut task: Task, reason: HoldReason) -> Task {
        let hold = GoalHold {
            reason: reason.clone(),
            held_at: frozen_now(),
            resume_hints: Vec::new(),
            next_review_at: frozen_now() + Duration::minutes(5),
            witness: None,
        };
        crate::services::binding_normalizer::apply_hold(&mut task, hold).unwrap();
        task.status = TaskStatus::Paused;
        task
    }

    #[test]
    fn test_status_mapping_table() {
        assert_eq!(
            task_status_to_goal_status(TaskStatus::Pending),
            GoalStatus::Pending
        );
        assert_eq!(
            task_status_to_goal_status(TaskStatus::PendingPlanning),
            GoalStatus::Pending
        );
        assert_eq!(
            task_status_to_goal_status(TaskStatus::Active),
            GoalStatus::Active
        );
        assert_eq!(
            task_status_to_goal_status(TaskStatus::Completed),
            GoalStatus::Completed
        );
        assert_eq!(
            task_status_to_goal_status(TaskStatus::Failed),
            GoalStatus::Failed
        );
        assert_eq!(
            task_status_to_goal_status(TaskStatus::Unplannable),
            GoalStatus::Failed
        );
        assert_eq!(
            task_status_to_goal_status(TaskStatus::Paused),
            GoalStatus::Suspended
        );
    }

    #[test]
    fn test_status_changed_maps_to_goal_update() {
        let task = goal_task("g1");
        let event = TaskEvent::TaskStatusChanged {
            task_id: task.id,
            status: TaskStatus::Active,
        };
        let effects = reduce_task_event(&event, &[task]);
        assert_eq!(
            effects,
            vec![SyncEffect::UpdateGoalStatus {
                goal_id: "g1".to_string(),
                status: GoalStatus::Active,
            }]
        );
    }

    #[test]
    fn test_status_changed_without_goal_is_noop() {
        let mut task = goal_task("g1");
        task.binding_mut().unwrap().goal_id = None;
        let event = TaskEvent::TaskStatusChanged {
            task_id: task.id,
            status: TaskStatus::Active,
        };
        let effects = reduce_task_event(&event, &[task]);
        assert!(matches!(effects[0], SyncEffect::Noop { .. }));
    }

    #[test]
    fn test_progress_and_steps_events_are_noop() {
        let task = goal_task("g1");
        let effects = reduce_task_event(
            &TaskEvent::TaskProgressUpdated {
                task_id: task.id,
                progress: 0.5,
            },
            std::slice::from_ref(&task),
        );
        assert!(matches!(effects[0], SyncEffect::Noop { .. }));

        let effects = reduce_task_event(
            &TaskEvent::TaskStepsRegenerated { task_id: task.id },
            std::slice::from_ref(&task),
        );
        assert!(matches!(effects[0], SyncEffect::Noop { .. }));
    }

    #[test]
    fn test_goal_paused_holds_then_pauses() {
        let mut task = goal_task("g1");
        task.status = TaskStatus::Active;
        let tasks = vec![task.clone()];

        let effects = reduce_goal_event(
            &GoalEvent::GoalPaused {
                goal_id: "g1".to_string(),
                reason: HoldReason::Preempted,
            },
            &tasks,
            frozen_now(),
        );
        assert_eq!(effects.len(), 2);
        assert_eq!(
            effects[0],
            SyncEffect::ApplyHold {
                task_id: task.id,
                reason: HoldReason::Preempted,
                next_review_at: frozen_now() + Duration::minutes(5),
            }
        );
        assert_eq!(
            effects[1],
            SyncEffect::UpdateTaskStatus {
                task_id: task.id,
                status: TaskStatus::Paused,
            }
        );
    }

    #[test]
    fn test_goal_paused_twice_noops_second_time() {
        let task = held(goal_task("g1"), HoldReason::Preempted);
        let effects = reduce_goal_event(
            &GoalEvent::GoalPaused {
                goal_id: "g1".to_string(),
                reason: HoldReason::Preempted,
            },
            &[task],
            frozen_now(),
        );
        assert_eq!(effects.len(), 1);
        assert!(matches!(effects[0], SyncEffect::Noop { .. }));
    }

    #[test]
    fn test_goal_resumed_clears_then_unpauses() {
        let task = held(goal_task("g1"), HoldReason::Preempted);
        let effects = reduce_goal_event(
            &GoalEvent::GoalResumed {
                goal_id: "g1".to_string(),
            },
            &[task.clone()],
            frozen_now(),
        );
        assert_eq!(
            effects,
            vec![
                SyncEffect::ClearHold { task_id: task.id },
                SyncEffect::UpdateTaskStatus {
                    task_id: task.id,
                    status: TaskStatus::Pending,
                },
            ]
        );
    }

    #[test]
    fn test_goal_resumed_respects_manual_pause() {
        let task = held(goal_task("g1"), HoldReason::ManualPause);
        let effects = reduce_goal_event(
            &GoalEvent::GoalResumed {
                goal_id: "g1".to_string(),
            },
            &[task],
            frozen_now(),
        );
        assert_eq!(effects.len(), 1);
        match &effects[0] {
            SyncEffect::Noop { reason } => assert!(reason.contains("manual_pause")),
            other => panic!("expected noop, got {other:?}"),
        }
    }

    #[test]
    fn test_goal_cancelled_clears_hold_before_failing() {
        let held_task = held(goal_task("g1"), HoldReason::ManualPause);
        let mut plain = goal_task("g1");
        plain.status = TaskStatus::Active;
        // Deterministic order: effects come out id-ascending.
        let tasks = vec![held_task.clone(), plain.clone()];

        let effects = reduce_goal_event(
            &GoalEvent::GoalCancelled {
                goal_id: "g1".to_string(),
                reason: "operator abort".to_string(),
            },
            &tasks,
            frozen_now(),
        );

        let mut expected = Vec::new();
        let mut ordered = vec![&held_task, &plain];
        ordered.sort_by_key(|t| t.id);
        for task in ordered {
            if task.binding().unwrap().hold.is_some() {
                expected.push(SyncEffect::ClearHold { task_id: task.id });
            }
            expected.push(SyncEffect::UpdateTaskStatus {
                task_id: task.id,
                status: TaskStatus::Failed,
            });
        }
        assert_eq!(effects, expected);
    }

    #[test]
    fn test_goal_reprioritized_is_noop() {
        let effects = reduce_goal_event(
            &GoalEvent::GoalReprioritized {
                goal_id: "g1".to_string(),
                priority: 0.9,
            },
            &[],
            frozen_now(),
        );
        assert_eq!(effects.len(), 1);
        assert!(matches!(effects[0], SyncEffect::Noop { .. }));
    }

    #[test]
    fn test_reducer_purity() {
        // The serialized inputs must be byte-identical before and after.
        let tasks = vec![
            held(goal_task("g1"), HoldReason::Preempted),
            goal_task("g1"),
        ];
        let before = serde_json::to_string(&tasks).unwrap();

        let _ = reduce_goal_event(
            &GoalEvent::GoalResumed {
                goal_id: "g1".to_string(),
            },
            &tasks,
            frozen_now(),
        );
        let _ = reduce_goal_event(
            &GoalEvent::GoalCancelled {
                goal_id: "g1".to_string(),
                reason: "x".to_string(),
            },
            &tasks,
            frozen_now(),
        );

        let after = serde_json::to_string(&tasks).unwrap();
        assert_eq!(before, after);
    }

    #[test]
    fn test_reducer_determinism_with_frozen_clock() {
        let tasks = vec![goal_task("g1"), goal_task("g1")];
        let event = GoalEvent::GoalPaused {
            goal_id: "g1".to_string(),
            reason: HoldReason::Unsafe,
        };
        let a = reduce_goal_event(&event, &tasks, frozen_now());
        let b = reduce_goal_event(&event, &tasks, frozen_now());
        assert_eq!(a, b);
    }

    #[test]
    fn test_drift_detection_and_resolution() {
        let mut active = goal_task("g1");
        active.status = TaskStatus::Active;
        let mut done = goal_task("g2");
        done.status = TaskStatus::Completed;
        let orphan = goal_task("g-missing");

        let tasks = vec![active.clone(), done.clone(), orphan];
        let get_status = |goal_id: &str| match goal_id {
            "g1" => Some(GoalStatus::Suspended), // drifted
            "g2" => Some(GoalStatus::Completed), // in sync
            _ => None,                           // goal does not exist
        };

        let reports = detect_goal_task_drift(&tasks, &get_status);
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].task_id, active.id);
        assert_eq!(reports[0].corrected, GoalStatus::Active);

        let effects = resolve_drift(&reports);
        assert_eq!(
            effects,
            vec![SyncEffect::UpdateGoalStatus {
                goal_id: "g1".to_string(),
                status: GoalStatus::Active,
            }]
        );
    }
}
