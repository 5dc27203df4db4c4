//! Goal resolver: the atomic resolve-or-create primitive.
//!
//! Resolution enforces the core identity invariant: at most one non-terminal
//! task per (goal type, goal key). Concurrent calls that compute the same
//! provisional key serialize on the keyed mutex; exactly one creates and the
//! rest observe the created task and continue it.

use std::sync::Arc;

use uuid::Uuid;

use crate::domain::models::{
    GoalBinding, LifecycleEvent, LifecycleEventKind, Task, TaskSource,
};
use crate::domain::ports::GoalResolverDeps;
use crate::services::config::PlannerConfig;
use crate::services::keyed_mutex::KeyedMutex;
use crate::services::lifecycle_events::LifecycleEventCollector;
use crate::services::scoring::{find_candidates, is_within_satisfaction_scope, ResolutionInput};

/// Result of one resolution attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolveOutcome {
    /// An existing non-terminal task covers the intent.
    Continue { task_id: Uuid, goal_key: String },
    /// A completed task still satisfies the intent; nothing to do.
    AlreadySatisfied { task_id: Uuid, goal_key: String },
    /// A fresh task was created under the provisional key.
    Created { task_id: Uuid, goal_key: String },
}

impl ResolveOutcome {
    pub fn task_id(&self) -> Uuid {
        match self {
            Self::Continue { task_id, .. }
            | Self::AlreadySatisfied { task_id, .. }
            | Self::Created { task_id, .. } => *task_id,
        }
    }

    pub fn action(&self) -> &'static str {
        match self {
            Self::Continue { .. } => "continue",
            Self::AlreadySatisfied { .. } => "already_satisfied",
            Self::Created { .. } => "created",
        }
    }
}

/// Result of dry resolution: what resolve-or-create would do, without doing
/// it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DryResolution {
    Continue { task_id: Uuid },
    AlreadySatisfied { task_id: Uuid },
    Create { provisional_key: String },
}

/// Scan candidates for a continuable task.
///
/// The first candidate (best score first) that is non-terminal and scores
/// above the continue threshold wins. Non-terminal strictly dominates
/// completed: a continuable task short-circuits any satisfaction checking.
fn continue_candidate(
    tasks: &[Task],
    input: &ResolutionInput,
    config: &PlannerConfig,
) -> Option<Uuid> {
    find_candidates(tasks, input, config)
        .into_iter()
        .find(|c| c.status.is_non_terminal() && c.score > config.continue_threshold)
        .map(|c| c.task_id)
}

/// Completed candidates eligible for a satisfaction check, best first.
fn satisfaction_candidates(
    tasks: &[Task],
    input: &ResolutionInput,
    config: &PlannerConfig,
) -> Vec<Uuid> {
    find_candidates(tasks, input, config)
        .into_iter()
        .filter(|c| {
            c.status == crate::domain::models::TaskStatus::Completed
                && c.score >= config.satisfaction_check_threshold
        })
        .map(|c| c.task_id)
        .collect()
}

/// Dry resolution with a synchronous satisfaction predicate.
///
/// `is_still_satisfied` defaults to trusting the recorded completion when
/// `None` is passed.
pub fn resolve_goal_dry(
    tasks: &[Task],
    input: &ResolutionInput,
    config: &PlannerConfig,
    is_still_satisfied: Option<&dyn Fn(&Task) -> bool>,
) -> DryResolution {
    if let Some(task_id) = continue_candidate(tasks, input, config) {
        return DryResolution::Continue { task_id };
    }

    for task_id in satisfaction_candidates(tasks, input, config) {
        let Some(task) = tasks.iter().find(|t| t.id == task_id) else {
            continue;
        };
        let Some(binding) = task.binding() else {
            continue;
        };
        if !is_within_satisfaction_scope(binding, &input.bot_position, config) {
            continue;
        }
        let satisfied = is_still_satisfied.map_or(true, |check| check(task));
        if satisfied {
            return DryResolution::AlreadySatisfied { task_id };
        }
    }

    DryResolution::Create {
        provisional_key: input.provisional_key(),
    }
}

/// "build_shelter" → "Build shelter".
fn title_from_goal_type(goal_type: &str) -> String {
    let spaced = goal_type.replace('_', " ");
    let mut chars = spaced.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => spaced,
    }
}

/// The atomic resolve-or-create entry point.
pub struct GoalResolver {
    mutex: KeyedMutex,
    config: PlannerConfig,
    collector: Option<Arc<LifecycleEventCollector>>,
}

impl Default for GoalResolver {
    fn default() -> Self {
        Self::new(PlannerConfig::default())
    }
}

impl GoalResolver {
    pub fn new(config: PlannerConfig) -> Self {
        Self {
            mutex: KeyedMutex::new(),
            config,
            collector: None,
        }
    }

    /// Attach a lifecycle event collector (builder method).
    pub fn with_collector(mut self, collector: Arc<LifecycleEventCollector>) -> Self {
        self.collector = Some(collector);
        self
    }

    fn record(&self, kind: LifecycleEventKind, task_id: Uuid, input: &ResolutionInput) {
        if let Some(collector) = &self.collector {
            collector.record(LifecycleEvent::new(kind, Some(task_id), input.now));
        }
    }

    /// Resolve an intent to an existing task or create a fresh one.
    ///
    /// The whole decision runs under the per-key lock: between acquiring the
    /// lock and storing a new task there is no yield point other than the
    /// injected dependency calls themselves, and concurrent calls with the
    /// same computed key are fully serialized.
    pub async fn resolve_or_create<D: GoalResolverDeps>(
        &self,
        input: ResolutionInput,
        deps: &D,
    ) -> ResolveOutcome {
        let provisional_key = input.provisional_key();

        self.mutex
            .with_key_lock(&provisional_key, || async {
                let tasks = deps.all_tasks().await;

                if let Some(task_id) = continue_candidate(&tasks, &input, &self.config) {
                    tracing::debug!(%task_id, key = %provisional_key, "continuing existing goal task");
                    self.record(
                        LifecycleEventKind::GoalResolved {
                            action: "continue".to_string(),
                            goal_key: provisional_key.clone(),
                        },
                        task_id,
                        &input,
                    );
                    return ResolveOutcome::Continue {
                        task_id,
                        goal_key: provisional_key.clone(),
                    };
                }

                for task_id in satisfaction_candidates(&tasks, &input, &self.config) {
                    let Some(task) = tasks.iter().find(|t| t.id == task_id) else {
                        continue;
                    };
                    let Some(binding) = task.binding() else {
                        continue;
                    };
                    if !is_within_satisfaction_scope(binding, &input.bot_position, &self.config) {
                        continue;
                    }
                    if deps.is_still_satisfied(task).await {
                        tracing::debug!(%task_id, "intent already satisfied by completed goal");
                        self.record(
                            LifecycleEventKind::GoalResolved {
                                action: "already_satisfied".to_string(),
                                goal_key: binding.goal_key.clone(),
                            },
                            task_id,
                            &input,
                        );
                        return ResolveOutcome::AlreadySatisfied {
                            task_id,
                            goal_key: binding.goal_key.clone(),
                        };
                    }
                }

                // No continuable or satisfied candidate: create under the
                // provisional key while still holding the lock.
                let task_id = deps.generate_task_id();
                let instance_id = deps.generate_instance_id();
                let mut binding = GoalBinding::provisional(
                    instance_id,
                    input.goal_type.clone(),
                    provisional_key.clone(),
                    format!("verify_{}", input.goal_type),
                );
                if let Some(goal_id) = &input.goal_id {
                    binding = binding.with_goal_id(goal_id.clone());
                }

                let mut task = Task::new(
                    title_from_goal_type(&input.goal_type),
                    input.goal_type.clone(),
                    input.now,
                )
                .with_id(task_id)
                .with_source(TaskSource::Resolver)
                .with_binding(binding);
                task.parameters = input.intent_params.clone();

                let stored = deps.store_task(task).await;
                tracing::info!(task_id = %stored.id, key = %provisional_key, "goal task created");
                self.record(
                    LifecycleEventKind::GoalCreated {
                        goal_type: input.goal_type.clone(),
                        goal_key: provisional_key.clone(),
                    },
                    stored.id,
                    &input,
                );
                self.record(
                    LifecycleEventKind::GoalResolved {
                        action: "created".to_string(),
                        goal_key: provisional_key.clone(),
                    },
                    stored.id,
                    &input,
                );

                ResolveOutcome::Created {
                    task_id: stored.id,
                    goal_key: provisional_key.clone(),
                }
            })
            .await
    }
}
