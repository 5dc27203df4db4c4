//! Shared helpers for integration tests.
#![allow(dead_code)]

use std::sync::{Mutex, Once};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use uuid::Uuid;

use waystone::domain::models::{BlockPos, GoalBinding, Task, TaskStatus};
use waystone::domain::ports::GoalResolverDeps;
use waystone::services::ResolutionInput;

static TRACING: Once = Once::new();

/// Install a test-writer tracing subscriber once per test binary.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// A fixed instant for frozen-clock tests.
pub fn frozen_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
}

/// A goal-bound task of the given type, optionally bound to an upstream
/// goal.
pub fn goal_task(goal_type: &str, goal_id: Option<&str>) -> Task {
    let input = ResolutionInput::new(goal_type, BlockPos::new(5, 64, 5), frozen_now());
    let mut binding = GoalBinding::provisional(
        Uuid::new_v4(),
        goal_type,
        input.provisional_key(),
        format!("verify_{goal_type}"),
    );
    if let Some(goal_id) = goal_id {
        binding = binding.with_goal_id(goal_id);
    }
    Task::new(goal_type.replace('_', " "), goal_type, frozen_now()).with_binding(binding)
}

/// An active goal-bound task.
pub fn active_goal_task(goal_type: &str, goal_id: Option<&str>) -> Task {
    let mut task = goal_task(goal_type, goal_id);
    task.status = TaskStatus::Active;
    task
}

/// In-memory task store used as resolver deps.
#[derive(Default)]
pub struct MemoryStore {
    pub tasks: Mutex<Vec<Task>>,
    pub satisfied: bool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> Vec<Task> {
        self.tasks.lock().unwrap().clone()
    }
}

#[async_trait]
impl GoalResolverDeps for MemoryStore {
    async fn all_tasks(&self) -> Vec<Task> {
        // Yield so concurrent resolutions genuinely interleave.
        tokio::task::yield_now().await;
        self.tasks.lock().unwrap().clone()
    }

    async fn store_task(&self, task: Task) -> Task {
        tokio::task::yield_now().await;
        self.tasks.lock().unwrap().push(task.clone());
        task
    }

    fn generate_task_id(&self) -> Uuid {
        Uuid::new_v4()
    }

    fn generate_instance_id(&self) -> Uuid {
        Uuid::new_v4()
    }

    async fn is_still_satisfied(&self, _task: &Task) -> bool {
        self.satisfied
    }
}
