//! Task domain model.
//!
//! Tasks are the unit of executable work. A task that represents a goal
//! carries a [`GoalBinding`] in its metadata; all lifecycle mutations flow
//! through hold-manager and reducer effects applied by the caller.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::binding::GoalBinding;

/// Status of a task in the planning pipeline.
///
/// Terminal statuses (Completed, Failed) are sticky: tasks are never
/// destroyed and never leave a terminal status. Unplannable is deliberately
/// non-terminal so the resolver can still continue such a task once the
/// blocking condition clears.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Task is defined but no execution has started
    Pending,
    /// Task is awaiting a planning pass before it can run
    PendingPlanning,
    /// Task is currently being executed
    Active,
    /// Task is held; the binding's hold records why
    Paused,
    /// Task completed successfully
    Completed,
    /// Task failed
    Failed,
    /// No planner backend could produce steps for this task
    Unplannable,
}

impl Default for TaskStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::PendingPlanning => "pending_planning",
            Self::Active => "active",
            Self::Paused => "paused",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Unplannable => "unplannable",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "pending_planning" => Some(Self::PendingPlanning),
            "active" => Some(Self::Active),
            "paused" => Some(Self::Paused),
            "completed" | "complete" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "unplannable" => Some(Self::Unplannable),
            _ => None,
        }
    }

    /// Check if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Check if this is a non-terminal (continuable) state.
    pub fn is_non_terminal(&self) -> bool {
        !self.is_terminal()
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Where a task originated from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskSource {
    /// Task created by the goal resolver
    Resolver,
    /// Task handed in by an external collaborator (named)
    External(String),
    /// Subtask spawned by another task during execution
    Subtask(Uuid),
}

impl Default for TaskSource {
    fn default() -> Self {
        Self::Resolver
    }
}

/// Provenance metadata attached to steps produced by the planner façade.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StepMeta {
    /// Which backend produced the step ("sterling" or "compiler")
    pub source: String,
    /// Identifier of the domain solver that produced the step, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub solver_id: Option<String>,
    /// Solver plan id the step belongs to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan_id: Option<String>,
    /// Solver bundle the step was lowered from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bundle_id: Option<String>,
    /// Whether the executor may issue this step as a leaf action
    pub executable: bool,
}

/// One ordered step of a task.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Step {
    /// Leaf action name
    pub action: String,
    /// Position within the task's step list
    pub order: u32,
    /// Action arguments
    #[serde(default)]
    pub args: BTreeMap<String, Value>,
    /// Planner provenance, present on façade-produced steps
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<StepMeta>,
}

/// Build-progress substructure for structure-building tasks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildProgress {
    /// Index of the next module to place
    pub module_cursor: u32,
    /// Total module count of the template
    pub total_modules: u32,
}

impl BuildProgress {
    /// Fraction of modules placed, in [0, 1].
    pub fn fraction(&self) -> f64 {
        if self.total_modules == 0 {
            return 0.0;
        }
        f64::from(self.module_cursor) / f64::from(self.total_modules)
    }
}

/// Solver-produced identifiers and digests carried on a task.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SolverMeta {
    /// Id of the solver that produced the current steps
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub solver_id: Option<String>,
    /// Current solver plan id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan_id: Option<String>,
    /// Digest of the previously issued steps, for failure context
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_steps_digest: Option<String>,
    /// Partial-order metadata produced by the building rig
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partial_order: Option<Value>,
}

/// Metadata record owned by a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskMetadata {
    /// When created
    pub created_at: DateTime<Utc>,
    /// When last updated
    pub updated_at: DateTime<Utc>,
    /// When execution started
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    /// When execution completed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// Retry count
    pub retry_count: u32,
    /// Maximum retries
    pub max_retries: u32,
    /// Spawned child tasks
    #[serde(default)]
    pub child_task_ids: Vec<Uuid>,
    /// Tags for categorization
    #[serde(default)]
    pub tags: Vec<String>,
    /// Display category
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    /// Mirror of the hold reason; cleared with the hold
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blocked_reason: Option<String>,
    /// Mirror of the hold review deadline; cleared with the hold
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_eligible_at: Option<DateTime<Utc>>,
    /// Status the threat bridge saw before pausing the task
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threat_hold_prev_status: Option<TaskStatus>,
    /// Present iff the task represents a goal
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub goal_binding: Option<GoalBinding>,
    /// Solver-produced identifiers and digests
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub solver: Option<SolverMeta>,
    /// Build progress for structure tasks
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build: Option<BuildProgress>,
}

impl TaskMetadata {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            created_at: now,
            updated_at: now,
            started_at: None,
            completed_at: None,
            retry_count: 0,
            max_retries: 3,
            child_task_ids: Vec::new(),
            tags: Vec::new(),
            category: None,
            blocked_reason: None,
            next_eligible_at: None,
            threat_hold_prev_status: None,
            goal_binding: None,
            solver: None,
            build: None,
        }
    }
}

/// A discrete unit of executable work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Unique identifier
    pub id: Uuid,
    /// Human-readable title
    pub title: String,
    /// Semantic type tag (e.g. "build_shelter", "craft_tools")
    pub task_type: String,
    /// Priority in [0, 1]
    pub priority: f64,
    /// Urgency in [0, 1]
    pub urgency: f64,
    /// Progress in [0, 1]
    pub progress: f64,
    /// Current status
    pub status: TaskStatus,
    /// Where this task originated from
    pub source: TaskSource,
    /// Ordered steps
    #[serde(default)]
    pub steps: Vec<Step>,
    /// Free-form parameters (canonically ordered for hashing)
    #[serde(default)]
    pub parameters: BTreeMap<String, Value>,
    /// Metadata record
    pub metadata: TaskMetadata,
}

impl Task {
    /// Create a new task with the given title and type tag.
    pub fn new(
        title: impl Into<String>,
        task_type: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            title: title.into(),
            task_type: task_type.into(),
            priority: 0.5,
            urgency: 0.5,
            progress: 0.0,
            status: TaskStatus::default(),
            source: TaskSource::default(),
            steps: Vec::new(),
            parameters: BTreeMap::new(),
            metadata: TaskMetadata::new(now),
        }
    }

    /// Set an explicit id (builder method).
    pub fn with_id(mut self, id: Uuid) -> Self {
        self.id = id;
        self
    }

    /// Set priority (builder method).
    pub fn with_priority(mut self, priority: f64) -> Self {
        self.priority = priority;
        self
    }

    /// Set urgency (builder method).
    pub fn with_urgency(mut self, urgency: f64) -> Self {
        self.urgency = urgency;
        self
    }

    /// Set task source (builder method).
    pub fn with_source(mut self, source: TaskSource) -> Self {
        self.source = source;
        self
    }

    /// Attach a goal binding (builder method).
    pub fn with_binding(mut self, binding: GoalBinding) -> Self {
        self.metadata.goal_binding = Some(binding);
        self
    }

    /// Set a parameter (builder method).
    pub fn with_parameter(mut self, key: impl Into<String>, value: Value) -> Self {
        self.parameters.insert(key.into(), value);
        self
    }

    /// Borrow the goal binding, if the task represents a goal.
    pub fn binding(&self) -> Option<&GoalBinding> {
        self.metadata.goal_binding.as_ref()
    }

    /// Mutably borrow the goal binding.
    pub fn binding_mut(&mut self) -> Option<&mut GoalBinding> {
        self.metadata.goal_binding.as_mut()
    }

    /// Whether this task represents a goal.
    pub fn is_goal_bound(&self) -> bool {
        self.metadata.goal_binding.is_some()
    }

    /// Check if task is terminal.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Bump the updated-at timestamp.
    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.metadata.updated_at = now;
    }

    /// Validate task fields.
    pub fn validate(&self) -> Result<(), String> {
        if self.title.is_empty() {
            return Err("task title cannot be empty".to_string());
        }
        if self.task_type.is_empty() {
            return Err("task type cannot be empty".to_string());
        }
        for (name, v) in [
            ("priority", self.priority),
            ("urgency", self.urgency),
            ("progress", self.progress),
        ] {
            if !(0.0..=1.0).contains(&v) {
                return Err(format!("task {name} must be in [0, 1], got {v}"));
            }
        }
        Ok(())
    }
}
