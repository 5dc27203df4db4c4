//! Injected dependency ports.
//!
//! The core operates on in-memory state and reaches its collaborators (task
//! store, threat endpoint, domain solvers) only through these traits. Every
//! long-lived object is explicitly constructed and passed; there are no
//! module-level singletons.

use async_trait::async_trait;
use uuid::Uuid;

use super::models::{
    LifecycleEvent, PlanningDecision, SolveInput, SolveOutput, Task, TaskMetadata, TaskStatus,
    ThreatBridgeReport, ThreatSignal,
};

/// Dependencies injected into the goal resolver.
///
/// The resolver holds its keyed mutex across `all_tasks` and `store_task`;
/// implementations must return promptly and must never re-enter the resolver
/// for the same key.
#[async_trait]
pub trait GoalResolverDeps: Send + Sync {
    /// Snapshot of every task in the store.
    async fn all_tasks(&self) -> Vec<Task>;

    /// Persist a newly created task; returns the stored task.
    async fn store_task(&self, task: Task) -> Task;

    /// Generate a fresh task id.
    fn generate_task_id(&self) -> Uuid;

    /// Generate a fresh goal instance id.
    fn generate_instance_id(&self) -> Uuid;

    /// Re-check that a completed candidate still satisfies the intent.
    /// Defaults to trusting the recorded completion.
    async fn is_still_satisfied(&self, _task: &Task) -> bool {
        true
    }
}

/// Dependencies injected into the threat→hold bridge.
#[async_trait]
pub trait ThreatBridgeDeps: Send + Sync {
    /// Fetch the current threat signal. Must never fail: implementations
    /// return the fail-closed signal on any fetch or parse problem.
    async fn fetch_signal(&self) -> ThreatSignal;

    /// Snapshot of the tasks the bridge should evaluate.
    async fn tasks_to_evaluate(&self) -> Vec<Task>;

    /// Persist a task status change.
    async fn update_task_status(&self, id: Uuid, status: TaskStatus);

    /// Persist a task metadata change (full metadata write-back).
    async fn update_task_metadata(&self, id: Uuid, metadata: TaskMetadata);

    /// Observe a lifecycle event. Optional; default drops it.
    async fn emit_lifecycle_event(&self, _event: LifecycleEvent) {}

    /// Observe the per-pass bridge report. Optional; default drops it.
    async fn emit_bridge_report(&self, _report: ThreatBridgeReport) {}
}

/// A registered domain solver (crafting, tool progression, acquisition,
/// hierarchical routing, building).
///
/// Solvers are external; the façade only fixes the wiring contract. A solver
/// returns a blocked decision rather than an empty step list when it cannot
/// plan.
#[async_trait]
pub trait DomainSolver: Send + Sync {
    /// Stable identifier of this solver.
    fn solver_id(&self) -> &str;

    /// Produce a plan for the given request.
    async fn solve(&self, input: SolveInput) -> PlanningDecision<SolveOutput>;
}
