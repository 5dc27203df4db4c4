//! Domain models for the Waystone planning core.

pub mod binding;
pub mod goal;
pub mod lifecycle;
pub mod macro_graph;
pub mod planning;
pub mod requirement;
pub mod solver;
pub mod task;
pub mod threat;

pub use binding::{
    BlockPos, CompletionState, Facing, FootprintBounds, GoalAnchors, GoalBinding, GoalHold,
    HoldReason, HoldWitness, RegionHint, SiteSignature, VerificationResult,
};
pub use goal::GoalStatus;
pub use lifecycle::{LifecycleEvent, LifecycleEventKind};
pub use macro_graph::{
    ContextDefinition, MacroEdge, MacroEdgeSession, MacroPlan, MicroOutcome, SessionStatus,
    MACRO_SCHEMA_VERSION,
};
pub use planning::{BlockedReason, ErrorReason, PlanningDecision};
pub use requirement::TaskRequirement;
pub use solver::{
    FailureContext, SolveBundle, SolveGoal, SolveInput, SolveMeta, SolveOutput, SolveStep,
    WorldSnapshot,
};
pub use task::{
    BuildProgress, SolverMeta, Step, StepMeta, Task, TaskMetadata, TaskSource, TaskStatus,
};
pub use threat::{Threat, ThreatBridgeReport, ThreatLevel, ThreatSignal};
