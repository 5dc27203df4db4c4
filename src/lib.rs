//! Waystone - planning core for an autonomous embodied agent.
//!
//! The crate turns incoming goal intents into a durable set of tasks and
//! keeps them honest under concurrent stimuli:
//! - Goal binding & resolution: content-addressed task identity with an
//!   atomic resolve-or-create primitive (at most one non-terminal task per
//!   goal type and key)
//! - Lifecycle reducer & holds: a pure event reducer, structured holds with
//!   a non-overridable manual pause, drift detection, a periodic review
//!   backstop, and a fail-closed threat→hold bridge
//! - Hierarchical macro planning: deterministic shortest paths over abstract
//!   contexts with execution-learned edge costs and exactly-once feedback
//!
//! External collaborators (task store, threat endpoint, domain solvers) are
//! injected through the ports in [`domain::ports`]; the core itself holds no
//! global state and no persistence.

pub mod domain;
pub mod services;

// Re-export key types for convenience
pub use domain::models::{
    GoalBinding, GoalHold, HoldReason, MacroEdge, MacroPlan, PlanningDecision, Task, TaskStatus,
    ThreatLevel, ThreatSignal,
};
pub use services::{
    FeedbackStore, GoalResolver, MacroPlanner, PlannerConfig, PlannerFacade, VerifierRegistry,
};
