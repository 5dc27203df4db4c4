//! Services for the Waystone planning core.

pub mod activation_reactor;
pub mod binding_normalizer;
pub mod config;
pub mod context_graph;
pub mod edge_session;
pub mod feedback_store;
pub mod hold_manager;
pub mod identity;
pub mod keyed_mutex;
pub mod lifecycle_events;
pub mod macro_planner;
pub mod periodic_review;
pub mod planner_facade;
pub mod resolver;
pub mod scoring;
pub mod sync_reducer;
pub mod threat_bridge;
pub mod verifier_registry;

pub use activation_reactor::{ActivationReactor, TickContext, TickReport};
pub use binding_normalizer::{
    apply_hold, assert_consistent_goal_state, clear_hold, detect_illegal_states,
    record_verification_result, sync_hold_to_task_fields, StateViolation,
};
pub use config::{strict_requirements_from_env, ConfigError, PlannerConfig};
pub use context_graph::{
    compute_edge_id, compute_plan_digest, looks_coordinate_like, ContextRegistry, MacroGraph,
};
pub use edge_session::{
    create_macro_edge_session, finalize_session, mark_session_completed, mark_session_failed,
    record_leaf_completed, record_leaf_failed,
};
pub use feedback_store::{CostUpdate, FeedbackStore, PlanningViolation, ReplanDecision};
pub use hold_manager::{
    extend_hold_review, is_hold_due_for_review, is_manually_paused, request_clear_hold,
    request_hold, ClearOutcome, HoldOptions, HoldOutcome,
};
pub use identity::{
    anchor_goal_identity, coarse_region, compute_anchored_key, compute_provisional_key,
    hash_goal_key, AnchorInput, TEMPLATE_IDENTITY_TYPES,
};
pub use keyed_mutex::KeyedMutex;
pub use lifecycle_events::LifecycleEventCollector;
pub use macro_planner::MacroPlanner;
pub use periodic_review::{run_periodic_review, ReviewReport, StaleHold};
pub use planner_facade::{
    route_action_plan, HierarchicalRouteContext, PlanBackend, PlannedSteps, PlannerFacade,
    RouteOutcome, SolverRig,
};
pub use resolver::{resolve_goal_dry, DryResolution, GoalResolver, ResolveOutcome};
pub use scoring::{
    find_candidates, is_within_satisfaction_scope, score_candidate, ResolutionInput,
    ScoreBreakdown, ScoredCandidate,
};
pub use sync_reducer::{
    detect_goal_task_drift, reduce_goal_event, reduce_task_event, resolve_drift,
    task_status_to_goal_status, DriftReport, GoalEvent, SyncEffect, TaskEvent,
};
pub use threat_bridge::{
    evaluate_threat_holds, fetch_threat_signal, parse_threat_signal_json, should_hold,
    DEFAULT_THREAT_THRESHOLD,
};
pub use verifier_registry::{
    apply_completion_outcome, check_completion, strict_done, CompletionProgress, VerifierRegistry,
};
