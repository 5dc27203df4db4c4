//! Domain error types for the Waystone planning core.
//!
//! This module defines all error types using thiserror for structured error
//! handling. Each error enum represents failures from one subsystem; expected
//! outcomes (hold rejections, blocked plans) are modelled as tagged result
//! enums in their own modules, not as errors.

use thiserror::Error;
use uuid::Uuid;

/// Errors from goal identity computation and anchoring.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IdentityError {
    /// The binding already carries a site signature; anchoring is one-way.
    #[error("goal identity is already anchored (instance {0})")]
    AlreadyAnchored(Uuid),
}

/// Errors from binding normalization and hold bookkeeping.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BindingError {
    /// The task carries no goal binding, so the operation has no target.
    #[error("task {0} has no goal binding")]
    NoBinding(Uuid),

    /// One or more binding invariants do not hold on the task.
    #[error("task {task_id} violates goal-state invariants: {violations:?}")]
    IllegalState {
        task_id: Uuid,
        violations: Vec<String>,
    },
}

/// Errors from the completion verifier registry.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VerifierError {
    /// A verifier with the same name is already registered.
    #[error("verifier already registered: {0}")]
    DuplicateName(String),
}

/// Errors from macro graph construction.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    /// Registration was attempted after the topology was frozen.
    #[error("macro graph is frozen; cannot register {0}")]
    Frozen(String),

    /// An edge endpoint names a context that is not registered.
    #[error("edge endpoint references unknown context: {0}")]
    UnknownEndpoint(String),

    /// A context id encodes coordinates, which abstract contexts must not.
    #[error("context id must stay abstract (no coordinates): {0}")]
    CoordinateLikeId(String),
}
