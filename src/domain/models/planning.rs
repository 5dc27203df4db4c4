//! Planning decision unions.
//!
//! Every planning-stage function that can fail returns a tagged
//! [`PlanningDecision`] instead of an empty collection or an exception.
//! Blockers surface to the caller untouched; errors surface with their cause.

use serde::{Deserialize, Serialize};

/// Closed enumeration of reasons a planning stage is blocked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockedReason {
    InfeasibleDependency,
    InfeasibleReachability,
    BoundExceeded,
    UnknownContext,
    NoMacroPath,
    OntologyGap,
    SchemaMismatch,
    PlannerUnconfigured,
}

impl BlockedReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InfeasibleDependency => "infeasible_dependency",
            Self::InfeasibleReachability => "infeasible_reachability",
            Self::BoundExceeded => "bound_exceeded",
            Self::UnknownContext => "unknown_context",
            Self::NoMacroPath => "no_macro_path",
            Self::OntologyGap => "ontology_gap",
            Self::SchemaMismatch => "schema_mismatch",
            Self::PlannerUnconfigured => "planner_unconfigured",
        }
    }
}

/// Closed enumeration of hard planning errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorReason {
    CycleDetected,
    SerializationError,
    InvariantViolation,
}

impl ErrorReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CycleDetected => "cycle_detected",
            Self::SerializationError => "serialization_error",
            Self::InvariantViolation => "invariant_violation",
        }
    }
}

/// Tagged result of a planning-stage function.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PlanningDecision<T> {
    Ok {
        value: T,
    },
    Blocked {
        reason: BlockedReason,
        detail: String,
    },
    Error {
        reason: ErrorReason,
        detail: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cause: Option<String>,
    },
}

impl<T> PlanningDecision<T> {
    pub fn ok(value: T) -> Self {
        Self::Ok { value }
    }

    pub fn blocked(reason: BlockedReason, detail: impl Into<String>) -> Self {
        Self::Blocked {
            reason,
            detail: detail.into(),
        }
    }

    pub fn error(reason: ErrorReason, detail: impl Into<String>) -> Self {
        Self::Error {
            reason,
            detail: detail.into(),
            cause: None,
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok { .. })
    }

    /// Borrow the ok value, if present.
    pub fn as_ok(&self) -> Option<&T> {
        match self {
            Self::Ok { value } => Some(value),
            _ => None,
        }
    }

    /// Consume into the ok value, if present.
    pub fn into_ok(self) -> Option<T> {
        match self {
            Self::Ok { value } => Some(value),
            _ => None,
        }
    }

    /// The blocked reason, if blocked.
    pub fn blocked_reason(&self) -> Option<BlockedReason> {
        match self {
            Self::Blocked { reason, .. } => Some(*reason),
            _ => None,
        }
    }

    /// Map the ok value, propagating blockers and errors untouched.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> PlanningDecision<U> {
        match self {
            Self::Ok { value } => PlanningDecision::Ok { value: f(value) },
            Self::Blocked { reason, detail } => PlanningDecision::Blocked { reason, detail },
            Self::Error {
                reason,
                detail,
                cause,
            } => PlanningDecision::Error {
                reason,
                detail,
                cause,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decision_accessors() {
        let ok: PlanningDecision<u32> = PlanningDecision::ok(7);
        assert!(ok.is_ok());
        assert_eq!(ok.as_ok(), Some(&7));

        let blocked: PlanningDecision<u32> =
            PlanningDecision::blocked(BlockedReason::NoMacroPath, "no route");
        assert!(!blocked.is_ok());
        assert_eq!(blocked.blocked_reason(), Some(BlockedReason::NoMacroPath));
        assert_eq!(blocked.as_ok(), None);
    }

    #[test]
    fn test_map_propagates_blockers() {
        let blocked: PlanningDecision<u32> =
            PlanningDecision::blocked(BlockedReason::BoundExceeded, "too deep");
        let mapped = blocked.map(|v| v * 2);
        assert_eq!(mapped.blocked_reason(), Some(BlockedReason::BoundExceeded));
    }

    #[test]
    fn test_reason_strings() {
        assert_eq!(
            BlockedReason::PlannerUnconfigured.as_str(),
            "planner_unconfigured"
        );
        assert_eq!(ErrorReason::CycleDetected.as_str(), "cycle_detected");
    }

    #[test]
    fn test_serde_tagging() {
        let blocked: PlanningDecision<u32> =
            PlanningDecision::blocked(BlockedReason::UnknownContext, "ctx");
        let json = serde_json::to_value(&blocked).unwrap();
        assert_eq!(json["status"], "blocked");
        assert_eq!(json["reason"], "unknown_context");
    }
}
