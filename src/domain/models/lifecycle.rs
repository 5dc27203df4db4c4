//! Lifecycle event model.
//!
//! Lifecycle events are observability, not control flow: components emit them
//! at decision points and the collector keeps a bounded ring for queries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::binding::HoldReason;
use super::goal::GoalStatus;
use super::task::TaskStatus;
use super::threat::ThreatBridgeReport;

/// Type-specific payload of a lifecycle event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LifecycleEventKind {
    GoalCreated {
        goal_type: String,
        goal_key: String,
    },
    GoalResolved {
        action: String,
        goal_key: String,
    },
    GoalAnchored {
        previous_key: String,
        new_key: String,
    },
    GoalHoldApplied {
        reason: HoldReason,
    },
    GoalHoldCleared {
        reason: HoldReason,
    },
    GoalActivated,
    GoalPreempted {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        by_task: Option<Uuid>,
    },
    GoalVerification {
        done: bool,
        consecutive_passes: u32,
    },
    GoalCompleted,
    GoalRegression,
    GoalDriftDetected {
        goal_id: String,
        task_status: TaskStatus,
        goal_status: GoalStatus,
    },
    GoalSyncEffect {
        effect: String,
    },
    ThreatBridgeEvaluated {
        report: ThreatBridgeReport,
    },
}

impl LifecycleEventKind {
    /// The wire name of this event type.
    pub fn name(&self) -> &'static str {
        match self {
            Self::GoalCreated { .. } => "goal_created",
            Self::GoalResolved { .. } => "goal_resolved",
            Self::GoalAnchored { .. } => "goal_anchored",
            Self::GoalHoldApplied { .. } => "goal_hold_applied",
            Self::GoalHoldCleared { .. } => "goal_hold_cleared",
            Self::GoalActivated => "goal_activated",
            Self::GoalPreempted { .. } => "goal_preempted",
            Self::GoalVerification { .. } => "goal_verification",
            Self::GoalCompleted => "goal_completed",
            Self::GoalRegression => "goal_regression",
            Self::GoalDriftDetected { .. } => "goal_drift_detected",
            Self::GoalSyncEffect { .. } => "goal_sync_effect",
            Self::ThreatBridgeEvaluated { .. } => "threat_bridge_evaluated",
        }
    }
}

/// A timestamped lifecycle event, optionally attached to a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LifecycleEvent {
    /// ISO 8601 timestamp
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<Uuid>,
    #[serde(flatten)]
    pub kind: LifecycleEventKind,
}

impl LifecycleEvent {
    pub fn new(kind: LifecycleEventKind, task_id: Option<Uuid>, now: DateTime<Utc>) -> Self {
        Self {
            timestamp: now,
            task_id,
            kind,
        }
    }
}
