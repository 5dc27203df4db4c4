//! Macro graph domain model.
//!
//! Abstract contexts and the content-addressed edges between them form a
//! fixed topology. Execution feedback mutates only `learned_cost` and
//! `consecutive_failures` on an edge; the topology itself is invariant.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Version stamped into edge ids and plan digests.
pub const MACRO_SCHEMA_VERSION: u32 = 1;

/// An abstract context registered with the macro planner.
///
/// Context ids are symbolic ("at_base", "has_stone") and must never encode
/// coordinates; the registry rejects coordinate-like ids.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextDefinition {
    pub id: String,
    pub description: String,
    /// Always true; contexts are abstract by construction
    #[serde(rename = "abstract")]
    pub is_abstract: bool,
}

impl ContextDefinition {
    pub fn new(id: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            is_abstract: true,
        }
    }
}

/// A transition between abstract contexts.
///
/// `learned_cost` and `consecutive_failures` are the only mutable fields and
/// only the feedback store writes them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MacroEdge {
    /// Content hash of {schema_version, from, to}
    pub id: String,
    pub from: String,
    pub to: String,
    pub base_cost: f64,
    pub learned_cost: f64,
    pub consecutive_failures: u32,
}

/// An ordered sequence of macro edges with a content-addressed digest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MacroPlan {
    /// Content hash of {schema_version, ordered edge ids, goal id}
    pub plan_digest: String,
    /// Edge snapshots in traversal order
    pub edges: Vec<MacroEdge>,
    pub start: String,
    pub goal: String,
    pub goal_id: String,
    pub total_cost: f64,
}

impl MacroPlan {
    /// Edge ids in traversal order.
    pub fn edge_ids(&self) -> Vec<&str> {
        self.edges.iter().map(|e| e.id.as_str()).collect()
    }
}

/// Status of a macro edge execution session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Running,
    Completed,
    Failed,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

/// Execution tracking for one traversal of one macro edge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MacroEdgeSession {
    pub session_id: String,
    pub macro_edge_id: String,
    pub started_at: DateTime<Utc>,
    pub leaf_steps_issued: u32,
    pub leaf_steps_completed: u32,
    pub leaf_steps_failed: u32,
    pub status: SessionStatus,
    /// Exactly-once finalization latch
    pub outcome_reported: bool,
}

/// The exactly-once report summarizing one macro-edge execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MicroOutcome {
    pub macro_edge_id: String,
    pub success: bool,
    pub duration_ms: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    pub leaf_steps_completed: u32,
    pub leaf_steps_failed: u32,
}
