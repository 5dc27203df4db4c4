//! Solver wire contracts.
//!
//! The domain solvers (crafting, tool progression, acquisition, hierarchical
//! routing, building) live outside this crate; these types fix the bot→solver
//! request and solver→bot response shapes. Field names follow the wire
//! convention (camelCase) because compatibility matters at this boundary.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Snapshot of world state shipped with a solve request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorldSnapshot {
    /// Item name → count
    #[serde(default)]
    pub inventory: BTreeMap<String, u32>,
    #[serde(default)]
    pub nearby_blocks: Vec<String>,
}

/// What the solver is asked to achieve.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SolveGoal {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub structure: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_tool: Option<String>,
    pub quantity: u32,
}

/// Context about a previous failed attempt, for replan requests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureContext {
    pub failed_leaf: String,
    pub reason_class: String,
    pub attempt_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_steps_digest: Option<String>,
}

/// Bot→solver request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SolveInput {
    pub state: WorldSnapshot,
    pub goal: SolveGoal,
    #[serde(default)]
    pub capability_set: Vec<String>,
    #[serde(default)]
    pub progress_bitmask: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub constraints: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_context: Option<FailureContext>,
}

/// One step of a solver plan.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SolveStep {
    pub action: String,
    #[serde(default)]
    pub args: BTreeMap<String, Value>,
    pub order: u32,
}

/// A bundle of related steps with production/consumption accounting.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SolveBundle {
    pub bundle_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub leaf: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub produces: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consumes: Option<Value>,
}

/// Optional solve metadata attached to a response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SolveMeta {
    #[serde(default)]
    pub bundles: Vec<SolveBundle>,
}

/// Solver→bot response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SolveOutput {
    pub steps: Vec<SolveStep>,
    pub plan_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub solve_meta: Option<SolveMeta>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search_health: Option<Value>,
}
