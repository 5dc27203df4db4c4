//! Context registry and the content-addressed macro graph.
//!
//! Contexts are abstract, symbolic places in the agent's task space. Their
//! ids must never encode coordinates; the planner reasons about "at_mine",
//! not "x:120,z:-40". Edges and plan digests are content-addressed so that
//! identical topology always yields identical identifiers.

use std::collections::BTreeMap;

use crate::domain::error::GraphError;
use crate::domain::models::{
    BlockedReason, ContextDefinition, MacroEdge, PlanningDecision, MACRO_SCHEMA_VERSION,
};
use crate::services::identity::hash_goal_key;

/// Compute the content-addressed id of an edge.
pub fn compute_edge_id(from: &str, to: &str) -> String {
    hash_goal_key([MACRO_SCHEMA_VERSION.to_string().as_str(), from, to])
}

/// Compute the content-addressed digest of an ordered edge sequence.
pub fn compute_plan_digest<S: AsRef<str>>(edge_ids: &[S], goal_id: &str) -> String {
    let version = MACRO_SCHEMA_VERSION.to_string();
    let mut parts: Vec<&str> = vec![version.as_str()];
    parts.extend(edge_ids.iter().map(AsRef::as_ref));
    parts.push(goal_id);
    hash_goal_key(parts)
}

/// Whether an id looks like it encodes coordinates.
///
/// Flags runs of three or more digits, `x:`/`y:`/`z:` followed by a digit,
/// and digit-comma-digit pairs.
pub fn looks_coordinate_like(id: &str) -> bool {
    let bytes = id.as_bytes();

    let mut digit_run = 0usize;
    for &b in bytes {
        if b.is_ascii_digit() {
            digit_run += 1;
            if digit_run >= 3 {
                return true;
            }
        } else {
            digit_run = 0;
        }
    }

    let lower = id.to_ascii_lowercase();
    for axis in ["x:", "y:", "z:"] {
        if let Some(idx) = lower.find(axis) {
            if lower[idx + axis.len()..]
                .chars()
                .next()
                .is_some_and(|c| c.is_ascii_digit() || c == '-')
            {
                return true;
            }
        }
    }

    bytes.windows(3).any(|w| {
        w[0].is_ascii_digit() && w[1] == b',' && w[2].is_ascii_digit()
    })
}

/// Registry of abstract contexts.
#[derive(Debug, Clone, Default)]
pub struct ContextRegistry {
    contexts: BTreeMap<String, ContextDefinition>,
}

impl ContextRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a context. Coordinate-like ids are rejected.
    pub fn register(&mut self, context: ContextDefinition) -> Result<(), GraphError> {
        if looks_coordinate_like(&context.id) {
            return Err(GraphError::CoordinateLikeId(context.id));
        }
        self.contexts.insert(context.id.clone(), context);
        Ok(())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.contexts.contains_key(id)
    }

    pub fn get(&self, id: &str) -> Option<&ContextDefinition> {
        self.contexts.get(id)
    }

    /// Validate that an id names a registered context.
    pub fn validate(&self, id: &str) -> PlanningDecision<()> {
        if self.contains(id) {
            PlanningDecision::ok(())
        } else {
            PlanningDecision::blocked(
                BlockedReason::UnknownContext,
                format!("context '{id}' is not registered"),
            )
        }
    }

    pub fn len(&self) -> usize {
        self.contexts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contexts.is_empty()
    }
}

/// The macro graph: registered contexts plus content-addressed edges.
///
/// Topology is append-only through registration and invariant afterwards;
/// feedback mutates only the learned cost and failure counter of an edge.
#[derive(Debug, Clone, Default)]
pub struct MacroGraph {
    registry: ContextRegistry,
    edges: BTreeMap<String, MacroEdge>,
}

impl MacroGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn registry(&self) -> &ContextRegistry {
        &self.registry
    }

    pub fn add_context(&mut self, context: ContextDefinition) -> Result<(), GraphError> {
        self.registry.register(context)
    }

    /// Add an edge. Idempotent per (from, to): re-adding returns the existing
    /// edge id and leaves its learned state untouched.
    pub fn add_edge(&mut self, from: &str, to: &str, base_cost: f64) -> Result<String, GraphError> {
        if !self.registry.contains(from) {
            return Err(GraphError::UnknownEndpoint(from.to_string()));
        }
        if !self.registry.contains(to) {
            return Err(GraphError::UnknownEndpoint(to.to_string()));
        }

        let id = compute_edge_id(from, to);
        self.edges.entry(id.clone()).or_insert_with(|| MacroEdge {
            id: id.clone(),
            from: from.to_string(),
            to: to.to_string(),
            base_cost,
            learned_cost: base_cost,
            consecutive_failures: 0,
        });
        Ok(id)
    }

    pub fn edge(&self, id: &str) -> Option<&MacroEdge> {
        self.edges.get(id)
    }

    /// Mutable edge access, reserved for the feedback store.
    pub(crate) fn edge_mut(&mut self, id: &str) -> Option<&mut MacroEdge> {
        self.edges.get_mut(id)
    }

    /// All edges, id ascending.
    pub fn edges(&self) -> impl Iterator<Item = &MacroEdge> {
        self.edges.values()
    }

    /// Outgoing edges of a node, edge-id ascending.
    pub fn edges_from(&self, node: &str) -> Vec<&MacroEdge> {
        // BTreeMap iteration is already id-ascending.
        self.edges.values().filter(|e| e.from == node).collect()
    }

    /// Sorted edge-id list; the topology fingerprint.
    pub fn edge_ids_sorted(&self) -> Vec<String> {
        self.edges.keys().cloned().collect()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }
}
