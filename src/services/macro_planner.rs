//! Macro planner: deterministic shortest paths over learned edge costs.
//!
//! The topology is registered once and frozen; planning then runs Dijkstra
//! over `learned_cost` with fully deterministic tie-breaking — the frontier
//! orders by (distance, node id) and neighbours iterate in edge-id order.
//! Repeated planning on an unchanged graph returns an identical digest.

use std::collections::{BTreeMap, BTreeSet};

use crate::domain::error::GraphError;
use crate::domain::models::{
    BlockedReason, ContextDefinition, MacroEdge, MacroPlan, PlanningDecision,
};
use crate::services::config::MAX_MACRO_DEPTH;
use crate::services::context_graph::{compute_plan_digest, MacroGraph};

/// Fixed-topology macro planner.
#[derive(Debug, Clone)]
pub struct MacroPlanner {
    graph: MacroGraph,
    requirement_mappings: BTreeMap<String, String>,
    frozen: bool,
    max_depth: usize,
}

impl Default for MacroPlanner {
    fn default() -> Self {
        Self::new()
    }
}

impl MacroPlanner {
    pub fn new() -> Self {
        Self {
            graph: MacroGraph::new(),
            requirement_mappings: BTreeMap::new(),
            frozen: false,
            max_depth: MAX_MACRO_DEPTH,
        }
    }

    /// Planner preloaded with the standard context set the agent starts
    /// with. Callers may extend it before freezing.
    pub fn default_topology() -> Self {
        let mut planner = Self::new();
        let contexts = [
            ("at_base", "near the home base"),
            ("at_mine", "inside the mine"),
            ("at_forest", "in the forest"),
            ("at_build_site", "at the committed build site"),
            ("has_stone", "holding enough stone"),
            ("has_wood", "holding enough wood"),
        ];
        for (id, description) in contexts {
            planner
                .register_context(ContextDefinition::new(id, description))
                .expect("default context ids are coordinate-free");
        }

        let edges = [
            ("at_base", "at_mine", 2.0),
            ("at_mine", "at_base", 2.0),
            ("at_mine", "has_stone", 3.0),
            ("at_base", "at_forest", 2.0),
            ("at_forest", "at_base", 2.0),
            ("at_forest", "has_wood", 3.0),
            ("at_base", "at_build_site", 1.0),
            ("at_build_site", "at_base", 1.0),
        ];
        for (from, to, cost) in edges {
            planner
                .register_edge(from, to, cost)
                .expect("default edges reference registered contexts");
        }

        for (kind, context) in [
            ("mine", "has_stone"),
            ("collect", "has_wood"),
            ("build", "at_build_site"),
        ] {
            planner
                .register_requirement_mapping(kind, context)
                .expect("default mappings reference registered contexts");
        }
        planner
    }

    fn ensure_unfrozen(&self, what: &str) -> Result<(), GraphError> {
        if self.frozen {
            return Err(GraphError::Frozen(what.to_string()));
        }
        Ok(())
    }

    /// Register an abstract context. Only allowed before `freeze`.
    pub fn register_context(&mut self, context: ContextDefinition) -> Result<(), GraphError> {
        self.ensure_unfrozen(&format!("context {}", context.id))?;
        self.graph.add_context(context)
    }

    /// Register an edge; idempotent per (from, to). Only allowed before
    /// `freeze`. Returns the content-addressed edge id.
    pub fn register_edge(
        &mut self,
        from: &str,
        to: &str,
        base_cost: f64,
    ) -> Result<String, GraphError> {
        self.ensure_unfrozen(&format!("edge {from}->{to}"))?;
        self.graph.add_edge(from, to, base_cost)
    }

    /// Map a requirement kind onto its goal context. Only allowed before
    /// `freeze`.
    pub fn register_requirement_mapping(
        &mut self,
        kind: &str,
        context_id: &str,
    ) -> Result<(), GraphError> {
        self.ensure_unfrozen(&format!("mapping {kind}"))?;
        if !self.graph.registry().contains(context_id) {
            return Err(GraphError::UnknownEndpoint(context_id.to_string()));
        }
        self.requirement_mappings
            .insert(kind.to_string(), context_id.to_string());
        Ok(())
    }

    /// Freeze the topology; registration fails afterwards.
    pub fn freeze(&mut self) {
        self.frozen = true;
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    pub fn graph(&self) -> &MacroGraph {
        &self.graph
    }

    /// Mutable graph access for the feedback store.
    pub fn graph_mut(&mut self) -> &mut MacroGraph {
        &mut self.graph
    }

    /// The goal context for a requirement kind.
    pub fn context_from_requirement(&self, kind: &str) -> PlanningDecision<String> {
        match self.requirement_mappings.get(kind) {
            Some(context) => PlanningDecision::ok(context.clone()),
            None => PlanningDecision::blocked(
                BlockedReason::OntologyGap,
                format!("no context mapping registered for requirement kind '{kind}'"),
            ),
        }
    }

    /// Validate a context id against the registry.
    pub fn validate_context(&self, id: &str) -> PlanningDecision<()> {
        self.graph.registry().validate(id)
    }

    /// Plan a macro path from `start` to `goal`.
    pub fn plan_macro_path(
        &self,
        start: &str,
        goal: &str,
        goal_id: &str,
    ) -> PlanningDecision<MacroPlan> {
        if let PlanningDecision::Blocked { reason, detail } = self.validate_context(start) {
            return PlanningDecision::Blocked { reason, detail };
        }
        if let PlanningDecision::Blocked { reason, detail } = self.validate_context(goal) {
            return PlanningDecision::Blocked { reason, detail };
        }

        if start == goal {
            let empty: [&str; 0] = [];
            return PlanningDecision::ok(MacroPlan {
                plan_digest: compute_plan_digest(&empty, goal_id),
                edges: Vec::new(),
                start: start.to_string(),
                goal: goal.to_string(),
                goal_id: goal_id.to_string(),
                total_cost: 0.0,
            });
        }

        let mut dist: BTreeMap<String, f64> = BTreeMap::new();
        let mut prev_edge: BTreeMap<String, MacroEdge> = BTreeMap::new();
        let mut settled: BTreeSet<String> = BTreeSet::new();
        let mut frontier: Vec<String> = vec![start.to_string()];
        dist.insert(start.to_string(), 0.0);

        let mut iterations = 0usize;
        while !frontier.is_empty() {
            iterations += 1;
            if iterations > self.max_depth {
                return PlanningDecision::blocked(
                    BlockedReason::BoundExceeded,
                    format!("macro search exceeded {} iterations", self.max_depth),
                );
            }

            // Deterministic extraction: nearest first, node id breaking ties.
            frontier.sort_by(|a, b| {
                let da = dist.get(a).copied().unwrap_or(f64::INFINITY);
                let db = dist.get(b).copied().unwrap_or(f64::INFINITY);
                da.partial_cmp(&db)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| a.cmp(b))
            });
            let node = frontier.remove(0);
            if settled.contains(&node) {
                continue;
            }
            settled.insert(node.clone());
            if node == goal {
                break;
            }

            let node_dist = dist.get(&node).copied().unwrap_or(f64::INFINITY);
            for edge in self.graph.edges_from(&node) {
                if settled.contains(&edge.to) {
                    continue;
                }
                let candidate = node_dist + edge.learned_cost;
                let current = dist.get(&edge.to).copied().unwrap_or(f64::INFINITY);
                if candidate < current {
                    dist.insert(edge.to.clone(), candidate);
                    prev_edge.insert(edge.to.clone(), edge.clone());
                    if !frontier.contains(&edge.to) {
                        frontier.push(edge.to.clone());
                    }
                }
            }
        }

        if !settled.contains(goal) {
            return PlanningDecision::blocked(
                BlockedReason::NoMacroPath,
                format!("no macro path from '{start}' to '{goal}'"),
            );
        }

        // Reconstruct backwards.
        let mut edges = Vec::new();
        let mut cursor = goal.to_string();
        while cursor != start {
            let Some(edge) = prev_edge.get(&cursor) else {
                return PlanningDecision::error(
                    crate::domain::models::ErrorReason::InvariantViolation,
                    format!("path reconstruction lost its predecessor at '{cursor}'"),
                );
            };
            cursor = edge.from.clone();
            edges.push(edge.clone());
        }
        edges.reverse();

        let edge_ids: Vec<&str> = edges.iter().map(|e| e.id.as_str()).collect();
        let total_cost = dist.get(goal).copied().unwrap_or(0.0);
        PlanningDecision::ok(MacroPlan {
            plan_digest: compute_plan_digest(&edge_ids, goal_id),
            edges,
            start: start.to_string(),
            goal: goal.to_string(),
            goal_id: goal_id.to_string(),
            total_cost,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frozen_planner_rejects_registration() {
        let mut planner = MacroPlanner::default_topology();
        planner.freeze();
        assert!(planner
            .register_context(ContextDefinition::new("at_nether", "nether side"))
            .is_err());
        assert!(planner.register_edge("at_base", "at_mine", 1.0).is_err());
        assert!(planner
            .register_requirement_mapping("craft", "at_base")
            .is_err());
    }

    #[test]
    fn test_unknown_context_blocks() {
        let planner = MacroPlanner::default_topology();
        let decision = planner.plan_macro_path("at_base", "at_moon", "g");
        assert_eq!(
            decision.blocked_reason(),
            Some(BlockedReason::UnknownContext)
        );
        let decision = planner.plan_macro_path("at_moon", "at_base", "g");
        assert_eq!(
            decision.blocked_reason(),
            Some(BlockedReason::UnknownContext)
        );
    }

    #[test]
    fn test_same_start_and_goal_yields_empty_plan() {
        let planner = MacroPlanner::default_topology();
        let plan = planner
            .plan_macro_path("at_base", "at_base", "g")
            .into_ok()
            .unwrap();
        assert!(plan.edges.is_empty());
        assert_eq!(plan.total_cost, 0.0);
        assert!(!plan.plan_digest.is_empty());
    }

    #[test]
    fn test_plans_expected_route() {
        let planner = MacroPlanner::default_topology();
        let plan = planner
            .plan_macro_path("at_base", "has_stone", "g")
            .into_ok()
            .unwrap();

        let route: Vec<(&str, &str)> = plan
            .edges
            .iter()
            .map(|e| (e.from.as_str(), e.to.as_str()))
            .collect();
        assert_eq!(route, vec![("at_base", "at_mine"), ("at_mine", "has_stone")]);
        assert!((plan.total_cost - 5.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_repeated_planning_is_digest_stable() {
        let planner = MacroPlanner::default_topology();
        let a = planner
            .plan_macro_path("at_base", "has_stone", "g")
            .into_ok()
            .unwrap();
        let b = planner
            .plan_macro_path("at_base", "has_stone", "g")
            .into_ok()
            .unwrap();
        assert_eq!(a.plan_digest, b.plan_digest);
        assert_eq!(a.edges, b.edges);
    }

    #[test]
    fn test_learned_costs_steer_planning() {
        let mut planner = MacroPlanner::default_topology();
        let edge_id = crate::services::context_graph::compute_edge_id("at_base", "at_mine");
        planner.graph_mut().edge_mut(&edge_id).unwrap().learned_cost = 100.0;

        let plan = planner
            .plan_macro_path("at_base", "has_stone", "g")
            .into_ok()
            .unwrap();
        assert!(plan.total_cost >= 100.0);

        // Digest remains stable for the new (unchanged-after-mutation) state.
        let again = planner
            .plan_macro_path("at_base", "has_stone", "g")
            .into_ok()
            .unwrap();
        assert_eq!(plan.plan_digest, again.plan_digest);
    }

    #[test]
    fn test_no_path_blocks() {
        let mut planner = MacroPlanner::new();
        planner
            .register_context(ContextDefinition::new("at_base", "home"))
            .unwrap();
        planner
            .register_context(ContextDefinition::new("at_island", "unreachable"))
            .unwrap();
        let decision = planner.plan_macro_path("at_base", "at_island", "g");
        assert_eq!(decision.blocked_reason(), Some(BlockedReason::NoMacroPath));
    }

    #[test]
    fn test_depth_bound_exceeded() {
        // A chain longer than the iteration bound.
        let mut planner = MacroPlanner::new();
        let names: Vec<String> = (0..15).map(|i| format!("ctx_{i:02}")).collect();
        for name in &names {
            planner
                .register_context(ContextDefinition::new(name.clone(), "chain link"))
                .unwrap();
        }
        for pair in names.windows(2) {
            planner.register_edge(&pair[0], &pair[1], 1.0).unwrap();
        }

        let decision = planner.plan_macro_path(&names[0], &names[14], "g");
        assert_eq!(
            decision.blocked_reason(),
            Some(BlockedReason::BoundExceeded)
        );
    }

    #[test]
    fn test_requirement_mapping_lookup() {
        let planner = MacroPlanner::default_topology();
        assert_eq!(
            planner.context_from_requirement("mine").into_ok().unwrap(),
            "has_stone"
        );
        assert_eq!(
            planner.context_from_requirement("fish").blocked_reason(),
            Some(BlockedReason::OntologyGap)
        );
    }

    #[test]
    fn test_deterministic_tie_break_on_equal_costs() {
        // Two equal-cost routes; the lexicographically earlier node settles
        // first, so planning is stable run to run.
        let mut planner = MacroPlanner::new();
        for id in ["start", "mid_a", "mid_b", "goal"] {
            planner
                .register_context(ContextDefinition::new(id, id))
                .unwrap();
        }
        planner.register_edge("start", "mid_a", 1.0).unwrap();
        planner.register_edge("start", "mid_b", 1.0).unwrap();
        planner.register_edge("mid_a", "goal", 1.0).unwrap();
        planner.register_edge("mid_b", "goal", 1.0).unwrap();

        let a = planner.plan_macro_path("start", "goal", "g").into_ok().unwrap();
        let b = planner.plan_macro_path("start", "goal", "g").into_ok().unwrap();
        assert_eq!(a.plan_digest, b.plan_digest);
        assert_eq!(a.edges[0].to, b.edges[0].to);
    }
}
