//! Feedback store: learned edge costs and the re-entrant planning guard.
//!
//! Execution outcomes tune edge costs: successes pull the learned cost toward
//! the observed duration with an EMA, failures multiply it and bump the
//! consecutive-failure counter. Feedback that arrives while planning is in
//! flight is a violation of the phase discipline; it is recorded, deferred,
//! and flushed deterministically when the outermost planning phase exits.
//!
//! Feedback mutates only `learned_cost` and `consecutive_failures`. It never
//! adds or removes edges or nodes; the topology capture exists to prove it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::models::{MacroEdge, MicroOutcome};
use crate::services::config::{COST_LEARNING_RATE, DEFAULT_REPLAN_THRESHOLD, FAILURE_PENALTY};
use crate::services::context_graph::MacroGraph;

/// One applied cost mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostUpdate {
    pub edge_id: String,
    pub previous_cost: f64,
    pub new_cost: f64,
    pub consecutive_failures: u32,
}

/// A feedback call that arrived during a planning phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanningViolation {
    pub edge_id: String,
    /// Planning depth at the time of the call
    pub depth: u32,
    /// Caller-supplied location, when available
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub callsite: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// An outcome queued for the post-planning flush.
#[derive(Debug, Clone, PartialEq)]
struct DeferredOutcome {
    outcome: MicroOutcome,
    enqueued_at: DateTime<Utc>,
}

/// Replan recommendation for one edge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplanDecision {
    pub should_replan: bool,
    pub consecutive_failures: u32,
    pub threshold: u32,
}

/// Learned-cost store with the planning-phase guard.
#[derive(Debug)]
pub struct FeedbackStore {
    /// Depth counter, not a boolean: planning phases nest.
    planning_depth: u32,
    violations: Vec<PlanningViolation>,
    deferred: Vec<DeferredOutcome>,
    captured_topology: Option<Vec<String>>,
    replan_threshold: u32,
    learning_rate: f64,
    failure_penalty: f64,
}

impl Default for FeedbackStore {
    fn default() -> Self {
        Self::new()
    }
}

impl FeedbackStore {
    pub fn new() -> Self {
        Self {
            planning_depth: 0,
            violations: Vec::new(),
            deferred: Vec::new(),
            captured_topology: None,
            replan_threshold: DEFAULT_REPLAN_THRESHOLD,
            learning_rate: COST_LEARNING_RATE,
            failure_penalty: FAILURE_PENALTY,
        }
    }

    /// Override the replan threshold (builder method).
    pub fn with_replan_threshold(mut self, threshold: u32) -> Self {
        self.replan_threshold = threshold;
        self
    }

    /// Enter a planning phase; feedback defers until the matching exit.
    pub fn enter_planning_phase(&mut self) {
        self.planning_depth += 1;
    }

    /// Exit a planning phase. When the outermost phase exits, flush the
    /// deferred outcomes in (edge id, enqueue time) order and return the
    /// applied updates.
    pub fn exit_planning_phase(&mut self, graph: &mut MacroGraph) -> Vec<CostUpdate> {
        self.planning_depth = self.planning_depth.saturating_sub(1);
        if self.planning_depth > 0 {
            return Vec::new();
        }

        // Drain before applying so a re-entrant record during the flush
        // cannot grow the queue we are iterating.
        let mut queued = std::mem::take(&mut self.deferred);
        queued.sort_by(|a, b| {
            a.outcome
                .macro_edge_id
                .cmp(&b.outcome.macro_edge_id)
                .then_with(|| a.enqueued_at.cmp(&b.enqueued_at))
        });

        queued
            .into_iter()
            .filter_map(|deferred| self.apply(graph, &deferred.outcome))
            .collect()
    }

    pub fn planning_depth(&self) -> u32 {
        self.planning_depth
    }

    pub fn deferred_count(&self) -> usize {
        self.deferred.len()
    }

    pub fn violations(&self) -> &[PlanningViolation] {
        &self.violations
    }

    /// Record one execution outcome.
    ///
    /// During planning this records a violation, enqueues the outcome, and
    /// mutates nothing; otherwise the cost update applies immediately.
    pub fn record_outcome(
        &mut self,
        graph: &mut MacroGraph,
        outcome: &MicroOutcome,
        callsite: Option<&str>,
        now: DateTime<Utc>,
    ) -> Option<CostUpdate> {
        if self.planning_depth > 0 {
            tracing::warn!(
                edge_id = %outcome.macro_edge_id,
                depth = self.planning_depth,
                callsite = callsite.unwrap_or("unknown"),
                "feedback during planning phase; deferring"
            );
            self.violations.push(PlanningViolation {
                edge_id: outcome.macro_edge_id.clone(),
                depth: self.planning_depth,
                callsite: callsite.map(ToString::to_string),
                timestamp: now,
            });
            self.deferred.push(DeferredOutcome {
                outcome: outcome.clone(),
                enqueued_at: now,
            });
            return None;
        }

        self.apply(graph, outcome)
    }

    fn apply(&self, graph: &mut MacroGraph, outcome: &MicroOutcome) -> Option<CostUpdate> {
        let Some(edge) = graph.edge_mut(&outcome.macro_edge_id) else {
            tracing::warn!(edge_id = %outcome.macro_edge_id, "feedback for unknown edge dropped");
            return None;
        };

        let previous_cost = edge.learned_cost;
        if outcome.success {
            let observed = outcome.duration_ms as f64 / 1000.0;
            edge.learned_cost =
                (1.0 - self.learning_rate) * previous_cost + self.learning_rate * observed;
            edge.consecutive_failures = 0;
        } else {
            edge.learned_cost = previous_cost * self.failure_penalty;
            edge.consecutive_failures += 1;
        }

        Some(CostUpdate {
            edge_id: edge.id.clone(),
            previous_cost,
            new_cost: edge.learned_cost,
            consecutive_failures: edge.consecutive_failures,
        })
    }

    /// Whether an edge has failed often enough to warrant replanning.
    pub fn should_replan(&self, edge: &MacroEdge) -> ReplanDecision {
        ReplanDecision {
            should_replan: edge.consecutive_failures >= self.replan_threshold,
            consecutive_failures: edge.consecutive_failures,
            threshold: self.replan_threshold,
        }
    }

    /// Snapshot the graph's sorted edge-id list.
    pub fn capture_topology(&mut self, graph: &MacroGraph) {
        self.captured_topology = Some(graph.edge_ids_sorted());
    }

    /// Whether the topology differs from the last capture. Without a capture
    /// there is nothing to compare against, so nothing has "changed".
    pub fn topology_changed(&self, graph: &MacroGraph) -> bool {
        match &self.captured_topology {
            Some(captured) => *captured != graph.edge_ids_sorted(),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::ContextDefinition;
    use chrono::{Duration, TimeZone};

    fn frozen_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    fn graph_with_edge(cost: f64) -> (MacroGraph, String) {
        let mut graph = MacroGraph::new();
        graph
            .add_context(ContextDefinition::new("at_base", "home"))
            .unwrap();
        graph
            .add_context(ContextDefinition::new("at_mine", "the mine"))
            .unwrap();
        let id = graph.add_edge("at_base", "at_mine", cost).unwrap();
        (graph, id)
    }

    fn success(edge_id: &str, duration_ms: i64) -> MicroOutcome {
        MicroOutcome {
            macro_edge_id: edge_id.to_string(),
            success: true,
            duration_ms,
            failure_reason: None,
            leaf_steps_completed: 1,
            leaf_steps_failed: 0,
        }
    }

    fn failure(edge_id: &str) -> MicroOutcome {
        MicroOutcome {
            macro_edge_id: edge_id.to_string(),
            success: false,
            duration_ms: 1000,
            failure_reason: Some("micro_execution_failed".to_string()),
            leaf_steps_completed: 0,
            leaf_steps_failed: 1,
        }
    }

    #[test]
    fn test_success_applies_ema() {
        let (mut graph, edge_id) = graph_with_edge(5.0);
        let mut store = FeedbackStore::new();

        let update = store
            .record_outcome(&mut graph, &success(&edge_id, 3000), None, frozen_now())
            .unwrap();
        // 0.7 * 5.0 + 0.3 * 3.0 = 4.4
        assert!((update.new_cost - 4.4).abs() < 1e-9);
        assert_eq!(update.consecutive_failures, 0);
        assert!((graph.edge(&edge_id).unwrap().learned_cost - 4.4).abs() < 1e-9);
    }

    #[test]
    fn test_failure_applies_penalty_and_counts() {
        let (mut graph, edge_id) = graph_with_edge(4.0);
        let mut store = FeedbackStore::new();

        let update = store
            .record_outcome(&mut graph, &failure(&edge_id), None, frozen_now())
            .unwrap();
        assert!((update.new_cost - 6.0).abs() < 1e-9);
        assert_eq!(update.consecutive_failures, 1);

        store.record_outcome(&mut graph, &failure(&edge_id), None, frozen_now());
        assert_eq!(graph.edge(&edge_id).unwrap().consecutive_failures, 2);

        // A success resets the streak.
        store.record_outcome(&mut graph, &success(&edge_id, 2000), None, frozen_now());
        assert_eq!(graph.edge(&edge_id).unwrap().consecutive_failures, 0);
    }

    #[test]
    fn test_feedback_during_planning_defers() {
        let (mut graph, edge_id) = graph_with_edge(5.0);
        let mut store = FeedbackStore::new();

        store.enter_planning_phase();
        let update = store.record_outcome(
            &mut graph,
            &success(&edge_id, 3000),
            Some("executor::on_edge_done"),
            frozen_now(),
        );
        assert!(update.is_none());
        assert_eq!(store.deferred_count(), 1);
        assert_eq!(store.violations().len(), 1);
        assert_eq!(store.violations()[0].depth, 1);
        assert_eq!(
            store.violations()[0].callsite.as_deref(),
            Some("executor::on_edge_done")
        );
        // Cost untouched while deferred.
        assert!((graph.edge(&edge_id).unwrap().learned_cost - 5.0).abs() < f64::EPSILON);

        let updates = store.exit_planning_phase(&mut graph);
        assert_eq!(updates.len(), 1);
        assert!((graph.edge(&edge_id).unwrap().learned_cost - 4.4).abs() < 1e-9);
        assert_eq!(store.deferred_count(), 0);
    }

    #[test]
    fn test_nested_planning_flushes_only_at_depth_zero() {
        let (mut graph, edge_id) = graph_with_edge(5.0);
        let mut store = FeedbackStore::new();

        store.enter_planning_phase();
        store.enter_planning_phase();
        store.record_outcome(&mut graph, &success(&edge_id, 3000), None, frozen_now());

        assert!(store.exit_planning_phase(&mut graph).is_empty());
        assert_eq!(store.planning_depth(), 1);
        assert_eq!(store.deferred_count(), 1);

        let updates = store.exit_planning_phase(&mut graph);
        assert_eq!(updates.len(), 1);
        assert_eq!(store.planning_depth(), 0);
    }

    #[test]
    fn test_exit_clamps_at_zero() {
        let (mut graph, _) = graph_with_edge(5.0);
        let mut store = FeedbackStore::new();
        assert!(store.exit_planning_phase(&mut graph).is_empty());
        assert_eq!(store.planning_depth(), 0);
    }

    #[test]
    fn test_flush_order_is_edge_id_then_enqueue_time() {
        let mut graph = MacroGraph::new();
        for id in ["at_base", "at_mine", "at_forest"] {
            graph.add_context(ContextDefinition::new(id, id)).unwrap();
        }
        let e1 = graph.add_edge("at_base", "at_mine", 5.0).unwrap();
        let e2 = graph.add_edge("at_base", "at_forest", 5.0).unwrap();
        let (first, second) = if e1 < e2 { (e1, e2) } else { (e2, e1) };

        let mut store = FeedbackStore::new();
        store.enter_planning_phase();
        // Enqueue in reverse edge-id order.
        store.record_outcome(&mut graph, &success(&second, 1000), None, frozen_now());
        store.record_outcome(
            &mut graph,
            &success(&first, 2000),
            None,
            frozen_now() + Duration::seconds(1),
        );

        let updates = store.exit_planning_phase(&mut graph);
        let order: Vec<&str> = updates.iter().map(|u| u.edge_id.as_str()).collect();
        assert_eq!(order, vec![first.as_str(), second.as_str()]);
    }

    #[test]
    fn test_should_replan_threshold() {
        let (mut graph, edge_id) = graph_with_edge(5.0);
        let mut store = FeedbackStore::new();

        for _ in 0..2 {
            store.record_outcome(&mut graph, &failure(&edge_id), None, frozen_now());
        }
        let decision = store.should_replan(graph.edge(&edge_id).unwrap());
        assert!(!decision.should_replan);
        assert_eq!(decision.consecutive_failures, 2);

        store.record_outcome(&mut graph, &failure(&edge_id), None, frozen_now());
        let decision = store.should_replan(graph.edge(&edge_id).unwrap());
        assert!(decision.should_replan);
        assert_eq!(decision.threshold, 3);
    }

    #[test]
    fn test_custom_replan_threshold() {
        let (mut graph, edge_id) = graph_with_edge(5.0);
        let mut store = FeedbackStore::new().with_replan_threshold(1);
        store.record_outcome(&mut graph, &failure(&edge_id), None, frozen_now());
        assert!(store.should_replan(graph.edge(&edge_id).unwrap()).should_replan);
    }

    #[test]
    fn test_topology_invariant_under_feedback() {
        let (mut graph, edge_id) = graph_with_edge(5.0);
        let mut store = FeedbackStore::new();
        store.capture_topology(&graph);

        for _ in 0..5 {
            store.record_outcome(&mut graph, &failure(&edge_id), None, frozen_now());
            store.record_outcome(&mut graph, &success(&edge_id, 1500), None, frozen_now());
        }
        assert!(!store.topology_changed(&graph));

        // An actual topology change is detected.
        graph
            .add_context(ContextDefinition::new("at_lake", "the lake"))
            .unwrap();
        graph.add_edge("at_base", "at_lake", 1.0).unwrap();
        assert!(store.topology_changed(&graph));
    }

    #[test]
    fn test_unknown_edge_feedback_dropped() {
        let (mut graph, _) = graph_with_edge(5.0);
        let mut store = FeedbackStore::new();
        let update =
            store.record_outcome(&mut graph, &success("no-such-edge", 1000), None, frozen_now());
        assert!(update.is_none());
    }
}
