//! Planner façade: routes task requirements to planning backends.
//!
//! A requirement routes to the sterling rig that owns its domain, to the
//! fixed-plan compiler, or to unplannable. The hierarchical path wraps the
//! routing solver's steps with macro-plan provenance when both the macro
//! planner and the feedback store are configured; without them it returns a
//! blocked sentinel rather than silently degrading.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use serde_json::json;

use crate::domain::models::{
    BlockedReason, MacroPlan, PlanningDecision, SolveOutput, Step, StepMeta, TaskRequirement,
};
use crate::domain::ports::DomainSolver;
use crate::services::config::strict_requirements_from_env;
use crate::services::feedback_store::FeedbackStore;
use crate::services::macro_planner::MacroPlanner;

/// The sterling solver rigs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SolverRig {
    /// Rig A: crafting
    Crafting,
    /// Rig B: tool progression
    ToolProgression,
    /// Rig D: acquisition-upgraded collect/mine
    Acquisition,
    /// Rig E: hierarchical navigate/explore/find
    Hierarchical,
    /// Rig G: building
    Building,
}

impl SolverRig {
    /// Single-letter rig code used on the wire.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Crafting => "A",
            Self::ToolProgression => "B",
            Self::Acquisition => "D",
            Self::Hierarchical => "E",
            Self::Building => "G",
        }
    }
}

/// Which backend a requirement routes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteOutcome {
    Sterling { rig: SolverRig },
    Compiler,
    Unplannable,
}

/// Route a requirement to a backend.
///
/// Strict mode sends a missing requirement to unplannable; permissive mode
/// falls back to the compiler. Collect and mine go to the acquisition rig
/// only when one is registered.
pub fn route_action_plan(
    requirement: Option<&TaskRequirement>,
    strict: bool,
    has_acquisition_solver: bool,
) -> RouteOutcome {
    let Some(requirement) = requirement else {
        return if strict {
            RouteOutcome::Unplannable
        } else {
            RouteOutcome::Compiler
        };
    };

    match requirement {
        TaskRequirement::Craft { .. } => RouteOutcome::Sterling {
            rig: SolverRig::Crafting,
        },
        TaskRequirement::ToolProgression { .. } => RouteOutcome::Sterling {
            rig: SolverRig::ToolProgression,
        },
        TaskRequirement::Build { .. } => RouteOutcome::Sterling {
            rig: SolverRig::Building,
        },
        TaskRequirement::Collect { .. } | TaskRequirement::Mine { .. } => {
            if has_acquisition_solver {
                RouteOutcome::Sterling {
                    rig: SolverRig::Acquisition,
                }
            } else {
                RouteOutcome::Compiler
            }
        }
        TaskRequirement::Navigate { .. }
        | TaskRequirement::Explore { .. }
        | TaskRequirement::Find { .. } => RouteOutcome::Sterling {
            rig: SolverRig::Hierarchical,
        },
    }
}

/// Route context for hierarchical planning.
#[derive(Debug, Clone)]
pub struct HierarchicalRouteContext {
    /// Context the agent currently occupies
    pub start_context: String,
    /// Goal context; derived from the requirement mapping when absent
    pub goal_context: Option<String>,
    pub goal_id: String,
}

/// Backend that produced a plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanBackend {
    Sterling { rig: SolverRig },
    Compiler,
    Unplannable,
}

/// Steps produced for one task, with provenance.
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedSteps {
    pub backend: PlanBackend,
    pub steps: Vec<Step>,
    pub plan_id: Option<String>,
    /// Macro provenance, present on hierarchical plans
    pub macro_plan: Option<MacroPlan>,
}

/// Façade wiring requirements to registered domain solvers.
pub struct PlannerFacade {
    solvers: HashMap<SolverRig, Arc<dyn DomainSolver>>,
    macro_planner: Option<Arc<Mutex<MacroPlanner>>>,
    feedback: Option<Arc<Mutex<FeedbackStore>>>,
    strict: bool,
}

impl Default for PlannerFacade {
    fn default() -> Self {
        Self::new()
    }
}

impl PlannerFacade {
    /// Construct with strict mode read from the environment.
    pub fn new() -> Self {
        Self {
            solvers: HashMap::new(),
            macro_planner: None,
            feedback: None,
            strict: strict_requirements_from_env(),
        }
    }

    /// Override strict mode (builder method).
    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Configure the hierarchical pair (builder method). Both are required
    /// for hierarchical planning; configuring only one still blocks.
    pub fn with_hierarchy(
        mut self,
        macro_planner: Arc<Mutex<MacroPlanner>>,
        feedback: Arc<Mutex<FeedbackStore>>,
    ) -> Self {
        self.macro_planner = Some(macro_planner);
        self.feedback = Some(feedback);
        self
    }

    /// Register a domain solver for a rig.
    pub fn register_solver(&mut self, rig: SolverRig, solver: Arc<dyn DomainSolver>) {
        self.solvers.insert(rig, solver);
    }

    /// Route a requirement under this façade's configuration.
    pub fn route(&self, requirement: Option<&TaskRequirement>) -> RouteOutcome {
        route_action_plan(
            requirement,
            self.strict,
            self.solvers.contains_key(&SolverRig::Acquisition),
        )
    }

    /// Plan steps for a requirement.
    pub async fn plan_task_steps(
        &self,
        requirement: Option<&TaskRequirement>,
        input: crate::domain::models::SolveInput,
        route_ctx: Option<&HierarchicalRouteContext>,
    ) -> PlanningDecision<PlannedSteps> {
        match self.route(requirement) {
            RouteOutcome::Unplannable => PlanningDecision::ok(PlannedSteps {
                backend: PlanBackend::Unplannable,
                steps: Vec::new(),
                plan_id: None,
                macro_plan: None,
            }),
            RouteOutcome::Compiler => PlanningDecision::ok(PlannedSteps {
                backend: PlanBackend::Compiler,
                steps: compiler_lower(requirement),
                plan_id: None,
                macro_plan: None,
            }),
            RouteOutcome::Sterling {
                rig: SolverRig::Hierarchical,
            } => {
                self.plan_hierarchical(requirement, input, route_ctx)
                    .await
            }
            RouteOutcome::Sterling { rig } => {
                let Some(solver) = self.solvers.get(&rig) else {
                    return PlanningDecision::blocked(
                        BlockedReason::PlannerUnconfigured,
                        format!("no solver registered for rig {}", rig.code()),
                    );
                };
                solver.solve(input).await.map(|output| PlannedSteps {
                    backend: PlanBackend::Sterling { rig },
                    steps: steps_from_solver(&output, solver.solver_id()),
                    plan_id: Some(output.plan_id),
                    macro_plan: None,
                })
            }
        }
    }

    async fn plan_hierarchical(
        &self,
        requirement: Option<&TaskRequirement>,
        input: crate::domain::models::SolveInput,
        route_ctx: Option<&HierarchicalRouteContext>,
    ) -> PlanningDecision<PlannedSteps> {
        let (Some(macro_planner), Some(feedback)) = (&self.macro_planner, &self.feedback) else {
            return PlanningDecision::blocked(
                BlockedReason::PlannerUnconfigured,
                "hierarchical planning requires both a macro planner and a feedback store",
            );
        };
        let Some(route_ctx) = route_ctx else {
            return PlanningDecision::blocked(
                BlockedReason::PlannerUnconfigured,
                "hierarchical planning requires a route context",
            );
        };
        let Some(solver) = self.solvers.get(&SolverRig::Hierarchical) else {
            return PlanningDecision::blocked(
                BlockedReason::PlannerUnconfigured,
                format!("no solver registered for rig {}", SolverRig::Hierarchical.code()),
            );
        };

        // Resolve the goal context before entering the planning phase so an
        // ontology gap never leaves the phase counter raised.
        let goal_context = match &route_ctx.goal_context {
            Some(context) => context.clone(),
            None => {
                let kind = requirement.map_or("", TaskRequirement::kind);
                let planner = macro_planner.lock().expect("macro planner lock poisoned");
                match planner.context_from_requirement(kind) {
                    PlanningDecision::Ok { value } => value,
                    PlanningDecision::Blocked { reason, detail } => {
                        return PlanningDecision::Blocked { reason, detail };
                    }
                    PlanningDecision::Error {
                        reason,
                        detail,
                        cause,
                    } => {
                        return PlanningDecision::Error {
                            reason,
                            detail,
                            cause,
                        };
                    }
                }
            }
        };

        feedback
            .lock()
            .expect("feedback store lock poisoned")
            .enter_planning_phase();

        let macro_plan = {
            let planner = macro_planner.lock().expect("macro planner lock poisoned");
            planner.plan_macro_path(&route_ctx.start_context, &goal_context, &route_ctx.goal_id)
        };
        let macro_plan = match macro_plan {
            PlanningDecision::Ok { value } => value,
            blocked => {
                self.exit_planning(macro_planner, feedback);
                return blocked.map(|_| unreachable!("ok handled above"));
            }
        };

        // The solver runs outside any lock; feedback arriving meanwhile is
        // deferred by the raised planning depth.
        let solved = solver.solve(input).await;
        self.exit_planning(macro_planner, feedback);

        solved.map(|output| PlannedSteps {
            backend: PlanBackend::Sterling {
                rig: SolverRig::Hierarchical,
            },
            steps: steps_from_solver(&output, solver.solver_id()),
            plan_id: Some(output.plan_id),
            macro_plan: Some(macro_plan),
        })
    }

    fn exit_planning(
        &self,
        macro_planner: &Arc<Mutex<MacroPlanner>>,
        feedback: &Arc<Mutex<FeedbackStore>>,
    ) {
        let mut planner = macro_planner.lock().expect("macro planner lock poisoned");
        let updates = feedback
            .lock()
            .expect("feedback store lock poisoned")
            .exit_planning_phase(planner.graph_mut());
        if !updates.is_empty() {
            tracing::debug!(count = updates.len(), "flushed deferred feedback after planning");
        }
    }
}

/// Convert solver output steps into task steps with provenance metadata.
fn steps_from_solver(output: &SolveOutput, solver_id: &str) -> Vec<Step> {
    let mut solver_steps: Vec<_> = output.steps.iter().collect();
    solver_steps.sort_by_key(|s| s.order);

    solver_steps
        .into_iter()
        .map(|step| {
            let bundle = output.solve_meta.as_ref().and_then(|meta| {
                meta.bundles
                    .iter()
                    .find(|b| b.leaf.as_deref() == Some(step.action.as_str()))
            });

            let mut args = step.args.clone();
            if let Some(bundle) = bundle {
                if let Some(leaf) = &bundle.leaf {
                    args.insert("leaf".to_string(), json!(leaf));
                }
                if let Some(produces) = &bundle.produces {
                    args.insert("produces".to_string(), produces.clone());
                }
                if let Some(consumes) = &bundle.consumes {
                    args.insert("consumes".to_string(), consumes.clone());
                }
            }

            Step {
                action: step.action.clone(),
                order: step.order,
                args,
                meta: Some(StepMeta {
                    source: "sterling".to_string(),
                    solver_id: Some(solver_id.to_string()),
                    plan_id: Some(output.plan_id.clone()),
                    bundle_id: bundle.map(|b| b.bundle_id.clone()),
                    executable: true,
                }),
            }
        })
        .collect()
}

/// Lower a requirement to a fixed leaf plan without search or scoring.
fn compiler_lower(requirement: Option<&TaskRequirement>) -> Vec<Step> {
    let step = |action: &str, order: u32, args: BTreeMap<String, serde_json::Value>| Step {
        action: action.to_string(),
        order,
        args,
        meta: Some(StepMeta {
            source: "compiler".to_string(),
            solver_id: None,
            plan_id: None,
            bundle_id: None,
            executable: true,
        }),
    };

    match requirement {
        Some(TaskRequirement::Collect { patterns, quantity })
        | Some(TaskRequirement::Mine { patterns, quantity }) => {
            let mut scan_args = BTreeMap::new();
            scan_args.insert("patterns".to_string(), json!(patterns));
            let mut gather_args = BTreeMap::new();
            gather_args.insert("quantity".to_string(), json!(quantity));
            vec![
                step("scan_for_resource", 0, scan_args),
                step("move_to_target", 1, BTreeMap::new()),
                step("gather_target", 2, gather_args),
            ]
        }
        // Permissive fallback for an unresolved requirement.
        _ => vec![step("reassess_goal", 0, BTreeMap::new())],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{SolveInput, SolveStep};
    use async_trait::async_trait;

    struct FixedSolver {
        id: &'static str,
        output: SolveOutput,
    }

    #[async_trait]
    impl DomainSolver for FixedSolver {
        fn solver_id(&self) -> &str {
            self.id
        }

        async fn solve(&self, _input: SolveInput) -> PlanningDecision<SolveOutput> {
            PlanningDecision::ok(self.output.clone())
        }
    }

    fn craft_requirement() -> TaskRequirement {
        TaskRequirement::Craft {
            output_pattern: "stone_pickaxe".to_string(),
            quantity: 1,
            proxy_patterns: Vec::new(),
        }
    }

    fn collect_requirement() -> TaskRequirement {
        TaskRequirement::Collect {
            patterns: vec!["oak_log".to_string()],
            quantity: 8,
        }
    }

    fn navigate_requirement() -> TaskRequirement {
        TaskRequirement::Navigate {
            destination: "village".to_string(),
            tolerance: 2.0,
            quantity: 1,
        }
    }

    fn sample_output() -> SolveOutput {
        SolveOutput {
            steps: vec![
                SolveStep {
                    action: "craft".to_string(),
                    args: BTreeMap::new(),
                    order: 1,
                },
                SolveStep {
                    action: "gather".to_string(),
                    args: BTreeMap::new(),
                    order: 0,
                },
            ],
            plan_id: "plan-42".to_string(),
            solve_meta: Some(crate::domain::models::SolveMeta {
                bundles: vec![crate::domain::models::SolveBundle {
                    bundle_id: "b0".to_string(),
                    leaf: Some("craft".to_string()),
                    produces: Some(json!({"stone_pickaxe": 1})),
                    consumes: Some(json!({"cobblestone": 3})),
                }],
            }),
            search_health: None,
        }
    }

    #[test]
    fn test_routing_table_strict() {
        assert_eq!(route_action_plan(None, true, false), RouteOutcome::Unplannable);
        assert_eq!(
            route_action_plan(Some(&craft_requirement()), true, false),
            RouteOutcome::Sterling {
                rig: SolverRig::Crafting
            }
        );
        assert_eq!(
            route_action_plan(
                Some(&TaskRequirement::ToolProgression {
                    target_tool: "iron_pickaxe".to_string(),
                    tool_type: "pickaxe".to_string(),
                    target_tier: "iron".to_string(),
                    quantity: 1,
                }),
                true,
                false
            ),
            RouteOutcome::Sterling {
                rig: SolverRig::ToolProgression
            }
        );
        assert_eq!(
            route_action_plan(
                Some(&TaskRequirement::Build {
                    structure: "shelter".to_string(),
                    quantity: 1,
                }),
                true,
                false
            ),
            RouteOutcome::Sterling {
                rig: SolverRig::Building
            }
        );
        assert_eq!(
            route_action_plan(Some(&navigate_requirement()), true, false),
            RouteOutcome::Sterling {
                rig: SolverRig::Hierarchical
            }
        );
        // Collect upgrades to the acquisition rig only when one exists.
        assert_eq!(
            route_action_plan(Some(&collect_requirement()), true, false),
            RouteOutcome::Compiler
        );
        assert_eq!(
            route_action_plan(Some(&collect_requirement()), true, true),
            RouteOutcome::Sterling {
                rig: SolverRig::Acquisition
            }
        );
    }

    #[test]
    fn test_routing_null_requirement_permissive() {
        assert_eq!(route_action_plan(None, false, false), RouteOutcome::Compiler);
    }

    #[tokio::test]
    async fn test_unplannable_outcome_in_strict_mode() {
        let facade = PlannerFacade::new().with_strict(true);
        let planned = facade
            .plan_task_steps(None, SolveInput::default(), None)
            .await
            .into_ok()
            .unwrap();
        assert_eq!(planned.backend, PlanBackend::Unplannable);
        assert!(planned.steps.is_empty());
    }

    #[tokio::test]
    async fn test_compiler_lowering_for_collect() {
        let facade = PlannerFacade::new().with_strict(true);
        let planned = facade
            .plan_task_steps(Some(&collect_requirement()), SolveInput::default(), None)
            .await
            .into_ok()
            .unwrap();

        assert_eq!(planned.backend, PlanBackend::Compiler);
        let actions: Vec<&str> = planned.steps.iter().map(|s| s.action.as_str()).collect();
        assert_eq!(actions, vec!["scan_for_resource", "move_to_target", "gather_target"]);
        for step in &planned.steps {
            let meta = step.meta.as_ref().unwrap();
            assert_eq!(meta.source, "compiler");
            assert!(meta.executable);
        }
    }

    #[tokio::test]
    async fn test_missing_solver_blocks() {
        let facade = PlannerFacade::new().with_strict(true);
        let decision = facade
            .plan_task_steps(Some(&craft_requirement()), SolveInput::default(), None)
            .await;
        assert_eq!(
            decision.blocked_reason(),
            Some(BlockedReason::PlannerUnconfigured)
        );
    }

    #[tokio::test]
    async fn test_sterling_steps_carry_provenance() {
        let mut facade = PlannerFacade::new().with_strict(true);
        facade.register_solver(
            SolverRig::Crafting,
            Arc::new(FixedSolver {
                id: "rig-a",
                output: sample_output(),
            }),
        );

        let planned = facade
            .plan_task_steps(Some(&craft_requirement()), SolveInput::default(), None)
            .await
            .into_ok()
            .unwrap();

        assert_eq!(
            planned.backend,
            PlanBackend::Sterling {
                rig: SolverRig::Crafting
            }
        );
        assert_eq!(planned.plan_id.as_deref(), Some("plan-42"));
        // Steps come out ordered.
        assert_eq!(planned.steps[0].action, "gather");
        assert_eq!(planned.steps[1].action, "craft");

        let craft = &planned.steps[1];
        let meta = craft.meta.as_ref().unwrap();
        assert_eq!(meta.source, "sterling");
        assert_eq!(meta.solver_id.as_deref(), Some("rig-a"));
        assert_eq!(meta.plan_id.as_deref(), Some("plan-42"));
        assert_eq!(meta.bundle_id.as_deref(), Some("b0"));
        // Args derived from {leaf, produces, consumes}.
        assert_eq!(craft.args["leaf"], json!("craft"));
        assert_eq!(craft.args["produces"], json!({"stone_pickaxe": 1}));
        assert_eq!(craft.args["consumes"], json!({"cobblestone": 3}));
    }

    #[tokio::test]
    async fn test_hierarchical_unconfigured_blocks() {
        let mut facade = PlannerFacade::new().with_strict(true);
        facade.register_solver(
            SolverRig::Hierarchical,
            Arc::new(FixedSolver {
                id: "rig-e",
                output: sample_output(),
            }),
        );

        let decision = facade
            .plan_task_steps(
                Some(&navigate_requirement()),
                SolveInput::default(),
                Some(&HierarchicalRouteContext {
                    start_context: "at_base".to_string(),
                    goal_context: Some("has_stone".to_string()),
                    goal_id: "g1".to_string(),
                }),
            )
            .await;
        assert_eq!(
            decision.blocked_reason(),
            Some(BlockedReason::PlannerUnconfigured)
        );
    }

    #[tokio::test]
    async fn test_hierarchical_plan_wraps_macro_provenance() {
        let macro_planner = Arc::new(Mutex::new(MacroPlanner::default_topology()));
        let feedback = Arc::new(Mutex::new(FeedbackStore::new()));
        let mut facade = PlannerFacade::new()
            .with_strict(true)
            .with_hierarchy(Arc::clone(&macro_planner), Arc::clone(&feedback));
        facade.register_solver(
            SolverRig::Hierarchical,
            Arc::new(FixedSolver {
                id: "rig-e",
                output: sample_output(),
            }),
        );

        let planned = facade
            .plan_task_steps(
                Some(&navigate_requirement()),
                SolveInput::default(),
                Some(&HierarchicalRouteContext {
                    start_context: "at_base".to_string(),
                    goal_context: Some("has_stone".to_string()),
                    goal_id: "g1".to_string(),
                }),
            )
            .await
            .into_ok()
            .unwrap();

        let macro_plan = planned.macro_plan.unwrap();
        assert_eq!(macro_plan.edges.len(), 2);
        assert_eq!(macro_plan.goal, "has_stone");
        // The planning phase unwound cleanly.
        assert_eq!(feedback.lock().unwrap().planning_depth(), 0);
        assert!(feedback.lock().unwrap().violations().is_empty());
    }

    #[tokio::test]
    async fn test_hierarchical_blocked_path_unwinds_phase() {
        let macro_planner = Arc::new(Mutex::new(MacroPlanner::default_topology()));
        let feedback = Arc::new(Mutex::new(FeedbackStore::new()));
        let mut facade = PlannerFacade::new()
            .with_strict(true)
            .with_hierarchy(Arc::clone(&macro_planner), Arc::clone(&feedback));
        facade.register_solver(
            SolverRig::Hierarchical,
            Arc::new(FixedSolver {
                id: "rig-e",
                output: sample_output(),
            }),
        );

        let decision = facade
            .plan_task_steps(
                Some(&navigate_requirement()),
                SolveInput::default(),
                Some(&HierarchicalRouteContext {
                    start_context: "at_base".to_string(),
                    goal_context: Some("at_unknown".to_string()),
                    goal_id: "g1".to_string(),
                }),
            )
            .await;

        assert_eq!(decision.blocked_reason(), Some(BlockedReason::UnknownContext));
        assert_eq!(feedback.lock().unwrap().planning_depth(), 0);
    }

    #[tokio::test]
    async fn test_hierarchical_goal_context_from_mapping() {
        let macro_planner = Arc::new(Mutex::new(MacroPlanner::default_topology()));
        let feedback = Arc::new(Mutex::new(FeedbackStore::new()));
        let mut facade = PlannerFacade::new()
            .with_strict(true)
            .with_hierarchy(Arc::clone(&macro_planner), Arc::clone(&feedback));
        facade.register_solver(
            SolverRig::Hierarchical,
            Arc::new(FixedSolver {
                id: "rig-e",
                output: sample_output(),
            }),
        );

        // Find has no mapping in the default topology: ontology gap.
        let decision = facade
            .plan_task_steps(
                Some(&TaskRequirement::Find {
                    target: "village".to_string(),
                    quantity: 1,
                }),
                SolveInput::default(),
                Some(&HierarchicalRouteContext {
                    start_context: "at_base".to_string(),
                    goal_context: None,
                    goal_id: "g1".to_string(),
                }),
            )
            .await;
        assert_eq!(decision.blocked_reason(), Some(BlockedReason::OntologyGap));
        assert_eq!(feedback.lock().unwrap().planning_depth(), 0);
    }
}
