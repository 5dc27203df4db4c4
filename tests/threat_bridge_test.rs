//! Threat bridge integration tests: the fail-closed fetch boundary against a
//! real HTTP server, and the hold/release round trip.

mod common;

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use common::{active_goal_task, frozen_now};
use uuid::Uuid;
use waystone::domain::models::{
    HoldReason, Task, TaskMetadata, TaskStatus, ThreatLevel, ThreatSignal,
};
use waystone::domain::ports::ThreatBridgeDeps;
use waystone::services::{evaluate_threat_holds, fetch_threat_signal, should_hold};

const FETCH_TIMEOUT: Duration = Duration::from_millis(2000);

#[tokio::test]
async fn fetch_parses_well_formed_signal() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("GET", "/threats")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            r#"{
                "overallThreatLevel": "medium",
                "threats": [
                    {"type": "skeleton", "distance": 12.0, "level": "medium"},
                    {"type": "creeper", "distance": 30.0, "level": "low"}
                ]
            }"#,
        )
        .create_async()
        .await;

    let signal = fetch_threat_signal(&format!("{}/threats", server.url()), FETCH_TIMEOUT).await;
    assert_eq!(signal.overall_level, ThreatLevel::Medium);
    assert_eq!(signal.threats.len(), 2);
    assert_eq!(signal.threats[0].kind, "skeleton");
}

#[tokio::test]
async fn fetch_fails_closed_on_http_error() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("GET", "/threats")
        .with_status(500)
        .with_body("internal error")
        .create_async()
        .await;

    let signal = fetch_threat_signal(&format!("{}/threats", server.url()), FETCH_TIMEOUT).await;
    assert_eq!(signal.overall_level, ThreatLevel::Critical);
    assert_eq!(signal.threats[0].kind, "fetch_failure");
}

#[tokio::test]
async fn fetch_fails_closed_on_malformed_body() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("GET", "/threats")
        .with_status(200)
        .with_body("{not valid json")
        .create_async()
        .await;

    let signal = fetch_threat_signal(&format!("{}/threats", server.url()), FETCH_TIMEOUT).await;
    assert_eq!(signal.overall_level, ThreatLevel::Critical);
}

#[tokio::test]
async fn fetch_fails_closed_on_unknown_level() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("GET", "/threats")
        .with_status(200)
        .with_body(r#"{"overallThreatLevel": "apocalyptic", "threats": []}"#)
        .create_async()
        .await;

    let signal = fetch_threat_signal(&format!("{}/threats", server.url()), FETCH_TIMEOUT).await;
    assert_eq!(signal.overall_level, ThreatLevel::Critical);
}

#[tokio::test]
async fn fetch_fails_closed_on_unreachable_endpoint() {
    // Nothing listens here.
    let signal =
        fetch_threat_signal("http://127.0.0.1:1/threats", Duration::from_millis(200)).await;
    assert_eq!(signal.overall_level, ThreatLevel::Critical);
    assert_eq!(signal.threats[0].kind, "fetch_failure");
}

/// Bridge deps backed by an in-memory task list and a canned signal.
struct Harness {
    signal: ThreatSignal,
    tasks: Mutex<Vec<Task>>,
}

impl Harness {
    fn new(signal: ThreatSignal, tasks: Vec<Task>) -> Self {
        Self {
            signal,
            tasks: Mutex::new(tasks),
        }
    }

    fn task(&self, id: Uuid) -> Task {
        self.tasks
            .lock()
            .unwrap()
            .iter()
            .find(|t| t.id == id)
            .cloned()
            .unwrap()
    }

    fn snapshot(&self) -> Vec<Task> {
        self.tasks.lock().unwrap().clone()
    }
}

#[async_trait]
impl ThreatBridgeDeps for Harness {
    async fn fetch_signal(&self) -> ThreatSignal {
        self.signal.clone()
    }

    async fn tasks_to_evaluate(&self) -> Vec<Task> {
        self.snapshot()
    }

    async fn update_task_status(&self, id: Uuid, status: TaskStatus) {
        let mut tasks = self.tasks.lock().unwrap();
        if let Some(task) = tasks.iter_mut().find(|t| t.id == id) {
            task.status = status;
        }
    }

    async fn update_task_metadata(&self, id: Uuid, metadata: TaskMetadata) {
        let mut tasks = self.tasks.lock().unwrap();
        if let Some(task) = tasks.iter_mut().find(|t| t.id == id) {
            task.metadata = metadata;
        }
    }
}

fn signal_at(level: ThreatLevel) -> ThreatSignal {
    ThreatSignal {
        overall_level: level,
        threats: vec![],
        fetched_at: frozen_now(),
    }
}

#[test]
fn should_hold_matches_level_order_for_all_sixteen_pairs() {
    let levels = [
        ThreatLevel::Low,
        ThreatLevel::Medium,
        ThreatLevel::High,
        ThreatLevel::Critical,
    ];
    for signal_level in levels {
        for threshold in levels {
            assert_eq!(
                should_hold(&signal_at(signal_level), threshold),
                signal_level >= threshold,
                "signal={signal_level} threshold={threshold}"
            );
        }
    }
}

#[tokio::test]
async fn hold_then_release_round_trip_restores_prior_status() {
    let task = active_goal_task("build_shelter", Some("g1"));
    let id = task.id;

    // Fail-closed (critical) signal pauses the active task.
    let harness = Harness::new(ThreatSignal::fail_closed(frozen_now()), vec![task]);
    let report = evaluate_threat_holds(&harness, ThreatLevel::High, frozen_now()).await;
    assert!(report.hold_decision);
    assert_eq!(report.tasks_held, vec![id]);

    let held = harness.task(id);
    assert_eq!(held.status, TaskStatus::Paused);
    assert_eq!(held.metadata.threat_hold_prev_status, Some(TaskStatus::Active));
    assert_eq!(
        held.binding().unwrap().hold.as_ref().unwrap().reason,
        HoldReason::Unsafe
    );
    // Mirrors follow the hold.
    assert_eq!(held.metadata.blocked_reason.as_deref(), Some("unsafe"));

    // A calm signal releases exactly that task and restores its status.
    let calm = Harness::new(signal_at(ThreatLevel::Low), harness.snapshot());
    let report = evaluate_threat_holds(&calm, ThreatLevel::High, frozen_now()).await;
    assert!(!report.hold_decision);
    assert_eq!(report.tasks_released, vec![id]);

    let released = calm.task(id);
    assert_eq!(released.status, TaskStatus::Active);
    assert!(released.metadata.threat_hold_prev_status.is_none());
    assert!(released.binding().unwrap().hold.is_none());
    assert!(released.metadata.blocked_reason.is_none());
}

#[tokio::test]
async fn preempted_hold_is_untouched_in_both_directions() {
    let mut task = active_goal_task("build_shelter", Some("g1"));
    let id = task.id;
    waystone::services::request_hold(
        &mut task,
        HoldReason::Preempted,
        waystone::services::HoldOptions::default(),
        frozen_now(),
    );
    task.status = TaskStatus::Paused;

    let harness = Harness::new(signal_at(ThreatLevel::Critical), vec![task.clone()]);
    let report = evaluate_threat_holds(&harness, ThreatLevel::High, frozen_now()).await;
    assert!(report.tasks_held.is_empty());

    let calm = Harness::new(signal_at(ThreatLevel::Low), vec![task]);
    let report = evaluate_threat_holds(&calm, ThreatLevel::High, frozen_now()).await;
    assert!(report.tasks_released.is_empty());
    assert_eq!(
        calm.task(id).binding().unwrap().hold.as_ref().unwrap().reason,
        HoldReason::Preempted
    );
}

#[tokio::test]
async fn bridge_over_live_endpoint_applies_holds() {
    // The whole path: HTTP endpoint → parsed signal → holds applied.
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("GET", "/threats")
        .with_status(200)
        .with_body(
            r#"{
                "overallThreatLevel": "critical",
                "threats": [{"type": "creeper", "distance": 6.0, "level": "critical"}]
            }"#,
        )
        .create_async()
        .await;

    struct LiveDeps {
        endpoint: String,
        inner: Harness,
    }

    #[async_trait]
    impl ThreatBridgeDeps for LiveDeps {
        async fn fetch_signal(&self) -> ThreatSignal {
            fetch_threat_signal(&self.endpoint, FETCH_TIMEOUT).await
        }

        async fn tasks_to_evaluate(&self) -> Vec<Task> {
            self.inner.tasks_to_evaluate().await
        }

        async fn update_task_status(&self, id: Uuid, status: TaskStatus) {
            self.inner.update_task_status(id, status).await;
        }

        async fn update_task_metadata(&self, id: Uuid, metadata: TaskMetadata) {
            self.inner.update_task_metadata(id, metadata).await;
        }
    }

    let task = active_goal_task("build_shelter", Some("g1"));
    let id = task.id;
    let deps = LiveDeps {
        endpoint: format!("{}/threats", server.url()),
        inner: Harness::new(signal_at(ThreatLevel::Low), vec![task]),
    };

    let report = evaluate_threat_holds(&deps, ThreatLevel::High, frozen_now()).await;
    assert!(report.hold_decision);
    assert_eq!(report.tasks_held, vec![id]);

    let held = deps.inner.task(id);
    assert_eq!(held.status, TaskStatus::Paused);
    assert_eq!(
        held.binding().unwrap().hold.as_ref().unwrap().resume_hints,
        vec!["creeper at 6m".to_string()]
    );
}
