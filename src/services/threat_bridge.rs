//! Threat→hold bridge.
//!
//! The sole write path for threat-driven holds. A fetched signal at or above
//! the threshold pauses every eligible goal task with an `unsafe` hold; a
//! signal below it releases exactly the holds this bridge applied. Existing
//! holds of any other reason are never touched in either direction.
//!
//! The fetch boundary fails closed: any transport, HTTP, JSON, or schema
//! problem behaves as a critical signal.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::domain::models::{
    HoldReason, LifecycleEvent, LifecycleEventKind, TaskStatus, Threat, ThreatBridgeReport,
    ThreatLevel, ThreatSignal,
};
use crate::domain::ports::ThreatBridgeDeps;
use crate::services::hold_manager::{
    request_clear_hold, request_hold, ClearOutcome, HoldOptions, HoldOutcome,
};

/// Threshold used when the caller does not specify one.
pub const DEFAULT_THREAT_THRESHOLD: ThreatLevel = ThreatLevel::High;

/// Whether a signal warrants holding work.
pub fn should_hold(signal: &ThreatSignal, threshold: ThreatLevel) -> bool {
    signal.overall_level >= threshold
}

/// Wire shape of a threat endpoint response. Every field is optional so that
/// schema drift degrades to fail-closed values instead of a parse error.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawThreatSignal {
    overall_threat_level: Option<String>,
    #[serde(default)]
    threats: Vec<RawThreat>,
}

#[derive(Debug, Deserialize)]
struct RawThreat {
    #[serde(rename = "type")]
    kind: Option<String>,
    distance: Option<f64>,
    level: Option<String>,
}

/// Parse a response body into a signal, failing closed on any problem.
pub fn parse_threat_signal_json(body: &str, now: DateTime<Utc>) -> ThreatSignal {
    let raw: RawThreatSignal = match serde_json::from_str(body) {
        Ok(raw) => raw,
        Err(err) => {
            tracing::warn!(error = %err, "threat signal body unparseable; failing closed");
            return ThreatSignal::fail_closed(now);
        }
    };

    ThreatSignal {
        overall_level: ThreatLevel::parse_fail_closed(raw.overall_threat_level.as_deref()),
        threats: raw
            .threats
            .into_iter()
            .map(|t| Threat {
                kind: t.kind.unwrap_or_else(|| "unknown".to_string()),
                distance: t.distance.unwrap_or(0.0),
                level: ThreatLevel::parse_fail_closed(t.level.as_deref()),
            })
            .collect(),
        fetched_at: now,
    }
}

/// Fetch the current threat signal from an HTTP endpoint.
///
/// Never returns an error: timeouts, non-2xx statuses, and malformed bodies
/// all yield the fail-closed critical signal.
pub async fn fetch_threat_signal(endpoint: &str, timeout: Duration) -> ThreatSignal {
    let now = Utc::now();

    let client = match reqwest::Client::builder().timeout(timeout).build() {
        Ok(client) => client,
        Err(err) => {
            tracing::warn!(error = %err, "threat client build failed; failing closed");
            return ThreatSignal::fail_closed(now);
        }
    };

    let response = match client.get(endpoint).send().await {
        Ok(response) => response,
        Err(err) => {
            tracing::warn!(error = %err, endpoint, "threat fetch failed; failing closed");
            return ThreatSignal::fail_closed(now);
        }
    };

    if !response.status().is_success() {
        tracing::warn!(status = %response.status(), endpoint, "threat endpoint returned non-success; failing closed");
        return ThreatSignal::fail_closed(now);
    }

    match response.text().await {
        Ok(body) => parse_threat_signal_json(&body, now),
        Err(err) => {
            tracing::warn!(error = %err, "threat body read failed; failing closed");
            ThreatSignal::fail_closed(now)
        }
    }
}

/// Evaluate the current threat signal against the task set.
///
/// One fetch per pass; tasks are traversed in id-ascending order. Holds are
/// applied with reason `unsafe` and only `unsafe` holds are ever released.
pub async fn evaluate_threat_holds<D: ThreatBridgeDeps>(
    deps: &D,
    threshold: ThreatLevel,
    now: DateTime<Utc>,
) -> ThreatBridgeReport {
    let signal = deps.fetch_signal().await;
    let mut tasks = deps.tasks_to_evaluate().await;
    tasks.sort_by_key(|t| t.id);

    let hold_decision = should_hold(&signal, threshold);
    let mut tasks_held = Vec::new();
    let mut tasks_released = Vec::new();

    if hold_decision {
        let resume_hints: Vec<String> = signal.threats.iter().map(Threat::resume_hint).collect();

        for task in &mut tasks {
            let Some(binding) = task.binding() else {
                continue;
            };
            if task.status.is_terminal()
                || task.status == TaskStatus::Paused
                || binding.combat_exempt
                || binding.hold.is_some()
            {
                continue;
            }

            // Capture where the task was before the bridge pauses it, then
            // apply the hold, then persist.
            task.metadata.threat_hold_prev_status = Some(task.status);
            let outcome = request_hold(
                task,
                HoldReason::Unsafe,
                HoldOptions {
                    resume_hints: resume_hints.clone(),
                    ..HoldOptions::default()
                },
                now,
            );
            if outcome != HoldOutcome::Applied {
                task.metadata.threat_hold_prev_status = None;
                continue;
            }

            deps.update_task_metadata(task.id, task.metadata.clone()).await;
            deps.update_task_status(task.id, TaskStatus::Paused).await;
            tasks_held.push(task.id);
            deps.emit_lifecycle_event(LifecycleEvent::new(
                LifecycleEventKind::GoalHoldApplied {
                    reason: HoldReason::Unsafe,
                },
                Some(task.id),
                now,
            ))
            .await;
            tracing::info!(task_id = %task.id, level = %signal.overall_level, "task held for threat");
        }
    } else {
        for task in &mut tasks {
            let held_unsafe = task
                .binding()
                .and_then(|b| b.hold.as_ref())
                .is_some_and(|hold| hold.reason == HoldReason::Unsafe);
            if !held_unsafe {
                continue;
            }

            let outcome = request_clear_hold(task, false);
            if !matches!(outcome, ClearOutcome::Cleared { .. }) {
                continue;
            }

            let restored = task
                .metadata
                .threat_hold_prev_status
                .take()
                .unwrap_or(TaskStatus::Active);

            deps.update_task_metadata(task.id, task.metadata.clone()).await;
            deps.update_task_status(task.id, restored).await;
            tasks_released.push(task.id);
            deps.emit_lifecycle_event(LifecycleEvent::new(
                LifecycleEventKind::GoalHoldCleared {
                    reason: HoldReason::Unsafe,
                },
                Some(task.id),
                now,
            ))
            .await;
            tracing::info!(task_id = %task.id, status = %restored, "threat hold released");
        }
    }

    let report = ThreatBridgeReport {
        signal,
        hold_decision,
        tasks_held,
        tasks_released,
        threshold,
    };
    deps.emit_lifecycle_event(LifecycleEvent::new(
        LifecycleEventKind::ThreatBridgeEvaluated {
            report: report.clone(),
        },
        None,
        now,
    ))
    .await;
    deps.emit_bridge_report(report.clone()).await;
    report
}
