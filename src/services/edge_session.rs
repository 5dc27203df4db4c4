//! Macro edge execution sessions.
//!
//! A session tracks one traversal of one macro edge: leaf steps issued,
//! completed, and failed. Finalization is the exactly-once boundary between
//! execution and feedback — a session reports its outcome once, and leaf
//! step completion never finalizes on its own.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::models::{MacroEdge, MacroEdgeSession, MicroOutcome, SessionStatus};
use crate::services::identity::hash_goal_key;

/// Failure tag attached to outcomes of failed sessions.
const MICRO_EXECUTION_FAILED: &str = "micro_execution_failed";

/// Start a session for one edge traversal.
pub fn create_macro_edge_session(
    edge: &MacroEdge,
    leaf_steps_issued: u32,
    now: DateTime<Utc>,
) -> MacroEdgeSession {
    // A nonce keeps repeated traversals of the same edge distinct.
    let nonce = Uuid::new_v4().to_string();
    let session_id = hash_goal_key([
        edge.id.as_str(),
        now.to_rfc3339().as_str(),
        nonce.as_str(),
    ]);

    MacroEdgeSession {
        session_id,
        macro_edge_id: edge.id.clone(),
        started_at: now,
        leaf_steps_issued,
        leaf_steps_completed: 0,
        leaf_steps_failed: 0,
        status: SessionStatus::Running,
        outcome_reported: false,
    }
}

/// Record one completed leaf step.
pub fn record_leaf_completed(session: &mut MacroEdgeSession) {
    session.leaf_steps_completed += 1;
}

/// Record one failed leaf step.
pub fn record_leaf_failed(session: &mut MacroEdgeSession) {
    session.leaf_steps_failed += 1;
}

/// Mark the traversal successful. Does not finalize.
pub fn mark_session_completed(session: &mut MacroEdgeSession) {
    session.status = SessionStatus::Completed;
}

/// Mark the traversal failed. Does not finalize.
pub fn mark_session_failed(session: &mut MacroEdgeSession) {
    session.status = SessionStatus::Failed;
}

/// Produce the session's outcome, exactly once.
///
/// The first call latches `outcome_reported` and returns the outcome; every
/// later call returns `None`.
pub fn finalize_session(session: &mut MacroEdgeSession, now: DateTime<Utc>) -> Option<MicroOutcome> {
    if session.outcome_reported {
        return None;
    }
    session.outcome_reported = true;

    let success = session.status == SessionStatus::Completed;
    Some(MicroOutcome {
        macro_edge_id: session.macro_edge_id.clone(),
        success,
        duration_ms: (now - session.started_at).num_milliseconds(),
        failure_reason: (!success).then(|| MICRO_EXECUTION_FAILED.to_string()),
        leaf_steps_completed: session.leaf_steps_completed,
        leaf_steps_failed: session.leaf_steps_failed,
    })
}
