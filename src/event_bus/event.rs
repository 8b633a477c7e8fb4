use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Scope label published on the bus right before a subscriber's stream should
/// be torn down (used by the SSE push handler to know when to stop).
pub const STREAM_END_SCOPE: &str = "__ada_harness_stream_end__";

/// A state-change notification published by the harness onto the internal
/// [`EventBus`](super::bus::EventBus) and mirrored, verbatim, onto the push
/// channel described in spec §6.
///
/// Event names mirror the dotted names in the HTTP surface spec
/// (`status.updated`, `backlog.updated`, ...) so the wire envelope's `event`
/// field can be derived directly from [`HarnessEvent::name`].
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind")]
pub enum HarnessEvent {
    StatusUpdated,
    BacklogUpdated,
    FeatureUpdated {
        feature_id: String,
    },
    SessionStarted {
        session_id: u64,
        feature_id: Option<String>,
        agent_kind: String,
    },
    SessionEnded {
        session_id: u64,
        feature_id: Option<String>,
        outcome: String,
    },
    CostUpdate {
        session_id: u64,
        cost_usd: f64,
        total_cost_usd: f64,
    },
    ProgressUpdate {
        session_id: u64,
        body: String,
    },
    AlertCreated {
        alert_id: Uuid,
        severity: String,
        title: String,
    },
    /// Internal-only: emitted once at shutdown so SSE subscribers unwind.
    StreamEnd,
}

impl HarnessEvent {
    pub fn name(&self) -> &'static str {
        match self {
            HarnessEvent::StatusUpdated => "status.updated",
            HarnessEvent::BacklogUpdated => "backlog.updated",
            HarnessEvent::FeatureUpdated { .. } => "feature.updated",
            HarnessEvent::SessionStarted { .. } => "session.started",
            HarnessEvent::SessionEnded { .. } => "session.ended",
            HarnessEvent::CostUpdate { .. } => "cost.update",
            HarnessEvent::ProgressUpdate { .. } => "progress.update",
            HarnessEvent::AlertCreated { .. } => "alert.created",
            HarnessEvent::StreamEnd => STREAM_END_SCOPE,
        }
    }

    /// Render this event as the push-channel envelope `{event, data, timestamp}`,
    /// stamped with a monotonically increasing `sequence` so a reconnecting
    /// dashboard client can detect gaps left by the bus's oldest-drop overflow.
    pub fn to_envelope(&self, sequence: u64, at: DateTime<Utc>) -> Value {
        serde_json::json!({
            "event": self.name(),
            "sequence": sequence,
            "data": self,
            "timestamp": at.to_rfc3339(),
        })
    }
}

impl fmt::Display for HarnessEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HarnessEvent::StatusUpdated => write!(f, "status updated"),
            HarnessEvent::BacklogUpdated => write!(f, "backlog updated"),
            HarnessEvent::FeatureUpdated { feature_id } => {
                write!(f, "feature {feature_id} updated")
            }
            HarnessEvent::SessionStarted {
                session_id,
                feature_id,
                agent_kind,
            } => write!(
                f,
                "session {session_id} ({agent_kind}) started for {}",
                feature_id.as_deref().unwrap_or("<none>")
            ),
            HarnessEvent::SessionEnded {
                session_id,
                outcome,
                ..
            } => write!(f, "session {session_id} ended: {outcome}"),
            HarnessEvent::CostUpdate {
                session_id,
                cost_usd,
                ..
            } => write!(f, "session {session_id} cost ${cost_usd:.4}"),
            HarnessEvent::ProgressUpdate { session_id, body } => {
                write!(f, "[session {session_id}] {body}")
            }
            HarnessEvent::AlertCreated { title, .. } => write!(f, "alert: {title}"),
            HarnessEvent::StreamEnd => write!(f, "<stream end>"),
        }
    }
}
