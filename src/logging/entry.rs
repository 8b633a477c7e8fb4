//! The per-line JSONL event shape written to a session's log file (spec
//! §4.9). Distinct from [`crate::session::transcript::TranscriptEvent`]:
//! the transcript is what the agent emitted, the log event is what the
//! Scheduler and Runtime recorded about the session as a whole.

use serde::{Deserialize, Serialize};

use crate::checkpoint::Checkpoint;
use crate::session::record::TokenUsage;
use crate::types::{AgentKind, SessionOutcome};

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LogEvent {
    SessionStart {
        session_id: u64,
        feature_id: Option<String>,
        agent_kind: AgentKind,
        model: String,
    },
    Prompt {
        content: String,
    },
    Assistant {
        content: String,
    },
    ToolCall {
        name: String,
        input: serde_json::Value,
    },
    ToolResult {
        name: String,
        output: serde_json::Value,
        is_error: bool,
    },
    UsageUpdate {
        usage: TokenUsage,
    },
    Error {
        message: String,
    },
    Checkpoint {
        checkpoint: Checkpoint,
    },
    SessionEnd {
        outcome: SessionOutcome,
        turns: u32,
        usage: TokenUsage,
        cost_usd: f64,
        final_commit: Option<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_start_round_trips() {
        let event = LogEvent::SessionStart {
            session_id: 1,
            feature_id: Some("f1".into()),
            agent_kind: AgentKind::Coding,
            model: "claude".into(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"event\":\"session_start\""));
        let back: LogEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
    }
}
