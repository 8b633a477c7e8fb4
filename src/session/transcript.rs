//! Transcript frames the agent transport forwards from the underlying
//! coding agent: `message`, `tool_call`, `tool_result`, `usage_update`,
//! `completion_signal`, `error` (spec §4.4). Parsed once at ingress into
//! this tagged union; logged and reasoned about by variant thereafter,
//! never as a loose string-keyed dictionary (spec §9).

use serde::{Deserialize, Serialize};

use super::record::TokenUsage;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TranscriptEvent {
    Message {
        role: String,
        content: String,
    },
    ToolCall {
        name: String,
        input: serde_json::Value,
    },
    ToolResult {
        name: String,
        output: serde_json::Value,
        #[serde(default)]
        is_error: bool,
    },
    UsageUpdate {
        usage: TokenUsage,
    },
    /// The agent's explicit self-report that it considers the feature
    /// done, optionally naming which acceptance criteria it believes it
    /// satisfied (spec §9's completion-signal Open Question: decided as
    /// agent self-report, cross-checked against acceptance markers rather
    /// than inferred from the transcript alone).
    CompletionSignal {
        #[serde(default)]
        criteria_met: Vec<String>,
    },
    Error {
        message: String,
    },
}

impl TranscriptEvent {
    /// Whether this frame counts as one assistant turn for the turn
    /// counter (spec §4.4: "incremented per assistant message").
    pub fn is_assistant_turn(&self) -> bool {
        matches!(self, TranscriptEvent::Message { role, .. } if role == "assistant")
    }
}

/// Sink transcript events are forwarded into; both agent transports and the
/// runtime's internal dispatch loop speak this channel type.
pub type TranscriptSink = tokio::sync::mpsc::Sender<TranscriptEvent>;
