//! Small closed-enum domain types shared across components (spec §3, §9's
//! redesign note to make these narrow tagged unions rather than strings).

use serde::{Deserialize, Serialize};

/// Which kind of agent a session ran. The initializer is the one-shot
/// bootstrap session that seeds or migrates the backlog; every other
/// session runs against a specific feature.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AgentKind {
    Initializer,
    Coding,
}

impl std::fmt::Display for AgentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AgentKind::Initializer => write!(f, "initializer"),
            AgentKind::Coding => write!(f, "coding"),
        }
    }
}

/// Terminal outcome of one session (spec §3's Session Record attributes).
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SessionOutcome {
    Success,
    Handoff,
    Failure,
    Timeout,
    Interrupted,
    Crashed,
}

impl SessionOutcome {
    /// Whether this outcome represents forward progress that the handoff
    /// protocol should carry into the next attempt.
    pub fn is_handoff(self) -> bool {
        matches!(self, SessionOutcome::Handoff)
    }

    pub fn is_terminal_success(self) -> bool {
        matches!(self, SessionOutcome::Success)
    }
}

impl std::fmt::Display for SessionOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SessionOutcome::Success => "success",
            SessionOutcome::Handoff => "handoff",
            SessionOutcome::Failure => "failure",
            SessionOutcome::Timeout => "timeout",
            SessionOutcome::Interrupted => "interrupted",
            SessionOutcome::Crashed => "crashed",
        };
        f.write_str(s)
    }
}

/// Feature category (spec §3).
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum FeatureCategory {
    Functional,
    Infrastructure,
    Testing,
    Documentation,
    Bugfix,
    Refactor,
}

impl std::fmt::Display for FeatureCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            FeatureCategory::Functional => "functional",
            FeatureCategory::Infrastructure => "infrastructure",
            FeatureCategory::Testing => "testing",
            FeatureCategory::Documentation => "documentation",
            FeatureCategory::Bugfix => "bugfix",
            FeatureCategory::Refactor => "refactor",
        };
        f.write_str(s)
    }
}

/// Feature lifecycle status (spec §3). `Completed` must never regress: the
/// backlog store rejects any write that would move a completed feature
/// back to an earlier status.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum FeatureStatus {
    Pending,
    InProgress,
    Completed,
    Blocked,
}

impl std::fmt::Display for FeatureStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            FeatureStatus::Pending => "pending",
            FeatureStatus::InProgress => "in_progress",
            FeatureStatus::Completed => "completed",
            FeatureStatus::Blocked => "blocked",
        };
        f.write_str(s)
    }
}

/// Alert severity (spec §3, §7's alert-template mapping).
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AlertSeverity {
    Info,
    Warning,
    Error,
    Success,
}

impl std::fmt::Display for AlertSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AlertSeverity::Info => "info",
            AlertSeverity::Warning => "warning",
            AlertSeverity::Error => "error",
            AlertSeverity::Success => "success",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_snake_case() {
        let v = serde_json::to_string(&FeatureStatus::InProgress).unwrap();
        assert_eq!(v, "\"in_progress\"");
        let v = serde_json::to_string(&SessionOutcome::Handoff).unwrap();
        assert_eq!(v, "\"handoff\"");
    }
}
