//! Error Classifier (C5): maps a raw agent/tool failure onto the fixed
//! taxonomy of spec.md §4.5 so the scheduler can decide whether to retry,
//! how long to wait, and whether to raise an alert.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The fixed taxonomy a [`RawFailure`] is classified into. Ordering here is
/// not meaningful; the set is closed and every variant is exhaustively
/// matched wherever retry/alert policy branches on it.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Transient,
    RateLimit,
    AgentCrash,
    Timeout,
    Billing,
    Auth,
    Tooling,
    Unknown,
}

impl Category {
    /// Whether the scheduler should ever retry a failure in this category.
    pub fn is_retryable(self) -> bool {
        !matches!(self, Category::Billing | Category::Auth)
    }

    /// Whether this category retries at most once regardless of `maxRetries`
    /// (tooling and unknown failures rarely resolve themselves by spinning).
    pub fn retry_once_only(self) -> bool {
        matches!(self, Category::Tooling | Category::Unknown)
    }

    /// Whether a failure in this category should use the longer rate-limit
    /// base delay instead of the default base delay.
    pub fn uses_rate_limit_backoff(self) -> bool {
        matches!(self, Category::RateLimit)
    }

    /// Whether a failure in this category is a fatal-stop condition: the
    /// scheduler should exit nonzero rather than continue to other features.
    pub fn is_fatal_stop(self) -> bool {
        matches!(self, Category::Billing | Category::Auth)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Category::Transient => "transient",
            Category::RateLimit => "rate_limit",
            Category::AgentCrash => "agent_crash",
            Category::Timeout => "timeout",
            Category::Billing => "billing",
            Category::Auth => "auth",
            Category::Tooling => "tooling",
            Category::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// The raw evidence a failed session hands to [`classify`]. `exit_code` is
/// `None` when the agent transport never produced a process exit (e.g. a
/// streaming-API transport that failed before spawning anything).
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct RawFailure {
    pub exit_code: Option<i32>,
    pub stderr_tail: String,
    pub stdout_tail: String,
    /// True when the runtime itself raised the failure (e.g. a stall
    /// watchdog) rather than the subprocess/transport.
    pub runtime_raised_timeout: bool,
    /// True when the session ended without a completion signal from the
    /// agent (spec §4.3's "no completion signal" condition).
    pub missing_completion_signal: bool,
}

/// The result of classifying a [`RawFailure`]: a category, whether it is
/// retryable, and a short human-readable explanation suitable for session
/// notes and alerts.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Classification {
    pub category: Category,
    pub retryable: bool,
    pub human_message: String,
}

/// Map a raw failure onto the fixed taxonomy. Pure function, no I/O; the
/// scheduler is the only caller and feeds it evidence gathered from the
/// session runtime.
///
/// Signal precedence mirrors spec.md §4.5's example-signal column, checked
/// in order from most to least specific so that, e.g., a 429 embedded in
/// stderr alongside a generic 5xx classifies as `rate_limit` rather than
/// `transient`.
pub fn classify(failure: &RawFailure) -> Classification {
    let haystack = format!("{} {}", failure.stderr_tail, failure.stdout_tail).to_lowercase();

    let category = if contains_any(&haystack, BILLING_SIGNALS) {
        Category::Billing
    } else if contains_any(&haystack, AUTH_SIGNALS) {
        Category::Auth
    } else if failure.runtime_raised_timeout || contains_any(&haystack, TIMEOUT_SIGNALS) {
        Category::Timeout
    } else if contains_any(&haystack, RATE_LIMIT_SIGNALS) {
        Category::RateLimit
    } else if contains_any(&haystack, TOOLING_SIGNALS) {
        Category::Tooling
    } else if contains_any(&haystack, TRANSIENT_SIGNALS) {
        Category::Transient
    } else if failure.missing_completion_signal
        || failure.exit_code.map(is_crash_exit_code).unwrap_or(false)
    {
        Category::AgentCrash
    } else {
        Category::Unknown
    };

    Classification {
        category,
        retryable: category.is_retryable(),
        human_message: human_message(category, failure),
    }
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| haystack.contains(n))
}

/// Nonzero exits commonly associated with a crashed process rather than a
/// clean application-level failure: SIGSEGV (139), SIGABRT (134), SIGKILL
/// (137, usually OOM), and a generic nonzero catch-all.
fn is_crash_exit_code(code: i32) -> bool {
    matches!(code, 134 | 137 | 139) || code != 0
}

const BILLING_SIGNALS: &[&str] = &[
    "insufficient credit",
    "insufficient_quota",
    "payment required",
    "billing",
    "card was declined",
];

const AUTH_SIGNALS: &[&str] = &[
    "invalid api key",
    "invalid_api_key",
    "unauthorized",
    "authentication failed",
    "401",
    "403",
];

const TIMEOUT_SIGNALS: &[&str] = &["timed out", "timeout", "deadline exceeded", "stalled"];

const RATE_LIMIT_SIGNALS: &[&str] = &["429", "rate limit", "rate_limit_error", "too many requests"];

const TOOLING_SIGNALS: &[&str] = &[
    "command not found",
    "no such file or directory",
    "not found on path",
];

const TRANSIENT_SIGNALS: &[&str] = &[
    "connection reset",
    "econnreset",
    "dns",
    "502",
    "503",
    "504",
    "temporary failure",
];

fn human_message(category: Category, failure: &RawFailure) -> String {
    let tail = failure
        .stderr_tail
        .lines()
        .last()
        .filter(|l| !l.is_empty())
        .or_else(|| failure.stdout_tail.lines().last())
        .unwrap_or("<no output captured>");
    match category {
        Category::Billing => format!("billing failure: {tail}"),
        Category::Auth => format!("authentication failure: {tail}"),
        Category::Timeout => format!("session timed out or stalled: {tail}"),
        Category::RateLimit => format!("rate limited: {tail}"),
        Category::Tooling => format!("required tool missing: {tail}"),
        Category::Transient => format!("transient error: {tail}"),
        Category::AgentCrash => format!(
            "agent crashed (exit {}): {tail}",
            failure
                .exit_code
                .map(|c| c.to_string())
                .unwrap_or_else(|| "none".into())
        ),
        Category::Unknown => format!("unclassified failure: {tail}"),
    }
}

/// A classification event recorded against a session, stamped with a
/// timestamp and free-form context for the session log and alert store.
/// Mirrors the scope/cause/tags shape of a structured error record, but
/// flattened to this harness's own closed taxonomy rather than a free-form
/// scope label.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ClassifiedError {
    pub classification: Classification,
    pub when: DateTime<Utc>,
    pub tags: Vec<String>,
    pub context: serde_json::Value,
}

impl ClassifiedError {
    pub fn new(classification: Classification, context: serde_json::Value) -> Self {
        Self {
            classification,
            when: Utc::now(),
            tags: Vec::new(),
            context,
        }
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    /// Render a multi-line human-readable summary for stdout/log sinks.
    pub fn pretty_print(&self) -> String {
        let mut out = format!(
            "[{}] {} ({})",
            self.when.to_rfc3339(),
            self.classification.human_message,
            self.classification.category
        );
        if !self.tags.is_empty() {
            out.push_str(&format!(" tags={:?}", self.tags));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failure(stderr: &str) -> RawFailure {
        RawFailure {
            exit_code: Some(1),
            stderr_tail: stderr.to_string(),
            stdout_tail: String::new(),
            runtime_raised_timeout: false,
            missing_completion_signal: false,
        }
    }

    #[test]
    fn classifies_rate_limit_before_transient() {
        let c = classify(&failure("received 429 too many requests, then a 503 upstream"));
        assert_eq!(c.category, Category::RateLimit);
        assert!(c.retryable);
    }

    #[test]
    fn classifies_billing_as_non_retryable() {
        let c = classify(&failure("error: insufficient credit balance"));
        assert_eq!(c.category, Category::Billing);
        assert!(!c.retryable);
    }

    #[test]
    fn classifies_auth_as_non_retryable() {
        let c = classify(&failure("401 unauthorized: invalid api key"));
        assert_eq!(c.category, Category::Auth);
        assert!(!c.retryable);
    }

    #[test]
    fn classifies_tooling_missing_binary() {
        let c = classify(&failure("bash: rg: command not found"));
        assert_eq!(c.category, Category::Tooling);
        assert!(c.retryable);
        assert!(c.category.retry_once_only());
    }

    #[test]
    fn classifies_runtime_timeout_flag() {
        let mut f = failure("");
        f.runtime_raised_timeout = true;
        let c = classify(&f);
        assert_eq!(c.category, Category::Timeout);
    }

    #[test]
    fn classifies_missing_completion_signal_as_agent_crash() {
        let mut f = failure("process exited unexpectedly");
        f.missing_completion_signal = true;
        f.exit_code = None;
        let c = classify(&f);
        assert_eq!(c.category, Category::AgentCrash);
    }

    #[test]
    fn classifies_unrecognized_output_as_unknown() {
        let mut f = failure("something weird happened");
        f.exit_code = Some(0);
        let c = classify(&f);
        assert_eq!(c.category, Category::Unknown);
        assert!(c.category.retry_once_only());
    }

    #[test]
    fn fatal_stop_categories_are_billing_and_auth_only() {
        assert!(Category::Billing.is_fatal_stop());
        assert!(Category::Auth.is_fatal_stop());
        assert!(!Category::Transient.is_fatal_stop());
        assert!(!Category::Tooling.is_fatal_stop());
    }
}
