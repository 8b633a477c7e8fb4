//! Session Record (spec §3): one attempt at one feature, or the one-shot
//! initializer. Owned by the Session Logger and referenced elsewhere by id.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::classify::ClassifiedError;
use crate::types::{AgentKind, SessionOutcome};

/// Accumulated token usage for one session, updated on every `usage_update`
/// transcript frame (spec §4.4, §9's "parsing inside the Runtime's
/// streaming path" Open Question resolution).
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct TokenUsage {
    pub input: u64,
    pub output: u64,
    pub cache_read: u64,
    pub cache_write: u64,
}

impl TokenUsage {
    pub fn accumulate(&mut self, other: &TokenUsage) {
        self.input += other.input;
        self.output += other.output;
        self.cache_read += other.cache_read;
        self.cache_write += other.cache_write;
    }

    /// Rough context-window occupancy: cumulative input plus output divided
    /// by the model's context window, compared each turn against the
    /// handoff threshold (spec §4.4).
    pub fn context_fraction(&self, model_window: u64) -> f64 {
        if model_window == 0 {
            return 0.0;
        }
        (self.input + self.output) as f64 / model_window as f64
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SessionRecord {
    pub session_id: u64,
    pub filename: String,
    pub feature_id: Option<String>,
    pub agent_kind: AgentKind,
    pub model: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub outcome: Option<SessionOutcome>,
    pub turns: u32,
    pub usage: TokenUsage,
    pub cost_usd: f64,
    pub files_touched: Vec<String>,
    pub final_commit: Option<String>,
    pub classified_error: Option<ClassifiedError>,
    pub notes: Vec<String>,
}

impl SessionRecord {
    pub fn new(
        session_id: u64,
        filename: impl Into<String>,
        feature_id: Option<String>,
        agent_kind: AgentKind,
        model: impl Into<String>,
    ) -> Self {
        Self {
            session_id,
            filename: filename.into(),
            feature_id,
            agent_kind,
            model: model.into(),
            started_at: Utc::now(),
            ended_at: None,
            outcome: None,
            turns: 0,
            usage: TokenUsage::default(),
            cost_usd: 0.0,
            files_touched: Vec::new(),
            final_commit: None,
            classified_error: None,
            notes: Vec::new(),
        }
    }

    pub fn finalize(
        &mut self,
        outcome: SessionOutcome,
        turns: u32,
        usage: TokenUsage,
        cost_usd: f64,
        files_touched: Vec<String>,
        final_commit: Option<String>,
        classified_error: Option<ClassifiedError>,
    ) {
        self.ended_at = Some(Utc::now());
        self.outcome = Some(outcome);
        self.turns = turns;
        self.usage = usage;
        self.cost_usd = cost_usd;
        self.files_touched = files_touched;
        self.final_commit = final_commit;
        self.classified_error = classified_error;
    }

    pub fn is_finalized(&self) -> bool {
        self.ended_at.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_fraction_divides_by_window() {
        let usage = TokenUsage {
            input: 70_000,
            output: 5_000,
            ..Default::default()
        };
        let fraction = usage.context_fraction(100_000);
        assert!((fraction - 0.75).abs() < 1e-9);
    }

    #[test]
    fn accumulate_sums_all_fields() {
        let mut total = TokenUsage::default();
        total.accumulate(&TokenUsage {
            input: 10,
            output: 5,
            cache_read: 2,
            cache_write: 1,
        });
        total.accumulate(&TokenUsage {
            input: 20,
            output: 0,
            cache_read: 0,
            cache_write: 3,
        });
        assert_eq!(
            total,
            TokenUsage {
                input: 30,
                output: 5,
                cache_read: 2,
                cache_write: 4,
            }
        );
    }
}
