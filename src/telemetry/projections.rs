//! Read-only derived views over backlog/session-index state: the dashboard's
//! status summary, cost aggregation, cost projection, and per-feature
//! timeline (spec §6). Every function here only reads already-persisted
//! state; nothing is computed live from an in-flight session.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::Serialize;

use crate::logging::{SessionIndexEntry, SessionIndexEntryStatus};
use crate::scheduler::HarnessContext;
use crate::session::record::TokenUsage;
use crate::session::runtime::model_context_window;
use crate::types::FeatureStatus;

#[derive(Clone, Debug, Default, Serialize)]
pub struct FeatureStatusCounts {
    pub pending: usize,
    pub in_progress: usize,
    pub completed: usize,
    pub blocked: usize,
}

#[derive(Clone, Debug, Serialize)]
pub struct StatusSnapshot {
    pub running: bool,
    pub current_feature_id: Option<String>,
    pub current_session_id: Option<u64>,
    pub context_usage_pct: Option<f64>,
    pub counts: FeatureStatusCounts,
    pub total_cost_usd: f64,
}

/// Tally feature statuses for the dashboard's backlog/status summaries.
/// Shared between [`build_status`] and the telemetry API's `/api/backlog`.
pub fn status_counts(backlog: &crate::backlog::Backlog) -> FeatureStatusCounts {
    let mut counts = FeatureStatusCounts::default();
    for feature in &backlog.features {
        match feature.status {
            FeatureStatus::Pending => counts.pending += 1,
            FeatureStatus::InProgress => counts.in_progress += 1,
            FeatureStatus::Completed => counts.completed += 1,
            FeatureStatus::Blocked => counts.blocked += 1,
        }
    }
    counts
}

/// The status view is strictly a projection over the backlog, the session
/// index, and the running flag the binary entrypoint flips around the
/// scheduler's lifetime — it holds no state of its own.
pub async fn build_status(ctx: &HarnessContext, running: bool) -> StatusSnapshot {
    let backlog = ctx.backlog.snapshot().await;
    let counts = status_counts(&backlog);

    let entries = ctx.session_logger.list().await;
    let active = entries
        .iter()
        .filter(|e| e.ended_at.is_none())
        .max_by_key(|e| e.started_at);

    let mut current_feature_id = None;
    let mut current_session_id = None;
    let mut context_usage_pct = None;

    if let Some(entry) = active {
        current_feature_id = entry.feature_id.clone();
        current_session_id = Some(entry.session_id);
        context_usage_pct = latest_context_fraction(ctx, entry).await;
    }

    StatusSnapshot {
        running,
        current_feature_id,
        current_session_id,
        context_usage_pct,
        counts,
        total_cost_usd: ctx.total_cost_usd().await,
    }
}

/// Replay the active session's JSONL tail far enough to find its most
/// recent `usage_update` frame and convert it to a context-window fraction.
/// A session with no usage frames yet (just started) reports `None` rather
/// than a misleading zero.
async fn latest_context_fraction(ctx: &HarnessContext, entry: &SessionIndexEntry) -> Option<f64> {
    use crate::logging::LogEvent;

    let events = ctx.session_logger.load(entry.session_id).await.ok()?;
    let usage = events.iter().rev().find_map(|e| match e {
        LogEvent::UsageUpdate { usage } => Some(*usage),
        _ => None,
    })?;
    Some(usage.context_fraction(model_context_window(&entry.model)))
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

#[derive(Clone, Debug, Serialize)]
pub struct Projection {
    pub completed_sample_size: usize,
    pub remaining_features: usize,
    pub avg_cost_per_feature: f64,
    pub projected_remaining_low: f64,
    pub projected_remaining_mid: f64,
    pub projected_remaining_high: f64,
    pub daily_burn_rate_usd: f64,
    pub confidence: Confidence,
}

/// Forecast remaining spend from the average cost of completed features so
/// far, spread into a low/mid/high band rather than a single point estimate
/// (spec §6's cost projection). Confidence widens with smaller samples: a
/// band built from one or two completed features is not as trustworthy as
/// one built from a dozen.
pub async fn build_projection(ctx: &HarnessContext) -> Projection {
    let backlog = ctx.backlog.snapshot().await;
    let remaining_features = backlog
        .features
        .iter()
        .filter(|f| matches!(f.status, FeatureStatus::Pending | FeatureStatus::InProgress))
        .count();

    let entries = ctx.session_logger.list().await;
    let completed_feature_ids: std::collections::HashSet<&str> = backlog
        .features
        .iter()
        .filter(|f| f.status == FeatureStatus::Completed)
        .map(|f| f.id.as_str())
        .collect();

    let mut cost_by_feature: std::collections::HashMap<&str, f64> = std::collections::HashMap::new();
    for entry in &entries {
        if let Some(feature_id) = entry.feature_id.as_deref() {
            if completed_feature_ids.contains(feature_id) {
                *cost_by_feature.entry(feature_id).or_insert(0.0) += entry.cost_usd;
            }
        }
    }

    let completed_sample_size = cost_by_feature.len();
    let avg_cost_per_feature = if completed_sample_size == 0 {
        0.0
    } else {
        cost_by_feature.values().sum::<f64>() / completed_sample_size as f64
    };

    let (low_mult, high_mult) = match completed_sample_size {
        0 => (1.0, 1.0),
        1..=2 => (0.5, 2.0),
        3..=7 => (0.75, 1.5),
        _ => (0.85, 1.2),
    };

    let confidence = match completed_sample_size {
        0..=2 => Confidence::Low,
        3..=7 => Confidence::Medium,
        _ => Confidence::High,
    };

    let now = Utc::now();
    let one_day_ago = now - ChronoDuration::hours(24);
    let daily_burn_rate_usd: f64 = entries
        .iter()
        .filter(|e| e.started_at >= one_day_ago)
        .map(|e| e.cost_usd)
        .sum();

    Projection {
        completed_sample_size,
        remaining_features,
        avg_cost_per_feature,
        projected_remaining_low: avg_cost_per_feature * low_mult * remaining_features as f64,
        projected_remaining_mid: avg_cost_per_feature * remaining_features as f64,
        projected_remaining_high: avg_cost_per_feature * high_mult * remaining_features as f64,
        daily_burn_rate_usd,
        confidence,
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct ModelCost {
    pub model: String,
    pub cost_usd: f64,
    pub usage: TokenUsage,
    pub sessions: usize,
}

#[derive(Clone, Debug, Serialize)]
pub struct CostBreakdown {
    pub since: Option<DateTime<Utc>>,
    pub sessions_included: usize,
    pub total_cost_usd: f64,
    pub total_usage: TokenUsage,
    pub per_model: Vec<ModelCost>,
}

/// Aggregate session cost/usage by model, optionally limited to sessions
/// started within the last `days` days (spec §6's `/api/sessions/costs`).
/// Archived sessions are included: their index entry survives rotation even
/// after the JSONL file itself moves into the archive.
pub async fn build_cost_breakdown(ctx: &HarnessContext, days: Option<i64>) -> CostBreakdown {
    let since = days.map(|d| Utc::now() - ChronoDuration::days(d));
    let entries: Vec<SessionIndexEntry> = ctx
        .session_logger
        .list()
        .await
        .into_iter()
        .filter(|e| since.map(|since| e.started_at >= since).unwrap_or(true))
        .collect();

    let mut by_model: std::collections::BTreeMap<String, ModelCost> = std::collections::BTreeMap::new();
    let mut total_cost_usd = 0.0;
    let mut total_usage = TokenUsage::default();

    for entry in &entries {
        total_cost_usd += entry.cost_usd;
        total_usage.accumulate(&entry.usage);

        let model_cost = by_model.entry(entry.model.clone()).or_insert_with(|| ModelCost {
            model: entry.model.clone(),
            cost_usd: 0.0,
            usage: TokenUsage::default(),
            sessions: 0,
        });
        model_cost.cost_usd += entry.cost_usd;
        model_cost.usage.accumulate(&entry.usage);
        model_cost.sessions += 1;
    }

    CostBreakdown {
        since,
        sessions_included: entries.len(),
        total_cost_usd,
        total_usage,
        per_model: by_model.into_values().collect(),
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct TimelineSegment {
    pub session_id: u64,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub outcome: Option<String>,
    pub cost_usd: f64,
    pub archived: bool,
}

#[derive(Clone, Debug, Serialize)]
pub struct TimelineEntry {
    pub feature_id: Option<String>,
    pub feature_name: Option<String>,
    pub status: Option<FeatureStatus>,
    pub segments: Vec<TimelineSegment>,
}

/// Group every logged session by the feature it ran against, in backlog
/// order, for the dashboard's per-feature history view (spec §6's
/// `/api/timeline`). Sessions with no feature (the initializer) are dropped
/// into their own entry under `feature_id: None`.
pub async fn build_timeline(ctx: &HarnessContext) -> Vec<TimelineEntry> {
    let backlog = ctx.backlog.snapshot().await;
    let entries = ctx.session_logger.list().await;

    let mut by_feature: std::collections::HashMap<Option<String>, Vec<TimelineSegment>> =
        std::collections::HashMap::new();
    for entry in entries {
        let segment = TimelineSegment {
            session_id: entry.session_id,
            started_at: entry.started_at,
            ended_at: entry.ended_at,
            outcome: entry.outcome.map(|o| o.to_string()),
            cost_usd: entry.cost_usd,
            archived: entry.status == SessionIndexEntryStatus::Archived,
        };
        by_feature.entry(entry.feature_id).or_default().push(segment);
    }

    let mut out = Vec::new();
    for feature in &backlog.features {
        let mut segments = by_feature.remove(&Some(feature.id.clone())).unwrap_or_default();
        segments.sort_by_key(|s| s.started_at);
        out.push(TimelineEntry {
            feature_id: Some(feature.id.clone()),
            feature_name: Some(feature.name.clone()),
            status: Some(feature.status),
            segments,
        });
    }
    if let Some(mut segments) = by_feature.remove(&None) {
        segments.sort_by_key(|s| s.started_at);
        out.push(TimelineEntry {
            feature_id: None,
            feature_name: None,
            status: None,
            segments,
        });
    }
    out
}
