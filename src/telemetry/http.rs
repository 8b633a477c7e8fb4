//! Telemetry API (C12): the read-only HTTP surface plus the push-event
//! channel described in spec §6. Strictly a view over the other
//! components' persisted state and the Event Bus — it never mutates the
//! backlog except through the Alert Store's read/dismiss operations.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use axum::extract::{Path as AxumPath, Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event as SseEvent, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use futures_util::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::alerts::AlertStoreError;
use crate::backlog::BacklogError;
use crate::event_bus::STREAM_END_SCOPE;
use crate::logging::LoggerError;
use crate::progress_log::ProgressLogError;
use crate::scheduler::HarnessContext;

use super::projections::{build_cost_breakdown, build_projection, build_status, build_timeline, status_counts};

/// Error shape mapped onto an HTTP status for every handler below. Every
/// component error the telemetry layer can encounter reduces to either a
/// 404 (caller asked about something that doesn't exist) or a 500
/// (something about the persisted state itself is broken); nothing a
/// read-only API does ever warrants a 4xx beyond that.
pub enum ApiError {
    NotFound(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

impl From<BacklogError> for ApiError {
    fn from(e: BacklogError) -> Self {
        match e {
            BacklogError::UnknownFeature(id) => ApiError::NotFound(format!("unknown feature: {id}")),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<AlertStoreError> for ApiError {
    fn from(e: AlertStoreError) -> Self {
        ApiError::Internal(e.to_string())
    }
}

impl From<LoggerError> for ApiError {
    fn from(e: LoggerError) -> Self {
        match e {
            LoggerError::NotFound(id) => ApiError::NotFound(format!("unknown session: {id}")),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<ProgressLogError> for ApiError {
    fn from(e: ProgressLogError) -> Self {
        ApiError::Internal(e.to_string())
    }
}

/// Shared state behind every handler: the harness's live context plus a
/// flag the binary entrypoint flips around the scheduler's lifetime (the
/// context itself outlives any one scheduler run, but whether the loop is
/// currently driving a session is not state any other component owns).
#[derive(Clone)]
pub struct TelemetryState {
    ctx: Arc<HarnessContext>,
    running: Arc<AtomicBool>,
}

impl TelemetryState {
    pub fn new(ctx: Arc<HarnessContext>, running: Arc<AtomicBool>) -> Self {
        Self { ctx, running }
    }
}

/// Build the telemetry router, wired with request tracing and permissive
/// CORS so a locally-served dashboard can read it without a proxy.
pub fn router(state: TelemetryState) -> Router {
    Router::new()
        .route("/api/status", get(get_status))
        .route("/api/backlog", get(get_backlog))
        .route("/api/backlog/:id", get(get_backlog_feature))
        .route("/api/sessions", get(get_sessions))
        .route("/api/sessions/costs", get(get_sessions_costs))
        .route("/api/sessions/:id", get(get_session))
        .route("/api/progress", get(get_progress))
        .route("/api/progress/full", get(get_progress_full))
        .route("/api/projections", get(get_projections))
        .route("/api/timeline", get(get_timeline))
        .route("/api/alerts", get(get_alerts))
        .route("/api/alerts/unread/count", get(get_alerts_unread_count))
        .route("/api/alerts/:id/read", post(post_alert_read))
        .route("/api/alerts/read-all", post(post_alerts_read_all))
        .route("/api/alerts/:id/dismiss", post(post_alert_dismiss))
        .route("/ws/events", get(ws_events))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind and serve the telemetry router until `shutdown` is signalled,
/// mirroring the scheduler's own cooperative cancellation (spec §5).
pub async fn serve(state: TelemetryState, bind_addr: &str, mut shutdown: watch::Receiver<bool>) -> std::io::Result<()> {
    let addr: SocketAddr = bind_addr
        .parse()
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, format!("invalid bind address: {e}")))?;
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(target: "ada_harness::telemetry", %addr, "serving telemetry API");
    let router = router(state);
    axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(async move {
            let _ = shutdown.wait_for(|v| *v).await;
        })
        .await
}

async fn get_status(State(state): State<TelemetryState>) -> Json<serde_json::Value> {
    let snapshot = build_status(&state.ctx, state.running.load(Ordering::SeqCst)).await;
    Json(serde_json::to_value(snapshot).expect("StatusSnapshot always serializes"))
}

#[derive(Serialize)]
struct BacklogResponse {
    #[serde(flatten)]
    backlog: crate::backlog::Backlog,
    counts: super::projections::FeatureStatusCounts,
}

async fn get_backlog(State(state): State<TelemetryState>) -> Json<BacklogResponse> {
    let backlog = state.ctx.backlog.snapshot().await;
    let counts = status_counts(&backlog);
    Json(BacklogResponse { backlog, counts })
}

async fn get_backlog_feature(
    State(state): State<TelemetryState>,
    AxumPath(id): AxumPath<String>,
) -> Result<Json<crate::backlog::Feature>, ApiError> {
    Ok(Json(state.ctx.backlog.feature(&id).await?))
}

#[derive(Deserialize)]
struct SessionsQuery {
    page: Option<usize>,
    page_size: Option<usize>,
    feature_id: Option<String>,
    outcome: Option<String>,
}

#[derive(Serialize)]
struct PagedSessions {
    sessions: Vec<crate::logging::SessionIndexEntry>,
    page: usize,
    page_size: usize,
    total: usize,
}

async fn get_sessions(State(state): State<TelemetryState>, Query(q): Query<SessionsQuery>) -> Json<PagedSessions> {
    let page = q.page.unwrap_or(1).max(1);
    let page_size = q.page_size.unwrap_or(50).max(1);

    let mut entries = state.ctx.session_logger.list().await;
    entries.sort_by(|a, b| b.started_at.cmp(&a.started_at));

    if let Some(feature_id) = &q.feature_id {
        entries.retain(|e| e.feature_id.as_deref() == Some(feature_id.as_str()));
    }
    if let Some(outcome) = &q.outcome {
        entries.retain(|e| e.outcome.map(|o| o.to_string()) == Some(outcome.to_lowercase()));
    }

    let total = entries.len();
    let start = (page - 1) * page_size;
    let page_entries = entries.into_iter().skip(start).take(page_size).collect();

    Json(PagedSessions {
        sessions: page_entries,
        page,
        page_size,
        total,
    })
}

async fn get_session(
    State(state): State<TelemetryState>,
    AxumPath(id): AxumPath<u64>,
) -> Result<Json<crate::logging::SessionIndexEntry>, ApiError> {
    state
        .ctx
        .session_logger
        .entry(id)
        .await
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("unknown session: {id}")))
}

#[derive(Deserialize)]
struct CostsQuery {
    days: Option<i64>,
}

async fn get_sessions_costs(State(state): State<TelemetryState>, Query(q): Query<CostsQuery>) -> Json<serde_json::Value> {
    let breakdown = build_cost_breakdown(&state.ctx, q.days).await;
    Json(serde_json::to_value(breakdown).expect("CostBreakdown always serializes"))
}

#[derive(Deserialize)]
struct ProgressQuery {
    lines: Option<usize>,
    offset: Option<usize>,
}

async fn get_progress(
    State(state): State<TelemetryState>,
    Query(q): Query<ProgressQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let lines = q.lines.unwrap_or(200);
    let offset = q.offset.unwrap_or(0);
    let window = state.ctx.progress_log.lines_window(lines, offset).await?;
    Ok(Json(json!({ "lines": window })))
}

async fn get_progress_full(State(state): State<TelemetryState>) -> Result<Json<serde_json::Value>, ApiError> {
    let body = state.ctx.progress_log.read_full().await?;
    Ok(Json(json!({ "body": body })))
}

async fn get_projections(State(state): State<TelemetryState>) -> Json<serde_json::Value> {
    let projection = build_projection(&state.ctx).await;
    Json(serde_json::to_value(projection).expect("Projection always serializes"))
}

async fn get_timeline(State(state): State<TelemetryState>) -> Json<serde_json::Value> {
    let timeline = build_timeline(&state.ctx).await;
    Json(serde_json::to_value(timeline).expect("TimelineEntry always serializes"))
}

#[derive(Deserialize)]
struct AlertsQuery {
    include_dismissed: Option<bool>,
}

async fn get_alerts(State(state): State<TelemetryState>, Query(q): Query<AlertsQuery>) -> Json<serde_json::Value> {
    let alerts = state.ctx.alerts.list(q.include_dismissed.unwrap_or(false)).await;
    let unread_count = state.ctx.alerts.unread_count().await;
    Json(json!({ "alerts": alerts, "unread_count": unread_count }))
}

async fn get_alerts_unread_count(State(state): State<TelemetryState>) -> Json<serde_json::Value> {
    Json(json!({ "count": state.ctx.alerts.unread_count().await }))
}

async fn post_alert_read(
    State(state): State<TelemetryState>,
    AxumPath(id): AxumPath<Uuid>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let found = state.ctx.alerts.mark_read(id).await?;
    if !found {
        return Err(ApiError::NotFound(format!("unknown alert: {id}")));
    }
    Ok(Json(json!({ "ok": true })))
}

async fn post_alerts_read_all(State(state): State<TelemetryState>) -> Result<Json<serde_json::Value>, ApiError> {
    state.ctx.alerts.mark_all_read().await?;
    Ok(Json(json!({ "ok": true })))
}

async fn post_alert_dismiss(
    State(state): State<TelemetryState>,
    AxumPath(id): AxumPath<Uuid>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let found = state.ctx.alerts.dismiss(id).await?;
    if !found {
        return Err(ApiError::NotFound(format!("unknown alert: {id}")));
    }
    Ok(Json(json!({ "ok": true })))
}

/// The push channel (spec §6): every [`HarnessEvent`](crate::event_bus::HarnessEvent)
/// published onto the bus, rendered as an `{event, data, timestamp}`
/// envelope and forwarded as a server-sent event. Liveness is maintained
/// with an application-level ping on `push_ping_interval`; a client that
/// stops reading is dropped once the bus's per-subscriber buffer overflows
/// (spec §5's oldest-drop backpressure), not by this handler.
async fn ws_events(State(state): State<TelemetryState>) -> Sse<impl Stream<Item = Result<SseEvent, Infallible>>> {
    let stream = state.ctx.event_bus.subscribe();
    let ping_interval = state.ctx.config.telemetry.push_ping_interval;

    let sse_stream = async_stream::stream! {
        let mut inner = stream.into_async_stream();
        let mut sequence: u64 = 0;
        while let Some(event) = inner.next().await {
            if event.name() == STREAM_END_SCOPE {
                break;
            }
            sequence += 1;
            let envelope = event.to_envelope(sequence, Utc::now());
            let sse_event = SseEvent::default()
                .event(event.name())
                .json_data(envelope)
                .expect("harness event envelope always serializes");
            yield Ok::<SseEvent, Infallible>(sse_event);
        }
    };

    Sse::new(sse_stream).keep_alive(KeepAlive::new().interval(ping_interval).text("ping"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backlog::{Backlog, BacklogStore};
    use crate::config::HarnessConfig;
    use crate::session::transport::ScriptedTransport;
    use crate::vcs::VcsAdapter;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    struct FakeVcs;
    impl VcsAdapter for FakeVcs {
        fn status(&self) -> Result<crate::vcs::RepoStatus, crate::vcs::VcsError> {
            Ok(crate::vcs::RepoStatus {
                clean: true,
                untracked_paths: Vec::new(),
            })
        }
        fn head_commit(&self) -> Result<Option<String>, crate::vcs::VcsError> {
            Ok(None)
        }
        fn commit_all(&self, _message: &str) -> Result<String, crate::vcs::VcsError> {
            Ok("deadbeef".to_string())
        }
        fn recent_commits(&self, _n: usize) -> Result<Vec<crate::vcs::CommitSummary>, crate::vcs::VcsError> {
            Ok(Vec::new())
        }
        fn reset(&self, _hash: &str, _hard: bool) -> Result<(), crate::vcs::VcsError> {
            Ok(())
        }
        fn revert(&self, _hash: &str) -> Result<(), crate::vcs::VcsError> {
            Ok(())
        }
    }

    async fn test_state() -> TelemetryState {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().to_path_buf();
        std::mem::forget(dir);
        crate::config::ensure_ada_tree(&root).await.unwrap();
        let config = HarnessConfig::load(&root);

        // `HarnessContext::bootstrap` expects the backlog document to
        // already exist (seeding it is the initializer's job), so create
        // an empty one before bootstrapping.
        BacklogStore::init(config.backlog_path(), Backlog::new("demo", &root))
            .await
            .unwrap();

        let ctx = HarnessContext::bootstrap(
            config,
            Arc::new(FakeVcs),
            Arc::new(ScriptedTransport::new(Vec::new(), Default::default())),
        )
        .await
        .unwrap();
        TelemetryState::new(Arc::new(ctx), Arc::new(AtomicBool::new(false)))
    }

    #[tokio::test]
    async fn status_endpoint_reports_not_running_by_default() {
        let state = test_state().await;
        let app = router(state);
        let response = app
            .oneshot(Request::builder().uri("/api/status").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn unknown_feature_is_404() {
        let state = test_state().await;
        let app = router(state);
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/backlog/nonexistent")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn unread_alert_count_starts_at_zero() {
        let state = test_state().await;
        let app = router(state);
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/alerts/unread/count")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
