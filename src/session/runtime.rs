//! Session Runtime (C4): spawns/drives one coding or initializer session,
//! streaming its transcript into the supplied sink while tracking turns,
//! usage, context occupancy, stalls, and the hard timeout, then resolving
//! one of the terminal outcomes in spec §4.4's table.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::time::Instant;

use crate::classify::RawFailure;
use crate::config::SessionConfig;
use crate::types::SessionOutcome;

use super::record::TokenUsage;
use super::transcript::TranscriptEvent;
use super::transport::{AgentTransport, SessionRequest, TransportExit};

/// Fallback context-window size (tokens) used when a model isn't present
/// in [`model_context_window`]. Conservative so an unrecognized model
/// hands off early rather than running past its real window.
const DEFAULT_CONTEXT_WINDOW: u64 = 200_000;

/// Best-effort context window lookup for the handoff-threshold
/// calculation. Not an exhaustive model registry — just enough for the
/// models this harness is documented to drive.
pub(crate) fn model_context_window(model: &str) -> u64 {
    if model.contains("200k") || model.to_lowercase().contains("claude") {
        200_000
    } else if model.to_lowercase().contains("gpt-4") {
        128_000
    } else {
        DEFAULT_CONTEXT_WINDOW
    }
}

/// Detailed terminal outcome, carrying enough context for the scheduler to
/// classify and commit without re-deriving it from the transcript.
#[derive(Debug)]
pub enum SessionOutcomeDetail {
    Success,
    Handoff,
    /// `stalled` distinguishes the stall sub-kind from a hard-timeout
    /// expiry; both map to [`SessionOutcome::Timeout`] (spec §4.4).
    Timeout { stalled: bool },
    Crashed { exit_code: Option<i32> },
    Interrupted,
    Failure { raw: RawFailure },
}

impl SessionOutcomeDetail {
    pub fn outcome(&self) -> SessionOutcome {
        match self {
            SessionOutcomeDetail::Success => SessionOutcome::Success,
            SessionOutcomeDetail::Handoff => SessionOutcome::Handoff,
            SessionOutcomeDetail::Timeout { .. } => SessionOutcome::Timeout,
            SessionOutcomeDetail::Crashed { .. } => SessionOutcome::Crashed,
            SessionOutcomeDetail::Interrupted => SessionOutcome::Interrupted,
            SessionOutcomeDetail::Failure { .. } => SessionOutcome::Failure,
        }
    }
}

/// Everything the runtime learned about a session by the time it reached a
/// terminal condition.
#[derive(Debug)]
pub struct SessionResult {
    pub outcome: SessionOutcomeDetail,
    pub turns: u32,
    pub usage: TokenUsage,
    pub criteria_met: Vec<String>,
}

pub struct SessionRuntime {
    config: SessionConfig,
}

impl SessionRuntime {
    pub fn new(config: SessionConfig) -> Self {
        Self { config }
    }

    /// Run one session to a terminal condition.
    ///
    /// `acceptance_criteria` drives the completion cross-check described in
    /// spec §9's Open Question resolution: a `completion_signal` frame is
    /// required before `success` is ever considered, and when the feature
    /// names acceptance criteria, every one of them must appear (by
    /// case/whitespace-insensitive match) in the signal's `criteria_met`
    /// before the session is treated as done. A missing self-report is
    /// never inferred from the transcript.
    pub async fn run(
        &self,
        request: SessionRequest,
        acceptance_criteria: &[String],
        transport: Arc<dyn AgentTransport>,
        shutdown: watch::Receiver<bool>,
        mut on_event: impl FnMut(&TranscriptEvent) + Send,
    ) -> SessionResult {
        let (tx, mut rx) = mpsc::channel(256);
        let model_window = model_context_window(&request.model);

        let transport_task = {
            let transport = Arc::clone(&transport);
            let request = request.clone();
            let transport_shutdown = shutdown.clone();
            tokio::spawn(async move { transport.run(&request, tx, transport_shutdown).await })
        };

        let start = Instant::now();
        let mut turns: u32 = 0;
        let mut usage = TokenUsage::default();
        let mut completion_seen = false;
        let mut criteria_met: HashSet<String> = HashSet::new();
        let mut last_error: Option<String> = None;
        let mut shutdown_watch = shutdown.clone();

        let mut decided: Option<SessionOutcomeDetail> = None;

        while decided.is_none() {
            let elapsed = start.elapsed();
            if elapsed >= self.config.hard_timeout {
                decided = Some(SessionOutcomeDetail::Timeout { stalled: false });
                break;
            }
            let remaining_hard = self.config.hard_timeout - elapsed;
            let wait = self.config.stall_window.min(remaining_hard);

            tokio::select! {
                biased;
                changed = shutdown_watch.changed() => {
                    if changed.is_ok() && *shutdown_watch.borrow() {
                        decided = Some(self.finish_interrupted(transport_task).await);
                        break;
                    }
                }
                frame = tokio::time::timeout(wait, rx.recv()) => {
                    match frame {
                        Ok(Some(event)) => {
                            on_event(&event);
                            if event.is_assistant_turn() {
                                turns += 1;
                            }
                            match &event {
                                TranscriptEvent::UsageUpdate { usage: delta } => usage.accumulate(delta),
                                TranscriptEvent::CompletionSignal { criteria_met: met } => {
                                    completion_seen = true;
                                    criteria_met.extend(met.iter().map(|c| normalize_criterion(c)));
                                }
                                TranscriptEvent::Error { message } => {
                                    last_error = Some(message.clone());
                                }
                                _ => {}
                            }

                            if completion_seen && acceptance_satisfied(acceptance_criteria, &criteria_met) {
                                decided = Some(SessionOutcomeDetail::Success);
                                break;
                            }

                            let fraction = usage.context_fraction(model_window);
                            if !completion_seen && fraction >= self.config.handoff_context_threshold {
                                decided = Some(SessionOutcomeDetail::Handoff);
                                break;
                            }
                        }
                        Ok(None) => {
                            decided = Some(
                                self.finish_transport_ended(transport_task, completion_seen, acceptance_criteria, &criteria_met, last_error.take())
                                    .await,
                            );
                            break;
                        }
                        Err(_elapsed) => {
                            decided = Some(SessionOutcomeDetail::Timeout { stalled: true });
                            break;
                        }
                    }
                }
            }
        }

        SessionResult {
            outcome: decided.expect("loop only exits once an outcome is decided"),
            turns,
            usage,
            criteria_met: criteria_met.into_iter().collect(),
        }
    }

    /// Shutdown was requested: the transport has already observed the same
    /// watch channel and is attempting its own clean exit (commit +
    /// handoff notes, per spec §5). Wait up to the configured grace period
    /// before forcing it down.
    async fn finish_interrupted(
        &self,
        transport_task: tokio::task::JoinHandle<Result<TransportExit, super::transport::TransportError>>,
    ) -> SessionOutcomeDetail {
        match tokio::time::timeout(self.config.shutdown_grace_period, transport_task).await {
            Ok(_) => SessionOutcomeDetail::Interrupted,
            Err(_) => SessionOutcomeDetail::Interrupted,
        }
    }

    async fn finish_transport_ended(
        &self,
        transport_task: tokio::task::JoinHandle<Result<TransportExit, super::transport::TransportError>>,
        completion_seen: bool,
        acceptance_criteria: &[String],
        criteria_met: &HashSet<String>,
        last_error: Option<String>,
    ) -> SessionOutcomeDetail {
        match transport_task.await {
            Err(join_error) => SessionOutcomeDetail::Failure {
                raw: RawFailure {
                    exit_code: None,
                    stderr_tail: format!("transport task panicked: {join_error}"),
                    stdout_tail: String::new(),
                    runtime_raised_timeout: false,
                    missing_completion_signal: !completion_seen,
                },
            },
            Ok(Err(transport_error)) => SessionOutcomeDetail::Failure {
                raw: RawFailure {
                    exit_code: None,
                    stderr_tail: transport_error.to_string(),
                    stdout_tail: String::new(),
                    runtime_raised_timeout: false,
                    missing_completion_signal: !completion_seen,
                },
            },
            Ok(Ok(exit)) => {
                if completion_seen && acceptance_satisfied(acceptance_criteria, criteria_met) {
                    SessionOutcomeDetail::Success
                } else if exit.exit_code.is_some_and(|c| c != 0) || !completion_seen {
                    SessionOutcomeDetail::Crashed {
                        exit_code: exit.exit_code,
                    }
                } else {
                    SessionOutcomeDetail::Failure {
                        raw: RawFailure {
                            exit_code: exit.exit_code,
                            stderr_tail: last_error.unwrap_or_default(),
                            stdout_tail: String::new(),
                            runtime_raised_timeout: false,
                            missing_completion_signal: false,
                        },
                    }
                }
            }
        }
    }
}

fn normalize_criterion(s: &str) -> String {
    s.trim().to_lowercase()
}

fn acceptance_satisfied(required: &[String], met: &HashSet<String>) -> bool {
    if required.is_empty() {
        return true;
    }
    required
        .iter()
        .all(|c| met.contains(&normalize_criterion(c)))
}

#[allow(dead_code)]
fn default_stall_window() -> Duration {
    Duration::from_secs(5 * 60)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::transport::ScriptedTransport;
    use crate::types::AgentKind;

    fn request() -> SessionRequest {
        SessionRequest {
            feature_id: Some("f1".into()),
            prompt: "do the thing".into(),
            model: "claude".into(),
        }
    }

    fn config() -> SessionConfig {
        SessionConfig {
            stall_window: Duration::from_millis(200),
            hard_timeout: Duration::from_secs(2),
            handoff_context_threshold: 0.70,
            shutdown_grace_period: Duration::from_millis(200),
            default_model: "default".to_string(),
        }
    }

    #[tokio::test]
    async fn completion_signal_with_satisfied_criteria_is_success() {
        let transport: Arc<dyn AgentTransport> = Arc::new(ScriptedTransport::new(
            vec![
                TranscriptEvent::Message {
                    role: "assistant".into(),
                    content: "working".into(),
                },
                TranscriptEvent::CompletionSignal {
                    criteria_met: vec!["Tests pass".into()],
                },
            ],
            Default::default(),
        ));
        let (_tx, rx) = watch::channel(false);
        let runtime = SessionRuntime::new(config());
        let result = runtime
            .run(
                request(),
                &["tests pass".to_string()],
                transport,
                rx,
                |_| {},
            )
            .await;
        assert!(matches!(result.outcome, SessionOutcomeDetail::Success));
        assert_eq!(result.turns, 1);
        let _ = AgentKind::Coding;
    }

    #[tokio::test]
    async fn completion_signal_missing_required_criterion_is_not_success() {
        let transport: Arc<dyn AgentTransport> = Arc::new(ScriptedTransport::new(
            vec![TranscriptEvent::CompletionSignal {
                criteria_met: vec!["only this one".into()],
            }],
            Default::default(),
        ));
        let (_tx, rx) = watch::channel(false);
        let runtime = SessionRuntime::new(config());
        let result = runtime
            .run(
                request(),
                &["only this one".to_string(), "and this one".to_string()],
                transport,
                rx,
                |_| {},
            )
            .await;
        assert!(matches!(
            result.outcome,
            SessionOutcomeDetail::Crashed { .. }
        ));
    }

    #[tokio::test]
    async fn context_threshold_triggers_handoff_before_completion() {
        let transport: Arc<dyn AgentTransport> = Arc::new(ScriptedTransport::new(
            vec![TranscriptEvent::UsageUpdate {
                usage: TokenUsage {
                    input: 150_000,
                    output: 10_000,
                    cache_read: 0,
                    cache_write: 0,
                },
            }],
            Default::default(),
        ));
        let (_tx, rx) = watch::channel(false);
        let runtime = SessionRuntime::new(config());
        let result = runtime.run(request(), &[], transport, rx, |_| {}).await;
        assert!(matches!(result.outcome, SessionOutcomeDetail::Handoff));
    }

    #[tokio::test]
    async fn stall_with_no_frames_times_out() {
        let transport: Arc<dyn AgentTransport> = Arc::new(
            ScriptedTransport::new(vec![], Default::default())
                .with_frame_delay(Duration::from_secs(10)),
        );
        let (_tx, rx) = watch::channel(false);
        let mut cfg = config();
        cfg.stall_window = Duration::from_millis(50);
        let runtime = SessionRuntime::new(cfg);
        let result = runtime.run(request(), &[], transport, rx, |_| {}).await;
        assert!(matches!(
            result.outcome,
            SessionOutcomeDetail::Timeout { stalled: true }
        ));
    }

    #[tokio::test]
    async fn shutdown_signal_yields_interrupted() {
        let transport: Arc<dyn AgentTransport> = Arc::new(
            ScriptedTransport::new(vec![], Default::default())
                .with_frame_delay(Duration::from_secs(10)),
        );
        let (tx, rx) = watch::channel(false);
        let runtime = SessionRuntime::new(config());
        let run_future = runtime.run(request(), &[], transport, rx, |_| {});
        tokio::pin!(run_future);
        tokio::time::sleep(Duration::from_millis(20)).await;
        tx.send(true).unwrap();
        let result = run_future.await;
        assert!(matches!(result.outcome, SessionOutcomeDetail::Interrupted));
    }
}
