//! Scheduler: the top-level harness loop (spec §4.11, §5). Owns every other
//! component through [`HarnessContext`] and drives the backlog to
//! completion one feature at a time — select the next runnable feature, run
//! a session against it, classify and retry failures, verify and commit
//! successes, and persist a resumable checkpoint after every terminal
//! session event.

pub mod preflight;
pub mod prompt;

use std::sync::Arc;

use tokio::sync::{watch, Mutex as AsyncMutex};

use crate::alerts::{AlertStore, NewAlert};
use crate::backlog::{BacklogStore, Feature};
use crate::checkpoint::{Checkpoint, CheckpointStore};
use crate::classify::{classify, RawFailure};
use crate::config::{ensure_ada_tree, HarnessConfig};
use crate::error::{HarnessError, HarnessResult};
use crate::event_bus::{EventBus, EventEmitter, HarnessEvent};
use crate::logging::{LogEvent, SessionLogger};
use crate::progress_log::{ProgressEntry, ProgressLog};
use crate::retry::{self, RetryDecision};
use crate::session::record::{SessionRecord, TokenUsage};
use crate::session::runtime::{SessionOutcomeDetail, SessionRuntime};
use crate::session::transcript::TranscriptEvent;
use crate::session::transport::{AgentTransport, SessionRequest};
use crate::types::{AgentKind, AlertSeverity, FeatureStatus, SessionOutcome};
use crate::util::SessionIdGenerator;
use crate::vcs::VcsAdapter;
use crate::verification::{
    AlwaysDeny, CoverageGate, E2eTestGate, GateContext, LintGate, ManualApprovalGate, PreCompleteHookGate,
    TypeCheckGate, UnitTestGate, VerificationPipeline,
};

/// Everything one harness run needs, threaded through every component
/// instead of read off globals (spec §9's dependency-injection note).
pub struct HarnessContext {
    pub config: HarnessConfig,
    pub backlog: BacklogStore,
    pub checkpoint: CheckpointStore,
    pub progress_log: ProgressLog,
    pub session_logger: SessionLogger,
    pub alerts: AlertStore,
    pub vcs: Arc<dyn VcsAdapter>,
    pub transport: Arc<dyn AgentTransport>,
    pub event_bus: EventBus,
    pub session_ids: SessionIdGenerator,
    cost_ledger: AsyncMutex<f64>,
}

impl HarnessContext {
    /// Load or create every piece of durable state for `config.project_root`
    /// and wire up the event bus. The backlog itself must already exist —
    /// seeding it is the initializer agent's job, not the scheduler's.
    pub async fn bootstrap(
        config: HarnessConfig,
        vcs: Arc<dyn VcsAdapter>,
        transport: Arc<dyn AgentTransport>,
    ) -> HarnessResult<Self> {
        ensure_ada_tree(&config.project_root).await?;

        let backlog = BacklogStore::load(config.backlog_path()).await?;

        let checkpoint = CheckpointStore::new(config.checkpoint_path());
        checkpoint.load().await?;

        let progress_log = ProgressLog::new(config.progress_log_path());

        let session_logger = SessionLogger::open(
            config.sessions_dir(),
            config.session_index_path(),
            config.archive_dir(),
            config.logging.archive_size_cap_bytes,
        )
        .await?;

        let event_bus = EventBus::default();
        event_bus.listen_for_events();

        let alerts = AlertStore::new(config.alerts_path(), config.alerts.dedup_window, event_bus.get_emitter());
        alerts.load().await?;

        let next_session_id = session_logger
            .list()
            .await
            .iter()
            .map(|e| e.session_id)
            .max()
            .map(|max| max + 1)
            .unwrap_or(1);

        Ok(Self {
            config,
            backlog,
            checkpoint,
            progress_log,
            session_logger,
            alerts,
            vcs,
            transport,
            event_bus,
            session_ids: SessionIdGenerator::starting_at(next_session_id),
            cost_ledger: AsyncMutex::new(0.0),
        })
    }

    pub fn emitter(&self) -> Arc<dyn EventEmitter> {
        self.event_bus.get_emitter()
    }

    async fn add_cost(&self, delta: f64) -> f64 {
        let mut total = self.cost_ledger.lock().await;
        *total += delta;
        *total
    }

    pub async fn total_cost_usd(&self) -> f64 {
        *self.cost_ledger.lock().await
    }

    fn verification_pipeline(&self) -> VerificationPipeline {
        let cfg = &self.config.verification;
        let mut pipeline = VerificationPipeline::new(cfg);
        if let Some(cmd) = &cfg.lint_command {
            pipeline = pipeline.with_gate(Box::new(LintGate::command(cmd.program.clone(), cmd.args.clone())));
        }
        if let Some(cmd) = &cfg.type_check_command {
            pipeline = pipeline.with_gate(Box::new(TypeCheckGate::command(cmd.program.clone(), cmd.args.clone())));
        }
        if let Some(cmd) = &cfg.unit_test_command {
            pipeline = pipeline.with_gate(Box::new(UnitTestGate::command(cmd.program.clone(), cmd.args.clone())));
        }
        if let Some(cmd) = &cfg.e2e_command {
            pipeline = pipeline.with_gate(Box::new(E2eTestGate::command(
                cmd.program.clone(),
                cmd.args.clone(),
                cfg.e2e_filter.clone(),
            )));
        }
        if let Some(cmd) = &cfg.coverage_command {
            pipeline = pipeline.with_gate(Box::new(CoverageGate::new(
                cmd.program.clone(),
                cmd.args.clone(),
                cfg.coverage_report_path.clone(),
                cfg.coverage_threshold,
            )));
        }
        if let Some(hook) = self.config.pre_complete_hook() {
            pipeline = pipeline.with_gate(Box::new(PreCompleteHookGate::new(Some(hook))));
        }
        pipeline
    }

    fn requires_manual_approval(&self, feature_id: &str) -> bool {
        self.config.verification.approval_required_globally
            || self
                .config
                .verification
                .approval_feature_ids
                .iter()
                .any(|id| id == feature_id)
    }
}

/// Terminal process exit behavior (spec §6's exit code table).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExitOutcome {
    /// Backlog fully drained, nothing left to run.
    Clean,
    /// The loop ended on an uncaught error or a fatal-stop classification.
    UncaughtError,
    /// A preflight check failed before the loop ever started.
    PreflightFailure,
    /// Shutdown was requested (signal/API) and handled gracefully.
    Interrupted,
}

impl ExitOutcome {
    pub fn code(self) -> i32 {
        match self {
            ExitOutcome::Clean => 0,
            ExitOutcome::UncaughtError => 1,
            ExitOutcome::PreflightFailure => 2,
            ExitOutcome::Interrupted => 130,
        }
    }
}

/// The top-level harness loop, driven to completion or until shutdown is
/// requested on `shutdown`.
pub struct Scheduler {
    ctx: Arc<HarnessContext>,
    shutdown: watch::Receiver<bool>,
}

impl Scheduler {
    pub fn new(ctx: Arc<HarnessContext>, shutdown: watch::Receiver<bool>) -> Self {
        Self { ctx, shutdown }
    }

    pub async fn run(&self) -> ExitOutcome {
        if let Err(e) = preflight::run(&self.ctx).await {
            tracing::error!(target: "ada_harness::scheduler", error = %e, "preflight failed");
            return ExitOutcome::PreflightFailure;
        }

        if let Err(e) = self.maybe_resume_from_checkpoint().await {
            tracing::error!(target: "ada_harness::scheduler", error = %e, "failed to resume from checkpoint");
            return ExitOutcome::UncaughtError;
        }

        match self.run_loop().await {
            Ok(()) if *self.shutdown.borrow() => ExitOutcome::Interrupted,
            Ok(()) => ExitOutcome::Clean,
            Err(e) => {
                tracing::error!(target: "ada_harness::scheduler", error = %e, "scheduler loop ended with an error");
                ExitOutcome::UncaughtError
            }
        }
    }

    /// Spec §4.11's `maybeResumeFromCheckpoint()` step, run once right after
    /// preflight: if a checkpoint names a feature still eligible to run,
    /// offer (interactive) or choose (headless) whether to pick up where
    /// the last run left off rather than re-selecting from scratch.
    async fn maybe_resume_from_checkpoint(&self) -> HarnessResult<()> {
        let Some(checkpoint) = self.ctx.checkpoint.current().await else {
            return Ok(());
        };
        let Some(feature_id) = &checkpoint.feature_id else {
            return Ok(());
        };
        let feature = match self.ctx.backlog.feature(feature_id).await {
            Ok(f) => f,
            Err(_) => return Ok(()),
        };
        if feature.status == FeatureStatus::Completed {
            return Ok(());
        }

        let resume = if self.ctx.config.preflight.headless {
            true
        } else {
            prompt::confirm(&format!(
                "Resume checkpointed feature '{feature_id}' at attempt {}? [Y/n] ",
                checkpoint.attempt
            ))
            .await
        };

        if resume {
            tracing::info!(
                target: "ada_harness::scheduler",
                feature_id = %feature_id,
                attempt = checkpoint.attempt,
                "resuming from checkpoint"
            );
            if feature.status != FeatureStatus::InProgress {
                self.ctx.backlog.transition(feature_id, FeatureStatus::InProgress).await?;
            }
        } else {
            tracing::info!(
                target: "ada_harness::scheduler",
                feature_id = %feature_id,
                "declined checkpoint resume, re-selecting from backlog order"
            );
        }
        Ok(())
    }

    async fn run_loop(&self) -> HarnessResult<()> {
        loop {
            if *self.shutdown.borrow() {
                self.graceful_shutdown(None, "shutdown requested").await?;
                return Ok(());
            }

            match self.ctx.backlog.select_next().await {
                Some(feature) => self.run_feature(feature).await?,
                None => {
                    self.graceful_shutdown(None, "backlog drained").await?;
                    return Ok(());
                }
            }
        }
    }

    /// Drive `feature` through attempts until it completes, is blocked, or
    /// the scheduler is asked to shut down.
    async fn run_feature(&self, feature: Feature) -> HarnessResult<()> {
        self.ctx.backlog.transition(&feature.id, FeatureStatus::InProgress).await?;
        let _ = self.ctx.emitter().emit(HarnessEvent::FeatureUpdated {
            feature_id: feature.id.clone(),
        });

        let mut attempt = self.ctx.checkpoint.attempt_for(&feature.id).await;

        loop {
            if *self.shutdown.borrow() {
                return Ok(());
            }
            attempt += 1;

            let current = self.ctx.backlog.feature(&feature.id).await?;
            let handoff_notes = self
                .ctx
                .checkpoint
                .current()
                .await
                .filter(|cp| cp.feature_id.as_deref() == Some(feature.id.as_str()))
                .map(|cp| cp.handoff_notes)
                .unwrap_or_default();

            // Spec §4.11's pseudocode captures the last good commit and
            // checkpoints *before* every attempt, not just on a terminal
            // success/handoff — so an interrupt or crash mid-attempt still
            // leaves a resumable checkpoint pointing at this feature/attempt.
            let last_good = {
                let vcs = Arc::clone(&self.ctx.vcs);
                tokio::task::spawn_blocking(move || vcs.head_commit().ok().flatten())
                    .await
                    .unwrap_or(None)
            };
            self.ctx
                .checkpoint
                .save(Checkpoint::for_attempt(&feature.id, attempt, last_good).with_handoff_notes(handoff_notes.clone()))
                .await?;

            let session = self.run_session(&current, attempt, &handoff_notes).await?;

            match &session.outcome {
                SessionOutcomeDetail::Success => {
                    self.ctx.backlog.record_session_spent(&feature.id).await?;
                    match self.verify_feature(&current).await {
                        Ok(()) => {
                            self.ctx.backlog.transition(&feature.id, FeatureStatus::Completed).await?;
                            let commit = self
                                .commit_if_dirty(format!("{}: {}", feature.id, feature.name))
                                .await?;
                            self.ctx
                                .checkpoint
                                .save(Checkpoint::for_attempt(&feature.id, attempt, commit))
                                .await?;
                            let _ = self.ctx.emitter().emit(HarnessEvent::FeatureUpdated {
                                feature_id: feature.id.clone(),
                            });
                            return Ok(());
                        }
                        Err(e) => {
                            self.ctx
                                .backlog
                                .set_notes(&feature.id, format!("verification failed: {e}"))
                                .await?;
                            continue;
                        }
                    }
                }
                SessionOutcomeDetail::Handoff => {
                    self.ctx.backlog.record_session_spent(&feature.id).await?;
                    let commit = self
                        .commit_if_dirty(format!("{}: handoff after attempt {attempt}", feature.id))
                        .await?;
                    let mut checkpoint = Checkpoint::for_attempt(&feature.id, attempt, commit);
                    if let Some(notes) = &session.last_assistant_message {
                        checkpoint = checkpoint.with_handoff_notes(vec![notes.clone()]);
                    }
                    self.ctx.checkpoint.save(checkpoint).await?;
                    continue;
                }
                SessionOutcomeDetail::Interrupted => {
                    return Ok(());
                }
                SessionOutcomeDetail::Timeout { .. }
                | SessionOutcomeDetail::Crashed { .. }
                | SessionOutcomeDetail::Failure { .. } => {
                    let raw = derive_raw_failure(&session.outcome);
                    let classification = classify(&raw);

                    if classification.category.is_fatal_stop() {
                        self.raise_alert(
                            AlertSeverity::Error,
                            "fatal stop condition",
                            classification.human_message.clone(),
                            "fatal_stop",
                            Some(feature.id.clone()),
                            Some(session.session_id),
                        )
                        .await;
                        return Err(HarnessError::FatalStop(classification.human_message));
                    }

                    match retry::decide(classification.category, attempt, &self.ctx.config.retry) {
                        RetryDecision::Retry { delay } => {
                            self.ctx.backlog.record_session_spent(&feature.id).await?;
                            self.ctx
                                .backlog
                                .set_notes(&feature.id, classification.human_message.clone())
                                .await?;
                            if self.sleep_or_shutdown(delay).await {
                                return Ok(());
                            }
                            continue;
                        }
                        RetryDecision::GiveUp => {
                            self.ctx.backlog.transition(&feature.id, FeatureStatus::Blocked).await?;
                            self.ctx
                                .backlog
                                .set_notes(
                                    &feature.id,
                                    format!("gave up after attempt {attempt}: {}", classification.human_message),
                                )
                                .await?;
                            self.raise_alert(
                                AlertSeverity::Error,
                                "retries exhausted",
                                classification.human_message.clone(),
                                "retry_exhausted",
                                Some(feature.id.clone()),
                                Some(session.session_id),
                            )
                            .await;
                            return Ok(());
                        }
                    }
                }
            }
        }
    }

    /// Sleep for `delay`, returning early (and reporting `true`) if shutdown
    /// is requested partway through.
    async fn sleep_or_shutdown(&self, delay: std::time::Duration) -> bool {
        let mut shutdown = self.shutdown.clone();
        tokio::select! {
            _ = tokio::time::sleep(delay) => false,
            changed = shutdown.changed() => changed.is_ok() && *shutdown.borrow(),
        }
    }

    async fn raise_alert(
        &self,
        severity: AlertSeverity,
        title: &str,
        message: String,
        alert_type: &str,
        feature_id: Option<String>,
        session_id: Option<u64>,
    ) {
        let result = self
            .ctx
            .alerts
            .raise(NewAlert {
                severity,
                title: title.to_string(),
                message,
                alert_type: alert_type.to_string(),
                feature_id,
                session_id,
            })
            .await;
        if let Err(e) = result {
            tracing::error!(target: "ada_harness::scheduler", error = %e, "failed to raise alert");
        }
    }

    /// Run the verification pipeline, skipping straight to the manual
    /// approval gate's result when configured for this feature (spec §4.8
    /// point 7 composes with the rest of the pipeline rather than replacing
    /// it, so approval is appended as the pipeline's last gate).
    async fn verify_feature(&self, feature: &Feature) -> Result<(), crate::verification::VerificationError> {
        if !self.ctx.config.verification.enabled {
            return Ok(());
        }
        let mut pipeline = self.ctx.verification_pipeline();
        if self.ctx.requires_manual_approval(&feature.id) {
            pipeline = pipeline.with_gate(Box::new(ManualApprovalGate::new(Box::new(AlwaysDeny))));
        }
        let ctx = GateContext {
            project_root: self.ctx.config.project_root.clone(),
            feature_id: feature.id.clone(),
            feature_name: feature.name.clone(),
            feature_category: feature.category,
            max_captured_output_bytes: self.ctx.config.verification.max_captured_output_bytes,
        };
        pipeline.run(&ctx).await
    }

    /// Commit the working tree if it has changes, treating a clean tree as
    /// a no-op rather than an error (spec's "nothing to commit" case).
    async fn commit_if_dirty(&self, message: String) -> HarnessResult<Option<String>> {
        let vcs = Arc::clone(&self.ctx.vcs);
        tokio::task::spawn_blocking(move || -> HarnessResult<Option<String>> {
            let status = vcs.status().map_err(HarnessError::from)?;
            if status.clean {
                return Ok(None);
            }
            let commit = vcs.commit_all(&message).map_err(HarnessError::from)?;
            Ok(Some(commit))
        })
        .await
        .map_err(|e| HarnessError::Io(std::io::Error::new(std::io::ErrorKind::Other, e.to_string())))?
    }

    /// Run one session against `feature`, logging every transcript frame and
    /// finalizing the session record.
    async fn run_session(
        &self,
        feature: &Feature,
        attempt: u32,
        handoff_notes: &[String],
    ) -> HarnessResult<SessionOutput> {
        let session_id = self.ctx.session_ids.next();
        let model = feature
            .model_override
            .clone()
            .unwrap_or_else(|| self.ctx.config.session.default_model.clone());

        let progress_tail = self.ctx.progress_log.tail_kilobytes(8).await.unwrap_or_default();
        let prompt = prompt::render_feature_prompt(feature, &progress_tail, handoff_notes);
        let request = SessionRequest {
            feature_id: Some(feature.id.clone()),
            prompt,
            model: model.clone(),
        };

        let filename = crate::util::session_log_filename(chrono::Utc::now(), session_id, &AgentKind::Coding.to_string(), Some(&feature.id));
        let mut record = SessionRecord::new(session_id, filename, Some(feature.id.clone()), AgentKind::Coding, model.clone());
        let handle = self.ctx.session_logger.start_session(&record).await?;
        handle
            .log(&LogEvent::SessionStart {
                session_id,
                feature_id: Some(feature.id.clone()),
                agent_kind: AgentKind::Coding,
                model: model.clone(),
            })
            .await?;

        self.ctx
            .progress_log
            .append(ProgressEntry::SessionStart {
                session_id,
                feature_id: Some(feature.id.clone()),
            })
            .await?;
        let _ = self.ctx.emitter().emit(HarnessEvent::SessionStarted {
            session_id,
            feature_id: Some(feature.id.clone()),
            agent_kind: AgentKind::Coding.to_string(),
        });

        // The runtime's `on_event` callback is synchronous, so transcript
        // frames are buffered here and logged (async) once the session
        // reaches a terminal condition, attempt `attempt` of this feature.
        tracing::debug!(target: "ada_harness::scheduler", feature_id = %feature.id, attempt, "starting session");
        let buffer: Arc<std::sync::Mutex<Vec<TranscriptEvent>>> = Arc::new(std::sync::Mutex::new(Vec::new()));
        let runtime = SessionRuntime::new(self.ctx.config.session.clone());
        let result = {
            let buffer = Arc::clone(&buffer);
            runtime
                .run(
                    request,
                    &feature.acceptance_criteria,
                    Arc::clone(&self.ctx.transport),
                    self.shutdown.clone(),
                    move |event: &TranscriptEvent| {
                        buffer.lock().expect("transcript buffer mutex poisoned").push(event.clone());
                    },
                )
                .await
        };

        let events = Arc::try_unwrap(buffer)
            .map(|m| m.into_inner().expect("transcript buffer mutex poisoned"))
            .unwrap_or_default();

        let mut last_assistant_message = None;
        for event in &events {
            if let TranscriptEvent::Message { role, content } = event {
                if role == "assistant" {
                    last_assistant_message = Some(content.clone());
                }
            }
            if let Some(log_event) = transcript_to_log_event(event) {
                handle.log(&log_event).await?;
            }
        }

        let cost_usd = estimate_cost_usd(&model, &result.usage);
        let total_cost = self.ctx.add_cost(cost_usd).await;

        let outcome = result.outcome.outcome();
        let classified_error = match &result.outcome {
            SessionOutcomeDetail::Success | SessionOutcomeDetail::Handoff | SessionOutcomeDetail::Interrupted => None,
            detail => {
                let raw = derive_raw_failure(detail);
                Some(crate::classify::ClassifiedError::new(
                    classify(&raw),
                    serde_json::json!({ "feature_id": feature.id, "attempt": attempt }),
                ))
            }
        };

        record.finalize(outcome, result.turns, result.usage, cost_usd, Vec::new(), None, classified_error);
        handle
            .log(&LogEvent::SessionEnd {
                outcome,
                turns: result.turns,
                usage: result.usage,
                cost_usd,
                final_commit: None,
            })
            .await?;
        self.ctx.session_logger.finalize_session(&record).await?;

        self.ctx
            .progress_log
            .append(ProgressEntry::SessionEnd {
                session_id,
                feature_id: Some(feature.id.clone()),
                outcome: outcome.to_string(),
            })
            .await?;
        let _ = self.ctx.emitter().emit(HarnessEvent::SessionEnded {
            session_id,
            feature_id: Some(feature.id.clone()),
            outcome: outcome.to_string(),
        });
        let _ = self.ctx.emitter().emit(HarnessEvent::CostUpdate {
            session_id,
            cost_usd,
            total_cost_usd: total_cost,
        });

        Ok(SessionOutput {
            session_id,
            outcome: result.outcome,
            last_assistant_message,
        })
    }

    /// Persist backlog/checkpoint state and append a final progress entry
    /// before the loop returns (spec §5's graceful shutdown sequence).
    async fn graceful_shutdown(&self, feature: Option<&Feature>, reason: &str) -> HarnessResult<()> {
        tracing::info!(target: "ada_harness::scheduler", reason, "shutting down");
        if let Some(feature) = feature {
            self.ctx
                .progress_log
                .append(ProgressEntry::Handoff {
                    session_id: self.ctx.session_ids.peek(),
                    feature_id: Some(feature.id.clone()),
                    notes: reason.to_string(),
                })
                .await?;
        }
        Ok(())
    }
}

/// What [`Scheduler::run_session`] learned, reduced to what `run_feature`
/// needs to decide the next step.
struct SessionOutput {
    session_id: u64,
    outcome: SessionOutcomeDetail,
    last_assistant_message: Option<String>,
}

/// Map a terminal [`SessionOutcomeDetail`] onto the evidence [`classify`]
/// needs. Success/Handoff/Interrupted never reach here (see `run_feature`).
fn derive_raw_failure(detail: &SessionOutcomeDetail) -> RawFailure {
    match detail {
        SessionOutcomeDetail::Failure { raw } => raw.clone(),
        SessionOutcomeDetail::Timeout { stalled } => RawFailure {
            runtime_raised_timeout: true,
            missing_completion_signal: true,
            stderr_tail: if *stalled {
                "session stalled: no transcript activity within the stall window".to_string()
            } else {
                "session exceeded its hard timeout".to_string()
            },
            ..RawFailure::default()
        },
        SessionOutcomeDetail::Crashed { exit_code } => RawFailure {
            exit_code: *exit_code,
            missing_completion_signal: true,
            ..RawFailure::default()
        },
        SessionOutcomeDetail::Success | SessionOutcomeDetail::Handoff | SessionOutcomeDetail::Interrupted => {
            RawFailure::default()
        }
    }
}

fn transcript_to_log_event(event: &TranscriptEvent) -> Option<LogEvent> {
    match event {
        TranscriptEvent::Message { role, content } if role == "assistant" => Some(LogEvent::Assistant {
            content: content.clone(),
        }),
        TranscriptEvent::Message { content, .. } => Some(LogEvent::Prompt {
            content: content.clone(),
        }),
        TranscriptEvent::ToolCall { name, input } => Some(LogEvent::ToolCall {
            name: name.clone(),
            input: input.clone(),
        }),
        TranscriptEvent::ToolResult { name, output, is_error } => Some(LogEvent::ToolResult {
            name: name.clone(),
            output: output.clone(),
            is_error: *is_error,
        }),
        TranscriptEvent::UsageUpdate { usage } => Some(LogEvent::UsageUpdate { usage: *usage }),
        TranscriptEvent::Error { message } => Some(LogEvent::Error {
            message: message.clone(),
        }),
        TranscriptEvent::CompletionSignal { .. } => None,
    }
}

/// Per-million-token pricing, USD, rough enough for dashboard estimates
/// (spec §6's cost projection, not an invoice). Unrecognized models fall
/// back to a conservative blended rate rather than reporting zero cost.
fn estimate_cost_usd(model: &str, usage: &TokenUsage) -> f64 {
    let (input_per_million, output_per_million) = if model.to_lowercase().contains("haiku") {
        (0.80, 4.00)
    } else if model.to_lowercase().contains("opus") {
        (15.00, 75.00)
    } else if model.to_lowercase().contains("sonnet") || model.to_lowercase().contains("claude") {
        (3.00, 15.00)
    } else if model.to_lowercase().contains("gpt-4") {
        (5.00, 15.00)
    } else {
        (3.00, 15.00)
    };
    let input_cost = usage.input as f64 / 1_000_000.0 * input_per_million;
    let output_cost = usage.output as f64 / 1_000_000.0 * output_per_million;
    input_cost + output_cost
}
