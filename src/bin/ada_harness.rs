//! `ada-harness`: the scheduler process entry point. Wires CLI args, logging,
//! the VCS/transport adapters, and `HarnessContext`, then drives the
//! Scheduler and the Telemetry API concurrently until the backlog drains or
//! a shutdown signal arrives (spec §4.11, §5).
//!
//! CLI ergonomics beyond `run`/`resume`/`status` are out of scope (spec's
//! Non-goals); this binary is the minimal process shape the design requires
//! to actually run.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use ada_harness::backlog::BacklogStore;
use ada_harness::checkpoint::CheckpointStore;
use ada_harness::config::{ensure_ada_tree, HarnessConfig};
use ada_harness::error::HarnessError;
use ada_harness::scheduler::{HarnessContext, Scheduler};
use ada_harness::session::record::SessionRecord;
use ada_harness::session::runtime::SessionRuntime;
use ada_harness::session::transcript::TranscriptEvent;
use ada_harness::session::transport::{AgentTransport, SessionRequest, StreamingApiTransport, SubprocessTransport};
use ada_harness::telemetry::http::{self, TelemetryState};
use ada_harness::vcs::{GitAdapter, VcsAdapter};

use clap::{Args, Parser, Subcommand};
use tokio::sync::watch;

#[derive(Parser)]
#[command(name = "ada-harness", author, version, about)]
struct Cli {
    /// Project root the harness operates on.
    #[arg(long, global = true, default_value = ".")]
    project_root: PathBuf,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Drive the backlog to completion, seeding it with a one-shot
    /// initializer session first if `feature-list.json` doesn't exist yet.
    Run(RunArgs),
    /// Same as `run`, but always resumes a pending checkpoint without
    /// prompting, as if `ADA_HARNESS_HEADLESS` were set.
    Resume(RunArgs),
    /// Print the current status snapshot as JSON and exit without running
    /// the scheduler.
    Status,
}

#[derive(Args)]
struct RunArgs {
    /// Path to the coding agent binary, used by the subprocess transport.
    #[arg(long, env = "ADA_HARNESS_AGENT_BINARY")]
    agent_binary: Option<PathBuf>,

    /// URL of a streaming-API coding agent; when set, takes precedence over
    /// `--agent-binary`.
    #[arg(long, env = "ADA_HARNESS_AGENT_ENDPOINT")]
    agent_endpoint: Option<String>,

    /// Bind address for the telemetry API; overrides configuration.
    #[arg(long)]
    bind_addr: Option<String>,

    /// Don't serve the telemetry API alongside the scheduler loop.
    #[arg(long)]
    no_telemetry: bool,
}

#[tokio::main]
async fn main() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let project_root = cli.project_root.canonicalize().unwrap_or(cli.project_root);

    match cli.command.unwrap_or(Command::Run(RunArgs {
        agent_binary: None,
        agent_endpoint: None,
        bind_addr: None,
        no_telemetry: false,
    })) {
        Command::Run(args) => run(project_root, args, false).await?,
        Command::Resume(args) => run(project_root, args, true).await?,
        Command::Status => print_status(project_root).await?,
    }

    Ok(())
}

fn build_transport(args: &RunArgs) -> Arc<dyn AgentTransport> {
    if let Some(endpoint) = &args.agent_endpoint {
        Arc::new(StreamingApiTransport::new(endpoint.clone()))
    } else {
        let binary = args
            .agent_binary
            .clone()
            .unwrap_or_else(|| PathBuf::from("claude-agent"));
        Arc::new(SubprocessTransport::new(binary))
    }
}

async fn run(project_root: PathBuf, args: RunArgs, force_headless_resume: bool) -> miette::Result<()> {
    let mut config = HarnessConfig::load(&project_root);
    if force_headless_resume {
        config.preflight.headless = true;
    }
    if let Some(bind_addr) = &args.bind_addr {
        config.telemetry.bind_addr = bind_addr.clone();
    }
    let transport = build_transport(&args);

    ensure_ada_tree(&project_root)
        .await
        .map_err(HarnessError::from)?;

    if !config.backlog_path().exists() {
        tracing::info!(
            target: "ada_harness::bin",
            path = %config.backlog_path().display(),
            "no backlog found, running the initializer session"
        );
        run_initializer(&config, Arc::clone(&transport)).await?;
    }

    let vcs: Arc<dyn VcsAdapter> = Arc::new(GitAdapter::open(&project_root).map_err(HarnessError::from)?);
    let ctx = Arc::new(HarnessContext::bootstrap(config, vcs, transport).await?);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    spawn_signal_listener(shutdown_tx);

    let running = Arc::new(AtomicBool::new(true));
    let telemetry_task = if !args.no_telemetry {
        let state = TelemetryState::new(Arc::clone(&ctx), Arc::clone(&running));
        let bind_addr = ctx.config.telemetry.bind_addr.clone();
        let telemetry_shutdown = shutdown_rx.clone();
        Some(tokio::spawn(async move {
            if let Err(e) = http::serve(state, &bind_addr, telemetry_shutdown).await {
                tracing::error!(target: "ada_harness::bin", error = %e, "telemetry API exited with an error");
            }
        }))
    } else {
        None
    };

    let scheduler = Scheduler::new(Arc::clone(&ctx), shutdown_rx);
    let outcome = scheduler.run().await;
    running.store(false, Ordering::SeqCst);

    if let Some(task) = telemetry_task {
        task.abort();
    }

    tracing::info!(target: "ada_harness::bin", exit_code = outcome.code(), "harness finished");
    std::process::exit(outcome.code());
}

/// Run the one-shot initializer session (`AgentKind::Initializer`) to
/// produce `feature-list.json` and `.ada/project.json` before a
/// `HarnessContext` can be bootstrapped — bootstrapping itself requires the
/// backlog to already exist (see `HarnessContext::bootstrap`'s doc comment).
/// Logged through the same Session Logger and Progress Log the scheduler
/// uses for every other session, just without the rest of the context that
/// isn't needed (no event bus, no backlog, no checkpoint).
async fn run_initializer(config: &HarnessConfig, transport: Arc<dyn AgentTransport>) -> miette::Result<()> {
    use ada_harness::backlog::ProjectIdentity;
    use ada_harness::logging::{LogEvent, SessionLogger};
    use ada_harness::progress_log::{ProgressEntry, ProgressLog};
    use ada_harness::scheduler::prompt::render_initializer_prompt;
    use ada_harness::types::AgentKind;

    let project_name = config
        .project_root
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "project".to_string());

    let session_logger = SessionLogger::open(
        config.sessions_dir(),
        config.session_index_path(),
        config.archive_dir(),
        config.logging.archive_size_cap_bytes,
    )
    .await
    .map_err(HarnessError::from)?;
    let progress_log = ProgressLog::new(config.progress_log_path());

    let session_id = session_logger
        .list()
        .await
        .iter()
        .map(|e| e.session_id)
        .max()
        .map(|max| max + 1)
        .unwrap_or(1);
    let model = config.session.default_model.clone();
    let filename = ada_harness::util::session_log_filename(chrono::Utc::now(), session_id, &AgentKind::Initializer.to_string(), None);
    let mut record = SessionRecord::new(session_id, filename, None, AgentKind::Initializer, model.clone());
    let handle = session_logger.start_session(&record).await.map_err(HarnessError::from)?;
    handle
        .log(&LogEvent::SessionStart {
            session_id,
            feature_id: None,
            agent_kind: AgentKind::Initializer,
            model: model.clone(),
        })
        .await
        .map_err(HarnessError::from)?;
    progress_log
        .append(ProgressEntry::SessionStart {
            session_id,
            feature_id: None,
        })
        .await
        .map_err(HarnessError::from)?;

    let request = SessionRequest {
        feature_id: None,
        prompt: render_initializer_prompt(&project_name),
        model: model.clone(),
    };
    let (_tx, shutdown_rx) = watch::channel(false);
    let runtime = SessionRuntime::new(config.session.clone());
    let result = runtime
        .run(request, &[], transport, shutdown_rx, |event: &TranscriptEvent| {
            if let TranscriptEvent::Error { message } = event {
                tracing::warn!(target: "ada_harness::bin", message, "initializer reported an error frame");
            }
        })
        .await;

    let outcome = result.outcome.outcome();
    record.finalize(outcome, result.turns, result.usage, 0.0, Vec::new(), None, None);
    handle
        .log(&LogEvent::SessionEnd {
            outcome,
            turns: result.turns,
            usage: result.usage,
            cost_usd: 0.0,
            final_commit: None,
        })
        .await
        .map_err(HarnessError::from)?;
    session_logger.finalize_session(&record).await.map_err(HarnessError::from)?;
    progress_log
        .append(ProgressEntry::SessionEnd {
            session_id,
            feature_id: None,
            outcome: outcome.to_string(),
        })
        .await
        .map_err(HarnessError::from)?;

    if !matches!(result.outcome, ada_harness::session::SessionOutcomeDetail::Success) {
        return Err(HarnessError::Preflight(format!(
            "initializer session did not complete successfully: {outcome}"
        ))
        .into());
    }
    if !config.backlog_path().exists() {
        return Err(HarnessError::Preflight(
            "initializer session signaled completion but feature-list.json was not written".to_string(),
        )
        .into());
    }
    if ProjectIdentity::load(&config.project_identity_path())
        .await
        .map_err(|e| HarnessError::Preflight(e.to_string()))?
        .is_none()
    {
        ProjectIdentity::new(&project_name)
            .save(&config.project_identity_path())
            .await
            .map_err(|e| HarnessError::Preflight(e.to_string()))?;
    }
    Ok(())
}

async fn print_status(project_root: PathBuf) -> miette::Result<()> {
    let config = HarnessConfig::load(&project_root);
    let backlog = BacklogStore::load(config.backlog_path()).await.map_err(HarnessError::from)?;
    let checkpoint = CheckpointStore::new(config.checkpoint_path());
    checkpoint.load().await.map_err(HarnessError::from)?;

    let snapshot = backlog.snapshot().await;
    let counts = ada_harness::telemetry::projections::status_counts(&snapshot);
    let current = checkpoint.current().await;

    let status = serde_json::json!({
        "project_name": snapshot.project_name,
        "counts": counts,
        "checkpoint": current,
    });
    println!("{}", serde_json::to_string_pretty(&status).expect("status JSON always serializes"));
    Ok(())
}

/// Listen for both ctrl-c and (on unix) SIGTERM, flipping the shared
/// shutdown flag exactly once (spec §5: "cancellation is idempotent").
fn spawn_signal_listener(shutdown_tx: watch::Sender<bool>) {
    tokio::spawn(async move {
        #[cfg(unix)]
        {
            let mut sigterm = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(s) => s,
                Err(e) => {
                    tracing::warn!(target: "ada_harness::bin", error = %e, "failed to install SIGTERM handler");
                    let _ = tokio::signal::ctrl_c().await;
                    let _ = shutdown_tx.send(true);
                    return;
                }
            };
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = sigterm.recv() => {}
            }
        }
        #[cfg(not(unix))]
        {
            let _ = tokio::signal::ctrl_c().await;
        }
        tracing::info!(target: "ada_harness::bin", "shutdown signal received");
        let _ = shutdown_tx.send(true);
    });
}
