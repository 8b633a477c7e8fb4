//! Shared test doubles and fixtures for the scheduler's end-to-end
//! scenarios (spec.md §8). Kept under `tests/common/` rather than inside
//! the crate itself, mirroring how the teacher lineage separates
//! integration-test fixtures from library code.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Mutex as StdMutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;

use ada_harness::backlog::{Backlog, BacklogStore, Feature};
use ada_harness::config::{
    AlertConfig, HarnessConfig, LoggingConfig, PreflightConfig, RetryConfig, SessionConfig,
    TelemetryConfig, VerificationConfig,
};
use ada_harness::session::transcript::{TranscriptEvent, TranscriptSink};
use ada_harness::session::transport::{AgentTransport, SessionRequest, TransportError, TransportExit};
use ada_harness::vcs::{CommitSummary, RepoStatus, VcsAdapter, VcsError};

/// A harness config tuned for fast, deterministic tests: short delays,
/// a dirty-worktree-tolerant preflight (the fake VCS always reports dirty
/// so every session's commit actually happens), and no disk-space floor.
pub fn test_config(project_root: impl Into<PathBuf>) -> HarnessConfig {
    HarnessConfig {
        project_root: project_root.into(),
        retry: RetryConfig {
            base_delay: Duration::from_millis(5),
            rate_limit_base_delay: Duration::from_millis(10),
            exponential_base: 2.0,
            max_delay: Duration::from_millis(200),
            jitter: 0.0,
            max_retries: 3,
        },
        session: SessionConfig {
            stall_window: Duration::from_secs(5),
            hard_timeout: Duration::from_secs(20),
            handoff_context_threshold: 0.70,
            shutdown_grace_period: Duration::from_millis(50),
            default_model: "default".to_string(),
        },
        verification: VerificationConfig {
            enabled: false,
            ..VerificationConfig::default()
        },
        logging: LoggingConfig::default(),
        telemetry: TelemetryConfig::default(),
        alerts: AlertConfig {
            dedup_window: Duration::from_millis(1),
        },
        preflight: PreflightConfig {
            allow_dirty_worktree: true,
            min_disk_free_bytes: 0,
            headless: true,
        },
    }
}

pub fn sample_feature(id: &str, priority: i64, acceptance: &[&str]) -> Feature {
    let mut f = Feature::new(id, format!("Feature {id}"), priority);
    f.description = format!("exercise {id} end to end");
    f.acceptance_criteria = acceptance.iter().map(|s| s.to_string()).collect();
    f
}

/// Build a one-feature backlog store rooted at `dir`, persisted immediately
/// so `HarnessContext::bootstrap` can load it back.
pub async fn single_feature_backlog(dir: &std::path::Path, feature: Feature) -> BacklogStore {
    let mut backlog = Backlog::new("demo-project", dir);
    backlog.features.push(feature);
    BacklogStore::init(dir.join("feature-list.json"), backlog)
        .await
        .expect("backlog inits")
}

pub async fn two_feature_backlog(dir: &std::path::Path, a: Feature, b: Feature) -> BacklogStore {
    let mut backlog = Backlog::new("demo-project", dir);
    backlog.features.push(a);
    backlog.features.push(b);
    BacklogStore::init(dir.join("feature-list.json"), backlog)
        .await
        .expect("backlog inits")
}

/// An in-memory VCS fake: always reports a dirty tree (so
/// `commit_if_dirty` always commits) and hands back incrementing fake
/// commit hashes, recording every commit made so tests can assert on it.
#[derive(Default)]
pub struct FakeVcs {
    commits: StdMutex<Vec<CommitSummary>>,
}

impl FakeVcs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn commits(&self) -> Vec<CommitSummary> {
        self.commits.lock().unwrap().clone()
    }
}

impl VcsAdapter for FakeVcs {
    fn status(&self) -> Result<RepoStatus, VcsError> {
        Ok(RepoStatus {
            clean: false,
            untracked_paths: vec!["src/lib.rs".to_string()],
        })
    }

    fn head_commit(&self) -> Result<Option<String>, VcsError> {
        Ok(self.commits.lock().unwrap().last().map(|c| c.hash.clone()))
    }

    fn commit_all(&self, message: &str) -> Result<String, VcsError> {
        let mut commits = self.commits.lock().unwrap();
        let hash = format!("{:08x}", commits.len() + 1);
        commits.push(CommitSummary {
            hash: hash.clone(),
            message: message.to_string(),
        });
        Ok(hash)
    }

    fn recent_commits(&self, n: usize) -> Result<Vec<CommitSummary>, VcsError> {
        let commits = self.commits.lock().unwrap();
        Ok(commits.iter().rev().take(n).cloned().collect())
    }

    fn reset(&self, _hash: &str, _hard: bool) -> Result<(), VcsError> {
        Ok(())
    }

    fn revert(&self, _hash: &str) -> Result<(), VcsError> {
        Ok(())
    }
}

/// A transport that replays the same scripted transcript on every call
/// (rather than `ScriptedTransport`'s single-use script), for scenarios
/// where every attempt should behave identically.
pub struct ConstantTransport {
    frames: Vec<TranscriptEvent>,
    exit: TransportExit,
}

impl ConstantTransport {
    pub fn new(frames: Vec<TranscriptEvent>, exit: TransportExit) -> Self {
        Self { frames, exit }
    }
}

#[async_trait]
impl AgentTransport for ConstantTransport {
    async fn run(
        &self,
        _request: &SessionRequest,
        sink: TranscriptSink,
        _shutdown: watch::Receiver<bool>,
    ) -> Result<TransportExit, TransportError> {
        for frame in self.frames.clone() {
            if sink.send(frame).await.is_err() {
                break;
            }
        }
        Ok(self.exit)
    }

    async fn health_check(&self) -> Result<(), TransportError> {
        Ok(())
    }
}

/// One step of a [`SequencedTransport`] script: either a transcript replay
/// or a hard transport-level failure (network error, etc).
pub enum Step {
    Frames(Vec<TranscriptEvent>),
    Error(String),
}

/// A transport that runs through a fixed queue of steps, one per call,
/// for scenarios where successive attempts behave differently (handoff
/// then success, transient failure then success).
pub struct SequencedTransport {
    steps: StdMutex<VecDeque<Step>>,
}

impl SequencedTransport {
    pub fn new(steps: Vec<Step>) -> Self {
        Self {
            steps: StdMutex::new(steps.into_iter().collect()),
        }
    }
}

#[async_trait]
impl AgentTransport for SequencedTransport {
    async fn run(
        &self,
        _request: &SessionRequest,
        sink: TranscriptSink,
        _shutdown: watch::Receiver<bool>,
    ) -> Result<TransportExit, TransportError> {
        let step = self.steps.lock().unwrap().pop_front();
        match step {
            Some(Step::Frames(frames)) => {
                for frame in frames {
                    if sink.send(frame).await.is_err() {
                        break;
                    }
                }
                Ok(TransportExit::default())
            }
            Some(Step::Error(message)) => Err(TransportError::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                message,
            ))),
            None => Ok(TransportExit::default()),
        }
    }

    async fn health_check(&self) -> Result<(), TransportError> {
        Ok(())
    }
}

/// Block a `main` test task until `predicate` is true or `timeout` elapses,
/// returning whether it was observed before timing out. Used to synchronize
/// with the scheduler's background loop without hardcoding sleeps.
pub async fn wait_until<F, Fut>(timeout: Duration, mut predicate: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if predicate().await {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
