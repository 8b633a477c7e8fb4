//! Agent transports: two interchangeable ways to drive the underlying
//! coding agent (spec §4.4, §9: "Two transports... swappable without
//! touching the scheduler"). `SubprocessTransport` spawns the agent binary
//! and reads newline-delimited JSON transcript frames from its stdout;
//! `StreamingApiTransport` consumes an SSE/HTTP stream instead, mirroring
//! the teacher lineage's `demo7_axum_sse` client-side pattern in reverse.

use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use futures_util::StreamExt;
use miette::Diagnostic;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::watch;

use super::transcript::{TranscriptEvent, TranscriptSink};

#[derive(Debug, Error, Diagnostic)]
pub enum TransportError {
    #[error("failed to spawn agent process: {0}")]
    #[diagnostic(code(transport::spawn))]
    Spawn(std::io::Error),

    #[error("agent process I/O error: {0}")]
    #[diagnostic(code(transport::io))]
    Io(#[from] std::io::Error),

    #[error("agent transcript frame was not valid JSON: {0}")]
    #[diagnostic(code(transport::parse))]
    Parse(#[from] serde_json::Error),

    #[error("streaming API request failed: {0}")]
    #[diagnostic(code(transport::http))]
    Http(#[from] reqwest::Error),
}

/// One request to run a session: the feature being worked (`None` for the
/// initializer), the rendered prompt, and the model to use.
#[derive(Clone, Debug)]
pub struct SessionRequest {
    pub feature_id: Option<String>,
    pub prompt: String,
    pub model: String,
}

/// What the transport observed when the underlying process/stream ended,
/// independent of any transcript-level completion signal.
#[derive(Clone, Copy, Debug, Default)]
pub struct TransportExit {
    pub exit_code: Option<i32>,
}

/// Capability surface the Session Runtime depends on (spec §9's "classes
/// with behavior become narrow interfaces"). The runtime only ever holds a
/// `dyn AgentTransport`, so tests substitute a scripted fake transport.
#[async_trait]
pub trait AgentTransport: Send + Sync {
    /// Drive one session, forwarding every transcript frame into `sink` as
    /// it arrives. `shutdown` is polled cooperatively between frames so the
    /// scheduler's graceful shutdown can interrupt a running session
    /// between indivisible steps (spec §5).
    async fn run(
        &self,
        request: &SessionRequest,
        sink: TranscriptSink,
        shutdown: watch::Receiver<bool>,
    ) -> Result<TransportExit, TransportError>;

    /// Cheap reachability check used by preflight (spec §4.11: "the agent
    /// binary/transport is reachable"). Does not run a session.
    async fn health_check(&self) -> Result<(), TransportError>;
}

/// Spawns the agent binary as a child process, piping stdout as
/// newline-delimited JSON transcript frames (spec §4.4).
pub struct SubprocessTransport {
    binary: PathBuf,
    extra_args: Vec<String>,
}

impl SubprocessTransport {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            extra_args: Vec::new(),
        }
    }

    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.extra_args = args;
        self
    }
}

#[async_trait]
impl AgentTransport for SubprocessTransport {
    async fn run(
        &self,
        request: &SessionRequest,
        sink: TranscriptSink,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<TransportExit, TransportError> {
        let mut command = Command::new(&self.binary);
        command
            .args(&self.extra_args)
            .arg("--model")
            .arg(&request.model)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(feature_id) = &request.feature_id {
            command.arg("--feature").arg(feature_id);
        }

        let mut child = command.spawn().map_err(TransportError::Spawn)?;

        {
            use tokio::io::AsyncWriteExt;
            if let Some(mut stdin) = child.stdin.take() {
                stdin.write_all(request.prompt.as_bytes()).await?;
                stdin.shutdown().await?;
            }
        }

        let stdout = child.stdout.take().expect("piped stdout");
        let mut lines = BufReader::new(stdout).lines();

        loop {
            tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_ok() && *shutdown.borrow() {
                        let _ = child.start_kill();
                        break;
                    }
                }
                line = lines.next_line() => {
                    match line? {
                        Some(line) if line.trim().is_empty() => continue,
                        Some(line) => {
                            let event: TranscriptEvent = serde_json::from_str(&line)?;
                            if sink.send(event).await.is_err() {
                                break;
                            }
                        }
                        None => break,
                    }
                }
            }
        }

        let status = child.wait().await?;
        Ok(TransportExit {
            exit_code: status.code(),
        })
    }

    async fn health_check(&self) -> Result<(), TransportError> {
        if which::which(&self.binary).is_ok() || self.binary.is_file() {
            Ok(())
        } else {
            Err(TransportError::Spawn(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("agent binary {:?} not found on PATH", self.binary),
            )))
        }
    }
}

/// Consumes a streaming HTTP API (SSE-framed) as the transcript source,
/// for coding agents exposed as a service rather than a local binary.
pub struct StreamingApiTransport {
    endpoint: String,
    client: reqwest::Client,
}

impl StreamingApiTransport {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl AgentTransport for StreamingApiTransport {
    async fn run(
        &self,
        request: &SessionRequest,
        sink: TranscriptSink,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<TransportExit, TransportError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&serde_json::json!({
                "feature_id": request.feature_id,
                "prompt": request.prompt,
                "model": request.model,
            }))
            .send()
            .await?
            .error_for_status()?;

        let mut byte_stream = response.bytes_stream();
        let mut buf = String::new();

        loop {
            tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_ok() && *shutdown.borrow() {
                        break;
                    }
                }
                chunk = byte_stream.next() => {
                    match chunk {
                        Some(chunk) => {
                            let chunk = chunk?;
                            buf.push_str(&String::from_utf8_lossy(&chunk));
                            while let Some(idx) = buf.find('\n') {
                                let line = buf[..idx].trim().to_string();
                                buf = buf[idx + 1..].to_string();
                                let payload = line.strip_prefix("data: ").unwrap_or(&line);
                                if payload.is_empty() {
                                    continue;
                                }
                                let event: TranscriptEvent = serde_json::from_str(payload)?;
                                if sink.send(event).await.is_err() {
                                    return Ok(TransportExit { exit_code: Some(0) });
                                }
                            }
                        }
                        None => break,
                    }
                }
            }
        }

        Ok(TransportExit { exit_code: Some(0) })
    }

    async fn health_check(&self) -> Result<(), TransportError> {
        // Any response at all (including a non-2xx status) means the
        // endpoint is reachable; only a connection-level failure should
        // fail preflight.
        self.client.head(&self.endpoint).send().await?;
        Ok(())
    }
}

/// A scripted transport used by tests to drive the runtime's terminal
/// condition logic without spawning a real process or HTTP server.
pub struct ScriptedTransport {
    frames: std::sync::Mutex<Vec<TranscriptEvent>>,
    exit: TransportExit,
    frame_delay: Option<std::time::Duration>,
}

impl ScriptedTransport {
    pub fn new(frames: Vec<TranscriptEvent>, exit: TransportExit) -> Self {
        Self {
            frames: std::sync::Mutex::new(frames),
            exit,
            frame_delay: None,
        }
    }

    pub fn with_frame_delay(mut self, delay: std::time::Duration) -> Self {
        self.frame_delay = Some(delay);
        self
    }
}

#[async_trait]
impl AgentTransport for ScriptedTransport {
    async fn run(
        &self,
        _request: &SessionRequest,
        sink: TranscriptSink,
        _shutdown: watch::Receiver<bool>,
    ) -> Result<TransportExit, TransportError> {
        let frames = std::mem::take(&mut *self.frames.lock().unwrap());
        for frame in frames {
            if let Some(delay) = self.frame_delay {
                tokio::time::sleep(delay).await;
            }
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
