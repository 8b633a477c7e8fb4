//! Progress Log (C2): an append-only, human-readable text stream (spec §3,
//! §4.2). Three entry shapes: session start, session end, handoff. Reads
//! support "last N lines" (dashboard) and "last K kilobytes" (agent
//! priming). Truncation is never automatic.

use std::path::{Path, PathBuf};

use chrono::Utc;
use miette::Diagnostic;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::Mutex;

#[derive(Debug, Error, Diagnostic)]
pub enum ProgressLogError {
    #[error("progress log I/O error: {0}")]
    #[diagnostic(code(progress_log::io))]
    Io(#[from] std::io::Error),
}

/// A single timestamped block appended to the log.
#[derive(Clone, Debug)]
pub enum ProgressEntry {
    SessionStart {
        session_id: u64,
        feature_id: Option<String>,
    },
    SessionEnd {
        session_id: u64,
        feature_id: Option<String>,
        outcome: String,
    },
    Handoff {
        session_id: u64,
        feature_id: Option<String>,
        notes: String,
    },
}

impl ProgressEntry {
    fn render(&self, at: chrono::DateTime<Utc>) -> String {
        let ts = at.to_rfc3339();
        match self {
            ProgressEntry::SessionStart {
                session_id,
                feature_id,
            } => format!(
                "## [{ts}] session {session_id} start ({})\n\n",
                feature_id.as_deref().unwrap_or("<initializer>")
            ),
            ProgressEntry::SessionEnd {
                session_id,
                feature_id,
                outcome,
            } => format!(
                "## [{ts}] session {session_id} end ({}) — {outcome}\n\n",
                feature_id.as_deref().unwrap_or("<initializer>")
            ),
            ProgressEntry::Handoff {
                session_id,
                feature_id,
                notes,
            } => format!(
                "## [{ts}] session {session_id} handoff ({})\n\n{notes}\n\n",
                feature_id.as_deref().unwrap_or("<initializer>")
            ),
        }
    }
}

/// Exclusive appender for the progress log, handed to the Session Runtime
/// during handoff so it can append without taking write ownership of the
/// rest of the project state (spec §9's shared-resource policy).
#[derive(Clone)]
pub struct ProgressLog {
    path: PathBuf,
    write_lock: std::sync::Arc<Mutex<()>>,
}

impl ProgressLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: std::sync::Arc::new(Mutex::new(())),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn append(&self, entry: ProgressEntry) -> Result<(), ProgressLogError> {
        let _guard = self.write_lock.lock().await;
        let rendered = entry.render(Utc::now());
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(rendered.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }

    /// Return the last `n` lines of the log, for the dashboard.
    pub async fn tail_lines(&self, n: usize) -> Result<Vec<String>, ProgressLogError> {
        let lines = self.read_all_lines().await?;
        let start = lines.len().saturating_sub(n);
        Ok(lines[start..].to_vec())
    }

    /// A paged window over the last `n` lines, skipping `offset` lines back
    /// from the end first (spec §6's `/api/progress?lines,offset`).
    pub async fn lines_window(&self, n: usize, offset: usize) -> Result<Vec<String>, ProgressLogError> {
        let lines = self.read_all_lines().await?;
        let end = lines.len().saturating_sub(offset);
        let start = end.saturating_sub(n);
        Ok(lines[start..end].to_vec())
    }

    /// The entire progress log, unmodified (spec §6's `/api/progress/full`).
    pub async fn read_full(&self) -> Result<String, ProgressLogError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => Ok(contents),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(String::new()),
            Err(e) => Err(e.into()),
        }
    }

    /// Return the last `kb` kilobytes of the log, for agent context
    /// priming, splitting on a line boundary so the result is always valid
    /// text rather than a mid-line byte cut.
    pub async fn tail_kilobytes(&self, kb: u64) -> Result<String, ProgressLogError> {
        let data = match tokio::fs::read(&self.path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(String::new()),
            Err(e) => return Err(e.into()),
        };
        let cap = (kb * 1024) as usize;
        if data.len() <= cap {
            return Ok(String::from_utf8_lossy(&data).into_owned());
        }
        let tail = &data[data.len() - cap..];
        let text = String::from_utf8_lossy(tail);
        match text.find('\n') {
            Some(idx) => Ok(text[idx + 1..].to_string()),
            None => Ok(text.into_owned()),
        }
    }

    async fn read_all_lines(&self) -> Result<Vec<String>, ProgressLogError> {
        let file = match tokio::fs::File::open(&self.path).await {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut lines = Vec::new();
        let mut reader = BufReader::new(file).lines();
        while let Some(line) = reader.next_line().await? {
            lines.push(line);
        }
        Ok(lines)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn append_is_never_edited_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let log = ProgressLog::new(dir.path().join("progress.md"));
        log.append(ProgressEntry::SessionStart {
            session_id: 1,
            feature_id: Some("f1".into()),
        })
        .await
        .unwrap();
        log.append(ProgressEntry::SessionEnd {
            session_id: 1,
            feature_id: Some("f1".into()),
            outcome: "success".into(),
        })
        .await
        .unwrap();
        let contents = tokio::fs::read_to_string(log.path()).await.unwrap();
        assert!(contents.contains("session 1 start"));
        assert!(contents.contains("session 1 end"));
    }

    #[tokio::test]
    async fn tail_lines_returns_suffix() {
        let dir = tempfile::tempdir().unwrap();
        let log = ProgressLog::new(dir.path().join("progress.md"));
        for i in 0..5 {
            log.append(ProgressEntry::SessionStart {
                session_id: i,
                feature_id: None,
            })
            .await
            .unwrap();
        }
        let tail = log.tail_lines(4).await.unwrap();
        assert!(tail.iter().any(|l| l.contains("session 4 start")));
        assert!(!tail.iter().any(|l| l.contains("session 0 start")));
    }

    #[tokio::test]
    async fn tail_kilobytes_on_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let log = ProgressLog::new(dir.path().join("missing.md"));
        assert_eq!(log.tail_kilobytes(1).await.unwrap(), "");
    }
}
