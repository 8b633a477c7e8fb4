//! Session Logger (C9): one JSONL file per session, a sibling `index.json`
//! summary, and size-capped archive rotation into dated `tar` bundles
//! (spec §4.9).

mod archive;
mod entry;
mod index;

pub use archive::rotate_if_oversized;
pub use entry::LogEvent;
pub use index::{SessionIndexEntry, SessionIndexEntryStatus};

use std::path::{Path, PathBuf};

use miette::Diagnostic;
use thiserror::Error;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::session::record::SessionRecord;

use index::SessionIndex;

#[derive(Debug, Error, Diagnostic)]
pub enum LoggerError {
    #[error("failed to open session log at {path}: {source}")]
    #[diagnostic(code(logger::open))]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write session log line: {0}")]
    #[diagnostic(code(logger::write))]
    Write(#[source] std::io::Error),

    #[error("failed to read/update session index: {0}")]
    #[diagnostic(code(logger::index))]
    Index(#[source] std::io::Error),

    #[error("session index entry for session {0} was not found")]
    #[diagnostic(code(logger::not_found))]
    NotFound(u64),

    #[error("archive rotation failed: {0}")]
    #[diagnostic(code(logger::archive))]
    Archive(#[source] std::io::Error),
}

/// An open handle to one session's JSONL file. Every event is appended and
/// flushed immediately (spec §4.9: "one event per line, flushed per line").
pub struct SessionLogHandle {
    file: Mutex<File>,
}

impl SessionLogHandle {
    async fn open(path: &Path) -> Result<Self, LoggerError> {
        let file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await
            .map_err(|source| LoggerError::Open {
                path: path.to_path_buf(),
                source,
            })?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }

    pub async fn log(&self, event: &LogEvent) -> Result<(), LoggerError> {
        let line = serde_json::to_string(event).expect("LogEvent always serializes");
        let mut file = self.file.lock().await;
        file.write_all(line.as_bytes())
            .await
            .map_err(LoggerError::Write)?;
        file.write_all(b"\n").await.map_err(LoggerError::Write)?;
        file.flush().await.map_err(LoggerError::Write)
    }
}

/// Owns the `.ada/logs/sessions/` directory: opens/appends per-session
/// JSONL files, keeps `index.json` in sync, and rotates the directory into
/// dated archive bundles once it exceeds the configured size cap.
pub struct SessionLogger {
    sessions_dir: PathBuf,
    index_path: PathBuf,
    archive_dir: PathBuf,
    archive_size_cap_bytes: u64,
    index: Mutex<SessionIndex>,
}

impl SessionLogger {
    pub async fn open(
        sessions_dir: impl Into<PathBuf>,
        index_path: impl Into<PathBuf>,
        archive_dir: impl Into<PathBuf>,
        archive_size_cap_bytes: u64,
    ) -> Result<Self, LoggerError> {
        let index_path = index_path.into();
        let index = SessionIndex::load(&index_path).await.map_err(LoggerError::Index)?;
        Ok(Self {
            sessions_dir: sessions_dir.into(),
            index_path,
            archive_dir: archive_dir.into(),
            archive_size_cap_bytes,
            index: Mutex::new(index),
        })
    }

    /// Open (creating if absent) the JSONL file for a new session and add
    /// its entry to the index.
    pub async fn start_session(&self, record: &SessionRecord) -> Result<SessionLogHandle, LoggerError> {
        let path = self.sessions_dir.join(&record.filename);
        let handle = SessionLogHandle::open(&path).await?;

        let mut index = self.index.lock().await;
        index.upsert(SessionIndexEntry::from_record(record, false));
        index.persist(&self.index_path).await.map_err(LoggerError::Index)?;
        Ok(handle)
    }

    /// Update the index entry for a finalized session, then rotate the
    /// sessions directory if it now exceeds the size cap.
    pub async fn finalize_session(&self, record: &SessionRecord) -> Result<(), LoggerError> {
        {
            let mut index = self.index.lock().await;
            index.upsert(SessionIndexEntry::from_record(record, false));
            index.persist(&self.index_path).await.map_err(LoggerError::Index)?;
        }

        let archived = rotate_if_oversized(&self.sessions_dir, &self.archive_dir, self.archive_size_cap_bytes)
            .await
            .map_err(LoggerError::Archive)?;
        if !archived.is_empty() {
            let mut index = self.index.lock().await;
            for filename in &archived {
                index.mark_archived(filename);
            }
            index.persist(&self.index_path).await.map_err(LoggerError::Index)?;
        }
        Ok(())
    }

    pub async fn list(&self) -> Vec<SessionIndexEntry> {
        self.index.lock().await.entries().to_vec()
    }

    pub async fn entry(&self, session_id: u64) -> Option<SessionIndexEntry> {
        self.index
            .lock()
            .await
            .entries()
            .iter()
            .find(|e| e.session_id == session_id)
            .cloned()
    }

    /// Load every logged line of a session's JSONL file, in order.
    pub async fn load(&self, session_id: u64) -> Result<Vec<LogEvent>, LoggerError> {
        let entry = self
            .entry(session_id)
            .await
            .ok_or(LoggerError::NotFound(session_id))?;
        let path = self.sessions_dir.join(&entry.filename);
        let contents = tokio::fs::read_to_string(&path).await.map_err(|source| LoggerError::Open {
            path: path.clone(),
            source,
        })?;
        Ok(contents
            .lines()
            .filter(|l| !l.trim().is_empty())
            .filter_map(|l| serde_json::from_str(l).ok())
            .collect())
    }

    /// Stream the last `n` lines of a session's JSONL file.
    pub async fn stream_tail(&self, session_id: u64, n: usize) -> Result<Vec<LogEvent>, LoggerError> {
        let all = self.load(session_id).await?;
        let start = all.len().saturating_sub(n);
        Ok(all[start..].to_vec())
    }

    pub fn sessions_dir(&self) -> &Path {
        &self.sessions_dir
    }
}
