//! Checkpoint Store (C7): scheduler-resumable state — the feature currently
//! in flight, its attempt number, the last good commit observed before the
//! attempt, and any partial handoff notes (spec §3, §4.7). Singleton per
//! project, overwritten atomically after every terminal session event.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;

use crate::util::write_atomic;

#[derive(Debug, Error, Diagnostic)]
pub enum CheckpointerError {
    #[error("failed to read checkpoint at {path}: {source}")]
    #[diagnostic(code(checkpoint::read))]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("checkpoint at {path} is not valid JSON: {source}")]
    #[diagnostic(code(checkpoint::parse))]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to write checkpoint: {0}")]
    #[diagnostic(code(checkpoint::write))]
    Write(#[source] std::io::Error),
}

/// Resumable scheduler state (spec §3's Checkpoint data model).
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct Checkpoint {
    pub feature_id: Option<String>,
    pub attempt: u32,
    pub last_good_commit: Option<String>,
    pub handoff_notes: Vec<String>,
    pub recorded_at: Option<DateTime<Utc>>,
}

impl Checkpoint {
    pub fn for_attempt(feature_id: impl Into<String>, attempt: u32, last_good_commit: Option<String>) -> Self {
        Self {
            feature_id: Some(feature_id.into()),
            attempt,
            last_good_commit,
            handoff_notes: Vec::new(),
            recorded_at: Some(Utc::now()),
        }
    }

    pub fn with_handoff_notes(mut self, notes: Vec<String>) -> Self {
        self.handoff_notes = notes;
        self
    }
}

/// Durable, single-writer handle to the on-disk checkpoint. Every write
/// goes through [`crate::util::write_atomic`] (spec §6: "atomically written
/// via temp-file-rename").
pub struct CheckpointStore {
    path: PathBuf,
    current: RwLock<Option<Checkpoint>>,
}

impl CheckpointStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            current: RwLock::new(None),
        }
    }

    /// Load the checkpoint from disk if present. A missing file is not an
    /// error — a fresh project simply starts with no checkpoint.
    pub async fn load(&self) -> Result<Option<Checkpoint>, CheckpointerError> {
        let loaded = match tokio::fs::read(&self.path).await {
            Ok(bytes) => {
                let checkpoint: Checkpoint =
                    serde_json::from_slice(&bytes).map_err(|source| CheckpointerError::Parse {
                        path: self.path.clone(),
                        source,
                    })?;
                Some(checkpoint)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(source) => {
                return Err(CheckpointerError::Read {
                    path: self.path.clone(),
                    source,
                });
            }
        };
        *self.current.write().await = loaded.clone();
        Ok(loaded)
    }

    /// Persist a new checkpoint, overwriting whatever was there.
    pub async fn save(&self, mut checkpoint: Checkpoint) -> Result<(), CheckpointerError> {
        checkpoint.recorded_at = Some(Utc::now());
        let bytes = serde_json::to_vec_pretty(&checkpoint).expect("Checkpoint always serializes");
        write_atomic(&self.path, &bytes)
            .await
            .map_err(CheckpointerError::Write)?;
        *self.current.write().await = Some(checkpoint);
        Ok(())
    }

    pub async fn current(&self) -> Option<Checkpoint> {
        self.current.read().await.clone()
    }

    /// The attempt number to resume at for `feature_id`: the checkpointed
    /// attempt if it names the same feature, else zero for a fresh start
    /// (spec §4.7: "reuses the attempt counter" only when resuming the same
    /// feature).
    pub async fn attempt_for(&self, feature_id: &str) -> u32 {
        match self.current.read().await.as_ref() {
            Some(cp) if cp.feature_id.as_deref() == Some(feature_id) => cp.attempt,
            _ => 0,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
