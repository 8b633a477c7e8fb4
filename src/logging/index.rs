//! `index.json`: one summary entry per session, kept in sync with the
//! per-session JSONL files (spec §4.9).

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::session::record::{SessionRecord, TokenUsage};
use crate::types::{AgentKind, SessionOutcome};
use crate::util::write_atomic;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionIndexEntryStatus {
    Active,
    Archived,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct SessionIndexEntry {
    pub session_id: u64,
    pub filename: String,
    pub agent_kind: AgentKind,
    pub feature_id: Option<String>,
    pub model: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub outcome: Option<SessionOutcome>,
    pub turns: u32,
    pub usage: TokenUsage,
    pub cost_usd: f64,
    pub status: SessionIndexEntryStatus,
}

impl SessionIndexEntry {
    pub fn from_record(record: &SessionRecord, archived: bool) -> Self {
        Self {
            session_id: record.session_id,
            filename: record.filename.clone(),
            agent_kind: record.agent_kind,
            feature_id: record.feature_id.clone(),
            model: record.model.clone(),
            started_at: record.started_at,
            ended_at: record.ended_at,
            outcome: record.outcome,
            turns: record.turns,
            usage: record.usage,
            cost_usd: record.cost_usd,
            status: if archived {
                SessionIndexEntryStatus::Archived
            } else {
                SessionIndexEntryStatus::Active
            },
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SessionIndex {
    entries: Vec<SessionIndexEntry>,
}

impl SessionIndex {
    pub async fn load(path: &Path) -> std::io::Result<Self> {
        match tokio::fs::read(path).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes).unwrap_or_default()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e),
        }
    }

    pub async fn persist(&self, path: &Path) -> std::io::Result<()> {
        let bytes = serde_json::to_vec_pretty(self).expect("SessionIndex always serializes");
        write_atomic(path, &bytes).await
    }

    pub fn upsert(&mut self, entry: SessionIndexEntry) {
        match self.entries.iter_mut().find(|e| e.session_id == entry.session_id) {
            Some(existing) => *existing = entry,
            None => self.entries.push(entry),
        }
    }

    pub fn mark_archived(&mut self, filename: &str) {
        if let Some(entry) = self.entries.iter_mut().find(|e| e.filename == filename) {
            entry.status = SessionIndexEntryStatus::Archived;
        }
    }

    pub fn entries(&self) -> &[SessionIndexEntry] {
        &self.entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn entry(id: u64, filename: &str) -> SessionIndexEntry {
        SessionIndexEntry {
            session_id: id,
            filename: filename.to_string(),
            agent_kind: AgentKind::Coding,
            feature_id: Some("f1".into()),
            model: "claude-sonnet".into(),
            started_at: Utc::now(),
            ended_at: None,
            outcome: None,
            turns: 0,
            usage: TokenUsage::default(),
            cost_usd: 0.0,
            status: SessionIndexEntryStatus::Active,
        }
    }

    #[tokio::test]
    async fn persists_and_reloads() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("index.json");
        let mut index = SessionIndex::default();
        index.upsert(entry(1, "session-1.jsonl"));
        index.persist(&path).await.unwrap();

        let reloaded = SessionIndex::load(&path).await.unwrap();
        assert_eq!(reloaded.entries().len(), 1);
        assert_eq!(reloaded.entries()[0].session_id, 1);
    }

    #[test]
    fn upsert_replaces_existing_entry() {
        let mut index = SessionIndex::default();
        index.upsert(entry(1, "session-1.jsonl"));
        let mut updated = entry(1, "session-1.jsonl");
        updated.turns = 5;
        index.upsert(updated);
        assert_eq!(index.entries().len(), 1);
        assert_eq!(index.entries()[0].turns, 5);
    }

    #[test]
    fn mark_archived_flips_status() {
        let mut index = SessionIndex::default();
        index.upsert(entry(1, "session-1.jsonl"));
        index.mark_archived("session-1.jsonl");
        assert_eq!(index.entries()[0].status, SessionIndexEntryStatus::Archived);
    }
}
