//! Alert Store (C13): durable, deduplicated notifications surfaced through
//! the dashboard's `/api/alerts` family and pushed live on the event bus
//! (spec §3, §7). Every alert is also published as `HarnessEvent::AlertCreated`
//! so a connected dashboard sees it without polling.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::event_bus::{EventEmitter, HarnessEvent};
use crate::types::AlertSeverity;
use crate::util::write_atomic;

#[derive(Debug, Error, Diagnostic)]
pub enum AlertStoreError {
    #[error("failed to read alert store at {path}: {source}")]
    #[diagnostic(code(alerts::read))]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("alert store at {path} is not valid JSON: {source}")]
    #[diagnostic(code(alerts::parse))]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to write alert store: {0}")]
    #[diagnostic(code(alerts::write))]
    Write(#[source] std::io::Error),
}

/// One persisted alert (spec §3's Alert attributes).
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Alert {
    pub id: Uuid,
    pub severity: AlertSeverity,
    pub title: String,
    pub message: String,
    /// Template name the alert was raised from (spec §7's alert templates,
    /// e.g. `"retry_exhausted"`, `"verification_failed"`, `"backlog_reset"`).
    pub alert_type: String,
    pub created_at: DateTime<Utc>,
    pub feature_id: Option<String>,
    pub session_id: Option<u64>,
    pub read: bool,
    pub dismissed: bool,
    /// Fingerprint used to collapse repeats of the same alert within the
    /// dedup window instead of spamming the dashboard.
    pub dedup_key: String,
}

impl Alert {
    fn dedup_key(alert_type: &str, feature_id: Option<&str>, message: &str) -> String {
        format!("{alert_type}:{}:{message}", feature_id.unwrap_or(""))
    }
}

/// A new alert before it has been assigned an id or timestamp.
#[derive(Clone, Debug)]
pub struct NewAlert {
    pub severity: AlertSeverity,
    pub title: String,
    pub message: String,
    pub alert_type: String,
    pub feature_id: Option<String>,
    pub session_id: Option<u64>,
}

#[derive(Default, Serialize, Deserialize)]
struct AlertDocument {
    alerts: Vec<Alert>,
}

/// Durable, single-writer handle to the on-disk alert log, deduplicating
/// raises that repeat within `dedup_window` and mirroring every accepted
/// alert onto the event bus.
pub struct AlertStore {
    path: PathBuf,
    dedup_window: Duration,
    alerts: RwLock<Vec<Alert>>,
    /// Last time each dedup key was raised, so a burst of identical failures
    /// collapses into one dashboard entry (spec §7).
    last_raised: RwLock<HashMap<String, DateTime<Utc>>>,
    emitter: std::sync::Arc<dyn EventEmitter>,
}

impl AlertStore {
    pub fn new(
        path: impl Into<PathBuf>,
        dedup_window: Duration,
        emitter: std::sync::Arc<dyn EventEmitter>,
    ) -> Self {
        Self {
            path: path.into(),
            dedup_window,
            alerts: RwLock::new(Vec::new()),
            last_raised: RwLock::new(HashMap::new()),
            emitter,
        }
    }

    /// Load alerts from disk, if present. A missing file starts empty.
    pub async fn load(&self) -> Result<(), AlertStoreError> {
        let loaded = match tokio::fs::read(&self.path).await {
            Ok(bytes) => {
                let doc: AlertDocument =
                    serde_json::from_slice(&bytes).map_err(|source| AlertStoreError::Parse {
                        path: self.path.clone(),
                        source,
                    })?;
                doc.alerts
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(source) => {
                return Err(AlertStoreError::Read {
                    path: self.path.clone(),
                    source,
                });
            }
        };
        let mut last_raised = self.last_raised.write().await;
        for alert in &loaded {
            last_raised.insert(alert.dedup_key.clone(), alert.created_at);
        }
        drop(last_raised);
        *self.alerts.write().await = loaded;
        Ok(())
    }

    /// Raise a new alert, unless an identical one was already raised within
    /// the dedup window, in which case it is silently swallowed. Returns the
    /// persisted alert when one was actually created.
    pub async fn raise(&self, new_alert: NewAlert) -> Result<Option<Alert>, AlertStoreError> {
        let dedup_key = Alert::dedup_key(
            &new_alert.alert_type,
            new_alert.feature_id.as_deref(),
            &new_alert.message,
        );
        let now = Utc::now();
        {
            let last_raised = self.last_raised.read().await;
            if let Some(last) = last_raised.get(&dedup_key) {
                let elapsed = (now - *last).to_std().unwrap_or(Duration::ZERO);
                if elapsed < self.dedup_window {
                    return Ok(None);
                }
            }
        }

        let alert = Alert {
            id: Uuid::new_v4(),
            severity: new_alert.severity,
            title: new_alert.title,
            message: new_alert.message,
            alert_type: new_alert.alert_type,
            created_at: now,
            feature_id: new_alert.feature_id,
            session_id: new_alert.session_id,
            read: false,
            dismissed: false,
            dedup_key: dedup_key.clone(),
        };

        self.last_raised.write().await.insert(dedup_key, now);
        self.alerts.write().await.push(alert.clone());
        self.persist().await?;

        let _ = self.emitter.emit(HarnessEvent::AlertCreated {
            alert_id: alert.id,
            severity: alert.severity.to_string(),
            title: alert.title.clone(),
        });

        Ok(Some(alert))
    }

    /// Alerts in reverse-chronological order, optionally limited to unread
    /// and non-dismissed entries.
    pub async fn list(&self, include_dismissed: bool) -> Vec<Alert> {
        let alerts = self.alerts.read().await;
        let mut out: Vec<Alert> = alerts
            .iter()
            .filter(|a| include_dismissed || !a.dismissed)
            .cloned()
            .collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        out
    }

    pub async fn unread_count(&self) -> usize {
        self.alerts
            .read()
            .await
            .iter()
            .filter(|a| !a.read && !a.dismissed)
            .count()
    }

    pub async fn mark_read(&self, id: Uuid) -> Result<bool, AlertStoreError> {
        let found = {
            let mut alerts = self.alerts.write().await;
            match alerts.iter_mut().find(|a| a.id == id) {
                Some(alert) => {
                    alert.read = true;
                    true
                }
                None => false,
            }
        };
        if found {
            self.persist().await?;
        }
        Ok(found)
    }

    pub async fn mark_all_read(&self) -> Result<(), AlertStoreError> {
        {
            let mut alerts = self.alerts.write().await;
            for alert in alerts.iter_mut() {
                alert.read = true;
            }
        }
        self.persist().await
    }

    pub async fn dismiss(&self, id: Uuid) -> Result<bool, AlertStoreError> {
        let found = {
            let mut alerts = self.alerts.write().await;
            match alerts.iter_mut().find(|a| a.id == id) {
                Some(alert) => {
                    alert.dismissed = true;
                    true
                }
                None => false,
            }
        };
        if found {
            self.persist().await?;
        }
        Ok(found)
    }

    async fn persist(&self) -> Result<(), AlertStoreError> {
        let doc = AlertDocument {
            alerts: self.alerts.read().await.clone(),
        };
        let bytes = serde_json::to_vec_pretty(&doc).expect("AlertDocument always serializes");
        write_atomic(&self.path, &bytes)
            .await
            .map_err(AlertStoreError::Write)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_bus::EventBus;
    use tempfile::tempdir;

    fn emitter() -> std::sync::Arc<dyn EventEmitter> {
        EventBus::default().get_emitter()
    }

    fn sample(message: &str) -> NewAlert {
        NewAlert {
            severity: AlertSeverity::Error,
            title: "Retries exhausted".into(),
            message: message.into(),
            alert_type: "retry_exhausted".into(),
            feature_id: Some("feat-1".into()),
            session_id: Some(7),
        }
    }

    #[tokio::test]
    async fn raises_and_persists() {
        let dir = tempdir().unwrap();
        let store = AlertStore::new(dir.path().join("alerts.json"), Duration::from_secs(60), emitter());
        let raised = store.raise(sample("boom")).await.unwrap();
        assert!(raised.is_some());
        assert_eq!(store.unread_count().await, 1);

        let reloaded = AlertStore::new(dir.path().join("alerts.json"), Duration::from_secs(60), emitter());
        reloaded.load().await.unwrap();
        assert_eq!(reloaded.list(true).await.len(), 1);
    }

    #[tokio::test]
    async fn deduplicates_within_window() {
        let dir = tempdir().unwrap();
        let store = AlertStore::new(dir.path().join("alerts.json"), Duration::from_secs(300), emitter());
        assert!(store.raise(sample("boom")).await.unwrap().is_some());
        assert!(store.raise(sample("boom")).await.unwrap().is_none());
        assert_eq!(store.list(true).await.len(), 1);
    }

    #[tokio::test]
    async fn distinct_messages_are_not_deduplicated() {
        let dir = tempdir().unwrap();
        let store = AlertStore::new(dir.path().join("alerts.json"), Duration::from_secs(300), emitter());
        assert!(store.raise(sample("boom")).await.unwrap().is_some());
        assert!(store.raise(sample("crash")).await.unwrap().is_some());
        assert_eq!(store.list(true).await.len(), 2);
    }

    #[tokio::test]
    async fn mark_read_and_dismiss() {
        let dir = tempdir().unwrap();
        let store = AlertStore::new(dir.path().join("alerts.json"), Duration::from_secs(60), emitter());
        let alert = store.raise(sample("boom")).await.unwrap().unwrap();

        assert!(store.mark_read(alert.id).await.unwrap());
        assert_eq!(store.unread_count().await, 0);

        assert!(store.dismiss(alert.id).await.unwrap());
        assert!(store.list(false).await.is_empty());
        assert_eq!(store.list(true).await.len(), 1);
    }

    #[tokio::test]
    async fn mark_read_unknown_id_returns_false() {
        let dir = tempdir().unwrap();
        let store = AlertStore::new(dir.path().join("alerts.json"), Duration::from_secs(60), emitter());
        assert!(!store.mark_read(Uuid::new_v4()).await.unwrap());
    }
}
