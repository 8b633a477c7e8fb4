//! Backlog Store (C1): the project's ordered feature set, persisted
//! atomically as a schema-validated JSON document (spec §3, §4.1).

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;

use crate::types::FeatureStatus;
use crate::util::write_atomic;

use super::feature::Feature;

#[derive(Debug, Error, Diagnostic)]
pub enum BacklogError {
    #[error("backlog document is not valid JSON: {0}")]
    #[diagnostic(code(backlog::parse))]
    Parse(#[from] serde_json::Error),

    #[error("backlog I/O error: {0}")]
    #[diagnostic(code(backlog::io))]
    Io(#[from] std::io::Error),

    #[error("duplicate feature id: {0}")]
    #[diagnostic(code(backlog::duplicate_id))]
    DuplicateId(String),

    #[error("feature {feature} depends on unknown feature {dependency}")]
    #[diagnostic(code(backlog::unresolved_dependency))]
    UnresolvedDependency { feature: String, dependency: String },

    #[error("dependency cycle detected involving feature {0}")]
    #[diagnostic(code(backlog::dependency_cycle))]
    DependencyCycle(String),

    #[error("unknown feature id: {0}")]
    #[diagnostic(code(backlog::unknown_feature))]
    UnknownFeature(String),

    #[error("invalid status transition for {feature}: {from} -> {to}")]
    #[diagnostic(code(backlog::invalid_transition))]
    InvalidTransition {
        feature: String,
        from: FeatureStatus,
        to: FeatureStatus,
    },

    #[error("sessions_spent may not decrease for {feature}")]
    #[diagnostic(code(backlog::sessions_spent_regressed))]
    SessionsSpentRegressed { feature: String },
}

fn current_schema_version() -> u32 {
    1
}

/// The project's ordered feature set plus project identity (spec §3).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Backlog {
    /// Document schema version, bumped whenever the on-disk shape changes so
    /// a future loader can migrate older backlog files instead of rejecting
    /// them outright.
    #[serde(default = "current_schema_version")]
    pub schema_version: u32,
    pub project_name: String,
    pub project_path: PathBuf,
    pub features: Vec<Feature>,
}

impl Default for Backlog {
    fn default() -> Self {
        Self {
            schema_version: current_schema_version(),
            project_name: String::new(),
            project_path: PathBuf::new(),
            features: Vec::new(),
        }
    }
}

impl Backlog {
    pub fn new(project_name: impl Into<String>, project_path: impl Into<PathBuf>) -> Self {
        Self {
            schema_version: current_schema_version(),
            project_name: project_name.into(),
            project_path: project_path.into(),
            features: Vec::new(),
        }
    }

    /// Validate the invariants from spec §3: unique ids, every dependency
    /// resolves, and no dependency cycles.
    pub fn validate(&self) -> Result<(), BacklogError> {
        let mut seen = HashSet::new();
        for f in &self.features {
            if !seen.insert(f.id.clone()) {
                return Err(BacklogError::DuplicateId(f.id.clone()));
            }
        }
        let by_id: HashMap<&str, &Feature> =
            self.features.iter().map(|f| (f.id.as_str(), f)).collect();
        for f in &self.features {
            for dep in &f.depends_on {
                if !by_id.contains_key(dep.as_str()) {
                    return Err(BacklogError::UnresolvedDependency {
                        feature: f.id.clone(),
                        dependency: dep.clone(),
                    });
                }
            }
        }
        for f in &self.features {
            detect_cycle(&f.id, &by_id, &mut HashSet::new(), &mut Vec::new())?;
        }
        Ok(())
    }

    fn completed_ids(&self) -> HashSet<String> {
        self.features
            .iter()
            .filter(|f| f.status == FeatureStatus::Completed)
            .map(|f| f.id.clone())
            .collect()
    }

    /// Select the next feature to run: among `pending`/`in_progress`
    /// features whose dependencies are all `completed`, `in_progress` wins
    /// over `pending` (continuity), then the highest priority, then
    /// insertion order (spec §4.1). `min_by_key` returns the *first*
    /// minimal element, so ranking as `(status_rank, -priority, index)` and
    /// taking the minimum gives a stable, fully-specified total order.
    pub fn select_next(&self) -> Option<&Feature> {
        let completed = self.completed_ids();
        self.features
            .iter()
            .enumerate()
            .filter(|(_, f)| matches!(f.status, FeatureStatus::Pending | FeatureStatus::InProgress))
            .filter(|(_, f)| !f.is_blocked_by_dependencies(&completed))
            .min_by_key(|(index, f)| {
                let status_rank = match f.status {
                    FeatureStatus::InProgress => 0,
                    _ => 1,
                };
                (status_rank, -f.priority, *index)
            })
            .map(|(_, f)| f)
    }

    pub fn feature_mut(&mut self, id: &str) -> Result<&mut Feature, BacklogError> {
        self.features
            .iter_mut()
            .find(|f| f.id == id)
            .ok_or_else(|| BacklogError::UnknownFeature(id.to_string()))
    }

    pub fn feature(&self, id: &str) -> Result<&Feature, BacklogError> {
        self.features
            .iter()
            .find(|f| f.id == id)
            .ok_or_else(|| BacklogError::UnknownFeature(id.to_string()))
    }

    /// Apply a status transition, enforcing that a completed feature's
    /// status never regresses.
    pub fn transition(&mut self, id: &str, to: FeatureStatus) -> Result<(), BacklogError> {
        let feature = self.feature_mut(id)?;
        if feature.status == FeatureStatus::Completed && to != FeatureStatus::Completed {
            return Err(BacklogError::InvalidTransition {
                feature: id.to_string(),
                from: feature.status,
                to,
            });
        }
        feature.status = to;
        Ok(())
    }

    /// Increment sessions_spent for a feature, enforcing the
    /// never-decreases invariant by construction (it only ever adds).
    pub fn record_session_spent(&mut self, id: &str) -> Result<(), BacklogError> {
        let feature = self.feature_mut(id)?;
        feature.sessions_spent += 1;
        Ok(())
    }

    pub fn all_completed(&self) -> bool {
        self.features
            .iter()
            .all(|f| matches!(f.status, FeatureStatus::Completed | FeatureStatus::Blocked))
    }

    /// Escape hatch bypassing the completed-never-regresses invariant,
    /// for operator-initiated corrections (spec's expanded data model:
    /// "force_reset_status"). Callers are expected to log and raise an
    /// alert around this; the store itself only applies the write.
    pub fn force_reset_status(&mut self, id: &str, new_status: FeatureStatus) -> Result<(), BacklogError> {
        let feature = self.feature_mut(id)?;
        feature.status = new_status;
        Ok(())
    }
}

fn detect_cycle(
    start: &str,
    by_id: &HashMap<&str, &Feature>,
    visiting: &mut HashSet<String>,
    stack: &mut Vec<String>,
) -> Result<(), BacklogError> {
    if stack.contains(&start.to_string()) {
        return Err(BacklogError::DependencyCycle(start.to_string()));
    }
    if visiting.contains(start) {
        return Ok(());
    }
    stack.push(start.to_string());
    if let Some(feature) = by_id.get(start) {
        for dep in &feature.depends_on {
            detect_cycle(dep, by_id, visiting, stack)?;
        }
    }
    stack.pop();
    visiting.insert(start.to_string());
    Ok(())
}

/// Owns the on-disk backlog document and serializes concurrent access
/// behind an async `RwLock`, matching the "Backlog is written only by the
/// Scheduler" ownership rule from spec §9.
pub struct BacklogStore {
    path: PathBuf,
    backlog: RwLock<Backlog>,
}

impl BacklogStore {
    /// Load an existing backlog document from `path`, validating it.
    pub async fn load(path: impl Into<PathBuf>) -> Result<Self, BacklogError> {
        let path = path.into();
        let bytes = tokio::fs::read(&path).await?;
        let backlog: Backlog = serde_json::from_slice(&bytes)?;
        backlog.validate()?;
        Ok(Self {
            path,
            backlog: RwLock::new(backlog),
        })
    }

    /// Create a new store backed by `backlog`, persisting it to `path`
    /// immediately so a fresh project has a backlog file on disk.
    pub async fn init(path: impl Into<PathBuf>, backlog: Backlog) -> Result<Self, BacklogError> {
        backlog.validate()?;
        let path = path.into();
        let store = Self {
            path,
            backlog: RwLock::new(backlog),
        };
        store.persist().await?;
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn persist(&self) -> Result<(), BacklogError> {
        let snapshot = self.backlog.read().await;
        let bytes = serde_json::to_vec_pretty(&*snapshot)?;
        write_atomic(&self.path, &bytes).await?;
        Ok(())
    }

    pub async fn snapshot(&self) -> Backlog {
        self.backlog.read().await.clone()
    }

    pub async fn select_next(&self) -> Option<Feature> {
        self.backlog.read().await.select_next().cloned()
    }

    pub async fn transition(&self, id: &str, to: FeatureStatus) -> Result<(), BacklogError> {
        {
            let mut guard = self.backlog.write().await;
            guard.transition(id, to)?;
        }
        self.persist().await
    }

    pub async fn record_session_spent(&self, id: &str) -> Result<(), BacklogError> {
        {
            let mut guard = self.backlog.write().await;
            guard.record_session_spent(id)?;
        }
        self.persist().await
    }

    pub async fn set_notes(&self, id: &str, note: impl AsRef<str>) -> Result<(), BacklogError> {
        {
            let mut guard = self.backlog.write().await;
            guard.feature_mut(id)?.append_note(note.as_ref());
        }
        self.persist().await
    }

    pub async fn all_completed(&self) -> bool {
        self.backlog.read().await.all_completed()
    }

    pub async fn feature(&self, id: &str) -> Result<Feature, BacklogError> {
        self.backlog.read().await.feature(id).cloned()
    }

    /// Force a feature's status without the normal transition guard,
    /// logging loudly since this bypasses the completed-never-regresses
    /// invariant. Callers (the scheduler's operator-triggered reset path)
    /// are responsible for also raising an `alert.backlog_reset` alert.
    pub async fn force_reset_status(&self, id: &str, new_status: FeatureStatus) -> Result<(), BacklogError> {
        {
            let mut guard = self.backlog.write().await;
            let previous = guard.feature(id)?.status;
            guard.force_reset_status(id, new_status)?;
            tracing::warn!(
                target: "ada_harness::backlog",
                feature = id,
                from = %previous,
                to = %new_status,
                "feature status force-reset, bypassing transition guard"
            );
        }
        self.persist().await
    }
}
