//! Project identity document (`.ada/project.json`): the stable facts about
//! a project that outlive any single backlog document — when the harness
//! was first initialized here, and which schema generation it was seeded
//! with. Separate from the backlog itself so re-running the initializer
//! agent doesn't clobber this history.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::util::write_atomic;

#[derive(Debug, Error, Diagnostic)]
pub enum ProjectIdentityError {
    #[error("failed to read project identity at {path}: {source}")]
    #[diagnostic(code(project::read))]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("project identity at {path} is not valid JSON: {source}")]
    #[diagnostic(code(project::parse))]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to write project identity: {0}")]
    #[diagnostic(code(project::write))]
    Write(#[source] std::io::Error),
}

/// Stable per-project identity, written once at init and read thereafter.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ProjectIdentity {
    pub project_name: String,
    pub initialized_at: DateTime<Utc>,
    /// The backlog schema generation this project was initialized under
    /// (distinct from `Backlog::schema_version`, which tracks the document
    /// shape rather than the project's lineage).
    pub schema_generation: u32,
}

impl ProjectIdentity {
    pub fn new(project_name: impl Into<String>) -> Self {
        Self {
            project_name: project_name.into(),
            initialized_at: Utc::now(),
            schema_generation: 1,
        }
    }

    pub async fn load(path: &Path) -> Result<Option<Self>, ProjectIdentityError> {
        match tokio::fs::read(path).await {
            Ok(bytes) => {
                let identity = serde_json::from_slice(&bytes).map_err(|source| {
                    ProjectIdentityError::Parse {
                        path: path.to_path_buf(),
                        source,
                    }
                })?;
                Ok(Some(identity))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(ProjectIdentityError::Read {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    pub async fn save(&self, path: &Path) -> Result<(), ProjectIdentityError> {
        let bytes = serde_json::to_vec_pretty(self).expect("ProjectIdentity always serializes");
        write_atomic(path, &bytes)
            .await
            .map_err(ProjectIdentityError::Write)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn round_trips_through_disk() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("project.json");
        let identity = ProjectIdentity::new("demo");
        identity.save(&path).await.unwrap();

        let reloaded = ProjectIdentity::load(&path).await.unwrap().unwrap();
        assert_eq!(reloaded.project_name, "demo");
        assert_eq!(reloaded.schema_generation, 1);
    }

    #[tokio::test]
    async fn missing_file_loads_as_none() {
        let dir = tempdir().unwrap();
        assert!(ProjectIdentity::load(&dir.path().join("nope.json"))
            .await
            .unwrap()
            .is_none());
    }
}
