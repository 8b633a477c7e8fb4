//! Feature: one unit of work in the backlog (spec §3).

use serde::{Deserialize, Serialize};

use crate::types::{FeatureCategory, FeatureStatus};

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Feature {
    pub id: String,
    pub name: String,
    pub description: String,
    pub category: FeatureCategory,
    pub priority: i64,
    pub status: FeatureStatus,
    pub acceptance_criteria: Vec<String>,
    #[serde(default)]
    pub depends_on: Vec<String>,
    #[serde(default)]
    pub sessions_spent: u32,
    #[serde(default)]
    pub model_override: Option<String>,
    #[serde(default)]
    pub implementation_notes: Vec<String>,
}

impl Feature {
    pub fn new(id: impl Into<String>, name: impl Into<String>, priority: i64) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            category: FeatureCategory::Functional,
            priority,
            status: FeatureStatus::Pending,
            acceptance_criteria: Vec::new(),
            depends_on: Vec::new(),
            sessions_spent: 0,
            model_override: None,
            implementation_notes: Vec::new(),
        }
    }

    pub fn is_blocked_by_dependencies(&self, completed_ids: &std::collections::HashSet<String>) -> bool {
        self.depends_on
            .iter()
            .any(|dep| !completed_ids.contains(dep))
    }

    /// Append a line to this feature's implementation notes, preserving
    /// whatever was already recorded (e.g. prior retry failure messages).
    pub fn append_note(&mut self, note: impl Into<String>) {
        self.implementation_notes.push(note.into());
    }
}
