//! VCS Adapter (C3): a narrow capability surface over the project's git
//! repository (spec §4.4). All operations are synchronous from the
//! scheduler's point of view — git2 itself is blocking, so callers run it
//! through `spawn_blocking` where called from async contexts.

pub mod git_adapter;

use miette::Diagnostic;
use thiserror::Error;

pub use git_adapter::GitAdapter;

#[derive(Debug, Error, Diagnostic)]
pub enum VcsError {
    #[error("git error: {0}")]
    #[diagnostic(code(vcs::git))]
    Git(#[from] git2::Error),

    #[error("repository has no commits yet")]
    #[diagnostic(code(vcs::no_head))]
    NoHead,

    #[error("nothing to commit")]
    #[diagnostic(code(vcs::nothing_to_commit))]
    NothingToCommit,
}

/// Working-tree cleanliness as reported by [`VcsAdapter::status`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RepoStatus {
    pub clean: bool,
    pub untracked_paths: Vec<String>,
}

/// A single commit summary as returned by [`VcsAdapter::recent_commits`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommitSummary {
    pub hash: String,
    pub message: String,
}

/// Capability surface the Scheduler depends on (spec §9's "classes with
/// behavior become narrow interfaces"). `GitAdapter` is the only
/// implementation shipped, but the scheduler only ever holds a `dyn
/// VcsAdapter`, so tests can substitute an in-memory fake.
pub trait VcsAdapter: Send + Sync {
    fn status(&self) -> Result<RepoStatus, VcsError>;
    fn head_commit(&self) -> Result<Option<String>, VcsError>;
    fn commit_all(&self, message: &str) -> Result<String, VcsError>;
    fn recent_commits(&self, n: usize) -> Result<Vec<CommitSummary>, VcsError>;
    fn reset(&self, hash: &str, hard: bool) -> Result<(), VcsError>;
    fn revert(&self, hash: &str) -> Result<(), VcsError>;
}
