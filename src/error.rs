//! Aggregate error taxonomy for the harness binary.
//!
//! Each component defines its own narrow error enum (`BacklogError`,
//! `CheckpointerError`, `VerificationError`, `LoggerError`, ...); this module
//! only aggregates them behind one [`miette::Diagnostic`] so the scheduler's
//! top-level `main` can `?`-propagate anything and still print a readable
//! diagnostic on exit.

use miette::Diagnostic;
use thiserror::Error;

use crate::alerts::AlertStoreError;
use crate::backlog::BacklogError;
use crate::checkpoint::CheckpointerError;
use crate::logging::LoggerError;
use crate::session::SessionError;
use crate::vcs::VcsError;
use crate::verification::VerificationError;

#[derive(Debug, Error, Diagnostic)]
pub enum HarnessError {
    #[error(transparent)]
    #[diagnostic(code(harness::backlog))]
    Backlog(#[from] BacklogError),

    #[error(transparent)]
    #[diagnostic(code(harness::checkpoint))]
    Checkpoint(#[from] CheckpointerError),

    #[error(transparent)]
    #[diagnostic(code(harness::session))]
    Session(#[from] SessionError),

    #[error(transparent)]
    #[diagnostic(code(harness::vcs))]
    Vcs(#[from] VcsError),

    #[error(transparent)]
    #[diagnostic(code(harness::verification))]
    Verification(#[from] VerificationError),

    #[error(transparent)]
    #[diagnostic(code(harness::logger))]
    Logger(#[from] LoggerError),

    #[error(transparent)]
    #[diagnostic(code(harness::alerts))]
    Alerts(#[from] AlertStoreError),

    #[error("configuration error: {0}")]
    #[diagnostic(
        code(harness::config),
        help("check ada-harness.toml and the ADA_HARNESS_* environment variables")
    )]
    Config(String),

    #[error("preflight check failed: {0}")]
    #[diagnostic(code(harness::preflight))]
    Preflight(String),

    #[error("fatal stop condition: {0}")]
    #[diagnostic(
        code(harness::fatal_stop),
        help("billing/auth failures are not retried; resolve the account issue and resume")
    )]
    FatalStop(String),

    #[error(transparent)]
    #[diagnostic(code(harness::io))]
    Io(#[from] std::io::Error),
}

pub type HarnessResult<T> = std::result::Result<T, HarnessError>;
