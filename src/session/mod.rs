//! Session Runtime (C4): drives one coding or initializer session against
//! the agent transport, streaming its transcript, tracking turns/usage, and
//! detecting the terminal conditions of spec §4.4.

pub mod record;
pub mod runtime;
pub mod transcript;
pub mod transport;

pub use record::{SessionRecord, TokenUsage};
pub use runtime::{SessionOutcomeDetail, SessionResult, SessionRuntime};
pub use transcript::{TranscriptEvent, TranscriptSink};
pub use transport::{
    AgentTransport, ScriptedTransport, SessionRequest, StreamingApiTransport, SubprocessTransport,
    TransportError, TransportExit,
};

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum SessionError {
    #[error("agent transport error: {0}")]
    #[diagnostic(code(session::transport))]
    Transport(#[from] TransportError),

    #[error("session stalled: no transcript event for {0:?}")]
    #[diagnostic(
        code(session::stall),
        help("the agent process may be hung; check its own logs")
    )]
    Stall(std::time::Duration),

    #[error("session exceeded its hard timeout of {0:?}")]
    #[diagnostic(code(session::hard_timeout))]
    HardTimeout(std::time::Duration),
}

pub type SessionOutcomeResult<T> = Result<T, SessionError>;
