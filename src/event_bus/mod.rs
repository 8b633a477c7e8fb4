//! Event bus utilities providing fan-out, sinks, and subscriber APIs.
//!
//! The module is organised around a broadcast-based [`EventHub`] and helpers for
//! configuring sinks (`EventBus`) and consuming the resulting [`EventStream`].
//! Every [`HarnessEvent`] published here is also the payload of spec §6's
//! push channel, rendered through [`HarnessEvent::to_envelope`].

pub mod bus;
pub mod diagnostics;
pub mod emitter;
pub mod event;
pub mod hub;
pub mod sink;

pub use bus::EventBus;
pub use diagnostics::{DiagnosticsStream, SinkDiagnostic};
pub use emitter::{EmitterError, EventEmitter};
pub use event::{HarnessEvent, STREAM_END_SCOPE};
pub use hub::{BlockingEventIter, EventHub, EventHubMetrics, EventStream, HubEmitter};
pub use sink::{ChannelSink, EventSink, JsonLinesSink, MemorySink, StdOutSink};
