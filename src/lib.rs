#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::multiple_crate_versions)]

//! Session engine for realtime conversational APIs over WebSocket.
//!
//! The server streams typed JSON events: response lifecycle, per-modality
//! deltas (text, audio, transcript), function call arguments, and input-side
//! turn boundaries. This crate decodes that stream, accumulates deltas into
//! complete artifacts, resolves function calls against a typed registry, and
//! surfaces the results through async callbacks or a pull-based event
//! stream.
//!
//! [`session::Session`] is the high-level entry point; the routing core in
//! [`router`] and the wire types in [`protocol`] stay public for full
//! control.

pub mod error;
pub mod protocol;
pub mod router;
pub mod session;
pub mod transport;

pub use error::{Error, ErrorPayload, Result};
pub use protocol::client_events::ClientEvent;
pub use protocol::models::{
    ContentPart, Item, Modality, ResponseConfig, ResponseInfo, ResponseStatus, Role,
    SessionConfig, SessionInfo, ToolSpec, TurnDetection, TurnDetectionKind,
};
pub use protocol::server_events::ServerEvent;
pub use router::Router;
pub use router::accumulator::SealedStream;
pub use router::handlers::{EventHandlers, TurnSignal};
pub use router::outbound::OutboundMessage;
pub use router::state::SessionPhase;
pub use router::tools::{
    BoxFuture as ToolFuture, ToolCall, ToolDefinition, ToolRegistry, ToolResult,
};
pub use session::{EventStream, Session, SessionBuilder, SessionEvent, SessionHandle};
pub use transport::Transport;
pub use transport::ws::WsClient;
