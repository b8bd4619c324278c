//! Application callback slots.
//!
//! Each slot is optional; an unset slot means the router handles the event
//! silently (accumulation and bookkeeping still happen). Handlers run to
//! completion before the next event is routed, preserving per-session
//! ordering.

use std::future::Future;

use crate::Result;
use crate::error::ErrorPayload;
use crate::protocol::models::{ArbitraryJson, Item, ResponseStatus, SessionInfo};
use crate::protocol::server_events::ServerEvent;
use crate::router::tools::{BoxFuture, ToolCall, ToolResult};

/// Input-side turn boundary notifications from server VAD and buffer
/// commits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnSignal {
    SpeechStarted { audio_start_ms: Option<u32> },
    SpeechStopped { audio_end_ms: Option<u32> },
    Committed { item_id: Option<String> },
}

pub type SessionHandler = Box<dyn Fn(SessionInfo) -> BoxFuture<Result<()>> + Send + Sync>;
pub type TurnStartedHandler = Box<dyn Fn(Option<String>) -> BoxFuture<Result<()>> + Send + Sync>;
pub type ItemHandler = Box<dyn Fn(Item) -> BoxFuture<Result<()>> + Send + Sync>;
pub type TextHandler = Box<dyn Fn(String) -> BoxFuture<Result<()>> + Send + Sync>;
pub type AudioHandler = Box<dyn Fn(Vec<Vec<u8>>) -> BoxFuture<Result<()>> + Send + Sync>;
pub type TurnSignalHandler = Box<dyn Fn(TurnSignal) -> BoxFuture<Result<()>> + Send + Sync>;
pub type TurnCompleteHandler =
    Box<dyn Fn(Option<ResponseStatus>) -> BoxFuture<Result<()>> + Send + Sync>;
pub type ToolCallHandler = Box<dyn Fn(ToolCall) -> BoxFuture<Result<ToolResult>> + Send + Sync>;
pub type ErrorHandler = Box<dyn Fn(ErrorPayload) -> BoxFuture<Result<()>> + Send + Sync>;
pub type UnhandledHandler = Box<dyn Fn(ArbitraryJson) -> BoxFuture<Result<()>> + Send + Sync>;
pub type RawEventHandler = Box<dyn Fn(ServerEvent) -> BoxFuture<Result<()>> + Send + Sync>;

#[derive(Default)]
pub struct EventHandlers {
    pub on_session: Option<SessionHandler>,
    /// Fires when the server acknowledges a conversation item. Informational
    /// only; no router state depends on it.
    pub on_item_created: Option<ItemHandler>,
    pub on_turn_started: Option<TurnStartedHandler>,
    pub on_text: Option<TextHandler>,
    pub on_transcript: Option<TextHandler>,
    pub on_audio: Option<AudioHandler>,
    pub on_turn_signal: Option<TurnSignalHandler>,
    pub on_turn_complete: Option<TurnCompleteHandler>,
    /// Overrides the registry for every function call when set.
    pub on_tool_call: Option<ToolCallHandler>,
    pub on_error: Option<ErrorHandler>,
    /// Fires for events no known variant matched.
    pub on_unhandled: Option<UnhandledHandler>,
    /// Fires for every decoded event, before routing.
    pub on_raw_event: Option<RawEventHandler>,
}

impl EventHandlers {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn on_session<F, Fut>(mut self, handler: F) -> Self
    where
        F: Fn(SessionInfo) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.on_session = Some(Box::new(move |session| Box::pin(handler(session))));
        self
    }

    #[must_use]
    pub fn on_item_created<F, Fut>(mut self, handler: F) -> Self
    where
        F: Fn(Item) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.on_item_created = Some(Box::new(move |item| Box::pin(handler(item))));
        self
    }

    #[must_use]
    pub fn on_turn_started<F, Fut>(mut self, handler: F) -> Self
    where
        F: Fn(Option<String>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.on_turn_started = Some(Box::new(move |response_id| Box::pin(handler(response_id))));
        self
    }

    #[must_use]
    pub fn on_text<F, Fut>(mut self, handler: F) -> Self
    where
        F: Fn(String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.on_text = Some(Box::new(move |text| Box::pin(handler(text))));
        self
    }

    #[must_use]
    pub fn on_transcript<F, Fut>(mut self, handler: F) -> Self
    where
        F: Fn(String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.on_transcript = Some(Box::new(move |transcript| Box::pin(handler(transcript))));
        self
    }

    #[must_use]
    pub fn on_audio<F, Fut>(mut self, handler: F) -> Self
    where
        F: Fn(Vec<Vec<u8>>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.on_audio = Some(Box::new(move |chunks| Box::pin(handler(chunks))));
        self
    }

    #[must_use]
    pub fn on_turn_signal<F, Fut>(mut self, handler: F) -> Self
    where
        F: Fn(TurnSignal) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.on_turn_signal = Some(Box::new(move |signal| Box::pin(handler(signal))));
        self
    }

    #[must_use]
    pub fn on_turn_complete<F, Fut>(mut self, handler: F) -> Self
    where
        F: Fn(Option<ResponseStatus>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.on_turn_complete = Some(Box::new(move |status| Box::pin(handler(status))));
        self
    }

    #[must_use]
    pub fn on_tool_call<F, Fut>(mut self, handler: F) -> Self
    where
        F: Fn(ToolCall) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<ToolResult>> + Send + 'static,
    {
        self.on_tool_call = Some(Box::new(move |call| Box::pin(handler(call))));
        self
    }

    #[must_use]
    pub fn on_error<F, Fut>(mut self, handler: F) -> Self
    where
        F: Fn(ErrorPayload) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.on_error = Some(Box::new(move |payload| Box::pin(handler(payload))));
        self
    }

    #[must_use]
    pub fn on_unhandled<F, Fut>(mut self, handler: F) -> Self
    where
        F: Fn(ArbitraryJson) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.on_unhandled = Some(Box::new(move |raw| Box::pin(handler(raw))));
        self
    }

    #[must_use]
    pub fn on_raw_event<F, Fut>(mut self, handler: F) -> Self
    where
        F: Fn(ServerEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.on_raw_event = Some(Box::new(move |event| Box::pin(handler(event))));
        self
    }
}

impl std::fmt::Debug for EventHandlers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventHandlers")
            .field("on_session", &self.on_session.is_some())
            .field("on_item_created", &self.on_item_created.is_some())
            .field("on_turn_started", &self.on_turn_started.is_some())
            .field("on_text", &self.on_text.is_some())
            .field("on_transcript", &self.on_transcript.is_some())
            .field("on_audio", &self.on_audio.is_some())
            .field("on_turn_signal", &self.on_turn_signal.is_some())
            .field("on_turn_complete", &self.on_turn_complete.is_some())
            .field("on_tool_call", &self.on_tool_call.is_some())
            .field("on_error", &self.on_error.is_some())
            .field("on_unhandled", &self.on_unhandled.is_some())
            .field("on_raw_event", &self.on_raw_event.is_some())
            .finish()
    }
}
