//! Event routing core.
//!
//! [`Router`] is the single-threaded heart of a session: it consumes decoded
//! [`ServerEvent`]s one at a time, maintains the session phase, the active
//! response accumulator, and the pending tool calls, and returns any
//! follow-up [`ClientEvent`]s the caller must put on the wire. It owns no
//! socket, which keeps the full routing table testable without I/O.
//!
//! Protocol violations (duplicate done events, deltas without an active
//! response, and the like) never abort routing: the offending event is
//! dropped, a counter is bumped, and a warning is logged.

pub mod accumulator;
pub mod handlers;
pub mod outbound;
pub mod state;
pub mod tools;

use std::collections::HashMap;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde_json::{Value, json};

use crate::protocol::client_events::ClientEvent;
use crate::protocol::models::{ResponseStatus, SessionConfig};
use crate::protocol::server_events::ServerEvent;
use crate::{Error, Result};

use accumulator::{ResponseAccumulator, SealedStream};
use handlers::{EventHandlers, TurnSignal};
use outbound::OutboundMessage;
use state::{SessionPhase, SessionState};
use tools::{CallPhase, PendingToolCall, ToolCall, ToolRegistry};

#[derive(Debug)]
pub struct Router {
    state: SessionState,
    response: Option<ResponseAccumulator>,
    pending_calls: HashMap<String, PendingToolCall>,
    handlers: EventHandlers,
    tools: ToolRegistry,
    violations: u64,
}

impl Router {
    #[must_use]
    pub fn new(handlers: EventHandlers, tools: ToolRegistry) -> Self {
        Self {
            state: SessionState::new(),
            response: None,
            pending_calls: HashMap::new(),
            handlers,
            tools,
            violations: 0,
        }
    }

    #[must_use]
    pub const fn phase(&self) -> SessionPhase {
        self.state.phase()
    }

    #[must_use]
    pub fn session_id(&self) -> Option<&str> {
        self.state.session_id()
    }

    #[must_use]
    pub const fn session_config(&self) -> Option<&SessionConfig> {
        self.state.config()
    }

    #[must_use]
    pub const fn is_ready(&self) -> bool {
        self.state.is_ready()
    }

    /// Number of protocol violations observed so far.
    #[must_use]
    pub const fn violation_count(&self) -> u64 {
        self.violations
    }

    #[must_use]
    pub const fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    /// Record the transport connect attempt.
    ///
    /// # Errors
    /// Returns `InvalidState` unless the session is `Disconnected`.
    pub fn begin_connect(&mut self) -> Result<()> {
        self.state.connect()
    }

    /// Close the session. Idempotent; every later event is a no-op.
    pub fn close(&mut self) {
        self.state.close();
        self.response = None;
        self.pending_calls.clear();
    }

    /// Validate an outbound intent against the current session state and
    /// lower it to its wire event.
    ///
    /// # Errors
    /// Returns `InvalidState` unless the session is ready, and
    /// `UnknownToolCallId` for a tool result whose call is not pending
    /// (never seen, or already resolved automatically).
    pub fn prepare_send(&self, message: OutboundMessage) -> Result<ClientEvent> {
        self.state.ensure_ready()?;
        if let OutboundMessage::ToolResultSubmission { call_id, .. } = &message {
            match self.pending_calls.get(call_id) {
                Some(pending) if pending.phase() != CallPhase::Resolved => {}
                _ => return Err(Error::UnknownToolCallId(call_id.clone())),
            }
        }
        Ok(message.into_event())
    }

    /// Record that a manually-submitted tool result reached the wire. The
    /// call is retired so the server's later `arguments.done` cannot resolve
    /// it a second time; the protocol allows exactly one result per call.
    pub fn mark_submitted(&mut self, call_id: &str) {
        if let Some(pending) = self.pending_calls.get_mut(call_id) {
            pending.mark_resolved();
        }
    }

    /// Route one server event. Returns the follow-up client events the
    /// caller must send (today: tool result submission plus the response
    /// request that re-engages the model).
    ///
    /// # Errors
    /// Propagates application handler errors. Protocol violations are
    /// counted and logged, never returned.
    pub async fn dispatch(&mut self, event: ServerEvent) -> Result<Vec<ClientEvent>> {
        if self.phase() == SessionPhase::Closed {
            tracing::debug!("dropping event after close");
            return Ok(Vec::new());
        }

        if let Some(handler) = &self.handlers.on_raw_event {
            handler(event.clone()).await?;
        }

        let mut outbound = Vec::new();
        match event {
            ServerEvent::Error { error, .. } => {
                if let Some(handler) = &self.handlers.on_error {
                    handler(error).await?;
                } else {
                    tracing::error!("server error: {error}");
                }
            }
            ServerEvent::SessionCreated { session, .. }
            | ServerEvent::SessionUpdated { session, .. } => {
                self.state.mark_ready(session.id.clone(), session.config.clone());
                if let Some(handler) = &self.handlers.on_session {
                    handler(session).await?;
                }
            }
            ServerEvent::ConversationItemCreated { item, .. } => {
                if let Some(handler) = &self.handlers.on_item_created {
                    handler(item).await?;
                } else {
                    tracing::trace!(?item, "conversation item created");
                }
            }
            ServerEvent::InputAudioBufferSpeechStarted { audio_start_ms, .. } => {
                self.turn_signal(TurnSignal::SpeechStarted { audio_start_ms })
                    .await?;
            }
            ServerEvent::InputAudioBufferSpeechStopped { audio_end_ms, .. } => {
                self.turn_signal(TurnSignal::SpeechStopped { audio_end_ms })
                    .await?;
            }
            ServerEvent::InputAudioBufferCommitted { item_id, .. } => {
                self.turn_signal(TurnSignal::Committed { item_id }).await?;
            }
            ServerEvent::ResponseCreated { response, .. } => {
                if self.response.is_some() {
                    self.violation("response.created while a response is already open");
                }
                let response_id = response.and_then(|r| r.id);
                self.response = Some(ResponseAccumulator::new(response_id.clone()));
                if let Some(handler) = &self.handlers.on_turn_started {
                    handler(response_id).await?;
                }
            }
            ServerEvent::ResponseTextDelta { delta, .. } => {
                if let Err(err) = self.active_response().and_then(|acc| acc.push_text(&delta)) {
                    self.violation(&format!("text delta dropped: {err}"));
                }
            }
            ServerEvent::ResponseTextDone { .. } => {
                match self.active_response().and_then(ResponseAccumulator::seal_text) {
                    Ok(text) => {
                        if let Some(handler) = &self.handlers.on_text {
                            handler(text).await?;
                        }
                    }
                    Err(err) => self.violation(&format!("text done dropped: {err}")),
                }
            }
            ServerEvent::ResponseAudioDelta { delta, .. } => {
                let chunk = match BASE64.decode(delta.as_bytes()) {
                    Ok(chunk) => chunk,
                    Err(_) => {
                        self.violation("undecodable base64 audio delta");
                        return Ok(outbound);
                    }
                };
                if let Err(err) = self.active_response().and_then(|acc| acc.push_audio(chunk)) {
                    self.violation(&format!("audio delta dropped: {err}"));
                }
            }
            ServerEvent::ResponseAudioDone { .. } => {
                match self.active_response().and_then(ResponseAccumulator::seal_audio) {
                    Ok(chunks) => {
                        if let Some(handler) = &self.handlers.on_audio {
                            handler(chunks).await?;
                        }
                    }
                    Err(err) => self.violation(&format!("audio done dropped: {err}")),
                }
            }
            ServerEvent::ResponseAudioTranscriptDelta { delta, .. } => {
                if let Err(err) = self
                    .active_response()
                    .and_then(|acc| acc.push_transcript(&delta))
                {
                    self.violation(&format!("transcript delta dropped: {err}"));
                }
            }
            ServerEvent::ResponseAudioTranscriptDone { .. } => {
                match self
                    .active_response()
                    .and_then(ResponseAccumulator::seal_transcript)
                {
                    Ok(transcript) => {
                        if let Some(handler) = &self.handlers.on_transcript {
                            handler(transcript).await?;
                        }
                    }
                    Err(err) => self.violation(&format!("transcript done dropped: {err}")),
                }
            }
            ServerEvent::ResponseFunctionCallArgumentsDelta { call_id, delta, .. } => {
                let pending = self
                    .pending_calls
                    .entry(call_id.clone())
                    .or_insert_with(|| PendingToolCall::new(call_id));
                if pending.append_arguments(&delta).is_err() {
                    self.violation("function call arguments delta after done");
                }
            }
            ServerEvent::ResponseFunctionCallArgumentsDone {
                call_id,
                name,
                arguments,
                ..
            } => {
                outbound = self.resolve_tool_call(call_id, name, arguments).await?;
            }
            ServerEvent::ResponseDone { response, .. } => {
                let status = response.and_then(|r| r.status);
                self.finish_response(status).await?;
            }
            ServerEvent::ResponseCancelled { response_id, .. } => {
                tracing::debug!(?response_id, "response cancelled, discarding partial output");
                self.response = None;
                self.pending_calls.clear();
            }
            ServerEvent::Unknown(raw) => {
                if let Some(handler) = &self.handlers.on_unhandled {
                    handler(raw).await?;
                } else {
                    tracing::debug!(
                        kind = raw.get("type").and_then(serde_json::Value::as_str),
                        "ignoring unrecognized server event"
                    );
                }
            }
        }
        Ok(outbound)
    }

    fn active_response(&mut self) -> Result<&mut ResponseAccumulator> {
        self.response.as_mut().ok_or(Error::NoActiveResponse)
    }

    async fn turn_signal(&mut self, signal: TurnSignal) -> Result<()> {
        if let Some(handler) = &self.handlers.on_turn_signal {
            handler(signal).await?;
        }
        Ok(())
    }

    /// Finalize the arguments of one function call and resolve it: invoke
    /// the override handler or the registry, then hand back exactly two
    /// events, the result submission and the follow-up response request.
    /// Unknown functions and malformed arguments resolve to error-shaped
    /// results so the model always hears back.
    async fn resolve_tool_call(
        &mut self,
        call_id: String,
        name: Option<String>,
        fallback: Option<String>,
    ) -> Result<Vec<ClientEvent>> {
        let pending = self
            .pending_calls
            .entry(call_id.clone())
            .or_insert_with(|| PendingToolCall::new(call_id.clone()));
        let completed = match pending.complete(name, fallback) {
            Ok(completed) => completed,
            Err(_) => {
                self.violation("duplicate function call arguments done");
                return Ok(Vec::new());
            }
        };

        let output = match completed.arguments {
            Err(err) => {
                tracing::warn!(%call_id, "{err}");
                json!({ "error": err.to_string() })
            }
            Ok(arguments) => match completed.name {
                None => json!({ "error": "missing function name" }),
                Some(name) => self.invoke_tool(&call_id, name, arguments).await,
            },
        };

        if let Some(pending) = self.pending_calls.get_mut(&call_id) {
            pending.mark_resolved();
        }

        Ok(vec![
            OutboundMessage::tool_result(call_id, output)?.into_event(),
            OutboundMessage::response_request(None).into_event(),
        ])
    }

    async fn invoke_tool(&mut self, call_id: &str, name: String, arguments: Value) -> Value {
        let call = ToolCall {
            call_id: call_id.to_string(),
            name: name.clone(),
            arguments,
        };
        if let Some(pending) = self.pending_calls.get_mut(call_id) {
            pending.mark_dispatched();
        }
        let result = if let Some(handler) = &self.handlers.on_tool_call {
            handler(call).await
        } else {
            self.tools.dispatch(call).await
        };
        match result {
            Ok(result) => result.output,
            Err(Error::UnknownTool(name)) => {
                tracing::warn!(%call_id, "call to unknown function {name}");
                json!({ "error": format!("unknown function: {name}") })
            }
            Err(err) => {
                tracing::warn!(%call_id, "function {name} failed: {err}");
                json!({ "error": err.to_string() })
            }
        }
    }

    async fn finish_response(&mut self, status: Option<ResponseStatus>) -> Result<()> {
        match self.response.take() {
            None => self.violation("response.done without an active response"),
            Some(mut acc) => {
                for sealed in acc.force_seal_open() {
                    self.violation(&format!(
                        "response.done with {} stream still open",
                        sealed.modality()
                    ));
                    match sealed {
                        SealedStream::Text(text) => {
                            if let Some(handler) = &self.handlers.on_text {
                                handler(text).await?;
                            }
                        }
                        SealedStream::Audio(chunks) => {
                            if let Some(handler) = &self.handlers.on_audio {
                                handler(chunks).await?;
                            }
                        }
                        SealedStream::Transcript(transcript) => {
                            if let Some(handler) = &self.handlers.on_transcript {
                                handler(transcript).await?;
                            }
                        }
                    }
                }
            }
        }
        self.pending_calls.clear();
        if let Some(handler) = &self.handlers.on_turn_complete {
            handler(status).await?;
        }
        Ok(())
    }

    fn violation(&mut self, detail: &str) {
        self.violations += 1;
        tracing::warn!(total = self.violations, "protocol violation: {detail}");
    }
}
