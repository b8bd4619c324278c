//! Validated outbound intents.
//!
//! [`OutboundMessage`] sits between application intent and the wire: every
//! constructor validates its payload, so a value that exists is a value that
//! may be sent. [`OutboundMessage::into_event`] is then infallible.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde_json::Value;

use crate::protocol::client_events::ClientEvent;
use crate::protocol::models::{Item, ResponseConfig, SessionConfig};
use crate::{Error, Result};

/// Upper bound for a single `input_audio_buffer.append` payload.
pub const MAX_AUDIO_APPEND_BYTES: usize = 15 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq)]
pub enum OutboundMessage {
    /// Reconfigure the session (`session.update`).
    SessionUpdate { config: SessionConfig },
    /// A user text turn (`conversation.item.create` with a message item).
    UserMessage { text: String },
    /// Ask the server to generate a response (`response.create`).
    ResponseRequest { config: Option<ResponseConfig> },
    /// Submit a function call result (`conversation.item.create` with a
    /// `function_call_output` item).
    ToolResultSubmission { call_id: String, output: Value },
    /// Stream microphone audio (`input_audio_buffer.append`).
    AudioAppend { audio: Vec<u8> },
    /// Commit the input audio buffer as a user turn.
    AudioCommit,
    /// Discard the uncommitted input audio buffer.
    AudioClear,
    /// Abort an in-flight response (`response.cancel`).
    CancelResponse { response_id: Option<String> },
}

impl OutboundMessage {
    #[must_use]
    pub const fn session_update(config: SessionConfig) -> Self {
        Self::SessionUpdate { config }
    }

    /// # Errors
    /// Returns `InvalidOutbound` if `text` is empty or whitespace-only.
    pub fn user_message(text: impl Into<String>) -> Result<Self> {
        let text = text.into();
        if text.trim().is_empty() {
            return Err(Error::InvalidOutbound(
                "user message text must not be empty".into(),
            ));
        }
        Ok(Self::UserMessage { text })
    }

    #[must_use]
    pub const fn response_request(config: Option<ResponseConfig>) -> Self {
        Self::ResponseRequest { config }
    }

    /// # Errors
    /// Returns `InvalidOutbound` if `call_id` is empty.
    pub fn tool_result(call_id: impl Into<String>, output: Value) -> Result<Self> {
        let call_id = call_id.into();
        if call_id.is_empty() {
            return Err(Error::InvalidOutbound(
                "tool result call_id must not be empty".into(),
            ));
        }
        Ok(Self::ToolResultSubmission { call_id, output })
    }

    /// # Errors
    /// Returns `InvalidOutbound` if `audio` is empty or exceeds
    /// [`MAX_AUDIO_APPEND_BYTES`].
    pub fn audio_append(audio: Vec<u8>) -> Result<Self> {
        if audio.is_empty() {
            return Err(Error::InvalidOutbound(
                "audio append payload must not be empty".into(),
            ));
        }
        if audio.len() > MAX_AUDIO_APPEND_BYTES {
            return Err(Error::InvalidOutbound(format!(
                "audio append payload of {} bytes exceeds the {MAX_AUDIO_APPEND_BYTES} byte limit",
                audio.len()
            )));
        }
        Ok(Self::AudioAppend { audio })
    }

    #[must_use]
    pub const fn audio_commit() -> Self {
        Self::AudioCommit
    }

    #[must_use]
    pub const fn audio_clear() -> Self {
        Self::AudioClear
    }

    #[must_use]
    pub const fn cancel_response(response_id: Option<String>) -> Self {
        Self::CancelResponse { response_id }
    }

    /// Lower this intent to its wire event.
    #[must_use]
    pub fn into_event(self) -> ClientEvent {
        match self {
            Self::SessionUpdate { config } => ClientEvent::SessionUpdate {
                event_id: None,
                session: Box::new(config),
            },
            Self::UserMessage { text } => ClientEvent::ConversationItemCreate {
                event_id: None,
                previous_item_id: None,
                item: Box::new(Item::user_text(text)),
            },
            Self::ResponseRequest { config } => ClientEvent::ResponseCreate {
                event_id: None,
                response: config.map(Box::new),
            },
            Self::ToolResultSubmission { call_id, output } => {
                ClientEvent::ConversationItemCreate {
                    event_id: None,
                    previous_item_id: None,
                    item: Box::new(Item::FunctionCallOutput {
                        id: None,
                        call_id,
                        output: output.to_string(),
                    }),
                }
            }
            Self::AudioAppend { audio } => ClientEvent::InputAudioBufferAppend {
                event_id: None,
                audio: BASE64.encode(audio),
            },
            Self::AudioCommit => ClientEvent::InputAudioBufferCommit { event_id: None },
            Self::AudioClear => ClientEvent::InputAudioBufferClear { event_id: None },
            Self::CancelResponse { response_id } => ClientEvent::ResponseCancel {
                event_id: None,
                response_id,
            },
        }
    }
}
