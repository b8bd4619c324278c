//! Inbound server event vocabulary.
//!
//! Unrecognized tags (and known tags with unparseable payloads) deserialize
//! to [`ServerEvent::Unknown`] instead of failing: the protocol is expected
//! to grow new event types and routing must stay forward-compatible.

use serde::{Deserialize, Deserializer};
use serde_json::Value;

use super::models::{ArbitraryJson, Item, ResponseInfo, SessionInfo};
use crate::error::ErrorPayload;

#[derive(Debug, Clone)]
pub enum ServerEvent {
    Error {
        event_id: Option<String>,
        error: ErrorPayload,
    },
    SessionCreated {
        event_id: Option<String>,
        session: SessionInfo,
    },
    SessionUpdated {
        event_id: Option<String>,
        session: SessionInfo,
    },
    ConversationItemCreated {
        event_id: Option<String>,
        previous_item_id: Option<String>,
        item: Item,
    },
    InputAudioBufferSpeechStarted {
        event_id: Option<String>,
        audio_start_ms: Option<u32>,
        item_id: Option<String>,
    },
    InputAudioBufferSpeechStopped {
        event_id: Option<String>,
        audio_end_ms: Option<u32>,
        item_id: Option<String>,
    },
    InputAudioBufferCommitted {
        event_id: Option<String>,
        previous_item_id: Option<String>,
        item_id: Option<String>,
    },
    ResponseCreated {
        event_id: Option<String>,
        response: Option<ResponseInfo>,
    },
    ResponseTextDelta {
        event_id: Option<String>,
        response_id: Option<String>,
        item_id: Option<String>,
        delta: String,
    },
    ResponseTextDone {
        event_id: Option<String>,
        response_id: Option<String>,
        item_id: Option<String>,
        text: Option<String>,
    },
    ResponseAudioDelta {
        event_id: Option<String>,
        response_id: Option<String>,
        item_id: Option<String>,
        /// Base64-encoded audio bytes.
        delta: String,
    },
    ResponseAudioDone {
        event_id: Option<String>,
        response_id: Option<String>,
        item_id: Option<String>,
    },
    ResponseAudioTranscriptDelta {
        event_id: Option<String>,
        response_id: Option<String>,
        item_id: Option<String>,
        delta: String,
    },
    ResponseAudioTranscriptDone {
        event_id: Option<String>,
        response_id: Option<String>,
        item_id: Option<String>,
        transcript: Option<String>,
    },
    ResponseFunctionCallArgumentsDelta {
        event_id: Option<String>,
        response_id: Option<String>,
        item_id: Option<String>,
        call_id: String,
        delta: String,
    },
    ResponseFunctionCallArgumentsDone {
        event_id: Option<String>,
        response_id: Option<String>,
        item_id: Option<String>,
        call_id: String,
        name: Option<String>,
        arguments: Option<String>,
    },
    ResponseDone {
        event_id: Option<String>,
        response: Option<ResponseInfo>,
    },
    ResponseCancelled {
        event_id: Option<String>,
        response_id: Option<String>,
    },
    Unknown(ArbitraryJson),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
enum ServerEventRepr {
    #[serde(rename = "error")]
    Error {
        #[serde(default)]
        event_id: Option<String>,
        error: ErrorPayload,
    },
    #[serde(rename = "session.created")]
    SessionCreated {
        #[serde(default)]
        event_id: Option<String>,
        session: SessionInfo,
    },
    #[serde(rename = "session.updated")]
    SessionUpdated {
        #[serde(default)]
        event_id: Option<String>,
        session: SessionInfo,
    },
    #[serde(rename = "conversation.item.created")]
    ConversationItemCreated {
        #[serde(default)]
        event_id: Option<String>,
        #[serde(default)]
        previous_item_id: Option<String>,
        item: Item,
    },
    #[serde(rename = "input_audio_buffer.speech_started")]
    InputAudioBufferSpeechStarted {
        #[serde(default)]
        event_id: Option<String>,
        #[serde(default)]
        audio_start_ms: Option<u32>,
        #[serde(default)]
        item_id: Option<String>,
    },
    #[serde(rename = "input_audio_buffer.speech_stopped")]
    InputAudioBufferSpeechStopped {
        #[serde(default)]
        event_id: Option<String>,
        #[serde(default)]
        audio_end_ms: Option<u32>,
        #[serde(default)]
        item_id: Option<String>,
    },
    #[serde(rename = "input_audio_buffer.committed")]
    InputAudioBufferCommitted {
        #[serde(default)]
        event_id: Option<String>,
        #[serde(default)]
        previous_item_id: Option<String>,
        #[serde(default)]
        item_id: Option<String>,
    },
    #[serde(rename = "response.created")]
    ResponseCreated {
        #[serde(default)]
        event_id: Option<String>,
        #[serde(default)]
        response: Option<ResponseInfo>,
    },
    #[serde(rename = "response.text.delta")]
    ResponseTextDelta {
        #[serde(default)]
        event_id: Option<String>,
        #[serde(default)]
        response_id: Option<String>,
        #[serde(default)]
        item_id: Option<String>,
        delta: String,
    },
    #[serde(rename = "response.text.done")]
    ResponseTextDone {
        #[serde(default)]
        event_id: Option<String>,
        #[serde(default)]
        response_id: Option<String>,
        #[serde(default)]
        item_id: Option<String>,
        #[serde(default)]
        text: Option<String>,
    },
    #[serde(rename = "response.audio.delta")]
    ResponseAudioDelta {
        #[serde(default)]
        event_id: Option<String>,
        #[serde(default)]
        response_id: Option<String>,
        #[serde(default)]
        item_id: Option<String>,
        delta: String,
    },
    #[serde(rename = "response.audio.done")]
    ResponseAudioDone {
        #[serde(default)]
        event_id: Option<String>,
        #[serde(default)]
        response_id: Option<String>,
        #[serde(default)]
        item_id: Option<String>,
    },
    #[serde(rename = "response.audio_transcript.delta")]
    ResponseAudioTranscriptDelta {
        #[serde(default)]
        event_id: Option<String>,
        #[serde(default)]
        response_id: Option<String>,
        #[serde(default)]
        item_id: Option<String>,
        delta: String,
    },
    #[serde(rename = "response.audio_transcript.done")]
    ResponseAudioTranscriptDone {
        #[serde(default)]
        event_id: Option<String>,
        #[serde(default)]
        response_id: Option<String>,
        #[serde(default)]
        item_id: Option<String>,
        #[serde(default)]
        transcript: Option<String>,
    },
    #[serde(rename = "response.function_call_arguments.delta")]
    ResponseFunctionCallArgumentsDelta {
        #[serde(default)]
        event_id: Option<String>,
        #[serde(default)]
        response_id: Option<String>,
        #[serde(default)]
        item_id: Option<String>,
        call_id: String,
        delta: String,
    },
    #[serde(rename = "response.function_call_arguments.done")]
    ResponseFunctionCallArgumentsDone {
        #[serde(default)]
        event_id: Option<String>,
        #[serde(default)]
        response_id: Option<String>,
        #[serde(default)]
        item_id: Option<String>,
        call_id: String,
        #[serde(default)]
        name: Option<String>,
        #[serde(default)]
        arguments: Option<String>,
    },
    #[serde(rename = "response.done")]
    ResponseDone {
        #[serde(default)]
        event_id: Option<String>,
        #[serde(default)]
        response: Option<ResponseInfo>,
    },
    #[serde(rename = "response.cancelled")]
    ResponseCancelled {
        #[serde(default)]
        event_id: Option<String>,
        #[serde(default)]
        response_id: Option<String>,
    },
}

impl From<ServerEventRepr> for ServerEvent {
    fn from(repr: ServerEventRepr) -> Self {
        match repr {
            ServerEventRepr::Error { event_id, error } => Self::Error { event_id, error },
            ServerEventRepr::SessionCreated { event_id, session } => Self::SessionCreated { event_id, session },
            ServerEventRepr::SessionUpdated { event_id, session } => Self::SessionUpdated { event_id, session },
            ServerEventRepr::ConversationItemCreated { event_id, previous_item_id, item } => Self::ConversationItemCreated { event_id, previous_item_id, item },
            ServerEventRepr::InputAudioBufferSpeechStarted { event_id, audio_start_ms, item_id } => Self::InputAudioBufferSpeechStarted { event_id, audio_start_ms, item_id },
            ServerEventRepr::InputAudioBufferSpeechStopped { event_id, audio_end_ms, item_id } => Self::InputAudioBufferSpeechStopped { event_id, audio_end_ms, item_id },
            ServerEventRepr::InputAudioBufferCommitted { event_id, previous_item_id, item_id } => Self::InputAudioBufferCommitted { event_id, previous_item_id, item_id },
            ServerEventRepr::ResponseCreated { event_id, response } => Self::ResponseCreated { event_id, response },
            ServerEventRepr::ResponseTextDelta { event_id, response_id, item_id, delta } => Self::ResponseTextDelta { event_id, response_id, item_id, delta },
            ServerEventRepr::ResponseTextDone { event_id, response_id, item_id, text } => Self::ResponseTextDone { event_id, response_id, item_id, text },
            ServerEventRepr::ResponseAudioDelta { event_id, response_id, item_id, delta } => Self::ResponseAudioDelta { event_id, response_id, item_id, delta },
            ServerEventRepr::ResponseAudioDone { event_id, response_id, item_id } => Self::ResponseAudioDone { event_id, response_id, item_id },
            ServerEventRepr::ResponseAudioTranscriptDelta { event_id, response_id, item_id, delta } => Self::ResponseAudioTranscriptDelta { event_id, response_id, item_id, delta },
            ServerEventRepr::ResponseAudioTranscriptDone { event_id, response_id, item_id, transcript } => Self::ResponseAudioTranscriptDone { event_id, response_id, item_id, transcript },
            ServerEventRepr::ResponseFunctionCallArgumentsDelta { event_id, response_id, item_id, call_id, delta } => Self::ResponseFunctionCallArgumentsDelta { event_id, response_id, item_id, call_id, delta },
            ServerEventRepr::ResponseFunctionCallArgumentsDone { event_id, response_id, item_id, call_id, name, arguments } => Self::ResponseFunctionCallArgumentsDone { event_id, response_id, item_id, call_id, name, arguments },
            ServerEventRepr::ResponseDone { event_id, response } => Self::ResponseDone { event_id, response },
            ServerEventRepr::ResponseCancelled { event_id, response_id } => Self::ResponseCancelled { event_id, response_id },
        }
    }
}

impl<'de> Deserialize<'de> for ServerEvent {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = ArbitraryJson::deserialize(deserializer)?;
        match ServerEventRepr::deserialize(value.clone()) {
            Ok(repr) => Ok(repr.into()),
            Err(err) => {
                tracing::debug!("unrecognized server event, keeping raw: {err}");
                Ok(Self::Unknown(value))
            }
        }
    }
}

impl ServerEvent {
    #[must_use]
    pub fn event_id(&self) -> Option<&str> {
        match self {
            Self::Unknown(value) => value.get("event_id").and_then(Value::as_str),
            Self::Error { event_id, .. }
            | Self::SessionCreated { event_id, .. }
            | Self::SessionUpdated { event_id, .. }
            | Self::ConversationItemCreated { event_id, .. }
            | Self::InputAudioBufferSpeechStarted { event_id, .. }
            | Self::InputAudioBufferSpeechStopped { event_id, .. }
            | Self::InputAudioBufferCommitted { event_id, .. }
            | Self::ResponseCreated { event_id, .. }
            | Self::ResponseTextDelta { event_id, .. }
            | Self::ResponseTextDone { event_id, .. }
            | Self::ResponseAudioDelta { event_id, .. }
            | Self::ResponseAudioDone { event_id, .. }
            | Self::ResponseAudioTranscriptDelta { event_id, .. }
            | Self::ResponseAudioTranscriptDone { event_id, .. }
            | Self::ResponseFunctionCallArgumentsDelta { event_id, .. }
            | Self::ResponseFunctionCallArgumentsDone { event_id, .. }
            | Self::ResponseDone { event_id, .. }
            | Self::ResponseCancelled { event_id, .. } => event_id.as_deref(),
        }
    }
}
