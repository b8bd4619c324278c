use serde::{Deserialize, Serialize};

use crate::router::state::SessionPhase;

/// Error payload carried by inbound `error` events.
///
/// The wire allows both `{"error": "message"}` and
/// `{"error": {"message": ..., "code": ...}}`, so both shapes parse.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum ErrorPayload {
    Text(String),
    Detail {
        #[serde(skip_serializing_if = "Option::is_none")]
        code: Option<String>,
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        param: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        event_id: Option<String>,
    },
}

impl ErrorPayload {
    #[must_use]
    pub fn message(&self) -> &str {
        match self {
            Self::Text(message) | Self::Detail { message, .. } => message,
        }
    }
}

impl std::fmt::Display for ErrorPayload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message())
    }
}

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("Failed to parse or serialize JSON: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("Header error: {0}")]
    Header(#[from] tokio_tungstenite::tungstenite::http::header::InvalidHeaderValue),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Server error event: {0}")]
    Api(ErrorPayload),

    #[error("Session is not connected (phase: {0})")]
    InvalidState(SessionPhase),

    #[error("No response is open for this delta")]
    NoActiveResponse,

    #[error("Delta for a {0} stream that is already sealed")]
    StreamSealed(&'static str),

    #[error("Tool call {call_id}: arguments are not valid JSON: {message}")]
    MalformedArguments { call_id: String, message: String },

    #[error("Unknown tool call id: {0}")]
    UnknownToolCallId(String),

    #[error("No handler registered for tool: {0}")]
    UnknownTool(String),

    #[error("Invalid outbound message: {0}")]
    InvalidOutbound(String),

    #[error("The connection was closed unexpectedly")]
    ConnectionClosed,
}

pub type Result<T> = std::result::Result<T, Error>;
