//! WebSocket transport adapter (tokio-tungstenite).

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use url::Url;

use crate::protocol::client_events::ClientEvent;
use crate::protocol::server_events::ServerEvent;
use crate::Result;
use crate::transport::Transport;

const TRACE_LOG_MAX_BYTES: usize = 1024;
const TRACE_TRUNCATE_SUFFIX: &str = "... (truncated)";

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// A connected WebSocket client speaking the realtime event protocol.
///
/// `Send` but not `Sync`: the underlying stream is single-owner.
#[must_use]
pub struct WsClient {
    stream: WsStream,
}

impl WsClient {
    /// Connect to `url`, optionally attaching a Bearer token.
    ///
    /// # Errors
    /// Returns an error if the URL is invalid or the handshake fails.
    pub async fn connect(url: &str, bearer_token: Option<&str>) -> Result<Self> {
        let url = Url::parse(url)?;

        let mut request = tokio_tungstenite::tungstenite::client::IntoClientRequest::into_client_request(
            url.as_str(),
        )?;
        if let Some(token) = bearer_token {
            let value = format!("Bearer {token}").parse()?;
            request.headers_mut().insert(AUTHORIZATION, value);
        }
        let (stream, _) = connect_async(request).await?;

        tracing::info!("connected to {}", url);

        Ok(Self { stream })
    }

    /// Send one client event as a text frame.
    ///
    /// # Errors
    /// Returns an error if serialization or the WebSocket send fails.
    pub async fn send(&mut self, event: ClientEvent) -> Result<()> {
        let json = serde_json::to_string(&event)?;
        tracing::trace!("sending: {}", safe_truncate(&json, TRACE_LOG_MAX_BYTES));
        self.stream.send(Message::Text(json.into())).await?;
        Ok(())
    }

    /// Receive the next decoded server event, answering pings along the way.
    ///
    /// Returns `Ok(None)` once the server closes the connection.
    ///
    /// # Errors
    /// Returns an error if the WebSocket fails or a text frame is not valid
    /// JSON. Unrecognized event tags are not errors; they decode to
    /// [`ServerEvent::Unknown`].
    pub async fn next_event(&mut self) -> Result<Option<ServerEvent>> {
        while let Some(msg) = self.stream.next().await {
            match msg? {
                Message::Text(text) => {
                    tracing::trace!("received: {}", safe_truncate(&text, TRACE_LOG_MAX_BYTES));
                    return Ok(Some(serde_json::from_str::<ServerEvent>(&text)?));
                }
                Message::Close(_) => {
                    tracing::info!("WebSocket connection closed by server");
                    return Ok(None);
                }
                Message::Ping(payload) => {
                    tracing::debug!("received Ping, sending Pong");
                    self.stream.send(Message::Pong(payload)).await?;
                }
                _ => (),
            }
        }
        Ok(None)
    }
}

#[async_trait]
impl Transport for WsClient {
    async fn send(&mut self, event: ClientEvent) -> Result<()> {
        Self::send(self, event).await
    }

    async fn next_event(&mut self) -> Result<Option<ServerEvent>> {
        Self::next_event(self).await
    }
}

impl std::fmt::Debug for WsClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WsClient").finish_non_exhaustive()
    }
}

fn safe_truncate(s: &str, max_bytes: usize) -> std::borrow::Cow<'_, str> {
    if s.len() <= max_bytes {
        return std::borrow::Cow::Borrowed(s);
    }

    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    std::borrow::Cow::Owned(format!(
        "{} {} {} bytes",
        &s[..end],
        TRACE_TRUNCATE_SUFFIX,
        s.len() - end
    ))
}

#[cfg(test)]
mod tests {
    use super::safe_truncate;

    #[test]
    fn truncate_short_string_is_borrowed() {
        let s = "short";
        assert_eq!(safe_truncate(s, 1024), "short");
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        let s = "aééé";
        let out = safe_truncate(s, 2);
        assert!(out.starts_with('a'));
        assert!(out.contains("truncated"));
    }
}
