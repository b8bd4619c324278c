//! Transport seam. The router core never touches a socket: it consumes
//! decoded [`ServerEvent`]s and hands back [`ClientEvent`]s through this
//! trait. `ws` provides the one bundled implementation.

pub mod ws;

use async_trait::async_trait;

use crate::Result;
use crate::protocol::client_events::ClientEvent;
use crate::protocol::server_events::ServerEvent;

/// A reliable, ordered message channel delivering whole decoded events.
///
/// `next_event` returning `Ok(None)` means the peer closed the channel;
/// an `Err` means the channel failed. Either way the session moves to
/// `Closed` and no reconnect is attempted here.
#[async_trait]
pub trait Transport: Send {
    async fn send(&mut self, event: ClientEvent) -> Result<()>;
    async fn next_event(&mut self) -> Result<Option<ServerEvent>>;
}
