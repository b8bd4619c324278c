//! Session facade: a spawned driver task owning the transport and the
//! [`Router`], plus a cheap command handle for the application side.
//!
//! All traffic for one session flows through the driver's `select!` loop,
//! so inbound routing and outbound sends are strictly serialized. Follow-up
//! events produced by the router (tool results and their response requests)
//! are sent before the next inbound event is read.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures::Stream;
use tokio::sync::{mpsc, oneshot};

use crate::error::ErrorPayload;
use crate::protocol::client_events::ClientEvent;
use crate::protocol::models::{Item, ResponseConfig, ResponseStatus, SessionConfig, SessionInfo};
use crate::router::Router;
use crate::router::handlers::{EventHandlers, TurnSignal};
use crate::router::outbound::OutboundMessage;
use crate::router::tools::ToolRegistry;
use crate::transport::Transport;
use crate::transport::ws::WsClient;
use crate::{Error, Result};

const COMMAND_CHANNEL_CAPACITY: usize = 64;
const EVENT_CHANNEL_CAPACITY: usize = 128;

/// Session-level happenings surfaced on the event channel, in routing
/// order. This is the pull-based alternative to registering handlers.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// Server confirmed the session (`session.created` / `session.updated`).
    Ready(SessionInfo),
    /// The server acknowledged a conversation item.
    ItemCreated(Item),
    /// A response opened.
    TurnStarted { response_id: Option<String> },
    /// A text stream sealed; the full concatenated text.
    Text(String),
    /// A transcript stream sealed.
    Transcript(String),
    /// An audio stream sealed; decoded chunks in arrival order.
    Audio(Vec<Vec<u8>>),
    /// Input-side turn boundary (VAD or commit).
    Signal(TurnSignal),
    /// The response finished.
    TurnComplete { status: Option<ResponseStatus> },
    /// The server reported an error.
    Error(ErrorPayload),
    /// The session ended, by explicit close or because the connection is
    /// gone; no further events will arrive.
    Closed,
}

enum Command {
    Send {
        message: OutboundMessage,
        respond: oneshot::Sender<Result<()>>,
    },
    SendRaw {
        event: ClientEvent,
        respond: oneshot::Sender<Result<()>>,
    },
    Violations {
        respond: oneshot::Sender<u64>,
    },
    Close {
        respond: oneshot::Sender<()>,
    },
}

/// Cloneable handle for issuing outbound messages from other tasks.
#[derive(Clone)]
pub struct SessionHandle {
    sender: mpsc::Sender<Command>,
}

impl SessionHandle {
    /// Validate and send one outbound message.
    ///
    /// # Errors
    /// Returns the validation error, or `ConnectionClosed` if the driver is
    /// gone.
    pub async fn send(&self, message: OutboundMessage) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(Command::Send {
                message,
                respond: tx,
            })
            .await
            .map_err(|_| Error::ConnectionClosed)?;
        rx.await.map_err(|_| Error::ConnectionClosed)?
    }
}

/// A connected conversational session.
pub struct Session {
    sender: mpsc::Sender<Command>,
    event_rx: mpsc::Receiver<SessionEvent>,
}

/// Configures and connects a [`Session`].
#[must_use]
pub struct SessionBuilder {
    config: SessionConfig,
    handlers: EventHandlers,
    tools: ToolRegistry,
}

impl SessionBuilder {
    pub fn new() -> Self {
        Self {
            config: SessionConfig::new(),
            handlers: EventHandlers::new(),
            tools: ToolRegistry::new(),
        }
    }

    pub fn config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    pub fn handlers(mut self, handlers: EventHandlers) -> Self {
        self.handlers = handlers;
        self
    }

    pub fn tools(mut self, tools: ToolRegistry) -> Self {
        self.tools = tools;
        self
    }

    /// Connect over WebSocket, wait for the server to confirm the session,
    /// then push the configured session settings and tool declarations.
    ///
    /// # Errors
    /// Returns an error if the connection fails or closes before the server
    /// confirms the session.
    pub async fn connect(self, url: &str, bearer_token: Option<&str>) -> Result<Session> {
        let transport = WsClient::connect(url, bearer_token).await?;
        self.connect_with(Box::new(transport)).await
    }

    /// Drive an already-established transport. This is also the seam used
    /// by tests to run a session over in-memory channels.
    ///
    /// # Errors
    /// Returns an error if the transport closes before the server confirms
    /// the session.
    pub async fn connect_with(self, transport: Box<dyn Transport>) -> Result<Session> {
        let Self {
            mut config,
            handlers,
            tools,
        } = self;

        if !tools.is_empty() {
            config.tools = Some(tools.specs()?);
        }

        let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
        let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let (ready_tx, ready_rx) = oneshot::channel();

        let handlers = forward_to_channel(handlers, event_tx.clone());
        let mut router = Router::new(handlers, tools);
        router.begin_connect()?;

        tokio::spawn(drive(transport, router, cmd_rx, event_tx, ready_tx));

        ready_rx.await.map_err(|_| Error::ConnectionClosed)?;

        let session = Session {
            sender: cmd_tx,
            event_rx,
        };
        session.update_session(config).await?;
        Ok(session)
    }
}

impl Default for SessionBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    pub fn builder() -> SessionBuilder {
        SessionBuilder::new()
    }

    #[must_use]
    pub fn handle(&self) -> SessionHandle {
        SessionHandle {
            sender: self.sender.clone(),
        }
    }

    /// Send a user text message without requesting a response.
    ///
    /// # Errors
    /// Returns an error if the text is empty or the send fails.
    pub async fn say(&self, text: &str) -> Result<()> {
        self.send(OutboundMessage::user_message(text)?).await
    }

    /// Request a response using server defaults.
    ///
    /// # Errors
    /// Returns an error if the session is not ready or the send fails.
    pub async fn respond(&self) -> Result<()> {
        self.send(OutboundMessage::response_request(None)).await
    }

    /// Request a response with per-request overrides.
    ///
    /// # Errors
    /// Returns an error if the session is not ready or the send fails.
    pub async fn respond_with(&self, config: ResponseConfig) -> Result<()> {
        self.send(OutboundMessage::response_request(Some(config)))
            .await
    }

    /// Send a user message, request a response, and wait for the resulting
    /// text. Returns `None` if the session closes first.
    ///
    /// # Errors
    /// Returns an error if the sends fail, or `Api` if the server answers
    /// with an error event instead of a response.
    pub async fn ask(&mut self, text: &str) -> Result<Option<String>> {
        self.say(text).await?;
        self.respond().await?;
        loop {
            match self.event_rx.recv().await {
                Some(SessionEvent::Text(text)) => return Ok(Some(text)),
                Some(SessionEvent::Error(payload)) => return Err(Error::Api(payload)),
                Some(SessionEvent::Closed) | None => return Ok(None),
                Some(_) => {}
            }
        }
    }

    /// Append raw audio bytes to the input buffer.
    ///
    /// # Errors
    /// Returns an error if the payload is empty, oversized, or the send
    /// fails.
    pub async fn append_audio(&self, audio: Vec<u8>) -> Result<()> {
        self.send(OutboundMessage::audio_append(audio)?).await
    }

    /// Commit the input audio buffer as a user turn.
    ///
    /// # Errors
    /// Returns an error if the session is not ready or the send fails.
    pub async fn commit_audio(&self) -> Result<()> {
        self.send(OutboundMessage::audio_commit()).await
    }

    /// Discard the uncommitted input audio buffer.
    ///
    /// # Errors
    /// Returns an error if the session is not ready or the send fails.
    pub async fn clear_audio(&self) -> Result<()> {
        self.send(OutboundMessage::audio_clear()).await
    }

    /// Abort the in-flight response.
    ///
    /// # Errors
    /// Returns an error if the session is not ready or the send fails.
    pub async fn cancel(&self, response_id: Option<String>) -> Result<()> {
        self.send(OutboundMessage::cancel_response(response_id))
            .await
    }

    /// Submit a tool result by hand. Valid only for a call that is still
    /// pending; calls the router already resolved are rejected.
    ///
    /// # Errors
    /// Returns `UnknownToolCallId` for an unrecognized or resolved call.
    pub async fn submit_tool_result(
        &self,
        call_id: impl Into<String>,
        output: serde_json::Value,
    ) -> Result<()> {
        self.send(OutboundMessage::tool_result(call_id, output)?)
            .await
    }

    /// Push new session settings.
    ///
    /// # Errors
    /// Returns an error if the session is not ready or the send fails.
    pub async fn update_session(&self, config: SessionConfig) -> Result<()> {
        self.send(OutboundMessage::session_update(config)).await
    }

    /// Send a raw wire event, bypassing outbound validation.
    ///
    /// # Errors
    /// Returns an error if the send fails or the driver is gone.
    pub async fn send_raw(&self, event: ClientEvent) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(Command::SendRaw { event, respond: tx })
            .await
            .map_err(|_| Error::ConnectionClosed)?;
        rx.await.map_err(|_| Error::ConnectionClosed)?
    }

    /// Protocol violations observed by the router so far.
    ///
    /// # Errors
    /// Returns `ConnectionClosed` if the driver is gone.
    pub async fn violations(&self) -> Result<u64> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(Command::Violations { respond: tx })
            .await
            .map_err(|_| Error::ConnectionClosed)?;
        rx.await.map_err(|_| Error::ConnectionClosed)
    }

    /// Close the session. Later calls on this session fail with
    /// `ConnectionClosed`.
    pub async fn close(&self) {
        let (tx, rx) = oneshot::channel();
        if self
            .sender
            .send(Command::Close { respond: tx })
            .await
            .is_ok()
        {
            let _ = rx.await;
        }
    }

    /// Await the next session event.
    pub async fn next_event(&mut self) -> Option<SessionEvent> {
        self.event_rx.recv().await
    }

    /// Session events as a [`Stream`].
    #[must_use]
    pub fn events(&mut self) -> EventStream<'_> {
        EventStream::new(&mut self.event_rx)
    }

    async fn send(&self, message: OutboundMessage) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(Command::Send {
                message,
                respond: tx,
            })
            .await
            .map_err(|_| Error::ConnectionClosed)?;
        rx.await.map_err(|_| Error::ConnectionClosed)?
    }
}

pub struct EventStream<'a> {
    rx: &'a mut mpsc::Receiver<SessionEvent>,
}

impl<'a> EventStream<'a> {
    #[must_use]
    pub const fn new(rx: &'a mut mpsc::Receiver<SessionEvent>) -> Self {
        Self { rx }
    }
}

impl Stream for EventStream<'_> {
    type Item = SessionEvent;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        Pin::new(&mut this.rx).poll_recv(cx)
    }
}

/// Wrap the application's handlers so every routed outcome also lands on
/// the session event channel. Slots that return values to the router
/// (`on_tool_call`) and pre-routing taps pass through untouched.
fn forward_to_channel(
    handlers: EventHandlers,
    tx: mpsc::Sender<SessionEvent>,
) -> EventHandlers {
    let mut out = EventHandlers::new();
    out.on_tool_call = handlers.on_tool_call;
    out.on_raw_event = handlers.on_raw_event;
    out.on_unhandled = handlers.on_unhandled;

    let user = handlers.on_session;
    let sender = tx.clone();
    out = out.on_session(move |session: SessionInfo| {
        let sender = sender.clone();
        let user_fut = user.as_ref().map(|h| h(session.clone()));
        async move {
            let _ = sender.send(SessionEvent::Ready(session)).await;
            if let Some(fut) = user_fut {
                fut.await?;
            }
            Ok(())
        }
    });

    let user = handlers.on_item_created;
    let sender = tx.clone();
    out = out.on_item_created(move |item: Item| {
        let sender = sender.clone();
        let user_fut = user.as_ref().map(|h| h(item.clone()));
        async move {
            let _ = sender.send(SessionEvent::ItemCreated(item)).await;
            if let Some(fut) = user_fut {
                fut.await?;
            }
            Ok(())
        }
    });

    let user = handlers.on_turn_started;
    let sender = tx.clone();
    out = out.on_turn_started(move |response_id: Option<String>| {
        let sender = sender.clone();
        let user_fut = user.as_ref().map(|h| h(response_id.clone()));
        async move {
            let _ = sender.send(SessionEvent::TurnStarted { response_id }).await;
            if let Some(fut) = user_fut {
                fut.await?;
            }
            Ok(())
        }
    });

    let user = handlers.on_text;
    let sender = tx.clone();
    out = out.on_text(move |text: String| {
        let sender = sender.clone();
        let user_fut = user.as_ref().map(|h| h(text.clone()));
        async move {
            let _ = sender.send(SessionEvent::Text(text)).await;
            if let Some(fut) = user_fut {
                fut.await?;
            }
            Ok(())
        }
    });

    let user = handlers.on_transcript;
    let sender = tx.clone();
    out = out.on_transcript(move |transcript: String| {
        let sender = sender.clone();
        let user_fut = user.as_ref().map(|h| h(transcript.clone()));
        async move {
            let _ = sender.send(SessionEvent::Transcript(transcript)).await;
            if let Some(fut) = user_fut {
                fut.await?;
            }
            Ok(())
        }
    });

    let user = handlers.on_audio;
    let sender = tx.clone();
    out = out.on_audio(move |chunks: Vec<Vec<u8>>| {
        let sender = sender.clone();
        let user_fut = user.as_ref().map(|h| h(chunks.clone()));
        async move {
            let _ = sender.send(SessionEvent::Audio(chunks)).await;
            if let Some(fut) = user_fut {
                fut.await?;
            }
            Ok(())
        }
    });

    let user = handlers.on_turn_signal;
    let sender = tx.clone();
    out = out.on_turn_signal(move |signal: TurnSignal| {
        let sender = sender.clone();
        let user_fut = user.as_ref().map(|h| h(signal.clone()));
        async move {
            let _ = sender.send(SessionEvent::Signal(signal)).await;
            if let Some(fut) = user_fut {
                fut.await?;
            }
            Ok(())
        }
    });

    let user = handlers.on_turn_complete;
    let sender = tx.clone();
    out = out.on_turn_complete(move |status: Option<ResponseStatus>| {
        let sender = sender.clone();
        let user_fut = user.as_ref().map(|h| h(status));
        async move {
            let _ = sender.send(SessionEvent::TurnComplete { status }).await;
            if let Some(fut) = user_fut {
                fut.await?;
            }
            Ok(())
        }
    });

    let user = handlers.on_error;
    out = out.on_error(move |payload: ErrorPayload| {
        let sender = tx.clone();
        let user_fut = user.as_ref().map(|h| h(payload.clone()));
        async move {
            let _ = sender.send(SessionEvent::Error(payload)).await;
            if let Some(fut) = user_fut {
                fut.await?;
            }
            Ok(())
        }
    });

    out
}

async fn drive(
    mut transport: Box<dyn Transport>,
    mut router: Router,
    mut cmd_rx: mpsc::Receiver<Command>,
    event_tx: mpsc::Sender<SessionEvent>,
    ready_tx: oneshot::Sender<()>,
) {
    let mut ready_tx = Some(ready_tx);
    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => match cmd {
                Some(Command::Send { message, respond }) => {
                    let submitted_call = match &message {
                        OutboundMessage::ToolResultSubmission { call_id, .. } => {
                            Some(call_id.clone())
                        }
                        _ => None,
                    };
                    let result = match router.prepare_send(message) {
                        Ok(event) => transport.send(event).await,
                        Err(err) => Err(err),
                    };
                    if result.is_ok()
                        && let Some(call_id) = submitted_call
                    {
                        router.mark_submitted(&call_id);
                    }
                    let _ = respond.send(result);
                }
                Some(Command::SendRaw { event, respond }) => {
                    let _ = respond.send(transport.send(event).await);
                }
                Some(Command::Violations { respond }) => {
                    let _ = respond.send(router.violation_count());
                }
                Some(Command::Close { respond }) => {
                    router.close();
                    let _ = event_tx.send(SessionEvent::Closed).await;
                    let _ = respond.send(());
                    break;
                }
                None => {
                    router.close();
                    let _ = event_tx.send(SessionEvent::Closed).await;
                    break;
                }
            },
            incoming = transport.next_event() => match incoming {
                Ok(Some(event)) => {
                    match router.dispatch(event).await {
                        Ok(follow_ups) => {
                            let mut failed = false;
                            for event in follow_ups {
                                if let Err(err) = transport.send(event).await {
                                    tracing::error!("failed to send follow-up event: {err}");
                                    failed = true;
                                    break;
                                }
                            }
                            if failed {
                                router.close();
                                let _ = event_tx.send(SessionEvent::Closed).await;
                                break;
                            }
                        }
                        Err(err) => {
                            tracing::error!("event handler failed: {err}");
                        }
                    }
                    if router.is_ready() {
                        if let Some(tx) = ready_tx.take() {
                            let _ = tx.send(());
                        }
                    }
                }
                Ok(None) => {
                    tracing::info!("transport closed");
                    router.close();
                    let _ = event_tx.send(SessionEvent::Closed).await;
                    break;
                }
                Err(err) => {
                    tracing::error!("transport failed: {err}");
                    router.close();
                    let _ = event_tx.send(SessionEvent::Closed).await;
                    break;
                }
            },
        }
    }
}
