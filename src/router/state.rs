//! Session lifecycle state.

use crate::protocol::models::SessionConfig;
use crate::{Error, Result};

/// Connection lifecycle phase. `Closed` is absorbing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionPhase {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Closed,
}

impl std::fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Closed => "closed",
        };
        write!(f, "{name}")
    }
}

/// Session identity and readiness.
///
/// Readiness is confirmed by the server (`session.created` /
/// `session.updated`), never assumed at transport connect time.
#[derive(Debug, Default)]
pub struct SessionState {
    phase: SessionPhase,
    session_id: Option<String>,
    config: Option<SessionConfig>,
}

impl SessionState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub const fn phase(&self) -> SessionPhase {
        self.phase
    }

    #[must_use]
    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    /// Configuration last surfaced by the server.
    #[must_use]
    pub const fn config(&self) -> Option<&SessionConfig> {
        self.config.as_ref()
    }

    #[must_use]
    pub const fn is_ready(&self) -> bool {
        matches!(self.phase, SessionPhase::Connected)
    }

    /// Begin connecting. Valid only from `Disconnected`.
    ///
    /// # Errors
    /// Returns `InvalidState` from any other phase.
    pub fn connect(&mut self) -> Result<()> {
        match self.phase {
            SessionPhase::Disconnected => {
                self.phase = SessionPhase::Connecting;
                Ok(())
            }
            phase => Err(Error::InvalidState(phase)),
        }
    }

    /// Record server-confirmed readiness. A repeat call (session.updated)
    /// refreshes the surfaced config; after `Closed` it is ignored.
    pub fn mark_ready(&mut self, session_id: Option<String>, config: SessionConfig) {
        if self.phase == SessionPhase::Closed {
            return;
        }
        self.phase = SessionPhase::Connected;
        if session_id.is_some() {
            self.session_id = session_id;
        }
        self.config = Some(config);
    }

    /// Transition to `Closed`. Idempotent from every phase.
    pub fn close(&mut self) {
        self.phase = SessionPhase::Closed;
    }

    /// Gate for outbound traffic.
    ///
    /// # Errors
    /// Returns `InvalidState` carrying the current phase unless `Connected`.
    pub fn ensure_ready(&self) -> Result<()> {
        if self.is_ready() {
            Ok(())
        } else {
            Err(Error::InvalidState(self.phase))
        }
    }
}
