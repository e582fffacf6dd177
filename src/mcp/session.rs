//! MCP Session Registry
//!
//! Tracks live SSE sessions. A session is `Opening` from registration until
//! its handshake event is queued, then `Open`. Closing a session removes it
//! from the table; a closed session is simply absent.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::debug;

use crate::mcp::protocol::{ClientInfo, JsonRpcResponse};
use crate::mcp::security::{generate_secure_session_id, validate_session_id_format};
use crate::observability::metrics;

/// Channel capacity for outbound SSE messages per session
const CHANNEL_CAPACITY: usize = 100;

/// How long a reply may wait for room in a full session channel
const DELIVERY_TIMEOUT: Duration = Duration::from_secs(30);

/// Newtype for session IDs
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionId(String);

impl SessionId {
    /// Issue a fresh random id
    pub fn generate() -> Self {
        Self(generate_secure_session_id())
    }

    /// Parse a client-supplied id, rejecting anything we could not have issued
    pub fn parse(raw: &str) -> Result<Self, TransportError> {
        validate_session_id_format(raw)
            .map(|_| Self(raw.to_string()))
            .map_err(|_| TransportError::SessionNotFound(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Messages delivered down an SSE stream
#[derive(Debug, Clone)]
pub enum SseMessage {
    /// Handshake telling the client where to POST
    Endpoint(String),
    /// JSON-RPC response for an earlier request
    Message(JsonRpcResponse),
}

impl SseMessage {
    /// SSE event type for this message
    pub fn event_type(&self) -> &'static str {
        match self {
            SseMessage::Endpoint(_) => "endpoint",
            SseMessage::Message(_) => "message",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Opening,
    Open,
}

/// Failures routing a message to a session
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("session '{0}' not found")]
    SessionNotFound(String),

    #[error("session '{0}' closed")]
    SessionClosed(String),

    #[error("session '{0}' stopped draining its stream; message not delivered")]
    Backpressure(String),
}

/// Individual session state
pub struct Session {
    pub sender: mpsc::Sender<SseMessage>,
    pub state: SessionState,
    pub created_at: Instant,
    pub initialized: bool,
    pub protocol_version: Option<String>,
    pub client_info: Option<ClientInfo>,
}

/// Session manager for SSE transport
pub struct SessionManager {
    sessions: DashMap<SessionId, Session>,
    delivery_timeout: Duration,
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new()
    }
}

pub type SharedSessionManager = Arc<SessionManager>;

impl SessionManager {
    pub fn new() -> Self {
        Self::with_delivery_timeout(DELIVERY_TIMEOUT)
    }

    pub fn with_delivery_timeout(delivery_timeout: Duration) -> Self {
        Self { sessions: DashMap::new(), delivery_timeout }
    }

    /// Register a new session in the `Opening` state.
    ///
    /// Returns the session id and the receiving half of its message channel.
    pub fn open(&self) -> (SessionId, mpsc::Receiver<SseMessage>) {
        let (sender, receiver) = mpsc::channel(CHANNEL_CAPACITY);

        let mut id = SessionId::generate();
        while self.sessions.contains_key(&id) {
            id = SessionId::generate();
        }

        self.sessions.insert(
            id.clone(),
            Session {
                sender,
                state: SessionState::Opening,
                created_at: Instant::now(),
                initialized: false,
                protocol_version: None,
                client_info: None,
            },
        );
        metrics::record_session_opened();
        debug!(session_id = %id, "Registered new SSE session");

        (id, receiver)
    }

    /// Complete the handshake: queue the endpoint event and mark the session `Open`.
    pub fn complete_handshake(
        &self,
        session_id: &SessionId,
        endpoint: String,
    ) -> Result<(), TransportError> {
        let mut session = self
            .sessions
            .get_mut(session_id)
            .ok_or_else(|| TransportError::SessionNotFound(session_id.to_string()))?;

        session
            .sender
            .try_send(SseMessage::Endpoint(endpoint))
            .map_err(|_| TransportError::SessionClosed(session_id.to_string()))?;
        session.state = SessionState::Open;
        Ok(())
    }

    /// Remove a session. Idempotent.
    pub fn close(&self, session_id: &SessionId) {
        if let Some((_, session)) = self.sessions.remove(session_id) {
            metrics::record_session_closed();
            debug!(
                session_id = %session_id,
                age_ms = session.created_at.elapsed().as_millis() as u64,
                "Closed SSE session"
            );
        }
    }

    /// Remove every session, ending their streams
    pub fn close_all(&self) {
        let ids: Vec<SessionId> = self.sessions.iter().map(|entry| entry.key().clone()).collect();
        for id in ids {
            self.close(&id);
        }
    }

    /// Whether `session_id` refers to an open session
    pub fn is_open(&self, session_id: &SessionId) -> bool {
        self.sessions.get(session_id).map(|s| s.state == SessionState::Open).unwrap_or(false)
    }

    /// Check that a client-supplied session id can accept requests
    pub fn route(&self, raw_id: &str) -> Result<SessionId, TransportError> {
        let id = SessionId::parse(raw_id)?;
        if self.is_open(&id) {
            Ok(id)
        } else {
            Err(TransportError::SessionNotFound(raw_id.to_string()))
        }
    }

    /// Deliver a message to a session's stream.
    ///
    /// Waits for room when the channel is full, up to the delivery timeout.
    /// A session whose receiver is gone is removed on the spot.
    pub async fn send(
        &self,
        session_id: &SessionId,
        message: SseMessage,
    ) -> Result<(), TransportError> {
        let sender = self
            .sessions
            .get(session_id)
            .map(|s| s.sender.clone())
            .ok_or_else(|| TransportError::SessionNotFound(session_id.to_string()))?;

        match tokio::time::timeout(self.delivery_timeout, sender.send(message)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => {
                self.close(session_id);
                Err(TransportError::SessionClosed(session_id.to_string()))
            }
            Err(_) => Err(TransportError::Backpressure(session_id.to_string())),
        }
    }

    /// Record the outcome of `initialize`
    pub fn mark_initialized(
        &self,
        session_id: &SessionId,
        protocol_version: String,
        client_info: ClientInfo,
    ) {
        if let Some(mut session) = self.sessions.get_mut(session_id) {
            session.initialized = true;
            session.protocol_version = Some(protocol_version);
            session.client_info = Some(client_info);
        }
    }

    pub fn is_initialized(&self, session_id: &SessionId) -> bool {
        self.sessions.get(session_id).map(|s| s.initialized).unwrap_or(false)
    }

    pub fn total_sessions(&self) -> usize {
        self.sessions.len()
    }
}

pub fn create_session_manager() -> SharedSessionManager {
    Arc::new(SessionManager::new())
}
