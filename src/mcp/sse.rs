//! MCP SSE (Server-Sent Events) Transport
//!
//! `GET /sse` opens a session and holds the stream. The first event is
//! `endpoint`, carrying the URL the client must POST its JSON-RPC messages
//! to. Responses to those messages arrive later as `message` events.

use std::convert::Infallible;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use axum::{
    extract::State,
    http::{HeaderName, HeaderValue},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
};
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::{Stream, StreamExt};
use tracing::{error, info};

use crate::api::error::ApiError;
use crate::api::routes::{AppState, MESSAGES_PATH};
use crate::mcp::session::{SessionId, SharedSessionManager, SseMessage};

/// Stream wrapper that closes the session when dropped
///
/// Axum drops the response stream as soon as the client goes away, so the
/// session disappears from the table without waiting for a failed send.
struct CleanupStream<S> {
    inner: S,
    sessions: SharedSessionManager,
    session_id: SessionId,
}

impl<S> CleanupStream<S> {
    fn new(inner: S, sessions: SharedSessionManager, session_id: SessionId) -> Self {
        Self { inner, sessions, session_id }
    }
}

impl<S: Stream + Unpin> Stream for CleanupStream<S> {
    type Item = S::Item;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

impl<S> Drop for CleanupStream<S> {
    fn drop(&mut self) {
        info!(session_id = %self.session_id, "SSE connection closed, cleaning up");
        self.sessions.close(&self.session_id);
    }
}

/// SSE keep-alive interval
const KEEP_ALIVE_INTERVAL_SECS: u64 = 15;

/// Response header echoing the issued session id
pub const MCP_SESSION_ID_HEADER: &str = "mcp-session-id";

/// Format an outbound message as an SSE event
fn format_sse_event(message: SseMessage) -> Result<Event, Infallible> {
    let event = Event::default().event(message.event_type());
    let event = match message {
        SseMessage::Endpoint(url) => event.data(url),
        SseMessage::Message(response) => {
            let data = serde_json::to_string(&response).unwrap_or_else(|e| {
                error!(error = %e, "Failed to serialize JSON-RPC response");
                "{}".to_string()
            });
            event.data(data)
        }
    };
    Ok(event)
}

/// GET /sse
///
/// Establishes an SSE session.
///
/// # Events
/// - `endpoint`: `/messages?sessionId=<id>`, sent once, first
/// - `message`: JSON-RPC responses
pub async fn sse_handler(State(state): State<AppState>) -> Result<Response, ApiError> {
    let sessions = state.sessions.clone();
    let (session_id, receiver) = sessions.open();

    let endpoint = format!("{}?sessionId={}", MESSAGES_PATH, session_id);
    if let Err(e) = sessions.complete_handshake(&session_id, endpoint) {
        sessions.close(&session_id);
        return Err(ApiError::Internal(format!("Failed to open session: {}", e)));
    }

    info!(
        session_id = %session_id,
        active_sessions = sessions.total_sessions(),
        "SSE session established"
    );

    let events = ReceiverStream::new(receiver).map(format_sse_event);
    let stream = CleanupStream::new(events, sessions, session_id.clone());

    let mut response = Sse::new(stream)
        .keep_alive(KeepAlive::new().interval(Duration::from_secs(KEEP_ALIVE_INTERVAL_SECS)))
        .into_response();

    if let Ok(value) = HeaderValue::from_str(session_id.as_str()) {
        response.headers_mut().insert(HeaderName::from_static(MCP_SESSION_ID_HEADER), value);
    }

    Ok(response)
}
