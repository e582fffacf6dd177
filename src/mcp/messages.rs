//! MCP message intake
//!
//! `POST /messages?sessionId=<id>` accepts one JSON-RPC message for an open
//! session. The HTTP response only acknowledges receipt; the JSON-RPC reply
//! is delivered later on the session's SSE stream.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use tracing::{debug, warn, Instrument};

use crate::api::error::ApiError;
use crate::api::routes::AppState;
use crate::mcp::error::McpError;
use crate::mcp::handler::McpHandler;
use crate::mcp::protocol::{JsonRpcRequest, JsonRpcResponse};
use crate::mcp::session::{SessionId, SharedSessionManager, SseMessage, TransportError};
use crate::mcp::sse::MCP_SESSION_ID_HEADER;
use crate::session_span;

#[derive(Debug, Deserialize)]
pub struct MessagesQuery {
    #[serde(rename = "sessionId")]
    pub session_id: Option<String>,
}

/// POST /messages
///
/// # Responses
/// - `202 Accepted`: message queued for the session
/// - `400 Bad Request`: no `sessionId`, or a body that is not a JSON-RPC message
/// - `404 Not Found`: unknown, malformed or closed session
pub async fn messages_handler(
    State(state): State<AppState>,
    Query(query): Query<MessagesQuery>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let raw_id = query
        .session_id
        .ok_or_else(|| ApiError::BadRequest("sessionId query parameter is required".to_string()))?;

    let session_id = state.sessions.route(&raw_id)?;

    let request: JsonRpcRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            debug!(session_id = %session_id, error = %e, "Rejected unparseable message");
            let error = McpError::ParseError(e.to_string());
            let body = Json(JsonRpcResponse::failure(None, error.into()));
            return Ok((StatusCode::BAD_REQUEST, body).into_response());
        }
    };

    dispatch(state.handler.clone(), state.sessions.clone(), session_id.clone(), request);

    let mut response = StatusCode::ACCEPTED.into_response();
    if let Ok(value) = HeaderValue::from_str(session_id.as_str()) {
        response.headers_mut().insert(HeaderName::from_static(MCP_SESSION_ID_HEADER), value);
    }
    Ok(response)
}

/// Handle `request` in the background and push the reply onto the session's stream.
///
/// If the session is gone by the time the reply is ready, the reply is dropped.
pub fn dispatch(
    handler: Arc<McpHandler>,
    sessions: SharedSessionManager,
    session_id: SessionId,
    request: JsonRpcRequest,
) {
    let span = session_span!(session_id, method = %request.method);
    tokio::spawn(
        async move {
            let Some(response) = handler.handle_request(&session_id, request).await else {
                return;
            };

            match sessions.send(&session_id, SseMessage::Message(response)).await {
                Ok(()) => {}
                Err(TransportError::SessionNotFound(_) | TransportError::SessionClosed(_)) => {
                    debug!("Session went away before the reply was ready; discarding it")
                }
                Err(e) => warn!(error = %e, "Failed to deliver reply"),
            }
        }
        .instrument(span),
    );
}
