//! MCP Request Handler
//!
//! Routes incoming JSON-RPC requests to the appropriate method handlers.
//! Per-session state (initialization, negotiated version) lives in the
//! session table, so one handler serves every session.

use std::sync::Arc;

use serde_json::{json, Value};
use tracing::{debug, error, info};

use crate::mcp::error::McpError;
use crate::mcp::protocol::*;
use crate::mcp::session::{SessionId, SharedSessionManager};
use crate::mcp::tool_registry::ToolRegistry;
use crate::observability::metrics;
use crate::{APP_NAME, VERSION};

/// Negotiate MCP protocol version
///
/// Picks the highest supported version that is not newer than the client's.
/// A client that names no version gets the current one.
fn negotiate_version(client_version: &str) -> Result<String, McpError> {
    if client_version.trim().is_empty() {
        return Ok(PROTOCOL_VERSION.to_string());
    }

    let negotiated = SUPPORTED_VERSIONS.iter().rev().find(|&&v| v <= client_version).copied();

    match negotiated {
        Some(v) => Ok(v.to_string()),
        None => Err(McpError::UnsupportedProtocolVersion {
            client: client_version.to_string(),
            supported: SUPPORTED_VERSIONS.iter().map(|s| s.to_string()).collect(),
        }),
    }
}

pub struct McpHandler {
    sessions: SharedSessionManager,
    registry: Arc<ToolRegistry>,
}

impl McpHandler {
    pub fn new(sessions: SharedSessionManager, registry: Arc<ToolRegistry>) -> Self {
        Self { sessions, registry }
    }

    /// Handle one JSON-RPC message for `session_id`.
    ///
    /// Returns `None` for notifications, which never get a response.
    pub async fn handle_request(
        &self,
        session_id: &SessionId,
        request: JsonRpcRequest,
    ) -> Option<JsonRpcResponse> {
        let id = request.id.clone();
        metrics::record_request(&request.method);
        debug!(method = %request.method, id = ?id, "Handling MCP request");

        if request.jsonrpc != "2.0" {
            let error = McpError::InvalidRequest(format!(
                "Unsupported jsonrpc version '{}'",
                request.jsonrpc
            ));
            return (!request.is_notification()).then(|| self.error_response(id, error));
        }

        if request.is_notification() {
            self.handle_notification(session_id, &request.method);
            return None;
        }

        let response = match request.method.as_str() {
            "initialize" => self.handle_initialize(session_id, id.clone(), request.params),
            "ping" => JsonRpcResponse::success(id.clone(), json!({})),
            "tools/list" => self.handle_tools_list(id.clone()),
            "tools/call" => self.handle_tools_call(session_id, id.clone(), request.params).await,
            other => self.error_response(id.clone(), McpError::MethodNotFound(other.to_string())),
        };

        debug!(
            method = %request.method,
            id = ?id,
            has_error = response.error.is_some(),
            "Completed MCP request"
        );

        Some(response)
    }

    fn handle_notification(&self, session_id: &SessionId, method: &str) {
        match method {
            "notifications/initialized" => {
                debug!(session_id = %session_id, "Client finished initialization")
            }
            "notifications/cancelled" => {
                // in-flight tool calls always run to completion
                debug!(session_id = %session_id, "Ignoring cancellation notification")
            }
            other => debug!(session_id = %session_id, method = %other, "Ignoring notification"),
        }
    }

    fn handle_initialize(
        &self,
        session_id: &SessionId,
        id: Option<JsonRpcId>,
        params: Value,
    ) -> JsonRpcResponse {
        let params: InitializeParams = match serde_json::from_value(params) {
            Ok(p) => p,
            Err(e) => {
                error!(error = %e, "Failed to parse initialize params");
                return self.error_response(
                    id,
                    McpError::InvalidParams(format!("Failed to parse initialize params: {}", e)),
                );
            }
        };

        let negotiated_version = match negotiate_version(&params.protocol_version) {
            Ok(v) => v,
            Err(e) => return self.error_response(id, e),
        };

        info!(
            session_id = %session_id,
            client_name = %params.client_info.name,
            client_version = %params.client_info.version,
            protocol_version = %negotiated_version,
            "MCP session initialized"
        );
        self.sessions.mark_initialized(session_id, negotiated_version.clone(), params.client_info);

        let result = InitializeResult {
            protocol_version: negotiated_version,
            capabilities: ServerCapabilities {
                tools: Some(ToolsCapability { list_changed: Some(false) }),
            },
            server_info: ServerInfo { name: APP_NAME.to_string(), version: VERSION.to_string() },
            instructions: Some(
                "Convert diagrams, images and documents, and publish Markdown to Confluence. \
                 Updates need the page version you last saw."
                    .to_string(),
            ),
        };

        match serde_json::to_value(result) {
            Ok(value) => JsonRpcResponse::success(id, value),
            Err(e) => self.error_response(id, McpError::SerializationError(e)),
        }
    }

    fn handle_tools_list(&self, id: Option<JsonRpcId>) -> JsonRpcResponse {
        let result = ToolsListResult { tools: self.registry.tools().to_vec(), next_cursor: None };

        match serde_json::to_value(result) {
            Ok(value) => JsonRpcResponse::success(id, value),
            Err(e) => self.error_response(id, McpError::SerializationError(e)),
        }
    }

    async fn handle_tools_call(
        &self,
        session_id: &SessionId,
        id: Option<JsonRpcId>,
        params: Value,
    ) -> JsonRpcResponse {
        if !self.sessions.is_initialized(session_id) {
            return self.error_response(id, McpError::NotInitialized);
        }

        let params: ToolCallParams = match serde_json::from_value(params) {
            Ok(p) => p,
            Err(e) => {
                error!(error = %e, "Failed to parse tool call params");
                return self.error_response(
                    id,
                    McpError::InvalidParams(format!("Failed to parse tool call params: {}", e)),
                );
            }
        };

        match self.registry.call(&params.name, params.arguments).await {
            Ok(tool_result) => match serde_json::to_value(tool_result) {
                Ok(value) => JsonRpcResponse::success(id, value),
                Err(e) => self.error_response(id, McpError::SerializationError(e)),
            },
            Err(e) => self.error_response(id, e),
        }
    }

    fn error_response(&self, id: Option<JsonRpcId>, error: McpError) -> JsonRpcResponse {
        JsonRpcResponse::failure(id, error.into())
    }
}
