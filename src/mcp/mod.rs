//! MCP (Model Context Protocol) Server Implementation
//!
//! JSON-RPC 2.0 over Server-Sent Events: clients hold `GET /sse` open and
//! POST their messages to `/messages?sessionId=<id>`.

pub mod error;
pub mod handler;
pub mod messages;
pub mod protocol;
pub mod security;
pub mod session;
pub mod sse;
pub mod tool_registry;
pub mod tools;

pub use error::McpError;
pub use handler::McpHandler;
pub use messages::messages_handler;
pub use protocol::*;
pub use session::{
    create_session_manager, SessionId, SessionManager, SessionState, SharedSessionManager,
    SseMessage, TransportError,
};
pub use sse::sse_handler;
pub use tool_registry::ToolRegistry;
