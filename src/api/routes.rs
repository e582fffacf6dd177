use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::api::health::health_handler;
use crate::api::rate_limit::{rate_limit, RateLimiter};
use crate::auth::{authenticate, Authenticator};
use crate::mcp::handler::McpHandler;
use crate::mcp::messages::messages_handler;
use crate::mcp::session::SharedSessionManager;
use crate::mcp::sse::sse_handler;

/// Path clients POST their JSON-RPC messages to
pub const MESSAGES_PATH: &str = "/messages";

/// Path that opens an SSE session
pub const SSE_PATH: &str = "/sse";

#[derive(Clone)]
pub struct AppState {
    pub sessions: SharedSessionManager,
    pub handler: Arc<McpHandler>,
    pub authenticator: Arc<Authenticator>,
    pub rate_limiter: RateLimiter,
}

/// Build the HTTP router.
///
/// `/health` is open. The MCP endpoints sit behind the rate limiter and then
/// the authenticator, so rejected credentials still count against the limit.
pub fn build_router(state: AppState) -> Router {
    let mcp = Router::new()
        .route(SSE_PATH, get(sse_handler))
        .route(MESSAGES_PATH, post(messages_handler))
        .layer(middleware::from_fn_with_state(state.authenticator.clone(), authenticate))
        .layer(middleware::from_fn_with_state(state.rate_limiter.clone(), rate_limit));

    Router::new()
        .route("/health", get(health_handler))
        .merge(mcp)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
