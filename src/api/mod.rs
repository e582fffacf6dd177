//! # HTTP API
//!
//! Axum router serving the MCP SSE transport plus a health check.

pub mod error;
pub mod health;
pub mod rate_limit;
pub mod routes;
pub mod server;

pub use error::ApiError;
pub use rate_limit::RateLimiter;
pub use routes::{build_router, AppState, MESSAGES_PATH, SSE_PATH};
pub use server::{serve, start_api_server};
