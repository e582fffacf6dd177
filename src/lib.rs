//! # Pageplane
//!
//! An MCP gateway that turns Markdown into published wiki pages. Clients
//! connect over Server-Sent Events, authenticate with a shared secret and
//! call tools that convert diagrams, images and documents, or publish
//! Markdown to Confluence with its Mermaid diagrams rendered and attached.
//!
//! ## Architecture
//!
//! ```text
//! SSE transport → MCP handler → tools → diagram pipeline → converter
//!      ↓                                       ↓
//! auth + rate limit                    publish workflow → Confluence
//!                                              ↓
//!                                         page cache
//! ```
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use pageplane::{api::start_api_server, startup::build_state, Config, Result};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = Config::from_env()?;
//!     let state = build_state(&config).await?;
//!     start_api_server(&config.server, state).await
//! }
//! ```

pub mod api;
pub mod auth;
pub mod config;
pub mod confluence;
pub mod converter;
pub mod errors;
pub mod mcp;
pub mod observability;
pub mod pipeline;
pub mod publish;
pub mod startup;

pub use config::Config;
pub use errors::{Error, Result};

/// Application version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name from Cargo.toml
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_available() {
        assert!(!VERSION.is_empty());
        assert_eq!(APP_NAME, "pageplane");
    }
}
