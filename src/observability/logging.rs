//! # Structured Logging

use tracing_subscriber::EnvFilter;

use crate::config::{Config, ObservabilityConfig};
use crate::errors::{Error, Result};

/// Install the global subscriber.
///
/// `RUST_LOG` takes precedence over the configured level.
pub fn init_logging(config: &ObservabilityConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .map_err(|e| Error::config(format!("Invalid log level '{}': {}", config.log_level, e)))?;

    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(true);
    let result = if config.json_logs {
        builder.json().with_current_span(true).try_init()
    } else {
        builder.try_init()
    };

    result.map_err(|e| Error::config(format!("Failed to install log subscriber: {}", e)))
}

/// Create a tracing span for one MCP session
#[macro_export]
macro_rules! session_span {
    ($session_id:expr) => {
        tracing::info_span!("mcp_session", session_id = %$session_id)
    };
    ($session_id:expr, $($field:tt)*) => {
        tracing::info_span!("mcp_session", session_id = %$session_id, $($field)*)
    };
}

/// Log configuration at startup
pub fn log_config_info(config: &Config) {
    tracing::info!(
        server_address = %config.server.socket_address(),
        converter = ?config.converter.backend,
        diagram_format = %config.converter.diagram_format,
        rate_limit_max_requests = config.rate_limit.max_requests,
        rate_limit_window_ms = config.rate_limit.window_ms,
        trust_forwarded_for = config.rate_limit.trust_forwarded_for,
        confluence_configured = config.confluence.base_url.is_some(),
        default_space_key = ?config.confluence.default_space_key,
        cache_path = %config.publish.cache_path.display(),
        "pageplane configuration"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_macros_compile() {
        let _span = session_span!("mcp-1234");
        let _span = session_span!("mcp-1234", method = "tools/call");
    }

    #[test]
    fn test_log_config_info() {
        let config = Config::default();
        log_config_info(&config);
    }
}
