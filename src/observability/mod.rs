//! # Observability Infrastructure
//!
//! Structured logging through `tracing` and counters through `metrics`, with an
//! optional Prometheus scrape endpoint.

pub mod logging;
pub mod metrics;

pub use logging::{init_logging, log_config_info};
pub use metrics::init_metrics;

use crate::config::ObservabilityConfig;
use crate::errors::Result;
use ::tracing::info;

/// Initialize logging, then metrics when a port is configured
pub fn init_observability(config: &ObservabilityConfig) -> Result<()> {
    init_logging(config)?;

    if config.metrics_port != 0 {
        init_metrics(config)?;
    }

    info!(
        log_level = %config.log_level,
        json_logs = config.json_logs,
        metrics_port = config.metrics_port,
        "Observability initialized"
    );
    Ok(())
}
