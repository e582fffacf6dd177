//! Startup sequence for the pageplane gateway
//!
//! Wires configuration into the running components: authenticator, rate
//! limiter, converter, diagram pipeline, publish workflow and MCP handler.
//! Any configuration error surfaces here, before the listener binds.

use std::sync::Arc;

use tracing::{info, warn};

use crate::api::{AppState, RateLimiter};
use crate::auth::Authenticator;
use crate::config::{Config, ConverterBackend, ConverterConfig};
use crate::confluence::{ConfluenceClient, DocumentStore};
use crate::converter::{CliConverter, Converter, HttpConverter};
use crate::errors::Result;
use crate::mcp::session::create_session_manager;
use crate::mcp::tools::ToolContext;
use crate::mcp::{McpHandler, ToolRegistry};
use crate::pipeline::DiagramPipeline;
use crate::publish::{PageCache, PublishWorkflow, TargetDefaults};

/// Build the configured converter backend
pub fn build_converter(config: &ConverterConfig) -> Result<Arc<dyn Converter>> {
    let converter: Arc<dyn Converter> = match config.backend {
        ConverterBackend::Cli => Arc::new(CliConverter::new(config)),
        ConverterBackend::Http => {
            let base_url = config.base_url.clone().unwrap_or_default();
            Arc::new(HttpConverter::new(base_url, config.timeout())?)
        }
    };
    info!(backend = converter.backend_name(), "Converter ready");
    Ok(converter)
}

/// Build the application state from configuration alone
pub async fn build_state(config: &Config) -> Result<AppState> {
    let converter = build_converter(&config.converter)?;
    let store = ConfluenceClient::from_config(&config.confluence)?
        .map(|client| Arc::new(client) as Arc<dyn DocumentStore>);
    build_state_with(config, converter, store).await
}

/// Build the application state around an explicit converter and document store.
///
/// Without a store the publish tools report a configuration error when called;
/// everything else works.
pub async fn build_state_with(
    config: &Config,
    converter: Arc<dyn Converter>,
    store: Option<Arc<dyn DocumentStore>>,
) -> Result<AppState> {
    let authenticator =
        Arc::new(Authenticator::new(config.auth.token.as_deref().map(String::as_str))?);
    let rate_limiter = RateLimiter::from_config(&config.rate_limit);

    let pipeline = Arc::new(DiagramPipeline::new(
        converter.clone(),
        config.converter.diagram_format,
        config.converter.timeout(),
    ));

    let publisher = match store {
        Some(store) => {
            let cache = Arc::new(PageCache::load(&config.publish.cache_path).await?);
            info!(
                cache_path = %config.publish.cache_path.display(),
                mappings = cache.len().await,
                "Loaded page cache"
            );
            let defaults = TargetDefaults::from_config(&config.confluence, &config.publish);
            Some(Arc::new(PublishWorkflow::new(
                store,
                converter.clone(),
                pipeline.clone(),
                cache,
                defaults,
            )))
        }
        None => {
            warn!("Confluence is not configured; publish tools are disabled");
            None
        }
    };

    let registry = ToolRegistry::new(ToolContext {
        converter,
        pipeline,
        publisher,
        project_dir: config.publish.project_dir.clone(),
    })?;

    let sessions = create_session_manager();
    let handler = Arc::new(McpHandler::new(sessions.clone(), Arc::new(registry)));

    Ok(AppState { sessions, handler, authenticator, rate_limiter })
}
