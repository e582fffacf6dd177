use std::net::SocketAddr;

use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::{config::ServerConfig, errors::Error};

use super::routes::{build_router, AppState};

pub async fn start_api_server(config: &ServerConfig, state: AppState) -> crate::Result<()> {
    let addr: SocketAddr = config
        .socket_address()
        .parse()
        .map_err(|e| Error::config(format!("Invalid bind address: {}", e)))?;

    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| Error::io(e, format!("binding API server to {}", addr)))?;

    info!(address = %addr, "Starting HTTP API server");
    serve(listener, state).await?;

    info!("API server shutdown completed");
    Ok(())
}

/// Serve on an already bound listener until ctrl-c.
///
/// Open SSE streams never finish on their own, so shutdown closes every
/// session to let the connections drain.
pub async fn serve(listener: TcpListener, state: AppState) -> crate::Result<()> {
    let sessions = state.sessions.clone();
    let router = build_router(state);

    axum::serve(listener, router.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "API server shutdown listener failed");
            }
            info!(active_sessions = sessions.total_sessions(), "Closing SSE sessions");
            sessions.close_all();
        })
        .await
        .map_err(|e| Error::io(e, "serving HTTP API"))
}
