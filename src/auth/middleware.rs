//! Axum middleware for shared-secret authentication.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{header::AUTHORIZATION, header::USER_AGENT, HeaderMap, Request},
    middleware::Next,
    response::Response,
};
use tracing::warn;

use crate::api::error::ApiError;
use crate::auth::Authenticator;
use crate::observability::metrics;

pub type AuthenticatorState = Arc<Authenticator>;

/// Fallback header for clients that cannot set `Authorization`
pub const API_KEY_HEADER: &str = "x-api-key";

/// Middleware entry point that rejects requests without the shared secret.
pub async fn authenticate(
    State(authenticator): State<AuthenticatorState>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let credential = extract_credential(request.headers());

    match authenticator.verify(credential.as_deref()) {
        Ok(()) => Ok(next.run(request).await),
        Err(err) => {
            let origin = client_origin(&request, true);
            let user_agent = request
                .headers()
                .get(USER_AGENT)
                .and_then(|v| v.to_str().ok())
                .unwrap_or("unknown");
            warn!(
                http.method = %request.method(),
                http.path = %request.uri().path(),
                origin = %origin,
                user_agent = %user_agent,
                reason = err.reason(),
                "authentication failed"
            );
            metrics::record_auth_failure(err.reason());
            Err(ApiError::Unauthorized(err.to_string()))
        }
    }
}

/// Read the credential from `Authorization: Bearer` or the API-key header
fn extract_credential(headers: &HeaderMap) -> Option<String> {
    let bearer = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer ").or_else(|| v.strip_prefix("bearer ")))
        .map(|v| v.trim().to_string());

    bearer.or_else(|| {
        headers.get(API_KEY_HEADER).and_then(|v| v.to_str().ok()).map(|v| v.trim().to_string())
    })
}

/// Client origin: the first `X-Forwarded-For` hop when `trust_forwarded_for`
/// is set and the header is present, otherwise the peer address.
///
/// The forwarded header is client-controlled, so anything that must not be
/// spoofable (rate-limit keys) passes `false` unless a proxy rewrites it.
pub fn client_origin<B>(request: &Request<B>, trust_forwarded_for: bool) -> String {
    let forwarded = request
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());
    if let (true, Some(forwarded)) = (trust_forwarded_for, forwarded) {
        return forwarded.to_string();
    }

    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}
