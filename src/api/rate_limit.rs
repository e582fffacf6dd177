//! Fixed-window rate limiting for the MCP endpoints.
//!
//! Each client key gets a counter that resets when its window expires.
//! Expired entries are evicted lazily on admission checks, so the table only
//! holds keys seen within the last window.
//!
//! Clients are keyed by peer address. `X-Forwarded-For` is honoured only when
//! the deployment opts in, since any client can set it.
//!
//! # Configuration
//!
//! - `PAGEPLANE_RATE_LIMIT_MAX_REQUESTS`: Requests allowed per window (default: 100)
//! - `PAGEPLANE_RATE_LIMIT_WINDOW_MS`: Window length in milliseconds (default: 60000)
//! - `PAGEPLANE_TRUST_FORWARDED_FOR`: Key on the forwarded client address (default: false)

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::Response,
};
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::api::error::ApiError;
use crate::auth::client_origin;
use crate::config::RateLimitConfig;
use crate::observability::metrics;

/// Request counter for one client within the current window.
#[derive(Debug, Clone)]
struct RateLimitEntry {
    count: u32,
    window_reset_at: Instant,
}

/// Fixed-window rate limiter keyed by client origin.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    entries: Arc<Mutex<HashMap<String, RateLimitEntry>>>,
    max_requests: u32,
    window: Duration,
    trust_forwarded_for: bool,
}

impl RateLimiter {
    /// Create a new rate limiter.
    ///
    /// # Arguments
    /// - `max_requests`: Requests admitted per window
    /// - `window`: Window length
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
            max_requests,
            window,
            trust_forwarded_for: false,
        }
    }

    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::new(config.max_requests, config.window())
            .trust_forwarded_for(config.trust_forwarded_for)
    }

    /// Key clients by the first `X-Forwarded-For` hop when present
    pub fn trust_forwarded_for(mut self, trust: bool) -> Self {
        self.trust_forwarded_for = trust;
        self
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Admit or reject one request for `client_key`.
    ///
    /// # Returns
    /// - `Ok(())` if the request is admitted
    /// - `Err(retry_after_secs)` if the window is exhausted; always between 1
    ///   and the window length in seconds (rounded up)
    pub async fn admit(&self, client_key: &str) -> Result<(), u64> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;

        let before = entries.len();
        entries.retain(|_, entry| now <= entry.window_reset_at);
        if entries.len() < before {
            debug!(evicted = before - entries.len(), "Evicted expired rate limit entries");
        }

        let entry = entries
            .entry(client_key.to_string())
            .or_insert_with(|| RateLimitEntry { count: 0, window_reset_at: now + self.window });

        if entry.count < self.max_requests {
            entry.count += 1;
            debug!(
                key = %client_key,
                count = entry.count,
                max_requests = self.max_requests,
                "Rate limit check passed"
            );
            return Ok(());
        }

        let remaining = entry.window_reset_at.saturating_duration_since(now);
        let window_secs = self.window.as_secs_f64().ceil().max(1.0) as u64;
        let retry_after = (remaining.as_secs_f64().ceil() as u64).clamp(1, window_secs);

        warn!(key = %client_key, retry_after_seconds = retry_after, "Rate limit exceeded");
        Err(retry_after)
    }

    /// Number of tracked client keys, including expired ones not yet evicted
    pub async fn tracked_keys(&self) -> usize {
        self.entries.lock().await.len()
    }
}

/// Middleware entry point applying the limiter per client origin.
pub async fn rate_limit(
    State(limiter): State<RateLimiter>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let key = client_origin(&request, limiter.trust_forwarded_for);
    match limiter.admit(&key).await {
        Ok(()) => Ok(next.run(request).await),
        Err(retry_after) => {
            metrics::record_rate_limited();
            Err(ApiError::TooManyRequests { retry_after })
        }
    }
}
