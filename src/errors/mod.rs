//! # Error Handling
//!
//! Error types for the pageplane gateway. Each layer owns a typed error
//! (`ConversionError`, `StoreError`, `TransportError`, `AuthError`) that folds
//! into the crate-wide [`Error`] through `From`.

use std::time::Duration;

use crate::auth::AuthError;
use crate::confluence::StoreError;
use crate::converter::ConversionError;
use crate::mcp::session::TransportError;

/// Custom result type for pageplane operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the pageplane gateway
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Missing or invalid configuration. Fatal at startup.
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Authentication error: {0}")]
    Auth(#[from] AuthError),

    #[error("Rate limit exceeded, retry after {retry_after}s")]
    RateLimit { retry_after: u64 },

    #[error("Conversion error: {0}")]
    Conversion(#[from] ConversionError),

    /// Optimistic-concurrency version mismatch reported by the document store
    #[error("Version conflict on page '{page_id}': {message}")]
    Conflict { page_id: String, message: String },

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Not found: {0}")]
    NotFound(String),

    /// Caller-supplied input failed validation
    #[error("Validation error: {0}")]
    Validation(String),

    /// Remote document store failures other than conflicts and missing pages
    #[error("Document store error: {0}")]
    Store(String),

    #[error("I/O error: {context}")]
    Io {
        #[source]
        source: std::io::Error,
        context: String,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Operation timed out: {operation} after {}ms", .after.as_millis())]
    Timeout { operation: String, after: Duration },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config(message.into())
    }

    /// Create a new validation error
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation(message.into())
    }

    /// Create a new not-found error
    pub fn not_found<S: Into<String>>(message: S) -> Self {
        Self::NotFound(message.into())
    }

    /// Create a new internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal(message.into())
    }

    /// Create an I/O error with context
    pub fn io<S: Into<String>>(source: std::io::Error, context: S) -> Self {
        Self::Io { source, context: context.into() }
    }

    /// Stable machine-readable kind, surfaced to MCP clients in tool errors
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Config(_) => "configuration_error",
            Error::Auth(_) => "authentication_error",
            Error::RateLimit { .. } => "rate_limit_error",
            Error::Conversion(_) => "conversion_error",
            Error::Conflict { .. } => "conflict_error",
            Error::Transport(_) => "transport_error",
            Error::NotFound(_) => "not_found",
            Error::Validation(_) => "validation_error",
            Error::Store(_) => "store_error",
            Error::Io { .. } => "io_error",
            Error::Serialization(_) => "serialization_error",
            Error::Timeout { .. } => "timeout",
            Error::Internal(_) => "internal_error",
        }
    }
}

impl From<StoreError> for Error {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict { page_id, message } => Error::Conflict { page_id, message },
            StoreError::NotFound(id) => Error::NotFound(format!("page '{}'", id)),
            other => Error::Store(other.to_string()),
        }
    }
}

impl From<validator::ValidationErrors> for Error {
    fn from(errors: validator::ValidationErrors) -> Self {
        Error::Config(errors.to_string())
    }
}
