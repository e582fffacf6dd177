//! Session identifier generation and validation.
//!
//! Session ids are `mcp-{uuid-v4}`. UUID v4 carries 122 random bits drawn
//! from the operating system CSPRNG, so ids are neither sequential nor
//! guessable from earlier ones.

use lazy_static::lazy_static;
use regex::Regex;
use uuid::Uuid;

use crate::mcp::error::McpError;

lazy_static! {
    /// Format: mcp-{uuid-v4}
    static ref SESSION_ID_REGEX: Regex = Regex::new(
        r"^mcp-[0-9a-f]{8}-[0-9a-f]{4}-4[0-9a-f]{3}-[89ab][0-9a-f]{3}-[0-9a-f]{12}$"
    ).expect("SESSION_ID_REGEX should be a valid regex pattern");
}

/// Generate a new session id, e.g. `mcp-550e8400-e29b-41d4-a716-446655440000`
pub fn generate_secure_session_id() -> String {
    format!("mcp-{}", Uuid::new_v4())
}

/// Reject ids that could not have been issued by [`generate_secure_session_id`]
pub fn validate_session_id_format(id: &str) -> Result<(), McpError> {
    if SESSION_ID_REGEX.is_match(id) {
        Ok(())
    } else {
        Err(McpError::MalformedSessionId(format!(
            "Invalid session ID format '{}'. Expected: mcp-{{uuid-v4}}",
            id
        )))
    }
}
