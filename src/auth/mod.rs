//! # Authentication
//!
//! A single shared secret gates every MCP endpoint. The secret must be present
//! at startup; there is no unauthenticated mode.

pub mod middleware;

use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

use crate::errors::{Error, Result};

pub use middleware::{authenticate, client_origin};

/// Credential rejection reasons. None of them carry the credential itself.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthError {
    #[error("missing credential")]
    MissingCredential,
    #[error("invalid credential")]
    InvalidCredential,
}

impl AuthError {
    pub fn reason(&self) -> &'static str {
        match self {
            AuthError::MissingCredential => "missing",
            AuthError::InvalidCredential => "invalid",
        }
    }
}

/// Validates credentials against the configured shared secret
pub struct Authenticator {
    secret_digest: Zeroizing<[u8; 32]>,
}

impl std::fmt::Debug for Authenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Authenticator").finish_non_exhaustive()
    }
}

impl Authenticator {
    /// Build from the configured secret. An absent or blank secret is a
    /// configuration error and must abort startup.
    pub fn new(secret: Option<&str>) -> Result<Self> {
        let secret = secret.map(str::trim).filter(|s| !s.is_empty()).ok_or_else(|| {
            Error::config("PAGEPLANE_AUTH_TOKEN must be set; refusing to start without it")
        })?;

        Ok(Self { secret_digest: Zeroizing::new(digest(secret)) })
    }

    /// Accept iff `credential` is present and equal to the secret.
    pub fn verify(&self, credential: Option<&str>) -> std::result::Result<(), AuthError> {
        let credential = credential.ok_or(AuthError::MissingCredential)?;
        let supplied = Zeroizing::new(digest(credential.trim()));

        // fixed-length digests, compared without early exit
        let diff =
            supplied.iter().zip(self.secret_digest.iter()).fold(0u8, |acc, (a, b)| acc | (a ^ b));
        if diff == 0 {
            Ok(())
        } else {
            Err(AuthError::InvalidCredential)
        }
    }
}

fn digest(value: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(value.as_bytes());
    hasher.finalize().into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_secret_is_config_error() {
        assert!(matches!(Authenticator::new(None), Err(Error::Config(_))));
        assert!(matches!(Authenticator::new(Some("  ")), Err(Error::Config(_))));
    }

    #[test]
    fn verifies_matching_credential() {
        let auth = Authenticator::new(Some("s3cret")).unwrap();
        assert_eq!(auth.verify(Some("s3cret")), Ok(()));
        assert_eq!(auth.verify(Some("s3cret2")), Err(AuthError::InvalidCredential));
        assert_eq!(auth.verify(Some("")), Err(AuthError::InvalidCredential));
        assert_eq!(auth.verify(None), Err(AuthError::MissingCredential));
    }

    #[test]
    fn debug_does_not_leak_secret() {
        let auth = Authenticator::new(Some("s3cret")).unwrap();
        assert!(!format!("{:?}", auth).contains("s3cret"));
    }
}
