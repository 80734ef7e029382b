//! Opaque one-way password hash/verify capability.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PasswordHashError {
    #[error("failed to hash password: {0}")]
    HashFailed(String),
}

/// Credential verifier: hashes and verifies passwords. Stateless and safe to
/// call concurrently.
#[cfg_attr(test, mockall::automock)]
pub trait PasswordHasher: Send + Sync {
    /// Hash a plaintext password into an opaque digest.
    fn hash(&self, password: &str) -> Result<String, PasswordHashError>;

    /// Verify a plaintext password against a digest.
    ///
    /// Malformed input (empty password, corrupt digest) verifies false; this
    /// never panics for well-formed input.
    fn verify(&self, password: &str, digest: &str) -> bool;
}
