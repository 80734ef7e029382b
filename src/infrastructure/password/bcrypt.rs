//! bcrypt-backed implementation of the PasswordHasher trait.

use crate::domain::{PasswordHashError, PasswordHasher};

/// Credential verifier using bcrypt with the default cost.
#[derive(Debug, Clone, Copy, Default)]
pub struct BcryptPasswordHasher;

impl BcryptPasswordHasher {
    pub fn new() -> Self {
        Self
    }
}

impl PasswordHasher for BcryptPasswordHasher {
    fn hash(&self, password: &str) -> Result<String, PasswordHashError> {
        bcrypt::hash(password, bcrypt::DEFAULT_COST)
            .map_err(|e| PasswordHashError::HashFailed(e.to_string()))
    }

    fn verify(&self, password: &str, digest: &str) -> bool {
        if password.is_empty() {
            return false;
        }
        bcrypt::verify(password, digest).unwrap_or(false)
    }
}
