//! UseCase error taxonomy.
//!
//! Every variant is reported to the caller only; a failed operation leaves no
//! partial state behind. The dispatcher converts these into a single `error`
//! outbound event with a human-readable message.

use thiserror::Error;

use crate::domain::{PasswordHashError, RepositoryError};

/// Failures of the join/rejoin protocol.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JoinError {
    #[error("group not found")]
    GroupNotFound,
    #[error("username \"{0}\" requires a password to join this group")]
    PasswordRequired(String),
    #[error("invalid password for this username")]
    InvalidCredentials,
    #[error("username \"{0}\" is already taken")]
    UsernameConflict(String),
    #[error(transparent)]
    Storage(#[from] RepositoryError),
    #[error(transparent)]
    Hash(#[from] PasswordHashError),
}

/// Failures of message authorization/persistence.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SendMessageError {
    #[error("group not found")]
    GroupNotFound,
    #[error("sender is not an active member of the group")]
    NotAMember,
    #[error(transparent)]
    Storage(#[from] RepositoryError),
}

/// Failures of group switching.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SwitchGroupError {
    #[error("group not found")]
    GroupNotFound,
    #[error("caller is not a member of the group")]
    NotAMember,
    #[error(transparent)]
    Storage(#[from] RepositoryError),
}
