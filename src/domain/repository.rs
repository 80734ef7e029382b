//! Repository trait for the durable identity/group/message store.
//!
//! The use case layer depends on this trait only; the infrastructure layer
//! provides the implementation (dependency inversion, as everywhere else in
//! this crate). Every call is atomic: a failed call leaves the store as it
//! was.

use std::collections::HashSet;

use async_trait::async_trait;
use thiserror::Error;

use super::{
    ConnectionId, Group, GroupCode, GroupId, PresenceStatus, StoredMessage, Timestamp, User,
    UserId, Username,
};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RepositoryError {
    #[error("user '{0}' already exists")]
    UserAlreadyExists(String),
    #[error("user '{0}' not found")]
    UserNotFound(String),
    #[error("group '{0}' not found")]
    GroupNotFound(String),
    #[error("storage failure: {0}")]
    Storage(String),
}

/// Durable store interface consumed by the coordinator.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChatRepository: Send + Sync {
    // --- user operations ---

    /// Look up an identity by username, case-insensitively.
    async fn find_user_by_username(&self, username: &Username)
    -> Result<Option<User>, RepositoryError>;

    /// Look up the identity whose durable binding points at a connection.
    async fn find_user_by_connection(
        &self,
        connection: &ConnectionId,
    ) -> Result<Option<User>, RepositoryError>;

    /// Create a new identity. Fails with `UserAlreadyExists` when the
    /// normalized username is taken (the duplicate-creation race loses here).
    async fn create_user(
        &self,
        username: Username,
        password_hash: Option<String>,
    ) -> Result<User, RepositoryError>;

    /// Set the password digest on an identity (first-claim bootstrap).
    async fn set_user_password(
        &self,
        user_id: UserId,
        password_hash: String,
    ) -> Result<(), RepositoryError>;

    /// Update the durable presence view: last-known connection and status.
    async fn set_user_presence(
        &self,
        user_id: UserId,
        connection: Option<ConnectionId>,
        status: PresenceStatus,
    ) -> Result<(), RepositoryError>;

    /// Identities durably marked active whose bound connection is not in the
    /// live set (the reconciliation sweep input).
    async fn find_users_with_stale_presence(
        &self,
        live_connections: &HashSet<ConnectionId>,
    ) -> Result<Vec<User>, RepositoryError>;

    /// Delete an identity and its messages.
    async fn delete_user(&self, user_id: UserId) -> Result<(), RepositoryError>;

    // --- group operations ---

    async fn create_group(
        &self,
        code: GroupCode,
        created_at: Timestamp,
    ) -> Result<Group, RepositoryError>;

    /// Resolve a code to the most recently created live group carrying it.
    async fn find_group_by_code(&self, code: &GroupCode)
    -> Result<Option<Group>, RepositoryError>;

    async fn find_group_by_id(&self, id: GroupId) -> Result<Option<Group>, RepositoryError>;

    /// Record the membership edge. Idempotent.
    async fn add_membership(&self, group_id: GroupId, user_id: UserId)
    -> Result<(), RepositoryError>;

    /// Remove the membership edge. Idempotent.
    async fn remove_membership(
        &self,
        group_id: GroupId,
        user_id: UserId,
    ) -> Result<(), RepositoryError>;

    /// All members of a group in join order, regardless of presence status.
    async fn list_members(&self, group_id: GroupId) -> Result<Vec<User>, RepositoryError>;

    /// Number of membership edges for a group.
    async fn count_memberships(&self, group_id: GroupId) -> Result<usize, RepositoryError>;

    /// Delete a group, its membership edges and its messages.
    async fn delete_group(&self, group_id: GroupId) -> Result<(), RepositoryError>;

    // --- message operations ---

    /// Append a message; the store assigns id and insertion order.
    async fn append_message(
        &self,
        group_id: GroupId,
        user_id: UserId,
        username: String,
        text: String,
        timestamp: Timestamp,
    ) -> Result<StoredMessage, RepositoryError>;

    /// Messages of a group ordered by timestamp, ties broken by insertion
    /// order.
    async fn list_messages(&self, group_id: GroupId)
    -> Result<Vec<StoredMessage>, RepositoryError>;

    /// Groups an identity belongs to, in join order.
    async fn list_groups_for_user(&self, user_id: UserId)
    -> Result<Vec<Group>, RepositoryError>;

    // --- health reporting ---

    async fn count_users(&self) -> Result<usize, RepositoryError>;
    async fn count_groups(&self) -> Result<usize, RepositoryError>;
    async fn count_messages(&self) -> Result<usize, RepositoryError>;
}
