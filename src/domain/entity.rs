//! Durable entities owned by the repository.

use serde::Serialize;

use super::{ConnectionId, GroupCode, GroupId, MessageId, PresenceStatus, Timestamp, UserId, Username};

/// Durable identity record.
///
/// Created on first join under a novel username; the `connection` field holds
/// the last-known bound connection and is reconciled against the presence
/// registry by the sweep.
#[derive(Debug, Clone, PartialEq)]
pub struct User {
    pub id: UserId,
    pub username: Username,
    pub password_hash: Option<String>,
    pub status: PresenceStatus,
    pub connection: Option<ConnectionId>,
}

impl User {
    pub fn is_active(&self) -> bool {
        self.status == PresenceStatus::Active
    }
}

/// Durable group record. Membership edges live in the repository, not here.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Group {
    pub id: GroupId,
    pub code: GroupCode,
    pub created_at: Timestamp,
}

/// Append-only message record.
///
/// `seq` is the repository-assigned insertion order, used to break timestamp
/// ties so every client observes the same total order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredMessage {
    pub id: MessageId,
    pub group_id: GroupId,
    pub user_id: UserId,
    pub username: String,
    pub text: String,
    pub timestamp: Timestamp,
    pub seq: u64,
}
