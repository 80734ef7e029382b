//! Domain model for the membership/session coordination core.
//!
//! Entities and value objects are plain data; every comparison of usernames
//! and group codes goes through the normalized (lowercase) form, while the
//! stored casing is whatever the first claimant supplied.

mod entity;
mod value;

pub mod password;
pub mod presence;
pub mod pusher;
pub mod repository;

pub use entity::{Group, StoredMessage, User};
pub use password::{PasswordHashError, PasswordHasher};
pub use presence::PresenceRegistry;
pub use pusher::{EventPushError, EventPusher, PusherChannel};
pub use repository::{ChatRepository, RepositoryError};
pub use value::{
    ConnectionId, DomainError, GroupCode, GroupId, MessageId, PresenceStatus, Timestamp, UserId,
    Username,
};
