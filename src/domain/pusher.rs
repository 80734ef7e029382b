//! Outbound event delivery abstraction.
//!
//! The transport layer registers one channel per live connection; use cases
//! and the dispatcher push serialized events through this trait without
//! knowing about WebSockets.

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

use super::ConnectionId;

/// Channel used to push serialized events toward one connection.
pub type PusherChannel = mpsc::UnboundedSender<String>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EventPushError {
    #[error("connection '{0}' not registered")]
    ConnectionNotFound(String),
    #[error("failed to push event: {0}")]
    PushFailed(String),
}

/// Event pusher trait.
///
/// `broadcast` tolerates partial failure: targets whose channel is gone are
/// skipped with a warning, matching the at-least-once-on-a-live-connection
/// contract of the transport.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EventPusher: Send + Sync {
    /// Register the outbound channel for a connection.
    async fn register(&self, connection: ConnectionId, sender: PusherChannel);

    /// Remove the outbound channel for a connection.
    async fn unregister(&self, connection: &ConnectionId);

    /// Push one serialized event to one connection.
    async fn push_to(&self, connection: &ConnectionId, content: &str)
    -> Result<(), EventPushError>;

    /// Push one serialized event to each target connection.
    async fn broadcast(
        &self,
        targets: Vec<ConnectionId>,
        content: &str,
    ) -> Result<(), EventPushError>;
}
