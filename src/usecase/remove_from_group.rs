//! UseCase: 単一グループからの除去
//!
//! 接続に束縛された識別子をひとつのグループからだけ取り除き、presence の
//! 束縛を解放します。leave と違い、他グループの membership エッジは
//! そのまま残ります。

use std::sync::Arc;

use crate::domain::{
    ChatRepository, ConnectionId, GroupId, PresenceRegistry, PresenceStatus, RepositoryError,
    User,
};

use super::locks::{KeyedLocks, group_key};
use super::view::{self, GroupNotification};

/// Result of a single-group removal: the unbound identity and the roster
/// notification for the group it was removed from.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoveOutcome {
    pub user: User,
    pub notification: GroupNotification,
}

pub struct RemoveFromGroupUseCase {
    repository: Arc<dyn ChatRepository>,
    presence: Arc<PresenceRegistry>,
    locks: Arc<KeyedLocks>,
}

impl RemoveFromGroupUseCase {
    pub fn new(
        repository: Arc<dyn ChatRepository>,
        presence: Arc<PresenceRegistry>,
        locks: Arc<KeyedLocks>,
    ) -> Self {
        Self {
            repository,
            presence,
            locks,
        }
    }

    /// Remove the caller's membership edge for one group and release its
    /// presence binding.
    ///
    /// Returns `None` when the connection has no bound identity or the group
    /// does not exist; edge removal itself is idempotent.
    pub async fn execute(
        &self,
        group_id: GroupId,
        connection: ConnectionId,
    ) -> Result<Option<RemoveOutcome>, RepositoryError> {
        let Some(user_id) = self.presence.identity_for(&connection) else {
            return Ok(None);
        };
        let Some(user) = self.repository.find_user_by_connection(&connection).await? else {
            return Ok(None);
        };
        let Some(group) = self.repository.find_group_by_id(group_id).await? else {
            return Ok(None);
        };

        let _guard = self.locks.acquire(&group_key(group.id)).await;
        self.repository.remove_membership(group.id, user_id).await?;

        let roster = view::active_roster(self.repository.as_ref(), group.id).await?;
        let targets = view::roster_targets(&self.presence, &roster, None);
        let notification = GroupNotification {
            username: user.username.as_str().to_string(),
            member_count: roster.len(),
            members: view::roster_names(&roster),
            targets,
            group_now_idle: roster.is_empty(),
            group,
        };

        self.presence.unbind(&connection);
        self.repository
            .set_user_presence(user_id, None, PresenceStatus::Inactive)
            .await?;
        tracing::info!(
            "User '{}' removed from group '{}'",
            user.username,
            notification.group.code
        );

        Ok(Some(RemoveOutcome { user, notification }))
    }
}
