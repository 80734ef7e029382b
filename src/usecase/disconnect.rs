//! UseCase: 切断処理
//!
//! トランスポート切断は presence の降格だけを行います。membership エッジは
//! 残るので、同じユーザー名で再接続すれば元のグループにそのまま戻れます。
//! rejoin で上書きされた古い接続の切断は no-op です（presence レジストリが
//! もうその接続を指していないため）。

use std::sync::Arc;

use crate::domain::{ChatRepository, ConnectionId, PresenceRegistry, PresenceStatus, RepositoryError};

use super::leave_group::LeaveOutcome;
use super::locks::{KeyedLocks, group_key};
use super::view::{self, GroupNotification};

pub struct DisconnectUseCase {
    repository: Arc<dyn ChatRepository>,
    presence: Arc<PresenceRegistry>,
    locks: Arc<KeyedLocks>,
}

impl DisconnectUseCase {
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

    /// Demote the identity bound to a closed connection.
    ///
    /// Returns `None` for connections with no live binding, which covers both
    /// never-joined sockets and connections superseded by a rejoin.
    pub async fn execute(
        &self,
        connection: ConnectionId,
    ) -> Result<Option<LeaveOutcome>, RepositoryError> {
        let Some(user_id) = self.presence.identity_for(&connection) else {
            tracing::debug!("Disconnect of unbound connection '{}' ignored", connection);
            return Ok(None);
        };
        let Some(user) = self.repository.find_user_by_connection(&connection).await? else {
            self.presence.unbind(&connection);
            return Ok(None);
        };

        self.presence.unbind(&connection);
        self.repository
            .set_user_presence(user_id, None, PresenceStatus::Inactive)
            .await?;
        tracing::info!("User '{}' disconnected, presence demoted", user.username);

        // Membership survives: only roster broadcasts and idle detection are
        // derived here.
        let groups = self.repository.list_groups_for_user(user_id).await?;
        let mut notifications = Vec::with_capacity(groups.len());
        for group in groups {
            let _guard = self.locks.acquire(&group_key(group.id)).await;
            let roster = view::active_roster(self.repository.as_ref(), group.id).await?;
            let targets = view::roster_targets(&self.presence, &roster, None);
            notifications.push(GroupNotification {
                username: user.username.as_str().to_string(),
                member_count: roster.len(),
                members: view::roster_names(&roster),
                targets,
                group_now_idle: roster.is_empty(),
                group,
            });
        }

        Ok(Some(LeaveOutcome {
            username: user.username.as_str().to_string(),
            notifications,
        }))
    }
}
