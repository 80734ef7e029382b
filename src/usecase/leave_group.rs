//! UseCase: 明示的な退出処理
//!
//! 明示的な leave/logout は識別子の membership エッジを全グループから
//! 取り除きます（切断とは違い、復帰しても membership は戻りません）。
//! 識別子そのものとパスワードは残るため、同じユーザー名で join し直す
//! ことはできます。

use std::sync::Arc;

use crate::domain::{ChatRepository, ConnectionId, PresenceRegistry, PresenceStatus, RepositoryError};

use super::locks::{KeyedLocks, group_key};
use super::view::{self, GroupNotification};

/// Result of an explicit leave: who left and one notification per group the
/// identity was removed from.
#[derive(Debug, Clone, PartialEq)]
pub struct LeaveOutcome {
    pub username: String,
    pub notifications: Vec<GroupNotification>,
}

pub struct LeaveGroupUseCase {
    repository: Arc<dyn ChatRepository>,
    presence: Arc<PresenceRegistry>,
    locks: Arc<KeyedLocks>,
}

impl LeaveGroupUseCase {
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

    /// Remove the caller's identity from every group it belongs to and
    /// release its presence binding.
    ///
    /// A connection with no bound identity is a no-op (`None`).
    pub async fn execute(
        &self,
        connection: ConnectionId,
    ) -> Result<Option<LeaveOutcome>, RepositoryError> {
        let Some(user_id) = self.presence.identity_for(&connection) else {
            return Ok(None);
        };
        let Some(user) = self.repository.find_user_by_connection(&connection).await? else {
            return Ok(None);
        };

        let groups = self.repository.list_groups_for_user(user_id).await?;
        let mut notifications = Vec::with_capacity(groups.len());
        for group in groups {
            let _guard = self.locks.acquire(&group_key(group.id)).await;
            self.repository.remove_membership(group.id, user_id).await?;

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

        self.presence.unbind(&connection);
        self.repository
            .set_user_presence(user_id, None, PresenceStatus::Inactive)
            .await?;
        tracing::info!(
            "User '{}' left {} group(s)",
            user.username,
            notifications.len()
        );

        Ok(Some(LeaveOutcome {
            username: user.username.as_str().to_string(),
            notifications,
        }))
    }
}
