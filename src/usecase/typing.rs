//! UseCase: タイピング通知の転送
//!
//! 一時的なシグナルの転送のみで、何も永続化しません。認可されない通知は
//! エラーではなく黙って破棄します（`None` を返す）。

use std::sync::Arc;

use crate::domain::{
    ChatRepository, ConnectionId, Group, GroupCode, GroupId, PresenceRegistry, RepositoryError,
    UserId,
};

use super::view;

/// Relay data for one typing signal.
#[derive(Debug, Clone, PartialEq)]
pub struct TypingOutcome {
    pub group_id: GroupId,
    pub username: String,
    pub typing: bool,
    /// Active members of the group, the sender excluded.
    pub targets: Vec<ConnectionId>,
}

pub struct TypingUseCase {
    repository: Arc<dyn ChatRepository>,
    presence: Arc<PresenceRegistry>,
}

impl TypingUseCase {
    pub fn new(repository: Arc<dyn ChatRepository>, presence: Arc<PresenceRegistry>) -> Self {
        Self {
            repository,
            presence,
        }
    }

    pub async fn execute(
        &self,
        connection: ConnectionId,
        group_id: Option<GroupId>,
        group_code: Option<GroupCode>,
        typing: bool,
    ) -> Result<Option<TypingOutcome>, RepositoryError> {
        let Some(user_id) = self.presence.identity_for(&connection) else {
            return Ok(None);
        };
        let Some(group) = self.resolve_group(group_id, group_code).await? else {
            return Ok(None);
        };

        let members = self.repository.list_members(group.id).await?;
        let Some(sender) = members.iter().find(|u| u.id == user_id).cloned() else {
            return Ok(None);
        };

        let roster: Vec<_> = members.into_iter().filter(|u| u.is_active()).collect();
        let targets = view::roster_targets(&self.presence, &roster, Some(sender.id));

        Ok(Some(TypingOutcome {
            group_id: group.id,
            username: sender.username.as_str().to_string(),
            typing,
            targets,
        }))
    }

    async fn resolve_group(
        &self,
        group_id: Option<GroupId>,
        group_code: Option<GroupCode>,
    ) -> Result<Option<Group>, RepositoryError> {
        match (group_id, group_code) {
            (Some(id), _) => self.repository.find_group_by_id(id).await,
            (None, Some(code)) => self.repository.find_group_by_code(&code).await,
            (None, None) => Ok(None),
        }
    }
}
