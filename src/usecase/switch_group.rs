//! UseCase: グループ切り替え処理
//!
//! 読み取り専用の操作。呼び出し側の接続が既にメンバーであるグループの
//! スナップショット（active ロスターと履歴）を返すだけで、membership も
//! presence も変更しません。

use std::sync::Arc;

use crate::domain::{
    ChatRepository, ConnectionId, Group, GroupId, PresenceRegistry, StoredMessage,
};

use super::error::SwitchGroupError;
use super::view;

/// Snapshot handed to a client switching its focused group.
#[derive(Debug, Clone)]
pub struct SwitchOutcome {
    pub group: Group,
    pub members: Vec<String>,
    pub messages: Vec<StoredMessage>,
}

pub struct SwitchGroupUseCase {
    repository: Arc<dyn ChatRepository>,
    presence: Arc<PresenceRegistry>,
}

impl SwitchGroupUseCase {
    pub fn new(repository: Arc<dyn ChatRepository>, presence: Arc<PresenceRegistry>) -> Self {
        Self {
            repository,
            presence,
        }
    }

    pub async fn execute(
        &self,
        connection: ConnectionId,
        group_id: GroupId,
    ) -> Result<SwitchOutcome, SwitchGroupError> {
        let user_id = self
            .presence
            .identity_for(&connection)
            .ok_or(SwitchGroupError::NotAMember)?;

        let group = self
            .repository
            .find_group_by_id(group_id)
            .await?
            .ok_or(SwitchGroupError::GroupNotFound)?;

        let members = self.repository.list_members(group.id).await?;
        if !members.iter().any(|u| u.id == user_id) {
            return Err(SwitchGroupError::NotAMember);
        }

        let roster: Vec<_> = members.into_iter().filter(|u| u.is_active()).collect();
        let messages = self.repository.list_messages(group.id).await?;

        Ok(SwitchOutcome {
            group,
            members: view::roster_names(&roster),
            messages,
        })
    }
}
