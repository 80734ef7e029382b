//! UseCase: 所属グループ一覧の取得

use std::sync::Arc;

use crate::domain::{ChatRepository, ConnectionId, PresenceRegistry, RepositoryError};

use super::view::{self, UserGroupView};

/// 呼び出し側の識別子が所属する全グループを、active ロスターと直近
/// メッセージ付きで返します。presence バインドのない接続には空リストを
/// 返します（エラーにはしません）。
pub struct GetUserGroupsUseCase {
    repository: Arc<dyn ChatRepository>,
    presence: Arc<PresenceRegistry>,
}

impl GetUserGroupsUseCase {
    pub fn new(repository: Arc<dyn ChatRepository>, presence: Arc<PresenceRegistry>) -> Self {
        Self {
            repository,
            presence,
        }
    }

    pub async fn execute(
        &self,
        connection: ConnectionId,
    ) -> Result<Vec<UserGroupView>, RepositoryError> {
        let Some(user_id) = self.presence.identity_for(&connection) else {
            return Ok(Vec::new());
        };
        view::user_groups(self.repository.as_ref(), user_id).await
    }
}
