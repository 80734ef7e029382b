//! UseCase: メッセージ送信処理

use std::sync::Arc;

use crate::common::time::Clock;
use crate::domain::{
    ChatRepository, ConnectionId, Group, GroupCode, GroupId, PresenceRegistry, StoredMessage,
    Timestamp, UserId,
};

use super::error::SendMessageError;
use super::locks::{KeyedLocks, group_key};
use super::view;

/// 送信先はグループ id、なければコードで解決する（コード解決は送信者が
/// メンバーであるグループに限る）。
#[derive(Debug, Clone)]
pub struct SendMessageRequest {
    pub group_id: Option<GroupId>,
    pub group_code: Option<GroupCode>,
    pub text: String,
}

/// Result of a persisted message: the stored record plus the connections of
/// every active member, the sender included.
#[derive(Debug, Clone)]
pub struct SendOutcome {
    pub group: Group,
    pub message: StoredMessage,
    pub targets: Vec<ConnectionId>,
}

/// メッセージ送信のユースケース
///
/// 送信者が presence 上の識別子を持ち、かつ対象グループのメンバーである
/// ことを検証してから永続化します。認可されないメッセージは保存されません。
pub struct SendMessageUseCase {
    repository: Arc<dyn ChatRepository>,
    presence: Arc<PresenceRegistry>,
    locks: Arc<KeyedLocks>,
    clock: Arc<dyn Clock>,
}

impl SendMessageUseCase {
    pub fn new(
        repository: Arc<dyn ChatRepository>,
        presence: Arc<PresenceRegistry>,
        locks: Arc<KeyedLocks>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            repository,
            presence,
            locks,
            clock,
        }
    }

    pub async fn execute(
        &self,
        connection: ConnectionId,
        request: SendMessageRequest,
    ) -> Result<SendOutcome, SendMessageError> {
        let user_id = self
            .presence
            .identity_for(&connection)
            .ok_or(SendMessageError::NotAMember)?;

        let group = self.resolve_group(&request, user_id).await?;

        let _guard = self.locks.acquire(&group_key(group.id)).await;

        let members = self.repository.list_members(group.id).await?;
        let sender = members
            .iter()
            .find(|u| u.id == user_id)
            .cloned()
            .ok_or(SendMessageError::NotAMember)?;

        let message = self
            .repository
            .append_message(
                group.id,
                sender.id,
                sender.username.as_str().to_string(),
                request.text,
                Timestamp::new(self.clock.now_utc_millis()),
            )
            .await?;

        let roster: Vec<_> = members.into_iter().filter(|u| u.is_active()).collect();
        let targets = view::roster_targets(&self.presence, &roster, None);

        Ok(SendOutcome {
            group,
            message,
            targets,
        })
    }

    /// Group id wins; a bare code resolves only to a group the sender is a
    /// member of (a code match without membership reads as not found).
    async fn resolve_group(
        &self,
        request: &SendMessageRequest,
        user_id: UserId,
    ) -> Result<Group, SendMessageError> {
        if let Some(id) = request.group_id {
            return self
                .repository
                .find_group_by_id(id)
                .await?
                .ok_or(SendMessageError::GroupNotFound);
        }
        let code = request
            .group_code
            .as_ref()
            .ok_or(SendMessageError::GroupNotFound)?;
        let group = self
            .repository
            .find_group_by_code(code)
            .await?
            .ok_or(SendMessageError::GroupNotFound)?;
        let members = self.repository.list_members(group.id).await?;
        if !members.iter().any(|u| u.id == user_id) {
            return Err(SendMessageError::GroupNotFound);
        }
        Ok(group)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::time::FixedClock;
    use crate::domain::{PresenceStatus, Username};
    use crate::infrastructure::repository::InMemoryChatRepository;

    struct Ctx {
        repository: Arc<InMemoryChatRepository>,
        presence: Arc<PresenceRegistry>,
        usecase: SendMessageUseCase,
    }

    fn create_test_context() -> Ctx {
        let repository = Arc::new(InMemoryChatRepository::new());
        let presence = Arc::new(PresenceRegistry::new());
        let usecase = SendMessageUseCase::new(
            repository.clone(),
            presence.clone(),
            Arc::new(KeyedLocks::new()),
            Arc::new(FixedClock::new(1_700_000_000_000)),
        );
        Ctx {
            repository,
            presence,
            usecase,
        }
    }

    fn by_id(group_id: GroupId, text: &str) -> SendMessageRequest {
        SendMessageRequest {
            group_id: Some(group_id),
            group_code: None,
            text: text.to_string(),
        }
    }

    /// join 済み・presence バインド済みのメンバーを用意する
    async fn seed_member(ctx: &Ctx, group_id: GroupId, name: &str) -> ConnectionId {
        let user = ctx
            .repository
            .create_user(Username::new(name).unwrap(), None)
            .await
            .unwrap();
        ctx.repository.add_membership(group_id, user.id).await.unwrap();
        let conn = ConnectionId::generate();
        ctx.presence.bind(conn, user.id);
        ctx.repository
            .set_user_presence(user.id, Some(conn), PresenceStatus::Active)
            .await
            .unwrap();
        conn
    }

    async fn seed_group(ctx: &Ctx, code: &str) -> GroupId {
        ctx.repository
            .create_group(GroupCode::new(code).unwrap(), Timestamp::new(0))
            .await
            .unwrap()
            .id
    }

    #[tokio::test]
    async fn test_member_message_is_persisted_and_broadcast() {
        // テスト項目: メンバーのメッセージは保存され、active 全員が配信対象になる
        // given (前提条件):
        let ctx = create_test_context();
        let group_id = seed_group(&ctx, "team").await;
        let ana = seed_member(&ctx, group_id, "ana").await;
        let bob = seed_member(&ctx, group_id, "bob").await;

        // when (操作):
        let outcome = ctx.usecase.execute(ana, by_id(group_id, "hello")).await.unwrap();

        // then (期待する結果):
        assert_eq!(outcome.message.text, "hello");
        assert_eq!(outcome.message.username, "ana");
        assert_eq!(ctx.repository.count_messages().await.unwrap(), 1);
        // 送信者自身も配信対象に含まれる
        assert!(outcome.targets.contains(&ana));
        assert!(outcome.targets.contains(&bob));
    }

    #[tokio::test]
    async fn test_code_resolution_requires_membership() {
        // テスト項目: コード指定の送信はメンバーのグループにしか解決されない
        // given (前提条件): ana は team のメンバー、bob はどこにも属さない
        let ctx = create_test_context();
        let group_id = seed_group(&ctx, "team").await;
        let ana = seed_member(&ctx, group_id, "ana").await;
        let bob = ctx
            .repository
            .create_user(Username::new("bob").unwrap(), None)
            .await
            .unwrap();
        let bob_conn = ConnectionId::generate();
        ctx.presence.bind(bob_conn, bob.id);

        let by_code = |text: &str| SendMessageRequest {
            group_id: None,
            group_code: Some(GroupCode::new("team").unwrap()),
            text: text.to_string(),
        };

        // when (操作) / then (期待する結果): ana は成功、bob は not found
        assert!(ctx.usecase.execute(ana, by_code("hi")).await.is_ok());
        let result = ctx.usecase.execute(bob_conn, by_code("hi")).await;
        assert!(matches!(result, Err(SendMessageError::GroupNotFound)));
    }

    #[tokio::test]
    async fn test_unbound_connection_cannot_send() {
        // テスト項目: presence バインドのない接続からの送信は拒否される
        // given (前提条件):
        let ctx = create_test_context();
        let group_id = seed_group(&ctx, "team").await;

        // when (操作):
        let result = ctx
            .usecase
            .execute(ConnectionId::generate(), by_id(group_id, "hello"))
            .await;

        // then (期待する結果): 保存されない
        assert!(matches!(result, Err(SendMessageError::NotAMember)));
        assert_eq!(ctx.repository.count_messages().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_non_member_cannot_send() {
        // テスト項目: グループ外の識別子からの送信は拒否される
        // given (前提条件): bob は別グループのメンバー
        let ctx = create_test_context();
        let group_id = seed_group(&ctx, "team").await;
        let other = seed_group(&ctx, "ops").await;
        let bob = seed_member(&ctx, other, "bob").await;

        // when (操作):
        let result = ctx.usecase.execute(bob, by_id(group_id, "hello")).await;

        // then (期待する結果):
        assert!(matches!(result, Err(SendMessageError::NotAMember)));
        assert_eq!(ctx.repository.count_messages().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_unknown_group_is_rejected() {
        // テスト項目: 存在しないグループへの送信は GroupNotFound
        // given (前提条件):
        let ctx = create_test_context();
        let group_id = seed_group(&ctx, "team").await;
        let ana = seed_member(&ctx, group_id, "ana").await;

        // when (操作):
        let result = ctx
            .usecase
            .execute(ana, by_id(GroupId::generate(), "hello"))
            .await;

        // then (期待する結果):
        assert!(matches!(result, Err(SendMessageError::GroupNotFound)));
    }

    #[tokio::test]
    async fn test_inactive_members_are_not_broadcast_targets() {
        // テスト項目: inactive のメンバーは配信対象に含まれない
        // given (前提条件): bob の presence を inactive に落とす
        let ctx = create_test_context();
        let group_id = seed_group(&ctx, "team").await;
        let ana = seed_member(&ctx, group_id, "ana").await;
        let bob = seed_member(&ctx, group_id, "bob").await;
        let bob_user = ctx.presence.identity_for(&bob).unwrap();
        ctx.presence.unbind(&bob);
        ctx.repository
            .set_user_presence(bob_user, None, PresenceStatus::Inactive)
            .await
            .unwrap();

        // when (操作):
        let outcome = ctx.usecase.execute(ana, by_id(group_id, "hello")).await.unwrap();

        // then (期待する結果):
        assert_eq!(outcome.targets, vec![ana]);
    }
}
