//! 永続 presence とレジストリの突き合わせスイープ
//!
//! クラッシュや取りこぼされた切断で「active のまま取り残された」永続
//! presence を定期的に inactive へ降格します。降格のみで、membership や
//! グループ自体には触れません。

use std::sync::Arc;
use std::time::Duration;

use crate::domain::{ChatRepository, PresenceRegistry, PresenceStatus, RepositoryError};

/// Periodic demote-only reconciliation of durable presence.
pub struct ReconciliationSweep {
    repository: Arc<dyn ChatRepository>,
    presence: Arc<PresenceRegistry>,
    interval: Duration,
}

impl ReconciliationSweep {
    pub fn new(
        repository: Arc<dyn ChatRepository>,
        presence: Arc<PresenceRegistry>,
        interval: Duration,
    ) -> Self {
        Self {
            repository,
            presence,
            interval,
        }
    }

    /// Run the sweep forever. Errors are logged and the loop continues.
    pub async fn run(self: Arc<Self>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick fires immediately; skip it so a fresh process does
        // not sweep before any connection had a chance to bind.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            match self.sweep_once().await {
                Ok(0) => {}
                Ok(demoted) => {
                    tracing::info!("Reconciliation sweep demoted {} stale user(s)", demoted);
                }
                Err(e) => tracing::error!("Reconciliation sweep failed: {}", e),
            }
        }
    }

    /// One pass: demote every identity durably marked active whose recorded
    /// connection is no longer live. Returns the number demoted.
    pub async fn sweep_once(&self) -> Result<usize, RepositoryError> {
        let live = self.presence.live_connections();
        let stale = self.repository.find_users_with_stale_presence(&live).await?;

        let mut demoted = 0;
        for user in stale {
            // Re-validate per user: a join may have bound a new connection
            // between the snapshot and now.
            if let Some(conn) = self.presence.connection_for(&user.id) {
                tracing::debug!(
                    "User '{}' rebound to connection '{}' during sweep, skipping",
                    user.username,
                    conn
                );
                continue;
            }
            match self
                .repository
                .set_user_presence(user.id, None, PresenceStatus::Inactive)
                .await
            {
                Ok(()) => {
                    tracing::debug!("Demoted stale presence of user '{}'", user.username);
                    demoted += 1;
                }
                Err(e) => {
                    tracing::warn!("Failed to demote user '{}': {}", user.username, e);
                }
            }
        }
        Ok(demoted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ConnectionId, PresenceStatus, User, Username};
    use crate::infrastructure::repository::InMemoryChatRepository;

    struct Ctx {
        repository: Arc<InMemoryChatRepository>,
        presence: Arc<PresenceRegistry>,
        sweep: ReconciliationSweep,
    }

    fn create_test_context() -> Ctx {
        let repository = Arc::new(InMemoryChatRepository::new());
        let presence = Arc::new(PresenceRegistry::new());
        let sweep = ReconciliationSweep::new(
            repository.clone(),
            presence.clone(),
            Duration::from_secs(30),
        );
        Ctx {
            repository,
            presence,
            sweep,
        }
    }

    #[tokio::test]
    async fn test_sweep_demotes_users_with_dead_connections() {
        // テスト項目: 生きていない接続を指す active ユーザーが降格される
        // given (前提条件): ana は active だがレジストリに束縛がない
        let ctx = create_test_context();
        let ana = ctx
            .repository
            .create_user(Username::new("ana").unwrap(), None)
            .await
            .unwrap();
        ctx.repository
            .set_user_presence(ana.id, Some(ConnectionId::generate()), PresenceStatus::Active)
            .await
            .unwrap();

        // when (操作):
        let demoted = ctx.sweep.sweep_once().await.unwrap();

        // then (期待する結果):
        assert_eq!(demoted, 1);
        let ana = ctx
            .repository
            .find_user_by_username(&Username::new("ana").unwrap())
            .await
            .unwrap()
            .unwrap();
        assert!(!ana.is_active());
    }

    #[tokio::test]
    async fn test_sweep_spares_live_users() {
        // テスト項目: レジストリに束縛のある active ユーザーは触らない
        // given (前提条件):
        let ctx = create_test_context();
        let ana = ctx
            .repository
            .create_user(Username::new("ana").unwrap(), None)
            .await
            .unwrap();
        let conn = ConnectionId::generate();
        ctx.presence.bind(conn, ana.id);
        ctx.repository
            .set_user_presence(ana.id, Some(conn), PresenceStatus::Active)
            .await
            .unwrap();

        // when (操作):
        let demoted = ctx.sweep.sweep_once().await.unwrap();

        // then (期待する結果):
        assert_eq!(demoted, 0);
        let ana = ctx
            .repository
            .find_user_by_username(&Username::new("ana").unwrap())
            .await
            .unwrap()
            .unwrap();
        assert!(ana.is_active());
    }

    #[tokio::test]
    async fn test_sweep_revalidates_before_demoting() {
        // テスト項目: スナップショット後に再バインドされた識別子は降格しない
        // given (前提条件): 永続上は古い接続を指すが、レジストリは新しい接続を持つ
        let ctx = create_test_context();
        let ana = ctx
            .repository
            .create_user(Username::new("ana").unwrap(), None)
            .await
            .unwrap();
        ctx.repository
            .set_user_presence(ana.id, Some(ConnectionId::generate()), PresenceStatus::Active)
            .await
            .unwrap();
        // 永続化が追いつく前に新しい接続が bind された状況
        ctx.presence.bind(ConnectionId::generate(), ana.id);

        // when (操作):
        let demoted = ctx.sweep.sweep_once().await.unwrap();

        // then (期待する結果): find_users_with_stale_presence には載るが降格されない
        assert_eq!(demoted, 0);
        let ana = ctx
            .repository
            .find_user_by_username(&Username::new("ana").unwrap())
            .await
            .unwrap()
            .unwrap();
        assert!(ana.is_active());
    }

    #[tokio::test]
    async fn test_sweep_continues_after_per_user_error() {
        // テスト項目: 1ユーザーの降格失敗が残りの降格を妨げない
        // given (前提条件): 2人が stale、1人目の書き込みだけ失敗する
        use crate::domain::repository::MockChatRepository;

        let failing = User {
            id: crate::domain::UserId::generate(),
            username: Username::new("failing").unwrap(),
            password_hash: None,
            status: PresenceStatus::Active,
            connection: Some(ConnectionId::generate()),
        };
        let fine = User {
            id: crate::domain::UserId::generate(),
            username: Username::new("fine").unwrap(),
            password_hash: None,
            status: PresenceStatus::Active,
            connection: Some(ConnectionId::generate()),
        };

        let mut repository = MockChatRepository::new();
        let stale = vec![failing.clone(), fine.clone()];
        repository
            .expect_find_users_with_stale_presence()
            .returning(move |_| Ok(stale.clone()));
        let failing_id = failing.id;
        repository
            .expect_set_user_presence()
            .returning(move |user_id, _, _| {
                if user_id == failing_id {
                    Err(RepositoryError::Storage("write failed".to_string()))
                } else {
                    Ok(())
                }
            });

        let sweep = ReconciliationSweep::new(
            Arc::new(repository),
            Arc::new(PresenceRegistry::new()),
            Duration::from_secs(30),
        );

        // when (操作):
        let demoted = sweep.sweep_once().await.unwrap();

        // then (期待する結果): 失敗をログして続行し、残り1人は降格される
        assert_eq!(demoted, 1);
    }

    #[tokio::test]
    async fn test_sweep_ignores_inactive_users() {
        // テスト項目: もともと inactive のユーザーはスイープの対象外
        // given (前提条件):
        let ctx = create_test_context();
        let ana = ctx
            .repository
            .create_user(Username::new("ana").unwrap(), None)
            .await
            .unwrap();
        ctx.repository
            .set_user_presence(ana.id, None, PresenceStatus::Inactive)
            .await
            .unwrap();

        // when (操作):
        let demoted = ctx.sweep.sweep_once().await.unwrap();

        // then (期待する結果):
        assert_eq!(demoted, 0);
    }
}
