//! グループのライフサイクル管理
//!
//! グループの解決・遅延作成と、空になったグループの遅延削除（猶予付き GC）を
//! 担当します。削除タスクは発火時点で必ず再検証するため、猶予中に誰かが
//! rejoin していればグループは生き残ります。

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::domain::{ChatRepository, Group, GroupCode, GroupId, RepositoryError, Timestamp};

use super::locks::{KeyedLocks, group_key};

/// A pending timer, tagged so a fired task only ever removes its own entry.
struct PendingCleanup {
    generation: u64,
    handle: JoinHandle<()>,
}

/// Group resolution and deferred garbage collection.
///
/// One pending cleanup task per group at most; re-arming replaces the
/// previous timer.
pub struct GroupLifecycleManager {
    repository: Arc<dyn ChatRepository>,
    locks: Arc<KeyedLocks>,
    grace: Duration,
    pending: Arc<StdMutex<HashMap<GroupId, PendingCleanup>>>,
    generations: AtomicU64,
}

impl GroupLifecycleManager {
    pub fn new(
        repository: Arc<dyn ChatRepository>,
        locks: Arc<KeyedLocks>,
        grace: Duration,
    ) -> Self {
        Self {
            repository,
            locks,
            grace,
            pending: Arc::new(StdMutex::new(HashMap::new())),
            generations: AtomicU64::new(0),
        }
    }

    /// Resolve a code to the newest live group carrying it.
    pub async fn find_by_code(&self, code: &GroupCode) -> Result<Option<Group>, RepositoryError> {
        self.repository.find_group_by_code(code).await
    }

    pub async fn find_by_id(&self, id: GroupId) -> Result<Option<Group>, RepositoryError> {
        self.repository.find_group_by_id(id).await
    }

    pub async fn create(
        &self,
        code: GroupCode,
        created_at: Timestamp,
    ) -> Result<Group, RepositoryError> {
        self.repository.create_group(code, created_at).await
    }

    /// Arm the deferred cleanup for a group that just went idle.
    ///
    /// After the grace period the task re-validates under the group lock and
    /// deletes the group only if no membership edge is left. Arming again
    /// while a timer is pending restarts the grace period.
    pub fn schedule_cleanup(&self, group_id: GroupId) {
        let repository = self.repository.clone();
        let locks = self.locks.clone();
        let pending = self.pending.clone();
        let grace = self.grace;
        let generation = self.generations.fetch_add(1, Ordering::Relaxed);

        let handle = tokio::spawn(async move {
            tokio::time::sleep(grace).await;

            let _guard = locks.acquire(&group_key(group_id)).await;
            match repository.count_memberships(group_id).await {
                Ok(0) => match repository.delete_group(group_id).await {
                    Ok(()) => tracing::info!("Deleted empty group '{}'", group_id),
                    Err(e) => {
                        tracing::error!("Failed to delete empty group '{}': {}", group_id, e);
                    }
                },
                Ok(n) => {
                    tracing::debug!(
                        "Cleanup for group '{}' skipped, {} membership(s) remain",
                        group_id,
                        n
                    );
                }
                Err(e) => {
                    tracing::error!("Cleanup check for group '{}' failed: {}", group_id, e);
                }
            }

            // Only remove our own entry: a re-arm may have replaced it while
            // this task was firing.
            let mut pending = pending.lock().expect("cleanup registry poisoned");
            if pending
                .get(&group_id)
                .is_some_and(|p| p.generation == generation)
            {
                pending.remove(&group_id);
            }
        });

        let mut pending = self.pending.lock().expect("cleanup registry poisoned");
        if let Some(previous) = pending.insert(group_id, PendingCleanup { generation, handle }) {
            previous.handle.abort();
        }
        tracing::debug!(
            "Cleanup for group '{}' armed ({}s grace)",
            group_id,
            self.grace.as_secs()
        );
    }

    /// Number of cleanup timers currently pending.
    pub fn pending_cleanups(&self) -> usize {
        self.pending.lock().expect("cleanup registry poisoned").len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::repository::InMemoryChatRepository;
    use tokio::time::{advance, sleep};

    struct Ctx {
        repository: Arc<InMemoryChatRepository>,
        lifecycle: GroupLifecycleManager,
    }

    fn create_test_context(grace: Duration) -> Ctx {
        let repository = Arc::new(InMemoryChatRepository::new());
        let lifecycle = GroupLifecycleManager::new(
            repository.clone(),
            Arc::new(KeyedLocks::new()),
            grace,
        );
        Ctx {
            repository,
            lifecycle,
        }
    }

    async fn create_group(ctx: &Ctx, code: &str) -> Group {
        ctx.repository
            .create_group(GroupCode::new(code).unwrap(), Timestamp::new(0))
            .await
            .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_cleanup_deletes_group_without_memberships() {
        // テスト項目: 猶予経過後、membership のないグループは削除される
        // given (前提条件):
        let ctx = create_test_context(Duration::from_secs(30));
        let group = create_group(&ctx, "team").await;

        // when (操作):
        ctx.lifecycle.schedule_cleanup(group.id);
        tokio::task::yield_now().await; // let the spawned task register its timer
        advance(Duration::from_secs(31)).await;
        sleep(Duration::from_millis(1)).await; // let the task run

        // then (期待する結果):
        assert_eq!(
            ctx.repository.find_group_by_id(group.id).await.unwrap(),
            None
        );
        assert_eq!(ctx.lifecycle.pending_cleanups(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cleanup_does_not_fire_before_grace() {
        // テスト項目: 猶予が経過するまでグループは削除されない
        // given (前提条件):
        let ctx = create_test_context(Duration::from_secs(30));
        let group = create_group(&ctx, "team").await;

        // when (操作):
        ctx.lifecycle.schedule_cleanup(group.id);
        advance(Duration::from_secs(29)).await;
        sleep(Duration::from_millis(1)).await;

        // then (期待する結果):
        assert!(
            ctx.repository
                .find_group_by_id(group.id)
                .await
                .unwrap()
                .is_some()
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_cleanup_spares_group_with_membership() {
        // テスト項目: 発火時点で membership が残っていれば削除しない
        // given (前提条件):
        let ctx = create_test_context(Duration::from_secs(30));
        let group = create_group(&ctx, "team").await;
        let user = ctx
            .repository
            .create_user(crate::domain::Username::new("ana").unwrap(), None)
            .await
            .unwrap();
        ctx.lifecycle.schedule_cleanup(group.id);
        tokio::task::yield_now().await; // let the spawned task register its timer

        // when (操作): 猶予中に membership が復活する
        ctx.repository.add_membership(group.id, user.id).await.unwrap();
        advance(Duration::from_secs(31)).await;
        sleep(Duration::from_millis(1)).await;

        // then (期待する結果):
        assert!(
            ctx.repository
                .find_group_by_id(group.id)
                .await
                .unwrap()
                .is_some()
        );
        assert_eq!(ctx.lifecycle.pending_cleanups(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fired_timer_only_clears_its_own_entry() {
        // テスト項目: 発火済みタイマーの後始末が次のアームを壊さない
        // given (前提条件): membership 付きのグループで1本目が空振りに終わる
        let ctx = create_test_context(Duration::from_secs(30));
        let group = create_group(&ctx, "team").await;
        let user = ctx
            .repository
            .create_user(crate::domain::Username::new("ana").unwrap(), None)
            .await
            .unwrap();
        ctx.repository.add_membership(group.id, user.id).await.unwrap();
        ctx.lifecycle.schedule_cleanup(group.id);
        tokio::task::yield_now().await; // let the spawned task register its timer
        advance(Duration::from_secs(31)).await;
        sleep(Duration::from_millis(1)).await;
        assert_eq!(ctx.lifecycle.pending_cleanups(), 0);

        // when (操作): 再アームし、membership が消えた状態で猶予を経過させる
        ctx.repository.remove_membership(group.id, user.id).await.unwrap();
        ctx.lifecycle.schedule_cleanup(group.id);
        assert_eq!(ctx.lifecycle.pending_cleanups(), 1);
        tokio::task::yield_now().await; // let the spawned task register its timer
        advance(Duration::from_secs(31)).await;
        sleep(Duration::from_millis(1)).await;

        // then (期待する結果): 2本目のタイマーが有効なまま発火して削除する
        assert_eq!(
            ctx.repository.find_group_by_id(group.id).await.unwrap(),
            None
        );
        assert_eq!(ctx.lifecycle.pending_cleanups(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rearming_restarts_the_grace_period() {
        // テスト項目: 再アームで猶予が振り出しに戻る（タイマーは1本だけ）
        // given (前提条件):
        let ctx = create_test_context(Duration::from_secs(30));
        let group = create_group(&ctx, "team").await;
        ctx.lifecycle.schedule_cleanup(group.id);
        tokio::task::yield_now().await; // let the spawned task register its timer
        advance(Duration::from_secs(20)).await;

        // when (操作): 20秒経過後に再アーム
        ctx.lifecycle.schedule_cleanup(group.id);
        assert_eq!(ctx.lifecycle.pending_cleanups(), 1);
        tokio::task::yield_now().await; // let the spawned task register its timer
        advance(Duration::from_secs(20)).await;
        sleep(Duration::from_millis(1)).await;

        // then (期待する結果): 旧タイマーの満了時刻ではまだ削除されない
        assert!(
            ctx.repository
                .find_group_by_id(group.id)
                .await
                .unwrap()
                .is_some()
        );

        advance(Duration::from_secs(11)).await;
        sleep(Duration::from_millis(1)).await;
        assert_eq!(
            ctx.repository.find_group_by_id(group.id).await.unwrap(),
            None
        );
    }
}
