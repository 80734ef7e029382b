//! インメモリ Chat Repository 実装
//!
//! ドメイン層が定義する ChatRepository trait の具体的な実装。
//! 単一の Mutex 配下のテーブル群をインメモリ DB として使用します。
//! trait の各呼び出しはロック一回分として原子的に実行されます。

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::domain::{
    ChatRepository, ConnectionId, Group, GroupCode, GroupId, MessageId, PresenceStatus,
    RepositoryError, StoredMessage, Timestamp, User, UserId, Username,
};

#[derive(Debug, Default)]
struct Store {
    users: Vec<User>,
    /// Creation order; lookup-by-code scans from the back so the newest live
    /// group wins when codes collide.
    groups: Vec<Group>,
    /// Membership edges in insertion order.
    memberships: Vec<(GroupId, UserId)>,
    messages: Vec<StoredMessage>,
    next_seq: u64,
}

/// インメモリ Chat Repository 実装
///
/// 永続化は行わない。プロセス再起動でデータは失われるため、開発とテスト用。
pub struct InMemoryChatRepository {
    store: Arc<Mutex<Store>>,
}

impl InMemoryChatRepository {
    pub fn new() -> Self {
        Self {
            store: Arc::new(Mutex::new(Store::default())),
        }
    }
}

impl Default for InMemoryChatRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChatRepository for InMemoryChatRepository {
    async fn find_user_by_username(
        &self,
        username: &Username,
    ) -> Result<Option<User>, RepositoryError> {
        let store = self.store.lock().await;
        Ok(store
            .users
            .iter()
            .find(|u| u.username.matches(username))
            .cloned())
    }

    async fn find_user_by_connection(
        &self,
        connection: &ConnectionId,
    ) -> Result<Option<User>, RepositoryError> {
        let store = self.store.lock().await;
        Ok(store
            .users
            .iter()
            .find(|u| u.connection.as_ref() == Some(connection))
            .cloned())
    }

    async fn create_user(
        &self,
        username: Username,
        password_hash: Option<String>,
    ) -> Result<User, RepositoryError> {
        let mut store = self.store.lock().await;
        if store.users.iter().any(|u| u.username.matches(&username)) {
            return Err(RepositoryError::UserAlreadyExists(
                username.as_str().to_string(),
            ));
        }
        let user = User {
            id: UserId::generate(),
            username,
            password_hash,
            status: PresenceStatus::Active,
            connection: None,
        };
        store.users.push(user.clone());
        Ok(user)
    }

    async fn set_user_password(
        &self,
        user_id: UserId,
        password_hash: String,
    ) -> Result<(), RepositoryError> {
        let mut store = self.store.lock().await;
        let user = store
            .users
            .iter_mut()
            .find(|u| u.id == user_id)
            .ok_or_else(|| RepositoryError::UserNotFound(user_id.to_string()))?;
        user.password_hash = Some(password_hash);
        Ok(())
    }

    async fn set_user_presence(
        &self,
        user_id: UserId,
        connection: Option<ConnectionId>,
        status: PresenceStatus,
    ) -> Result<(), RepositoryError> {
        let mut store = self.store.lock().await;
        let user = store
            .users
            .iter_mut()
            .find(|u| u.id == user_id)
            .ok_or_else(|| RepositoryError::UserNotFound(user_id.to_string()))?;
        user.connection = connection;
        user.status = status;
        Ok(())
    }

    async fn find_users_with_stale_presence(
        &self,
        live_connections: &HashSet<ConnectionId>,
    ) -> Result<Vec<User>, RepositoryError> {
        let store = self.store.lock().await;
        Ok(store
            .users
            .iter()
            .filter(|u| {
                u.status == PresenceStatus::Active
                    && match &u.connection {
                        Some(conn) => !live_connections.contains(conn),
                        None => true,
                    }
            })
            .cloned()
            .collect())
    }

    async fn delete_user(&self, user_id: UserId) -> Result<(), RepositoryError> {
        let mut store = self.store.lock().await;
        store.messages.retain(|m| m.user_id != user_id);
        store.memberships.retain(|(_, uid)| *uid != user_id);
        store.users.retain(|u| u.id != user_id);
        Ok(())
    }

    async fn create_group(
        &self,
        code: GroupCode,
        created_at: Timestamp,
    ) -> Result<Group, RepositoryError> {
        let mut store = self.store.lock().await;
        let group = Group {
            id: GroupId::generate(),
            code,
            created_at,
        };
        store.groups.push(group.clone());
        Ok(group)
    }

    async fn find_group_by_code(
        &self,
        code: &GroupCode,
    ) -> Result<Option<Group>, RepositoryError> {
        let store = self.store.lock().await;
        Ok(store
            .groups
            .iter()
            .rev()
            .find(|g| g.code.normalized() == code.normalized())
            .cloned())
    }

    async fn find_group_by_id(&self, id: GroupId) -> Result<Option<Group>, RepositoryError> {
        let store = self.store.lock().await;
        Ok(store.groups.iter().find(|g| g.id == id).cloned())
    }

    async fn add_membership(
        &self,
        group_id: GroupId,
        user_id: UserId,
    ) -> Result<(), RepositoryError> {
        let mut store = self.store.lock().await;
        if !store.groups.iter().any(|g| g.id == group_id) {
            return Err(RepositoryError::GroupNotFound(group_id.to_string()));
        }
        if !store
            .memberships
            .iter()
            .any(|(gid, uid)| *gid == group_id && *uid == user_id)
        {
            store.memberships.push((group_id, user_id));
        }
        Ok(())
    }

    async fn remove_membership(
        &self,
        group_id: GroupId,
        user_id: UserId,
    ) -> Result<(), RepositoryError> {
        let mut store = self.store.lock().await;
        store
            .memberships
            .retain(|(gid, uid)| !(*gid == group_id && *uid == user_id));
        Ok(())
    }

    async fn list_members(&self, group_id: GroupId) -> Result<Vec<User>, RepositoryError> {
        let store = self.store.lock().await;
        let mut members = Vec::new();
        for (gid, uid) in &store.memberships {
            if *gid == group_id {
                if let Some(user) = store.users.iter().find(|u| u.id == *uid) {
                    members.push(user.clone());
                }
            }
        }
        Ok(members)
    }

    async fn count_memberships(&self, group_id: GroupId) -> Result<usize, RepositoryError> {
        let store = self.store.lock().await;
        Ok(store
            .memberships
            .iter()
            .filter(|(gid, _)| *gid == group_id)
            .count())
    }

    async fn delete_group(&self, group_id: GroupId) -> Result<(), RepositoryError> {
        let mut store = self.store.lock().await;
        store.messages.retain(|m| m.group_id != group_id);
        store.memberships.retain(|(gid, _)| *gid != group_id);
        store.groups.retain(|g| g.id != group_id);
        Ok(())
    }

    async fn append_message(
        &self,
        group_id: GroupId,
        user_id: UserId,
        username: String,
        text: String,
        timestamp: Timestamp,
    ) -> Result<StoredMessage, RepositoryError> {
        let mut store = self.store.lock().await;
        if !store.groups.iter().any(|g| g.id == group_id) {
            return Err(RepositoryError::GroupNotFound(group_id.to_string()));
        }
        let seq = store.next_seq;
        store.next_seq += 1;
        let message = StoredMessage {
            id: MessageId::generate(),
            group_id,
            user_id,
            username,
            text,
            timestamp,
            seq,
        };
        store.messages.push(message.clone());
        Ok(message)
    }

    async fn list_messages(
        &self,
        group_id: GroupId,
    ) -> Result<Vec<StoredMessage>, RepositoryError> {
        let store = self.store.lock().await;
        let mut messages: Vec<StoredMessage> = store
            .messages
            .iter()
            .filter(|m| m.group_id == group_id)
            .cloned()
            .collect();
        messages.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then(a.seq.cmp(&b.seq)));
        Ok(messages)
    }

    async fn list_groups_for_user(
        &self,
        user_id: UserId,
    ) -> Result<Vec<Group>, RepositoryError> {
        let store = self.store.lock().await;
        let mut groups = Vec::new();
        for (gid, uid) in &store.memberships {
            if *uid == user_id {
                if let Some(group) = store.groups.iter().find(|g| g.id == *gid) {
                    groups.push(group.clone());
                }
            }
        }
        Ok(groups)
    }

    async fn count_users(&self) -> Result<usize, RepositoryError> {
        Ok(self.store.lock().await.users.len())
    }

    async fn count_groups(&self) -> Result<usize, RepositoryError> {
        Ok(self.store.lock().await.groups.len())
    }

    async fn count_messages(&self) -> Result<usize, RepositoryError> {
        Ok(self.store.lock().await.messages.len())
    }
}
