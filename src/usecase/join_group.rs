//! UseCase: グループ参加処理
//!
//! join/rejoin プロトコルの中核。グループ解決（コードからの遅延作成を含む）、
//! ユーザー名クレームの調停、パスワード規則の適用、presence の bind までを
//! 一つの直列化された操作として実行します。
//!
//! ## 排他制御
//!
//! コード解決は `code:` キー、グループ単位の変更は `group:` キー、
//! 同一グループ内の同名クレームは `join:` キーで直列化されます。
//! 未クレームのユーザー名を奪い合う並行 join が識別子を二つ作ることは
//! ありません。

use std::sync::Arc;

use crate::common::time::Clock;
use crate::domain::{
    ChatRepository, ConnectionId, Group, GroupId, GroupCode, PasswordHasher, PresenceRegistry,
    PresenceStatus, RepositoryError, StoredMessage, Timestamp, User, Username,
};

use super::error::JoinError;
use super::group_lifecycle::GroupLifecycleManager;
use super::locks::{KeyedLocks, code_key, group_key, join_key};
use super::view::{self, UserGroupView};

/// Join request, already validated at the dispatcher boundary.
#[derive(Debug, Clone)]
pub struct JoinRequest {
    pub username: Username,
    pub group_code: GroupCode,
    pub group_id: Option<GroupId>,
    pub password: Option<String>,
}

/// Result of a successful join.
#[derive(Debug, Clone)]
pub struct JoinOutcome {
    pub user: User,
    pub group: Group,
    /// Active roster after the join, stored casing.
    pub members: Vec<String>,
    /// Full message history in timestamp order.
    pub messages: Vec<StoredMessage>,
    /// Every group the identity now belongs to.
    pub all_groups: Vec<UserGroupView>,
    /// Connections of the other active members (the caller excluded).
    pub notify_targets: Vec<ConnectionId>,
}

/// グループ参加のユースケース
pub struct JoinGroupUseCase {
    repository: Arc<dyn ChatRepository>,
    presence: Arc<PresenceRegistry>,
    hasher: Arc<dyn PasswordHasher>,
    lifecycle: Arc<GroupLifecycleManager>,
    locks: Arc<KeyedLocks>,
    clock: Arc<dyn Clock>,
}

impl JoinGroupUseCase {
    pub fn new(
        repository: Arc<dyn ChatRepository>,
        presence: Arc<PresenceRegistry>,
        hasher: Arc<dyn PasswordHasher>,
        lifecycle: Arc<GroupLifecycleManager>,
        locks: Arc<KeyedLocks>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            repository,
            presence,
            hasher,
            lifecycle,
            locks,
            clock,
        }
    }

    /// Execute the join protocol for one connection.
    ///
    /// A failed join leaves no partial identity or membership behind.
    pub async fn execute(
        &self,
        connection: ConnectionId,
        request: JoinRequest,
    ) -> Result<JoinOutcome, JoinError> {
        // 1. Resolve the target group: an explicit id must exist; a code is
        //    resolved to the newest live group, created lazily otherwise.
        let (group, lazily_created) = match request.group_id {
            Some(id) => (
                self.lifecycle
                    .find_by_id(id)
                    .await?
                    .ok_or(JoinError::GroupNotFound)?,
                false,
            ),
            None => {
                let _code_guard = self.locks.acquire(&code_key(&request.group_code)).await;
                match self.lifecycle.find_by_code(&request.group_code).await? {
                    Some(group) => (group, false),
                    None => {
                        let created_at = Timestamp::new(self.clock.now_utc_millis());
                        let group = self
                            .lifecycle
                            .create(request.group_code.clone(), created_at)
                            .await?;
                        tracing::info!(
                            "Group '{}' created for code '{}'",
                            group.id,
                            group.code
                        );
                        (group, true)
                    }
                }
            }
        };

        let _group_guard = self.locks.acquire(&group_key(group.id)).await;
        let _claim_guard = self
            .locks
            .acquire(&join_key(group.id, &request.username))
            .await;

        match self.join_locked(connection, &request, &group).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                // A join that fails right after lazily creating its group
                // would leave an empty group with no timer armed.
                if lazily_created {
                    self.lifecycle.schedule_cleanup(group.id);
                }
                Err(e)
            }
        }
    }

    /// Steps of the join protocol that run under the group and claim locks.
    async fn join_locked(
        &self,
        connection: ConnectionId,
        request: &JoinRequest,
        group: &Group,
    ) -> Result<JoinOutcome, JoinError> {
        // 2. Existing membership of this username, regardless of status,
        //    means rejoin; otherwise claim or create the global identity.
        let members = self.repository.list_members(group.id).await?;
        let existing = members
            .iter()
            .find(|u| u.username.matches(&request.username))
            .cloned();

        let user = match existing {
            Some(user) => {
                tracing::info!(
                    "User '{}' rejoining group '{}', rebinding presence",
                    user.username,
                    group.code
                );
                self.apply_credential_rules(&user, request.password.as_deref())
                    .await?;
                user
            }
            None => self.claim_identity(group, request).await?,
        };

        // 3. Bind presence: supersedes any previous connection of this
        //    identity, then mirror the binding into the durable store.
        self.presence.bind(connection, user.id);
        self.repository
            .set_user_presence(user.id, Some(connection), PresenceStatus::Active)
            .await?;

        // 4. Snapshot for the caller and targets for the roster broadcast.
        let roster = view::active_roster(self.repository.as_ref(), group.id).await?;
        let messages = self.repository.list_messages(group.id).await?;
        let all_groups = view::user_groups(self.repository.as_ref(), user.id).await?;
        let notify_targets = view::roster_targets(&self.presence, &roster, Some(user.id));

        Ok(JoinOutcome {
            members: view::roster_names(&roster),
            messages,
            all_groups,
            notify_targets,
            user,
            group: group.clone(),
        })
    }

    /// Claim the username for this group: attach an existing global identity
    /// or create a new one, then record the membership edge.
    async fn claim_identity(
        &self,
        group: &Group,
        request: &JoinRequest,
    ) -> Result<User, JoinError> {
        match self
            .repository
            .find_user_by_username(&request.username)
            .await?
        {
            Some(user) => {
                self.apply_credential_rules(&user, request.password.as_deref())
                    .await?;
                self.repository.add_membership(group.id, user.id).await?;
                tracing::info!(
                    "User '{}' exists globally, added to group '{}'",
                    user.username,
                    group.code
                );
                Ok(user)
            }
            None => {
                let password_hash = match request.password.as_deref() {
                    Some(password) => Some(self.hasher.hash(password)?),
                    None => None,
                };
                let user = self
                    .repository
                    .create_user(request.username.clone(), password_hash)
                    .await
                    .map_err(|e| match e {
                        RepositoryError::UserAlreadyExists(name) => {
                            JoinError::UsernameConflict(name)
                        }
                        other => JoinError::Storage(other),
                    })?;
                if let Err(e) = self.repository.add_membership(group.id, user.id).await {
                    // A join must not leave an identity without its membership.
                    let _ = self.repository.delete_user(user.id).await;
                    return Err(e.into());
                }
                tracing::info!(
                    "Created user '{}' for group '{}'",
                    user.username,
                    group.code
                );
                Ok(user)
            }
        }
    }

    /// Credential rules of the join protocol:
    /// digest + no password → `PasswordRequired`; digest + password →
    /// verify; no digest + password → first-claim-wins bootstrap, the
    /// supplied password becomes the identity's credential; neither → ok.
    async fn apply_credential_rules(
        &self,
        user: &User,
        password: Option<&str>,
    ) -> Result<(), JoinError> {
        match (&user.password_hash, password) {
            (Some(_), None) => Err(JoinError::PasswordRequired(
                user.username.as_str().to_string(),
            )),
            (Some(digest), Some(password)) => {
                if self.hasher.verify(password, digest) {
                    Ok(())
                } else {
                    tracing::warn!("Invalid password for user '{}'", user.username);
                    Err(JoinError::InvalidCredentials)
                }
            }
            (None, Some(password)) => {
                let digest = self.hasher.hash(password)?;
                self.repository.set_user_password(user.id, digest).await?;
                tracing::info!(
                    "Password set for user '{}' by first claimant",
                    user.username
                );
                Ok(())
            }
            (None, None) => Ok(()),
        }
    }
}
