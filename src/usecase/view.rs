//! Read helpers shared by the use cases: active rosters, notify targets and
//! per-user group listings.

use crate::domain::{
    ChatRepository, ConnectionId, Group, GroupId, PresenceRegistry, RepositoryError,
    StoredMessage, User, UserId,
};

/// One group an identity belongs to, with the data the client needs for
/// group switching.
#[derive(Debug, Clone, PartialEq)]
pub struct UserGroupView {
    pub group: Group,
    pub member_count: usize,
    pub members: Vec<String>,
    pub last_message: Option<StoredMessage>,
}

/// Per-group notification produced by leave/disconnect, consumed by the
/// dispatcher for `user-left` broadcasts and cleanup scheduling.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupNotification {
    pub group: Group,
    pub username: String,
    pub member_count: usize,
    pub members: Vec<String>,
    pub targets: Vec<ConnectionId>,
    /// True when the group has no active member left; the dispatcher arms
    /// the deferred cleanup for these.
    pub group_now_idle: bool,
}

/// Members of a group currently marked active, in join order.
pub async fn active_roster(
    repository: &dyn ChatRepository,
    group_id: GroupId,
) -> Result<Vec<User>, RepositoryError> {
    let members = repository.list_members(group_id).await?;
    Ok(members.into_iter().filter(|u| u.is_active()).collect())
}

/// Stored usernames of a roster.
pub fn roster_names(roster: &[User]) -> Vec<String> {
    roster.iter().map(|u| u.username.as_str().to_string()).collect()
}

/// Live connections of a roster, optionally excluding one identity.
pub fn roster_targets(
    presence: &PresenceRegistry,
    roster: &[User],
    exclude: Option<UserId>,
) -> Vec<ConnectionId> {
    roster
        .iter()
        .filter(|u| Some(u.id) != exclude)
        .filter_map(|u| presence.connection_for(&u.id))
        .collect()
}

/// The full set of groups an identity belongs to, each with its active
/// roster and most recent message.
pub async fn user_groups(
    repository: &dyn ChatRepository,
    user_id: UserId,
) -> Result<Vec<UserGroupView>, RepositoryError> {
    let groups = repository.list_groups_for_user(user_id).await?;
    let mut views = Vec::with_capacity(groups.len());
    for group in groups {
        let roster = active_roster(repository, group.id).await?;
        let last_message = repository.list_messages(group.id).await?.pop();
        views.push(UserGroupView {
            member_count: roster.len(),
            members: roster_names(&roster),
            last_message,
            group,
        });
    }
    Ok(views)
}
