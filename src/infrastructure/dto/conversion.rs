//! Conversion logic between domain/usecase types and wire DTOs.

use crate::common::time::timestamp_to_rfc3339;
use crate::domain::{GroupCode, StoredMessage};
use crate::infrastructure::dto::ws as dto;
use crate::usecase::{JoinOutcome, SwitchOutcome, UserGroupView};

// ========================================
// Domain → DTO
// ========================================

/// A stored message carries no group code, so the resolved group supplies it.
pub fn message_dto(message: &StoredMessage, code: &GroupCode) -> dto::MessageDto {
    dto::MessageDto {
        id: message.id.to_string(),
        message: message.text.clone(),
        username: message.username.clone(),
        timestamp: timestamp_to_rfc3339(message.timestamp.value()),
        group_code: code.as_str().to_string(),
        group_id: message.group_id.to_string(),
    }
}

pub fn user_group_dto(view: &UserGroupView) -> dto::UserGroupDto {
    dto::UserGroupDto {
        group_code: view.group.code.as_str().to_string(),
        group_id: view.group.id.to_string(),
        member_count: view.member_count,
        members: view.members.clone(),
        last_message: view
            .last_message
            .as_ref()
            .map(|m| message_dto(m, &view.group.code)),
    }
}

impl From<&JoinOutcome> for dto::JoinedGroupDto {
    fn from(outcome: &JoinOutcome) -> Self {
        Self {
            group_code: outcome.group.code.as_str().to_string(),
            group_id: outcome.group.id.to_string(),
            username: outcome.user.username.as_str().to_string(),
            member_count: outcome.members.len(),
            members: outcome.members.clone(),
            messages: outcome
                .messages
                .iter()
                .map(|m| message_dto(m, &outcome.group.code))
                .collect(),
            all_groups: outcome.all_groups.iter().map(user_group_dto).collect(),
        }
    }
}

impl From<&SwitchOutcome> for dto::GroupSwitchedDto {
    fn from(outcome: &SwitchOutcome) -> Self {
        Self {
            group_code: outcome.group.code.as_str().to_string(),
            group_id: outcome.group.id.to_string(),
            member_count: outcome.members.len(),
            members: outcome.members.clone(),
            messages: outcome
                .messages
                .iter()
                .map(|m| message_dto(m, &outcome.group.code))
                .collect(),
        }
    }
}
