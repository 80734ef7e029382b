//! WebSocket wire contract.
//!
//! Every frame is a JSON `{event, data}` envelope. Field names are camelCase
//! on the wire; timestamps travel as RFC 3339 strings.

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ========================================
// Envelope
// ========================================

/// Inbound frame: event name plus an event-specific payload.
#[derive(Debug, Clone, Deserialize)]
pub struct Envelope {
    pub event: String,
    #[serde(default)]
    pub data: Value,
}

impl Envelope {
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

/// Serialize an outbound frame.
pub fn envelope<T: Serialize>(event: &str, data: &T) -> String {
    serde_json::json!({ "event": event, "data": data }).to_string()
}

// ========================================
// Inbound payloads
// ========================================

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinGroupData {
    pub username: String,
    #[serde(default)]
    pub group_code: Option<String>,
    #[serde(default)]
    pub group_id: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageData {
    pub message: String,
    #[serde(default)]
    pub group_code: Option<String>,
    #[serde(default)]
    pub group_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwitchGroupData {
    pub group_id: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypingData {
    #[serde(default)]
    pub group_code: Option<String>,
    #[serde(default)]
    pub group_id: Option<String>,
}

// ========================================
// Outbound payloads
// ========================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MessageDto {
    pub id: String,
    pub message: String,
    pub username: String,
    /// RFC 3339 string.
    pub timestamp: String,
    pub group_code: String,
    pub group_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct JoinedGroupDto {
    pub group_code: String,
    pub group_id: String,
    pub username: String,
    pub member_count: usize,
    pub members: Vec<String>,
    pub messages: Vec<MessageDto>,
    pub all_groups: Vec<UserGroupDto>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UserJoinedDto {
    pub username: String,
    pub member_count: usize,
    pub members: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UserLeftDto {
    pub username: String,
    pub member_count: usize,
    pub members: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GroupSwitchedDto {
    pub group_code: String,
    pub group_id: String,
    pub member_count: usize,
    pub members: Vec<String>,
    pub messages: Vec<MessageDto>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UserGroupDto {
    pub group_code: String,
    pub group_id: String,
    pub member_count: usize,
    pub members: Vec<String>,
    pub last_message: Option<MessageDto>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UserTypingDto {
    pub username: String,
    pub is_typing: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LeftGroupDto {
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorDto {
    pub message: String,
}
