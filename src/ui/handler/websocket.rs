//! WebSocket connection handler and event dispatcher.
//!
//! 1接続 = 1 `ConnectionId`。アップグレード時にチャンネルを EventPusher へ
//! 登録し、以後は `{event, data}` エンベロープを対応するユースケースへ
//! ディスパッチします。コミット後に返ってきた outcome からブロードキャスト
//! を行うため、返信・通知の順序はユースケースのコミット順に一致します。

use std::sync::Arc;

use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
};
use futures_util::{sink::SinkExt, stream::StreamExt};
use tokio::sync::mpsc;

use crate::{
    domain::{ConnectionId, DomainError, GroupCode, GroupId, Username},
    infrastructure::dto::{
        conversion::{self, message_dto},
        ws::{self, Envelope},
    },
    ui::state::AppState,
    usecase::{
        GroupNotification, JoinError, JoinRequest, SendMessageError, SendMessageRequest,
        SwitchGroupError,
    },
};

pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let connection = ConnectionId::generate();
    ws.on_upgrade(move |socket| handle_socket(socket, state, connection))
}

/// Spawns a task that drains the outbound channel into the WebSocket sink.
fn pusher_loop(
    mut rx: mpsc::UnboundedReceiver<String>,
    mut sender: futures_util::stream::SplitSink<WebSocket, Message>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if sender.send(Message::Text(msg.into())).await.is_err() {
                break;
            }
        }
    })
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>, connection: ConnectionId) {
    let (sender, mut receiver) = socket.split();

    let (tx, rx) = mpsc::unbounded_channel();
    state.event_pusher.register(connection, tx).await;
    tracing::info!("Connection '{}' established", connection);

    let mut send_task = pusher_loop(rx, sender);

    let state_clone = state.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(msg) = receiver.next().await {
            let msg = match msg {
                Ok(msg) => msg,
                Err(e) => {
                    tracing::debug!("WebSocket error on '{}': {}", connection, e);
                    break;
                }
            };
            match msg {
                Message::Text(text) => {
                    dispatch_event(&state_clone, connection, &text).await;
                }
                Message::Close(_) => {
                    tracing::info!("Connection '{}' requested close", connection);
                    break;
                }
                _ => {}
            }
        }
    });

    // If any one of the tasks completes, abort the other
    tokio::select! {
        _ = &mut recv_task => send_task.abort(),
        _ = &mut send_task => recv_task.abort(),
    };

    state.event_pusher.unregister(&connection).await;
    handle_disconnect(&state, connection).await;
}

/// Parse one inbound frame and route it to the matching use case.
pub(crate) async fn dispatch_event(state: &AppState, connection: ConnectionId, text: &str) {
    let envelope = match Envelope::parse(text) {
        Ok(envelope) => envelope,
        Err(e) => {
            tracing::warn!("Unparsable frame from '{}': {}", connection, e);
            send_error(state, connection, "Invalid message format").await;
            return;
        }
    };

    match envelope.event.as_str() {
        "join-group" => handle_join_group(state, connection, envelope.data).await,
        "send-message" => handle_send_message(state, connection, envelope.data).await,
        "switch-group" => handle_switch_group(state, connection, envelope.data).await,
        "get-my-groups" => handle_get_my_groups(state, connection).await,
        "typing-start" => handle_typing(state, connection, envelope.data, true).await,
        "typing-stop" => handle_typing(state, connection, envelope.data, false).await,
        "leave-group" => handle_leave_group(state, connection).await,
        "logout" => handle_logout(state, connection).await,
        "ping" => {
            send_event(state, connection, "pong", &serde_json::json!({})).await;
        }
        other => {
            tracing::warn!("Unknown event '{}' from '{}'", other, connection);
        }
    }
}

async fn handle_join_group(state: &AppState, connection: ConnectionId, data: serde_json::Value) {
    let data: ws::JoinGroupData = match serde_json::from_value(data) {
        Ok(data) => data,
        Err(_) => {
            send_error(state, connection, "Username and group code are required").await;
            return;
        }
    };
    if data.group_code.is_none() && data.group_id.is_none() {
        send_error(state, connection, "Username and group code are required").await;
        return;
    }

    let username = match Username::new(data.username) {
        Ok(username) => username,
        Err(DomainError::EmptyUsername) => {
            send_error(state, connection, "Username and group code are required").await;
            return;
        }
        Err(e) => {
            send_error(state, connection, &e.to_string()).await;
            return;
        }
    };
    // The code is required even alongside an explicit id; it names the group
    // in the client's UI.
    let group_code = match GroupCode::new(data.group_code.unwrap_or_default()) {
        Ok(code) => code,
        Err(DomainError::EmptyGroupCode) => {
            send_error(state, connection, "Username and group code are required").await;
            return;
        }
        Err(e) => {
            send_error(state, connection, &e.to_string()).await;
            return;
        }
    };
    let group_id = match data.group_id.as_deref() {
        Some(raw) => match GroupId::parse(raw) {
            Some(id) => Some(id),
            None => {
                send_error(state, connection, "Group not found").await;
                return;
            }
        },
        None => None,
    };

    let request = JoinRequest {
        username,
        group_code,
        group_id,
        password: data.password,
    };

    match state.join_group_usecase.execute(connection, request).await {
        Ok(outcome) => {
            let reply = ws::JoinedGroupDto::from(&outcome);
            send_event(state, connection, "joined-group", &reply).await;

            let joined = ws::UserJoinedDto {
                username: outcome.user.username.as_str().to_string(),
                member_count: outcome.members.len(),
                members: outcome.members.clone(),
            };
            broadcast_event(state, outcome.notify_targets, "user-joined", &joined).await;
        }
        Err(e) => {
            let message = match &e {
                JoinError::GroupNotFound => "Group not found".to_string(),
                JoinError::PasswordRequired(name) => {
                    format!("Username \"{name}\" requires a password to join this group.")
                }
                JoinError::InvalidCredentials => "Invalid password for this username.".to_string(),
                JoinError::UsernameConflict(name) => format!(
                    "Username \"{name}\" is already taken. Please use a different username."
                ),
                JoinError::Storage(e) => {
                    tracing::error!("Join failed on storage: {}", e);
                    "Internal server error".to_string()
                }
                JoinError::Hash(e) => {
                    tracing::error!("Join failed on password hashing: {}", e);
                    "Internal server error".to_string()
                }
            };
            send_error(state, connection, &message).await;
        }
    }
}

async fn handle_send_message(state: &AppState, connection: ConnectionId, data: serde_json::Value) {
    let data: ws::SendMessageData = match serde_json::from_value(data) {
        Ok(data) => data,
        Err(_) => {
            send_error(state, connection, "Group not found. Please rejoin the group.").await;
            return;
        }
    };

    let request = SendMessageRequest {
        group_id: data.group_id.as_deref().and_then(GroupId::parse),
        group_code: data.group_code.and_then(|c| GroupCode::new(c).ok()),
        text: data.message,
    };

    match state.send_message_usecase.execute(connection, request).await {
        Ok(outcome) => {
            let dto = message_dto(&outcome.message, &outcome.group.code);
            broadcast_event(state, outcome.targets, "new-message", &dto).await;
        }
        Err(e) => {
            let message = match &e {
                SendMessageError::GroupNotFound => "Group not found. Please rejoin the group.",
                SendMessageError::NotAMember => "You are not in this group. Please rejoin.",
                SendMessageError::Storage(e) => {
                    tracing::error!("Send failed on storage: {}", e);
                    "Internal server error"
                }
            };
            send_error(state, connection, message).await;
        }
    }
}

async fn handle_switch_group(state: &AppState, connection: ConnectionId, data: serde_json::Value) {
    let group_id = serde_json::from_value::<ws::SwitchGroupData>(data)
        .ok()
        .and_then(|data| GroupId::parse(&data.group_id));
    let Some(group_id) = group_id else {
        send_error(state, connection, "Group not found or you are not a member").await;
        return;
    };

    match state.switch_group_usecase.execute(connection, group_id).await {
        Ok(outcome) => {
            let reply = ws::GroupSwitchedDto::from(&outcome);
            send_event(state, connection, "group-switched", &reply).await;
        }
        Err(SwitchGroupError::GroupNotFound) | Err(SwitchGroupError::NotAMember) => {
            send_error(state, connection, "Group not found or you are not a member").await;
        }
        Err(SwitchGroupError::Storage(e)) => {
            tracing::error!("Switch failed on storage: {}", e);
            send_error(state, connection, "Internal server error").await;
        }
    }
}

async fn handle_get_my_groups(state: &AppState, connection: ConnectionId) {
    match state.get_user_groups_usecase.execute(connection).await {
        Ok(views) => {
            let groups: Vec<_> = views.iter().map(conversion::user_group_dto).collect();
            send_event(state, connection, "my-groups", &groups).await;
        }
        Err(e) => {
            tracing::error!("Group listing failed on storage: {}", e);
            send_error(state, connection, "Internal server error").await;
        }
    }
}

async fn handle_typing(
    state: &AppState,
    connection: ConnectionId,
    data: serde_json::Value,
    typing: bool,
) {
    let Ok(data) = serde_json::from_value::<ws::TypingData>(data) else {
        return;
    };
    let group_id = data.group_id.as_deref().and_then(GroupId::parse);
    let group_code = data.group_code.and_then(|c| GroupCode::new(c).ok());

    match state
        .typing_usecase
        .execute(connection, group_id, group_code, typing)
        .await
    {
        Ok(Some(outcome)) => {
            let dto = ws::UserTypingDto {
                username: outcome.username,
                is_typing: outcome.typing,
            };
            broadcast_event(state, outcome.targets, "user-typing", &dto).await;
        }
        // 認可されないシグナルは黙殺
        Ok(None) => {}
        Err(e) => tracing::warn!("Typing relay failed: {}", e),
    }
}

async fn handle_leave_group(state: &AppState, connection: ConnectionId) {
    match state.leave_group_usecase.execute(connection).await {
        Ok(Some(outcome)) => {
            notify_departure(state, &outcome.notifications).await;
            let reply = ws::LeftGroupDto {
                message: "Left all groups".to_string(),
            };
            send_event(state, connection, "left-group", &reply).await;
        }
        Ok(None) => {
            let reply = ws::LeftGroupDto {
                message: "Left all groups".to_string(),
            };
            send_event(state, connection, "left-group", &reply).await;
        }
        Err(e) => {
            tracing::error!("Leave failed on storage: {}", e);
            send_error(state, connection, "Internal server error").await;
        }
    }
}

/// Logout demotes presence like a disconnect but keeps the socket open.
async fn handle_logout(state: &AppState, connection: ConnectionId) {
    match state.disconnect_usecase.execute(connection).await {
        Ok(Some(outcome)) => notify_departure(state, &outcome.notifications).await,
        Ok(None) => {}
        Err(e) => tracing::error!("Logout failed on storage: {}", e),
    }
}

async fn handle_disconnect(state: &AppState, connection: ConnectionId) {
    match state.disconnect_usecase.execute(connection).await {
        Ok(Some(outcome)) => {
            tracing::info!("Connection '{}' closed, user '{}'", connection, outcome.username);
            notify_departure(state, &outcome.notifications).await;
        }
        Ok(None) => tracing::info!("Connection '{}' closed", connection),
        Err(e) => tracing::error!("Disconnect handling failed: {}", e),
    }
}

/// Broadcast `user-left` per group and arm cleanup for groups left idle.
async fn notify_departure(state: &AppState, notifications: &[GroupNotification]) {
    for note in notifications {
        let dto = ws::UserLeftDto {
            username: note.username.clone(),
            member_count: note.member_count,
            members: note.members.clone(),
        };
        broadcast_event(state, note.targets.clone(), "user-left", &dto).await;
        if note.group_now_idle {
            state.lifecycle.schedule_cleanup(note.group.id);
        }
    }
}

async fn send_event<T: serde::Serialize>(
    state: &AppState,
    connection: ConnectionId,
    event: &str,
    data: &T,
) {
    let frame = ws::envelope(event, data);
    if let Err(e) = state.event_pusher.push_to(&connection, &frame).await {
        tracing::warn!("Failed to push '{}' to '{}': {}", event, connection, e);
    }
}

async fn send_error(state: &AppState, connection: ConnectionId, message: &str) {
    let dto = ws::ErrorDto {
        message: message.to_string(),
    };
    send_event(state, connection, "error", &dto).await;
}

async fn broadcast_event<T: serde::Serialize>(
    state: &AppState,
    targets: Vec<ConnectionId>,
    event: &str,
    data: &T,
) {
    if targets.is_empty() {
        return;
    }
    let frame = ws::envelope(event, data);
    if let Err(e) = state.event_pusher.broadcast(targets, &frame).await {
        tracing::warn!("Failed to broadcast '{}': {}", event, e);
    }
}
