//! Server state shared across handlers.

use std::sync::Arc;

use crate::domain::EventPusher;
use crate::usecase::{
    DisconnectUseCase, GetStatsUseCase, GetUserGroupsUseCase, GroupLifecycleManager,
    JoinGroupUseCase, LeaveGroupUseCase, SendMessageUseCase, SwitchGroupUseCase, TypingUseCase,
};

/// Shared application state
pub struct AppState {
    /// JoinGroupUseCase（グループ参加のユースケース）
    pub join_group_usecase: Arc<JoinGroupUseCase>,
    /// SendMessageUseCase（メッセージ送信のユースケース）
    pub send_message_usecase: Arc<SendMessageUseCase>,
    /// SwitchGroupUseCase（グループ切り替えのユースケース）
    pub switch_group_usecase: Arc<SwitchGroupUseCase>,
    /// GetUserGroupsUseCase（所属グループ一覧のユースケース）
    pub get_user_groups_usecase: Arc<GetUserGroupsUseCase>,
    /// TypingUseCase（タイピング通知のユースケース）
    pub typing_usecase: Arc<TypingUseCase>,
    /// LeaveGroupUseCase（明示的退出のユースケース）
    pub leave_group_usecase: Arc<LeaveGroupUseCase>,
    /// DisconnectUseCase(切断・logout のユースケース)
    pub disconnect_usecase: Arc<DisconnectUseCase>,
    /// GetStatsUseCase（ヘルス統計のユースケース）
    pub get_stats_usecase: Arc<GetStatsUseCase>,
    /// GroupLifecycleManager（空グループの遅延削除）
    pub lifecycle: Arc<GroupLifecycleManager>,
    /// EventPusher（イベント配信の抽象化）
    pub event_pusher: Arc<dyn EventPusher>,
}
