//! UseCase layer: one use case per coordinator operation, plus the group
//! lifecycle manager, the reconciliation sweep and the keyed-lock serializer
//! they share.

mod disconnect;
mod error;
mod get_user_groups;
mod group_lifecycle;
mod join_group;
mod leave_group;
mod locks;
mod reconcile;
mod remove_from_group;
mod send_message;
mod stats;
mod switch_group;
mod typing;
mod view;

pub use disconnect::DisconnectUseCase;
pub use error::{JoinError, SendMessageError, SwitchGroupError};
pub use get_user_groups::GetUserGroupsUseCase;
pub use group_lifecycle::GroupLifecycleManager;
pub use join_group::{JoinGroupUseCase, JoinOutcome, JoinRequest};
pub use leave_group::{LeaveGroupUseCase, LeaveOutcome};
pub use locks::KeyedLocks;
pub use reconcile::ReconciliationSweep;
pub use remove_from_group::{RemoveFromGroupUseCase, RemoveOutcome};
pub use send_message::{SendMessageRequest, SendMessageUseCase, SendOutcome};
pub use stats::{GetStatsUseCase, Stats};
pub use switch_group::{SwitchGroupUseCase, SwitchOutcome};
pub use typing::{TypingOutcome, TypingUseCase};
pub use view::{GroupNotification, UserGroupView};
