//! Group-chat membership/session coordinator server.
//!
//! Run with:
//! ```not_rust
//! cargo run --bin codetalk-server
//! cargo run --bin codetalk-server -- --host 0.0.0.0 --port 3001
//! ```

use std::{sync::Arc, time::Duration};

use codetalk_server::{
    common::{logger::setup_logger, time::SystemClock},
    domain::PresenceRegistry,
    infrastructure::{
        event_pusher::WebSocketEventPusher, password::BcryptPasswordHasher,
        repository::InMemoryChatRepository,
    },
    ui::{Server, state::AppState},
    usecase::{
        DisconnectUseCase, GetStatsUseCase, GetUserGroupsUseCase, GroupLifecycleManager,
        JoinGroupUseCase, KeyedLocks, LeaveGroupUseCase, ReconciliationSweep, SendMessageUseCase,
        SwitchGroupUseCase, TypingUseCase,
    },
};
use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "codetalk-server")]
#[command(about = "Group-chat membership/session coordinator", long_about = None)]
struct Args {
    /// Host address to bind the server to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Port number to bind the server to
    #[arg(short = 'p', long, default_value = "3001")]
    port: u16,

    /// Grace period before an empty group is deleted (seconds)
    #[arg(long, default_value = "30")]
    cleanup_grace_secs: u64,

    /// Interval of the stale-presence reconciliation sweep (seconds)
    #[arg(long, default_value = "30")]
    sweep_interval_secs: u64,
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    setup_logger(env!("CARGO_BIN_NAME"), "debug");

    let args = Args::parse();

    // Initialize dependencies in order:
    // 1. Repository / PresenceRegistry / locks
    // 2. PasswordHasher / EventPusher
    // 3. Lifecycle manager and UseCases
    // 4. Reconciliation sweep (background)
    // 5. Server

    // 1. Durable store, presence registry and the keyed-lock serializer
    let repository = Arc::new(InMemoryChatRepository::new());
    let presence = Arc::new(PresenceRegistry::new());
    let locks = Arc::new(KeyedLocks::new());
    let clock = Arc::new(SystemClock);

    // 2. Password hasher and event pusher
    let hasher = Arc::new(BcryptPasswordHasher::new());
    let event_pusher = Arc::new(WebSocketEventPusher::new());

    // 3. Lifecycle manager and UseCases
    let lifecycle = Arc::new(GroupLifecycleManager::new(
        repository.clone(),
        locks.clone(),
        Duration::from_secs(args.cleanup_grace_secs),
    ));
    let state = AppState {
        join_group_usecase: Arc::new(JoinGroupUseCase::new(
            repository.clone(),
            presence.clone(),
            hasher,
            lifecycle.clone(),
            locks.clone(),
            clock.clone(),
        )),
        send_message_usecase: Arc::new(SendMessageUseCase::new(
            repository.clone(),
            presence.clone(),
            locks.clone(),
            clock,
        )),
        switch_group_usecase: Arc::new(SwitchGroupUseCase::new(
            repository.clone(),
            presence.clone(),
        )),
        get_user_groups_usecase: Arc::new(GetUserGroupsUseCase::new(
            repository.clone(),
            presence.clone(),
        )),
        typing_usecase: Arc::new(TypingUseCase::new(repository.clone(), presence.clone())),
        leave_group_usecase: Arc::new(LeaveGroupUseCase::new(
            repository.clone(),
            presence.clone(),
            locks.clone(),
        )),
        disconnect_usecase: Arc::new(DisconnectUseCase::new(
            repository.clone(),
            presence.clone(),
            locks,
        )),
        get_stats_usecase: Arc::new(GetStatsUseCase::new(repository.clone(), presence.clone())),
        lifecycle,
        event_pusher,
    };

    // 4. Background reconciliation sweep
    let sweep = Arc::new(ReconciliationSweep::new(
        repository,
        presence,
        Duration::from_secs(args.sweep_interval_secs),
    ));
    tokio::spawn(sweep.run());

    // 5. Create and run the server
    let server = Server::new(state);
    if let Err(e) = server.run(args.host, args.port).await {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }
}
