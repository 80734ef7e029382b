//! Scenario tests for the membership/session coordinator, driving the use
//! case layer directly over the in-memory store.

use std::sync::Arc;
use std::time::Duration;

use codetalk_server::common::time::FixedClock;
use codetalk_server::domain::{
    ChatRepository, ConnectionId, GroupCode, PasswordHashError, PasswordHasher, PresenceRegistry,
    Username,
};
use codetalk_server::infrastructure::repository::InMemoryChatRepository;
use codetalk_server::usecase::{
    DisconnectUseCase, GroupLifecycleManager, JoinError, JoinGroupUseCase, JoinOutcome,
    JoinRequest, KeyedLocks, LeaveGroupUseCase, ReconciliationSweep, SendMessageError,
    SendMessageRequest, SendMessageUseCase,
};

/// Deterministic stand-in for bcrypt.
struct PlainHasher;

impl PasswordHasher for PlainHasher {
    fn hash(&self, password: &str) -> Result<String, PasswordHashError> {
        Ok(format!("plain${password}"))
    }

    fn verify(&self, password: &str, digest: &str) -> bool {
        !password.is_empty() && digest == format!("plain${password}")
    }
}

/// The full coordinator stack minus the transport.
struct Coordinator {
    repository: Arc<InMemoryChatRepository>,
    presence: Arc<PresenceRegistry>,
    lifecycle: Arc<GroupLifecycleManager>,
    join: JoinGroupUseCase,
    send: SendMessageUseCase,
    leave: LeaveGroupUseCase,
    disconnect: DisconnectUseCase,
    sweep: ReconciliationSweep,
}

fn coordinator_with_grace(grace: Duration) -> Coordinator {
    let repository = Arc::new(InMemoryChatRepository::new());
    let presence = Arc::new(PresenceRegistry::new());
    let locks = Arc::new(KeyedLocks::new());
    let clock = Arc::new(FixedClock::new(1_700_000_000_000));
    let lifecycle = Arc::new(GroupLifecycleManager::new(
        repository.clone(),
        locks.clone(),
        grace,
    ));
    Coordinator {
        join: JoinGroupUseCase::new(
            repository.clone(),
            presence.clone(),
            Arc::new(PlainHasher),
            lifecycle.clone(),
            locks.clone(),
            clock.clone(),
        ),
        send: SendMessageUseCase::new(
            repository.clone(),
            presence.clone(),
            locks.clone(),
            clock,
        ),
        leave: LeaveGroupUseCase::new(repository.clone(), presence.clone(), locks.clone()),
        disconnect: DisconnectUseCase::new(repository.clone(), presence.clone(), locks),
        sweep: ReconciliationSweep::new(
            repository.clone(),
            presence.clone(),
            Duration::from_secs(30),
        ),
        repository,
        presence,
        lifecycle,
    }
}

fn coordinator() -> Coordinator {
    coordinator_with_grace(Duration::from_secs(30))
}

impl Coordinator {
    async fn join_as(
        &self,
        conn: ConnectionId,
        username: &str,
        code: &str,
        password: Option<&str>,
    ) -> Result<JoinOutcome, JoinError> {
        self.join
            .execute(
                conn,
                JoinRequest {
                    username: Username::new(username).unwrap(),
                    group_code: GroupCode::new(code).unwrap(),
                    group_id: None,
                    password: password.map(str::to_string),
                },
            )
            .await
    }
}

#[tokio::test]
async fn test_password_binding_lifecycle() {
    // テスト項目: パスワードの first-claim 束縛とその後の認証が一貫する
    // given (前提条件): "ana" がパスワードなしでグループに存在する
    let coord = coordinator();
    coord
        .join_as(ConnectionId::generate(), "ana", "team", None)
        .await
        .unwrap();

    // when (操作): 次の接続がパスワード "x" を提示して join
    coord
        .join_as(ConnectionId::generate(), "ana", "team", Some("x"))
        .await
        .unwrap();

    // then (期待する結果): 以後 "ana" の join はパスワード "x" を要求する
    let no_pw = coord
        .join_as(ConnectionId::generate(), "ana", "team", None)
        .await;
    assert!(matches!(no_pw, Err(JoinError::PasswordRequired(_))));

    let wrong = coord
        .join_as(ConnectionId::generate(), "ana", "team", Some("wrong"))
        .await;
    assert!(matches!(wrong, Err(JoinError::InvalidCredentials)));

    let ok = coord
        .join_as(ConnectionId::generate(), "ana", "team", Some("x"))
        .await;
    assert!(ok.is_ok());

    // 別グループでも同じ識別子なので同じパスワードが要求される
    let other_group = coord
        .join_as(ConnectionId::generate(), "ana", "ops", None)
        .await;
    assert!(matches!(other_group, Err(JoinError::PasswordRequired(_))));
}

#[tokio::test]
async fn test_unauthorized_message_is_not_persisted() {
    // テスト項目: 非メンバーのメッセージは保存もブロードキャストもされない
    // given (前提条件): ana のグループがあり、bob は join していない
    let coord = coordinator();
    let ana_conn = ConnectionId::generate();
    let joined = coord.join_as(ana_conn, "ana", "team", None).await.unwrap();
    let bob_conn = ConnectionId::generate();

    // when (操作): bob が presence なしで送信を試みる
    let result = coord
        .send
        .execute(
            bob_conn,
            SendMessageRequest {
                group_id: Some(joined.group.id),
                group_code: None,
                text: "intruding".to_string(),
            },
        )
        .await;

    // then (期待する結果):
    assert!(matches!(result, Err(SendMessageError::NotAMember)));
    assert_eq!(coord.repository.count_messages().await.unwrap(), 0);
}

#[tokio::test]
async fn test_disconnect_then_reconnect_restores_identity() {
    // テスト項目: 切断→再接続で同じ識別子に戻り、membership が保たれる
    // given (前提条件): ana が join してメッセージを1件送信済み
    let coord = coordinator();
    let first_conn = ConnectionId::generate();
    let joined = coord.join_as(first_conn, "ana", "team", None).await.unwrap();
    coord
        .send
        .execute(
            first_conn,
            SendMessageRequest {
                group_id: Some(joined.group.id),
                group_code: None,
                text: "before drop".to_string(),
            },
        )
        .await
        .unwrap();

    // when (操作): 切断して別の接続で再 join
    coord.disconnect.execute(first_conn).await.unwrap();
    assert_eq!(
        coord.repository.count_memberships(joined.group.id).await.unwrap(),
        1
    );
    let second_conn = ConnectionId::generate();
    let rejoined = coord.join_as(second_conn, "ana", "team", None).await.unwrap();

    // then (期待する結果): 識別子・グループ・履歴が引き継がれる
    assert_eq!(rejoined.user.id, joined.user.id);
    assert_eq!(rejoined.group.id, joined.group.id);
    assert_eq!(rejoined.messages.len(), 1);
    assert_eq!(rejoined.messages[0].text, "before drop");
    assert_eq!(rejoined.members, vec!["ana".to_string()]);
    assert_eq!(coord.repository.count_users().await.unwrap(), 1);
}

#[tokio::test]
async fn test_message_order_is_stable_across_observers() {
    // テスト項目: 同時刻のメッセージも全員が同じ順序で観測する
    // given (前提条件): ana と bob が同じグループに join 済み（時計は固定）
    let coord = coordinator();
    let ana = ConnectionId::generate();
    let bob = ConnectionId::generate();
    let joined = coord.join_as(ana, "ana", "team", None).await.unwrap();
    coord.join_as(bob, "bob", "team", None).await.unwrap();

    // when (操作): 交互に送信する
    for (conn, text) in [(ana, "a1"), (bob, "b1"), (ana, "a2"), (bob, "b2")] {
        coord
            .send
            .execute(
                conn,
                SendMessageRequest {
                    group_id: Some(joined.group.id),
                    group_code: None,
                    text: text.to_string(),
                },
            )
            .await
            .unwrap();
    }

    // then (期待する結果): タイムスタンプが同一でも挿入順で安定している
    let messages = coord.repository.list_messages(joined.group.id).await.unwrap();
    let texts: Vec<&str> = messages.iter().map(|m| m.text.as_str()).collect();
    assert_eq!(texts, vec!["a1", "b1", "a2", "b2"]);
}

#[tokio::test(start_paused = true)]
async fn test_empty_group_is_deleted_after_grace() {
    // テスト項目: 全員が明示的に退出したグループは猶予後に削除される
    // given (前提条件): ana だけのグループ
    let coord = coordinator();
    let ana = ConnectionId::generate();
    let joined = coord.join_as(ana, "ana", "team", None).await.unwrap();

    // when (操作): 退出して猶予を経過させる
    let outcome = coord.leave.execute(ana).await.unwrap().unwrap();
    assert!(outcome.notifications[0].group_now_idle);
    coord.lifecycle.schedule_cleanup(joined.group.id);
    tokio::task::yield_now().await; // let the spawned task register its timer
    tokio::time::advance(Duration::from_secs(31)).await;
    tokio::time::sleep(Duration::from_millis(1)).await;

    // then (期待する結果):
    assert_eq!(
        coord.repository.find_group_by_id(joined.group.id).await.unwrap(),
        None
    );
}

#[tokio::test(start_paused = true)]
async fn test_rejoin_within_grace_saves_group() {
    // テスト項目: 猶予中の rejoin がグループを削除から救う
    // given (前提条件): ana が退出して削除タイマーが作動中
    let coord = coordinator();
    let ana = ConnectionId::generate();
    let joined = coord.join_as(ana, "ana", "team", None).await.unwrap();
    coord.leave.execute(ana).await.unwrap();
    coord.lifecycle.schedule_cleanup(joined.group.id);

    // when (操作): 猶予内に rejoin し、その後猶予を超える
    tokio::time::advance(Duration::from_secs(10)).await;
    let rejoined = coord
        .join_as(ConnectionId::generate(), "ana", "team", None)
        .await
        .unwrap();
    tokio::time::advance(Duration::from_secs(30)).await;
    tokio::time::sleep(Duration::from_millis(1)).await;

    // then (期待する結果): 同じグループが生きている
    assert_eq!(rejoined.group.id, joined.group.id);
    assert!(
        coord
            .repository
            .find_group_by_id(joined.group.id)
            .await
            .unwrap()
            .is_some()
    );
}

#[tokio::test(start_paused = true)]
async fn test_merely_disconnected_group_survives_cleanup() {
    // テスト項目: 切断しただけのグループは GC が発火しても削除されない
    // given (前提条件): ana が切断し、グループが idle として報告された
    let coord = coordinator();
    let ana = ConnectionId::generate();
    let joined = coord.join_as(ana, "ana", "team", None).await.unwrap();
    let outcome = coord.disconnect.execute(ana).await.unwrap().unwrap();
    assert!(outcome.notifications[0].group_now_idle);

    // when (操作): cleanup を作動させ猶予を超える
    coord.lifecycle.schedule_cleanup(joined.group.id);
    tokio::time::advance(Duration::from_secs(31)).await;
    tokio::time::sleep(Duration::from_millis(1)).await;

    // then (期待する結果): membership が残っているので削除されない
    assert!(
        coord
            .repository
            .find_group_by_id(joined.group.id)
            .await
            .unwrap()
            .is_some()
    );
}

#[tokio::test]
async fn test_sweep_demotes_orphaned_presence() {
    // テスト項目: レジストリから消えた接続の永続 presence がスイープで降格される
    // given (前提条件): ana が join した後、レジストリだけが束縛を失う
    //（プロセス再起動で registry が空になった状況の再現）
    let coord = coordinator();
    let ana = ConnectionId::generate();
    coord.join_as(ana, "ana", "team", None).await.unwrap();
    coord.presence.unbind(&ana);

    // when (操作):
    let demoted = coord.sweep.sweep_once().await.unwrap();

    // then (期待する結果):
    assert_eq!(demoted, 1);
    let ana_user = coord
        .repository
        .find_user_by_username(&Username::new("ana").unwrap())
        .await
        .unwrap()
        .unwrap();
    assert!(!ana_user.is_active());
}

#[tokio::test]
async fn test_concurrent_claims_converge_on_one_identity() {
    // テスト項目: 同名の並行 join がひとつの識別子に収束する
    // given (前提条件): グループだけ先に作っておく
    let coord = coordinator();
    coord
        .join_as(ConnectionId::generate(), "seed", "team", None)
        .await
        .unwrap();

    // when (操作): 4接続が同じ未クレームのユーザー名で同時に join
    let conns: Vec<ConnectionId> = (0..4).map(|_| ConnectionId::generate()).collect();
    let (a, b, c, d) = tokio::join!(
        coord.join_as(conns[0], "ana", "team", None),
        coord.join_as(conns[1], "ana", "team", None),
        coord.join_as(conns[2], "Ana", "team", None),
        coord.join_as(conns[3], "ANA", "team", None),
    );

    // then (期待する結果): 全員成功し、識別子はひとつだけ
    let ids = [
        a.unwrap().user.id,
        b.unwrap().user.id,
        c.unwrap().user.id,
        d.unwrap().user.id,
    ];
    assert!(ids.iter().all(|id| *id == ids[0]));
    assert_eq!(coord.repository.count_users().await.unwrap(), 2); // seed + ana
}
