use std::{sync::Arc, time::Duration};

use mission_complete::{
    config::AppConfig,
    dao::{
        models::{Collection, Draft, GAME_TYPE, MissionStatus, NewRoom, Record, RoomEntity, RoomStatus},
        procedure::ProcedureError,
        query::Filter,
        session_store::{SessionStore, memory::MemoryStore},
    },
    error::ServiceError,
    identity::{JoinLink, MemoryIdentityHolder},
    services::{
        mission_service::{self, CompletionOutcome},
        results_service, room_service, sync_service,
    },
    state::{ClientState, SharedClient, view::SessionView},
};
use tokio::time::timeout;

const REWARD: i32 = 5;

struct Table {
    store: Arc<MemoryStore>,
    config: Arc<AppConfig>,
    room: RoomEntity,
}

impl Table {
    async fn new() -> Self {
        let config = Arc::new(AppConfig::default().with_reward_points(REWARD));
        let store = Arc::new(MemoryStore::new(config.clone()));
        let room = store
            .insert(Draft::Rooms(NewRoom {
                code: "4821".into(),
                game_type: GAME_TYPE.into(),
                status: RoomStatus::Waiting,
            }))
            .await
            .unwrap()
            .into_room()
            .unwrap();
        Self {
            store,
            config,
            room,
        }
    }

    async fn join(&self, link: JoinLink, name: &str) -> SharedClient {
        let identity = MemoryIdentityHolder::default();
        let session = room_service::join_room(
            self.store.as_ref(),
            &self.config,
            &identity,
            &link,
            name,
        )
        .await
        .unwrap();
        ClientState::new(self.store.clone(), self.config.clone(), session)
    }

    async fn stored_room(&self) -> RoomEntity {
        self.store
            .select_one(Collection::Rooms, Filter::all().with("id", self.room.id))
            .await
            .unwrap()
            .and_then(Record::into_room)
            .unwrap()
    }
}

async fn wait_for(client: &ClientState, predicate: impl Fn(&SessionView) -> bool) {
    let mut watcher = client.view_watcher();
    timeout(Duration::from_secs(2), watcher.wait_for(|view| predicate(view)))
        .await
        .expect("view did not reach the expected state")
        .expect("view channel closed");
}

#[tokio::test]
async fn full_game_from_lobby_to_results() {
    let table = Table::new().await;
    assert_eq!(table.room.code, "4821");

    let alice = table.join(JoinLink::host(table.room.id), "Alice").await;
    let bob = table.join(JoinLink::guest(table.room.id), "Bob").await;
    let _alice_sync = sync_service::start_sync(alice.clone()).await.unwrap();
    let _bob_sync = sync_service::start_sync(bob.clone()).await.unwrap();

    let lobby = alice.view();
    assert_eq!(lobby.status(), Some(RoomStatus::Waiting));
    assert_eq!(lobby.players.len(), 2);
    assert!(lobby.players.values().all(|player| player.score == 0));

    let started = room_service::start_game(&alice).await.unwrap();
    assert_eq!(started.status, RoomStatus::Playing);
    assert!(started.current_topic.is_some());
    wait_for(&bob, |view| view.status() == Some(RoomStatus::Playing)).await;

    let err = room_service::change_topic(&bob).await.unwrap_err();
    assert!(matches!(
        err,
        ServiceError::RemoteProcedure(ProcedureError::PermissionDenied { .. })
    ));
    assert_eq!(table.stored_room().await.current_topic, started.current_topic);

    let topic = room_service::change_topic(&alice).await.unwrap();
    assert_ne!(Some(topic.clone()), started.current_topic);
    wait_for(&bob, |view| view.topic() == Some(topic.as_str())).await;

    assert_eq!(alice.view().pending_count(), 3);
    let m1 = alice.view().ordered_missions()[0].id;
    let outcome = mission_service::complete_mission(&alice, m1).await.unwrap();
    assert!(matches!(
        outcome,
        CompletionOutcome::Completed { score, .. } if score == REWARD
    ));

    let view = alice.view();
    assert_eq!(view.pending_count(), 3);
    assert_eq!(view.missions[&m1].status, MissionStatus::Completed);
    assert_eq!(view.me().map(|me| me.score), Some(REWARD));
    assert_eq!(view.ordered_missions().last().map(|mission| mission.id), Some(m1));

    let again = mission_service::complete_mission(&alice, m1).await.unwrap();
    assert_eq!(again, CompletionOutcome::AlreadyCompleted);
    assert_eq!(alice.view().me().map(|me| me.score), Some(REWARD));

    let finished = room_service::finish_game(&alice).await.unwrap();
    assert_eq!(finished.status, RoomStatus::Finished);
    let again = room_service::finish_game(&alice).await.unwrap();
    assert_eq!(again.status, RoomStatus::Finished);

    wait_for(&bob, |view| view.results.is_some()).await;
    let results = bob.view().results.unwrap();
    let names = results.iter().map(|row| row.name.as_str()).collect::<Vec<_>>();
    assert_eq!(names, vec!["Alice", "Bob"]);
    assert_eq!(results[0].score, REWARD);
    assert_eq!(results[0].completed_missions.len(), 1);
    assert_eq!(results[1].score, 0);
    assert!(results[1].completed_missions.is_empty());

    let direct = results_service::compute_results(table.store.as_ref(), table.room.id)
        .await
        .unwrap();
    assert!(direct.windows(2).all(|pair| pair[0].score >= pair[1].score));
}

#[tokio::test]
async fn failed_completion_reverts_the_optimistic_mark() {
    let table = Table::new().await;
    let alice = table.join(JoinLink::host(table.room.id), "Alice").await;
    let _bob = table.join(JoinLink::guest(table.room.id), "Bob").await;
    sync_service::refresh(&alice).await.unwrap();
    room_service::start_game(&alice).await.unwrap();

    let before = alice.view();
    let mission_id = before.ordered_missions()[0].id;

    table.store.set_available(false);
    let err = mission_service::complete_mission(&alice, mission_id)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::StoreWrite(_)));
    assert_eq!(alice.view().missions, before.missions);
    assert_eq!(alice.view().pending_count(), 3);

    table.store.set_available(true);
    let outcome = mission_service::complete_mission(&alice, mission_id)
        .await
        .unwrap();
    assert!(matches!(outcome, CompletionOutcome::Completed { .. }));
}

#[tokio::test]
async fn lifecycle_guards_hold_locally_and_on_the_store() {
    let table = Table::new().await;
    let alice = table.join(JoinLink::host(table.room.id), "Alice").await;
    sync_service::refresh(&alice).await.unwrap();

    let err = room_service::finish_game(&alice).await.unwrap_err();
    assert!(matches!(err, ServiceError::InvalidTransition(_)));
    let err = room_service::change_topic(&alice).await.unwrap_err();
    assert!(matches!(err, ServiceError::InvalidTransition(_)));

    let err = room_service::start_game(&alice).await.unwrap_err();
    assert!(matches!(
        err,
        ServiceError::RemoteProcedure(ProcedureError::Precondition { .. })
    ));
    assert_eq!(table.stored_room().await.status, RoomStatus::Waiting);
    assert_eq!(alice.lifecycle().await.pending, None);
}

#[tokio::test]
async fn late_joiners_get_missions_until_the_game_is_over() {
    let table = Table::new().await;
    let alice = table.join(JoinLink::host(table.room.id), "Alice").await;
    let _bob = table.join(JoinLink::guest(table.room.id), "Bob").await;
    sync_service::refresh(&alice).await.unwrap();
    room_service::start_game(&alice).await.unwrap();

    let carol = table.join(JoinLink::guest(table.room.id), "Carol").await;
    sync_service::refresh(&carol).await.unwrap();
    assert_eq!(carol.view().pending_count(), table.config.initial_missions());
    assert_eq!(carol.view().status(), Some(RoomStatus::Playing));

    room_service::finish_game(&alice).await.unwrap();
    let identity = MemoryIdentityHolder::default();
    let err = room_service::join_room(
        table.store.as_ref(),
        &table.config,
        &identity,
        &JoinLink::guest(table.room.id),
        "Dave",
    )
    .await
    .unwrap_err();
    assert!(matches!(err, ServiceError::InvalidInput(_)));
}

#[tokio::test]
async fn completions_after_the_finish_are_refused_and_results_hold() {
    let table = Table::new().await;
    let alice = table.join(JoinLink::host(table.room.id), "Alice").await;
    let bob = table.join(JoinLink::guest(table.room.id), "Bob").await;
    let _alice_sync = sync_service::start_sync(alice.clone()).await.unwrap();
    let _bob_sync = sync_service::start_sync(bob.clone()).await.unwrap();

    room_service::start_game(&alice).await.unwrap();
    wait_for(&bob, |view| view.status() == Some(RoomStatus::Playing)).await;
    let before = bob.view();
    let mission_id = before.ordered_missions()[0].id;

    room_service::finish_game(&alice).await.unwrap();
    wait_for(&bob, |view| view.status() == Some(RoomStatus::Finished)).await;
    wait_for(&alice, |view| view.results.is_some()).await;

    let err = mission_service::complete_mission(&bob, mission_id)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ServiceError::RemoteProcedure(ProcedureError::InvalidTransition {
            status: RoomStatus::Finished,
            ..
        })
    ));
    let view = bob.view();
    assert_eq!(view.missions, before.missions);
    assert!(view.unconfirmed.is_empty());
    assert_eq!(view.me().map(|me| me.score), Some(0));

    let stored = results_service::compute_results(table.store.as_ref(), table.room.id)
        .await
        .unwrap();
    assert_eq!(alice.view().results, Some(stored));
}
