use futures::{StreamExt, stream};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    dao::{
        models::{Collection, Record, RoomStatus},
        query::{ChangeKind, Filter, Subscription},
        session_store::ChangeStream,
    },
    error::ServiceError,
    services::results_service,
    state::{ClientState, SharedClient},
};

/// Running room subscription. Dropping it stops listening; writes already
/// sent to the store are not affected.
pub struct SyncHandle {
    room_id: Uuid,
    task: JoinHandle<()>,
}

impl SyncHandle {
    /// Whether the change feed has ended.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Stop listening. The task is aborted by `Drop`.
    pub fn stop(self) {
        drop(self);
    }
}

impl Drop for SyncHandle {
    fn drop(&mut self) {
        debug!(room_id = %self.room_id, "stopping room sync");
        self.task.abort();
    }
}

/// Change feeds one client needs to follow its room.
fn room_subscriptions(room_id: Uuid) -> Vec<Subscription> {
    let in_room = Filter::all().with("room_id", room_id);
    vec![
        Subscription::new(
            Collection::Rooms,
            ChangeKind::Update,
            Filter::all().with("id", room_id),
        ),
        Subscription::new(Collection::Players, ChangeKind::Insert, in_room.clone()),
        Subscription::new(Collection::Players, ChangeKind::Update, in_room.clone()),
        Subscription::new(Collection::Missions, ChangeKind::Insert, in_room.clone()),
        Subscription::new(Collection::Missions, ChangeKind::Update, in_room),
    ]
}

/// Subscribe to the client's room, load a snapshot, then keep folding change
/// events into the client until the handle is dropped.
///
/// Subscriptions open before the snapshot is read so no change falls in between.
pub async fn start_sync(client: SharedClient) -> Result<SyncHandle, ServiceError> {
    let room_id = client.session().room_id;

    let mut feeds: Vec<ChangeStream> = Vec::new();
    for subscription in room_subscriptions(room_id) {
        feeds.push(client.store().subscribe(subscription).await?);
    }
    let events = stream::select_all(feeds);

    refresh(&client).await?;

    let task = tokio::spawn(fold_events(client, events));
    info!(%room_id, "room sync started");
    Ok(SyncHandle { room_id, task })
}

/// Read the room, its players and this player's missions, and merge them into the view.
pub async fn refresh(client: &ClientState) -> Result<(), ServiceError> {
    let session = *client.session();
    let store = client.store();

    let room = store
        .select_one(Collection::Rooms, Filter::all().with("id", session.room_id))
        .await?
        .and_then(Record::into_room);
    let players = store
        .select_many(
            Collection::Players,
            Filter::all().with("room_id", session.room_id),
            None,
        )
        .await?
        .into_iter()
        .filter_map(Record::into_player)
        .collect();
    let missions = match session.player_id {
        Some(player_id) => store
            .select_many(
                Collection::Missions,
                Filter::all().with("player_id", player_id),
                None,
            )
            .await?
            .into_iter()
            .filter_map(Record::into_mission)
            .collect(),
        None => Vec::new(),
    };

    client.load_snapshot(room, players, missions).await;
    publish_results_once(client).await
}

async fn fold_events(client: SharedClient, mut events: stream::SelectAll<ChangeStream>) {
    let room_id = client.session().room_id;

    while let Some(event) = events.next().await {
        client.ingest(&event).await;

        if let Err(err) = publish_results_once(&client).await {
            warn!(%room_id, error = %err, "failed to compute results");
        }
    }

    warn!(%room_id, "change feed ended; the view may fall behind");
    client.health().set(true);
}

/// Compute and publish the ranking the first time the room is seen finished.
async fn publish_results_once(client: &ClientState) -> Result<(), ServiceError> {
    let view = client.view();
    if view.status() != Some(RoomStatus::Finished) || view.results.is_some() {
        return Ok(());
    }

    let results = results_service::compute_results(client.store(), client.session().room_id).await?;
    info!(room_id = %client.session().room_id, players = results.len(), "results published");
    client.set_results(results);
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use tokio::time::timeout;

    use super::*;
    use crate::{
        config::AppConfig,
        dao::session_store::memory::MemoryStore,
        identity::{JoinLink, MemoryIdentityHolder, Session},
        services::room_service,
        state::view::Notice,
    };

    #[tokio::test]
    async fn display_follows_joins_through_the_feed() {
        let config = Arc::new(AppConfig::default());
        let store = Arc::new(MemoryStore::new(config.clone()));
        let room = room_service::create_room(store.as_ref()).await.unwrap();

        let display = ClientState::new(store.clone(), config.clone(), Session::display(room.id));
        let mut notices = display.notices();
        let handle = start_sync(display.clone()).await.unwrap();
        assert_eq!(display.view().status(), Some(RoomStatus::Waiting));

        let identity = MemoryIdentityHolder::default();
        room_service::join_room(
            store.as_ref(),
            &config,
            &identity,
            &JoinLink::guest(room.id),
            "Bob",
        )
        .await
        .unwrap();

        let notice = timeout(Duration::from_secs(1), notices.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(notice, Notice::PlayerJoined { ref name, .. } if name == "Bob"));
        assert_eq!(display.view().players.len(), 1);
        assert!(display.view().missions.is_empty());

        drop(handle);
    }

    #[tokio::test]
    async fn stopped_handle_no_longer_folds_changes() {
        let config = Arc::new(AppConfig::default());
        let store = Arc::new(MemoryStore::new(config.clone()));
        let room = room_service::create_room(store.as_ref()).await.unwrap();
        let client = ClientState::new(store.clone(), config.clone(), Session::display(room.id));

        let handle = start_sync(client.clone()).await.unwrap();
        assert!(!handle.is_finished());
        handle.stop();

        let identity = MemoryIdentityHolder::default();
        room_service::join_room(
            store.as_ref(),
            &config,
            &identity,
            &JoinLink::guest(room.id),
            "Bob",
        )
        .await
        .unwrap();

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(client.view().players.is_empty());
    }
}
