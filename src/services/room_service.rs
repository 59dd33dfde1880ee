use rand::Rng;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    config::AppConfig,
    dao::{
        models::{Collection, Draft, GAME_TYPE, NewPlayer, NewRoom, Record, RoomEntity, RoomStatus},
        procedure::{Procedure, ProcedureError, ProcedureOutput},
        query::{ChangeEvent, Filter},
        session_store::SessionStore,
        storage::StorageError,
    },
    dto::validation::validate_player_name,
    error::ServiceError,
    identity::{IdentityHolder, JoinLink, Session},
    services::mission_service,
    state::{ClientState, RoomEvent},
};

const CODE_RANGE: std::ops::Range<u16> = 1000..10000;
const MAX_CODE_ATTEMPTS: usize = 8;

/// Create a waiting room under a random four digit code that no active room holds.
///
/// A rejected insert is surfaced as is; retrying could leave a duplicate room behind.
pub async fn create_room(store: &dyn SessionStore) -> Result<RoomEntity, ServiceError> {
    for _ in 0..MAX_CODE_ATTEMPTS {
        let code = rand::rng().random_range(CODE_RANGE).to_string();
        if code_in_use(store, &code).await? {
            continue;
        }

        let record = store
            .insert(Draft::Rooms(NewRoom {
                code,
                game_type: GAME_TYPE.into(),
                status: RoomStatus::Waiting,
            }))
            .await?;
        let room = record
            .into_room()
            .ok_or_else(|| unexpected_record(Collection::Rooms))?;

        info!(room_id = %room.id, code = %room.code, "room created");
        return Ok(room);
    }

    warn!(attempts = MAX_CODE_ATTEMPTS, "no free room code found");
    Err(ServiceError::StoreWrite(StorageError::rejected(
        "no free room code, please try again",
    )))
}

async fn code_in_use(store: &dyn SessionStore, code: &str) -> Result<bool, ServiceError> {
    let rooms = store
        .select_many(Collection::Rooms, Filter::all().with("code", code), None)
        .await?;
    Ok(rooms
        .iter()
        .filter_map(Record::as_room)
        .any(|room| room.status != RoomStatus::Finished))
}

/// Join the room behind `link` as a new player named `name`.
///
/// Provisions the player's first missions and persists the identity before
/// returning the player session.
pub async fn join_room(
    store: &dyn SessionStore,
    config: &AppConfig,
    identity: &dyn IdentityHolder,
    link: &JoinLink,
    name: &str,
) -> Result<Session, ServiceError> {
    validate_player_name(name)
        .map_err(|err| ServiceError::InvalidInput(format!("player name: {err}")))?;
    let name = name.trim().to_string();

    let room = load_room(store, link.room_id).await?;
    if room.status == RoomStatus::Finished {
        return Err(ServiceError::InvalidInput(
            "the game in this room is already over".into(),
        ));
    }

    if link.as_host {
        let hosts = store
            .select_many(
                Collection::Players,
                Filter::all()
                    .with("room_id", room.id)
                    .with("is_host", true),
                None,
            )
            .await?;
        if !hosts.is_empty() {
            return Err(ServiceError::InvalidInput(
                "this room already has a host".into(),
            ));
        }
    }

    let player = store
        .insert(Draft::Players(NewPlayer {
            room_id: room.id,
            name,
            is_host: link.as_host,
            score: 0,
        }))
        .await?
        .into_player()
        .ok_or_else(|| unexpected_record(Collection::Players))?;

    mission_service::provision_initial_missions(store, config, &player).await?;

    let session = Session::player(room.id, player.id);
    identity.save(&session)?;

    info!(
        room_id = %room.id,
        player_id = %player.id,
        is_host = player.is_host,
        late = room.status == RoomStatus::Playing,
        "player joined"
    );
    Ok(session)
}

/// Resolve the session of this device for `room_id`: the stored player when
/// the saved identity belongs to this room, the shared display otherwise.
pub async fn open_room(
    store: &dyn SessionStore,
    identity: &dyn IdentityHolder,
    room_id: Uuid,
) -> Result<Session, ServiceError> {
    load_room(store, room_id).await?;

    let session = match identity.load()? {
        Some(saved) if saved.room_id == room_id && saved.is_player() => saved,
        _ => Session::display(room_id),
    };
    Ok(session)
}

/// Start the game. Host only; the store re-checks the role and the player count.
pub async fn start_game(client: &ClientState) -> Result<RoomEntity, ServiceError> {
    let player_id = client.session().require_player()?;
    let room_id = client.session().room_id;

    let (room, _) = client
        .run_transition(RoomEvent::StartGame, || async {
            match client
                .store()
                .call(Procedure::StartGame { room_id, player_id })
                .await?
            {
                ProcedureOutput::Room { room } => Ok(room),
                other => Err(unexpected_output("start_mission_game", &other)),
            }
        })
        .await?;

    client
        .ingest(&ChangeEvent::updated(Record::Rooms(room.clone())))
        .await;
    info!(%room_id, topic = ?room.current_topic, "game started");
    Ok(room)
}

/// Draw a new topic and return it. Host only.
pub async fn change_topic(client: &ClientState) -> Result<String, ServiceError> {
    let player_id = client.session().require_player()?;
    let room_id = client.session().room_id;

    let ((topic, room), _) = client
        .run_transition(RoomEvent::ChangeTopic, || async {
            match client
                .store()
                .call(Procedure::ChangeTopic { room_id, player_id })
                .await?
            {
                ProcedureOutput::Topic { topic, room } => Ok((topic, room)),
                other => Err(unexpected_output("change_topic", &other)),
            }
        })
        .await?;

    // Same record the change event carries; folding it now spares the host
    // the round trip.
    client
        .ingest(&ChangeEvent::updated(Record::Rooms(room)))
        .await;
    info!(%room_id, %topic, "topic changed");
    Ok(topic)
}

/// End the game. Host only; finishing a finished room is a no-op.
pub async fn finish_game(client: &ClientState) -> Result<RoomEntity, ServiceError> {
    let player_id = client.session().require_player()?;
    let room_id = client.session().room_id;

    let (room, _) = client
        .run_transition(RoomEvent::FinishGame, || async {
            match client
                .store()
                .call(Procedure::FinishGame { room_id, player_id })
                .await?
            {
                ProcedureOutput::Room { room } => Ok(room),
                other => Err(unexpected_output("finish_game", &other)),
            }
        })
        .await?;

    client
        .ingest(&ChangeEvent::updated(Record::Rooms(room.clone())))
        .await;
    info!(%room_id, "game finished");
    Ok(room)
}

pub(crate) async fn load_room(
    store: &dyn SessionStore,
    room_id: Uuid,
) -> Result<RoomEntity, ServiceError> {
    store
        .select_one(Collection::Rooms, Filter::all().with("id", room_id))
        .await?
        .and_then(Record::into_room)
        .ok_or_else(|| ServiceError::NotFound(format!("room `{room_id}`")))
}

pub(crate) fn unexpected_output(procedure: &str, output: &ProcedureOutput) -> ServiceError {
    ServiceError::RemoteProcedure(ProcedureError::Internal {
        reason: format!("`{procedure}` answered with an unexpected payload: {output:?}"),
    })
}

pub(crate) fn unexpected_record(collection: Collection) -> ServiceError {
    ServiceError::StoreWrite(StorageError::rejected(format!(
        "store answered with a record outside `{}`",
        collection.as_str()
    )))
}
