use std::collections::HashMap;

use tracing::debug;
use uuid::Uuid;

use crate::{
    dao::{
        models::{Collection, MissionStatus, Record},
        query::{Filter, OrderBy},
        session_store::SessionStore,
    },
    dto::results::PlayerResult,
    error::ServiceError,
};

/// Final ranking of a room: players by score, highest first, each with the
/// missions they completed. Ties keep the order players joined in.
///
/// Read-only. Called before the room is finished it ranks whatever exists.
pub async fn compute_results(
    store: &dyn SessionStore,
    room_id: Uuid,
) -> Result<Vec<PlayerResult>, ServiceError> {
    let players = store
        .select_many(
            Collection::Players,
            Filter::all().with("room_id", room_id),
            Some(OrderBy::desc("score")),
        )
        .await?;

    let completed = store
        .select_many(
            Collection::Missions,
            Filter::all()
                .with("room_id", room_id)
                .with("status", MissionStatus::Completed),
            None,
        )
        .await?;

    let mut by_player: HashMap<Uuid, Vec<String>> = HashMap::new();
    for mission in completed.into_iter().filter_map(Record::into_mission) {
        by_player
            .entry(mission.player_id)
            .or_default()
            .push(mission.mission_content);
    }

    let results = players
        .into_iter()
        .filter_map(Record::into_player)
        .map(|player| PlayerResult {
            completed_missions: by_player.remove(&player.id).unwrap_or_default(),
            player_id: player.id,
            name: player.name,
            score: player.score,
        })
        .collect::<Vec<_>>();

    debug!(%room_id, players = results.len(), "results computed");
    Ok(results)
}
