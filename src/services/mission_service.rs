use tracing::{debug, info};
use uuid::Uuid;

use crate::{
    config::AppConfig,
    dao::{
        models::{Collection, Draft, MissionEntity, MissionStatus, NewMission, PlayerEntity, Record},
        procedure::{Procedure, ProcedureOutput},
        query::{ChangeEvent, Filter},
        session_store::SessionStore,
    },
    error::ServiceError,
    services::room_service::{unexpected_output, unexpected_record},
    state::{ClientState, optimistic::LocalChange},
};

/// What a completion request ended up doing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompletionOutcome {
    /// The mission was completed by this call.
    Completed {
        /// Mission queued in its place.
        replacement: MissionEntity,
        /// Owner's score after the reward.
        score: i32,
    },
    /// Someone (usually this device, on a retry) completed it first. Nothing changed.
    AlreadyCompleted,
}

/// Give a freshly joined player their first batch of pending missions.
pub async fn provision_initial_missions(
    store: &dyn SessionStore,
    config: &AppConfig,
    player: &PlayerEntity,
) -> Result<Vec<MissionEntity>, ServiceError> {
    let pending = store
        .select_many(
            Collection::Missions,
            Filter::all()
                .with("player_id", player.id)
                .with("status", MissionStatus::Pending),
            None,
        )
        .await?
        .into_iter()
        .filter_map(Record::into_mission)
        .map(|mission| mission.mission_content)
        .collect::<Vec<_>>();

    let contents = config.draw_missions(config.initial_missions(), &pending);
    let mut missions = Vec::with_capacity(contents.len());
    for mission_content in contents {
        let mission = store
            .insert(Draft::Missions(NewMission {
                player_id: player.id,
                room_id: player.room_id,
                mission_content,
                status: MissionStatus::Pending,
            }))
            .await?
            .into_mission()
            .ok_or_else(|| unexpected_record(Collection::Missions))?;
        missions.push(mission);
    }

    debug!(player_id = %player.id, count = missions.len(), "initial missions provisioned");
    Ok(missions)
}

/// Complete one of this player's missions, collecting the reward and a replacement.
///
/// The mission is ticked in the view right away and unticked again if the
/// store refuses. A mission that turns out to be completed already is reported
/// as [`CompletionOutcome::AlreadyCompleted`] rather than as an error.
pub async fn complete_mission(
    client: &ClientState,
    mission_id: Uuid,
) -> Result<CompletionOutcome, ServiceError> {
    let player_id = client.session().require_player()?;

    let result = client
        .run_optimistic(LocalChange::MarkMissionCompleted { mission_id }, || async {
            match client
                .store()
                .call(Procedure::CompleteAndRefill {
                    mission_id,
                    player_id,
                })
                .await?
            {
                ProcedureOutput::Refill {
                    completed,
                    replacement,
                    player,
                } => Ok((completed, replacement, player)),
                other => Err(unexpected_output("complete_and_refill", &other)),
            }
        })
        .await;

    match result {
        Ok((completed, replacement, player)) => {
            client
                .ingest(&ChangeEvent::updated(Record::Missions(completed)))
                .await;
            let score = player.score;
            client
                .ingest(&ChangeEvent::updated(Record::Players(player)))
                .await;
            client
                .ingest(&ChangeEvent::inserted(Record::Missions(replacement.clone())))
                .await;

            info!(%mission_id, %player_id, score, "mission completed");
            Ok(CompletionOutcome::Completed { replacement, score })
        }
        Err(ServiceError::AlreadyCompleted(_)) => {
            debug!(%mission_id, "mission was already completed");
            Ok(CompletionOutcome::AlreadyCompleted)
        }
        Err(err) => Err(err),
    }
}
