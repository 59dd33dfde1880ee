//! The four atomic procedures. Each runs against `&mut Tables` while the
//! store lock is held, so checks and writes cannot interleave with another call.

use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    config::AppConfig,
    dao::{
        models::{MissionEntity, MissionStatus, PlayerEntity, Record, RoomEntity, RoomStatus},
        procedure::{Procedure, ProcedureError, ProcedureOutput},
        query::ChangeEvent,
    },
};

use super::tables::Tables;

/// Output of a procedure plus the change events it produced, in commit order.
pub(super) type Outcome = Result<(ProcedureOutput, Vec<ChangeEvent>), ProcedureError>;

pub(super) fn run(tables: &mut Tables, config: &AppConfig, procedure: Procedure) -> Outcome {
    match procedure {
        Procedure::StartGame { room_id, player_id } => {
            start_game(tables, config, room_id, player_id)
        }
        Procedure::ChangeTopic { room_id, player_id } => {
            change_topic(tables, config, room_id, player_id)
        }
        Procedure::CompleteAndRefill {
            mission_id,
            player_id,
        } => complete_and_refill(tables, config, mission_id, player_id),
        Procedure::FinishGame { room_id, player_id } => finish_game(tables, room_id, player_id),
    }
}

fn start_game(tables: &mut Tables, config: &AppConfig, room_id: Uuid, caller: Uuid) -> Outcome {
    let room = hosted_room(tables, room_id, caller, "start the game")?;
    if room.status != RoomStatus::Waiting {
        return Err(ProcedureError::InvalidTransition {
            procedure: "start_mission_game".into(),
            status: room.status,
        });
    }

    let players = tables.players_in(room_id);
    if players < config.min_players() {
        return Err(ProcedureError::precondition(format!(
            "{} players are required to start, room has {players}",
            config.min_players()
        )));
    }

    let topic = config
        .draw_topic(None)
        .ok_or_else(|| ProcedureError::precondition("topic pool is empty"))?;

    let room = RoomEntity {
        status: RoomStatus::Playing,
        current_topic: Some(topic),
        ..room
    };
    let (room, events) = commit_room(tables, room);
    Ok((ProcedureOutput::Room { room }, events))
}

fn change_topic(tables: &mut Tables, config: &AppConfig, room_id: Uuid, caller: Uuid) -> Outcome {
    let room = hosted_room(tables, room_id, caller, "change the topic")?;
    if room.status != RoomStatus::Playing {
        return Err(ProcedureError::InvalidTransition {
            procedure: "change_topic".into(),
            status: room.status,
        });
    }

    let topic = config
        .draw_topic(room.current_topic.as_deref())
        .ok_or_else(|| ProcedureError::precondition("topic pool is empty"))?;

    let room = RoomEntity {
        current_topic: Some(topic.clone()),
        ..room
    };
    let (room, events) = commit_room(tables, room);
    Ok((ProcedureOutput::Topic { topic, room }, events))
}

fn finish_game(tables: &mut Tables, room_id: Uuid, caller: Uuid) -> Outcome {
    let room = hosted_room(tables, room_id, caller, "finish the game")?;
    match room.status {
        RoomStatus::Finished => Ok((ProcedureOutput::Room { room }, Vec::new())),
        RoomStatus::Waiting => Err(ProcedureError::InvalidTransition {
            procedure: "finish_game".into(),
            status: room.status,
        }),
        RoomStatus::Playing => {
            let room = RoomEntity {
                status: RoomStatus::Finished,
                ..room
            };
            let (room, events) = commit_room(tables, room);
            Ok((ProcedureOutput::Room { room }, events))
        }
    }
}

fn complete_and_refill(
    tables: &mut Tables,
    config: &AppConfig,
    mission_id: Uuid,
    caller: Uuid,
) -> Outcome {
    let mission = tables
        .missions
        .get(&mission_id)
        .cloned()
        .ok_or_else(|| ProcedureError::not_found("mission", mission_id))?;
    if mission.player_id != caller {
        return Err(ProcedureError::permission(
            "missions can only be completed by their owner",
        ));
    }
    if mission.status == MissionStatus::Completed {
        return Err(ProcedureError::AlreadyCompleted { mission_id });
    }

    let room_status = tables
        .rooms
        .get(&mission.room_id)
        .map(|room| room.status)
        .ok_or_else(|| ProcedureError::not_found("room", mission.room_id))?;
    if room_status != RoomStatus::Playing {
        return Err(ProcedureError::InvalidTransition {
            procedure: "complete_and_refill".into(),
            status: room_status,
        });
    }

    let player = tables
        .players
        .get(&caller)
        .cloned()
        .ok_or_else(|| ProcedureError::not_found("player", caller))?;

    let pending = tables
        .pending_contents(caller)
        .into_iter()
        .filter(|content| content != &mission.mission_content)
        .collect::<Vec<_>>();
    let content = config
        .draw_missions(1, &pending)
        .pop()
        .ok_or_else(|| ProcedureError::Internal {
            reason: "mission pool is empty".into(),
        })?;
    let replacement = MissionEntity {
        id: Uuid::new_v4(),
        player_id: caller,
        room_id: mission.room_id,
        mission_content: content,
        status: MissionStatus::Pending,
        created_at: OffsetDateTime::now_utc(),
    };

    let completed = MissionEntity {
        status: MissionStatus::Completed,
        ..mission
    };
    let player = PlayerEntity {
        score: player.score.saturating_add(config.reward_points()),
        ..player
    };

    let events = vec![
        ChangeEvent::updated(Record::Missions(completed.clone())),
        ChangeEvent::updated(Record::Players(player.clone())),
        ChangeEvent::inserted(Record::Missions(replacement.clone())),
    ];
    tables.put(Record::Missions(completed.clone()));
    tables.put(Record::Players(player.clone()));
    tables.put(Record::Missions(replacement.clone()));

    Ok((
        ProcedureOutput::Refill {
            completed,
            replacement,
            player,
        },
        events,
    ))
}

/// Fetch the room and check that `caller` is its host.
fn hosted_room(
    tables: &Tables,
    room_id: Uuid,
    caller: Uuid,
    action: &str,
) -> Result<RoomEntity, ProcedureError> {
    let room = tables
        .rooms
        .get(&room_id)
        .cloned()
        .ok_or_else(|| ProcedureError::not_found("room", room_id))?;

    let is_host = tables
        .players
        .get(&caller)
        .is_some_and(|player| player.room_id == room_id && player.is_host);
    if !is_host {
        return Err(ProcedureError::permission(format!(
            "only the host can {action}"
        )));
    }

    Ok(room)
}

/// Store `room` under its next revision.
fn commit_room(tables: &mut Tables, room: RoomEntity) -> (RoomEntity, Vec<ChangeEvent>) {
    let room = RoomEntity {
        revision: room.revision + 1,
        ..room
    };
    tables.put(Record::Rooms(room.clone()));
    let events = vec![ChangeEvent::updated(Record::Rooms(room.clone()))];
    (room, events)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dao::models::{Draft, GAME_TYPE, NewMission, NewPlayer, NewRoom};

    struct Fixture {
        tables: Tables,
        config: AppConfig,
        room_id: Uuid,
        host: Uuid,
        guest: Uuid,
    }

    fn fixture() -> Fixture {
        let mut tables = Tables::default();
        let config = AppConfig::with_pools(
            vec!["Travel".into(), "Food".into()],
            vec!["m1".into(), "m2".into(), "m3".into(), "m4".into()],
        );
        let (room, _) = tables
            .insert(Draft::Rooms(NewRoom {
                code: "4821".into(),
                game_type: GAME_TYPE.into(),
                status: RoomStatus::Waiting,
            }))
            .unwrap();
        let mut join = |name: &str, is_host: bool| {
            tables
                .insert(Draft::Players(NewPlayer {
                    room_id: room.id(),
                    name: name.into(),
                    is_host,
                    score: 0,
                }))
                .unwrap()
                .0
                .id()
        };
        let host = join("Alice", true);
        let guest = join("Bob", false);

        Fixture {
            tables,
            config,
            room_id: room.id(),
            host,
            guest,
        }
    }

    fn give_mission(fx: &mut Fixture, owner: Uuid, content: &str) -> Uuid {
        fx.tables
            .insert(Draft::Missions(NewMission {
                player_id: owner,
                room_id: fx.room_id,
                mission_content: content.into(),
                status: MissionStatus::Pending,
            }))
            .unwrap()
            .0
            .id()
    }

    fn start(fx: &mut Fixture) {
        run(
            &mut fx.tables,
            &fx.config,
            Procedure::StartGame {
                room_id: fx.room_id,
                player_id: fx.host,
            },
        )
        .unwrap();
    }

    #[test]
    fn only_host_starts_and_only_from_waiting() {
        let mut fx = fixture();
        let by_guest = Procedure::StartGame {
            room_id: fx.room_id,
            player_id: fx.guest,
        };
        assert!(matches!(
            run(&mut fx.tables, &fx.config, by_guest),
            Err(ProcedureError::PermissionDenied { .. })
        ));
        assert_eq!(fx.tables.rooms[&fx.room_id].status, RoomStatus::Waiting);

        start(&mut fx);
        let room = &fx.tables.rooms[&fx.room_id];
        assert_eq!(room.status, RoomStatus::Playing);
        assert!(room.current_topic.is_some());

        let again = Procedure::StartGame {
            room_id: fx.room_id,
            player_id: fx.host,
        };
        assert!(matches!(
            run(&mut fx.tables, &fx.config, again),
            Err(ProcedureError::InvalidTransition {
                status: RoomStatus::Playing,
                ..
            })
        ));
    }

    #[test]
    fn start_requires_enough_players() {
        let mut tables = Tables::default();
        let config = AppConfig::default();
        let (room, _) = tables
            .insert(Draft::Rooms(NewRoom {
                code: "1000".into(),
                game_type: GAME_TYPE.into(),
                status: RoomStatus::Waiting,
            }))
            .unwrap();
        let (host, _) = tables
            .insert(Draft::Players(NewPlayer {
                room_id: room.id(),
                name: "Solo".into(),
                is_host: true,
                score: 0,
            }))
            .unwrap();

        let result = run(
            &mut tables,
            &config,
            Procedure::StartGame {
                room_id: room.id(),
                player_id: host.id(),
            },
        );
        assert!(matches!(result, Err(ProcedureError::Precondition { .. })));
    }

    #[test]
    fn change_topic_draws_a_different_topic() {
        let mut fx = fixture();
        start(&mut fx);
        let before = fx.tables.rooms[&fx.room_id].current_topic.clone();

        let (output, events) = run(
            &mut fx.tables,
            &fx.config,
            Procedure::ChangeTopic {
                room_id: fx.room_id,
                player_id: fx.host,
            },
        )
        .unwrap();

        let ProcedureOutput::Topic { topic, room } = output else {
            panic!("unexpected output {output:?}");
        };
        assert_ne!(Some(topic.clone()), before);
        assert_eq!(room.revision, 2);
        assert_eq!(events.len(), 1);
        assert_eq!(
            fx.tables.rooms[&fx.room_id].current_topic.as_deref(),
            Some(topic.as_str())
        );
    }

    #[test]
    fn finish_is_idempotent_and_silent_the_second_time() {
        let mut fx = fixture();
        let finish = Procedure::FinishGame {
            room_id: fx.room_id,
            player_id: fx.host,
        };
        assert!(run(&mut fx.tables, &fx.config, finish.clone()).is_err());

        start(&mut fx);
        let (_, events) = run(&mut fx.tables, &fx.config, finish.clone()).unwrap();
        assert_eq!(events.len(), 1);
        let (_, events) = run(&mut fx.tables, &fx.config, finish).unwrap();
        assert!(events.is_empty());
        assert_eq!(fx.tables.rooms[&fx.room_id].status, RoomStatus::Finished);
    }

    #[test]
    fn complete_rewards_once_and_keeps_queue_size() {
        let mut fx = fixture();
        let host = fx.host;
        let m1 = give_mission(&mut fx, host, "m1");
        give_mission(&mut fx, host, "m2");
        start(&mut fx);

        let complete = Procedure::CompleteAndRefill {
            mission_id: m1,
            player_id: host,
        };
        let (output, events) = run(&mut fx.tables, &fx.config, complete.clone()).unwrap();
        let ProcedureOutput::Refill {
            replacement,
            player,
            ..
        } = output
        else {
            panic!("unexpected output {output:?}");
        };
        assert_ne!(replacement.mission_content, "m2");
        assert_eq!(player.score, 1);
        assert_eq!(events.len(), 3);
        assert_eq!(fx.tables.pending_contents(host).len(), 2);

        assert_eq!(
            run(&mut fx.tables, &fx.config, complete),
            Err(ProcedureError::AlreadyCompleted { mission_id: m1 })
        );
        assert_eq!(fx.tables.players[&host].score, 1);
    }

    #[test]
    fn completion_rules_depend_on_owner_and_room_status() {
        let mut fx = fixture();
        let host = fx.host;
        let guest = fx.guest;
        let mission = give_mission(&mut fx, host, "m1");

        let waiting = run(
            &mut fx.tables,
            &fx.config,
            Procedure::CompleteAndRefill {
                mission_id: mission,
                player_id: host,
            },
        );
        assert!(matches!(
            waiting,
            Err(ProcedureError::InvalidTransition { .. })
        ));

        start(&mut fx);
        let stolen = run(
            &mut fx.tables,
            &fx.config,
            Procedure::CompleteAndRefill {
                mission_id: mission,
                player_id: guest,
            },
        );
        assert!(matches!(stolen, Err(ProcedureError::PermissionDenied { .. })));

        let unknown = Uuid::new_v4();
        assert_eq!(
            run(
                &mut fx.tables,
                &fx.config,
                Procedure::CompleteAndRefill {
                    mission_id: unknown,
                    player_id: host,
                },
            ),
            Err(ProcedureError::not_found("mission", unknown))
        );

        run(
            &mut fx.tables,
            &fx.config,
            Procedure::FinishGame {
                room_id: fx.room_id,
                player_id: host,
            },
        )
        .unwrap();
        let finished = run(
            &mut fx.tables,
            &fx.config,
            Procedure::CompleteAndRefill {
                mission_id: mission,
                player_id: host,
            },
        );
        assert_eq!(
            finished,
            Err(ProcedureError::InvalidTransition {
                procedure: "complete_and_refill".into(),
                status: RoomStatus::Finished,
            })
        );
        assert_eq!(fx.tables.missions[&mission].status, MissionStatus::Pending);
        assert_eq!(fx.tables.players[&host].score, 0);
        assert_eq!(fx.tables.pending_contents(host).len(), 1);
    }
}
