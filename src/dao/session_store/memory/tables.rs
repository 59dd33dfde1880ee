use indexmap::IndexMap;
use time::OffsetDateTime;
use uuid::Uuid;
use validator::Validate;

use crate::dao::{
    models::{
        Collection, Draft, MissionEntity, MissionStatus, NewMission, NewPlayer, NewRoom,
        PlayerEntity, Record, RoomEntity, RoomStatus,
    },
    query::{ChangeEvent, Filter, OrderBy, Patch},
    storage::{StorageError, StorageResult},
};

/// The three collections, each keyed by id and kept in insertion order.
#[derive(Debug, Default)]
pub(super) struct Tables {
    pub(super) rooms: IndexMap<Uuid, RoomEntity>,
    pub(super) players: IndexMap<Uuid, PlayerEntity>,
    pub(super) missions: IndexMap<Uuid, MissionEntity>,
}

impl Tables {
    /// Snapshot of every record of `collection`, in insertion order.
    pub(super) fn records(&self, collection: Collection) -> Vec<Record> {
        match collection {
            Collection::Rooms => self.rooms.values().cloned().map(Record::Rooms).collect(),
            Collection::Players => self.players.values().cloned().map(Record::Players).collect(),
            Collection::Missions => self
                .missions
                .values()
                .cloned()
                .map(Record::Missions)
                .collect(),
        }
    }

    /// Write `record` back, keeping its position when it already exists.
    pub(super) fn put(&mut self, record: Record) {
        match record {
            Record::Rooms(room) => {
                self.rooms.insert(room.id, room);
            }
            Record::Players(player) => {
                self.players.insert(player.id, player);
            }
            Record::Missions(mission) => {
                self.missions.insert(mission.id, mission);
            }
        }
    }

    pub(super) fn select(
        &self,
        collection: Collection,
        filter: &Filter,
        order_by: Option<&OrderBy>,
    ) -> Vec<Record> {
        let mut records = self
            .records(collection)
            .into_iter()
            .filter(|record| filter.matches(record))
            .collect::<Vec<_>>();
        if let Some(order_by) = order_by {
            order_by.sort(&mut records);
        }
        records
    }

    /// Validate and store a draft, returning the stored record and its insert event.
    pub(super) fn insert(&mut self, draft: Draft) -> StorageResult<(Record, ChangeEvent)> {
        let now = OffsetDateTime::now_utc();
        let record = match draft {
            Draft::Rooms(room) => Record::Rooms(self.accept_room(room, now)?),
            Draft::Players(player) => Record::Players(self.accept_player(player, now)?),
            Draft::Missions(mission) => Record::Missions(self.accept_mission(mission, now)?),
        };

        self.put(record.clone());
        let event = ChangeEvent::inserted(record.clone());
        Ok((record, event))
    }

    /// Patch every record matching `filter`, returning one update event per record.
    pub(super) fn update(
        &mut self,
        collection: Collection,
        filter: &Filter,
        patch: &Patch,
    ) -> StorageResult<Vec<ChangeEvent>> {
        if let Some(field) = patch.immutable_violation() {
            return Err(StorageError::rejected(format!(
                "field `{field}` of {} is immutable",
                collection.as_str()
            )));
        }
        if let Some(field) = patch.procedure_violation() {
            return Err(StorageError::rejected(format!(
                "field `{field}` of {} only changes through its procedure",
                collection.as_str()
            )));
        }

        let mut updated = Vec::new();
        for record in self.select(collection, filter, None) {
            let patched = patch.apply(&record).map_err(|err| {
                StorageError::rejected(format!(
                    "patch does not fit {} record `{}`: {err}",
                    collection.as_str(),
                    record.id()
                ))
            })?;
            let patched = match patched {
                Record::Rooms(room) => Record::Rooms(RoomEntity {
                    revision: room.revision + 1,
                    ..room
                }),
                other => other,
            };
            updated.push(patched);
        }

        Ok(updated
            .into_iter()
            .map(|record| {
                self.put(record.clone());
                ChangeEvent::updated(record)
            })
            .collect())
    }

    fn accept_room(&self, draft: NewRoom, now: OffsetDateTime) -> StorageResult<RoomEntity> {
        draft
            .validate()
            .map_err(|err| StorageError::rejected(format!("invalid room: {err}")))?;
        if !draft.code.chars().all(|c| c.is_ascii_digit()) {
            return Err(StorageError::rejected(format!(
                "room code `{}` is not numeric",
                draft.code
            )));
        }
        let taken = self
            .rooms
            .values()
            .any(|room| room.code == draft.code && room.status != RoomStatus::Finished);
        if taken {
            return Err(StorageError::rejected(format!(
                "room code `{}` is held by an active room",
                draft.code
            )));
        }

        Ok(RoomEntity {
            id: Uuid::new_v4(),
            code: draft.code,
            game_type: draft.game_type,
            status: draft.status,
            current_topic: None,
            revision: 0,
            created_at: now,
        })
    }

    fn accept_player(&self, draft: NewPlayer, now: OffsetDateTime) -> StorageResult<PlayerEntity> {
        draft
            .validate()
            .map_err(|err| StorageError::rejected(format!("invalid player: {err}")))?;
        if !self.rooms.contains_key(&draft.room_id) {
            return Err(StorageError::rejected(format!(
                "room `{}` does not exist",
                draft.room_id
            )));
        }
        if draft.is_host
            && self
                .players
                .values()
                .any(|player| player.room_id == draft.room_id && player.is_host)
        {
            return Err(StorageError::rejected(format!(
                "room `{}` already has a host",
                draft.room_id
            )));
        }

        Ok(PlayerEntity {
            id: Uuid::new_v4(),
            room_id: draft.room_id,
            name: draft.name,
            is_host: draft.is_host,
            score: draft.score,
            created_at: now,
        })
    }

    fn accept_mission(
        &self,
        draft: NewMission,
        now: OffsetDateTime,
    ) -> StorageResult<MissionEntity> {
        draft
            .validate()
            .map_err(|err| StorageError::rejected(format!("invalid mission: {err}")))?;
        match self.players.get(&draft.player_id) {
            Some(owner) if owner.room_id == draft.room_id => {}
            Some(_) => {
                return Err(StorageError::rejected(format!(
                    "player `{}` is not in room `{}`",
                    draft.player_id, draft.room_id
                )));
            }
            None => {
                return Err(StorageError::rejected(format!(
                    "player `{}` does not exist",
                    draft.player_id
                )));
            }
        }

        Ok(MissionEntity {
            id: Uuid::new_v4(),
            player_id: draft.player_id,
            room_id: draft.room_id,
            mission_content: draft.mission_content,
            status: draft.status,
            created_at: now,
        })
    }

    /// Contents of the player's missions that are still pending.
    pub(super) fn pending_contents(&self, player_id: Uuid) -> Vec<String> {
        self.missions
            .values()
            .filter(|mission| {
                mission.player_id == player_id && mission.status == MissionStatus::Pending
            })
            .map(|mission| mission.mission_content.clone())
            .collect()
    }

    pub(super) fn players_in(&self, room_id: Uuid) -> usize {
        self.players
            .values()
            .filter(|player| player.room_id == room_id)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dao::models::GAME_TYPE;

    fn room_draft(code: &str) -> Draft {
        Draft::Rooms(NewRoom {
            code: code.into(),
            game_type: GAME_TYPE.into(),
            status: RoomStatus::Waiting,
        })
    }

    fn player_draft(room_id: Uuid, name: &str, is_host: bool) -> Draft {
        Draft::Players(NewPlayer {
            room_id,
            name: name.into(),
            is_host,
            score: 0,
        })
    }

    #[test]
    fn insert_assigns_ids_and_rejects_bad_references() {
        let mut tables = Tables::default();
        let (room, event) = tables.insert(room_draft("4821")).unwrap();
        assert_eq!(event.record, room);

        let err = tables
            .insert(player_draft(Uuid::new_v4(), "Ghost", false))
            .unwrap_err();
        assert!(matches!(err, StorageError::Rejected { .. }));

        let (player, _) = tables.insert(player_draft(room.id(), "Alice", true)).unwrap();
        assert_ne!(player.id(), room.id());
        assert_eq!(tables.players_in(room.id()), 1);
    }

    #[test]
    fn second_host_and_busy_code_are_rejected() {
        let mut tables = Tables::default();
        let (room, _) = tables.insert(room_draft("4821")).unwrap();
        tables.insert(player_draft(room.id(), "Alice", true)).unwrap();

        assert!(tables.insert(player_draft(room.id(), "Mallory", true)).is_err());
        assert!(tables.insert(room_draft("4821")).is_err());
        assert!(tables.insert(room_draft("48a1")).is_err());
    }

    #[test]
    fn update_patches_matching_records_only() {
        let mut tables = Tables::default();
        let (room, _) = tables.insert(room_draft("1234")).unwrap();
        let (alice, _) = tables.insert(player_draft(room.id(), "Alice", true)).unwrap();
        tables.insert(player_draft(room.id(), "Bob", false)).unwrap();

        let events = tables
            .update(
                Collection::Players,
                &Filter::all().with("id", alice.id()),
                &Patch::new().set("name", "Ally"),
            )
            .unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(tables.players[&alice.id()].name, "Ally");

        let err = tables
            .update(
                Collection::Players,
                &Filter::all(),
                &Patch::new().set("is_host", true),
            )
            .unwrap_err();
        assert!(matches!(err, StorageError::Rejected { .. }));
    }

    #[test]
    fn procedure_owned_fields_cannot_be_patched() {
        let mut tables = Tables::default();
        let (room, _) = tables.insert(room_draft("4821")).unwrap();
        let (alice, _) = tables.insert(player_draft(room.id(), "Alice", true)).unwrap();
        let (mission, _) = tables
            .insert(Draft::Missions(NewMission {
                player_id: alice.id(),
                room_id: room.id(),
                mission_content: "Wave".into(),
                status: MissionStatus::Completed,
            }))
            .unwrap();
        tables.put(Record::Rooms(RoomEntity {
            status: RoomStatus::Finished,
            ..tables.rooms[&room.id()].clone()
        }));

        let rejected = [
            (Collection::Rooms, room.id(), Patch::new().set("status", RoomStatus::Waiting)),
            (Collection::Rooms, room.id(), Patch::new().set("current_topic", "Pets")),
            (Collection::Rooms, room.id(), Patch::new().set("revision", 0)),
            (Collection::Missions, mission.id(), Patch::new().set("status", MissionStatus::Pending)),
            (Collection::Players, alice.id(), Patch::new().set("score", 99)),
        ];
        for (collection, id, patch) in rejected {
            let err = tables
                .update(collection, &Filter::all().with("id", id), &patch)
                .unwrap_err();
            assert!(matches!(err, StorageError::Rejected { .. }), "{patch:?}");
        }

        assert_eq!(tables.rooms[&room.id()].status, RoomStatus::Finished);
        assert_eq!(tables.rooms[&room.id()].current_topic, None);
        assert_eq!(tables.missions[&mission.id()].status, MissionStatus::Completed);
        assert_eq!(tables.players[&alice.id()].score, 0);
    }

    #[test]
    fn room_patches_bump_the_revision() {
        let mut tables = Tables::default();
        let (room, _) = tables.insert(room_draft("4821")).unwrap();
        assert_eq!(room.as_room().map(|room| room.revision), Some(0));

        let events = tables
            .update(
                Collection::Rooms,
                &Filter::all().with("id", room.id()),
                &Patch::new().set("game_type", "charades"),
            )
            .unwrap();
        assert_eq!(events[0].record.as_room().map(|room| room.revision), Some(1));
        assert_eq!(tables.rooms[&room.id()].revision, 1);
    }
}
