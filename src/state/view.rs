//! Client-side projection of one room, folded from store change events.

use std::collections::HashSet;

use indexmap::IndexMap;
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    dao::{
        models::{MissionEntity, MissionStatus, PlayerEntity, Record, RoomEntity, RoomStatus},
        query::{ChangeEvent, ChangeKind},
    },
    dto::results::PlayerResult,
    identity::Session,
};

/// Short-lived announcement surfaced to the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(tag = "notice", rename_all = "snake_case")]
pub enum Notice {
    /// Someone new entered the room.
    PlayerJoined { player_id: Uuid, name: String },
    /// The host started the game.
    GameStarted { topic: Option<String> },
    /// The host drew a new topic.
    TopicChanged { topic: Option<String> },
    /// The host ended the game.
    GameFinished,
    /// Another player finished one of their missions.
    MissionCompleted {
        player_id: Uuid,
        player_name: Option<String>,
    },
}

/// Everything a screen needs to render the room for this device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionView {
    /// Who this device is.
    pub session: Session,
    /// Room record, once loaded.
    pub room: Option<RoomEntity>,
    /// Players in join order.
    pub players: IndexMap<Uuid, PlayerEntity>,
    /// This player's own missions in creation order. Empty on the display.
    pub missions: IndexMap<Uuid, MissionEntity>,
    /// Final ranking, filled once the room is finished.
    pub results: Option<Vec<PlayerResult>>,
    /// Own missions ticked locally that the store has not confirmed yet.
    pub unconfirmed: HashSet<Uuid>,
}

impl SessionView {
    /// Empty view for `session`.
    pub fn new(session: Session) -> Self {
        Self {
            session,
            room: None,
            players: IndexMap::new(),
            missions: IndexMap::new(),
            results: None,
            unconfirmed: HashSet::new(),
        }
    }

    /// Room status, once the room is loaded.
    pub fn status(&self) -> Option<RoomStatus> {
        self.room.as_ref().map(|room| room.status)
    }

    /// Topic currently shown to everyone.
    pub fn topic(&self) -> Option<&str> {
        self.room
            .as_ref()
            .and_then(|room| room.current_topic.as_deref())
    }

    /// This device's player record.
    pub fn me(&self) -> Option<&PlayerEntity> {
        self.session
            .player_id
            .and_then(|player_id| self.players.get(&player_id))
    }

    /// Own missions with pending ones first; creation order within each group.
    pub fn ordered_missions(&self) -> Vec<&MissionEntity> {
        let mut missions = self.missions.values().collect::<Vec<_>>();
        missions.sort_by_key(|mission| mission.status);
        missions
    }

    /// Number of own missions still pending.
    pub fn pending_count(&self) -> usize {
        self.missions
            .values()
            .filter(|mission| mission.status == MissionStatus::Pending)
            .count()
    }

    /// Fold one change event into a new view.
    ///
    /// Pure: `self` is left untouched. Statuses and scores only move forward,
    /// so stale or duplicated deliveries are harmless.
    pub fn apply_remote_event(&self, event: &ChangeEvent) -> (SessionView, Option<Notice>) {
        let mut next = self.clone();
        let notice = match &event.record {
            Record::Rooms(room) => next.fold_room(room),
            Record::Players(player) => next.fold_player(event.kind, player),
            Record::Missions(mission) => next.fold_mission(event.kind, mission),
        };
        (next, notice)
    }

    /// Merge a freshly loaded snapshot without raising notices.
    pub fn with_snapshot(
        &self,
        room: Option<RoomEntity>,
        players: Vec<PlayerEntity>,
        missions: Vec<MissionEntity>,
    ) -> SessionView {
        let records = room
            .map(Record::Rooms)
            .into_iter()
            .chain(players.into_iter().map(Record::Players))
            .chain(missions.into_iter().map(Record::Missions));

        records.fold(self.clone(), |view, record| {
            view.apply_remote_event(&ChangeEvent::updated(record)).0
        })
    }

    fn fold_room(&mut self, room: &RoomEntity) -> Option<Notice> {
        if room.id != self.session.room_id {
            return None;
        }

        let Some(current) = self.room.as_ref() else {
            self.room = Some(room.clone());
            return None;
        };

        // Older writes arriving late never roll the room back.
        if room.revision < current.revision || room.status < current.status {
            return None;
        }

        let notice = if room.status > current.status {
            match room.status {
                RoomStatus::Playing => Some(Notice::GameStarted {
                    topic: room.current_topic.clone(),
                }),
                RoomStatus::Finished => Some(Notice::GameFinished),
                RoomStatus::Waiting => None,
            }
        } else if room.status == RoomStatus::Playing
            && room.current_topic != current.current_topic
        {
            Some(Notice::TopicChanged {
                topic: room.current_topic.clone(),
            })
        } else {
            None
        };

        self.room = Some(room.clone());
        notice
    }

    fn fold_player(&mut self, kind: ChangeKind, player: &PlayerEntity) -> Option<Notice> {
        if player.room_id != self.session.room_id {
            return None;
        }

        match self.players.get_mut(&player.id) {
            Some(existing) => {
                let score = existing.score.max(player.score);
                *existing = PlayerEntity {
                    score,
                    ..player.clone()
                };
                None
            }
            None => {
                self.players.insert(player.id, player.clone());
                (kind == ChangeKind::Insert).then(|| Notice::PlayerJoined {
                    player_id: player.id,
                    name: player.name.clone(),
                })
            }
        }
    }

    fn fold_mission(&mut self, kind: ChangeKind, mission: &MissionEntity) -> Option<Notice> {
        if mission.room_id != self.session.room_id {
            return None;
        }

        if self.session.player_id == Some(mission.player_id) {
            if mission.status == MissionStatus::Completed {
                self.unconfirmed.remove(&mission.id);
            }
            match self.missions.get_mut(&mission.id) {
                Some(existing) => {
                    let status = existing.status.max(mission.status);
                    *existing = MissionEntity {
                        status,
                        ..mission.clone()
                    };
                }
                None => {
                    self.missions.insert(mission.id, mission.clone());
                }
            }
            return None;
        }

        // Other players' missions stay private; only the completion is announced.
        (kind == ChangeKind::Update && mission.status == MissionStatus::Completed).then(|| {
            Notice::MissionCompleted {
                player_id: mission.player_id,
                player_name: self
                    .players
                    .get(&mission.player_id)
                    .map(|player| player.name.clone()),
            }
        })
    }
}
