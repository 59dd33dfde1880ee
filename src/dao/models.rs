use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use time::OffsetDateTime;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

/// Game type tag written on every room created by this crate.
pub const GAME_TYPE: &str = "mission-complete";

/// Lifecycle of a room. Variants are declared in transition order so the
/// derived [`Ord`] doubles as the "moves forward" relation.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash, ToSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum RoomStatus {
    /// Players are gathering in the lobby.
    Waiting,
    /// The host started the game; missions can be completed.
    Playing,
    /// Terminal state; results are final.
    Finished,
}

/// Lifecycle of a mission, one-way from pending to completed.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash, ToSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum MissionStatus {
    /// Still open in the player's queue.
    Pending,
    /// Done; counted in the final results.
    Completed,
}

/// The three collections held by a session store.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Collection {
    /// Game sessions.
    Rooms,
    /// Players registered in a room.
    Players,
    /// Private player missions.
    Missions,
}

impl Collection {
    /// Wire name of the collection.
    pub fn as_str(self) -> &'static str {
        match self {
            Collection::Rooms => "rooms",
            Collection::Players => "players",
            Collection::Missions => "missions",
        }
    }
}

/// Room record as stored.
#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct RoomEntity {
    /// Store-assigned identifier.
    pub id: Uuid,
    /// Four digit code shown to players.
    pub code: String,
    /// Game hosted in this room.
    pub game_type: String,
    /// Current lifecycle status.
    pub status: RoomStatus,
    /// Topic displayed to every player, set when the game starts.
    pub current_topic: Option<String>,
    /// Write counter, bumped on every committed change to the room.
    #[serde(default)]
    pub revision: u64,
    /// Creation timestamp.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// Player record as stored.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct PlayerEntity {
    /// Store-assigned identifier.
    pub id: Uuid,
    /// Room the player joined.
    pub room_id: Uuid,
    /// Display name.
    pub name: String,
    /// Whether this player drives the room lifecycle.
    pub is_host: bool,
    /// Accumulated reward points.
    pub score: i32,
    /// Creation timestamp.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// Mission record as stored.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct MissionEntity {
    /// Store-assigned identifier.
    pub id: Uuid,
    /// Owner of the mission.
    pub player_id: Uuid,
    /// Room of the owner, denormalized so room-scoped subscriptions can match.
    pub room_id: Uuid,
    /// Task text shown to the owner.
    pub mission_content: String,
    /// Current status.
    pub status: MissionStatus,
    /// Creation timestamp.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// Room fields supplied by the client; the store assigns id and timestamp.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema, Validate)]
pub struct NewRoom {
    /// Four digit display code.
    #[validate(length(equal = 4))]
    pub code: String,
    /// Game hosted in this room.
    pub game_type: String,
    /// Initial status, always `waiting` for rooms created by this crate.
    pub status: RoomStatus,
}

/// Player fields supplied by the joining client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema, Validate)]
pub struct NewPlayer {
    /// Room to join.
    pub room_id: Uuid,
    /// Display name, one to ten characters.
    #[validate(length(min = 1, max = 10))]
    pub name: String,
    /// Host role marker taken from the join link.
    pub is_host: bool,
    /// Starting score.
    pub score: i32,
}

/// Mission fields supplied when provisioning a queue.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema, Validate)]
pub struct NewMission {
    /// Owner of the mission.
    pub player_id: Uuid,
    /// Room of the owner.
    pub room_id: Uuid,
    /// Task text.
    #[validate(length(min = 1))]
    pub mission_content: String,
    /// Initial status.
    pub status: MissionStatus,
}

/// Insert payload, tagged with the collection it targets.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(tag = "collection", content = "record", rename_all = "snake_case")]
pub enum Draft {
    /// New room.
    Rooms(NewRoom),
    /// New player.
    Players(NewPlayer),
    /// New mission.
    Missions(NewMission),
}

impl Draft {
    /// Collection the draft is inserted into.
    pub fn collection(&self) -> Collection {
        match self {
            Draft::Rooms(_) => Collection::Rooms,
            Draft::Players(_) => Collection::Players,
            Draft::Missions(_) => Collection::Missions,
        }
    }
}

/// Stored record of any collection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(tag = "collection", content = "record", rename_all = "snake_case")]
pub enum Record {
    /// Room record.
    Rooms(RoomEntity),
    /// Player record.
    Players(PlayerEntity),
    /// Mission record.
    Missions(MissionEntity),
}

impl Record {
    /// Collection the record lives in.
    pub fn collection(&self) -> Collection {
        match self {
            Record::Rooms(_) => Collection::Rooms,
            Record::Players(_) => Collection::Players,
            Record::Missions(_) => Collection::Missions,
        }
    }

    /// Identifier of the record.
    pub fn id(&self) -> Uuid {
        match self {
            Record::Rooms(room) => room.id,
            Record::Players(player) => player.id,
            Record::Missions(mission) => mission.id,
        }
    }

    /// JSON object view of the record body, used for filters and patches.
    pub fn to_value(&self) -> serde_json::Result<serde_json::Value> {
        match self {
            Record::Rooms(room) => serde_json::to_value(room),
            Record::Players(player) => serde_json::to_value(player),
            Record::Missions(mission) => serde_json::to_value(mission),
        }
    }

    /// Rebuild a record of `collection` from its JSON object view.
    pub fn from_value(
        collection: Collection,
        value: serde_json::Value,
    ) -> serde_json::Result<Self> {
        Ok(match collection {
            Collection::Rooms => Record::Rooms(serde_json::from_value(value)?),
            Collection::Players => Record::Players(serde_json::from_value(value)?),
            Collection::Missions => Record::Missions(serde_json::from_value(value)?),
        })
    }

    /// Borrow the room, if this is a room record.
    pub fn as_room(&self) -> Option<&RoomEntity> {
        match self {
            Record::Rooms(room) => Some(room),
            _ => None,
        }
    }

    /// Borrow the player, if this is a player record.
    pub fn as_player(&self) -> Option<&PlayerEntity> {
        match self {
            Record::Players(player) => Some(player),
            _ => None,
        }
    }

    /// Borrow the mission, if this is a mission record.
    pub fn as_mission(&self) -> Option<&MissionEntity> {
        match self {
            Record::Missions(mission) => Some(mission),
            _ => None,
        }
    }

    /// Take the room out of the record.
    pub fn into_room(self) -> Option<RoomEntity> {
        match self {
            Record::Rooms(room) => Some(room),
            _ => None,
        }
    }

    /// Take the player out of the record.
    pub fn into_player(self) -> Option<PlayerEntity> {
        match self {
            Record::Players(player) => Some(player),
            _ => None,
        }
    }

    /// Take the mission out of the record.
    pub fn into_mission(self) -> Option<MissionEntity> {
        match self {
            Record::Missions(mission) => Some(mission),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_order_follows_lifecycle() {
        assert!(RoomStatus::Waiting < RoomStatus::Playing);
        assert!(RoomStatus::Playing < RoomStatus::Finished);
        assert!(MissionStatus::Pending < MissionStatus::Completed);
    }

    #[test]
    fn record_is_tagged_with_collection() {
        let record = Record::Players(PlayerEntity {
            id: Uuid::new_v4(),
            room_id: Uuid::new_v4(),
            name: "Alice".into(),
            is_host: true,
            score: 0,
            created_at: OffsetDateTime::UNIX_EPOCH,
        });

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["collection"], "players");
        assert_eq!(json["record"]["name"], "Alice");
        assert_eq!(json["record"]["created_at"], "1970-01-01T00:00:00Z");
    }

    #[test]
    fn player_name_is_bounded() {
        let mut draft = NewPlayer {
            room_id: Uuid::new_v4(),
            name: "たなか".into(),
            is_host: false,
            score: 0,
        };
        assert!(draft.validate().is_ok());

        draft.name = String::new();
        assert!(draft.validate().is_err());

        draft.name = "abcdefghijk".into();
        assert!(draft.validate().is_err());
    }
}
