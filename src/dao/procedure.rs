//! Atomic server-side units invoked through [`SessionStore::call`].
//!
//! [`SessionStore::call`]: crate::dao::session_store::SessionStore::call

use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::dao::models::{MissionEntity, PlayerEntity, RoomEntity, RoomStatus};

/// Remote procedures the store executes as one unit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(tag = "procedure", rename_all = "snake_case")]
pub enum Procedure {
    /// Move a waiting room to playing and draw the first topic.
    #[serde(rename = "start_mission_game")]
    StartGame {
        /// Room to start.
        room_id: Uuid,
        /// Caller, must be the room host.
        player_id: Uuid,
    },
    /// Draw a new topic for a playing room.
    ChangeTopic {
        /// Room whose topic changes.
        room_id: Uuid,
        /// Caller, must be the room host.
        player_id: Uuid,
    },
    /// Complete a mission, reward its owner and queue a replacement.
    CompleteAndRefill {
        /// Mission being completed.
        mission_id: Uuid,
        /// Caller, must own the mission.
        player_id: Uuid,
    },
    /// Move a playing room to finished. No-op when already finished.
    FinishGame {
        /// Room to finish.
        room_id: Uuid,
        /// Caller, must be the room host.
        player_id: Uuid,
    },
}

impl Procedure {
    /// Name of the procedure on the wire.
    pub fn name(&self) -> &'static str {
        match self {
            Procedure::StartGame { .. } => "start_mission_game",
            Procedure::ChangeTopic { .. } => "change_topic",
            Procedure::CompleteAndRefill { .. } => "complete_and_refill",
            Procedure::FinishGame { .. } => "finish_game",
        }
    }

    /// Identity of the caller.
    pub fn caller(&self) -> Uuid {
        match self {
            Procedure::StartGame { player_id, .. }
            | Procedure::ChangeTopic { player_id, .. }
            | Procedure::CompleteAndRefill { player_id, .. }
            | Procedure::FinishGame { player_id, .. } => *player_id,
        }
    }
}

/// Successful result of a procedure.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(tag = "output", rename_all = "snake_case")]
pub enum ProcedureOutput {
    /// Room state after a lifecycle procedure.
    Room {
        /// Updated room.
        room: RoomEntity,
    },
    /// Topic written by `change_topic`.
    Topic {
        /// Newly drawn topic.
        topic: String,
        /// Room as committed with the new topic.
        room: RoomEntity,
    },
    /// Records touched by `complete_and_refill`.
    Refill {
        /// The mission that was just completed.
        completed: MissionEntity,
        /// Pending mission queued in its place.
        replacement: MissionEntity,
        /// Owner with the updated score.
        player: PlayerEntity,
    },
}

/// Refusal reported by a procedure. Serializable so it survives the HTTP hop.
#[derive(Debug, Clone, Error, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(tag = "code", rename_all = "snake_case")]
pub enum ProcedureError {
    /// Caller lacks the role required by the procedure.
    #[error("permission denied: {reason}")]
    PermissionDenied {
        /// Human-readable reason.
        reason: String,
    },
    /// Room status does not allow the procedure.
    #[error("cannot {procedure} while room is {status:?}")]
    InvalidTransition {
        /// Name of the refused procedure.
        procedure: String,
        /// Room status at the time of the call.
        status: RoomStatus,
    },
    /// Some other precondition failed (player count, empty pool, ...).
    #[error("precondition failed: {reason}")]
    Precondition {
        /// Human-readable reason.
        reason: String,
    },
    /// Referenced record does not exist.
    #[error("{what} `{id}` not found")]
    NotFound {
        /// Kind of record.
        what: String,
        /// Identifier that was looked up.
        id: Uuid,
    },
    /// The mission was already completed; nothing was changed.
    #[error("mission `{mission_id}` is already completed")]
    AlreadyCompleted {
        /// Mission that was already completed.
        mission_id: Uuid,
    },
    /// The server failed while running the procedure.
    #[error("server failure: {reason}")]
    Internal {
        /// Human-readable reason.
        reason: String,
    },
}

impl ProcedureError {
    /// Permission refusal with a reason.
    pub fn permission(reason: impl Into<String>) -> Self {
        ProcedureError::PermissionDenied {
            reason: reason.into(),
        }
    }

    /// Precondition refusal with a reason.
    pub fn precondition(reason: impl Into<String>) -> Self {
        ProcedureError::Precondition {
            reason: reason.into(),
        }
    }

    /// Missing record of kind `what`.
    pub fn not_found(what: &str, id: Uuid) -> Self {
        ProcedureError::NotFound {
            what: what.to_string(),
            id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn procedures_are_tagged_with_their_wire_name() {
        let procedure = Procedure::StartGame {
            room_id: Uuid::nil(),
            player_id: Uuid::nil(),
        };
        let json = serde_json::to_value(&procedure).unwrap();
        assert_eq!(json["procedure"], procedure.name());

        let procedure = Procedure::CompleteAndRefill {
            mission_id: Uuid::nil(),
            player_id: Uuid::nil(),
        };
        let json = serde_json::to_value(&procedure).unwrap();
        assert_eq!(json["procedure"], "complete_and_refill");
    }

    #[test]
    fn errors_keep_their_variant_across_json() {
        let err = ProcedureError::AlreadyCompleted {
            mission_id: Uuid::new_v4(),
        };
        let json = serde_json::to_string(&err).unwrap();
        let back: ProcedureError = serde_json::from_str(&json).unwrap();
        assert_eq!(back, err);
    }
}
