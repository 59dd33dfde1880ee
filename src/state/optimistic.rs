//! Local changes applied ahead of the store, each paired with its inverse.

use uuid::Uuid;

use crate::{
    dao::models::{MissionEntity, MissionStatus},
    error::ServiceError,
    state::view::SessionView,
};

/// Change shown to the user before the store confirms it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalChange {
    /// Tick a mission as done while `complete_and_refill` runs.
    MarkMissionCompleted { mission_id: Uuid },
}

/// Compensation restoring the view to its state before a [`LocalChange`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Undo {
    previous_mission: Option<MissionEntity>,
}

impl LocalChange {
    /// Apply the change to `view`, returning how to revert it.
    pub fn apply(&self, view: &mut SessionView) -> Undo {
        match self {
            LocalChange::MarkMissionCompleted { mission_id } => {
                let Some(mission) = view.missions.get_mut(mission_id) else {
                    return Undo::default();
                };
                if mission.status == MissionStatus::Completed {
                    return Undo::default();
                }
                let previous = mission.clone();
                mission.status = MissionStatus::Completed;
                view.unconfirmed.insert(previous.id);
                Undo {
                    previous_mission: Some(previous),
                }
            }
        }
    }

    /// Whether the change stays applied even though the call failed.
    /// A mission someone already completed is still completed.
    pub fn survives(&self, err: &ServiceError) -> bool {
        match self {
            LocalChange::MarkMissionCompleted { mission_id } => {
                matches!(err, ServiceError::AlreadyCompleted(id) if id == mission_id)
            }
        }
    }
}

impl Undo {
    /// Whether reverting would change anything.
    pub fn is_noop(&self) -> bool {
        self.previous_mission.is_none()
    }

    /// Put back what the change overwrote, unless the store confirmed the
    /// change in the meantime.
    pub fn revert(self, view: &mut SessionView) {
        if let Some(previous) = self.previous_mission {
            if view.unconfirmed.remove(&previous.id) {
                view.missions.insert(previous.id, previous);
            }
        }
    }

    /// Keep the change and stop tracking it as unconfirmed.
    pub fn settle(self, view: &mut SessionView) {
        if let Some(previous) = self.previous_mission {
            view.unconfirmed.remove(&previous.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use time::OffsetDateTime;

    use super::*;
    use crate::{
        dao::{
            models::Record, procedure::ProcedureError, query::ChangeEvent, storage::StorageError,
        },
        identity::Session,
    };

    fn view_with_mission() -> (SessionView, Uuid) {
        let room_id = Uuid::new_v4();
        let player_id = Uuid::new_v4();
        let mission = MissionEntity {
            id: Uuid::new_v4(),
            player_id,
            room_id,
            mission_content: "Wave".into(),
            status: MissionStatus::Pending,
            created_at: OffsetDateTime::UNIX_EPOCH,
        };
        let mut view = SessionView::new(Session::player(room_id, player_id));
        let id = mission.id;
        view.missions.insert(id, mission);
        (view, id)
    }

    #[test]
    fn mark_and_revert_restore_the_original_view() {
        let (original, mission_id) = view_with_mission();
        let mut view = original.clone();

        let change = LocalChange::MarkMissionCompleted { mission_id };
        let undo = change.apply(&mut view);
        assert_eq!(view.pending_count(), 0);
        assert!(!undo.is_noop());

        undo.revert(&mut view);
        assert_eq!(view, original);
    }

    #[test]
    fn revert_keeps_a_completion_the_store_confirmed() {
        let (mut view, mission_id) = view_with_mission();
        let undo = LocalChange::MarkMissionCompleted { mission_id }.apply(&mut view);
        assert!(view.unconfirmed.contains(&mission_id));

        let confirmed = MissionEntity {
            status: MissionStatus::Completed,
            ..view.missions[&mission_id].clone()
        };
        let (mut view, _) =
            view.apply_remote_event(&ChangeEvent::updated(Record::Missions(confirmed)));
        assert!(view.unconfirmed.is_empty());

        undo.revert(&mut view);
        assert_eq!(view.missions[&mission_id].status, MissionStatus::Completed);
        assert_eq!(view.pending_count(), 0);
    }

    #[test]
    fn settled_marks_stay_and_completed_missions_are_not_marked_twice() {
        let (mut view, mission_id) = view_with_mission();
        let change = LocalChange::MarkMissionCompleted { mission_id };
        change.apply(&mut view).settle(&mut view);
        assert!(view.unconfirmed.is_empty());
        assert_eq!(view.pending_count(), 0);

        assert!(change.apply(&mut view).is_noop());
        assert!(view.unconfirmed.is_empty());
    }

    #[test]
    fn unknown_mission_yields_a_noop_undo() {
        let (mut view, _) = view_with_mission();
        let undo = LocalChange::MarkMissionCompleted {
            mission_id: Uuid::new_v4(),
        }
        .apply(&mut view);
        assert!(undo.is_noop());
    }

    #[test]
    fn only_already_completed_keeps_the_mark() {
        let mission_id = Uuid::new_v4();
        let change = LocalChange::MarkMissionCompleted { mission_id };

        assert!(change.survives(&ServiceError::AlreadyCompleted(mission_id)));
        assert!(!change.survives(&ServiceError::AlreadyCompleted(Uuid::new_v4())));
        assert!(!change.survives(&ServiceError::NotFound("mission".into())));
        assert!(!change.survives(&StorageError::from(ProcedureError::permission("no")).into()));
    }
}
