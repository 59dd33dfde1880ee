use std::time::{Duration, Instant};

use thiserror::Error;
use uuid::Uuid;

use crate::dao::models::RoomStatus;

/// Lifecycle actions the host can request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomEvent {
    /// Move the lobby into gameplay.
    StartGame,
    /// Draw a new topic; status stays `playing`.
    ChangeTopic,
    /// End the game.
    FinishGame,
}

/// Error returned when attempting to apply an invalid transition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cannot {} while the room is {}", describe(.event), status_label(.from))]
pub struct InvalidTransition {
    /// The status the room was in when the event was requested.
    pub from: RoomStatus,
    /// The event that cannot be applied from this status.
    pub event: RoomEvent,
}

fn describe(event: &RoomEvent) -> &'static str {
    match event {
        RoomEvent::StartGame => "start the game",
        RoomEvent::ChangeTopic => "change the topic",
        RoomEvent::FinishGame => "finish the game",
    }
}

fn status_label(status: &RoomStatus) -> &'static str {
    match status {
        RoomStatus::Waiting => "waiting",
        RoomStatus::Playing => "playing",
        RoomStatus::Finished => "finished",
    }
}

/// Errors that can occur when planning a state machine transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanError {
    /// A transition is already pending and must be applied or aborted.
    AlreadyPending,
    /// The requested transition is not valid from the current status.
    InvalidTransition(InvalidTransition),
}

/// Errors that can occur when applying a planned state machine transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyError {
    /// No transition is currently pending.
    NoPending,
    /// Plan ID does not match the pending plan.
    IdMismatch {
        /// Expected plan ID.
        expected: PlanId,
        /// Provided plan ID.
        got: PlanId,
    },
}

/// Errors that can occur when aborting a planned state machine transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbortError {
    /// No transition is currently pending.
    NoPending,
    /// Plan ID does not match the pending plan.
    IdMismatch {
        /// Expected plan ID.
        expected: PlanId,
        /// Provided plan ID.
        got: PlanId,
    },
}

/// Unique identifier for a planned state transition.
pub type PlanId = Uuid;

/// A validated transition waiting for the store to confirm it.
#[derive(Debug, Clone)]
pub struct Plan {
    /// Unique identifier for this plan.
    pub id: PlanId,
    /// Status the room was in when planned.
    pub from: RoomStatus,
    /// Status the room reaches once applied.
    pub to: RoomStatus,
    /// Event that triggered this transition.
    pub event: RoomEvent,
    /// Timestamp when this plan was created.
    pub pending_since: Instant,
}

impl Plan {
    /// Time spent waiting for the store so far.
    pub fn age(&self) -> Duration {
        self.pending_since.elapsed()
    }
}

/// Snapshot of the current state machine state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    /// Current room status as known locally.
    pub status: RoomStatus,
    /// Incremented each time the status moves forward.
    pub version: usize,
    /// Target status of the pending transition, if any.
    pub pending: Option<RoomStatus>,
}

/// Local mirror of the room lifecycle `waiting -> playing -> finished`.
///
/// The pending plan doubles as a reservation: while one lifecycle call is in
/// flight a second one from the same client is refused instead of queued.
#[derive(Debug, Clone)]
pub struct RoomStateMachine {
    status: RoomStatus,
    version: usize,
    pending: Option<Plan>,
}

impl Default for RoomStateMachine {
    fn default() -> Self {
        Self::new(RoomStatus::Waiting)
    }
}

impl RoomStateMachine {
    /// Create a state machine starting at `status`.
    pub fn new(status: RoomStatus) -> Self {
        Self {
            status,
            version: 0,
            pending: None,
        }
    }

    /// Inspect the current status.
    pub fn status(&self) -> RoomStatus {
        self.status
    }

    /// Create a snapshot of the current state machine state.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            status: self.status,
            version: self.version,
            pending: self.pending.as_ref().map(|plan| plan.to),
        }
    }

    /// Validate `event` against the current status and reserve the transition.
    pub fn plan(&mut self, event: RoomEvent) -> Result<Plan, PlanError> {
        if self.pending.is_some() {
            return Err(PlanError::AlreadyPending);
        }

        let next = self
            .compute_transition(event)
            .map_err(PlanError::InvalidTransition)?;

        let plan = Plan {
            id: Uuid::new_v4(),
            from: self.status,
            to: next,
            event,
            pending_since: Instant::now(),
        };

        self.pending = Some(plan.clone());

        Ok(plan)
    }

    /// Apply a planned transition once the store confirmed it.
    ///
    /// Change events may have advanced the status while the call was in
    /// flight, so the status only ever moves to the later of the two.
    pub fn apply(&mut self, plan_id: PlanId) -> Result<RoomStatus, ApplyError> {
        let plan = self.pending.take().ok_or(ApplyError::NoPending)?;

        if plan.id != plan_id {
            let expected_plan_id = plan.id;
            self.pending = Some(plan);
            return Err(ApplyError::IdMismatch {
                expected: expected_plan_id,
                got: plan_id,
            });
        }

        self.observe(plan.to);
        Ok(self.status)
    }

    /// Release a planned transition without applying it.
    pub fn abort(&mut self, plan_id: PlanId) -> Result<(), AbortError> {
        let plan = self.pending.as_ref().ok_or(AbortError::NoPending)?;

        if plan.id != plan_id {
            return Err(AbortError::IdMismatch {
                expected: plan.id,
                got: plan_id,
            });
        }

        self.pending = None;
        Ok(())
    }

    /// Follow a status reported by the store. Stale reports are ignored.
    /// Returns whether the status moved.
    pub fn observe(&mut self, status: RoomStatus) -> bool {
        if status > self.status {
            self.status = status;
            self.version += 1;
            true
        } else {
            false
        }
    }

    /// Compute a transition from an event if the transition is valid.
    fn compute_transition(&self, event: RoomEvent) -> Result<RoomStatus, InvalidTransition> {
        let next = match (self.status, event) {
            (RoomStatus::Waiting, RoomEvent::StartGame) => RoomStatus::Playing,
            (RoomStatus::Playing, RoomEvent::ChangeTopic) => RoomStatus::Playing,
            (RoomStatus::Playing, RoomEvent::FinishGame) => RoomStatus::Finished,
            (RoomStatus::Finished, RoomEvent::FinishGame) => RoomStatus::Finished,
            (from, event) => return Err(InvalidTransition { from, event }),
        };

        Ok(next)
    }
}
