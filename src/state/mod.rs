pub mod health;
pub mod optimistic;
pub mod server;
pub mod state_machine;
pub mod view;

use std::{future::Future, sync::Arc, time::Duration};

use tokio::sync::{RwLock, broadcast, watch};
use tracing::{debug, warn};

use crate::{
    config::AppConfig,
    dao::{
        models::{MissionEntity, PlayerEntity, RoomEntity, RoomStatus},
        query::ChangeEvent,
        session_store::SessionStore,
    },
    dto::results::PlayerResult,
    error::ServiceError,
    identity::Session,
};

pub use self::health::HealthFlag;
pub use self::server::{AppState, SharedState};
pub use self::state_machine::{
    AbortError, ApplyError, InvalidTransition, Plan, PlanError, PlanId, RoomEvent, Snapshot,
};
use self::{
    optimistic::LocalChange,
    state_machine::RoomStateMachine,
    view::{Notice, SessionView},
};

pub type SharedClient = Arc<ClientState>;

/// Notices buffered per subscriber before the slowest one starts lagging.
const NOTICE_CAPACITY: usize = 64;

/// Store calls holding a lifecycle plan longer than this get a warning.
const SLOW_TRANSITION: Duration = Duration::from_secs(5);

/// State of one device inside one room: its session, the local lifecycle
/// mirror and the observable view the presentation layer renders.
pub struct ClientState {
    store: Arc<dyn SessionStore>,
    config: Arc<AppConfig>,
    session: Session,
    machine: RwLock<RoomStateMachine>,
    view: watch::Sender<SessionView>,
    notices: broadcast::Sender<Notice>,
    health: Arc<HealthFlag>,
}

impl ClientState {
    /// Construct a new [`ClientState`] wrapped in an [`Arc`] so it can be cloned cheaply.
    pub fn new(
        store: Arc<dyn SessionStore>,
        config: Arc<AppConfig>,
        session: Session,
    ) -> SharedClient {
        let (view, _rx) = watch::channel(SessionView::new(session));
        let (notices, _rx) = broadcast::channel(NOTICE_CAPACITY);
        Arc::new(Self {
            store,
            config,
            session,
            machine: RwLock::new(RoomStateMachine::default()),
            view,
            notices,
            health: Arc::new(HealthFlag::new(false)),
        })
    }

    /// Store this client talks to.
    pub fn store(&self) -> &dyn SessionStore {
        self.store.as_ref()
    }

    /// Owned handle on the store, for background tasks.
    pub fn store_handle(&self) -> Arc<dyn SessionStore> {
        self.store.clone()
    }

    /// Game rules and pools.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Identity of this device.
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Store reachability as seen by the supervisor.
    pub fn health(&self) -> Arc<HealthFlag> {
        self.health.clone()
    }

    /// Copy of the current view.
    pub fn view(&self) -> SessionView {
        self.view.borrow().clone()
    }

    /// Subscribe to view updates.
    pub fn view_watcher(&self) -> watch::Receiver<SessionView> {
        self.view.subscribe()
    }

    /// Subscribe to notices raised from now on.
    pub fn notices(&self) -> broadcast::Receiver<Notice> {
        self.notices.subscribe()
    }

    /// Snapshot the local lifecycle mirror.
    pub async fn lifecycle(&self) -> Snapshot {
        self.machine.read().await.snapshot()
    }

    /// Fold one change event into the view and publish the resulting notice.
    pub async fn ingest(&self, event: &ChangeEvent) -> Option<Notice> {
        // Held while the view is published so a watcher woken by the new
        // status plans against the same status.
        let mut machine = self.machine.write().await;
        let mut notice = None;
        self.view.send_if_modified(|view| {
            let (next, raised) = view.apply_remote_event(event);
            notice = raised;
            if next == *view {
                false
            } else {
                *view = next;
                true
            }
        });
        self.follow_room_status(&mut machine);
        drop(machine);

        if let Some(notice) = &notice {
            debug!(?notice, room_id = %self.session.room_id, "raising notice");
            // Nobody listening is fine; the view still carries the state.
            let _ = self.notices.send(notice.clone());
        }
        notice
    }

    /// Merge a freshly read snapshot into the view.
    pub async fn load_snapshot(
        &self,
        room: Option<RoomEntity>,
        players: Vec<PlayerEntity>,
        missions: Vec<MissionEntity>,
    ) {
        let mut machine = self.machine.write().await;
        self.view.send_modify(|view| {
            *view = view.with_snapshot(room, players, missions);
        });
        self.follow_room_status(&mut machine);
    }

    /// Publish the final ranking.
    pub fn set_results(&self, results: Vec<PlayerResult>) {
        self.view.send_modify(|view| view.results = Some(results));
    }

    fn follow_room_status(&self, machine: &mut RoomStateMachine) {
        let status = self.view.borrow().status();
        if let Some(status) = status {
            machine.observe(status);
        }
    }

    /// Plan a lifecycle transition, run `work` against the store, then apply
    /// or abort the plan depending on the outcome. No lock is held while
    /// `work` runs; the pending plan keeps a second transition out.
    pub async fn run_transition<F, Fut, T>(
        &self,
        event: RoomEvent,
        work: F,
    ) -> Result<(T, RoomStatus), ServiceError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, ServiceError>>,
    {
        let plan = self.machine.write().await.plan(event)?;

        let outcome = work().await;
        let elapsed = plan.age();
        if elapsed > SLOW_TRANSITION {
            warn!(
                event = ?event,
                plan_id = %plan.id,
                elapsed_ms = elapsed.as_millis() as u64,
                "store call held the room transition for a long time"
            );
        }

        match outcome {
            Ok(value) => {
                let next = self.machine.write().await.apply(plan.id)?;
                debug!(from = ?plan.from, to = ?next, elapsed_ms = elapsed.as_millis() as u64, "transition applied");
                Ok((value, next))
            }
            Err(err) => {
                if let Err(abort_err) = self.machine.write().await.abort(plan.id) {
                    warn!(
                        event = ?event,
                        plan_id = %plan.id,
                        error = ?abort_err,
                        "failed to abort transition after work error"
                    );
                } else {
                    debug!(event = ?event, from = ?plan.from, error = %err, "transition aborted");
                }
                Err(err)
            }
        }
    }

    /// Show `change` immediately, run `work`, and revert the change when the
    /// work fails in a way the change does not survive.
    pub async fn run_optimistic<F, Fut, T>(
        &self,
        change: LocalChange,
        work: F,
    ) -> Result<T, ServiceError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, ServiceError>>,
    {
        let mut undo = None;
        self.view.send_if_modified(|view| {
            let applied = change.apply(view);
            let changed = !applied.is_noop();
            undo = Some(applied);
            changed
        });

        let outcome = work().await;
        let Some(undo) = undo.filter(|undo| !undo.is_noop()) else {
            return outcome;
        };
        match &outcome {
            Err(err) if !change.survives(err) => {
                debug!(?change, error = %err, "reverting optimistic change");
                self.view.send_modify(|view| undo.revert(view));
            }
            _ => {
                self.view.send_if_modified(|view| {
                    let before = view.unconfirmed.len();
                    undo.settle(view);
                    view.unconfirmed.len() != before
                });
            }
        }
        outcome
    }
}
