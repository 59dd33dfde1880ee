use std::sync::Arc;

use tokio::sync::watch;

use crate::{dao::session_store::SessionStore, state::health::HealthFlag};

pub type SharedState = Arc<AppState>;

/// State shared by every route of the store server.
pub struct AppState {
    store: Arc<dyn SessionStore>,
    health: Arc<HealthFlag>,
}

impl AppState {
    /// Construct a new [`AppState`] wrapped in an [`Arc`] so it can be cloned cheaply.
    ///
    /// The server starts degraded until the supervisor's first health check passes.
    pub fn new(store: Arc<dyn SessionStore>) -> SharedState {
        Arc::new(Self {
            store,
            health: Arc::new(HealthFlag::new(true)),
        })
    }

    /// Backend serving every store route.
    pub fn store(&self) -> &dyn SessionStore {
        self.store.as_ref()
    }

    /// Owned handle on the backend, for the supervisor task.
    pub fn store_handle(&self) -> Arc<dyn SessionStore> {
        self.store.clone()
    }

    /// Health flag toggled by the supervisor.
    pub fn health(&self) -> Arc<HealthFlag> {
        self.health.clone()
    }

    /// Current degraded flag.
    pub fn is_degraded(&self) -> bool {
        self.health.is_degraded()
    }

    /// Subscribe to degraded mode updates.
    pub fn degraded_watcher(&self) -> watch::Receiver<bool> {
        self.health.watcher()
    }
}
