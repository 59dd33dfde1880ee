use std::{sync::Arc, time::Duration};

use tokio::time::sleep;
use tracing::{info, warn};

use crate::{dao::session_store::SessionStore, state::HealthFlag};

const INITIAL_DELAY: Duration = Duration::from_millis(1_000);
const MAX_DELAY: Duration = Duration::from_secs(10);
const HEALTH_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Ping the store forever, flipping `health` into degraded mode while it is
/// unreachable and back once it answers again.
pub async fn run(store: Arc<dyn SessionStore>, health: Arc<HealthFlag>) {
    let mut delay = INITIAL_DELAY;

    loop {
        match store.health_check().await {
            Ok(()) => {
                if health.set(false) {
                    info!("store reachable; leaving degraded mode");
                }
                delay = INITIAL_DELAY;
                sleep(HEALTH_POLL_INTERVAL).await;
            }
            Err(err) => {
                if health.set(true) {
                    warn!(error = %err, "store health check failed; entering degraded mode");
                } else {
                    warn!(error = %err, retry_in = ?delay, "store still unreachable");
                }
                sleep(delay).await;
                delay = (delay * 2).min(MAX_DELAY);
            }
        }
    }
}
