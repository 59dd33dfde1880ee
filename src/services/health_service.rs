use tracing::warn;

use crate::{dto::health::HealthResponse, state::SharedState};

/// Ping the store and report the supervisor's view of its health.
pub async fn health_status(state: &SharedState) -> HealthResponse {
    if let Err(err) = state.store().health_check().await {
        warn!(error = %err, "store health check failed");
        state.health().set(true);
    }

    if state.is_degraded() {
        HealthResponse::degraded()
    } else {
        HealthResponse::ok()
    }
}
