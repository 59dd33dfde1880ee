use serde::Serialize;
use utoipa::ToSchema;

use crate::dao::models::Collection;

/// Name of the SSE event carrying one serialized change event.
pub const CHANGE_EVENT: &str = "change";
/// Name of the first SSE event of every change feed.
pub const HANDSHAKE_EVENT: &str = "handshake";

#[derive(Clone, Debug)]
/// Dispatched payload carried across SSE channels.
pub struct ServerEvent {
    pub event: Option<String>,
    pub data: String,
}

impl ServerEvent {
    /// Convenience wrapper that serialises `payload` into the SSE data field.
    pub fn json<E, T>(event: E, payload: &T) -> serde_json::Result<Self>
    where
        E: Into<Option<String>>,
        T: Serialize,
    {
        Ok(Self {
            event: event.into(),
            data: serde_json::to_string(payload)?,
        })
    }
}

#[derive(Debug, Serialize, ToSchema)]
/// Initial metadata sent to an SSE client when it connects.
pub struct Handshake {
    /// Collection the feed watches.
    pub collection: Collection,
    /// Human-readable message confirming the subscription.
    pub message: String,
    /// Whether the store failed its last health check.
    pub degraded: bool,
}
