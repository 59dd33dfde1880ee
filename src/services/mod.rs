/// OpenAPI documentation generation.
pub mod documentation;
/// Health check service.
pub mod health_service;
/// Mission queues: initial provisioning and complete-and-refill.
pub mod mission_service;
/// Final ranking of a room.
pub mod results_service;
/// Room creation, joining and the host lifecycle actions.
pub mod room_service;
/// Server-Sent Events change feed.
pub mod sse_service;
/// Background store health checks.
pub mod store_supervisor;
/// Room subscriptions folding change events into a client.
pub mod sync_service;
