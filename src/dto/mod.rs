/// Health check payloads.
pub mod health;
/// Final ranking rows.
pub mod results;
/// Server-Sent Events payloads.
pub mod sse;
/// Request and response bodies of the store routes.
pub mod store;
/// Custom validators shared by requests and services.
pub mod validation;
