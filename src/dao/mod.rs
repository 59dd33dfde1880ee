/// Record models shared by every layer.
pub mod models;
/// Remote procedure vocabulary.
pub mod procedure;
/// Filters, patches and change events.
pub mod query;
/// Storage backends for rooms, players and missions.
pub mod session_store;
/// Storage abstraction layer for database operations.
pub mod storage;
