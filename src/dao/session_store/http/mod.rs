mod config;
mod error;
mod sse;
mod store;

pub use config::HttpStoreConfig;
pub use error::{HttpResult, HttpStoreError};
pub use store::HttpSessionStore;
