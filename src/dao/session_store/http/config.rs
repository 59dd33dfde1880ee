use super::error::{HttpResult, HttpStoreError};

/// Environment variable naming the server the client talks to.
const BASE_URL_ENV: &str = "MISSION_COMPLETE_BASE_URL";

/// Runtime configuration describing where the session server lives.
#[derive(Debug, Clone)]
pub struct HttpStoreConfig {
    pub base_url: String,
}

impl HttpStoreConfig {
    /// Construct a configuration from an explicit base URL.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
        }
    }

    /// Build a configuration by reading the expected environment variable.
    pub fn from_env() -> HttpResult<Self> {
        let base_url = std::env::var(BASE_URL_ENV)
            .ok()
            .filter(|value| !value.trim().is_empty())
            .ok_or(HttpStoreError::MissingEnvVar { var: BASE_URL_ENV })?;
        Ok(Self::new(base_url))
    }
}
