//! Error types shared by the HTTP store client.

use reqwest::StatusCode;
use thiserror::Error;

use crate::dao::storage::StorageError;

/// Convenient result alias returning [`HttpStoreError`] failures.
pub type HttpResult<T> = Result<T, HttpStoreError>;

/// Failures that can occur while talking to the session server.
#[derive(Debug, Error)]
pub enum HttpStoreError {
    /// Required environment variable is missing.
    #[error("missing session server environment variable `{var}`")]
    MissingEnvVar { var: &'static str },
    /// Building the HTTP client failed (invalid TLS setup, etc).
    #[error("failed to build session server client")]
    ClientBuilder {
        #[source]
        source: reqwest::Error,
    },
    /// A request could not be sent.
    #[error("failed to send request to `{path}`")]
    RequestSend {
        path: String,
        #[source]
        source: reqwest::Error,
    },
    /// The server answered with an unexpected status code.
    #[error("unexpected response status {status} for `{path}`: {message}")]
    RequestStatus {
        path: String,
        status: StatusCode,
        message: String,
    },
    /// Response payload could not be parsed into JSON.
    #[error("failed to decode response for `{path}`")]
    DecodeResponse {
        path: String,
        #[source]
        source: reqwest::Error,
    },
    /// Subscription parameters could not be encoded.
    #[error("failed to encode subscription for `{path}`")]
    EncodeQuery {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

impl From<HttpStoreError> for StorageError {
    fn from(err: HttpStoreError) -> Self {
        match err {
            HttpStoreError::RequestStatus {
                status, message, ..
            } if status.is_client_error() => StorageError::rejected(message),
            other => StorageError::unavailable(other.to_string(), other),
        }
    }
}
