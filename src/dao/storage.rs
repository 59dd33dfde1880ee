use std::error::Error;
use thiserror::Error;

use crate::dao::procedure::ProcedureError;

/// Result alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Error raised by storage backends regardless of the underlying transport.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Backend could not be reached or failed mid-operation.
    #[error("storage unavailable: {message}")]
    Unavailable {
        message: String,
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
    /// Backend refused the write (validation, immutable field, unknown reference).
    #[error("write rejected: {message}")]
    Rejected { message: String },
    /// A remote procedure refused to run or failed on the server.
    #[error(transparent)]
    Procedure(#[from] ProcedureError),
}

impl StorageError {
    /// Construct an unavailable error from any backend failure.
    pub fn unavailable(message: String, source: impl Error + Send + Sync + 'static) -> Self {
        StorageError::Unavailable {
            message,
            source: Box::new(source),
        }
    }

    /// Construct a rejected-write error.
    pub fn rejected(message: impl Into<String>) -> Self {
        StorageError::Rejected {
            message: message.into(),
        }
    }
}
