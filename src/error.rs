use axum::{Json, http::StatusCode, response::IntoResponse};
use thiserror::Error;
use uuid::Uuid;
use validator::ValidationErrors;

use crate::{
    dao::{procedure::ProcedureError, storage::StorageError},
    dto::store::ErrorBody,
    identity::IdentityError,
    state::{AbortError, ApplyError, InvalidTransition, PlanError},
};

/// Errors that can occur in service layer operations.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The store could not be reached or refused the write. Retrying is the caller's call.
    #[error("could not save to the game server, please try again")]
    StoreWrite(#[source] StorageError),
    /// An atomic procedure refused to run or failed on the server.
    #[error("{0}")]
    RemoteProcedure(#[source] ProcedureError),
    /// A local precondition failed before the store was contacted.
    #[error("{0}")]
    InvalidTransition(#[source] InvalidTransition),
    /// Requested resource was not found.
    #[error("not found: {0}")]
    NotFound(String),
    /// The mission had been completed already.
    #[error("mission `{0}` is already completed")]
    AlreadyCompleted(Uuid),
    /// Invalid input provided by the user.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// A player action was attempted from the shared display.
    #[error("join the room as a player first")]
    NotJoined,
    /// Another lifecycle action from this device is still in flight.
    #[error("another room action is still in progress")]
    TransitionPending,
    /// The local identity could not be read or written.
    #[error("could not access the saved player identity")]
    Identity(#[from] IdentityError),
}

impl From<StorageError> for ServiceError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Procedure(ProcedureError::NotFound { what, id }) => {
                ServiceError::NotFound(format!("{what} `{id}`"))
            }
            StorageError::Procedure(ProcedureError::AlreadyCompleted { mission_id }) => {
                ServiceError::AlreadyCompleted(mission_id)
            }
            StorageError::Procedure(procedure) => ServiceError::RemoteProcedure(procedure),
            other => ServiceError::StoreWrite(other),
        }
    }
}

impl From<PlanError> for ServiceError {
    fn from(err: PlanError) -> Self {
        match err {
            PlanError::AlreadyPending => ServiceError::TransitionPending,
            PlanError::InvalidTransition(invalid) => ServiceError::InvalidTransition(invalid),
        }
    }
}

impl From<ApplyError> for ServiceError {
    fn from(err: ApplyError) -> Self {
        match err {
            ApplyError::NoPending => ServiceError::TransitionPending,
            ApplyError::IdMismatch { .. } => ServiceError::TransitionPending,
        }
    }
}

impl From<AbortError> for ServiceError {
    fn from(err: AbortError) -> Self {
        match err {
            AbortError::NoPending | AbortError::IdMismatch { .. } => {
                ServiceError::TransitionPending
            }
        }
    }
}

impl From<ValidationErrors> for AppError {
    fn from(err: ValidationErrors) -> Self {
        AppError::BadRequest(format!("validation failed: {}", err))
    }
}

/// Application-level errors that are converted to HTTP responses.
#[derive(Debug, Error)]
pub enum AppError {
    /// Bad request with invalid input.
    #[error("bad request: {0}")]
    BadRequest(String),
    /// Requested resource not found.
    #[error("not found: {0}")]
    NotFound(String),
    /// A procedure refused to run; the refusal travels in the body.
    #[error("{0}")]
    Procedure(ProcedureError),
    /// Service unavailable or degraded.
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),
}

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Rejected { message } => AppError::BadRequest(message),
            StorageError::Procedure(procedure) => AppError::Procedure(procedure),
            unavailable @ StorageError::Unavailable { .. } => {
                AppError::ServiceUnavailable(unavailable.to_string())
            }
        }
    }
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::StoreWrite(storage) => storage.into(),
            ServiceError::RemoteProcedure(procedure) => AppError::Procedure(procedure),
            ServiceError::NotFound(what) => AppError::NotFound(what),
            ServiceError::AlreadyCompleted(mission_id) => {
                AppError::Procedure(ProcedureError::AlreadyCompleted { mission_id })
            }
            other => AppError::BadRequest(other.to_string()),
        }
    }
}

impl AppError {
    fn status(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Procedure(procedure) => match procedure {
                ProcedureError::PermissionDenied { .. } => StatusCode::FORBIDDEN,
                ProcedureError::NotFound { .. } => StatusCode::NOT_FOUND,
                ProcedureError::InvalidTransition { .. }
                | ProcedureError::Precondition { .. }
                | ProcedureError::AlreadyCompleted { .. } => StatusCode::CONFLICT,
                ProcedureError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            },
            AppError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status();
        let procedure_error = match &self {
            AppError::Procedure(procedure) => Some(procedure.clone()),
            _ => None,
        };

        let payload = Json(ErrorBody {
            message: self.to_string(),
            procedure_error,
        });

        (status, payload).into_response()
    }
}
