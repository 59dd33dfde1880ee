use axum::{Json, Router, extract::State, routing::post};
use tracing::debug;

use crate::{
    dao::procedure::{Procedure, ProcedureOutput},
    error::AppError,
    state::SharedState,
};

/// Remote procedure endpoint.
pub fn router() -> Router<SharedState> {
    Router::new().route("/rpc", post(call))
}

/// Run one atomic procedure. Refusals come back with a `procedure_error` body.
#[utoipa::path(
    post,
    path = "/rpc",
    tag = "rpc",
    request_body = Procedure,
    responses(
        (status = 200, description = "Procedure output", body = ProcedureOutput),
        (status = 403, description = "Caller lacks the required role", body = crate::dto::store::ErrorBody),
        (status = 404, description = "Unknown room, player or mission", body = crate::dto::store::ErrorBody),
        (status = 409, description = "Room status or mission state forbids the call", body = crate::dto::store::ErrorBody),
    )
)]
pub async fn call(
    State(state): State<SharedState>,
    Json(procedure): Json<Procedure>,
) -> Result<Json<ProcedureOutput>, AppError> {
    debug!(procedure = procedure.name(), caller = %procedure.caller(), "rpc call");
    let output = state.store().call(procedure).await?;
    Ok(Json(output))
}
