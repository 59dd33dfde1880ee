use axum::{Json, Router, extract::State, routing::post};
use axum_valid::Valid;

use crate::{
    dao::models::{Draft, Record},
    dto::store::{MAX_SELECT_LIMIT, SelectRequest, UpdateRequest, UpdateResponse},
    error::AppError,
    state::SharedState,
};

/// Record endpoints backing remote [`SessionStore`](crate::dao::session_store::SessionStore) clients.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/store/insert", post(insert))
        .route("/store/select", post(select))
        .route("/store/update", post(update))
}

/// Insert a record; the store assigns its id and timestamp.
#[utoipa::path(
    post,
    path = "/store/insert",
    tag = "store",
    request_body = Draft,
    responses(
        (status = 200, description = "Stored record", body = Record),
        (status = 400, description = "Draft rejected", body = crate::dto::store::ErrorBody),
    )
)]
pub async fn insert(
    State(state): State<SharedState>,
    Json(draft): Json<Draft>,
) -> Result<Json<Record>, AppError> {
    let record = state.store().insert(draft).await?;
    Ok(Json(record))
}

/// Read the records matching a filter.
#[utoipa::path(
    post,
    path = "/store/select",
    tag = "store",
    request_body = SelectRequest,
    responses((status = 200, description = "Matching records", body = [Record]))
)]
pub async fn select(
    State(state): State<SharedState>,
    Valid(Json(request)): Valid<Json<SelectRequest>>,
) -> Result<Json<Vec<Record>>, AppError> {
    let SelectRequest {
        collection,
        filter,
        order_by,
        limit,
    } = request;

    let mut records = state
        .store()
        .select_many(collection, filter, order_by)
        .await?;
    records.truncate(limit.unwrap_or(MAX_SELECT_LIMIT));
    Ok(Json(records))
}

/// Patch the records matching a filter.
#[utoipa::path(
    post,
    path = "/store/update",
    tag = "store",
    request_body = UpdateRequest,
    responses(
        (status = 200, description = "Number of patched records", body = UpdateResponse),
        (status = 400, description = "Patch rejected", body = crate::dto::store::ErrorBody),
    )
)]
pub async fn update(
    State(state): State<SharedState>,
    Valid(Json(request)): Valid<Json<UpdateRequest>>,
) -> Result<Json<UpdateResponse>, AppError> {
    let UpdateRequest {
        collection,
        filter,
        patch,
    } = request;

    let updated = state.store().update(collection, filter, patch).await?;
    Ok(Json(UpdateResponse { updated }))
}
