use std::convert::Infallible;

use axum::{
    Router,
    extract::{Query, State},
    response::sse::{Event, Sse},
    routing::get,
};
use futures::Stream;

use crate::{
    dto::store::ChangeFeedQuery,
    error::AppError,
    services::sse_service,
    state::SharedState,
};

#[utoipa::path(
    get,
    path = "/sse/changes",
    tag = "sse",
    params(ChangeFeedQuery),
    responses(
        (status = 200, description = "Change events matching the query", content_type = "text/event-stream", body = String),
        (status = 400, description = "Malformed filter", body = crate::dto::store::ErrorBody),
    )
)]
/// Stream insert or update events of one collection, filtered by field equality.
pub async fn changes(
    State(state): State<SharedState>,
    Query(query): Query<ChangeFeedQuery>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    let subscription = query
        .into_subscription()
        .map_err(|err| AppError::BadRequest(format!("invalid filter: {err}")))?;

    let handshake = sse_service::handshake(&state, &subscription);
    let changes = sse_service::subscribe_changes(&state, subscription).await?;
    Ok(sse_service::to_sse_stream(changes, handshake))
}

/// Configure the SSE endpoints.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new().route("/sse/changes", get(changes))
}
