use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI specification for the Mission Complete store server.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::store::insert,
        crate::routes::store::select,
        crate::routes::store::update,
        crate::routes::rpc::call,
        crate::routes::sse::changes,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::sse::Handshake,
            crate::dto::store::SelectRequest,
            crate::dto::store::UpdateRequest,
            crate::dto::store::UpdateResponse,
            crate::dto::store::ErrorBody,
            crate::dto::results::PlayerResult,
            crate::dao::models::Draft,
            crate::dao::models::Record,
            crate::dao::query::ChangeEvent,
            crate::dao::procedure::Procedure,
            crate::dao::procedure::ProcedureOutput,
            crate::dao::procedure::ProcedureError,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "store", description = "Record reads and writes"),
        (name = "rpc", description = "Atomic room and mission procedures"),
        (name = "sse", description = "Server-sent change feeds"),
    )
)]
pub struct ApiDoc;
