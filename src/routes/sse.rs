use std::convert::Infallible;

use axum::{
    Extension, Router,
    extract::{Path, State},
    middleware,
    response::sse::{Event, Sse},
    routing::get,
};
use futures::Stream;
use tracing::info;
use uuid::Uuid;

use crate::{
    error::{AppError, ErrorBody},
    routes::caller::{CallerId, require_caller},
    services::sse_service,
    state::SharedState,
};

#[utoipa::path(
    get,
    path = "/sse/duels/{id}",
    tag = "sse",
    params(
        ("id" = Uuid, Path, description = "Duel identifier"),
        ("x-user-id" = Uuid, Header, description = "Authenticated caller"),
    ),
    responses(
        (status = 200, description = "Outcome stream of the duel", content_type = "text/event-stream", body = String),
        (status = 403, description = "Caller is not a participant", body = ErrorBody)
    )
)]
/// Stream the outcome of a duel, for clients that lost their room.
pub async fn duel_stream(
    State(state): State<SharedState>,
    Extension(CallerId(caller)): Extension<CallerId>,
    Path(id): Path<Uuid>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    let feed = sse_service::follow_duel(&state, id, caller).await?;
    info!(duel_id = %id, user_id = %caller, "new duel SSE connection");
    Ok(sse_service::to_sse_stream(feed, state.is_degraded()))
}

/// Configure the SSE endpoints.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new()
        .route("/sse/duels/{id}", get(duel_stream))
        .route_layer(middleware::from_fn(require_caller))
}
