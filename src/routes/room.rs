use axum::{
    Router,
    extract::{Path, State, WebSocketUpgrade},
    response::IntoResponse,
    routing::get,
};
use uuid::Uuid;

use crate::{services::room_service, state::SharedState};

#[utoipa::path(
    get,
    path = "/duels/{id}/room",
    tag = "rooms",
    params(("id" = Uuid, Path, description = "Duel identifier")),
    responses((status = 101, description = "Switching protocols to the room WebSocket"))
)]
/// Upgrade into the real-time room of a duel. The first frame must be a `join`.
pub async fn room_handler(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| room_service::handle_socket(state, id, socket))
}

/// Configure the room WebSocket endpoint.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new().route("/duels/{id}/room", get(room_handler))
}
