use axum::Router;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::{services::documentation::ApiDoc, state::SharedState};

pub mod caller;
pub mod duel;
pub mod health;
pub mod leaderboard;
pub mod room;
pub mod sse;

/// Compose every route tree and the Swagger UI, then bind the shared state.
pub fn router(state: SharedState) -> Router<()> {
    let swagger: Router<SharedState> = SwaggerUi::new("/docs")
        .url("/api-doc/openapi.json", ApiDoc::openapi())
        .into();

    Router::new()
        .merge(health::router())
        .merge(duel::router())
        .merge(room::router())
        .merge(leaderboard::router())
        .merge(sse::router())
        .merge(swagger)
        .with_state(state)
}
