use axum::{
    Json, Router,
    extract::{Query, State},
    routing::get,
};
use axum_valid::Valid;

use crate::{
    dto::leaderboard::{LeaderboardQuery, LeaderboardResponse},
    error::AppError,
    services::duel_service,
    state::SharedState,
};

/// Public leaderboard reads.
pub fn router() -> Router<SharedState> {
    Router::new().route("/leaderboard/weekly", get(weekly_leaderboard))
}

#[utoipa::path(
    get,
    path = "/leaderboard/weekly",
    tag = "leaderboard",
    params(LeaderboardQuery),
    responses((status = 200, description = "Weekly standings", body = LeaderboardResponse))
)]
/// Standings of one ISO week, best score first.
pub async fn weekly_leaderboard(
    State(state): State<SharedState>,
    Valid(Query(query)): Valid<Query<LeaderboardQuery>>,
) -> Result<Json<LeaderboardResponse>, AppError> {
    Ok(Json(duel_service::weekly_leaderboard(&state, query).await?))
}
