use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI specification for the duel backend.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::duel::start_duel,
        crate::routes::duel::submit_answer,
        crate::routes::duel::finish_duel,
        crate::routes::duel::forfeit_duel,
        crate::routes::duel::get_duel,
        crate::routes::room::room_handler,
        crate::routes::leaderboard::weekly_leaderboard,
        crate::routes::sse::duel_stream,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::duel::StartResponse,
            crate::dto::duel::AnswerRequest,
            crate::dto::duel::AnswerResponse,
            crate::dto::duel::FinishRequest,
            crate::dto::duel::FinishResponse,
            crate::dto::duel::DuelResponse,
            crate::dto::leaderboard::LeaderboardResponse,
            crate::dto::room::RoomClientMessage,
            crate::dto::room::RoomServerMessage,
            crate::dto::sse::Handshake,
            crate::dto::sse::DuelFinishedEvent,
            crate::error::ErrorBody,
            crate::error::ErrorCode,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "duels", description = "Authoritative duel lifecycle"),
        (name = "rooms", description = "Real-time duel rooms over WebSocket"),
        (name = "leaderboard", description = "Weekly standings"),
        (name = "sse", description = "Server-sent events streams"),
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_duel_routes() {
        let doc = ApiDoc::openapi();
        for path in [
            "/duels/{id}/start",
            "/duels/{id}/finish",
            "/duels/{id}/forfeit",
            "/duels/{id}/answers",
            "/leaderboard/weekly",
        ] {
            assert!(doc.paths.paths.contains_key(path), "missing {path}");
        }
    }
}
