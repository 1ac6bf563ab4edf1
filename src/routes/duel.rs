use axum::{
    Extension, Json, Router,
    extract::{Path, State},
    middleware,
    routing::{get, post},
};
use axum_valid::Valid;
use uuid::Uuid;

use crate::{
    dto::duel::{
        AnswerRequest, AnswerResponse, DuelResponse, FinishRequest, FinishResponse, StartResponse,
    },
    error::{AppError, ErrorBody},
    routes::caller::{CallerId, require_caller},
    services::duel_service,
    state::SharedState,
};

/// Authority endpoints of a duel. Every route requires the `x-user-id` header.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/duels/{id}", get(get_duel))
        .route("/duels/{id}/start", post(start_duel))
        .route("/duels/{id}/answers", post(submit_answer))
        .route("/duels/{id}/finish", post(finish_duel))
        .route("/duels/{id}/forfeit", post(forfeit_duel))
        .route_layer(middleware::from_fn(require_caller))
}

/// Freeze the question order on first call; every later call sees the same list.
#[utoipa::path(
    post,
    path = "/duels/{id}/start",
    tag = "duels",
    params(
        ("id" = Uuid, Path, description = "Duel identifier"),
        ("x-user-id" = Uuid, Header, description = "Authenticated caller"),
    ),
    responses(
        (status = 200, description = "Duel running with its frozen questions", body = StartResponse),
        (status = 403, description = "Caller is not a participant", body = ErrorBody),
        (status = 404, description = "Duel or quiz not found", body = ErrorBody),
        (status = 409, description = "Duel cannot be started from its status", body = ErrorBody),
        (status = 503, description = "Storage unavailable", body = ErrorBody)
    )
)]
pub async fn start_duel(
    State(state): State<SharedState>,
    Extension(CallerId(caller)): Extension<CallerId>,
    Path(id): Path<Uuid>,
) -> Result<Json<StartResponse>, AppError> {
    Ok(Json(duel_service::start(&state, id, caller).await?))
}

/// Record the caller's answer to one frozen question.
#[utoipa::path(
    post,
    path = "/duels/{id}/answers",
    tag = "duels",
    params(
        ("id" = Uuid, Path, description = "Duel identifier"),
        ("x-user-id" = Uuid, Header, description = "Authenticated caller"),
    ),
    request_body = AnswerRequest,
    responses(
        (status = 200, description = "Answer on record", body = AnswerResponse),
        (status = 400, description = "Unknown question index or option", body = ErrorBody),
        (status = 409, description = "Duel not running", body = ErrorBody)
    )
)]
pub async fn submit_answer(
    State(state): State<SharedState>,
    Extension(CallerId(caller)): Extension<CallerId>,
    Path(id): Path<Uuid>,
    Valid(Json(payload)): Valid<Json<AnswerRequest>>,
) -> Result<Json<AnswerResponse>, AppError> {
    Ok(Json(duel_service::answer(&state, id, caller, payload).await?))
}

/// Settle a duel whose questions are exhausted. Repeated calls return the stored result.
#[utoipa::path(
    post,
    path = "/duels/{id}/finish",
    tag = "duels",
    params(
        ("id" = Uuid, Path, description = "Duel identifier"),
        ("x-user-id" = Uuid, Header, description = "Authenticated caller"),
    ),
    request_body = FinishRequest,
    responses(
        (status = 200, description = "Duel finished (possibly by another call)", body = FinishResponse),
        (status = 409, description = "Duel not started yet", body = ErrorBody)
    )
)]
pub async fn finish_duel(
    State(state): State<SharedState>,
    Extension(CallerId(caller)): Extension<CallerId>,
    Path(id): Path<Uuid>,
    Valid(Json(payload)): Valid<Json<FinishRequest>>,
) -> Result<Json<FinishResponse>, AppError> {
    Ok(Json(duel_service::finish(&state, id, caller, payload).await?))
}

/// Concede the duel on behalf of the caller.
#[utoipa::path(
    post,
    path = "/duels/{id}/forfeit",
    tag = "duels",
    params(
        ("id" = Uuid, Path, description = "Duel identifier"),
        ("x-user-id" = Uuid, Header, description = "Authenticated caller"),
    ),
    responses(
        (status = 200, description = "Duel finished (possibly by another call)", body = FinishResponse),
        (status = 409, description = "Duel not started yet", body = ErrorBody)
    )
)]
pub async fn forfeit_duel(
    State(state): State<SharedState>,
    Extension(CallerId(caller)): Extension<CallerId>,
    Path(id): Path<Uuid>,
) -> Result<Json<FinishResponse>, AppError> {
    Ok(Json(duel_service::forfeit(&state, id, caller).await?))
}

/// Current record of a duel, used to render the result after a reconnect.
#[utoipa::path(
    get,
    path = "/duels/{id}",
    tag = "duels",
    params(
        ("id" = Uuid, Path, description = "Duel identifier"),
        ("x-user-id" = Uuid, Header, description = "Authenticated caller"),
    ),
    responses(
        (status = 200, description = "Duel record", body = DuelResponse),
        (status = 404, description = "Duel not found", body = ErrorBody)
    )
)]
pub async fn get_duel(
    State(state): State<SharedState>,
    Extension(CallerId(caller)): Extension<CallerId>,
    Path(id): Path<Uuid>,
) -> Result<Json<DuelResponse>, AppError> {
    Ok(Json(duel_service::get(&state, id, caller).await?))
}
