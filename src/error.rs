use axum::{Json, http::StatusCode, response::IntoResponse};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;
use validator::ValidationErrors;

use crate::dao::storage::StorageError;

/// Stable machine-readable error codes returned to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    DuelNotFound,
    NotParticipant,
    /// Operation attempted outside its valid status.
    WrongState,
    /// The duel already has its terminal result.
    DuelFinished,
    /// The duel has not been started yet.
    DuelNotStarted,
    InvalidInput,
    Unauthenticated,
    StorageUnavailable,
    Internal,
}

impl ErrorCode {
    /// Wire representation, identical to the serde form.
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::DuelNotFound => "DUEL_NOT_FOUND",
            ErrorCode::NotParticipant => "NOT_PARTICIPANT",
            ErrorCode::WrongState => "WRONG_STATE",
            ErrorCode::DuelFinished => "DUEL_FINISHED",
            ErrorCode::DuelNotStarted => "DUEL_NOT_STARTED",
            ErrorCode::InvalidInput => "INVALID_INPUT",
            ErrorCode::Unauthenticated => "UNAUTHENTICATED",
            ErrorCode::StorageUnavailable => "STORAGE_UNAVAILABLE",
            ErrorCode::Internal => "INTERNAL",
        }
    }
}

/// Errors that can occur in service layer operations.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Requested duel (or its quiz) does not exist.
    #[error("not found: {0}")]
    NotFound(String),
    /// Caller is not one of the two participants.
    #[error("caller is not a participant of this duel")]
    NotParticipant,
    /// Operation cannot be performed in the current duel status.
    #[error("{message}")]
    WrongState { code: ErrorCode, message: String },
    /// Invalid input provided by the client.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// A storage operation failed; persisted state is unchanged.
    #[error("storage failure")]
    Storage(#[source] StorageError),
    /// Application is running in degraded mode without storage.
    #[error("storage unavailable (degraded mode)")]
    Degraded,
}

impl ServiceError {
    /// Code surfaced to clients for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            ServiceError::NotFound(_) => ErrorCode::DuelNotFound,
            ServiceError::NotParticipant => ErrorCode::NotParticipant,
            ServiceError::WrongState { code, .. } => *code,
            ServiceError::InvalidInput(_) => ErrorCode::InvalidInput,
            ServiceError::Storage(_) => ErrorCode::Internal,
            ServiceError::Degraded => ErrorCode::StorageUnavailable,
        }
    }
}

impl From<StorageError> for ServiceError {
    fn from(err: StorageError) -> Self {
        ServiceError::Storage(err)
    }
}

impl From<ValidationErrors> for AppError {
    fn from(err: ValidationErrors) -> Self {
        AppError::BadRequest(format!("validation failed: {}", err))
    }
}

/// Application-level errors that are converted to HTTP responses.
#[derive(Debug, Error)]
pub enum AppError {
    /// Bad request with invalid input.
    #[error("bad request: {0}")]
    BadRequest(String),
    /// Caller identity missing or malformed.
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    /// Caller is known but not allowed to act on the resource.
    #[error("forbidden: {0}")]
    Forbidden(String),
    /// Requested resource not found.
    #[error("not found: {0}")]
    NotFound(String),
    /// Conflict with the current duel status.
    #[error("conflict: {message}")]
    Conflict { code: ErrorCode, message: String },
    /// Service unavailable or degraded.
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),
    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::NotFound(message) => AppError::NotFound(message),
            ServiceError::NotParticipant => {
                AppError::Forbidden("caller is not a participant of this duel".into())
            }
            ServiceError::WrongState { code, message } => AppError::Conflict { code, message },
            ServiceError::InvalidInput(message) => AppError::BadRequest(message),
            ServiceError::Storage(source) => AppError::Internal(source.to_string()),
            ServiceError::Degraded => AppError::ServiceUnavailable("degraded mode".into()),
        }
    }
}

impl AppError {
    fn status_and_code(&self) -> (StatusCode, ErrorCode) {
        match self {
            AppError::BadRequest(_) => (StatusCode::BAD_REQUEST, ErrorCode::InvalidInput),
            AppError::Unauthorized(_) => (StatusCode::UNAUTHORIZED, ErrorCode::Unauthenticated),
            AppError::Forbidden(_) => (StatusCode::FORBIDDEN, ErrorCode::NotParticipant),
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, ErrorCode::DuelNotFound),
            AppError::Conflict { code, .. } => (StatusCode::CONFLICT, *code),
            AppError::ServiceUnavailable(_) => (
                StatusCode::SERVICE_UNAVAILABLE,
                ErrorCode::StorageUnavailable,
            ),
            AppError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, ErrorCode::Internal),
        }
    }
}

/// Error payload shared by every failing endpoint.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorBody {
    /// Always `false`.
    pub ok: bool,
    pub code: ErrorCode,
    pub message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let (status, code) = self.status_and_code();

        let payload = Json(ErrorBody {
            ok: false,
            code,
            message: self.to_string(),
        });

        (status, payload).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrong_state_keeps_specific_code() {
        let err = ServiceError::WrongState {
            code: ErrorCode::DuelFinished,
            message: "duel already finished".into(),
        };
        assert_eq!(err.code(), ErrorCode::DuelFinished);

        let app: AppError = err.into();
        let (status, code) = app.status_and_code();
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(code, ErrorCode::DuelFinished);
    }

    #[test]
    fn taxonomy_maps_to_http_statuses() {
        let cases = [
            (ServiceError::NotFound("duel".into()), StatusCode::NOT_FOUND),
            (ServiceError::NotParticipant, StatusCode::FORBIDDEN),
            (ServiceError::InvalidInput("index".into()), StatusCode::BAD_REQUEST),
            (ServiceError::Degraded, StatusCode::SERVICE_UNAVAILABLE),
            (
                ServiceError::Storage(StorageError::Corrupt("duels".into())),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (err, expected) in cases {
            let code = err.code();
            let app: AppError = err.into();
            let (status, app_code) = app.status_and_code();
            assert_eq!(status, expected);
            assert_eq!(app_code, code);
        }
    }

    #[test]
    fn codes_serialize_in_screaming_snake_case() {
        for code in [ErrorCode::DuelNotStarted, ErrorCode::StorageUnavailable] {
            assert_eq!(
                serde_json::to_string(&code).unwrap(),
                format!("\"{}\"", code.as_str())
            );
        }
    }
}
