use thiserror::Error;

use crate::error::{ErrorCode, ServiceError};

/// Failures surfaced by the client side of a duel.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The authority refused the call.
    #[error("authority rejected the call ({}): {message}", code.as_str())]
    Rejected { code: ErrorCode, message: String },
    /// The authority could not be reached.
    #[cfg(feature = "http")]
    #[error("authority unreachable")]
    Transport(#[from] reqwest::Error),
    /// The room WebSocket failed.
    #[error("room socket failed")]
    Socket(#[from] tokio_tungstenite::tungstenite::Error),
    /// The room went away; real-time sync is lost but the duel may still be settled.
    #[error("room channel closed")]
    RoomClosed,
    /// A frame could not be encoded or decoded.
    #[error("malformed frame")]
    Frame(#[from] serde_json::Error),
    /// The driver stopped before the duel reached its result.
    #[error("session stopped before the duel was settled")]
    Aborted,
}

impl SessionError {
    /// Whether retrying the same authority call may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            SessionError::Rejected { code, .. } => {
                matches!(code, ErrorCode::StorageUnavailable | ErrorCode::Internal)
            }
            #[cfg(feature = "http")]
            SessionError::Transport(_) => true,
            _ => false,
        }
    }

    /// Code carried by a rejection.
    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            SessionError::Rejected { code, .. } => Some(*code),
            _ => None,
        }
    }
}

impl From<ServiceError> for SessionError {
    fn from(err: ServiceError) -> Self {
        SessionError::Rejected {
            code: err.code(),
            message: err.to_string(),
        }
    }
}
