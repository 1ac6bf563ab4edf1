use thiserror::Error;

use crate::{
    dao::models::DuelStatus,
    error::{ErrorCode, ServiceError},
};

/// Events that move a persisted duel through its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DuelEvent {
    /// First participant opened the duel; questions get frozen.
    Start,
    /// All questions exhausted on a client.
    Finish,
    /// A participant conceded.
    Forfeit,
}

/// Error returned when an event cannot be applied to the current status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid transition: {event:?} cannot be applied while {from:?}")]
pub struct InvalidTransition {
    /// The status the duel was in when the event was received.
    pub from: DuelStatus,
    /// The event that cannot be applied from this status.
    pub event: DuelEvent,
}

impl InvalidTransition {
    /// Client-facing code distinguishing "already over" from "not started yet".
    pub fn code(&self) -> ErrorCode {
        match (self.from, self.event) {
            (DuelStatus::Finished, _) => ErrorCode::DuelFinished,
            (
                DuelStatus::PendingAccept | DuelStatus::Accepted,
                DuelEvent::Finish | DuelEvent::Forfeit,
            ) => ErrorCode::DuelNotStarted,
            _ => ErrorCode::WrongState,
        }
    }
}

impl From<InvalidTransition> for ServiceError {
    fn from(err: InvalidTransition) -> Self {
        ServiceError::WrongState {
            code: err.code(),
            message: err.to_string(),
        }
    }
}

/// Compute the status reached by applying `event` to a duel currently in `from`.
///
/// The persisted write must still be guarded on `from`; this only decides
/// whether attempting the write makes sense at all.
pub fn compute_transition(
    from: DuelStatus,
    event: DuelEvent,
) -> Result<DuelStatus, InvalidTransition> {
    let next = match (from, event) {
        (DuelStatus::Accepted, DuelEvent::Start) => DuelStatus::InProgress,
        (DuelStatus::InProgress, DuelEvent::Finish | DuelEvent::Forfeit) => DuelStatus::Finished,
        (from, event) => return Err(InvalidTransition { from, event }),
    };

    Ok(next)
}
