//! Backend-neutral storage failures.

use std::error::Error as StdError;

use thiserror::Error;

pub type StorageResult<T> = Result<T, StorageError>;

type Source = Box<dyn StdError + Send + Sync>;

/// Failure reported by a duel store, whatever database sits behind it.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The backend could not be reached or refused the operation.
    #[error("storage unavailable: {message}")]
    Unavailable {
        message: String,
        #[source]
        source: Source,
    },
    /// A persisted record no longer maps onto the domain model.
    #[error("corrupt record: {0}")]
    Corrupt(String),
}

impl StorageError {
    pub fn unavailable(
        message: impl Into<String>,
        source: impl StdError + Send + Sync + 'static,
    ) -> Self {
        StorageError::Unavailable {
            message: message.into(),
            source: Box::new(source),
        }
    }

    /// Whether the same call may succeed once the backend recovers.
    pub fn is_transient(&self) -> bool {
        matches!(self, StorageError::Unavailable { .. })
    }
}
