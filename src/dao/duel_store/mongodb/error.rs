use mongodb::error::{Error as MongoError, TRANSIENT_TRANSACTION_ERROR};
use thiserror::Error;
use uuid::Uuid;

pub type MongoResult<T> = std::result::Result<T, MongoDaoError>;

#[derive(Debug, Error)]
pub enum MongoDaoError {
    #[error("failed to parse MongoDB connection URI `{uri}`")]
    InvalidUri {
        uri: String,
        #[source]
        source: MongoError,
    },
    #[error("failed to build MongoDB client from options")]
    ClientConstruction {
        #[source]
        source: MongoError,
    },
    #[error("MongoDB ping failed during initial connection after {attempts} attempt(s)")]
    InitialPing {
        attempts: u32,
        #[source]
        source: MongoError,
    },
    #[error("MongoDB ping health check failed")]
    HealthPing {
        #[source]
        source: MongoError,
    },
    #[error("failed to ensure index `{index}` on collection `{collection}`")]
    EnsureIndex {
        collection: &'static str,
        index: &'static str,
        #[source]
        source: MongoError,
    },
    #[error("failed to save duel `{id}`")]
    SaveDuel {
        id: Uuid,
        #[source]
        source: MongoError,
    },
    #[error("failed to load duel `{id}`")]
    LoadDuel {
        id: Uuid,
        #[source]
        source: MongoError,
    },
    #[error("failed to start duel `{id}`")]
    BeginDuel {
        id: Uuid,
        #[source]
        source: MongoError,
    },
    #[error("failed to finalize duel `{id}`")]
    FinalizeDuel {
        id: Uuid,
        #[source]
        source: MongoError,
    },
    #[error("failed to record answer for duel `{id}`")]
    RecordAnswer {
        id: Uuid,
        #[source]
        source: MongoError,
    },
    #[error("failed to load answers for duel `{id}`")]
    LoadAnswers {
        id: Uuid,
        #[source]
        source: MongoError,
    },
    #[error("failed to save user `{id}`")]
    SaveUser {
        id: Uuid,
        #[source]
        source: MongoError,
    },
    #[error("failed to load users")]
    LoadUsers {
        #[source]
        source: MongoError,
    },
    #[error("failed to load weekly scores for `{week}`")]
    LoadWeekly {
        week: String,
        #[source]
        source: MongoError,
    },
    #[error("failed to load activity for user `{id}`")]
    LoadActivity {
        id: Uuid,
        #[source]
        source: MongoError,
    },
    #[error("failed to save quiz `{id}`")]
    SaveQuiz {
        id: Uuid,
        #[source]
        source: MongoError,
    },
    #[error("failed to load quiz `{id}`")]
    LoadQuiz {
        id: Uuid,
        #[source]
        source: MongoError,
    },
    #[error("corrupt `{collection}` document: {reason}")]
    Corrupt {
        collection: &'static str,
        reason: String,
    },
}

impl MongoDaoError {
    /// Whether a transactional write failed on a conflict and can be retried from scratch.
    pub fn is_transient_transaction(&self) -> bool {
        match self {
            Self::FinalizeDuel { source, .. } | Self::RecordAnswer { source, .. } => {
                source.contains_label(TRANSIENT_TRANSACTION_ERROR)
            }
            _ => false,
        }
    }
}
