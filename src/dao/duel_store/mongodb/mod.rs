mod connection;
mod error;
mod models;
pub mod store;

pub use connection::MongoConfig;
pub use error::MongoDaoError;
pub use store::MongoDuelStore;

use crate::dao::storage::StorageError;

impl From<MongoDaoError> for StorageError {
    fn from(err: MongoDaoError) -> Self {
        if matches!(err, MongoDaoError::Corrupt { .. }) {
            return StorageError::Corrupt(err.to_string());
        }
        StorageError::unavailable(err.to_string(), err)
    }
}
