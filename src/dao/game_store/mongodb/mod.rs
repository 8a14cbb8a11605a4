//! MongoDB backend: game store, submission ledgers and job locks.

mod config;
mod connection;
mod error;
mod lock;
mod models;
mod store;
mod submissions;

pub use config::MongoConfig;
pub use error::MongoDaoError;
pub use lock::MongoLock;
pub use store::MongoGameStore;
pub use submissions::MongoSubmissionTracker;

use crate::dao::storage::StorageError;

impl From<MongoDaoError> for StorageError {
    fn from(err: MongoDaoError) -> Self {
        StorageError::unavailable(err.to_string(), err)
    }
}
