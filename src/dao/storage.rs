use std::error::Error;
use thiserror::Error;

use crate::state::game::GameId;

/// Result alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Error raised by storage backends regardless of the underlying database.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The backend could not be reached or failed.
    #[error("storage unavailable: {message}")]
    Unavailable {
        /// What was being attempted.
        message: String,
        /// Backend error.
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
    /// Optimistic concurrency check failed: someone saved the game first.
    #[error("game {id} was modified concurrently (expected version {expected}, found {actual:?})")]
    Conflict {
        /// Game saved.
        id: GameId,
        /// Version the writer loaded.
        expected: u64,
        /// Version found in storage, `None` when the game is gone.
        actual: Option<u64>,
    },
    /// A unique key (game id or active PIN) is already taken.
    #[error("duplicate {what}")]
    Duplicate {
        /// The conflicting key.
        what: String,
    },
    /// No game with this id.
    #[error("game {id} not found")]
    NotFound {
        /// Game looked up.
        id: GameId,
    },
}

impl StorageError {
    /// Construct an unavailable error from any backend failure.
    pub fn unavailable(message: String, source: impl Error + Send + Sync + 'static) -> Self {
        StorageError::Unavailable {
            message,
            source: Box::new(source),
        }
    }

    /// Whether the failure is an optimistic concurrency conflict.
    pub fn is_conflict(&self) -> bool {
        matches!(self, StorageError::Conflict { .. })
    }
}
