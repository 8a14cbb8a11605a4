use mongodb::error::{Error as MongoError, ErrorKind, WriteFailure};
use thiserror::Error;
use uuid::Uuid;

/// Result alias for MongoDB data access.
pub type MongoResult<T> = std::result::Result<T, MongoDaoError>;

const DUPLICATE_KEY_CODE: i32 = 11000;

/// Failures of the MongoDB backend.
#[derive(Debug, Error)]
pub enum MongoDaoError {
    /// The connection URI could not be parsed.
    #[error("failed to parse MongoDB connection URI `{uri}`")]
    InvalidUri {
        /// URI as configured.
        uri: String,
        /// Driver error.
        #[source]
        source: MongoError,
    },
    /// A required environment variable is not set.
    #[error("missing environment variable `{var}`")]
    MissingEnvVar {
        /// Variable name.
        var: &'static str,
    },
    /// The driver rejected the client options.
    #[error("failed to build MongoDB client from options")]
    ClientConstruction {
        /// Driver error.
        #[source]
        source: MongoError,
    },
    /// The server never answered the startup ping.
    #[error("MongoDB ping failed during initial connection after {attempts} attempt(s)")]
    InitialPing {
        /// Pings attempted before giving up.
        attempts: u32,
        /// Driver error.
        #[source]
        source: MongoError,
    },
    /// The health check ping failed.
    #[error("MongoDB ping health check failed")]
    HealthPing {
        /// Driver error.
        #[source]
        source: MongoError,
    },
    /// An index could not be created.
    #[error("failed to ensure index `{index}` on collection `{collection}`")]
    EnsureIndex {
        /// Collection the index belongs to.
        collection: &'static str,
        /// Index name.
        index: &'static str,
        /// Driver error.
        #[source]
        source: MongoError,
    },
    /// Inserting a new game failed.
    #[error("failed to insert game `{id}`")]
    InsertGame {
        /// Game id.
        id: Uuid,
        /// Driver error.
        #[source]
        source: MongoError,
    },
    /// Saving a game failed.
    #[error("failed to save game `{id}`")]
    SaveGame {
        /// Game id.
        id: Uuid,
        /// Driver error.
        #[source]
        source: MongoError,
    },
    /// Loading a game failed.
    #[error("failed to load game `{id}`")]
    LoadGame {
        /// Game id.
        id: Uuid,
        /// Driver error.
        #[source]
        source: MongoError,
    },
    /// A stored game could not be decoded.
    #[error("stored game document `{id}` is malformed: {reason}")]
    MalformedGame {
        /// Document id.
        id: String,
        /// What failed to decode.
        reason: String,
    },
    /// The pin lookup failed.
    #[error("failed to look up game by pin")]
    FindByPin {
        /// Driver error.
        #[source]
        source: MongoError,
    },
    /// The stale game query failed.
    #[error("failed to query stale games")]
    FindStale {
        /// Driver error.
        #[source]
        source: MongoError,
    },
    /// The bulk status update failed.
    #[error("failed to update game statuses")]
    UpdateStatuses {
        /// Driver error.
        #[source]
        source: MongoError,
    },
    /// A submission ledger operation failed.
    #[error("failed to access submission ledger `{ledger}`")]
    Ledger {
        /// Ledger document id.
        ledger: String,
        /// Driver error.
        #[source]
        source: MongoError,
    },
    /// An answer could not be serialized.
    #[error("failed to encode answer")]
    EncodeAnswer {
        /// Serializer error.
        #[source]
        source: serde_json::Error,
    },
    /// A stored answer could not be deserialized.
    #[error("failed to decode stored answer in ledger `{ledger}`")]
    DecodeAnswer {
        /// Ledger document id.
        ledger: String,
        /// Serializer error.
        #[source]
        source: serde_json::Error,
    },
    /// A lock operation failed.
    #[error("failed to access lock `{key}`")]
    Lock {
        /// Lock key.
        key: String,
        /// Driver error.
        #[source]
        source: MongoError,
    },
}

/// Whether `err` is a unique index violation.
pub fn is_duplicate_key(err: &MongoError) -> bool {
    match err.kind.as_ref() {
        ErrorKind::Write(WriteFailure::WriteError(write_error)) => {
            write_error.code == DUPLICATE_KEY_CODE
        }
        ErrorKind::Command(command_error) => command_error.code == DUPLICATE_KEY_CODE,
        _ => false,
    }
}
