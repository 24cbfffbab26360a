//! Error types raised by the MongoDB result store.

use mongodb::error::Error as MongoError;
use thiserror::Error;

/// Convenient result alias returning [`MongoDaoError`] failures.
pub type MongoResult<T> = Result<T, MongoDaoError>;

/// Failures that can occur while interacting with MongoDB.
#[derive(Debug, Error)]
pub enum MongoDaoError {
    #[error("missing MongoDB environment variable `{var}`")]
    MissingEnvVar { var: &'static str },
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
    #[error("failed to archive result of session `{session_id}`")]
    SaveResult {
        session_id: String,
        #[source]
        source: MongoError,
    },
    #[error("failed to load result of session `{session_id}`")]
    LoadResult {
        session_id: String,
        #[source]
        source: MongoError,
    },
    #[error("failed to write settlement obligation `{key}`")]
    SaveObligation {
        key: String,
        #[source]
        source: MongoError,
    },
    #[error("failed to delete settlement obligation `{key}`")]
    DeleteObligation {
        key: String,
        #[source]
        source: MongoError,
    },
    #[error("failed to list settlement obligations")]
    ListObligations {
        #[source]
        source: MongoError,
    },
}
