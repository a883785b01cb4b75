//! Error types for replica fan-out

use crate::types::SocketId;
use thiserror::Error;

/// Errors that can occur while driving a replica set
#[derive(Error, Debug)]
pub enum ReplicaError {
    /// The readiness poll produced no replica that is both ready and valid
    #[error("No available replica")]
    NoAvailableReplica,

    /// The readiness primitive reported a socket that belongs to no replica
    #[error("Unexpected replica: socket {0} is not part of this replica set")]
    UnexpectedReplica(SocketId),

    /// External table payloads do not line up with the replicas
    #[error(
        "Mismatch between replicas and data sources: {replicas} replicas, {data_sources} data sources"
    )]
    MismatchReplicasDataSources { replicas: usize, data_sources: usize },

    /// Every replica has finished or failed, no packet can be produced anymore
    #[error("All replicas are exhausted")]
    ReplicasExhausted,

    /// Two connections share the same socket identity
    #[error("Duplicate replica for socket {0}")]
    DuplicateReplica(SocketId),

    /// Error reported by a connection
    #[error("Connection error: {0}")]
    Connection(String),

    /// Error reported by a connection pool
    #[error("Connection pool error: {0}")]
    Pool(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),
}

impl ReplicaError {
    /// Whether the caller may retry the operation that produced this error.
    ///
    /// Only an empty readiness poll is transient; everything else either
    /// signals a broken invariant or a finished query.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ReplicaError::NoAvailableReplica)
    }
}

impl From<serde_json::Error> for ReplicaError {
    fn from(err: serde_json::Error) -> Self {
        ReplicaError::Config(err.to_string())
    }
}

/// Result type for replica operations
pub type Result<T> = std::result::Result<T, ReplicaError>;
