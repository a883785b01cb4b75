//! Core identifiers shared by the replica set and its collaborators

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Identity of a live connection's socket.
///
/// On unix this is the raw file descriptor, which is what the readiness
/// primitive watches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SocketId(pub i32);

#[cfg(unix)]
impl SocketId {
    /// Socket identity of anything backed by a file descriptor
    pub fn of<T: std::os::unix::io::AsRawFd>(source: &T) -> Self {
        Self(source.as_raw_fd())
    }

    /// The raw file descriptor
    pub fn as_raw_fd(&self) -> std::os::unix::io::RawFd {
        self.0
    }
}

impl fmt::Display for SocketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Unique identifier for a query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QueryId(pub Uuid);

impl QueryId {
    /// Create a new random query ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for QueryId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for QueryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "query-{}", &self.0.to_string()[..8])
    }
}

/// How far a replica should carry the query before sending results back
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QueryStage {
    /// Only read the requested columns
    FetchColumns,
    /// Stop at a state the initiator can merge across replicas
    WithMergeableState,
    /// Run the query to the end
    Complete,
}

impl fmt::Display for QueryStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryStage::FetchColumns => write!(f, "FetchColumns"),
            QueryStage::WithMergeableState => write!(f, "WithMergeableState"),
            QueryStage::Complete => write!(f, "Complete"),
        }
    }
}
