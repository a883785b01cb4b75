//! Replica fan-out for Query Engine
//!
//! This crate sends one query to several replicas holding the same shard and
//! merges what they send back into a single ordered packet stream, tolerating
//! replicas that fail, disconnect or send garbage mid-query.
//!
//! # Architecture
//!
//! - **ReplicaSet**: borrows the connections of one query, polls them for
//!   readiness, picks a replica per step and keeps the merged stream in order
//! - **ReadinessPoller**: the blocking wait on socket readiness (`MioPoller`
//!   on unix)
//! - **Connection / ConnectionPool**: the wire protocol and replica discovery,
//!   implemented outside this crate
//!
//! When a replica ends its stream or fails, the set cancels the query on the
//! remaining replicas and drains what they already sent, so their connections
//! are left at a packet boundary.
//!
//! # Example
//!
//! ```ignore
//! use query_replicas::{
//!     MioPoller, Packet, QueryId, QueryStage, ReplicaError, ReplicaSet, Settings,
//! };
//!
//! let settings = Settings::default();
//! let mut connections = Vec::new();
//! let mut replicas =
//!     ReplicaSet::from_pool(&pool, &settings, MioPoller::new()?, &mut connections)?;
//!
//! replicas.send_query("SELECT * FROM hits", &QueryId::new(), QueryStage::Complete, Some(&settings), false)?;
//!
//! loop {
//!     match replicas.receive_packet()? {
//!         Packet::Data(batch) => println!("{} rows", batch.num_rows()),
//!         Packet::EndOfStream => break,
//!         Packet::Exception(e) => return Err(ReplicaError::Connection(e.to_string())),
//!         _ => {}
//!     }
//! }
//! replicas.disconnect();
//! ```
//!
//! # Modules
//!
//! - [`replica_set`]: Receive loop, residual drain and broadcasts
//! - [`readiness`]: Socket readiness polling
//! - [`connection`]: Connection and pool contracts
//! - [`packet`]: Packet types and their classification
//! - [`config`]: Settings
//! - [`types`]: Identifiers

pub mod config;
pub mod connection;
pub mod error;
pub mod packet;
pub mod readiness;
pub mod replica;
pub mod replica_set;
pub mod types;

#[cfg(test)]
mod testing;

// Re-exports
pub use config::Settings;
pub use connection::{Connection, ConnectionPool};
pub use error::{ReplicaError, Result};
pub use packet::{
    ExternalTable, ExternalTablesData, Packet, PacketCategory, ProfileInfo, Progress,
    RemoteException,
};
#[cfg(unix)]
pub use readiness::MioPoller;
pub use readiness::ReadinessPoller;
pub use replica::ReplicaStatus;
pub use replica_set::{DrainFailure, ReplicaSet};
pub use types::{QueryId, QueryStage, SocketId};
