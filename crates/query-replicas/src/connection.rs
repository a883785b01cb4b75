//! Collaborators of the replica set: connections and the pool that hands them out
//!
//! The wire protocol and the replica discovery both live outside this crate.
//! These traits are the contracts the replica set relies on.

use crate::config::Settings;
use crate::error::Result;
use crate::packet::{ExternalTablesData, Packet};
use crate::types::{QueryId, QueryStage, SocketId};

/// An established connection to one replica
pub trait Connection {
    /// Identity of the underlying socket, unique among live connections
    fn socket_id(&self) -> SocketId;

    /// `host:port` of the server this connection talks to
    fn server_address(&self) -> String;

    /// Send a query for execution
    fn send_query(
        &mut self,
        query: &str,
        query_id: &QueryId,
        stage: QueryStage,
        settings: Option<&Settings>,
        with_pending_data: bool,
    ) -> Result<()>;

    /// Ask the server to stop executing the current query
    fn send_cancel(&mut self) -> Result<()>;

    /// Close the connection
    fn disconnect(&mut self);

    /// Read the next packet. May block until one arrives.
    fn receive_packet(&mut self) -> Result<Packet>;

    /// Send temporary tables referenced by the query
    fn send_external_tables_data(&mut self, data: &ExternalTablesData) -> Result<()>;
}

/// Source of replica connections
pub trait ConnectionPool {
    type Connection: Connection;

    /// Hand out a batch of connected replicas for one query.
    ///
    /// The caller owns the returned connections. Fails if the pool cannot
    /// provide enough replicas for `settings`.
    fn get_many(&self, settings: &Settings) -> Result<Vec<Self::Connection>>;
}
