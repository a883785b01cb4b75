//! Per-replica bookkeeping

use crate::connection::Connection;
use crate::types::SocketId;

/// State the replica set keeps for one borrowed connection
pub(crate) struct Replica<'a, C> {
    pub(crate) connection: &'a mut C,
    /// Once false, stays false
    pub(crate) is_valid: bool,
    /// Readable as of the most recent poll; meaningless when invalid
    pub(crate) can_read: bool,
    /// Packets consumed from this replica's stream so far
    pub(crate) next_packet_number: u64,
}

impl<'a, C: Connection> Replica<'a, C> {
    pub(crate) fn new(connection: &'a mut C) -> Self {
        Self {
            connection,
            is_valid: true,
            can_read: false,
            next_packet_number: 0,
        }
    }

    pub(crate) fn socket_id(&self) -> SocketId {
        self.connection.socket_id()
    }

    pub(crate) fn status(&self) -> ReplicaStatus {
        ReplicaStatus {
            socket: self.socket_id(),
            address: self.connection.server_address(),
            is_valid: self.is_valid,
            can_read: self.can_read,
            next_packet_number: self.next_packet_number,
        }
    }
}

/// Snapshot of one replica, for diagnostics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplicaStatus {
    pub socket: SocketId,
    pub address: String,
    pub is_valid: bool,
    pub can_read: bool,
    pub next_packet_number: u64,
}
