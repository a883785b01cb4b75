//! Replica set: one query fanned out to several replicas, merged into one packet stream
//!
//! The set borrows a batch of live connections for the duration of a query.
//! Each call to [`ReplicaSet::receive_packet`] polls the live replicas, picks
//! one readable replica and reads from it until it produces the packet whose
//! sequence number matches the set's global cursor. Packets a replica produces
//! ahead of its turn are discarded, so the caller sees a single ordered stream
//! even when the source switches between replicas.
//!
//! All mutating operations take `&mut self`: the set assumes exclusive access
//! to its replicas and is never shared between threads.

use crate::config::Settings;
use crate::connection::{Connection, ConnectionPool};
use crate::error::{ReplicaError, Result};
use crate::packet::{ExternalTablesData, Packet, PacketCategory};
use crate::readiness::ReadinessPoller;
use crate::replica::{Replica, ReplicaStatus};
use crate::types::{QueryId, QueryStage, SocketId};
use std::collections::HashMap;
use std::time::Duration;

/// A replica that failed while being cancelled or drained after a terminal packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrainFailure {
    pub socket: SocketId,
    pub address: String,
    pub reason: String,
}

/// Where the receive loop stands
#[derive(Debug, Clone, Copy)]
enum ReceiveState {
    /// Poll and select a replica
    Pick,
    /// Read the next packet from the replica at this index
    Read(usize),
}

/// Coordinator for the replicas taking part in one distributed query
pub struct ReplicaSet<'a, C: Connection, P: ReadinessPoller> {
    /// Replicas in construction order
    replicas: Vec<Replica<'a, C>>,
    /// Socket identity to position in `replicas`
    index: HashMap<SocketId, usize>,
    valid_replicas_count: usize,
    /// Packets returned to the caller so far
    next_packet_number: u64,
    poll_timeout: Duration,
    poller: P,
    drain_failures: Vec<DrainFailure>,
}

impl<'a, C: Connection, P: ReadinessPoller> ReplicaSet<'a, C, P> {
    /// Build a replica set over connections owned by the caller.
    ///
    /// The set never closes these connections on drop; only an explicit
    /// [`disconnect`](Self::disconnect) does.
    pub fn new(connections: &'a mut [C], settings: &Settings, poller: P) -> Result<Self> {
        let mut replicas = Vec::with_capacity(connections.len());
        let mut index = HashMap::with_capacity(connections.len());

        for connection in connections.iter_mut() {
            let socket = connection.socket_id();
            if index.insert(socket, replicas.len()).is_some() {
                return Err(ReplicaError::DuplicateReplica(socket));
            }
            replicas.push(Replica::new(connection));
        }

        tracing::debug!("Created replica set with {} replicas", replicas.len());

        Ok(Self {
            valid_replicas_count: replicas.len(),
            replicas,
            index,
            next_packet_number: 0,
            poll_timeout: settings.poll_interval(),
            poller,
            drain_failures: Vec::new(),
        })
    }

    /// Request connections from `pool` and build a set over them.
    ///
    /// The connections are stored in `slot`, replacing its previous contents,
    /// so they stay owned by the caller. Pool errors propagate unchanged.
    pub fn from_pool<Pool>(
        pool: &Pool,
        settings: &Settings,
        poller: P,
        slot: &'a mut Vec<C>,
    ) -> Result<Self>
    where
        Pool: ConnectionPool<Connection = C>,
    {
        *slot = pool.get_many(settings)?;
        Self::new(slot.as_mut_slice(), settings, poller)
    }

    /// Number of replicas, valid or not
    pub fn len(&self) -> usize {
        self.replicas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.replicas.is_empty()
    }

    pub fn valid_replicas_count(&self) -> usize {
        self.valid_replicas_count
    }

    /// Number of packets returned to the caller so far
    pub fn next_packet_number(&self) -> u64 {
        self.next_packet_number
    }

    /// True once no replica can produce another packet
    pub fn is_exhausted(&self) -> bool {
        self.valid_replicas_count == 0
    }

    /// Snapshot of every replica in construction order
    pub fn replica_status(&self) -> Vec<ReplicaStatus> {
        self.replicas.iter().map(|r| r.status()).collect()
    }

    /// Errors seen while cancelling and draining replicas after a terminal packet
    pub fn drain_failures(&self) -> &[DrainFailure] {
        &self.drain_failures
    }

    pub fn take_drain_failures(&mut self) -> Vec<DrainFailure> {
        std::mem::take(&mut self.drain_failures)
    }

    /// Wait until some valid replica is readable or the poll interval elapses.
    ///
    /// Returns how many replicas were reported readable. Returns 0 right
    /// away, without polling, when no replica is valid.
    pub fn wait_for_read_event(&mut self) -> Result<usize> {
        if self.valid_replicas_count == 0 {
            return Ok(0);
        }

        let mut watched = Vec::with_capacity(self.valid_replicas_count);
        for replica in self.replicas.iter_mut() {
            replica.can_read = false;
            if replica.is_valid {
                watched.push(replica.socket_id());
            }
        }

        let ready = self.poller.wait_readable(&watched, self.poll_timeout)?;

        for socket in &ready {
            let idx = *self
                .index
                .get(socket)
                .ok_or(ReplicaError::UnexpectedReplica(*socket))?;
            self.replicas[idx].can_read = true;
        }

        Ok(ready.len())
    }

    /// Poll once and select the readable replica furthest ahead in its stream
    pub fn pick_connection(&mut self) -> Result<SocketId> {
        let idx = self.pick_replica()?;
        Ok(self.replicas[idx].socket_id())
    }

    fn pick_replica(&mut self) -> Result<usize> {
        if self.wait_for_read_event()? == 0 {
            return Err(ReplicaError::NoAvailableReplica);
        }

        // Ties go to the first replica in construction order.
        let mut picked: Option<usize> = None;
        for (idx, replica) in self.replicas.iter().enumerate() {
            if !(replica.is_valid && replica.can_read) {
                continue;
            }
            let ahead = picked.map_or(true, |p| {
                replica.next_packet_number > self.replicas[p].next_packet_number
            });
            if ahead {
                picked = Some(idx);
            }
        }

        let idx = picked.ok_or(ReplicaError::NoAvailableReplica)?;
        tracing::debug!(
            "Picked replica {} at packet {}",
            self.replicas[idx].socket_id(),
            self.replicas[idx].next_packet_number
        );
        Ok(idx)
    }

    /// Receive the next packet of the merged stream.
    ///
    /// Terminal packets (end of stream, exception) are still returned when
    /// they are in turn; the caller inspects the packet to detect a failed
    /// replica. Fails with [`ReplicaError::NoAvailableReplica`] when a poll
    /// finds nothing to read and with [`ReplicaError::ReplicasExhausted`]
    /// once every replica is invalid.
    pub fn receive_packet(&mut self) -> Result<Packet> {
        let mut state = ReceiveState::Pick;
        loop {
            state = match state {
                ReceiveState::Pick => {
                    if self.valid_replicas_count == 0 {
                        return Err(ReplicaError::ReplicasExhausted);
                    }
                    ReceiveState::Read(self.pick_replica()?)
                }
                ReceiveState::Read(idx) if !self.replicas[idx].is_valid => ReceiveState::Pick,
                ReceiveState::Read(idx) => {
                    let packet = self.replicas[idx].connection.receive_packet()?;
                    let retry = self.classify(idx, &packet);

                    let replica = &mut self.replicas[idx];
                    let in_turn = replica.next_packet_number == self.next_packet_number;
                    replica.next_packet_number += 1;

                    if in_turn && !retry {
                        self.next_packet_number += 1;
                        return Ok(packet);
                    }

                    tracing::trace!(
                        "Discarded {} packet {} from replica {}",
                        packet.name(),
                        replica.next_packet_number - 1,
                        replica.socket_id()
                    );
                    ReceiveState::Read(idx)
                }
            };
        }
    }

    /// Apply the validity transition a packet implies.
    ///
    /// Returns true when the packet must not be returned and another replica
    /// should be tried instead.
    fn classify(&mut self, idx: usize, packet: &Packet) -> bool {
        match packet.category() {
            PacketCategory::Streamable => false,
            PacketCategory::Terminal => {
                self.invalidate(idx);
                tracing::info!(
                    "Replica {} finished with {}, cancelling {} remaining",
                    self.replicas[idx].connection.server_address(),
                    packet.name(),
                    self.valid_replicas_count
                );
                // Stop the others and consume what they already sent, so
                // their connections are left at a packet boundary.
                self.cancel_remaining();
                self.drain_residual_packets();
                false
            }
            PacketCategory::Unrecognized => {
                self.invalidate(idx);
                tracing::warn!(
                    "Replica {} sent an unrecognized packet: {:?}",
                    self.replicas[idx].connection.server_address(),
                    packet
                );
                self.valid_replicas_count > 0
            }
        }
    }

    /// Cancel every valid replica. A failed cancel is recorded and the
    /// remaining replicas are still cancelled.
    fn cancel_remaining(&mut self) {
        let failures = &mut self.drain_failures;

        for replica in self.replicas.iter_mut().filter(|r| r.is_valid) {
            if let Err(e) = replica.connection.send_cancel() {
                let address = replica.connection.server_address();
                tracing::warn!("Failed to cancel query on replica {}: {}", address, e);
                failures.push(DrainFailure {
                    socket: replica.socket_id(),
                    address,
                    reason: format!("cancel failed: {}", e),
                });
            }
        }
    }

    fn invalidate(&mut self, idx: usize) {
        let replica = &mut self.replicas[idx];
        if replica.is_valid {
            replica.is_valid = false;
            self.valid_replicas_count -= 1;
        }
    }

    /// Read and discard packets from every valid replica until each reaches
    /// the end of its stream. Errors are recorded, not raised.
    fn drain_residual_packets(&mut self) {
        let failures = &mut self.drain_failures;

        for replica in self.replicas.iter_mut().filter(|r| r.is_valid) {
            let reason = loop {
                match replica.connection.receive_packet() {
                    Ok(Packet::EndOfStream) => break None,
                    Ok(Packet::Exception(e)) => break Some(e.to_string()),
                    Ok(packet) if packet.category() == PacketCategory::Streamable => {}
                    Ok(packet) => break Some(format!("unexpected packet {:?}", packet)),
                    Err(e) => break Some(e.to_string()),
                }
            };

            if let Some(reason) = reason {
                let address = replica.connection.server_address();
                tracing::warn!("Replica {} failed while draining: {}", address, reason);
                failures.push(DrainFailure {
                    socket: replica.socket_id(),
                    address,
                    reason,
                });
            }
        }
    }

    /// Send the query to every replica.
    ///
    /// The first failing send aborts the broadcast.
    pub fn send_query(
        &mut self,
        query: &str,
        query_id: &QueryId,
        stage: QueryStage,
        settings: Option<&Settings>,
        with_pending_data: bool,
    ) -> Result<()> {
        tracing::debug!(
            "Sending {} to {} replicas (stage {})",
            query_id,
            self.replicas.len(),
            stage
        );
        for replica in self.replicas.iter_mut() {
            replica
                .connection
                .send_query(query, query_id, stage, settings, with_pending_data)?;
        }
        Ok(())
    }

    /// Ask every valid replica to stop executing the query
    pub fn send_cancel(&mut self) -> Result<()> {
        for replica in self.replicas.iter_mut().filter(|r| r.is_valid) {
            tracing::debug!("Cancelling query on replica {}", replica.socket_id());
            replica.connection.send_cancel()?;
        }
        Ok(())
    }

    /// Close every valid replica's connection.
    ///
    /// Closed replicas become invalid, so calling this again touches nothing.
    pub fn disconnect(&mut self) {
        for idx in 0..self.replicas.len() {
            if self.replicas[idx].is_valid {
                self.replicas[idx].connection.disconnect();
                self.invalidate(idx);
            }
        }
    }

    /// Send one external tables payload to each replica, paired in
    /// construction order.
    ///
    /// Requires exactly one payload per replica, valid or not; nothing is
    /// sent otherwise.
    pub fn send_external_tables_data(&mut self, data: &[ExternalTablesData]) -> Result<()> {
        if data.len() != self.replicas.len() {
            return Err(ReplicaError::MismatchReplicasDataSources {
                replicas: self.replicas.len(),
                data_sources: data.len(),
            });
        }

        for (replica, tables) in self.replicas.iter_mut().zip(data) {
            replica.connection.send_external_tables_data(tables)?;
        }
        Ok(())
    }

    /// Addresses of the valid replicas, separated by `"; "`
    pub fn dump_addresses(&self) -> String {
        self.replicas
            .iter()
            .filter(|r| r.is_valid)
            .map(|r| r.connection.server_address())
            .collect::<Vec<_>>()
            .join("; ")
    }
}
