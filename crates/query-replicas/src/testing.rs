//! Scripted in-memory replicas for tests
//!
//! Every mock connection reads from a queue on a shared wire. A socket is
//! readable exactly when its queue is non-empty, which is what `MockPoller`
//! reports.

use crate::config::Settings;
use crate::connection::{Connection, ConnectionPool};
use crate::error::{ReplicaError, Result};
use crate::packet::{ExternalTablesData, Packet};
use crate::readiness::ReadinessPoller;
use crate::types::{QueryId, QueryStage, SocketId};
use arrow::array::Int64Array;
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

#[derive(Default)]
pub(crate) struct MockWire {
    queues: HashMap<SocketId, VecDeque<Packet>>,
    cancels: HashMap<SocketId, usize>,
    disconnects: HashMap<SocketId, usize>,
    queries: HashMap<SocketId, Vec<String>>,
    external_tables: HashMap<SocketId, Vec<String>>,
    /// Forced poll results, consumed before falling back to queue state
    injected: VecDeque<Vec<SocketId>>,
    pub(crate) polls: usize,
}

pub(crate) type SharedWire = Rc<RefCell<MockWire>>;

impl MockWire {
    pub(crate) fn shared() -> SharedWire {
        Rc::new(RefCell::new(MockWire::default()))
    }

    pub(crate) fn push(&mut self, socket: SocketId, packet: Packet) {
        self.queues.entry(socket).or_default().push_back(packet);
    }

    pub(crate) fn pending(&self, socket: SocketId) -> usize {
        self.queues.get(&socket).map_or(0, |q| q.len())
    }

    pub(crate) fn cancels(&self, socket: SocketId) -> usize {
        self.cancels.get(&socket).copied().unwrap_or(0)
    }

    pub(crate) fn disconnects(&self, socket: SocketId) -> usize {
        self.disconnects.get(&socket).copied().unwrap_or(0)
    }

    pub(crate) fn queries(&self, socket: SocketId) -> Vec<String> {
        self.queries.get(&socket).cloned().unwrap_or_default()
    }

    pub(crate) fn external_tables(&self, socket: SocketId) -> Vec<String> {
        self.external_tables.get(&socket).cloned().unwrap_or_default()
    }

    pub(crate) fn inject_ready(&mut self, sockets: Vec<SocketId>) {
        self.injected.push_back(sockets);
    }
}

pub(crate) struct MockConnection {
    socket: SocketId,
    address: String,
    wire: SharedWire,
    pub(crate) fail_send_query: bool,
    pub(crate) fail_send_cancel: bool,
}

impl MockConnection {
    pub(crate) fn new(wire: &SharedWire, fd: i32, packets: Vec<Packet>) -> Self {
        let socket = SocketId(fd);
        for packet in packets {
            wire.borrow_mut().push(socket, packet);
        }
        Self {
            socket,
            address: format!("replica{}:9000", fd),
            wire: Rc::clone(wire),
            fail_send_query: false,
            fail_send_cancel: false,
        }
    }
}

impl Connection for MockConnection {
    fn socket_id(&self) -> SocketId {
        self.socket
    }

    fn server_address(&self) -> String {
        self.address.clone()
    }

    fn send_query(
        &mut self,
        query: &str,
        _query_id: &QueryId,
        _stage: QueryStage,
        _settings: Option<&Settings>,
        _with_pending_data: bool,
    ) -> Result<()> {
        if self.fail_send_query {
            return Err(ReplicaError::Connection(format!(
                "{}: connection reset",
                self.address
            )));
        }
        self.wire
            .borrow_mut()
            .queries
            .entry(self.socket)
            .or_default()
            .push(query.to_string());
        Ok(())
    }

    fn send_cancel(&mut self) -> Result<()> {
        if self.fail_send_cancel {
            return Err(ReplicaError::Connection(format!(
                "{}: cancel failed",
                self.address
            )));
        }
        *self.wire.borrow_mut().cancels.entry(self.socket).or_default() += 1;
        Ok(())
    }

    fn disconnect(&mut self) {
        *self
            .wire
            .borrow_mut()
            .disconnects
            .entry(self.socket)
            .or_default() += 1;
    }

    fn receive_packet(&mut self) -> Result<Packet> {
        self.wire
            .borrow_mut()
            .queues
            .get_mut(&self.socket)
            .and_then(|q| q.pop_front())
            .ok_or_else(|| {
                ReplicaError::Connection(format!("{}: nothing to read", self.address))
            })
    }

    fn send_external_tables_data(&mut self, data: &ExternalTablesData) -> Result<()> {
        let names = data.iter().map(|t| t.name.clone());
        self.wire
            .borrow_mut()
            .external_tables
            .entry(self.socket)
            .or_default()
            .extend(names);
        Ok(())
    }
}

pub(crate) struct MockPoller {
    wire: SharedWire,
}

impl MockPoller {
    pub(crate) fn new(wire: &SharedWire) -> Self {
        Self {
            wire: Rc::clone(wire),
        }
    }
}

impl ReadinessPoller for MockPoller {
    fn wait_readable(&mut self, sockets: &[SocketId], _timeout: Duration) -> Result<Vec<SocketId>> {
        let mut wire = self.wire.borrow_mut();
        wire.polls += 1;
        if let Some(forced) = wire.injected.pop_front() {
            return Ok(forced);
        }
        Ok(sockets
            .iter()
            .copied()
            .filter(|s| wire.pending(*s) > 0)
            .collect())
    }
}

/// Pool handing out one scripted replica per stream, up to `max_parallel_replicas`
pub(crate) struct MockPool {
    wire: SharedWire,
    streams: RefCell<Vec<Vec<Packet>>>,
}

impl MockPool {
    pub(crate) fn new(wire: &SharedWire, streams: Vec<Vec<Packet>>) -> Self {
        Self {
            wire: Rc::clone(wire),
            streams: RefCell::new(streams),
        }
    }
}

impl ConnectionPool for MockPool {
    type Connection = MockConnection;

    fn get_many(&self, settings: &Settings) -> Result<Vec<MockConnection>> {
        let mut streams = self.streams.borrow_mut();
        let wanted = settings.max_parallel_replicas;
        if streams.len() < wanted && !settings.skip_unavailable_replicas {
            return Err(ReplicaError::Pool(format!(
                "requested {} replicas, {} available",
                wanted,
                streams.len()
            )));
        }
        let take = wanted.min(streams.len());
        Ok(streams
            .drain(..take)
            .enumerate()
            .map(|(i, packets)| MockConnection::new(&self.wire, 100 + i as i32, packets))
            .collect())
    }
}

/// Single-column batch with `rows` rows, so tests can tell packets apart
pub(crate) fn data(rows: i64) -> Packet {
    let schema = Arc::new(Schema::new(vec![Field::new("n", DataType::Int64, false)]));
    let batch = RecordBatch::try_new(
        schema,
        vec![Arc::new(Int64Array::from((0..rows).collect::<Vec<_>>()))],
    )
    .unwrap();
    Packet::Data(batch)
}

/// Row count of a data packet, panics on anything else
pub(crate) fn rows(packet: &Packet) -> usize {
    match packet {
        Packet::Data(batch) => batch.num_rows(),
        other => panic!("expected Data, got {}", other.name()),
    }
}
