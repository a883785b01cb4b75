//! Packets received from replicas
//!
//! Only the category of a packet matters to the replica set; payloads are
//! carried through untouched to the caller.

use arrow::record_batch::RecordBatch;
use std::fmt;

/// One message read from a replica connection
#[derive(Debug, Clone)]
pub enum Packet {
    /// A block of result rows
    Data(RecordBatch),
    /// Execution progress
    Progress(Progress),
    /// Profiling counters for the finished stream
    ProfileInfo(ProfileInfo),
    /// Totals block (WITH TOTALS)
    Totals(RecordBatch),
    /// Minimums and maximums block
    Extremes(RecordBatch),
    /// The replica has sent everything
    EndOfStream,
    /// The replica failed while executing the query
    Exception(RemoteException),
    /// Any packet code the protocol does not define
    Unknown(u64),
}

/// How the replica set treats a packet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketCategory {
    /// Part of the result stream; the replica stays live
    Streamable,
    /// Ends the replica's contribution to the query
    Terminal,
    /// Malformed; the replica cannot be trusted anymore
    Unrecognized,
}

impl Packet {
    pub fn category(&self) -> PacketCategory {
        match self {
            Packet::Data(_)
            | Packet::Progress(_)
            | Packet::ProfileInfo(_)
            | Packet::Totals(_)
            | Packet::Extremes(_) => PacketCategory::Streamable,
            Packet::EndOfStream | Packet::Exception(_) => PacketCategory::Terminal,
            Packet::Unknown(_) => PacketCategory::Unrecognized,
        }
    }

    /// Short name used in logs
    pub fn name(&self) -> &'static str {
        match self {
            Packet::Data(_) => "Data",
            Packet::Progress(_) => "Progress",
            Packet::ProfileInfo(_) => "ProfileInfo",
            Packet::Totals(_) => "Totals",
            Packet::Extremes(_) => "Extremes",
            Packet::EndOfStream => "EndOfStream",
            Packet::Exception(_) => "Exception",
            Packet::Unknown(_) => "Unknown",
        }
    }

    pub fn is_end_of_stream(&self) -> bool {
        matches!(self, Packet::EndOfStream)
    }

    /// The remote exception, if this packet carries one
    pub fn exception(&self) -> Option<&RemoteException> {
        match self {
            Packet::Exception(e) => Some(e),
            _ => None,
        }
    }
}

/// Progress counters reported while a query runs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Progress {
    /// Rows read so far
    pub rows: u64,
    /// Bytes read so far
    pub bytes: u64,
    /// Estimated total rows to read, 0 if unknown
    pub total_rows: u64,
}

impl Progress {
    pub fn new(rows: u64, bytes: u64, total_rows: u64) -> Self {
        Self {
            rows,
            bytes,
            total_rows,
        }
    }

    /// Add another progress report to this one
    pub fn increment(&mut self, other: &Progress) {
        self.rows += other.rows;
        self.bytes += other.bytes;
        self.total_rows += other.total_rows;
    }
}

/// Profiling information sent once a replica has finished reading
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProfileInfo {
    pub rows: u64,
    pub blocks: u64,
    pub bytes: u64,
    pub applied_limit: bool,
    pub rows_before_limit: u64,
}

/// An exception raised on a replica and shipped back over the wire
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteException {
    /// Server-side error code
    pub code: i32,
    /// Exception class name
    pub name: String,
    /// Human-readable message
    pub message: String,
}

impl RemoteException {
    pub fn new(code: i32, name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code,
            name: name.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for RemoteException {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Code: {}, {}: {}", self.code, self.name, self.message)
    }
}

impl std::error::Error for RemoteException {}

/// A temporary table shipped alongside a query
#[derive(Debug, Clone)]
pub struct ExternalTable {
    /// Table name as referenced by the query
    pub name: String,
    /// Table contents
    pub batches: Vec<RecordBatch>,
}

impl ExternalTable {
    pub fn new(name: impl Into<String>, batches: Vec<RecordBatch>) -> Self {
        Self {
            name: name.into(),
            batches,
        }
    }

    /// Total number of rows over all batches
    pub fn num_rows(&self) -> usize {
        self.batches.iter().map(|b| b.num_rows()).sum()
    }
}

/// Every external table destined for one replica
pub type ExternalTablesData = Vec<ExternalTable>;
