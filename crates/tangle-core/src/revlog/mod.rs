//! Append-only revision log.
//!
//! Every write to a graph is recorded here as a [`RevisionItem`] before it
//! touches an entity store. The log is the source of truth: entity stores are
//! rebuilt from it by the [`player`](crate::player).
//!
//! Items are grouped per (graph, branch). Within one transaction they are
//! ordered by `seq_no`; across transactions by append position.

pub mod memory;
pub mod operation;
pub mod sqlite;

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;

pub use memory::MemoryRevisionLog;
pub use operation::{
    EdgeModification, FixHangingEdge, GraphOperation, IdentificationMode, NodeModification,
    OperationKind, Strictness,
};
pub use sqlite::SqliteRevisionLog;

// ---------------------------------------------------------------------------
// TxnId
// ---------------------------------------------------------------------------

/// Opaque transaction identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TxnId(String);

static TXN_COUNTER: AtomicU64 = AtomicU64::new(0);

impl TxnId {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Fresh id derived from the graph, branch, wall clock, process id and a
    /// process-wide counter.
    #[must_use]
    pub fn generate(graph: &str, branch: &str) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(graph.as_bytes());
        hasher.update(b"\0");
        hasher.update(branch.as_bytes());
        hasher.update(b"\0");
        let now = Utc::now();
        hasher.update(&now.timestamp().to_le_bytes());
        hasher.update(&now.timestamp_subsec_nanos().to_le_bytes());
        hasher.update(&std::process::id().to_le_bytes());
        hasher.update(&TXN_COUNTER.fetch_add(1, Ordering::Relaxed).to_le_bytes());
        let hex = hasher.finalize().to_hex();
        Self(format!("txn-{}", &hex[..16]))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TxnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// RevisionItem
// ---------------------------------------------------------------------------

/// One immutable log entry.
///
/// # Fields
///
/// * `position`: append position, unique and increasing across the log.
/// * `graph`, `branch`: the checkout this item belongs to.
/// * `txn_id`, `seq_no`: transaction and order within it.
/// * `timestamp`: wall-clock time of the append. Not used during replay.
/// * `operation`: the logged operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RevisionItem {
    pub position: u64,
    pub graph: String,
    pub branch: String,
    pub txn_id: TxnId,
    pub seq_no: u32,
    pub timestamp: DateTime<Utc>,
    pub operation: GraphOperation,
}

// ---------------------------------------------------------------------------
// RevisionLog
// ---------------------------------------------------------------------------

/// Storage contract for the revision log.
///
/// Implementations must assign positions atomically so that concurrent
/// appenders never interleave inside one batch.
pub trait RevisionLog: Send + Sync {
    /// Append one operation.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::Store`](crate::error::GraphError::Store) if the
    /// backing store rejects the write.
    fn append(
        &self,
        graph: &str,
        branch: &str,
        txn_id: &TxnId,
        seq_no: u32,
        operation: GraphOperation,
    ) -> Result<RevisionItem>;

    /// Append `operations` with consecutive sequence numbers starting at
    /// `first_seq`. Returns the appended items in order.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::Store`](crate::error::GraphError::Store) if any
    /// append fails. Items before the failure may already be in the log.
    fn append_batch(
        &self,
        graph: &str,
        branch: &str,
        txn_id: &TxnId,
        first_seq: u32,
        operations: Vec<GraphOperation>,
    ) -> Result<Vec<RevisionItem>> {
        let mut seq = first_seq;
        let mut items = Vec::with_capacity(operations.len());
        for operation in operations {
            items.push(self.append(graph, branch, txn_id, seq, operation)?);
            seq = seq.saturating_add(1);
        }
        Ok(items)
    }

    /// Every item for `(graph, branch)` in append order.
    ///
    /// # Errors
    ///
    /// Returns an error if the log cannot be read or an item cannot be decoded.
    fn iterate_all(&self, graph: &str, branch: &str) -> Result<Vec<RevisionItem>>;

    /// Items of one transaction, ordered by sequence number.
    ///
    /// # Errors
    ///
    /// Returns an error if the log cannot be read or an item cannot be decoded.
    fn iterate_transaction(
        &self,
        graph: &str,
        branch: &str,
        txn_id: &TxnId,
    ) -> Result<Vec<RevisionItem>>;

    /// Distinct `(graph, branch)` pairs that have at least one item.
    ///
    /// # Errors
    ///
    /// Returns an error if the log cannot be read.
    fn checkouts(&self) -> Result<Vec<(String, String)>>;
}
