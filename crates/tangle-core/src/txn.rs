//! Transaction helper: brackets submitted operations with begin and
//! commit/rollback markers in the revision log.
//!
//! Markers are bookkeeping only. The log does not enforce atomicity, and the
//! default replay mode applies operations whether or not their transaction
//! committed (see [`ReplayMode`](crate::player::ReplayMode)).

use tracing::{debug, warn};

use crate::connection::GraphConnection;
use crate::error::Result;
use crate::revlog::{GraphOperation, RevisionLog, TxnId};

/// Sequence number of the begin marker.
pub const BEGIN_SEQ: u32 = 0;

/// Sequence number of the first operation of a single-part transaction.
pub const FIRST_OP_SEQ: u32 = 1;

/// Sequence number of commit and rollback markers, so they sort last.
pub const END_SEQ: u32 = u32::MAX;

/// Open a transaction by appending its begin marker.
///
/// # Errors
///
/// Returns an error if the marker cannot be appended.
pub fn begin(log: &dyn RevisionLog, graph: &str, branch: &str) -> Result<TxnId> {
    let txn_id = TxnId::generate(graph, branch);
    log.append(
        graph,
        branch,
        &txn_id,
        BEGIN_SEQ,
        GraphOperation::TransactionBegin {
            txn_id: txn_id.clone(),
        },
    )?;
    debug!(graph, branch, txn = %txn_id, "transaction begun");
    Ok(txn_id)
}

/// Append the commit marker for `txn_id`.
///
/// # Errors
///
/// Returns an error if the marker cannot be appended.
pub fn commit(log: &dyn RevisionLog, graph: &str, branch: &str, txn_id: &TxnId) -> Result<()> {
    log.append(
        graph,
        branch,
        txn_id,
        END_SEQ,
        GraphOperation::TransactionCommit {
            txn_id: txn_id.clone(),
        },
    )?;
    debug!(graph, branch, txn = %txn_id, "transaction committed");
    Ok(())
}

/// Append the rollback marker for `txn_id`.
///
/// Never fails: an error appending the marker is logged and dropped, since
/// the operations it would have cancelled were never committed.
pub fn rollback(log: &dyn RevisionLog, graph: &str, branch: &str, txn_id: &TxnId) {
    let marker = GraphOperation::TransactionRollback {
        txn_id: txn_id.clone(),
    };
    match log.append(graph, branch, txn_id, END_SEQ, marker) {
        Ok(_) => debug!(graph, branch, txn = %txn_id, "transaction rolled back"),
        Err(err) => warn!(graph, branch, txn = %txn_id, error = %err, "rollback marker not written"),
    }
}

/// Append part of a multi-part transaction.
///
/// Operations get consecutive sequence numbers starting at `first_seq`; the
/// next free sequence number is returned so the caller can append the next
/// part. Operations are validated before anything is appended.
///
/// # Errors
///
/// Returns the first validation error, or an append error. The caller owns
/// the transaction and decides whether to roll it back.
pub fn submit_txn_part(
    log: &dyn RevisionLog,
    graph: &str,
    branch: &str,
    txn_id: &TxnId,
    first_seq: u32,
    operations: Vec<GraphOperation>,
) -> Result<u32> {
    for operation in &operations {
        operation.validate()?;
    }
    let count = u32::try_from(operations.len()).unwrap_or(u32::MAX);
    log.append_batch(graph, branch, txn_id, first_seq, operations)?;
    Ok(first_seq.saturating_add(count))
}

/// Begin, append every operation as one batch, commit.
///
/// If validation or the append fails the transaction is rolled back and the
/// original error is returned. An empty batch still writes a begin and a
/// commit marker.
///
/// # Errors
///
/// Returns the validation or append error that aborted the transaction, or
/// an error writing the begin or commit marker.
pub fn submit_as_transaction(
    log: &dyn RevisionLog,
    graph: &str,
    branch: &str,
    operations: Vec<GraphOperation>,
) -> Result<TxnId> {
    let txn_id = begin(log, graph, branch)?;
    if let Err(err) = submit_txn_part(log, graph, branch, &txn_id, FIRST_OP_SEQ, operations) {
        rollback(log, graph, branch, &txn_id);
        return Err(err);
    }
    commit(log, graph, branch, &txn_id)?;
    Ok(txn_id)
}

/// Submit `operations` to the checkout's revision log as one transaction.
///
/// Nothing is applied to the entity stores; play the returned transaction
/// (or replay the whole log) to do that.
///
/// # Errors
///
/// See [`submit_as_transaction`].
pub fn submit_operations(conn: &GraphConnection, operations: Vec<GraphOperation>) -> Result<TxnId> {
    submit_as_transaction(conn.revlog(), conn.graph(), conn.branch(), operations)
}
