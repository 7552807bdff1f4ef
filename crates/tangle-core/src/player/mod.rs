//! Log player: rebuilds entity stores by replaying the revision log.
//!
//! Each [`RevisionItem`] is dispatched on its operation to one handler
//! (`node`, `edge`, `entity`), which reads and writes the checkout's stores
//! through a [`ReplayContext`]. Items are applied strictly in log order.
//!
//! # Transactions
//!
//! In the default [`ReplayMode::AsLogged`] transaction markers are counted
//! and otherwise ignored: an operation takes effect when it is played, even
//! if its transaction was later rolled back or never committed.
//! [`ReplayMode::CommittedOnly`] buffers operations per transaction and
//! applies them only when the matching commit marker is reached.
//!
//! # Idempotence
//!
//! Replay is not idempotent over a populated store. Use [`rebuild`] to clear
//! the working copy first.

mod context;
mod edge;
mod entity;
mod node;

use std::collections::BTreeMap;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::connection::GraphConnection;
use crate::error::{GraphError, Result};
use crate::revlog::{GraphOperation, RevisionItem, TxnId};

pub use context::ReplayContext;

// ---------------------------------------------------------------------------
// ReplayMode
// ---------------------------------------------------------------------------

/// How transaction markers gate the operations between them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReplayMode {
    /// Apply every operation as it is read. Operations of a rolled-back or
    /// never-committed transaction still take effect.
    #[default]
    AsLogged,
    /// Apply a transaction's operations only once its commit is read.
    CommittedOnly,
}

// ---------------------------------------------------------------------------
// ReplayStats
// ---------------------------------------------------------------------------

/// Counters collected while replaying.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReplayStats {
    /// Non-marker items applied, including those applied by imports.
    pub played: usize,
    pub created: usize,
    pub merged: usize,
    /// Items that resolved to an entity but changed nothing.
    pub unchanged: usize,
    pub deleted: usize,
    pub repaired: usize,
    /// Repair attempts that left the edge hanging.
    pub still_hanging: usize,
    pub properties_set: usize,
    /// Branch imports completed.
    pub imported: usize,
    /// Begin, commit and rollback markers seen.
    pub markers: usize,
    /// Operations skipped because their transaction never committed.
    pub discarded: usize,
}

impl ReplayStats {
    fn record(&mut self, outcome: Outcome) {
        if !matches!(outcome, Outcome::Marker) {
            self.played += 1;
        }
        match outcome {
            Outcome::Created => self.created += 1,
            Outcome::Merged => self.merged += 1,
            Outcome::Unchanged => self.unchanged += 1,
            Outcome::Deleted => self.deleted += 1,
            Outcome::Repaired => self.repaired += 1,
            Outcome::StillHanging => self.still_hanging += 1,
            Outcome::PropertySet => self.properties_set += 1,
            Outcome::Imported(inner) => {
                self.absorb(&inner);
                self.imported += 1;
            }
            Outcome::Marker => self.markers += 1,
        }
    }

    /// Add the counters of a nested replay.
    pub const fn absorb(&mut self, other: &Self) {
        self.played += other.played;
        self.created += other.created;
        self.merged += other.merged;
        self.unchanged += other.unchanged;
        self.deleted += other.deleted;
        self.repaired += other.repaired;
        self.still_hanging += other.still_hanging;
        self.properties_set += other.properties_set;
        self.imported += other.imported;
        self.markers += other.markers;
        self.discarded += other.discarded;
    }
}

/// What one handler did with one item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Outcome {
    Created,
    Merged,
    Unchanged,
    Deleted,
    Repaired,
    StillHanging,
    PropertySet,
    Imported(ReplayStats),
    Marker,
}

// ---------------------------------------------------------------------------
// LogPlayer
// ---------------------------------------------------------------------------

/// Replays revision items into one checkout's stores.
///
/// Not safe to run concurrently against the same stores; callers hold the
/// writer lock around any replay.
#[derive(Debug)]
pub struct LogPlayer<'c> {
    conn: &'c GraphConnection,
    mode: ReplayMode,
    /// Checkouts whose logs are being replayed, outermost first.
    import_stack: Vec<(String, String)>,
}

impl<'c> LogPlayer<'c> {
    #[must_use]
    pub fn new(conn: &'c GraphConnection) -> Self {
        Self {
            conn,
            mode: ReplayMode::default(),
            import_stack: Vec::new(),
        }
    }

    #[must_use]
    pub const fn with_mode(mut self, mode: ReplayMode) -> Self {
        self.mode = mode;
        self
    }

    #[must_use]
    pub const fn mode(&self) -> ReplayMode {
        self.mode
    }

    /// Replay the whole log of the connection's checkout.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::Replay`] wrapping the first failing item. Items
    /// before it remain applied.
    #[instrument(skip(self), fields(checkout = %self.conn.label(), mode = ?self.mode))]
    pub fn replay_all_revisions(&mut self) -> Result<ReplayStats> {
        let start = Instant::now();
        let stats = self.replay_checkout(self.conn.graph(), self.conn.branch())?;
        info!(
            played = stats.played,
            created = stats.created,
            merged = stats.merged,
            imported = stats.imported,
            discarded = stats.discarded,
            elapsed_ms = start.elapsed().as_millis(),
            "replay complete"
        );
        Ok(stats)
    }

    /// Replay the items of one transaction from the connection's checkout.
    ///
    /// In [`ReplayMode::CommittedOnly`] nothing is applied unless the
    /// transaction's commit marker is already in the log.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::Replay`] wrapping the first failing item.
    #[instrument(skip(self), fields(checkout = %self.conn.label()))]
    pub fn play_transaction(&mut self, txn_id: &TxnId) -> Result<ReplayStats> {
        let items = self
            .conn
            .revlog()
            .iterate_transaction(self.conn.graph(), self.conn.branch(), txn_id)?;
        debug!(txn = %txn_id, items = items.len(), "playing transaction");
        self.play_items(&items)
    }

    fn replay_checkout(&mut self, graph: &str, branch: &str) -> Result<ReplayStats> {
        let checkout = (graph.to_string(), branch.to_string());
        if self.import_stack.contains(&checkout) {
            return Err(GraphError::CyclicImport {
                graph: checkout.0,
                branch: checkout.1,
            });
        }
        let items = self.conn.revlog().iterate_all(graph, branch)?;
        self.import_stack.push(checkout);
        let result = self.play_items(&items);
        self.import_stack.pop();
        result
    }

    /// Apply `items` in order, honouring the replay mode.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::Replay`] wrapping the first failing item.
    pub fn play_items(&mut self, items: &[RevisionItem]) -> Result<ReplayStats> {
        match self.mode {
            ReplayMode::AsLogged => {
                let mut stats = ReplayStats::default();
                for item in items {
                    stats.record(self.play_wrapped(item)?);
                }
                Ok(stats)
            }
            ReplayMode::CommittedOnly => self.play_committed(items),
        }
    }

    fn play_committed(&mut self, items: &[RevisionItem]) -> Result<ReplayStats> {
        let mut stats = ReplayStats::default();
        let mut pending: BTreeMap<&TxnId, Vec<&RevisionItem>> = BTreeMap::new();

        for item in items {
            match &item.operation {
                GraphOperation::TransactionBegin { .. } => {
                    stats.markers += 1;
                    pending.entry(&item.txn_id).or_default();
                }
                GraphOperation::TransactionCommit { .. } => {
                    stats.markers += 1;
                    let mut buffered = pending.remove(&item.txn_id).unwrap_or_default();
                    buffered.sort_by_key(|buffered| (buffered.seq_no, buffered.position));
                    for buffered in buffered {
                        stats.record(self.play_wrapped(buffered)?);
                    }
                }
                GraphOperation::TransactionRollback { .. } => {
                    stats.markers += 1;
                    let dropped = pending.remove(&item.txn_id).map_or(0, |ops| ops.len());
                    debug!(txn = %item.txn_id, dropped, "discarding rolled back transaction");
                    stats.discarded += dropped;
                }
                _ => pending.entry(&item.txn_id).or_default().push(item),
            }
        }

        for (txn_id, ops) in pending {
            if !ops.is_empty() {
                warn!(txn = %txn_id, dropped = ops.len(), "transaction never committed, discarding");
            }
            stats.discarded += ops.len();
        }
        Ok(stats)
    }

    fn play_wrapped(&mut self, item: &RevisionItem) -> Result<Outcome> {
        self.apply(item).map_err(|source| GraphError::Replay {
            graph: item.graph.clone(),
            branch: item.branch.clone(),
            item: Box::new(item.clone()),
            source: Box::new(source),
        })
    }

    fn apply(&mut self, item: &RevisionItem) -> Result<Outcome> {
        let ctx = ReplayContext::new(self.conn);
        match &item.operation {
            GraphOperation::NodeModification(op) => node::play_node_modification(ctx, item, op),
            GraphOperation::EdgeModification(op) => edge::play_edge_modification(ctx, item, op),
            GraphOperation::DeleteByUid { kind, uid } => entity::play_delete(ctx, *kind, uid),
            GraphOperation::FixHangingEdge(op) => edge::play_fix_hanging_edge(ctx, op),
            GraphOperation::SetNamedProperty {
                entity_type,
                name,
                property,
                value,
            } => entity::play_set_named_property(ctx, entity_type, name, property, value),
            GraphOperation::BranchImport { graph, branch } => {
                debug!(from = %format!("{graph}/{branch}"), into = %self.conn.label(), "importing branch");
                self.replay_checkout(graph, branch).map(Outcome::Imported)
            }
            GraphOperation::TransactionBegin { .. }
            | GraphOperation::TransactionCommit { .. }
            | GraphOperation::TransactionRollback { .. } => Ok(Outcome::Marker),
        }
    }
}

// ---------------------------------------------------------------------------
// Entry points
// ---------------------------------------------------------------------------

/// Replay the connection's whole log in [`ReplayMode::AsLogged`].
///
/// # Errors
///
/// See [`LogPlayer::replay_all_revisions`].
pub fn replay_all_revisions(conn: &GraphConnection) -> Result<ReplayStats> {
    LogPlayer::new(conn).replay_all_revisions()
}

/// Replay a single submitted transaction.
///
/// # Errors
///
/// See [`LogPlayer::play_transaction`].
pub fn play_revisions_for_transaction(conn: &GraphConnection, txn_id: &TxnId) -> Result<ReplayStats> {
    LogPlayer::new(conn).play_transaction(txn_id)
}

/// Remove every node and edge from the connection's stores. The log is
/// untouched.
///
/// # Errors
///
/// Returns an error if either store cannot be cleared.
pub fn delete_working_copy(conn: &GraphConnection) -> Result<()> {
    conn.edges().clear()?;
    conn.nodes().clear()?;
    info!(checkout = %conn.label(), "working copy deleted");
    Ok(())
}

/// Clear the working copy and replay the log from the start.
///
/// # Errors
///
/// Returns an error if clearing fails or replay aborts.
pub fn rebuild(conn: &GraphConnection, mode: ReplayMode) -> Result<ReplayStats> {
    delete_working_copy(conn)?;
    LogPlayer::new(conn).with_mode(mode).replay_all_revisions()
}
