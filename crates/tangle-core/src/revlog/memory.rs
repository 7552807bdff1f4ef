use std::collections::BTreeSet;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::Utc;

use super::{GraphOperation, RevisionItem, RevisionLog, TxnId};
use crate::error::Result;

/// In-process revision log.
///
/// Holds every item of every checkout in one vector guarded by a mutex, so a
/// batch append is atomic with respect to other appenders.
#[derive(Debug, Default)]
pub struct MemoryRevisionLog {
    items: Mutex<Vec<RevisionItem>>,
}

impl MemoryRevisionLog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of items across all checkouts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<RevisionItem>> {
        self.items.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn push(
        items: &mut Vec<RevisionItem>,
        graph: &str,
        branch: &str,
        txn_id: &TxnId,
        seq_no: u32,
        operation: GraphOperation,
    ) -> RevisionItem {
        let item = RevisionItem {
            position: items.len() as u64 + 1,
            graph: graph.to_string(),
            branch: branch.to_string(),
            txn_id: txn_id.clone(),
            seq_no,
            timestamp: Utc::now(),
            operation,
        };
        items.push(item.clone());
        item
    }
}

impl RevisionLog for MemoryRevisionLog {
    fn append(
        &self,
        graph: &str,
        branch: &str,
        txn_id: &TxnId,
        seq_no: u32,
        operation: GraphOperation,
    ) -> Result<RevisionItem> {
        let mut items = self.lock();
        Ok(Self::push(&mut items, graph, branch, txn_id, seq_no, operation))
    }

    fn append_batch(
        &self,
        graph: &str,
        branch: &str,
        txn_id: &TxnId,
        first_seq: u32,
        operations: Vec<GraphOperation>,
    ) -> Result<Vec<RevisionItem>> {
        let mut items = self.lock();
        let mut seq = first_seq;
        let mut appended = Vec::with_capacity(operations.len());
        for operation in operations {
            appended.push(Self::push(&mut items, graph, branch, txn_id, seq, operation));
            seq = seq.saturating_add(1);
        }
        Ok(appended)
    }

    fn iterate_all(&self, graph: &str, branch: &str) -> Result<Vec<RevisionItem>> {
        Ok(self
            .lock()
            .iter()
            .filter(|item| item.graph == graph && item.branch == branch)
            .cloned()
            .collect())
    }

    fn iterate_transaction(
        &self,
        graph: &str,
        branch: &str,
        txn_id: &TxnId,
    ) -> Result<Vec<RevisionItem>> {
        let mut items: Vec<RevisionItem> = self
            .lock()
            .iter()
            .filter(|item| item.graph == graph && item.branch == branch && &item.txn_id == txn_id)
            .cloned()
            .collect();
        items.sort_by_key(|item| (item.seq_no, item.position));
        Ok(items)
    }

    fn checkouts(&self) -> Result<Vec<(String, String)>> {
        let set: BTreeSet<(String, String)> = self
            .lock()
            .iter()
            .map(|item| (item.graph.clone(), item.branch.clone()))
            .collect();
        Ok(set.into_iter().collect())
    }
}
