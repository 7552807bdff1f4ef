use chrono::{DateTime, Utc};
use rusqlite::{Row, params};

use super::{GraphOperation, RevisionItem, RevisionLog, TxnId};
use crate::db::{self, SharedConnection};
use crate::error::{GraphError, Result};

const SELECT_COLUMNS: &str =
    "SELECT position, graph, branch, txn_id, seq_no, created_at_us, body FROM revisions";

/// Revision log stored in the `revisions` table.
///
/// Positions come from the table's autoincrement key; a batch is written
/// inside one SQLite transaction.
#[derive(Debug, Clone)]
pub struct SqliteRevisionLog {
    conn: SharedConnection,
}

impl SqliteRevisionLog {
    #[must_use]
    pub const fn new(conn: SharedConnection) -> Self {
        Self { conn }
    }

    fn insert(
        conn: &rusqlite::Connection,
        graph: &str,
        branch: &str,
        txn_id: &TxnId,
        seq_no: u32,
        operation: GraphOperation,
    ) -> Result<RevisionItem> {
        let timestamp = Utc::now();
        let body = serde_json::to_string(&operation)?;
        conn.execute(
            "INSERT INTO revisions (graph, branch, txn_id, seq_no, op_kind, created_at_us, body)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                graph,
                branch,
                txn_id.as_str(),
                i64::from(seq_no),
                operation.kind().as_str(),
                timestamp.timestamp_micros(),
                body
            ],
        )?;
        let position = u64::try_from(conn.last_insert_rowid())
            .map_err(|err| GraphError::store("revision position", err))?;
        Ok(RevisionItem {
            position,
            graph: graph.to_string(),
            branch: branch.to_string(),
            txn_id: txn_id.clone(),
            seq_no,
            timestamp,
            operation,
        })
    }

    fn query(&self, sql: &str, params: impl rusqlite::Params) -> Result<Vec<RevisionItem>> {
        let conn = db::lock(&self.conn);
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map(params, RawRevision::from_row)?;
        let mut items = Vec::new();
        for raw in rows {
            items.push(raw?.decode()?);
        }
        Ok(items)
    }
}

/// Row as read from SQLite, before the operation body is decoded.
struct RawRevision {
    position: i64,
    graph: String,
    branch: String,
    txn_id: String,
    seq_no: i64,
    created_at_us: i64,
    body: String,
}

impl RawRevision {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            position: row.get(0)?,
            graph: row.get(1)?,
            branch: row.get(2)?,
            txn_id: row.get(3)?,
            seq_no: row.get(4)?,
            created_at_us: row.get(5)?,
            body: row.get(6)?,
        })
    }

    fn decode(self) -> Result<RevisionItem> {
        let operation: GraphOperation =
            serde_json::from_str(&self.body).map_err(|source| GraphError::Corrupt {
                what: format!("revision {}", self.position),
                source,
            })?;
        Ok(RevisionItem {
            position: u64::try_from(self.position)
                .map_err(|err| GraphError::store("revision position", err))?,
            graph: self.graph,
            branch: self.branch,
            txn_id: TxnId::new(self.txn_id),
            seq_no: u32::try_from(self.seq_no)
                .map_err(|err| GraphError::store("revision sequence number", err))?,
            timestamp: DateTime::from_timestamp_micros(self.created_at_us).unwrap_or_default(),
            operation,
        })
    }
}

impl RevisionLog for SqliteRevisionLog {
    fn append(
        &self,
        graph: &str,
        branch: &str,
        txn_id: &TxnId,
        seq_no: u32,
        operation: GraphOperation,
    ) -> Result<RevisionItem> {
        let conn = db::lock(&self.conn);
        Self::insert(&conn, graph, branch, txn_id, seq_no, operation)
    }

    fn append_batch(
        &self,
        graph: &str,
        branch: &str,
        txn_id: &TxnId,
        first_seq: u32,
        operations: Vec<GraphOperation>,
    ) -> Result<Vec<RevisionItem>> {
        let mut conn = db::lock(&self.conn);
        let tx = conn.transaction()?;
        let mut seq = first_seq;
        let mut items = Vec::with_capacity(operations.len());
        for operation in operations {
            items.push(Self::insert(&tx, graph, branch, txn_id, seq, operation)?);
            seq = seq.saturating_add(1);
        }
        tx.commit()?;
        Ok(items)
    }

    fn iterate_all(&self, graph: &str, branch: &str) -> Result<Vec<RevisionItem>> {
        self.query(
            &format!("{SELECT_COLUMNS} WHERE graph = ?1 AND branch = ?2 ORDER BY position"),
            params![graph, branch],
        )
    }

    fn iterate_transaction(
        &self,
        graph: &str,
        branch: &str,
        txn_id: &TxnId,
    ) -> Result<Vec<RevisionItem>> {
        self.query(
            &format!(
                "{SELECT_COLUMNS} WHERE graph = ?1 AND branch = ?2 AND txn_id = ?3 \
                 ORDER BY seq_no, position"
            ),
            params![graph, branch, txn_id.as_str()],
        )
    }

    fn checkouts(&self) -> Result<Vec<(String, String)>> {
        let conn = db::lock(&self.conn);
        let mut stmt =
            conn.prepare("SELECT DISTINCT graph, branch FROM revisions ORDER BY graph, branch")?;
        let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }
}
