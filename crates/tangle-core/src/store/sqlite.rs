use std::marker::PhantomData;

use rusqlite::{Connection, OptionalExtension, params};

use super::{Cursor, EntityStore};
use crate::db::{self, SharedConnection};
use crate::error::{GraphError, Result};
use crate::model::{EntityKeys, GraphEntity};

/// Entity store backed by the `documents` table.
///
/// Bodies are stored as canonical JSON; `document_uids` and `document_names`
/// map identifiers back to their row. Several collections share one database
/// and are told apart by the `collection` column.
#[derive(Debug)]
pub struct SqliteStore<D> {
    conn: SharedConnection,
    collection: String,
    _doc: PhantomData<fn() -> D>,
}

impl<D: GraphEntity> SqliteStore<D> {
    #[must_use]
    pub fn new(conn: SharedConnection, collection: impl Into<String>) -> Self {
        Self {
            conn,
            collection: collection.into(),
            _doc: PhantomData,
        }
    }

    fn decode(&self, body: &str) -> Result<D> {
        serde_json::from_str(body).map_err(|source| GraphError::Corrupt {
            what: format!("{} document in {}", D::KIND, self.collection),
            source,
        })
    }

    fn decode_all(&self, bodies: Vec<String>) -> Result<Cursor<D>> {
        bodies
            .iter()
            .map(|body| self.decode(body))
            .collect::<Result<Vec<_>>>()
            .map(Vec::into_iter)
    }

    /// Slots the identifiers of `keys` point at: uids first, then names.
    fn slots_of(&self, conn: &Connection, keys: &EntityKeys) -> rusqlite::Result<Vec<i64>> {
        let mut slots = Vec::new();
        for uid in &keys.uids {
            let slot: Option<i64> = conn
                .query_row(
                    "SELECT slot FROM document_uids WHERE collection = ?1 AND uid = ?2",
                    params![self.collection, uid],
                    |row| row.get(0),
                )
                .optional()?;
            slots.extend(slot);
        }
        if let Some(entity_type) = &keys.entity_type {
            for name in &keys.names {
                let slot: Option<i64> = conn
                    .query_row(
                        "SELECT slot FROM document_names
                         WHERE collection = ?1 AND entity_type = ?2 AND name = ?3",
                        params![self.collection, entity_type, name],
                        |row| row.get(0),
                    )
                    .optional()?;
                slots.extend(slot);
            }
        }
        Ok(slots)
    }

    fn body_at(&self, conn: &Connection, slot: i64) -> rusqlite::Result<Option<String>> {
        conn.query_row(
            "SELECT body FROM documents WHERE collection = ?1 AND slot = ?2",
            params![self.collection, slot],
            |row| row.get(0),
        )
        .optional()
    }

    /// Slot, reachable from `current`'s identifiers, whose body decodes to
    /// `current`.
    fn slot_holding(&self, conn: &Connection, current: &D) -> Result<Option<i64>> {
        let mut slots = self.slots_of(conn, current.keys())?;
        slots.dedup();
        for slot in slots {
            let Some(body) = self.body_at(conn, slot)? else {
                continue;
            };
            if self.decode(&body)? == *current {
                return Ok(Some(slot));
            }
        }
        Ok(None)
    }

    /// Point identifiers at `slot`, leaving any already owned by another row.
    fn index(&self, conn: &Connection, slot: i64, keys: &EntityKeys) -> rusqlite::Result<()> {
        for uid in &keys.uids {
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO document_uids (collection, uid, slot) VALUES (?1, ?2, ?3)",
                params![self.collection, uid, slot],
            )?;
            if inserted == 0 {
                tracing::warn!(collection = %self.collection, uid = %uid, slot, "uid already indexed to another document");
            }
        }
        if let Some(entity_type) = &keys.entity_type {
            for name in &keys.names {
                let inserted = conn.execute(
                    "INSERT OR IGNORE INTO document_names (collection, entity_type, name, slot)
                     VALUES (?1, ?2, ?3, ?4)",
                    params![self.collection, entity_type, name, slot],
                )?;
                if inserted == 0 {
                    tracing::warn!(collection = %self.collection, entity_type = %entity_type, name = %name, slot, "name already indexed to another document");
                }
            }
        }
        Ok(())
    }

    fn column(&self, sql: &str, params: impl rusqlite::Params) -> Result<Vec<String>> {
        let conn = db::lock(&self.conn);
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map(params, |row| row.get(0))?;
        Ok(rows.collect::<rusqlite::Result<Vec<String>>>()?)
    }

    fn single(&self, sql: &str, params: impl rusqlite::Params) -> Result<Option<D>> {
        let body: Option<String> = {
            let conn = db::lock(&self.conn);
            conn.query_row(sql, params, |row| row.get(0)).optional()?
        };
        body.map(|body| self.decode(&body)).transpose()
    }

    fn scalar(&self, sql: &str, params: impl rusqlite::Params) -> Result<u64> {
        let conn = db::lock(&self.conn);
        let value: i64 = conn.query_row(sql, params, |row| row.get(0))?;
        u64::try_from(value).map_err(|err| GraphError::store("row count", err))
    }
}

impl<D: GraphEntity> EntityStore<D> for SqliteStore<D> {
    fn collection(&self) -> &str {
        &self.collection
    }

    fn store(&self, doc: &D) -> Result<()> {
        let body = serde_json::to_string(doc)?;
        let mut conn = db::lock(&self.conn);
        let tx = conn.transaction()?;
        if let Some(slot) = self.slots_of(&tx, doc.keys())?.first() {
            let existing = match self.body_at(&tx, *slot)? {
                Some(body) => self.decode(&body)?.keys().clone(),
                None => EntityKeys::default(),
            };
            return Err(GraphError::Conflict {
                reason: format!("identifier already stored in {}", self.collection),
                existing,
                incoming: doc.keys().clone(),
            });
        }
        tx.execute(
            "INSERT INTO documents (collection, entity_type, body) VALUES (?1, ?2, ?3)",
            params![self.collection, doc.keys().entity_type, body],
        )?;
        let slot = tx.last_insert_rowid();
        self.index(&tx, slot, doc.keys())?;
        tx.commit()?;
        Ok(())
    }

    fn replace(&self, current: &D, doc: &D) -> Result<()> {
        let body = serde_json::to_string(doc)?;
        let mut conn = db::lock(&self.conn);
        let tx = conn.transaction()?;
        let Some(slot) = self.slot_holding(&tx, current)? else {
            return Err(GraphError::not_found(format!(
                "{} {} in {}",
                D::KIND,
                current.keys(),
                self.collection
            )));
        };
        tx.execute(
            "UPDATE documents SET entity_type = ?1, body = ?2 WHERE slot = ?3",
            params![doc.keys().entity_type, body, slot],
        )?;
        tx.execute("DELETE FROM document_uids WHERE slot = ?1", [slot])?;
        tx.execute("DELETE FROM document_names WHERE slot = ?1", [slot])?;
        self.index(&tx, slot, doc.keys())?;
        tx.commit()?;
        Ok(())
    }

    fn get_by_uid(&self, uid: &str) -> Result<Option<D>> {
        self.single(
            "SELECT d.body FROM document_uids u JOIN documents d ON d.slot = u.slot
             WHERE u.collection = ?1 AND u.uid = ?2",
            params![self.collection, uid],
        )
    }

    fn get_by_name(&self, entity_type: &str, name: &str) -> Result<Option<D>> {
        self.single(
            "SELECT d.body FROM document_names n JOIN documents d ON d.slot = n.slot
             WHERE n.collection = ?1 AND n.entity_type = ?2 AND n.name = ?3",
            params![self.collection, entity_type, name],
        )
    }

    fn delete_by_uid(&self, uid: &str) -> Result<D> {
        let found: Option<(i64, String)> = {
            let mut conn = db::lock(&self.conn);
            let tx = conn.transaction()?;
            let found = tx
                .query_row(
                    "SELECT d.slot, d.body FROM document_uids u JOIN documents d ON d.slot = u.slot
                     WHERE u.collection = ?1 AND u.uid = ?2",
                    params![self.collection, uid],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;
            if let Some((slot, _)) = &found {
                tx.execute("DELETE FROM document_uids WHERE slot = ?1", [slot])?;
                tx.execute("DELETE FROM document_names WHERE slot = ?1", [slot])?;
                tx.execute("DELETE FROM documents WHERE slot = ?1", [slot])?;
            }
            tx.commit()?;
            found
        };
        match found {
            Some((_, body)) => self.decode(&body),
            None => Err(GraphError::not_found(format!(
                "{} uid {uid} in {}",
                D::KIND,
                self.collection
            ))),
        }
    }

    fn iterate_all(&self) -> Result<Cursor<D>> {
        let bodies = self.column(
            "SELECT body FROM documents WHERE collection = ?1 ORDER BY slot",
            [&self.collection],
        )?;
        self.decode_all(bodies)
    }

    fn iterate_by_type(
        &self,
        entity_type: &str,
        offset: usize,
        limit: Option<usize>,
    ) -> Result<Cursor<D>> {
        let limit = limit.map_or(Ok(-1), i64::try_from);
        let offset = i64::try_from(offset);
        let (Ok(limit), Ok(offset)) = (limit, offset) else {
            return Err(GraphError::store(
                "page bounds",
                "offset or limit exceeds the supported range",
            ));
        };
        let bodies = self.column(
            "SELECT body FROM documents WHERE collection = ?1 AND entity_type = ?2
             ORDER BY slot LIMIT ?3 OFFSET ?4",
            params![self.collection, entity_type, limit, offset],
        )?;
        self.decode_all(bodies)
    }

    fn count(&self) -> Result<u64> {
        self.scalar(
            "SELECT COUNT(*) FROM documents WHERE collection = ?1",
            [&self.collection],
        )
    }

    fn count_by_type(&self, entity_type: &str) -> Result<u64> {
        self.scalar(
            "SELECT COUNT(*) FROM documents WHERE collection = ?1 AND entity_type = ?2",
            params![self.collection, entity_type],
        )
    }

    fn list_types(&self) -> Result<Vec<String>> {
        self.column(
            "SELECT DISTINCT entity_type FROM documents
             WHERE collection = ?1 AND entity_type IS NOT NULL ORDER BY entity_type",
            [&self.collection],
        )
    }

    fn clear(&self) -> Result<()> {
        let mut conn = db::lock(&self.conn);
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM document_uids WHERE collection = ?1", [&self.collection])?;
        tx.execute("DELETE FROM document_names WHERE collection = ?1", [&self.collection])?;
        tx.execute("DELETE FROM documents WHERE collection = ?1", [&self.collection])?;
        tx.commit()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::SqliteStore;
    use crate::db;
    use crate::model::{Edge, EntityKeys, Node};
    use crate::store::{EntityStore, contract};

    #[test]
    fn sqlite_store_meets_contract() {
        contract::run_all(|| {
            SqliteStore::<Node>::new(db::share(db::open_in_memory().expect("db")), "g/main/nodes")
        });
        contract::run_edges(|| {
            SqliteStore::<Edge>::new(db::share(db::open_in_memory().expect("db")), "g/main/edges")
        });
    }

    #[test]
    fn collections_in_one_database_are_isolated() {
        let shared = db::share(db::open_in_memory().expect("db"));
        let main = SqliteStore::<Node>::new(shared.clone(), "g/main/nodes");
        let dev = SqliteStore::<Node>::new(shared, "g/dev/nodes");

        main.store(&Node::new(EntityKeys::named("Person", "alice").with_uid("u1")))
            .expect("store");
        assert!(!dev.exists_by_uid("u1").expect("exists"));
        dev.store(&Node::new(EntityKeys::named("Person", "alice").with_uid("u1")))
            .expect("same ids in another collection");
        dev.clear().expect("clear");
        assert_eq!(main.count().expect("count"), 1);
    }

    #[test]
    fn edges_round_trip_through_json_body() {
        let store = SqliteStore::<Edge>::new(db::share(db::open_in_memory().expect("db")), "g/main/edges");
        let mut edge = Edge::new(
            EntityKeys::typed("knows").with_uid("e1"),
            EntityKeys::from_uid("a"),
            EntityKeys::named("Person", "bob"),
        );
        edge.hanging = true;
        store.store(&edge).expect("store");
        assert_eq!(store.get_by_uid("e1").expect("get"), Some(edge));
    }
}
