//! SQLite backing for revision logs and entity stores.
//!
//! Runtime defaults:
//! - `journal_mode = WAL` so readers are not blocked by the writer
//! - `busy_timeout = 5s` to ride out short lock contention
//! - `foreign_keys = ON` so identifier rows follow their document

pub mod migrations;
pub mod schema;

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use rusqlite::Connection;

use crate::error::{GraphError, Result};

/// Busy timeout used for every connection.
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// One SQLite connection shared by the revision log and the stores of a
/// checkout.
pub type SharedConnection = Arc<Mutex<Connection>>;

/// Open (or create) a graph database, apply runtime pragmas and migrate the
/// schema to the latest version.
///
/// # Errors
///
/// Returns [`GraphError::Store`] if the directory cannot be created or the
/// database cannot be opened, configured or migrated.
pub fn open_database(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|err| {
            GraphError::store(format!("create database directory {}", parent.display()), err)
        })?;
    }

    let mut conn = Connection::open(path)
        .map_err(|err| GraphError::store(format!("open database {}", path.display()), err))?;

    configure_connection(&conn).map_err(|err| GraphError::store("configure sqlite pragmas", err))?;
    migrations::migrate(&mut conn).map_err(|err| GraphError::store("apply migrations", err))?;
    Ok(conn)
}

/// Fresh migrated in-memory database.
///
/// # Errors
///
/// Returns [`GraphError::Store`] if the schema cannot be created.
pub fn open_in_memory() -> Result<Connection> {
    let mut conn = Connection::open_in_memory()?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    migrations::migrate(&mut conn).map_err(|err| GraphError::store("apply migrations", err))?;
    Ok(conn)
}

/// Wrap a connection for sharing between a log and its stores.
#[must_use]
pub fn share(conn: Connection) -> SharedConnection {
    Arc::new(Mutex::new(conn))
}

/// Lock a shared connection. A poisoned lock is recovered: SQLite keeps its
/// own transactional state, so the connection is still usable.
pub(crate) fn lock(conn: &SharedConnection) -> MutexGuard<'_, Connection> {
    conn.lock().unwrap_or_else(PoisonError::into_inner)
}

fn configure_connection(conn: &Connection) -> rusqlite::Result<()> {
    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    let _journal_mode: String =
        conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
    conn.busy_timeout(DEFAULT_BUSY_TIMEOUT)?;
    Ok(())
}
