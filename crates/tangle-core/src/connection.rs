//! A graph checkout: one (graph, branch) with its revision log and stores.

use std::path::Path;
use std::sync::Arc;

use crate::db;
use crate::error::{GraphError, Result};
use crate::model::{Edge, EntityKeys, GraphEntity, Node};
use crate::revlog::{MemoryRevisionLog, RevisionLog, SqliteRevisionLog};
use crate::store::{EntityStore, MemoryStore, SqliteStore, collection_name};

/// Branch used when none is named.
pub const DEFAULT_BRANCH: &str = "main";

/// Check a graph or branch name.
///
/// Names end up as path segments of collection names (`graph/branch/nodes`),
/// so they must be non-empty and must not contain `/`.
///
/// # Errors
///
/// Returns [`GraphError::Validation`] naming the offending part.
pub fn validate_checkout_name(what: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(GraphError::validation(
            format!("`{what}` must not be empty"),
            &EntityKeys::default(),
        ));
    }
    if value.contains('/') {
        return Err(GraphError::validation(
            format!("`{what}` must not contain `/`, got `{value}`"),
            &EntityKeys::default(),
        ));
    }
    Ok(())
}

/// Everything needed to write to and replay one (graph, branch).
///
/// The revision log may be shared with other checkouts; the node and edge
/// stores belong to this checkout alone.
#[derive(Clone)]
pub struct GraphConnection {
    graph: String,
    branch: String,
    revlog: Arc<dyn RevisionLog>,
    nodes: Arc<dyn EntityStore<Node>>,
    edges: Arc<dyn EntityStore<Edge>>,
}

impl std::fmt::Debug for GraphConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphConnection")
            .field("graph", &self.graph)
            .field("branch", &self.branch)
            .field("nodes", &self.nodes.collection())
            .field("edges", &self.edges.collection())
            .finish_non_exhaustive()
    }
}

impl GraphConnection {
    #[must_use]
    pub fn new(
        graph: impl Into<String>,
        branch: impl Into<String>,
        revlog: Arc<dyn RevisionLog>,
        nodes: Arc<dyn EntityStore<Node>>,
        edges: Arc<dyn EntityStore<Edge>>,
    ) -> Self {
        Self {
            graph: graph.into(),
            branch: branch.into(),
            revlog,
            nodes,
            edges,
        }
    }

    /// Checkout with a private in-memory log and stores.
    #[must_use]
    pub fn in_memory(graph: &str, branch: &str) -> Self {
        Self::in_memory_with_log(graph, branch, Arc::new(MemoryRevisionLog::new()))
    }

    /// Checkout with fresh in-memory stores over an existing log.
    #[must_use]
    pub fn in_memory_with_log(graph: &str, branch: &str, revlog: Arc<dyn RevisionLog>) -> Self {
        Self::new(
            graph,
            branch,
            revlog,
            Arc::new(MemoryStore::<Node>::new(collection_name(graph, branch, "nodes"))),
            Arc::new(MemoryStore::<Edge>::new(collection_name(graph, branch, "edges"))),
        )
    }

    /// Checkout whose log and stores live in the SQLite database at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::Validation`] for a bad graph or branch name, or
    /// [`GraphError::Store`] if the database cannot be opened or migrated.
    pub fn open_sqlite(path: &Path, graph: &str, branch: &str) -> Result<Self> {
        validate_checkout_name("graph", graph)?;
        validate_checkout_name("branch", branch)?;
        let shared = db::share(db::open_database(path)?);
        Self::sqlite(&shared, graph, branch)
    }

    /// Checkout over an already-open shared SQLite connection.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::Validation`] if `graph` or `branch` is empty or
    /// contains `/`; checkouts in one database must not share collections.
    pub fn sqlite(conn: &db::SharedConnection, graph: &str, branch: &str) -> Result<Self> {
        validate_checkout_name("graph", graph)?;
        validate_checkout_name("branch", branch)?;
        Ok(Self::new(
            graph,
            branch,
            Arc::new(SqliteRevisionLog::new(Arc::clone(conn))),
            Arc::new(SqliteStore::<Node>::new(
                Arc::clone(conn),
                collection_name(graph, branch, "nodes"),
            )),
            Arc::new(SqliteStore::<Edge>::new(
                Arc::clone(conn),
                collection_name(graph, branch, "edges"),
            )),
        ))
    }

    #[must_use]
    pub fn graph(&self) -> &str {
        &self.graph
    }

    #[must_use]
    pub fn branch(&self) -> &str {
        &self.branch
    }

    #[must_use]
    pub fn revlog(&self) -> &dyn RevisionLog {
        self.revlog.as_ref()
    }

    #[must_use]
    pub fn nodes(&self) -> &dyn EntityStore<Node> {
        self.nodes.as_ref()
    }

    #[must_use]
    pub fn edges(&self) -> &dyn EntityStore<Edge> {
        self.edges.as_ref()
    }

    /// The store holding documents of type `D`.
    #[must_use]
    pub fn store<D: Collection>(&self) -> &dyn EntityStore<D> {
        D::store_of(self)
    }

    /// `graph/branch`, for logs and diagnostics.
    #[must_use]
    pub fn label(&self) -> String {
        format!("{}/{}", self.graph, self.branch)
    }
}

/// Document types that have a store in every [`GraphConnection`].
pub trait Collection: GraphEntity {
    fn store_of(conn: &GraphConnection) -> &dyn EntityStore<Self>;
}

impl Collection for Node {
    fn store_of(conn: &GraphConnection) -> &dyn EntityStore<Self> {
        conn.nodes()
    }
}

impl Collection for Edge {
    fn store_of(conn: &GraphConnection) -> &dyn EntityStore<Self> {
        conn.edges()
    }
}

#[cfg(test)]
mod tests {
    use super::GraphConnection;
    use crate::db;
    use crate::error::ErrorCode;
    use crate::model::{Edge, Node};

    #[test]
    fn in_memory_collections_follow_checkout_naming() {
        let conn = GraphConnection::in_memory("people", "main");
        assert_eq!(conn.nodes().collection(), "people/main/nodes");
        assert_eq!(conn.store::<Edge>().collection(), "people/main/edges");
        assert_eq!(conn.store::<Node>().collection(), "people/main/nodes");
        assert_eq!(conn.label(), "people/main");
    }

    #[test]
    fn sqlite_checkouts_share_one_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("tangle.db");
        let conn = GraphConnection::open_sqlite(&path, "people", "main").expect("open");
        assert_eq!(conn.edges().collection(), "people/main/edges");
        assert!(path.exists());
    }

    #[test]
    fn slashes_in_checkout_names_are_rejected() {
        let shared = db::share(db::open_in_memory().expect("db"));
        for (graph, branch) in [("a/b", "c"), ("a", "b/c"), ("", "main"), ("a", " ")] {
            let err = GraphConnection::sqlite(&shared, graph, branch).expect_err("bad name");
            assert_eq!(err.code(), ErrorCode::ValidationFailed, "{graph:?} {branch:?}");
        }
        assert!(GraphConnection::sqlite(&shared, "a", "b").is_ok());
    }
}
