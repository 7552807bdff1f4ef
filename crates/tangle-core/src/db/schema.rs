//! SQLite schema for graph databases.
//!
//! One database file can hold any number of (graph, branch) checkouts:
//! - `revisions` is the append-only revision log for every checkout
//! - `documents` holds node and edge bodies as canonical JSON, tagged with
//!   the collection they belong to (`{graph}/{branch}/nodes` or `/edges`)
//! - `document_uids` and `document_names` index every identifier of a
//!   document back to its row
//! - `store_meta` records the schema version

/// Migration v1: revision log, document collections and identifier indexes.
pub const MIGRATION_V1_SQL: &str = r"
CREATE TABLE IF NOT EXISTS store_meta (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    schema_version INTEGER NOT NULL,
    created_at_us INTEGER NOT NULL DEFAULT 0
);

INSERT OR IGNORE INTO store_meta (id, schema_version) VALUES (1, 0);

CREATE TABLE IF NOT EXISTS revisions (
    position INTEGER PRIMARY KEY AUTOINCREMENT,
    graph TEXT NOT NULL CHECK (length(graph) > 0),
    branch TEXT NOT NULL CHECK (length(branch) > 0),
    txn_id TEXT NOT NULL,
    seq_no INTEGER NOT NULL CHECK (seq_no >= 0),
    op_kind TEXT NOT NULL,
    created_at_us INTEGER NOT NULL,
    body TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS documents (
    slot INTEGER PRIMARY KEY AUTOINCREMENT,
    collection TEXT NOT NULL,
    entity_type TEXT,
    body TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS document_uids (
    collection TEXT NOT NULL,
    uid TEXT NOT NULL,
    slot INTEGER NOT NULL REFERENCES documents(slot) ON DELETE CASCADE,
    PRIMARY KEY (collection, uid)
);

CREATE TABLE IF NOT EXISTS document_names (
    collection TEXT NOT NULL,
    entity_type TEXT NOT NULL,
    name TEXT NOT NULL,
    slot INTEGER NOT NULL REFERENCES documents(slot) ON DELETE CASCADE,
    PRIMARY KEY (collection, entity_type, name)
);
";

/// Migration v2: lookup indexes for per-checkout replay and typed listing.
pub const MIGRATION_V2_SQL: &str = r"
CREATE INDEX IF NOT EXISTS idx_revisions_checkout
    ON revisions(graph, branch, position);

CREATE INDEX IF NOT EXISTS idx_revisions_txn
    ON revisions(graph, branch, txn_id, seq_no);

CREATE INDEX IF NOT EXISTS idx_documents_collection_type
    ON documents(collection, entity_type, slot);

CREATE INDEX IF NOT EXISTS idx_document_uids_slot
    ON document_uids(slot);

CREATE INDEX IF NOT EXISTS idx_document_names_slot
    ON document_names(slot);
";

/// Indexes expected after all migrations.
pub const REQUIRED_INDEXES: &[&str] = &[
    "idx_revisions_checkout",
    "idx_revisions_txn",
    "idx_documents_collection_type",
    "idx_document_uids_slot",
    "idx_document_names_slot",
];
