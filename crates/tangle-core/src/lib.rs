//! tangle-core: an event-sourced store for graph entities.
//!
//! Writes are recorded as [`GraphOperation`]s in an append-only
//! [`RevisionLog`], bracketed by transaction markers ([`txn`]). The
//! [`player`] replays the log into node and edge [`EntityStore`]s, resolving
//! each entity by uid or by type and name and combining documents under a
//! [`MergePolicy`]. The [`federation`] layer merges read results from several
//! checkouts until their identities stop growing.
//!
//! # Conventions
//!
//! - **Errors**: [`GraphError`] with a stable [`ErrorCode`]; configuration
//!   loading uses `anyhow` with context.
//! - **Logging**: `tracing` macros; the CLI installs the subscriber.

pub mod config;
pub mod connection;
pub mod db;
pub mod error;
pub mod federation;
pub mod lock;
pub mod merge;
pub mod model;
pub mod player;
pub mod revlog;
pub mod store;
pub mod txn;

pub use connection::{Collection, DEFAULT_BRANCH, GraphConnection};
pub use error::{ErrorCode, GraphError, Result};
pub use federation::{FederatedStore, FederationSettings, federated_count, federated_get};
pub use merge::{MergePolicy, merge_documents};
pub use model::{Edge, EntityKeys, EntityKind, GraphEntity, Node};
pub use player::{
    LogPlayer, ReplayMode, ReplayStats, play_revisions_for_transaction, rebuild,
    replay_all_revisions,
};
pub use revlog::{GraphOperation, RevisionItem, RevisionLog, TxnId};
pub use store::{EdgeStoreExt, EntityStore};
pub use txn::submit_operations;
