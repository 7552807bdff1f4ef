use crate::connection::GraphConnection;
use crate::error::{GraphError, Result};
use crate::merge::{MergePolicy, merge_documents};
use crate::model::{Edge, EntityKeys, EntityKind, GraphEntity, Node};
use crate::revlog::{IdentificationMode, RevisionItem};
use crate::store::EntityStore;

use super::Outcome;

/// Stores an operation handler may read and write.
///
/// Built fresh for every item; handlers hold no state between items.
#[derive(Clone, Copy)]
pub struct ReplayContext<'a> {
    pub nodes: &'a dyn EntityStore<Node>,
    pub edges: &'a dyn EntityStore<Edge>,
}

impl<'a> ReplayContext<'a> {
    #[must_use]
    pub fn new(conn: &'a GraphConnection) -> Self {
        Self {
            nodes: conn.nodes(),
            edges: conn.edges(),
        }
    }
}

/// Resolve `keys` in `store`, trying identifiers in the order the
/// identification mode prefers.
pub(super) fn lookup<D: GraphEntity>(
    store: &dyn EntityStore<D>,
    keys: &EntityKeys,
    ident: Option<IdentificationMode>,
) -> Result<Option<D>> {
    match (ident, &keys.entity_type) {
        (Some(IdentificationMode::ByTypeAndName), Some(entity_type)) => {
            if let Some(doc) = store.get_by_any_name(entity_type, &keys.names)? {
                return Ok(Some(doc));
            }
            store.get_by_any_uid(&keys.uids)
        }
        _ => store.get_by_key(keys),
    }
}

/// New entities must be typed.
pub(super) fn require_type(keys: &EntityKeys) -> Result<()> {
    if keys.entity_type.is_none() {
        return Err(GraphError::validation(
            "a type is required to create an entity",
            keys,
        ));
    }
    Ok(())
}

/// Give a new entity a uid if it was created by name only.
///
/// The uid is derived from the revision that created the entity, so replaying
/// the same log always produces the same uid.
pub(super) fn ensure_uid(keys: EntityKeys, kind: EntityKind, item: &RevisionItem) -> EntityKeys {
    if !keys.uids.is_empty() {
        return keys;
    }
    let mut hasher = blake3::Hasher::new();
    for part in [
        kind.as_str(),
        item.graph.as_str(),
        item.branch.as_str(),
        item.txn_id.as_str(),
    ] {
        hasher.update(part.as_bytes());
        hasher.update(b"\0");
    }
    hasher.update(&item.seq_no.to_le_bytes());
    if let Some(entity_type) = &keys.entity_type {
        hasher.update(entity_type.as_bytes());
    }
    for name in &keys.names {
        hasher.update(b"\0");
        hasher.update(name.as_bytes());
    }
    let hex = hasher.finalize().to_hex();
    let uid = format!("{}-{}", kind.as_str(), &hex[..16]);
    keys.with_uid(uid)
}

/// Merge `incoming` into `existing` and write the result back over the slot
/// holding `existing`.
pub(super) fn write_merged<D: GraphEntity>(
    store: &dyn EntityStore<D>,
    policy: MergePolicy,
    existing: &D,
    incoming: &D,
) -> Result<Outcome> {
    let merged = merge_documents(policy, existing, incoming)?;
    if merged == *existing {
        return Ok(Outcome::Unchanged);
    }
    store.replace(existing, &merged)?;
    Ok(Outcome::Merged)
}
