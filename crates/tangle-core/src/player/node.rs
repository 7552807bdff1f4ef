use tracing::debug;

use super::Outcome;
use super::context::{ReplayContext, ensure_uid, lookup, require_type, write_merged};
use crate::error::Result;
use crate::model::{EntityKind, GraphEntity};
use crate::revlog::operation::validate_document;
use crate::revlog::{NodeModification, RevisionItem};

/// Create the node, or merge it into the node its keys resolve to.
pub(super) fn play_node_modification(
    ctx: ReplayContext<'_>,
    item: &RevisionItem,
    op: &NodeModification,
) -> Result<Outcome> {
    validate_document(&op.node, op.ident)?;

    let Some(existing) = lookup(ctx.nodes, &op.node.keys, op.ident)? else {
        require_type(&op.node.keys)?;
        let keys = ensure_uid(op.node.keys.clone(), EntityKind::Node, item);
        debug!(keys = %keys, "creating node");
        ctx.nodes.store(&op.node.clone().with_keys(keys))?;
        return Ok(Outcome::Created);
    };

    write_merged(ctx.nodes, op.merge_policy, &existing, &op.node)
}
