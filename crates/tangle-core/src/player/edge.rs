use tracing::debug;

use super::Outcome;
use super::context::{ReplayContext, ensure_uid, lookup, require_type, write_merged};
use crate::error::{GraphError, Result};
use crate::model::{Edge, EntityKeys, EntityKind, GraphEntity, Node};
use crate::revlog::operation::{validate_document, validate_endpoints};
use crate::revlog::{EdgeModification, FixHangingEdge, RevisionItem, Strictness};
use crate::store::EntityStore;

/// Create the edge, or merge it into the edge its keys resolve to.
///
/// A new edge whose endpoints do not both resolve to stored nodes is kept
/// with `hanging = true` rather than rejected.
pub(super) fn play_edge_modification(
    ctx: ReplayContext<'_>,
    item: &RevisionItem,
    op: &EdgeModification,
) -> Result<Outcome> {
    validate_document(&op.edge, op.ident)?;
    validate_endpoints(&op.edge, op.allow_hanging)?;

    let Some(existing) = lookup(ctx.edges, &op.edge.keys, op.ident)? else {
        require_type(&op.edge.keys)?;
        let keys = ensure_uid(op.edge.keys.clone(), EntityKind::Edge, item);
        let edge = resolve_endpoints(ctx.nodes, op.edge.clone().with_keys(keys))?;
        if edge.hanging {
            debug!(keys = %edge.keys, from = %edge.from, to = %edge.to, "storing hanging edge");
        }
        ctx.edges.store(&edge)?;
        return Ok(Outcome::Created);
    };

    write_merged(ctx.edges, op.merge_policy, &existing, &op.edge)
}

/// Re-resolve the endpoints of a hanging edge, optionally adding
/// identifiers to them first. The edge is written back even if it is still
/// hanging, so added identifiers are kept.
pub(super) fn play_fix_hanging_edge(ctx: ReplayContext<'_>, op: &FixHangingEdge) -> Result<Outcome> {
    let Some(existing) = ctx.edges.get_by_uid(&op.edge_uid)? else {
        return match op.when_missing {
            Strictness::Ignore => {
                debug!(edge = %op.edge_uid, "repair target absent, ignoring");
                Ok(Outcome::Unchanged)
            }
            Strictness::Error => Err(GraphError::not_found(format!(
                "edge uid {} in {}",
                op.edge_uid,
                ctx.edges.collection()
            ))),
        };
    };

    if !existing.hanging {
        return match op.when_not_hanging {
            Strictness::Ignore => Ok(Outcome::Unchanged),
            Strictness::Error => Err(GraphError::validation(
                "edge is not hanging",
                &existing.keys,
            )),
        };
    }

    let mut edge = existing.clone();
    if let Some(from) = &op.from {
        edge.from = edge.from.union(from)?;
    }
    if let Some(to) = &op.to {
        edge.to = edge.to.union(to)?;
    }
    let edge = resolve_endpoints(ctx.nodes, edge)?;
    ctx.edges.replace(&existing, &edge)?;

    if edge.hanging {
        debug!(edge = %op.edge_uid, "edge still hanging after repair");
        Ok(Outcome::StillHanging)
    } else {
        Ok(Outcome::Repaired)
    }
}

/// Look up both endpoints, add each resolved node's identity to its
/// endpoint keyset, and set `hanging` unless both resolved.
fn resolve_endpoints(nodes: &dyn EntityStore<Node>, mut edge: Edge) -> Result<Edge> {
    let from = resolve_endpoint(nodes, &edge.from)?;
    let to = resolve_endpoint(nodes, &edge.to)?;
    if let Some(node) = &from {
        edge.from = edge.from.union(&node.keys)?;
    }
    if let Some(node) = &to {
        edge.to = edge.to.union(&node.keys)?;
    }
    edge.hanging = from.is_none() || to.is_none();
    Ok(edge)
}

fn resolve_endpoint(nodes: &dyn EntityStore<Node>, endpoint: &EntityKeys) -> Result<Option<Node>> {
    if endpoint.is_empty() {
        return Ok(None);
    }
    nodes.get_by_key(endpoint)
}
