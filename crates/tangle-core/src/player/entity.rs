use super::Outcome;
use super::context::ReplayContext;
use crate::error::Result;
use crate::model::EntityKind;
use crate::store::EntityStore;

/// Remove a node or edge by uid. An absent target is an error.
pub(super) fn play_delete(ctx: ReplayContext<'_>, kind: EntityKind, uid: &str) -> Result<Outcome> {
    match kind {
        EntityKind::Node => {
            ctx.nodes.delete_by_uid(uid)?;
        }
        EntityKind::Edge => {
            ctx.edges.delete_by_uid(uid)?;
        }
    }
    Ok(Outcome::Deleted)
}

/// Set one property on a named node. The node must already exist.
pub(super) fn play_set_named_property(
    ctx: ReplayContext<'_>,
    entity_type: &str,
    name: &str,
    property: &str,
    value: &serde_json::Value,
) -> Result<Outcome> {
    ctx.nodes
        .set_property_by_name(entity_type, name, property, value.clone())?;
    Ok(Outcome::PropertySet)
}
