//! Graph operations recorded in the revision log.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::connection::validate_checkout_name;
use crate::error::{GraphError, Result};
use crate::merge::MergePolicy;
use crate::model::{Edge, EntityKeys, EntityKind, GraphEntity, Node};

use super::TxnId;

// ---------------------------------------------------------------------------
// Identification
// ---------------------------------------------------------------------------

/// How a modification identifies the entity it targets.
///
/// The mode fixes which identifiers the document must carry and which ones
/// are tried first when looking the entity up. An operation without a mode
/// accepts any identifier and tries uids first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentificationMode {
    /// At least one uid is required; uids are looked up before names.
    ById,
    /// A type and at least one name are required; names are looked up first.
    ByTypeAndName,
}

/// What to do when a repair target is absent or already repaired.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strictness {
    Ignore,
    #[default]
    Error,
}

const fn ignore() -> Strictness {
    Strictness::Ignore
}

// ---------------------------------------------------------------------------
// Operation payloads
// ---------------------------------------------------------------------------

/// Create a node, or merge into the node it resolves to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeModification {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ident: Option<IdentificationMode>,
    #[serde(default)]
    pub merge_policy: MergePolicy,
    pub node: Node,
}

impl NodeModification {
    #[must_use]
    pub fn new(node: Node) -> Self {
        Self {
            ident: None,
            merge_policy: MergePolicy::default(),
            node,
        }
    }

    #[must_use]
    pub const fn with_policy(mut self, merge_policy: MergePolicy) -> Self {
        self.merge_policy = merge_policy;
        self
    }

    #[must_use]
    pub const fn with_ident(mut self, ident: IdentificationMode) -> Self {
        self.ident = Some(ident);
        self
    }
}

/// Create an edge, or merge into the edge it resolves to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeModification {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ident: Option<IdentificationMode>,
    #[serde(default)]
    pub merge_policy: MergePolicy,
    pub edge: Edge,
    /// Endpoints may be left empty; the edge is stored as hanging.
    #[serde(default)]
    pub allow_hanging: bool,
}

impl EdgeModification {
    #[must_use]
    pub fn new(edge: Edge) -> Self {
        Self {
            ident: None,
            merge_policy: MergePolicy::default(),
            edge,
            allow_hanging: false,
        }
    }

    #[must_use]
    pub const fn with_policy(mut self, merge_policy: MergePolicy) -> Self {
        self.merge_policy = merge_policy;
        self
    }

    #[must_use]
    pub const fn allowing_hanging(mut self) -> Self {
        self.allow_hanging = true;
        self
    }
}

/// Re-resolve the endpoints of a hanging edge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixHangingEdge {
    pub edge_uid: String,
    /// Identifiers to add to the stored `from` endpoint before resolving.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<EntityKeys>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<EntityKeys>,
    #[serde(default)]
    pub when_missing: Strictness,
    #[serde(default = "ignore")]
    pub when_not_hanging: Strictness,
}

impl FixHangingEdge {
    #[must_use]
    pub fn new(edge_uid: impl Into<String>) -> Self {
        Self {
            edge_uid: edge_uid.into(),
            from: None,
            to: None,
            when_missing: Strictness::Error,
            when_not_hanging: Strictness::Ignore,
        }
    }
}

// ---------------------------------------------------------------------------
// GraphOperation
// ---------------------------------------------------------------------------

/// A single logged operation.
///
/// Serialized with an `op` tag, e.g. `{"op": "delete_by_uid", "kind": "node", "uid": "n1"}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum GraphOperation {
    NodeModification(NodeModification),
    EdgeModification(EdgeModification),
    DeleteByUid {
        kind: EntityKind,
        uid: String,
    },
    FixHangingEdge(FixHangingEdge),
    SetNamedProperty {
        entity_type: String,
        name: String,
        property: String,
        value: serde_json::Value,
    },
    BranchImport {
        graph: String,
        branch: String,
    },
    TransactionBegin {
        txn_id: TxnId,
    },
    TransactionCommit {
        txn_id: TxnId,
    },
    TransactionRollback {
        txn_id: TxnId,
    },
}

impl GraphOperation {
    #[must_use]
    pub const fn kind(&self) -> OperationKind {
        match self {
            Self::NodeModification(_) => OperationKind::NodeModification,
            Self::EdgeModification(_) => OperationKind::EdgeModification,
            Self::DeleteByUid { .. } => OperationKind::DeleteByUid,
            Self::FixHangingEdge(_) => OperationKind::FixHangingEdge,
            Self::SetNamedProperty { .. } => OperationKind::SetNamedProperty,
            Self::BranchImport { .. } => OperationKind::BranchImport,
            Self::TransactionBegin { .. } => OperationKind::TransactionBegin,
            Self::TransactionCommit { .. } => OperationKind::TransactionCommit,
            Self::TransactionRollback { .. } => OperationKind::TransactionRollback,
        }
    }

    /// `true` for begin/commit/rollback markers.
    #[must_use]
    pub const fn is_marker(&self) -> bool {
        self.kind().is_marker()
    }

    /// Checks that need no store access: keyset shape, reserved property
    /// names, required identifiers and edge endpoints.
    ///
    /// The log player repeats these checks, so a log written by another
    /// producer is held to the same rules.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::Validation`] describing the first problem found.
    pub fn validate(&self) -> Result<()> {
        match self {
            Self::NodeModification(op) => validate_document(&op.node, op.ident),
            Self::EdgeModification(op) => {
                validate_document(&op.edge, op.ident)?;
                validate_endpoints(&op.edge, op.allow_hanging)
            }
            Self::DeleteByUid { uid, .. } => non_empty("uid", uid),
            Self::FixHangingEdge(op) => {
                non_empty("edge_uid", &op.edge_uid)?;
                for keys in [&op.from, &op.to].into_iter().flatten() {
                    keys.validate()?;
                }
                Ok(())
            }
            Self::SetNamedProperty {
                entity_type,
                name,
                property,
                ..
            } => {
                non_empty("entity_type", entity_type)?;
                non_empty("name", name)?;
                non_empty("property", property)
            }
            Self::BranchImport { graph, branch } => {
                validate_checkout_name("graph", graph)?;
                validate_checkout_name("branch", branch)
            }
            Self::TransactionBegin { .. }
            | Self::TransactionCommit { .. }
            | Self::TransactionRollback { .. } => Ok(()),
        }
    }
}

fn non_empty(what: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(GraphError::validation(
            format!("`{what}` must not be empty"),
            &EntityKeys::default(),
        ));
    }
    Ok(())
}

/// Identity checks for a modification's candidate document.
pub(crate) fn validate_document<D: GraphEntity>(
    doc: &D,
    ident: Option<IdentificationMode>,
) -> Result<()> {
    let keys = doc.keys();
    keys.validate()?;
    doc.check_reserved_fields()?;
    match ident {
        Some(IdentificationMode::ById) if keys.uids.is_empty() => Err(GraphError::validation(
            "identification by id requires at least one uid",
            keys,
        )),
        Some(IdentificationMode::ByTypeAndName)
            if keys.entity_type.is_none() || keys.names.is_empty() =>
        {
            Err(GraphError::validation(
                "identification by type and name requires a type and at least one name",
                keys,
            ))
        }
        _ => keys.validate_identifiable(),
    }
}

pub(crate) fn validate_endpoints(edge: &Edge, allow_hanging: bool) -> Result<()> {
    for (label, endpoint) in [("from", &edge.from), ("to", &edge.to)] {
        endpoint.validate()?;
        if !allow_hanging && endpoint.is_empty() {
            return Err(GraphError::validation(
                format!("`{label}` endpoint needs a uid or name unless hanging is allowed"),
                &edge.keys,
            ));
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// OperationKind
// ---------------------------------------------------------------------------

/// Discriminant of [`GraphOperation`] with a stable dotted name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum OperationKind {
    NodeModification,
    EdgeModification,
    DeleteByUid,
    FixHangingEdge,
    SetNamedProperty,
    BranchImport,
    TransactionBegin,
    TransactionCommit,
    TransactionRollback,
}

impl OperationKind {
    pub const ALL: [Self; 9] = [
        Self::NodeModification,
        Self::EdgeModification,
        Self::DeleteByUid,
        Self::FixHangingEdge,
        Self::SetNamedProperty,
        Self::BranchImport,
        Self::TransactionBegin,
        Self::TransactionCommit,
        Self::TransactionRollback,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NodeModification => "node.modify",
            Self::EdgeModification => "edge.modify",
            Self::DeleteByUid => "entity.delete",
            Self::FixHangingEdge => "edge.fix_hanging",
            Self::SetNamedProperty => "property.set",
            Self::BranchImport => "branch.import",
            Self::TransactionBegin => "txn.begin",
            Self::TransactionCommit => "txn.commit",
            Self::TransactionRollback => "txn.rollback",
        }
    }

    #[must_use]
    pub const fn is_marker(self) -> bool {
        matches!(
            self,
            Self::TransactionBegin | Self::TransactionCommit | Self::TransactionRollback
        )
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown operation kind.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown operation kind `{0}`")]
pub struct UnknownOperationKind(pub String);

impl FromStr for OperationKind {
    type Err = UnknownOperationKind;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| UnknownOperationKind(s.to_string()))
    }
}
