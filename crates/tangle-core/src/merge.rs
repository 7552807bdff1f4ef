//! Merge policy engine.
//!
//! Combines a stored document with an incoming one that resolved to the same
//! identity. Identity is always the union of both keysets and the two types
//! must agree, whatever the policy. The policy only decides what happens to
//! the property map.
//!
//! ```
//! use serde_json::json;
//! use tangle_core::merge::{MergePolicy, merge_documents};
//! use tangle_core::model::{EntityKeys, Node};
//!
//! # fn main() -> tangle_core::Result<()> {
//! let existing = Node::new(EntityKeys::named("Person", "alice")).with_field("a", json!(1));
//! let incoming = Node::new(EntityKeys::named("Person", "alice"))
//!     .with_field("a", json!(2))
//!     .with_field("b", json!(2));
//!
//! let merged = merge_documents(MergePolicy::AppendNewLeaveExisting, &existing, &incoming)?;
//! assert_eq!(merged.fields["a"], json!(1));
//! assert_eq!(merged.fields["b"], json!(2));
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{GraphError, Result};
use crate::model::{Fields, GraphEntity};

/// Rule for combining an existing document with an incoming modification.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MergePolicy {
    /// Keep the existing document untouched.
    None,
    /// Refuse to merge anything that overlaps the existing identity.
    Err,
    /// Add new properties; existing values win on collisions.
    AppendNewLeaveExisting,
    /// Add new properties; incoming values win on collisions.
    #[default]
    AppendNewOverwriteExisting,
    /// Replace all properties with the incoming ones.
    OverwriteAll,
}

impl MergePolicy {
    pub const ALL: [Self; 5] = [
        Self::None,
        Self::Err,
        Self::AppendNewLeaveExisting,
        Self::AppendNewOverwriteExisting,
        Self::OverwriteAll,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Err => "err",
            Self::AppendNewLeaveExisting => "append-new-leave-existing",
            Self::AppendNewOverwriteExisting => "append-new-overwrite-existing",
            Self::OverwriteAll => "overwrite-all",
        }
    }
}

impl fmt::Display for MergePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown policy name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown merge policy `{0}`")]
pub struct UnknownMergePolicy(pub String);

impl FromStr for MergePolicy {
    type Err = UnknownMergePolicy;

    fn from_str(s: &str) -> std::result::Result<Self, UnknownMergePolicy> {
        Self::ALL
            .into_iter()
            .find(|policy| policy.as_str() == s)
            .ok_or_else(|| UnknownMergePolicy(s.to_string()))
    }
}

/// Merge `incoming` into `existing` under `policy`.
///
/// | policy | properties | identity |
/// |---|---|---|
/// | `None` | existing | existing |
/// | `Err` | conflict if the keysets overlap | |
/// | `AppendNewLeaveExisting` | union, existing wins | union |
/// | `AppendNewOverwriteExisting` | union, incoming wins | union |
/// | `OverwriteAll` | incoming | union |
///
/// Edges additionally union their `from`/`to` keysets under every policy
/// except `None`.
///
/// # Errors
///
/// Returns [`GraphError::Conflict`] when the types disagree, or when `policy`
/// is `Err` and the keysets overlap.
pub fn merge_documents<D: GraphEntity>(policy: MergePolicy, existing: &D, incoming: &D) -> Result<D> {
    let keys = existing.keys().union(incoming.keys())?;

    let fields = match policy {
        MergePolicy::None => return Ok(existing.clone()),
        MergePolicy::Err => {
            if existing.keys().overlaps(incoming.keys()) {
                return Err(GraphError::Conflict {
                    reason: "merge policy `err` forbids merging into an existing entity".into(),
                    existing: existing.keys().clone(),
                    incoming: incoming.keys().clone(),
                });
            }
            append(incoming.fields(), existing.fields())
        }
        MergePolicy::AppendNewLeaveExisting => append(incoming.fields(), existing.fields()),
        MergePolicy::AppendNewOverwriteExisting => append(existing.fields(), incoming.fields()),
        MergePolicy::OverwriteAll => incoming.fields().clone(),
    };

    D::compose(existing, incoming, keys, fields)
}

/// Merge where either side may be absent, as used when folding federated
/// results together.
///
/// # Errors
///
/// See [`merge_documents`].
pub fn merge_optional<D: GraphEntity>(
    policy: MergePolicy,
    existing: Option<D>,
    incoming: D,
) -> Result<D> {
    match existing {
        Some(existing) => merge_documents(policy, &existing, &incoming),
        None => Ok(incoming),
    }
}

/// `base` overlaid with `top`; keys in `top` win.
fn append(base: &Fields, top: &Fields) -> Fields {
    let mut out = base.clone();
    out.extend(top.iter().map(|(k, v)| (k.clone(), v.clone())));
    out
}

#[cfg(test)]
mod tests {
    use super::{MergePolicy, merge_documents, merge_optional};
    use crate::error::ErrorCode;
    use crate::model::{Edge, EntityKeys, Node};
    use serde_json::json;

    fn existing() -> Node {
        Node::new(EntityKeys::named("Person", "alice").with_uid("u1")).with_field("a", json!(1))
    }

    fn incoming() -> Node {
        Node::new(EntityKeys::named("Person", "alice").with_uid("u2"))
            .with_field("a", json!(2))
            .with_field("b", json!(2))
    }

    #[test]
    fn none_keeps_existing() {
        let merged = merge_documents(MergePolicy::None, &existing(), &incoming()).expect("merge");
        assert_eq!(merged, existing());
    }

    #[test]
    fn err_policy_conflicts_on_overlap() {
        let err = merge_documents(MergePolicy::Err, &existing(), &incoming()).expect_err("conflict");
        assert_eq!(err.code(), ErrorCode::MergeConflict);
    }

    #[test]
    fn err_policy_without_overlap_keeps_existing_values() {
        let other = Node::new(EntityKeys::typed("Person").with_uid("u9")).with_field("a", json!(5));
        let merged = merge_documents(MergePolicy::Err, &existing(), &other).expect("no overlap");
        assert_eq!(merged.fields["a"], json!(1));
        assert!(merged.keys.uids.contains("u9"));
    }

    #[test]
    fn append_leave_existing() {
        let merged = merge_documents(MergePolicy::AppendNewLeaveExisting, &existing(), &incoming())
            .expect("merge");
        assert_eq!(merged.fields["a"], json!(1));
        assert_eq!(merged.fields["b"], json!(2));
    }

    #[test]
    fn append_overwrite_existing() {
        let merged =
            merge_documents(MergePolicy::AppendNewOverwriteExisting, &existing(), &incoming())
                .expect("merge");
        assert_eq!(merged.fields["a"], json!(2));
        assert_eq!(merged.fields["b"], json!(2));
    }

    #[test]
    fn overwrite_all_replaces_fields_but_unions_identity() {
        let mut base = existing();
        base.fields.insert("only_old".into(), json!(true));
        let merged = merge_documents(MergePolicy::OverwriteAll, &base, &incoming()).expect("merge");
        assert_eq!(merged.fields.len(), 2);
        assert!(!merged.fields.contains_key("only_old"));
        assert_eq!(merged.keys.uids.len(), 2);
    }

    #[test]
    fn type_mismatch_fails_for_every_policy() {
        let city = Node::new(EntityKeys::typed("City").with_uid("u1"));
        for policy in MergePolicy::ALL {
            let err = merge_documents(policy, &existing(), &city).expect_err("type mismatch");
            assert_eq!(err.code(), ErrorCode::MergeConflict, "{policy}");
        }
    }

    #[test]
    fn edge_endpoints_union_independently_of_policy() {
        let old = Edge::new(
            EntityKeys::from_uid("e1"),
            EntityKeys::from_uid("a"),
            EntityKeys::from_uid("b"),
        )
        .with_field("w", json!(1));
        let new = Edge::new(
            EntityKeys::from_uid("e1"),
            EntityKeys::from_uid("a2"),
            EntityKeys::from_uid("b2"),
        );
        let merged = merge_documents(MergePolicy::OverwriteAll, &old, &new).expect("merge");
        assert!(merged.fields.is_empty());
        assert_eq!(merged.from.uids.len(), 2);
        assert_eq!(merged.to.uids.len(), 2);
    }

    #[test]
    fn merge_optional_takes_incoming_when_empty() {
        let merged = merge_optional(MergePolicy::Err, None, incoming()).expect("merge");
        assert_eq!(merged, incoming());
    }

    #[test]
    fn policy_names_parse() {
        for policy in MergePolicy::ALL {
            assert_eq!(policy.as_str().parse::<MergePolicy>(), Ok(policy));
        }
        assert!("merge-harder".parse::<MergePolicy>().is_err());
        let json = serde_json::to_string(&MergePolicy::OverwriteAll).expect("serialize");
        assert_eq!(json, "\"overwrite-all\"");
    }
}
