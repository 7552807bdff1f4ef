//! Elastic entity identity.
//!
//! An entity is known by a type plus any number of unique ids and any number
//! of names. Names are only unique within a type, so a keyset carrying names
//! must also carry a type. Two keysets that share a single uid, or a single
//! name under the same type, denote the same entity.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{GraphError, Result};

/// Identity of a node or edge: a type, a set of uids and a set of names.
///
/// Sets are ordered so that serialized documents are byte-stable across
/// replays.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityKeys {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub entity_type: Option<String>,
    #[serde(default)]
    pub uids: BTreeSet<String>,
    #[serde(default)]
    pub names: BTreeSet<String>,
}

impl EntityKeys {
    /// Empty keyset of the given type.
    #[must_use]
    pub fn typed(entity_type: impl Into<String>) -> Self {
        Self {
            entity_type: Some(entity_type.into()),
            ..Self::default()
        }
    }

    /// Untyped keyset with a single uid.
    #[must_use]
    pub fn from_uid(uid: impl Into<String>) -> Self {
        Self::default().with_uid(uid)
    }

    /// Keyset with a type and a single name.
    #[must_use]
    pub fn named(entity_type: impl Into<String>, name: impl Into<String>) -> Self {
        Self::typed(entity_type).with_name(name)
    }

    #[must_use]
    pub fn with_uid(mut self, uid: impl Into<String>) -> Self {
        self.uids.insert(uid.into());
        self
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.names.insert(name.into());
        self
    }

    /// `true` when the keyset carries neither uids nor names.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.uids.is_empty() && self.names.is_empty()
    }

    /// Check the structural invariant: names require a type.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::Validation`] if names are present without a type.
    pub fn validate(&self) -> Result<()> {
        if !self.names.is_empty() && self.entity_type.is_none() {
            return Err(GraphError::validation(
                "names were given without a type",
                self,
            ));
        }
        Ok(())
    }

    /// Like [`validate`](Self::validate), and additionally require at least
    /// one identifying element.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::Validation`] if the keyset is empty or names are
    /// untyped.
    pub fn validate_identifiable(&self) -> Result<()> {
        if self.is_empty() {
            return Err(GraphError::validation(
                "at least one uid or name is required",
                self,
            ));
        }
        self.validate()
    }

    /// `true` if the two keysets share any uid, or any name under the same type.
    #[must_use]
    pub fn overlaps(&self, other: &Self) -> bool {
        if !self.uids.is_disjoint(&other.uids) {
            return true;
        }
        self.same_type(other) && !self.names.is_disjoint(&other.names)
    }

    /// `true` if every identifier in `self` already appears in `other`.
    ///
    /// A type present here but absent from `other` counts as new information.
    #[must_use]
    pub fn is_subset_of(&self, other: &Self) -> bool {
        let type_known = match (&self.entity_type, &other.entity_type) {
            (None, _) => true,
            (Some(mine), Some(theirs)) => mine == theirs,
            (Some(_), None) => false,
        };
        type_known && self.uids.is_subset(&other.uids) && self.names.is_subset(&other.names)
    }

    /// Union of both keysets.
    ///
    /// The type of `self` is kept when both are set; a missing type is filled
    /// from `other`.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::Conflict`] if both keysets carry different types.
    pub fn union(&self, other: &Self) -> Result<Self> {
        let entity_type = match (&self.entity_type, &other.entity_type) {
            (Some(mine), Some(theirs)) if mine != theirs => {
                return Err(GraphError::Conflict {
                    reason: format!("type `{mine}` does not match `{theirs}`"),
                    existing: self.clone(),
                    incoming: other.clone(),
                });
            }
            (Some(t), _) | (None, Some(t)) => Some(t.clone()),
            (None, None) => None,
        };
        Ok(Self {
            entity_type,
            uids: self.uids.union(&other.uids).cloned().collect(),
            names: self.names.union(&other.names).cloned().collect(),
        })
    }

    fn same_type(&self, other: &Self) -> bool {
        matches!((&self.entity_type, &other.entity_type), (Some(a), Some(b)) if a == b)
    }
}

impl fmt::Display for EntityKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.entity_type.as_deref().unwrap_or("?"))?;
        f.write_str("{")?;
        let mut first = true;
        for uid in &self.uids {
            if !first {
                f.write_str(", ")?;
            }
            write!(f, "uid:{uid}")?;
            first = false;
        }
        for name in &self.names {
            if !first {
                f.write_str(", ")?;
            }
            write!(f, "name:{name}")?;
            first = false;
        }
        f.write_str("}")
    }
}

#[cfg(test)]
mod tests {
    use super::EntityKeys;
    use crate::error::ErrorCode;

    #[test]
    fn names_require_type() {
        let keys = EntityKeys::default().with_name("alice");
        let err = keys.validate().expect_err("untyped name must fail");
        assert_eq!(err.code(), ErrorCode::ValidationFailed);
        assert!(EntityKeys::named("Person", "alice").validate().is_ok());
    }

    #[test]
    fn identifiable_requires_some_id() {
        assert!(EntityKeys::typed("Person").validate_identifiable().is_err());
        assert!(EntityKeys::from_uid("u1").validate_identifiable().is_ok());
    }

    #[test]
    fn overlap_by_uid_ignores_type() {
        let a = EntityKeys::typed("Person").with_uid("u1");
        let b = EntityKeys::from_uid("u1");
        assert!(a.overlaps(&b));
    }

    #[test]
    fn names_only_overlap_within_type() {
        let a = EntityKeys::named("Person", "x");
        let b = EntityKeys::named("City", "x");
        assert!(!a.overlaps(&b));
        assert!(a.overlaps(&EntityKeys::named("Person", "x").with_uid("u9")));
    }

    #[test]
    fn union_collects_both_sides() {
        let a = EntityKeys::named("Person", "alice").with_uid("1");
        let b = EntityKeys::named("Person", "alice2").with_uid("2");
        let merged = a.union(&b).expect("same type");
        assert_eq!(merged.entity_type.as_deref(), Some("Person"));
        assert_eq!(merged.uids.len(), 2);
        assert!(merged.names.contains("alice") && merged.names.contains("alice2"));
    }

    #[test]
    fn union_fills_missing_type() {
        let a = EntityKeys::from_uid("1");
        let b = EntityKeys::typed("Person").with_uid("1");
        let merged = a.union(&b).expect("one side untyped");
        assert_eq!(merged.entity_type.as_deref(), Some("Person"));
    }

    #[test]
    fn union_rejects_type_mismatch() {
        let a = EntityKeys::typed("Person").with_uid("1");
        let b = EntityKeys::typed("City").with_uid("1");
        let err = a.union(&b).expect_err("types differ");
        assert_eq!(err.code(), ErrorCode::MergeConflict);
    }

    #[test]
    fn subset_treats_new_type_as_growth() {
        let query = EntityKeys::from_uid("1");
        let found = EntityKeys::typed("Person").with_uid("1");
        assert!(query.is_subset_of(&found));
        assert!(!found.is_subset_of(&query));
    }

    #[test]
    fn serializes_type_field_name() {
        let keys = EntityKeys::named("Person", "alice");
        let json = serde_json::to_string(&keys).expect("serialize");
        assert_eq!(json, r#"{"type":"Person","uids":[],"names":["alice"]}"#);
        let back: EntityKeys = serde_json::from_str(r#"{"uids":["u1"]}"#).expect("deserialize");
        assert_eq!(back, EntityKeys::from_uid("u1"));
    }

    #[test]
    fn display_is_compact() {
        let keys = EntityKeys::named("Person", "alice").with_uid("u1");
        assert_eq!(keys.to_string(), "Person{uid:u1, name:alice}");
    }
}
