use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::EntityKeys;
use crate::error::{GraphError, Result};

/// Free-form property map carried by every document.
pub type Fields = BTreeMap<String, serde_json::Value>;

// ---------------------------------------------------------------------------
// EntityKind
// ---------------------------------------------------------------------------

/// Which collection a document lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Node,
    Edge,
}

impl EntityKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Node => "node",
            Self::Edge => "edge",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "node" => Ok(Self::Node),
            "edge" => Ok(Self::Edge),
            other => Err(format!("unknown entity kind `{other}`")),
        }
    }
}

// ---------------------------------------------------------------------------
// Documents
// ---------------------------------------------------------------------------

/// A graph node: identity plus arbitrary properties.
///
/// Wire shape: `{ "keys": {...}, ...fields }`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub keys: EntityKeys,
    #[serde(flatten)]
    pub fields: Fields,
}

impl Node {
    #[must_use]
    pub fn new(keys: EntityKeys) -> Self {
        Self {
            keys,
            fields: Fields::new(),
        }
    }

    #[must_use]
    pub fn with_field(mut self, name: impl Into<String>, value: serde_json::Value) -> Self {
        self.fields.insert(name.into(), value);
        self
    }
}

/// A directed edge between two nodes, each endpoint given as a keyset.
///
/// `hanging` is set when at least one endpoint did not resolve to a stored
/// node when the edge was written.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub keys: EntityKeys,
    pub from: EntityKeys,
    pub to: EntityKeys,
    #[serde(default)]
    pub hanging: bool,
    #[serde(flatten)]
    pub fields: Fields,
}

impl Edge {
    #[must_use]
    pub fn new(keys: EntityKeys, from: EntityKeys, to: EntityKeys) -> Self {
        Self {
            keys,
            from,
            to,
            hanging: false,
            fields: Fields::new(),
        }
    }

    #[must_use]
    pub fn with_field(mut self, name: impl Into<String>, value: serde_json::Value) -> Self {
        self.fields.insert(name.into(), value);
        self
    }
}

/// Behaviour shared by node and edge documents.
///
/// Documents are values: merging builds a new document through
/// [`compose`](GraphEntity::compose) rather than editing one in place.
pub trait GraphEntity:
    Clone + fmt::Debug + PartialEq + Serialize + DeserializeOwned + Send + Sync + 'static
{
    const KIND: EntityKind;

    /// Property names that collide with structural fields.
    const RESERVED_FIELDS: &'static [&'static str];

    fn keys(&self) -> &EntityKeys;

    fn fields(&self) -> &Fields;

    /// Same document with its identity replaced.
    #[must_use]
    fn with_keys(self, keys: EntityKeys) -> Self;

    /// Same document with its property map replaced.
    #[must_use]
    fn with_fields(self, fields: Fields) -> Self;

    /// Build the result of merging `incoming` into `existing`, given the
    /// already-merged identity and property map.
    ///
    /// # Errors
    ///
    /// Edges return [`GraphError::Conflict`] if an endpoint keyset cannot be
    /// unioned.
    fn compose(existing: &Self, incoming: &Self, keys: EntityKeys, fields: Fields) -> Result<Self>;

    /// Reject property names that would shadow structural fields.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::Validation`] naming the first reserved field.
    fn check_reserved_fields(&self) -> Result<()> {
        match Self::RESERVED_FIELDS
            .iter()
            .find(|name| self.fields().contains_key(**name))
        {
            Some(name) => Err(GraphError::validation(
                format!("`{name}` is reserved and cannot be used as a property"),
                self.keys(),
            )),
            None => Ok(()),
        }
    }
}

impl GraphEntity for Node {
    const KIND: EntityKind = EntityKind::Node;
    const RESERVED_FIELDS: &'static [&'static str] = &["keys"];

    fn keys(&self) -> &EntityKeys {
        &self.keys
    }

    fn fields(&self) -> &Fields {
        &self.fields
    }

    fn with_keys(self, keys: EntityKeys) -> Self {
        Self { keys, ..self }
    }

    fn with_fields(self, fields: Fields) -> Self {
        Self { fields, ..self }
    }

    fn compose(_existing: &Self, _incoming: &Self, keys: EntityKeys, fields: Fields) -> Result<Self> {
        Ok(Self { keys, fields })
    }
}

impl GraphEntity for Edge {
    const KIND: EntityKind = EntityKind::Edge;
    const RESERVED_FIELDS: &'static [&'static str] = &["keys", "from", "to", "hanging"];

    fn keys(&self) -> &EntityKeys {
        &self.keys
    }

    fn fields(&self) -> &Fields {
        &self.fields
    }

    fn with_keys(self, keys: EntityKeys) -> Self {
        Self { keys, ..self }
    }

    fn with_fields(self, fields: Fields) -> Self {
        Self { fields, ..self }
    }

    /// Endpoints are unioned whatever the policy; the hanging flag stays with
    /// the stored edge until a repair clears it.
    fn compose(existing: &Self, incoming: &Self, keys: EntityKeys, fields: Fields) -> Result<Self> {
        Ok(Self {
            keys,
            from: existing.from.union(&incoming.from)?,
            to: existing.to.union(&incoming.to)?,
            hanging: existing.hanging,
            fields,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::{Edge, EntityKind, GraphEntity, Node};
    use crate::error::ErrorCode;
    use crate::model::EntityKeys;
    use serde_json::json;

    #[test]
    fn node_wire_shape_flattens_fields() {
        let node = Node::new(EntityKeys::named("Person", "alice")).with_field("age", json!(30));
        let value = serde_json::to_value(&node).expect("serialize");
        assert_eq!(
            value,
            json!({"keys": {"type": "Person", "uids": [], "names": ["alice"]}, "age": 30})
        );
        let back: Node = serde_json::from_value(value).expect("deserialize");
        assert_eq!(back, node);
    }

    #[test]
    fn edge_wire_shape_carries_endpoints() {
        let edge = Edge::new(
            EntityKeys::typed("knows").with_uid("e1"),
            EntityKeys::from_uid("a"),
            EntityKeys::from_uid("b"),
        );
        let value = serde_json::to_value(&edge).expect("serialize");
        assert_eq!(value["hanging"], json!(false));
        assert_eq!(value["from"]["uids"], json!(["a"]));
        let back: Edge = serde_json::from_value(json!({
            "keys": {"type": "knows", "uids": ["e1"]},
            "from": {"uids": ["a"]},
            "to": {"uids": ["b"]},
            "since": 2001
        }))
        .expect("deserialize without hanging");
        assert!(!back.hanging);
        assert_eq!(back.fields["since"], json!(2001));
    }

    #[test]
    fn reserved_fields_are_rejected() {
        let mut edge = Edge::default();
        edge.fields.insert("hanging".into(), json!(true));
        let err = edge.check_reserved_fields().expect_err("reserved");
        assert_eq!(err.code(), ErrorCode::ValidationFailed);

        let node = Node::default().with_field("hanging", json!(true));
        assert!(node.check_reserved_fields().is_ok());
    }

    #[test]
    fn edge_compose_unions_endpoints() {
        let existing = Edge::new(
            EntityKeys::from_uid("e1"),
            EntityKeys::from_uid("a"),
            EntityKeys::named("Person", "bob"),
        );
        let incoming = Edge::new(
            EntityKeys::from_uid("e1"),
            EntityKeys::from_uid("a2"),
            EntityKeys::named("Person", "robert"),
        );
        let merged = Edge::compose(&existing, &incoming, existing.keys.clone(), existing.fields.clone())
            .expect("compose");
        assert_eq!(merged.from.uids.len(), 2);
        assert_eq!(merged.to.names.len(), 2);
    }

    #[test]
    fn kind_round_trips_through_str() {
        for kind in [EntityKind::Node, EntityKind::Edge] {
            assert_eq!(kind.as_str().parse::<EntityKind>(), Ok(kind));
        }
        assert!("vertex".parse::<EntityKind>().is_err());
    }
}
