//! Graph document model: identity keysets, nodes and edges.

pub mod document;
pub mod keys;

pub use document::{Edge, EntityKind, Fields, GraphEntity, Node};
pub use keys::EntityKeys;
