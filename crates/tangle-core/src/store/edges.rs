//! Queries that find edges by the nodes they connect.

use std::collections::BTreeMap;

use super::{Cursor, EntityStore};
use crate::error::Result;
use crate::model::{Edge, EntityKeys};

/// End of an edge a query matches on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Match the `from` endpoint.
    Outgoing,
    /// Match the `to` endpoint.
    Incoming,
}

impl Direction {
    #[must_use]
    pub const fn endpoint(self, edge: &Edge) -> &EntityKeys {
        match self {
            Self::Outgoing => &edge.from,
            Self::Incoming => &edge.to,
        }
    }
}

/// Endpoint queries, provided for every edge store.
///
/// An endpoint matches a node when the two keysets overlap: they share a
/// uid, or a name under the same type. Endpoints of stored edges already
/// carry the full identity of the node they resolved to, so any uid of the
/// node finds them.
pub trait EdgeStoreExt: EntityStore<Edge> {
    /// Edges whose `direction` endpoint matches `node`, in store order.
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    fn edges_of(&self, node: &EntityKeys, direction: Direction) -> Result<Vec<Edge>> {
        Ok(self
            .iterate_all()?
            .filter(|edge| direction.endpoint(edge).overlaps(node))
            .collect())
    }

    /// Outgoing edges of `node`.
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    fn iterate_edges_from_node(&self, node: &EntityKeys) -> Result<Cursor<Edge>> {
        Ok(self.edges_of(node, Direction::Outgoing)?.into_iter())
    }

    /// Incoming edges of `node`.
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    fn iterate_edges_to_node(&self, node: &EntityKeys) -> Result<Cursor<Edge>> {
        Ok(self.edges_of(node, Direction::Incoming)?.into_iter())
    }

    /// Edges leading from `from` to `to`.
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    fn iterate_edges_between_nodes(&self, from: &EntityKeys, to: &EntityKeys) -> Result<Cursor<Edge>> {
        let between: Vec<Edge> = self
            .edges_of(from, Direction::Outgoing)?
            .into_iter()
            .filter(|edge| edge.to.overlaps(to))
            .collect();
        Ok(between.into_iter())
    }

    /// `true` if some edge leads from `from` to a node of type `to_type`.
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    fn exists_edge_to_node_of_type(&self, from: &EntityKeys, to_type: &str) -> Result<bool> {
        Ok(self
            .edges_of(from, Direction::Outgoing)?
            .iter()
            .any(|edge| edge.to.entity_type.as_deref() == Some(to_type)))
    }

    /// # Errors
    ///
    /// Propagates store failures.
    fn count_edges_from_node(&self, node: &EntityKeys) -> Result<u64> {
        Ok(self.edges_of(node, Direction::Outgoing)?.len() as u64)
    }

    /// # Errors
    ///
    /// Propagates store failures.
    fn count_edges_to_node(&self, node: &EntityKeys) -> Result<u64> {
        Ok(self.edges_of(node, Direction::Incoming)?.len() as u64)
    }

    /// # Errors
    ///
    /// Propagates store failures.
    fn count_edges_of_type_from_node(&self, edge_type: &str, node: &EntityKeys) -> Result<u64> {
        Ok(count_of_type(&self.edges_of(node, Direction::Outgoing)?, edge_type))
    }

    /// # Errors
    ///
    /// Propagates store failures.
    fn count_edges_of_type_to_node(&self, edge_type: &str, node: &EntityKeys) -> Result<u64> {
        Ok(count_of_type(&self.edges_of(node, Direction::Incoming)?, edge_type))
    }

    /// Edge type to count, for the edges on one side of `node`. Types with
    /// no edges are absent; untyped edges are not counted.
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    fn count_edges_by_type(
        &self,
        node: &EntityKeys,
        direction: Direction,
    ) -> Result<BTreeMap<String, u64>> {
        let mut counts = BTreeMap::new();
        for edge in self.edges_of(node, direction)? {
            if let Some(edge_type) = edge.keys.entity_type {
                *counts.entry(edge_type).or_insert(0) += 1;
            }
        }
        Ok(counts)
    }

    /// # Errors
    ///
    /// Propagates store failures.
    fn count_edges_by_type_from_node(&self, node: &EntityKeys) -> Result<BTreeMap<String, u64>> {
        self.count_edges_by_type(node, Direction::Outgoing)
    }

    /// # Errors
    ///
    /// Propagates store failures.
    fn count_edges_by_type_to_node(&self, node: &EntityKeys) -> Result<BTreeMap<String, u64>> {
        self.count_edges_by_type(node, Direction::Incoming)
    }
}

impl<S: EntityStore<Edge> + ?Sized> EdgeStoreExt for S {}

fn count_of_type(edges: &[Edge], edge_type: &str) -> u64 {
    edges
        .iter()
        .filter(|edge| edge.keys.entity_type.as_deref() == Some(edge_type))
        .count() as u64
}
