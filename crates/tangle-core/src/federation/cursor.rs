use std::collections::{BTreeMap, BTreeSet};

use super::{FederationSettings, resolve};
use crate::connection::{Collection, GraphConnection};
use crate::error::{GraphError, Result};
use crate::model::EntityKeys;
use crate::store::Cursor;

/// Identifiers already emitted by one federated iteration.
///
/// Owned by a single cursor; never shared between iterators.
#[derive(Debug, Default, Clone)]
pub struct IdentityCache {
    seen_uids: BTreeSet<String>,
    seen_names: BTreeMap<String, BTreeSet<String>>,
}

impl IdentityCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether any identifier in `keys` has been recorded.
    #[must_use]
    pub fn contains(&self, keys: &EntityKeys) -> bool {
        if keys.uids.iter().any(|uid| self.seen_uids.contains(uid)) {
            return true;
        }
        keys.entity_type
            .as_ref()
            .and_then(|entity_type| self.seen_names.get(entity_type))
            .is_some_and(|names| keys.names.iter().any(|name| names.contains(name)))
    }

    pub fn record(&mut self, keys: &EntityKeys) {
        self.seen_uids.extend(keys.uids.iter().cloned());
        if let Some(entity_type) = &keys.entity_type {
            self.seen_names
                .entry(entity_type.clone())
                .or_default()
                .extend(keys.names.iter().cloned());
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.seen_uids.len() + self.seen_names.values().map(BTreeSet::len).sum::<usize>()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Streams federated documents, one per logical entity.
///
/// Walks each connection's documents in priority order. Every document not
/// already covered by the [`IdentityCache`] is resolved through the fixpoint
/// loop and yielded merged; its full identity is then recorded so the same
/// entity reached through another store or identifier is skipped.
pub struct FederatedCursor<'a, D: Collection> {
    conns: &'a [GraphConnection],
    settings: FederationSettings,
    entity_type: Option<String>,
    next_source: usize,
    source: Option<Cursor<D>>,
    cache: IdentityCache,
    failed: bool,
}

impl<'a, D: Collection> FederatedCursor<'a, D> {
    /// Cursor over every document.
    #[must_use]
    pub fn new(conns: &'a [GraphConnection], settings: FederationSettings) -> Self {
        Self {
            conns,
            settings,
            entity_type: None,
            next_source: 0,
            source: None,
            cache: IdentityCache::new(),
            failed: false,
        }
    }

    /// Cursor over documents of one type.
    #[must_use]
    pub fn of_type(
        conns: &'a [GraphConnection],
        settings: FederationSettings,
        entity_type: impl Into<String>,
    ) -> Self {
        Self {
            entity_type: Some(entity_type.into()),
            ..Self::new(conns, settings)
        }
    }

    #[must_use]
    pub const fn cache(&self) -> &IdentityCache {
        &self.cache
    }

    /// Next raw document from the current source, opening later sources as
    /// earlier ones run dry.
    fn next_raw(&mut self) -> Result<Option<D>> {
        loop {
            if let Some(doc) = self.source.as_mut().and_then(Iterator::next) {
                return Ok(Some(doc));
            }
            let Some(conn) = self.conns.get(self.next_source) else {
                return Ok(None);
            };
            self.next_source += 1;
            let store = D::store_of(conn);
            self.source = Some(match &self.entity_type {
                Some(entity_type) => store.iterate_by_type(entity_type, 0, None)?,
                None => store.iterate_all()?,
            });
        }
    }

    fn advance(&mut self) -> Result<Option<D>> {
        while let Some(raw) = self.next_raw()? {
            if self.cache.contains(raw.keys()) {
                continue;
            }
            let merged = resolve::<D>(self.conns, raw.keys(), &self.settings)?.ok_or_else(|| {
                GraphError::not_found(format!("{} {} during federated scan", D::KIND, raw.keys()))
            })?;
            self.cache.record(raw.keys());
            self.cache.record(merged.keys());
            return Ok(Some(merged));
        }
        Ok(None)
    }
}

impl<D: Collection> Iterator for FederatedCursor<'_, D> {
    type Item = Result<D>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        match self.advance() {
            Ok(doc) => doc.map(Ok),
            Err(err) => {
                self.failed = true;
                Some(Err(err))
            }
        }
    }
}

impl<D: Collection> std::fmt::Debug for FederatedCursor<'_, D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FederatedCursor")
            .field("connections", &self.conns.len())
            .field("entity_type", &self.entity_type)
            .field("next_source", &self.next_source)
            .field("seen", &self.cache.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::{FederatedCursor, IdentityCache};
    use crate::connection::GraphConnection;
    use crate::error::Result;
    use crate::federation::FederationSettings;
    use crate::model::{EntityKeys, Node};
    use crate::store::EntityStore;

    #[test]
    fn cache_matches_on_uid_or_typed_name() {
        let mut cache = IdentityCache::new();
        assert!(cache.is_empty());
        cache.record(&EntityKeys::named("Person", "alice").with_uid("u1"));
        assert!(cache.contains(&EntityKeys::from_uid("u1")));
        assert!(cache.contains(&EntityKeys::named("Person", "alice")));
        assert!(!cache.contains(&EntityKeys::named("Robot", "alice")));
        assert!(!cache.contains(&EntityKeys::from_uid("u2")));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn each_entity_is_yielded_once() -> Result<()> {
        let a = GraphConnection::in_memory("a", "main");
        let b = GraphConnection::in_memory("b", "main");
        a.nodes().store(&Node::new(EntityKeys::named("T", "x").with_uid("1")))?;
        a.nodes().store(&Node::new(EntityKeys::named("T", "y").with_uid("3")))?;
        b.nodes().store(&Node::new(EntityKeys::named("T", "x").with_uid("2")))?;
        b.nodes().store(&Node::new(EntityKeys::named("U", "z").with_uid("4")))?;
        let conns = [a, b];

        let all: Vec<Node> =
            FederatedCursor::new(&conns, FederationSettings::default()).collect::<Result<_>>()?;
        assert_eq!(all.len(), 3);
        let x = all
            .iter()
            .find(|node| node.keys.names.contains("x"))
            .expect("x yielded");
        assert!(x.keys.uids.contains("1") && x.keys.uids.contains("2"));

        let typed: Vec<Node> =
            FederatedCursor::of_type(&conns, FederationSettings::default(), "T").collect::<Result<_>>()?;
        assert_eq!(typed.len(), 2);
        Ok(())
    }
}
