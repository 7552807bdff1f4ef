use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::{Cursor, EntityStore};
use crate::error::{GraphError, Result};
use crate::model::{EntityKeys, GraphEntity};

type Slot = u64;

#[derive(Debug)]
struct Inner<D> {
    next_slot: Slot,
    docs: BTreeMap<Slot, D>,
    by_uid: HashMap<String, Slot>,
    by_name: HashMap<(String, String), Slot>,
}

impl<D> Default for Inner<D> {
    fn default() -> Self {
        Self {
            next_slot: 1,
            docs: BTreeMap::new(),
            by_uid: HashMap::new(),
            by_name: HashMap::new(),
        }
    }
}

impl<D: GraphEntity> Inner<D> {
    /// Slots the identifiers of `keys` point at: uids first, then names.
    fn slots_of<'a>(&'a self, keys: &'a EntityKeys) -> impl Iterator<Item = Slot> + 'a {
        let by_uid = keys
            .uids
            .iter()
            .filter_map(move |uid| self.by_uid.get(uid).copied());
        let by_name = keys.entity_type.iter().flat_map(move |entity_type| {
            keys.names.iter().filter_map(move |name| {
                self.by_name
                    .get(&(entity_type.clone(), name.clone()))
                    .copied()
            })
        });
        by_uid.chain(by_name)
    }

    /// Slot holding any uid of `keys`, else any of its names.
    fn slot_for(&self, keys: &EntityKeys) -> Option<Slot> {
        self.slots_of(keys).next()
    }

    /// Slot, reachable from `current`'s identifiers, that holds `current`.
    fn slot_holding(&self, current: &D) -> Option<Slot> {
        self.slots_of(current.keys())
            .find(|slot| self.docs.get(slot) == Some(current))
    }

    /// Point every identifier of `keys` at `slot`. An identifier already held
    /// by another slot stays with that slot.
    fn index(&mut self, collection: &str, slot: Slot, keys: &EntityKeys) {
        for uid in &keys.uids {
            let owner = *self.by_uid.entry(uid.clone()).or_insert(slot);
            if owner != slot {
                tracing::warn!(collection, uid = %uid, owner, slot, "uid already indexed to another document");
            }
        }
        if let Some(entity_type) = &keys.entity_type {
            for name in &keys.names {
                let owner = *self
                    .by_name
                    .entry((entity_type.clone(), name.clone()))
                    .or_insert(slot);
                if owner != slot {
                    tracing::warn!(collection, entity_type = %entity_type, name = %name, owner, slot, "name already indexed to another document");
                }
            }
        }
    }

    fn unindex(&mut self, slot: Slot) {
        self.by_uid.retain(|_, owner| *owner != slot);
        self.by_name.retain(|_, owner| *owner != slot);
    }
}

/// Entity store held entirely in memory.
///
/// Documents keep their insertion order. Identifier indexes follow a
/// first-writer rule: once a uid or name points at a document it keeps
/// pointing there until that document is deleted.
#[derive(Debug)]
pub struct MemoryStore<D> {
    collection: String,
    inner: RwLock<Inner<D>>,
}

impl<D: GraphEntity> MemoryStore<D> {
    #[must_use]
    pub fn new(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            inner: RwLock::new(Inner::default()),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Inner<D>> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner<D>> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<D: GraphEntity> EntityStore<D> for MemoryStore<D> {
    fn collection(&self) -> &str {
        &self.collection
    }

    fn store(&self, doc: &D) -> Result<()> {
        let mut inner = self.write();
        if let Some(slot) = inner.slot_for(doc.keys()) {
            let existing = inner
                .docs
                .get(&slot)
                .map(|d| d.keys().clone())
                .unwrap_or_default();
            return Err(GraphError::Conflict {
                reason: format!("identifier already stored in {}", self.collection),
                existing,
                incoming: doc.keys().clone(),
            });
        }
        let slot = inner.next_slot;
        inner.next_slot += 1;
        inner.index(&self.collection, slot, doc.keys());
        inner.docs.insert(slot, doc.clone());
        Ok(())
    }

    fn replace(&self, current: &D, doc: &D) -> Result<()> {
        let mut inner = self.write();
        let Some(slot) = inner.slot_holding(current) else {
            return Err(GraphError::not_found(format!(
                "{} {} in {}",
                D::KIND,
                current.keys(),
                self.collection
            )));
        };
        inner.unindex(slot);
        inner.index(&self.collection, slot, doc.keys());
        inner.docs.insert(slot, doc.clone());
        Ok(())
    }

    fn get_by_uid(&self, uid: &str) -> Result<Option<D>> {
        let inner = self.read();
        Ok(inner
            .by_uid
            .get(uid)
            .and_then(|slot| inner.docs.get(slot))
            .cloned())
    }

    fn get_by_name(&self, entity_type: &str, name: &str) -> Result<Option<D>> {
        let inner = self.read();
        Ok(inner
            .by_name
            .get(&(entity_type.to_string(), name.to_string()))
            .and_then(|slot| inner.docs.get(slot))
            .cloned())
    }

    fn delete_by_uid(&self, uid: &str) -> Result<D> {
        let mut inner = self.write();
        let slot = inner.by_uid.get(uid).copied();
        let removed = slot.and_then(|slot| inner.docs.remove(&slot).map(|doc| (slot, doc)));
        match removed {
            Some((slot, doc)) => {
                inner.unindex(slot);
                Ok(doc)
            }
            None => Err(GraphError::not_found(format!(
                "{} uid {uid} in {}",
                D::KIND,
                self.collection
            ))),
        }
    }

    fn iterate_all(&self) -> Result<Cursor<D>> {
        Ok(self.read().docs.values().cloned().collect::<Vec<_>>().into_iter())
    }

    fn iterate_by_type(
        &self,
        entity_type: &str,
        offset: usize,
        limit: Option<usize>,
    ) -> Result<Cursor<D>> {
        let inner = self.read();
        let matching = inner
            .docs
            .values()
            .filter(|doc| doc.keys().entity_type.as_deref() == Some(entity_type))
            .skip(offset)
            .take(limit.unwrap_or(usize::MAX));
        Ok(matching.cloned().collect::<Vec<_>>().into_iter())
    }

    fn count(&self) -> Result<u64> {
        Ok(self.read().docs.len() as u64)
    }

    fn count_by_type(&self, entity_type: &str) -> Result<u64> {
        Ok(self
            .read()
            .docs
            .values()
            .filter(|doc| doc.keys().entity_type.as_deref() == Some(entity_type))
            .count() as u64)
    }

    fn list_types(&self) -> Result<Vec<String>> {
        let types: BTreeSet<String> = self
            .read()
            .docs
            .values()
            .filter_map(|doc| doc.keys().entity_type.clone())
            .collect();
        Ok(types.into_iter().collect())
    }

    fn clear(&self) -> Result<()> {
        *self.write() = Inner::default();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::MemoryStore;
    use crate::model::{Edge, EntityKeys, Node};
    use crate::store::{EntityStore, contract};

    #[test]
    fn memory_store_meets_contract() {
        contract::run_all(|| MemoryStore::<Node>::new("g/main/nodes"));
        contract::run_edges(|| MemoryStore::<Edge>::new("g/main/edges"));
    }

    #[test]
    fn first_writer_keeps_contested_identifier() {
        let store = MemoryStore::<Node>::new("g/main/nodes");
        store
            .store(&Node::new(EntityKeys::named("Person", "alice").with_uid("u1")))
            .expect("store");
        store
            .store(&Node::new(EntityKeys::named("Person", "bob").with_uid("u2")))
            .expect("store");

        // u2's document now also claims the name "alice"
        let claim = Node::new(
            EntityKeys::named("Person", "bob")
                .with_name("alice")
                .with_uid("u2"),
        );
        store.update(&claim).expect("update");

        let alice = store
            .get_by_name("Person", "alice")
            .expect("get")
            .expect("present");
        assert!(alice.keys.uids.contains("u1"));
        assert_eq!(store.count().expect("count"), 2);
    }

    #[test]
    fn collection_name_is_reported() {
        let store = MemoryStore::<Node>::new("g/main/nodes");
        assert_eq!(store.collection(), "g/main/nodes");
    }
}
