//! Entity store contract and its implementations.
//!
//! A store holds the current documents of one collection (the nodes, or the
//! edges, of one graph checkout). Documents are addressable by any of their
//! uids or by any (type, name) pair they carry.

pub mod edges;
pub mod memory;
pub mod sqlite;

use std::collections::BTreeSet;

use crate::error::{GraphError, Result};
use crate::model::{EntityKeys, GraphEntity};

pub use edges::{Direction, EdgeStoreExt};
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// Finite, ordered result set.
pub type Cursor<D> = std::vec::IntoIter<D>;

/// Collection name for one kind of document in a checkout.
#[must_use]
pub fn collection_name(graph: &str, branch: &str, plural: &str) -> String {
    format!("{graph}/{branch}/{plural}")
}

/// Storage contract used by the log player and federation layer.
///
/// Required methods are the primitive reads and writes; lookups by sets of
/// identifiers and by whole keysets are provided on top of them.
pub trait EntityStore<D: GraphEntity>: Send + Sync {
    /// Name of the collection this store serves.
    fn collection(&self) -> &str;

    /// Insert a new document.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::Conflict`] if any of its identifiers is already
    /// indexed, or [`GraphError::Store`] on I/O failure.
    fn store(&self, doc: &D) -> Result<()>;

    /// Replace `current`, a document as read from this store, with `doc` and
    /// re-index it under `doc`'s identifiers.
    ///
    /// The slot written is the one that holds exactly `current`. An
    /// identifier of `current` that is still indexed to another document
    /// never redirects the write.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::NotFound`] if no slot holds `current` any more.
    fn replace(&self, current: &D, doc: &D) -> Result<()>;

    /// # Errors
    ///
    /// Returns [`GraphError::Store`] on I/O or decode failure.
    fn get_by_uid(&self, uid: &str) -> Result<Option<D>>;

    /// # Errors
    ///
    /// Returns [`GraphError::Store`] on I/O or decode failure.
    fn get_by_name(&self, entity_type: &str, name: &str) -> Result<Option<D>>;

    /// Remove the document carrying `uid` and return it.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::NotFound`] if no document carries `uid`.
    fn delete_by_uid(&self, uid: &str) -> Result<D>;

    /// Every document in insertion order.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::Store`] on I/O or decode failure.
    fn iterate_all(&self) -> Result<Cursor<D>>;

    /// Documents of one type in insertion order, skipping `offset` and
    /// returning at most `limit`.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::Store`] on I/O or decode failure.
    fn iterate_by_type(
        &self,
        entity_type: &str,
        offset: usize,
        limit: Option<usize>,
    ) -> Result<Cursor<D>>;

    /// # Errors
    ///
    /// Returns [`GraphError::Store`] on I/O failure.
    fn count(&self) -> Result<u64>;

    /// # Errors
    ///
    /// Returns [`GraphError::Store`] on I/O failure.
    fn count_by_type(&self, entity_type: &str) -> Result<u64>;

    /// Distinct types present, sorted.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::Store`] on I/O failure.
    fn list_types(&self) -> Result<Vec<String>>;

    /// Remove every document from the collection.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::Store`] on I/O failure.
    fn clear(&self) -> Result<()>;

    // -- provided ----------------------------------------------------------

    /// Full replace of the document `doc`'s keys resolve to.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::NotFound`] if nothing resolves.
    fn update(&self, doc: &D) -> Result<()> {
        let Some(current) = self.get_by_key(doc.keys())? else {
            return Err(GraphError::not_found(format!(
                "{} {} in {}",
                D::KIND,
                doc.keys(),
                self.collection()
            )));
        };
        self.replace(&current, doc)
    }

    /// # Errors
    ///
    /// See [`get_by_uid`](Self::get_by_uid).
    fn exists_by_uid(&self, uid: &str) -> Result<bool> {
        Ok(self.get_by_uid(uid)?.is_some())
    }

    /// # Errors
    ///
    /// See [`get_by_name`](Self::get_by_name).
    fn exists_by_name(&self, entity_type: &str, name: &str) -> Result<bool> {
        Ok(self.get_by_name(entity_type, name)?.is_some())
    }

    /// First document matching any uid, in set order.
    ///
    /// # Errors
    ///
    /// See [`get_by_uid`](Self::get_by_uid).
    fn get_by_any_uid(&self, uids: &BTreeSet<String>) -> Result<Option<D>> {
        for uid in uids {
            if let Some(doc) = self.get_by_uid(uid)? {
                return Ok(Some(doc));
            }
        }
        Ok(None)
    }

    /// # Errors
    ///
    /// See [`get_by_uid`](Self::get_by_uid).
    fn exists_by_any_uid(&self, uids: &BTreeSet<String>) -> Result<bool> {
        Ok(self.get_by_any_uid(uids)?.is_some())
    }

    /// First document matching any name under `entity_type`, in set order.
    ///
    /// # Errors
    ///
    /// See [`get_by_name`](Self::get_by_name).
    fn get_by_any_name(&self, entity_type: &str, names: &BTreeSet<String>) -> Result<Option<D>> {
        for name in names {
            if let Some(doc) = self.get_by_name(entity_type, name)? {
                return Ok(Some(doc));
            }
        }
        Ok(None)
    }

    /// # Errors
    ///
    /// See [`get_by_name`](Self::get_by_name).
    fn exists_by_any_name(&self, entity_type: &str, names: &BTreeSet<String>) -> Result<bool> {
        Ok(self.get_by_any_name(entity_type, names)?.is_some())
    }

    /// Resolve a keyset: uids first, then (type, name) pairs.
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    fn get_by_key(&self, keys: &EntityKeys) -> Result<Option<D>> {
        if let Some(doc) = self.get_by_any_uid(&keys.uids)? {
            return Ok(Some(doc));
        }
        match &keys.entity_type {
            Some(entity_type) => self.get_by_any_name(entity_type, &keys.names),
            None => Ok(None),
        }
    }

    /// # Errors
    ///
    /// Propagates store failures.
    fn exists_by_key(&self, keys: &EntityKeys) -> Result<bool> {
        Ok(self.get_by_key(keys)?.is_some())
    }

    /// Every distinct document that any identifier of `keys` resolves to.
    ///
    /// Usually zero or one document; more than one means the keyset bridges
    /// entities this store still keeps apart.
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    fn find_all_by_key(&self, keys: &EntityKeys) -> Result<Vec<D>> {
        let mut found: Vec<D> = Vec::new();
        let mut push = |doc: D| {
            if !found.iter().any(|seen| seen.keys() == doc.keys()) {
                found.push(doc);
            }
        };
        for uid in &keys.uids {
            if let Some(doc) = self.get_by_uid(uid)? {
                push(doc);
            }
        }
        if let Some(entity_type) = &keys.entity_type {
            for name in &keys.names {
                if let Some(doc) = self.get_by_name(entity_type, name)? {
                    push(doc);
                }
            }
        }
        Ok(found)
    }

    /// Set one property on the document named `(entity_type, name)` and
    /// return the updated document.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::NotFound`] if no such document exists; it is
    /// never created implicitly.
    fn set_property_by_name(
        &self,
        entity_type: &str,
        name: &str,
        property: &str,
        value: serde_json::Value,
    ) -> Result<D> {
        let Some(doc) = self.get_by_name(entity_type, name)? else {
            return Err(GraphError::not_found(format!(
                "{} {entity_type}/{name} in {}",
                D::KIND,
                self.collection()
            )));
        };
        let mut fields = doc.fields().clone();
        fields.insert(property.to_string(), value);
        let updated = doc.clone().with_fields(fields);
        updated.check_reserved_fields()?;
        self.replace(&doc, &updated)?;
        Ok(updated)
    }
}

#[cfg(test)]
pub(crate) mod contract {
    //! Behaviour every [`EntityStore`] implementation must share. Each
    //! backend's test module runs these against a fresh store.

    use super::{Direction, EdgeStoreExt, EntityStore};
    use crate::error::{ErrorCode, GraphError};
    use crate::model::{Edge, EntityKeys, GraphEntity, Node};
    use serde_json::json;

    fn person(uid: &str, name: &str) -> Node {
        Node::new(EntityKeys::named("Person", name).with_uid(uid))
    }

    pub fn store_and_lookup(store: &dyn EntityStore<Node>) {
        store.store(&person("u1", "alice")).expect("store");
        assert!(store.exists_by_uid("u1").expect("exists"));
        assert!(store.exists_by_name("Person", "alice").expect("exists"));
        assert!(!store.exists_by_name("City", "alice").expect("exists"));
        let by_key = store
            .get_by_key(&EntityKeys::named("Person", "alice"))
            .expect("get")
            .expect("present");
        assert!(by_key.keys.uids.contains("u1"));
    }

    pub fn duplicate_store_conflicts(store: &dyn EntityStore<Node>) {
        store.store(&person("u1", "alice")).expect("store");
        let err = store.store(&person("u2", "alice")).expect_err("name taken");
        assert_eq!(err.code(), ErrorCode::MergeConflict);
        let GraphError::Conflict { existing, incoming, .. } = err else {
            panic!("expected a conflict");
        };
        assert_eq!(existing, person("u1", "alice").keys);
        assert_eq!(incoming, person("u2", "alice").keys);
    }

    pub fn update_reindexes(store: &dyn EntityStore<Node>) {
        store.store(&person("u1", "alice")).expect("store");
        let renamed = Node::new(
            EntityKeys::named("Person", "alice")
                .with_name("alicia")
                .with_uid("u1")
                .with_uid("u7"),
        )
        .with_field("age", json!(31));
        store.update(&renamed).expect("update");

        let via_new_uid = store.get_by_uid("u7").expect("get").expect("present");
        assert_eq!(via_new_uid.fields["age"], json!(31));
        assert!(store.exists_by_name("Person", "alicia").expect("exists"));
        assert_eq!(store.count().expect("count"), 1);
    }

    pub fn replace_targets_the_given_document(store: &dyn EntityStore<Node>) {
        store.store(&person("u1", "alice")).expect("store");
        store.store(&person("u0", "bob")).expect("store");
        // the merged keyset also carries bob's uid, which sorts first
        let merged = Node::new(EntityKeys::named("Person", "alice").with_uid("u1").with_uid("u0"))
            .with_field("merged", json!(true));
        let alice = store.get_by_uid("u1").expect("get").expect("present");
        store.replace(&alice, &merged).expect("replace");

        let bob = store.get_by_name("Person", "bob").expect("get").expect("present");
        assert!(!bob.fields.contains_key("merged"));
        let alice = store.get_by_name("Person", "alice").expect("get").expect("present");
        assert_eq!(alice.fields["merged"], json!(true));
        assert_eq!(store.count().expect("count"), 2);
    }

    pub fn write_back_after_bridging_merge_keeps_other_documents(store: &dyn EntityStore<Node>) {
        store.store(&person("u2", "alice")).expect("store");
        store.store(&person("u1", "bob")).expect("store");

        // alice picks up u1, which stays indexed to bob
        let alice = store.get_by_name("Person", "alice").expect("get").expect("present");
        let bridged = alice.clone().with_keys(alice.keys.clone().with_uid("u1"));
        store.replace(&alice, &bridged).expect("replace");

        // the second write-back starts from a keyset whose first uid is bob's
        let alice = store.get_by_name("Person", "alice").expect("get").expect("present");
        assert_eq!(alice, bridged);
        let updated = alice.clone().with_field("x", json!(1));
        store.replace(&alice, &updated).expect("replace");

        let bob = store.get_by_name("Person", "bob").expect("get").expect("bob kept");
        assert_eq!(bob, person("u1", "bob"));
        let alice = store.get_by_name("Person", "alice").expect("get").expect("present");
        assert_eq!(alice.fields["x"], json!(1));
        assert_eq!(store.count().expect("count"), 2);
    }

    pub fn stale_replace_is_not_found(store: &dyn EntityStore<Node>) {
        store.store(&person("u1", "alice")).expect("store");
        let stale = store.get_by_uid("u1").expect("get").expect("present");
        store
            .replace(&stale, &stale.clone().with_field("age", json!(1)))
            .expect("replace");
        let err = store
            .replace(&stale, &stale.clone().with_field("age", json!(2)))
            .expect_err("already replaced");
        assert_eq!(err.code(), ErrorCode::EntityNotFound);
    }

    pub fn update_missing_is_not_found(store: &dyn EntityStore<Node>) {
        let err = store.update(&person("nope", "nobody")).expect_err("missing");
        assert_eq!(err.code(), ErrorCode::EntityNotFound);
    }

    pub fn delete_returns_document(store: &dyn EntityStore<Node>) {
        store.store(&person("u1", "alice")).expect("store");
        let deleted = store.delete_by_uid("u1").expect("delete");
        assert!(deleted.keys.names.contains("alice"));
        assert!(!store.exists_by_name("Person", "alice").expect("exists"));
        let err = store.delete_by_uid("u1").expect_err("already gone");
        assert_eq!(err.code(), ErrorCode::EntityNotFound);
    }

    pub fn iteration_and_counts(store: &dyn EntityStore<Node>) {
        store.store(&person("p1", "a")).expect("store");
        store
            .store(&Node::new(EntityKeys::named("City", "york").with_uid("c1")))
            .expect("store");
        store.store(&person("p2", "b")).expect("store");
        store.store(&person("p3", "c")).expect("store");

        let uids: Vec<String> = store
            .iterate_all()
            .expect("iterate")
            .map(|n| n.keys.uids.into_iter().next().unwrap_or_default())
            .collect();
        assert_eq!(uids, vec!["p1", "c1", "p2", "p3"]);

        let page: Vec<Node> = store
            .iterate_by_type("Person", 1, Some(1))
            .expect("page")
            .collect();
        assert_eq!(page.len(), 1);
        assert!(page[0].keys.uids.contains("p2"));

        assert_eq!(store.count().expect("count"), 4);
        assert_eq!(store.count_by_type("Person").expect("count"), 3);
        assert_eq!(store.list_types().expect("types"), vec!["City", "Person"]);

        store.clear().expect("clear");
        assert_eq!(store.count().expect("count"), 0);
        assert!(!store.exists_by_uid("p1").expect("exists"));
    }

    pub fn find_all_by_key_reports_every_match(store: &dyn EntityStore<Node>) {
        store.store(&person("u1", "alice")).expect("store");
        store.store(&person("u2", "bob")).expect("store");
        let bridge = EntityKeys::named("Person", "bob").with_uid("u1");
        let found = store.find_all_by_key(&bridge).expect("find");
        assert_eq!(found.len(), 2);
    }

    pub fn set_property_requires_existing(store: &dyn EntityStore<Node>) {
        let err = store
            .set_property_by_name("Person", "ghost", "age", json!(1))
            .expect_err("absent");
        assert_eq!(err.code(), ErrorCode::EntityNotFound);

        store.store(&person("u1", "alice")).expect("store");
        let updated = store
            .set_property_by_name("Person", "alice", "age", json!(30))
            .expect("set");
        assert_eq!(updated.fields["age"], json!(30));
        let stored = store.get_by_uid("u1").expect("get").expect("present");
        assert_eq!(stored.fields["age"], json!(30));
    }

    /// Run every contract check, each against a fresh store from `make`.
    pub fn run_all<S: EntityStore<Node>>(make: impl Fn() -> S) {
        store_and_lookup(&make());
        duplicate_store_conflicts(&make());
        update_reindexes(&make());
        replace_targets_the_given_document(&make());
        write_back_after_bridging_merge_keeps_other_documents(&make());
        stale_replace_is_not_found(&make());
        update_missing_is_not_found(&make());
        delete_returns_document(&make());
        iteration_and_counts(&make());
        find_all_by_key_reports_every_match(&make());
        set_property_requires_existing(&make());
    }

    fn edge(uid: &str, edge_type: &str, from: EntityKeys, to: EntityKeys) -> Edge {
        Edge::new(EntityKeys::typed(edge_type).with_uid(uid), from, to)
    }

    pub fn edges_are_found_by_endpoint(store: &dyn EntityStore<Edge>) {
        let alice = EntityKeys::named("Person", "alice").with_uid("p1");
        let bob = EntityKeys::named("Person", "bob").with_uid("p2");
        let york = EntityKeys::named("City", "york").with_uid("c1");
        store.store(&edge("e1", "knows", alice.clone(), bob.clone())).expect("store");
        store.store(&edge("e2", "lives_in", alice.clone(), york.clone())).expect("store");
        store.store(&edge("e3", "knows", bob.clone(), alice.clone())).expect("store");
        store.store(&edge("e4", "knows", alice.clone(), bob.clone())).expect("store");

        let uids = |edges: Vec<Edge>| -> Vec<String> {
            edges
                .into_iter()
                .flat_map(|e| e.keys.uids.into_iter())
                .collect()
        };

        // any single identifier of the node is enough
        let outgoing = store
            .iterate_edges_from_node(&EntityKeys::from_uid("p1"))
            .expect("from");
        assert_eq!(uids(outgoing.collect()), vec!["e1", "e2", "e4"]);
        let incoming = store
            .iterate_edges_to_node(&EntityKeys::named("Person", "alice"))
            .expect("to");
        assert_eq!(uids(incoming.collect()), vec!["e3"]);
        let between = store.iterate_edges_between_nodes(&alice, &bob).expect("between");
        assert_eq!(uids(between.collect()), vec!["e1", "e4"]);
        assert!(store.iterate_edges_between_nodes(&york, &alice).expect("between").next().is_none());

        assert!(store.exists_edge_to_node_of_type(&alice, "City").expect("exists"));
        assert!(!store.exists_edge_to_node_of_type(&bob, "City").expect("exists"));

        assert_eq!(store.count_edges_from_node(&alice).expect("count"), 3);
        assert_eq!(store.count_edges_to_node(&york).expect("count"), 1);
        assert_eq!(store.count_edges_of_type_from_node("knows", &alice).expect("count"), 2);
        assert_eq!(store.count_edges_of_type_to_node("knows", &alice).expect("count"), 1);

        let by_type = store.count_edges_by_type_from_node(&alice).expect("count");
        assert_eq!(by_type.get("knows"), Some(&2));
        assert_eq!(by_type.get("lives_in"), Some(&1));
        assert_eq!(by_type.len(), 2);
        assert!(store.count_edges_by_type_to_node(&york).expect("count").contains_key("lives_in"));
        assert!(store.edges_of(&EntityKeys::from_uid("nobody"), Direction::Incoming).expect("edges").is_empty());

        // a name under another type is a different node
        assert_eq!(
            store.count_edges_from_node(&EntityKeys::named("City", "alice")).expect("count"),
            0
        );
    }

    /// Run the edge-specific checks against a fresh edge store.
    pub fn run_edges<S: EntityStore<Edge>>(make: impl Fn() -> S) {
        edges_are_found_by_endpoint(&make());
    }
}
