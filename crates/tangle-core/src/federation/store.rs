use std::collections::BTreeSet;
use std::marker::PhantomData;

use super::{FederatedCursor, FederationSettings, resolve};
use crate::connection::{Collection, GraphConnection};
use crate::error::{GraphError, Result};
use crate::model::EntityKeys;
use crate::store::{Cursor, EntityStore};

/// Read-only [`EntityStore`] over several checkouts.
///
/// Lookups go through the fixpoint loop, iteration through a
/// [`FederatedCursor`], and counts are summed per store. Every write fails
/// with [`GraphError::ReadOnly`].
pub struct FederatedStore<D> {
    conns: Vec<GraphConnection>,
    settings: FederationSettings,
    label: String,
    _doc: PhantomData<fn() -> D>,
}

impl<D: Collection> FederatedStore<D> {
    #[must_use]
    pub fn new(conns: Vec<GraphConnection>, settings: FederationSettings) -> Self {
        let sources: Vec<String> = conns.iter().map(GraphConnection::label).collect();
        let label = format!("federated[{}]/{}s", sources.join(","), D::KIND);
        Self {
            conns,
            settings,
            label,
            _doc: PhantomData,
        }
    }

    #[must_use]
    pub fn connections(&self) -> &[GraphConnection] {
        &self.conns
    }

    #[must_use]
    pub const fn settings(&self) -> &FederationSettings {
        &self.settings
    }

    /// Streaming iteration without collecting.
    #[must_use]
    pub fn cursor(&self) -> FederatedCursor<'_, D> {
        FederatedCursor::new(&self.conns, self.settings)
    }

    fn sum(&self, count: impl Fn(&dyn EntityStore<D>) -> Result<u64>) -> Result<u64> {
        self.conns
            .iter()
            .map(|conn| count(D::store_of(conn)))
            .try_fold(0_u64, |total, n| Ok(total.saturating_add(n?)))
    }
}

impl<D> std::fmt::Debug for FederatedStore<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FederatedStore")
            .field("label", &self.label)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl<D: Collection> EntityStore<D> for FederatedStore<D> {
    fn collection(&self) -> &str {
        &self.label
    }

    fn store(&self, _doc: &D) -> Result<()> {
        Err(GraphError::ReadOnly { operation: "store" })
    }

    fn replace(&self, _current: &D, _doc: &D) -> Result<()> {
        Err(GraphError::ReadOnly { operation: "replace" })
    }

    fn update(&self, _doc: &D) -> Result<()> {
        Err(GraphError::ReadOnly { operation: "update" })
    }

    fn get_by_uid(&self, uid: &str) -> Result<Option<D>> {
        resolve(&self.conns, &EntityKeys::from_uid(uid), &self.settings)
    }

    fn get_by_name(&self, entity_type: &str, name: &str) -> Result<Option<D>> {
        resolve(&self.conns, &EntityKeys::named(entity_type, name), &self.settings)
    }

    fn delete_by_uid(&self, _uid: &str) -> Result<D> {
        Err(GraphError::ReadOnly {
            operation: "delete_by_uid",
        })
    }

    fn iterate_all(&self) -> Result<Cursor<D>> {
        self.cursor().collect::<Result<Vec<_>>>().map(Vec::into_iter)
    }

    fn iterate_by_type(
        &self,
        entity_type: &str,
        offset: usize,
        limit: Option<usize>,
    ) -> Result<Cursor<D>> {
        let cursor = FederatedCursor::of_type(&self.conns, self.settings, entity_type).skip(offset);
        let page: Vec<D> = match limit {
            Some(limit) => cursor.take(limit).collect::<Result<_>>()?,
            None => cursor.collect::<Result<_>>()?,
        };
        Ok(page.into_iter())
    }

    fn count(&self) -> Result<u64> {
        self.sum(|store| store.count())
    }

    fn count_by_type(&self, entity_type: &str) -> Result<u64> {
        self.sum(|store| store.count_by_type(entity_type))
    }

    fn list_types(&self) -> Result<Vec<String>> {
        let mut types = BTreeSet::new();
        for conn in &self.conns {
            types.extend(D::store_of(conn).list_types()?);
        }
        Ok(types.into_iter().collect())
    }

    fn clear(&self) -> Result<()> {
        Err(GraphError::ReadOnly { operation: "clear" })
    }

    fn get_by_key(&self, keys: &EntityKeys) -> Result<Option<D>> {
        resolve(&self.conns, keys, &self.settings)
    }

    fn find_all_by_key(&self, keys: &EntityKeys) -> Result<Vec<D>> {
        Ok(self.get_by_key(keys)?.into_iter().collect())
    }
}
