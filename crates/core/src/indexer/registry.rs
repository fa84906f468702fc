//! Lookup table of configured indexers.

use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::info;

use super::{build_indexer, Indexer, IndexerId, ProviderDefinition};

struct Entry {
    indexer: Arc<dyn Indexer>,
    enabled: bool,
}

/// Indexers keyed by id, iterated in id order.
#[derive(Default)]
pub struct IndexerRegistry {
    entries: RwLock<BTreeMap<IndexerId, Entry>>,
}

impl IndexerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build and register every definition.
    pub fn from_definitions(definitions: impl IntoIterator<Item = ProviderDefinition>) -> Self {
        let registry = Self::new();
        for definition in definitions {
            registry.insert(build_indexer(definition));
        }
        registry
    }

    /// Register an indexer, replacing any with the same id.
    pub fn insert(&self, indexer: Arc<dyn Indexer>) -> Option<Arc<dyn Indexer>> {
        let id = indexer.id();
        let enabled = indexer.definition().enabled;
        info!(
            indexer_id = id,
            indexer = %indexer.name(),
            implementation = indexer.definition().implementation.as_str(),
            enabled,
            "Registered indexer"
        );
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries
            .insert(id, Entry { indexer, enabled })
            .map(|old| old.indexer)
    }

    pub fn remove(&self, id: IndexerId) -> Option<Arc<dyn Indexer>> {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.remove(&id).map(|e| e.indexer)
    }

    /// Returns false when the id is unknown.
    pub fn set_enabled(&self, id: IndexerId, enabled: bool) -> bool {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        match entries.get_mut(&id) {
            Some(entry) => {
                entry.enabled = enabled;
                true
            }
            None => false,
        }
    }

    pub fn get(&self, id: IndexerId) -> Option<Arc<dyn Indexer>> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries.get(&id).map(|e| Arc::clone(&e.indexer))
    }

    pub fn is_enabled(&self, id: IndexerId) -> bool {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries.get(&id).map(|e| e.enabled).unwrap_or(false)
    }

    pub fn all(&self) -> Vec<Arc<dyn Indexer>> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries.values().map(|e| Arc::clone(&e.indexer)).collect()
    }

    pub fn enabled(&self) -> Vec<Arc<dyn Indexer>> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries
            .values()
            .filter(|e| e.enabled)
            .map(|e| Arc::clone(&e.indexer))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::fixtures;

    #[test]
    fn test_enabled_in_id_order() {
        let mut disabled = fixtures::jackett_definition(2, "two");
        disabled.enabled = false;
        let registry = IndexerRegistry::from_definitions(vec![
            fixtures::jackett_definition(5, "five"),
            disabled,
            fixtures::gazelle_definition(1, "one"),
        ]);

        assert_eq!(registry.len(), 3);
        let ids: Vec<_> = registry.enabled().iter().map(|i| i.id()).collect();
        assert_eq!(ids, vec![1, 5]);
        assert!(!registry.is_enabled(2));
    }

    #[test]
    fn test_set_enabled_and_remove() {
        let registry =
            IndexerRegistry::from_definitions(vec![fixtures::jackett_definition(1, "one")]);

        assert!(registry.set_enabled(1, false));
        assert!(registry.enabled().is_empty());
        assert!(!registry.set_enabled(42, true));

        assert!(registry.remove(1).is_some());
        assert!(registry.get(1).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_insert_replaces() {
        let registry = IndexerRegistry::new();
        assert!(registry
            .insert(build_indexer(fixtures::jackett_definition(1, "old")))
            .is_none());
        let old = registry
            .insert(build_indexer(fixtures::jackett_definition(1, "new")))
            .unwrap();
        assert_eq!(old.name(), "old");
        assert_eq!(registry.get(1).unwrap().name(), "new");
    }
}
