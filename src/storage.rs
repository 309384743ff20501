//! Definition storage for a single container
//!
//! Definitions are kept in registration order plus a `DashMap` index by
//! type and name. A key reached by a second definition turns into a
//! [`Entry::TooMany`] aggregate; nothing is ever overwritten, and the error
//! is only raised when someone asks for that key.

use crate::{ComponentDef, ComponentKey};
use ahash::RandomState;
use dashmap::DashMap;
use parking_lot::RwLock;
use std::sync::Arc;

/// What a key maps to.
#[derive(Clone)]
pub(crate) enum Entry {
    One(Arc<ComponentDef>),
    TooMany(Vec<Arc<ComponentDef>>),
}

impl Entry {
    /// Every definition behind the key, in registration order.
    pub(crate) fn definitions(&self) -> Vec<Arc<ComponentDef>> {
        match self {
            Entry::One(def) => vec![Arc::clone(def)],
            Entry::TooMany(defs) => defs.clone(),
        }
    }

    fn contains(&self, id: u64) -> bool {
        match self {
            Entry::One(def) => def.id() == id,
            Entry::TooMany(defs) => defs.iter().any(|def| def.id() == id),
        }
    }

    fn push(&mut self, def: Arc<ComponentDef>) {
        match self {
            Entry::One(existing) => {
                let first = Arc::clone(existing);
                *self = Entry::TooMany(vec![first, def]);
            }
            Entry::TooMany(defs) => defs.push(def),
        }
    }
}

/// Thread-safe definition storage.
pub(crate) struct DefinitionStorage {
    definitions: RwLock<Vec<Arc<ComponentDef>>>,
    index: DashMap<ComponentKey, Entry, RandomState>,
}

impl DefinitionStorage {
    /// Create empty storage.
    ///
    /// 8 shards: containers rarely hold more than a few dozen definitions,
    /// and the default of `num_cpus * 4` makes creation noticeably slower.
    #[inline]
    pub(crate) fn new() -> Self {
        Self {
            definitions: RwLock::new(Vec::new()),
            index: DashMap::with_capacity_and_hasher_and_shard_amount(0, RandomState::new(), 8),
        }
    }

    /// Append to the ordered definition list.
    pub(crate) fn push(&self, def: Arc<ComponentDef>) {
        self.definitions.write().push(def);
    }

    /// Index `def` under `key`. Returns true if the key is now ambiguous.
    pub(crate) fn index(&self, key: ComponentKey, def: &Arc<ComponentDef>) -> bool {
        let mut entry = self
            .index
            .entry(key)
            .or_insert_with(|| Entry::One(Arc::clone(def)));
        if !entry.contains(def.id()) {
            entry.push(Arc::clone(def));
        }
        matches!(*entry, Entry::TooMany(_))
    }

    #[inline]
    pub(crate) fn get(&self, key: &ComponentKey) -> Option<Entry> {
        self.index.get(key).map(|entry| entry.value().clone())
    }

    #[inline]
    pub(crate) fn contains(&self, key: &ComponentKey) -> bool {
        self.index.contains_key(key)
    }

    /// Definitions in registration order.
    pub(crate) fn definitions(&self) -> Vec<Arc<ComponentDef>> {
        self.definitions.read().clone()
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.definitions.read().len()
    }
}

impl std::fmt::Debug for DefinitionStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DefinitionStorage")
            .field("definitions", &self.len())
            .field("keys", &self.index.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TypeKey;

    fn named(name: &str) -> Arc<ComponentDef> {
        ComponentDef::builder()
            .component_type::<String>()
            .name(name)
            .build()
            .unwrap()
    }

    #[test]
    fn test_second_definition_makes_key_ambiguous() {
        let storage = DefinitionStorage::new();
        let a = named("a");
        let b = named("b");

        assert!(!storage.index(ComponentKey::of::<String>(), &a));
        assert!(storage.index(ComponentKey::of::<String>(), &b));

        match storage.get(&ComponentKey::of::<String>()) {
            Some(Entry::TooMany(defs)) => {
                assert_eq!(defs.len(), 2);
                assert_eq!(defs[0].id(), a.id());
                assert_eq!(defs[1].id(), b.id());
            }
            _ => panic!("expected an ambiguous entry"),
        }
    }

    #[test]
    fn test_indexing_same_definition_twice_is_harmless() {
        let storage = DefinitionStorage::new();
        let a = named("a");
        storage.index(ComponentKey::from("a"), &a);
        assert!(!storage.index(ComponentKey::from("a"), &a));
        assert!(matches!(storage.get(&ComponentKey::from("a")), Some(Entry::One(_))));
    }

    #[test]
    fn test_ambiguity_keeps_growing() {
        let storage = DefinitionStorage::new();
        for name in ["x", "y", "z"] {
            storage.index(ComponentKey::Type(TypeKey::of::<String>()), &named(name));
        }
        let entry = storage.get(&ComponentKey::of::<String>()).unwrap();
        assert_eq!(entry.definitions().len(), 3);
        assert!(storage.contains(&ComponentKey::of::<String>()));
        assert!(!storage.contains(&ComponentKey::from("x")));
    }
}
