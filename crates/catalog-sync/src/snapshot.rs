use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::entity::Entity;

/// A materialized catalog keyed by upstream `id`.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    entities: BTreeMap<String, Entity>,
    pub pages: usize,
    pub skipped: usize,
    pub duplicates: usize,
}

impl Snapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last write wins. Returns `true` when the id was already present.
    pub fn insert(&mut self, entity: Entity) -> bool {
        let replaced = self.entities.insert(entity.id.clone(), entity).is_some();
        if replaced {
            self.duplicates += 1;
        }
        replaced
    }

    pub fn get(&self, id: &str) -> Option<&Entity> {
        self.entities.get(id)
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.entities.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Entity> {
        self.entities.values()
    }

    pub fn into_entities(self) -> Vec<Entity> {
        self.entities.into_values().collect()
    }

    /// Changes needed to turn `previous` into `self`, matched on `id` only.
    pub fn diff(&self, previous: &Snapshot) -> CatalogDiff {
        let mut diff = CatalogDiff::default();

        for (id, entity) in &self.entities {
            match previous.entities.get(id) {
                None => diff.added.push(entity.clone()),
                Some(old) if old != entity => diff.updated.push(entity.clone()),
                Some(_) => {}
            }
        }

        diff.removed = previous
            .entities
            .keys()
            .filter(|id| !self.entities.contains_key(*id))
            .cloned()
            .collect();

        diff
    }
}

impl FromIterator<Entity> for Snapshot {
    fn from_iter<T: IntoIterator<Item = Entity>>(iter: T) -> Self {
        let mut snapshot = Snapshot::new();
        for entity in iter {
            snapshot.insert(entity);
        }
        snapshot
    }
}

impl Extend<Entity> for Snapshot {
    fn extend<T: IntoIterator<Item = Entity>>(&mut self, iter: T) {
        for entity in iter {
            self.insert(entity);
        }
    }
}

/// Incremental change set between two snapshots.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct CatalogDiff {
    pub added: Vec<Entity>,
    pub updated: Vec<Entity>,
    pub removed: Vec<String>,
}

impl CatalogDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.updated.is_empty() && self.removed.is_empty()
    }

    pub fn len(&self) -> usize {
        self.added.len() + self.updated.len() + self.removed.len()
    }
}
