use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::debug;

use super::backend::StorageBackend;
use super::models::Entity;
use crate::error::StoreError;

/// Keyed, write-through image of one entity collection
///
/// Reads are served from memory. Every mutation rewrites the whole
/// collection document before returning, so a successful call is durable.
pub struct Collection<T: Entity> {
    items: BTreeMap<String, T>,
    backend: Arc<dyn StorageBackend>,
}

impl<T: Entity> Collection<T> {
    /// Load the collection document, empty when the backend has none
    pub fn load(backend: Arc<dyn StorageBackend>) -> Result<Self, StoreError> {
        let items = match backend.read(T::COLLECTION)? {
            Some(json) => {
                let list: Vec<T> =
                    serde_json::from_str(&json).map_err(|source| StoreError::Serialization {
                        key: T::COLLECTION.to_string(),
                        source,
                    })?;
                list.into_iter()
                    .map(|item| (item.id().to_string(), item))
                    .collect()
            }
            None => BTreeMap::new(),
        };

        let collection = Self { items, backend };
        debug!(
            collection = T::COLLECTION,
            count = collection.count(),
            "Loaded collection"
        );
        Ok(collection)
    }

    /// Fresh collection that ignores anything already stored
    pub fn empty(backend: Arc<dyn StorageBackend>) -> Self {
        Self {
            items: BTreeMap::new(),
            backend,
        }
    }

    /// Write `items` as the collection document, then adopt it in memory
    ///
    /// A failed write leaves the in-memory image untouched.
    fn commit(&mut self, items: BTreeMap<String, T>) -> Result<(), StoreError> {
        let list: Vec<&T> = items.values().collect();
        let json =
            serde_json::to_string_pretty(&list).map_err(|source| StoreError::Serialization {
                key: T::COLLECTION.to_string(),
                source,
            })?;
        self.backend.write(T::COLLECTION, &json)?;
        self.items = items;
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<&T> {
        self.items.get(id)
    }

    /// Like `get`, failing with `NotFound`
    pub fn require(&self, id: &str) -> Result<&T, StoreError> {
        self.items
            .get(id)
            .ok_or_else(|| StoreError::not_found(T::KIND, id))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.items.contains_key(id)
    }

    pub fn all(&self) -> impl Iterator<Item = &T> {
        self.items.values()
    }

    pub fn filter(&self, mut predicate: impl FnMut(&T) -> bool) -> Vec<&T> {
        self.items.values().filter(|item| predicate(*item)).collect()
    }

    pub fn count(&self) -> usize {
        self.items.len()
    }

    /// Add a new item; ids are unique
    pub fn insert(&mut self, item: T) -> Result<(), StoreError> {
        if self.items.contains_key(item.id()) {
            return Err(StoreError::Invalid(format!(
                "{} {} already exists",
                T::KIND,
                item.id()
            )));
        }
        let mut next = self.items.clone();
        next.insert(item.id().to_string(), item);
        self.commit(next)
    }

    /// Full-record replace of an existing item
    pub fn replace(&mut self, item: T) -> Result<(), StoreError> {
        if !self.items.contains_key(item.id()) {
            return Err(StoreError::not_found(T::KIND, item.id()));
        }
        let mut next = self.items.clone();
        next.insert(item.id().to_string(), item);
        self.commit(next)
    }

    /// Replace several existing items with one write
    pub fn replace_many(&mut self, items: Vec<T>) -> Result<(), StoreError> {
        if items.is_empty() {
            return Ok(());
        }
        for item in &items {
            if !self.items.contains_key(item.id()) {
                return Err(StoreError::not_found(T::KIND, item.id()));
            }
        }
        let mut next = self.items.clone();
        for item in items {
            next.insert(item.id().to_string(), item);
        }
        self.commit(next)
    }

    pub fn remove(&mut self, id: &str) -> Result<T, StoreError> {
        let mut next = self.items.clone();
        let removed = next
            .remove(id)
            .ok_or_else(|| StoreError::not_found(T::KIND, id))?;
        self.commit(next)?;
        Ok(removed)
    }

    /// Remove every item matching `predicate`, returning how many went
    pub fn remove_where(&mut self, mut predicate: impl FnMut(&T) -> bool) -> Result<usize, StoreError> {
        let mut next = self.items.clone();
        next.retain(|_, item| !predicate(&*item));
        let removed = self.items.len() - next.len();
        if removed > 0 {
            self.commit(next)?;
        }
        Ok(removed)
    }

    pub fn clear(&mut self) -> Result<(), StoreError> {
        self.backend.remove(T::COLLECTION)?;
        self.items.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::backend::{FlakyBackend, MemoryBackend};
    use crate::store::models::{Player, PlayerRole};
    use chrono::Utc;

    fn player(id: &str, name: &str) -> Player {
        let now = Utc::now();
        Player {
            id: id.to_string(),
            name: name.to_string(),
            role: PlayerRole::Batsman,
            team_id: None,
            batting_stats: Default::default(),
            bowling_stats: Default::default(),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_write_through() {
        let backend: Arc<dyn StorageBackend> = Arc::new(MemoryBackend::new());
        let mut players = Collection::<Player>::load(backend.clone()).unwrap();
        players.insert(player("p1", "Alpha")).unwrap();
        players.insert(player("p2", "Beta")).unwrap();

        let reloaded = Collection::<Player>::load(backend).unwrap();
        assert_eq!(reloaded.count(), 2);
        assert_eq!(reloaded.get("p1"), players.get("p1"));
    }

    #[test]
    fn test_duplicate_insert_rejected() {
        let mut players = Collection::<Player>::load(Arc::new(MemoryBackend::new())).unwrap();
        players.insert(player("p1", "Alpha")).unwrap();
        assert!(matches!(
            players.insert(player("p1", "Again")),
            Err(StoreError::Invalid(_))
        ));
    }

    #[test]
    fn test_replace_missing_is_not_found() {
        let mut players = Collection::<Player>::load(Arc::new(MemoryBackend::new())).unwrap();
        let err = players.replace(player("ghost", "Ghost")).unwrap_err();
        assert!(err.is_not_found());
        assert!(players.remove("ghost").unwrap_err().is_not_found());
    }

    #[test]
    fn test_filter_and_remove_where() {
        let mut players = Collection::<Player>::load(Arc::new(MemoryBackend::new())).unwrap();
        players.insert(player("p1", "Alpha")).unwrap();
        players.insert(player("p2", "Beta")).unwrap();
        players.insert(player("p3", "Alpha Two")).unwrap();

        assert_eq!(players.filter(|p| p.name.starts_with("Alpha")).len(), 2);
        assert_eq!(players.remove_where(|p| p.name.starts_with("Alpha")).unwrap(), 2);
        assert_eq!(players.count(), 1);

        players.clear().unwrap();
        assert_eq!(players.count(), 0);
    }

    #[test]
    fn test_failed_write_leaves_memory_unchanged() {
        let backend = Arc::new(FlakyBackend::default());
        let mut players = Collection::<Player>::load(backend.clone()).unwrap();
        players.insert(player("p1", "Alpha")).unwrap();

        backend.fail_writes_to(Player::COLLECTION);
        assert!(players.insert(player("p2", "Beta")).is_err());
        assert!(!players.contains("p2"));

        assert!(players.replace(player("p1", "Renamed")).is_err());
        assert_eq!(players.get("p1").unwrap().name, "Alpha");
        assert!(players.remove("p1").is_err());
        assert_eq!(players.count(), 1);

        backend.recover();
        players.insert(player("p2", "Beta")).unwrap();
        let reloaded = Collection::<Player>::load(backend).unwrap();
        assert_eq!(reloaded.count(), 2);
    }
}
