use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;

use super::backend::StorageBackend;
use crate::error::StoreError;

pub const CURRENT_MATCH_KEY: &str = "current_match";
pub const PREFERENCES_KEY: &str = "preferences";
pub const LIVE_SCORE_KEY: &str = "live_score";
pub const CAREER_KEY: &str = "career_stats";

const PREFIX: &str = "kv.";

/// Small typed JSON values, each independently settable and clearable
#[derive(Clone)]
pub struct KeyValueStore {
    backend: Arc<dyn StorageBackend>,
}

impl KeyValueStore {
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        Self { backend }
    }

    fn storage_key(key: &str) -> String {
        format!("{}{}", PREFIX, key)
    }

    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StoreError> {
        let storage_key = Self::storage_key(key);
        match self.backend.read(&storage_key)? {
            Some(json) => serde_json::from_str(&json)
                .map(Some)
                .map_err(|source| StoreError::Serialization {
                    key: storage_key,
                    source,
                }),
            None => Ok(None),
        }
    }

    pub fn set<T: Serialize>(&self, key: &str, value: &T) -> Result<(), StoreError> {
        let storage_key = Self::storage_key(key);
        let json = serde_json::to_string_pretty(value).map_err(|source| {
            StoreError::Serialization {
                key: storage_key.clone(),
                source,
            }
        })?;
        self.backend.write(&storage_key, &json)
    }

    pub fn clear(&self, key: &str) -> Result<(), StoreError> {
        self.backend.remove(&Self::storage_key(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::backend::MemoryBackend;

    #[test]
    fn test_typed_round_trip() {
        let kv = KeyValueStore::new(Arc::new(MemoryBackend::new()));
        assert_eq!(kv.get::<String>(CURRENT_MATCH_KEY).unwrap(), None);

        kv.set(CURRENT_MATCH_KEY, &"match_1".to_string()).unwrap();
        assert_eq!(
            kv.get::<String>(CURRENT_MATCH_KEY).unwrap().as_deref(),
            Some("match_1")
        );

        kv.clear(CURRENT_MATCH_KEY).unwrap();
        assert_eq!(kv.get::<String>(CURRENT_MATCH_KEY).unwrap(), None);
    }

    #[test]
    fn test_keys_are_namespaced() {
        let backend = Arc::new(MemoryBackend::new());
        let kv = KeyValueStore::new(backend.clone());
        kv.set(PREFERENCES_KEY, &vec![1, 2, 3]).unwrap();
        assert_eq!(backend.keys().unwrap(), vec!["kv.preferences".to_string()]);
    }

    #[test]
    fn test_wrong_shape_is_serialization_error() {
        let kv = KeyValueStore::new(Arc::new(MemoryBackend::new()));
        kv.set(LIVE_SCORE_KEY, &"not a number").unwrap();
        assert!(matches!(
            kv.get::<u32>(LIVE_SCORE_KEY),
            Err(StoreError::Serialization { .. })
        ));
    }
}
