//! In-memory index backend

use std::collections::{BTreeMap, HashMap};

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::RwLock;

use super::KeyValueStore;

/// In-memory `KeyValueStore`, used by the tests and for ephemeral runs.
/// Keys within a collection are kept sorted so listing order is stable.
#[derive(Default)]
pub struct MemoryIndex {
    collections: RwLock<HashMap<String, BTreeMap<String, Vec<u8>>>>,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for MemoryIndex {
    async fn write(&self, collection: &str, key: &str, value: &[u8]) -> Result<()> {
        let mut collections = self.collections.write().await;
        collections
            .entry(collection.to_string())
            .or_default()
            .insert(key.to_string(), value.to_vec());
        Ok(())
    }

    async fn read(&self, collection: &str, key: &str) -> Result<Option<Vec<u8>>> {
        let collections = self.collections.read().await;
        Ok(collections
            .get(collection)
            .and_then(|entries| entries.get(key))
            .cloned())
    }

    async fn list_keys(&self, collection: &str) -> Result<Vec<String>> {
        let collections = self.collections.read().await;
        Ok(collections
            .get(collection)
            .map(|entries| entries.keys().cloned().collect())
            .unwrap_or_default())
    }

    async fn delete(&self, collection: &str, key: &str) -> Result<()> {
        let mut collections = self.collections.write().await;
        if let Some(entries) = collections.get_mut(collection) {
            entries.remove(key);
        }
        Ok(())
    }

    async fn delete_all(&self, collection: &str) -> Result<()> {
        let mut collections = self.collections.write().await;
        collections.remove(collection);
        Ok(())
    }
}
