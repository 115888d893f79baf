//! File-backed index backend
//!
//! One JSON document per collection at `<root>/<collection>.json`, holding
//! the flat key-to-document mapping. Every write replaces the collection
//! file atomically (temp file + rename), so a concurrent reader always sees
//! a well-formed snapshot even though there is no cross-process lock.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;

use super::KeyValueStore;

/// Durable `KeyValueStore` for the daemon
pub struct FileIndex {
    root: PathBuf,
    // Serializes read-modify-write cycles within this process.
    write_lock: Mutex<()>,
}

impl FileIndex {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)
            .with_context(|| format!("failed to create index directory {}", root.display()))?;
        Ok(Self {
            root,
            write_lock: Mutex::new(()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn collection_path(&self, collection: &str) -> PathBuf {
        self.root.join(format!("{collection}.json"))
    }

    fn load(&self, collection: &str) -> Result<BTreeMap<String, Value>> {
        let path = self.collection_path(collection);
        if !path.exists() {
            return Ok(BTreeMap::new());
        }
        let content = std::fs::read(&path)
            .with_context(|| format!("failed to read collection file {}", path.display()))?;
        serde_json::from_slice(&content)
            .with_context(|| format!("failed to parse collection file {}", path.display()))
    }

    fn store(&self, collection: &str, entries: &BTreeMap<String, Value>) -> Result<()> {
        let path = self.collection_path(collection);
        let mut file = tempfile::NamedTempFile::new_in(&self.root)
            .context("failed to create temporary collection file")?;
        serde_json::to_writer_pretty(&mut file, entries)
            .with_context(|| format!("failed to serialize collection '{collection}'"))?;
        file.persist(&path)
            .with_context(|| format!("failed to replace collection file {}", path.display()))?;
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for FileIndex {
    async fn write(&self, collection: &str, key: &str, value: &[u8]) -> Result<()> {
        let document: Value =
            serde_json::from_slice(value).context("index documents must be valid JSON")?;
        let _guard = self.write_lock.lock().await;
        let mut entries = self.load(collection)?;
        entries.insert(key.to_string(), document);
        self.store(collection, &entries)
    }

    async fn read(&self, collection: &str, key: &str) -> Result<Option<Vec<u8>>> {
        let entries = self.load(collection)?;
        entries
            .get(key)
            .map(serde_json::to_vec)
            .transpose()
            .context("failed to serialize index document")
    }

    async fn list_keys(&self, collection: &str) -> Result<Vec<String>> {
        Ok(self.load(collection)?.keys().cloned().collect())
    }

    async fn delete(&self, collection: &str, key: &str) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut entries = self.load(collection)?;
        if entries.remove(key).is_some() {
            self.store(collection, &entries)?;
        }
        Ok(())
    }

    async fn delete_all(&self, collection: &str) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let path = self.collection_path(collection);
        if path.exists() {
            std::fs::remove_file(&path)
                .with_context(|| format!("failed to remove collection file {}", path.display()))?;
        }
        Ok(())
    }
}
