//! The key-value index capability
//!
//! The engine publishes into an external key-value store organized as flat
//! collections of JSON documents. The store is an injected capability rather
//! than ambient state, so the daemon can run against different backends and
//! the tests against an in-memory one.

use anyhow::Result;
use async_trait::async_trait;

mod file;
mod memory;

pub use file::FileIndex;
pub use memory::MemoryIndex;

/// Catch-all collection holding every published manifest
pub const ALL: &str = "all";

/// Collection holding the registered source descriptors
pub const REGISTERED_SOURCES: &str = "registeredSources";

/// Collections that hold manifest documents. Clearing these (and nothing
/// else) is the source-removal cleanup.
pub const MANIFEST_COLLECTIONS: &[&str] = &[ALL, "apps", "drivers"];

/// Flat collection/key/document store the engine reads and publishes into
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Write a document under `key`, overwriting any existing value
    async fn write(&self, collection: &str, key: &str, value: &[u8]) -> Result<()>;

    /// Read the document under `key`, or `None` if absent
    async fn read(&self, collection: &str, key: &str) -> Result<Option<Vec<u8>>>;

    /// Every key in a collection, in stable sorted order
    async fn list_keys(&self, collection: &str) -> Result<Vec<String>>;

    /// Delete one key; deleting an absent key is not an error
    async fn delete(&self, collection: &str, key: &str) -> Result<()>;

    /// Delete every key in a collection
    async fn delete_all(&self, collection: &str) -> Result<()>;
}
