//! Publishing manifests into the index
//!
//! Every manifest lands in the shared `all` collection and in the collection
//! for its kind, keyed by name in both. The two writes are independent: if
//! one fails the other is still attempted, and the first failure is
//! reported.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::warn;

use crate::error::SyncError;
use crate::index::{KeyValueStore, ALL, MANIFEST_COLLECTIONS};
use crate::manifest::Manifest;

#[derive(Clone)]
pub struct Publisher {
    index: Arc<dyn KeyValueStore>,
}

impl Publisher {
    pub fn new(index: Arc<dyn KeyValueStore>) -> Self {
        Self { index }
    }

    /// Write `manifest` under its name into `all` and into its kind's
    /// collection. Both writes are attempted even if the first fails.
    pub async fn publish(&self, manifest: &Manifest) -> Result<(), SyncError> {
        let document = manifest
            .to_document()
            .map_err(|e| SyncError::Parse {
                file: manifest.name.clone(),
                source: e,
            })?;

        let mut first_failure = None;
        for collection in [ALL, manifest.kind.collection()] {
            if let Err(e) = self
                .index
                .write(collection, &manifest.name, &document)
                .await
            {
                warn!(
                    "failed to publish '{}' to collection '{collection}': {e:#}",
                    manifest.name
                );
                first_failure.get_or_insert(SyncError::Publish {
                    name: manifest.name.clone(),
                    collection: collection.to_string(),
                    source: e,
                });
            }
        }

        match first_failure {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Drop every entry of one collection
    pub async fn clear(&self, collection: &str) -> Result<()> {
        self.index
            .delete_all(collection)
            .await
            .with_context(|| format!("failed to clear collection '{collection}'"))
    }

    /// Drop every manifest collection, leaving source registrations intact.
    /// Used when a source is removed so the next pass rebuilds the index
    /// from the sources that remain.
    pub async fn clear_manifests(&self) -> Result<()> {
        for collection in MANIFEST_COLLECTIONS {
            self.clear(collection).await?;
        }
        Ok(())
    }
}
