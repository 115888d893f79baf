//! Boundary API
//!
//! `ManifestService` is the surface an adapter (CLI, or an HTTP layer in
//! front of it) calls into. Mutations validate first, then touch the index,
//! then wake the reconciliation loop; validation failures reject the request
//! with nothing written and stay downcastable so callers can map them to
//! client errors.

use std::sync::Arc;

use anyhow::Result;
use tracing::info;

use crate::error::ValidationError;
use crate::index::{KeyValueStore, ALL};
use crate::manifest::Manifest;
use crate::publisher::Publisher;
use crate::registry::{Source, SourceRegistry};
use crate::sync::Trigger;

#[derive(Clone)]
pub struct ManifestService {
    index: Arc<dyn KeyValueStore>,
    registry: SourceRegistry,
    publisher: Publisher,
    trigger: Arc<Trigger>,
}

impl ManifestService {
    pub fn new(
        index: Arc<dyn KeyValueStore>,
        registry: SourceRegistry,
        publisher: Publisher,
        trigger: Arc<Trigger>,
    ) -> Self {
        Self {
            index,
            registry,
            publisher,
            trigger,
        }
    }

    pub fn registry(&self) -> &SourceRegistry {
        &self.registry
    }

    /// Register a source and request a pass so its manifests appear without
    /// waiting for the next tick
    pub async fn add_store(&self, source: &Source) -> Result<()> {
        self.registry.add(source).await?;
        info!("added store '{}' ({})", source.name, source.repo_url);
        self.trigger.wake();
        Ok(())
    }

    /// Deregister a source, drop its working copy and clear the manifest
    /// collections; the next pass rebuilds them from the sources that remain
    pub async fn remove_store(&self, source: &Source) -> Result<()> {
        self.registry.remove(source).await?;
        self.publisher.clear_manifests().await?;
        info!("removed store '{}' ({})", source.name, source.repo_url);
        self.trigger.wake();
        Ok(())
    }

    /// Publish a manifest document directly, bypassing the fetch path.
    /// Malformed input is rejected with nothing written.
    pub async fn add_manifest(&self, raw: &[u8]) -> Result<Manifest> {
        let manifest =
            Manifest::parse(raw).map_err(ValidationError::MalformedManifest)?;
        self.publisher.publish(&manifest).await?;
        info!("published {} '{}' directly", manifest.kind, manifest.name);
        Ok(manifest)
    }

    /// Request a pass now. Never blocks; repeated requests while a pass runs
    /// coalesce into one follow-up pass.
    pub fn refresh_now(&self) {
        self.trigger.wake();
    }

    /// Current source set, built-in source first
    pub async fn sources(&self) -> Result<Vec<Source>> {
        self.registry.list().await
    }

    /// Names of every published manifest
    pub async fn manifest_names(&self) -> Result<Vec<String>> {
        self.index.list_keys(ALL).await
    }

    /// One published manifest by name, if present
    pub async fn manifest(&self, name: &str) -> Result<Option<Manifest>> {
        let Some(raw) = self.index.read(ALL, name).await? else {
            return Ok(None);
        };
        let manifest = Manifest::parse(&raw).map_err(ValidationError::MalformedManifest)?;
        Ok(Some(manifest))
    }
}
