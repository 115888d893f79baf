//! The reconciliation loop
//!
//! One pass walks every registered source in order, refreshes its working
//! copy and republishes whatever parses. Passes run on a timer and whenever
//! the trigger fires; sources are isolated from each other, so one broken
//! repository never blocks the rest.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::sync::Notify;
use tracing::{debug, info, warn};

use crate::error::SyncError;
use crate::manifest::Manifest;
use crate::publisher::Publisher;
use crate::registry::{Source, SourceRegistry};
use crate::source::GitSource;

/// Wake-up handle for the loop. Wakes never block the caller and coalesce:
/// any number of wakes between two passes results in exactly one extra pass.
#[derive(Default)]
pub struct Trigger {
    notify: Notify,
}

impl Trigger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request a pass soon. Callable from any task, never blocks.
    pub fn wake(&self) {
        self.notify.notify_one();
    }

    /// Wait until someone has called `wake` since the last time this
    /// returned
    pub async fn woken(&self) {
        self.notify.notified().await;
    }
}

/// What one pass accomplished
#[derive(Debug, Default, PartialEq, Eq)]
pub struct PassSummary {
    pub sources_synced: usize,
    pub sources_failed: usize,
    pub manifests_published: usize,
    pub files_skipped: usize,
}

/// The polling loop itself
pub struct Reconciler {
    registry: SourceRegistry,
    publisher: Publisher,
    pin: Option<String>,
    interval: Duration,
    trigger: Arc<Trigger>,
}

impl Reconciler {
    pub fn new(
        registry: SourceRegistry,
        publisher: Publisher,
        pin: Option<String>,
        interval: Duration,
        trigger: Arc<Trigger>,
    ) -> Self {
        Self {
            registry,
            publisher,
            pin,
            interval,
            trigger,
        }
    }

    /// Run forever: one pass immediately, then one per interval tick or
    /// trigger wake, whichever comes first.
    pub async fn run(&self) {
        loop {
            match self.pass().await {
                Ok(summary) => info!(
                    "pass complete: {} sources synced, {} failed, {} manifests published, {} files skipped",
                    summary.sources_synced,
                    summary.sources_failed,
                    summary.manifests_published,
                    summary.files_skipped
                ),
                Err(e) => warn!("pass aborted: {e:#}"),
            }

            tokio::select! {
                _ = self.trigger.woken() => debug!("pass requested"),
                _ = tokio::time::sleep(self.interval) => {}
            }
        }
    }

    /// One reconciliation pass over the current source set
    pub async fn pass(&self) -> Result<PassSummary> {
        let sources = self.registry.list().await?;
        let mut summary = PassSummary::default();

        for source in &sources {
            match self.sync_source(source, &mut summary).await {
                Ok(()) => summary.sources_synced += 1,
                Err(e) => {
                    warn!("skipping source '{}': {e}", source.name);
                    summary.sources_failed += 1;
                }
            }
        }
        Ok(summary)
    }

    async fn sync_source(
        &self,
        source: &Source,
        summary: &mut PassSummary,
    ) -> Result<(), SyncError> {
        let git = GitSource::new(source, self.registry.work_dir(), self.pin.clone());
        git.sync().await?;

        for file in git.manifest_files().await? {
            let raw = match tokio::fs::read(&file).await {
                Ok(raw) => raw,
                Err(e) => {
                    warn!("skipping unreadable file {}: {e}", file.display());
                    summary.files_skipped += 1;
                    continue;
                }
            };

            let manifest = match parse_manifest(&file, &raw) {
                Ok(manifest) => manifest,
                Err(e) => {
                    warn!("{e}");
                    summary.files_skipped += 1;
                    continue;
                }
            };

            match self.publisher.publish(&manifest).await {
                Ok(()) => {
                    info!("adding '{}' from '{}'", manifest.name, source.name);
                    summary.manifests_published += 1;
                }
                // the publisher already logged which write failed
                Err(_) => summary.files_skipped += 1,
            }
        }
        Ok(())
    }
}

fn parse_manifest(file: &Path, raw: &[u8]) -> Result<Manifest, SyncError> {
    Manifest::parse(raw).map_err(|e| SyncError::Parse {
        file: display_name(file),
        source: e,
    })
}

fn display_name(file: &Path) -> String {
    file.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| file.display().to_string())
}
