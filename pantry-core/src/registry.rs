//! Source registry - the durable set of repositories to poll
//!
//! A fixed built-in source is always present and cannot be removed; callers
//! register additional ones. Sources are keyed by a stable fingerprint of
//! their repository URL, so re-adding the same URL overwrites instead of
//! duplicating and every source gets its own working-copy directory.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};
use url::Url;

use crate::error::ValidationError;
use crate::index::{KeyValueStore, REGISTERED_SOURCES};

/// Display name of the built-in source
pub const BUILTIN_SOURCE_NAME: &str = "official";

/// Repository URL of the built-in source
pub const BUILTIN_SOURCE_URL: &str = "https://github.com/pantry-store/manifests";

/// Hosts registered sources may live on unless configured otherwise
pub const DEFAULT_ALLOWED_HOSTS: &[&str] = &["github.com"];

/// One repository source descriptor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Source {
    /// Display name
    pub name: String,

    /// Git repository URL
    pub repo_url: String,
}

impl Source {
    pub fn new(name: impl Into<String>, repo_url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            repo_url: repo_url.into(),
        }
    }

    /// Stable identity of this source: lowercase hex SHA-256 of the
    /// repository URL. Used as the index key under `registeredSources` and
    /// as the working-copy directory name.
    pub fn fingerprint(&self) -> String {
        hex::encode(Sha256::digest(self.repo_url.as_bytes()))
    }
}

/// The durable source set backed by the index
#[derive(Clone)]
pub struct SourceRegistry {
    index: Arc<dyn KeyValueStore>,
    builtin: Source,
    allowed_hosts: Vec<String>,
    work_dir: PathBuf,
}

impl SourceRegistry {
    pub fn new(
        index: Arc<dyn KeyValueStore>,
        builtin: Source,
        allowed_hosts: Vec<String>,
        work_dir: PathBuf,
    ) -> Self {
        Self {
            index,
            builtin,
            allowed_hosts,
            work_dir,
        }
    }

    /// The built-in source, always first in `list`
    pub fn builtin(&self) -> &Source {
        &self.builtin
    }

    /// Root directory holding the working copies
    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    /// All sources to poll: the built-in source first, then the registered
    /// ones in index key order. Descriptors that no longer decode are logged
    /// and skipped.
    pub async fn list(&self) -> Result<Vec<Source>> {
        let mut sources = vec![self.builtin.clone()];
        for key in self.index.list_keys(REGISTERED_SOURCES).await? {
            let Some(raw) = self.index.read(REGISTERED_SOURCES, &key).await? else {
                continue;
            };
            match serde_json::from_slice::<Source>(&raw) {
                Ok(source) => sources.push(source),
                Err(e) => warn!("skipping undecodable source descriptor {key}: {e}"),
            }
        }
        Ok(sources)
    }

    /// Check a descriptor against the registration rules: a non-empty name
    /// and a repository URL whose host is on the allow list
    pub fn validate(&self, source: &Source) -> Result<(), ValidationError> {
        if source.name.trim().is_empty() {
            return Err(ValidationError::EmptyName);
        }
        let parsed = Url::parse(&source.repo_url).map_err(|e| ValidationError::InvalidUrl {
            url: source.repo_url.clone(),
            source: e,
        })?;
        let Some(host) = parsed.host_str() else {
            return Err(ValidationError::MissingHost {
                url: source.repo_url.clone(),
            });
        };
        if !self
            .allowed_hosts
            .iter()
            .any(|allowed| allowed.eq_ignore_ascii_case(host))
        {
            return Err(ValidationError::HostNotAllowed {
                host: host.to_string(),
            });
        }
        Ok(())
    }

    /// Register a source. Re-adding the same URL overwrites the stored
    /// descriptor rather than duplicating the entry.
    pub async fn add(&self, source: &Source) -> Result<()> {
        self.validate(source)?;
        let descriptor =
            serde_json::to_vec(source).context("failed to serialize source descriptor")?;
        self.index
            .write(REGISTERED_SOURCES, &source.fingerprint(), &descriptor)
            .await?;
        debug!("registered source '{}' ({})", source.name, source.repo_url);
        Ok(())
    }

    /// Deregister a source and delete its working copy. Removal goes by
    /// fingerprint only, so descriptors that would no longer pass validation
    /// can still be cleaned up. Removing a source that was never registered
    /// is a no-op; removing the built-in source is refused.
    pub async fn remove(&self, source: &Source) -> Result<()> {
        if source.fingerprint() == self.builtin.fingerprint() {
            return Err(ValidationError::BuiltinSource.into());
        }

        let fingerprint = source.fingerprint();
        self.index.delete(REGISTERED_SOURCES, &fingerprint).await?;

        let working_copy = self.work_dir.join(&fingerprint);
        if working_copy.exists() {
            std::fs::remove_dir_all(&working_copy).with_context(|| {
                format!("failed to remove working copy {}", working_copy.display())
            })?;
        }
        debug!(
            "deregistered source '{}' ({})",
            source.name, source.repo_url
        );
        Ok(())
    }
}
