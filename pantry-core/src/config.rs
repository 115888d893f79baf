//! Service settings
//!
//! Settings load from an optional YAML file; a missing file means pure
//! defaults, and every field can be set on its own. The CLI overlays its
//! flags on top of whatever loaded.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::registry::{BUILTIN_SOURCE_NAME, BUILTIN_SOURCE_URL, DEFAULT_ALLOWED_HOSTS, Source};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncSettings {
    /// Display name of the built-in source
    pub source_name: String,

    /// Repository URL of the built-in source
    pub source_url: String,

    /// Directory holding the git working copies
    pub work_dir: PathBuf,

    /// Directory holding the index collections
    pub data_dir: PathBuf,

    /// Seconds between reconciliation passes
    pub interval_secs: u64,

    /// Tag to pin every working copy to, if the repository has it
    pub tag: Option<String>,

    /// Hosts registered sources may live on
    pub allowed_hosts: Vec<String>,
}

impl Default for SyncSettings {
    fn default() -> Self {
        let base = default_base_dir();
        Self {
            source_name: BUILTIN_SOURCE_NAME.to_string(),
            source_url: BUILTIN_SOURCE_URL.to_string(),
            work_dir: base.join("working-copies"),
            data_dir: base.join("index"),
            interval_secs: 60,
            tag: None,
            allowed_hosts: DEFAULT_ALLOWED_HOSTS.iter().map(|h| h.to_string()).collect(),
        }
    }
}

impl SyncSettings {
    /// Load settings from `path`. A missing file is not an error; it yields
    /// the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read settings file {}", path.display()))?;
        serde_yaml_ng::from_str(&raw)
            .with_context(|| format!("failed to parse settings file {}", path.display()))
    }

    pub fn builtin_source(&self) -> Source {
        Source::new(self.source_name.clone(), self.source_url.clone())
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

/// Platform data directory for this service, with fallbacks for platforms
/// where the standard lookup has nothing to offer
pub fn default_base_dir() -> PathBuf {
    if let Some(dirs) = directories::ProjectDirs::from("io", "pantry", "pantry") {
        return dirs.data_dir().to_path_buf();
    }
    if let Some(data) = dirs::data_dir() {
        return data.join("pantry");
    }
    PathBuf::from(".pantry")
}
