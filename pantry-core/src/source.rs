//! Git working copies
//!
//! Each source is mirrored into its own directory under the work dir, named
//! by the source fingerprint. Syncing shallow-clones on first contact and
//! pulls afterwards; a failed pull is tolerated so a pass can serve whatever
//! the working copy already holds.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::SyncError;
use crate::registry::Source;

/// Directory holding the working copy for `source`
pub fn working_copy_dir(work_dir: &Path, source: &Source) -> PathBuf {
    work_dir.join(source.fingerprint())
}

/// A single source's working copy on disk
pub struct GitSource {
    url: String,
    dir: PathBuf,
    pin: Option<String>,
}

impl GitSource {
    pub fn new(source: &Source, work_dir: &Path, pin: Option<String>) -> Self {
        Self {
            url: source.repo_url.clone(),
            dir: working_copy_dir(work_dir, source),
            pin,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Bring the working copy up to date: clone it if absent, otherwise pull.
    /// A pull failure keeps the current contents; a clone failure is fatal
    /// for this source. If a tag pin is configured and the repository has
    /// that tag, check it out.
    pub async fn sync(&self) -> Result<(), SyncError> {
        if self.dir.join(".git").is_dir() {
            if let Err(e) = self.pull().await {
                warn!("pull failed for {}, using current working copy: {e}", self.url);
            }
        } else {
            self.clone_shallow().await?;
        }

        if let Some(tag) = &self.pin {
            if let Err(e) = self.checkout_tag(tag).await {
                warn!("could not pin {} to tag '{tag}': {e}", self.url);
            }
        }
        Ok(())
    }

    /// Manifest candidates: regular `*.json` files in the working copy root,
    /// sorted by name. Subdirectories are not descended into.
    pub async fn manifest_files(&self) -> Result<Vec<PathBuf>, SyncError> {
        let io_err = |source| SyncError::WorkingCopy {
            path: self.dir.clone(),
            source,
        };

        let mut entries = tokio::fs::read_dir(&self.dir).await.map_err(io_err)?;
        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(io_err)? {
            if !entry.file_type().await.map_err(io_err)?.is_file() {
                continue;
            }
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }

    async fn clone_shallow(&self) -> Result<(), SyncError> {
        let io_err = |source| SyncError::WorkingCopy {
            path: self.dir.clone(),
            source,
        };

        // a leftover directory without .git would make the clone fail
        if self.dir.exists() {
            tokio::fs::remove_dir_all(&self.dir).await.map_err(io_err)?;
        }
        if let Some(parent) = self.dir.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
        }

        debug!("cloning {} into {}", self.url, self.dir.display());
        let mut cmd = Command::new("git");
        cmd.arg("clone")
            .arg("--depth")
            .arg("1")
            .arg("--")
            .arg(&self.url)
            .arg(&self.dir);
        self.run(cmd).await?;
        Ok(())
    }

    async fn pull(&self) -> Result<(), SyncError> {
        let mut cmd = Command::new("git");
        cmd.arg("pull").arg("--ff-only").current_dir(&self.dir);
        self.run(cmd).await?;
        Ok(())
    }

    /// Check out `refs/tags/<tag>` if the repository has that exact tag;
    /// otherwise stay on the default branch.
    async fn checkout_tag(&self, tag: &str) -> Result<(), SyncError> {
        let mut cmd = Command::new("git");
        cmd.arg("tag").arg("--list").current_dir(&self.dir);
        let tags = self.run(cmd).await?;

        if !tags.lines().any(|line| line.trim() == tag) {
            debug!(
                "tag '{tag}' not found in {}, staying on default branch",
                self.url
            );
            return Ok(());
        }

        let mut cmd = Command::new("git");
        cmd.arg("checkout")
            .arg("--quiet")
            .arg(format!("refs/tags/{tag}"))
            .current_dir(&self.dir);
        self.run(cmd).await?;
        Ok(())
    }

    async fn run(&self, mut cmd: Command) -> Result<String, SyncError> {
        let output = cmd
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| SyncError::Fetch {
                url: self.url.clone(),
                message: format!("failed to run git: {e}"),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let message = match stderr.trim() {
                "" => format!("git exited with {}", output.status),
                detail => detail.to_string(),
            };
            return Err(SyncError::Fetch {
                url: self.url.clone(),
                message,
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}
