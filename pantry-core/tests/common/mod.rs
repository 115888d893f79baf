//! Shared fixtures for integration tests
#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::{Arc, Once};

use pantry_core::index::{KeyValueStore, REGISTERED_SOURCES};
use pantry_core::registry::{Source, SourceRegistry, DEFAULT_ALLOWED_HOSTS};
use tempfile::TempDir;

static INIT: Once = Once::new();

/// Initialize tracing once for the whole test binary. Respects `RUST_LOG`
/// when set.
pub fn init_test_logging() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "pantry_core=debug".into()),
            )
            .with_test_writer()
            .try_init();
    });
}

/// A local git repository standing in for a remote manifest source
pub struct GitRemote {
    dir: TempDir,
}

impl GitRemote {
    pub fn new() -> Self {
        let dir = TempDir::new().expect("temp dir");
        git(dir.path(), &["init", "--quiet"]);
        git(dir.path(), &["config", "user.name", "pantry-tests"]);
        git(dir.path(), &["config", "user.email", "tests@pantry.invalid"]);
        Self { dir }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// The "URL" a source descriptor carries for this remote
    pub fn url(&self) -> String {
        self.dir.path().display().to_string()
    }

    pub fn write_manifest(&self, file: &str, name: &str, kind: &str, version: &str) {
        let body = format!(r#"{{"name":"{name}","type":"{kind}","version":"{version}"}}"#);
        self.write_file(file, body.as_bytes());
    }

    pub fn write_file(&self, file: &str, contents: &[u8]) {
        std::fs::write(self.dir.path().join(file), contents).expect("write fixture file");
    }

    pub fn commit(&self, message: &str) {
        git(self.dir.path(), &["add", "-A"]);
        git(self.dir.path(), &["commit", "--quiet", "-m", message]);
    }

    pub fn tag(&self, name: &str) {
        git(self.dir.path(), &["tag", name]);
    }
}

fn git(dir: &Path, args: &[&str]) {
    let output = std::process::Command::new("git")
        .arg("-C")
        .arg(dir)
        .args(args)
        .output()
        .expect("git should be runnable");
    assert!(
        output.status.success(),
        "git {args:?} failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
}

/// Registry whose built-in source points at `remote`, working copies under
/// `work_dir`
pub fn registry_for(
    index: Arc<dyn KeyValueStore>,
    remote: &GitRemote,
    work_dir: PathBuf,
) -> SourceRegistry {
    SourceRegistry::new(
        index,
        Source::new("official", remote.url()),
        DEFAULT_ALLOWED_HOSTS.iter().map(|h| h.to_string()).collect(),
        work_dir,
    )
}

/// Store a source descriptor directly, sidestepping host validation so
/// fixtures can use local paths as repository URLs
pub async fn register_unchecked(index: &Arc<dyn KeyValueStore>, source: &Source) {
    let descriptor = serde_json::to_vec(source).expect("serialize source");
    index
        .write(REGISTERED_SOURCES, &source.fingerprint(), &descriptor)
        .await
        .expect("write source descriptor");
}
