//! End-to-end reconciliation passes against real git repositories

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{init_test_logging, register_unchecked, registry_for, GitRemote};
use pantry_core::index::{KeyValueStore, MemoryIndex, ALL};
use pantry_core::publisher::Publisher;
use pantry_core::registry::{Source, SourceRegistry, DEFAULT_ALLOWED_HOSTS};
use pantry_core::sync::{Reconciler, Trigger};
use pretty_assertions::assert_eq;
use tempfile::TempDir;

fn reconciler_for(
    index: Arc<dyn KeyValueStore>,
    remote: &GitRemote,
    work: &TempDir,
    pin: Option<String>,
) -> Reconciler {
    let registry = registry_for(index.clone(), remote, work.path().to_path_buf());
    Reconciler::new(
        registry,
        Publisher::new(index),
        pin,
        Duration::from_secs(60),
        Arc::new(Trigger::new()),
    )
}

async fn published_version(index: &Arc<dyn KeyValueStore>, name: &str) -> String {
    let raw = index
        .read(ALL, name)
        .await
        .unwrap()
        .unwrap_or_else(|| panic!("'{name}' should be published"));
    let doc: serde_json::Value = serde_json::from_slice(&raw).unwrap();
    doc["version"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn a_pass_publishes_into_all_and_the_kind_collection() {
    init_test_logging();
    let remote = GitRemote::new();
    remote.write_manifest("cam.json", "cam", "app", "1.0");
    remote.commit("add cam");

    let index: Arc<dyn KeyValueStore> = Arc::new(MemoryIndex::new());
    let work = TempDir::new().unwrap();
    let reconciler = reconciler_for(index.clone(), &remote, &work, None);

    let summary = reconciler.pass().await.unwrap();
    assert_eq!(summary.sources_synced, 1);
    assert_eq!(summary.sources_failed, 0);
    assert_eq!(summary.manifests_published, 1);

    assert_eq!(index.list_keys(ALL).await.unwrap(), ["cam"]);
    assert_eq!(index.list_keys("apps").await.unwrap(), ["cam"]);
    assert!(index.list_keys("drivers").await.unwrap().is_empty());

    let in_all = index.read(ALL, "cam").await.unwrap().unwrap();
    let in_apps = index.read("apps", "cam").await.unwrap().unwrap();
    assert_eq!(in_all, in_apps);
}

#[tokio::test]
async fn a_broken_source_does_not_block_the_rest() {
    init_test_logging();
    let healthy = GitRemote::new();
    healthy.write_manifest("sensor.json", "sensor", "driver", "0.3");
    healthy.commit("add sensor");

    let index: Arc<dyn KeyValueStore> = Arc::new(MemoryIndex::new());
    let work = TempDir::new().unwrap();
    // the built-in source points nowhere; the registered one is fine
    let registry = SourceRegistry::new(
        index.clone(),
        Source::new("official", "/nonexistent/pantry-remote"),
        DEFAULT_ALLOWED_HOSTS.iter().map(|h| h.to_string()).collect(),
        work.path().to_path_buf(),
    );
    register_unchecked(&index, &Source::new("backup", healthy.url())).await;

    let reconciler = Reconciler::new(
        registry,
        Publisher::new(index.clone()),
        None,
        Duration::from_secs(60),
        Arc::new(Trigger::new()),
    );

    let summary = reconciler.pass().await.unwrap();
    assert_eq!(summary.sources_failed, 1);
    assert_eq!(summary.sources_synced, 1);
    assert_eq!(index.list_keys("drivers").await.unwrap(), ["sensor"]);
}

#[tokio::test]
async fn a_failing_registered_source_leaves_the_builtin_result_intact() {
    init_test_logging();
    let remote = GitRemote::new();
    remote.write_manifest("cam.json", "cam", "app", "1.0");
    remote.commit("add cam");

    let index: Arc<dyn KeyValueStore> = Arc::new(MemoryIndex::new());
    let work = TempDir::new().unwrap();
    let reconciler = reconciler_for(index.clone(), &remote, &work, None);
    register_unchecked(&index, &Source::new("ext", "/nonexistent/pantry-ext")).await;

    let summary = reconciler.pass().await.unwrap();
    assert_eq!(summary.sources_synced, 1);
    assert_eq!(summary.sources_failed, 1);

    assert_eq!(index.list_keys(ALL).await.unwrap(), ["cam"]);
    assert_eq!(index.list_keys("apps").await.unwrap(), ["cam"]);
    assert!(index.list_keys("drivers").await.unwrap().is_empty());
}

#[tokio::test]
async fn malformed_files_are_skipped_but_siblings_publish() {
    init_test_logging();
    let remote = GitRemote::new();
    remote.write_manifest("good.json", "good", "driver", "1.0");
    remote.write_file("broken.json", b"{ this is not json");
    remote.write_file("notes.txt", b"ignored entirely");
    remote.commit("mixed bag");

    let index: Arc<dyn KeyValueStore> = Arc::new(MemoryIndex::new());
    let work = TempDir::new().unwrap();
    let reconciler = reconciler_for(index.clone(), &remote, &work, None);

    let summary = reconciler.pass().await.unwrap();
    assert_eq!(summary.manifests_published, 1);
    assert_eq!(summary.files_skipped, 1);
    assert_eq!(index.list_keys(ALL).await.unwrap(), ["good"]);
}

#[tokio::test]
async fn later_sources_overwrite_duplicate_names() {
    init_test_logging();
    let first = GitRemote::new();
    first.write_manifest("cam.json", "cam", "app", "1");
    first.commit("v1");
    let second = GitRemote::new();
    second.write_manifest("cam.json", "cam", "app", "2");
    second.commit("v2");

    let index: Arc<dyn KeyValueStore> = Arc::new(MemoryIndex::new());
    let work = TempDir::new().unwrap();
    let reconciler = reconciler_for(index.clone(), &first, &work, None);
    register_unchecked(&index, &Source::new("override", second.url())).await;

    reconciler.pass().await.unwrap();

    // registered sources run after the built-in one, so theirs wins
    assert_eq!(published_version(&index, "cam").await, "2");
}

#[tokio::test]
async fn a_second_pass_pulls_new_commits() {
    init_test_logging();
    let remote = GitRemote::new();
    remote.write_manifest("cam.json", "cam", "app", "1.0");
    remote.commit("add cam");

    let index: Arc<dyn KeyValueStore> = Arc::new(MemoryIndex::new());
    let work = TempDir::new().unwrap();
    let reconciler = reconciler_for(index.clone(), &remote, &work, None);

    reconciler.pass().await.unwrap();
    assert_eq!(index.list_keys(ALL).await.unwrap(), ["cam"]);

    remote.write_manifest("door.json", "door", "driver", "0.1");
    remote.commit("add door");

    let summary = reconciler.pass().await.unwrap();
    assert_eq!(summary.sources_synced, 1);
    assert_eq!(index.list_keys(ALL).await.unwrap(), ["cam", "door"]);
}

#[tokio::test]
async fn an_unreachable_remote_serves_stale_data() {
    init_test_logging();
    let remote = GitRemote::new();
    remote.write_manifest("cam.json", "cam", "app", "1.0");
    remote.commit("add cam");

    let index: Arc<dyn KeyValueStore> = Arc::new(MemoryIndex::new());
    let work = TempDir::new().unwrap();
    let reconciler = reconciler_for(index.clone(), &remote, &work, None);

    reconciler.pass().await.unwrap();

    // the remote vanishes and the collections are wiped; the working copy
    // alone must bring the manifest back
    std::fs::remove_dir_all(remote.path()).unwrap();
    Publisher::new(index.clone()).clear_manifests().await.unwrap();
    assert!(index.list_keys(ALL).await.unwrap().is_empty());

    let summary = reconciler.pass().await.unwrap();
    assert_eq!(summary.sources_failed, 0);
    assert_eq!(summary.sources_synced, 1);
    assert_eq!(index.list_keys(ALL).await.unwrap(), ["cam"]);
}

#[tokio::test]
async fn a_tag_pin_checks_out_the_tagged_revision() {
    init_test_logging();
    let remote = GitRemote::new();
    remote.write_manifest("cam.json", "cam", "app", "1");
    remote.commit("v1");
    remote.tag("v1.0");
    remote.write_manifest("cam.json", "cam", "app", "2");
    remote.commit("v2");

    let index: Arc<dyn KeyValueStore> = Arc::new(MemoryIndex::new());
    let work = TempDir::new().unwrap();
    let reconciler = reconciler_for(index.clone(), &remote, &work, Some("v1.0".to_string()));

    reconciler.pass().await.unwrap();
    assert_eq!(published_version(&index, "cam").await, "1");
}

#[tokio::test]
async fn an_absent_tag_stays_on_the_default_branch() {
    init_test_logging();
    let remote = GitRemote::new();
    remote.write_manifest("cam.json", "cam", "app", "1");
    remote.commit("v1");
    remote.write_manifest("cam.json", "cam", "app", "2");
    remote.commit("v2");

    let index: Arc<dyn KeyValueStore> = Arc::new(MemoryIndex::new());
    let work = TempDir::new().unwrap();
    let reconciler = reconciler_for(index.clone(), &remote, &work, Some("v9.9".to_string()));

    let summary = reconciler.pass().await.unwrap();
    assert_eq!(summary.sources_failed, 0);
    assert_eq!(published_version(&index, "cam").await, "2");
}
