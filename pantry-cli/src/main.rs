//! Pantry - a git-backed manifest index for apps and drivers
//!
//! Runs the reconciliation daemon and offers one-shot management commands
//! against the same on-disk index.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use tabled::{
    settings::{object::Rows, Alignment, Modify, Style},
    Table, Tabled,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

use pantry_core::config::{default_base_dir, SyncSettings};
use pantry_core::index::{FileIndex, KeyValueStore};
use pantry_core::publisher::Publisher;
use pantry_core::registry::{Source, SourceRegistry};
use pantry_core::service::ManifestService;
use pantry_core::sync::{Reconciler, Trigger};

/// Log levels
#[derive(Debug, Clone, ValueEnum)]
enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn to_filter_directive(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

#[derive(Parser, Debug)]
#[clap(
    name = "pantry",
    about = "Git-backed manifest index for apps and drivers",
    version
)]
struct Cli {
    #[clap(subcommand)]
    command: Command,

    /// Settings file (YAML); a missing file means defaults
    #[clap(long, global = true)]
    config: Option<PathBuf>,

    /// Override the index data directory
    #[clap(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Override the working-copy directory
    #[clap(long, global = true)]
    work_dir: Option<PathBuf>,

    /// Override the built-in store URL
    #[clap(long, global = true)]
    source_url: Option<String>,

    /// Override the built-in store name
    #[clap(long, global = true)]
    source_name: Option<String>,

    /// Pin working copies to this tag where the repository has it
    #[clap(long, global = true)]
    tag: Option<String>,

    /// Seconds between reconciliation passes
    #[clap(long, global = true)]
    interval: Option<u64>,

    /// Set log level
    #[clap(long, default_value = "info", global = true)]
    log_level: LogLevel,
}

#[derive(Parser, Debug)]
enum Command {
    /// Run the reconciliation daemon in the foreground
    Run,

    /// Run exactly one reconciliation pass, then exit
    Sync,

    /// Manage manifest stores
    Stores {
        #[clap(subcommand)]
        command: StoresCommand,
    },

    /// Inspect and inject manifests
    Manifests {
        #[clap(subcommand)]
        command: ManifestsCommand,
    },
}

#[derive(Parser, Debug)]
enum StoresCommand {
    /// List every store, the built-in one first
    List {
        /// Output results as JSON
        #[clap(long)]
        json: bool,
    },

    /// Register a store
    Add {
        /// Display name
        name: String,

        /// Git repository URL
        url: String,
    },

    /// Deregister a store and drop its working copy
    Remove {
        /// Git repository URL
        url: String,
    },
}

#[derive(Parser, Debug)]
enum ManifestsCommand {
    /// List every published manifest with its kind
    List {
        /// Output results as JSON
        #[clap(long)]
        json: bool,
    },

    /// Publish a manifest file directly, bypassing the stores
    Add {
        /// Path to a manifest JSON file
        file: PathBuf,
    },
}

/// Initialize tracing with CLI flags
///
/// Logs go to stderr so table and JSON output on stdout stay clean.
fn initialize_tracing(log_level: &LogLevel) {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(log_level.to_filter_directive()))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn default_settings_path() -> PathBuf {
    default_base_dir().join("pantry.yml")
}

/// Settings file first, CLI flags on top
fn effective_settings(cli: &Cli) -> Result<SyncSettings> {
    let path = cli.config.clone().unwrap_or_else(default_settings_path);
    let mut settings = SyncSettings::load(&path)?;

    if let Some(dir) = &cli.data_dir {
        settings.data_dir = dir.clone();
    }
    if let Some(dir) = &cli.work_dir {
        settings.work_dir = dir.clone();
    }
    if let Some(url) = &cli.source_url {
        settings.source_url = url.clone();
    }
    if let Some(name) = &cli.source_name {
        settings.source_name = name.clone();
    }
    if let Some(tag) = &cli.tag {
        settings.tag = Some(tag.clone());
    }
    if let Some(interval) = cli.interval {
        settings.interval_secs = interval;
    }
    Ok(settings)
}

struct Runtime {
    service: ManifestService,
    reconciler: Reconciler,
}

fn build_runtime(settings: &SyncSettings) -> Result<Runtime> {
    let index: Arc<dyn KeyValueStore> = Arc::new(
        FileIndex::new(settings.data_dir.clone())
            .with_context(|| format!("failed to open index at {}", settings.data_dir.display()))?,
    );
    let registry = SourceRegistry::new(
        index.clone(),
        settings.builtin_source(),
        settings.allowed_hosts.clone(),
        settings.work_dir.clone(),
    );
    let publisher = Publisher::new(index.clone());
    let trigger = Arc::new(Trigger::new());
    let service = ManifestService::new(
        index,
        registry.clone(),
        publisher.clone(),
        trigger.clone(),
    );
    let reconciler = Reconciler::new(
        registry,
        publisher,
        settings.tag.clone(),
        settings.interval(),
        trigger,
    );
    Ok(Runtime {
        service,
        reconciler,
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    initialize_tracing(&cli.log_level);

    let settings = effective_settings(&cli)?;

    match cli.command {
        Command::Run => run_command(&settings).await,
        Command::Sync => sync_command(&settings).await,
        Command::Stores { command } => match command {
            StoresCommand::List { json } => list_stores_command(&settings, json).await,
            StoresCommand::Add { name, url } => add_store_command(&settings, name, url).await,
            StoresCommand::Remove { url } => remove_store_command(&settings, url).await,
        },
        Command::Manifests { command } => match command {
            ManifestsCommand::List { json } => list_manifests_command(&settings, json).await,
            ManifestsCommand::Add { file } => add_manifest_command(&settings, file).await,
        },
    }
}

async fn run_command(settings: &SyncSettings) -> Result<()> {
    let runtime = build_runtime(settings)?;

    info!("index at {}", settings.data_dir.display());
    info!("working copies at {}", settings.work_dir.display());
    if let Some(tag) = &settings.tag {
        info!("pinning working copies to tag '{tag}'");
    }
    info!("polling every {}s", settings.interval_secs);

    runtime.reconciler.run().await;
    Ok(())
}

async fn sync_command(settings: &SyncSettings) -> Result<()> {
    let runtime = build_runtime(settings)?;
    let summary = runtime.reconciler.pass().await?;

    println!(
        "{} sources synced, {} failed, {} manifests published, {} files skipped",
        summary.sources_synced,
        summary.sources_failed,
        summary.manifests_published,
        summary.files_skipped
    );
    Ok(())
}

// Table row structure for store display
#[derive(Tabled)]
struct StoreRow {
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Repository")]
    repository: String,
    #[tabled(rename = "Type")]
    store_type: String,
    #[tabled(rename = "Fingerprint")]
    fingerprint: String,
}

async fn list_stores_command(settings: &SyncSettings, json: bool) -> Result<()> {
    let runtime = build_runtime(settings)?;
    let sources = runtime.service.sources().await?;

    if json {
        let output: Vec<_> = sources
            .iter()
            .enumerate()
            .map(|(i, source)| {
                serde_json::json!({
                    "name": source.name,
                    "repoUrl": source.repo_url,
                    "builtin": i == 0,
                    "fingerprint": source.fingerprint(),
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    let rows: Vec<StoreRow> = sources
        .iter()
        .enumerate()
        .map(|(i, source)| StoreRow {
            name: source.name.clone(),
            repository: source.repo_url.clone(),
            store_type: if i == 0 { "built-in" } else { "registered" }.to_string(),
            fingerprint: source.fingerprint()[..12].to_string(),
        })
        .collect();

    print_table(&rows);
    Ok(())
}

async fn add_store_command(settings: &SyncSettings, name: String, url: String) -> Result<()> {
    let runtime = build_runtime(settings)?;
    let source = Source::new(name, url);
    runtime.service.add_store(&source).await?;

    println!("Added store '{}' ({})", source.name, source.repo_url);
    println!("The daemon picks it up on its next pass.");
    Ok(())
}

async fn remove_store_command(settings: &SyncSettings, url: String) -> Result<()> {
    let runtime = build_runtime(settings)?;

    // use the registered descriptor when we have it, for a better log line
    let source = runtime
        .service
        .sources()
        .await?
        .into_iter()
        .find(|s| s.repo_url == url)
        .unwrap_or_else(|| Source::new("unregistered", url.clone()));
    runtime.service.remove_store(&source).await?;

    println!("Removed store {url}");
    println!("Manifests are rebuilt from the remaining stores on the daemon's next pass.");
    Ok(())
}

// Table row structure for manifest display
#[derive(Tabled)]
struct ManifestRow {
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Kind")]
    kind: String,
}

async fn list_manifests_command(settings: &SyncSettings, json: bool) -> Result<()> {
    let runtime = build_runtime(settings)?;

    let mut manifests = Vec::new();
    for name in runtime.service.manifest_names().await? {
        if let Some(manifest) = runtime.service.manifest(&name).await? {
            manifests.push(manifest);
        }
    }

    if json {
        let output: Vec<_> = manifests
            .iter()
            .map(|m| {
                serde_json::json!({
                    "name": m.name,
                    "type": m.kind.to_string(),
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    if manifests.is_empty() {
        println!("No manifests published.");
        return Ok(());
    }

    let rows: Vec<ManifestRow> = manifests
        .into_iter()
        .map(|m| ManifestRow {
            name: m.name,
            kind: m.kind.to_string(),
        })
        .collect();
    print_table(&rows);
    Ok(())
}

async fn add_manifest_command(settings: &SyncSettings, file: PathBuf) -> Result<()> {
    let runtime = build_runtime(settings)?;

    let raw = std::fs::read(&file)
        .with_context(|| format!("failed to read manifest file {}", file.display()))?;
    let manifest = runtime.service.add_manifest(&raw).await?;

    println!("Published {} '{}'", manifest.kind, manifest.name);
    Ok(())
}

fn print_table<T: Tabled>(rows: &[T]) {
    let table = Table::new(rows)
        .with(Style::rounded())
        .with(Modify::new(Rows::first()).with(Alignment::center()))
        .to_string();
    println!("{table}");
}
