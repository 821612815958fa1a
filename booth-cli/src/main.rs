use anyhow::{Context, Result};
use booth_manifest::SyncKind;
use booth_store::FsObjectStore;
use booth_sync::{ConflictChoice, Settings, SyncEvent, SyncOrchestrator, SyncPlan};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod app;

use app::App;

#[derive(Parser)]
#[command(name = "boothsync")]
#[command(about = "Configuration sync for photo booths sharing an object store", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Increase logging verbosity
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Application directory holding settings and the local manifest
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create settings and a booth identity
    Init {
        /// Root of the shared object store (mounted bucket or shared folder)
        #[arg(long)]
        sync_root: Option<PathBuf>,

        /// Root of this booth's templates, settings, assets and records
        #[arg(long)]
        data_root: Option<PathBuf>,
    },

    /// Run one sync now
    Sync,

    /// Sync whenever the configured interval has elapsed, until interrupted
    Watch {
        /// Seconds between schedule checks
        #[arg(long, default_value_t = 10)]
        poll: u64,
    },

    /// Show what the next sync would do
    Plan,

    /// Show booth and sync state
    Status,

    /// Inspect or change sync options
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// List divergent items the active policy leaves to the operator
    Conflicts,

    /// Settle a conflict by keeping one version
    Resolve {
        /// Item kind (template, setting, database, asset)
        kind: SyncKind,
        /// Item id
        id: String,
        /// Version to keep: local or remote
        choice: ConflictChoice,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the current sync options
    Show,
    /// Set one option, e.g. `conflict_resolution manual`
    Set { key: String, value: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let dir = match cli.config_dir {
        Some(dir) => dir,
        None => Settings::default_dir().context("Failed to resolve application directory")?,
    };

    match cli.command {
        Commands::Init {
            sync_root,
            data_root,
        } => init(dir, sync_root, data_root).await,
        Commands::Sync => {
            let app = App::open(&dir)?;
            sync_once(&app.orchestrator).await
        }
        Commands::Watch { poll } => watch(App::open(&dir)?, poll).await,
        Commands::Plan => {
            let app = App::open(&dir)?;
            let plan = app.orchestrator.preview().await?;
            print_plan(&plan);
            Ok(())
        }
        Commands::Status => status(App::open(&dir)?).await,
        Commands::Config { action } => config(dir, action),
        Commands::Conflicts => {
            let app = App::open(&dir)?;
            let plan = app.orchestrator.preview().await?;
            if plan.conflicts.is_empty() {
                println!("No conflicts");
            }
            for conflict in &plan.conflicts {
                println!("{}", conflict.key());
                println!(
                    "  local:  {} by {} at {}",
                    short_hash(&conflict.local.content_hash.to_hex()),
                    conflict.local.modified_by,
                    conflict.local.last_modified
                );
                println!(
                    "  remote: {} by {} at {}",
                    short_hash(&conflict.remote.content_hash.to_hex()),
                    conflict.remote.modified_by,
                    conflict.remote.last_modified
                );
            }
            Ok(())
        }
        Commands::Resolve { kind, id, choice } => {
            let app = App::open(&dir)?;
            app.orchestrator.preview().await?;
            let result = app
                .orchestrator
                .resolve_conflict(kind, &id, choice)
                .await
                .with_context(|| format!("Failed to resolve {kind}:{id}"))?;
            println!("{}", result.message);
            Ok(())
        }
    }
}

async fn init(dir: PathBuf, sync_root: Option<PathBuf>, data_root: Option<PathBuf>) -> Result<()> {
    let mut settings = Settings::load_or_init(&dir)
        .with_context(|| format!("Failed to initialize {}", dir.display()))?;
    if let Some(root) = sync_root {
        settings.sync_root = root;
    }
    if let Some(root) = data_root {
        settings.data_root = root;
    }
    settings
        .save(&dir)
        .with_context(|| format!("Failed to save settings in {}", dir.display()))?;

    FsObjectStore::create(&settings.sync_root)
        .await
        .with_context(|| format!("Failed to create sync root {}", settings.sync_root.display()))?;
    for kind in SyncKind::ALL {
        let path = settings.data_root.join(kind.dir_name());
        std::fs::create_dir_all(&path)
            .with_context(|| format!("Failed to create {}", path.display()))?;
    }

    println!("Booth ID:  {}", settings.booth_id);
    println!("Settings:  {}", Settings::settings_path(&dir).display());
    println!("Sync root: {}", settings.sync_root.display());
    println!("Data root: {}", settings.data_root.display());
    Ok(())
}

async fn sync_once(orchestrator: &SyncOrchestrator) -> Result<()> {
    let mut events = orchestrator.subscribe();
    let run = orchestrator.run_sync();
    tokio::pin!(run);

    let outcome = loop {
        tokio::select! {
            outcome = &mut run => break outcome,
            Ok(event) = events.recv() => print_event(&event),
        }
    };
    while let Ok(event) = events.try_recv() {
        print_event(&event);
    }

    let result = outcome.context("Sync failed")?;
    for error in &result.errors {
        println!("  error: {error}");
    }
    if !result.success && result.errors.is_empty() {
        println!("{}", result.message);
    }
    Ok(())
}

fn print_event(event: &SyncEvent) {
    match event {
        SyncEvent::Started { booth_id } => println!("Syncing booth {booth_id}"),
        SyncEvent::Progress { message, percent } => println!("[{percent:>3}%] {message}"),
        SyncEvent::ConflictDetected { item_id, local, .. } => {
            println!("  conflict: {}:{}", local.kind, item_id)
        }
        SyncEvent::Completed(result) => println!(
            "Done: {} ({} templates, {} settings, {} events, {} records, {} assets)",
            result.message,
            result.templates_synced,
            result.settings_synced,
            result.events_synced,
            result.database_items_synced,
            result.assets_synced
        ),
        SyncEvent::Error { message } => println!("Sync error: {message}"),
    }
}

async fn watch(app: App, poll: u64) -> Result<()> {
    let orchestrator: Arc<SyncOrchestrator> = app.orchestrator;
    info!(
        "Watching for scheduled syncs every {}s (interval {}s)",
        poll, app.settings.sync.interval_secs
    );
    let mut ticker = tokio::time::interval(Duration::from_secs(poll.max(1)));

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if orchestrator.should_auto_sync().await {
                    if let Err(e) = sync_once(&orchestrator).await {
                        warn!("Scheduled sync failed: {:#}", e);
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, stopping");
                return Ok(());
            }
        }
    }
}

async fn status(app: App) -> Result<()> {
    let status = app.orchestrator.status().await;
    let config = &app.settings.sync;
    println!("Booth ID:  {}", status.booth_id);
    println!("Sync root: {}", app.settings.sync_root.display());
    println!("Data root: {}", app.settings.data_root.display());
    println!(
        "Sync:      {} (policy {}, every {}s)",
        if config.enabled { "enabled" } else { "disabled" },
        config.conflict_resolution,
        config.interval_secs
    );

    match app.local_manifest()? {
        Some(manifest) => {
            println!(
                "Last local change: {} by {}",
                manifest.last_modified, manifest.modified_by
            );
            for kind in SyncKind::ALL {
                println!("  {:<10} {}", kind.dir_name(), manifest.items_of(kind).count());
            }
        }
        None => println!("Never synced"),
    }
    Ok(())
}

fn config(dir: PathBuf, action: ConfigAction) -> Result<()> {
    let mut settings = app::load_settings(&dir)?;
    match action {
        ConfigAction::Show => {
            let rendered = toml::to_string_pretty(&settings.sync)
                .context("Failed to render sync options")?;
            print!("{rendered}");
        }
        ConfigAction::Set { key, value } => {
            settings
                .sync
                .set(&key, &value)
                .with_context(|| format!("Invalid value for {key}"))?;
            settings
                .save(&dir)
                .with_context(|| format!("Failed to save settings in {}", dir.display()))?;
            println!("{key} = {value}");
        }
    }
    Ok(())
}

fn print_plan(plan: &SyncPlan) {
    if plan.is_empty() {
        println!("Everything is in sync");
        return;
    }
    for item in &plan.to_upload {
        println!("upload    {}", item.key());
    }
    for item in &plan.to_download {
        println!("download  {}", item.key());
    }
    for conflict in &plan.conflicts {
        println!("conflict  {}", conflict.key());
    }
}

fn short_hash(hex: &str) -> &str {
    &hex[..hex.len().min(12)]
}
