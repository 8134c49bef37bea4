//! IgorFS Daemon
//!
//! Read-only folder statistics and download service for the IGOR dashboard.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use daemon::config::{default_config_path, Config};
use daemon::files::{DirectoryAggregator, DirectoryBrowser, FolderIndex, RootBoundary};
use daemon::orchestrator::{DaemonOrchestrator, OrchestratorEvent};
use protocol::{EntryDescriptor, FolderSummary};
use tracing_subscriber::EnvFilter;

/// IgorFS Daemon - sandboxed folder statistics and file downloads.
#[derive(Parser, Debug)]
#[command(name = "igorfs")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Shared root directory (overrides config and environment)
    #[arg(long, global = true, value_name = "DIR")]
    pub root: Option<PathBuf>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands for the daemon.
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Start the HTTP server
    Start {
        /// Address to listen on, e.g. 127.0.0.1:3000
        #[arg(long, short)]
        bind: Option<String>,
    },

    /// Print the top-level folders with their totals
    Folders {
        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// List the contents of a folder
    Ls {
        /// Folder path relative to the root
        #[arg(default_value = ".")]
        folder: String,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Print the effective configuration as TOML
    Config {
        /// Save it to the config file (`--config` or the default path)
        #[arg(long)]
        write: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let mut config = if let Some(config_path) = &cli.config {
        Config::load(config_path)?
    } else {
        Config::load_default()?
    };

    // Initialize tracing first so overrides are logged; RUST_LOG wins
    let env_level = std::env::var("IGORFS_LOG_LEVEL").ok();
    let level = log_level(cli.verbose, env_level.as_deref(), &config.daemon.log_level);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    // Environment overrides, then command line
    config.apply_env_overrides();
    if let Some(root) = &cli.root {
        config.files.root_dir = root.clone();
    }
    if let Commands::Start { bind: Some(bind) } = &cli.command {
        config.server.bind_address = bind.clone();
    }

    // Validate configuration
    config.validate()?;

    if let Some(config_path) = &cli.config {
        tracing::debug!("Using config file: {:?}", config_path);
    }

    match cli.command {
        Commands::Start { .. } => {
            tracing::info!("IgorFS daemon starting...");
            let mut orchestrator = DaemonOrchestrator::new(config)?;
            run_headless(&mut orchestrator).await?;
        }
        Commands::Folders { json } => {
            let root = open_root(&config)?;
            let index = FolderIndex::new(root, aggregator(&config));
            let folders = index
                .list_folders()
                .await
                .context("Failed to list folders")?;

            if json {
                println!("{}", protocol::to_json_pretty(&folders)?);
            } else {
                print_folders_table(&folders);
            }
        }
        Commands::Ls { folder, json } => {
            let root = open_root(&config)?;
            let browser = DirectoryBrowser::new(root, aggregator(&config));
            let entries = browser
                .list_directory(&folder)
                .await
                .with_context(|| format!("Failed to list folder '{}'", folder))?;

            if json {
                println!("{}", protocol::to_json_pretty(&entries)?);
            } else {
                print_entries_table(&entries);
            }
        }
        Commands::Config { write } => {
            if write {
                let path = cli.config.clone().unwrap_or_else(default_config_path);
                config.save(&path)?;
                println!("Wrote configuration to {}", path.display());
            } else {
                print!("{}", config.to_toml()?);
            }
        }
    }

    Ok(())
}

/// Level for the subscriber: `--verbose`, then `IGORFS_LOG_LEVEL`, then the
/// config file.
fn log_level(verbose: bool, env_level: Option<&str>, configured: &str) -> String {
    if verbose {
        return "debug".to_string();
    }
    match env_level {
        Some(level) if !level.is_empty() => level.to_lowercase(),
        _ => configured.to_lowercase(),
    }
}

/// Canonicalize the configured root.
fn open_root(config: &Config) -> anyhow::Result<Arc<RootBoundary>> {
    let root = RootBoundary::new(&config.files.root_dir).with_context(|| {
        format!(
            "Invalid root directory: {}",
            config.files.root_dir.display()
        )
    })?;
    Ok(Arc::new(root))
}

fn aggregator(config: &Config) -> DirectoryAggregator {
    DirectoryAggregator::new(config.files.max_concurrency)
        .include_hidden(config.files.include_hidden)
}

/// Print top-level folders in a formatted ASCII table.
fn print_folders_table(folders: &[FolderSummary]) {
    if folders.is_empty() {
        println!("No folders.");
        return;
    }

    let name_width = folders
        .iter()
        .map(|f| f.name.chars().count())
        .max()
        .unwrap_or(4)
        .max(4);

    println!(
        "{:<name_width$}  {:>8}  {:>10}",
        "NAME",
        "FILES",
        "SIZE",
        name_width = name_width
    );
    println!("{}", "-".repeat(name_width + 22));

    for folder in folders {
        println!(
            "{:<name_width$}  {:>8}  {:>10}",
            folder.name,
            folder.total_files,
            format_size(folder.total_size),
            name_width = name_width
        );
    }

    let total: protocol::DirStats = folders.iter().map(FolderSummary::stats).sum();
    println!();
    println!(
        "Total: {} folder(s), {} file(s), {}",
        folders.len(),
        total.total_files,
        format_size(total.total_size)
    );
}

/// Print folder contents in a formatted ASCII table.
fn print_entries_table(entries: &[EntryDescriptor]) {
    if entries.is_empty() {
        println!("Empty folder.");
        return;
    }

    let name_width = entries
        .iter()
        .map(|e| e.name.chars().count())
        .max()
        .unwrap_or(4)
        .max(4);

    println!(
        "{:<6}  {:<name_width$}  {:>8}  {:>10}  {:<16}",
        "TYPE",
        "NAME",
        "FILES",
        "SIZE",
        "MODIFIED",
        name_width = name_width
    );
    println!("{}", "-".repeat(name_width + 50));

    for entry in entries {
        let (kind, files) = match entry.total_files {
            Some(files) if entry.is_folder() => ("folder", files.to_string()),
            _ => ("file", "-".to_string()),
        };

        println!(
            "{:<6}  {:<name_width$}  {:>8}  {:>10}  {:<16}",
            kind,
            entry.name,
            files,
            format_size(entry.size),
            format_timestamp(entry.last_modified),
            name_width = name_width
        );
    }
}

/// Format a byte count with a binary unit (e.g., "1.5 KiB").
fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["KiB", "MiB", "GiB", "TiB", "PiB"];

    if bytes < 1024 {
        return format!("{} B", bytes);
    }

    let mut value = bytes as f64 / 1024.0;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{:.1} {}", value, UNITS[unit])
}

fn format_timestamp(time: DateTime<Utc>) -> String {
    time.format("%Y-%m-%d %H:%M").to_string()
}

/// Run the daemon until a shutdown signal arrives.
async fn run_headless(orchestrator: &mut DaemonOrchestrator) -> anyhow::Result<()> {
    // Subscribe before starting so the first events are logged
    let mut events = orchestrator.subscribe();

    // Spawn event logging task
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                OrchestratorEvent::StateChanged(state) => {
                    tracing::debug!("Orchestrator state: {:?}", state);
                }
                OrchestratorEvent::Listening { addr } => {
                    println!("IgorFS listening on http://{}", addr);
                }
                OrchestratorEvent::Error { message } => {
                    tracing::error!("Orchestrator error: {}", message);
                }
            }
        }
    });

    orchestrator.start().await?;

    // Wait for shutdown signal (SIGTERM or SIGINT)
    wait_for_shutdown_signal().await?;
    tracing::info!("Received shutdown signal");

    orchestrator.stop().await?;

    Ok(())
}

/// Wait for a shutdown signal (SIGTERM or SIGINT).
#[cfg(unix)]
async fn wait_for_shutdown_signal() -> anyhow::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm =
        signal(SignalKind::terminate()).context("Failed to register SIGTERM handler")?;

    tokio::select! {
        _ = sigterm.recv() => {
            tracing::info!("Received SIGTERM");
        }
        result = tokio::signal::ctrl_c() => {
            result.context("Failed to listen for Ctrl-C")?;
            tracing::info!("Received SIGINT");
        }
    }
    Ok(())
}

/// Wait for Ctrl-C.
#[cfg(not(unix))]
async fn wait_for_shutdown_signal() -> anyhow::Result<()> {
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")
}
