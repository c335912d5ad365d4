// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Sortwise: watch folders and file new arrivals into an AI-chosen tree

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::signal;
use tracing::{debug, info, warn};

use sortwise::classifier::{Classifier, ClassifierAdapter};
use sortwise::config::AppConfig;
use sortwise::history::Ledger;
use sortwise::pipeline::{Organizer, Outcome};
use sortwise::suppression::{SuppressionSet, SUPPRESSION_WINDOW};
use sortwise::undo::UndoCoordinator;
use sortwise::watcher::{WatchCoordinator, WatchSettings};
use sortwise::{Result, SortError};

/// Sortwise CLI - AI folder organizer
#[derive(Parser, Debug)]
#[command(name = "sortwise")]
#[command(author = "Jonathan D. A. Jewell <hyperpolymath>")]
#[command(version)]
#[command(about = "Watch folders and sort new files into categories", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file (JSON format)
    #[arg(short, long, default_value = "config.json", global = true)]
    config: PathBuf,

    /// Enable verbose logging (debug level)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Enable trace logging (most verbose)
    #[arg(long, global = true)]
    trace: bool,

    /// Suppress non-essential output (quiet mode)
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Watch source folders and organize new files
    Watch {
        /// Folders to watch (overrides config)
        #[arg(short, long)]
        dir: Vec<PathBuf>,

        /// Shared target root (overrides config, implies shared mode)
        #[arg(short, long)]
        target: Option<PathBuf>,

        /// Organize files under their own folder
        #[arg(long, conflicts_with = "target")]
        inplace: bool,

        /// Organize files already present on startup
        #[arg(long)]
        process_existing: bool,
    },

    /// Organize the files currently in a folder, once
    Scan {
        /// Folder to scan (non-recursive)
        dir: PathBuf,

        /// Shared target root (overrides config, implies shared mode)
        #[arg(short, long)]
        target: Option<PathBuf>,
    },

    /// Show how a filename would be classified
    Classify {
        /// Bare filename, e.g. invoice_2024.pdf
        filename: String,
    },

    /// History and undo operations
    History {
        #[command(subcommand)]
        action: HistoryCommands,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigCommands,
    },
}

#[derive(Subcommand, Debug)]
enum HistoryCommands {
    /// List recent moves
    List {
        /// Number of entries to show
        #[arg(short, long, default_value = "10")]
        count: usize,
    },

    /// Undo recent moves, newest first
    Undo {
        /// Number of moves to undo
        #[arg(short, long, default_value = "1")]
        count: usize,

        /// Dry run (show what would be undone)
        #[arg(long)]
        dry_run: bool,
    },

    /// Clear all history
    Clear {
        /// Skip confirmation prompt
        #[arg(long)]
        force: bool,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigCommands {
    /// Show current configuration
    Show,

    /// Generate default configuration file
    Generate {
        /// Output file path
        #[arg(short, long, default_value = "config.json")]
        output: PathBuf,
    },

    /// Validate configuration file
    Validate,
}

/// The long-lived pieces every command builds from config
struct Services {
    classifier: Arc<ClassifierAdapter>,
    ledger: Arc<Ledger>,
    suppression: Arc<SuppressionSet>,
    organizer: Arc<Organizer>,
}

impl Services {
    fn build(config: &AppConfig) -> Result<Self> {
        let classifier = Arc::new(ClassifierAdapter::new(config.engine.backend())?);
        let ledger = Arc::new(Ledger::new(config.history_file.clone()));
        let suppression = Arc::new(SuppressionSet::shared(
            SuppressionSet::store_path_for(&config.history_file),
            SUPPRESSION_WINDOW,
        ));
        let organizer = Arc::new(
            Organizer::new(classifier.clone(), ledger.clone(), suppression.clone())
                .with_probe(config.watch.probe()),
        );

        Ok(Self {
            classifier,
            ledger,
            suppression,
            organizer,
        })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.trace {
        "trace"
    } else if cli.verbose {
        "debug"
    } else if cli.quiet {
        "warn"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let config = AppConfig::load(&cli.config)?;

    match cli.command {
        Some(Commands::Watch { dir, target, inplace, process_existing }) => {
            run_watch(apply_overrides(config, dir, target, inplace), process_existing).await
        }
        Some(Commands::Scan { dir, target }) => {
            let config = apply_overrides(config, vec![], target, false);
            run_scan(config, dir).await
        }
        Some(Commands::Classify { filename }) => run_classify(config, filename).await,
        Some(Commands::History { action }) => run_history_command(config, action),
        Some(Commands::Config { action }) => run_config_command(config, action, &cli.config),
        None => run_watch(config, false).await,
    }
}

fn apply_overrides(
    mut config: AppConfig,
    dirs: Vec<PathBuf>,
    target: Option<PathBuf>,
    inplace: bool,
) -> AppConfig {
    if !dirs.is_empty() {
        config.source_folders = dirs;
    }
    if let Some(target) = target {
        config.target_folder = Some(target);
        config.inplace = false;
    }
    if inplace {
        config.inplace = true;
    }
    config
}

/// Run the watch mode until Ctrl+C or SIGTERM
async fn run_watch(config: AppConfig, process_existing: bool) -> Result<()> {
    let placement = config.placement()?;
    let services = Services::build(&config)?;

    let mut settings = WatchSettings::new(config.source_folders.clone(), placement);
    settings.debounce = config.watch.debounce();

    let ledger = services.ledger.clone();
    let mut coordinator = WatchCoordinator::new(services.organizer.clone(), settings)
        .with_observer(Arc::new(move || {
            if let Some(entry) = ledger.peek_most_recent() {
                debug!("History updated: {} -> {}", entry.filename, entry.category);
            }
        }));

    coordinator.start()?;

    if process_existing {
        for folder in coordinator.watched_folders() {
            let scan = coordinator.spawn_scan(folder.clone());
            tokio::spawn(async move {
                match scan.await {
                    Ok(Ok(outcomes)) => {
                        let moved = outcomes.iter().filter(|(_, o)| o.is_moved()).count();
                        info!("Startup scan of {:?} moved {} file(s)", folder, moved);
                    }
                    Ok(Err(e)) => warn!("Startup scan of {:?} failed: {}", folder, e),
                    Err(e) => warn!("Startup scan of {:?} aborted: {}", folder, e),
                }
            });
        }
    }

    info!("Sortwise active. Press Ctrl+C to stop.");
    wait_for_shutdown().await;

    coordinator.stop().await;
    info!("Sortwise stopped.");
    Ok(())
}

async fn wait_for_shutdown() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Cannot listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!("Cannot listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
        _ = terminate => info!("Received SIGTERM, shutting down..."),
    }
}

/// Organize a folder's current contents once
async fn run_scan(config: AppConfig, dir: PathBuf) -> Result<()> {
    let placement = config.placement()?;
    let services = Services::build(&config)?;
    let coordinator = WatchCoordinator::new(
        services.organizer.clone(),
        WatchSettings::new(vec![dir.clone()], placement),
    );

    let outcomes = coordinator.scan(&dir).await?;
    for (path, outcome) in &outcomes {
        match outcome {
            Outcome::Moved(entry) => println!("moved    {} -> {}", path.display(), entry.destination.display()),
            Outcome::MoveFailed(reason) => println!("failed   {} ({})", path.display(), reason),
            Outcome::Unstable => println!("unstable {}", path.display()),
            Outcome::Suppressed => println!("skipped  {} (recently undone)", path.display()),
            Outcome::Filtered(reason) => println!("skipped  {} ({:?})", path.display(), reason),
        }
    }

    let moved = outcomes.iter().filter(|(_, o)| o.is_moved()).count();
    println!("\nMoved {} of {} file(s)", moved, outcomes.len());
    Ok(())
}

async fn run_classify(config: AppConfig, filename: String) -> Result<()> {
    let services = Services::build(&config)?;
    let classification = services.classifier.classify(&filename).await;
    println!("{} -> {}", filename, classification.category());
    Ok(())
}

/// Run history commands
fn run_history_command(config: AppConfig, action: HistoryCommands) -> Result<()> {
    let services = Services::build(&config)?;
    let ledger = &services.ledger;

    match action {
        HistoryCommands::List { count } => {
            let entries = ledger.recent(count);
            println!("Recent history ({} entries):", entries.len());
            for entry in entries {
                println!(
                    "  [{}] {} -> {} ({})",
                    entry.timestamp,
                    entry.original_path.display(),
                    entry.destination.display(),
                    entry.category
                );
            }
        }
        HistoryCommands::Undo { count, dry_run } => {
            let to_undo = ledger.recent(count);
            if to_undo.is_empty() {
                println!("No moves to undo");
                return Ok(());
            }

            let undo = UndoCoordinator::new(services.suppression.clone());
            for entry in to_undo {
                if let Err(e) = UndoCoordinator::check(&entry) {
                    eprintln!("Skip: {} ({})", entry.filename, e);
                    continue;
                }

                if dry_run {
                    println!(
                        "Would undo: {} -> {}",
                        entry.destination.display(),
                        entry.original_path.display()
                    );
                    continue;
                }

                match undo.undo(&entry) {
                    Ok(restored) => {
                        ledger.remove(&entry.id)?;
                        println!("Undone: {} -> {}", entry.destination.display(), restored.display());
                    }
                    Err(e) => eprintln!("Undo failed for {}: {}", entry.filename, e),
                }
            }
        }
        HistoryCommands::Clear { force } => {
            if !force {
                eprintln!("Use --force to confirm clearing history");
                return Ok(());
            }
            ledger.clear()?;
            println!("History cleared");
        }
    }

    Ok(())
}

/// Run config commands
fn run_config_command(config: AppConfig, action: ConfigCommands, config_path: &Path) -> Result<()> {
    match action {
        ConfigCommands::Show => {
            let json = serde_json::to_string_pretty(&config)?;
            println!("{}", json);
        }
        ConfigCommands::Generate { output } => {
            if output.exists() {
                return Err(SortError::Config(format!(
                    "{:?} already exists, not overwriting",
                    output
                )));
            }
            AppConfig::default().save(&output)?;
            println!("Generated config at {:?}", output);
        }
        ConfigCommands::Validate => {
            let placement = config.placement()?;
            println!("Configuration at {:?} is valid", config_path);
            println!("  Source folders: {:?}", config.source_folders);
            println!("  Placement: {:?}", placement);
            println!("  Model: {}", config.engine.model);
            println!("  History: {:?}", config.history_file);
            for folder in &config.source_folders {
                if !folder.is_dir() {
                    println!("  Warning: {:?} does not exist and will be skipped", folder);
                }
            }
        }
    }

    Ok(())
}
