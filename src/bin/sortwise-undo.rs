// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Sortwise Undo Utility
//!
//! Reverses moves recorded in the history ledger, newest first.

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;

use sortwise::history::Ledger;
use sortwise::suppression::{SuppressionSet, SUPPRESSION_WINDOW};
use sortwise::undo::UndoCoordinator;
use sortwise::Result;

#[derive(Parser, Debug)]
#[command(name = "sortwise-undo")]
#[command(version)]
#[command(about = "Undo Sortwise file moves")]
struct Args {
    /// Path to history file
    #[arg(long, default_value = "sortwise_history.json")]
    history_file: PathBuf,

    /// Number of moves to undo (default: 1, use 0 for all)
    #[arg(short, long, default_value = "1")]
    count: usize,

    /// Dry run - show what would be undone without doing it
    #[arg(long)]
    dry_run: bool,

    /// List all entries in history
    #[arg(long)]
    list: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter("warn")
        .with_target(false)
        .init();

    let ledger = Ledger::new(args.history_file.clone());
    let entries = ledger.entries();

    if entries.is_empty() {
        println!("No history entries found in {:?}.", args.history_file);
        return Ok(());
    }

    if args.list {
        println!("Move History ({} entries):", entries.len());
        println!("{:-<80}", "");
        for (i, entry) in entries.iter().enumerate() {
            println!(
                "{:3}. [{}] {} -> {}",
                i + 1,
                entry.timestamp,
                entry.original_path.display(),
                entry.destination.display()
            );
            println!("     Category: {}", entry.category);
        }
        return Ok(());
    }

    let count = if args.count == 0 {
        entries.len()
    } else {
        args.count.min(entries.len())
    };

    println!(
        "{}Undoing {} move(s)...",
        if args.dry_run { "[DRY RUN] " } else { "" },
        count
    );

    let undo = UndoCoordinator::new(Arc::new(SuppressionSet::shared(
        SuppressionSet::store_path_for(&args.history_file),
        SUPPRESSION_WINDOW,
    )));
    let mut undone = 0;
    let mut failed = 0;

    for entry in entries.iter().take(count) {
        if let Err(e) = UndoCoordinator::check(entry) {
            eprintln!("  Skip: {} ({})", entry.destination.display(), e);
            failed += 1;
            continue;
        }

        if args.dry_run {
            println!(
                "  Would move: {} -> {}",
                entry.destination.display(),
                entry.original_path.display()
            );
            continue;
        }

        match undo.undo(entry) {
            Ok(restored) => {
                ledger.remove(&entry.id)?;
                println!("  Undone: {} -> {}", entry.destination.display(), restored.display());
                undone += 1;
            }
            Err(e) => {
                eprintln!("  Failed: {} ({})", entry.destination.display(), e);
                failed += 1;
            }
        }
    }

    println!();
    if args.dry_run {
        println!("Dry run complete. {} move(s) would be undone.", count - failed);
    } else {
        println!("Done. {} undone, {} failed/skipped.", undone, failed);
    }

    Ok(())
}
