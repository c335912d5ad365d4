// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Reversing recorded moves

use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

use crate::history::HistoryEntry;
use crate::mover;
use crate::pipeline::resolve_path;
use crate::suppression::SuppressionSet;
use crate::{Result, SortError};

/// Puts files back where they came from
///
/// Undo only touches the filesystem and the suppression set. Removing the
/// ledger entry is up to the caller once undo reports success.
pub struct UndoCoordinator {
    suppression: Arc<SuppressionSet>,
}

impl UndoCoordinator {
    pub fn new(suppression: Arc<SuppressionSet>) -> Self {
        Self { suppression }
    }

    /// Move `entry.destination` back to `entry.original_path`
    ///
    /// Fails without changing anything when the destination is gone or the
    /// original location is occupied. On success the restored path is
    /// suppressed so the watcher does not immediately sort it again.
    pub fn undo(&self, entry: &HistoryEntry) -> Result<PathBuf> {
        if let Err(e) = Self::check(entry) {
            warn!("Cannot undo {}: {}", entry.filename, e);
            return Err(e);
        }

        if let Err(e) = mover::move_exact(&entry.destination, &entry.original_path) {
            warn!("Undo failed for {}: {}", entry.filename, e);
            return Err(e);
        }

        // Watch events are debounced, so arming after the move still wins the race
        let restored = resolve_path(&entry.original_path);
        self.suppression.arm(&restored);

        info!("Restored {:?} -> {:?}", entry.destination, restored);
        Ok(restored)
    }

    /// Whether `entry` could be undone right now, without touching anything
    pub fn check(entry: &HistoryEntry) -> Result<()> {
        if !entry.destination.exists() {
            return Err(SortError::SourceMissing(entry.destination.clone()));
        }
        if entry.original_path.exists() {
            return Err(SortError::DestinationOccupied(entry.original_path.clone()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::Ledger;
    use std::fs;

    fn moved_entry(dir: &tempfile::TempDir) -> (Ledger, HistoryEntry) {
        let original = dir.path().join("in/invoice_2024.pdf");
        let destination = dir.path().join("out/Work/Finance/invoice_2024.pdf");
        fs::create_dir_all(destination.parent().unwrap()).unwrap();
        fs::write(&destination, b"%PDF").unwrap();

        let ledger = Ledger::new(dir.path().join("history.json"));
        let entry = ledger
            .log("invoice_2024.pdf", "Work", "Finance", &destination, &original)
            .unwrap();
        (ledger, entry)
    }

    #[test]
    fn test_undo_restores_and_suppresses() {
        let dir = tempfile::tempdir().unwrap();
        let (ledger, entry) = moved_entry(&dir);
        let suppression = Arc::new(SuppressionSet::default());
        let undo = UndoCoordinator::new(suppression.clone());

        let restored = undo.undo(&entry).unwrap();

        assert!(entry.original_path.exists());
        assert!(!entry.destination.exists());
        assert!(suppression.is_suppressed(&restored));
        // The ledger is the caller's business
        assert_eq!(ledger.peek_most_recent(), Some(entry));
    }

    #[test]
    fn test_undo_with_missing_destination_fails_cleanly() {
        let dir = tempfile::tempdir().unwrap();
        let (ledger, entry) = moved_entry(&dir);
        fs::remove_file(&entry.destination).unwrap();
        let suppression = Arc::new(SuppressionSet::default());

        let result = UndoCoordinator::new(suppression.clone()).undo(&entry);

        assert!(matches!(result, Err(SortError::SourceMissing(_))));
        assert!(suppression.is_empty());
        assert_eq!(ledger.entries().len(), 1);
    }

    #[test]
    fn test_undo_never_overwrites_original_location() {
        let dir = tempfile::tempdir().unwrap();
        let (_ledger, entry) = moved_entry(&dir);
        fs::create_dir_all(entry.original_path.parent().unwrap()).unwrap();
        fs::write(&entry.original_path, b"newer file").unwrap();

        let result = UndoCoordinator::new(Arc::new(SuppressionSet::default())).undo(&entry);

        assert!(matches!(result, Err(SortError::DestinationOccupied(_))));
        assert_eq!(fs::read(&entry.original_path).unwrap(), b"newer file");
        assert_eq!(fs::read(&entry.destination).unwrap(), b"%PDF");
    }

    #[test]
    fn test_check_matches_what_undo_would_do() {
        let dir = tempfile::tempdir().unwrap();
        let (_ledger, entry) = moved_entry(&dir);
        assert!(UndoCoordinator::check(&entry).is_ok());

        fs::remove_file(&entry.destination).unwrap();
        assert!(matches!(
            UndoCoordinator::check(&entry),
            Err(SortError::SourceMissing(_))
        ));
        assert!(!entry.original_path.exists());
    }
}
