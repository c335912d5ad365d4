// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! History management for undo support
//!
//! The ledger is a JSON array on disk, newest entry first, capped at
//! [`MAX_ENTRIES`]. Every mutation is a locked load-modify-persist, and the
//! persist step replaces the file by rename so readers never see a partial
//! write.

use chrono::Local;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tracing::warn;

use crate::Result;

/// Most entries kept on disk
pub const MAX_ENTRIES: usize = 100;

/// A single completed move
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: String,
    pub timestamp: String,
    pub filename: String,
    /// `folder/subfolder`
    pub category: String,
    pub destination: PathBuf,
    pub original_path: PathBuf,
}

/// Ledger of moves that can be undone
pub struct Ledger {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl Ledger {
    /// Create a ledger backed by `path`
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            write_lock: Mutex::new(()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ()> {
        self.write_lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Record a move at the head of the ledger
    pub fn log(
        &self,
        filename: &str,
        folder: &str,
        subfolder: &str,
        destination: &Path,
        original_path: &Path,
    ) -> Result<HistoryEntry> {
        let entry = HistoryEntry {
            id: uuid::Uuid::new_v4().to_string(),
            timestamp: Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
            filename: filename.to_string(),
            category: format!("{}/{}", folder, subfolder),
            destination: destination.to_path_buf(),
            original_path: original_path.to_path_buf(),
        };

        let _guard = self.lock();
        let mut entries = self.read_all();
        entries.insert(0, entry.clone());
        entries.truncate(MAX_ENTRIES);
        self.persist(&entries)?;

        Ok(entry)
    }

    /// All entries, newest first. Unreadable state reads as empty.
    pub fn entries(&self) -> Vec<HistoryEntry> {
        self.read_all()
    }

    /// Get the most recent N entries (newest first)
    pub fn recent(&self, count: usize) -> Vec<HistoryEntry> {
        let mut entries = self.read_all();
        entries.truncate(count);
        entries
    }

    pub fn peek_most_recent(&self) -> Option<HistoryEntry> {
        self.read_all().into_iter().next()
    }

    /// Drop the head entry and return it
    pub fn remove_most_recent(&self) -> Result<Option<HistoryEntry>> {
        let _guard = self.lock();
        let mut entries = self.read_all();
        if entries.is_empty() {
            return Ok(None);
        }
        let removed = entries.remove(0);
        self.persist(&entries)?;
        Ok(Some(removed))
    }

    /// Drop the entry with `id`, wherever it sits
    pub fn remove(&self, id: &str) -> Result<Option<HistoryEntry>> {
        let _guard = self.lock();
        let mut entries = self.read_all();
        let Some(pos) = entries.iter().position(|e| e.id == id) else {
            return Ok(None);
        };
        let removed = entries.remove(pos);
        self.persist(&entries)?;
        Ok(Some(removed))
    }

    /// Clear all history
    pub fn clear(&self) -> Result<()> {
        let _guard = self.lock();
        if self.path.exists() {
            fs::remove_file(&self.path)?;
        }
        Ok(())
    }

    /// Get ledger file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> Vec<HistoryEntry> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Vec::new(),
            Err(e) => {
                warn!("Failed to read history {:?}: {}", self.path, e);
                return Vec::new();
            }
        };

        match serde_json::from_str(&content) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Failed to parse history {:?}, treating as empty: {}", self.path, e);
                Vec::new()
            }
        }
    }

    fn persist(&self, entries: &[HistoryEntry]) -> Result<()> {
        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir)?;

        let file_name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "history.json".to_string());
        let tmp = dir.join(format!(".{}.{}.tmp", file_name, uuid::Uuid::new_v4().simple()));

        let json = serde_json::to_string_pretty(entries)?;
        let written = fs::File::create(&tmp).and_then(|mut file| {
            file.write_all(json.as_bytes())?;
            file.sync_all()
        });
        if let Err(e) = written.and_then(|_| fs::rename(&tmp, &self.path)) {
            let _ = fs::remove_file(&tmp);
            return Err(e.into());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ledger_in(dir: &tempfile::TempDir) -> Ledger {
        Ledger::new(dir.path().join("history.json"))
    }

    fn log_n(ledger: &Ledger, n: usize) {
        for i in 0..n {
            let name = format!("file_{}.txt", i);
            ledger
                .log(
                    &name,
                    "Documents",
                    "Text",
                    &PathBuf::from(format!("/t/Documents/Text/{}", name)),
                    &PathBuf::from(format!("/s/{}", name)),
                )
                .unwrap();
        }
    }

    #[test]
    fn test_log_prepends_newest() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = ledger_in(&dir);
        log_n(&ledger, 3);

        let entries = ledger.entries();
        let names: Vec<_> = entries.iter().map(|e| e.filename.as_str()).collect();
        assert_eq!(names, ["file_2.txt", "file_1.txt", "file_0.txt"]);
        assert_eq!(entries[0].category, "Documents/Text");
    }

    #[test]
    fn test_ledger_is_capped() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = ledger_in(&dir);
        log_n(&ledger, MAX_ENTRIES + 7);

        let entries = ledger.entries();
        assert_eq!(entries.len(), MAX_ENTRIES);
        assert_eq!(entries[0].filename, format!("file_{}.txt", MAX_ENTRIES + 6));
        assert_eq!(entries[MAX_ENTRIES - 1].filename, "file_7.txt");
    }

    #[test]
    fn test_corrupt_ledger_reads_empty_and_recovers() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = ledger_in(&dir);
        fs::write(ledger.path(), "[{\"id\": \"trunc").unwrap();

        assert!(ledger.entries().is_empty());
        assert!(ledger.peek_most_recent().is_none());

        log_n(&ledger, 1);
        assert_eq!(ledger.entries().len(), 1);
    }

    #[test]
    fn test_remove_most_recent() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = ledger_in(&dir);
        assert!(ledger.remove_most_recent().unwrap().is_none());

        log_n(&ledger, 2);
        let removed = ledger.remove_most_recent().unwrap().unwrap();
        assert_eq!(removed.filename, "file_1.txt");
        assert_eq!(ledger.peek_most_recent().unwrap().filename, "file_0.txt");
    }

    #[test]
    fn test_remove_by_id() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = ledger_in(&dir);
        log_n(&ledger, 3);
        let middle = ledger.entries()[1].clone();

        assert_eq!(ledger.remove(&middle.id).unwrap(), Some(middle));
        assert_eq!(ledger.entries().len(), 2);
        assert!(ledger.remove("no-such-id").unwrap().is_none());
    }

    #[test]
    fn test_persisted_shape() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = ledger_in(&dir);
        log_n(&ledger, 1);

        let raw: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(ledger.path()).unwrap()).unwrap();
        let first = &raw.as_array().unwrap()[0];
        for key in ["id", "timestamp", "filename", "category", "destination", "original_path"] {
            assert!(first.get(key).is_some(), "missing {}", key);
        }
    }

    #[test]
    fn test_concurrent_logs_are_not_lost() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = std::sync::Arc::new(ledger_in(&dir));

        let handles: Vec<_> = (0..8)
            .map(|t| {
                let ledger = ledger.clone();
                std::thread::spawn(move || {
                    for i in 0..5 {
                        let name = format!("t{}_{}.bin", t, i);
                        ledger
                            .log(&name, "Other", "Misc", Path::new("/t/x"), Path::new("/s/x"))
                            .unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(ledger.entries().len(), 40);
    }
}
