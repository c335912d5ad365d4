// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Per-file organize pipeline
//!
//! suppression check → existence and name filters → stability wait →
//! classify → move → log. Each run ends in exactly one [`Outcome`].

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::sync::OwnedMutexGuard;
use tracing::{debug, error, info, warn};

use crate::classifier::Classifier;
use crate::history::{HistoryEntry, Ledger};
use crate::mover;
use crate::stability::StabilityProbe;
use crate::suppression::SuppressionSet;

/// Name suffixes browsers and download managers use for unfinished files
const IN_PROGRESS_SUFFIXES: [&str; 5] = [".tmp", ".crdownload", ".part", ".partial", ".download"];

/// OS metadata files that are never organized
const SYSTEM_FILES: [&str; 3] = ["desktop.ini", "thumbs.db", ".ds_store"];

/// Where organized files are rooted
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Placement {
    /// Every file goes under one shared target root
    Shared(PathBuf),
    /// Each file goes under the folder it arrived in
    InPlace,
}

impl Placement {
    pub fn from_flag(target: PathBuf, inplace: bool) -> Self {
        if inplace {
            Placement::InPlace
        } else {
            Placement::Shared(target)
        }
    }

    /// Destination root for `file`
    pub fn root_for(&self, file: &Path) -> Option<PathBuf> {
        match self {
            Placement::Shared(root) => Some(root.clone()),
            Placement::InPlace => file.parent().map(Path::to_path_buf),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterReason {
    /// Nothing at the path any more
    Missing,
    /// A directory or other non-regular entry
    NotAFile,
    /// Download still in progress (`.part`, `.crdownload`, ...)
    InProgress,
    /// Hidden or OS metadata file
    Ignored,
}

/// Terminal state of one pipeline run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Restored by a recent undo
    Suppressed,
    Filtered(FilterReason),
    /// Still changing when the stability probe gave up
    Unstable,
    Moved(HistoryEntry),
    MoveFailed(String),
}

impl Outcome {
    pub fn is_moved(&self) -> bool {
        matches!(self, Outcome::Moved(_))
    }
}

/// Why a file name should not be organized, if any
pub fn skip_reason(path: &Path) -> Option<FilterReason> {
    let name = match path.file_name().and_then(|n| n.to_str()) {
        Some(n) => n.to_ascii_lowercase(),
        None => return Some(FilterReason::Ignored),
    };

    if IN_PROGRESS_SUFFIXES.iter().any(|ext| name.ends_with(ext)) {
        return Some(FilterReason::InProgress);
    }
    if name.starts_with('.') || SYSTEM_FILES.contains(&name.as_str()) {
        return Some(FilterReason::Ignored);
    }

    None
}

/// Absolute form of `path` with its parent canonicalized
///
/// The final component is never followed, so a symlink resolves to the
/// link itself rather than to whatever it points at.
pub fn resolve_path(path: &Path) -> PathBuf {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        match std::env::current_dir() {
            Ok(cwd) => cwd.join(path),
            Err(_) => path.to_path_buf(),
        }
    };

    match (absolute.parent(), absolute.file_name()) {
        (Some(parent), Some(name)) => match std::fs::canonicalize(parent) {
            Ok(parent) => parent.join(name),
            Err(_) => absolute,
        },
        _ => absolute,
    }
}

/// Serializes runs for the same canonical path
#[derive(Default)]
struct PathLocks {
    locks: Mutex<HashMap<PathBuf, Arc<tokio::sync::Mutex<()>>>>,
}

impl PathLocks {
    async fn acquire(&self, path: &Path) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|p| p.into_inner());
            // Entries nobody holds or waits on
            locks.retain(|_, l| Arc::strong_count(l) > 1);
            locks.entry(path.to_path_buf()).or_default().clone()
        };
        lock.lock_owned().await
    }
}

/// Runs the organize pipeline for individual files
pub struct Organizer {
    classifier: Arc<dyn Classifier>,
    ledger: Arc<Ledger>,
    suppression: Arc<SuppressionSet>,
    probe: StabilityProbe,
    path_locks: PathLocks,
}

impl Organizer {
    pub fn new(
        classifier: Arc<dyn Classifier>,
        ledger: Arc<Ledger>,
        suppression: Arc<SuppressionSet>,
    ) -> Self {
        Self {
            classifier,
            ledger,
            suppression,
            probe: StabilityProbe::default(),
            path_locks: PathLocks::default(),
        }
    }

    pub fn with_probe(mut self, probe: StabilityProbe) -> Self {
        self.probe = probe;
        self
    }

    pub fn ledger(&self) -> &Arc<Ledger> {
        &self.ledger
    }

    pub fn suppression(&self) -> &Arc<SuppressionSet> {
        &self.suppression
    }

    /// Ledger and suppression store files are never organized
    fn is_own_state(&self, path: &Path) -> bool {
        path == resolve_path(self.ledger.path())
            || self
                .suppression
                .store()
                .is_some_and(|store| path == resolve_path(store))
    }

    /// Organize `path` under the root chosen by `placement`
    pub async fn organize_placed(&self, path: &Path, placement: &Placement) -> Outcome {
        let resolved = resolve_path(path);
        match placement.root_for(&resolved) {
            Some(root) => self.organize(&resolved, &root).await,
            None => Outcome::Filtered(FilterReason::NotAFile),
        }
    }

    /// Organize `path` into `target_root/folder/subfolder/`
    pub async fn organize(&self, path: &Path, target_root: &Path) -> Outcome {
        let path = resolve_path(path);
        let _guard = self.path_locks.acquire(&path).await;

        if self.suppression.is_suppressed(&path) {
            info!("Skipping {:?} (recently undone)", path);
            return Outcome::Suppressed;
        }

        match std::fs::symlink_metadata(&path) {
            Ok(meta) if meta.file_type().is_file() => {}
            Ok(_) => return Outcome::Filtered(FilterReason::NotAFile),
            Err(_) => {
                debug!("{:?} is gone before processing", path);
                return Outcome::Filtered(FilterReason::Missing);
            }
        }

        if self.is_own_state(&path) {
            return Outcome::Filtered(FilterReason::Ignored);
        }

        if let Some(reason) = skip_reason(&path) {
            debug!("Skipping {:?}: {:?}", path, reason);
            return Outcome::Filtered(reason);
        }

        if !self.probe.wait(&path).await {
            info!("{:?} did not settle within {:?}, leaving it", path, self.probe.timeout);
            return Outcome::Unstable;
        }

        let filename = match path.file_name() {
            Some(n) => n.to_string_lossy().into_owned(),
            None => return Outcome::Filtered(FilterReason::NotAFile),
        };

        info!("Processing file: {:?}", path);
        let classification = self.classifier.classify(&filename).await;
        debug!("{} classified as {}", filename, classification.category());

        let destination = {
            let src = path.clone();
            let root = target_root.to_path_buf();
            let classification = classification.clone();
            match tokio::task::spawn_blocking(move || mover::organize(&src, &root, &classification)).await {
                Ok(Ok(dest)) => dest,
                Ok(Err(e)) => {
                    warn!("Failed to organize {}: {}", filename, e);
                    return Outcome::MoveFailed(e.to_string());
                }
                Err(e) => {
                    error!("Move task for {} aborted: {}", filename, e);
                    return Outcome::MoveFailed(e.to_string());
                }
            }
        };

        match self.ledger.log(
            &filename,
            &classification.folder,
            &classification.subfolder,
            &destination,
            &path,
        ) {
            Ok(entry) => {
                info!("Moved {} to {:?}", filename, destination);
                Outcome::Moved(entry)
            }
            Err(e) => {
                warn!("Could not record move of {}, putting it back: {}", filename, e);
                match mover::move_exact(&destination, &path) {
                    // The restore fires fresh events for the same path
                    Ok(()) => self.suppression.arm(&path),
                    Err(back) => error!(
                        "{} left untracked at {:?}; restoring failed: {}",
                        filename, destination, back
                    ),
                }
                Outcome::MoveFailed(e.to_string())
            }
        }
    }
}
