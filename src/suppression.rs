// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Grace window that keeps just-restored files from being re-sorted
//!
//! Arms live in memory and, when the set is backed by a store file, are also
//! written to `<history_file>.suppress.json`. That lets an undo run from one
//! process silence a watcher running in another.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tracing::warn;

/// How long a restored path is ignored after an undo
pub const SUPPRESSION_WINDOW: Duration = Duration::from_secs(10);

/// Paths restored by undo, keyed by canonical path
pub struct SuppressionSet {
    window: Duration,
    armed: Mutex<HashMap<PathBuf, Instant>>,
    store: Option<PathBuf>,
}

impl Default for SuppressionSet {
    fn default() -> Self {
        Self::new(SUPPRESSION_WINDOW)
    }
}

impl SuppressionSet {
    /// In-process set
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            armed: Mutex::new(HashMap::new()),
            store: None,
        }
    }

    /// Set shared with other processes through `store`
    pub fn shared(store: PathBuf, window: Duration) -> Self {
        Self {
            store: Some(store),
            ..Self::new(window)
        }
    }

    /// Store file that belongs to a history ledger
    pub fn store_path_for(history_file: &Path) -> PathBuf {
        let mut name = history_file
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "history.json".into());
        name.push(".suppress.json");
        history_file.with_file_name(name)
    }

    pub fn store(&self) -> Option<&Path> {
        self.store.as_deref()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<PathBuf, Instant>> {
        // The map holds plain data, so a poisoned guard is still usable
        self.armed.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Start (or restart) the window for `path`
    pub fn arm(&self, path: &Path) {
        self.arm_at(path, Instant::now());
        if let Some(store) = &self.store {
            let _armed = self.lock();
            let now = Utc::now();
            let mut shared = self.read_store(store, now);
            shared.insert(path.to_string_lossy().into_owned(), now);
            self.write_store(store, &shared);
        }
    }

    pub fn arm_at(&self, path: &Path, at: Instant) {
        self.lock().insert(path.to_path_buf(), at);
    }

    /// Whether `path` is inside its window; purges expired entries
    pub fn is_suppressed(&self, path: &Path) -> bool {
        if self.is_suppressed_at(path, Instant::now()) {
            return true;
        }
        match &self.store {
            Some(store) => self.is_suppressed_in_store(store, path),
            None => false,
        }
    }

    pub fn is_suppressed_at(&self, path: &Path, now: Instant) -> bool {
        let mut armed = self.lock();
        armed.retain(|_, at| now.saturating_duration_since(*at) < self.window);
        armed.contains_key(path)
    }

    fn is_suppressed_in_store(&self, store: &Path, path: &Path) -> bool {
        let _armed = self.lock();
        if !store.exists() {
            return false;
        }

        let raw = read_raw(store).unwrap_or_default();
        let before = raw.len();
        let shared = self.unexpired(raw, Utc::now());
        if shared.len() != before {
            self.write_store(store, &shared);
        }
        shared.contains_key(path.to_string_lossy().as_ref())
    }

    /// Unexpired arms from the store; unreadable stores count as empty
    fn read_store(&self, store: &Path, now: DateTime<Utc>) -> HashMap<String, DateTime<Utc>> {
        self.unexpired(read_raw(store).unwrap_or_default(), now)
    }

    fn unexpired(
        &self,
        mut shared: HashMap<String, DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> HashMap<String, DateTime<Utc>> {
        shared.retain(|_, at| {
            now.signed_duration_since(*at)
                .to_std()
                .map(|age| age < self.window)
                // Stamped in the future by a skewed clock
                .unwrap_or(true)
        });
        shared
    }

    fn write_store(&self, store: &Path, shared: &HashMap<String, DateTime<Utc>>) {
        if shared.is_empty() {
            if let Err(e) = fs::remove_file(store) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!("Could not clear suppression store {:?}: {}", store, e);
                }
            }
            return;
        }

        let tmp = store.with_file_name(format!(
            ".{}.{}.tmp",
            store
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            uuid::Uuid::new_v4().simple()
        ));
        let written = serde_json::to_vec(shared)
            .map_err(std::io::Error::from)
            .and_then(|json| {
                let mut file = fs::File::create(&tmp)?;
                file.write_all(&json)?;
                file.sync_all()
            })
            .and_then(|_| fs::rename(&tmp, store));
        if let Err(e) = written {
            let _ = fs::remove_file(&tmp);
            warn!("Could not write suppression store {:?}: {}", store, e);
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn read_raw(store: &Path) -> Option<HashMap<String, DateTime<Utc>>> {
    let content = fs::read_to_string(store).ok()?;
    match serde_json::from_str(&content) {
        Ok(map) => Some(map),
        Err(e) => {
            warn!("Ignoring unreadable suppression store {:?}: {}", store, e);
            None
        }
    }
}
