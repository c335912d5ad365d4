// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

#![allow(dead_code)]

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use sortwise::classifier::{Classification, Classifier};
use sortwise::history::Ledger;
use sortwise::pipeline::Organizer;
use sortwise::stability::StabilityProbe;
use sortwise::suppression::{SuppressionSet, SUPPRESSION_WINDOW};

/// Classifies by keywords in the name, counting calls
#[derive(Default)]
pub struct KeywordClassifier {
    pub calls: AtomicUsize,
}

#[async_trait]
impl Classifier for KeywordClassifier {
    async fn classify(&self, filename: &str) -> Classification {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if filename.contains("invoice") {
            Classification::new("Work", "Finance")
        } else if filename.contains("setup") {
            Classification::new("Installers", "Windows")
        } else {
            Classification::default()
        }
    }
}

pub fn fast_probe() -> StabilityProbe {
    StabilityProbe::new(Duration::from_millis(400), Duration::from_millis(20))
}

pub struct Harness {
    pub root: tempfile::TempDir,
    pub source: PathBuf,
    pub target: PathBuf,
    pub classifier: Arc<KeywordClassifier>,
    pub ledger: Arc<Ledger>,
    pub suppression: Arc<SuppressionSet>,
    pub organizer: Arc<Organizer>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_suppression(SuppressionSet::default())
    }

    pub fn with_suppression(suppression: SuppressionSet) -> Self {
        Self::build(suppression, |root| root.join("history.json"))
    }

    /// Suppression backed by a store next to the ledger, like the binaries use
    pub fn shared() -> Self {
        Self::build_with(|root| {
            let ledger = root.join("history.json");
            let store = SuppressionSet::store_path_for(&ledger);
            (SuppressionSet::shared(store, SUPPRESSION_WINDOW), ledger)
        })
    }

    pub fn build(suppression: SuppressionSet, ledger_path: impl FnOnce(&Path) -> PathBuf) -> Self {
        Self::build_with(|root| (suppression, ledger_path(root)))
    }

    pub fn build_with(setup: impl FnOnce(&Path) -> (SuppressionSet, PathBuf)) -> Self {
        let root = tempfile::tempdir().unwrap();
        let (suppression, ledger_path) = setup(root.path());
        let source = root.path().join("source");
        let target = root.path().join("target");
        std::fs::create_dir_all(&source).unwrap();
        std::fs::create_dir_all(&target).unwrap();

        let classifier = Arc::new(KeywordClassifier::default());
        let ledger = Arc::new(Ledger::new(ledger_path));
        let suppression = Arc::new(suppression);
        let organizer = Arc::new(
            Organizer::new(classifier.clone(), ledger.clone(), suppression.clone())
                .with_probe(fast_probe()),
        );

        Self {
            root,
            source,
            target,
            classifier,
            ledger,
            suppression,
            organizer,
        }
    }

    /// Write `name` into the source folder
    pub fn drop_file(&self, name: &str, contents: &[u8]) -> PathBuf {
        let path = self.source.join(name);
        std::fs::write(&path, contents).unwrap();
        path
    }
}

/// Poll until `cond` holds or `timeout` passes
pub async fn eventually(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    cond()
}
