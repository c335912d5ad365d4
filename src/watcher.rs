// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! File system watcher that feeds new arrivals into the organize pipeline

use notify::event::{CreateKind, ModifyKind, RenameMode};
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::pipeline::{Organizer, Outcome, Placement};
use crate::Result;

/// Called after every file the watcher successfully moves
pub type Observer = Arc<dyn Fn() + Send + Sync>;

/// Quiet period before a path is handed to the pipeline
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(750);

/// What to watch and where files go
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchSettings {
    pub sources: Vec<PathBuf>,
    pub placement: Placement,
    pub debounce: Duration,
}

impl WatchSettings {
    pub fn new(sources: Vec<PathBuf>, placement: Placement) -> Self {
        Self {
            sources,
            placement,
            debounce: DEFAULT_DEBOUNCE,
        }
    }
}

struct Running {
    watchers: Vec<(PathBuf, RecommendedWatcher)>,
    shutdown: watch::Sender<bool>,
    dispatcher: JoinHandle<()>,
}

/// Owns one non-recursive subscription per source folder
pub struct WatchCoordinator {
    organizer: Arc<Organizer>,
    settings: WatchSettings,
    observer: Option<Observer>,
    running: Option<Running>,
}

impl WatchCoordinator {
    pub fn new(organizer: Arc<Organizer>, settings: WatchSettings) -> Self {
        Self {
            organizer,
            settings,
            observer: None,
            running: None,
        }
    }

    pub fn with_observer(mut self, observer: Observer) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn settings(&self) -> &WatchSettings {
        &self.settings
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    /// Folders with a live subscription
    pub fn watched_folders(&self) -> Vec<PathBuf> {
        self.running
            .as_ref()
            .map(|r| r.watchers.iter().map(|(p, _)| p.clone()).collect())
            .unwrap_or_default()
    }

    /// Subscribe to every existing source folder and start dispatching
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&mut self) -> Result<()> {
        if self.running.is_some() {
            debug!("Watcher already running");
            return Ok(());
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let mut watchers = Vec::new();

        for folder in &self.settings.sources {
            if !folder.is_dir() {
                warn!("Source folder {:?} does not exist, skipping", folder);
                continue;
            }

            let tx = tx.clone();
            let mut watcher = RecommendedWatcher::new(
                move |res: notify::Result<Event>| match res {
                    Ok(event) => {
                        for path in arrived_paths(&event) {
                            let _ = tx.send(path);
                        }
                    }
                    Err(e) => warn!("Watch error: {}", e),
                },
                Config::default(),
            )?;
            watcher.watch(folder, RecursiveMode::NonRecursive)?;
            info!("Started watching {:?} ({:?})", folder, self.settings.placement);
            watchers.push((folder.clone(), watcher));
        }
        drop(tx);

        if watchers.is_empty() {
            warn!("No source folders to watch");
        }

        let (shutdown, shutdown_rx) = watch::channel(false);
        let dispatcher = tokio::spawn(dispatch(
            rx,
            shutdown_rx,
            self.organizer.clone(),
            self.settings.placement.clone(),
            self.settings.debounce,
            self.observer.clone(),
        ));

        self.running = Some(Running {
            watchers,
            shutdown,
            dispatcher,
        });
        Ok(())
    }

    /// Drop all subscriptions and wait for the dispatcher to exit
    ///
    /// Events still in their debounce window are discarded. Pipeline runs
    /// already handed off finish on their own.
    pub async fn stop(&mut self) {
        let Some(running) = self.running.take() else {
            return;
        };

        drop(running.watchers);
        let _ = running.shutdown.send(true);
        if let Err(e) = running.dispatcher.await {
            warn!("Watch dispatcher ended abnormally: {}", e);
        }
        info!("Stopped watching");
    }

    /// Replace folders and placement by stopping and starting again
    pub async fn reconfigure(&mut self, sources: Vec<PathBuf>, target: PathBuf, inplace: bool) -> Result<()> {
        self.stop().await;
        self.settings.sources = sources;
        self.settings.placement = Placement::from_flag(target, inplace);
        self.start()
    }

    /// Organize every file already sitting in `folder`
    pub async fn scan(&self, folder: &Path) -> Result<Vec<(PathBuf, Outcome)>> {
        scan_folder(
            &self.organizer,
            &self.settings.placement,
            self.observer.as_ref(),
            folder,
        )
        .await
    }

    /// Like [`scan`](Self::scan), on its own task
    pub fn spawn_scan(&self, folder: PathBuf) -> JoinHandle<Result<Vec<(PathBuf, Outcome)>>> {
        let organizer = self.organizer.clone();
        let placement = self.settings.placement.clone();
        let observer = self.observer.clone();
        tokio::spawn(async move { scan_folder(&organizer, &placement, observer.as_ref(), &folder).await })
    }
}

async fn scan_folder(
    organizer: &Organizer,
    placement: &Placement,
    observer: Option<&Observer>,
    folder: &Path,
) -> Result<Vec<(PathBuf, Outcome)>> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(folder)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_file())
        .collect();
    files.sort();

    info!("Scanning {} existing file(s) in {:?}", files.len(), folder);

    let mut outcomes = Vec::with_capacity(files.len());
    for path in files {
        let outcome = organizer.organize_placed(&path, placement).await;
        if outcome.is_moved() {
            if let Some(notify) = observer {
                notify();
            }
        }
        outcomes.push((path, outcome));
    }
    Ok(outcomes)
}

/// Paths a notify event brings into a watched folder
pub fn arrived_paths(event: &Event) -> Vec<PathBuf> {
    match event.kind {
        EventKind::Create(CreateKind::Folder) => Vec::new(),
        EventKind::Create(_) => event.paths.clone(),
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => event.paths.clone(),
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            event.paths.get(1).cloned().into_iter().collect()
        }
        // Backends that cannot tell the two sides apart
        EventKind::Modify(ModifyKind::Name(RenameMode::Any)) => {
            event.paths.iter().filter(|p| p.is_file()).cloned().collect()
        }
        _ => Vec::new(),
    }
}

async fn dispatch(
    mut events: mpsc::UnboundedReceiver<PathBuf>,
    mut shutdown: watch::Receiver<bool>,
    organizer: Arc<Organizer>,
    placement: Placement,
    debounce: Duration,
    observer: Option<Observer>,
) {
    let mut pending: HashMap<PathBuf, Instant> = HashMap::new();

    loop {
        let next_due = pending.values().min().copied();

        tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            received = events.recv() => match received {
                Some(path) => {
                    debug!("Event for {:?}", path);
                    pending.insert(path, Instant::now() + debounce);
                }
                None => break,
            },
            _ = sleep_until(next_due) => {
                let now = Instant::now();
                let due: Vec<PathBuf> = pending
                    .iter()
                    .filter(|(_, at)| **at <= now)
                    .map(|(p, _)| p.clone())
                    .collect();
                for path in due {
                    pending.remove(&path);
                    spawn_run(path, organizer.clone(), placement.clone(), observer.clone());
                }
            }
        }
    }

    if !pending.is_empty() {
        debug!("Dropping {} undispatched event(s)", pending.len());
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

fn spawn_run(path: PathBuf, organizer: Arc<Organizer>, placement: Placement, observer: Option<Observer>) {
    tokio::spawn(async move {
        let outcome = organizer.organize_placed(&path, &placement).await;
        debug!("{:?} -> {:?}", path, outcome);
        if outcome.is_moved() {
            if let Some(notify) = observer {
                notify();
            }
        }
    });
}
