//! Directory watching.
//!
//! Each watched root owns a `notify` watcher whose callback feeds an event
//! loop. The loop classifies events, debounces writes per path and pushes
//! [`IngestTask`]s onto one bounded queue shared by every root. A fixed pool
//! of workers drains the queue through the [`Ingestor`].

use crate::config::WatchConfig;
use crate::pipeline::{IngestOutcome, Ingestor};
use crate::scanner::{walk_audio_files, PathFilter};
use anyhow::Context;
use notify::event::{AccessKind, AccessMode, MetadataKind, ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, Mutex as AsyncMutex};
use tokio::task::{self, JoinHandle};
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FsChange {
    Upsert,
    Remove,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestTask {
    pub path: PathBuf,
    pub change: FsChange,
}

/// Progress messages for whoever is displaying watch activity.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum WatchNotice {
    /// The initial scan of `root` finished queueing `files` existing files.
    ScanQueued { root: PathBuf, files: u64 },
    Indexed { path: PathBuf, outcome: IngestOutcome },
    Removed { path: PathBuf, rows: u64 },
    Failed { path: PathBuf, error: String },
}

/// Maps a raw notification onto catalog actions. `exists` resolves events
/// whose kind alone does not say whether the path is still there.
pub fn classify(event: &Event, exists: impl Fn(&Path) -> bool) -> Vec<(PathBuf, FsChange)> {
    let probe = |p: &PathBuf| {
        let change = if exists(p) {
            FsChange::Upsert
        } else {
            FsChange::Remove
        };
        (p.clone(), change)
    };
    let all = |change: FsChange| {
        event
            .paths
            .iter()
            .map(|p| (p.clone(), change))
            .collect::<Vec<_>>()
    };

    match &event.kind {
        EventKind::Create(_) => all(FsChange::Upsert),
        EventKind::Remove(_) => all(FsChange::Remove),
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => all(FsChange::Remove),
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => all(FsChange::Upsert),
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => match event.paths.as_slice() {
            [from, to, ..] => vec![
                (from.clone(), FsChange::Remove),
                (to.clone(), FsChange::Upsert),
            ],
            other => other.iter().map(probe).collect(),
        },
        EventKind::Modify(ModifyKind::Name(_)) => event.paths.iter().map(probe).collect(),
        EventKind::Modify(ModifyKind::Metadata(MetadataKind::WriteTime)) => {
            all(FsChange::Upsert)
        }
        EventKind::Modify(ModifyKind::Metadata(_)) => Vec::new(),
        EventKind::Modify(_) => all(FsChange::Upsert),
        EventKind::Access(AccessKind::Close(AccessMode::Write)) => all(FsChange::Upsert),
        EventKind::Access(_) => Vec::new(),
        EventKind::Any | EventKind::Other => event.paths.iter().map(probe).collect(),
    }
}

/// Paths currently being processed. A task for a busy path is folded into a
/// single follow-up run so changes to one path commit in arrival order.
#[derive(Debug, Default)]
pub struct InFlight {
    slots: parking_lot::Mutex<HashMap<PathBuf, Option<FsChange>>>,
}

impl InFlight {
    /// Returns true if the caller now owns `path`; otherwise records `change`
    /// as the owner's follow-up.
    pub fn claim(&self, path: &Path, change: FsChange) -> bool {
        let mut slots = self.slots.lock();
        if let Some(next) = slots.get_mut(path) {
            *next = Some(change);
            return false;
        }
        slots.insert(path.to_path_buf(), None);
        true
    }

    /// The follow-up change for `path`, or `None` after releasing it.
    pub fn next(&self, path: &Path) -> Option<FsChange> {
        let mut slots = self.slots.lock();
        match slots.get_mut(path) {
            Some(next) if next.is_some() => next.take(),
            _ => {
                slots.remove(path);
                None
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.slots.lock().is_empty()
    }
}

struct Shared {
    ingestor: Ingestor,
    notices: broadcast::Sender<WatchNotice>,
    in_flight: InFlight,
}

impl Shared {
    async fn handle(&self, task: IngestTask) {
        if !self.in_flight.claim(&task.path, task.change) {
            debug!(path = %task.path.display(), "path busy; folded into follow-up");
            return;
        }
        let mut change = task.change;
        loop {
            self.run(&task.path, change).await;
            match self.in_flight.next(&task.path) {
                Some(next) => change = next,
                None => break,
            }
        }
    }

    async fn run(&self, path: &Path, change: FsChange) {
        let notice = match change {
            FsChange::Upsert => match self.ingestor.ingest(path).await {
                Ok(outcome) => WatchNotice::Indexed {
                    path: path.to_path_buf(),
                    outcome,
                },
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "ingestion failed");
                    WatchNotice::Failed {
                        path: path.to_path_buf(),
                        error: err.to_string(),
                    }
                }
            },
            FsChange::Remove => match self.ingestor.remove(path).await {
                Ok(rows) => WatchNotice::Removed {
                    path: path.to_path_buf(),
                    rows,
                },
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "removal failed");
                    WatchNotice::Failed {
                        path: path.to_path_buf(),
                        error: err.to_string(),
                    }
                }
            },
        };
        // No subscribers is fine.
        let _ = self.notices.send(notice);
    }
}

struct RootWatch {
    watcher: RecommendedWatcher,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// Watches any number of directory roots and keeps the catalog in step.
pub struct WatchController {
    shared: Arc<Shared>,
    config: WatchConfig,
    queue: mpsc::Sender<IngestTask>,
    roots: parking_lot::Mutex<HashMap<PathBuf, RootWatch>>,
    workers: Vec<JoinHandle<()>>,
}

impl WatchController {
    /// Spawns the worker pool. Must be called inside a Tokio runtime.
    pub fn start(ingestor: Ingestor, config: WatchConfig) -> Self {
        let (notices, _) = broadcast::channel(1024);
        let shared = Arc::new(Shared {
            ingestor,
            notices,
            in_flight: InFlight::default(),
        });
        let (queue, rx) = mpsc::channel(config.queue_capacity.max(1));
        let rx = Arc::new(AsyncMutex::new(rx));
        let workers = (0..config.workers.max(1))
            .map(|id| {
                let rx = Arc::clone(&rx);
                let shared = Arc::clone(&shared);
                tokio::spawn(worker_loop(id, rx, shared))
            })
            .collect();
        Self {
            shared,
            config,
            queue,
            roots: parking_lot::Mutex::new(HashMap::new()),
            workers,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<WatchNotice> {
        self.shared.notices.subscribe()
    }

    /// Starts watching `root` (recursively) and queues its existing audio
    /// files. Returns the canonical root; watching a root twice is a no-op.
    pub fn watch(&self, root: &Path) -> anyhow::Result<PathBuf> {
        let root = std::fs::canonicalize(root)
            .with_context(|| format!("cannot watch {}", root.display()))?;
        if !root.is_dir() {
            anyhow::bail!("not a directory: {}", root.display());
        }
        let mut roots = self.roots.lock();
        if roots.contains_key(&root) {
            return Ok(root);
        }

        let filter = PathFilter::new(&root, &self.config.exclude)?;
        let (tx, rx) = mpsc::unbounded_channel::<notify::Result<Event>>();
        let mut watcher = RecommendedWatcher::new(
            move |res| {
                let _ = tx.send(res);
            },
            notify::Config::default(),
        )?;
        watcher.watch(&root, RecursiveMode::Recursive)?;

        let cancel = CancellationToken::new();
        let event_loop = RootLoop {
            filter,
            debounce: self.config.debounce(),
            queue: self.queue.clone(),
            notices: self.shared.notices.clone(),
            cancel: cancel.clone(),
        };
        let task = tokio::spawn(event_loop.run(rx));
        info!(
            root = %root.display(),
            debounce_ms = self.config.debounce_ms,
            "watching"
        );
        roots.insert(
            root.clone(),
            RootWatch {
                watcher,
                cancel,
                task,
            },
        );
        Ok(root)
    }

    pub fn roots(&self) -> Vec<PathBuf> {
        let mut roots: Vec<PathBuf> = self.roots.lock().keys().cloned().collect();
        roots.sort();
        roots
    }

    /// Stops dispatching for `root`. Tasks already queued or running finish.
    pub async fn unwatch(&self, root: &Path) -> bool {
        let key = std::fs::canonicalize(root).unwrap_or_else(|_| root.to_path_buf());
        let entry = self.roots.lock().remove(&key);
        match entry {
            Some(watch) => {
                stop_root(watch).await;
                info!(root = %key.display(), "stopped watching");
                true
            }
            None => false,
        }
    }

    /// Stops every root, then lets the workers drain the queue.
    pub async fn shutdown(self) {
        let roots: Vec<RootWatch> = self.roots.lock().drain().map(|(_, w)| w).collect();
        for watch in roots {
            stop_root(watch).await;
        }
        drop(self.queue);
        for worker in self.workers {
            if let Err(err) = worker.await {
                warn!(error = %err, "watch worker panicked");
            }
        }
    }
}

async fn stop_root(watch: RootWatch) {
    watch.cancel.cancel();
    drop(watch.watcher);
    if let Err(err) = watch.task.await {
        warn!(error = %err, "watch loop panicked");
    }
}

async fn worker_loop(
    id: usize,
    rx: Arc<AsyncMutex<mpsc::Receiver<IngestTask>>>,
    shared: Arc<Shared>,
) {
    loop {
        let task = {
            let mut rx = rx.lock().await;
            rx.recv().await
        };
        let Some(task) = task else {
            debug!(worker = id, "queue closed");
            break;
        };
        shared.handle(task).await;
    }
}

enum Discovery {
    /// Already on disk when the watch started.
    Existing(PathBuf),
    /// Found inside a directory that appeared while watching.
    Appeared(PathBuf),
    ScanDone(u64),
}

struct RootLoop {
    filter: PathFilter,
    debounce: Duration,
    queue: mpsc::Sender<IngestTask>,
    notices: broadcast::Sender<WatchNotice>,
    cancel: CancellationToken,
}

impl RootLoop {
    async fn run(self, mut events: mpsc::UnboundedReceiver<notify::Result<Event>>) {
        let (found_tx, mut found_rx) = mpsc::channel::<Discovery>(256);
        let scan_filter = self.filter.clone();
        let scan_tx = found_tx.clone();
        task::spawn_blocking(move || {
            let mut files = 0u64;
            walk_audio_files(&scan_filter, |path| {
                files += 1;
                scan_tx.blocking_send(Discovery::Existing(path)).is_ok()
            });
            let _ = scan_tx.blocking_send(Discovery::ScanDone(files));
        });

        let mut pending: HashMap<PathBuf, Instant> = HashMap::new();
        loop {
            let next_due = pending.values().min().copied();
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                found = found_rx.recv() => match found {
                    Some(Discovery::Existing(path)) => {
                        if !self.dispatch(path, FsChange::Upsert).await {
                            break;
                        }
                    }
                    Some(Discovery::Appeared(path)) => {
                        pending.insert(path, Instant::now() + self.debounce);
                    }
                    Some(Discovery::ScanDone(files)) => {
                        info!(root = %self.filter.root().display(), files, "initial scan queued");
                        let _ = self.notices.send(WatchNotice::ScanQueued {
                            root: self.filter.root().to_path_buf(),
                            files,
                        });
                    }
                    None => break,
                },
                event = events.recv() => match event {
                    Some(Ok(event)) => {
                        if !self.on_event(&event, &mut pending, &found_tx).await {
                            break;
                        }
                    }
                    Some(Err(err)) => warn!(error = %err, "watch error"),
                    None => break,
                },
                _ = sleep_until(next_due.unwrap_or_else(|| Instant::now() + Duration::from_secs(3600))), if next_due.is_some() => {
                    let now = Instant::now();
                    let due: Vec<PathBuf> = pending
                        .iter()
                        .filter(|(_, at)| **at <= now)
                        .map(|(p, _)| p.clone())
                        .collect();
                    for path in due {
                        pending.remove(&path);
                        if !self.dispatch(path, FsChange::Upsert).await {
                            return;
                        }
                    }
                }
            }
        }
        if !pending.is_empty() {
            debug!(
                root = %self.filter.root().display(),
                dropped = pending.len(),
                "watch stopped with pending writes"
            );
        }
    }

    /// Returns false once the queue is closed.
    async fn on_event(
        &self,
        event: &Event,
        pending: &mut HashMap<PathBuf, Instant>,
        found_tx: &mpsc::Sender<Discovery>,
    ) -> bool {
        for (path, change) in classify(event, |p| p.exists()) {
            if !self.filter.in_scope(&path) {
                continue;
            }
            match change {
                FsChange::Remove => {
                    pending.remove(&path);
                    if !self.dispatch(path, FsChange::Remove).await {
                        return false;
                    }
                }
                FsChange::Upsert if self.filter.accepts_audio(&path) => {
                    debug!(path = %path.display(), "write observed");
                    pending.insert(path, Instant::now() + self.debounce);
                }
                FsChange::Upsert if path.is_dir() => {
                    // A directory moved or copied in: its files raise no events of their own.
                    let filter = match PathFilter::new(&path, &[]) {
                        Ok(f) => f,
                        Err(_) => continue,
                    };
                    let outer = self.filter.clone();
                    let tx = found_tx.clone();
                    task::spawn_blocking(move || {
                        walk_audio_files(&filter, |p| {
                            if !outer.accepts_audio(&p) {
                                return true;
                            }
                            tx.blocking_send(Discovery::Appeared(p)).is_ok()
                        });
                    });
                }
                FsChange::Upsert => {}
            }
        }
        true
    }

    async fn dispatch(&self, path: PathBuf, change: FsChange) -> bool {
        if self.cancel.is_cancelled() {
            return true;
        }
        self.queue.send(IngestTask { path, change }).await.is_ok()
    }
}
