//! Exchange directory watcher.
//!
//! A `notify` watcher (native OS events, or polling for network shares)
//! feeds raw events into a background thread. That thread classifies paths
//! by extension, coalesces bursts per path with a [`Debouncer`], and
//! publishes one [`FileEvent`] per path once it has been quiet for the
//! debounce window. Sync latency is therefore bounded by the debounce
//! window, plus the poll interval in [`WatchMode::Poll`].
//!
//! ```text
//! notify callback --mpsc--> worker thread --debounce--> EventBus<FileEvent>
//! ```

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use courier_shared::constants::{DEFAULT_DEBOUNCE_MS, DEFAULT_POLL_INTERVAL_MS};
use courier_shared::EntityKind;
use notify::event::{ModifyKind, RenameMode};
use notify::{EventKind, PollWatcher, RecommendedWatcher, RecursiveMode, Watcher};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::error::{Result, StoreError};
use crate::events::{EventBus, SubscriptionId};

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FileChange {
    Created,
    Modified,
    Removed,
}

/// A debounced change to one entity file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEvent {
    pub path: PathBuf,
    pub kind: FileChange,
    pub entity: EntityKind,
}

/// How filesystem changes are detected.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WatchMode {
    /// inotify / FSEvents / ReadDirectoryChangesW.
    #[default]
    Native,
    /// Periodic directory scan, for shared folders that do not deliver
    /// native notifications (NFS, SMB).
    Poll,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatcherConfig {
    pub debounce: Duration,
    pub mode: WatchMode,
    pub poll_interval: Duration,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(DEFAULT_DEBOUNCE_MS),
            mode: WatchMode::Native,
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum WatcherState {
    Stopped,
    Watching,
}

// ---------------------------------------------------------------------------
// Debouncer
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct Pending {
    kind: FileChange,
    entity: EntityKind,
    last_seen: Instant,
}

/// Per-path burst coalescing. A path is ready once no event has been seen
/// for it during a full window; every new event restarts its window.
#[derive(Debug)]
pub struct Debouncer {
    window: Duration,
    pending: HashMap<PathBuf, Pending>,
}

impl Debouncer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            pending: HashMap::new(),
        }
    }

    pub fn push(&mut self, path: PathBuf, kind: FileChange, entity: EntityKind, now: Instant) {
        self.pending
            .entry(path)
            .and_modify(|p| {
                p.kind = coalesce(p.kind, kind);
                p.last_seen = now;
            })
            .or_insert(Pending {
                kind,
                entity,
                last_seen: now,
            });
    }

    /// Earliest instant at which some pending path becomes ready.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending
            .values()
            .map(|p| p.last_seen + self.window)
            .min()
    }

    /// Events whose window has elapsed, users first, then messages, then
    /// read-sets.
    pub fn drain_ready(&mut self, now: Instant) -> Vec<FileEvent> {
        let window = self.window;
        let ready: Vec<PathBuf> = self
            .pending
            .iter()
            .filter(|(_, p)| now.saturating_duration_since(p.last_seen) >= window)
            .map(|(path, _)| path.clone())
            .collect();

        let mut events: Vec<FileEvent> = ready
            .into_iter()
            .filter_map(|path| {
                let p = self.pending.remove(&path)?;
                Some(FileEvent {
                    path,
                    kind: p.kind,
                    entity: p.entity,
                })
            })
            .collect();
        events.sort_by_key(|e| e.entity);
        events
    }

    /// Everything still pending, in the same order as [`Self::drain_ready`].
    pub fn drain_all(&mut self) -> Vec<FileEvent> {
        let mut events: Vec<FileEvent> = self
            .pending
            .drain()
            .map(|(path, p)| FileEvent {
                path,
                kind: p.kind,
                entity: p.entity,
            })
            .collect();
        events.sort_by_key(|e| e.entity);
        events
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

/// Net effect of two successive changes to the same path.
fn coalesce(previous: FileChange, next: FileChange) -> FileChange {
    match (previous, next) {
        (_, FileChange::Removed) => FileChange::Removed,
        (FileChange::Created, FileChange::Modified) => FileChange::Created,
        (FileChange::Removed, _) => FileChange::Modified,
        (_, next) => next,
    }
}

// ---------------------------------------------------------------------------
// DirectoryWatcher
// ---------------------------------------------------------------------------

enum Signal {
    Fs(notify::Event),
    Shutdown,
}

/// Kept alive for as long as the directory is watched; dropping the
/// `notify` watcher deregisters the OS watch.
#[allow(dead_code)]
enum Backend {
    Native(RecommendedWatcher),
    Poll(PollWatcher),
}

struct Running {
    directory: PathBuf,
    backend: Backend,
    signal_tx: Sender<Signal>,
    worker: JoinHandle<()>,
}

/// Watches one exchange directory at a time. `Stopped -> Watching -> Stopped`.
pub struct DirectoryWatcher {
    config: WatcherConfig,
    events: Arc<EventBus<FileEvent>>,
    running: Mutex<Option<Running>>,
}

impl DirectoryWatcher {
    pub fn new(config: WatcherConfig) -> Self {
        Self {
            config,
            events: Arc::new(EventBus::new()),
            running: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &WatcherConfig {
        &self.config
    }

    /// Start watching `directory`. If another directory is being watched it
    /// is stopped first.
    pub fn init_watching(&self, directory: &Path) -> Result<()> {
        if !directory.is_dir() {
            return Err(StoreError::InvalidDirectory(directory.to_path_buf()));
        }
        self.stop_watching();

        let (signal_tx, signal_rx) = mpsc::channel::<Signal>();

        let events = self.events.clone();
        let window = self.config.debounce;
        let worker = std::thread::Builder::new()
            .name("courier-watcher".into())
            .spawn(move || run_worker(signal_rx, Debouncer::new(window), events))?;

        let backend = match self.create_backend(directory, signal_tx.clone()) {
            Ok(backend) => backend,
            Err(e) => {
                let _ = signal_tx.send(Signal::Shutdown);
                let _ = worker.join();
                return Err(e);
            }
        };

        info!(
            path = %directory.display(),
            mode = ?self.config.mode,
            debounce_ms = self.config.debounce.as_millis() as u64,
            "Watching exchange directory"
        );

        *self.lock() = Some(Running {
            directory: directory.to_path_buf(),
            backend,
            signal_tx,
            worker,
        });
        Ok(())
    }

    /// Stop watching. Pending debounced events are flushed to subscribers
    /// before the worker exits. Safe to call when already stopped.
    pub fn stop_watching(&self) {
        let Some(running) = self.lock().take() else {
            return;
        };

        // Dropping the backend first guarantees no new events are queued.
        drop(running.backend);
        let _ = running.signal_tx.send(Signal::Shutdown);

        if running.worker.thread().id() == std::thread::current().id() {
            // Called from a subscriber: the worker exits after this dispatch.
            return;
        }
        if running.worker.join().is_err() {
            error!("Watcher worker thread panicked");
        }
        info!(path = %running.directory.display(), "Stopped watching exchange directory");
    }

    pub fn state(&self) -> WatcherState {
        if self.lock().is_some() {
            WatcherState::Watching
        } else {
            WatcherState::Stopped
        }
    }

    pub fn watched_directory(&self) -> Option<PathBuf> {
        self.lock().as_ref().map(|r| r.directory.clone())
    }

    pub fn subscribe<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&FileEvent) + Send + Sync + 'static,
    {
        self.events.subscribe(callback)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.events.unsubscribe(id)
    }

    fn create_backend(&self, directory: &Path, tx: Sender<Signal>) -> Result<Backend> {
        let handler = move |res: notify::Result<notify::Event>| match res {
            Ok(event) => {
                let _ = tx.send(Signal::Fs(event));
            }
            Err(e) => warn!(error = %e, "Filesystem watcher error"),
        };

        let backend = match self.config.mode {
            WatchMode::Native => {
                let mut watcher = RecommendedWatcher::new(handler, notify::Config::default())?;
                watcher.watch(directory, RecursiveMode::NonRecursive)?;
                Backend::Native(watcher)
            }
            WatchMode::Poll => {
                let config = notify::Config::default().with_poll_interval(self.config.poll_interval);
                let mut watcher = PollWatcher::new(handler, config)?;
                watcher.watch(directory, RecursiveMode::NonRecursive)?;
                Backend::Poll(watcher)
            }
        };
        Ok(backend)
    }

    fn lock(&self) -> MutexGuard<'_, Option<Running>> {
        self.running.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for DirectoryWatcher {
    fn drop(&mut self) {
        self.stop_watching();
    }
}

// ---------------------------------------------------------------------------
// Worker
// ---------------------------------------------------------------------------

fn run_worker(rx: Receiver<Signal>, mut debouncer: Debouncer, events: Arc<EventBus<FileEvent>>) {
    loop {
        let signal = match debouncer.next_deadline() {
            None => rx.recv().ok(),
            Some(deadline) => {
                let timeout = deadline.saturating_duration_since(Instant::now());
                match rx.recv_timeout(timeout) {
                    Ok(signal) => Some(signal),
                    Err(RecvTimeoutError::Timeout) => {
                        dispatch(&events, debouncer.drain_ready(Instant::now()));
                        continue;
                    }
                    Err(RecvTimeoutError::Disconnected) => None,
                }
            }
        };

        match signal {
            Some(Signal::Fs(event)) => accumulate(&mut debouncer, &event, Instant::now()),
            Some(Signal::Shutdown) | None => {
                dispatch(&events, debouncer.drain_all());
                break;
            }
        }

        dispatch(&events, debouncer.drain_ready(Instant::now()));
    }
    debug!("Watcher worker exiting");
}

fn accumulate(debouncer: &mut Debouncer, event: &notify::Event, now: Instant) {
    let changes: Vec<(&PathBuf, FileChange)> = match event.kind {
        EventKind::Create(_) => event.paths.iter().map(|p| (p, FileChange::Created)).collect(),
        EventKind::Remove(_) => event.paths.iter().map(|p| (p, FileChange::Removed)).collect(),
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => {
            event.paths.iter().map(|p| (p, FileChange::Removed)).collect()
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => {
            event.paths.iter().map(|p| (p, FileChange::Created)).collect()
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            let mut changes = Vec::new();
            if let Some(from) = event.paths.first() {
                changes.push((from, FileChange::Removed));
            }
            if let Some(to) = event.paths.get(1) {
                changes.push((to, FileChange::Created));
            }
            changes
        }
        EventKind::Modify(_) | EventKind::Any => {
            event.paths.iter().map(|p| (p, FileChange::Modified)).collect()
        }
        EventKind::Access(_) | EventKind::Other => Vec::new(),
    };

    for (path, kind) in changes {
        // Unknown extensions are not ours to care about.
        if let Some(entity) = EntityKind::from_path(path) {
            debouncer.push(path.clone(), kind, entity, now);
        }
    }
}

fn dispatch(events: &EventBus<FileEvent>, ready: Vec<FileEvent>) {
    for event in ready {
        debug!(path = %event.path.display(), kind = ?event.kind, "File ready");
        let outcome = catch_unwind(AssertUnwindSafe(|| events.publish(&event)));
        if outcome.is_err() {
            error!(path = %event.path.display(), "File event subscriber panicked");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: Duration = Duration::from_millis(100);

    fn path(name: &str) -> PathBuf {
        PathBuf::from(format!("/exchange/{name}"))
    }

    #[test]
    fn test_burst_collapses_to_one_event() {
        let mut debouncer = Debouncer::new(WINDOW);
        let start = Instant::now();

        for i in 0..10 {
            debouncer.push(
                path("a.user"),
                FileChange::Modified,
                EntityKind::User,
                start + Duration::from_millis(i * 10),
            );
        }

        // Still inside the window of the last event.
        assert!(debouncer
            .drain_ready(start + Duration::from_millis(150))
            .is_empty());

        let ready = debouncer.drain_ready(start + Duration::from_millis(190));
        assert_eq!(ready.len(), 1);
        assert_eq!(ready[0].path, path("a.user"));
        assert!(debouncer.is_empty());
    }

    #[test]
    fn test_paths_debounce_independently() {
        let mut debouncer = Debouncer::new(WINDOW);
        let start = Instant::now();

        debouncer.push(path("a.msg"), FileChange::Created, EntityKind::Message, start);
        debouncer.push(
            path("b.msg"),
            FileChange::Created,
            EntityKind::Message,
            start + Duration::from_millis(80),
        );
        assert_eq!(debouncer.next_deadline(), Some(start + WINDOW));

        let first = debouncer.drain_ready(start + Duration::from_millis(120));
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].path, path("a.msg"));

        let second = debouncer.drain_ready(start + Duration::from_millis(200));
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].path, path("b.msg"));
    }

    #[test]
    fn test_authors_are_delivered_before_their_messages() {
        for _ in 0..50 {
            let mut debouncer = Debouncer::new(WINDOW);
            let start = Instant::now();
            debouncer.push(path("n.notif"), FileChange::Modified, EntityKind::ReadSet, start);
            debouncer.push(path("m.msg"), FileChange::Created, EntityKind::Message, start);
            debouncer.push(path("u.user"), FileChange::Created, EntityKind::User, start);
            debouncer.push(path("v.user"), FileChange::Created, EntityKind::User, start);

            let kinds: Vec<EntityKind> = debouncer
                .drain_ready(start + WINDOW)
                .into_iter()
                .map(|e| e.entity)
                .collect();
            assert_eq!(
                kinds,
                vec![
                    EntityKind::User,
                    EntityKind::User,
                    EntityKind::Message,
                    EntityKind::ReadSet
                ]
            );

            debouncer.push(path("m.msg"), FileChange::Modified, EntityKind::Message, start);
            debouncer.push(path("u.user"), FileChange::Modified, EntityKind::User, start);
            let flushed = debouncer.drain_all();
            assert_eq!(flushed[0].entity, EntityKind::User);
            assert_eq!(flushed[1].entity, EntityKind::Message);
        }
    }

    #[test]
    fn test_change_kinds_coalesce() {
        assert_eq!(coalesce(FileChange::Created, FileChange::Modified), FileChange::Created);
        assert_eq!(coalesce(FileChange::Modified, FileChange::Removed), FileChange::Removed);
        assert_eq!(coalesce(FileChange::Removed, FileChange::Created), FileChange::Modified);
        assert_eq!(coalesce(FileChange::Modified, FileChange::Modified), FileChange::Modified);
    }

    #[test]
    fn test_accumulate_filters_unknown_extensions() {
        let mut debouncer = Debouncer::new(WINDOW);
        let event = notify::Event::new(EventKind::Create(notify::event::CreateKind::File))
            .add_path(path("notes.txt"))
            .add_path(path(".x.user.tmp"))
            .add_path(path("x.user"));

        accumulate(&mut debouncer, &event, Instant::now());
        let all = debouncer.drain_all();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].entity, EntityKind::User);
    }

    #[test]
    fn test_rename_into_place_counts_as_creation() {
        let mut debouncer = Debouncer::new(WINDOW);
        let event = notify::Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::Both)))
            .add_path(path(".x.msg.tmp"))
            .add_path(path("x.msg"));

        accumulate(&mut debouncer, &event, Instant::now());
        let all = debouncer.drain_all();
        assert_eq!(
            all,
            vec![FileEvent {
                path: path("x.msg"),
                kind: FileChange::Created,
                entity: EntityKind::Message,
            }]
        );
    }

    #[test]
    fn test_stop_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let watcher = DirectoryWatcher::new(WatcherConfig::default());
        assert_eq!(watcher.state(), WatcherState::Stopped);
        watcher.stop_watching();

        watcher.init_watching(dir.path()).unwrap();
        assert_eq!(watcher.state(), WatcherState::Watching);
        assert_eq!(watcher.watched_directory(), Some(dir.path().to_path_buf()));

        watcher.stop_watching();
        watcher.stop_watching();
        assert_eq!(watcher.state(), WatcherState::Stopped);
    }

    #[test]
    fn test_rejects_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let watcher = DirectoryWatcher::new(WatcherConfig::default());
        let err = watcher.init_watching(&dir.path().join("missing")).unwrap_err();
        assert!(matches!(err, StoreError::InvalidDirectory(_)));
        assert_eq!(watcher.state(), WatcherState::Stopped);
    }

    #[test]
    fn test_poll_mode_delivers_new_entity_files() {
        let dir = tempfile::tempdir().unwrap();
        let watcher = DirectoryWatcher::new(WatcherConfig {
            debounce: Duration::from_millis(50),
            mode: WatchMode::Poll,
            poll_interval: Duration::from_millis(50),
        });

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        watcher.subscribe(move |e: &FileEvent| sink.lock().unwrap().push(e.clone()));
        watcher.init_watching(dir.path()).unwrap();

        std::fs::write(dir.path().join("ignored.txt"), "x").unwrap();
        let target = dir.path().join("0b5f8d2e-5d43-4c1e-9f55-0c6e7c2d4a10.user");
        std::fs::write(&target, "id=0b5f8d2e-5d43-4c1e-9f55-0c6e7c2d4a10\n").unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline && seen.lock().unwrap().is_empty() {
            std::thread::sleep(Duration::from_millis(20));
        }
        watcher.stop_watching();

        let seen = seen.lock().unwrap();
        assert!(!seen.is_empty(), "no event delivered");
        assert!(seen.iter().all(|e| e.path.file_name() == target.file_name()));
        assert_eq!(seen[0].entity, EntityKind::User);
    }
}
