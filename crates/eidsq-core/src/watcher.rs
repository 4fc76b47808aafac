//! Background consumer for a queue directory
//!
//! [`DirectoryWatcher`] owns a single tokio worker that:
//!
//! 1. Registers a non-recursive watch on the shared directory
//! 2. Drains every file already present
//! 3. Waits for a batch of create/rename-in events, processes the files they
//!    name, then drains again before waiting for the next batch
//!
//! Registering the watch before the initial drain means a file published in
//! between is seen by one path or the other (and the drainer tolerates seeing
//! it twice). Event overflow is covered by the drain that ends every batch.
//! File work runs on the blocking pool; cancellation is checked between
//! files, so shutdown always lets the file in progress finish.
//!
//! `shutdown()` releases the worker immediately, so `start()` may follow at
//! once. The drainer serializes file work, so a stopping worker and its
//! replacement never handle the same file concurrently.
//!
//! A fatal drain error (a file that cannot be deleted or moved) or an event
//! that carries no usable path stops the worker.

use crate::codec::NotificationCodec;
use crate::io::{DrainError, Drainer};
use crate::lifecycle::{Lifecycle, LifecycleError};
use crate::sink::NotificationSink;
use notify::event::ModifyKind;
use notify::{Event, EventKind, RecursiveMode, Watcher};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Watcher lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatcherStatus {
    Stopped,
    /// Worker spawned, directory watch not yet registered
    Starting,
    Running,
    /// Shutdown requested, worker finishing its current file
    Stopping,
}

impl fmt::Display for WatcherStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            WatcherStatus::Stopped => "stopped",
            WatcherStatus::Starting => "starting",
            WatcherStatus::Running => "running",
            WatcherStatus::Stopping => "stopping",
        };
        f.write_str(s)
    }
}

/// Reasons the worker stops on its own
#[derive(Debug, Error)]
enum WorkerError {
    #[error("Failed to watch directory: {0}")]
    Notify(#[from] notify::Error),

    #[error(transparent)]
    Drain(#[from] DrainError),

    #[error("Drain task failed: {0}")]
    Join(#[from] JoinError),

    #[error("Change event without a usable file path ({0:?})")]
    UnusableEvent(EventKind),

    #[error("Change event channel closed")]
    ChannelClosed,
}

/// What a single change event asks the worker to do
#[derive(Debug, PartialEq)]
enum EventAction {
    Ignore,
    /// Events were dropped; re-list the whole directory
    Rescan,
    /// Process these eligible files, in order
    Process(Vec<PathBuf>),
    /// A creation event whose paths cannot be resolved
    Unusable,
}

/// Whether the event signals a file appearing in the directory
///
/// Renames surface as name modifications; a rename into the directory is
/// how the writer publishes.
fn is_arrival(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Create(_) | EventKind::Modify(ModifyKind::Name(_))
    )
}

fn classify_event(event: &Event, is_eligible: impl Fn(&Path) -> bool) -> EventAction {
    if event.need_rescan() {
        return EventAction::Rescan;
    }
    if !is_arrival(&event.kind) {
        return EventAction::Ignore;
    }
    if event.paths.is_empty() || event.paths.iter().any(|p| p.file_name().is_none()) {
        return EventAction::Unusable;
    }

    let paths: Vec<PathBuf> = event
        .paths
        .iter()
        .filter(|p| is_eligible(p))
        .cloned()
        .collect();
    if paths.is_empty() {
        EventAction::Ignore
    } else {
        EventAction::Process(paths)
    }
}

struct Worker {
    generation: u64,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

struct State {
    status: WatcherStatus,
    worker: Option<Worker>,
    /// Generation that was asked to stop and has not exited yet
    stopping: Option<u64>,
}

struct Inner<C, S> {
    name: String,
    drainer: Arc<Drainer<C, S>>,
    state: Mutex<State>,
    generations: AtomicU64,
}

impl<C, S> Inner<C, S> {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The worker registered its watch
    fn mark_running(&self, generation: u64) {
        let mut state = self.lock();
        let current = state.worker.as_ref().is_some_and(|w| w.generation == generation);
        if current && state.status == WatcherStatus::Starting {
            state.status = WatcherStatus::Running;
        }
    }

    /// The worker exited; a newer worker's state is left untouched
    fn finish(&self, generation: u64) {
        let mut state = self.lock();
        if state.worker.as_ref().is_some_and(|w| w.generation == generation) {
            state.worker = None;
            state.status = WatcherStatus::Stopped;
        } else if state.stopping == Some(generation) {
            state.stopping = None;
            if state.worker.is_none() {
                state.status = WatcherStatus::Stopped;
            }
        }
    }
}

/// Watches a queue directory and drains it into a sink
pub struct DirectoryWatcher<C, S> {
    inner: Arc<Inner<C, S>>,
}

impl<C, S> Clone for DirectoryWatcher<C, S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C, S> DirectoryWatcher<C, S>
where
    C: NotificationCodec + 'static,
    S: NotificationSink<C::Notification> + 'static,
{
    pub fn new(drainer: Drainer<C, S>) -> Self {
        Self {
            inner: Arc::new(Inner {
                name: drainer.name().to_string(),
                drainer: Arc::new(drainer),
                state: Mutex::new(State {
                    status: WatcherStatus::Stopped,
                    worker: None,
                    stopping: None,
                }),
                generations: AtomicU64::new(0),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn drainer(&self) -> &Drainer<C, S> {
        &self.inner.drainer
    }

    pub fn status(&self) -> WatcherStatus {
        self.inner.lock().status
    }

    pub fn is_running(&self) -> bool {
        self.status() == WatcherStatus::Running
    }

    /// Drain synchronously on the calling thread
    ///
    /// Waits for any pass a running worker has in progress.
    pub fn drain_once(&self) -> Result<usize, DrainError> {
        self.inner.drainer.drain_once()
    }

    /// Prepare the directories and spawn the worker on the current runtime
    ///
    /// Does nothing if a worker is already recorded. A worker that was shut
    /// down but is still finishing its file does not block a new start.
    pub fn start(&self) -> Result<(), LifecycleError> {
        let runtime = Handle::try_current().map_err(|_| LifecycleError::NoRuntime)?;

        let mut state = self.inner.lock();
        if state.worker.is_some() {
            debug!(name = %self.inner.name, "watcher already {}", state.status);
            return Ok(());
        }

        self.inner.drainer.config().prepare()?;

        let generation = self.inner.generations.fetch_add(1, Ordering::Relaxed) + 1;
        let cancel = CancellationToken::new();
        state.status = WatcherStatus::Starting;
        let handle = runtime.spawn(run_worker(
            Arc::clone(&self.inner),
            generation,
            cancel.clone(),
        ));
        state.worker = Some(Worker {
            generation,
            cancel,
            handle,
        });

        info!(
            name = %self.inner.name,
            "watching {}",
            self.inner.drainer.config().notification_dir.display()
        );
        Ok(())
    }

    /// Ask the worker to stop after the file in progress
    ///
    /// Takes the recorded worker and returns its handle, so callers can await
    /// completion. Returns `None` when no worker is recorded.
    pub fn shutdown(&self) -> Option<JoinHandle<()>> {
        let mut state = self.inner.lock();
        let worker = state.worker.take()?;

        worker.cancel.cancel();
        info!(name = %self.inner.name, "stopping watcher");
        state.status = WatcherStatus::Stopping;
        state.stopping = Some(worker.generation);
        Some(worker.handle)
    }
}

impl<C, S> Lifecycle for DirectoryWatcher<C, S>
where
    C: NotificationCodec + 'static,
    S: NotificationSink<C::Notification> + 'static,
{
    fn startup(&self) -> Result<(), LifecycleError> {
        self.start()
    }

    fn shutdown(&self) {
        drop(DirectoryWatcher::shutdown(self));
    }
}

async fn run_worker<C, S>(inner: Arc<Inner<C, S>>, generation: u64, cancel: CancellationToken)
where
    C: NotificationCodec + 'static,
    S: NotificationSink<C::Notification> + 'static,
{
    match watch_loop(&inner, generation, &cancel).await {
        Ok(()) => debug!(name = %inner.name, "watcher stopped"),
        Err(e) => error!(name = %inner.name, "watcher stopped: {e}"),
    }
    cancel.cancel();
    inner.finish(generation);
}

async fn watch_loop<C, S>(
    inner: &Arc<Inner<C, S>>,
    generation: u64,
    cancel: &CancellationToken,
) -> Result<(), WorkerError>
where
    C: NotificationCodec + 'static,
    S: NotificationSink<C::Notification> + 'static,
{
    let (tx, mut rx) = mpsc::unbounded_channel::<notify::Result<Event>>();

    // UnboundedSender::send is safe to call from the notify thread
    let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
        let _ = tx.send(res);
    })?;

    let dir = inner.drainer.config().notification_dir.clone();
    watcher.watch(&dir, RecursiveMode::NonRecursive)?;
    inner.mark_running(generation);
    debug!(name = %inner.name, "watch registered on {}", dir.display());

    drain_all(&inner.drainer, cancel).await?;

    loop {
        let first = tokio::select! {
            _ = cancel.cancelled() => break,
            received = rx.recv() => received.ok_or(WorkerError::ChannelClosed)?,
        };

        // everything already queued belongs to the same batch
        let mut batch = vec![first];
        while let Ok(next) = rx.try_recv() {
            batch.push(next);
        }

        handle_batch(inner, batch, cancel).await?;
    }

    // dropping `watcher` removes the OS-level watch
    drop(watcher);
    Ok(())
}

/// What one batch of events amounted to
#[derive(Debug, Default, PartialEq)]
struct BatchReport {
    /// Files taken off the queue through their own events
    processed: usize,
    /// An overflow or watch error asked for a full re-list
    rescanned: bool,
    /// Files taken off the queue by the closing drain
    drained: usize,
}

/// Handle a batch of change events, then drain the directory
async fn handle_batch<C, S>(
    inner: &Inner<C, S>,
    batch: Vec<notify::Result<Event>>,
    cancel: &CancellationToken,
) -> Result<BatchReport, WorkerError>
where
    C: NotificationCodec + 'static,
    S: NotificationSink<C::Notification> + 'static,
{
    let mut report = BatchReport::default();

    for result in batch {
        if cancel.is_cancelled() {
            break;
        }
        let event = match result {
            Ok(event) => event,
            Err(e) => {
                warn!(name = %inner.name, "watch error, rescanning: {e}");
                report.rescanned = true;
                continue;
            }
        };

        match classify_event(&event, |p| inner.drainer.is_eligible(p)) {
            EventAction::Ignore => {}
            EventAction::Rescan => {
                debug!(name = %inner.name, "event overflow, rescanning");
                report.rescanned = true;
            }
            EventAction::Process(paths) => {
                for path in paths {
                    if cancel.is_cancelled() {
                        break;
                    }
                    if process_one(&inner.drainer, path).await? {
                        report.processed += 1;
                    }
                }
            }
            EventAction::Unusable => return Err(WorkerError::UnusableEvent(event.kind)),
        }
    }

    // a full pass after every batch also covers anything the events missed
    report.drained = drain_all(&inner.drainer, cancel).await?;
    if report.rescanned {
        debug!(name = %inner.name, "rescan handled {} file(s)", report.drained);
    } else if report.drained > 0 {
        debug!(
            name = %inner.name,
            "drain after {} event file(s) found {} more",
            report.processed,
            report.drained
        );
    }
    Ok(report)
}

async fn drain_all<C, S>(
    drainer: &Arc<Drainer<C, S>>,
    cancel: &CancellationToken,
) -> Result<usize, WorkerError>
where
    C: NotificationCodec + 'static,
    S: NotificationSink<C::Notification> + 'static,
{
    let drainer = Arc::clone(drainer);
    let cancel = cancel.clone();
    let count = tokio::task::spawn_blocking(move || drainer.drain(&cancel)).await??;
    Ok(count)
}

async fn process_one<C, S>(drainer: &Arc<Drainer<C, S>>, path: PathBuf) -> Result<bool, WorkerError>
where
    C: NotificationCodec + 'static,
    S: NotificationSink<C::Notification> + 'static,
{
    let drainer = Arc::clone(drainer);
    let processed = tokio::task::spawn_blocking(move || drainer.process_file(&path)).await??;
    Ok(processed)
}
