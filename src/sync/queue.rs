//! Durable sync queue.
//!
//! Operations are appended while offline, persisted after every mutation,
//! and drained in FIFO order whenever the connectivity monitor reports a
//! transition to online. Only one drain pass runs at a time.
//!
//! Every mutation re-reads the stored document and writes it back with a
//! compare-and-swap, so several processes can share one queue namespace
//! without overwriting each other's operations.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::executor::ExecutorRegistry;
use super::operation::{Command, QueueDocument, QueuedOperation};
use crate::clock::{Clock, SystemClock};
use crate::error::OffsyncError;
use crate::network::{ConnectivityMonitor, Subscription};
use crate::storage::KvStore;

/// Receiver side of a cancellation flag; `true` means stop.
pub type CancelSignal = watch::Receiver<bool>;

type DropHook = Arc<dyn Fn(&QueuedOperation) + Send + Sync>;

/// Tunables for a [`SyncQueue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueOptions {
    /// Failed attempts after which an operation is dropped
    pub max_attempts: u32,
}

impl Default for QueueOptions {
    fn default() -> Self {
        Self { max_attempts: 3 }
    }
}

/// Outcome of one call to [`SyncQueue::drain`].
#[derive(Debug, Clone, PartialEq)]
pub enum DrainStatus {
    /// The monitor reports offline; nothing was attempted
    Offline,
    /// Another pass holds the drain lock
    AlreadyDraining,
    /// The queue was empty
    Idle,
    /// A pass ran
    Ran(DrainReport),
}

/// What a drain pass did.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DrainReport {
    /// Operations executed to completion, successfully or not
    pub attempted: usize,
    /// Operations that succeeded and were removed
    pub succeeded: usize,
    /// Operations that failed and stay queued
    pub retrying: usize,
    /// Operations removed after exhausting their attempts
    pub dropped: Vec<QueuedOperation>,
    /// Whether the pass stopped early on cancellation
    pub cancelled: bool,
    /// Queue size after the pass
    pub remaining: usize,
}

/// Queue statistics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    /// Number of pending operations
    pub pending: usize,
    /// Oldest pending operation timestamp
    pub oldest_pending: Option<DateTime<Utc>>,
}

/// Durable FIFO of deferred operations.
///
/// Cloning yields another handle to the same queue.
#[derive(Clone)]
pub struct SyncQueue {
    inner: Arc<QueueInner>,
}

struct QueueInner {
    store: Arc<dyn KvStore>,
    key: String,
    state: Mutex<QueueDocument>,
    drain_lock: tokio::sync::Mutex<()>,
    registry: ExecutorRegistry,
    monitor: ConnectivityMonitor,
    options: QueueOptions,
    clock: Arc<dyn Clock>,
    drop_hook: Mutex<Option<DropHook>>,
    cancel: watch::Sender<bool>,
    runtime: Option<Handle>,
    background: Mutex<Vec<JoinHandle<()>>>,
    subscription: Mutex<Option<Subscription>>,
    shut_down: AtomicBool,
}

impl SyncQueue {
    /// Load the queue for `namespace` and start draining on reconnects.
    ///
    /// Background drains need a tokio runtime; when opened outside one, the
    /// queue only drains through explicit [`SyncQueue::drain`] calls.
    ///
    /// # Errors
    ///
    /// Returns an error if the persisted queue cannot be read or decoded.
    pub fn open(
        store: Arc<dyn KvStore>,
        namespace: &str,
        registry: ExecutorRegistry,
        monitor: ConnectivityMonitor,
        options: QueueOptions,
    ) -> Result<Self, OffsyncError> {
        Self::open_with_clock(
            store,
            namespace,
            registry,
            monitor,
            options,
            Arc::new(SystemClock),
        )
    }

    /// Like [`SyncQueue::open`] with an explicit time source.
    ///
    /// # Errors
    ///
    /// Returns an error if the persisted queue cannot be read or decoded.
    pub fn open_with_clock(
        store: Arc<dyn KvStore>,
        namespace: &str,
        registry: ExecutorRegistry,
        monitor: ConnectivityMonitor,
        options: QueueOptions,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, OffsyncError> {
        let key = format!("sync_queue:{namespace}");
        let state = load(store.as_ref(), &key)?;
        debug!(key = %key, pending = state.operations.len(), "sync queue loaded");

        let (cancel, _) = watch::channel(false);
        let queue = Self {
            inner: Arc::new(QueueInner {
                store,
                key,
                state: Mutex::new(state),
                drain_lock: tokio::sync::Mutex::new(()),
                registry,
                monitor: monitor.clone(),
                options,
                clock,
                drop_hook: Mutex::new(None),
                cancel,
                runtime: Handle::try_current().ok(),
                background: Mutex::new(Vec::new()),
                subscription: Mutex::new(None),
                shut_down: AtomicBool::new(false),
            }),
        };

        let weak: Weak<QueueInner> = Arc::downgrade(&queue.inner);
        let subscription = monitor.subscribe(move |online| {
            if !online {
                return;
            }
            if let Some(inner) = weak.upgrade() {
                Self { inner }.spawn_drain("reconnect");
            }
        });
        *lock(&queue.inner.subscription) = Some(subscription);

        Ok(queue)
    }

    /// Append an operation and persist it.
    ///
    /// When online, a drain is started in the background; this call never
    /// waits on network I/O.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the queue cannot be persisted. The
    /// operation is then not queued.
    pub fn enqueue(
        &self,
        kind: impl Into<String>,
        payload: serde_json::Value,
    ) -> Result<u64, OffsyncError> {
        let kind = kind.into();
        if !self.inner.registry.contains(&kind) {
            warn!(kind = %kind, "queued operation has no registered executor");
        }

        let now = self.inner.clock.now();
        let id = self.mutate(|doc| doc.push(kind.clone(), payload.clone(), now))?;

        debug!(id, kind = %kind, "operation queued");

        if self.inner.monitor.current_state() {
            self.spawn_drain("enqueue");
        }

        Ok(id)
    }

    /// Enqueue a typed command.
    ///
    /// # Errors
    ///
    /// Returns an error if the command cannot be serialized or persisted.
    pub fn enqueue_command<C: Command>(&self, command: &C) -> Result<u64, OffsyncError> {
        let payload = serde_json::to_value(command)?;
        self.enqueue(C::KIND, payload)
    }

    /// Run one drain pass.
    ///
    /// The pass reloads the stored queue, works on a snapshot taken at its
    /// start, executes operations one at a time in FIFO order, and persists
    /// the outcomes once at the end. A cancelled pass still persists the
    /// outcomes it collected; the operation in flight at cancellation is not
    /// counted as an attempt.
    ///
    /// Operations enqueued through this handle while the pass runs get a
    /// follow-up pass once it finishes.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the queue cannot be reloaded or the
    /// outcome of the pass cannot be persisted. The in-memory queue is then
    /// left as it was before the pass.
    pub async fn drain(&self, mut cancel: CancelSignal) -> Result<DrainStatus, OffsyncError> {
        let Ok(running) = self.inner.drain_lock.try_lock() else {
            debug!("drain already running");
            return Ok(DrainStatus::AlreadyDraining);
        };

        if !self.inner.monitor.current_state() {
            return Ok(DrainStatus::Offline);
        }

        self.reload()?;
        let snapshot = self.state().operations.clone();
        if snapshot.is_empty() {
            return Ok(DrainStatus::Idle);
        }
        let last_seen = snapshot.iter().map(|op| op.id).max().unwrap_or_default();

        info!(count = snapshot.len(), "drain started");

        let mut outcomes: Vec<(u64, Result<(), String>)> = Vec::with_capacity(snapshot.len());
        let mut cancelled = false;

        for operation in &snapshot {
            if *cancel.borrow() {
                cancelled = true;
                break;
            }

            let result = tokio::select! {
                biased;
                () = cancellation(&mut cancel) => None,
                result = self.execute(operation) => Some(result),
            };

            let Some(result) = result else {
                cancelled = true;
                break;
            };
            outcomes.push((operation.id, result.map_err(|e| e.to_string())));
        }

        let report = self.apply(&outcomes, cancelled)?;
        drop(running);

        if !cancelled
            && self.inner.monitor.current_state()
            && self.state().operations.iter().any(|op| op.id > last_seen)
        {
            self.spawn_drain("follow-up");
        }

        let hook = lock(&self.inner.drop_hook).clone();
        if let Some(hook) = hook {
            for operation in &report.dropped {
                hook(operation);
            }
        }

        info!(
            attempted = report.attempted,
            succeeded = report.succeeded,
            retrying = report.retrying,
            dropped = report.dropped.len(),
            cancelled = report.cancelled,
            remaining = report.remaining,
            "drain finished"
        );

        Ok(DrainStatus::Ran(report))
    }

    async fn execute(&self, operation: &QueuedOperation) -> Result<(), OffsyncError> {
        let executor = self
            .inner
            .registry
            .get(&operation.kind)
            .ok_or_else(|| OffsyncError::UnknownOperation(operation.kind.clone()))?;
        executor.execute(operation).await
    }

    fn apply(
        &self,
        outcomes: &[(u64, Result<(), String>)],
        cancelled: bool,
    ) -> Result<DrainReport, OffsyncError> {
        let now = self.inner.clock.now();
        let max_attempts = self.inner.options.max_attempts;

        self.mutate(|doc| {
            let mut report = DrainReport {
                cancelled,
                ..DrainReport::default()
            };

            for (id, outcome) in outcomes {
                let id = *id;
                report.attempted += 1;
                let position = doc.position(id);

                match outcome {
                    Ok(()) => {
                        report.succeeded += 1;
                        if let Some(pos) = position {
                            doc.operations.remove(pos);
                        }
                    },
                    Err(message) => {
                        // Cleared while the pass was running.
                        let Some(pos) = position else { continue };

                        let operation = &mut doc.operations[pos];
                        warn!(id, kind = %operation.kind, error = %message, "operation failed");
                        operation.record_failure(now, message.clone());

                        if operation.attempts >= max_attempts {
                            let dropped = doc.operations.remove(pos);
                            warn!(
                                id,
                                kind = %dropped.kind,
                                attempts = dropped.attempts,
                                "operation dropped after exhausting attempts"
                            );
                            report.dropped.push(dropped);
                        } else {
                            report.retrying += 1;
                        }
                    },
                }
            }

            report.remaining = doc.operations.len();
            report
        })
    }

    /// Number of pending operations.
    #[must_use]
    pub fn size(&self) -> usize {
        self.state().operations.len()
    }

    /// Whether nothing is pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.state().operations.is_empty()
    }

    /// Pending operations in FIFO order.
    #[must_use]
    pub fn pending(&self) -> Vec<QueuedOperation> {
        self.state().operations.clone()
    }

    /// Pending count and the oldest enqueue time.
    #[must_use]
    pub fn stats(&self) -> QueueStats {
        let state = self.state();
        QueueStats {
            pending: state.operations.len(),
            oldest_pending: state.operations.iter().map(|op| op.enqueued_at).min(),
        }
    }

    /// Remove every pending operation and return how many there were.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the empty queue cannot be persisted.
    pub fn clear(&self) -> Result<usize, OffsyncError> {
        let removed = self.mutate(|doc| std::mem::take(&mut doc.operations).len())?;
        info!(count = removed, "sync queue cleared");
        Ok(removed)
    }

    /// Observe operations dropped after exhausting their attempts.
    ///
    /// Replaces any previous hook. The hook runs after the pass has been
    /// persisted.
    pub fn on_operation_dropped<F>(&self, hook: F)
    where
        F: Fn(&QueuedOperation) + Send + Sync + 'static,
    {
        *lock(&self.inner.drop_hook) = Some(Arc::new(hook));
    }

    /// A receiver of the queue's own cancellation flag, set by
    /// [`SyncQueue::shutdown`].
    #[must_use]
    pub fn cancel_signal(&self) -> CancelSignal {
        self.inner.cancel.subscribe()
    }

    /// Wait for background drains that have already started.
    pub async fn wait_idle(&self) {
        loop {
            let tasks = std::mem::take(&mut *lock(&self.inner.background));
            if tasks.is_empty() {
                return;
            }
            for task in tasks {
                if let Err(e) = task.await {
                    warn!(error = %e, "background drain task failed");
                }
            }
        }
    }

    /// Stop draining on reconnects, cancel any running pass and wait for
    /// background drains to finish. Safe to call more than once.
    pub async fn shutdown(&self) {
        if !self.inner.shut_down.swap(true, Ordering::SeqCst) {
            debug!(key = %self.inner.key, "sync queue shutting down");
        }
        lock(&self.inner.subscription).take();
        self.inner.cancel.send_replace(true);
        self.wait_idle().await;
    }

    fn spawn_drain(&self, reason: &'static str) {
        if self.inner.shut_down.load(Ordering::SeqCst) {
            return;
        }
        let Some(runtime) = self.inner.runtime.as_ref() else {
            debug!(reason, "no runtime for background drain");
            return;
        };

        let queue = self.clone();
        let cancel = self.cancel_signal();
        let task = runtime.spawn(async move {
            match queue.drain(cancel).await {
                Ok(status) => debug!(reason, ?status, "background drain done"),
                Err(e) => warn!(reason, error = %e, "background drain failed"),
            }
        });

        let mut background = lock(&self.inner.background);
        background.retain(|task| !task.is_finished());
        background.push(task);
    }

    /// Apply `f` to the stored document and write it back.
    ///
    /// Retries from a fresh read whenever another writer got there first.
    /// The in-memory copy only changes once the write has landed.
    fn mutate<R>(&self, mut f: impl FnMut(&mut QueueDocument) -> R) -> Result<R, OffsyncError> {
        let store = self.inner.store.as_ref();
        let key = self.inner.key.as_str();
        let mut state = self.state();

        loop {
            let stored = store.read(key)?;
            let mut doc = decode(key, stored.as_deref())?;
            let result = f(&mut doc);
            let bytes = serde_json::to_vec(&doc)?;

            if store.compare_and_swap(key, stored, &bytes)? {
                *state = doc;
                return Ok(result);
            }
            debug!(key, "sync queue changed by another writer, retrying");
        }
    }

    /// Replace the in-memory copy with the stored document.
    fn reload(&self) -> Result<(), OffsyncError> {
        let mut state = self.state();
        *state = load(self.inner.store.as_ref(), &self.inner.key)?;
        Ok(())
    }

    fn state(&self) -> MutexGuard<'_, QueueDocument> {
        lock(&self.inner.state)
    }
}

impl std::fmt::Debug for SyncQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncQueue")
            .field("key", &self.inner.key)
            .field("pending", &self.size())
            .field("options", &self.inner.options)
            .finish_non_exhaustive()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn load(store: &dyn KvStore, key: &str) -> Result<QueueDocument, OffsyncError> {
    decode(key, store.read(key)?.as_deref())
}

fn decode(key: &str, bytes: Option<&[u8]>) -> Result<QueueDocument, OffsyncError> {
    let Some(bytes) = bytes else {
        return Ok(QueueDocument::default());
    };
    let mut state: QueueDocument =
        serde_json::from_slice(bytes).map_err(|e| OffsyncError::Corrupt {
            key: key.to_string(),
            message: e.to_string(),
        })?;
    state.repair_next_id();
    Ok(state)
}

/// Resolves once `cancel` reads `true`. Never resolves if the sender is gone.
async fn cancellation(cancel: &mut CancelSignal) {
    loop {
        if *cancel.borrow_and_update() {
            return;
        }
        if cancel.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}
