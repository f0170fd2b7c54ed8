//! Cancellable-task registry and the barrier primitive.
//!
//! Cancellable tasks are keyed: starting a task under a key that already has
//! a live task cancels the old one first. A barrier operation takes exclusive
//! control: it cancels every tracked task, bumps the epoch, and while it runs
//! no new cancellable task may start. Tasks scheduled for an older epoch are
//! skipped even after the barrier finished.
//!
//! Cancellation is cooperative. Tasks get a [`CancellationToken`] and must
//! check it at suspension points and before committing state.

use std::borrow::Cow;
use std::fmt;
use std::future::Future;
use std::panic::Location;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use dashmap::DashMap;
use metrics::gauge;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// Identity of a cancellable task slot.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct TaskKey(Cow<'static, str>);

impl TaskKey {
    /// Key with a fixed name.
    pub const fn named(name: &'static str) -> Self {
        Self(Cow::Borrowed(name))
    }

    /// Key derived from the caller's source location.
    #[track_caller]
    pub fn caller() -> Self {
        let loc = Location::caller();
        Self(Cow::Owned(format!("{}:{}:{}", loc.file(), loc.line(), loc.column())))
    }

    /// The key as a string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

struct TrackedTask {
    id: u64,
    cancel: CancellationToken,
}

struct Inner {
    barrier_lock: tokio::sync::Mutex<()>,
    barrier_active: AtomicBool,
    epoch: AtomicU64,
    next_id: AtomicU64,
    tasks: DashMap<TaskKey, TrackedTask>,
}

impl Inner {
    fn cancel_all(&self) {
        for entry in &self.tasks {
            entry.value().cancel.cancel();
        }
    }

    fn accepts(&self, epoch: u64) -> bool {
        !self.barrier_active.load(Ordering::SeqCst) && self.epoch.load(Ordering::SeqCst) == epoch
    }

    fn record_gauge(&self) {
        gauge!("navigator_cancellable_tasks").set(self.tasks.len() as f64);
    }
}

/// Clears the barrier flag when the barrier body finishes or is dropped.
struct BarrierFlag<'a>(&'a Inner);

impl<'a> BarrierFlag<'a> {
    fn raise(inner: &'a Inner) -> Self {
        inner.barrier_active.store(true, Ordering::SeqCst);
        let _ = inner.epoch.fetch_add(1, Ordering::SeqCst);
        inner.cancel_all();
        Self(inner)
    }
}

impl Drop for BarrierFlag<'_> {
    fn drop(&mut self) {
        self.0.barrier_active.store(false, Ordering::SeqCst);
    }
}

/// Shared handle to the task registry. Clones see the same registry.
#[derive(Clone)]
pub struct TaskManager {
    inner: Arc<Inner>,
}

impl TaskManager {
    /// Empty registry at epoch 0.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                barrier_lock: tokio::sync::Mutex::new(()),
                barrier_active: AtomicBool::new(false),
                epoch: AtomicU64::new(0),
                next_id: AtomicU64::new(1),
                tasks: DashMap::new(),
            }),
        }
    }

    /// Current epoch. Bumped by every barrier.
    pub fn epoch(&self) -> u64 {
        self.inner.epoch.load(Ordering::SeqCst)
    }

    /// Whether a barrier body is running.
    pub fn is_barrier_active(&self) -> bool {
        self.inner.barrier_active.load(Ordering::SeqCst)
    }

    /// Number of tracked tasks that have not finished yet.
    pub fn live_task_count(&self) -> usize {
        self.inner.tasks.len()
    }

    /// Start a cancellable task keyed by the caller's source location.
    #[track_caller]
    pub fn spawn<F, Fut>(&self, task: F) -> bool
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.spawn_keyed(TaskKey::caller(), task)
    }

    /// Start a cancellable task under `key` in the current epoch.
    pub fn spawn_keyed<F, Fut>(&self, key: TaskKey, task: F) -> bool
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.spawn_in_epoch(key, self.epoch(), task)
    }

    /// Start a cancellable task under `key`, provided `epoch` is still current.
    ///
    /// Returns `false` without running `task` if a barrier is active or the
    /// epoch was superseded. Otherwise the previous task under `key`, if any,
    /// is cancelled and replaced.
    pub fn spawn_in_epoch<F, Fut>(&self, key: TaskKey, epoch: u64, task: F) -> bool
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let inner = &self.inner;
        if !inner.accepts(epoch) {
            debug!(key = %key, epoch, current = self.epoch(), "skipping task: barrier active or epoch superseded");
            return false;
        }

        let id = inner.next_id.fetch_add(1, Ordering::Relaxed);
        let cancel = CancellationToken::new();
        if let Some(previous) = inner.tasks.insert(
            key.clone(),
            TrackedTask {
                id,
                cancel: cancel.clone(),
            },
        ) {
            trace!(key = %key, "cancelling previous task under key");
            previous.cancel.cancel();
        }

        // A barrier may have started between the check and the insert.
        if !inner.accepts(epoch) {
            cancel.cancel();
            let _ = inner.tasks.remove_if(&key, |_, t| t.id == id);
            return false;
        }
        inner.record_gauge();

        let fut = task(cancel);
        let registry = Arc::clone(inner);
        drop(tokio::spawn(async move {
            fut.await;
            let _ = registry.tasks.remove_if(&key, |_, t| t.id == id);
            registry.record_gauge();
        }));
        true
    }

    /// Run `body` with exclusive control over background work.
    ///
    /// Barriers are serialized. On entry every tracked task is cancelled and
    /// the epoch is bumped; while the body runs new cancellable tasks are
    /// skipped. The flag is cleared when the body completes or is dropped.
    pub async fn barrier<F, Fut, T>(&self, body: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let _serial = self.inner.barrier_lock.lock().await;
        let _flag = BarrierFlag::raise(&self.inner);
        trace!(epoch = self.epoch(), "barrier entered");
        body().await
    }

    /// Wait until no barrier holds or waits for the barrier lock.
    pub async fn wait_for_barrier(&self) {
        drop(self.inner.barrier_lock.lock().await);
    }

    /// Cancel every tracked task without starting a barrier.
    pub fn cancel_all(&self) {
        self.inner.cancel_all();
    }
}

impl Default for TaskManager {
    fn default() -> Self {
        Self::new()
    }
}
