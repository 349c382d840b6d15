//! Bounded-concurrency task executor.
//!
//! Submitted work is handed to a dispatcher that starts jobs in submission
//! order, each one holding a permit from a `Semaphore` sized to the
//! concurrency limit. Every submission returns a [`TaskHandle`] that resolves
//! to the task's own output, and [`BoundedExecutor::wait_idle`] resolves once
//! nothing is queued or running.

use futures::future::BoxFuture;
use futures::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch, Semaphore};
use tracing::trace;

/// Why a task handle did not yield the task's output.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TaskError {
    #[error("task panicked")]
    Panicked,

    #[error("task was dropped before completing")]
    Dropped,
}

/// Point-in-time view of the executor's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecutorStats {
    pub limit: usize,
    pub pending: usize,
    pub running: usize,
    /// Highest number of tasks ever running at once.
    pub peak_running: usize,
    pub submitted: u64,
    pub completed: u64,
}

type Job = BoxFuture<'static, ()>;

struct Shared {
    limit: usize,
    semaphore: Arc<Semaphore>,
    // Queued plus running tasks.
    outstanding: watch::Sender<usize>,
    pending: AtomicUsize,
    peak_running: AtomicUsize,
    submitted: AtomicU64,
    completed: AtomicU64,
}

impl Shared {
    fn running(&self) -> usize {
        self.limit - self.semaphore.available_permits()
    }
}

/// Runs submitted futures with at most `limit` of them in flight.
///
/// Cloning is cheap and every clone drives the same queue. The dispatcher is
/// spawned onto the ambient Tokio runtime, so `new` must be called from
/// within one.
#[derive(Clone)]
pub struct BoundedExecutor {
    shared: Arc<Shared>,
    jobs: mpsc::UnboundedSender<Job>,
}

impl BoundedExecutor {
    /// Create an executor with the given concurrency ceiling.
    ///
    /// # Panics
    ///
    /// Panics if `limit` is zero.
    pub fn new(limit: usize) -> Self {
        assert!(limit > 0, "executor concurrency limit must be > 0");
        let (outstanding, _) = watch::channel(0);
        let shared = Arc::new(Shared {
            limit,
            semaphore: Arc::new(Semaphore::new(limit)),
            outstanding,
            pending: AtomicUsize::new(0),
            peak_running: AtomicUsize::new(0),
            submitted: AtomicU64::new(0),
            completed: AtomicU64::new(0),
        });

        let (jobs, queue) = mpsc::unbounded_channel();
        tokio::spawn(dispatch(shared.clone(), queue));

        Self { shared, jobs }
    }

    pub fn limit(&self) -> usize {
        self.shared.limit
    }

    /// Queue a unit of work. Never waits for a free slot.
    ///
    /// `task` is invoked only once the task holds a permit. A panic inside
    /// the task is contained and surfaces as [`TaskError::Panicked`] on the
    /// returned handle.
    pub fn submit<F, Fut, T>(&self, task: F) -> TaskHandle<T>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let job = async move {
            let outcome = AssertUnwindSafe(async move { task().await })
                .catch_unwind()
                .await
                .map_err(|_| TaskError::Panicked);
            // The caller may have dropped the handle; the outcome is then discarded.
            let _ = tx.send(outcome);
        }
        .boxed();

        // Count the task before the dispatcher can see it.
        self.shared.outstanding.send_modify(|n| *n += 1);
        self.shared.pending.fetch_add(1, Ordering::SeqCst);
        self.shared.submitted.fetch_add(1, Ordering::SeqCst);

        if self.jobs.send(job).is_err() {
            // Dispatcher is gone with its runtime; the handle reports Dropped.
            self.shared.pending.fetch_sub(1, Ordering::SeqCst);
            self.shared.outstanding.send_modify(|n| *n -= 1);
        }

        TaskHandle { rx }
    }

    /// Wait until no task is queued or running.
    ///
    /// Returns immediately when the executor is already idle. May be called
    /// repeatedly; work submitted after a previous call returned is awaited
    /// by the next call.
    pub async fn wait_idle(&self) {
        let mut rx = self.shared.outstanding.subscribe();
        // The sender lives as long as `self`, so this cannot fail.
        let _ = rx.wait_for(|outstanding| *outstanding == 0).await;
    }

    pub fn is_idle(&self) -> bool {
        *self.shared.outstanding.borrow() == 0
    }

    pub fn stats(&self) -> ExecutorStats {
        ExecutorStats {
            limit: self.limit(),
            pending: self.shared.pending.load(Ordering::SeqCst),
            running: self.shared.running(),
            peak_running: self.shared.peak_running.load(Ordering::SeqCst),
            submitted: self.shared.submitted.load(Ordering::SeqCst),
            completed: self.shared.completed.load(Ordering::SeqCst),
        }
    }
}

/// Start queued jobs in submission order, one permit each.
///
/// Exits once every executor handle is dropped and the queue is drained.
async fn dispatch(shared: Arc<Shared>, mut queue: mpsc::UnboundedReceiver<Job>) {
    while let Some(job) = queue.recv().await {
        // The semaphore is never closed.
        let Ok(permit) = shared.semaphore.clone().acquire_owned().await else {
            break;
        };
        shared.pending.fetch_sub(1, Ordering::SeqCst);
        let running = shared.running();
        shared.peak_running.fetch_max(running, Ordering::SeqCst);
        trace!(running, "Starting task");

        let shared = shared.clone();
        tokio::spawn(async move {
            job.await;
            drop(permit);
            shared.completed.fetch_add(1, Ordering::SeqCst);
            shared.outstanding.send_modify(|n| *n -= 1);
        });
    }
}

/// Eventual outcome of one submitted task.
///
/// Awaiting the handle yields the task's output. Dropping it does not cancel
/// the task.
#[derive(Debug)]
pub struct TaskHandle<T> {
    rx: oneshot::Receiver<Result<T, TaskError>>,
}

impl<T> Future for TaskHandle<T> {
    type Output = Result<T, TaskError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx).poll(cx).map(|received| match received {
            Ok(outcome) => outcome,
            Err(_) => Err(TaskError::Dropped),
        })
    }
}
