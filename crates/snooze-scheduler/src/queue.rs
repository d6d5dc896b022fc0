//! TaskQueue — single-flight FIFO executor.
//!
//! Awaitable tasks block the queue until they settle; synchronous tasks
//! advance it immediately. A failing or panicking task is logged and the
//! queue moves on; nothing is retried.

use std::collections::VecDeque;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use tokio::sync::{Notify, watch};
use tracing::{debug, error, warn};

/// How long an empty queue sleeps before checking again.
pub const IDLE_POLL_INTERVAL: Duration = Duration::from_millis(100);

type BoxFuture = Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send>>;

enum Task {
    Async(Box<dyn FnOnce() -> BoxFuture + Send>),
    Sync(Box<dyn FnOnce() -> anyhow::Result<()> + Send>),
}

struct Inner {
    name: String,
    tasks: Mutex<VecDeque<Task>>,
    notify: Notify,
    shutdown_tx: watch::Sender<bool>,
}

impl Inner {
    fn push(&self, task: Task) {
        lock(&self.tasks).push_back(task);
        self.notify.notify_one();
    }

    fn pop(&self) -> Option<Task> {
        lock(&self.tasks).pop_front()
    }
}

/// A strictly sequential async task executor.
///
/// Cloning is cheap; all clones feed the same driver. Must be created
/// inside a tokio runtime.
#[derive(Clone)]
pub struct TaskQueue {
    inner: Arc<Inner>,
}

impl TaskQueue {
    /// Create a queue and spawn its driver.
    pub fn new(name: &str) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let inner = Arc::new(Inner {
            name: name.to_string(),
            tasks: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
            shutdown_tx,
        });

        tokio::spawn(drive(Arc::downgrade(&inner), shutdown_rx));
        debug!(queue = name, "task queue started");

        Self { inner }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Append an awaitable task. The queue waits for it to settle.
    pub fn enqueue<F, Fut>(&self, task: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.inner
            .push(Task::Async(Box::new(move || Box::pin(task()) as BoxFuture)));
    }

    /// Append a synchronous task. The queue advances as soon as it returns.
    pub fn enqueue_sync<F>(&self, task: F)
    where
        F: FnOnce() -> anyhow::Result<()> + Send + 'static,
    {
        self.inner.push(Task::Sync(Box::new(task)));
    }

    /// Append an awaitable task once `delay` has elapsed.
    pub fn enqueue_in<F, Fut>(&self, delay: Duration, task: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let queue = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            queue.enqueue(task);
        });
    }

    /// Number of tasks waiting to run.
    pub fn pending(&self) -> usize {
        lock(&self.inner.tasks).len()
    }

    /// Stop the driver. Queued tasks are dropped unrun.
    pub fn shutdown(&self) {
        let _ = self.inner.shutdown_tx.send(true);
        self.inner.notify.notify_one();
    }
}

async fn drive(inner: Weak<Inner>, mut shutdown: watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow() {
            break;
        }
        let Some(queue) = inner.upgrade() else {
            break;
        };

        match queue.pop() {
            Some(task) => run(&queue.name, task).await,
            None => {
                // Release the strong handle while idle so dropping every
                // TaskQueue ends the driver.
                drop(queue);
                tokio::select! {
                    _ = tokio::time::sleep(IDLE_POLL_INTERVAL) => {}
                    _ = notified(&inner) => {}
                    changed = shutdown.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }
            }
        }
    }

    if let Some(queue) = inner.upgrade() {
        let dropped = lock(&queue.tasks).len();
        debug!(queue = %queue.name, dropped, "task queue stopped");
    }
}

async fn notified(inner: &Weak<Inner>) {
    match inner.upgrade() {
        Some(queue) => queue.notify.notified().await,
        None => std::future::pending().await,
    }
}

async fn run(name: &str, task: Task) {
    match task {
        Task::Async(task) => match tokio::spawn(async move { task().await }).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(queue = %name, error = %e, "task failed"),
            Err(e) => error!(queue = %name, error = %e, "task panicked"),
        },
        Task::Sync(task) => match std::panic::catch_unwind(AssertUnwindSafe(task)) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(queue = %name, error = %e, "task failed"),
            Err(_) => error!(queue = %name, "task panicked"),
        },
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
