//! Supervised spawner for background work.
//!
//! Every task is counted and bounded by an optional timeout.
//! Dropping a [`TaskHandle`] detaches the task; it keeps running until it
//! finishes, times out, or is cancelled explicitly.

use std::fmt::Display;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{TaskError, TaskResult};
use crate::task::{TaskId, TaskStats, TaskStatus};

/// Configuration for the task spawner.
#[derive(Debug, Clone)]
pub struct SpawnerConfig {
    /// Maximum number of unfinished tasks.
    pub max_concurrent: usize,
    /// Timeout applied when a task does not name its own.
    pub default_timeout: Option<Duration>,
}

impl Default for SpawnerConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 1000,
            default_timeout: Some(Duration::from_secs(300)),
        }
    }
}

impl SpawnerConfig {
    /// Create a configuration with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set maximum unfinished tasks.
    #[must_use]
    pub fn with_max_concurrent(mut self, max: usize) -> Self {
        self.max_concurrent = max;
        self
    }

    /// Set the default timeout.
    #[must_use]
    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = Some(timeout);
        self
    }

    /// Disable the default timeout.
    #[must_use]
    pub fn without_timeout(mut self) -> Self {
        self.default_timeout = None;
        self
    }
}

/// Handle to a spawned task.
#[derive(Debug)]
pub struct TaskHandle<T> {
    id: TaskId,
    handle: JoinHandle<TaskResult<T>>,
    cancel_tx: Option<oneshot::Sender<()>>,
}

impl<T> TaskHandle<T> {
    /// Task ID.
    pub fn id(&self) -> TaskId {
        self.id
    }

    /// Whether the task has finished.
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Ask the task to stop at its next suspension point.
    pub fn cancel(&mut self) {
        if let Some(tx) = self.cancel_tx.take() {
            let _ = tx.send(());
        }
    }

    /// Wait for the task's output.
    pub async fn join(self) -> TaskResult<T> {
        match self.handle.await {
            Ok(result) => result,
            Err(e) if e.is_panic() => Err(TaskError::panicked(e.to_string())),
            Err(e) => Err(TaskError::cancelled(e.to_string())),
        }
    }
}

enum Outcome<T> {
    Finished(T),
    TimedOut(Duration),
    Cancelled,
}

async fn supervise<F: Future>(
    task: F,
    timeout: Option<Duration>,
    cancel_rx: oneshot::Receiver<()>,
) -> Outcome<F::Output> {
    let deadline = async {
        match timeout {
            Some(limit) => {
                tokio::time::sleep(limit).await;
                limit
            }
            None => std::future::pending().await,
        }
    };

    tokio::select! {
        output = task => Outcome::Finished(output),
        limit = deadline => Outcome::TimedOut(limit),
        Ok(()) = cancel_rx => Outcome::Cancelled,
    }
}

async fn drained(rx: &mut watch::Receiver<bool>) {
    loop {
        let draining = *rx.borrow_and_update();
        if draining || rx.changed().await.is_err() {
            return;
        }
    }
}

/// Background task spawner.
#[derive(Debug)]
pub struct Spawner {
    config: SpawnerConfig,
    stats: Arc<TaskStats>,
    shutdown: AtomicBool,
    draining: watch::Sender<bool>,
}

impl Spawner {
    /// Create a spawner with default configuration.
    pub fn new() -> Self {
        Self::with_config(SpawnerConfig::default())
    }

    /// Create a spawner with custom configuration.
    pub fn with_config(config: SpawnerConfig) -> Self {
        let (draining, _) = watch::channel(false);
        Self {
            config,
            stats: Arc::new(TaskStats::new()),
            shutdown: AtomicBool::new(false),
            draining,
        }
    }

    /// Whether the spawner has been shut down.
    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    /// Unfinished task count.
    pub fn running_count(&self) -> u64 {
        self.stats.currently_running()
    }

    /// Task counters.
    pub fn stats(&self) -> &TaskStats {
        &self.stats
    }

    /// Spawn a task under the default timeout.
    pub fn spawn<F, T>(&self, name: impl Into<String>, task: F) -> TaskResult<TaskHandle<T>>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        self.spawn_with_timeout(name, task, self.config.default_timeout)
    }

    /// Spawn a task with an explicit timeout, or none.
    pub fn spawn_with_timeout<F, T>(
        &self,
        name: impl Into<String>,
        task: F,
        timeout: Option<Duration>,
    ) -> TaskResult<TaskHandle<T>>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        self.launch(name.into(), task, timeout, None, |_| None)
    }

    /// Spawn a task whose `Err` output counts as a failure.
    pub fn spawn_fallible<F, T, E>(
        &self,
        name: impl Into<String>,
        task: F,
        timeout: Option<Duration>,
    ) -> TaskResult<TaskHandle<Result<T, E>>>
    where
        F: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Display + Send + 'static,
    {
        self.launch(name.into(), task, timeout, None, |output: &Result<T, E>| {
            output.as_ref().err().map(ToString::to_string)
        })
    }

    /// Spawn a fire-and-forget task that starts after `delay`.
    ///
    /// The delay is cut short once [`shutdown`](Self::shutdown) begins, so
    /// delayed work still runs before the process exits.
    pub fn spawn_after<F>(&self, name: impl Into<String>, delay: Duration, task: F) -> TaskResult<TaskId>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let timeout = self.config.default_timeout;
        self.launch(name.into(), task, timeout, Some(delay), |_| None)
            .map(|handle| handle.id())
    }

    fn admit(&self) -> TaskResult<TaskId> {
        if self.is_shutdown() {
            return Err(TaskError::spawn_failed("spawner is shut down"));
        }

        if self.running_count() >= self.config.max_concurrent as u64 {
            return Err(TaskError::spawn_failed(format!(
                "max concurrent tasks ({}) reached",
                self.config.max_concurrent
            )));
        }

        self.stats.record_spawn();
        Ok(TaskId::new())
    }

    fn launch<F, T, C>(
        &self,
        name: String,
        task: F,
        timeout: Option<Duration>,
        delay: Option<Duration>,
        classify: C,
    ) -> TaskResult<TaskHandle<T>>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
        C: FnOnce(&T) -> Option<String> + Send + 'static,
    {
        let id = self.admit()?;
        let stats = self.stats.clone();
        let (cancel_tx, cancel_rx) = oneshot::channel();
        let mut draining = self.draining.subscribe();

        debug!(task_id = %id, task_name = %name, "spawning background task");

        let handle = tokio::spawn(async move {
            if let Some(delay) = delay {
                tokio::select! {
                    () = tokio::time::sleep(delay) => {}
                    () = drained(&mut draining) => {
                        debug!(task_id = %id, "start delay cut short by shutdown");
                    }
                }
            }

            let (status, result) = match supervise(task, timeout, cancel_rx).await {
                Outcome::Finished(output) => match classify(&output) {
                    Some(error) => {
                        warn!(task_id = %id, task_name = %name, %error, "task failed");
                        (TaskStatus::Failed, Ok(output))
                    }
                    None => (TaskStatus::Completed, Ok(output)),
                },
                Outcome::TimedOut(limit) => {
                    warn!(task_id = %id, task_name = %name, "task timed out");
                    (TaskStatus::TimedOut, Err(TaskError::timeout(limit)))
                }
                Outcome::Cancelled => {
                    info!(task_id = %id, task_name = %name, "task cancelled");
                    (TaskStatus::Cancelled, Err(TaskError::cancelled(name)))
                }
            };
            stats.record_finished(status);
            result
        });

        Ok(TaskHandle {
            id,
            handle,
            cancel_tx: Some(cancel_tx),
        })
    }

    /// Stop admitting tasks, release delayed ones, and wait for all to finish.
    pub async fn shutdown(&self, timeout: Duration) {
        info!("shutting down task spawner");
        self.shutdown.store(true, Ordering::Release);
        self.draining.send_replace(true);

        let deadline = tokio::time::Instant::now() + timeout;
        while self.running_count() > 0 {
            if tokio::time::Instant::now() >= deadline {
                warn!(
                    running = self.running_count(),
                    "shutdown timeout reached, tasks still running"
                );
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        info!("task spawner shutdown complete");
    }
}

impl Default for Spawner {
    fn default() -> Self {
        Self::new()
    }
}

/// A cloneable handle to one [`Spawner`].
#[derive(Debug, Clone, Default)]
pub struct SharedSpawner(Arc<Spawner>);

impl SharedSpawner {
    /// Create a shared spawner with default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a shared spawner with configuration.
    pub fn with_config(config: SpawnerConfig) -> Self {
        Self(Arc::new(Spawner::with_config(config)))
    }

    /// The inner spawner.
    pub fn inner(&self) -> &Spawner {
        &self.0
    }

    /// See [`Spawner::spawn`].
    pub fn spawn<F, T>(&self, name: impl Into<String>, task: F) -> TaskResult<TaskHandle<T>>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        self.0.spawn(name, task)
    }

    /// See [`Spawner::spawn_with_timeout`].
    pub fn spawn_with_timeout<F, T>(
        &self,
        name: impl Into<String>,
        task: F,
        timeout: Option<Duration>,
    ) -> TaskResult<TaskHandle<T>>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        self.0.spawn_with_timeout(name, task, timeout)
    }

    /// See [`Spawner::spawn_fallible`].
    pub fn spawn_fallible<F, T, E>(
        &self,
        name: impl Into<String>,
        task: F,
        timeout: Option<Duration>,
    ) -> TaskResult<TaskHandle<Result<T, E>>>
    where
        F: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Display + Send + 'static,
    {
        self.0.spawn_fallible(name, task, timeout)
    }

    /// See [`Spawner::spawn_after`].
    pub fn spawn_after<F>(&self, name: impl Into<String>, delay: Duration, task: F) -> TaskResult<TaskId>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.0.spawn_after(name, delay, task)
    }

    /// See [`Spawner::shutdown`].
    pub async fn shutdown(&self, timeout: Duration) {
        self.0.shutdown(timeout).await;
    }
}
