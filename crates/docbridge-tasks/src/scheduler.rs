//! Fixed-period job scheduler.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::error::{TaskError, TaskResult};
use crate::spawner::{SharedSpawner, SpawnerConfig};

/// Type alias for async job functions.
pub type JobFn = Arc<dyn Fn() -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

/// Unique identifier for a scheduled job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct JobId(Uuid);

impl JobId {
    /// Generate a new unique job ID.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Timing of a scheduled job.
#[derive(Debug)]
struct JobTiming {
    name: String,
    period: Duration,
    next_run: DateTime<Utc>,
}

struct JobEntry {
    timing: RwLock<JobTiming>,
    func: JobFn,
    in_flight: Arc<AtomicBool>,
}

impl JobEntry {
    /// Spawn one run unless the previous one is still going.
    fn fire(&self, id: JobId, spawner: &SharedSpawner) -> TaskResult<bool> {
        if self.in_flight.swap(true, Ordering::AcqRel) {
            debug!(job_id = %id, "previous run still in flight, skipping");
            return Ok(false);
        }

        let func = self.func.clone();
        let in_flight = self.in_flight.clone();
        let name = self.timing.read().name.clone();

        // the handle is dropped, which detaches the run
        let spawned = spawner.spawn(format!("job-{name}"), async move {
            func().await;
            in_flight.store(false, Ordering::Release);
        });

        if let Err(e) = spawned {
            self.in_flight.store(false, Ordering::Release);
            return Err(e);
        }
        Ok(true)
    }
}

fn next_due(from: DateTime<Utc>, period: Duration) -> DateTime<Utc> {
    from + chrono::Duration::from_std(period).unwrap_or_else(|_| chrono::Duration::weeks(52))
}

/// Configuration for the scheduler.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// How often due jobs are checked.
    pub tick_interval: Duration,
    /// Configuration of the spawner that runs jobs.
    pub spawner_config: SpawnerConfig,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(1),
            spawner_config: SpawnerConfig::default(),
        }
    }
}

impl SchedulerConfig {
    /// Create a configuration with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the tick interval.
    #[must_use]
    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }

    /// Set the spawner configuration.
    #[must_use]
    pub fn with_spawner_config(mut self, config: SpawnerConfig) -> Self {
        self.spawner_config = config;
        self
    }
}

/// Runs registered jobs at a fixed period.
///
/// ```rust,no_run
/// use docbridge_tasks::Scheduler;
/// use std::time::Duration;
///
/// # async fn run() {
/// let scheduler = Scheduler::new();
/// scheduler
///     .every("refresh-sessions", Duration::from_secs(86_400), || async {
///         // log every profile in again
///     })
///     .unwrap();
/// scheduler.start().unwrap();
/// // ...
/// scheduler.stop().await;
/// # }
/// ```
pub struct Scheduler {
    config: SchedulerConfig,
    jobs: Arc<DashMap<JobId, Arc<JobEntry>>>,
    spawner: SharedSpawner,
    running: AtomicBool,
    shutdown_tx: RwLock<Option<mpsc::Sender<()>>>,
    loop_handle: RwLock<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("jobs", &self.jobs.len())
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}

impl Scheduler {
    /// Create a scheduler with default configuration.
    pub fn new() -> Self {
        Self::with_config(SchedulerConfig::default())
    }

    /// Create a scheduler with custom configuration.
    pub fn with_config(config: SchedulerConfig) -> Self {
        let spawner = SharedSpawner::with_config(config.spawner_config.clone());
        Self {
            config,
            jobs: Arc::new(DashMap::new()),
            spawner,
            running: AtomicBool::new(false),
            shutdown_tx: RwLock::new(None),
            loop_handle: RwLock::new(None),
        }
    }

    /// Whether the tick loop is running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Register a job that first runs one `period` from now.
    pub fn every<F, Fut>(&self, name: impl Into<String>, period: Duration, func: F) -> TaskResult<JobId>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        if period.is_zero() {
            return Err(TaskError::invalid_config("job period must be positive"));
        }

        let name = name.into();
        let id = JobId::new();
        let timing = JobTiming {
            name: name.clone(),
            period,
            next_run: next_due(Utc::now(), period),
        };

        let func: JobFn = Arc::new(move || Box::pin(func()));
        self.jobs.insert(
            id,
            Arc::new(JobEntry {
                timing: RwLock::new(timing),
                func,
                in_flight: Arc::new(AtomicBool::new(false)),
            }),
        );
        info!(job_id = %id, job_name = %name, period = ?period, "registered periodic job");

        Ok(id)
    }

    /// Start the tick loop.
    pub fn start(&self) -> TaskResult<()> {
        if self.running.swap(true, Ordering::AcqRel) {
            return Err(TaskError::invalid_config("scheduler already running"));
        }

        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        *self.shutdown_tx.write() = Some(shutdown_tx);

        let jobs = self.jobs.clone();
        let spawner = self.spawner.clone();
        let tick_interval = self.config.tick_interval;

        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(tick_interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        let now = Utc::now();
                        let due: Vec<(JobId, Arc<JobEntry>)> = jobs
                            .iter()
                            .filter(|e| e.value().timing.read().next_run <= now)
                            .map(|e| (*e.key(), e.value().clone()))
                            .collect();

                        for (id, entry) in due {
                            debug!(job_id = %id, "running periodic job");
                            if let Err(e) = entry.fire(id, &spawner) {
                                error!(job_id = %id, error = %e, "failed to spawn job");
                            }
                            let mut timing = entry.timing.write();
                            timing.next_run = next_due(now, timing.period);
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        info!("scheduler received shutdown signal");
                        break;
                    }
                }
            }
        });

        *self.loop_handle.write() = Some(handle);
        info!("scheduler started");
        Ok(())
    }

    /// Stop the tick loop and wait for in-flight runs.
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::AcqRel) {
            return;
        }

        let tx = self.shutdown_tx.write().take();
        if let Some(tx) = tx {
            let _ = tx.send(()).await;
        }

        let handle = self.loop_handle.write().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }

        self.spawner.shutdown(Duration::from_secs(30)).await;
        info!("scheduler stopped");
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        if let Some(handle) = self.loop_handle.get_mut().take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    fn fast() -> Scheduler {
        Scheduler::with_config(SchedulerConfig::new().with_tick_interval(Duration::from_millis(10)))
    }

    #[test]
    fn test_every_rejects_zero_period() {
        let scheduler = Scheduler::new();
        let result = scheduler.every("never", Duration::ZERO, || async {});
        assert!(matches!(result, Err(TaskError::InvalidConfig(_))));
    }

    #[tokio::test]
    async fn test_job_runs_on_period() {
        let scheduler = fast();
        let runs = Arc::new(AtomicU32::new(0));

        let counter = runs.clone();
        scheduler
            .every("tick", Duration::from_millis(30), move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                }
            })
            .unwrap();

        scheduler.start().unwrap();
        tokio::time::sleep(Duration::from_millis(150)).await;
        scheduler.stop().await;

        assert!(runs.load(Ordering::SeqCst) >= 2);
        assert!(!scheduler.is_running());
    }

    #[tokio::test]
    async fn test_overlapping_runs_are_skipped() {
        let scheduler = fast();
        let starts = Arc::new(AtomicU32::new(0));

        let counter = starts.clone();
        scheduler
            .every("slow", Duration::from_millis(20), move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(300)).await;
                }
            })
            .unwrap();

        scheduler.start().unwrap();
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(starts.load(Ordering::SeqCst), 1);
        scheduler.stop().await;
    }

    #[tokio::test]
    async fn test_start_twice_fails() {
        let scheduler = fast();
        scheduler.start().unwrap();
        assert!(scheduler.start().is_err());
        scheduler.stop().await;
    }
}
