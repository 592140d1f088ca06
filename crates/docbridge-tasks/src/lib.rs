//! # DocBridge Tasks
//!
//! Supervised background execution for DocBridge.
//!
//! 1. **Spawner**: run tasks with a timeout, cancellation, delayed start, and
//!    outcome counters
//! 2. **Scheduler**: run jobs at a fixed period
//!
//! ## Spawner
//!
//! ```rust,no_run
//! use docbridge_tasks::{Spawner, SpawnerConfig};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() {
//!     let spawner = Spawner::with_config(
//!         SpawnerConfig::new().with_default_timeout(Duration::from_secs(60)),
//!     );
//!
//!     let handle = spawner.spawn("compute", async { 42 }).unwrap();
//!     assert_eq!(handle.join().await.unwrap(), 42);
//!
//!     // Runs after ten seconds, or as soon as shutdown begins.
//!     spawner
//!         .spawn_after("release", Duration::from_secs(10), async {})
//!         .unwrap();
//!
//!     spawner.shutdown(Duration::from_secs(30)).await;
//! }
//! ```
//!
//! ## Scheduler
//!
//! ```rust,no_run
//! use docbridge_tasks::Scheduler;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() {
//!     let scheduler = Scheduler::new();
//!     scheduler
//!         .every("refresh", Duration::from_secs(3600), || async {})
//!         .unwrap();
//!     scheduler.start().unwrap();
//!     scheduler.stop().await;
//! }
//! ```

#![doc(html_root_url = "https://docs.rs/docbridge-tasks/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod error;
mod scheduler;
mod spawner;
mod task;

pub use error::{TaskError, TaskResult};
pub use scheduler::{JobFn, JobId, Scheduler, SchedulerConfig};
pub use spawner::{SharedSpawner, Spawner, SpawnerConfig, TaskHandle};
pub use task::{TaskId, TaskStats};
