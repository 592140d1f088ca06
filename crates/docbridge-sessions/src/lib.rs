//! # DocBridge Sessions
//!
//! A process-wide pool of backend sessions, one per configured profile.
//!
//! - [`SessionPool::borrow`] mints a connection from the profile's current
//!   session, logging in again when the backend refuses it
//! - [`SessionPool::refresh_all`] logs every profile in again and swaps the
//!   new sessions in atomically; the replaced handles are disconnected after
//!   a grace delay so calls already using them can finish
//! - [`SessionPool::dispose`] disconnects everything at shutdown
//!
//! ```rust,ignore
//! let pool = Arc::new(SessionPool::new(store, profiles, SessionPoolConfig::default())?);
//! pool.refresh_all().await;
//! pool.schedule_refresh(&scheduler)?;
//!
//! let connection = pool.borrow("ops").await?;
//! ```

#![doc(html_root_url = "https://docs.rs/docbridge-sessions/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod config;
mod pool;

pub use config::SessionPoolConfig;
pub use pool::{ProfileStatus, RefreshSummary, SessionPool};
