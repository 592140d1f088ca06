//! # DocBridge Client
//!
//! [`BackendClient`] implements [`DocumentStore`](docbridge_core::DocumentStore)
//! against the document store's REST API:
//!
//! - OAuth password grant at login; the refresh token becomes the session handle
//! - refresh grant to mint each connection, revocation to disconnect
//! - the load-balancer cookie is read from every response and sent on the next call
//! - non-2xx statuses become `UpstreamRejected` (4xx) or `UpstreamUnavailable`
//!
//! ```rust,no_run
//! use docbridge_client::{BackendClient, BackendConfig};
//!
//! let client = BackendClient::new(BackendConfig {
//!     base_url: "https://docs.example.com".to_string(),
//!     client_id: "bridge".to_string(),
//!     ..BackendConfig::default()
//! })
//! .unwrap();
//! ```

#![doc(html_root_url = "https://docs.rs/docbridge-client/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod client;
mod config;
mod sticky;
mod wire;

pub use client::BackendClient;
pub use config::{BackendConfig, CallTimeouts};
