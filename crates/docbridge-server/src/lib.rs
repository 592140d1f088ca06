//! # DocBridge Server
//!
//! REST facade in front of the backend document store.
//!
//! ```text
//!  client ──HTTP──► docbridge ──────────────► document store
//!                   │ OnBase-Profile           │ login / connect
//!                   │ session pool ────────────┤ stage / upload parts
//!                   │ ingestion orchestrator ──┤ archive / re-index
//!                   └ /_docbridge/*            └ read-back
//! ```
//!
//! # Endpoints
//!
//! | Method | Path | |
//! |--------|------|-|
//! | `GET` | `/documents` | list, filtered by query parameters |
//! | `POST` | `/documents` | multipart `file` + `attributes` |
//! | `GET` | `/documents/{id}` | document metadata |
//! | `GET` | `/documents/{id}/content` | raw bytes |
//! | `GET`/`PATCH` | `/documents/{id}/keywords` | keyword read / replace |
//! | `GET` | `/document-types/{id}` | type lookup |
//! | `GET` | `/_docbridge/{health,ready,metrics,version}` | operational |
//!
//! Every non-operational request names its service account in exactly one
//! `OnBase-Profile` header.
//!
//! ```bash
//! $ docbridge --config /etc/docbridge/docbridge.toml
//! $ DOCBRIDGE_BACKEND_URL=https://onbase.example.com/api docbridge -c docbridge.toml
//! ```

#![doc(html_root_url = "https://docs.rs/docbridge-server/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod auth;
pub mod config;
pub mod error;
pub mod health;
pub mod multipart;
pub mod resources;
pub mod routes;
pub mod server;
pub mod state;

pub use auth::{BasicAuth, PROFILE_HEADER};
pub use config::{AuthSettings, BridgeConfig, ServerSettings};
pub use error::{ApiError, ServerError, ServerResult};
pub use health::{HealthChecker, HealthStatus, ReadinessStatus};
pub use routes::Route;
pub use server::{serve, shutdown_signal, BridgeServer};
pub use state::{AppState, HttpResponse};

/// Server version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
