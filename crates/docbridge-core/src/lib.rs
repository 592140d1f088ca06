//! # DocBridge Core
//!
//! Core types and traits shared by every DocBridge crate.
//!
//! - [`DocumentStore`] - async operation set against the backend document store
//! - [`CoreError`] - error taxonomy returned by every layer
//! - [`Profile`], [`Session`], [`Connection`] - service accounts and their sessions
//! - [`StickyToken`] - load-balancer affinity token threaded through call chains
//! - [`KeywordCollection`], [`Document`], [`UploadSlot`] - document model
//! - [`fixtures`] - in-memory store for tests

#![doc(html_root_url = "https://docs.rs/docbridge-core/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod document;
pub mod duration;
mod error;
pub mod fixtures;
mod session;
mod store;

pub use document::{
    ArchiveRequest, Document, DocumentContent, DocumentQuery, DocumentType, DocumentTypeRef,
    Keyword, KeywordCollection, ReindexRequest, UploadSlot,
};
pub use error::{CoreError, CoreResult};
pub use session::{AccessToken, Connection, Credential, Profile, Session, SessionHandle, StickyToken};
pub use store::DocumentStore;

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
