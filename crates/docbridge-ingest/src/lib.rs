//! # DocBridge Ingest
//!
//! Document creation against the backend's chunked upload protocol, plus the
//! read and keyword-update operations request handlers expose.
//!
//! Creating a document walks these steps, threading the backend's sticky
//! token from each call into the next:
//!
//! 1. **auth**: borrow a connection from the session pool
//! 2. **resolve_keywords**: resolve the document type and its default keywords
//! 3. **stage**: allocate an upload slot
//! 4. **upload_parts**: upload parts `1..=N` in order, stopping at the first failure
//! 5. **archive**: finalize the slot into a document
//! 6. **reindex** (background): reclassify a provisionally archived document
//!
//! A document created without caller keywords is archived into the
//! provisional type and re-indexed into the requested type afterwards. The
//! caller gets a [`ReindexTicket`] to observe that.

#![doc(html_root_url = "https://docs.rs/docbridge-ingest/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod config;
mod ingestor;
mod parts;
mod reindex;
mod request;
mod steps;

pub use config::IngestConfig;
pub use ingestor::{CreatedDocument, IngestStatus, Ingestor};
pub use reindex::ReindexTicket;
pub use request::CreateDocumentRequest;
pub use steps::Step;
