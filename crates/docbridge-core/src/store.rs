//! The backend document store seam.
//!
//! [`DocumentStore`] is the thin operation set the session pool and the
//! ingestion orchestrator drive. Implementations translate every non-2xx
//! outcome into a [`CoreError`](crate::CoreError) variant.
//!
//! Every data operation takes the bearer token and the sticky token from the
//! previous call, and returns the sticky token for the next one. Callers
//! thread it; implementations never cache it.

use std::future::Future;

use bytes::Bytes;

use crate::document::{
    ArchiveRequest, Document, DocumentContent, DocumentQuery, DocumentType, DocumentTypeRef,
    KeywordCollection, ReindexRequest, UploadSlot,
};
use crate::error::CoreResult;
use crate::session::{AccessToken, Credential, SessionHandle, StickyToken};

/// Async operations against the document store.
///
/// # Example
///
/// ```rust,ignore
/// use docbridge_core::{DocumentStore, StickyToken};
///
/// async fn stage<S: DocumentStore>(store: &S, creds: &Credential) -> CoreResult<()> {
///     let handle = store.authenticate(creds).await?;
///     let (token, sticky) = store.reauthenticate(&handle).await?;
///     let (slot, sticky) = store.initiate_staging(&token, &sticky, "pdf", 1024).await?;
///     let _sticky = store.upload_part(&token, &sticky, &slot.id, 1, payload).await?;
///     Ok(())
/// }
/// ```
pub trait DocumentStore: Send + Sync + 'static {
    /// Log in with a credential, yielding a reusable session handle.
    fn authenticate(
        &self,
        credential: &Credential,
    ) -> impl Future<Output = CoreResult<SessionHandle>> + Send;

    /// Mint a connection from a session handle.
    ///
    /// Fails with `SessionExpired` when the backend no longer honours it.
    fn reauthenticate(
        &self,
        handle: &SessionHandle,
    ) -> impl Future<Output = CoreResult<(AccessToken, StickyToken)>> + Send;

    /// Invalidate a session handle.
    fn disconnect(&self, handle: &SessionHandle) -> impl Future<Output = CoreResult<()>> + Send;

    /// Resolve a document type by id or name.
    fn find_document_type(
        &self,
        token: &AccessToken,
        sticky: &StickyToken,
        type_ref: &DocumentTypeRef,
    ) -> impl Future<Output = CoreResult<(DocumentType, StickyToken)>> + Send;

    /// Fetch the default keyword set of a document type.
    fn default_keywords(
        &self,
        token: &AccessToken,
        sticky: &StickyToken,
        type_id: &str,
    ) -> impl Future<Output = CoreResult<(KeywordCollection, StickyToken)>> + Send;

    /// Allocate an upload slot for a payload.
    fn initiate_staging(
        &self,
        token: &AccessToken,
        sticky: &StickyToken,
        extension: &str,
        size: u64,
    ) -> impl Future<Output = CoreResult<(UploadSlot, StickyToken)>> + Send;

    /// Upload one part (1-based) into a slot.
    fn upload_part(
        &self,
        token: &AccessToken,
        sticky: &StickyToken,
        slot_id: &str,
        part: u32,
        bytes: Bytes,
    ) -> impl Future<Output = CoreResult<StickyToken>> + Send;

    /// Finalize a slot into a document, yielding its id.
    fn archive(
        &self,
        token: &AccessToken,
        sticky: &StickyToken,
        request: &ArchiveRequest,
    ) -> impl Future<Output = CoreResult<(String, StickyToken)>> + Send;

    /// Fetch document metadata.
    fn get_document(
        &self,
        token: &AccessToken,
        sticky: &StickyToken,
        id: &str,
    ) -> impl Future<Output = CoreResult<(Document, StickyToken)>> + Send;

    /// List documents matching a filter, in ascending id order.
    fn query_documents(
        &self,
        token: &AccessToken,
        sticky: &StickyToken,
        query: &DocumentQuery,
    ) -> impl Future<Output = CoreResult<(Vec<Document>, StickyToken)>> + Send;

    /// Fetch the current keyword set of a document.
    fn document_keywords(
        &self,
        token: &AccessToken,
        sticky: &StickyToken,
        id: &str,
    ) -> impl Future<Output = CoreResult<(KeywordCollection, StickyToken)>> + Send;

    /// Replace the keyword set of a document.
    fn update_keywords(
        &self,
        token: &AccessToken,
        sticky: &StickyToken,
        id: &str,
        keywords: &KeywordCollection,
    ) -> impl Future<Output = CoreResult<StickyToken>> + Send;

    /// Reclassify an archived document.
    fn reindex(
        &self,
        token: &AccessToken,
        sticky: &StickyToken,
        request: &ReindexRequest,
    ) -> impl Future<Output = CoreResult<StickyToken>> + Send;

    /// Fetch the binary content of a document.
    fn document_content(
        &self,
        token: &AccessToken,
        sticky: &StickyToken,
        id: &str,
    ) -> impl Future<Output = CoreResult<(DocumentContent, StickyToken)>> + Send;

    /// Probe backend health without a session.
    fn health_check(&self) -> impl Future<Output = CoreResult<()>> + Send;
}
