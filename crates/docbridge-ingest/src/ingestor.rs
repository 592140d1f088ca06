//! Document creation and the document operations exposed to request handlers.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use docbridge_core::{
    AccessToken, ArchiveRequest, CoreError, CoreResult, Document, DocumentContent, DocumentQuery,
    DocumentStore, DocumentType, DocumentTypeRef, Keyword, KeywordCollection, StickyToken,
    UploadSlot,
};
use docbridge_sessions::SessionPool;
use docbridge_tasks::SharedSpawner;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::config::IngestConfig;
use crate::parts;
use crate::reindex::{self, ReindexJob, ReindexTicket};
use crate::request::{self, CreateDocumentRequest, ValidCreate};
use crate::steps::{self, Step};

/// Where a newly created document landed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IngestStatus {
    /// Archived directly into the requested type.
    Archived,
    /// Archived into the provisional type; a re-index is pending.
    Staged,
}

impl fmt::Display for IngestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Archived => f.write_str("archived"),
            Self::Staged => f.write_str("staged"),
        }
    }
}

/// Result of [`Ingestor::create_document`].
#[derive(Debug)]
pub struct CreatedDocument {
    /// The archived document as the backend reports it.
    pub document: Document,
    /// Direct or provisional archive.
    pub status: IngestStatus,
    /// The pending re-index, for provisional archives.
    pub reindex: Option<ReindexTicket>,
}

/// Type resolution outcome for one create.
struct Resolved {
    final_type: DocumentType,
    archive_type_id: String,
    keywords: KeywordCollection,
}

/// Runs the document protocols against the backend on behalf of a profile.
pub struct Ingestor<S> {
    store: Arc<S>,
    pool: Arc<SessionPool<S>>,
    config: IngestConfig,
    tasks: SharedSpawner,
}

impl<S> fmt::Debug for Ingestor<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ingestor")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<S: DocumentStore> Ingestor<S> {
    /// Create an ingestor with its own task spawner.
    pub fn new(store: Arc<S>, pool: Arc<SessionPool<S>>, config: IngestConfig) -> CoreResult<Self> {
        config.validate()?;
        Ok(Self {
            store,
            pool,
            config,
            tasks: SharedSpawner::new(),
        })
    }

    /// Run archives and re-indexes on `spawner`.
    #[must_use]
    pub fn with_spawner(mut self, spawner: SharedSpawner) -> Self {
        self.tasks = spawner;
        self
    }

    /// The settings this ingestor runs with.
    pub fn config(&self) -> &IngestConfig {
        &self.config
    }

    /// The session pool connections come from.
    pub fn pool(&self) -> &Arc<SessionPool<S>> {
        &self.pool
    }

    /// The spawner background work runs on.
    pub fn tasks(&self) -> &SharedSpawner {
        &self.tasks
    }

    /// Stage, upload and archive a new document.
    ///
    /// With at least one caller keyword the document is archived into the
    /// requested type. Without any it is archived into the provisional type
    /// and one background re-index into the requested type is scheduled.
    ///
    /// Every backend call presents the sticky token returned by the call
    /// before it. Nothing is retried; running the same request twice creates
    /// two documents.
    pub async fn create_document(
        &self,
        profile: &str,
        request: CreateDocumentRequest,
    ) -> CoreResult<CreatedDocument> {
        let request = request::validate(request, &self.config)?;
        let size = request.content.len() as u64;
        let direct = request.is_direct();
        info!(
            profile,
            document_type = %request.document_type,
            size,
            direct,
            "creating document"
        );

        let connection = steps::run(Step::Auth, self.pool.borrow(profile)).await?;
        let token = connection.token;

        let (resolved, sticky) = steps::run(
            Step::ResolveKeywords,
            self.resolve(&token, connection.sticky, &request),
        )
        .await?;

        let (slot, sticky) = steps::run(
            Step::Stage,
            self.store
                .initiate_staging(&token, &sticky, &request.extension, size),
        )
        .await?;
        debug!(slot_id = %slot.id, parts = slot.total_parts, "upload slot allocated");

        let sticky = steps::run(
            Step::UploadParts,
            self.upload_parts(&token, sticky, &slot, &request.content),
        )
        .await?;

        let archive = ArchiveRequest {
            type_id: resolved.archive_type_id.clone(),
            slot_id: slot.id,
            keywords: resolved.keywords,
            comment: request.comment.clone(),
            skip_workflow: !direct,
        };
        let (document_id, sticky) =
            steps::run(Step::Archive, self.archive(token.clone(), sticky, archive)).await?;

        let document = match self.store.get_document(&token, &sticky, &document_id).await {
            Ok((document, _)) => document,
            Err(e) => {
                warn!(document_id = %document_id, error = %e, "archived document could not be read back");
                Document {
                    id: document_id.clone(),
                    name: request.comment.clone(),
                    type_id: resolved.archive_type_id,
                    created_by: None,
                    stored_at: None,
                }
            }
        };

        let (status, reindex) = if direct {
            (IngestStatus::Archived, None)
        } else {
            let job = ReindexJob {
                profile: profile.to_string(),
                document_id: document.id.clone(),
                final_type_id: resolved.final_type.id,
                keywords: request.index_key,
            };
            (IngestStatus::Staged, self.spawn_reindex(job))
        };

        info!(profile, document_id = %document.id, %status, "document created");
        Ok(CreatedDocument {
            document,
            status,
            reindex,
        })
    }

    /// Fetch document metadata.
    pub async fn get_document(&self, profile: &str, id: &str) -> CoreResult<Document> {
        let id = request::validate_id(id)?;
        let connection = self.pool.borrow(profile).await?;
        let (document, _) = self
            .store
            .get_document(&connection.token, &connection.sticky, id)
            .await?;
        Ok(document)
    }

    /// List documents matching `query`.
    pub async fn list_documents(&self, profile: &str, query: &DocumentQuery) -> CoreResult<Vec<Document>> {
        query.validate()?;
        let connection = self.pool.borrow(profile).await?;
        let (documents, _) = self
            .store
            .query_documents(&connection.token, &connection.sticky, query)
            .await?;
        debug!(profile, matched = documents.len(), "documents listed");
        Ok(documents)
    }

    /// Fetch a document's keywords.
    pub async fn document_keywords(&self, profile: &str, id: &str) -> CoreResult<KeywordCollection> {
        let id = request::validate_id(id)?;
        let connection = self.pool.borrow(profile).await?;
        let (keywords, _) = self
            .store
            .document_keywords(&connection.token, &connection.sticky, id)
            .await?;
        Ok(keywords)
    }

    /// Merge `keywords` over a document's current set and return the result
    /// as stored.
    pub async fn update_keywords(
        &self,
        profile: &str,
        id: &str,
        keywords: Vec<Keyword>,
    ) -> CoreResult<KeywordCollection> {
        let keywords = request::validate_update(keywords)?;
        let id = request::validate_id(id)?;
        let connection = self.pool.borrow(profile).await?;
        let token = connection.token;

        let (mut current, sticky) = self
            .store
            .document_keywords(&token, &connection.sticky, id)
            .await?;
        current.merge(&keywords);
        let sticky = self.store.update_keywords(&token, &sticky, id, &current).await?;
        let (stored, _) = self.store.document_keywords(&token, &sticky, id).await?;

        info!(profile, document_id = id, updated = keywords.len(), "keywords updated");
        Ok(stored)
    }

    /// Fetch a document's binary content.
    pub async fn document_content(&self, profile: &str, id: &str) -> CoreResult<DocumentContent> {
        let id = request::validate_id(id)?;
        let connection = self.pool.borrow(profile).await?;
        let (content, _) = self
            .store
            .document_content(&connection.token, &connection.sticky, id)
            .await?;
        Ok(content)
    }

    /// Resolve a document type by id or name.
    pub async fn document_type(&self, profile: &str, type_ref: &DocumentTypeRef) -> CoreResult<DocumentType> {
        let connection = self.pool.borrow(profile).await?;
        let (document_type, _) = self
            .store
            .find_document_type(&connection.token, &connection.sticky, type_ref)
            .await?;
        Ok(document_type)
    }

    /// Probe the backend.
    pub async fn health_check(&self) -> CoreResult<()> {
        self.store.health_check().await
    }

    /// Wait for in-flight archives and re-indexes.
    pub async fn shutdown(&self, timeout: Duration) {
        self.tasks.shutdown(timeout).await;
    }

    async fn resolve(
        &self,
        token: &AccessToken,
        sticky: StickyToken,
        request: &ValidCreate,
    ) -> CoreResult<(Resolved, StickyToken)> {
        // the final type must resolve even when archiving provisionally
        let (final_type, sticky) = self
            .store
            .find_document_type(token, &sticky, &request.document_type)
            .await?;

        let archive_type_id = if request.is_direct() {
            final_type.id.clone()
        } else {
            self.config.provisional_type_id.clone()
        };
        let (mut keywords, sticky) = self
            .store
            .default_keywords(token, &sticky, &archive_type_id)
            .await?;
        if request.is_direct() {
            keywords.merge(&request.keywords);
        }
        keywords.merge(&request.index_key);

        Ok((
            Resolved {
                final_type,
                archive_type_id,
                keywords,
            },
            sticky,
        ))
    }

    /// Upload parts strictly in order, each with the previous part's token.
    async fn upload_parts(
        &self,
        token: &AccessToken,
        mut sticky: StickyToken,
        slot: &UploadSlot,
        content: &Bytes,
    ) -> CoreResult<StickyToken> {
        let parts = parts::split(content, slot)?;
        for (part, bytes) in (1..=slot.total_parts).zip(parts) {
            sticky = match self
                .store
                .upload_part(token, &sticky, &slot.id, part, bytes)
                .await
            {
                Ok(next) => next,
                Err(e) => {
                    warn!(slot_id = %slot.id, part, total = slot.total_parts, "part upload failed");
                    return Err(e);
                }
            };
        }
        Ok(sticky)
    }

    /// Archive on a tracked task so that dropping the caller does not
    /// cancel a call the backend may already be executing.
    async fn archive(
        &self,
        token: AccessToken,
        sticky: StickyToken,
        request: ArchiveRequest,
    ) -> CoreResult<(String, StickyToken)> {
        let store = Arc::clone(&self.store);
        let handle = self
            .tasks
            .spawn_with_timeout(
                "archive",
                async move { store.archive(&token, &sticky, &request).await },
                None,
            )
            .map_err(|e| CoreError::internal(format!("could not start archive: {e}")))?;
        handle
            .join()
            .await
            .map_err(|e| CoreError::internal(format!("archive task ended: {e}")))?
    }

    fn spawn_reindex(&self, job: ReindexJob) -> Option<ReindexTicket> {
        let name = format!("reindex:{}", job.document_id);
        let document_id = job.document_id.clone();
        let task = reindex::run(Arc::clone(&self.store), Arc::clone(&self.pool), job);
        match self
            .tasks
            .spawn_fallible(name, task, Some(self.config.reindex_timeout))
        {
            Ok(handle) => Some(ReindexTicket::new(handle)),
            Err(e) => {
                error!(document_id = %document_id, error = %e, "could not schedule re-index");
                None
            }
        }
    }
}
