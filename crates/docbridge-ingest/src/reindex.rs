//! The background re-index that follows a provisional archive.

use std::sync::Arc;

use docbridge_core::{CoreError, CoreResult, DocumentStore, KeywordCollection, ReindexRequest};
use docbridge_sessions::SessionPool;
use docbridge_tasks::{TaskError, TaskHandle, TaskId};
use tracing::{error, info};

use crate::steps::{self, Step};

/// Observable completion of a background re-index.
///
/// Dropping the ticket does not cancel the re-index.
#[derive(Debug)]
pub struct ReindexTicket {
    handle: TaskHandle<CoreResult<()>>,
}

impl ReindexTicket {
    pub(crate) fn new(handle: TaskHandle<CoreResult<()>>) -> Self {
        Self { handle }
    }

    /// Task id in the ingestor's spawner.
    pub fn id(&self) -> TaskId {
        self.handle.id()
    }

    /// Whether the re-index has finished either way.
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the re-index outcome.
    pub async fn wait(self) -> CoreResult<()> {
        match self.handle.join().await {
            Ok(result) => result,
            Err(TaskError::Timeout(limit)) => Err(CoreError::upstream_unavailable(format!(
                "re-index did not finish within {limit:?}"
            ))),
            Err(e) => Err(CoreError::internal(format!("re-index task ended: {e}"))),
        }
    }
}

/// What the re-index needs once the request has returned.
#[derive(Debug)]
pub(crate) struct ReindexJob {
    pub profile: String,
    pub document_id: String,
    pub final_type_id: String,
    /// Merged over the final type's default keywords.
    pub keywords: KeywordCollection,
}

/// Borrow a fresh connection and reclassify the document into its final type.
///
/// Starts a new sticky chain; nothing from the create request is reused.
pub(crate) async fn run<S: DocumentStore>(
    store: Arc<S>,
    pool: Arc<SessionPool<S>>,
    job: ReindexJob,
) -> CoreResult<()> {
    let result = reindex(&*store, &pool, &job).await;
    let outcome = if result.is_ok() { "success" } else { "failure" };
    metrics::counter!("docbridge_reindex_total", "outcome" => outcome).increment(1);

    match &result {
        Ok(()) => info!(
            profile = %job.profile,
            document_id = %job.document_id,
            type_id = %job.final_type_id,
            "document re-indexed"
        ),
        Err(e) => error!(
            profile = %job.profile,
            document_id = %job.document_id,
            type_id = %job.final_type_id,
            error = %e,
            "re-index failed, document stays provisional"
        ),
    }
    result
}

async fn reindex<S: DocumentStore>(
    store: &S,
    pool: &SessionPool<S>,
    job: &ReindexJob,
) -> CoreResult<()> {
    let connection = steps::run(Step::Auth, pool.borrow(&job.profile)).await?;
    let token = connection.token;

    let (mut keywords, sticky) = steps::run(
        Step::ResolveKeywords,
        store.default_keywords(&token, &connection.sticky, &job.final_type_id),
    )
    .await?;
    keywords.merge(&job.keywords);

    let request = ReindexRequest {
        document_id: job.document_id.clone(),
        type_id: job.final_type_id.clone(),
        keywords,
        expand_keysets: true,
    };
    steps::run(Step::Reindex, store.reindex(&token, &sticky, &request)).await?;
    Ok(())
}
