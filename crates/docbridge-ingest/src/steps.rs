//! Named protocol steps and their instrumentation.

use std::fmt;
use std::future::Future;

use docbridge_core::CoreResult;
use tracing::{debug, warn};

/// One step of document creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Step {
    /// Borrow a connection from the session pool.
    Auth,
    /// Resolve the document type and its default keywords.
    ResolveKeywords,
    /// Allocate an upload slot.
    Stage,
    /// Upload every part in order.
    UploadParts,
    /// Finalize the slot into a document.
    Archive,
    /// Reclassify a provisionally archived document.
    Reindex,
}

impl Step {
    /// Metric and log label.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Auth => "auth",
            Self::ResolveKeywords => "resolve_keywords",
            Self::Stage => "stage",
            Self::UploadParts => "upload_parts",
            Self::Archive => "archive",
            Self::Reindex => "reindex",
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Count a finished step.
pub(crate) fn record<T>(step: Step, result: &CoreResult<T>) {
    let outcome = match result {
        Ok(_) => "success",
        Err(e) => e.category(),
    };
    metrics::counter!(
        "docbridge_ingest_steps_total",
        "step" => step.as_str(),
        "outcome" => outcome
    )
    .increment(1);

    match result {
        Ok(_) => debug!(step = step.as_str(), "ingest step finished"),
        Err(e) => warn!(
            step = step.as_str(),
            category = e.category(),
            error = %e,
            "ingest step failed"
        ),
    }
}

/// Await a step and count its outcome.
pub(crate) async fn run<T, F>(step: Step, future: F) -> CoreResult<T>
where
    F: Future<Output = CoreResult<T>>,
{
    let result = future.await;
    record(step, &result);
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use docbridge_core::CoreError;

    #[test]
    fn test_labels() {
        assert_eq!(Step::UploadParts.to_string(), "upload_parts");
        assert_eq!(Step::ResolveKeywords.as_str(), "resolve_keywords");
    }

    #[tokio::test]
    async fn test_run_passes_result_through() {
        let ok = run(Step::Stage, async { Ok::<_, CoreError>(7) }).await;
        assert_eq!(ok.unwrap(), 7);

        let err = run(Step::Archive, async {
            Err::<(), _>(CoreError::upstream_rejected(409, "locked"))
        })
        .await;
        assert_eq!(err.unwrap_err().status_code(), 409);
    }
}
