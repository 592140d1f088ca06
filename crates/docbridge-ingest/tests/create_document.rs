//! Document creation scenarios against the in-memory store.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use docbridge_core::fixtures::{FakeStore, Op, RecordedCall};
use docbridge_core::{
    CoreError, Credential, DocumentQuery, DocumentTypeRef, Keyword, KeywordCollection, Profile,
};
use docbridge_ingest::{CreateDocumentRequest, IngestConfig, IngestStatus, Ingestor};
use docbridge_sessions::{SessionPool, SessionPoolConfig};

fn base_store() -> FakeStore {
    let defaults = KeywordCollection::from_keywords(vec![Keyword::new("10", ["AP"])])
        .unwrap()
        .with_guid("g-101");
    FakeStore::new()
        .with_user("ops-svc", "ops-pw")
        .with_document_type("101", "Invoice")
        .with_document_type("900", "Provisional")
        .with_default_keywords("101", defaults)
        .with_part_size(4)
}

fn ingestor(store: &Arc<FakeStore>) -> Ingestor<FakeStore> {
    let profiles = vec![Profile::new("ops", Credential::new("ops-svc", "ops-pw"))];
    let pool = SessionPool::new(Arc::clone(store), profiles, SessionPoolConfig::default()).unwrap();
    let config = IngestConfig::new("900")
        .with_max_size(64)
        .with_index_key_type("77")
        .with_reindex_timeout(Duration::from_secs(5));
    Ingestor::new(Arc::clone(store), Arc::new(pool), config).unwrap()
}

fn invoice(content: &'static [u8]) -> CreateDocumentRequest {
    CreateDocumentRequest::new(
        DocumentTypeRef::Name("Invoice".to_string()),
        "pdf",
        Bytes::from_static(content),
    )
}

/// Calls from the first connection onwards.
fn chain(store: &FakeStore) -> Vec<RecordedCall> {
    store
        .calls()
        .into_iter()
        .skip_while(|c| c.op != Op::Reauthenticate)
        .collect()
}

fn assert_sticky_chain(calls: &[RecordedCall]) {
    assert!(calls.len() > 1);
    for pair in calls.windows(2) {
        assert_eq!(
            pair[1].sticky_in.as_ref(),
            pair[0].sticky_out.as_ref(),
            "{:?} did not present the token returned by {:?}",
            pair[1].op,
            pair[0].op
        );
    }
}

#[tokio::test]
async fn test_no_keywords_archives_provisionally_then_reindexes() {
    let store = Arc::new(base_store());
    let ingestor = ingestor(&store);

    let created = ingestor
        .create_document("ops", invoice(b"abcdefgh"))
        .await
        .unwrap();
    assert_eq!(created.status, IngestStatus::Staged);
    assert_eq!(created.document.type_id, "900");
    assert_eq!(store.calls_of(Op::UploadPart).len(), 2);

    created.reindex.unwrap().wait().await.unwrap();
    assert_eq!(store.count(Op::Reindex), 1);

    let document = ingestor
        .get_document("ops", &created.document.id)
        .await
        .unwrap();
    assert_eq!(document.type_id, "101");

    // the final type's defaults were applied by the re-index
    let keywords = store.keywords(&created.document.id).unwrap();
    assert_eq!(keywords.get("10"), Some(&["AP".to_string()][..]));
}

#[tokio::test]
async fn test_keywords_archive_directly() {
    let store = Arc::new(base_store());
    let ingestor = ingestor(&store);

    let created = ingestor
        .create_document(
            "ops",
            invoice(b"abcdefghij").with_keywords([Keyword::new("5", ["INV-7"])]),
        )
        .await
        .unwrap();
    assert_eq!(created.status, IngestStatus::Archived);
    assert_eq!(created.document.type_id, "101");
    assert!(created.reindex.is_none());

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(store.count(Op::Reindex), 0);

    let keywords = store.keywords(&created.document.id).unwrap();
    assert_eq!(keywords.guid(), Some("g-101"));
    assert_eq!(keywords.get("5"), Some(&["INV-7".to_string()][..]));
    assert_eq!(keywords.get("10"), Some(&["AP".to_string()][..]));
    assert_eq!(
        store.content(&created.document.id).unwrap(),
        Bytes::from_static(b"abcdefghij")
    );
}

#[tokio::test]
async fn test_every_call_presents_previous_sticky_token() {
    let store = Arc::new(base_store());
    let ingestor = ingestor(&store);

    ingestor
        .create_document(
            "ops",
            invoice(b"0123456789abcdef!").with_keywords([Keyword::new("5", ["X"])]),
        )
        .await
        .unwrap();

    let calls = chain(&store);
    let ops: Vec<Op> = calls.iter().map(|c| c.op).collect();
    assert_eq!(
        ops,
        vec![
            Op::Reauthenticate,
            Op::FindDocumentType,
            Op::DefaultKeywords,
            Op::InitiateStaging,
            Op::UploadPart,
            Op::UploadPart,
            Op::UploadPart,
            Op::UploadPart,
            Op::UploadPart,
            Op::Archive,
            Op::GetDocument,
        ]
    );
    let parts: Vec<u32> = calls.iter().filter_map(|c| c.part).collect();
    assert_eq!(parts, vec![1, 2, 3, 4, 5]);
    assert_sticky_chain(&calls);
}

#[tokio::test]
async fn test_reindex_starts_its_own_sticky_chain() {
    let store = Arc::new(base_store());
    let ingestor = ingestor(&store);

    let created = ingestor
        .create_document("ops", invoice(b"abcd"))
        .await
        .unwrap();
    created.reindex.unwrap().wait().await.unwrap();

    let reauths = store.calls_of(Op::Reauthenticate);
    assert_eq!(reauths.len(), 2);

    let calls = store.calls();
    let tail_start = calls
        .iter()
        .rposition(|c| c.op == Op::Reauthenticate)
        .unwrap();
    let tail = &calls[tail_start..];
    let ops: Vec<Op> = tail.iter().map(|c| c.op).collect();
    assert_eq!(ops, vec![Op::Reauthenticate, Op::DefaultKeywords, Op::Reindex]);
    assert_sticky_chain(tail);
}

#[tokio::test]
async fn test_part_failure_stops_upload_and_skips_archive() {
    let store = Arc::new(base_store());
    store.fail_part(1, CoreError::upstream_unavailable("upload timed out"));
    let ingestor = ingestor(&store);

    let err = ingestor
        .create_document("ops", invoice(b"abcdefgh"))
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::UpstreamUnavailable { .. }));
    assert!(err.is_retryable());
    assert_eq!(store.count(Op::UploadPart), 1);
    assert_eq!(store.count(Op::Archive), 0);
    assert_eq!(store.document_count(), 0);
}

#[tokio::test]
async fn test_middle_part_failure() {
    let store = Arc::new(base_store());
    store.fail_part(2, CoreError::upstream_rejected(409, "slot locked"));
    let ingestor = ingestor(&store);

    let err = ingestor
        .create_document(
            "ops",
            invoice(b"abcdefghijkl").with_keywords([Keyword::new("5", ["X"])]),
        )
        .await
        .unwrap_err();
    assert_eq!(err, CoreError::upstream_rejected(409, "slot locked"));

    let parts: Vec<u32> = store
        .calls_of(Op::UploadPart)
        .iter()
        .filter_map(|c| c.part)
        .collect();
    assert_eq!(parts, vec![1, 2]);
    assert_eq!(store.count(Op::Archive), 0);
}

#[tokio::test]
async fn test_validation_happens_before_any_backend_call() {
    let store = Arc::new(base_store());
    let ingestor = ingestor(&store);

    let oversized = CreateDocumentRequest::new(
        DocumentTypeRef::Id("101".to_string()),
        "pdf",
        Bytes::from(vec![1u8; 65]),
    );
    let err = ingestor.create_document("ops", oversized).await.unwrap_err();
    assert_eq!(err.status_code(), 400);

    let duplicate = invoice(b"abcd").with_keywords([Keyword::new("5", ["A"]), Keyword::new("5", ["B"])]);
    assert!(ingestor.create_document("ops", duplicate).await.is_err());

    assert!(store.calls().is_empty());
}

#[tokio::test]
async fn test_unknown_type_fails_before_staging() {
    let store = Arc::new(base_store());
    let ingestor = ingestor(&store);

    let request = CreateDocumentRequest::new(
        DocumentTypeRef::Name("Receipt".to_string()),
        "pdf",
        Bytes::from_static(b"abcd"),
    );
    let err = ingestor.create_document("ops", request).await.unwrap_err();
    assert_eq!(err.detail(), "Please provide a valid document type.");
    assert_eq!(err.status_code(), 400);
    assert_eq!(store.count(Op::InitiateStaging), 0);
    assert_eq!(store.count(Op::Archive), 0);
}

#[tokio::test]
async fn test_staging_rejection_is_passed_through() {
    let store = Arc::new(base_store().with_max_upload_size(4));
    let ingestor = ingestor(&store);

    let err = ingestor
        .create_document("ops", invoice(b"abcdefgh"))
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::UpstreamRejected { status: 413, .. }));
    assert_eq!(store.count(Op::UploadPart), 0);
}

#[tokio::test]
async fn test_archive_rejection_leaves_no_document() {
    let store = Arc::new(base_store());
    store.fail_next(Op::Archive, CoreError::upstream_rejected(400, "keyword 5 is required"));
    let ingestor = ingestor(&store);

    let err = ingestor
        .create_document("ops", invoice(b"abcd").with_keywords([Keyword::new("6", ["X"])]))
        .await
        .unwrap_err();
    assert_eq!(err.detail(), "keyword 5 is required");
    assert_eq!(store.document_count(), 0);
    assert_eq!(store.count(Op::Archive), 1);
}

#[tokio::test]
async fn test_reindex_failure_is_not_surfaced() {
    let store = Arc::new(base_store());
    store.fail_next(Op::Reindex, CoreError::upstream_unavailable("backend busy"));
    let ingestor = ingestor(&store);

    let created = ingestor
        .create_document("ops", invoice(b"abcd"))
        .await
        .unwrap();
    assert_eq!(created.status, IngestStatus::Staged);

    let outcome = created.reindex.unwrap().wait().await;
    assert!(outcome.is_err());

    let document = ingestor
        .get_document("ops", &created.document.id)
        .await
        .unwrap();
    assert_eq!(document.type_id, "900");
}

#[tokio::test]
async fn test_index_key_is_stored_and_kept_through_reindex() {
    let store = Arc::new(base_store());
    let ingestor = ingestor(&store);

    let created = ingestor
        .create_document("ops", invoice(b"abcd").with_index_key("K-1"))
        .await
        .unwrap();
    // an index key alone does not classify the document
    assert_eq!(created.status, IngestStatus::Staged);
    let provisional = store.keywords(&created.document.id).unwrap();
    assert_eq!(provisional.get("77"), Some(&["K-1".to_string()][..]));

    created.reindex.unwrap().wait().await.unwrap();
    let keywords = store.keywords(&created.document.id).unwrap();
    assert_eq!(keywords.get("77"), Some(&["K-1".to_string()][..]));
    assert_eq!(keywords.get("10"), Some(&["AP".to_string()][..]));
}

#[tokio::test]
async fn test_dropped_request_does_not_cancel_archive() {
    let store = Arc::new(base_store().with_latency(Op::Archive, Duration::from_millis(150)));
    let ingestor = Arc::new(ingestor(&store));

    let request = {
        let ingestor = Arc::clone(&ingestor);
        tokio::spawn(async move {
            ingestor
                .create_document("ops", invoice(b"abcd").with_keywords([Keyword::new("5", ["X"])]))
                .await
        })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    request.abort();

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(store.count(Op::Archive), 1);
    assert_eq!(store.document_count(), 1);
}

#[tokio::test]
async fn test_update_keywords_merges_over_current_set() {
    let store = Arc::new(base_store());
    let ingestor = ingestor(&store);
    let created = ingestor
        .create_document("ops", invoice(b"abcd").with_keywords([Keyword::new("5", ["A"])]))
        .await
        .unwrap();
    let id = created.document.id;

    let updated = ingestor
        .update_keywords(
            "ops",
            &id,
            vec![Keyword::new("6", ["B"]), Keyword::new("5", ["C"])],
        )
        .await
        .unwrap();
    assert_eq!(updated.guid(), Some("g-101"));
    assert_eq!(updated.get("5"), Some(&["C".to_string()][..]));
    assert_eq!(updated.get("6"), Some(&["B".to_string()][..]));
    assert_eq!(updated.get("10"), Some(&["AP".to_string()][..]));

    let read = ingestor.document_keywords("ops", &id).await.unwrap();
    assert_eq!(read, updated);

    assert!(ingestor.update_keywords("ops", &id, Vec::new()).await.is_err());
}

#[tokio::test]
async fn test_reads() {
    let store = Arc::new(base_store());
    let ingestor = ingestor(&store);
    let created = ingestor
        .create_document(
            "ops",
            invoice(b"hello world").with_keywords([Keyword::new("5", ["A"])]).with_comment("greeting"),
        )
        .await
        .unwrap();
    assert_eq!(created.document.name.as_deref(), Some("greeting"));

    let content = ingestor
        .document_content("ops", &created.document.id)
        .await
        .unwrap();
    assert_eq!(content.bytes, Bytes::from_static(b"hello world"));
    assert_eq!(content.content_type, "application/pdf");

    let document_type = ingestor
        .document_type("ops", &DocumentTypeRef::Id("101".to_string()))
        .await
        .unwrap();
    assert_eq!(document_type.name, "Invoice");

    let err = ingestor.get_document("ops", "42").await.unwrap_err();
    assert_eq!(err.status_code(), 404);

    let err = ingestor.get_document("finance", "42").await.unwrap_err();
    assert!(matches!(err, CoreError::ProfileNotFound { .. }));

    ingestor.health_check().await.unwrap();
}

#[tokio::test]
async fn test_list_documents_passes_filter_to_store() {
    let store = Arc::new(base_store());
    let ingestor = ingestor(&store);
    let mut ids = Vec::new();
    for key in ["K-1", "K-2", "K-3"] {
        let created = ingestor
            .create_document(
                "ops",
                invoice(b"abcd")
                    .with_keywords([Keyword::new("5", ["A"])])
                    .with_index_key(key),
            )
            .await
            .unwrap();
        ids.push(created.document.id);
    }

    let all = ingestor
        .list_documents("ops", &DocumentQuery::new().with_doc_type("Invoice"))
        .await
        .unwrap();
    assert_eq!(all.iter().map(|d| d.id.clone()).collect::<Vec<_>>(), ids);

    let keyed = ingestor
        .list_documents("ops", &DocumentQuery::new().with_index_key("K-2"))
        .await
        .unwrap();
    assert_eq!(keyed.len(), 1);
    assert_eq!(keyed[0].id, ids[1]);

    let second: u64 = ids[1].parse().unwrap();
    let page = ingestor
        .list_documents("ops", &DocumentQuery::new().with_start_doc_id(second).with_page_size(1))
        .await
        .unwrap();
    assert_eq!(page.len(), 1);
    assert_eq!(page[0].id, ids[1]);
    assert_eq!(store.count(Op::QueryDocuments), 3);

    // rejected before any backend call
    let err = ingestor
        .list_documents("ops", &DocumentQuery::new().with_page_size(0))
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Validation { .. }));
    assert_eq!(store.count(Op::QueryDocuments), 3);
}
