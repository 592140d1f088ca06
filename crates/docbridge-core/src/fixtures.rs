//! In-memory document store for tests.
//!
//! [`FakeStore`] implements [`DocumentStore`] against process memory. It
//! records every call with the sticky token it was given and the one it
//! returned, hands out a fresh sticky token per call, and can be scripted to
//! fail specific operations, parts, or logins.
//!
//! Document queries match `docType` and `docTypeGroup` by name, `indexKey`
//! against any keyword value, and read `keywordsHasAll` as comma-separated
//! `typeId=value` pairs that must all be present.
//!
//! # Example
//!
//! ```
//! use docbridge_core::fixtures::{FakeStore, Op};
//!
//! let store = FakeStore::new()
//!     .with_user("svc-ops", "pw")
//!     .with_document_type("101", "Invoice")
//!     .with_part_size(4);
//!
//! assert_eq!(store.count(Op::Archive), 0);
//! ```

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use chrono::Utc;
use parking_lot::Mutex;

use crate::document::{
    ArchiveRequest, Document, DocumentContent, DocumentQuery, DocumentType, DocumentTypeRef,
    KeywordCollection, ReindexRequest, UploadSlot,
};
use crate::error::{CoreError, CoreResult};
use crate::session::{AccessToken, Credential, SessionHandle, StickyToken};
use crate::store::DocumentStore;

/// Operations a [`FakeStore`] records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    /// Credential login.
    Authenticate,
    /// Connection from a session handle.
    Reauthenticate,
    /// Session handle release.
    Disconnect,
    /// Document type lookup.
    FindDocumentType,
    /// Default keyword lookup.
    DefaultKeywords,
    /// Upload slot allocation.
    InitiateStaging,
    /// Part upload.
    UploadPart,
    /// Archive.
    Archive,
    /// Metadata read.
    GetDocument,
    /// Document listing.
    QueryDocuments,
    /// Keyword read.
    DocumentKeywords,
    /// Keyword write.
    UpdateKeywords,
    /// Reclassification.
    Reindex,
    /// Content read.
    DocumentContent,
    /// Health probe.
    HealthCheck,
}

/// One recorded backend call.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    /// Operation.
    pub op: Op,
    /// Username, handle, slot id, or document id the call targeted.
    pub subject: Option<String>,
    /// Part number for uploads.
    pub part: Option<u32>,
    /// Sticky token the caller presented.
    pub sticky_in: Option<StickyToken>,
    /// Sticky token returned, if the call succeeded.
    pub sticky_out: Option<StickyToken>,
}

impl RecordedCall {
    /// Whether the call succeeded.
    pub fn succeeded(&self) -> bool {
        self.sticky_out.is_some()
    }
}

#[derive(Debug)]
struct ScriptedFailure {
    op: Op,
    part: Option<u32>,
    error: CoreError,
    once: bool,
}

#[derive(Debug)]
struct StagedUpload {
    total_parts: u32,
    parts: BTreeMap<u32, Bytes>,
    extension: String,
}

#[derive(Debug, Clone)]
struct StoredDocument {
    document: Document,
    keywords: KeywordCollection,
    content: Bytes,
    content_type: String,
}

#[derive(Debug, Default)]
struct FakeState {
    users: HashMap<String, String>,
    blocked_logins: HashSet<String>,
    sessions: HashMap<SessionHandle, bool>,
    disconnected: Vec<SessionHandle>,
    tokens: HashSet<String>,
    failures: Vec<ScriptedFailure>,
    types: Vec<DocumentType>,
    type_groups: HashMap<String, Vec<String>>,
    defaults: HashMap<String, KeywordCollection>,
    uploads: HashMap<String, StagedUpload>,
    documents: HashMap<String, StoredDocument>,
    calls: Vec<RecordedCall>,
    max_upload_size: Option<u64>,
    unhealthy: bool,
}

/// In-memory [`DocumentStore`].
#[derive(Debug)]
pub struct FakeStore {
    state: Mutex<FakeState>,
    latency: Mutex<HashMap<Op, Duration>>,
    part_size: u64,
    counter: AtomicU64,
}

impl Default for FakeStore {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeStore {
    /// Create an empty store with a 4-byte part size.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(FakeState::default()),
            latency: Mutex::new(HashMap::new()),
            part_size: 4,
            counter: AtomicU64::new(0),
        }
    }

    /// Register an account.
    #[must_use]
    pub fn with_user(self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.state
            .lock()
            .users
            .insert(username.into(), password.into());
        self
    }

    /// Register a document type.
    #[must_use]
    pub fn with_document_type(self, id: impl Into<String>, name: impl Into<String>) -> Self {
        self.state.lock().types.push(DocumentType::new(id, name));
        self
    }

    /// Put document types into a named group.
    #[must_use]
    pub fn with_type_group<I, T>(self, group: impl Into<String>, type_ids: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.state
            .lock()
            .type_groups
            .insert(group.into(), type_ids.into_iter().map(Into::into).collect());
        self
    }

    /// Set the default keyword set for a document type.
    #[must_use]
    pub fn with_default_keywords(self, type_id: impl Into<String>, keywords: KeywordCollection) -> Self {
        self.state.lock().defaults.insert(type_id.into(), keywords);
        self
    }

    /// Set the staging part size.
    #[must_use]
    pub fn with_part_size(mut self, part_size: u64) -> Self {
        self.part_size = part_size.max(1);
        self
    }

    /// Reject staging of payloads larger than `limit` with a 413.
    #[must_use]
    pub fn with_max_upload_size(self, limit: u64) -> Self {
        self.state.lock().max_upload_size = Some(limit);
        self
    }

    /// Delay every call to `op`.
    #[must_use]
    pub fn with_latency(self, op: Op, delay: Duration) -> Self {
        self.latency.lock().insert(op, delay);
        self
    }

    /// Fail the next call to `op`.
    pub fn fail_next(&self, op: Op, error: CoreError) {
        self.script(op, None, error, true);
    }

    /// Fail every call to `op` until cleared.
    pub fn fail_always(&self, op: Op, error: CoreError) {
        self.script(op, None, error, false);
    }

    /// Fail the next upload of part `part`.
    pub fn fail_part(&self, part: u32, error: CoreError) {
        self.script(Op::UploadPart, Some(part), error, true);
    }

    /// Drop all scripted failures.
    pub fn clear_failures(&self) {
        self.state.lock().failures.clear();
    }

    /// Make credential logins for `username` fail.
    pub fn block_login(&self, username: &str) {
        self.state.lock().blocked_logins.insert(username.to_string());
    }

    /// Let credential logins for `username` succeed again.
    pub fn unblock_login(&self, username: &str) {
        self.state.lock().blocked_logins.remove(username);
    }

    /// Make the backend forget a session handle.
    pub fn expire_session(&self, handle: &SessionHandle) {
        if let Some(valid) = self.state.lock().sessions.get_mut(handle) {
            *valid = false;
        }
    }

    /// Make the backend forget every session handle.
    pub fn expire_all_sessions(&self) {
        for valid in self.state.lock().sessions.values_mut() {
            *valid = false;
        }
    }

    /// Toggle the health probe.
    pub fn set_healthy(&self, healthy: bool) {
        self.state.lock().unhealthy = !healthy;
    }

    /// All recorded calls, in order.
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.state.lock().calls.clone()
    }

    /// Recorded calls to one operation.
    pub fn calls_of(&self, op: Op) -> Vec<RecordedCall> {
        self.state
            .lock()
            .calls
            .iter()
            .filter(|c| c.op == op)
            .cloned()
            .collect()
    }

    /// Number of recorded calls to one operation.
    pub fn count(&self, op: Op) -> usize {
        self.state.lock().calls.iter().filter(|c| c.op == op).count()
    }

    /// Handles released through `disconnect`, in order.
    pub fn disconnected(&self) -> Vec<SessionHandle> {
        self.state.lock().disconnected.clone()
    }

    /// Whether the backend still honours a handle.
    pub fn is_live(&self, handle: &SessionHandle) -> bool {
        self.state.lock().sessions.get(handle).copied().unwrap_or(false)
    }

    /// Stored document metadata.
    pub fn document(&self, id: &str) -> Option<Document> {
        self.state.lock().documents.get(id).map(|d| d.document.clone())
    }

    /// Stored document keywords.
    pub fn keywords(&self, id: &str) -> Option<KeywordCollection> {
        self.state.lock().documents.get(id).map(|d| d.keywords.clone())
    }

    /// Stored document bytes.
    pub fn content(&self, id: &str) -> Option<Bytes> {
        self.state.lock().documents.get(id).map(|d| d.content.clone())
    }

    /// Number of archived documents.
    pub fn document_count(&self) -> usize {
        self.state.lock().documents.len()
    }

    fn script(&self, op: Op, part: Option<u32>, error: CoreError, once: bool) {
        self.state.lock().failures.push(ScriptedFailure {
            op,
            part,
            error,
            once,
        });
    }

    fn next(&self) -> u64 {
        self.counter.fetch_add(1, Ordering::SeqCst) + 1
    }

    async fn delay(&self, op: Op) {
        let delay = self.latency.lock().get(&op).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }

    /// Run one call: apply scripted failures, then `f`, then record.
    fn run<T>(
        &self,
        op: Op,
        subject: Option<&str>,
        part: Option<u32>,
        sticky_in: Option<&StickyToken>,
        f: impl FnOnce(&mut FakeState, u64) -> CoreResult<T>,
    ) -> CoreResult<(T, StickyToken)> {
        let n = self.next();
        let mut state = self.state.lock();

        let scripted = state
            .failures
            .iter()
            .position(|s| s.op == op && (s.part.is_none() || s.part == part));
        let outcome = match scripted {
            Some(index) if state.failures[index].once => Err(state.failures.remove(index).error),
            Some(index) => Err(state.failures[index].error.clone()),
            None => f(&mut state, n),
        };

        let sticky_out = outcome.as_ref().ok().map(|_| StickyToken::new(format!("lb-{n}")));
        state.calls.push(RecordedCall {
            op,
            subject: subject.map(str::to_string),
            part,
            sticky_in: sticky_in.cloned(),
            sticky_out: sticky_out.clone(),
        });
        drop(state);

        outcome.map(|value| (value, sticky_out.unwrap_or_default()))
    }
}

fn check_token(state: &FakeState, token: &AccessToken) -> CoreResult<()> {
    if state.tokens.contains(token.expose()) {
        Ok(())
    } else {
        Err(CoreError::upstream_rejected(401, "invalid access token"))
    }
}

fn required_keywords(expression: Option<&str>) -> CoreResult<Vec<(String, String)>> {
    let Some(expression) = expression else {
        return Ok(Vec::new());
    };
    expression
        .split(',')
        .filter(|pair| !pair.trim().is_empty())
        .map(|pair| {
            pair.split_once('=')
                .map(|(type_id, value)| (type_id.trim().to_string(), value.trim().to_string()))
                .ok_or_else(|| CoreError::upstream_rejected(400, format!("bad keyword filter '{pair}'")))
        })
        .collect()
}

fn matches_query(
    state: &FakeState,
    stored: &StoredDocument,
    query: &DocumentQuery,
    required: &[(String, String)],
) -> bool {
    let type_name = state
        .types
        .iter()
        .find(|t| t.id == stored.document.type_id)
        .map(|t| t.name.as_str());
    let has_value = |type_id: &str, value: &str| {
        stored
            .keywords
            .get(type_id)
            .is_some_and(|values| values.iter().any(|v| v == value))
    };

    if let Some(doc_type) = &query.doc_type {
        if !type_name.is_some_and(|name| name.eq_ignore_ascii_case(doc_type)) {
            return false;
        }
    }
    if let Some(group) = &query.doc_type_group {
        let in_group = state
            .type_groups
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(group))
            .is_some_and(|(_, ids)| ids.contains(&stored.document.type_id));
        if !in_group {
            return false;
        }
    }
    if let Some(index_key) = &query.index_key {
        let found = stored.keywords.iter().any(|k| k.values.contains(index_key));
        if !found {
            return false;
        }
    }
    required.iter().all(|(type_id, value)| has_value(type_id, value))
}

fn not_found(what: &str, id: &str) -> CoreError {
    CoreError::upstream_rejected(404, format!("{what} '{id}' not found"))
}

impl DocumentStore for FakeStore {
    async fn authenticate(&self, credential: &Credential) -> CoreResult<SessionHandle> {
        self.delay(Op::Authenticate).await;
        self.run(
            Op::Authenticate,
            Some(&credential.username),
            None,
            None,
            |state, n| {
                let known = state.users.get(&credential.username) == Some(&credential.password);
                if !known || state.blocked_logins.contains(&credential.username) {
                    return Err(CoreError::upstream_rejected(400, "invalid_grant"));
                }
                let handle = SessionHandle::new(format!("h-{}-{n}", credential.username));
                state.sessions.insert(handle.clone(), true);
                Ok(handle)
            },
        )
        .map(|(handle, _)| handle)
    }

    async fn reauthenticate(&self, handle: &SessionHandle) -> CoreResult<(AccessToken, StickyToken)> {
        self.delay(Op::Reauthenticate).await;
        self.run(
            Op::Reauthenticate,
            Some(handle.expose()),
            None,
            None,
            |state, n| {
                if !state.sessions.get(handle).copied().unwrap_or(false) {
                    return Err(CoreError::session_expired("session not found"));
                }
                let token = format!("tok-{n}");
                state.tokens.insert(token.clone());
                Ok(AccessToken::new(token))
            },
        )
    }

    async fn disconnect(&self, handle: &SessionHandle) -> CoreResult<()> {
        self.delay(Op::Disconnect).await;
        self.run(Op::Disconnect, Some(handle.expose()), None, None, |state, _| {
            state.sessions.insert(handle.clone(), false);
            state.disconnected.push(handle.clone());
            Ok(())
        })
        .map(|_| ())
    }

    async fn find_document_type(
        &self,
        token: &AccessToken,
        sticky: &StickyToken,
        type_ref: &DocumentTypeRef,
    ) -> CoreResult<(DocumentType, StickyToken)> {
        self.delay(Op::FindDocumentType).await;
        let subject = type_ref.to_string();
        self.run(
            Op::FindDocumentType,
            Some(&subject),
            None,
            Some(sticky),
            |state, _| {
                check_token(state, token)?;
                let matches: Vec<&DocumentType> = state
                    .types
                    .iter()
                    .filter(|t| match type_ref {
                        DocumentTypeRef::Id(id) => &t.id == id,
                        DocumentTypeRef::Name(name) => t.name.eq_ignore_ascii_case(name),
                    })
                    .collect();
                match matches.as_slice() {
                    [] => Err(CoreError::validation_with_field(
                        "Please provide a valid document type.",
                        "documentType",
                    )),
                    [only] => Ok((*only).clone()),
                    _ => Err(CoreError::validation_with_field(
                        "More than one document types matched.",
                        "documentType",
                    )),
                }
            },
        )
    }

    async fn default_keywords(
        &self,
        token: &AccessToken,
        sticky: &StickyToken,
        type_id: &str,
    ) -> CoreResult<(KeywordCollection, StickyToken)> {
        self.delay(Op::DefaultKeywords).await;
        self.run(
            Op::DefaultKeywords,
            Some(type_id),
            None,
            Some(sticky),
            |state, _| {
                check_token(state, token)?;
                if !state.types.iter().any(|t| t.id == type_id) {
                    return Err(not_found("document type", type_id));
                }
                Ok(state
                    .defaults
                    .get(type_id)
                    .cloned()
                    .unwrap_or_else(|| KeywordCollection::new().with_guid(format!("kw-{type_id}"))))
            },
        )
    }

    async fn initiate_staging(
        &self,
        token: &AccessToken,
        sticky: &StickyToken,
        extension: &str,
        size: u64,
    ) -> CoreResult<(UploadSlot, StickyToken)> {
        self.delay(Op::InitiateStaging).await;
        let part_size = self.part_size;
        self.run(
            Op::InitiateStaging,
            Some(extension),
            None,
            Some(sticky),
            |state, n| {
                check_token(state, token)?;
                if state.max_upload_size.is_some_and(|limit| size > limit) {
                    return Err(CoreError::upstream_rejected(413, "file is too large"));
                }
                let total_parts = u32::try_from(size.div_ceil(part_size).max(1))
                    .map_err(|_| CoreError::upstream_rejected(413, "too many parts"))?;
                let id = format!("slot-{n}");
                state.uploads.insert(
                    id.clone(),
                    StagedUpload {
                        total_parts,
                        parts: BTreeMap::new(),
                        extension: extension.to_string(),
                    },
                );
                Ok(UploadSlot {
                    id,
                    total_parts,
                    part_size,
                })
            },
        )
    }

    async fn upload_part(
        &self,
        token: &AccessToken,
        sticky: &StickyToken,
        slot_id: &str,
        part: u32,
        bytes: Bytes,
    ) -> CoreResult<StickyToken> {
        self.delay(Op::UploadPart).await;
        self.run(
            Op::UploadPart,
            Some(slot_id),
            Some(part),
            Some(sticky),
            |state, _| {
                check_token(state, token)?;
                let upload = state
                    .uploads
                    .get_mut(slot_id)
                    .ok_or_else(|| not_found("upload", slot_id))?;
                if part == 0 || part > upload.total_parts {
                    return Err(CoreError::upstream_rejected(400, "part number out of range"));
                }
                let expected = u32::try_from(upload.parts.len()).unwrap_or(u32::MAX) + 1;
                if part != expected {
                    return Err(CoreError::upstream_rejected(409, "part uploaded out of order"));
                }
                upload.parts.insert(part, bytes);
                Ok(())
            },
        )
        .map(|((), sticky)| sticky)
    }

    async fn archive(
        &self,
        token: &AccessToken,
        sticky: &StickyToken,
        request: &ArchiveRequest,
    ) -> CoreResult<(String, StickyToken)> {
        self.delay(Op::Archive).await;
        self.run(
            Op::Archive,
            Some(&request.slot_id),
            None,
            Some(sticky),
            |state, n| {
                check_token(state, token)?;
                if !state.types.iter().any(|t| t.id == request.type_id) {
                    return Err(CoreError::upstream_rejected(400, "invalid document type"));
                }
                let upload = state
                    .uploads
                    .get(&request.slot_id)
                    .ok_or_else(|| not_found("upload", &request.slot_id))?;
                if upload.parts.len() != upload.total_parts as usize {
                    return Err(CoreError::upstream_rejected(400, "upload is incomplete"));
                }
                let mut content = BytesMut::new();
                for bytes in upload.parts.values() {
                    content.extend_from_slice(bytes);
                }
                let content_type = match upload.extension.as_str() {
                    "pdf" => "application/pdf",
                    "txt" => "text/plain",
                    _ => "application/octet-stream",
                }
                .to_string();
                state.uploads.remove(&request.slot_id);

                let id = (1000 + n).to_string();
                state.documents.insert(
                    id.clone(),
                    StoredDocument {
                        document: Document {
                            id: id.clone(),
                            name: request.comment.clone(),
                            type_id: request.type_id.clone(),
                            created_by: None,
                            stored_at: Some(Utc::now()),
                        },
                        keywords: request.keywords.clone(),
                        content: content.freeze(),
                        content_type,
                    },
                );
                Ok(id)
            },
        )
    }

    async fn get_document(
        &self,
        token: &AccessToken,
        sticky: &StickyToken,
        id: &str,
    ) -> CoreResult<(Document, StickyToken)> {
        self.delay(Op::GetDocument).await;
        self.run(Op::GetDocument, Some(id), None, Some(sticky), |state, _| {
            check_token(state, token)?;
            state
                .documents
                .get(id)
                .map(|d| d.document.clone())
                .ok_or_else(|| not_found("document", id))
        })
    }

    async fn query_documents(
        &self,
        token: &AccessToken,
        sticky: &StickyToken,
        query: &DocumentQuery,
    ) -> CoreResult<(Vec<Document>, StickyToken)> {
        self.delay(Op::QueryDocuments).await;
        self.run(Op::QueryDocuments, None, None, Some(sticky), |state, _| {
            let state: &FakeState = state;
            check_token(state, token)?;
            let required = required_keywords(query.keywords_has_all.as_deref())?;
            let mut found: Vec<(u64, Document)> = state
                .documents
                .values()
                .filter(|stored| matches_query(state, stored, query, &required))
                .filter_map(|stored| {
                    let id = stored.document.id.parse::<u64>().ok()?;
                    Some((id, stored.document.clone()))
                })
                .filter(|(id, _)| query.start_doc_id.map_or(true, |start| *id >= start))
                .collect();
            found.sort_by_key(|(id, _)| *id);
            let limit = query.page_size.map_or(usize::MAX, |size| size as usize);
            Ok(found.into_iter().take(limit).map(|(_, document)| document).collect())
        })
    }

    async fn document_keywords(
        &self,
        token: &AccessToken,
        sticky: &StickyToken,
        id: &str,
    ) -> CoreResult<(KeywordCollection, StickyToken)> {
        self.delay(Op::DocumentKeywords).await;
        self.run(Op::DocumentKeywords, Some(id), None, Some(sticky), |state, _| {
            check_token(state, token)?;
            state
                .documents
                .get(id)
                .map(|d| d.keywords.clone())
                .ok_or_else(|| not_found("document", id))
        })
    }

    async fn update_keywords(
        &self,
        token: &AccessToken,
        sticky: &StickyToken,
        id: &str,
        keywords: &KeywordCollection,
    ) -> CoreResult<StickyToken> {
        self.delay(Op::UpdateKeywords).await;
        self.run(Op::UpdateKeywords, Some(id), None, Some(sticky), |state, _| {
            check_token(state, token)?;
            let stored = state
                .documents
                .get_mut(id)
                .ok_or_else(|| not_found("document", id))?;
            stored.keywords = keywords.clone();
            Ok(())
        })
        .map(|((), sticky)| sticky)
    }

    async fn reindex(
        &self,
        token: &AccessToken,
        sticky: &StickyToken,
        request: &ReindexRequest,
    ) -> CoreResult<StickyToken> {
        self.delay(Op::Reindex).await;
        self.run(
            Op::Reindex,
            Some(&request.document_id),
            None,
            Some(sticky),
            |state, _| {
                check_token(state, token)?;
                if !state.types.iter().any(|t| t.id == request.type_id) {
                    return Err(CoreError::upstream_rejected(400, "invalid document type"));
                }
                let stored = state
                    .documents
                    .get_mut(&request.document_id)
                    .ok_or_else(|| not_found("document", &request.document_id))?;
                stored.document.type_id = request.type_id.clone();
                stored.keywords = request.keywords.clone();
                Ok(())
            },
        )
        .map(|((), sticky)| sticky)
    }

    async fn document_content(
        &self,
        token: &AccessToken,
        sticky: &StickyToken,
        id: &str,
    ) -> CoreResult<(DocumentContent, StickyToken)> {
        self.delay(Op::DocumentContent).await;
        self.run(Op::DocumentContent, Some(id), None, Some(sticky), |state, _| {
            check_token(state, token)?;
            state
                .documents
                .get(id)
                .map(|d| DocumentContent {
                    bytes: d.content.clone(),
                    content_type: d.content_type.clone(),
                })
                .ok_or_else(|| not_found("document", id))
        })
    }

    async fn health_check(&self) -> CoreResult<()> {
        self.delay(Op::HealthCheck).await;
        self.run(Op::HealthCheck, None, None, None, |state, _| {
            if state.unhealthy {
                Err(CoreError::upstream_unavailable_with_status(503, "backend unhealthy"))
            } else {
                Ok(())
            }
        })
        .map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn connect(store: &FakeStore) -> (AccessToken, StickyToken) {
        let handle = store
            .authenticate(&Credential::new("svc", "pw"))
            .await
            .unwrap();
        store.reauthenticate(&handle).await.unwrap()
    }

    fn store() -> FakeStore {
        FakeStore::new()
            .with_user("svc", "pw")
            .with_document_type("101", "Invoice")
            .with_part_size(4)
    }

    #[tokio::test]
    async fn test_login_rejects_wrong_password() {
        let store = store();
        let err = store
            .authenticate(&Credential::new("svc", "nope"))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::UpstreamRejected { status: 400, .. }));
    }

    #[tokio::test]
    async fn test_expired_handle_is_typed() {
        let store = store();
        let handle = store
            .authenticate(&Credential::new("svc", "pw"))
            .await
            .unwrap();
        store.expire_session(&handle);
        let err = store.reauthenticate(&handle).await.unwrap_err();
        assert!(matches!(err, CoreError::SessionExpired { .. }));
    }

    #[tokio::test]
    async fn test_staging_round_trip() {
        let store = store();
        let (token, sticky) = connect(&store).await;
        let (slot, sticky) = store
            .initiate_staging(&token, &sticky, "txt", 6)
            .await
            .unwrap();
        assert_eq!(slot.total_parts, 2);

        let sticky = store
            .upload_part(&token, &sticky, &slot.id, 1, Bytes::from_static(b"abcd"))
            .await
            .unwrap();
        let sticky = store
            .upload_part(&token, &sticky, &slot.id, 2, Bytes::from_static(b"ef"))
            .await
            .unwrap();

        let request = ArchiveRequest {
            type_id: "101".into(),
            slot_id: slot.id.clone(),
            keywords: KeywordCollection::new(),
            comment: None,
            skip_workflow: false,
        };
        let (id, _) = store.archive(&token, &sticky, &request).await.unwrap();
        assert_eq!(store.content(&id).unwrap(), Bytes::from_static(b"abcdef"));
    }

    #[tokio::test]
    async fn test_out_of_order_part_rejected() {
        let store = store();
        let (token, sticky) = connect(&store).await;
        let (slot, sticky) = store
            .initiate_staging(&token, &sticky, "txt", 8)
            .await
            .unwrap();
        let err = store
            .upload_part(&token, &sticky, &slot.id, 2, Bytes::from_static(b"efgh"))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::UpstreamRejected { status: 409, .. }));
    }

    #[tokio::test]
    async fn test_each_call_issues_fresh_sticky() {
        let store = store();
        let (token, first) = connect(&store).await;
        let (_, second) = store
            .find_document_type(&token, &first, &DocumentTypeRef::Name("invoice".into()))
            .await
            .unwrap();
        assert_ne!(first, second);

        let calls = store.calls_of(Op::FindDocumentType);
        assert_eq!(calls[0].sticky_in.as_ref(), Some(&first));
        assert_eq!(calls[0].sticky_out.as_ref(), Some(&second));
    }

    #[tokio::test]
    async fn test_scripted_failure_is_one_shot() {
        let store = store();
        store.fail_next(Op::HealthCheck, CoreError::upstream_unavailable("down"));
        assert!(store.health_check().await.is_err());
        assert!(store.health_check().await.is_ok());
        assert!(!store.calls_of(Op::HealthCheck)[0].succeeded());
    }

    async fn archive_text(
        store: &FakeStore,
        token: &AccessToken,
        type_id: &str,
        keywords: KeywordCollection,
    ) -> String {
        let (slot, sticky) = store
            .initiate_staging(token, &StickyToken::none(), "txt", 2)
            .await
            .unwrap();
        let sticky = store
            .upload_part(token, &sticky, &slot.id, 1, Bytes::from_static(b"ok"))
            .await
            .unwrap();
        let request = ArchiveRequest {
            type_id: type_id.to_string(),
            slot_id: slot.id,
            keywords,
            comment: None,
            skip_workflow: false,
        };
        store.archive(token, &sticky, &request).await.unwrap().0
    }

    #[tokio::test]
    async fn test_query_filters_and_pages() {
        use crate::document::Keyword;

        let store = store()
            .with_document_type("102", "Receipt")
            .with_type_group("Finance", ["101", "102"]);
        let (token, sticky) = connect(&store).await;

        let kw = |pairs: &[(&str, &str)]| {
            KeywordCollection::from_keywords(pairs.iter().map(|(t, v)| Keyword::new(*t, [*v])))
                .unwrap()
        };
        let first = archive_text(&store, &token, "101", kw(&[("7", "INV-1"), ("8", "EU")])).await;
        let second = archive_text(&store, &token, "101", kw(&[("7", "INV-2"), ("8", "EU")])).await;
        let third = archive_text(&store, &token, "102", kw(&[("7", "RC-1")])).await;

        let ids = |documents: Vec<Document>| documents.into_iter().map(|d| d.id).collect::<Vec<_>>();

        let (all, _) = store
            .query_documents(&token, &sticky, &DocumentQuery::new())
            .await
            .unwrap();
        assert_eq!(ids(all), vec![first.clone(), second.clone(), third.clone()]);

        let query = DocumentQuery::new().with_doc_type("invoice");
        let (invoices, _) = store.query_documents(&token, &sticky, &query).await.unwrap();
        assert_eq!(ids(invoices), vec![first.clone(), second.clone()]);

        let query = DocumentQuery::new().with_index_key("RC-1");
        let (keyed, _) = store.query_documents(&token, &sticky, &query).await.unwrap();
        assert_eq!(ids(keyed), vec![third.clone()]);

        let query = DocumentQuery {
            keywords_has_all: Some("8=EU, 7=INV-2".to_string()),
            ..DocumentQuery::default()
        };
        let (both, _) = store.query_documents(&token, &sticky, &query).await.unwrap();
        assert_eq!(ids(both), vec![second.clone()]);

        let start: u64 = second.parse().unwrap();
        let query = DocumentQuery {
            doc_type_group: Some("finance".to_string()),
            ..DocumentQuery::default()
        }
        .with_start_doc_id(start)
        .with_page_size(1);
        let (page, _) = store.query_documents(&token, &sticky, &query).await.unwrap();
        assert_eq!(ids(page), vec![second]);
    }

    #[tokio::test]
    async fn test_ambiguous_type_name() {
        let store = store().with_document_type("102", "INVOICE");
        let (token, sticky) = connect(&store).await;
        let err = store
            .find_document_type(&token, &sticky, &DocumentTypeRef::Name("Invoice".into()))
            .await
            .unwrap_err();
        assert_eq!(err.detail(), "More than one document types matched.");
    }
}
