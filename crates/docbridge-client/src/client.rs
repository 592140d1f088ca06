//! [`DocumentStore`] over the backend REST API.

use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use docbridge_core::{
    AccessToken, ArchiveRequest, CoreError, CoreResult, Credential, Document, DocumentContent,
    DocumentQuery, DocumentStore, DocumentType, DocumentTypeRef, KeywordCollection,
    ReindexRequest, SessionHandle, StickyToken, UploadSlot,
};
use http::header::{ACCEPT, CONTENT_TYPE};
use http::{Method, StatusCode};
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::config::{BackendConfig, CallClass};
use crate::sticky;
use crate::wire::{
    ArchiveBody, Created, Items, OAuthError, OAuthErrorCode, ReindexBody, StagingRequest,
    StagingResponse, TokenResponse, UploadRef, WireDocument, WireDocumentType,
    WireKeywordCollection,
};

const INVALID_TYPE: &str = "Please provide a valid document type.";
const AMBIGUOUS_TYPE: &str = "More than one document types matched.";

/// HTTP client for the document store.
///
/// Cheap to clone; clones share one connection pool.
#[derive(Debug, Clone)]
pub struct BackendClient {
    http: Client,
    config: Arc<BackendConfig>,
}

impl BackendClient {
    /// Build a client from validated settings.
    pub fn new(config: BackendConfig) -> CoreResult<Self> {
        config.validate()?;
        let http = Client::builder()
            .connect_timeout(config.timeouts.connect)
            .pool_max_idle_per_host(100)
            .build()
            .map_err(|e| CoreError::internal(format!("failed to create client: {e}")))?;

        Ok(Self {
            http,
            config: Arc::new(config),
        })
    }

    /// The settings this client was built with.
    pub fn config(&self) -> &BackendConfig {
        &self.config
    }

    fn request(
        &self,
        method: Method,
        url: String,
        class: CallClass,
        token: Option<&AccessToken>,
        sticky: &StickyToken,
    ) -> RequestBuilder {
        let mut builder = self
            .http
            .request(method, url)
            .timeout(self.config.timeouts.for_class(class))
            .header(ACCEPT, "application/json");
        if let Some(token) = token {
            builder = builder.bearer_auth(token.expose());
        }
        if let Some((name, value)) = sticky::request_header(sticky, &self.config.sticky_cookie) {
            builder = builder.header(name, value);
        }
        builder
    }

    /// Send a request, map non-2xx outcomes, and extract the next sticky token.
    async fn send(
        &self,
        op: &'static str,
        builder: RequestBuilder,
        sticky: &StickyToken,
    ) -> CoreResult<(Response, StickyToken)> {
        self.send_with(op, builder, sticky, status_error).await
    }

    async fn send_with(
        &self,
        op: &'static str,
        builder: RequestBuilder,
        sticky: &StickyToken,
        on_status: fn(StatusCode, &[u8]) -> CoreError,
    ) -> CoreResult<(Response, StickyToken)> {
        let started = Instant::now();
        let result = builder.send().await;
        metrics::histogram!("docbridge_backend_call_duration_seconds", "op" => op)
            .record(started.elapsed().as_secs_f64());

        let response = result.map_err(|e| transport_error(op, &e))?;
        let status = response.status();
        debug!(op, status = status.as_u16(), "backend call finished");

        let next = sticky::from_response(response.headers(), &self.config.sticky_cookie)
            .or_previous(sticky);
        if status.is_success() {
            return Ok((response, next));
        }

        let body = response.bytes().await.unwrap_or_default();
        Err(on_status(status, &body))
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        op: &'static str,
        builder: RequestBuilder,
        sticky: &StickyToken,
    ) -> CoreResult<(T, StickyToken)> {
        self.send_json_with(op, builder, sticky, status_error).await
    }

    async fn send_json_with<T: DeserializeOwned>(
        &self,
        op: &'static str,
        builder: RequestBuilder,
        sticky: &StickyToken,
        on_status: fn(StatusCode, &[u8]) -> CoreError,
    ) -> CoreResult<(T, StickyToken)> {
        let (response, next) = self.send_with(op, builder, sticky, on_status).await?;
        let body = response
            .bytes()
            .await
            .map_err(|e| transport_error(op, &e))?;
        let value = serde_json::from_slice(&body)
            .map_err(|e| CoreError::internal(format!("{op}: malformed backend response: {e}")))?;
        Ok((value, next))
    }

    async fn token_grant(
        &self,
        form: &[(&str, &str)],
        on_status: fn(StatusCode, &[u8]) -> CoreError,
    ) -> CoreResult<(TokenResponse, StickyToken)> {
        let builder = self
            .request(
                Method::POST,
                self.config.idp_url("connect/token"),
                CallClass::Auth,
                None,
                &StickyToken::none(),
            )
            .form(form);
        self.send_json_with("token", builder, &StickyToken::none(), on_status)
            .await
    }

    fn core<B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        class: CallClass,
        token: &AccessToken,
        sticky: &StickyToken,
        body: Option<&B>,
    ) -> RequestBuilder {
        let builder = self.request(method, self.config.core_url(path), class, Some(token), sticky);
        match body {
            Some(body) => builder.json(body),
            None => builder,
        }
    }
}

impl DocumentStore for BackendClient {
    async fn authenticate(&self, credential: &Credential) -> CoreResult<SessionHandle> {
        let form = [
            ("grant_type", "password"),
            ("tenant", self.config.tenant.as_str()),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
            ("username", credential.username.as_str()),
            ("password", credential.password.as_str()),
            ("scope", self.config.scope.as_str()),
        ];
        let (token, _) = self.token_grant(&form, status_error).await?;
        token.refresh_token.map(SessionHandle::new).ok_or_else(|| {
            CoreError::internal("token response carried no refresh token; check the login scope")
        })
    }

    async fn reauthenticate(&self, handle: &SessionHandle) -> CoreResult<(AccessToken, StickyToken)> {
        let form = [
            ("grant_type", "refresh_token"),
            ("tenant", self.config.tenant.as_str()),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
            ("refresh_token", handle.expose()),
        ];
        let (token, sticky) = self.token_grant(&form, refresh_error).await?;
        Ok((AccessToken::new(token.access_token), sticky))
    }

    async fn disconnect(&self, handle: &SessionHandle) -> CoreResult<()> {
        let form = [
            ("token", handle.expose()),
            ("token_type_hint", "refresh_token"),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
        ];
        let builder = self
            .request(
                Method::POST,
                self.config.idp_url("connect/revocation"),
                CallClass::Auth,
                None,
                &StickyToken::none(),
            )
            .form(&form);
        self.send("revoke", builder, &StickyToken::none()).await?;
        Ok(())
    }

    async fn find_document_type(
        &self,
        token: &AccessToken,
        sticky: &StickyToken,
        type_ref: &DocumentTypeRef,
    ) -> CoreResult<(DocumentType, StickyToken)> {
        match type_ref {
            DocumentTypeRef::Id(id) => {
                let path = format!("document-types/{}", segment(id)?);
                let builder = self.core::<()>(Method::GET, &path, CallClass::Metadata, token, sticky, None);
                match self.send_json::<WireDocumentType>("document_type", builder, sticky).await {
                    Ok((found, next)) => Ok((found.into(), next)),
                    Err(CoreError::UpstreamRejected { status: 404, .. }) => Err(
                        CoreError::validation_with_field(INVALID_TYPE, "documentType"),
                    ),
                    Err(e) => Err(e),
                }
            }
            DocumentTypeRef::Name(name) => {
                let builder = self
                    .core::<()>(Method::GET, "document-types", CallClass::Metadata, token, sticky, None)
                    .query(&[("systemName", name.as_str())]);
                let (found, next) = self
                    .send_json::<Items<WireDocumentType>>("document_types", builder, sticky)
                    .await?;
                let mut items = found.items;
                match items.len() {
                    0 => Err(CoreError::validation_with_field(INVALID_TYPE, "documentType")),
                    1 => Ok((items.remove(0).into(), next)),
                    _ => Err(CoreError::validation_with_field(AMBIGUOUS_TYPE, "documentType")),
                }
            }
        }
    }

    async fn default_keywords(
        &self,
        token: &AccessToken,
        sticky: &StickyToken,
        type_id: &str,
    ) -> CoreResult<(KeywordCollection, StickyToken)> {
        let path = format!("document-types/{}/default-keyword-set", segment(type_id)?);
        let builder = self.core::<()>(Method::GET, &path, CallClass::Metadata, token, sticky, None);
        let (wire, next) = self
            .send_json::<WireKeywordCollection>("default_keywords", builder, sticky)
            .await?;
        Ok((wire.into(), next))
    }

    async fn initiate_staging(
        &self,
        token: &AccessToken,
        sticky: &StickyToken,
        extension: &str,
        size: u64,
    ) -> CoreResult<(UploadSlot, StickyToken)> {
        let body = StagingRequest {
            file_extension: extension,
            file_size: size,
        };
        let builder = self.core(
            Method::POST,
            "documents/uploads",
            CallClass::Metadata,
            token,
            sticky,
            Some(&body),
        );
        let (staged, next) = self
            .send_json::<StagingResponse>("stage", builder, sticky)
            .await?;
        Ok((staged.into_slot(size), next))
    }

    async fn upload_part(
        &self,
        token: &AccessToken,
        sticky: &StickyToken,
        slot_id: &str,
        part: u32,
        bytes: Bytes,
    ) -> CoreResult<StickyToken> {
        let path = format!("documents/uploads/{}", segment(slot_id)?);
        let builder = self
            .core::<()>(Method::PUT, &path, CallClass::Upload, token, sticky, None)
            .query(&[("filePart", part)])
            .header(CONTENT_TYPE, "application/octet-stream")
            .body(bytes);
        let (_, next) = self.send("upload_part", builder, sticky).await?;
        Ok(next)
    }

    async fn archive(
        &self,
        token: &AccessToken,
        sticky: &StickyToken,
        request: &ArchiveRequest,
    ) -> CoreResult<(String, StickyToken)> {
        let body = ArchiveBody {
            document_type_id: &request.type_id,
            uploads: vec![UploadRef {
                id: &request.slot_id,
            }],
            keyword_collection: WireKeywordCollection::from(&request.keywords),
            comment: request.comment.as_deref(),
            skip_workflow: request.skip_workflow,
        };
        let builder = self.core(Method::POST, "documents", CallClass::Archive, token, sticky, Some(&body));
        let (created, next) = self.send_json::<Created>("archive", builder, sticky).await?;
        Ok((created.id, next))
    }

    async fn get_document(
        &self,
        token: &AccessToken,
        sticky: &StickyToken,
        id: &str,
    ) -> CoreResult<(Document, StickyToken)> {
        let path = format!("documents/{}", segment(id)?);
        let builder = self.core::<()>(Method::GET, &path, CallClass::Metadata, token, sticky, None);
        let (document, next) = self
            .send_json::<WireDocument>("get_document", builder, sticky)
            .await?;
        Ok((document.into(), next))
    }

    async fn query_documents(
        &self,
        token: &AccessToken,
        sticky: &StickyToken,
        query: &DocumentQuery,
    ) -> CoreResult<(Vec<Document>, StickyToken)> {
        let builder = self
            .core::<()>(Method::GET, "documents", CallClass::Metadata, token, sticky, None)
            .query(query);
        let (found, next) = self
            .send_json::<Items<WireDocument>>("query_documents", builder, sticky)
            .await?;
        Ok((found.items.into_iter().map(Document::from).collect(), next))
    }

    async fn document_keywords(
        &self,
        token: &AccessToken,
        sticky: &StickyToken,
        id: &str,
    ) -> CoreResult<(KeywordCollection, StickyToken)> {
        let path = format!("documents/{}/keywords", segment(id)?);
        let builder = self.core::<()>(Method::GET, &path, CallClass::Metadata, token, sticky, None);
        let (wire, next) = self
            .send_json::<WireKeywordCollection>("document_keywords", builder, sticky)
            .await?;
        Ok((wire.into(), next))
    }

    async fn update_keywords(
        &self,
        token: &AccessToken,
        sticky: &StickyToken,
        id: &str,
        keywords: &KeywordCollection,
    ) -> CoreResult<StickyToken> {
        let path = format!("documents/{}/keywords", segment(id)?);
        let body = WireKeywordCollection::from(keywords);
        let builder = self.core(Method::PUT, &path, CallClass::Metadata, token, sticky, Some(&body));
        let (_, next) = self.send("update_keywords", builder, sticky).await?;
        Ok(next)
    }

    async fn reindex(
        &self,
        token: &AccessToken,
        sticky: &StickyToken,
        request: &ReindexRequest,
    ) -> CoreResult<StickyToken> {
        let path = format!("documents/{}/reindex", segment(&request.document_id)?);
        let body = ReindexBody {
            document_type_id: &request.type_id,
            keyword_collection: WireKeywordCollection::from(&request.keywords),
            expand_keysets: request.expand_keysets,
        };
        let builder = self.core(Method::POST, &path, CallClass::Archive, token, sticky, Some(&body));
        let (_, next) = self.send("reindex", builder, sticky).await?;
        Ok(next)
    }

    async fn document_content(
        &self,
        token: &AccessToken,
        sticky: &StickyToken,
        id: &str,
    ) -> CoreResult<(DocumentContent, StickyToken)> {
        let path = format!("documents/{}/content", segment(id)?);
        let builder = self
            .core::<()>(Method::GET, &path, CallClass::Upload, token, sticky, None)
            .header(ACCEPT, "*/*");
        let (response, next) = self.send("document_content", builder, sticky).await?;
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("application/octet-stream")
            .to_string();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| transport_error("document_content", &e))?;
        Ok((DocumentContent { bytes, content_type }, next))
    }

    async fn health_check(&self) -> CoreResult<()> {
        let builder = self.request(
            Method::GET,
            self.config.health_url(),
            CallClass::Metadata,
            None,
            &StickyToken::none(),
        );
        self.send("health_check", builder, &StickyToken::none()).await?;
        Ok(())
    }
}

/// Reject identifiers that would escape their path segment.
fn segment(id: &str) -> CoreResult<&str> {
    if id.is_empty() || id.contains(['/', '?', '#', '%']) {
        return Err(CoreError::validation_with_field(
            format!("invalid identifier: {id:?}"),
            "id",
        ));
    }
    Ok(id)
}

fn transport_error(op: &str, error: &reqwest::Error) -> CoreError {
    if error.is_timeout() {
        CoreError::upstream_unavailable(format!("{op}: backend timed out"))
    } else {
        CoreError::upstream_unavailable(format!("{op}: backend unreachable: {error}"))
    }
}

/// Map a non-2xx status, preferring the backend's own explanation.
fn status_error(status: StatusCode, body: &[u8]) -> CoreError {
    let message = error_message(body)
        .unwrap_or_else(|| status.canonical_reason().unwrap_or("backend error").to_string());
    CoreError::from_upstream_status(status.as_u16(), message)
}

/// A refresh grant refused with `invalid_grant` means the session handle is
/// no longer honoured.
fn refresh_error(status: StatusCode, body: &[u8]) -> CoreError {
    if status == StatusCode::BAD_REQUEST {
        if let Ok(refusal) = serde_json::from_slice::<OAuthError>(body) {
            if refusal.error == OAuthErrorCode::InvalidGrant {
                return CoreError::session_expired(
                    refusal
                        .error_description
                        .unwrap_or_else(|| "refresh token rejected".to_string()),
                );
            }
        }
    }
    status_error(status, body)
}

fn error_message(body: &[u8]) -> Option<String> {
    fn text<'a>(value: &'a serde_json::Value, name: &str) -> Option<&'a str> {
        value.get(name).and_then(|v| v.as_str()).filter(|s| !s.is_empty())
    }

    let value: serde_json::Value = serde_json::from_slice(body).ok()?;
    let field = |name| text(&value, name);

    if let (Some(error), Some(description)) = (field("error"), field("error_description")) {
        return Some(format!("{error}: {description}"));
    }
    field("detail")
        .or_else(|| field("title"))
        .or_else(|| field("error_description"))
        .or_else(|| field("error"))
        .or_else(|| field("message"))
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_message_prefers_detail() {
        let body = br#"{"title": "Bad Request", "detail": "Keyword 12 is required."}"#;
        assert_eq!(error_message(body).as_deref(), Some("Keyword 12 is required."));
    }

    #[test]
    fn test_error_message_oauth() {
        let body = br#"{"error": "invalid_grant", "error_description": "token revoked"}"#;
        assert_eq!(
            error_message(body).as_deref(),
            Some("invalid_grant: token revoked")
        );
        assert_eq!(error_message(b"<html>").as_deref(), None);
    }

    #[test]
    fn test_refresh_error_is_typed() {
        let expired = refresh_error(
            StatusCode::BAD_REQUEST,
            br#"{"error": "invalid_grant", "error_description": "token revoked"}"#,
        );
        assert_eq!(expired, CoreError::session_expired("token revoked"));

        let client = refresh_error(StatusCode::BAD_REQUEST, br#"{"error": "invalid_client"}"#);
        assert!(matches!(client, CoreError::UpstreamRejected { status: 400, .. }));

        // only the error code counts, not the prose
        let prose = refresh_error(
            StatusCode::BAD_REQUEST,
            br#"{"error": "invalid_request", "error_description": "not an invalid_grant"}"#,
        );
        assert!(!matches!(prose, CoreError::SessionExpired { .. }));

        let outage = refresh_error(StatusCode::SERVICE_UNAVAILABLE, br#"{"error": "invalid_grant"}"#);
        assert_eq!(outage.status_code(), 503);
    }

    #[test]
    fn test_status_error_mapping() {
        let rejected = status_error(StatusCode::CONFLICT, br#"{"title": "locked"}"#);
        assert_eq!(
            rejected,
            CoreError::upstream_rejected(409, "locked")
        );

        let unavailable = status_error(StatusCode::BAD_GATEWAY, b"");
        assert!(unavailable.is_retryable());
        assert_eq!(unavailable.status_code(), 503);
    }

    #[test]
    fn test_segment() {
        assert_eq!(segment("1001").unwrap(), "1001");
        assert!(segment("").is_err());
        assert!(segment("../admin").is_err());
        assert!(segment("1?x=1").is_err());
    }

    #[test]
    fn test_new_validates() {
        assert!(BackendClient::new(BackendConfig::default()).is_err());

        let config = BackendConfig {
            client_id: "bridge".to_string(),
            ..BackendConfig::default()
        };
        let client = BackendClient::new(config).unwrap();
        assert_eq!(client.config().sticky_cookie, "FB_LB");
    }
}
