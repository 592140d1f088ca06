//! Request handling shared by the listener and tests.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use docbridge_core::{CoreError, DocumentQuery, DocumentStore, DocumentTypeRef, Keyword};
use docbridge_ingest::Ingestor;
use docbridge_telemetry::{record_request, render_metrics, InFlightGuard};
use http::request::Parts;
use http::{header, HeaderMap, HeaderValue, Request, Response, StatusCode};
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::Body;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::auth::{self, BasicAuth};
use crate::error::ApiError;
use crate::health::HealthChecker;
use crate::multipart;
use crate::resources::{self, JSON_API};
use crate::routes::Route;

/// Response type of every handler.
pub type HttpResponse = Response<Full<Bytes>>;

/// Body of `PATCH /documents/{id}/keywords`.
#[derive(Debug, Deserialize)]
struct KeywordPatch {
    keywords: Vec<Keyword>,
}

#[derive(Serialize)]
struct VersionInfo {
    name: &'static str,
    version: &'static str,
}

/// Everything a request handler needs.
pub struct AppState<S> {
    ingestor: Arc<Ingestor<S>>,
    auth: BasicAuth,
    health: HealthChecker,
    max_body_size: usize,
}

impl<S> std::fmt::Debug for AppState<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("auth_enabled", &self.auth.is_enabled())
            .field("max_body_size", &self.max_body_size)
            .finish_non_exhaustive()
    }
}

impl<S: DocumentStore> AppState<S> {
    /// Serve `ingestor` behind `auth`.
    pub fn new(ingestor: Arc<Ingestor<S>>, auth: BasicAuth) -> Self {
        Self {
            ingestor,
            auth,
            health: HealthChecker::new(),
            max_body_size: 101 * 1024 * 1024,
        }
    }

    /// Reject request bodies larger than `limit` bytes with 413.
    #[must_use]
    pub fn with_max_body_size(mut self, limit: usize) -> Self {
        self.max_body_size = limit;
        self
    }

    /// The document operations.
    pub fn ingestor(&self) -> &Arc<Ingestor<S>> {
        &self.ingestor
    }

    /// Liveness and readiness state.
    pub fn health(&self) -> &HealthChecker {
        &self.health
    }

    /// Report not-ready, wait for background work, then dispose the pool.
    pub async fn shutdown(&self, grace: Duration) {
        self.health.set_draining();
        self.ingestor.shutdown(grace).await;
        self.ingestor.pool().dispose().await;
    }

    /// Handle one request end to end.
    pub async fn handle<B>(&self, request: Request<B>, peer: Option<SocketAddr>) -> HttpResponse
    where
        B: Body<Data = Bytes>,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let start = Instant::now();
        let request_id = Uuid::now_v7();
        let (parts, body) = request.into_parts();
        let span = info_span!(
            "request",
            request_id = %request_id,
            method = %parts.method,
            path = %parts.uri.path(),
            peer = ?peer,
        );

        async move {
            let _in_flight = InFlightGuard::new();
            let route = Route::resolve(&parts.method, parts.uri.path());
            let template = route.as_ref().map_or("unmatched", Route::template);

            let result = match route {
                Ok(route) => match self.read_body(body).await {
                    Ok(body) => self.dispatch(route, &parts, body).await,
                    Err(e) => Err(e),
                },
                Err(e) => Err(e),
            };

            let mut response = result.unwrap_or_else(|e| {
                debug!(status = e.status().as_u16(), detail = e.detail(), "request rejected");
                e.into_response()
            });
            if let Ok(value) = HeaderValue::from_str(&request_id.to_string()) {
                response.headers_mut().insert("x-request-id", value);
            }

            let elapsed = start.elapsed();
            let status = response.status().as_u16();
            record_request(template, status, elapsed);
            info!(
                status,
                duration_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
                "request completed"
            );
            response
        }
        .instrument(span)
        .await
    }

    async fn read_body<B>(&self, body: B) -> Result<Bytes, ApiError>
    where
        B: Body<Data = Bytes>,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        match Limited::new(body, self.max_body_size).collect().await {
            Ok(collected) => Ok(collected.to_bytes()),
            Err(e) if e.downcast_ref::<LengthLimitError>().is_some() => {
                Err(ApiError::payload_too_large(self.max_body_size))
            }
            Err(e) => Err(ApiError::bad_request(format!("failed to read request body: {e}"))),
        }
    }

    async fn dispatch(&self, route: Route, parts: &Parts, body: Bytes) -> Result<HttpResponse, ApiError> {
        let headers = &parts.headers;
        let ingestor = &self.ingestor;

        match route {
            Route::ListDocuments => {
                let profile = self.authorize(headers)?;
                let query: DocumentQuery = serde_urlencoded::from_str(parts.uri.query().unwrap_or(""))
                    .map_err(|e| ApiError::bad_request(format!("invalid query string: {e}")))?;
                let documents = ingestor
                    .list_documents(profile, &query)
                    .await
                    .map_err(core_failure)?;
                Ok(json_api(StatusCode::OK, &resources::documents(documents)))
            }
            Route::CreateDocument => {
                let profile = self.authorize(headers)?;
                let request = multipart::parse_create(headers, body).await?;
                let created = ingestor
                    .create_document(profile, request)
                    .await
                    .map_err(core_failure)?;

                let location = format!("/documents/{}", created.document.id);
                let resource = resources::created_document(
                    created.document,
                    created.status,
                    created.reindex.is_some(),
                );
                let mut response = json_api(StatusCode::CREATED, &resource);
                if let Ok(value) = HeaderValue::from_str(&location) {
                    response.headers_mut().insert(header::LOCATION, value);
                }
                Ok(response)
            }
            Route::Document(id) => {
                let profile = self.authorize(headers)?;
                let document = ingestor.get_document(profile, &id).await.map_err(core_failure)?;
                Ok(json_api(StatusCode::OK, &resources::document(document)))
            }
            Route::DocumentContent(id) => {
                let profile = self.authorize(headers)?;
                let content = ingestor
                    .document_content(profile, &id)
                    .await
                    .map_err(core_failure)?;
                let content_type = HeaderValue::from_str(&content.content_type)
                    .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream"));

                let mut response = Response::new(Full::new(content.bytes));
                response
                    .headers_mut()
                    .insert(header::CONTENT_TYPE, content_type);
                Ok(response)
            }
            Route::DocumentKeywords(id) => {
                let profile = self.authorize(headers)?;
                let keywords = ingestor
                    .document_keywords(profile, &id)
                    .await
                    .map_err(core_failure)?;
                Ok(json_api(StatusCode::OK, &resources::keywords(&id, &keywords)))
            }
            Route::UpdateKeywords(id) => {
                let profile = self.authorize(headers)?;
                let patch: KeywordPatch = serde_json::from_slice(&body)
                    .map_err(|e| ApiError::bad_request(format!("invalid keywords body: {e}")))?;
                let stored = ingestor
                    .update_keywords(profile, &id, patch.keywords)
                    .await
                    .map_err(core_failure)?;
                Ok(json_api(StatusCode::OK, &resources::keywords(&id, &stored)))
            }
            Route::DocumentType(id) => {
                let profile = self.authorize(headers)?;
                let document_type = ingestor
                    .document_type(profile, &DocumentTypeRef::Id(id))
                    .await
                    .map_err(core_failure)?;
                Ok(json_api(StatusCode::OK, &resources::document_type(document_type)))
            }
            Route::Health => {
                let report = self.health.liveness();
                let status = if self.health.is_draining() {
                    StatusCode::SERVICE_UNAVAILABLE
                } else {
                    StatusCode::OK
                };
                Ok(json(status, &report))
            }
            Route::Ready => {
                let report = self.health.readiness(ingestor).await;
                let status = if report.status.is_ready() {
                    StatusCode::OK
                } else {
                    StatusCode::SERVICE_UNAVAILABLE
                };
                Ok(json(status, &report))
            }
            Route::Metrics => {
                let text = render_metrics().ok_or_else(|| ApiError::not_found("metrics are disabled"))?;
                let mut response = Response::new(Full::new(Bytes::from(text)));
                response.headers_mut().insert(
                    header::CONTENT_TYPE,
                    HeaderValue::from_static("text/plain; version=0.0.4"),
                );
                Ok(response)
            }
            Route::Version => Ok(json(
                StatusCode::OK,
                &VersionInfo {
                    name: "docbridge",
                    version: crate::VERSION,
                },
            )),
        }
    }

    /// Inbound credentials, then the profile header.
    fn authorize<'h>(&self, headers: &'h HeaderMap) -> Result<&'h str, ApiError> {
        self.auth.check(headers)?;
        let pool = self.ingestor.pool();
        auth::profile_header(headers, |name| pool.contains(name))
    }
}

fn core_failure(err: CoreError) -> ApiError {
    if err.status_code() >= 500 {
        warn!(category = err.category(), error = %err, "request failed");
    } else {
        debug!(category = err.category(), error = %err, "request refused");
    }
    ApiError::from(err)
}

fn json<T: Serialize>(status: StatusCode, body: &T) -> HttpResponse {
    with_body(status, "application/json", body)
}

fn json_api<T: Serialize>(status: StatusCode, body: &T) -> HttpResponse {
    with_body(status, JSON_API, body)
}

fn with_body<T: Serialize>(status: StatusCode, content_type: &'static str, body: &T) -> HttpResponse {
    match serde_json::to_vec(body) {
        Ok(bytes) => {
            let mut response = Response::new(Full::new(Bytes::from(bytes)));
            *response.status_mut() = status;
            response
                .headers_mut()
                .insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
            response
        }
        Err(e) => {
            warn!(error = %e, "response serialization failed");
            ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "response serialization failed")
                .into_response()
        }
    }
}
