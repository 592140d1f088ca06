//! Server errors and the JSON:API error document.

use bytes::Bytes;
use docbridge_core::CoreError;
use http::{header, HeaderValue, Response, StatusCode};
use http_body_util::Full;
use serde::Serialize;
use thiserror::Error;

use crate::resources::JSON_API;

/// Errors that stop the process from starting or serving.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Configuration error.
    #[error("Configuration error: {message}")]
    Config {
        /// Error message.
        message: String,
    },

    /// Listener or connection setup error.
    #[error("Server error: {message}")]
    Server {
        /// Error message.
        message: String,
    },

    /// A component rejected its settings.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ServerError {
    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a server error.
    pub fn server(message: impl Into<String>) -> Self {
        Self::Server {
            message: message.into(),
        }
    }
}

/// Result type for server set-up.
pub type ServerResult<T> = Result<T, ServerError>;

/// A failed request, rendered as a JSON:API error document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    status: StatusCode,
    detail: String,
    challenge: bool,
}

impl ApiError {
    /// An error with the given status and client-facing detail.
    pub fn new(status: StatusCode, detail: impl Into<String>) -> Self {
        Self {
            status,
            detail: detail.into(),
            challenge: false,
        }
    }

    /// 400.
    pub fn bad_request(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, detail)
    }

    /// 401 for a missing or unknown profile header.
    pub fn unauthorized(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, detail)
    }

    /// 401 asking the client for basic credentials.
    pub fn basic_challenge() -> Self {
        Self {
            challenge: true,
            ..Self::unauthorized("valid basic credentials are required")
        }
    }

    /// 404.
    pub fn not_found(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, detail)
    }

    /// 405.
    pub fn method_not_allowed() -> Self {
        Self::new(
            StatusCode::METHOD_NOT_ALLOWED,
            "method not allowed on this resource",
        )
    }

    /// 413.
    pub fn payload_too_large(limit: usize) -> Self {
        Self::new(
            StatusCode::PAYLOAD_TOO_LARGE,
            format!("request body exceeds {limit} bytes"),
        )
    }

    /// The response status.
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// The client-facing detail.
    pub fn detail(&self) -> &str {
        &self.detail
    }

    /// Render the error document.
    pub fn into_response(self) -> Response<Full<Bytes>> {
        let document = ErrorDocument {
            errors: [ErrorObject {
                status: self.status.as_u16().to_string(),
                code: format!("1{}", self.status.as_u16()),
                title: self.status.canonical_reason().unwrap_or("Error"),
                detail: &self.detail,
            }],
        };
        let body = serde_json::to_vec(&document).unwrap_or_else(|_| b"{}".to_vec());

        let mut response = Response::new(Full::new(Bytes::from(body)));
        *response.status_mut() = self.status;
        response.headers_mut().insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static(JSON_API),
        );
        if self.challenge {
            response.headers_mut().insert(
                header::WWW_AUTHENTICATE,
                HeaderValue::from_static("Basic realm=\"docbridge\""),
            );
        }
        response
    }
}

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        let status =
            StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        Self::new(status, err.detail())
    }
}

#[derive(Serialize)]
struct ErrorDocument<'a> {
    errors: [ErrorObject<'a>; 1],
}

#[derive(Serialize)]
struct ErrorObject<'a> {
    status: String,
    code: String,
    title: &'a str,
    detail: &'a str,
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    async fn body_json(response: Response<Full<Bytes>>) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_error_document_shape() {
        let response = ApiError::bad_request("Please provide a valid document type.").into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "application/vnd.api+json"
        );
        assert_eq!(
            body_json(response).await,
            serde_json::json!({
                "errors": [{
                    "status": "400",
                    "code": "1400",
                    "title": "Bad Request",
                    "detail": "Please provide a valid document type."
                }]
            })
        );
    }

    #[test]
    fn test_core_error_mapping() {
        let err = ApiError::from(CoreError::upstream_rejected(413, "too big"));
        assert_eq!(err.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(err.detail(), "too big");

        let err = ApiError::from(CoreError::upstream_rejected(401, "bad token"));
        assert_eq!(err.status(), StatusCode::BAD_GATEWAY);

        let err = ApiError::from(CoreError::session_unavailable("ops", "login refused"));
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        // the backend's reason stays in the logs
        assert!(!err.detail().contains("login refused"));

        let err = ApiError::from(CoreError::upstream_unavailable("connection reset"));
        assert_eq!(err.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn test_basic_challenge_header() {
        let response = ApiError::basic_challenge().into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(response.headers().contains_key(header::WWW_AUTHENTICATE));
    }

    #[test]
    fn test_server_error_display() {
        assert_eq!(
            ServerError::config("bad port").to_string(),
            "Configuration error: bad port"
        );
    }
}
