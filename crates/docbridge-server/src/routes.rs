//! Route table.

use http::Method;

use crate::error::ApiError;

/// A resolved request target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// `GET /documents`
    ListDocuments,
    /// `POST /documents`
    CreateDocument,
    /// `GET /documents/{id}`
    Document(String),
    /// `GET /documents/{id}/content`
    DocumentContent(String),
    /// `GET /documents/{id}/keywords`
    DocumentKeywords(String),
    /// `PATCH /documents/{id}/keywords`
    UpdateKeywords(String),
    /// `GET /document-types/{id}`
    DocumentType(String),
    /// `GET /_docbridge/health`
    Health,
    /// `GET /_docbridge/ready`
    Ready,
    /// `GET /_docbridge/metrics`
    Metrics,
    /// `GET /_docbridge/version`
    Version,
}

impl Route {
    /// Match a method and path.
    ///
    /// A known path with the wrong method is a 405, anything else a 404.
    pub fn resolve(method: &Method, path: &str) -> Result<Self, ApiError> {
        let trimmed = path.trim_end_matches('/');
        let segments: Vec<&str> = trimmed.split('/').skip(1).collect();

        let (route, allowed) = match segments.as_slice() {
            ["documents"] => {
                if *method == Method::GET {
                    return Ok(Self::ListDocuments);
                }
                (Self::CreateDocument, Method::POST)
            }
            ["documents", id] if !id.is_empty() => (Self::Document((*id).to_string()), Method::GET),
            ["documents", id, "content"] if !id.is_empty() => {
                (Self::DocumentContent((*id).to_string()), Method::GET)
            }
            ["documents", id, "keywords"] if !id.is_empty() => {
                let id = (*id).to_string();
                if *method == Method::GET {
                    return Ok(Self::DocumentKeywords(id));
                }
                (Self::UpdateKeywords(id), Method::PATCH)
            }
            ["document-types", id] if !id.is_empty() => {
                (Self::DocumentType((*id).to_string()), Method::GET)
            }
            ["_docbridge", "health"] => (Self::Health, Method::GET),
            ["_docbridge", "ready"] => (Self::Ready, Method::GET),
            ["_docbridge", "metrics"] => (Self::Metrics, Method::GET),
            ["_docbridge", "version"] => (Self::Version, Method::GET),
            _ => return Err(ApiError::not_found(format!("no route for {path}"))),
        };

        if *method == allowed {
            Ok(route)
        } else {
            Err(ApiError::method_not_allowed())
        }
    }

    /// Metric label; never contains ids.
    pub fn template(&self) -> &'static str {
        match self {
            Self::ListDocuments | Self::CreateDocument => "/documents",
            Self::Document(_) => "/documents/{id}",
            Self::DocumentContent(_) => "/documents/{id}/content",
            Self::DocumentKeywords(_) | Self::UpdateKeywords(_) => "/documents/{id}/keywords",
            Self::DocumentType(_) => "/document-types/{id}",
            Self::Health => "/_docbridge/health",
            Self::Ready => "/_docbridge/ready",
            Self::Metrics => "/_docbridge/metrics",
            Self::Version => "/_docbridge/version",
        }
    }

    /// Operational endpoints skip inbound authentication and the profile
    /// header.
    pub fn is_internal(&self) -> bool {
        matches!(self, Self::Health | Self::Ready | Self::Metrics | Self::Version)
    }
}
