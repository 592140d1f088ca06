//! Document creation input and its validation.

use bytes::Bytes;
use docbridge_core::{CoreError, CoreResult, DocumentTypeRef, Keyword, KeywordCollection};

use crate::config::{normalize_extension, IngestConfig};

/// Everything a caller supplies to create a document.
#[derive(Debug, Clone)]
pub struct CreateDocumentRequest {
    /// Target document type.
    pub document_type: DocumentTypeRef,
    /// File extension of the payload, with or without the dot.
    pub extension: String,
    /// The payload.
    pub content: Bytes,
    /// Caller keywords. None means the document is archived provisionally.
    pub keywords: Vec<Keyword>,
    /// Free-form key stored as a keyword of the configured index-key type.
    pub index_key: Option<String>,
    /// Document comment; also used as its display name.
    pub comment: Option<String>,
}

impl CreateDocumentRequest {
    /// Create a request with no keywords.
    pub fn new(document_type: DocumentTypeRef, extension: impl Into<String>, content: Bytes) -> Self {
        Self {
            document_type,
            extension: extension.into(),
            content,
            keywords: Vec::new(),
            index_key: None,
            comment: None,
        }
    }

    /// Attach caller keywords.
    #[must_use]
    pub fn with_keywords(mut self, keywords: impl IntoIterator<Item = Keyword>) -> Self {
        self.keywords = keywords.into_iter().collect();
        self
    }

    /// Attach an index key.
    #[must_use]
    pub fn with_index_key(mut self, index_key: impl Into<String>) -> Self {
        self.index_key = Some(index_key.into());
        self
    }

    /// Attach a comment.
    #[must_use]
    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }
}

/// A request that passed local validation.
#[derive(Debug)]
pub(crate) struct ValidCreate {
    pub document_type: DocumentTypeRef,
    pub extension: String,
    pub content: Bytes,
    /// Caller keywords only.
    pub keywords: KeywordCollection,
    /// The index key as a keyword set, empty when none was given.
    pub index_key: KeywordCollection,
    pub comment: Option<String>,
}

impl ValidCreate {
    /// Caller keywords decide whether the document can be classified directly.
    pub fn is_direct(&self) -> bool {
        !self.keywords.is_empty()
    }
}

/// Check a request without touching the backend.
pub(crate) fn validate(request: CreateDocumentRequest, config: &IngestConfig) -> CoreResult<ValidCreate> {
    let type_given = match &request.document_type {
        DocumentTypeRef::Id(id) => !id.trim().is_empty(),
        DocumentTypeRef::Name(name) => !name.trim().is_empty(),
    };
    if !type_given {
        return Err(CoreError::validation_with_field(
            "Please provide a valid document type.",
            "documentType",
        ));
    }

    let size = request.content.len() as u64;
    if size == 0 {
        return Err(CoreError::validation_with_field("file is empty", "file"));
    }
    if size > config.max_size {
        return Err(CoreError::validation_with_field(
            format!("file is {size} bytes; the limit is {}", config.max_size),
            "file",
        ));
    }

    let extension = normalize_extension(&request.extension);
    if extension.is_empty() {
        return Err(CoreError::validation_with_field(
            "file extension is required",
            "file",
        ));
    }
    if !config.accepts_extension(&extension) {
        return Err(CoreError::validation_with_field(
            format!("file extension '{extension}' is not accepted"),
            "file",
        ));
    }

    let keywords = KeywordCollection::from_keywords(request.keywords)?;

    let mut index_key = KeywordCollection::new();
    if let Some(key) = request.index_key {
        let key = key.trim();
        if key.is_empty() {
            return Err(CoreError::validation_with_field(
                "index key must not be blank",
                "indexKey",
            ));
        }
        let type_id = config.index_key_type_id.as_deref().ok_or_else(|| {
            CoreError::validation_with_field("index keys are not enabled", "indexKey")
        })?;
        index_key.insert(Keyword::new(type_id, [key]));
    }

    Ok(ValidCreate {
        document_type: request.document_type,
        extension,
        content: request.content,
        keywords,
        index_key,
        comment: request.comment.filter(|c| !c.trim().is_empty()),
    })
}

/// Parse caller keywords for an update.
pub(crate) fn validate_update(keywords: Vec<Keyword>) -> CoreResult<KeywordCollection> {
    let keywords = KeywordCollection::from_keywords(keywords)?;
    if keywords.is_empty() {
        return Err(CoreError::validation_with_field(
            "at least one keyword is required",
            "keywords",
        ));
    }
    Ok(keywords)
}

/// Reject blank document ids before they reach a URL.
pub(crate) fn validate_id(id: &str) -> CoreResult<&str> {
    let id = id.trim();
    if id.is_empty() {
        return Err(CoreError::validation_with_field("document id is required", "id"));
    }
    Ok(id)
}
