//! Ingestion settings.

use std::time::Duration;

use docbridge_core::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};

/// Limits and classification settings for document creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Largest accepted payload in bytes.
    pub max_size: u64,
    /// Document type used when a document arrives without keywords.
    pub provisional_type_id: String,
    /// Keyword type that stores the caller's index key.
    pub index_key_type_id: Option<String>,
    /// Accepted file extensions, lowercase without the dot. Empty accepts any.
    pub allowed_extensions: Vec<String>,
    /// Upper bound on one background re-index.
    #[serde(with = "docbridge_core::duration")]
    pub reindex_timeout: Duration,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            max_size: 100 * 1024 * 1024,
            provisional_type_id: String::new(),
            index_key_type_id: None,
            allowed_extensions: Vec::new(),
            reindex_timeout: Duration::from_secs(300),
        }
    }
}

impl IngestConfig {
    /// Create settings with the given provisional type.
    pub fn new(provisional_type_id: impl Into<String>) -> Self {
        Self {
            provisional_type_id: provisional_type_id.into(),
            ..Self::default()
        }
    }

    /// Set the payload size limit.
    #[must_use]
    pub fn with_max_size(mut self, max_size: u64) -> Self {
        self.max_size = max_size;
        self
    }

    /// Set the keyword type that stores index keys.
    #[must_use]
    pub fn with_index_key_type(mut self, type_id: impl Into<String>) -> Self {
        self.index_key_type_id = Some(type_id.into());
        self
    }

    /// Restrict accepted extensions.
    #[must_use]
    pub fn with_allowed_extensions<I, E>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = E>,
        E: Into<String>,
    {
        self.allowed_extensions = extensions
            .into_iter()
            .map(|e| normalize_extension(&e.into()))
            .collect();
        self
    }

    /// Set the background re-index timeout.
    #[must_use]
    pub fn with_reindex_timeout(mut self, timeout: Duration) -> Self {
        self.reindex_timeout = timeout;
        self
    }

    /// Check the settings are usable.
    pub fn validate(&self) -> CoreResult<()> {
        if self.provisional_type_id.trim().is_empty() {
            return Err(CoreError::validation_with_field(
                "a provisional document type id is required",
                "ingest.provisional_type_id",
            ));
        }
        if self.max_size == 0 {
            return Err(CoreError::validation_with_field(
                "max_size must be positive",
                "ingest.max_size",
            ));
        }
        if self
            .index_key_type_id
            .as_deref()
            .is_some_and(|t| t.trim().is_empty())
        {
            return Err(CoreError::validation_with_field(
                "index_key_type_id must not be blank",
                "ingest.index_key_type_id",
            ));
        }
        Ok(())
    }

    pub(crate) fn accepts_extension(&self, extension: &str) -> bool {
        self.allowed_extensions.is_empty()
            || self
                .allowed_extensions
                .iter()
                .any(|e| normalize_extension(e) == extension)
    }
}

/// Lowercase an extension and drop any leading dots.
pub(crate) fn normalize_extension(extension: &str) -> String {
    extension.trim().trim_start_matches('.').to_ascii_lowercase()
}
