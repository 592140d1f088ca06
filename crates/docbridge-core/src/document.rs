//! Document, keyword, and staging types.

use std::fmt;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

/// One keyword type and its values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Keyword {
    /// Keyword type identifier.
    pub type_id: String,
    /// Values, in backend order.
    #[serde(default)]
    pub values: Vec<String>,
}

impl Keyword {
    /// Create a keyword with values.
    pub fn new<I, V>(type_id: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<String>,
    {
        Self {
            type_id: type_id.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }
}

/// Ordered keyword set with unique type ids.
///
/// `guid` is the backend's keyword-template token, carried back unchanged
/// when the collection is written.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "KeywordCollectionRepr", try_from = "KeywordCollectionRepr")]
pub struct KeywordCollection {
    guid: Option<String>,
    keywords: IndexMap<String, Vec<String>>,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct KeywordCollectionRepr {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    guid: Option<String>,
    #[serde(default)]
    keywords: Vec<Keyword>,
}

impl From<KeywordCollection> for KeywordCollectionRepr {
    fn from(collection: KeywordCollection) -> Self {
        Self {
            guid: collection.guid,
            keywords: collection
                .keywords
                .into_iter()
                .map(|(type_id, values)| Keyword { type_id, values })
                .collect(),
        }
    }
}

impl TryFrom<KeywordCollectionRepr> for KeywordCollection {
    type Error = CoreError;

    fn try_from(repr: KeywordCollectionRepr) -> Result<Self, Self::Error> {
        let mut collection = Self::from_keywords(repr.keywords)?;
        collection.guid = repr.guid;
        Ok(collection)
    }
}

impl KeywordCollection {
    /// Create an empty collection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a collection from caller keywords, rejecting repeated type ids.
    pub fn from_keywords(keywords: impl IntoIterator<Item = Keyword>) -> CoreResult<Self> {
        let mut collection = Self::new();
        for keyword in keywords {
            if keyword.type_id.trim().is_empty() {
                return Err(CoreError::validation_with_field(
                    "keyword type id must not be empty",
                    "keywords",
                ));
            }
            if collection.keywords.contains_key(&keyword.type_id) {
                return Err(CoreError::validation_with_field(
                    format!("keyword type '{}' appears more than once", keyword.type_id),
                    "keywords",
                ));
            }
            collection.keywords.insert(keyword.type_id, keyword.values);
        }
        Ok(collection)
    }

    /// Attach the backend keyword-template token.
    #[must_use]
    pub fn with_guid(mut self, guid: impl Into<String>) -> Self {
        self.guid = Some(guid.into());
        self
    }

    /// Backend keyword-template token.
    pub fn guid(&self) -> Option<&str> {
        self.guid.as_deref()
    }

    /// Insert or replace the values for a type id, keeping its position.
    pub fn insert(&mut self, keyword: Keyword) {
        self.keywords.insert(keyword.type_id, keyword.values);
    }

    /// Values for a type id.
    pub fn get(&self, type_id: &str) -> Option<&[String]> {
        self.keywords.get(type_id).map(Vec::as_slice)
    }

    /// Overlay `other` onto `self`: its entries win per type id.
    ///
    /// Entries only in `self` keep their order; new ones are appended.
    /// A guid on `other` replaces ours.
    pub fn merge(&mut self, other: &KeywordCollection) {
        for (type_id, values) in &other.keywords {
            self.keywords.insert(type_id.clone(), values.clone());
        }
        if other.guid.is_some() {
            self.guid.clone_from(&other.guid);
        }
    }

    /// Number of keyword types.
    pub fn len(&self) -> usize {
        self.keywords.len()
    }

    /// Whether there are no keyword types.
    pub fn is_empty(&self) -> bool {
        self.keywords.is_empty()
    }

    /// Iterate keywords in order.
    pub fn iter(&self) -> impl Iterator<Item = Keyword> + '_ {
        self.keywords.iter().map(|(type_id, values)| Keyword {
            type_id: type_id.clone(),
            values: values.clone(),
        })
    }

    /// Type ids in order.
    pub fn type_ids(&self) -> impl Iterator<Item = &str> {
        self.keywords.keys().map(String::as_str)
    }
}

/// A backend document type (classification).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentType {
    /// Type identifier.
    pub id: String,
    /// Display name.
    pub name: String,
}

impl DocumentType {
    /// Create a document type.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// How a caller names a document type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DocumentTypeRef {
    /// By identifier.
    Id(String),
    /// By display name.
    Name(String),
}

impl fmt::Display for DocumentTypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Id(id) => write!(f, "id:{id}"),
            Self::Name(name) => write!(f, "name:{name}"),
        }
    }
}

/// An archived document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    /// Backend-assigned id.
    pub id: String,
    /// Display name.
    #[serde(default)]
    pub name: Option<String>,
    /// Current document type id.
    pub type_id: String,
    /// Account that stored the document.
    #[serde(default)]
    pub created_by: Option<String>,
    /// When the document was archived.
    #[serde(default)]
    pub stored_at: Option<DateTime<Utc>>,
}

/// Filter for listing documents.
///
/// Every field is optional and handed to the backend as given. Only the
/// page size is checked here.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DocumentQuery {
    /// Free-form index key.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index_key: Option<String>,
    /// Document type group name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub doc_type_group: Option<String>,
    /// Document type name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub doc_type: Option<String>,
    /// Only documents with an id at or above this one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_doc_id: Option<u64>,
    /// Maximum number of documents returned.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_size: Option<u32>,
    /// Keyword expression every match must satisfy.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keywords_has_all: Option<String>,
}

impl DocumentQuery {
    /// Largest page a caller may ask for.
    pub const MAX_PAGE_SIZE: u32 = 1000;

    /// Create an empty query.
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict to a document type name.
    #[must_use]
    pub fn with_doc_type(mut self, doc_type: impl Into<String>) -> Self {
        self.doc_type = Some(doc_type.into());
        self
    }

    /// Restrict to an index key.
    #[must_use]
    pub fn with_index_key(mut self, index_key: impl Into<String>) -> Self {
        self.index_key = Some(index_key.into());
        self
    }

    /// Start at a document id.
    #[must_use]
    pub fn with_start_doc_id(mut self, id: u64) -> Self {
        self.start_doc_id = Some(id);
        self
    }

    /// Cap the number of results.
    #[must_use]
    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = Some(page_size);
        self
    }

    /// Reject a page size of zero or above [`MAX_PAGE_SIZE`](Self::MAX_PAGE_SIZE).
    pub fn validate(&self) -> CoreResult<()> {
        match self.page_size {
            Some(0) => Err(CoreError::validation_with_field(
                "pageSize must be at least 1",
                "pageSize",
            )),
            Some(size) if size > Self::MAX_PAGE_SIZE => Err(CoreError::validation_with_field(
                format!("pageSize must not exceed {}", Self::MAX_PAGE_SIZE),
                "pageSize",
            )),
            _ => Ok(()),
        }
    }
}

/// Binary content of a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentContent {
    /// Raw bytes.
    pub bytes: Bytes,
    /// MIME type reported by the backend.
    pub content_type: String,
}

/// Destination for a staged upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadSlot {
    /// Slot identifier.
    pub id: String,
    /// Number of parts the backend expects.
    pub total_parts: u32,
    /// Bytes per part; the last part may be shorter.
    pub part_size: u64,
}

/// Finalize a staged upload into a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveRequest {
    /// Document type to archive into.
    pub type_id: String,
    /// Upload slot holding the parts.
    pub slot_id: String,
    /// Keywords to store.
    pub keywords: KeywordCollection,
    /// Optional archive comment.
    pub comment: Option<String>,
    /// Skip workflow entry on archive.
    pub skip_workflow: bool,
}

/// Reclassify an archived document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReindexRequest {
    /// Document id.
    pub document_id: String,
    /// Final document type.
    pub type_id: String,
    /// Keywords for the final type.
    pub keywords: KeywordCollection,
    /// Let the backend expand keyword sets from the values given.
    pub expand_keysets: bool,
}
