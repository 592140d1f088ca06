//! JSON shapes of the document store REST API.

use chrono::{DateTime, Utc};
use docbridge_core::{Document, DocumentType, Keyword, KeywordCollection, UploadSlot};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub(crate) struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
}

/// Error body of a refused token request (RFC 6749 section 5.2).
#[derive(Debug, Deserialize)]
pub(crate) struct OAuthError {
    pub error: OAuthErrorCode,
    #[serde(default)]
    pub error_description: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub(crate) enum OAuthErrorCode {
    InvalidGrant,
    InvalidClient,
    InvalidRequest,
    InvalidScope,
    UnauthorizedClient,
    UnsupportedGrantType,
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Items<T> {
    #[serde(default = "Vec::new")]
    pub items: Vec<T>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct WireDocumentType {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub system_name: Option<String>,
}

impl From<WireDocumentType> for DocumentType {
    fn from(wire: WireDocumentType) -> Self {
        let name = wire.name.or(wire.system_name).unwrap_or_default();
        DocumentType::new(wire.id, name)
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct WireKeywordCollection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keyword_guid: Option<String>,
    #[serde(default)]
    pub items: Vec<WireKeywordGroup>,
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct WireKeywordGroup {
    #[serde(default)]
    pub keywords: Vec<WireKeyword>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct WireKeyword {
    pub type_id: String,
    #[serde(default)]
    pub values: Vec<WireValue>,
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct WireValue {
    pub value: String,
}

impl From<WireKeywordCollection> for KeywordCollection {
    /// Flatten keyword groups; a type id repeated across groups gets its
    /// values concatenated.
    fn from(wire: WireKeywordCollection) -> Self {
        let mut collection = KeywordCollection::new();
        for keyword in wire.items.into_iter().flat_map(|group| group.keywords) {
            let mut values: Vec<String> = collection
                .get(&keyword.type_id)
                .map(<[String]>::to_vec)
                .unwrap_or_default();
            values.extend(keyword.values.into_iter().map(|v| v.value));
            collection.insert(Keyword::new(keyword.type_id, values));
        }
        match wire.keyword_guid {
            Some(guid) => collection.with_guid(guid),
            None => collection,
        }
    }
}

impl From<&KeywordCollection> for WireKeywordCollection {
    fn from(collection: &KeywordCollection) -> Self {
        let keywords = collection
            .iter()
            .map(|keyword| WireKeyword {
                type_id: keyword.type_id,
                values: keyword
                    .values
                    .into_iter()
                    .map(|value| WireValue { value })
                    .collect(),
            })
            .collect();
        Self {
            keyword_guid: collection.guid().map(str::to_string),
            items: vec![WireKeywordGroup { keywords }],
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct StagingRequest<'a> {
    pub file_extension: &'a str,
    pub file_size: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct StagingResponse {
    pub id: String,
    pub number_of_parts: u32,
    #[serde(default)]
    pub file_part_size: Option<u64>,
}

impl StagingResponse {
    /// Backends that omit the part size imply an even split.
    pub fn into_slot(self, size: u64) -> UploadSlot {
        let part_size = self
            .file_part_size
            .unwrap_or_else(|| size.div_ceil(u64::from(self.number_of_parts.max(1))));
        UploadSlot {
            id: self.id,
            total_parts: self.number_of_parts,
            part_size,
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct UploadRef<'a> {
    pub id: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ArchiveBody<'a> {
    pub document_type_id: &'a str,
    pub uploads: Vec<UploadRef<'a>>,
    pub keyword_collection: WireKeywordCollection,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<&'a str>,
    pub skip_workflow: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ReindexBody<'a> {
    pub document_type_id: &'a str,
    pub keyword_collection: WireKeywordCollection,
    pub expand_keysets: bool,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Created {
    pub id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct WireDocument {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    pub type_id: String,
    #[serde(default)]
    pub created_by_user_id: Option<String>,
    #[serde(default)]
    pub stored_date: Option<DateTime<Utc>>,
}

impl From<WireDocument> for Document {
    fn from(wire: WireDocument) -> Self {
        Document {
            id: wire.id,
            name: wire.name,
            type_id: wire.type_id,
            created_by: wire.created_by_user_id,
            stored_at: wire.stored_date,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keyword_groups_flatten() {
        let wire: WireKeywordCollection = serde_json::from_value(serde_json::json!({
            "keywordGuid": "g-9",
            "items": [
                {"keywords": [{"typeId": "1", "values": [{"value": "a"}]}]},
                {"keywords": [
                    {"typeId": "1", "values": [{"value": "b"}]},
                    {"typeId": "2", "values": []}
                ]}
            ]
        }))
        .unwrap();

        let collection = KeywordCollection::from(wire);
        assert_eq!(collection.guid(), Some("g-9"));
        assert_eq!(
            collection.get("1"),
            Some(&["a".to_string(), "b".to_string()][..])
        );
        assert_eq!(collection.get("2"), Some(&[][..]));
    }

    #[test]
    fn test_keyword_collection_to_wire() {
        let collection = KeywordCollection::from_keywords(vec![Keyword::new("5", ["INV-1"])])
            .unwrap()
            .with_guid("g");
        let json = serde_json::to_value(WireKeywordCollection::from(&collection)).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "keywordGuid": "g",
                "items": [{"keywords": [{"typeId": "5", "values": [{"value": "INV-1"}]}]}]
            })
        );
    }

    #[test]
    fn test_staging_part_size_fallback() {
        let response = StagingResponse {
            id: "u1".to_string(),
            number_of_parts: 3,
            file_part_size: None,
        };
        let slot = response.into_slot(10);
        assert_eq!(slot.part_size, 4);
        assert_eq!(slot.total_parts, 3);
    }

    #[test]
    fn test_document_type_name_falls_back_to_system_name() {
        let wire: WireDocumentType =
            serde_json::from_value(serde_json::json!({"id": "101", "systemName": "INVOICE"}))
                .unwrap();
        assert_eq!(DocumentType::from(wire).name, "INVOICE");
    }
}
