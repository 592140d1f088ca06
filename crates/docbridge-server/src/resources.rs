//! JSON:API resource documents returned by the facade.

use chrono::{DateTime, Utc};
use docbridge_core::{Document, DocumentType, Keyword, KeywordCollection};
use docbridge_ingest::IngestStatus;
use serde::Serialize;

/// Media type of every JSON:API body.
pub const JSON_API: &str = "application/vnd.api+json";

/// A single-resource top-level document.
#[derive(Debug, Serialize)]
pub struct ResourceDocument<A> {
    data: Resource<A>,
    #[serde(skip_serializing_if = "Option::is_none")]
    meta: Option<Meta>,
}

/// A collection top-level document.
#[derive(Debug, Serialize)]
pub struct CollectionDocument<A> {
    data: Vec<Resource<A>>,
    meta: CollectionMeta,
    links: Links,
}

#[derive(Debug, Serialize)]
struct CollectionMeta {
    count: usize,
}

#[derive(Debug, Serialize)]
struct Resource<A> {
    #[serde(rename = "type")]
    kind: &'static str,
    id: String,
    attributes: A,
    links: Links,
}

#[derive(Debug, Serialize)]
struct Links {
    #[serde(rename = "self")]
    self_link: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Meta {
    ingest_status: IngestStatus,
    reindex_pending: bool,
}

/// Attributes of a `document` resource.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentAttributes {
    name: Option<String>,
    document_type_id: String,
    created_by: Option<String>,
    stored_date: Option<DateTime<Utc>>,
}

/// Attributes of a `keywords` resource.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KeywordAttributes {
    #[serde(skip_serializing_if = "Option::is_none")]
    keyword_guid: Option<String>,
    keywords: Vec<Keyword>,
}

/// Attributes of a `documentType` resource.
#[derive(Debug, Serialize)]
pub struct DocumentTypeAttributes {
    name: String,
}

/// A `document` resource.
pub fn document(document: Document) -> ResourceDocument<DocumentAttributes> {
    ResourceDocument {
        data: document_resource(document),
        meta: None,
    }
}

/// A page of `document` resources.
pub fn documents(documents: Vec<Document>) -> CollectionDocument<DocumentAttributes> {
    CollectionDocument {
        meta: CollectionMeta {
            count: documents.len(),
        },
        data: documents.into_iter().map(document_resource).collect(),
        links: Links {
            self_link: "/documents".to_string(),
        },
    }
}

fn document_resource(document: Document) -> Resource<DocumentAttributes> {
    let self_link = format!("/documents/{}", document.id);
    Resource {
        kind: "document",
        id: document.id,
        attributes: DocumentAttributes {
            name: document.name,
            document_type_id: document.type_id,
            created_by: document.created_by,
            stored_date: document.stored_at,
        },
        links: Links { self_link },
    }
}

/// A newly created `document` with where it landed.
pub fn created_document(
    created: Document,
    status: IngestStatus,
    reindex_pending: bool,
) -> ResourceDocument<DocumentAttributes> {
    let mut resource = document(created);
    resource.meta = Some(Meta {
        ingest_status: status,
        reindex_pending,
    });
    resource
}

/// A document's `keywords` resource.
pub fn keywords(document_id: &str, collection: &KeywordCollection) -> ResourceDocument<KeywordAttributes> {
    ResourceDocument {
        data: Resource {
            kind: "keywords",
            id: document_id.to_string(),
            attributes: KeywordAttributes {
                keyword_guid: collection.guid().map(String::from),
                keywords: collection.iter().collect(),
            },
            links: Links {
                self_link: format!("/documents/{document_id}/keywords"),
            },
        },
        meta: None,
    }
}

/// A `documentType` resource.
pub fn document_type(document_type: DocumentType) -> ResourceDocument<DocumentTypeAttributes> {
    let self_link = format!("/document-types/{}", document_type.id);
    ResourceDocument {
        data: Resource {
            kind: "documentType",
            id: document_type.id,
            attributes: DocumentTypeAttributes {
                name: document_type.name,
            },
            links: Links { self_link },
        },
        meta: None,
    }
}
