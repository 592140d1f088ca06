//! The `multipart/form-data` body of a document upload.
//!
//! Exactly one `file` part carrying the payload and one `attributes` part
//! carrying JSON:
//!
//! ```json
//! {"documentTypeId": "101", "indexKey": "INV-7", "comment": "scan",
//!  "keywords": [{"typeId": "10", "values": ["AP"]}]}
//! ```
//!
//! `documentType` (a name) may replace `documentTypeId`, never both.

use std::io;

use bytes::Bytes;
use docbridge_core::{DocumentTypeRef, Keyword};
use docbridge_ingest::CreateDocumentRequest;
use http::{header, HeaderMap};
use serde::Deserialize;

use crate::error::ApiError;

const FILE_PART: &str = "file";
const ATTRIBUTES_PART: &str = "attributes";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Attributes {
    #[serde(default)]
    document_type: Option<String>,
    #[serde(default)]
    document_type_id: Option<String>,
    #[serde(default)]
    index_key: Option<String>,
    #[serde(default)]
    comment: Option<String>,
    #[serde(default)]
    keywords: Vec<Keyword>,
}

impl Attributes {
    fn type_ref(&self) -> Result<DocumentTypeRef, ApiError> {
        match (&self.document_type_id, &self.document_type) {
            (Some(id), None) => Ok(DocumentTypeRef::Id(id.clone())),
            (None, Some(name)) => Ok(DocumentTypeRef::Name(name.clone())),
            (Some(_), Some(_)) => Err(ApiError::bad_request(
                "Provide either documentType or documentTypeId, not both.",
            )),
            (None, None) => Err(ApiError::bad_request("Please provide a valid document type.")),
        }
    }
}

struct Upload {
    file_name: Option<String>,
    content: Bytes,
}

/// Parse an upload body into a create request.
pub async fn parse_create(headers: &HeaderMap, body: Bytes) -> Result<CreateDocumentRequest, ApiError> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::bad_request("multipart/form-data body required"))?;
    let mime: mime::Mime = content_type
        .parse()
        .map_err(|_| ApiError::bad_request("invalid Content-Type"))?;
    if mime.essence_str() != mime::MULTIPART_FORM_DATA.essence_str() {
        return Err(ApiError::bad_request("multipart/form-data body required"));
    }
    let boundary = multer::parse_boundary(content_type)
        .map_err(|_| ApiError::bad_request("missing or invalid multipart boundary"))?;

    let stream = futures_util::stream::once(async move { Ok::<_, io::Error>(body) });
    let mut multipart = multer::Multipart::new(stream, boundary);

    let mut upload: Option<Upload> = None;
    let mut attributes: Option<Attributes> = None;

    while let Some(field) = multipart.next_field().await.map_err(malformed)? {
        let name = field.name().map(str::to_owned);
        match name.as_deref() {
            Some(FILE_PART) => {
                if upload.is_some() {
                    return Err(ApiError::bad_request("only one file part is allowed"));
                }
                let file_name = field.file_name().map(String::from);
                let content = field.bytes().await.map_err(malformed)?;
                upload = Some(Upload { file_name, content });
            }
            Some(ATTRIBUTES_PART) => {
                if attributes.is_some() {
                    return Err(ApiError::bad_request("only one attributes part is allowed"));
                }
                let raw = field.bytes().await.map_err(malformed)?;
                let parsed = serde_json::from_slice(&raw)
                    .map_err(|e| ApiError::bad_request(format!("invalid attributes: {e}")))?;
                attributes = Some(parsed);
            }
            // unknown parts are drained and ignored
            _ => {
                field.bytes().await.map_err(malformed)?;
            }
        }
    }

    let upload = upload.ok_or_else(|| ApiError::bad_request("a file part is required"))?;
    let attributes =
        attributes.ok_or_else(|| ApiError::bad_request("an attributes part is required"))?;

    let extension = upload
        .file_name
        .as_deref()
        .and_then(extension_of)
        .unwrap_or_default();

    let mut request = CreateDocumentRequest::new(attributes.type_ref()?, extension, upload.content)
        .with_keywords(attributes.keywords);
    if let Some(index_key) = attributes.index_key {
        request = request.with_index_key(index_key);
    }
    if let Some(comment) = attributes.comment {
        request = request.with_comment(comment);
    }
    Ok(request)
}

fn malformed(e: multer::Error) -> ApiError {
    ApiError::bad_request(format!("malformed multipart body: {e}"))
}

fn extension_of(file_name: &str) -> Option<&str> {
    let (stem, extension) = file_name.rsplit_once('.')?;
    (!stem.is_empty() && !extension.is_empty()).then_some(extension)
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::{HeaderValue, StatusCode};

    const BOUNDARY: &str = "bridge-boundary";

    fn headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_str(&format!("multipart/form-data; boundary={BOUNDARY}")).unwrap(),
        );
        headers
    }

    fn body(parts: &[(&str, Option<&str>, &[u8])]) -> Bytes {
        let mut body = Vec::new();
        for (name, file_name, data) in parts {
            body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
            match file_name {
                Some(file_name) => body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{name}\"; filename=\"{file_name}\"\r\n\
                         Content-Type: application/octet-stream\r\n\r\n"
                    )
                    .as_bytes(),
                ),
                None => body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{name}\"\r\n\
                         Content-Type: application/json\r\n\r\n"
                    )
                    .as_bytes(),
                ),
            }
            body.extend_from_slice(data);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
        Bytes::from(body)
    }

    #[tokio::test]
    async fn test_full_upload() {
        let attributes: &[u8] = br#"{"documentTypeId":"101","indexKey":"INV-7","comment":"scan",
            "keywords":[{"typeId":"10","values":["AP"]}]}"#;
        let body = body(&[
            ("attributes", None, attributes),
            ("file", Some("invoice.scan.pdf"), b"%PDF-1.7"),
        ]);

        let request = parse_create(&headers(), body).await.unwrap();
        assert_eq!(request.document_type, DocumentTypeRef::Id("101".to_string()));
        assert_eq!(request.extension, "pdf");
        assert_eq!(&request.content[..], b"%PDF-1.7");
        assert_eq!(request.keywords, vec![Keyword::new("10", ["AP"])]);
        assert_eq!(request.index_key.as_deref(), Some("INV-7"));
        assert_eq!(request.comment.as_deref(), Some("scan"));
    }

    #[tokio::test]
    async fn test_type_by_name() {
        let body = body(&[
            ("file", Some("a.tif"), b"II*"),
            ("attributes", None, br#"{"documentType":"Invoice"}"#),
        ]);
        let request = parse_create(&headers(), body).await.unwrap();
        assert_eq!(request.document_type, DocumentTypeRef::Name("Invoice".to_string()));
        assert!(request.keywords.is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_and_missing_parts() {
        let twice = body(&[
            ("file", Some("a.pdf"), b"1"),
            ("file", Some("b.pdf"), b"2"),
            ("attributes", None, br#"{"documentTypeId":"101"}"#),
        ]);
        let err = parse_create(&headers(), twice).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);

        let no_file = body(&[("attributes", None, br#"{"documentTypeId":"101"}"#)]);
        assert!(parse_create(&headers(), no_file).await.is_err());

        let no_attributes = body(&[("file", Some("a.pdf"), b"1")]);
        assert!(parse_create(&headers(), no_attributes).await.is_err());
    }

    #[tokio::test]
    async fn test_bad_attributes() {
        let both = body(&[
            ("file", Some("a.pdf"), b"1"),
            ("attributes", None, br#"{"documentTypeId":"101","documentType":"Invoice"}"#),
        ]);
        assert!(parse_create(&headers(), both).await.is_err());

        let not_json = body(&[("file", Some("a.pdf"), b"1"), ("attributes", None, b"type=101")]);
        let err = parse_create(&headers(), not_json).await.unwrap_err();
        assert!(err.detail().starts_with("invalid attributes"));
    }

    #[tokio::test]
    async fn test_not_multipart() {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let err = parse_create(&headers, Bytes::from_static(b"{}")).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_extension_of() {
        assert_eq!(extension_of("scan.PDF"), Some("PDF"));
        assert_eq!(extension_of("archive.tar.gz"), Some("gz"));
        assert_eq!(extension_of("README"), None);
        assert_eq!(extension_of(".hidden"), None);
        assert_eq!(extension_of("trailing."), None);
    }
}
