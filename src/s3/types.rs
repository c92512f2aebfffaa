//! Wire-format types for the S3 REST API.
//!
//! XML schemas follow the public AWS S3 documentation; only the fields this
//! crate consumes are modeled.

use serde::{Deserialize, Serialize};

/// Backend payload attached to `FileInfo::sys` for S3-backed entries
///
/// Carries the raw listing/HEAD fields for callers that need more than the
/// generic metadata snapshot. ETags are stored without surrounding quotes.
#[derive(Debug, Clone, Default)]
pub struct ObjectStat {
    pub key: String,
    pub last_modified: String,
    pub etag: String,
    pub storage_class: String,
    pub owner_id: String,
    pub owner_name: String,
}

/// Strip the surrounding whitespace and double quotes S3 wraps ETags in.
pub(crate) fn dequote_etag(raw: &str) -> String {
    raw.trim_matches(|c| c == ' ' || c == '"').to_string()
}

#[derive(Debug, Deserialize)]
pub(crate) struct ListBucketResult {
    #[serde(rename = "IsTruncated", default)]
    pub is_truncated: bool,
    #[serde(rename = "NextContinuationToken")]
    pub next_continuation_token: Option<String>,
    #[serde(rename = "Contents", default)]
    pub contents: Vec<ObjectEntry>,
    #[serde(rename = "CommonPrefixes", default)]
    pub common_prefixes: Vec<CommonPrefix>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ObjectEntry {
    #[serde(rename = "Key")]
    pub key: String,
    #[serde(rename = "LastModified", default)]
    pub last_modified: String,
    #[serde(rename = "ETag", default)]
    pub etag: String,
    #[serde(rename = "Size", default)]
    pub size: u64,
    #[serde(rename = "StorageClass", default)]
    pub storage_class: String,
    #[serde(rename = "Owner")]
    pub owner: Option<Owner>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Owner {
    #[serde(rename = "ID", default)]
    pub id: String,
    #[serde(rename = "DisplayName", default)]
    pub display_name: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CommonPrefix {
    #[serde(rename = "Prefix")]
    pub prefix: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct InitiateMultipartUploadResult {
    #[serde(rename = "UploadId")]
    pub upload_id: String,
}

/// Body of the final `POST ?uploadId=...` request; parts must be listed in
/// ascending part-number order.
#[derive(Debug, Serialize)]
#[serde(rename = "CompleteMultipartUpload")]
pub(crate) struct CompleteMultipartUpload {
    #[serde(rename = "Part")]
    pub parts: Vec<CompletedPart>,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct CompletedPart {
    #[serde(rename = "PartNumber")]
    pub part_number: i32,
    #[serde(rename = "ETag")]
    pub etag: String,
}
