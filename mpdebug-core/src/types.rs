//! Core data types for mpdebug

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Bucket name as given by the caller
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BucketName(String);

impl BucketName {
    /// Create a new bucket name. Naming rules are the service's business,
    /// locally we only refuse an empty name.
    pub fn new(name: &str) -> crate::Result<Self> {
        if name.is_empty() {
            return Err(crate::MpError::InvalidBucketName("empty name".to_string()));
        }

        Ok(BucketName(name.to_string()))
    }

    /// Get the bucket name as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for BucketName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Object key within a bucket
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectKey(String);

impl ObjectKey {
    /// Create a new object key
    pub fn new(key: &str) -> crate::Result<Self> {
        if key.is_empty() {
            return Err(crate::MpError::InvalidKey("empty key".to_string()));
        }

        Ok(ObjectKey(key.to_string()))
    }

    /// Get the key as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Check if this key has the given prefix
    pub fn has_prefix(&self, prefix: &str) -> bool {
        self.0.starts_with(prefix)
    }
}

impl std::fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque token the service assigns to an in-progress multipart upload
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UploadId(String);

impl UploadId {
    pub fn new(id: impl Into<String>) -> Self {
        UploadId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for UploadId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Positive part number. The service decides the upper bound; locally we
/// only keep it inside the signed 32-bit range the wire format uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct PartNumber(u32);

impl PartNumber {
    pub fn new(n: u32) -> crate::Result<Self> {
        if n == 0 {
            return Err(crate::MpError::InvalidPartNumber(
                "part numbers start at 1".to_string(),
            ));
        }
        if n > i32::MAX as u32 {
            return Err(crate::MpError::InvalidPartNumber(format!("{} is out of range", n)));
        }
        Ok(PartNumber(n))
    }

    pub fn get(&self) -> u32 {
        self.0
    }

    /// Part number in the signed form S3 requests carry
    pub fn as_i32(&self) -> i32 {
        // new() keeps the value within i32::MAX
        self.0 as i32
    }
}

impl TryFrom<u32> for PartNumber {
    type Error = crate::MpError;

    fn try_from(n: u32) -> crate::Result<Self> {
        PartNumber::new(n)
    }
}

impl From<PartNumber> for u32 {
    fn from(n: PartNumber) -> u32 {
        n.0
    }
}

impl FromStr for PartNumber {
    type Err = crate::MpError;

    fn from_str(s: &str) -> crate::Result<Self> {
        let n: u32 = s
            .trim()
            .parse()
            .map_err(|_| crate::MpError::InvalidPartNumber(format!("'{}' is not a positive integer", s)))?;
        PartNumber::new(n)
    }
}

impl std::fmt::Display for PartNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One multipart upload on the remote service. Created by initiation and
/// only ever referenced afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UploadSession {
    pub bucket: BucketName,
    pub key: ObjectKey,
    pub upload_id: UploadId,
}

impl UploadSession {
    pub fn new(bucket: BucketName, key: ObjectKey, upload_id: UploadId) -> Self {
        UploadSession {
            bucket,
            key,
            upload_id,
        }
    }
}

/// Options for initiating an upload
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InitiateOptions {
    /// Request server-side encryption with service-managed keys
    pub encrypt: bool,
}

/// Reference to an uploaded part, as needed to complete the upload.
///
/// Renders as `<part_number>.<etag>`, the same form [`FromStr`] accepts.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PartDescriptor {
    pub part_number: PartNumber,
    pub etag: String,
}

impl PartDescriptor {
    pub fn new(part_number: PartNumber, etag: impl Into<String>) -> Self {
        PartDescriptor {
            part_number,
            etag: etag.into(),
        }
    }
}

impl FromStr for PartDescriptor {
    type Err = crate::MpError;

    /// Parse `<part_number>.<etag>`. Only the first `.` separates; the rest
    /// of the argument is the tag, dots included.
    fn from_str(arg: &str) -> crate::Result<Self> {
        let (number, etag) = arg.split_once('.').ok_or_else(|| {
            crate::MpError::Input(format!("'{}' is not of the form <partNumber>.<etag>", arg))
        })?;

        let part_number: PartNumber = number
            .parse()
            .map_err(|e| crate::MpError::Input(format!("'{}': {}", arg, e)))?;

        if etag.is_empty() {
            return Err(crate::MpError::Input(format!("'{}' has an empty etag", arg)));
        }

        Ok(PartDescriptor::new(part_number, etag))
    }
}

impl std::fmt::Display for PartDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.part_number, self.etag)
    }
}

/// Parse every completion argument, stopping at the first malformed one
pub fn parse_completion_parts<I, S>(args: I) -> crate::Result<Vec<PartDescriptor>>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    args.into_iter().map(|arg| arg.as_ref().parse()).collect()
}

/// Outcome of completing an upload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadResult {
    pub bucket: BucketName,
    pub key: ObjectKey,
    pub etag: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version_id: Option<String>,
}

/// Position and bounds for listing in-progress uploads
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadsCursor {
    pub key_marker: Option<String>,
    pub upload_id_marker: Option<String>,
    pub max_uploads: Option<u32>,
    pub delimiter: Option<String>,
}

/// In-progress upload as reported by a listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadSummary {
    pub key: ObjectKey,
    pub upload_id: UploadId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub initiated: Option<DateTime<Utc>>,
}

/// One page of in-progress uploads
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadsPage {
    pub bucket: BucketName,
    pub prefix: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delimiter: Option<String>,
    pub uploads: Vec<UploadSummary>,
    pub common_prefixes: Vec<String>,
    pub is_truncated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_key_marker: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_upload_id_marker: Option<String>,
}

impl UploadsPage {
    /// Cursor for the following page, or `None` once the listing is exhausted
    pub fn next_cursor(&self, current: &UploadsCursor) -> Option<UploadsCursor> {
        if !self.is_truncated {
            return None;
        }
        let (key_marker, upload_id_marker) = match self.next_key_marker.as_deref() {
            Some(key) if !key.is_empty() => (key.to_string(), self.next_upload_id_marker.clone()),
            _ => self.last_listed()?,
        };
        Some(UploadsCursor {
            key_marker: Some(key_marker),
            upload_id_marker,
            max_uploads: current.max_uploads,
            delimiter: current.delimiter.clone(),
        })
    }

    /// Resume point when the service sent no markers: the last upload, or
    /// the last common prefix when it sorts after that upload's key
    fn last_listed(&self) -> Option<(String, Option<String>)> {
        let upload = self
            .uploads
            .last()
            .map(|u| (u.key.as_str().to_string(), Some(u.upload_id.as_str().to_string())));
        let prefix = self.common_prefixes.last().map(|p| (p.clone(), None));

        match (upload, prefix) {
            (Some(u), Some(p)) => Some(if p.0 > u.0 { p } else { u }),
            (u, p) => u.or(p),
        }
    }
}

/// Position and bounds for listing the parts of one upload
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartsCursor {
    pub part_marker: Option<u32>,
    pub max_parts: Option<u32>,
}

/// Uploaded part as reported by a listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListedPart {
    pub part_number: PartNumber,
    pub etag: String,
    pub size: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<DateTime<Utc>>,
}

impl ListedPart {
    pub fn descriptor(&self) -> PartDescriptor {
        PartDescriptor::new(self.part_number, self.etag.clone())
    }
}

/// One page of parts of an upload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartsPage {
    pub session: UploadSession,
    pub parts: Vec<ListedPart>,
    pub is_truncated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_part_marker: Option<u32>,
}

impl PartsPage {
    /// Cursor for the following page, or `None` once the listing is exhausted
    pub fn next_cursor(&self, current: &PartsCursor) -> Option<PartsCursor> {
        if !self.is_truncated {
            return None;
        }
        let marker = self
            .next_part_marker
            .or_else(|| self.parts.last().map(|p| p.part_number.get()))?;
        Some(PartsCursor {
            part_marker: Some(marker),
            max_parts: current.max_parts,
        })
    }
}

/// Structured outcome of an abort, printed instead of failing the process
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbortStatus {
    pub status: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl AbortStatus {
    pub fn succeeded() -> Self {
        AbortStatus {
            status: true,
            message: None,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        AbortStatus {
            status: false,
            message: Some(message.into()),
        }
    }

    pub fn from_result<E: std::fmt::Display>(result: std::result::Result<(), E>) -> Self {
        match result {
            Ok(()) => AbortStatus::succeeded(),
            Err(e) => AbortStatus::failed(e.to_string()),
        }
    }
}
