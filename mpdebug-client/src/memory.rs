//! In-process object store that follows the service's multipart rules

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use mpdebug_core::*;
use ulid::Ulid;

use crate::{ClientError, ObjectStoreClient, Result};

/// Smallest size of every part but the last, as on S3
pub const DEFAULT_MIN_PART_SIZE: usize = 5 * 1024 * 1024;

const DEFAULT_MAX_KEYS: u32 = 1000;

/// Object assembled by a completed upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub data: Bytes,
    pub etag: String,
    pub encrypted: bool,
}

#[derive(Debug)]
struct StoredPart {
    etag: String,
    digest: [u8; 16],
    data: Bytes,
    last_modified: DateTime<Utc>,
}

#[derive(Debug)]
struct Upload {
    bucket: String,
    key: String,
    upload_id: String,
    seq: u64,
    initiated: DateTime<Utc>,
    encrypted: bool,
    parts: BTreeMap<u32, StoredPart>,
}

#[derive(Debug, Default)]
struct State {
    buckets: BTreeSet<String>,
    uploads: BTreeMap<String, Upload>,
    objects: BTreeMap<(String, String), StoredObject>,
    next_seq: u64,
}

/// Shared, cloneable in-memory store
#[derive(Clone, Debug)]
pub struct MemoryStore {
    state: Arc<Mutex<State>>,
    min_part_size: usize,
    latency: Option<Duration>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore {
            state: Arc::new(Mutex::new(State::default())),
            min_part_size: DEFAULT_MIN_PART_SIZE,
            latency: None,
        }
    }

    pub fn with_bucket(self, name: &str) -> Self {
        self.create_bucket(name);
        self
    }

    pub fn with_min_part_size(mut self, bytes: usize) -> Self {
        self.min_part_size = bytes;
        self
    }

    /// Delay every request, to give cancellation something to interrupt
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn create_bucket(&self, name: &str) {
        self.state().buckets.insert(name.to_string());
    }

    /// Object produced by a completed upload, if any
    pub fn object(&self, bucket: &BucketName, key: &ObjectKey) -> Option<StoredObject> {
        self.state()
            .objects
            .get(&(bucket.as_str().to_string(), key.as_str().to_string()))
            .cloned()
    }

    /// Number of uploads neither completed nor aborted
    pub fn upload_count(&self) -> usize {
        self.state().uploads.len()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    async fn delay(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }

    fn create_upload_now(
        &self,
        bucket: &BucketName,
        key: &ObjectKey,
        options: InitiateOptions,
    ) -> Result<UploadId> {
        let mut state = self.state();
        ensure_bucket(&state, bucket, "CreateMultipartUpload")?;

        let upload_id = Ulid::new().to_string();
        let seq = state.next_seq;
        state.next_seq += 1;
        state.uploads.insert(
            upload_id.clone(),
            Upload {
                bucket: bucket.as_str().to_string(),
                key: key.as_str().to_string(),
                upload_id: upload_id.clone(),
                seq,
                initiated: Utc::now(),
                encrypted: options.encrypt,
                parts: BTreeMap::new(),
            },
        );
        Ok(UploadId::new(upload_id))
    }

    fn upload_part_now(
        &self,
        session: &UploadSession,
        part_number: PartNumber,
        body: Bytes,
    ) -> Result<PartDescriptor> {
        const OP: &str = "UploadPart";
        let mut state = self.state();
        let upload = find_upload_mut(&mut state, session, OP)?;

        let digest = md5::compute(&body);
        let etag = format!("{:x}", digest);
        upload.parts.insert(
            part_number.get(),
            StoredPart {
                etag: etag.clone(),
                digest: digest.0,
                data: body,
                last_modified: Utc::now(),
            },
        );
        Ok(PartDescriptor::new(part_number, etag))
    }

    fn complete_upload_now(
        &self,
        session: &UploadSession,
        parts: &[PartDescriptor],
    ) -> Result<UploadResult> {
        const OP: &str = "CompleteMultipartUpload";
        let mut state = self.state();
        let upload = find_upload_mut(&mut state, session, OP)?;

        if parts.is_empty() {
            return Err(ClientError::remote(
                OP,
                Some("MalformedXML"),
                "You must specify at least one part.",
            ));
        }
        if parts
            .windows(2)
            .any(|pair| pair[0].part_number >= pair[1].part_number)
        {
            return Err(ClientError::remote(
                OP,
                Some("InvalidPartOrder"),
                "The list of parts was not in ascending order.",
            ));
        }

        let mut data = Vec::new();
        let mut digests = Vec::with_capacity(parts.len() * 16);
        for (i, part) in parts.iter().enumerate() {
            let stored = upload
                .parts
                .get(&part.part_number.get())
                .filter(|stored| stored.etag == part.etag.trim_matches('"'))
                .ok_or_else(|| {
                    ClientError::remote(
                        OP,
                        Some("InvalidPart"),
                        format!(
                            "Part {} could not be found or its entity tag does not match.",
                            part.part_number
                        ),
                    )
                })?;
            let is_last = i + 1 == parts.len();
            if !is_last && stored.data.len() < self.min_part_size {
                return Err(ClientError::remote(
                    OP,
                    Some("EntityTooSmall"),
                    format!(
                        "Part {} is {} bytes, below the {} byte minimum.",
                        part.part_number,
                        stored.data.len(),
                        self.min_part_size
                    ),
                ));
            }
            data.extend_from_slice(&stored.data);
            digests.extend_from_slice(&stored.digest);
        }

        let etag = format!("{:x}-{}", md5::compute(&digests), parts.len());
        let encrypted = upload.encrypted;
        state.uploads.remove(session.upload_id.as_str());
        state.objects.insert(
            (session.bucket.as_str().to_string(), session.key.as_str().to_string()),
            StoredObject {
                data: Bytes::from(data),
                etag: etag.clone(),
                encrypted,
            },
        );

        Ok(UploadResult {
            bucket: session.bucket.clone(),
            key: session.key.clone(),
            etag,
            location: Some(format!("memory://{}/{}", session.bucket, session.key)),
            version_id: None,
        })
    }

    fn list_uploads_now(
        &self,
        bucket: &BucketName,
        prefix: &str,
        cursor: &UploadsCursor,
    ) -> Result<UploadsPage> {
        let state = self.state();
        ensure_bucket(&state, bucket, "ListMultipartUploads")?;

        let max = cursor.max_uploads.filter(|m| *m > 0).unwrap_or(DEFAULT_MAX_KEYS) as usize;
        let delimiter = cursor.delimiter.as_deref().filter(|d| !d.is_empty());

        let mut entries: Vec<&Upload> = state
            .uploads
            .values()
            .filter(|u| u.bucket == bucket.as_str() && u.key.starts_with(prefix))
            .collect();
        entries.sort_by(|a, b| (&a.key, a.seq).cmp(&(&b.key, b.seq)));

        let start = start_after_markers(&entries, cursor, delimiter);

        let mut uploads = Vec::new();
        let mut common_prefixes: Vec<String> = Vec::new();
        let mut last: Option<(String, Option<String>)> = None;
        let mut is_truncated = false;

        for upload in &entries[start..] {
            let group = delimiter.and_then(|d| {
                upload.key[prefix.len()..]
                    .find(d)
                    .map(|i| upload.key[..prefix.len() + i + d.len()].to_string())
            });
            if let Some(group) = &group {
                if common_prefixes.last() == Some(group) {
                    continue;
                }
            }
            if uploads.len() + common_prefixes.len() == max {
                is_truncated = true;
                break;
            }
            match group {
                Some(group) => {
                    last = Some((group.clone(), None));
                    common_prefixes.push(group);
                }
                None => {
                    last = Some((upload.key.clone(), Some(upload.upload_id.clone())));
                    uploads.push(UploadSummary {
                        key: ObjectKey::new(&upload.key)?,
                        upload_id: UploadId::new(upload.upload_id.clone()),
                        initiated: Some(upload.initiated),
                    });
                }
            }
        }

        let (next_key_marker, next_upload_id_marker) = match (is_truncated, last) {
            (true, Some((key, id))) => (Some(key), id),
            _ => (None, None),
        };

        Ok(UploadsPage {
            bucket: bucket.clone(),
            prefix: prefix.to_string(),
            delimiter: delimiter.map(str::to_owned),
            uploads,
            common_prefixes,
            is_truncated,
            next_key_marker,
            next_upload_id_marker,
        })
    }

    fn list_parts_now(&self, session: &UploadSession, cursor: &PartsCursor) -> Result<PartsPage> {
        let mut state = self.state();
        let upload = find_upload_mut(&mut state, session, "ListParts")?;

        let max = cursor.max_parts.filter(|m| *m > 0).unwrap_or(DEFAULT_MAX_KEYS) as usize;
        let after = cursor.part_marker.unwrap_or(0);

        let mut remaining = upload
            .parts
            .range(after.saturating_add(1)..)
            .map(|(number, part)| (*number, part));
        let mut parts = Vec::new();
        for (number, part) in remaining.by_ref().take(max) {
            parts.push(ListedPart {
                part_number: PartNumber::new(number)?,
                etag: part.etag.clone(),
                size: part.data.len() as u64,
                last_modified: Some(part.last_modified),
            });
        }
        let is_truncated = remaining.next().is_some();

        Ok(PartsPage {
            session: session.clone(),
            next_part_marker: parts.last().map(|p| p.part_number.get()),
            parts,
            is_truncated,
        })
    }

    fn abort_upload_now(&self, session: &UploadSession) -> Result<()> {
        let mut state = self.state();
        find_upload_mut(&mut state, session, "AbortMultipartUpload")?;
        state.uploads.remove(session.upload_id.as_str());
        Ok(())
    }
}

#[async_trait]
impl ObjectStoreClient for MemoryStore {
    async fn create_upload(
        &self,
        bucket: &BucketName,
        key: &ObjectKey,
        options: InitiateOptions,
    ) -> Result<UploadId> {
        self.delay().await;
        self.create_upload_now(bucket, key, options)
    }

    async fn upload_part(
        &self,
        session: &UploadSession,
        part_number: PartNumber,
        body: Bytes,
    ) -> Result<PartDescriptor> {
        self.delay().await;
        self.upload_part_now(session, part_number, body)
    }

    async fn complete_upload(
        &self,
        session: &UploadSession,
        parts: &[PartDescriptor],
    ) -> Result<UploadResult> {
        self.delay().await;
        self.complete_upload_now(session, parts)
    }

    async fn list_uploads(
        &self,
        bucket: &BucketName,
        prefix: &str,
        cursor: &UploadsCursor,
    ) -> Result<UploadsPage> {
        self.delay().await;
        self.list_uploads_now(bucket, prefix, cursor)
    }

    async fn list_parts(&self, session: &UploadSession, cursor: &PartsCursor) -> Result<PartsPage> {
        self.delay().await;
        self.list_parts_now(session, cursor)
    }

    async fn abort_upload(&self, session: &UploadSession) -> Result<()> {
        self.delay().await;
        self.abort_upload_now(session)
    }
}

fn ensure_bucket(state: &State, bucket: &BucketName, operation: &'static str) -> Result<()> {
    if state.buckets.contains(bucket.as_str()) {
        Ok(())
    } else {
        Err(ClientError::remote(
            operation,
            Some("NoSuchBucket"),
            format!("The specified bucket '{}' does not exist.", bucket),
        ))
    }
}

fn find_upload_mut<'a>(
    state: &'a mut State,
    session: &UploadSession,
    operation: &'static str,
) -> Result<&'a mut Upload> {
    ensure_bucket(state, &session.bucket, operation)?;
    state
        .uploads
        .get_mut(session.upload_id.as_str())
        .filter(|u| u.bucket == session.bucket.as_str() && u.key == session.key.as_str())
        .ok_or_else(|| {
            ClientError::remote(
                operation,
                Some("NoSuchUpload"),
                format!(
                    "The specified upload '{}' does not exist. It may have been aborted or completed.",
                    session.upload_id
                ),
            )
        })
}

/// Index of the first entry listed after the cursor's markers
fn start_after_markers(entries: &[&Upload], cursor: &UploadsCursor, delimiter: Option<&str>) -> usize {
    let Some(key_marker) = cursor.key_marker.as_deref().filter(|m| !m.is_empty()) else {
        return 0;
    };

    if let Some(id_marker) = cursor.upload_id_marker.as_deref().filter(|m| !m.is_empty()) {
        if let Some(pos) = entries
            .iter()
            .position(|u| u.key == key_marker && u.upload_id == id_marker)
        {
            return pos + 1;
        }
    }

    // a common prefix used as marker skips everything grouped under it
    let skips_group = delimiter.map_or(false, |d| key_marker.ends_with(d));
    entries
        .iter()
        .position(|u| {
            u.key.as_str() > key_marker && !(skips_group && u.key.starts_with(key_marker))
        })
        .unwrap_or(entries.len())
}
