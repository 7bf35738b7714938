//! S3-compatible object store backed by the AWS SDK

use async_trait::async_trait;
use aws_sdk_s3::config::{BehaviorVersion, Builder as S3ConfigBuilder, Credentials, Region};
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_s3::primitives::{ByteStream, DateTime as SdkDateTime};
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart, ServerSideEncryption};
use aws_sdk_s3::Client;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use mpdebug_core::*;
use tracing::{debug, warn};

use crate::{ClientError, ObjectStoreClient, Result};

/// Object store reached over the S3 API
#[derive(Clone, Debug)]
pub struct S3Store {
    client: Client,
    endpoint: String,
}

impl S3Store {
    /// Build a store from resolved connection settings
    pub fn new(config: &ConnectionConfig) -> Result<Self> {
        config.validate()?;
        let endpoint = config.endpoint_url()?;

        let credentials = Credentials::new(
            &config.access_key,
            &config.secret_key,
            None,
            None,
            "mpdebug",
        );
        let s3_config = S3ConfigBuilder::new()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .endpoint_url(&endpoint)
            .credentials_provider(credentials)
            // S3-compatible servers rarely have per-bucket DNS
            .force_path_style(true)
            .build();

        debug!("S3 store for {} (region {})", endpoint, config.region);

        Ok(S3Store {
            client: Client::from_conf(s3_config),
            endpoint,
        })
    }

    /// Wrap an already configured SDK client
    pub fn from_client(client: Client, endpoint: impl Into<String>) -> Self {
        S3Store {
            client,
            endpoint: endpoint.into(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl ObjectStoreClient for S3Store {
    async fn create_upload(
        &self,
        bucket: &BucketName,
        key: &ObjectKey,
        options: InitiateOptions,
    ) -> Result<UploadId> {
        const OP: &str = "CreateMultipartUpload";
        debug!("{}: bucket={}, key={}, encrypt={}", OP, bucket, key, options.encrypt);

        let output = self
            .client
            .create_multipart_upload()
            .bucket(bucket.as_str())
            .key(key.as_str())
            .set_server_side_encryption(encryption(options))
            .send()
            .await
            .map_err(|e| remote_error(OP, e))?;

        upload_id_from(OP, output.upload_id())
    }

    async fn upload_part(
        &self,
        session: &UploadSession,
        part_number: PartNumber,
        body: Bytes,
    ) -> Result<PartDescriptor> {
        const OP: &str = "UploadPart";
        debug!(
            "{}: bucket={}, key={}, upload_id={}, part={}, size={}",
            OP,
            session.bucket,
            session.key,
            session.upload_id,
            part_number,
            body.len()
        );

        let output = self
            .client
            .upload_part()
            .bucket(session.bucket.as_str())
            .key(session.key.as_str())
            .upload_id(session.upload_id.as_str())
            .part_number(part_number.as_i32())
            .content_length(body.len() as i64)
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(|e| remote_error(OP, e))?;

        let etag = output.e_tag().ok_or_else(|| missing(OP, "ETag"))?;
        Ok(PartDescriptor::new(part_number, etag))
    }

    async fn complete_upload(
        &self,
        session: &UploadSession,
        parts: &[PartDescriptor],
    ) -> Result<UploadResult> {
        const OP: &str = "CompleteMultipartUpload";
        debug!(
            "{}: bucket={}, key={}, upload_id={}, parts={}",
            OP,
            session.bucket,
            session.key,
            session.upload_id,
            parts.len()
        );

        let completed: Vec<CompletedPart> = parts
            .iter()
            .map(|part| {
                CompletedPart::builder()
                    .part_number(part.part_number.as_i32())
                    .e_tag(&part.etag)
                    .build()
            })
            .collect();
        let upload = CompletedMultipartUpload::builder()
            .set_parts(Some(completed))
            .build();

        let output = self
            .client
            .complete_multipart_upload()
            .bucket(session.bucket.as_str())
            .key(session.key.as_str())
            .upload_id(session.upload_id.as_str())
            .multipart_upload(upload)
            .send()
            .await
            .map_err(|e| remote_error(OP, e))?;

        Ok(UploadResult {
            bucket: session.bucket.clone(),
            key: session.key.clone(),
            etag: output.e_tag().unwrap_or_default().to_string(),
            location: output.location().map(str::to_owned),
            version_id: output.version_id().map(str::to_owned),
        })
    }

    async fn list_uploads(
        &self,
        bucket: &BucketName,
        prefix: &str,
        cursor: &UploadsCursor,
    ) -> Result<UploadsPage> {
        const OP: &str = "ListMultipartUploads";
        debug!("{}: bucket={}, prefix={:?}, cursor={:?}", OP, bucket, prefix, cursor);

        let mut request = self.client.list_multipart_uploads().bucket(bucket.as_str());
        if !prefix.is_empty() {
            request = request.prefix(prefix);
        }
        if let Some(marker) = &cursor.key_marker {
            request = request.key_marker(marker);
        }
        if let Some(marker) = &cursor.upload_id_marker {
            request = request.upload_id_marker(marker);
        }
        if let Some(delimiter) = &cursor.delimiter {
            request = request.delimiter(delimiter);
        }
        if let Some(max) = cursor.max_uploads {
            request = request.max_uploads(clamp_i32(max));
        }

        let output = request.send().await.map_err(|e| remote_error(OP, e))?;

        let uploads = output
            .uploads()
            .iter()
            .filter_map(|upload| {
                let key = upload.key().and_then(|k| ObjectKey::new(k).ok());
                let upload_id = upload.upload_id().map(UploadId::new);
                match (key, upload_id) {
                    (Some(key), Some(upload_id)) => Some(UploadSummary {
                        key,
                        upload_id,
                        initiated: upload.initiated().and_then(to_utc),
                    }),
                    _ => {
                        warn!("{}: skipping upload entry without key or id", OP);
                        None
                    }
                }
            })
            .collect();

        Ok(UploadsPage {
            bucket: bucket.clone(),
            prefix: prefix.to_string(),
            delimiter: cursor.delimiter.clone(),
            uploads,
            common_prefixes: output
                .common_prefixes()
                .iter()
                .filter_map(|cp| cp.prefix().map(str::to_owned))
                .collect(),
            is_truncated: output.is_truncated().unwrap_or(false),
            next_key_marker: output.next_key_marker().map(str::to_owned),
            next_upload_id_marker: output.next_upload_id_marker().map(str::to_owned),
        })
    }

    async fn list_parts(&self, session: &UploadSession, cursor: &PartsCursor) -> Result<PartsPage> {
        const OP: &str = "ListParts";
        debug!(
            "{}: bucket={}, key={}, upload_id={}, cursor={:?}",
            OP, session.bucket, session.key, session.upload_id, cursor
        );

        let mut request = self
            .client
            .list_parts()
            .bucket(session.bucket.as_str())
            .key(session.key.as_str())
            .upload_id(session.upload_id.as_str());
        if let Some(marker) = cursor.part_marker {
            request = request.part_number_marker(marker.to_string());
        }
        if let Some(max) = cursor.max_parts {
            request = request.max_parts(clamp_i32(max));
        }

        let output = request.send().await.map_err(|e| remote_error(OP, e))?;

        let mut parts = Vec::with_capacity(output.parts().len());
        for part in output.parts() {
            let number = part
                .part_number()
                .and_then(|n| u32::try_from(n).ok())
                .ok_or_else(|| missing(OP, "PartNumber"))?;
            parts.push(ListedPart {
                part_number: PartNumber::new(number)?,
                etag: part.e_tag().unwrap_or_default().to_string(),
                size: part.size().and_then(|s| u64::try_from(s).ok()).unwrap_or(0),
                last_modified: part.last_modified().and_then(to_utc),
            });
        }

        Ok(PartsPage {
            session: session.clone(),
            parts,
            is_truncated: output.is_truncated().unwrap_or(false),
            next_part_marker: output
                .next_part_number_marker()
                .and_then(|m| m.parse().ok()),
        })
    }

    async fn abort_upload(&self, session: &UploadSession) -> Result<()> {
        const OP: &str = "AbortMultipartUpload";
        debug!(
            "{}: bucket={}, key={}, upload_id={}",
            OP, session.bucket, session.key, session.upload_id
        );

        self.client
            .abort_multipart_upload()
            .bucket(session.bucket.as_str())
            .key(session.key.as_str())
            .upload_id(session.upload_id.as_str())
            .send()
            .await
            .map_err(|e| remote_error(OP, e))?;
        Ok(())
    }
}

/// Flatten an SDK failure, keeping the service error code when there is one
fn remote_error<E, R>(operation: &'static str, err: SdkError<E, R>) -> ClientError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
    R: std::fmt::Debug + Send + Sync + 'static,
{
    let service = err.as_service_error();
    let code = service.and_then(|e| e.code());
    let message = match service.and_then(|e| e.message()) {
        Some(message) => message.to_string(),
        None => DisplayErrorContext(&err).to_string(),
    };
    ClientError::remote(operation, code, message)
}

fn encryption(options: InitiateOptions) -> Option<ServerSideEncryption> {
    options.encrypt.then_some(ServerSideEncryption::Aes256)
}

fn upload_id_from(operation: &'static str, id: Option<&str>) -> Result<UploadId> {
    id.filter(|id| !id.is_empty())
        .map(UploadId::new)
        .ok_or_else(|| missing(operation, "UploadId"))
}

fn missing(operation: &'static str, field: &str) -> ClientError {
    ClientError::InvalidResponse {
        operation,
        message: format!("no {} in response", field),
    }
}

fn clamp_i32(n: u32) -> i32 {
    i32::try_from(n).unwrap_or(i32::MAX)
}

fn to_utc(t: &SdkDateTime) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(t.secs(), t.subsec_nanos())
}
