//! The object-store capability the driver sequences

use async_trait::async_trait;
use bytes::Bytes;
use mpdebug_core::*;

use crate::Result;

/// Remote multipart-upload operations, one request each.
///
/// Implementations keep no per-upload state; everything a call needs comes
/// in through its arguments.
#[async_trait]
pub trait ObjectStoreClient: Send + Sync {
    /// Start an upload and return the service-assigned id
    async fn create_upload(
        &self,
        bucket: &BucketName,
        key: &ObjectKey,
        options: InitiateOptions,
    ) -> Result<UploadId>;

    /// Send one part. `body` holds the whole part.
    async fn upload_part(
        &self,
        session: &UploadSession,
        part_number: PartNumber,
        body: Bytes,
    ) -> Result<PartDescriptor>;

    /// Assemble the upload from `parts`, in the order given
    async fn complete_upload(
        &self,
        session: &UploadSession,
        parts: &[PartDescriptor],
    ) -> Result<UploadResult>;

    /// One page of in-progress uploads in `bucket`
    async fn list_uploads(
        &self,
        bucket: &BucketName,
        prefix: &str,
        cursor: &UploadsCursor,
    ) -> Result<UploadsPage>;

    /// One page of the parts uploaded so far
    async fn list_parts(&self, session: &UploadSession, cursor: &PartsCursor) -> Result<PartsPage>;

    async fn abort_upload(&self, session: &UploadSession) -> Result<()>;
}
