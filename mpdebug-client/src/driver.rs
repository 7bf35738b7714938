//! Multipart upload sequencing

use std::future::Future;
use std::sync::Arc;

use bytes::Bytes;
use mpdebug_core::*;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::{ClientError, ObjectStoreClient, Result};

/// Drives the multipart lifecycle against one object store.
///
/// Holds nothing but the store: sessions are threaded through by the
/// caller, and every call is a single remote request. Each call takes a
/// cancellation token; a cancelled call drops the in-flight request and
/// returns [`ClientError::Cancelled`], leaving the remote state for the
/// caller to reconcile by listing.
#[derive(Clone)]
pub struct MultipartUploadDriver {
    client: Arc<dyn ObjectStoreClient>,
}

impl MultipartUploadDriver {
    pub fn new<C>(client: C) -> Self
    where
        C: ObjectStoreClient + 'static,
    {
        Self::from_arc(Arc::new(client))
    }

    pub fn from_arc(client: Arc<dyn ObjectStoreClient>) -> Self {
        MultipartUploadDriver { client }
    }

    /// Start a new upload
    pub async fn initiate(
        &self,
        bucket: &BucketName,
        key: &ObjectKey,
        options: InitiateOptions,
        cancel: &CancellationToken,
    ) -> Result<UploadSession> {
        let upload_id = cancellable(
            "initiate",
            cancel,
            self.client.create_upload(bucket, key, options),
        )
        .await?;

        info!("Initiated upload {} for {}/{}", upload_id, bucket, key);
        Ok(UploadSession::new(bucket.clone(), key.clone(), upload_id))
    }

    /// Upload `length` bytes read from `reader` as part `part_number`.
    ///
    /// The stream must hold exactly `length` bytes. Parts of one session may
    /// be uploaded concurrently and in any order.
    pub async fn upload_part<R>(
        &self,
        session: &UploadSession,
        part_number: PartNumber,
        reader: &mut R,
        length: u64,
        cancel: &CancellationToken,
    ) -> Result<PartDescriptor>
    where
        R: AsyncRead + Unpin + Send + ?Sized,
    {
        let body = cancellable("upload_part", cancel, read_exact_body(reader, length)).await?;

        debug!(
            "Uploading part {} ({} bytes) of {}",
            part_number,
            body.len(),
            session.upload_id
        );
        cancellable(
            "upload_part",
            cancel,
            self.client.upload_part(session, part_number, body),
        )
        .await
    }

    /// Finish the upload from `parts`, sent in exactly the order given
    pub async fn complete(
        &self,
        session: &UploadSession,
        parts: &[PartDescriptor],
        cancel: &CancellationToken,
    ) -> Result<UploadResult> {
        if parts.is_empty() {
            return Err(MpError::Input("at least one part is needed to complete an upload".to_string()).into());
        }

        let result = cancellable(
            "complete",
            cancel,
            self.client.complete_upload(session, parts),
        )
        .await?;

        info!(
            "Completed upload {} of {}/{} from {} parts",
            session.upload_id,
            session.bucket,
            session.key,
            parts.len()
        );
        Ok(result)
    }

    /// Fetch one page of in-progress uploads. The cursor is `Some` while
    /// more pages remain.
    pub async fn list_uploads(
        &self,
        bucket: &BucketName,
        prefix: &str,
        cursor: &UploadsCursor,
        cancel: &CancellationToken,
    ) -> Result<(UploadsPage, Option<UploadsCursor>)> {
        let page = cancellable(
            "list_uploads",
            cancel,
            self.client.list_uploads(bucket, prefix, cursor),
        )
        .await?;

        let next = page.next_cursor(cursor);
        debug!(
            "Listed {} uploads, {} prefixes in {} (more: {})",
            page.uploads.len(),
            page.common_prefixes.len(),
            bucket,
            next.is_some()
        );
        Ok((page, next))
    }

    /// Fetch one page of a session's parts
    pub async fn list_parts(
        &self,
        session: &UploadSession,
        cursor: &PartsCursor,
        cancel: &CancellationToken,
    ) -> Result<(PartsPage, Option<PartsCursor>)> {
        let page = cancellable("list_parts", cancel, self.client.list_parts(session, cursor)).await?;

        let next = page.next_cursor(cursor);
        debug!(
            "Listed {} parts of {} (more: {})",
            page.parts.len(),
            session.upload_id,
            next.is_some()
        );
        Ok((page, next))
    }

    /// Abort the upload. A second abort, or an abort after completion, is
    /// reported as the service's error.
    pub async fn abort(&self, session: &UploadSession, cancel: &CancellationToken) -> Result<()> {
        cancellable("abort", cancel, self.client.abort_upload(session)).await?;

        info!("Aborted upload {} of {}/{}", session.upload_id, session.bucket, session.key);
        Ok(())
    }
}

const MAX_PREALLOCATION: usize = 8 * 1024 * 1024;

async fn cancellable<T, F>(operation: &'static str, cancel: &CancellationToken, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(ClientError::Cancelled { operation }),
        result = fut => result,
    }
}

/// Read exactly `length` bytes; a shorter or longer stream is an input error
async fn read_exact_body<R>(reader: &mut R, length: u64) -> Result<Bytes>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let capacity = usize::try_from(length)
        .map_err(|_| MpError::Input(format!("part length {} does not fit in memory", length)))?;

    // the declared length is unverified until read; grow past this as bytes arrive
    let mut body = Vec::with_capacity(capacity.min(MAX_PREALLOCATION));
    (&mut *reader).take(length).read_to_end(&mut body).await?;
    if (body.len() as u64) < length {
        return Err(MpError::Input(format!(
            "stream ended after {} of {} bytes",
            body.len(),
            length
        ))
        .into());
    }

    let mut probe = [0u8; 1];
    if reader.read(&mut probe).await? > 0 {
        return Err(MpError::Input(format!("stream holds more than {} bytes", length)).into());
    }

    Ok(Bytes::from(body))
}
