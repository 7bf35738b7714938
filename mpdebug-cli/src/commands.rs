//! Execution of `multipart` subcommands

use mpdebug_client::{CancellationToken, ClientError, MultipartUploadDriver, Result};
use mpdebug_core::AbortStatus;
use tracing::{debug, warn};

use crate::cli::Multipart;
use crate::output::Output;

/// Run one subcommand and produce what it prints.
///
/// Every failure is returned except a remote failure of abort, which is
/// reported as an [`AbortStatus`] value.
pub async fn run(
    driver: &MultipartUploadDriver,
    command: Multipart,
    cancel: &CancellationToken,
) -> Result<Output> {
    debug!("Running {:?}", command);

    match command {
        Multipart::New {
            bucket,
            key,
            options,
        } => {
            let session = driver.initiate(&bucket, &key, options, cancel).await?;
            Ok(Output::Raw(session.upload_id.to_string()))
        }

        Multipart::Upload {
            session,
            part_number,
            file,
        } => {
            let mut reader = tokio::fs::File::open(&file).await?;
            let length = reader.metadata().await?.len();
            let part = driver
                .upload_part(&session, part_number, &mut reader, length, cancel)
                .await?;
            json(&part)
        }

        Multipart::Complete { session, parts } => {
            let result = driver.complete(&session, &parts, cancel).await?;
            json(&result)
        }

        Multipart::ListUploads {
            bucket,
            prefix,
            cursor,
        } => {
            let (page, _) = driver.list_uploads(&bucket, &prefix, &cursor, cancel).await?;
            json(&page)
        }

        Multipart::ListParts { session, cursor } => {
            let (page, _) = driver.list_parts(&session, &cursor, cancel).await?;
            json(&page)
        }

        Multipart::Abort { session } => {
            let status = match driver.abort(&session, cancel).await {
                Ok(()) => AbortStatus::succeeded(),
                Err(e) if e.is_remote() => {
                    warn!("Abort of {} failed: {}", session.upload_id, e);
                    AbortStatus::failed(e.to_string())
                }
                Err(e) => return Err(e),
            };
            json(&status)
        }
    }
}

fn json<T: serde::Serialize>(value: &T) -> Result<Output> {
    Output::json(value).map_err(|e| ClientError::Core(e.into()))
}
