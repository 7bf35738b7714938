//! Integration tests for the multipart upload lifecycle

use std::time::Duration;

use mpdebug_client::*;
use mpdebug_core::*;

const BUCKET: &str = "test-bucket";

fn setup() -> (MultipartUploadDriver, MemoryStore) {
    let store = MemoryStore::new().with_bucket(BUCKET).with_min_part_size(4);
    (MultipartUploadDriver::new(store.clone()), store)
}

fn bucket() -> BucketName {
    BucketName::new(BUCKET).unwrap()
}

fn key(k: &str) -> ObjectKey {
    ObjectKey::new(k).unwrap()
}

fn part(n: u32) -> PartNumber {
    PartNumber::new(n).unwrap()
}

async fn initiate(driver: &MultipartUploadDriver, k: &str) -> UploadSession {
    driver
        .initiate(&bucket(), &key(k), InitiateOptions::default(), &CancellationToken::new())
        .await
        .unwrap()
}

async fn upload(
    driver: &MultipartUploadDriver,
    session: &UploadSession,
    n: u32,
    data: &[u8],
) -> PartDescriptor {
    let mut reader = data;
    driver
        .upload_part(session, part(n), &mut reader, data.len() as u64, &CancellationToken::new())
        .await
        .unwrap()
}

#[tokio::test]
async fn initiate_then_abort_twice() {
    let (driver, store) = setup();
    let cancel = CancellationToken::new();
    let session = initiate(&driver, "videos/clip.mp4").await;

    assert_eq!(session.bucket, bucket());
    assert_eq!(session.key.as_str(), "videos/clip.mp4");
    assert!(!session.upload_id.as_str().is_empty());

    driver.abort(&session, &cancel).await.unwrap();
    assert_eq!(store.upload_count(), 0);

    let err = driver.abort(&session, &cancel).await.unwrap_err();
    assert!(err.is_remote());
    assert_eq!(err.code(), Some("NoSuchUpload"));
}

#[tokio::test]
async fn complete_in_ascending_order() {
    let (driver, store) = setup();
    let cancel = CancellationToken::new();
    let session = initiate(&driver, "data.bin").await;

    let p1 = upload(&driver, &session, 1, b"aaaa").await;
    let p2 = upload(&driver, &session, 2, b"bbbb").await;
    let p3 = upload(&driver, &session, 3, b"cc").await;

    let result = driver
        .complete(&session, &[p1, p2, p3], &cancel)
        .await
        .unwrap();
    assert_eq!(result.key, key("data.bin"));
    assert!(result.etag.ends_with("-3"));

    let object = store.object(&bucket(), &key("data.bin")).unwrap();
    assert_eq!(&object.data[..], b"aaaabbbbcc");
    assert_eq!(object.etag, result.etag);

    // the session is gone once completed
    let err = driver
        .list_parts(&session, &PartsCursor::default(), &cancel)
        .await
        .unwrap_err();
    assert_eq!(err.code(), Some("NoSuchUpload"));

    let mut reader: &[u8] = b"dddd";
    let err = driver
        .upload_part(&session, part(4), &mut reader, 4, &cancel)
        .await
        .unwrap_err();
    assert_eq!(err.code(), Some("NoSuchUpload"));
}

#[tokio::test]
async fn complete_passes_descending_order_through() {
    let (driver, store) = setup();
    let cancel = CancellationToken::new();
    let session = initiate(&driver, "reversed").await;

    let p1 = upload(&driver, &session, 1, b"aaaa").await;
    let p2 = upload(&driver, &session, 2, b"bbbb").await;

    // the driver does not reorder; the service's verdict comes back as is
    let err = driver
        .complete(&session, &[p2.clone(), p1.clone()], &cancel)
        .await
        .unwrap_err();
    assert_eq!(err.code(), Some("InvalidPartOrder"));
    assert_eq!(store.upload_count(), 1);

    driver.complete(&session, &[p1, p2], &cancel).await.unwrap();
}

#[tokio::test]
async fn complete_without_parts_is_input_error() {
    let (driver, _store) = setup();
    let session = initiate(&driver, "empty").await;

    let err = driver
        .complete(&session, &[], &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(err.is_input());
}

#[tokio::test]
async fn complete_with_parsed_arguments() {
    let (driver, store) = setup();
    let session = initiate(&driver, "from-cli").await;

    let p1 = upload(&driver, &session, 1, b"0123").await;
    let p2 = upload(&driver, &session, 2, b"45").await;

    let args = [p1.to_string(), p2.to_string()];
    let parts = parse_completion_parts(&args).unwrap();
    driver
        .complete(&session, &parts, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(&store.object(&bucket(), &key("from-cli")).unwrap().data[..], b"012345");
}

#[tokio::test]
async fn list_parts_one_at_a_time() {
    let (driver, _store) = setup();
    let cancel = CancellationToken::new();
    let session = initiate(&driver, "paged").await;
    for n in 1..=3 {
        upload(&driver, &session, n, b"part").await;
    }

    let mut cursor = PartsCursor {
        part_marker: None,
        max_parts: Some(1),
    };
    let mut seen = Vec::new();
    for call in 1..=3 {
        let (page, next) = driver.list_parts(&session, &cursor, &cancel).await.unwrap();
        assert_eq!(page.parts.len(), 1);
        seen.push(page.parts[0].part_number.get());

        match next {
            Some(next) => {
                assert!(call < 3);
                assert_eq!(next.part_marker, Some(call));
                cursor = next;
            }
            None => assert_eq!(call, 3),
        }
    }
    assert_eq!(seen, vec![1, 2, 3]);
}

#[tokio::test]
async fn concurrent_part_uploads() {
    let (driver, _store) = setup();
    let session = initiate(&driver, "parallel").await;

    let handles: Vec<_> = [2u32, 1]
        .into_iter()
        .map(|n| {
            let driver = driver.clone();
            let session = session.clone();
            tokio::spawn(async move {
                let data = vec![n as u8; 8];
                let mut reader = &data[..];
                driver
                    .upload_part(&session, part(n), &mut reader, 8, &CancellationToken::new())
                    .await
            })
        })
        .collect();

    let mut parts: Vec<PartDescriptor> = futures::future::join_all(handles)
        .await
        .into_iter()
        .map(|joined| joined.unwrap().unwrap())
        .collect();
    parts.sort_by_key(|p| p.part_number);

    let (page, _) = driver
        .list_parts(&session, &PartsCursor::default(), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(page.parts.len(), 2);
    assert_eq!(page.parts[0].descriptor(), parts[0]);
    assert_eq!(page.parts[1].descriptor(), parts[1]);
}

#[tokio::test]
async fn upload_part_checks_stream_length() {
    let (driver, _store) = setup();
    let cancel = CancellationToken::new();
    let session = initiate(&driver, "length").await;

    let mut short: &[u8] = b"abc";
    let err = driver
        .upload_part(&session, part(1), &mut short, 4, &cancel)
        .await
        .unwrap_err();
    assert!(err.is_input());

    let mut long: &[u8] = b"abcde";
    let err = driver
        .upload_part(&session, part(1), &mut long, 4, &cancel)
        .await
        .unwrap_err();
    assert!(err.is_input());

    let (page, _) = driver
        .list_parts(&session, &PartsCursor::default(), &cancel)
        .await
        .unwrap();
    assert!(page.parts.is_empty());
}

#[tokio::test]
async fn oversized_declared_length_is_input_error() {
    let (driver, _store) = setup();
    let session = initiate(&driver, "oversized").await;

    let mut reader: &[u8] = b"abc";
    let err = driver
        .upload_part(&session, part(1), &mut reader, u64::MAX, &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::Core(MpError::Input(_))));
}

#[tokio::test]
async fn abort_unknown_upload_is_structured_failure() {
    let (driver, _store) = setup();
    let session = UploadSession::new(bucket(), key("ghost"), UploadId::new("no-such-upload"));

    let status = AbortStatus::from_result(driver.abort(&session, &CancellationToken::new()).await);
    assert!(!status.status);
    assert!(!status.message.unwrap_or_default().is_empty());
}

#[tokio::test]
async fn cancelled_call_leaves_state_alone() {
    let store = MemoryStore::new()
        .with_bucket(BUCKET)
        .with_latency(Duration::from_millis(200));
    let driver = MultipartUploadDriver::new(store.clone());

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(10)).await;
        trigger.cancel();
    });

    let err = driver
        .initiate(&bucket(), &key("slow"), InitiateOptions::default(), &cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::Cancelled { operation: "initiate" }));
    assert_eq!(store.upload_count(), 0);
}

#[tokio::test]
async fn list_uploads_pages_through_markers() {
    let (driver, _store) = setup();
    let cancel = CancellationToken::new();
    for k in ["a/1", "a/2", "b/1", "c"] {
        initiate(&driver, k).await;
    }

    let mut cursor = UploadsCursor {
        max_uploads: Some(2),
        ..Default::default()
    };
    let mut keys = Vec::new();
    let mut pages = 0;
    loop {
        let (page, next) = driver
            .list_uploads(&bucket(), "", &cursor, &cancel)
            .await
            .unwrap();
        pages += 1;
        keys.extend(page.uploads.iter().map(|u| u.key.as_str().to_string()));
        match next {
            Some(next) => cursor = next,
            None => break,
        }
    }
    assert_eq!(pages, 2);
    assert_eq!(keys, vec!["a/1", "a/2", "b/1", "c"]);

    let (page, next) = driver
        .list_uploads(&bucket(), "a/", &UploadsCursor::default(), &cancel)
        .await
        .unwrap();
    assert_eq!(page.uploads.len(), 2);
    assert!(next.is_none());
}

#[tokio::test]
async fn encrypted_upload_is_recorded() {
    let (driver, store) = setup();
    let cancel = CancellationToken::new();
    let session = driver
        .initiate(&bucket(), &key("secret"), InitiateOptions { encrypt: true }, &cancel)
        .await
        .unwrap();
    let p = upload(&driver, &session, 1, b"x").await;
    driver.complete(&session, &[p], &cancel).await.unwrap();

    assert!(store.object(&bucket(), &key("secret")).unwrap().encrypted);
}
