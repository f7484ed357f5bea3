use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use bytes::Bytes;
use citibike_core::{ArchiveDescriptor, LayoutKind};
use citibike_fetch::{
    ByteStream, CacheManager, Error, FetchPolicy, HttpClient, HttpError, HttpResponse,
};
use futures_util::StreamExt;
use sha2::{Digest, Sha256};
use tempfile::tempdir;

#[derive(Clone)]
enum Reply {
    Body(Vec<u8>),
    /// Body plus a Content-Length that disagrees with it.
    Truncated(Vec<u8>, u64),
    Status(u16),
    Transport,
}

/// Scripted in-memory client. Replies are consumed in order; the last one
/// repeats once the script runs dry.
struct MockClient {
    calls: AtomicUsize,
    script: std::sync::Mutex<VecDeque<Reply>>,
    delay: Duration,
}

impl MockClient {
    fn new(script: Vec<Reply>) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            script: std::sync::Mutex::new(script.into()),
            delay: Duration::ZERO,
        }
    }

    fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn next_reply(&self) -> Reply {
        let mut script = self.script.lock().unwrap();
        if script.len() > 1 {
            script.pop_front().unwrap()
        } else {
            script.front().cloned().expect("empty mock script")
        }
    }
}

impl HttpClient for MockClient {
    async fn get(&self, _url: &str) -> Result<HttpResponse, HttpError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let (length, body): (Option<u64>, Vec<u8>) = match self.next_reply() {
            Reply::Body(b) => (Some(b.len() as u64), b),
            Reply::Truncated(b, len) => (Some(len), b),
            Reply::Status(status) => {
                return Err(HttpError {
                    status: Some(status),
                    message: "mock".into(),
                });
            }
            Reply::Transport => return Err(HttpError::transport("connection reset")),
        };
        let body: ByteStream = futures_util::stream::iter(
            body.chunks(3)
                .map(|c| Ok(Bytes::copy_from_slice(c)))
                .collect::<Vec<_>>(),
        )
        .boxed();
        Ok(HttpResponse {
            content_length: length,
            body,
        })
    }
}

fn descriptor() -> ArchiveDescriptor {
    ArchiveDescriptor {
        kind: LayoutKind::Monthly,
        year: 2024,
        months: vec![6],
        expected_size: None,
        checksum: None,
    }
}

fn manager(client: MockClient, dir: &std::path::Path) -> CacheManager<MockClient> {
    CacheManager::new(client, dir, "http://mock.test")
        .with_policy(FetchPolicy::immediate(3))
}

#[tokio::test]
async fn ensure_local_is_idempotent() {
    let dir = tempdir().unwrap();
    let mgr = manager(MockClient::new(vec![Reply::Body(b"zipbytes".to_vec())]), dir.path());
    let d = descriptor();

    let first = mgr.ensure_local(&d).await.unwrap();
    let second = mgr.ensure_local(&d).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(mgr.client().calls(), 1, "second call must be a pure local hit");
    assert_eq!(std::fs::read(&first).unwrap(), b"zipbytes");
}

#[tokio::test]
async fn failed_download_leaves_nothing_visible() {
    let dir = tempdir().unwrap();
    let mgr = manager(MockClient::new(vec![Reply::Transport]), dir.path());
    let d = descriptor();

    let err = mgr.ensure_local(&d).await.unwrap_err();
    assert!(matches!(err, Error::Download { attempts: 4, .. }), "{err}");
    assert_eq!(mgr.client().calls(), 4, "initial attempt plus three retries");

    let leftovers: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
    assert!(leftovers.is_empty(), "no entry or staging file may remain");
}

#[tokio::test]
async fn transient_failure_is_retried() {
    let dir = tempdir().unwrap();
    let script = vec![
        Reply::Transport,
        Reply::Status(503),
        Reply::Body(b"eventually".to_vec()),
    ];
    let mgr = manager(MockClient::new(script), dir.path());

    let path = mgr.ensure_local(&descriptor()).await.unwrap();
    assert_eq!(std::fs::read(path).unwrap(), b"eventually");
    assert_eq!(mgr.client().calls(), 3);
}

#[tokio::test]
async fn client_error_is_not_retried() {
    let dir = tempdir().unwrap();
    let mgr = manager(MockClient::new(vec![Reply::Status(404)]), dir.path());

    let err = mgr.ensure_local(&descriptor()).await.unwrap_err();
    assert!(matches!(
        err,
        Error::Download {
            attempts: 1,
            source: HttpError {
                status: Some(404),
                ..
            },
            ..
        }
    ));
    assert_eq!(mgr.client().calls(), 1);
}

#[tokio::test]
async fn truncated_body_is_retried() {
    let dir = tempdir().unwrap();
    let script = vec![
        Reply::Truncated(b"abc".to_vec(), 99),
        Reply::Body(b"complete".to_vec()),
    ];
    let mgr = manager(MockClient::new(script), dir.path());

    let path = mgr.ensure_local(&descriptor()).await.unwrap();
    assert_eq!(std::fs::read(path).unwrap(), b"complete");
    assert_eq!(mgr.client().calls(), 2);
}

#[tokio::test]
async fn checksum_mismatch_redownloads_once_then_fails() {
    let dir = tempdir().unwrap();
    let mut d = descriptor();
    d.checksum = Some(Sha256::digest(b"good").into());

    let mgr = manager(MockClient::new(vec![Reply::Body(b"bad!".to_vec())]), dir.path());
    let err = mgr.ensure_local(&d).await.unwrap_err();
    assert!(matches!(err, Error::Integrity { .. }), "{err}");
    assert_eq!(mgr.client().calls(), 2, "exactly one automatic re-download");
    assert!(!mgr.is_cached(&d));
}

#[tokio::test]
async fn checksum_mismatch_recovers_on_redownload() {
    let dir = tempdir().unwrap();
    let mut d = descriptor();
    d.checksum = Some(Sha256::digest(b"good").into());

    let script = vec![Reply::Body(b"bad!".to_vec()), Reply::Body(b"good".to_vec())];
    let mgr = manager(MockClient::new(script), dir.path());

    let path = mgr.ensure_local(&d).await.unwrap();
    assert_eq!(std::fs::read(path).unwrap(), b"good");
    assert!(mgr.is_cached(&d));
}

#[tokio::test]
async fn wrong_sized_entry_is_refetched() {
    let dir = tempdir().unwrap();
    let mut d = descriptor();
    d.expected_size = Some(8);

    let mgr = manager(MockClient::new(vec![Reply::Body(b"8bytes!!".to_vec())]), dir.path());
    std::fs::create_dir_all(dir.path()).unwrap();
    std::fs::write(mgr.entry_path(&d), b"stale").unwrap();
    assert!(!mgr.is_cached(&d));

    let path = mgr.ensure_local(&d).await.unwrap();
    assert_eq!(std::fs::read(path).unwrap(), b"8bytes!!");
    assert_eq!(mgr.client().calls(), 1);
}

#[tokio::test]
async fn concurrent_calls_for_same_entry_coalesce() {
    let dir = tempdir().unwrap();
    let client = MockClient::new(vec![Reply::Body(b"shared".to_vec())])
        .with_delay(Duration::from_millis(50));
    let mgr = Arc::new(manager(client, dir.path()));
    let d = descriptor();

    let tasks: Vec<_> = (0..4)
        .map(|_| {
            let mgr = Arc::clone(&mgr);
            let d = d.clone();
            tokio::spawn(async move { mgr.ensure_local(&d).await })
        })
        .collect();
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    assert_eq!(mgr.client().calls(), 1, "one transfer for four callers");
}

#[tokio::test]
async fn refresh_replaces_a_valid_entry() {
    let dir = tempdir().unwrap();
    let script = vec![Reply::Body(b"v1".to_vec()), Reply::Body(b"v2".to_vec())];
    let mgr = manager(MockClient::new(script), dir.path());
    let d = descriptor();

    let path = mgr.ensure_local(&d).await.unwrap();
    assert_eq!(std::fs::read(&path).unwrap(), b"v1");

    mgr.refresh(&d).await.unwrap();
    assert_eq!(std::fs::read(&path).unwrap(), b"v2");
    assert_eq!(mgr.client().calls(), 2);
}

#[tokio::test]
async fn purge_reports_then_deletes() {
    let dir = tempdir().unwrap();
    let mgr = manager(MockClient::new(vec![Reply::Body(b"archive".to_vec())]), dir.path());
    mgr.ensure_local(&descriptor()).await.unwrap();

    let dry = mgr.purge(true).unwrap();
    assert_eq!(dry.matched_files, 1);
    assert_eq!(dry.deleted_files, 0);
    assert_eq!(dry.total_bytes, 7);
    assert!(dir.path().exists());

    let real = mgr.purge(false).unwrap();
    assert_eq!(real.deleted_files, 1);
    assert!(!mgr.cache_dir().exists());
}
