//! Integration tests for the combined disk and remote store
//!
//! The remote tier is an in-process store wrapped to count calls and to
//! inject failures.

use actcache_remote::{
    ActionResult, BlobSink, BlobSource, BlobStore, CombinedBlobStore, Digest, DiskBlobStore,
    MemoryBlobStore, RemoteError, Result, fetch_action_result, store_action_result,
};
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tempfile::TempDir;

/// Remote tier that counts reads and can be switched to fail
#[derive(Default)]
struct InstrumentedRemote {
    inner: MemoryBlobStore,
    gets: AtomicUsize,
    puts: AtomicUsize,
    failing: AtomicBool,
}

impl InstrumentedRemote {
    fn check(&self) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            Err(RemoteError::transport("connection reset"))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl BlobStore for InstrumentedRemote {
    async fn contains(&self, digest: &Digest) -> Result<bool> {
        self.check()?;
        self.inner.contains(digest).await
    }

    async fn contains_action_result(&self, action: &Digest) -> Result<bool> {
        self.check()?;
        self.inner.contains_action_result(action).await
    }

    async fn get(&self, digest: &Digest, out: &mut BlobSink<'_>) -> Result<bool> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        self.inner.get(digest, out).await
    }

    async fn get_action_result(&self, action: &Digest, out: &mut BlobSink<'_>) -> Result<bool> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        self.inner.get_action_result(action, out).await
    }

    async fn put(&self, digest: &Digest, length: u64, source: &mut BlobSource<'_>) -> Result<()> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        self.inner.put(digest, length, source).await
    }

    async fn put_action_result(&self, action: &Digest, data: &[u8]) -> Result<()> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        self.inner.put_action_result(action, data).await
    }

    async fn find_missing_digests(&self, digests: &[Digest]) -> Result<Vec<Digest>> {
        self.check()?;
        self.inner.find_missing_digests(digests).await
    }
}

async fn setup(tmp: &TempDir) -> (CombinedBlobStore, Arc<InstrumentedRemote>) {
    let disk = DiskBlobStore::open(tmp.path()).await.unwrap();
    let remote = Arc::new(InstrumentedRemote::default());
    let store = CombinedBlobStore::new(disk, Arc::clone(&remote) as Arc<dyn BlobStore>);
    (store, remote)
}

fn temp_files(root: &Path) -> usize {
    std::fs::read_dir(root.join("tmp")).unwrap().count()
}

#[tokio::test]
async fn second_read_is_served_from_disk() {
    let tmp = TempDir::new().unwrap();
    let (store, remote) = setup(&tmp).await;
    let digest = Digest::from_content(b"hello");
    remote
        .inner
        .put(&digest, 5, &mut &b"hello"[..])
        .await
        .unwrap();

    let mut first = Vec::new();
    assert!(store.get(&digest, &mut first).await.unwrap());
    assert_eq!(first, b"hello");
    assert_eq!(remote.gets.load(Ordering::SeqCst), 1);

    let mut second = Vec::new();
    assert!(store.get(&digest, &mut second).await.unwrap());
    assert_eq!(second, b"hello");
    assert_eq!(remote.gets.load(Ordering::SeqCst), 1);
    assert!(store.contains(&digest).await.unwrap());
}

#[tokio::test]
async fn remote_miss_is_not_found_and_leaves_no_temporaries() {
    let tmp = TempDir::new().unwrap();
    let (store, remote) = setup(&tmp).await;
    let digest = Digest::from_content(b"nowhere");

    let mut out = Vec::new();
    assert!(!store.get(&digest, &mut out).await.unwrap());
    assert!(out.is_empty());
    assert!(!store.contains(&digest).await.unwrap());
    assert_eq!(remote.gets.load(Ordering::SeqCst), 1);
    assert_eq!(temp_files(tmp.path()), 0);
}

#[tokio::test]
async fn remote_failure_propagates_and_leaves_no_temporaries() {
    let tmp = TempDir::new().unwrap();
    let (store, remote) = setup(&tmp).await;
    remote.failing.store(true, Ordering::SeqCst);

    let mut out = Vec::new();
    let err = store
        .get(&Digest::from_content(b"x"), &mut out)
        .await
        .unwrap_err();
    assert!(matches!(err, RemoteError::Transport { .. }));
    assert_eq!(temp_files(tmp.path()), 0);
}

#[tokio::test]
async fn failed_remote_upload_is_reported() {
    let tmp = TempDir::new().unwrap();
    let (store, remote) = setup(&tmp).await;
    remote.failing.store(true, Ordering::SeqCst);
    let digest = Digest::from_content(b"data");

    let err = store.put(&digest, 4, &mut &b"data"[..]).await.unwrap_err();
    assert!(matches!(err, RemoteError::Transport { .. }));
    assert_eq!(remote.puts.load(Ordering::SeqCst), 1);
    // The disk tier accepted the write before the upload failed
    assert!(store.disk().contains(&digest).await.unwrap());
}

#[tokio::test]
async fn failed_disk_write_skips_the_remote_tier() {
    let tmp = TempDir::new().unwrap();
    let (store, remote) = setup(&tmp).await;
    let digest = Digest::from_content(b"data");

    let err = store.put(&digest, 99, &mut &b"data"[..]).await.unwrap_err();
    assert!(matches!(err, RemoteError::SizeMismatch { .. }));
    assert_eq!(remote.puts.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn concurrent_reads_of_a_missing_blob_both_succeed() {
    let tmp = TempDir::new().unwrap();
    let (store, remote) = setup(&tmp).await;
    let content = vec![7u8; 256 * 1024];
    let digest = Digest::from_content(&content);
    remote
        .inner
        .put(&digest, content.len() as u64, &mut &content[..])
        .await
        .unwrap();

    let mut a = Vec::new();
    let mut b = Vec::new();
    let (ra, rb) = tokio::join!(store.get(&digest, &mut a), store.get(&digest, &mut b));
    assert!(ra.unwrap());
    assert!(rb.unwrap());
    assert_eq!(a, content);
    assert_eq!(b, content);
    assert_eq!(temp_files(tmp.path()), 0);
}

#[tokio::test]
async fn action_results_round_trip_through_both_tiers() {
    let tmp = TempDir::new().unwrap();
    let (store, remote) = setup(&tmp).await;
    let action = Digest::from_content(b"cc -c a.c");
    let result = ActionResult {
        exit_code: 1,
        ..ActionResult::default()
    };

    store_action_result(&store, &action, &result).await.unwrap();
    assert!(remote.inner.contains_action_result(&action).await.unwrap());

    let fetched = fetch_action_result(&store, &action).await.unwrap().unwrap();
    assert!(!fetched.success());
    assert_eq!(remote.gets.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn fresh_disk_tier_backfills_action_results() {
    let remote = Arc::new(InstrumentedRemote::default());
    let action = Digest::from_content(b"link app");
    store_action_result(&*remote, &action, &ActionResult::default())
        .await
        .unwrap();

    let tmp = TempDir::new().unwrap();
    let disk = DiskBlobStore::open(tmp.path()).await.unwrap();
    let store = CombinedBlobStore::new(disk, Arc::clone(&remote) as Arc<dyn BlobStore>);

    assert!(fetch_action_result(&store, &action).await.unwrap().is_some());
    assert!(fetch_action_result(&store, &action).await.unwrap().is_some());
    assert_eq!(remote.gets.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn corrupt_disk_copy_is_replaced_from_remote() {
    let tmp = TempDir::new().unwrap();
    let disk = DiskBlobStore::open(tmp.path())
        .await
        .unwrap()
        .with_verification(true);
    let remote = Arc::new(InstrumentedRemote::default());
    let store = CombinedBlobStore::new(disk, Arc::clone(&remote) as Arc<dyn BlobStore>);

    let digest = Digest::from_content(b"hello");
    store.put(&digest, 5, &mut &b"hello"[..]).await.unwrap();
    let path = store
        .disk()
        .path_for(actcache_remote::Namespace::Cas, digest.key())
        .unwrap();
    std::fs::write(&path, b"jello").unwrap();

    let mut out = Vec::new();
    assert!(store.get(&digest, &mut out).await.unwrap());
    assert_eq!(out, b"hello");
    assert_eq!(remote.gets.load(Ordering::SeqCst), 1);
    assert_eq!(std::fs::read(&path).unwrap(), b"hello");
    assert_eq!(temp_files(tmp.path()), 0);
}
