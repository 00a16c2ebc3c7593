//! Disk tier: a local, durable, content-addressed store
//!
//! ## Layout
//!
//! ```text
//! <root>/
//!   cas/<hash>    raw blobs
//!   ac/<hash>     action-result records
//!   tmp/<uuid>    in-flight writes
//! ```
//!
//! Every write lands in `tmp/` first and is renamed into its namespace once
//! complete. `tmp/` shares the filesystem with the namespaces, so the rename
//! is atomic and readers never observe a partially written blob.
//!
//! Several stores (and processes) may share one root. Opening a store only
//! sweeps temporaries older than [`STALE_TEMP_AGE`], so writes still in
//! flight in another store survive.

use crate::digest::Digest;
use crate::error::{RemoteError, Result};
use crate::store::{BlobSink, BlobSource, BlobStore, Namespace};
use async_trait::async_trait;
use sha2::{Digest as Sha2Digest, Sha256};
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{debug, instrument, warn};

const TMP_DIR: &str = "tmp";

/// Temporaries untouched for this long are treated as left behind by a
/// crashed writer
pub const STALE_TEMP_AGE: Duration = Duration::from_secs(60 * 60);

/// A temporary file that is removed on drop unless committed
#[derive(Debug)]
pub struct TempFile {
    path: PathBuf,
    armed: bool,
}

impl TempFile {
    fn new(path: PathBuf) -> Self {
        Self { path, armed: true }
    }

    /// Location of the temporary file
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for TempFile {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        // Drop cannot await; the unlink is a single metadata operation
        match std::fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Failed to remove temporary file");
            }
        }
    }
}

/// A blob store rooted at a local directory
#[derive(Debug, Clone)]
pub struct DiskBlobStore {
    root: PathBuf,
    verify_reads: bool,
}

impl DiskBlobStore {
    /// Open (or create) a store under `root`
    ///
    /// Temporaries left behind by an interrupted write are removed once
    /// they are older than [`STALE_TEMP_AGE`].
    ///
    /// # Errors
    ///
    /// Returns an error if the directory layout cannot be created.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        for dir in [Namespace::Cas.as_str(), Namespace::ActionResult.as_str(), TMP_DIR] {
            let path = root.join(dir);
            fs::create_dir_all(&path)
                .await
                .map_err(|e| RemoteError::io(e, &path, "create_dir_all"))?;
        }
        let store = Self {
            root,
            verify_reads: false,
        };
        store.sweep_temporaries(STALE_TEMP_AGE).await?;
        Ok(store)
    }

    /// Re-hash raw blobs on read; a mismatching blob is evicted and
    /// reported as absent
    #[must_use]
    pub const fn with_verification(mut self, verify_reads: bool) -> Self {
        self.verify_reads = verify_reads;
        self
    }

    /// Root directory of the store
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the stored file for `key` in `namespace`
    ///
    /// # Errors
    ///
    /// Returns an error if `key` is not a valid file name.
    pub fn path_for(&self, namespace: Namespace, key: &str) -> Result<PathBuf> {
        validate_key(key)?;
        Ok(self.root.join(namespace.as_str()).join(key))
    }

    /// A fresh, uniquely named temporary path inside the store
    #[must_use]
    pub fn temp_file(&self) -> TempFile {
        TempFile::new(
            self.root
                .join(TMP_DIR)
                .join(uuid::Uuid::new_v4().to_string()),
        )
    }

    /// Atomically move a completed temporary file into `namespace`
    ///
    /// # Errors
    ///
    /// Returns an error if the key is invalid or the rename fails; the
    /// temporary file is then removed.
    pub async fn commit(&self, mut temp: TempFile, namespace: Namespace, key: &str) -> Result<()> {
        let target = self.path_for(namespace, key)?;
        fs::rename(temp.path(), &target)
            .await
            .map_err(|e| RemoteError::io(e, &target, "rename"))?;
        temp.disarm();
        Ok(())
    }

    /// Open a stored file for reading
    ///
    /// # Errors
    ///
    /// Returns an error if the key is invalid or the file exists but
    /// cannot be opened.
    pub async fn open_blob(&self, namespace: Namespace, key: &str) -> Result<Option<fs::File>> {
        let path = self.path_for(namespace, key)?;
        match fs::File::open(&path).await {
            Ok(file) => Ok(Some(file)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(RemoteError::io(e, &path, "open")),
        }
    }

    async fn exists(&self, namespace: Namespace, key: &str) -> Result<bool> {
        let path = self.path_for(namespace, key)?;
        fs::try_exists(&path)
            .await
            .map_err(|e| RemoteError::io(e, &path, "metadata"))
    }

    async fn read_into(&self, namespace: Namespace, key: &str, out: &mut BlobSink<'_>) -> Result<bool> {
        let Some(mut file) = self.open_blob(namespace, key).await? else {
            return Ok(false);
        };
        tokio::io::copy(&mut file, out)
            .await
            .map_err(|e| RemoteError::io_no_path(e, "copy"))?;
        out.flush()
            .await
            .map_err(|e| RemoteError::io_no_path(e, "flush"))?;
        Ok(true)
    }

    async fn write_from(
        &self,
        namespace: Namespace,
        key: &str,
        length: Option<u64>,
        source: &mut BlobSource<'_>,
    ) -> Result<()> {
        validate_key(key)?;
        let temp = self.temp_file();
        let mut file = fs::File::create(temp.path())
            .await
            .map_err(|e| RemoteError::io(e, temp.path(), "create"))?;
        let copied = tokio::io::copy(source, &mut file)
            .await
            .map_err(|e| RemoteError::io(e, temp.path(), "copy"))?;
        if let Some(expected) = length
            && copied != expected
        {
            return Err(RemoteError::SizeMismatch {
                key: key.to_string(),
                expected,
                actual: copied,
            });
        }
        file.sync_all()
            .await
            .map_err(|e| RemoteError::io(e, temp.path(), "sync"))?;
        drop(file);

        self.commit(temp, namespace, key).await?;
        debug!(namespace = %namespace, key = %key, size_bytes = copied, "Stored blob on disk");
        Ok(())
    }

    /// Hash the stored blob and compare with the digest; a mismatch evicts
    /// the blob
    async fn verify(&self, digest: &Digest) -> Result<bool> {
        let Some(mut file) = self.open_blob(Namespace::Cas, digest.key()).await? else {
            return Ok(false);
        };
        let mut hasher = Sha256::new();
        let mut buf = vec![0u8; 64 * 1024];
        let mut size = 0u64;
        loop {
            let n = file
                .read(&mut buf)
                .await
                .map_err(|e| RemoteError::io_no_path(e, "read"))?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
            size += n as u64;
        }
        let hash = hex::encode(hasher.finalize());
        if hash == digest.hash && size == digest.size() {
            return Ok(true);
        }

        warn!(
            expected = %digest,
            actual_hash = %hash,
            actual_size = size,
            "Disk blob failed verification, evicting"
        );
        let path = self.path_for(Namespace::Cas, digest.key())?;
        match fs::remove_file(&path).await {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(RemoteError::io(e, &path, "remove")),
        }
        Ok(false)
    }

    async fn sweep_temporaries(&self, min_age: Duration) -> Result<()> {
        let dir = self.root.join(TMP_DIR);
        let mut entries = fs::read_dir(&dir)
            .await
            .map_err(|e| RemoteError::io(e, &dir, "read_dir"))?;
        let mut removed = 0usize;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| RemoteError::io(e, &dir, "read_dir_entry"))?
        {
            let path = entry.path();
            if !is_stale(&entry, min_age).await {
                continue;
            }
            match fs::remove_file(&path).await {
                Ok(()) => removed += 1,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Failed to remove stale temporary file");
                }
            }
        }
        if removed > 0 {
            debug!(root = %self.root.display(), removed, "Removed stale temporary files");
        }
        Ok(())
    }
}

async fn is_stale(entry: &fs::DirEntry, min_age: Duration) -> bool {
    let modified = match entry.metadata().await.and_then(|m| m.modified()) {
        Ok(modified) => modified,
        Err(e) => {
            debug!(path = %entry.path().display(), error = %e, "Cannot read temporary file age, keeping it");
            return false;
        }
    };
    // A clock set backwards yields an error here; treat the file as fresh
    SystemTime::now()
        .duration_since(modified)
        .is_ok_and(|age| age >= min_age)
}

fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(RemoteError::invalid_key(key, "key is empty"));
    }
    if key == "." || key == ".." {
        return Err(RemoteError::invalid_key(key, "key is a relative path component"));
    }
    if key.contains(['/', '\\', '\0']) {
        return Err(RemoteError::invalid_key(key, "key contains a path separator"));
    }
    Ok(())
}

#[async_trait]
impl BlobStore for DiskBlobStore {
    async fn contains(&self, digest: &Digest) -> Result<bool> {
        self.exists(Namespace::Cas, digest.key()).await
    }

    async fn contains_action_result(&self, action: &Digest) -> Result<bool> {
        self.exists(Namespace::ActionResult, action.key()).await
    }

    #[instrument(name = "disk_get", skip_all, fields(digest = %digest))]
    async fn get(&self, digest: &Digest, out: &mut BlobSink<'_>) -> Result<bool> {
        if self.verify_reads && !self.verify(digest).await? {
            return Ok(false);
        }
        self.read_into(Namespace::Cas, digest.key(), out).await
    }

    #[instrument(name = "disk_get_action_result", skip_all, fields(action = %action))]
    async fn get_action_result(&self, action: &Digest, out: &mut BlobSink<'_>) -> Result<bool> {
        self.read_into(Namespace::ActionResult, action.key(), out)
            .await
    }

    #[instrument(name = "disk_put", skip_all, fields(digest = %digest, length = length))]
    async fn put(&self, digest: &Digest, length: u64, source: &mut BlobSource<'_>) -> Result<()> {
        self.write_from(Namespace::Cas, digest.key(), Some(length), source)
            .await
    }

    #[instrument(name = "disk_put_action_result", skip_all, fields(action = %action))]
    async fn put_action_result(&self, action: &Digest, data: &[u8]) -> Result<()> {
        let mut source = data;
        self.write_from(Namespace::ActionResult, action.key(), None, &mut source)
            .await
    }

    async fn find_missing_digests(&self, digests: &[Digest]) -> Result<Vec<Digest>> {
        let mut missing = Vec::new();
        for digest in digests {
            if !self.contains(digest).await? {
                missing.push(digest.clone());
            }
        }
        Ok(missing)
    }
}
