//! Combined disk and remote blob store
//!
//! Reads prefer the disk tier. A disk miss streams the remote copy into a
//! temporary file inside the disk tier, renames it into place, and then
//! serves the caller from disk, so the next read never leaves the machine.
//! Writes go to both tiers and succeed only when both accept them.
//!
//! Concurrent reads of the same missing blob are not coalesced: each one
//! fetches from the remote tier into its own temporary file. The renames
//! are atomic, so the last one wins and no reader sees a partial blob.

use crate::digest::Digest;
use crate::disk::DiskBlobStore;
use crate::error::{RemoteError, Result};
use crate::store::{BlobSink, BlobSource, BlobStore, Namespace};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, instrument};

const STORE_NAME: &str = "CombinedBlobStore";

/// A disk tier in front of a remote tier
#[derive(Clone)]
pub struct CombinedBlobStore {
    disk: DiskBlobStore,
    remote: Arc<dyn BlobStore>,
}

impl std::fmt::Debug for CombinedBlobStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CombinedBlobStore")
            .field("disk", &self.disk)
            .finish_non_exhaustive()
    }
}

impl CombinedBlobStore {
    /// Combine a disk tier with a remote tier
    #[must_use]
    pub fn new(disk: DiskBlobStore, remote: Arc<dyn BlobStore>) -> Self {
        Self { disk, remote }
    }

    /// The disk tier
    #[must_use]
    pub const fn disk(&self) -> &DiskBlobStore {
        &self.disk
    }

    /// Fetch from the remote tier into the disk tier
    ///
    /// Returns `Ok(false)` if the remote tier does not have the entry; no
    /// temporary file survives any exit path.
    async fn backfill(&self, namespace: Namespace, digest: &Digest) -> Result<bool> {
        let temp = self.disk.temp_file();
        let mut file = fs::File::create(temp.path())
            .await
            .map_err(|e| RemoteError::io(e, temp.path(), "create"))?;

        let found = match namespace {
            Namespace::Cas => self.remote.get(digest, &mut file).await?,
            Namespace::ActionResult => self.remote.get_action_result(digest, &mut file).await?,
        };
        if !found {
            debug!(namespace = %namespace, digest = %digest, "Remote tier miss");
            return Ok(false);
        }

        file.flush()
            .await
            .map_err(|e| RemoteError::io(e, temp.path(), "flush"))?;
        file.sync_all()
            .await
            .map_err(|e| RemoteError::io(e, temp.path(), "sync"))?;
        drop(file);

        self.disk.commit(temp, namespace, digest.key()).await?;
        debug!(namespace = %namespace, digest = %digest, "Backfilled disk tier from remote tier");
        Ok(true)
    }
}

#[async_trait]
impl BlobStore for CombinedBlobStore {
    async fn contains(&self, digest: &Digest) -> Result<bool> {
        self.disk.contains(digest).await
    }

    async fn contains_action_result(&self, action: &Digest) -> Result<bool> {
        self.disk.contains_action_result(action).await
    }

    #[instrument(name = "combined_get", skip_all, fields(digest = %digest))]
    async fn get(&self, digest: &Digest, out: &mut BlobSink<'_>) -> Result<bool> {
        // A disk copy that fails verification is evicted and reads as absent
        if self.disk.contains(digest).await? && self.disk.get(digest, out).await? {
            debug!("Disk tier hit");
            return Ok(true);
        }
        if !self.backfill(Namespace::Cas, digest).await? {
            return Ok(false);
        }
        self.disk.get(digest, out).await
    }

    #[instrument(name = "combined_get_action_result", skip_all, fields(action = %action))]
    async fn get_action_result(&self, action: &Digest, out: &mut BlobSink<'_>) -> Result<bool> {
        if self.disk.contains_action_result(action).await? {
            debug!("Disk tier hit");
            return self.disk.get_action_result(action, out).await;
        }
        if !self.backfill(Namespace::ActionResult, action).await? {
            return Ok(false);
        }
        self.disk.get_action_result(action, out).await
    }

    #[instrument(name = "combined_put", skip_all, fields(digest = %digest, length = length))]
    async fn put(&self, digest: &Digest, length: u64, source: &mut BlobSource<'_>) -> Result<()> {
        self.disk.put(digest, length, source).await?;

        let mut local = self
            .disk
            .open_blob(Namespace::Cas, digest.key())
            .await?
            .ok_or_else(|| {
                RemoteError::io_no_path(
                    std::io::Error::new(
                        std::io::ErrorKind::NotFound,
                        format!("blob {digest} vanished from the disk tier"),
                    ),
                    "reopen",
                )
            })?;
        self.remote.put(digest, length, &mut local).await?;
        debug!("Stored blob in both tiers");
        Ok(())
    }

    #[instrument(name = "combined_put_action_result", skip_all, fields(action = %action))]
    async fn put_action_result(&self, action: &Digest, data: &[u8]) -> Result<()> {
        self.disk.put_action_result(action, data).await?;
        self.remote.put_action_result(action, data).await
    }

    async fn find_missing_digests(&self, _digests: &[Digest]) -> Result<Vec<Digest>> {
        Err(RemoteError::unsupported("find_missing_digests", STORE_NAME))
    }

    async fn ensure_inputs_present(&self, _digests: &[Digest]) -> Result<()> {
        Err(RemoteError::unsupported("ensure_inputs_present", STORE_NAME))
    }

    async fn close(&self) -> Result<()> {
        let disk = self.disk.close().await;
        let remote = self.remote.close().await;
        disk.and(remote)
    }
}
