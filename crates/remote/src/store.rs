//! The blob store interface
//!
//! A blob store has two namespaces that never collide: raw content
//! addressed by its digest, and action-result records addressed by the
//! digest of the action that produced them. Every operation reports a
//! definite outcome: `Ok(true)`/`Ok(false)` for found/not found, `Err` for
//! a failure of the store itself.

use crate::digest::Digest;
use crate::error::Result;
use async_trait::async_trait;
use std::fmt;
use tokio::io::{AsyncRead, AsyncWrite};

/// Destination of a blob read
pub type BlobSink<'a> = dyn AsyncWrite + Send + Unpin + 'a;

/// Source of a blob write
pub type BlobSource<'a> = dyn AsyncRead + Send + Unpin + 'a;

/// Which of the two namespaces an operation addresses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Namespace {
    /// Raw content-addressed blobs
    Cas,
    /// Action-result records
    ActionResult,
}

impl Namespace {
    /// Short name, also the disk tier's subdirectory
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Cas => "cas",
            Self::ActionResult => "ac",
        }
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A content-addressed store for blobs and action results
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Whether a blob with this digest is stored
    async fn contains(&self, digest: &Digest) -> Result<bool>;

    /// Whether an action result is stored for this action digest
    async fn contains_action_result(&self, action: &Digest) -> Result<bool>;

    /// Stream the blob into `out`
    ///
    /// Returns `Ok(false)` without writing anything if the blob is absent.
    async fn get(&self, digest: &Digest, out: &mut BlobSink<'_>) -> Result<bool>;

    /// Stream the action result record into `out`
    ///
    /// Returns `Ok(false)` without writing anything if no record is stored.
    async fn get_action_result(&self, action: &Digest, out: &mut BlobSink<'_>) -> Result<bool>;

    /// Store `length` bytes read from `source` as the blob for `digest`
    ///
    /// The write is complete only when this returns `Ok`. A source that
    /// yields a different number of bytes is rejected.
    async fn put(&self, digest: &Digest, length: u64, source: &mut BlobSource<'_>) -> Result<()>;

    /// Store the action result record for `action`
    async fn put_action_result(&self, action: &Digest, data: &[u8]) -> Result<()>;

    /// Digests from `digests` that are not stored, in input order
    async fn find_missing_digests(&self, digests: &[Digest]) -> Result<Vec<Digest>>;

    /// Fail with [`RemoteError::MissingInputs`](crate::RemoteError::MissingInputs)
    /// unless every digest is stored
    async fn ensure_inputs_present(&self, digests: &[Digest]) -> Result<()> {
        let missing = self.find_missing_digests(digests).await?;
        if missing.is_empty() {
            Ok(())
        } else {
            Err(crate::RemoteError::MissingInputs {
                count: missing.len(),
            })
        }
    }

    /// Release any resources held by the store
    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
impl<T: BlobStore + ?Sized> BlobStore for std::sync::Arc<T> {
    async fn contains(&self, digest: &Digest) -> Result<bool> {
        (**self).contains(digest).await
    }

    async fn contains_action_result(&self, action: &Digest) -> Result<bool> {
        (**self).contains_action_result(action).await
    }

    async fn get(&self, digest: &Digest, out: &mut BlobSink<'_>) -> Result<bool> {
        (**self).get(digest, out).await
    }

    async fn get_action_result(&self, action: &Digest, out: &mut BlobSink<'_>) -> Result<bool> {
        (**self).get_action_result(action, out).await
    }

    async fn put(&self, digest: &Digest, length: u64, source: &mut BlobSource<'_>) -> Result<()> {
        (**self).put(digest, length, source).await
    }

    async fn put_action_result(&self, action: &Digest, data: &[u8]) -> Result<()> {
        (**self).put_action_result(action, data).await
    }

    async fn find_missing_digests(&self, digests: &[Digest]) -> Result<Vec<Digest>> {
        (**self).find_missing_digests(digests).await
    }

    async fn ensure_inputs_present(&self, digests: &[Digest]) -> Result<()> {
        (**self).ensure_inputs_present(digests).await
    }

    async fn close(&self) -> Result<()> {
        (**self).close().await
    }
}
