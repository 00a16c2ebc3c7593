//! Process-local blob store

use crate::digest::Digest;
use crate::error::{RemoteError, Result};
use crate::store::{BlobSink, BlobSource, BlobStore, Namespace};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

/// A blob store held entirely in memory
///
/// Cloning shares the underlying storage.
#[derive(Debug, Clone, Default)]
pub struct MemoryBlobStore {
    blobs: Arc<RwLock<HashMap<(Namespace, String), Arc<[u8]>>>>,
}

impl MemoryBlobStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries across both namespaces
    #[must_use]
    pub fn len(&self) -> usize {
        self.blobs.read().len()
    }

    /// Whether nothing is stored
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.blobs.read().is_empty()
    }

    fn lookup(&self, namespace: Namespace, key: &str) -> Option<Arc<[u8]>> {
        self.blobs
            .read()
            .get(&(namespace, key.to_string()))
            .cloned()
    }

    fn insert(&self, namespace: Namespace, key: &str, data: Vec<u8>) {
        self.blobs
            .write()
            .insert((namespace, key.to_string()), data.into());
    }

    async fn write_out(data: &[u8], out: &mut BlobSink<'_>) -> Result<()> {
        out.write_all(data)
            .await
            .map_err(|e| RemoteError::io_no_path(e, "write"))?;
        out.flush()
            .await
            .map_err(|e| RemoteError::io_no_path(e, "flush"))
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn contains(&self, digest: &Digest) -> Result<bool> {
        Ok(self.lookup(Namespace::Cas, digest.key()).is_some())
    }

    async fn contains_action_result(&self, action: &Digest) -> Result<bool> {
        Ok(self.lookup(Namespace::ActionResult, action.key()).is_some())
    }

    async fn get(&self, digest: &Digest, out: &mut BlobSink<'_>) -> Result<bool> {
        let Some(data) = self.lookup(Namespace::Cas, digest.key()) else {
            return Ok(false);
        };
        Self::write_out(&data, out).await?;
        Ok(true)
    }

    async fn get_action_result(&self, action: &Digest, out: &mut BlobSink<'_>) -> Result<bool> {
        let Some(data) = self.lookup(Namespace::ActionResult, action.key()) else {
            return Ok(false);
        };
        Self::write_out(&data, out).await?;
        Ok(true)
    }

    async fn put(&self, digest: &Digest, length: u64, source: &mut BlobSource<'_>) -> Result<()> {
        let mut data = Vec::new();
        source
            .read_to_end(&mut data)
            .await
            .map_err(|e| RemoteError::io_no_path(e, "read"))?;
        if data.len() as u64 != length {
            return Err(RemoteError::SizeMismatch {
                key: digest.key().to_string(),
                expected: length,
                actual: data.len() as u64,
            });
        }
        self.insert(Namespace::Cas, digest.key(), data);
        Ok(())
    }

    async fn put_action_result(&self, action: &Digest, data: &[u8]) -> Result<()> {
        self.insert(Namespace::ActionResult, action.key(), data.to_vec());
        Ok(())
    }

    async fn find_missing_digests(&self, digests: &[Digest]) -> Result<Vec<Digest>> {
        let blobs = self.blobs.read();
        Ok(digests
            .iter()
            .filter(|d| !blobs.contains_key(&(Namespace::Cas, d.key().to_string())))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn clones_share_storage() {
        let store = MemoryBlobStore::new();
        let other = store.clone();
        let digest = Digest::from_content(b"abc");
        store.put(&digest, 3, &mut &b"abc"[..]).await.unwrap();

        let mut out = Vec::new();
        assert!(other.get(&digest, &mut out).await.unwrap());
        assert_eq!(out, b"abc");
        assert_eq!(other.len(), 1);
    }

    #[test]
    fn usable_from_synchronous_code() {
        let store = MemoryBlobStore::new();
        let digest = Digest::from_content(b"sync");
        tokio_test::assert_ok!(tokio_test::block_on(store.put(
            &digest,
            4,
            &mut &b"sync"[..]
        )));
        assert!(tokio_test::block_on(store.contains(&digest)).unwrap());
    }

    #[tokio::test]
    async fn put_checks_length() {
        let store = MemoryBlobStore::new();
        let digest = Digest::from_content(b"abc");
        assert!(store.put(&digest, 4, &mut &b"abc"[..]).await.is_err());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn action_results_are_a_separate_namespace() {
        let store = MemoryBlobStore::new();
        let digest = Digest::from_content(b"action");
        store.put_action_result(&digest, b"{}").await.unwrap();
        assert!(store.contains_action_result(&digest).await.unwrap());
        assert!(!store.contains(&digest).await.unwrap());
        assert_eq!(
            store.find_missing_digests(&[digest.clone()]).await.unwrap(),
            vec![digest]
        );
    }
}
