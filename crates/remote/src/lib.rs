//! Tiered content-addressed blob store for actcache
//!
//! Build outputs and action results flow through a [`BlobStore`]. The
//! [`CombinedBlobStore`] puts a local [`DiskBlobStore`] in front of a remote
//! tier: reads prefer disk and backfill it from the remote tier on a miss,
//! writes go to both tiers.
//!
//! ```no_run
//! use actcache_remote::{BlobStore, CombinedBlobStore, Digest, DiskBlobStore, MemoryBlobStore};
//! use std::sync::Arc;
//!
//! # async fn run() -> actcache_remote::Result<()> {
//! let disk = DiskBlobStore::open("/var/cache/actcache/disk-cache").await?;
//! let store = CombinedBlobStore::new(disk, Arc::new(MemoryBlobStore::new()));
//!
//! let digest = Digest::from_content(b"hello");
//! store.put(&digest, 5, &mut &b"hello"[..]).await?;
//!
//! let mut out = Vec::new();
//! assert!(store.get(&digest, &mut out).await?);
//! # Ok(())
//! # }
//! ```

pub mod action_result;
pub mod combined;
pub mod digest;
pub mod disk;
pub mod error;
pub mod memory;
pub mod store;

pub use action_result::{ActionResult, OutputFile, fetch_action_result, store_action_result};
pub use combined::CombinedBlobStore;
pub use digest::Digest;
pub use disk::{DiskBlobStore, TempFile};
pub use error::{RemoteError, Result};
pub use memory::MemoryBlobStore;
pub use store::{BlobSink, BlobSource, BlobStore, Namespace};
