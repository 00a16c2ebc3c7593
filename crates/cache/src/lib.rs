//! Action result cache for actcache
//!
//! This crate decides whether a previously executed build action can be
//! skipped:
//! - Deterministic fingerprints over unordered metadata and environments
//! - Action cache entries that freeze once their fingerprint is computed
//! - In-memory and persistent action cache implementations
//! - Hit/miss accounting with a closed set of miss reasons
//!
//! # Overview
//!
//! While an action runs, the executor records the metadata of each input and
//! output in an [`EntryBuilder`]. Freezing the builder produces an
//! [`ActionCacheEntry`], which is stored in an [`ActionCache`] under the exec
//! path of one representative output. On the next build, [`checker::check`]
//! compares a freshly built candidate with the stored entry.
//!
//! ```
//! use actcache_cache::{
//!     CacheCounters, EntryBuilder, FileMetadata, InMemoryActionCache, checker,
//! };
//! use std::sync::Arc;
//!
//! let mut cache = InMemoryActionCache::new(Arc::new(CacheCounters::new()));
//!
//! let run = |content: &[u8]| {
//!     let mut entry = EntryBuilder::new("cc -c a.c", [("PATH", "/usr/bin")], false);
//!     entry.add_input_file("a.c", FileMetadata::from_content(content), false);
//!     entry.add_output_file("a.o", FileMetadata::from_content(b"object"));
//!     entry.freeze()
//! };
//!
//! checker::update(&mut cache, "a.o", run(b"int a;"));
//! assert!(checker::check(&cache, "a.o", &run(b"int a;"), false).is_hit());
//! assert!(!checker::check(&cache, "a.o", &run(b"int b;"), false).is_hit());
//! ```

pub mod action_cache;
pub mod checker;
pub mod config;
pub mod digest;
pub mod entry;
mod error;
pub mod metadata;
pub mod persistent;
pub mod stats;

// Re-export error types at crate root
pub use error::{Error, Result};

// Re-export main types
pub use action_cache::{ActionCache, CacheLookup, InMemoryActionCache};
pub use checker::CacheDecision;
pub use config::CacheConfig;
pub use digest::{Fingerprint, digest_environment, digest_metadata_map};
pub use entry::{ActionCacheEntry, EntryBuilder};
pub use metadata::{FileMetadata, TreeArtifactValue};
pub use persistent::PersistentActionCache;
pub use stats::{ActionCacheStatistics, CacheCounters, MissReason};
