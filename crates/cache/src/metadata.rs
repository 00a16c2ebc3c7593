//! File metadata records contributed by the executor
//!
//! The action cache never inspects files itself. The executor hands it one
//! [`FileMetadata`] per input or output path, and the cache folds those
//! records into the entry fingerprint.

use crate::digest::{Fingerprint, digest_metadata_map, write_field};
use serde::{Deserialize, Serialize};
use sha2::{Digest as _, Sha256};
use std::collections::BTreeMap;
use std::fmt;

/// Metadata describing one file-system artifact
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FileMetadata {
    /// A regular file, identified by its content hash
    Regular {
        /// Lowercase hex content hash
        digest: String,
        /// Size in bytes
        size: u64,
    },
    /// A plain directory (not a tree artifact), tracked by modification time
    Directory {
        /// Last modification time in nanoseconds since the Unix epoch
        mtime_nanos: i64,
    },
    /// A symlink that is recorded without being followed
    Symlink {
        /// The link target as written
        target: String,
    },
    /// The aggregate of a tree artifact's children
    Tree {
        /// Fingerprint over the child metadata
        digest: Fingerprint,
        /// Total size of all children in bytes
        size: u64,
    },
    /// A declared file that does not exist
    Missing,
}

impl FileMetadata {
    /// Metadata for a regular file with a known content hash
    #[must_use]
    pub fn regular(digest: impl Into<String>, size: u64) -> Self {
        Self::Regular {
            digest: digest.into(),
            size,
        }
    }

    /// Metadata for a regular file holding `content` (SHA-256 content hash)
    #[must_use]
    pub fn from_content(content: &[u8]) -> Self {
        Self::Regular {
            digest: hex::encode(Sha256::digest(content)),
            size: content.len() as u64,
        }
    }

    /// Size in bytes for content-bearing records, zero otherwise
    #[must_use]
    pub const fn size(&self) -> u64 {
        match self {
            Self::Regular { size, .. } | Self::Tree { size, .. } => *size,
            Self::Directory { .. } | Self::Symlink { .. } | Self::Missing => 0,
        }
    }

    const fn discriminator(&self) -> u8 {
        match self {
            Self::Regular { .. } => 1,
            Self::Directory { .. } => 2,
            Self::Symlink { .. } => 3,
            Self::Tree { .. } => 4,
            Self::Missing => 5,
        }
    }

    /// Append the canonical byte form of this record to `out`
    pub fn write_canonical(&self, out: &mut Vec<u8>) {
        out.push(self.discriminator());
        match self {
            Self::Regular { digest, size } => {
                write_field(out, digest.as_bytes());
                out.extend_from_slice(&size.to_le_bytes());
            }
            Self::Directory { mtime_nanos } => out.extend_from_slice(&mtime_nanos.to_le_bytes()),
            Self::Symlink { target } => write_field(out, target.as_bytes()),
            Self::Tree { digest, size } => {
                write_field(out, digest.as_bytes());
                out.extend_from_slice(&size.to_le_bytes());
            }
            Self::Missing => {}
        }
    }
}

impl fmt::Display for FileMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Regular { digest, size } => write!(f, "regular(digest={digest}, size={size})"),
            Self::Directory { mtime_nanos } => write!(f, "directory(mtime={mtime_nanos})"),
            Self::Symlink { target } => write!(f, "symlink(target={target})"),
            Self::Tree { digest, size } => write!(f, "tree(digest={digest}, size={size})"),
            Self::Missing => f.write_str("missing"),
        }
    }
}

/// The children of a tree artifact, keyed by path relative to the tree root
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TreeArtifactValue {
    children: BTreeMap<String, FileMetadata>,
}

impl TreeArtifactValue {
    /// An empty tree
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a tree from its child records
    ///
    /// # Panics
    ///
    /// Panics if any relative path is empty or absolute.
    #[must_use]
    pub fn from_children(children: impl IntoIterator<Item = (String, FileMetadata)>) -> Self {
        let mut tree = Self::new();
        for (rel_path, metadata) in children {
            tree.insert_child(rel_path, metadata);
        }
        tree
    }

    /// Record one child
    ///
    /// # Panics
    ///
    /// Panics if `rel_path` is empty or absolute.
    pub fn insert_child(&mut self, rel_path: impl Into<String>, metadata: FileMetadata) {
        let rel_path = rel_path.into();
        assert!(
            !rel_path.is_empty() && !rel_path.starts_with('/'),
            "tree child path must be relative and non-empty: {rel_path:?}"
        );
        self.children.insert(rel_path, metadata);
    }

    /// Child records in path order
    #[must_use]
    pub fn children(&self) -> &BTreeMap<String, FileMetadata> {
        &self.children
    }

    /// Number of children
    #[must_use]
    pub fn len(&self) -> usize {
        self.children.len()
    }

    /// True for a tree without children
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    /// Aggregate metadata describing the tree as a whole
    #[must_use]
    pub fn metadata(&self) -> FileMetadata {
        FileMetadata::Tree {
            digest: digest_metadata_map(&self.children),
            size: self.children.values().map(FileMetadata::size).sum(),
        }
    }
}
