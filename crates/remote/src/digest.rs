//! Content digests addressing blobs and action results

use crate::error::{RemoteError, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest as Sha2Digest, Sha256};
use std::fmt;
use std::str::FromStr;

/// A content digest: lowercase hex SHA-256 hash plus the size in bytes.
///
/// The hash is the store key. The size travels with it so readers can
/// check what they got.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Digest {
    /// Lowercase hex SHA-256 of the content
    pub hash: String,
    /// Content length in bytes
    pub size_bytes: i64,
}

impl Digest {
    /// Creates a new Digest from a hash string and size.
    pub fn new(hash: impl Into<String>, size_bytes: i64) -> Self {
        Self {
            hash: hash.into(),
            size_bytes,
        }
    }

    /// Creates a Digest from the given content.
    pub fn from_content(content: &[u8]) -> Self {
        let hash = hex::encode(Sha256::digest(content));
        let size_bytes = i64::try_from(content.len()).unwrap_or(i64::MAX);
        Self { hash, size_bytes }
    }

    /// The key under which the digest's content is stored
    #[must_use]
    pub fn key(&self) -> &str {
        &self.hash
    }

    /// Declared size, clamped at zero
    #[must_use]
    pub fn size(&self) -> u64 {
        u64::try_from(self.size_bytes).unwrap_or(0)
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.hash, self.size_bytes)
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.hash, self.size_bytes)
    }
}

impl FromStr for Digest {
    type Err = RemoteError;

    /// Parses the `hash/size` form produced by `Display`
    fn from_str(s: &str) -> Result<Self> {
        let (hash, size) = s
            .split_once('/')
            .ok_or_else(|| RemoteError::invalid_key(s, "expected <hash>/<size>"))?;
        if hash.is_empty() || !hash.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(RemoteError::invalid_key(s, "hash must be hex"));
        }
        let size_bytes = size
            .parse::<i64>()
            .ok()
            .filter(|n| *n >= 0)
            .ok_or_else(|| RemoteError::invalid_key(s, "size must be a non-negative integer"))?;
        Ok(Self::new(hash.to_ascii_lowercase(), size_bytes))
    }
}
