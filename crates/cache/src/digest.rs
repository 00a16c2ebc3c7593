//! Deterministic fingerprints over unordered metadata
//!
//! Both entry points canonicalize their input before hashing: every
//! `(key, value)` pair is encoded as length-prefixed bytes and the encoded
//! pairs are sorted, so the insertion order of the source mapping never
//! affects the result.

use crate::metadata::FileMetadata;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest as _, Sha256};
use std::fmt;

/// Domain separators so an environment digest can never collide with a
/// metadata-map digest over the same bytes.
const ENV_DOMAIN: &[u8] = b"actcache.env.v1\0";
const METADATA_DOMAIN: &[u8] = b"actcache.metadata.v1\0";

/// A SHA-256 fingerprint, rendered as lowercase hex
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    /// Size of a fingerprint in bytes
    pub const LEN: usize = 32;

    /// Wrap raw digest bytes
    #[must_use]
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Parse a lowercase or uppercase hex string
    ///
    /// # Errors
    ///
    /// Returns an error if the string is not valid hex or not 32 bytes long.
    pub fn from_hex(hex: &str) -> crate::Result<Self> {
        let bytes = hex::decode(hex)
            .map_err(|e| crate::Error::serialization(format!("invalid fingerprint hex: {e}")))?;
        let bytes: [u8; 32] = bytes.try_into().map_err(|v: Vec<u8>| {
            crate::Error::serialization(format!(
                "fingerprint must be {} bytes, got {}",
                Self::LEN,
                v.len()
            ))
        })?;
        Ok(Self(bytes))
    }

    /// The raw digest bytes
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Lowercase hex representation
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    fn finish(hasher: Sha256) -> Self {
        let out = hasher.finalize();
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(out.as_slice());
        Self(bytes)
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({})", self.to_hex())
    }
}

impl Serialize for Fingerprint {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Fingerprint {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// Append a length-prefixed byte string to `out`
pub(crate) fn write_field(out: &mut Vec<u8>, bytes: &[u8]) {
    out.extend_from_slice(&(bytes.len() as u64).to_le_bytes());
    out.extend_from_slice(bytes);
}

fn digest_sorted(domain: &[u8], mut records: Vec<Vec<u8>>) -> Fingerprint {
    records.sort_unstable();
    let mut hasher = Sha256::new();
    hasher.update(domain);
    hasher.update((records.len() as u64).to_le_bytes());
    for record in &records {
        hasher.update(record);
    }
    Fingerprint::finish(hasher)
}

/// Digest the subset of the client environment an action declared as relevant
pub fn digest_environment<I, K, V>(env: I) -> Fingerprint
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: AsRef<str>,
{
    let records = env
        .into_iter()
        .map(|(name, value)| {
            let mut record = Vec::new();
            write_field(&mut record, name.as_ref().as_bytes());
            write_field(&mut record, value.as_ref().as_bytes());
            record
        })
        .collect();
    digest_sorted(ENV_DOMAIN, records)
}

/// Digest a mapping of exec path to file metadata
///
/// Each record contributes its path followed by the metadata's canonical
/// encoding (type discriminator, content hash, size).
pub fn digest_metadata_map<'a, I, K>(entries: I) -> Fingerprint
where
    I: IntoIterator<Item = (K, &'a FileMetadata)>,
    K: AsRef<str>,
{
    let records = entries
        .into_iter()
        .map(|(path, metadata)| {
            let mut record = Vec::new();
            write_field(&mut record, path.as_ref().as_bytes());
            metadata.write_canonical(&mut record);
            record
        })
        .collect();
    digest_sorted(METADATA_DOMAIN, records)
}
