//! Action result records
//!
//! An action result describes what a completed action produced. It lives
//! in the action-result namespace of a [`BlobStore`], keyed by the digest
//! of the action, and is stored as JSON.

use crate::digest::Digest;
use crate::error::{RemoteError, Result};
use crate::store::BlobStore;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// An output file recorded in an action result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputFile {
    /// Path relative to the execution root
    pub path: String,
    /// Digest of the file content in the blob namespace
    pub digest: Digest,
    /// Whether the file is executable
    #[serde(default)]
    pub is_executable: bool,
}

/// The outcome of executing an action
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionResult {
    /// Process exit code
    pub exit_code: i32,
    /// Output files, sorted by path when encoded
    #[serde(default)]
    pub output_files: Vec<OutputFile>,
    /// Digest of the captured stdout, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stdout_digest: Option<Digest>,
    /// Digest of the captured stderr, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stderr_digest: Option<Digest>,
}

impl ActionResult {
    /// Whether the action exited successfully
    #[must_use]
    pub const fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Look up an output file by path
    #[must_use]
    pub fn output_file(&self, path: &str) -> Option<&OutputFile> {
        self.output_files.iter().find(|f| f.path == path)
    }

    /// Encode as the stored JSON form
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut sorted = self.clone();
        sorted.output_files.sort_by(|a, b| a.path.cmp(&b.path));
        serde_json::to_vec(&sorted)
            .map_err(|e| RemoteError::serialization(format!("Failed to encode action result: {e}")))
    }

    /// Decode the stored JSON form
    ///
    /// # Errors
    ///
    /// Returns an error if the bytes are not a valid action result.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes)
            .map_err(|e| RemoteError::serialization(format!("Failed to decode action result: {e}")))
    }
}

/// Read and decode the action result stored for `action`
///
/// # Errors
///
/// Returns an error if the store fails or the record cannot be decoded.
pub async fn fetch_action_result(
    store: &dyn BlobStore,
    action: &Digest,
) -> Result<Option<ActionResult>> {
    let mut buf = Vec::new();
    if !store.get_action_result(action, &mut buf).await? {
        debug!(action = %action, "No action result stored");
        return Ok(None);
    }
    ActionResult::from_bytes(&buf).map(Some)
}

/// Encode and store the action result for `action`
///
/// # Errors
///
/// Returns an error if encoding or the store fails.
pub async fn store_action_result(
    store: &dyn BlobStore,
    action: &Digest,
    result: &ActionResult,
) -> Result<()> {
    let bytes = result.to_bytes()?;
    store.put_action_result(action, &bytes).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryBlobStore;

    fn sample() -> ActionResult {
        ActionResult {
            exit_code: 0,
            output_files: vec![
                OutputFile {
                    path: "out/b".to_string(),
                    digest: Digest::from_content(b"b"),
                    is_executable: true,
                },
                OutputFile {
                    path: "out/a".to_string(),
                    digest: Digest::from_content(b"a"),
                    is_executable: false,
                },
            ],
            stdout_digest: Some(Digest::from_content(b"log")),
            stderr_digest: None,
        }
    }

    #[test]
    fn encoding_sorts_outputs() {
        let decoded = ActionResult::from_bytes(&sample().to_bytes().unwrap()).unwrap();
        let paths: Vec<_> = decoded.output_files.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, ["out/a", "out/b"]);
        assert!(decoded.output_file("out/b").unwrap().is_executable);
    }

    #[test]
    fn encoding_is_independent_of_output_order() {
        let mut reversed = sample();
        reversed.output_files.reverse();
        assert_eq!(sample().to_bytes().unwrap(), reversed.to_bytes().unwrap());
    }

    #[test]
    fn garbage_is_a_serialization_error() {
        assert!(matches!(
            ActionResult::from_bytes(b"not json"),
            Err(RemoteError::Serialization { .. })
        ));
    }

    #[tokio::test]
    async fn store_then_fetch() {
        let store = MemoryBlobStore::new();
        let action = Digest::from_content(b"action");
        assert_eq!(fetch_action_result(&store, &action).await.unwrap(), None);

        store_action_result(&store, &action, &sample()).await.unwrap();
        let fetched = fetch_action_result(&store, &action).await.unwrap().unwrap();
        assert!(fetched.success());
        assert_eq!(fetched.output_files.len(), 2);
    }
}
