//! Error types for the blob store crate

// Rust 1.92 compiler bug: false positives for thiserror/miette derive macro fields
// https://github.com/rust-lang/rust/issues/147648
#![allow(unused_assignments)]

use miette::Diagnostic;
use std::path::Path;
use thiserror::Error;

/// Error type for blob store operations
///
/// A blob or action result that is simply not there is not an error: the
/// lookup methods report it as `Ok(false)` / `Ok(None)`.
#[derive(Error, Debug, Diagnostic)]
pub enum RemoteError {
    /// I/O error on the disk tier or a caller-supplied stream
    #[error("I/O {operation} failed{}", path.as_ref().map_or(String::new(), |p| format!(": {}", p.display())))]
    #[diagnostic(
        code(actcache::remote::io),
        help("Check file permissions and free space in the disk cache directory")
    )]
    Io {
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
        /// Path that caused the error, if available
        path: Option<Box<Path>>,
        /// Operation that failed (e.g., "create", "copy", "rename")
        operation: String,
    },

    /// Key cannot be mapped to a file in the store
    #[error("Invalid blob key {key:?}: {reason}")]
    #[diagnostic(code(actcache::remote::invalid_key))]
    InvalidKey {
        /// The rejected key
        key: String,
        /// Why it was rejected
        reason: &'static str,
    },

    /// Stream ended before or after the declared length
    #[error("Size mismatch for {key}: expected {expected} bytes, got {actual}")]
    #[diagnostic(code(actcache::remote::size_mismatch))]
    SizeMismatch {
        /// Key being written
        key: String,
        /// Declared length
        expected: u64,
        /// Bytes actually copied
        actual: u64,
    },

    /// Some inputs are not present in the store
    #[error("{count} input blob(s) missing from the store")]
    #[diagnostic(
        code(actcache::remote::missing_inputs),
        help("Upload the missing blobs before requesting execution")
    )]
    MissingInputs {
        /// Number of missing digests
        count: usize,
    },

    /// Operation not supported by this store
    #[error("{operation} is not supported by {store}")]
    #[diagnostic(code(actcache::remote::unsupported))]
    Unsupported {
        /// Operation name
        operation: &'static str,
        /// Store implementation name
        store: &'static str,
    },

    /// Failure reported by the remote tier's transport
    #[error("Remote transport error: {message}")]
    #[diagnostic(code(actcache::remote::transport))]
    Transport {
        /// Error message from the transport
        message: String,
    },

    /// Action result record could not be encoded or decoded
    #[error("Serialization error: {message}")]
    #[diagnostic(code(actcache::remote::serialization))]
    Serialization {
        /// Error message describing the serialization issue
        message: String,
    },
}

impl RemoteError {
    /// Create an I/O error with path context
    #[must_use]
    pub fn io(
        source: std::io::Error,
        path: impl AsRef<Path>,
        operation: impl Into<String>,
    ) -> Self {
        Self::Io {
            source,
            path: Some(path.as_ref().into()),
            operation: operation.into(),
        }
    }

    /// Create an I/O error without path context
    #[must_use]
    pub fn io_no_path(source: std::io::Error, operation: impl Into<String>) -> Self {
        Self::Io {
            source,
            path: None,
            operation: operation.into(),
        }
    }

    /// Create an invalid key error
    #[must_use]
    pub fn invalid_key(key: impl Into<String>, reason: &'static str) -> Self {
        Self::InvalidKey {
            key: key.into(),
            reason,
        }
    }

    /// Create an unsupported operation error
    #[must_use]
    pub const fn unsupported(operation: &'static str, store: &'static str) -> Self {
        Self::Unsupported { operation, store }
    }

    /// Create a transport error
    #[must_use]
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport {
            message: msg.into(),
        }
    }

    /// Create a serialization error
    #[must_use]
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
        }
    }
}

/// Result type for blob store operations
pub type Result<T> = std::result::Result<T, RemoteError>;
