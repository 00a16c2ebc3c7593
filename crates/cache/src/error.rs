//! Error types for the action cache crate

// Rust 1.92 compiler bug: false positives for thiserror/miette derive macro fields
// https://github.com/rust-lang/rust/issues/147648
#![allow(unused_assignments)]

use miette::Diagnostic;
use std::path::Path;
use thiserror::Error;

/// Error type for action cache operations
///
/// Contract violations (mutating a frozen entry, recording a tree artifact
/// through the file-output path) are not represented here: they panic.
#[derive(Error, Debug, Diagnostic)]
pub enum Error {
    /// I/O error while loading or persisting the cache
    #[error("I/O {operation} failed: {}", path.display())]
    #[diagnostic(
        code(actcache::cache::io),
        help("Check file permissions and ensure the path exists")
    )]
    Io {
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
        /// Path that caused the error
        path: Box<Path>,
        /// Operation that failed (e.g., "read", "write", "rename")
        operation: String,
    },

    /// Configuration or validation error
    #[error("Cache configuration error: {message}")]
    #[diagnostic(code(actcache::cache::config))]
    Configuration {
        /// Error message describing the configuration issue
        message: String,
    },

    /// Serialization error
    #[error("Serialization error: {message}")]
    #[diagnostic(code(actcache::cache::serialization))]
    Serialization {
        /// Error message describing the serialization issue
        message: String,
    },
}

impl Error {
    /// Create a configuration error
    #[must_use]
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration {
            message: msg.into(),
        }
    }

    /// Create an I/O error with path context
    #[must_use]
    pub fn io(
        source: std::io::Error,
        path: impl AsRef<Path>,
        operation: impl Into<String>,
    ) -> Self {
        Self::Io {
            source,
            path: path.as_ref().into(),
            operation: operation.into(),
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

/// Result type for action cache operations
pub type Result<T> = std::result::Result<T, Error>;
