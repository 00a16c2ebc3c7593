//! Command-line interface definition and error reporting

use actcache_remote::Digest;
use clap::{Parser, Subcommand};
use miette::{Diagnostic, Report};
use std::io::{self, Write};
use std::path::PathBuf;
use thiserror::Error;

/// Exit codes for the CLI application
pub const EXIT_OK: i32 = 0;
/// CLI or configuration error exit code
pub const EXIT_CLI: i32 = 2;
/// Cache operation failure exit code
pub const EXIT_FAILURE: i32 = 3;

/// CLI-specific error types with proper exit code mapping
#[derive(Error, Debug, Diagnostic)]
pub enum CliError {
    /// CLI or configuration error (exit code 2)
    #[error("CLI/configuration error: {message}")]
    #[diagnostic(code(actcache::cli::config))]
    Config {
        /// The error message
        message: String,
        /// Optional help text
        #[help]
        help: Option<String>,
    },
    /// A cache or blob store operation failed (exit code 3)
    #[error("Cache operation failed: {message}")]
    #[diagnostic(code(actcache::cli::operation))]
    Operation {
        /// The error message
        message: String,
        /// Optional help text
        #[help]
        help: Option<String>,
    },
}

impl CliError {
    /// Create a new configuration error
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            help: None,
        }
    }

    /// Create a new operation error
    #[must_use]
    pub fn operation(message: impl Into<String>) -> Self {
        Self::Operation {
            message: message.into(),
            help: None,
        }
    }

    /// Create a new operation error with help text
    #[must_use]
    pub fn operation_with_help(message: impl Into<String>, help: impl Into<String>) -> Self {
        Self::Operation {
            message: message.into(),
            help: Some(help.into()),
        }
    }
}

/// Result type for CLI commands
pub type Result<T> = std::result::Result<T, CliError>;

impl From<actcache_cache::Error> for CliError {
    fn from(err: actcache_cache::Error) -> Self {
        match err {
            // Avoid "Cache configuration error" nested inside the CLI prefix
            actcache_cache::Error::Configuration { message } => Self::config(message),
            actcache_cache::Error::Io { .. } => Self::operation_with_help(
                err.to_string(),
                "Check file permissions and ensure the cache directory exists",
            ),
            actcache_cache::Error::Serialization { .. } => Self::operation(err.to_string()),
        }
    }
}

impl From<actcache_remote::RemoteError> for CliError {
    fn from(err: actcache_remote::RemoteError) -> Self {
        match err {
            actcache_remote::RemoteError::InvalidKey { .. } => Self::config(err.to_string()),
            _ => Self::operation(err.to_string()),
        }
    }
}

/// Map CLI error to appropriate exit code
#[must_use]
pub const fn exit_code_for(err: &CliError) -> i32 {
    match err {
        CliError::Config { .. } => EXIT_CLI,
        CliError::Operation { .. } => EXIT_FAILURE,
    }
}

/// Render an error through miette on stderr
pub fn render_error(err: CliError) {
    let report = Report::new(err);
    let mut stderr = io::stderr().lock();
    let _ = writeln!(stderr, "{report:?}");
    let _ = stderr.flush();
}

/// Inspect and maintain the action cache and the disk blob tier
#[derive(Parser, Debug)]
#[command(name = "actcache", version, about)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file (TOML).
    #[arg(long, short = 'c', global = true, env = "ACTCACHE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Cache root, overriding the configuration file.
    #[arg(long, global = true)]
    pub cache_dir: Option<PathBuf>,

    /// Log at debug level unless RUST_LOG says otherwise.
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,
}

/// Available CLI subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print every action cache record, sorted by key
    Dump,
    /// Drop every action cache record
    Clear,
    /// Inspect or populate the disk blob tier
    #[command(subcommand)]
    Blob(BlobCommands),
}

/// Blob subcommands.
#[derive(Subcommand, Debug)]
pub enum BlobCommands {
    /// Report whether a blob is stored
    Has {
        /// Digest in `<hash>/<size>` form
        digest: Digest,
        /// Look in the action-result namespace
        #[arg(long)]
        action_result: bool,
    },
    /// Write a stored blob to stdout
    Cat {
        /// Digest in `<hash>/<size>` form
        digest: Digest,
        /// Read from the action-result namespace
        #[arg(long)]
        action_result: bool,
    },
    /// Store a file as a blob and print its digest
    Put {
        /// File to store
        file: PathBuf,
    },
}
