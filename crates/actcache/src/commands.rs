//! Command implementations
//!
//! Commands write their output to the writer they are given so they can be
//! exercised without a terminal.

use crate::cli::{BlobCommands, CliError, Result};
use actcache_cache::{ActionCache, CacheConfig, CacheCounters};
use actcache_remote::{BlobSink, BlobStore, Digest, DiskBlobStore};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Load the configuration, applying command-line overrides
///
/// # Errors
///
/// Returns a configuration error if the file cannot be read or parsed.
pub fn load_config(path: Option<&Path>, cache_dir: Option<PathBuf>) -> Result<CacheConfig> {
    let mut config = match path {
        Some(path) => {
            debug!(path = %path.display(), "Loading configuration");
            CacheConfig::load(path).map_err(|e| CliError::config(e.to_string()))?
        }
        None => CacheConfig::default(),
    };
    if cache_dir.is_some() {
        config.root = cache_dir;
    }
    Ok(config)
}

fn open_action_cache(config: &CacheConfig) -> Result<Box<dyn ActionCache>> {
    Ok(config.open_action_cache(Arc::new(CacheCounters::new()))?)
}

async fn open_disk(config: &CacheConfig) -> Result<DiskBlobStore> {
    let dir = config.disk_cache_dir()?;
    let store = DiskBlobStore::open(dir)
        .await?
        .with_verification(config.verify_disk_reads);
    Ok(store)
}

fn write_err(e: std::io::Error) -> CliError {
    CliError::operation(format!("Failed to write output: {e}"))
}

/// Print the action cache listing
///
/// # Errors
///
/// Returns an error if the cache cannot be opened or the output fails.
pub fn dump(config: &CacheConfig, out: &mut dyn Write) -> Result<()> {
    let cache = open_action_cache(config)?;
    cache.dump(out).map_err(write_err)
}

/// Drop every action cache record
///
/// # Errors
///
/// Returns an error if the cache cannot be opened or cleared.
pub fn clear(config: &CacheConfig, out: &mut dyn Write) -> Result<()> {
    let mut cache = open_action_cache(config)?;
    cache.clear()?;
    info!("Cleared action cache");
    writeln!(out, "Action cache cleared").map_err(write_err)
}

/// Run a blob subcommand against the disk tier
///
/// `data` receives blob content, `out` receives status lines.
///
/// # Errors
///
/// Returns an error if the store fails, or if `cat` finds nothing.
pub async fn blob(
    config: &CacheConfig,
    command: BlobCommands,
    data: &mut BlobSink<'_>,
    out: &mut dyn Write,
) -> Result<()> {
    let store = open_disk(config).await?;
    match command {
        BlobCommands::Has {
            digest,
            action_result,
        } => {
            let present = if action_result {
                store.contains_action_result(&digest).await?
            } else {
                store.contains(&digest).await?
            };
            let status = if present { "present" } else { "absent" };
            writeln!(out, "{digest} {status}").map_err(write_err)
        }
        BlobCommands::Cat {
            digest,
            action_result,
        } => {
            let found = if action_result {
                store.get_action_result(&digest, data).await?
            } else {
                store.get(&digest, data).await?
            };
            if found {
                Ok(())
            } else {
                Err(CliError::operation_with_help(
                    format!("{digest} is not in the disk cache"),
                    "Use `actcache blob has` to check presence before reading",
                ))
            }
        }
        BlobCommands::Put { file } => {
            let content = tokio::fs::read(&file).await.map_err(|e| {
                CliError::operation(format!("Failed to read {}: {e}", file.display()))
            })?;
            let digest = Digest::from_content(&content);
            store
                .put(&digest, content.len() as u64, &mut content.as_slice())
                .await?;
            writeln!(out, "{digest}").map_err(write_err)
        }
    }
}
