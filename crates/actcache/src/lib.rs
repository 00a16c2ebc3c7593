//! Command-line front end for actcache
//!
//! Inspects and maintains the persistent action cache and the disk blob
//! tier configured through [`actcache_cache::CacheConfig`].

pub mod cli;
pub mod commands;

pub use cli::{CliError, Result};
