//! Cache configuration
//!
//! ```toml
//! root = "/var/cache/actcache"
//! persist_action_cache = true
//! verify_disk_reads = false
//! ```

use crate::action_cache::{ActionCache, InMemoryActionCache};
use crate::persistent::PersistentActionCache;
use crate::stats::CacheCounters;
use crate::{Error, Result};
use dirs::{cache_dir, home_dir};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// Environment variable overriding the cache root
pub const CACHE_DIR_ENV: &str = "ACTCACHE_CACHE_DIR";

/// Configuration for the action cache and the disk blob tier
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Cache root; resolved from the environment when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub root: Option<PathBuf>,

    /// Directory of the persistent action cache (default `<root>/action-cache`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action_cache_dir: Option<PathBuf>,

    /// Directory of the disk blob tier (default `<root>/disk-cache`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disk_cache_dir: Option<PathBuf>,

    /// Keep the action cache on disk between invocations
    pub persist_action_cache: bool,

    /// Re-hash raw blobs read from the disk tier
    pub verify_disk_reads: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            root: None,
            action_cache_dir: None,
            disk_cache_dir: None,
            persist_action_cache: true,
            verify_disk_reads: false,
        }
    }
}

impl CacheConfig {
    /// Load configuration from a TOML file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| Error::io(e, path, "read"))?;
        toml::from_str(&content).map_err(|e| {
            Error::configuration(format!("invalid config {}: {e}", path.display()))
        })
    }

    /// The cache root, resolving and creating a default when unset
    ///
    /// # Errors
    ///
    /// Returns an error if no writable candidate directory exists.
    pub fn cache_root(&self) -> Result<PathBuf> {
        if let Some(root) = &self.root {
            return Ok(root.clone());
        }
        cache_root_from_inputs(CacheInputs::from_env())
    }

    /// Directory of the persistent action cache
    ///
    /// # Errors
    ///
    /// Returns an error if the cache root cannot be resolved.
    pub fn action_cache_dir(&self) -> Result<PathBuf> {
        match &self.action_cache_dir {
            Some(dir) => Ok(dir.clone()),
            None => Ok(self.cache_root()?.join("action-cache")),
        }
    }

    /// Directory of the disk blob tier
    ///
    /// # Errors
    ///
    /// Returns an error if the cache root cannot be resolved.
    pub fn disk_cache_dir(&self) -> Result<PathBuf> {
        match &self.disk_cache_dir {
            Some(dir) => Ok(dir.clone()),
            None => Ok(self.cache_root()?.join("disk-cache")),
        }
    }

    /// Build the configured action cache implementation
    ///
    /// # Errors
    ///
    /// Returns an error if the persistent cache directory cannot be created.
    pub fn open_action_cache(&self, counters: Arc<CacheCounters>) -> Result<Box<dyn ActionCache>> {
        if self.persist_action_cache {
            let dir = self.action_cache_dir()?;
            debug!(dir = %dir.display(), "Opening persistent action cache");
            Ok(Box::new(PersistentActionCache::open(dir, counters)?))
        } else {
            debug!("Using in-memory action cache");
            Ok(Box::new(InMemoryActionCache::new(counters)))
        }
    }
}

/// Inputs for determining the cache root directory
#[derive(Debug, Clone)]
struct CacheInputs {
    override_dir: Option<PathBuf>,
    xdg_cache_home: Option<PathBuf>,
    os_cache_dir: Option<PathBuf>,
    home_dir: Option<PathBuf>,
    temp_dir: PathBuf,
}

impl CacheInputs {
    fn from_env() -> Self {
        let non_empty = |name: &str| {
            std::env::var(name)
                .ok()
                .filter(|s| !s.trim().is_empty())
                .map(PathBuf::from)
        };
        Self {
            override_dir: non_empty(CACHE_DIR_ENV),
            xdg_cache_home: non_empty("XDG_CACHE_HOME"),
            os_cache_dir: cache_dir(),
            home_dir: home_dir(),
            temp_dir: std::env::temp_dir(),
        }
    }
}

fn cache_root_from_inputs(inputs: CacheInputs) -> Result<PathBuf> {
    // Resolution order (first writable wins):
    // 1) ACTCACHE_CACHE_DIR (explicit override)
    // 2) XDG_CACHE_HOME/actcache
    // 3) OS cache dir/actcache
    // 4) ~/.actcache/cache
    // 5) TMPDIR/actcache/cache
    let mut candidates: Vec<PathBuf> = Vec::new();

    if let Some(dir) = inputs.override_dir {
        candidates.push(dir);
    }
    if let Some(xdg) = inputs.xdg_cache_home {
        candidates.push(xdg.join("actcache"));
    }
    if let Some(os_cache) = inputs.os_cache_dir {
        candidates.push(os_cache.join("actcache"));
    }
    if let Some(home) = inputs.home_dir {
        candidates.push(home.join(".actcache/cache"));
    }
    candidates.push(inputs.temp_dir.join("actcache/cache"));

    for path in candidates {
        // Existing directories may be read-only (some CI images mount $HOME that way)
        if path.exists() {
            let probe = path.join(".write_probe");
            if fs::OpenOptions::new()
                .create(true)
                .truncate(true)
                .write(true)
                .open(&probe)
                .is_ok()
            {
                let _ = fs::remove_file(&probe);
                return Ok(path);
            }
            continue;
        }
        if fs::create_dir_all(&path).is_ok() {
            return Ok(path);
        }
    }
    Err(Error::configuration(
        "Failed to determine a writable cache directory",
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn inputs(temp: &Path) -> CacheInputs {
        CacheInputs {
            override_dir: None,
            xdg_cache_home: None,
            os_cache_dir: None,
            home_dir: None,
            temp_dir: temp.to_path_buf(),
        }
    }

    #[test]
    fn override_wins() {
        let tmp = TempDir::new().unwrap();
        let mut i = inputs(tmp.path());
        i.override_dir = Some(tmp.path().join("custom"));
        i.xdg_cache_home = Some(tmp.path().join("xdg"));
        let root = cache_root_from_inputs(i).unwrap();
        assert_eq!(root, tmp.path().join("custom"));
        assert!(root.is_dir());
    }

    #[test]
    fn xdg_is_preferred_over_home() {
        let tmp = TempDir::new().unwrap();
        let mut i = inputs(tmp.path());
        i.xdg_cache_home = Some(tmp.path().join("xdg"));
        i.home_dir = Some(tmp.path().join("home"));
        let root = cache_root_from_inputs(i).unwrap();
        assert_eq!(root, tmp.path().join("xdg/actcache"));
    }

    #[test]
    fn falls_back_to_temp_dir() {
        let tmp = TempDir::new().unwrap();
        let root = cache_root_from_inputs(inputs(tmp.path())).unwrap();
        assert_eq!(root, tmp.path().join("actcache/cache"));
    }

    #[test]
    fn derived_directories_follow_root() {
        let config = CacheConfig {
            root: Some(PathBuf::from("/srv/cache")),
            ..CacheConfig::default()
        };
        assert_eq!(
            config.action_cache_dir().unwrap(),
            PathBuf::from("/srv/cache/action-cache")
        );
        assert_eq!(
            config.disk_cache_dir().unwrap(),
            PathBuf::from("/srv/cache/disk-cache")
        );
    }

    #[test]
    fn load_parses_toml_with_defaults() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("actcache.toml");
        fs::write(&path, "root = \"/srv/cache\"\nverify_disk_reads = true\n").unwrap();
        let config = CacheConfig::load(&path).unwrap();
        assert_eq!(config.root, Some(PathBuf::from("/srv/cache")));
        assert!(config.verify_disk_reads);
        assert!(config.persist_action_cache);
    }

    #[test]
    fn load_rejects_unknown_types() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("actcache.toml");
        fs::write(&path, "persist_action_cache = \"yes\"\n").unwrap();
        assert!(matches!(
            CacheConfig::load(&path),
            Err(Error::Configuration { .. })
        ));
    }

    #[test]
    fn open_action_cache_honours_persistence_flag() {
        let tmp = TempDir::new().unwrap();
        let config = CacheConfig {
            root: Some(tmp.path().to_path_buf()),
            persist_action_cache: false,
            ..CacheConfig::default()
        };
        let mut cache = config
            .open_action_cache(Arc::new(CacheCounters::new()))
            .unwrap();
        assert_eq!(cache.save().unwrap(), 0);
        assert!(!tmp.path().join("action-cache").exists());

        let config = CacheConfig {
            persist_action_cache: true,
            ..config
        };
        config
            .open_action_cache(Arc::new(CacheCounters::new()))
            .unwrap();
        assert!(tmp.path().join("action-cache").is_dir());
    }
}
