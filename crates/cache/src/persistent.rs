//! Action cache persisted as a single JSON document
//!
//! ## Layout
//!
//! ```text
//! <dir>/
//!   action_cache.json   {"version": 1, "entries": {"<key>": {...}, ...}}
//! ```
//!
//! Records are decoded one by one, so a single bad record loads as
//! [`CacheLookup::Corrupted`] instead of invalidating the whole cache. The
//! document is rewritten through a temporary file in the same directory and
//! renamed into place, so a crash during [`ActionCache::save`] leaves the
//! previous document intact.

use crate::action_cache::{ActionCache, CacheLookup, InMemoryActionCache};
use crate::entry::ActionCacheEntry;
use crate::stats::{ActionCacheStatistics, CacheCounters};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;
use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// File name of the persisted cache document
pub const CACHE_FILE: &str = "action_cache.json";

/// Version of the persisted document format
pub const FORMAT_VERSION: u32 = 1;

#[derive(Serialize)]
struct StoredCache<'a> {
    version: u32,
    entries: BTreeMap<&'a str, &'a ActionCacheEntry>,
}

#[derive(Deserialize)]
struct LoadedCache {
    version: u32,
    entries: BTreeMap<String, Box<RawValue>>,
}

/// An action cache backed by a JSON document on disk
#[derive(Debug)]
pub struct PersistentActionCache {
    dir: PathBuf,
    inner: InMemoryActionCache,
    dirty: bool,
    size_in_bytes: u64,
}

impl PersistentActionCache {
    /// Open (or create) the cache stored under `dir`
    ///
    /// An unreadable or incompatible document is discarded and the cache
    /// starts empty; every lookup then degrades to a miss.
    ///
    /// # Errors
    ///
    /// Returns an error if `dir` cannot be created.
    pub fn open(dir: impl Into<PathBuf>, counters: Arc<CacheCounters>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| Error::io(e, &dir, "create_dir_all"))?;

        let mut cache = Self {
            inner: InMemoryActionCache::new(counters),
            dirty: false,
            size_in_bytes: 0,
            dir,
        };
        cache.load();
        Ok(cache)
    }

    /// Path of the persisted document
    #[must_use]
    pub fn file_path(&self) -> PathBuf {
        self.dir.join(CACHE_FILE)
    }

    /// Directory holding the cache
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Number of loaded or inserted records, corrupted ones included
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Whether the cache holds no records
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    fn load(&mut self) {
        let path = self.file_path();
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "No persisted action cache, starting empty");
                return;
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to read action cache, starting empty");
                return;
            }
        };

        let loaded: LoadedCache = match serde_json::from_slice(&bytes) {
            Ok(loaded) => loaded,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Action cache document is unreadable, starting empty");
                return;
            }
        };
        if loaded.version != FORMAT_VERSION {
            warn!(
                path = %path.display(),
                found = loaded.version,
                expected = FORMAT_VERSION,
                "Action cache format version mismatch, starting empty"
            );
            return;
        }

        let mut corrupted = 0usize;
        for (key, raw) in loaded.entries {
            match serde_json::from_str::<ActionCacheEntry>(raw.get()) {
                Ok(entry) if entry.is_consistent() => self.inner.put(&key, entry),
                Ok(_) => {
                    warn!(key = %key, "Action cache record mixes file and tree outputs");
                    corrupted += 1;
                    self.inner.insert_corrupted(key);
                }
                Err(e) => {
                    warn!(key = %key, error = %e, "Failed to decode action cache record");
                    corrupted += 1;
                    self.inner.insert_corrupted(key);
                }
            }
        }

        self.size_in_bytes = bytes.len() as u64;
        info!(
            path = %path.display(),
            records = self.inner.len(),
            corrupted,
            size_bytes = self.size_in_bytes,
            "Loaded action cache"
        );
    }

    fn write_document(&self) -> Result<u64> {
        let stored = StoredCache {
            version: FORMAT_VERSION,
            entries: self.inner.present_entries().collect(),
        };
        let json = serde_json::to_vec(&stored)
            .map_err(|e| Error::serialization(format!("Failed to serialize action cache: {e}")))?;

        let path = self.file_path();
        let mut tmp = tempfile::NamedTempFile::new_in(&self.dir)
            .map_err(|e| Error::io(e, &self.dir, "create_temp"))?;
        tmp.write_all(&json)
            .map_err(|e| Error::io(e, tmp.path(), "write"))?;
        tmp.as_file()
            .sync_all()
            .map_err(|e| Error::io(e, tmp.path(), "sync"))?;
        tmp.persist(&path)
            .map_err(|e| Error::io(e.error, &path, "rename"))?;

        Ok(json.len() as u64)
    }
}

impl ActionCache for PersistentActionCache {
    fn put(&mut self, key: &str, entry: ActionCacheEntry) {
        self.inner.put(key, entry);
        self.dirty = true;
    }

    fn get(&self, key: &str) -> CacheLookup {
        self.inner.get(key)
    }

    fn remove(&mut self, key: &str) {
        self.inner.remove(key);
        self.dirty = true;
    }

    fn save(&mut self) -> Result<u64> {
        if !self.dirty {
            return Ok(self.size_in_bytes);
        }
        let size = self.write_document()?;
        self.size_in_bytes = size;
        self.dirty = false;
        debug!(path = %self.file_path().display(), size_bytes = size, "Saved action cache");
        Ok(size)
    }

    fn clear(&mut self) -> Result<()> {
        self.inner.clear()?;
        let path = self.file_path();
        match fs::remove_file(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(Error::io(e, &path, "remove")),
        }
        self.size_in_bytes = 0;
        self.dirty = false;
        Ok(())
    }

    fn dump(&self, out: &mut dyn io::Write) -> io::Result<()> {
        writeln!(out, "Action cache file: {}", self.file_path().display())?;
        self.inner.dump(out)
    }

    fn counters(&self) -> &CacheCounters {
        self.inner.counters()
    }

    fn merge_into_statistics(&self, stats: &mut ActionCacheStatistics) {
        stats.size_in_bytes = self.size_in_bytes;
        self.inner.merge_into_statistics(stats);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::EntryBuilder;
    use crate::metadata::FileMetadata;
    use tempfile::TempDir;

    fn entry(action_key: &str) -> ActionCacheEntry {
        let mut b = EntryBuilder::new(action_key, [("PATH", "/bin")], true);
        b.add_input_file("src/a.c", FileMetadata::from_content(b"a"), true);
        b.add_output_file("out/a.o", FileMetadata::from_content(b"o"));
        b.freeze()
    }

    fn open(dir: &Path) -> PersistentActionCache {
        PersistentActionCache::open(dir, Arc::new(CacheCounters::new())).unwrap()
    }

    #[test]
    fn save_and_reopen_preserves_entries() {
        let tmp = TempDir::new().unwrap();
        let original = entry("k1");
        {
            let mut cache = open(tmp.path());
            cache.put("out/a.o", original.clone());
            let size = cache.save().unwrap();
            assert!(size > 0);
        }

        let cache = open(tmp.path());
        let loaded = cache.get("out/a.o").into_entry().unwrap();
        assert_eq!(*loaded, original);
        assert_eq!(loaded.paths(), ["src/a.c"]);
    }

    #[test]
    fn save_without_changes_reports_last_size() {
        let tmp = TempDir::new().unwrap();
        let mut cache = open(tmp.path());
        cache.put("out/a.o", entry("k1"));
        let first = cache.save().unwrap();
        let second = cache.save().unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn repeated_saves_keep_earlier_entries() {
        let tmp = TempDir::new().unwrap();
        {
            let mut cache = open(tmp.path());
            cache.put("one", entry("k1"));
            cache.save().unwrap();
            cache.put("two", entry("k2"));
            cache.save().unwrap();
        }
        let cache = open(tmp.path());
        assert!(cache.get("one").entry().is_some());
        assert!(cache.get("two").entry().is_some());
    }

    #[test]
    fn bad_record_loads_as_corrupted() {
        let tmp = TempDir::new().unwrap();
        {
            let mut cache = open(tmp.path());
            cache.put("good", entry("k1"));
            cache.save().unwrap();
        }
        let path = tmp.path().join(CACHE_FILE);
        let mut doc: serde_json::Value =
            serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();
        doc["entries"]["bad"] = serde_json::json!({"action_key": 42});
        fs::write(&path, serde_json::to_vec(&doc).unwrap()).unwrap();

        let cache = open(tmp.path());
        assert!(cache.get("good").entry().is_some());
        assert!(cache.get("bad").is_corrupted());
    }

    #[test]
    fn garbage_document_starts_empty() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join(CACHE_FILE), b"{not json").unwrap();
        let cache = open(tmp.path());
        assert!(cache.is_empty());
    }

    #[test]
    fn version_mismatch_starts_empty() {
        let tmp = TempDir::new().unwrap();
        fs::write(
            tmp.path().join(CACHE_FILE),
            br#"{"version": 999, "entries": {}}"#,
        )
        .unwrap();
        let cache = open(tmp.path());
        assert!(cache.is_empty());
    }

    #[test]
    fn clear_removes_document() {
        let tmp = TempDir::new().unwrap();
        let mut cache = open(tmp.path());
        cache.put("out/a.o", entry("k1"));
        cache.save().unwrap();
        assert!(cache.file_path().exists());

        cache.clear().unwrap();
        assert!(!cache.file_path().exists());
        assert!(cache.get("out/a.o").is_absent());
    }

    #[test]
    fn save_leaves_no_temporaries() {
        let tmp = TempDir::new().unwrap();
        let mut cache = open(tmp.path());
        cache.put("out/a.o", entry("k1"));
        cache.save().unwrap();
        let names: Vec<_> = fs::read_dir(tmp.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from(CACHE_FILE)]);
    }

    #[test]
    fn statistics_include_persisted_size() {
        let tmp = TempDir::new().unwrap();
        let mut cache = open(tmp.path());
        cache.put("out/a.o", entry("k1"));
        let size = cache.save().unwrap();
        let mut stats = ActionCacheStatistics::default();
        cache.merge_into_statistics(&mut stats);
        assert_eq!(stats.size_in_bytes, size);
    }
}
