//! The action cache interface and its in-memory implementation
//!
//! The cache does not store actions. It stores, per action, a fingerprint of
//! the action's inputs and outputs as they were on disk after its last run,
//! keyed by the exec path of one representative output. The executor uses
//! that fingerprint to decide whether the action can be skipped.
//!
//! Implementations are not internally synchronized. Scheduling above this
//! layer guarantees at most one in-flight execution per key, and mutation
//! goes through `&mut self`.

use crate::Result;
use crate::entry::ActionCacheEntry;
use crate::stats::{ActionCacheStatistics, CacheCounters, MissReason};
use std::collections::BTreeMap;
use std::io;
use std::sync::Arc;

/// Outcome of an action cache lookup
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheLookup {
    /// A usable entry
    Present(Arc<ActionCacheEntry>),
    /// A stored record exists but could not be read back
    Corrupted,
    /// Nothing is stored under the key
    Absent,
}

impl CacheLookup {
    /// The entry, if one is usable
    #[must_use]
    pub fn entry(&self) -> Option<&Arc<ActionCacheEntry>> {
        match self {
            Self::Present(entry) => Some(entry),
            Self::Corrupted | Self::Absent => None,
        }
    }

    /// Consume the lookup, keeping only a usable entry
    #[must_use]
    pub fn into_entry(self) -> Option<Arc<ActionCacheEntry>> {
        match self {
            Self::Present(entry) => Some(entry),
            Self::Corrupted | Self::Absent => None,
        }
    }

    /// Whether a stored record failed to deserialize
    #[must_use]
    pub const fn is_corrupted(&self) -> bool {
        matches!(self, Self::Corrupted)
    }

    /// Whether nothing was stored
    #[must_use]
    pub const fn is_absent(&self) -> bool {
        matches!(self, Self::Absent)
    }
}

/// A keyed store of frozen action cache entries
pub trait ActionCache: Send + Sync {
    /// Insert or overwrite the entry for `key`
    fn put(&mut self, key: &str, entry: ActionCacheEntry);

    /// Look up the entry last put for `key`
    fn get(&self, key: &str) -> CacheLookup;

    /// Remove the entry for `key`; no-op if absent
    fn remove(&mut self, key: &str);

    /// Flush to durable storage, returning the serialized size in bytes
    ///
    /// Implementations that are not persistent return 0.
    fn save(&mut self) -> Result<u64>;

    /// Drop every entry and release any file handles
    fn clear(&mut self) -> Result<()>;

    /// Write a human-readable listing, sorted by key
    fn dump(&self, out: &mut dyn io::Write) -> io::Result<()>;

    /// The counters injected at construction
    fn counters(&self) -> &CacheCounters;

    /// Count one cache hit
    fn account_hit(&self) {
        self.counters().record_hit();
    }

    /// Count one cache miss
    fn account_miss(&self, reason: MissReason) {
        self.counters().record_miss(reason);
    }

    /// Add the current statistics to `stats`
    ///
    /// Not a consistent snapshot under concurrent accounting; call only when
    /// no actions are running.
    fn merge_into_statistics(&self, stats: &mut ActionCacheStatistics) {
        self.counters().merge_into(stats);
    }

    /// Zero the hit/miss counters
    fn reset_statistics(&self) {
        self.counters().reset();
    }
}

#[derive(Debug, Clone)]
pub(crate) enum Slot {
    Present(Arc<ActionCacheEntry>),
    Corrupted,
}

/// An action cache that lives only as long as the process
#[derive(Debug)]
pub struct InMemoryActionCache {
    slots: BTreeMap<String, Slot>,
    counters: Arc<CacheCounters>,
}

impl InMemoryActionCache {
    /// Create an empty cache accounting into `counters`
    #[must_use]
    pub fn new(counters: Arc<CacheCounters>) -> Self {
        Self {
            slots: BTreeMap::new(),
            counters,
        }
    }

    /// Number of stored records, corrupted ones included
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether the cache holds no records
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub(crate) fn insert_corrupted(&mut self, key: impl Into<String>) {
        self.slots.insert(key.into(), Slot::Corrupted);
    }

    pub(crate) fn present_entries(&self) -> impl Iterator<Item = (&str, &ActionCacheEntry)> {
        self.slots.iter().filter_map(|(key, slot)| match slot {
            Slot::Present(entry) => Some((key.as_str(), entry.as_ref())),
            Slot::Corrupted => None,
        })
    }
}

impl ActionCache for InMemoryActionCache {
    fn put(&mut self, key: &str, entry: ActionCacheEntry) {
        self.slots
            .insert(key.to_string(), Slot::Present(Arc::new(entry)));
    }

    fn get(&self, key: &str) -> CacheLookup {
        match self.slots.get(key) {
            Some(Slot::Present(entry)) => CacheLookup::Present(Arc::clone(entry)),
            Some(Slot::Corrupted) => CacheLookup::Corrupted,
            None => CacheLookup::Absent,
        }
    }

    fn remove(&mut self, key: &str) {
        self.slots.remove(key);
    }

    fn save(&mut self) -> Result<u64> {
        Ok(0)
    }

    fn clear(&mut self) -> Result<()> {
        self.slots.clear();
        Ok(())
    }

    fn dump(&self, out: &mut dyn io::Write) -> io::Result<()> {
        writeln!(out, "Action cache ({} records):", self.slots.len())?;
        for (key, slot) in &self.slots {
            match slot {
                Slot::Present(entry) => write!(out, "{key}:\n{entry}")?,
                Slot::Corrupted => writeln!(out, "{key}: (corrupted)")?,
            }
        }
        Ok(())
    }

    fn counters(&self) -> &CacheCounters {
        &self.counters
    }
}
