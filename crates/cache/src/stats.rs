//! Hit/miss accounting for the action cache
//!
//! Counters are advisory telemetry and are never consulted for correctness.
//! A [`CacheCounters`] instance lives for one build invocation and is handed
//! to the cache at construction, so several caches (or a cache and its
//! caller) can share one set of counters.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Why an action could not reuse its cached result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissReason {
    /// The action's static definition changed
    DifferentActionKey,
    /// The discovered input set changed
    DifferentDeps,
    /// The used client environment changed
    DifferentEnvironment,
    /// Input or output metadata changed
    DifferentFiles,
    /// The stored record could not be read back
    CorruptedCacheEntry,
    /// Nothing was stored for the key
    NotCached,
    /// The action is configured to always run
    UnconditionalExecution,
}

impl MissReason {
    /// Every reason, in declaration order
    pub const ALL: [Self; 7] = [
        Self::DifferentActionKey,
        Self::DifferentDeps,
        Self::DifferentEnvironment,
        Self::DifferentFiles,
        Self::CorruptedCacheEntry,
        Self::NotCached,
        Self::UnconditionalExecution,
    ];

    const fn index(self) -> usize {
        self as usize
    }

    /// Human-readable label
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::DifferentActionKey => "different action key",
            Self::DifferentDeps => "different deps",
            Self::DifferentEnvironment => "different environment",
            Self::DifferentFiles => "different files",
            Self::CorruptedCacheEntry => "corrupted cache entry",
            Self::NotCached => "not cached",
            Self::UnconditionalExecution => "unconditional execution",
        }
    }
}

impl fmt::Display for MissReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Shared hit/miss counters
#[derive(Debug, Default)]
pub struct CacheCounters {
    hits: AtomicU64,
    misses: [AtomicU64; MissReason::ALL.len()],
}

impl CacheCounters {
    /// Fresh, zeroed counters
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one hit
    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    /// Count one miss
    pub fn record_miss(&self, reason: MissReason) {
        self.misses[reason.index()].fetch_add(1, Ordering::Relaxed);
    }

    /// Current hit count
    #[must_use]
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    /// Current miss count for one reason
    #[must_use]
    pub fn misses(&self, reason: MissReason) -> u64 {
        self.misses[reason.index()].load(Ordering::Relaxed)
    }

    /// Add the current counts to `stats`
    ///
    /// The counters are read one by one, so concurrent updates may be seen
    /// partially. Call this only when no actions are running.
    pub fn merge_into(&self, stats: &mut ActionCacheStatistics) {
        stats.hits += self.hits();
        for reason in MissReason::ALL {
            let count = self.misses(reason);
            if count > 0 {
                stats.misses += count;
                *stats.miss_details.entry(reason).or_default() += count;
            }
        }
    }

    /// Zero every counter
    pub fn reset(&self) {
        self.hits.store(0, Ordering::Relaxed);
        for counter in &self.misses {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

/// Snapshot of action cache statistics for reporting
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionCacheStatistics {
    /// Size of the last persisted cache in bytes
    pub size_in_bytes: u64,
    /// Number of cache hits
    pub hits: u64,
    /// Total number of cache misses
    pub misses: u64,
    /// Misses broken down by reason
    pub miss_details: BTreeMap<MissReason, u64>,
}

impl ActionCacheStatistics {
    /// Misses recorded for one reason
    #[must_use]
    pub fn misses_for(&self, reason: MissReason) -> u64 {
        self.miss_details.get(&reason).copied().unwrap_or(0)
    }
}
