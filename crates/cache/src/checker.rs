//! Hit/miss decisions on top of an [`ActionCache`]
//!
//! The cache itself is a passive store. Before running an action, the
//! executor builds a candidate entry from the current action definition and
//! the current file metadata, and compares it with what was stored after the
//! previous run.

use crate::action_cache::{ActionCache, CacheLookup};
use crate::entry::ActionCacheEntry;
use crate::stats::MissReason;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::debug;

/// Whether an action may reuse its previous result
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheDecision {
    /// The stored entry matches the candidate exactly
    Hit(Arc<ActionCacheEntry>),
    /// The action must run
    Miss(MissReason),
}

impl CacheDecision {
    /// True for a hit
    #[must_use]
    pub const fn is_hit(&self) -> bool {
        matches!(self, Self::Hit(_))
    }

    /// The miss reason, if this is a miss
    #[must_use]
    pub const fn miss_reason(&self) -> Option<MissReason> {
        match self {
            Self::Hit(_) => None,
            Self::Miss(reason) => Some(*reason),
        }
    }
}

/// Compare a stored lookup with a freshly built candidate
///
/// Checks run in a fixed order and the first difference wins: absence,
/// corruption, action key, file digest, environment digest, discovered
/// inputs.
#[must_use]
pub fn compare(stored: CacheLookup, candidate: &ActionCacheEntry) -> CacheDecision {
    let entry = match stored {
        CacheLookup::Present(entry) => entry,
        CacheLookup::Absent => return CacheDecision::Miss(MissReason::NotCached),
        CacheLookup::Corrupted => return CacheDecision::Miss(MissReason::CorruptedCacheEntry),
    };

    if entry.action_key() != candidate.action_key() {
        return CacheDecision::Miss(MissReason::DifferentActionKey);
    }
    if entry.file_digest() != candidate.file_digest() {
        return CacheDecision::Miss(MissReason::DifferentFiles);
    }
    if entry.used_client_env_digest() != candidate.used_client_env_digest() {
        return CacheDecision::Miss(MissReason::DifferentEnvironment);
    }
    if entry.discovers_inputs() != candidate.discovers_inputs()
        || entry.paths().iter().collect::<BTreeSet<_>>()
            != candidate.paths().iter().collect::<BTreeSet<_>>()
    {
        return CacheDecision::Miss(MissReason::DifferentDeps);
    }
    CacheDecision::Hit(entry)
}

/// Decide whether the action keyed by `key` can be skipped, and account
/// the outcome in the cache's counters
///
/// `unconditional` actions always miss without consulting the store.
pub fn check(
    cache: &dyn ActionCache,
    key: &str,
    candidate: &ActionCacheEntry,
    unconditional: bool,
) -> CacheDecision {
    let decision = if unconditional {
        CacheDecision::Miss(MissReason::UnconditionalExecution)
    } else {
        compare(cache.get(key), candidate)
    };

    match &decision {
        CacheDecision::Hit(_) => {
            debug!(key = %key, "Action cache hit");
            cache.account_hit();
        }
        CacheDecision::Miss(reason) => {
            debug!(key = %key, reason = %reason, "Action cache miss");
            cache.account_miss(*reason);
        }
    }
    decision
}

/// Record the entry built while the action ran
pub fn update(cache: &mut dyn ActionCache, key: &str, entry: ActionCacheEntry) {
    debug!(key = %key, digest = %entry.file_digest(), "Updating action cache");
    cache.put(key, entry);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action_cache::InMemoryActionCache;
    use crate::entry::EntryBuilder;
    use crate::metadata::FileMetadata;
    use crate::stats::{ActionCacheStatistics, CacheCounters};

    fn build(
        action_key: &str,
        env: &[(&str, &str)],
        output: &[u8],
        deps: Option<&[&str]>,
    ) -> ActionCacheEntry {
        let mut b = EntryBuilder::new(action_key, env.iter().copied(), deps.is_some());
        for dep in deps.unwrap_or_default() {
            b.add_input_file(*dep, FileMetadata::Missing, true);
        }
        b.add_output_file("out/a", FileMetadata::from_content(output));
        b.freeze()
    }

    fn cache_with(entry: ActionCacheEntry) -> InMemoryActionCache {
        let mut cache = InMemoryActionCache::new(Arc::new(CacheCounters::new()));
        update(&mut cache, "out/a", entry);
        cache
    }

    #[test]
    fn identical_candidate_hits() {
        let cache = cache_with(build("k", &[("A", "1")], b"x", None));
        let decision = check(&cache, "out/a", &build("k", &[("A", "1")], b"x", None), false);
        assert!(decision.is_hit());
    }

    #[test]
    fn absent_key_is_not_cached() {
        let cache = InMemoryActionCache::new(Arc::new(CacheCounters::new()));
        let decision = check(&cache, "out/a", &build("k", &[], b"x", None), false);
        assert_eq!(decision.miss_reason(), Some(MissReason::NotCached));
    }

    #[test]
    fn corrupted_record_is_reported() {
        let mut cache = InMemoryActionCache::new(Arc::new(CacheCounters::new()));
        cache.insert_corrupted("out/a");
        let decision = check(&cache, "out/a", &build("k", &[], b"x", None), false);
        assert_eq!(decision.miss_reason(), Some(MissReason::CorruptedCacheEntry));
    }

    #[test]
    fn each_difference_has_its_reason() {
        let stored = build("k", &[("A", "1")], b"x", Some(&["a.h"]));
        let cases = [
            (
                build("k2", &[("A", "1")], b"x", Some(&["a.h"])),
                MissReason::DifferentActionKey,
            ),
            (
                build("k", &[("A", "1")], b"y", Some(&["a.h"])),
                MissReason::DifferentFiles,
            ),
            (
                build("k", &[("A", "2")], b"x", Some(&["a.h"])),
                MissReason::DifferentEnvironment,
            ),
        ];
        for (candidate, reason) in cases {
            let decision = compare(CacheLookup::Present(Arc::new(stored.clone())), &candidate);
            assert_eq!(decision.miss_reason(), Some(reason));
        }
    }

    #[test]
    fn discovered_inputs_compare_as_sets() {
        let mut stored = EntryBuilder::new("k", Vec::<(String, String)>::new(), true);
        stored.add_input_file("a.h", FileMetadata::Missing, true);
        stored.add_input_file("b.h", FileMetadata::Missing, true);
        let stored = stored.freeze();

        let mut same = EntryBuilder::new("k", Vec::<(String, String)>::new(), true);
        same.add_input_file("b.h", FileMetadata::Missing, true);
        same.add_input_file("a.h", FileMetadata::Missing, true);
        same.add_input_file("a.h", FileMetadata::Missing, true);
        let same = same.freeze();

        assert!(compare(CacheLookup::Present(Arc::new(stored.clone())), &same).is_hit());

        let mut other = EntryBuilder::new("k", Vec::<(String, String)>::new(), true);
        other.add_input_file("a.h", FileMetadata::Missing, true);
        other.add_input_file("b.h", FileMetadata::Missing, false);
        let other = other.freeze();
        assert_eq!(
            compare(CacheLookup::Present(Arc::new(stored)), &other).miss_reason(),
            Some(MissReason::DifferentDeps)
        );
    }

    #[test]
    fn unconditional_actions_always_miss() {
        let entry = build("k", &[], b"x", None);
        let cache = cache_with(entry.clone());
        let decision = check(&cache, "out/a", &entry, true);
        assert_eq!(decision.miss_reason(), Some(MissReason::UnconditionalExecution));
    }

    #[test]
    fn check_accounts_every_decision() {
        let cache = cache_with(build("k", &[], b"x", None));
        check(&cache, "out/a", &build("k", &[], b"x", None), false);
        check(&cache, "out/a", &build("k", &[], b"y", None), false);

        let mut stats = ActionCacheStatistics::default();
        cache.merge_into_statistics(&mut stats);
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses_for(MissReason::DifferentFiles), 1);
    }
}
