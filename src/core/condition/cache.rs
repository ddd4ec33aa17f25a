// SPDX-License-Identifier: MIT OR Apache-2.0

//! Memoized condition-group lookups.
//!
//! Handlers resolve their condition group once at construction; many handlers
//! across many detectors may point at the same group, so lookups are memoized
//! process-wide in whatever cache instance the orchestrator owns. There is no
//! stampede protection: concurrent misses for the same id each load once and
//! the last write wins, which is acceptable because loads are cheap and
//! idempotent. Writers of groups or conditions must call
//! [`ConditionGroupCache::invalidate`] so the next lookup re-fetches lazily.

use crate::core::condition::{ConditionRepository, DataConditionGroup};
use crate::core::error::AlertFluxResult;
use dashmap::DashMap;
use std::sync::Arc;

/// Get-or-compute cache over [`ConditionRepository`] lookups, keyed by
/// condition group id. Absence ("group deleted / never existed") is cached
/// too, so repeated lookups of a missing group do not hammer the store.
#[derive(Debug, Default)]
pub struct ConditionGroupCache {
    inner: DashMap<u64, Option<Arc<DataConditionGroup>>>,
}

impl ConditionGroupCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached group for `group_id`, loading it through `repository`
    /// on a miss.
    ///
    /// # Errors
    ///
    /// Propagates repository failures; failed loads are not cached.
    pub fn get_or_load(
        &self,
        group_id: u64,
        repository: &dyn ConditionRepository,
    ) -> AlertFluxResult<Option<Arc<DataConditionGroup>>> {
        if let Some(entry) = self.inner.get(&group_id) {
            return Ok(entry.value().clone());
        }
        let loaded = repository.load_group(group_id)?.map(Arc::new);
        self.inner.insert(group_id, loaded.clone());
        Ok(loaded)
    }

    /// Drop the cached entry for `group_id`. Call after any write to the
    /// group or its conditions; the next lookup re-fetches.
    pub fn invalidate(&self, group_id: u64) {
        self.inner.remove(&group_id);
    }

    /// Drop every cached entry.
    pub fn clear(&self) {
        self.inner.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::condition::{
        ConditionComparison, DataCondition, InMemoryConditionRepository,
    };
    use crate::core::detector::DetectorPriorityLevel;

    fn group(id: u64, threshold: i64) -> DataConditionGroup {
        DataConditionGroup::new(
            id,
            vec![DataCondition::new(
                1,
                ConditionComparison::GreaterThan,
                threshold,
                DetectorPriorityLevel::Low,
            )],
        )
    }

    #[test]
    fn test_miss_then_hit() {
        let repo = InMemoryConditionRepository::new();
        repo.upsert_group(group(1, 10));
        let cache = ConditionGroupCache::new();

        let loaded = cache.get_or_load(1, &repo).unwrap().unwrap();
        assert_eq!(loaded.conditions[0].threshold, 10);

        // Writes to the repository are invisible until invalidation.
        repo.upsert_group(group(1, 20));
        let cached = cache.get_or_load(1, &repo).unwrap().unwrap();
        assert_eq!(cached.conditions[0].threshold, 10);
    }

    #[test]
    fn test_invalidate_refetches() {
        let repo = InMemoryConditionRepository::new();
        repo.upsert_group(group(1, 10));
        let cache = ConditionGroupCache::new();
        cache.get_or_load(1, &repo).unwrap();

        repo.upsert_group(group(1, 20));
        cache.invalidate(1);
        let reloaded = cache.get_or_load(1, &repo).unwrap().unwrap();
        assert_eq!(reloaded.conditions[0].threshold, 20);
    }

    #[test]
    fn test_absent_group_is_cached() {
        let repo = InMemoryConditionRepository::new();
        let cache = ConditionGroupCache::new();
        assert!(cache.get_or_load(42, &repo).unwrap().is_none());

        // The miss is memoized: a later upsert without invalidation is unseen.
        repo.upsert_group(group(42, 5));
        assert!(cache.get_or_load(42, &repo).unwrap().is_none());
        cache.invalidate(42);
        assert!(cache.get_or_load(42, &repo).unwrap().is_some());
    }

    #[test]
    fn test_clear_drops_everything() {
        let repo = InMemoryConditionRepository::new();
        repo.upsert_group(group(1, 10));
        let cache = ConditionGroupCache::new();
        cache.get_or_load(1, &repo).unwrap();

        repo.upsert_group(group(1, 99));
        cache.clear();
        let reloaded = cache.get_or_load(1, &repo).unwrap().unwrap();
        assert_eq!(reloaded.conditions[0].threshold, 99);
    }
}
