use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use moka::sync::Cache;
use tracing::debug;

use crate::catalog::DatasetKind;
use crate::error::{DataError, Result};
use crate::models::Table;

/// Canonical cache key. Categorical datasets ignore the day count, so it is
/// dropped from their key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub dataset: DatasetKind,
    pub days: Option<i64>,
}

impl CacheKey {
    pub fn new(dataset: DatasetKind, days: i64) -> Self {
        Self {
            dataset,
            days: dataset.is_dated().then_some(days),
        }
    }
}

/// Tables memoized for the duration of one display refresh.
///
/// Within a cycle the same key always yields the same `Arc<Table>`;
/// [`RefreshCache::refresh`] ends the cycle and drops every entry.
#[derive(Debug)]
pub struct RefreshCache {
    inner: Cache<CacheKey, Arc<Table>>,
    cycle: AtomicU64,
}

impl Default for RefreshCache {
    fn default() -> Self {
        Self::new()
    }
}

impl RefreshCache {
    pub fn new() -> Self {
        Self {
            // Unbounded: entries leave only through `refresh`.
            inner: Cache::builder().build(),
            cycle: AtomicU64::new(0),
        }
    }

    /// Cached table for `key`, generating it with `init` on a miss. Failed
    /// generations are not cached.
    pub fn get_or_generate<F>(&self, key: CacheKey, init: F) -> Result<Arc<Table>>
    where
        F: FnOnce() -> Result<Table>,
    {
        self.inner
            .try_get_with(key, || {
                debug!(dataset = %key.dataset, days = ?key.days, "cache miss");
                init().map(Arc::new)
            })
            .map_err(|e: Arc<DataError>| (*e).clone())
    }

    pub fn get(&self, key: &CacheKey) -> Option<Arc<Table>> {
        self.inner.get(key)
    }

    pub fn refresh(&self) {
        self.inner.invalidate_all();
        let cycle = self.cycle.fetch_add(1, Ordering::Relaxed) + 1;
        debug!(cycle, "cache refreshed");
    }

    pub fn cycle(&self) -> u64 {
        self.cycle.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::Generator;
    use chrono::NaiveDate;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;
    use std::cell::Cell;

    fn generator() -> Generator {
        let now = NaiveDate::from_ymd_opt(2026, 5, 1)
            .unwrap()
            .and_hms_opt(8, 0, 0)
            .unwrap();
        Generator::new(SmallRng::seed_from_u64(99), now)
    }

    #[test]
    fn same_key_returns_same_instance() {
        let cache = RefreshCache::new();
        let mut source = generator();
        let key = CacheKey::new(DatasetKind::Sales, 30);

        let first = cache.get_or_generate(key, || source.sales(30)).unwrap();
        let second = cache
            .get_or_generate(key, || -> Result<Table> { panic!("should be cached") })
            .unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn many_keys_do_not_evict_earlier_tables() {
        let cache = RefreshCache::new();
        let mut source = generator();
        let first_key = CacheKey::new(DatasetKind::Overview, 0);
        let first = cache
            .get_or_generate(first_key, || source.overview(0))
            .unwrap();

        for days in 1..600 {
            cache
                .get_or_generate(CacheKey::new(DatasetKind::Overview, days), || {
                    source.overview(0)
                })
                .unwrap();
        }

        let again = cache
            .get_or_generate(first_key, || -> Result<Table> { panic!("evicted") })
            .unwrap();
        assert_eq!(cache.cycle(), 0);
        assert!(Arc::ptr_eq(&first, &again));
    }

    #[test]
    fn refresh_forces_regeneration() {
        let cache = RefreshCache::new();
        let mut source = generator();
        let key = CacheKey::new(DatasetKind::Overview, 7);
        let calls = Cell::new(0);

        let first = cache
            .get_or_generate(key, || {
                calls.set(calls.get() + 1);
                source.overview(7)
            })
            .unwrap();
        cache.refresh();
        assert_eq!(cache.cycle(), 1);
        assert!(cache.get(&key).is_none());

        let second = cache
            .get_or_generate(key, || {
                calls.set(calls.get() + 1);
                source.overview(7)
            })
            .unwrap();
        assert_eq!(calls.get(), 2);
        assert!(!Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn errors_are_not_cached() {
        let cache = RefreshCache::new();
        let key = CacheKey::new(DatasetKind::Sales, -1);
        let mut source = generator();

        let err = cache.get_or_generate(key, || source.sales(-1)).unwrap_err();
        assert!(matches!(err, DataError::InvalidParameter(_)));
        assert!(cache.get(&key).is_none());
    }

    #[test]
    fn categorical_keys_ignore_days() {
        assert_eq!(
            CacheKey::new(DatasetKind::Countries, 7),
            CacheKey::new(DatasetKind::Countries, 90)
        );
        assert_ne!(
            CacheKey::new(DatasetKind::Sales, 7),
            CacheKey::new(DatasetKind::Sales, 90)
        );
    }
}
