//! Parsed cron cache.
//!
//! Cron strings are parsed once and shared. Only valid expressions are
//! cached; invalid ones are re-parsed so callers always get the full error
//! list.

use moka::sync::Cache;
use std::sync::{Arc, OnceLock};

use super::cron::ParsedCron;
use crate::error::ValidationError;

/// Default cache capacity (number of distinct cron strings).
pub const DEFAULT_CACHE_CAPACITY: u64 = 512;

/// Bounded cache of parsed expressions keyed by the raw cron string.
#[derive(Clone)]
pub struct CronCache {
    cache: Cache<String, Arc<ParsedCron>>,
}

impl CronCache {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CACHE_CAPACITY)
    }

    pub fn with_capacity(max_capacity: u64) -> Self {
        Self {
            cache: Cache::builder().max_capacity(max_capacity).build(),
        }
    }

    /// Get a parsed expression from cache, or parse and cache it.
    pub fn get_or_parse(&self, cron: &str) -> Result<Arc<ParsedCron>, Vec<ValidationError>> {
        let key = cron.trim();
        if let Some(parsed) = self.cache.get(key) {
            return Ok(parsed);
        }

        let parsed = Arc::new(ParsedCron::parse(key)?);
        self.cache.insert(key.to_string(), parsed.clone());
        Ok(parsed)
    }

    pub fn invalidate(&self, cron: &str) {
        self.cache.invalidate(cron.trim());
    }

    pub fn clear(&self) {
        self.cache.invalidate_all();
        self.cache.run_pending_tasks();
    }

    pub fn entry_count(&self) -> u64 {
        self.cache.run_pending_tasks();
        self.cache.entry_count()
    }
}

impl Default for CronCache {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CronCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CronCache")
            .field("entries", &self.cache.entry_count())
            .finish()
    }
}

static GLOBAL: OnceLock<CronCache> = OnceLock::new();

/// Process-wide cache used by the free schedule functions.
pub fn global() -> &'static CronCache {
    GLOBAL.get_or_init(CronCache::new)
}

/// Size the process-wide cache. Only effective before its first use.
///
/// Returns whether the capacity was applied.
pub fn configure_global(max_capacity: u64) -> bool {
    GLOBAL.set(CronCache::with_capacity(max_capacity)).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_or_parse_reuses_entry() {
        let cache = CronCache::new();
        let first = cache.get_or_parse("*/5 * * * *").unwrap();
        let second = cache.get_or_parse("  */5 * * * * ").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.entry_count(), 1);
    }

    #[test]
    fn test_invalid_expressions_are_not_cached() {
        let cache = CronCache::new();
        let errors = cache.get_or_parse("61 * * * *").unwrap_err();
        assert_eq!(errors[0].field, "minute");
        assert_eq!(cache.entry_count(), 0);
    }

    #[test]
    fn test_invalidate_and_clear() {
        let cache = CronCache::with_capacity(8);
        cache.get_or_parse("0 * * * *").unwrap();
        cache.get_or_parse("0 0 * * *").unwrap();
        cache.invalidate("0 * * * *");
        assert_eq!(cache.entry_count(), 1);
        cache.clear();
        assert_eq!(cache.entry_count(), 0);
    }
}
