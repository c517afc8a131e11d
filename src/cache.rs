/// Read-through configuration cache over the settings store
use crate::config::{ConfigSnapshot, SettingKey, Settings};
use crate::error::StoreError;
use crate::storage::SettingsStore;
use futures::future::try_join_all;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;
use std::time::Duration;

pub const CONFIG_CACHE_TTL: Duration = Duration::from_secs(5);

struct CachedSnapshot {
    snapshot: Rc<ConfigSnapshot>,
    loaded_at_ms: f64,
}

/// Caches the aggregate configuration for a short TTL.
///
/// `invalidate` must be called for every settings change notification; the
/// next read then reloads every key from the store.
pub struct ConfigCache<S> {
    store: S,
    ttl: Duration,
    cached: RefCell<Option<CachedSnapshot>>,
    // Bumped on invalidation so a load that straddles a change is not kept
    epoch: Cell<u64>,
}

impl<S: SettingsStore> ConfigCache<S> {
    pub fn new(store: S) -> ConfigCache<S> {
        ConfigCache::with_ttl(store, CONFIG_CACHE_TTL)
    }

    pub fn with_ttl(store: S, ttl: Duration) -> ConfigCache<S> {
        ConfigCache {
            store,
            ttl,
            cached: RefCell::new(None),
            epoch: Cell::new(0),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// The current snapshot, reloading when missing, expired or invalidated
    pub async fn snapshot(&self, now_ms: f64) -> Result<Rc<ConfigSnapshot>, StoreError> {
        if let Some(cached) = self.cached.borrow().as_ref() {
            if now_ms - cached.loaded_at_ms < self.ttl.as_secs_f64() * 1000.0 {
                return Ok(Rc::clone(&cached.snapshot));
            }
        }

        let epoch = self.epoch.get();
        let values = try_join_all(SettingKey::ALL.into_iter().map(|key| async move {
            self.store.get(key).await.map(|value| (key, value))
        }))
        .await?;
        let values: HashMap<SettingKey, Option<serde_json::Value>> = values.into_iter().collect();

        let settings = Settings::from_values(|key| values.get(&key).cloned().flatten());
        let snapshot = Rc::new(ConfigSnapshot::new(settings));

        if self.epoch.get() == epoch {
            *self.cached.borrow_mut() = Some(CachedSnapshot {
                snapshot: Rc::clone(&snapshot),
                loaded_at_ms: now_ms,
            });
        } else {
            log::debug!("Settings changed during load; not caching snapshot");
        }
        Ok(snapshot)
    }

    pub fn invalidate(&self) {
        self.epoch.set(self.epoch.get() + 1);
        self.cached.borrow_mut().take();
    }

    pub fn is_cached(&self) -> bool {
        self.cached.borrow().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SortMode;
    use crate::testing::MemoryStore;
    use futures::executor::block_on;
    use serde_json::json;

    const KEYS: usize = SettingKey::ALL.len();

    #[test]
    fn test_snapshot_reads_every_key_once() {
        let cache = ConfigCache::new(MemoryStore::new().with(SettingKey::GroupSortMode, json!("name")));

        let snapshot = block_on(cache.snapshot(0.0)).unwrap();

        assert_eq!(snapshot.settings.sort_mode, SortMode::Name);
        assert_eq!(cache.store().reads(), KEYS);
    }

    #[test]
    fn test_snapshot_served_from_cache_within_ttl() {
        let cache = ConfigCache::new(MemoryStore::new());

        block_on(async {
            cache.snapshot(1_000.0).await.unwrap();
            cache.snapshot(3_000.0).await.unwrap();
            cache.snapshot(5_999.0).await.unwrap();
        });

        assert_eq!(cache.store().reads(), KEYS);
    }

    #[test]
    fn test_snapshot_reloads_after_ttl() {
        let cache = ConfigCache::new(MemoryStore::new());

        block_on(async {
            cache.snapshot(1_000.0).await.unwrap();
            cache.store().put(SettingKey::GroupTop, json!(true));
            let snapshot = cache.snapshot(6_000.0).await.unwrap();
            assert!(snapshot.settings.group_top);
        });

        assert_eq!(cache.store().reads(), 2 * KEYS);
    }

    #[test]
    fn test_invalidate_forces_reload() {
        let cache = ConfigCache::new(MemoryStore::new());

        block_on(async {
            let before = cache.snapshot(0.0).await.unwrap();
            assert!(!before.settings.subdomain_enabled);

            cache.store().put(SettingKey::SubdomainEnabled, json!(true));
            cache.invalidate();
            assert!(!cache.is_cached());

            let after = cache.snapshot(10.0).await.unwrap();
            assert!(after.settings.subdomain_enabled);
        });
    }

    #[test]
    fn test_read_failure_is_not_cached() {
        let cache = ConfigCache::new(MemoryStore::new());
        cache.store().fail_reads(true);

        let result = block_on(cache.snapshot(0.0));

        assert!(matches!(result, Err(StoreError::Read { .. })));
        assert!(!cache.is_cached());

        cache.store().fail_reads(false);
        assert!(block_on(cache.snapshot(0.0)).is_ok());
        assert!(cache.is_cached());
    }
}
