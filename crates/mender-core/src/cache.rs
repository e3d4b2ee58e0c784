//! Healed-selector cache using moka
//!
//! Keyed on everything a heal depends on: page, broken selector, strategy
//! override and the content fingerprints of both snapshots. A page or
//! baseline that changed therefore never serves a stale heal.

use crate::attempt::StrategyRun;
use crate::config::CacheConfig;
use mender_dom::SnapshotFingerprint;
use mender_strategy::Candidate;
use moka::future::Cache;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub page_url: String,
    pub selector: String,
    pub strategy: Option<String>,
    /// Snapshot the selector worked against
    pub baseline: SnapshotFingerprint,
    /// Snapshot being healed against
    pub fingerprint: SnapshotFingerprint,
}

/// Result of a previous heal
#[derive(Debug, Clone)]
pub struct CachedHeal {
    pub candidates: Vec<Candidate>,
    pub strategy_runs: Vec<StrategyRun>,
}

#[derive(Debug, Clone)]
pub struct HealCache {
    inner: Cache<CacheKey, Arc<CachedHeal>>,
}

impl HealCache {
    /// Create cache with time-based expiration
    #[inline]
    #[must_use]
    pub fn with_ttl(max_capacity: u64, ttl: Duration) -> Self {
        Self {
            inner: Cache::builder()
                .max_capacity(max_capacity)
                .time_to_live(ttl)
                .build(),
        }
    }

    /// Cache per `config`, or `None` when disabled
    #[must_use]
    pub fn from_config(config: &CacheConfig) -> Option<Self> {
        config
            .enabled
            .then(|| Self::with_ttl(config.max_capacity, Duration::from_secs(config.ttl_secs)))
    }

    #[inline]
    pub async fn get(&self, key: &CacheKey) -> Option<Arc<CachedHeal>> {
        self.inner.get(key).await
    }

    #[inline]
    pub async fn insert(&self, key: CacheKey, heal: CachedHeal) {
        self.inner.insert(key, Arc::new(heal)).await;
    }

    /// Drop every entry
    pub fn invalidate_all(&self) {
        self.inner.invalidate_all();
    }

    #[inline]
    #[must_use]
    pub fn entry_count(&self) -> u64 {
        self.inner.entry_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mender_test_utils::{login_original, login_with_renamed_id, snapshot};

    fn key(page: &mender_dom::DomSnapshot) -> CacheKey {
        keyed(page, page)
    }

    fn keyed(baseline: &mender_dom::DomSnapshot, page: &mender_dom::DomSnapshot) -> CacheKey {
        CacheKey {
            page_url: "https://app.example.com/login".into(),
            selector: "#submit-btn".into(),
            strategy: None,
            baseline: baseline.fingerprint(),
            fingerprint: page.fingerprint(),
        }
    }

    #[tokio::test]
    async fn hit_requires_same_page_content() {
        let cache = HealCache::with_ttl(16, Duration::from_secs(60));
        let before = snapshot(login_original());
        let after = snapshot(login_with_renamed_id());

        cache
            .insert(
                key(&before),
                CachedHeal {
                    candidates: vec![],
                    strategy_runs: vec![],
                },
            )
            .await;

        assert!(cache.get(&key(&before)).await.is_some());
        assert!(cache.get(&key(&after)).await.is_none());
        // a recapture of the same page shares the fingerprint
        assert!(cache.get(&key(&snapshot(login_original()))).await.is_some());
    }

    #[tokio::test]
    async fn hit_requires_same_baseline() {
        let cache = HealCache::with_ttl(16, Duration::from_secs(60));
        let baseline = snapshot(login_original());
        let page = snapshot(login_with_renamed_id());
        cache
            .insert(
                keyed(&baseline, &page),
                CachedHeal {
                    candidates: vec![],
                    strategy_runs: vec![],
                },
            )
            .await;

        assert!(cache.get(&keyed(&baseline, &page)).await.is_some());
        assert!(cache.get(&keyed(&page, &page)).await.is_none());

        cache.invalidate_all();
        assert!(cache.get(&keyed(&baseline, &page)).await.is_none());
    }

    #[test]
    fn disabled_config_builds_nothing() {
        let config = CacheConfig {
            enabled: false,
            ..CacheConfig::default()
        };
        assert!(HealCache::from_config(&config).is_none());
    }
}
