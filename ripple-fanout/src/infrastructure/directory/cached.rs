//! 带缓存的用户资料查询
//!
//! 先查 `user:{id}`，未命中再查上游并按 profile TTL 回写

use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::model::SenderProfile;
use crate::domain::repository::UserDirectory;
use crate::error::Result;
use crate::infrastructure::cache::CacheLayer;

pub struct CachedUserDirectory {
    inner: Arc<dyn UserDirectory>,
    cache: Arc<CacheLayer>,
}

impl CachedUserDirectory {
    pub fn new(inner: Arc<dyn UserDirectory>, cache: Arc<CacheLayer>) -> Self {
        Self { inner, cache }
    }
}

#[async_trait]
impl UserDirectory for CachedUserDirectory {
    async fn profile(&self, user_id: &str) -> Result<Option<SenderProfile>> {
        if let Some(profile) = self.cache.get_cached_profile(user_id).await {
            return Ok(Some(profile));
        }

        let profile = self.inner.profile(user_id).await?;
        if let Some(profile) = &profile {
            self.cache.cache_profile(profile).await;
        }
        Ok(profile)
    }
}

#[cfg(test)]
mod tests {
    use ripple_core::metrics::FanoutMetrics;

    use super::*;
    use crate::infrastructure::cache::{CacheTtlPolicy, MemoryCacheStore};
    use crate::infrastructure::directory::StaticUserDirectory;

    #[tokio::test]
    async fn test_profile_is_served_from_cache_after_first_lookup() {
        let upstream = Arc::new(StaticUserDirectory::new());
        upstream
            .insert(SenderProfile {
                id: "alice".into(),
                username: "alice".into(),
                display_name: "Alice".into(),
                avatar_url: None,
            })
            .await;
        let cache = Arc::new(CacheLayer::with_store(
            MemoryCacheStore::shared(),
            CacheTtlPolicy::default(),
            Arc::new(FanoutMetrics::default()),
        ));
        let directory = CachedUserDirectory::new(upstream.clone(), cache.clone());

        let first = directory.profile("alice").await.unwrap().unwrap();
        assert_eq!(cache.get_cached_profile("alice").await, Some(first.clone()));

        // 上游变化在 TTL 内不可见
        upstream
            .insert(SenderProfile {
                display_name: "Alice Renamed".into(),
                ..first.clone()
            })
            .await;
        assert_eq!(directory.profile("alice").await.unwrap(), Some(first));

        cache.invalidate_profile("alice").await;
        let refreshed = directory.profile("alice").await.unwrap().unwrap();
        assert_eq!(refreshed.display_name, "Alice Renamed");
    }
}
