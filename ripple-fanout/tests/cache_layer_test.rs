use std::sync::Arc;
use std::time::Duration;

use ripple_core::metrics::FanoutMetrics;
use ripple_fanout::infrastructure::cache::{
    CacheLayer, CacheStore, CacheTtlPolicy, MemoryCacheConnector, MemoryCacheStore, keys,
};
use ripple_fanout::infrastructure::retry::RetryPolicy;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct FeedPage {
    post_ids: Vec<String>,
    next_cursor: Option<String>,
}

fn layer(store: Arc<MemoryCacheStore>) -> (CacheLayer, Arc<FanoutMetrics>) {
    let metrics = Arc::new(FanoutMetrics::new());
    let layer = CacheLayer::with_store(store, CacheTtlPolicy::default(), metrics.clone());
    (layer, metrics)
}

#[tokio::test(start_paused = true)]
async fn test_missing_and_expired_keys_read_as_absent() {
    let store = MemoryCacheStore::shared();
    let (cache, _) = layer(store);

    assert_eq!(cache.get("never:written").await, None);

    cache.set("short:lived", "v", Duration::from_secs(5)).await;
    assert_eq!(cache.get("short:lived").await.as_deref(), Some("v"));

    tokio::time::advance(Duration::from_secs(6)).await;
    assert_eq!(cache.get("short:lived").await, None);
}

#[tokio::test(start_paused = true)]
async fn test_feed_page_uses_feed_ttl() {
    let store = MemoryCacheStore::shared();
    let (cache, _) = layer(store);
    let page = FeedPage {
        post_ids: vec!["p1".to_string(), "p2".to_string()],
        next_cursor: Some("c2".to_string()),
    };

    cache.cache_feed_page("42", "home", 1, &page).await;
    tokio::time::advance(Duration::from_secs(30)).await;
    assert_eq!(
        cache.get_cached_feed_page::<FeedPage>("42", "home", 1).await,
        Some(page)
    );

    tokio::time::advance(Duration::from_secs(31)).await;
    assert_eq!(cache.get_cached_feed_page::<FeedPage>("42", "home", 1).await, None);
}

#[tokio::test]
async fn test_prefix_delete_spans_many_scan_batches() {
    let store = MemoryCacheStore::shared();
    let (cache, _) = layer(store.clone());
    let ttl = Duration::from_secs(60);

    for page in 0..350 {
        cache.set(&keys::feed_page("42", "home", page), "[]", ttl).await;
    }
    for page in 0..5 {
        cache.set(&keys::feed_page("420", "home", page), "[]", ttl).await;
        cache.set(&keys::feed_page("7", "home", page), "[]", ttl).await;
    }
    cache.set(&keys::user_profile("42"), "{}", ttl).await;

    let deleted = cache.invalidate_user_feeds("42").await;

    assert_eq!(deleted, 350);
    assert_eq!(cache.get(&keys::feed_page("42", "home", 349)).await, None);
    assert!(cache.get(&keys::feed_page("420", "home", 0)).await.is_some());
    assert!(cache.get(&keys::feed_page("7", "home", 4)).await.is_some());
    assert!(cache.get(&keys::user_profile("42")).await.is_some());
    assert_eq!(store.len().await, 11);
}

#[tokio::test]
async fn test_prefix_delete_with_no_matches_is_noop() {
    let store = MemoryCacheStore::shared();
    let (cache, _) = layer(store.clone());
    cache.set("feed:1:home:1", "[]", Duration::from_secs(60)).await;

    assert_eq!(cache.delete_by_prefix("feed:2:*").await, 0);
    assert_eq!(store.len().await, 1);
}

#[tokio::test]
async fn test_unreachable_cache_degrades_to_miss() {
    let store = MemoryCacheStore::shared();
    let (cache, metrics) = layer(store.clone());
    let page = FeedPage {
        post_ids: vec!["p1".to_string()],
        next_cursor: None,
    };
    cache.cache_feed_page("42", "home", 1, &page).await;

    store.set_unreachable(true);

    // 缓存不可达时调用方回退到数据源，请求本身照常完成
    let served = match cache.get_cached_feed_page::<FeedPage>("42", "home", 1).await {
        Some(cached) => cached,
        None => FeedPage {
            post_ids: vec!["from-db".to_string()],
            next_cursor: None,
        },
    };
    assert_eq!(served.post_ids, vec!["from-db"]);

    cache.cache_feed_page("42", "home", 2, &page).await;
    assert_eq!(cache.invalidate_user_feeds("42").await, 0);
    assert!(cache.is_available().await);
    assert!(metrics.cache_degraded_total.with_label_values(&["get"]).get() >= 1);
    assert!(metrics.cache_degraded_total.with_label_values(&["set"]).get() >= 1);

    store.set_unreachable(false);
    assert_eq!(
        cache.get_cached_feed_page::<FeedPage>("42", "home", 1).await,
        Some(page)
    );
}

#[tokio::test(start_paused = true)]
async fn test_connect_gives_up_after_bounded_retries() {
    let store = MemoryCacheStore::shared();
    store.set_unreachable(true);
    let connector = Arc::new(MemoryCacheConnector::new(store.clone()));
    let retry = RetryPolicy::from_config(Some(3), Some(10), Some(50));

    let cache = CacheLayer::connect(
        connector,
        retry,
        CacheTtlPolicy::default(),
        Arc::new(FanoutMetrics::new()),
    )
    .await;

    assert!(!cache.is_available().await);
    assert_eq!(cache.get("anything").await, None);
    cache.set("anything", "v", Duration::from_secs(1)).await;
    assert!(store.is_empty().await);

    store.set_unreachable(false);
    assert!(cache.reconnect().await);
    cache.set("anything", "v", Duration::from_secs(10)).await;
    assert_eq!(cache.get("anything").await.as_deref(), Some("v"));
}

#[tokio::test]
async fn test_disabled_cache_is_silent() {
    let cache = CacheLayer::disabled(Arc::new(FanoutMetrics::new()));

    cache.cache_profile(&ripple_fanout::domain::model::SenderProfile {
        id: "42".to_string(),
        username: "ada".to_string(),
        display_name: "Ada".to_string(),
        avatar_url: None,
    })
    .await;

    assert_eq!(cache.get_cached_profile("42").await, None);
    assert_eq!(cache.revoke_all_sessions("42").await, 0);
    assert!(!cache.is_session_live("42", "t1").await);
}

#[tokio::test]
async fn test_store_scan_cursor_terminates() {
    let store = MemoryCacheStore::new();
    for i in 0..10 {
        store
            .set_ex(&format!("k:{i}"), "v", Duration::from_secs(60))
            .await
            .unwrap();
    }

    let mut cursor = 0;
    let mut seen = Vec::new();
    loop {
        let (next, keys) = store.scan(cursor, "k:*", 3).await.unwrap();
        seen.extend(keys);
        if next == 0 {
            break;
        }
        cursor = next;
    }
    seen.sort();
    seen.dedup();
    assert_eq!(seen.len(), 10);
}
