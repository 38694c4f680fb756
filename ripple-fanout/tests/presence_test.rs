mod common;

use std::sync::Arc;

use common::{Harness, StoreHooks, UnreadGate};
use ripple_fanout::application::commands::{ViewerCountCommand, ViewerPresenceCommand};
use ripple_fanout::application::queries::{UnreadCountQuery, ViewerCountQuery};
use ripple_fanout::domain::model::{NotificationEvent, ViewerCounts};
use ripple_fanout::infrastructure::cache::keys;
use ripple_fanout::service::FanoutSettings;

#[tokio::test]
async fn test_peak_survives_drop_in_viewers() {
    let h = Harness::new().await;
    let presence = &h.ctx.presence;

    presence.set_viewer_count("s1", 10).await.unwrap();
    presence.set_viewer_count("s1", 3).await.unwrap();
    let counts = presence.set_viewer_count("s1", 7).await.unwrap();

    assert_eq!(counts, ViewerCounts { current: 7, peak: 10 });
    let read = h
        .ctx
        .query_handler
        .viewer_count(ViewerCountQuery { stream_id: "s1".to_string() })
        .await
        .unwrap();
    assert_eq!(read, ViewerCounts { current: 7, peak: 10 });
}

#[tokio::test]
async fn test_negative_count_is_clamped() {
    let h = Harness::new().await;
    let counts = h
        .ctx
        .command_handler
        .handle_viewer_count(ViewerCountCommand {
            stream_id: "s1".to_string(),
            count: -4,
        })
        .await
        .unwrap();
    assert_eq!(counts, ViewerCounts { current: 0, peak: 0 });
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_updates_keep_maximum_peak() {
    let h = Harness::new().await;
    let presence = h.ctx.presence.clone();

    let handles: Vec<_> = (0..64i64)
        .map(|i| {
            let presence = Arc::clone(&presence);
            // 计数在 0..=120 之间来回跳动，最大值 126 只出现一次
            let count = if i == 37 { 126 } else { (i * 7) % 121 };
            tokio::spawn(async move { presence.set_viewer_count("s1", count).await })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let counts = presence.get_viewer_count("s1").await.unwrap();
    assert_eq!(counts.peak, 126);
    assert!(counts.current <= counts.peak);
}

#[tokio::test]
async fn test_viewer_events_are_published_to_stream_topic() {
    let h = Harness::new().await;
    let mut rx = h.ctx.hub.subscribe("stream:s1");

    h.ctx
        .command_handler
        .handle_viewer_presence(ViewerPresenceCommand {
            stream_id: "s1".to_string(),
            viewer_id: "carol".to_string(),
            count: 5,
            joined: true,
        })
        .await
        .unwrap();

    let count = rx.recv().await.unwrap();
    assert_eq!(count.event, "viewer:count");
    assert_eq!(count.payload["event"], count.event);
    assert_eq!(count.payload["current"], 5);
    assert_eq!(count.payload["peak"], 5);

    let join = rx.recv().await.unwrap();
    assert_eq!(join.event, "viewer:join");
    assert_eq!(join.payload["viewer_id"], "carol");
}

#[tokio::test]
async fn test_current_count_falls_back_to_store_without_cache() {
    let h = Harness::new().await;
    h.ctx.presence.set_viewer_count("s1", 12).await.unwrap();

    h.ctx.cache.delete(&keys::stream_viewers("s1")).await;
    h.cache_store.set_unreachable(true);

    let counts = h.ctx.presence.get_viewer_count("s1").await.unwrap();
    assert_eq!(counts, ViewerCounts { current: 12, peak: 12 });
}

#[tokio::test]
async fn test_unknown_stream_reads_as_zero() {
    let h = Harness::new().await;
    let counts = h.ctx.presence.get_viewer_count("nope").await.unwrap();
    assert_eq!(counts, ViewerCounts { current: 0, peak: 0 });
}

#[tokio::test]
async fn test_unread_count_is_cached_and_falls_back_to_store() {
    let h = Harness::new().await;
    h.ctx
        .notification_service
        .create_and_emit_notification(NotificationEvent::follow("bob", "alice"))
        .await
        .unwrap();

    let query = || UnreadCountQuery { user_id: "bob".to_string() };
    assert_eq!(h.ctx.query_handler.unread_count(query()).await.unwrap(), 1);
    assert_eq!(
        h.ctx.cache.get(&keys::unread_count("bob")).await.as_deref(),
        Some("1")
    );

    h.cache_store.set_unreachable(true);
    assert_eq!(h.ctx.query_handler.unread_count(query()).await.unwrap(), 1);
}

#[tokio::test]
async fn test_unread_read_racing_new_notification_does_not_cache_stale_count() {
    let gate = UnreadGate::new();
    let h = Harness::with_hooks(
        FanoutSettings::default(),
        StoreHooks {
            unread_gate: Some(gate.clone()),
            ..StoreHooks::default()
        },
    )
    .await;

    // 读取方拿到 0 之后暂停，此时新通知写入并失效缓存
    let presence = Arc::clone(&h.ctx.presence);
    let reader = tokio::spawn(async move { presence.get_unread_count("bob").await.unwrap() });
    gate.loaded.notified().await;

    h.ctx
        .notification_service
        .create_follow_notification("bob", "alice")
        .await
        .unwrap();
    gate.release.notify_one();

    assert_eq!(reader.await.unwrap(), 0);
    assert_eq!(h.ctx.cache.get(&keys::unread_count("bob")).await, None);

    let query = UnreadCountQuery { user_id: "bob".to_string() };
    assert_eq!(h.ctx.query_handler.unread_count(query).await.unwrap(), 1);
    assert_eq!(
        h.ctx.cache.get(&keys::unread_count("bob")).await.as_deref(),
        Some("1")
    );
}
