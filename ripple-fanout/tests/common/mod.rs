#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use ripple_core::metrics::FanoutMetrics;
use ripple_fanout::domain::clock::ManualClock;
use ripple_fanout::domain::model::{
    DedupKey, NewPushSubscription, Notification, NotificationPage, PushKeys, SenderProfile,
};
use ripple_fanout::domain::repository::NotificationRepository;
use ripple_fanout::error::Result;
use ripple_fanout::infrastructure::cache::{CacheLayer, CacheTtlPolicy, MemoryCacheStore};
use ripple_fanout::infrastructure::directory::{StaticTargetResolver, StaticUserDirectory};
use ripple_fanout::infrastructure::persistence::{
    MemoryNotificationRepository, MemorySubscriptionRepository, MemoryViewerCountRepository,
};
use ripple_fanout::infrastructure::push::RecordingPushSender;
use ripple_fanout::service::{ApplicationContext, FanoutDependencies, FanoutSettings, assemble};
use tokio::sync::Notify;

/// 在存储调用中注入的延迟与暂停点
#[derive(Default)]
pub struct StoreHooks {
    /// 去重查询返回前等待的时间
    pub dedup_delay: Option<Duration>,
    /// 第一次未读计数读取完成后暂停，直到放行
    pub unread_gate: Option<Arc<UnreadGate>>,
}

pub struct UnreadGate {
    armed: AtomicBool,
    /// 读取已拿到存储中的计数
    pub loaded: Notify,
    /// 放行被暂停的读取
    pub release: Notify,
}

impl UnreadGate {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            armed: AtomicBool::new(true),
            loaded: Notify::new(),
            release: Notify::new(),
        })
    }
}

/// 包装内存仓储，按 [`StoreHooks`] 改变时序
pub struct HookedNotificationRepository {
    inner: Arc<MemoryNotificationRepository>,
    hooks: StoreHooks,
}

#[async_trait]
impl NotificationRepository for HookedNotificationRepository {
    async fn create(&self, notification: Notification) -> Result<Option<Notification>> {
        self.inner.create(notification).await
    }

    async fn find_recent_duplicate(
        &self,
        key: &DedupKey<'_>,
        since: DateTime<Utc>,
    ) -> Result<Option<Notification>> {
        let found = self.inner.find_recent_duplicate(key, since).await?;
        if let Some(delay) = self.hooks.dedup_delay {
            tokio::time::sleep(delay).await;
        }
        Ok(found)
    }

    async fn list_for_user(
        &self,
        user_id: &str,
        page: u32,
        page_size: u32,
    ) -> Result<NotificationPage> {
        self.inner.list_for_user(user_id, page, page_size).await
    }

    async fn unread_count(&self, user_id: &str) -> Result<i64> {
        let count = self.inner.unread_count(user_id).await?;
        if let Some(gate) = &self.hooks.unread_gate {
            if gate.armed.swap(false, Ordering::SeqCst) {
                gate.loaded.notify_one();
                gate.release.notified().await;
            }
        }
        Ok(count)
    }

    async fn mark_read(&self, id: &str, user_id: &str) -> Result<bool> {
        self.inner.mark_read(id, user_id).await
    }

    async fn mark_all_read(&self, user_id: &str) -> Result<u64> {
        self.inner.mark_all_read(user_id).await
    }

    async fn recipients_for_target(&self, target_ref: &str) -> Result<Vec<String>> {
        self.inner.recipients_for_target(target_ref).await
    }

    async fn delete_by_target(&self, target_ref: &str) -> Result<u64> {
        self.inner.delete_by_target(target_ref).await
    }
}

/// 全内存的测试环境，保留各个实现的具体类型以便断言
pub struct Harness {
    pub ctx: ApplicationContext,
    pub notifications: Arc<MemoryNotificationRepository>,
    pub subscriptions: Arc<MemorySubscriptionRepository>,
    pub viewers: Arc<MemoryViewerCountRepository>,
    pub push: Arc<RecordingPushSender>,
    pub cache_store: Arc<MemoryCacheStore>,
    pub users: Arc<StaticUserDirectory>,
    pub targets: Arc<StaticTargetResolver>,
    pub clock: Arc<ManualClock>,
}

impl Harness {
    pub async fn new() -> Self {
        Self::with_settings(FanoutSettings::default()).await
    }

    pub async fn with_push_timeout(timeout: Duration) -> Self {
        Self::with_settings(FanoutSettings {
            push_timeout: timeout,
            ..FanoutSettings::default()
        })
        .await
    }

    pub async fn with_settings(settings: FanoutSettings) -> Self {
        Self::with_hooks(settings, StoreHooks::default()).await
    }

    pub async fn with_hooks(settings: FanoutSettings, hooks: StoreHooks) -> Self {
        let metrics = Arc::new(FanoutMetrics::default());
        let notifications = Arc::new(MemoryNotificationRepository::new());
        let subscriptions = Arc::new(MemorySubscriptionRepository::new());
        let viewers = Arc::new(MemoryViewerCountRepository::new());
        let push = Arc::new(RecordingPushSender::new());
        let cache_store = MemoryCacheStore::shared();
        let users = Arc::new(StaticUserDirectory::new());
        let targets = Arc::new(StaticTargetResolver::new());
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap(),
        ));

        let cache = Arc::new(CacheLayer::with_store(
            cache_store.clone(),
            CacheTtlPolicy::default(),
            metrics.clone(),
        ));

        for (id, name) in [("alice", "Alice"), ("bob", "Bob"), ("carol", "Carol")] {
            users
                .insert(SenderProfile {
                    id: id.to_string(),
                    username: id.to_string(),
                    display_name: name.to_string(),
                    avatar_url: Some(format!("https://cdn.example.com/{id}.png")),
                })
                .await;
        }

        let ctx = assemble(
            settings,
            FanoutDependencies {
                notifications: Arc::new(HookedNotificationRepository {
                    inner: notifications.clone(),
                    hooks,
                }),
                subscriptions: subscriptions.clone(),
                viewers: viewers.clone(),
                push_sender: push.clone(),
                users: users.clone(),
                targets: targets.clone(),
                cache,
                clock: clock.clone(),
                metrics,
            },
        );

        Self {
            ctx,
            notifications,
            subscriptions,
            viewers,
            push,
            cache_store,
            users,
            targets,
            clock,
        }
    }
}

pub fn subscription(user_id: &str, endpoint: &str) -> NewPushSubscription {
    NewPushSubscription {
        user_id: user_id.to_string(),
        endpoint: endpoint.to_string(),
        keys: PushKeys {
            p256dh: "BNcRdreALRFXTkOOUHK1EtK2wtaz5Ry4YfYCA_0QTpQtUbVlUls0VJXg7A8u-Ts1XbjhazAkj7I99e8QcYP7DkM".to_string(),
            auth: "tBHItJI5svbpez7KI4CCXg".to_string(),
        },
        user_agent: Some("Mozilla/5.0".to_string()),
    }
}
