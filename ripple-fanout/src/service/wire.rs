//! Wire 风格的依赖注入模块
//!
//! `initialize` 按配置构建全部基础设施；`assemble` 只负责把已有的依赖
//! 组装成服务，测试直接传入内存实现。

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use ripple_core::RippleAppConfig;
use ripple_core::metrics::FanoutMetrics;
use tracing::{info, warn};

use crate::application::handlers::{FanoutCommandHandler, FanoutQueryHandler};
use crate::config::{CacheBackend, FanoutConfig, PushProvider};
use crate::domain::clock::{Clock, SystemClock};
use crate::domain::repository::{
    NotificationRepository, PushSender, SubscriptionRepository, TargetResolver, UserDirectory,
    ViewerCountRepository,
};
use crate::domain::service::push_dispatcher::DEFAULT_PUSH_TIMEOUT;
use crate::domain::service::realtime::DEFAULT_REALTIME_TIMEOUT;
use crate::domain::service::{
    DedupGuard, DedupPolicy, NotificationEnricher, NotificationService, PresenceCounter,
    PushDispatcher, PushPayloadBuilder, RealtimeFanout,
};
use crate::infrastructure::cache::{
    CacheLayer, CacheTtlPolicy, MemoryCacheStore, RedisCacheConnector,
};
use crate::infrastructure::directory::{
    CachedUserDirectory, StaticTargetResolver, StaticUserDirectory,
};
use crate::infrastructure::persistence::{
    self, MemoryNotificationRepository, MemorySubscriptionRepository,
    MemoryViewerCountRepository, PostgresNotificationRepository, PostgresSubscriptionRepository,
    PostgresViewerCountRepository,
};
use crate::infrastructure::push::{HttpPushSender, RecordingPushSender, VapidSigner};
use crate::infrastructure::realtime::{BroadcastHub, DEFAULT_CHANNEL_CAPACITY};
use crate::infrastructure::retry::RetryPolicy;

/// 服务组装需要的外部依赖
pub struct FanoutDependencies {
    pub notifications: Arc<dyn NotificationRepository>,
    pub subscriptions: Arc<dyn SubscriptionRepository>,
    pub viewers: Arc<dyn ViewerCountRepository>,
    pub push_sender: Arc<dyn PushSender>,
    pub users: Arc<dyn UserDirectory>,
    pub targets: Arc<dyn TargetResolver>,
    pub cache: Arc<CacheLayer>,
    pub clock: Arc<dyn Clock>,
    pub metrics: Arc<FanoutMetrics>,
}

impl FanoutDependencies {
    /// 全部使用内存实现
    pub fn in_memory() -> Self {
        let metrics = Arc::new(FanoutMetrics::new());
        Self {
            notifications: Arc::new(MemoryNotificationRepository::new()),
            subscriptions: Arc::new(MemorySubscriptionRepository::new()),
            viewers: Arc::new(MemoryViewerCountRepository::new()),
            push_sender: Arc::new(RecordingPushSender::new()),
            users: Arc::new(StaticUserDirectory::new()),
            targets: Arc::new(StaticTargetResolver::new()),
            cache: Arc::new(CacheLayer::with_store(
                MemoryCacheStore::shared(),
                CacheTtlPolicy::default(),
                metrics.clone(),
            )),
            clock: Arc::new(SystemClock),
            metrics,
        }
    }
}

/// 与基础设施无关的服务参数
#[derive(Debug, Clone)]
pub struct FanoutSettings {
    pub dedup: DedupPolicy,
    pub payload: PushPayloadBuilder,
    pub push_timeout: Duration,
    pub realtime_timeout: Duration,
    pub channel_capacity: usize,
}

impl Default for FanoutSettings {
    fn default() -> Self {
        Self {
            dedup: DedupPolicy::default(),
            payload: PushPayloadBuilder::default(),
            push_timeout: DEFAULT_PUSH_TIMEOUT,
            realtime_timeout: DEFAULT_REALTIME_TIMEOUT,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

impl FanoutSettings {
    pub fn from_config(config: &FanoutConfig) -> Self {
        Self {
            dedup: DedupPolicy::with_overrides(&config.dedup_windows),
            payload: PushPayloadBuilder::new(
                config.push_app_name.clone(),
                config.push_icon.clone(),
                config.push_badge.clone(),
            ),
            push_timeout: config.push_timeout,
            realtime_timeout: config.realtime_timeout,
            channel_capacity: config.realtime_channel_capacity,
        }
    }
}

/// 应用上下文 - 包含所有已初始化的服务
pub struct ApplicationContext {
    pub cache: Arc<CacheLayer>,
    pub hub: Arc<BroadcastHub>,
    pub realtime: Arc<RealtimeFanout>,
    pub push_dispatcher: Arc<PushDispatcher>,
    pub presence: Arc<PresenceCounter>,
    pub notification_service: Arc<NotificationService>,
    pub command_handler: Arc<FanoutCommandHandler>,
    pub query_handler: Arc<FanoutQueryHandler>,
    pub metrics: Arc<FanoutMetrics>,
}

/// 按依赖顺序组装服务
pub fn assemble(settings: FanoutSettings, deps: FanoutDependencies) -> ApplicationContext {
    // 1. 实时通道：进程内广播中心挂载到扇出服务
    let hub = Arc::new(BroadcastHub::new(settings.channel_capacity));
    let realtime = Arc::new(RealtimeFanout::with_transport(
        hub.clone(),
        settings.realtime_timeout,
        deps.metrics.clone(),
    ));

    // 2. 浏览器推送
    let push_dispatcher = Arc::new(PushDispatcher::new(
        deps.subscriptions.clone(),
        deps.push_sender.clone(),
        settings.payload,
        settings.push_timeout,
        deps.metrics.clone(),
    ));

    // 3. 计数服务
    let presence = Arc::new(PresenceCounter::new(
        deps.viewers.clone(),
        deps.notifications.clone(),
        deps.cache.clone(),
        realtime.clone(),
    ));

    // 4. 通知服务（资料查询走缓存）
    let users: Arc<dyn UserDirectory> =
        Arc::new(CachedUserDirectory::new(deps.users.clone(), deps.cache.clone()));
    let dedup = DedupGuard::new(settings.dedup, deps.notifications.clone(), deps.clock.clone());
    let notification_service = Arc::new(NotificationService::new(
        deps.notifications.clone(),
        dedup,
        NotificationEnricher::new(users, deps.targets.clone()),
        realtime.clone(),
        push_dispatcher.clone(),
        presence.clone(),
        deps.clock.clone(),
        deps.metrics.clone(),
    ));

    // 5. 应用层处理器
    let command_handler = Arc::new(FanoutCommandHandler::new(
        notification_service.clone(),
        presence.clone(),
        deps.subscriptions.clone(),
    ));
    let query_handler = Arc::new(FanoutQueryHandler::new(
        deps.notifications.clone(),
        deps.subscriptions.clone(),
        presence.clone(),
    ));

    ApplicationContext {
        cache: deps.cache,
        hub,
        realtime,
        push_dispatcher,
        presence,
        notification_service,
        command_handler,
        query_handler,
        metrics: deps.metrics,
    }
}

/// 构建应用上下文
pub async fn initialize(app_config: &RippleAppConfig) -> Result<ApplicationContext> {
    // 1. 加载服务配置
    let config = FanoutConfig::from_app_config(app_config)
        .context("Failed to resolve fanout service configuration")?;
    let metrics = FanoutMetrics::global();

    // 2. 缓存层（连接失败时以降级模式继续启动）
    let ttl = CacheTtlPolicy::from_config(&config.cache_ttl);
    let cache = match config.cache_backend {
        CacheBackend::Redis => {
            let connector = Arc::new(RedisCacheConnector::new(
                config.redis_url.clone(),
                config.redis_connect_timeout,
                config.redis_command_timeout,
            ));
            let retry = RetryPolicy::from_config(
                config.cache_connect.max_attempts,
                config.cache_connect.initial_delay_ms,
                config.cache_connect.max_delay_ms,
            );
            CacheLayer::connect(connector, retry, ttl, metrics.clone()).await
        }
        CacheBackend::Memory => {
            CacheLayer::with_store(MemoryCacheStore::shared(), ttl, metrics.clone())
        }
        CacheBackend::Disabled => {
            warn!("Cache disabled by configuration");
            CacheLayer::disabled(metrics.clone())
        }
    };
    let cache = Arc::new(cache);

    // 3. 持久化
    let (notifications, subscriptions, viewers): (
        Arc<dyn NotificationRepository>,
        Arc<dyn SubscriptionRepository>,
        Arc<dyn ViewerCountRepository>,
    ) = match &config.postgres {
        Some(pg) => {
            let pool = persistence::connect_pool(pg).await?;

            let notifications = PostgresNotificationRepository::new(pool.clone());
            notifications
                .init_schema()
                .await
                .context("Failed to initialize notifications schema")?;
            let subscriptions = PostgresSubscriptionRepository::new(pool.clone());
            subscriptions
                .init_schema()
                .await
                .context("Failed to initialize push_subscriptions schema")?;
            let viewers = PostgresViewerCountRepository::new(pool);
            viewers
                .init_schema()
                .await
                .context("Failed to initialize stream_viewer_counts schema")?;

            (
                Arc::new(notifications),
                Arc::new(subscriptions),
                Arc::new(viewers),
            )
        }
        None => {
            warn!("No postgres profile configured, using in-memory repositories");
            (
                Arc::new(MemoryNotificationRepository::new()),
                Arc::new(MemorySubscriptionRepository::new()),
                Arc::new(MemoryViewerCountRepository::new()),
            )
        }
    };

    // 4. 浏览器推送投递
    let push_sender: Arc<dyn PushSender> = match config.push_provider {
        PushProvider::Http => {
            let private_key = config
                .vapid_private_key
                .as_deref()
                .context("push.vapid_private_key is required for the http push provider")?;
            let signer = VapidSigner::from_base64_private_key(private_key, config.vapid_subject.clone())
                .context("Failed to load VAPID key")?;
            info!(public_key = %signer.public_key(), "VAPID signer ready");
            Arc::new(
                HttpPushSender::new(config.push_timeout, config.push_message_ttl_seconds, signer)
                    .context("Failed to create HTTP push sender")?,
            )
        }
        PushProvider::Memory => Arc::new(RecordingPushSender::new()),
    };

    // 5. 组装
    let deps = FanoutDependencies {
        notifications,
        subscriptions,
        viewers,
        push_sender,
        users: Arc::new(StaticUserDirectory::new()),
        targets: Arc::new(StaticTargetResolver::new()),
        cache,
        clock: Arc::new(SystemClock),
        metrics,
    };
    let context = assemble(FanoutSettings::from_config(&config), deps);

    info!(
        service = %config.service_name,
        cache_available = context.cache.is_available().await,
        "Fanout application context initialized"
    );
    Ok(context)
}
