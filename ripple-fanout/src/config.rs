use std::collections::HashMap;
use std::env;
use std::time::Duration;

use ripple_core::config::{CacheConnectSection, CacheTtlSection};
use ripple_core::{PostgresInstanceConfig, RippleAppConfig};

use crate::error::FanoutError;

/// 缓存后端
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheBackend {
    Redis,
    Memory,
    Disabled,
}

impl CacheBackend {
    fn parse(value: &str) -> Result<Self, FanoutError> {
        match value.trim().to_ascii_lowercase().as_str() {
            "redis" => Ok(CacheBackend::Redis),
            "memory" => Ok(CacheBackend::Memory),
            "disabled" | "none" => Ok(CacheBackend::Disabled),
            other => Err(FanoutError::Config(format!("unknown cache backend: {other}"))),
        }
    }
}

/// 浏览器推送提供者
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushProvider {
    Http,
    /// 只记录投递，不发出网络请求
    Memory,
}

impl PushProvider {
    fn parse(value: &str) -> Result<Self, FanoutError> {
        match value.trim().to_ascii_lowercase().as_str() {
            "http" | "webpush" => Ok(PushProvider::Http),
            "memory" | "noop" => Ok(PushProvider::Memory),
            other => Err(FanoutError::Config(format!("unknown push provider: {other}"))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FanoutConfig {
    pub service_name: String,
    pub cache_backend: CacheBackend,
    pub redis_url: String,
    pub redis_connect_timeout: Option<Duration>,
    pub redis_command_timeout: Option<Duration>,
    pub cache_ttl: CacheTtlSection,
    pub cache_connect: CacheConnectSection,
    /// 未配置时使用内存仓储
    pub postgres: Option<PostgresInstanceConfig>,
    pub dedup_windows: HashMap<String, u64>,
    pub push_provider: PushProvider,
    pub push_app_name: String,
    pub push_icon: Option<String>,
    pub push_badge: Option<String>,
    pub push_timeout: Duration,
    pub push_message_ttl_seconds: Option<u64>,
    pub vapid_private_key: Option<String>,
    pub vapid_subject: String,
    pub realtime_timeout: Duration,
    pub realtime_channel_capacity: usize,
}

impl FanoutConfig {
    pub fn from_app_config(app: &RippleAppConfig) -> Result<Self, FanoutError> {
        let service = app.fanout_service();
        let redis_name = service.redis.as_deref().unwrap_or("cache");
        let postgres_name = service.postgres.as_deref().unwrap_or("fanout");
        let redis_profile = app.redis_profile(redis_name);

        let service_name = env::var("RIPPLE_FANOUT_SERVICE_NAME")
            .ok()
            .or_else(|| service.service_name.clone())
            .unwrap_or_else(|| app.service.name.clone());

        let redis_url = env::var("RIPPLE_FANOUT_REDIS_URL")
            .ok()
            .or_else(|| redis_profile.map(|cfg| cfg.url.clone()))
            .unwrap_or_else(|| "redis://127.0.0.1/".to_string());

        let cache_backend = match env::var("RIPPLE_FANOUT_CACHE_BACKEND")
            .ok()
            .or_else(|| service.cache_backend.clone())
        {
            Some(value) => CacheBackend::parse(&value)?,
            None => CacheBackend::Redis,
        };

        let postgres = match env::var("RIPPLE_FANOUT_POSTGRES_URL") {
            Ok(url) => Some(PostgresInstanceConfig {
                url,
                max_connections: None,
                min_connections: None,
            }),
            Err(_) => app.postgres_profile(postgres_name).cloned(),
        };

        let push_provider = match env::var("RIPPLE_FANOUT_PUSH_PROVIDER")
            .ok()
            .or_else(|| service.push.provider.clone())
        {
            Some(value) => PushProvider::parse(&value)?,
            None => PushProvider::Http,
        };

        let push_timeout_ms = env_u64("RIPPLE_FANOUT_PUSH_TIMEOUT_MS")
            .or(service.push.timeout_ms)
            .unwrap_or(5_000);

        let realtime_timeout_ms = env_u64("RIPPLE_FANOUT_REALTIME_TIMEOUT_MS")
            .or(service.realtime_timeout_ms)
            .unwrap_or(2_000);

        let push_app_name = env::var("RIPPLE_FANOUT_APP_NAME")
            .ok()
            .or_else(|| service.push.app_name.clone())
            .unwrap_or_else(|| "Ripple".to_string());

        let vapid_private_key = env::var("RIPPLE_FANOUT_VAPID_PRIVATE_KEY")
            .ok()
            .or_else(|| service.push.vapid_private_key.clone());

        let vapid_subject = env::var("RIPPLE_FANOUT_VAPID_SUBJECT")
            .ok()
            .or_else(|| service.push.vapid_subject.clone())
            .unwrap_or_else(|| "mailto:push@ripple.local".to_string());

        Ok(Self {
            service_name,
            cache_backend,
            redis_url,
            redis_connect_timeout: redis_profile
                .and_then(|cfg| cfg.connect_timeout_ms)
                .map(Duration::from_millis),
            redis_command_timeout: redis_profile
                .and_then(|cfg| cfg.command_timeout_ms)
                .map(Duration::from_millis),
            cache_ttl: service.cache_ttl.clone(),
            cache_connect: service.cache_connect.clone(),
            postgres,
            dedup_windows: service.dedup_windows.clone(),
            push_provider,
            push_app_name,
            push_icon: service.push.icon.clone(),
            push_badge: service.push.badge.clone(),
            push_timeout: Duration::from_millis(push_timeout_ms.max(1)),
            push_message_ttl_seconds: service.push.message_ttl_seconds,
            vapid_private_key,
            vapid_subject,
            realtime_timeout: Duration::from_millis(realtime_timeout_ms.max(1)),
            realtime_channel_capacity: service.realtime_channel_capacity.unwrap_or(256),
        })
    }
}

fn env_u64(name: &str) -> Option<u64> {
    env::var(name).ok().and_then(|v| v.parse::<u64>().ok())
}
