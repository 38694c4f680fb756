//! Ripple Core 配置模块
//!
//! 该模块提供了完整的应用程序配置管理功能，包括：
//! - 配置文件加载和解析（单文件或目录）
//! - 环境特定配置覆盖
//! - 各种服务配置定义
//! - Redis、PostgreSQL 等基础设施配置

use std::collections::HashMap;
use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use std::sync::OnceLock;
use toml::Value;
use tracing::warn;

use crate::error::{CoreError, CoreResult};

mod manager;
pub use manager::ConfigManager;

/// 全局应用配置实例，使用 OnceLock 确保只初始化一次
static APP_CONFIG: OnceLock<RippleAppConfig> = OnceLock::new();

/// Redis 连接配置
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RedisPoolConfig {
    /// Redis 服务器地址
    pub url: String,
    /// 建连超时（毫秒）
    #[serde(default)]
    pub connect_timeout_ms: Option<u64>,
    /// 单条命令超时（毫秒）
    #[serde(default)]
    pub command_timeout_ms: Option<u64>,
}

/// PostgreSQL 数据库实例配置
#[derive(Debug, Clone, Deserialize, Default)]
pub struct PostgresInstanceConfig {
    /// 数据库连接 URL
    pub url: String,
    /// 最大连接数
    #[serde(default)]
    pub max_connections: Option<u32>,
    /// 最小连接数
    #[serde(default)]
    pub min_connections: Option<u32>,
}

/// 日志配置
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// 日志级别（RUST_LOG 优先）
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub with_target: bool,
    #[serde(default)]
    pub with_thread_ids: bool,
    #[serde(default)]
    pub with_file: bool,
    #[serde(default)]
    pub with_line_number: bool,
    /// 是否输出 JSON 格式日志
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            with_target: true,
            with_thread_ids: false,
            with_file: false,
            with_line_number: false,
            json: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// 服务标识
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceIdentity {
    pub name: String,
    #[serde(default)]
    pub version: Option<String>,
}

impl Default for ServiceIdentity {
    fn default() -> Self {
        Self {
            name: "ripple".to_string(),
            version: None,
        }
    }
}

/// 缓存 TTL 策略表（秒）
#[derive(Debug, Clone, Deserialize, Default)]
pub struct CacheTtlSection {
    #[serde(default)]
    pub profile_seconds: Option<u64>,
    #[serde(default)]
    pub feed_seconds: Option<u64>,
    #[serde(default)]
    pub trending_seconds: Option<u64>,
    #[serde(default)]
    pub unread_seconds: Option<u64>,
    #[serde(default)]
    pub session_seconds: Option<u64>,
    #[serde(default)]
    pub reference_seconds: Option<u64>,
    #[serde(default)]
    pub stream_viewers_seconds: Option<u64>,
}

/// 缓存建连重试配置
#[derive(Debug, Clone, Deserialize, Default)]
pub struct CacheConnectSection {
    #[serde(default)]
    pub max_attempts: Option<u32>,
    #[serde(default)]
    pub initial_delay_ms: Option<u64>,
    #[serde(default)]
    pub max_delay_ms: Option<u64>,
}

/// 浏览器推送配置
#[derive(Debug, Clone, Deserialize, Default)]
pub struct PushServiceConfig {
    /// 推送提供者：http / memory
    #[serde(default)]
    pub provider: Option<String>,
    /// 推送标题（应用名）
    #[serde(default)]
    pub app_name: Option<String>,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub badge: Option<String>,
    /// 单个端点投递超时（毫秒）
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    /// 推送消息在推送服务中的保留时间（秒）
    #[serde(default)]
    pub message_ttl_seconds: Option<u64>,
    /// VAPID 私钥（base64url 编码的 32 字节 P-256 标量）
    #[serde(default)]
    pub vapid_private_key: Option<String>,
    /// VAPID `sub` 声明（mailto: 或 https: 联系方式）
    #[serde(default)]
    pub vapid_subject: Option<String>,
}

/// 扇出服务配置
#[derive(Debug, Clone, Deserialize, Default)]
pub struct FanoutServiceConfig {
    /// 服务名称
    #[serde(default)]
    pub service_name: Option<String>,
    /// 使用的 Redis 配置名
    #[serde(default)]
    pub redis: Option<String>,
    /// 使用的 PostgreSQL 配置名
    #[serde(default)]
    pub postgres: Option<String>,
    /// 缓存后端：redis / memory / disabled
    #[serde(default)]
    pub cache_backend: Option<String>,
    #[serde(default)]
    pub cache_ttl: CacheTtlSection,
    #[serde(default)]
    pub cache_connect: CacheConnectSection,
    /// 按通知类型的去重窗口（秒），0 表示不去重
    #[serde(default)]
    pub dedup_windows: HashMap<String, u64>,
    #[serde(default)]
    pub push: PushServiceConfig,
    /// 实时推送超时（毫秒）
    #[serde(default)]
    pub realtime_timeout_ms: Option<u64>,
    /// 每个主题的广播通道容量
    #[serde(default)]
    pub realtime_channel_capacity: Option<usize>,
}

/// 服务配置集合
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ServicesConfig {
    #[serde(default)]
    pub fanout: Option<FanoutServiceConfig>,
}

/// Ripple 应用配置主结构体
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RippleAppConfig {
    #[serde(default)]
    pub service: ServiceIdentity,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Redis 配置映射
    #[serde(default)]
    pub redis: HashMap<String, RedisPoolConfig>,
    /// PostgreSQL 配置映射
    #[serde(default)]
    pub postgres: HashMap<String, PostgresInstanceConfig>,
    /// 服务配置
    #[serde(default)]
    pub services: ServicesConfig,
}

impl RippleAppConfig {
    /// 获取 Redis 配置
    pub fn redis_profile(&self, name: &str) -> Option<&RedisPoolConfig> {
        self.redis.get(name)
    }

    /// 获取 PostgreSQL 配置
    pub fn postgres_profile(&self, name: &str) -> Option<&PostgresInstanceConfig> {
        self.postgres.get(name)
    }

    /// 获取扇出服务配置
    pub fn fanout_service(&self) -> FanoutServiceConfig {
        self.services.fanout.clone().unwrap_or_default()
    }

    /// 校验服务配置引用的连接配置是否存在
    pub fn validate(&self) -> CoreResult<()> {
        let fanout = self.fanout_service();
        if let Some(name) = fanout.redis.as_deref() {
            if self.redis_profile(name).is_none() {
                return Err(CoreError::UnknownProfile {
                    kind: "redis",
                    name: name.to_string(),
                });
            }
        }
        if let Some(name) = fanout.postgres.as_deref() {
            if self.postgres_profile(name).is_none() {
                return Err(CoreError::UnknownProfile {
                    kind: "postgres",
                    name: name.to_string(),
                });
            }
        }
        for (kind, window) in &fanout.dedup_windows {
            if kind.trim().is_empty() {
                return Err(CoreError::Config(format!(
                    "dedup window {window}s configured without a notification type"
                )));
            }
        }
        Ok(())
    }
}

/// 加载配置（全局只加载一次）
pub fn load_config(path: Option<&str>) -> &'static RippleAppConfig {
    let candidates: Vec<PathBuf> = match path {
        Some(p) => vec![PathBuf::from(p)],
        None => vec![PathBuf::from("config"), PathBuf::from("config.toml")],
    };

    APP_CONFIG.get_or_init(|| load_with_fallback(&candidates))
}

/// 加载配置并校验
pub fn load_config_with_validation(path: Option<&str>) -> CoreResult<&'static RippleAppConfig> {
    let cfg = load_config(path);
    cfg.validate()?;
    Ok(cfg)
}

/// 获取应用配置
pub fn app_config() -> Option<&'static RippleAppConfig> {
    APP_CONFIG.get()
}

/// 从指定路径加载配置（不写入全局实例）
pub fn load_config_from_path(path: impl AsRef<Path>) -> Result<RippleAppConfig> {
    load_config_from_source(path.as_ref())
}

/// 使用备选方案加载配置
fn load_with_fallback(candidates: &[PathBuf]) -> RippleAppConfig {
    for path in candidates {
        match load_config_from_source(path) {
            Ok(cfg) => return cfg,
            Err(err) => {
                warn!("failed to load config from {}: {err:#}", path.display());
            }
        }
    }

    warn!("no configuration source succeeded, falling back to defaults");
    RippleAppConfig::default()
}

/// 从源加载配置
fn load_config_from_source(path: &Path) -> Result<RippleAppConfig> {
    if !path.exists() {
        return Err(anyhow!(
            "configuration path {} does not exist",
            path.display()
        ));
    }

    let metadata = path
        .metadata()
        .with_context(|| format!("unable to read metadata for {}", path.display()))?;

    if metadata.is_dir() {
        load_config_from_directory(path)
    } else {
        load_config_from_file(path)
    }
}

/// 从文件加载配置
fn load_config_from_file(path: &Path) -> Result<RippleAppConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("unable to read config file: {}", path.display()))?;
    let cfg: RippleAppConfig = toml::from_str(&content)
        .with_context(|| format!("invalid config format: {}", path.display()))?;
    Ok(cfg)
}

/// 从目录加载配置
///
/// 合并顺序：`base.toml` → `shared/` → `services/` → `overrides/` → 环境配置
fn load_config_from_directory(path: &Path) -> Result<RippleAppConfig> {
    let base_file = path.join("base.toml");
    if !base_file.exists() {
        return Err(anyhow!(
            "missing base configuration: {}",
            base_file.display()
        ));
    }

    let mut merged = load_toml_value(&base_file)?;

    if !merged.is_table() {
        return Err(anyhow!(
            "base configuration must be a table: {}",
            base_file.display()
        ));
    }

    merge_directory(&mut merged, &path.join("shared"))?;
    merge_directory(&mut merged, &path.join("services"))?;
    merge_directory(&mut merged, &path.join("overrides"))?;
    ConfigManager::merge_environment_config(&mut merged, path)?;

    let cfg: RippleAppConfig = merged
        .try_into()
        .with_context(|| format!("invalid configuration after merging {}", path.display()))?;

    Ok(cfg)
}

/// 合并目录中的配置
fn merge_directory(root: &mut Value, dir: &Path) -> Result<()> {
    if !dir.exists() {
        return Ok(());
    }

    let mut entries = fs::read_dir(dir)
        .with_context(|| format!("unable to read config directory {}", dir.display()))?
        .filter_map(|entry| entry.ok())
        .filter(|entry| {
            entry
                .path()
                .extension()
                .and_then(OsStr::to_str)
                .map(|ext| ext.eq_ignore_ascii_case("toml"))
                .unwrap_or(false)
        })
        .collect::<Vec<_>>();

    entries.sort_by_key(|entry| entry.path());

    for entry in entries {
        let value = load_toml_value(&entry.path())?;
        merge_value(root, value);
    }

    Ok(())
}

/// 加载 TOML 值
fn load_toml_value(path: &Path) -> Result<Value> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("unable to read config fragment {}", path.display()))?;
    let value: Value = toml::from_str(&content)
        .with_context(|| format!("invalid TOML content in fragment {}", path.display()))?;
    Ok(value)
}

/// 合并值（表递归合并，其余类型覆盖）
pub(crate) fn merge_value(base: &mut Value, overlay: Value) {
    match overlay {
        Value::Table(overlay_table) => {
            if let Value::Table(base_table) = base {
                for (key, overlay_value) in overlay_table.into_iter() {
                    match base_table.get_mut(&key) {
                        Some(base_value) => merge_value(base_value, overlay_value),
                        None => {
                            base_table.insert(key, overlay_value);
                        }
                    }
                }
            } else {
                *base = Value::Table(overlay_table);
            }
        }
        other => {
            *base = other;
        }
    }
}
