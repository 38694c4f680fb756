//! Ripple Core 公共库
//!
//! 提供统一的配置加载、日志初始化、指标收集和错误类型

pub mod config;
pub mod error;
pub mod metrics;
pub mod tracing;

pub use config::{
    ConfigManager, FanoutServiceConfig, LoggingConfig, PostgresInstanceConfig, PushServiceConfig,
    RedisPoolConfig, RippleAppConfig, app_config, load_config, load_config_from_path,
    load_config_with_validation,
};
pub use error::{CoreError, CoreResult};
