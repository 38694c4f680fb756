//! Ripple Core 错误类型
//!
//! - 配置加载与校验错误
//! - 基础设施层使用 `anyhow` 附加上下文，在边界处转换为这里的类型化错误

use thiserror::Error;

/// 核心库错误类型
#[derive(Debug, Error)]
pub enum CoreError {
    /// 配置错误
    #[error("Configuration error: {0}")]
    Config(String),

    /// 配置引用了不存在的连接配置
    #[error("Unknown {kind} profile referenced by service config: {name}")]
    UnknownProfile { kind: &'static str, name: String },
}

pub type CoreResult<T> = std::result::Result<T, CoreError>;

impl From<anyhow::Error> for CoreError {
    fn from(err: anyhow::Error) -> Self {
        CoreError::Config(format!("{err:#}"))
    }
}
