//! 统一异常处理模块

use std::time::Duration;

use thiserror::Error;

/// 扇出服务错误类型
#[derive(Debug, Error)]
pub enum FanoutError {
    /// 参数校验失败（调用方可见）
    #[error("Validation error: {0}")]
    Validation(String),

    /// 持久化层错误
    #[error("Storage error: {0}")]
    Storage(String),

    /// 实时通道错误
    #[error("Realtime transport error: {0}")]
    Realtime(String),

    /// 配置错误
    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, FanoutError>;

impl From<anyhow::Error> for FanoutError {
    fn from(err: anyhow::Error) -> Self {
        FanoutError::Storage(format!("{err:#}"))
    }
}

impl From<sqlx::Error> for FanoutError {
    fn from(err: sqlx::Error) -> Self {
        FanoutError::Storage(err.to_string())
    }
}

impl From<ripple_core::CoreError> for FanoutError {
    fn from(err: ripple_core::CoreError) -> Self {
        FanoutError::Config(err.to_string())
    }
}

/// 缓存后端错误（只在缓存层内部出现，不会传播给调用方）
#[derive(Debug, Error)]
pub enum CacheStoreError {
    /// 后端不可达（连接失败、超时）
    #[error("Cache backend unreachable: {0}")]
    Unreachable(String),

    /// 命令执行失败
    #[error("Cache command failed: {0}")]
    Command(String),
}

impl From<redis::RedisError> for CacheStoreError {
    fn from(err: redis::RedisError) -> Self {
        if err.is_io_error() || err.is_connection_dropped() || err.is_timeout() {
            CacheStoreError::Unreachable(err.to_string())
        } else {
            CacheStoreError::Command(err.to_string())
        }
    }
}

/// 单个推送端点的投递错误
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PushDeliveryError {
    /// 端点已失效（HTTP 404 / 410）
    #[error("Push endpoint gone (status {0})")]
    Gone(u16),

    /// 推送服务拒绝投递
    #[error("Push endpoint rejected delivery (status {status}): {reason}")]
    Rejected { status: u16, reason: String },

    /// 网络传输错误
    #[error("Push transport error: {0}")]
    Transport(String),

    /// 投递超时
    #[error("Push delivery timed out after {0:?}")]
    Timeout(Duration),

    /// 负载加密或 VAPID 签名失败（订阅密钥无效、负载过大）
    #[error("Push encryption error: {0}")]
    Encryption(String),
}

impl PushDeliveryError {
    /// 是否应当停用该订阅
    pub fn is_gone(&self) -> bool {
        matches!(self, PushDeliveryError::Gone(_))
    }
}
