//! 缓存层
//!
//! - `CacheStore`：底层键值存储，可能失败
//! - `CacheLayer`：对外的缓存门面，任何失败都降级为“未命中 / 空操作”

pub mod domain_cache;
pub mod keys;
pub mod layer;
pub mod memory_store;
pub mod redis_store;
pub mod ttl;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::CacheStoreError;

pub use layer::CacheLayer;
pub use memory_store::{MemoryCacheConnector, MemoryCacheStore};
pub use redis_store::{RedisCacheConnector, RedisCacheStore};
pub use ttl::{CacheTtl, CacheTtlPolicy};

/// 单次 SCAN 的键数量上限
pub const SCAN_BATCH_SIZE: usize = 100;

/// 底层键值存储
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheStoreError>;

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheStoreError>;

    /// 删除键，返回实际删除数量
    async fn del(&self, keys: &[String]) -> Result<u64, CacheStoreError>;

    /// 游标扫描；返回的游标为 0 表示扫描结束
    async fn scan(
        &self,
        cursor: u64,
        pattern: &str,
        count: usize,
    ) -> Result<(u64, Vec<String>), CacheStoreError>;

    async fn ping(&self) -> Result<(), CacheStoreError>;
}

/// 缓存连接器（建立 / 重建连接）
#[async_trait]
pub trait CacheConnector: Send + Sync {
    async fn connect(&self) -> Result<Arc<dyn CacheStore>, CacheStoreError>;

    /// 用于日志的连接描述
    fn describe(&self) -> String;
}
