//! 基于 Redis 的缓存存储

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, RedisResult};
use tracing::info;

use super::{CacheConnector, CacheStore};
use crate::error::CacheStoreError;

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(2);
const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_millis(500);

/// Redis 缓存存储
///
/// `ConnectionManager` 内部复用同一条多路复用连接，克隆开销很小，
/// 每个命令都使用独立的克隆，不持有任何锁。
#[derive(Clone)]
pub struct RedisCacheStore {
    manager: ConnectionManager,
    command_timeout: Duration,
}

impl RedisCacheStore {
    pub fn new(manager: ConnectionManager, command_timeout: Duration) -> Self {
        Self {
            manager,
            command_timeout,
        }
    }

    async fn run<T, F>(&self, command: F) -> Result<T, CacheStoreError>
    where
        F: Future<Output = RedisResult<T>>,
    {
        match tokio::time::timeout(self.command_timeout, command).await {
            Ok(result) => result.map_err(CacheStoreError::from),
            Err(_) => Err(CacheStoreError::Unreachable(format!(
                "redis command timed out after {:?}",
                self.command_timeout
            ))),
        }
    }
}

#[async_trait]
impl CacheStore for RedisCacheStore {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheStoreError> {
        let mut conn = self.manager.clone();
        self.run(async move {
            let value: Option<String> = conn.get(key).await?;
            Ok(value)
        })
        .await
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheStoreError> {
        let mut conn = self.manager.clone();
        let seconds = ttl.as_secs().max(1);
        self.run(async move {
            let _: () = conn.set_ex(key, value, seconds).await?;
            Ok(())
        })
        .await
    }

    async fn del(&self, keys: &[String]) -> Result<u64, CacheStoreError> {
        if keys.is_empty() {
            return Ok(0);
        }
        let mut conn = self.manager.clone();
        let keys = keys.to_vec();
        self.run(async move {
            let removed: u64 = conn.del(keys).await?;
            Ok(removed)
        })
        .await
    }

    async fn scan(
        &self,
        cursor: u64,
        pattern: &str,
        count: usize,
    ) -> Result<(u64, Vec<String>), CacheStoreError> {
        let mut conn = self.manager.clone();
        self.run(async move {
            let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(pattern)
                .arg("COUNT")
                .arg(count)
                .query_async(&mut conn)
                .await?;
            Ok((next, keys))
        })
        .await
    }

    async fn ping(&self) -> Result<(), CacheStoreError> {
        let mut conn = self.manager.clone();
        self.run(async move {
            let _: String = redis::cmd("PING").query_async(&mut conn).await?;
            Ok(())
        })
        .await
    }
}

/// Redis 连接器
pub struct RedisCacheConnector {
    url: String,
    connect_timeout: Duration,
    command_timeout: Duration,
}

impl RedisCacheConnector {
    pub fn new(
        url: impl Into<String>,
        connect_timeout: Option<Duration>,
        command_timeout: Option<Duration>,
    ) -> Self {
        Self {
            url: url.into(),
            connect_timeout: connect_timeout.unwrap_or(DEFAULT_CONNECT_TIMEOUT),
            command_timeout: command_timeout.unwrap_or(DEFAULT_COMMAND_TIMEOUT),
        }
    }
}

#[async_trait]
impl CacheConnector for RedisCacheConnector {
    async fn connect(&self) -> Result<Arc<dyn CacheStore>, CacheStoreError> {
        let client = redis::Client::open(self.url.as_str())?;
        let manager = tokio::time::timeout(self.connect_timeout, ConnectionManager::new(client))
            .await
            .map_err(|_| {
                CacheStoreError::Unreachable(format!(
                    "redis connect timed out after {:?}",
                    self.connect_timeout
                ))
            })??;

        let store = RedisCacheStore::new(manager, self.command_timeout);
        store.ping().await?;

        info!("Redis cache connected");
        Ok(Arc::new(store))
    }

    /// 去掉 URL 中的认证信息
    fn describe(&self) -> String {
        match self.url.split_once('@') {
            Some((credentials, host)) => {
                let scheme = credentials.split("://").next().unwrap_or("redis");
                format!("{scheme}://{host}")
            }
            None => self.url.clone(),
        }
    }
}
