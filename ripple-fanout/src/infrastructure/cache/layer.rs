//! 缓存门面
//!
//! 所有操作都不会向调用方返回错误：后端不可用时 `get` 视为未命中，
//! 写入和删除静默丢弃。连接失败后进入降级模式，直到 `reconnect` 或重启。

use std::sync::Arc;
use std::time::Duration;

use ripple_core::metrics::FanoutMetrics;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::{CacheConnector, CacheStore, CacheTtl, CacheTtlPolicy, SCAN_BATCH_SIZE};
use crate::error::CacheStoreError;
use crate::infrastructure::retry::{RetryPolicy, execute_with_retry};

pub struct CacheLayer {
    store: RwLock<Option<Arc<dyn CacheStore>>>,
    connector: Option<Arc<dyn CacheConnector>>,
    retry: RetryPolicy,
    ttl: CacheTtlPolicy,
    metrics: Arc<FanoutMetrics>,
}

impl CacheLayer {
    /// 按有界退避建立连接；全部失败后返回降级模式的缓存层
    pub async fn connect(
        connector: Arc<dyn CacheConnector>,
        retry: RetryPolicy,
        ttl: CacheTtlPolicy,
        metrics: Arc<FanoutMetrics>,
    ) -> Self {
        let layer = Self {
            store: RwLock::new(None),
            connector: Some(connector),
            retry,
            ttl,
            metrics,
        };
        layer.reconnect().await;
        layer
    }

    /// 直接使用已建立的存储（测试与内存后端）
    pub fn with_store(
        store: Arc<dyn CacheStore>,
        ttl: CacheTtlPolicy,
        metrics: Arc<FanoutMetrics>,
    ) -> Self {
        Self {
            store: RwLock::new(Some(store)),
            connector: None,
            retry: RetryPolicy::default(),
            ttl,
            metrics,
        }
    }

    /// 永久降级的缓存层：所有读取未命中，所有写入丢弃
    pub fn disabled(metrics: Arc<FanoutMetrics>) -> Self {
        Self {
            store: RwLock::new(None),
            connector: None,
            retry: RetryPolicy::default(),
            ttl: CacheTtlPolicy::default(),
            metrics,
        }
    }

    pub fn ttl_policy(&self) -> &CacheTtlPolicy {
        &self.ttl
    }

    pub async fn is_available(&self) -> bool {
        self.store.read().await.is_some()
    }

    /// 释放连接，之后进入降级模式
    pub async fn close(&self) {
        if self.store.write().await.take().is_some() {
            info!("Cache layer closed");
        }
    }

    /// 重新执行有界重连，返回是否连接成功
    pub async fn reconnect(&self) -> bool {
        let Some(connector) = self.connector.clone() else {
            debug!("Cache layer has no connector, reconnect skipped");
            return self.is_available().await;
        };

        let target = connector.describe();
        let result = execute_with_retry(&self.retry, "cache_connect", || {
            let connector = connector.clone();
            async move { connector.connect().await }
        })
        .await;

        match result {
            Ok(store) => {
                *self.store.write().await = Some(store);
                info!(target = %target, "Cache layer connected");
                true
            }
            Err(err) => {
                *self.store.write().await = None;
                warn!(
                    target = %target,
                    attempts = self.retry.max_attempts,
                    error = %err,
                    "Cache unavailable, running in degraded mode"
                );
                false
            }
        }
    }

    pub async fn get(&self, key: &str) -> Option<String> {
        let store = self.current().await?;
        match store.get(key).await {
            Ok(value) => value,
            Err(err) => {
                self.degraded("get", key, &err);
                None
            }
        }
    }

    /// 读取并反序列化；格式不符的条目视为未命中
    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = self.get(key).await?;
        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(err) => {
                warn!(key = %key, error = %err, "Discarding malformed cache entry");
                None
            }
        }
    }

    /// 写入；TTL 为 0 的写入被拒绝
    pub async fn set(&self, key: &str, value: &str, ttl: Duration) {
        if ttl.is_zero() {
            warn!(key = %key, "Refusing to cache entry without a TTL");
            return;
        }
        let Some(store) = self.current().await else {
            return;
        };
        if let Err(err) = store.set_ex(key, value, ttl).await {
            self.degraded("set", key, &err);
        }
    }

    pub async fn set_json<T: Serialize + ?Sized>(&self, key: &str, value: &T, ttl: Duration) {
        match serde_json::to_string(value) {
            Ok(raw) => self.set(key, &raw, ttl).await,
            Err(err) => warn!(key = %key, error = %err, "Failed to serialize cache entry"),
        }
    }

    pub async fn set_with_policy(&self, key: &str, value: &str, class: CacheTtl) {
        self.set(key, value, self.ttl.ttl(class)).await;
    }

    pub async fn set_json_with_policy<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        class: CacheTtl,
    ) {
        self.set_json(key, value, self.ttl.ttl(class)).await;
    }

    pub async fn delete(&self, key: &str) {
        self.delete_many(&[key.to_string()]).await;
    }

    pub async fn delete_many(&self, keys: &[String]) {
        if keys.is_empty() {
            return;
        }
        let Some(store) = self.current().await else {
            return;
        };
        if let Err(err) = store.del(keys).await {
            self.degraded("delete", &keys.join(","), &err);
        }
    }

    /// 按 glob 模式删除：游标扫描，每批扫描结果立即删除
    ///
    /// 返回删除的键数量（降级时为 0）
    pub async fn delete_by_prefix(&self, pattern: &str) -> u64 {
        let Some(store) = self.current().await else {
            return 0;
        };

        let mut cursor = 0u64;
        let mut removed = 0u64;
        loop {
            let (next, keys) = match store.scan(cursor, pattern, SCAN_BATCH_SIZE).await {
                Ok(batch) => batch,
                Err(err) => {
                    self.degraded("scan", pattern, &err);
                    return removed;
                }
            };

            if !keys.is_empty() {
                match store.del(&keys).await {
                    Ok(count) => removed += count,
                    Err(err) => {
                        self.degraded("delete_by_prefix", pattern, &err);
                        return removed;
                    }
                }
            }

            if next == 0 {
                break;
            }
            cursor = next;
        }

        debug!(pattern = %pattern, removed, "Deleted cache keys by pattern");
        removed
    }

    async fn current(&self) -> Option<Arc<dyn CacheStore>> {
        self.store.read().await.clone()
    }

    fn degraded(&self, operation: &str, key: &str, err: &CacheStoreError) {
        self.metrics
            .cache_degraded_total
            .with_label_values(&[operation])
            .inc();
        warn!(operation = %operation, key = %key, error = %err, "Cache operation failed, treating as miss");
    }
}
