//! 实时计数：直播观看人数与未读通知数
//!
//! 峰值由持久化层在写入时与已存储的峰值比较，缓存只保存当前人数。
//!
//! 未读数走 cache-aside：每次失效都推进该用户的代数，读路径只在代数
//! 未变化时回填缓存，避免并发读把失效前的旧计数写回。

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::{debug, instrument, warn};

use crate::domain::model::{StreamEvent, ViewerCounts};
use crate::domain::repository::{NotificationRepository, ViewerCountRepository};
use crate::domain::service::realtime::RealtimeFanout;
use crate::error::Result;
use crate::infrastructure::cache::{CacheLayer, CacheTtl, keys};

/// 未读数代数的分片数；不同用户落到同一分片只会多跳过几次回填
const UNREAD_GENERATION_STRIPES: usize = 64;

pub struct PresenceCounter {
    viewers: Arc<dyn ViewerCountRepository>,
    notifications: Arc<dyn NotificationRepository>,
    cache: Arc<CacheLayer>,
    realtime: Arc<RealtimeFanout>,
    unread_generations: Box<[AtomicU64]>,
}

impl PresenceCounter {
    pub fn new(
        viewers: Arc<dyn ViewerCountRepository>,
        notifications: Arc<dyn NotificationRepository>,
        cache: Arc<CacheLayer>,
        realtime: Arc<RealtimeFanout>,
    ) -> Self {
        Self {
            viewers,
            notifications,
            cache,
            realtime,
            unread_generations: (0..UNREAD_GENERATION_STRIPES)
                .map(|_| AtomicU64::new(0))
                .collect(),
        }
    }

    /// 写入当前人数（负数按 0 处理），返回 (current, peak)
    #[instrument(skip(self))]
    pub async fn set_viewer_count(&self, stream_id: &str, count: i64) -> Result<ViewerCounts> {
        let counts = self.record(stream_id, count).await?;
        self.realtime
            .publish_stream_event(
                stream_id,
                &StreamEvent::ViewerCount {
                    current: counts.current,
                    peak: counts.peak,
                },
            )
            .await;
        Ok(counts)
    }

    pub async fn viewer_joined(
        &self,
        stream_id: &str,
        viewer_id: &str,
        count: i64,
    ) -> Result<ViewerCounts> {
        let counts = self.set_viewer_count(stream_id, count).await?;
        self.realtime
            .publish_stream_event(
                stream_id,
                &StreamEvent::ViewerJoin {
                    viewer_id: viewer_id.to_string(),
                    current: counts.current,
                },
            )
            .await;
        Ok(counts)
    }

    pub async fn viewer_left(
        &self,
        stream_id: &str,
        viewer_id: &str,
        count: i64,
    ) -> Result<ViewerCounts> {
        let counts = self.set_viewer_count(stream_id, count).await?;
        self.realtime
            .publish_stream_event(
                stream_id,
                &StreamEvent::ViewerLeave {
                    viewer_id: viewer_id.to_string(),
                    current: counts.current,
                },
            )
            .await;
        Ok(counts)
    }

    /// 当前人数先查缓存；峰值总是来自持久化层
    pub async fn get_viewer_count(&self, stream_id: &str) -> Result<ViewerCounts> {
        let stored = self.viewers.load(stream_id).await?.unwrap_or(ViewerCounts {
            current: 0,
            peak: 0,
        });
        let current = self
            .cache
            .get_json::<i64>(&keys::stream_viewers(stream_id))
            .await
            .unwrap_or(stored.current);
        Ok(ViewerCounts {
            current,
            peak: stored.peak.max(current),
        })
    }

    pub async fn get_unread_count(&self, user_id: &str) -> Result<i64> {
        let key = keys::unread_count(user_id);
        if let Some(count) = self.cache.get_json::<i64>(&key).await {
            return Ok(count);
        }

        let generation = self.unread_generation(user_id);
        let observed = generation.load(Ordering::SeqCst);
        let count = self.notifications.unread_count(user_id).await?;

        if generation.load(Ordering::SeqCst) != observed {
            debug!(user_id = %user_id, "Unread count changed during read, skipping cache fill");
            return Ok(count);
        }
        self.cache
            .set_json_with_policy(&key, &count, CacheTtl::UnreadCount)
            .await;
        // 写入与并发失效交错时，撤回刚写入的值
        if generation.load(Ordering::SeqCst) != observed {
            self.cache.delete(&key).await;
        }
        Ok(count)
    }

    /// 先推进代数再删除缓存，之后开始的读取都会重新计数
    pub async fn invalidate_unread(&self, user_id: &str) {
        self.unread_generation(user_id)
            .fetch_add(1, Ordering::SeqCst);
        self.cache.delete(&keys::unread_count(user_id)).await;
    }

    fn unread_generation(&self, user_id: &str) -> &AtomicU64 {
        let mut hasher = DefaultHasher::new();
        user_id.hash(&mut hasher);
        &self.unread_generations[hasher.finish() as usize % self.unread_generations.len()]
    }

    /// 失效缓存后重新计算并推送给在线客户端
    pub async fn refresh_unread(&self, user_id: &str) {
        self.invalidate_unread(user_id).await;
        match self.get_unread_count(user_id).await {
            Ok(count) => {
                self.realtime.publish_unread_count(user_id, count).await;
            }
            Err(err) => warn!(user_id = %user_id, error = %err, "Failed to refresh unread count"),
        }
    }

    async fn record(&self, stream_id: &str, count: i64) -> Result<ViewerCounts> {
        let counts = self.viewers.record(stream_id, count.max(0)).await?;
        self.cache
            .set_json_with_policy(
                &keys::stream_viewers(stream_id),
                &counts.current,
                CacheTtl::StreamViewers,
            )
            .await;
        Ok(counts)
    }
}
