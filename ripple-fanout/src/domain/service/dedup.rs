//! 通知去重策略
//!
//! 每种通知类型一个回看窗口：窗口内已存在相同 (recipient, sender, type, target)
//! 的通知时抑制新通知。没有窗口的类型不查询存储。
//!
//! 同一去重键的「查询 → 写入」在进程内由 [`DedupPermit`] 串行化；
//! 多实例部署下的跨进程竞争仍可能产生重复。

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Duration;
use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, warn};

use crate::domain::clock::Clock;
use crate::domain::model::{NotificationEvent, NotificationType};
use crate::domain::repository::NotificationRepository;
use crate::error::Result;

/// 按类型的去重窗口表
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DedupPolicy {
    windows: HashMap<NotificationType, Duration>,
}

impl Default for DedupPolicy {
    fn default() -> Self {
        let mut windows = HashMap::new();
        windows.insert(NotificationType::Follow, Duration::hours(24));
        windows.insert(NotificationType::Like, Duration::hours(1));
        windows.insert(NotificationType::Repost, Duration::hours(1));
        Self { windows }
    }
}

impl DedupPolicy {
    /// 不做任何去重
    pub fn none() -> Self {
        Self {
            windows: HashMap::new(),
        }
    }

    /// 以默认表为基础，用配置覆盖（秒；0 表示关闭该类型的去重）
    ///
    /// 未知的类型名会被忽略并告警
    pub fn with_overrides(overrides: &HashMap<String, u64>) -> Self {
        let mut policy = Self::default();
        for (name, seconds) in overrides {
            match name.parse::<NotificationType>() {
                Ok(kind) => policy.set_window(kind, Duration::seconds(*seconds as i64)),
                Err(_) => warn!(notification_type = %name, "Ignoring dedup window for unknown type"),
            }
        }
        policy
    }

    pub fn set_window(&mut self, kind: NotificationType, window: Duration) {
        if window <= Duration::zero() {
            self.windows.remove(&kind);
        } else {
            self.windows.insert(kind, window);
        }
    }

    pub fn window(&self, kind: NotificationType) -> Option<Duration> {
        self.windows.get(&kind).copied()
    }
}

/// 去重判定结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DedupDecision {
    Proceed,
    Suppress { existing_id: String },
}

/// 持有期间，同一去重键的其他创建请求会等待
pub struct DedupPermit<'a> {
    locks: &'a DashMap<String, Arc<Mutex<()>>>,
    key: String,
    _guard: OwnedMutexGuard<()>,
}

impl Drop for DedupPermit<'_> {
    fn drop(&mut self) {
        // 表里一份 + 本许可一份：没有等待者时回收锁
        self.locks
            .remove_if(&self.key, |_, lock| Arc::strong_count(lock) == 2);
    }
}

pub struct DedupGuard {
    policy: DedupPolicy,
    store: Arc<dyn NotificationRepository>,
    clock: Arc<dyn Clock>,
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl DedupGuard {
    pub fn new(
        policy: DedupPolicy,
        store: Arc<dyn NotificationRepository>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            policy,
            store,
            clock,
            locks: DashMap::new(),
        }
    }

    /// 获取去重键的许可；没有去重窗口的类型返回 `None`
    ///
    /// 调用方应在 [`check`](Self::check) 之前获取，并持有到通知写入完成
    pub async fn acquire(&self, event: &NotificationEvent) -> Option<DedupPermit<'_>> {
        self.policy.window(event.kind)?;

        let key = lock_key(event);
        let lock = self.locks.entry(key.clone()).or_default().clone();
        let guard = lock.lock_owned().await;
        Some(DedupPermit {
            locks: &self.locks,
            key,
            _guard: guard,
        })
    }

    /// 当前仍被持有或等待的去重锁数量
    pub fn pending_locks(&self) -> usize {
        self.locks.len()
    }

    pub fn policy(&self) -> &DedupPolicy {
        &self.policy
    }

    pub async fn check(&self, event: &NotificationEvent) -> Result<DedupDecision> {
        let Some(window) = self.policy.window(event.kind) else {
            return Ok(DedupDecision::Proceed);
        };

        let since = self.clock.now() - window;
        match self
            .store
            .find_recent_duplicate(&event.dedup_key(), since)
            .await?
        {
            Some(existing) => {
                debug!(
                    recipient_id = %event.recipient_id,
                    notification_type = %event.kind,
                    existing_id = %existing.id,
                    "Suppressing duplicate notification"
                );
                Ok(DedupDecision::Suppress {
                    existing_id: existing.id,
                })
            }
            None => Ok(DedupDecision::Proceed),
        }
    }
}

fn lock_key(event: &NotificationEvent) -> String {
    let key = event.dedup_key();
    format!(
        "{}\u{1f}{}\u{1f}{}\u{1f}{}",
        key.recipient_id,
        key.sender_id.unwrap_or_default(),
        key.kind,
        key.target_ref.unwrap_or_default()
    )
}
