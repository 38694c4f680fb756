//! 内存仓储实现（测试与单机开发环境）

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::domain::model::{
    DedupKey, NewPushSubscription, Notification, NotificationPage, PushSubscription,
    ViewerCounts, normalize_page,
};
use crate::domain::repository::{
    NotificationRepository, SubscriptionRepository, ViewerCountRepository,
};
use crate::error::Result;

#[derive(Default)]
pub struct MemoryNotificationRepository {
    notifications: Arc<RwLock<Vec<Notification>>>,
}

impl MemoryNotificationRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// 某个用户的全部通知数量（含已读）
    pub async fn count_for(&self, user_id: &str) -> usize {
        self.notifications
            .read()
            .await
            .iter()
            .filter(|n| n.recipient_id == user_id)
            .count()
    }
}

#[async_trait]
impl NotificationRepository for MemoryNotificationRepository {
    async fn create(&self, notification: Notification) -> Result<Option<Notification>> {
        if notification.is_self_directed() {
            return Ok(None);
        }
        self.notifications.write().await.push(notification.clone());
        Ok(Some(notification))
    }

    async fn find_recent_duplicate(
        &self,
        key: &DedupKey<'_>,
        since: DateTime<Utc>,
    ) -> Result<Option<Notification>> {
        let notifications = self.notifications.read().await;
        Ok(notifications
            .iter()
            .filter(|n| n.created_at >= since && key.matches(n))
            .max_by_key(|n| n.created_at)
            .cloned())
    }

    async fn list_for_user(
        &self,
        user_id: &str,
        page: u32,
        page_size: u32,
    ) -> Result<NotificationPage> {
        let (page, page_size) = normalize_page(page, page_size);
        let notifications = self.notifications.read().await;

        let mut items: Vec<Notification> = notifications
            .iter()
            .filter(|n| n.recipient_id == user_id)
            .cloned()
            .collect();
        // 插入顺序作为同一时刻的次序
        items.reverse();
        items.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let total = items.len() as u64;
        let offset = ((page - 1) as usize).saturating_mul(page_size as usize);
        let items: Vec<Notification> = items
            .into_iter()
            .skip(offset)
            .take(page_size as usize)
            .collect();
        let has_more = offset as u64 + (items.len() as u64) < total;

        Ok(NotificationPage {
            items,
            page,
            page_size,
            total,
            has_more,
        })
    }

    async fn unread_count(&self, user_id: &str) -> Result<i64> {
        let notifications = self.notifications.read().await;
        Ok(notifications
            .iter()
            .filter(|n| n.recipient_id == user_id && !n.read)
            .count() as i64)
    }

    async fn mark_read(&self, id: &str, user_id: &str) -> Result<bool> {
        let mut notifications = self.notifications.write().await;
        match notifications
            .iter_mut()
            .find(|n| n.id == id && n.recipient_id == user_id)
        {
            Some(notification) => {
                let changed = !notification.read;
                notification.read = true;
                Ok(changed)
            }
            None => Ok(false),
        }
    }

    async fn mark_all_read(&self, user_id: &str) -> Result<u64> {
        let mut notifications = self.notifications.write().await;
        let mut updated = 0;
        for notification in notifications
            .iter_mut()
            .filter(|n| n.recipient_id == user_id && !n.read)
        {
            notification.read = true;
            updated += 1;
        }
        Ok(updated)
    }

    async fn recipients_for_target(&self, target_ref: &str) -> Result<Vec<String>> {
        let notifications = self.notifications.read().await;
        let mut recipients: Vec<String> = notifications
            .iter()
            .filter(|n| n.target_ref.as_deref() == Some(target_ref))
            .map(|n| n.recipient_id.clone())
            .collect();
        recipients.sort();
        recipients.dedup();
        Ok(recipients)
    }

    async fn delete_by_target(&self, target_ref: &str) -> Result<u64> {
        let mut notifications = self.notifications.write().await;
        let before = notifications.len();
        notifications.retain(|n| n.target_ref.as_deref() != Some(target_ref));
        Ok((before - notifications.len()) as u64)
    }
}

#[derive(Default)]
pub struct MemorySubscriptionRepository {
    subscriptions: Arc<RwLock<Vec<PushSubscription>>>,
}

impl MemorySubscriptionRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SubscriptionRepository for MemorySubscriptionRepository {
    async fn upsert(&self, subscription: NewPushSubscription) -> Result<PushSubscription> {
        subscription.validate()?;
        let now = Utc::now();
        let mut subscriptions = self.subscriptions.write().await;

        if let Some(existing) = subscriptions
            .iter_mut()
            .find(|s| s.user_id == subscription.user_id && s.endpoint == subscription.endpoint)
        {
            existing.keys = subscription.keys;
            existing.user_agent = subscription.user_agent;
            existing.active = true;
            existing.updated_at = now;
            return Ok(existing.clone());
        }

        let created = PushSubscription {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: subscription.user_id,
            endpoint: subscription.endpoint,
            keys: subscription.keys,
            user_agent: subscription.user_agent,
            active: true,
            created_at: now,
            updated_at: now,
        };
        subscriptions.push(created.clone());
        Ok(created)
    }

    async fn remove(&self, user_id: &str, endpoint: &str) -> Result<bool> {
        let mut subscriptions = self.subscriptions.write().await;
        let before = subscriptions.len();
        subscriptions.retain(|s| !(s.user_id == user_id && s.endpoint == endpoint));
        Ok(subscriptions.len() < before)
    }

    async fn active_for(&self, user_id: &str) -> Result<Vec<PushSubscription>> {
        let subscriptions = self.subscriptions.read().await;
        Ok(subscriptions
            .iter()
            .filter(|s| s.user_id == user_id && s.active)
            .cloned()
            .collect())
    }

    async fn list_for(&self, user_id: &str) -> Result<Vec<PushSubscription>> {
        let subscriptions = self.subscriptions.read().await;
        Ok(subscriptions
            .iter()
            .filter(|s| s.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn find(&self, subscription_id: &str) -> Result<Option<PushSubscription>> {
        let subscriptions = self.subscriptions.read().await;
        Ok(subscriptions.iter().find(|s| s.id == subscription_id).cloned())
    }

    async fn deactivate(&self, subscription_id: &str) -> Result<bool> {
        let mut subscriptions = self.subscriptions.write().await;
        match subscriptions
            .iter_mut()
            .find(|s| s.id == subscription_id && s.active)
        {
            Some(subscription) => {
                subscription.active = false;
                subscription.updated_at = Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[derive(Default)]
pub struct MemoryViewerCountRepository {
    counts: Arc<RwLock<HashMap<String, ViewerCounts>>>,
}

impl MemoryViewerCountRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ViewerCountRepository for MemoryViewerCountRepository {
    async fn record(&self, stream_id: &str, current: i64) -> Result<ViewerCounts> {
        // 读取与写入在同一把写锁内完成
        let mut counts = self.counts.write().await;
        let stored_peak = counts.get(stream_id).map(|c| c.peak).unwrap_or(0);
        let updated = ViewerCounts {
            current,
            peak: stored_peak.max(current),
        };
        counts.insert(stream_id.to_string(), updated);
        Ok(updated)
    }

    async fn load(&self, stream_id: &str) -> Result<Option<ViewerCounts>> {
        Ok(self.counts.read().await.get(stream_id).copied())
    }
}
