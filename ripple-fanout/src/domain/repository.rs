use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::model::{
    DedupKey, NewPushSubscription, Notification, NotificationPage, NotificationType,
    PushPayload, PushSubscription, RealtimeMessage, SenderProfile, ViewerCounts,
};
use crate::error::{PushDeliveryError, Result};

/// 通知存储（通知历史与未读数的权威来源）
#[async_trait]
pub trait NotificationRepository: Send + Sync {
    /// 持久化通知；recipient == sender 时不创建，返回 None
    async fn create(&self, notification: Notification) -> Result<Option<Notification>>;

    /// 查询 `since` 之后创建的相同 (recipient, sender, type, target) 通知
    async fn find_recent_duplicate(
        &self,
        key: &DedupKey<'_>,
        since: DateTime<Utc>,
    ) -> Result<Option<Notification>>;

    /// 分页查询（按创建时间倒序，页码从 1 开始）
    async fn list_for_user(&self, user_id: &str, page: u32, page_size: u32)
    -> Result<NotificationPage>;

    async fn unread_count(&self, user_id: &str) -> Result<i64>;

    /// 标记已读；只有接收者可以标记，返回是否有记录被更新
    async fn mark_read(&self, id: &str, user_id: &str) -> Result<bool>;

    async fn mark_all_read(&self, user_id: &str) -> Result<u64>;

    /// 查询引用该目标的通知接收者（去重）
    async fn recipients_for_target(&self, target_ref: &str) -> Result<Vec<String>>;

    /// 目标被删除时级联删除通知
    async fn delete_by_target(&self, target_ref: &str) -> Result<u64>;
}

/// 浏览器推送订阅注册表
#[async_trait]
pub trait SubscriptionRepository: Send + Sync {
    /// 按 (user_id, endpoint) 幂等写入，重复订阅会刷新密钥并重新激活
    async fn upsert(&self, subscription: NewPushSubscription) -> Result<PushSubscription>;

    /// 显式取消订阅（唯一的硬删除路径）
    async fn remove(&self, user_id: &str, endpoint: &str) -> Result<bool>;

    async fn active_for(&self, user_id: &str) -> Result<Vec<PushSubscription>>;

    /// 包含已停用的订阅
    async fn list_for(&self, user_id: &str) -> Result<Vec<PushSubscription>>;

    async fn find(&self, subscription_id: &str) -> Result<Option<PushSubscription>>;

    /// 停用订阅（只翻转 active，不删除记录）
    async fn deactivate(&self, subscription_id: &str) -> Result<bool>;
}

/// 直播观看人数的持久化存储
#[async_trait]
pub trait ViewerCountRepository: Send + Sync {
    /// 写入当前人数，峰值与写入时刻的已存储峰值比较取最大
    async fn record(&self, stream_id: &str, current: i64) -> Result<ViewerCounts>;

    async fn load(&self, stream_id: &str) -> Result<Option<ViewerCounts>>;
}

/// 实时通道（每个用户/直播间一个广播主题）
#[async_trait]
pub trait RealtimeTransport: Send + Sync {
    /// 发送消息，返回收到消息的订阅者数量
    async fn emit(&self, message: RealtimeMessage) -> Result<usize>;
}

/// 浏览器推送投递
#[async_trait]
pub trait PushSender: Send + Sync {
    async fn send(
        &self,
        subscription: &PushSubscription,
        payload: &PushPayload,
    ) -> std::result::Result<(), PushDeliveryError>;
}

/// 用户资料（外部协作方）
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn profile(&self, user_id: &str) -> Result<Option<SenderProfile>>;
}

/// 通知目标摘要（外部协作方）
#[async_trait]
pub trait TargetResolver: Send + Sync {
    async fn excerpt(&self, kind: NotificationType, target_ref: &str) -> Result<Option<String>>;
}
