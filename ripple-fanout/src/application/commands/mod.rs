//! 命令结构体定义（Command DTO）

use serde::{Deserialize, Serialize};

use crate::domain::model::{NewPushSubscription, NotificationEvent};

/// 创建通知（领域服务触发，调用方不等待）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateNotificationCommand {
    pub event: NotificationEvent,
}

/// 关注通知
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FollowNotificationCommand {
    pub recipient_id: String,
    pub sender_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarkReadCommand {
    pub notification_id: String,
    pub user_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarkAllReadCommand {
    pub user_id: String,
}

/// 目标（帖子 / 直播）被删除
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetDeletedCommand {
    pub target_ref: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscribePushCommand {
    pub subscription: NewPushSubscription,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnsubscribePushCommand {
    pub user_id: String,
    pub endpoint: String,
}

/// 直播观看人数变化
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViewerCountCommand {
    pub stream_id: String,
    pub count: i64,
}

/// 观众进入 / 离开直播间
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViewerPresenceCommand {
    pub stream_id: String,
    pub viewer_id: String,
    pub count: i64,
    pub joined: bool,
}
