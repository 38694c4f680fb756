//! 领域模型

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::FanoutError;

/// 通知类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    Follow,
    Like,
    Reply,
    Mention,
    Repost,
    System,
    StreamLive,
}

impl NotificationType {
    pub const ALL: [NotificationType; 7] = [
        NotificationType::Follow,
        NotificationType::Like,
        NotificationType::Reply,
        NotificationType::Mention,
        NotificationType::Repost,
        NotificationType::System,
        NotificationType::StreamLive,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationType::Follow => "follow",
            NotificationType::Like => "like",
            NotificationType::Reply => "reply",
            NotificationType::Mention => "mention",
            NotificationType::Repost => "repost",
            NotificationType::System => "system",
            NotificationType::StreamLive => "stream_live",
        }
    }

    /// 由其他用户行为触发的类型（必须带 sender）
    pub fn is_peer_generated(&self) -> bool {
        !matches!(self, NotificationType::System)
    }

    /// 需要 target_ref 的类型
    pub fn requires_target(&self) -> bool {
        matches!(
            self,
            NotificationType::Like
                | NotificationType::Reply
                | NotificationType::Mention
                | NotificationType::Repost
                | NotificationType::StreamLive
        )
    }

    /// target_ref 指向帖子的类型
    pub fn targets_post(&self) -> bool {
        matches!(
            self,
            NotificationType::Like
                | NotificationType::Reply
                | NotificationType::Mention
                | NotificationType::Repost
        )
    }
}

impl fmt::Display for NotificationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NotificationType {
    type Err = FanoutError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NotificationType::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| FanoutError::Validation(format!("unknown notification type: {s}")))
    }
}

/// 领域事件：待创建的通知
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationEvent {
    pub recipient_id: String,
    pub sender_id: Option<String>,
    pub kind: NotificationType,
    pub target_ref: Option<String>,
}

impl NotificationEvent {
    pub fn new(
        recipient_id: impl Into<String>,
        sender_id: Option<String>,
        kind: NotificationType,
        target_ref: Option<String>,
    ) -> Self {
        Self {
            recipient_id: recipient_id.into(),
            sender_id,
            kind,
            target_ref,
        }
    }

    /// 关注通知
    pub fn follow(recipient_id: impl Into<String>, sender_id: impl Into<String>) -> Self {
        Self::new(
            recipient_id,
            Some(sender_id.into()),
            NotificationType::Follow,
            None,
        )
    }

    /// 自己触发给自己的通知
    pub fn is_self_directed(&self) -> bool {
        self.sender_id.as_deref() == Some(self.recipient_id.as_str())
    }

    /// 校验事件字段（不含自通知判断）
    pub fn validate(&self) -> Result<(), FanoutError> {
        if self.recipient_id.trim().is_empty() {
            return Err(FanoutError::Validation(
                "recipient_id must not be empty".to_string(),
            ));
        }
        if self.kind.is_peer_generated() && self.sender_id.as_deref().is_none_or(str::is_empty) {
            return Err(FanoutError::Validation(format!(
                "{} notification requires a sender_id",
                self.kind
            )));
        }
        if self.kind.requires_target() && self.target_ref.as_deref().is_none_or(str::is_empty) {
            return Err(FanoutError::Validation(format!(
                "{} notification requires a target_ref",
                self.kind
            )));
        }
        Ok(())
    }

    pub fn dedup_key(&self) -> DedupKey<'_> {
        DedupKey {
            recipient_id: &self.recipient_id,
            sender_id: self.sender_id.as_deref(),
            kind: self.kind,
            target_ref: self.target_ref.as_deref(),
        }
    }
}

/// 去重查询键：(recipient, sender, type, target)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DedupKey<'a> {
    pub recipient_id: &'a str,
    pub sender_id: Option<&'a str>,
    pub kind: NotificationType,
    pub target_ref: Option<&'a str>,
}

impl DedupKey<'_> {
    pub fn matches(&self, notification: &Notification) -> bool {
        notification.recipient_id == self.recipient_id
            && notification.sender_id.as_deref() == self.sender_id
            && notification.kind == self.kind
            && notification.target_ref.as_deref() == self.target_ref
    }
}

/// 已持久化的通知
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub id: String,
    pub recipient_id: String,
    pub sender_id: Option<String>,
    #[serde(rename = "type")]
    pub kind: NotificationType,
    pub target_ref: Option<String>,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    /// 从事件构建一条新通知
    pub fn from_event(event: NotificationEvent, created_at: DateTime<Utc>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            recipient_id: event.recipient_id,
            sender_id: event.sender_id,
            kind: event.kind,
            target_ref: event.target_ref,
            read: false,
            created_at,
        }
    }

    pub fn is_self_directed(&self) -> bool {
        self.sender_id.as_deref() == Some(self.recipient_id.as_str())
    }
}

/// 通知分页结果（按创建时间倒序）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationPage {
    pub items: Vec<Notification>,
    pub page: u32,
    pub page_size: u32,
    pub total: u64,
    pub has_more: bool,
}

pub const MAX_PAGE_SIZE: u32 = 100;

/// 规范化分页参数：页码从 1 开始，页大小限制在 1..=MAX_PAGE_SIZE
pub fn normalize_page(page: u32, page_size: u32) -> (u32, u32) {
    (page.max(1), page_size.clamp(1, MAX_PAGE_SIZE))
}

/// 发送者摘要（用于富化推送内容）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SenderProfile {
    pub id: String,
    pub username: String,
    pub display_name: String,
    pub avatar_url: Option<String>,
}

/// 富化后的通知：客户端无需二次请求即可渲染
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrichedNotification {
    #[serde(flatten)]
    pub notification: Notification,
    pub sender: Option<SenderProfile>,
    pub target_excerpt: Option<String>,
}

/// 推送订阅的加密密钥
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushKeys {
    pub p256dh: String,
    pub auth: String,
}

/// 浏览器推送订阅
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushSubscription {
    pub id: String,
    pub user_id: String,
    pub endpoint: String,
    pub keys: PushKeys,
    pub user_agent: Option<String>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// 订阅请求
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPushSubscription {
    pub user_id: String,
    pub endpoint: String,
    pub keys: PushKeys,
    pub user_agent: Option<String>,
}

impl NewPushSubscription {
    pub fn validate(&self) -> Result<(), FanoutError> {
        if self.user_id.trim().is_empty() {
            return Err(FanoutError::Validation("user_id must not be empty".to_string()));
        }
        if !(self.endpoint.starts_with("https://") || self.endpoint.starts_with("http://")) {
            return Err(FanoutError::Validation(format!(
                "push endpoint must be an http(s) url: {}",
                self.endpoint
            )));
        }
        if self.keys.p256dh.is_empty() || self.keys.auth.is_empty() {
            return Err(FanoutError::Validation(
                "push subscription keys must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// 浏览器推送内容
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushPayload {
    pub title: String,
    pub body: String,
    pub icon: Option<String>,
    pub badge: Option<String>,
    pub data: PushPayloadData,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushPayloadData {
    #[serde(rename = "type")]
    pub kind: NotificationType,
    pub url: String,
}

/// 直播观看人数
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewerCounts {
    pub current: i64,
    pub peak: i64,
}

/// 直播间事件（stream:{id} 主题）
///
/// 负载里的 `event` 标签与实时通道的事件名一致
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event")]
pub enum StreamEvent {
    #[serde(rename = "viewer:count")]
    ViewerCount { current: i64, peak: i64 },
    #[serde(rename = "viewer:join")]
    ViewerJoin { viewer_id: String, current: i64 },
    #[serde(rename = "viewer:leave")]
    ViewerLeave { viewer_id: String, current: i64 },
    #[serde(rename = "chat:message")]
    ChatMessage { sender_id: String, body: String },
}

impl StreamEvent {
    /// 实时通道中的事件名
    pub fn event_name(&self) -> &'static str {
        match self {
            StreamEvent::ViewerCount { .. } => "viewer:count",
            StreamEvent::ViewerJoin { .. } => "viewer:join",
            StreamEvent::ViewerLeave { .. } => "viewer:leave",
            StreamEvent::ChatMessage { .. } => "chat:message",
        }
    }
}

/// 实时通道消息
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RealtimeMessage {
    pub topic: String,
    pub event: String,
    pub payload: serde_json::Value,
}

/// 用户主题名：`user:{id}`
pub fn user_topic(user_id: &str) -> String {
    format!("user:{user_id}")
}

/// 直播间主题名：`stream:{id}`
pub fn stream_topic(stream_id: &str) -> String {
    format!("stream:{stream_id}")
}
