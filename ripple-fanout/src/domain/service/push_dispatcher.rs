//! 浏览器推送分发
//!
//! 对接收者的每个有效订阅并发投递，单个端点失败不影响其它端点；
//! 端点返回 Gone 时停用对应订阅。整个分发过程不向调用方返回错误。

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use ripple_core::metrics::FanoutMetrics;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use crate::domain::model::{
    EnrichedNotification, NotificationType, PushPayload, PushPayloadData, PushSubscription,
};
use crate::domain::repository::{PushSender, SubscriptionRepository};
use crate::error::PushDeliveryError;

pub const DEFAULT_PUSH_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_APP_NAME: &str = "Ripple";

/// 通知类型对应的推送文案
pub fn phrase(kind: NotificationType) -> &'static str {
    match kind {
        NotificationType::Follow => "started following you",
        NotificationType::Like => "liked your post",
        NotificationType::Reply => "replied to your post",
        NotificationType::Mention => "mentioned you",
        NotificationType::Repost => "reposted your post",
        NotificationType::StreamLive => "started a live stream",
        NotificationType::System => "You have a new notification",
    }
}

/// 推送点击后的跳转地址
pub fn deep_link(notification: &EnrichedNotification) -> String {
    let record = &notification.notification;
    match (record.kind, record.target_ref.as_deref()) {
        (kind, Some(target)) if kind.targets_post() => format!("/post/{target}"),
        (NotificationType::Follow, _) => {
            let handle = notification
                .sender
                .as_ref()
                .map(|sender| sender.username.as_str())
                .or(record.sender_id.as_deref());
            match handle {
                Some(handle) => format!("/profile/{handle}"),
                None => "/notifications".to_string(),
            }
        }
        _ => "/notifications".to_string(),
    }
}

#[derive(Debug, Clone)]
pub struct PushPayloadBuilder {
    app_name: String,
    icon: Option<String>,
    badge: Option<String>,
}

impl Default for PushPayloadBuilder {
    fn default() -> Self {
        Self::new(DEFAULT_APP_NAME, None, None)
    }
}

impl PushPayloadBuilder {
    pub fn new(app_name: impl Into<String>, icon: Option<String>, badge: Option<String>) -> Self {
        Self {
            app_name: app_name.into(),
            icon,
            badge,
        }
    }

    pub fn build(&self, notification: &EnrichedNotification) -> PushPayload {
        let kind = notification.notification.kind;
        let body = match (&notification.sender, kind) {
            (_, NotificationType::System) | (None, _) => phrase(kind).to_string(),
            (Some(sender), _) => format!("{} {}", sender.display_name, phrase(kind)),
        };

        PushPayload {
            title: self.app_name.clone(),
            body,
            icon: self.icon.clone(),
            badge: self.badge.clone(),
            data: PushPayloadData {
                kind,
                url: deep_link(notification),
            },
        }
    }
}

/// 单个订阅的投递结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryReport {
    pub subscription_id: String,
    pub endpoint: String,
    pub result: Result<(), PushDeliveryError>,
    /// 是否因端点失效被停用
    pub deactivated: bool,
}

impl DeliveryReport {
    pub fn is_delivered(&self) -> bool {
        self.result.is_ok()
    }
}

pub struct PushDispatcher {
    subscriptions: Arc<dyn SubscriptionRepository>,
    sender: Arc<dyn PushSender>,
    builder: PushPayloadBuilder,
    timeout: Duration,
    metrics: Arc<FanoutMetrics>,
}

impl PushDispatcher {
    pub fn new(
        subscriptions: Arc<dyn SubscriptionRepository>,
        sender: Arc<dyn PushSender>,
        builder: PushPayloadBuilder,
        timeout: Duration,
        metrics: Arc<FanoutMetrics>,
    ) -> Self {
        Self {
            subscriptions,
            sender,
            builder,
            timeout,
            metrics,
        }
    }

    pub fn payload_builder(&self) -> &PushPayloadBuilder {
        &self.builder
    }

    #[instrument(skip(self, notification), fields(
        recipient_id = %notification.notification.recipient_id,
        notification_id = %notification.notification.id,
    ))]
    pub async fn dispatch(&self, notification: &EnrichedNotification) -> Vec<DeliveryReport> {
        let recipient_id = &notification.notification.recipient_id;
        let subscriptions = match self.subscriptions.active_for(recipient_id).await {
            Ok(subscriptions) => subscriptions,
            Err(err) => {
                warn!(error = %err, "Failed to load push subscriptions, skipping push");
                return Vec::new();
            }
        };
        if subscriptions.is_empty() {
            debug!("No active push subscriptions");
            return Vec::new();
        }

        let payload = self.builder.build(notification);
        let attempts = subscriptions
            .iter()
            .map(|subscription| self.deliver(subscription, &payload));
        let results = join_all(attempts).await;

        let mut reports = Vec::with_capacity(results.len());
        for (subscription, result) in subscriptions.into_iter().zip(results) {
            let deactivated = match &result {
                Ok(()) => {
                    self.record("delivered");
                    false
                }
                Err(err) if err.is_gone() => {
                    self.record("gone");
                    self.retire(&subscription).await
                }
                Err(err) => {
                    self.record(match err {
                        PushDeliveryError::Timeout(_) => "timeout",
                        PushDeliveryError::Encryption(_) => "encryption",
                        _ => "failed",
                    });
                    warn!(
                        subscription_id = %subscription.id,
                        error = %err,
                        "Push delivery failed"
                    );
                    false
                }
            };
            reports.push(DeliveryReport {
                subscription_id: subscription.id,
                endpoint: subscription.endpoint,
                result,
                deactivated,
            });
        }

        let delivered = reports.iter().filter(|r| r.is_delivered()).count();
        debug!(
            attempted = reports.len(),
            delivered, "Push dispatch finished"
        );
        reports
    }

    /// 在独立任务中分发，调用方不等待结果
    pub fn spawn_dispatch(self: &Arc<Self>, notification: EnrichedNotification) -> JoinHandle<()> {
        let dispatcher = Arc::clone(self);
        tokio::spawn(async move {
            let reports = dispatcher.dispatch(&notification).await;
            let failed = reports.iter().filter(|r| !r.is_delivered()).count();
            if failed > 0 {
                warn!(
                    notification_id = %notification.notification.id,
                    failed,
                    attempted = reports.len(),
                    "Background push dispatch had failures"
                );
            }
        })
    }

    async fn deliver(
        &self,
        subscription: &PushSubscription,
        payload: &PushPayload,
    ) -> Result<(), PushDeliveryError> {
        match tokio::time::timeout(self.timeout, self.sender.send(subscription, payload)).await {
            Ok(result) => result,
            Err(_) => Err(PushDeliveryError::Timeout(self.timeout)),
        }
    }

    async fn retire(&self, subscription: &PushSubscription) -> bool {
        match self.subscriptions.deactivate(&subscription.id).await {
            Ok(changed) => {
                info!(
                    subscription_id = %subscription.id,
                    user_id = %subscription.user_id,
                    "Deactivated expired push subscription"
                );
                changed
            }
            Err(err) => {
                warn!(
                    subscription_id = %subscription.id,
                    error = %err,
                    "Failed to deactivate expired push subscription"
                );
                false
            }
        }
    }

    fn record(&self, outcome: &str) {
        self.metrics
            .push_delivery_total
            .with_label_values(&[outcome])
            .inc();
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::domain::model::{Notification, NotificationEvent, SenderProfile};

    fn enriched(event: NotificationEvent, sender: Option<SenderProfile>) -> EnrichedNotification {
        EnrichedNotification {
            notification: Notification::from_event(event, Utc::now()),
            sender,
            target_excerpt: None,
        }
    }

    fn alice() -> SenderProfile {
        SenderProfile {
            id: "u-alice".into(),
            username: "alice".into(),
            display_name: "Alice".into(),
            avatar_url: None,
        }
    }

    #[test]
    fn test_payload_for_like_links_to_post() {
        let builder = PushPayloadBuilder::default();
        let payload = builder.build(&enriched(
            NotificationEvent::new(
                "bob",
                Some("u-alice".into()),
                NotificationType::Like,
                Some("p9".into()),
            ),
            Some(alice()),
        ));
        assert_eq!(payload.title, DEFAULT_APP_NAME);
        assert_eq!(payload.body, "Alice liked your post");
        assert_eq!(payload.data.url, "/post/p9");
    }

    #[test]
    fn test_follow_links_to_sender_profile() {
        let with_profile = enriched(NotificationEvent::follow("bob", "u-alice"), Some(alice()));
        assert_eq!(deep_link(&with_profile), "/profile/alice");

        let without_profile = enriched(NotificationEvent::follow("bob", "u-alice"), None);
        assert_eq!(deep_link(&without_profile), "/profile/u-alice");
        assert_eq!(
            PushPayloadBuilder::default().build(&without_profile).body,
            "started following you"
        );
    }

    #[test]
    fn test_other_types_link_to_notifications() {
        let system = enriched(
            NotificationEvent::new("bob", None, NotificationType::System, None),
            None,
        );
        let payload = PushPayloadBuilder::default().build(&system);
        assert_eq!(payload.body, "You have a new notification");
        assert_eq!(payload.data.url, "/notifications");

        let live = enriched(
            NotificationEvent::new(
                "bob",
                Some("u-alice".into()),
                NotificationType::StreamLive,
                Some("s1".into()),
            ),
            Some(alice()),
        );
        assert_eq!(deep_link(&live), "/notifications");
    }
}
