//! 实时扇出
//!
//! 传输通道是可选能力：未挂载、无订阅者、超时或出错都记为 `Skipped`，
//! 通知仍保留在存储中，客户端下次拉取可见。

use std::sync::Arc;
use std::time::Duration;

use ripple_core::metrics::FanoutMetrics;
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::domain::model::{
    EnrichedNotification, RealtimeMessage, StreamEvent, stream_topic, user_topic,
};
use crate::domain::repository::RealtimeTransport;

pub const EVENT_NOTIFICATION_NEW: &str = "notification:new";
pub const EVENT_NOTIFICATION_UNREAD: &str = "notification:unread";

pub const DEFAULT_REALTIME_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    /// 至少一个连接收到
    Delivered(usize),
    Skipped,
}

impl PublishOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, PublishOutcome::Delivered(_))
    }
}

#[derive(Serialize)]
struct UnreadPayload<'a> {
    user_id: &'a str,
    count: i64,
}

pub struct RealtimeFanout {
    transport: RwLock<Option<Arc<dyn RealtimeTransport>>>,
    timeout: Duration,
    metrics: Arc<FanoutMetrics>,
}

impl RealtimeFanout {
    pub fn new(timeout: Duration, metrics: Arc<FanoutMetrics>) -> Self {
        Self {
            transport: RwLock::new(None),
            timeout,
            metrics,
        }
    }

    pub fn with_transport(
        transport: Arc<dyn RealtimeTransport>,
        timeout: Duration,
        metrics: Arc<FanoutMetrics>,
    ) -> Self {
        Self {
            transport: RwLock::new(Some(transport)),
            timeout,
            metrics,
        }
    }

    pub async fn attach_transport(&self, transport: Arc<dyn RealtimeTransport>) {
        *self.transport.write().await = Some(transport);
    }

    pub async fn detach_transport(&self) {
        *self.transport.write().await = None;
    }

    pub async fn has_transport(&self) -> bool {
        self.transport.read().await.is_some()
    }

    /// 推送新通知到接收者的 `user:{id}` 主题
    pub async fn publish(
        &self,
        recipient_id: &str,
        notification: &EnrichedNotification,
    ) -> PublishOutcome {
        self.publish_to(user_topic(recipient_id), EVENT_NOTIFICATION_NEW, notification)
            .await
    }

    pub async fn publish_unread_count(&self, user_id: &str, count: i64) -> PublishOutcome {
        self.publish_to(
            user_topic(user_id),
            EVENT_NOTIFICATION_UNREAD,
            &UnreadPayload { user_id, count },
        )
        .await
    }

    pub async fn publish_stream_event(&self, stream_id: &str, event: &StreamEvent) -> PublishOutcome {
        self.publish_to(stream_topic(stream_id), event.event_name(), event)
            .await
    }

    async fn publish_to<T: Serialize + ?Sized>(
        &self,
        topic: String,
        event: &str,
        payload: &T,
    ) -> PublishOutcome {
        let outcome = self.emit(topic, event, payload).await;
        let label = if outcome.is_delivered() {
            "delivered"
        } else {
            "skipped"
        };
        self.metrics
            .realtime_publish_total
            .with_label_values(&[label])
            .inc();
        outcome
    }

    async fn emit<T: Serialize + ?Sized>(
        &self,
        topic: String,
        event: &str,
        payload: &T,
    ) -> PublishOutcome {
        let Some(transport) = self.transport.read().await.clone() else {
            debug!(topic = %topic, event = %event, "Realtime transport not attached, skipping");
            return PublishOutcome::Skipped;
        };

        let payload = match serde_json::to_value(payload) {
            Ok(value) => value,
            Err(err) => {
                warn!(topic = %topic, event = %event, error = %err, "Failed to serialize realtime payload");
                return PublishOutcome::Skipped;
            }
        };

        let message = RealtimeMessage {
            topic: topic.clone(),
            event: event.to_string(),
            payload,
        };

        match tokio::time::timeout(self.timeout, transport.emit(message)).await {
            Ok(Ok(0)) => {
                debug!(topic = %topic, event = %event, "No live connection for topic");
                PublishOutcome::Skipped
            }
            Ok(Ok(receivers)) => PublishOutcome::Delivered(receivers),
            Ok(Err(err)) => {
                warn!(topic = %topic, event = %event, error = %err, "Realtime publish failed");
                PublishOutcome::Skipped
            }
            Err(_) => {
                warn!(
                    topic = %topic,
                    event = %event,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "Realtime publish timed out"
                );
                PublishOutcome::Skipped
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use chrono::Utc;

    use super::*;
    use crate::domain::model::{Notification, NotificationEvent, NotificationType};
    use crate::error::{FanoutError, Result};
    use crate::infrastructure::realtime::BroadcastHub;

    struct FailingTransport;

    #[async_trait]
    impl RealtimeTransport for FailingTransport {
        async fn emit(&self, _message: RealtimeMessage) -> Result<usize> {
            Err(FanoutError::Realtime("socket layer down".into()))
        }
    }

    /// 永远等不到回执的传输
    struct StalledTransport;

    #[async_trait]
    impl RealtimeTransport for StalledTransport {
        async fn emit(&self, _message: RealtimeMessage) -> Result<usize> {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok(1)
        }
    }

    fn enriched() -> EnrichedNotification {
        EnrichedNotification {
            notification: Notification::from_event(
                NotificationEvent::follow("bob", "alice"),
                Utc::now(),
            ),
            sender: None,
            target_excerpt: None,
        }
    }

    #[tokio::test]
    async fn test_publish_without_transport_is_skipped() {
        let fanout = RealtimeFanout::new(DEFAULT_REALTIME_TIMEOUT, Arc::new(FanoutMetrics::default()));
        assert_eq!(fanout.publish("bob", &enriched()).await, PublishOutcome::Skipped);
    }

    #[tokio::test]
    async fn test_transport_error_is_skipped() {
        let fanout = RealtimeFanout::with_transport(
            Arc::new(FailingTransport),
            DEFAULT_REALTIME_TIMEOUT,
            Arc::new(FanoutMetrics::default()),
        );
        assert_eq!(fanout.publish("bob", &enriched()).await, PublishOutcome::Skipped);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_transport_times_out_as_skipped() {
        let metrics = Arc::new(FanoutMetrics::new());
        let fanout = RealtimeFanout::with_transport(
            Arc::new(StalledTransport),
            Duration::from_millis(250),
            metrics.clone(),
        );

        let started = tokio::time::Instant::now();
        assert_eq!(fanout.publish("bob", &enriched()).await, PublishOutcome::Skipped);
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(250));
        assert!(elapsed < Duration::from_secs(10));
        assert_eq!(
            metrics.realtime_publish_total.with_label_values(&["skipped"]).get(),
            1
        );
    }

    #[tokio::test]
    async fn test_publish_delivers_enriched_payload() {
        let hub = Arc::new(BroadcastHub::default());
        let mut rx = hub.subscribe("user:bob");
        let fanout = RealtimeFanout::new(DEFAULT_REALTIME_TIMEOUT, Arc::new(FanoutMetrics::default()));
        fanout.attach_transport(hub).await;

        let notification = enriched();
        assert_eq!(
            fanout.publish("bob", &notification).await,
            PublishOutcome::Delivered(1)
        );

        let message = rx.recv().await.unwrap();
        assert_eq!(message.event, EVENT_NOTIFICATION_NEW);
        assert_eq!(message.payload["type"], NotificationType::Follow.as_str());
        assert_eq!(message.payload["id"], notification.notification.id);

        fanout.detach_transport().await;
        assert_eq!(fanout.publish("bob", &notification).await, PublishOutcome::Skipped);
    }
}
