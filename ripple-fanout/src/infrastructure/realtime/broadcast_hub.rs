//! 进程内实时广播中心
//!
//! 每个主题（`user:{id}` / `stream:{id}`）对应一个 `broadcast` 通道，
//! 客户端连接通过 `subscribe` 拿到接收端。没有接收端的主题会被清理。

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::broadcast;
use tracing::debug;

use crate::domain::model::RealtimeMessage;
use crate::domain::repository::RealtimeTransport;
use crate::error::Result;

pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

pub struct BroadcastHub {
    channels: DashMap<String, broadcast::Sender<RealtimeMessage>>,
    capacity: usize,
}

impl BroadcastHub {
    pub fn new(capacity: usize) -> Self {
        Self {
            channels: DashMap::new(),
            capacity: capacity.max(1),
        }
    }

    /// 订阅主题；主题不存在时创建
    pub fn subscribe(&self, topic: &str) -> broadcast::Receiver<RealtimeMessage> {
        self.channels
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }

    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.channels
            .get(topic)
            .map(|tx| tx.receiver_count())
            .unwrap_or(0)
    }

    pub fn topic_count(&self) -> usize {
        self.channels.len()
    }

    /// 清理所有没有接收端的主题
    pub fn prune_idle(&self) -> usize {
        let before = self.channels.len();
        self.channels.retain(|_, tx| tx.receiver_count() > 0);
        before - self.channels.len()
    }

    fn remove_if_idle(&self, topic: &str) {
        self.channels
            .remove_if(topic, |_, tx| tx.receiver_count() == 0);
    }
}

impl Default for BroadcastHub {
    fn default() -> Self {
        Self::new(DEFAULT_CHANNEL_CAPACITY)
    }
}

#[async_trait]
impl RealtimeTransport for BroadcastHub {
    async fn emit(&self, message: RealtimeMessage) -> Result<usize> {
        // 先克隆发送端再释放分片引用，避免 remove_if 与读引用在同一分片上互锁
        let sender = self.channels.get(&message.topic).map(|tx| tx.clone());
        let Some(sender) = sender else {
            return Ok(0);
        };

        let topic = message.topic.clone();
        match sender.send(message) {
            Ok(receivers) => Ok(receivers),
            Err(_) => {
                debug!(topic = %topic, "No live receivers, pruning topic");
                drop(sender);
                self.remove_if_idle(&topic);
                Ok(0)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn message(topic: &str) -> RealtimeMessage {
        RealtimeMessage {
            topic: topic.to_string(),
            event: "notification:new".to_string(),
            payload: json!({"id": "n1"}),
        }
    }

    #[tokio::test]
    async fn test_emit_reaches_subscribers_of_topic_only() {
        let hub = BroadcastHub::default();
        let mut bob = hub.subscribe("user:bob");
        let mut carol = hub.subscribe("user:carol");

        assert_eq!(hub.emit(message("user:bob")).await.unwrap(), 1);

        let received = bob.recv().await.unwrap();
        assert_eq!(received.event, "notification:new");
        assert!(carol.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_topic_without_receivers_is_pruned() {
        let hub = BroadcastHub::default();
        assert_eq!(hub.emit(message("user:nobody")).await.unwrap(), 0);

        let rx = hub.subscribe("user:bob");
        drop(rx);
        assert_eq!(hub.topic_count(), 1);
        assert_eq!(hub.emit(message("user:bob")).await.unwrap(), 0);
        assert_eq!(hub.topic_count(), 0);
    }
}
