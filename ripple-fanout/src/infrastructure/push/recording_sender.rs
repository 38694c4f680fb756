//! 记录投递结果的推送实现（测试与 `provider = "memory"`）

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::model::{PushPayload, PushSubscription};
use crate::domain::repository::PushSender;
use crate::error::PushDeliveryError;

/// 一次成功的投递
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedDelivery {
    pub subscription_id: String,
    pub endpoint: String,
    pub payload: PushPayload,
}

#[derive(Debug, Clone)]
enum EndpointBehavior {
    Fail(PushDeliveryError),
    Stall(Duration),
}

#[derive(Default)]
pub struct RecordingPushSender {
    deliveries: RwLock<Vec<RecordedDelivery>>,
    attempts: RwLock<Vec<String>>,
    behaviors: RwLock<HashMap<String, EndpointBehavior>>,
}

impl RecordingPushSender {
    pub fn new() -> Self {
        Self::default()
    }

    /// 之后对该端点的投递返回 Gone(410)
    pub async fn mark_gone(&self, endpoint: &str) {
        self.fail_with(endpoint, PushDeliveryError::Gone(410)).await;
    }

    pub async fn fail_with(&self, endpoint: &str, error: PushDeliveryError) {
        self.behaviors
            .write()
            .await
            .insert(endpoint.to_string(), EndpointBehavior::Fail(error));
    }

    /// 投递在返回前挂起指定时长（用于验证超时）
    pub async fn stall(&self, endpoint: &str, delay: Duration) {
        self.behaviors
            .write()
            .await
            .insert(endpoint.to_string(), EndpointBehavior::Stall(delay));
    }

    pub async fn deliveries(&self) -> Vec<RecordedDelivery> {
        self.deliveries.read().await.clone()
    }

    /// 所有投递尝试的端点（含失败）
    pub async fn attempts(&self) -> Vec<String> {
        self.attempts.read().await.clone()
    }
}

#[async_trait]
impl PushSender for RecordingPushSender {
    async fn send(
        &self,
        subscription: &PushSubscription,
        payload: &PushPayload,
    ) -> Result<(), PushDeliveryError> {
        self.attempts
            .write()
            .await
            .push(subscription.endpoint.clone());

        let behavior = self
            .behaviors
            .read()
            .await
            .get(&subscription.endpoint)
            .cloned();
        match behavior {
            Some(EndpointBehavior::Fail(err)) => return Err(err),
            Some(EndpointBehavior::Stall(delay)) => tokio::time::sleep(delay).await,
            None => {}
        }

        self.deliveries.write().await.push(RecordedDelivery {
            subscription_id: subscription.id.clone(),
            endpoint: subscription.endpoint.clone(),
            payload: payload.clone(),
        });
        Ok(())
    }
}
