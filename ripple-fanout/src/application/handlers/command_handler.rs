//! 命令处理器（编排层）- 轻量级，只负责编排领域服务

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{info, instrument};

use crate::application::commands::{
    CreateNotificationCommand, FollowNotificationCommand, MarkAllReadCommand, MarkReadCommand,
    SubscribePushCommand, TargetDeletedCommand, UnsubscribePushCommand, ViewerCountCommand,
    ViewerPresenceCommand,
};
use crate::domain::model::{PushSubscription, ViewerCounts};
use crate::domain::repository::SubscriptionRepository;
use crate::domain::service::{EmitOutcome, NotificationService, PresenceCounter};
use crate::error::Result;

/// 扇出命令处理器
pub struct FanoutCommandHandler {
    notifications: Arc<NotificationService>,
    presence: Arc<PresenceCounter>,
    subscriptions: Arc<dyn SubscriptionRepository>,
}

impl FanoutCommandHandler {
    pub fn new(
        notifications: Arc<NotificationService>,
        presence: Arc<PresenceCounter>,
        subscriptions: Arc<dyn SubscriptionRepository>,
    ) -> Self {
        Self {
            notifications,
            presence,
            subscriptions,
        }
    }

    /// 同步创建通知并返回结果
    #[instrument(skip(self))]
    pub async fn handle_create_notification(
        &self,
        command: CreateNotificationCommand,
    ) -> Result<EmitOutcome> {
        self.notifications
            .create_and_emit_notification(command.event)
            .await
    }

    /// 后台创建通知，触发方不等待
    pub fn dispatch_create_notification(&self, command: CreateNotificationCommand) -> JoinHandle<()> {
        self.notifications.spawn_create_and_emit(command.event)
    }

    #[instrument(skip(self))]
    pub async fn handle_follow(&self, command: FollowNotificationCommand) -> Result<EmitOutcome> {
        self.notifications
            .create_follow_notification(&command.recipient_id, &command.sender_id)
            .await
    }

    pub fn dispatch_follow(&self, command: FollowNotificationCommand) -> JoinHandle<()> {
        self.notifications
            .spawn_follow_notification(&command.recipient_id, &command.sender_id)
    }

    #[instrument(skip(self))]
    pub async fn handle_mark_read(&self, command: MarkReadCommand) -> Result<bool> {
        self.notifications
            .mark_read(&command.notification_id, &command.user_id)
            .await
    }

    #[instrument(skip(self))]
    pub async fn handle_mark_all_read(&self, command: MarkAllReadCommand) -> Result<u64> {
        self.notifications.mark_all_read(&command.user_id).await
    }

    #[instrument(skip(self))]
    pub async fn handle_target_deleted(&self, command: TargetDeletedCommand) -> Result<u64> {
        self.notifications
            .delete_by_target(&command.target_ref)
            .await
    }

    #[instrument(skip(self, command), fields(user_id = %command.subscription.user_id))]
    pub async fn handle_subscribe(&self, command: SubscribePushCommand) -> Result<PushSubscription> {
        let subscription = self.subscriptions.upsert(command.subscription).await?;
        info!(subscription_id = %subscription.id, "Push subscription registered");
        Ok(subscription)
    }

    #[instrument(skip(self))]
    pub async fn handle_unsubscribe(&self, command: UnsubscribePushCommand) -> Result<bool> {
        self.subscriptions
            .remove(&command.user_id, &command.endpoint)
            .await
    }

    #[instrument(skip(self))]
    pub async fn handle_viewer_count(&self, command: ViewerCountCommand) -> Result<ViewerCounts> {
        self.presence
            .set_viewer_count(&command.stream_id, command.count)
            .await
    }

    #[instrument(skip(self))]
    pub async fn handle_viewer_presence(
        &self,
        command: ViewerPresenceCommand,
    ) -> Result<ViewerCounts> {
        if command.joined {
            self.presence
                .viewer_joined(&command.stream_id, &command.viewer_id, command.count)
                .await
        } else {
            self.presence
                .viewer_left(&command.stream_id, &command.viewer_id, command.count)
                .await
        }
    }
}
