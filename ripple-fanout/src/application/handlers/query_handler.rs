//! 查询处理器（查询侧）
//!
//! 只读查询直接走仓储；未读数与观看人数经过计数服务，以便命中缓存。

use std::sync::Arc;

use tracing::instrument;

use crate::application::queries::{
    ListNotificationsQuery, ListSubscriptionsQuery, UnreadCountQuery, ViewerCountQuery,
};
use crate::domain::model::{NotificationPage, PushSubscription, ViewerCounts};
use crate::domain::repository::{NotificationRepository, SubscriptionRepository};
use crate::domain::service::PresenceCounter;
use crate::error::Result;

pub struct FanoutQueryHandler {
    notifications: Arc<dyn NotificationRepository>,
    subscriptions: Arc<dyn SubscriptionRepository>,
    presence: Arc<PresenceCounter>,
}

impl FanoutQueryHandler {
    pub fn new(
        notifications: Arc<dyn NotificationRepository>,
        subscriptions: Arc<dyn SubscriptionRepository>,
        presence: Arc<PresenceCounter>,
    ) -> Self {
        Self {
            notifications,
            subscriptions,
            presence,
        }
    }

    #[instrument(skip(self))]
    pub async fn list_notifications(&self, query: ListNotificationsQuery) -> Result<NotificationPage> {
        self.notifications
            .list_for_user(&query.user_id, query.page, query.page_size)
            .await
    }

    #[instrument(skip(self))]
    pub async fn unread_count(&self, query: UnreadCountQuery) -> Result<i64> {
        self.presence.get_unread_count(&query.user_id).await
    }

    #[instrument(skip(self))]
    pub async fn viewer_count(&self, query: ViewerCountQuery) -> Result<ViewerCounts> {
        self.presence.get_viewer_count(&query.stream_id).await
    }

    #[instrument(skip(self))]
    pub async fn list_subscriptions(
        &self,
        query: ListSubscriptionsQuery,
    ) -> Result<Vec<PushSubscription>> {
        self.subscriptions.list_for(&query.user_id).await
    }
}
