//! 通知领域服务 - 创建、去重、扇出与推送的编排
//!
//! 顺序：校验 → 去重 → 持久化 → 富化 → 实时推送 → 后台浏览器推送。
//! 实时与浏览器推送都是附加效果，失败不会影响创建结果。

use std::sync::Arc;

use ripple_core::metrics::FanoutMetrics;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument};

use crate::domain::clock::Clock;
use crate::domain::model::{EnrichedNotification, Notification, NotificationEvent, NotificationPage};
use crate::domain::repository::NotificationRepository;
use crate::domain::service::dedup::{DedupDecision, DedupGuard};
use crate::domain::service::enrichment::NotificationEnricher;
use crate::domain::service::presence::PresenceCounter;
use crate::domain::service::push_dispatcher::PushDispatcher;
use crate::domain::service::realtime::RealtimeFanout;
use crate::error::Result;

/// 一次创建请求的结果
#[derive(Debug)]
pub enum EmitOutcome {
    /// 已持久化并完成实时推送；浏览器推送在后台任务中进行
    Created {
        notification: EnrichedNotification,
        push: JoinHandle<()>,
    },
    /// 去重窗口内已存在相同通知
    Suppressed { existing_id: String },
    /// 接收者与发送者相同，不创建
    SelfNotification,
}

impl EmitOutcome {
    pub fn is_created(&self) -> bool {
        matches!(self, EmitOutcome::Created { .. })
    }

    pub fn notification(&self) -> Option<&EnrichedNotification> {
        match self {
            EmitOutcome::Created { notification, .. } => Some(notification),
            _ => None,
        }
    }

    /// 等待后台推送结束（创建以外的结果立即返回）
    pub async fn push_finished(self) {
        if let EmitOutcome::Created { push, .. } = self {
            if let Err(err) = push.await {
                error!(error = %err, "Push dispatch task panicked");
            }
        }
    }
}

pub struct NotificationService {
    store: Arc<dyn NotificationRepository>,
    dedup: DedupGuard,
    enricher: NotificationEnricher,
    realtime: Arc<RealtimeFanout>,
    push: Arc<PushDispatcher>,
    presence: Arc<PresenceCounter>,
    clock: Arc<dyn Clock>,
    metrics: Arc<FanoutMetrics>,
}

impl NotificationService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<dyn NotificationRepository>,
        dedup: DedupGuard,
        enricher: NotificationEnricher,
        realtime: Arc<RealtimeFanout>,
        push: Arc<PushDispatcher>,
        presence: Arc<PresenceCounter>,
        clock: Arc<dyn Clock>,
        metrics: Arc<FanoutMetrics>,
    ) -> Self {
        Self {
            store,
            dedup,
            enricher,
            realtime,
            push,
            presence,
            clock,
            metrics,
        }
    }

    #[instrument(skip(self), fields(
        recipient_id = %event.recipient_id,
        notification_type = %event.kind,
    ))]
    pub async fn create_and_emit_notification(
        &self,
        event: NotificationEvent,
    ) -> Result<EmitOutcome> {
        event.validate()?;

        if event.is_self_directed() {
            debug!("Skipping self notification");
            return Ok(EmitOutcome::SelfNotification);
        }

        let permit = self.dedup.acquire(&event).await;
        if let DedupDecision::Suppress { existing_id } = self.dedup.check(&event).await? {
            self.metrics
                .notifications_suppressed_total
                .with_label_values(&[event.kind.as_str()])
                .inc();
            return Ok(EmitOutcome::Suppressed { existing_id });
        }

        let kind = event.kind;
        let candidate = Notification::from_event(event, self.clock.now());
        let Some(stored) = self.store.create(candidate).await? else {
            return Ok(EmitOutcome::SelfNotification);
        };
        drop(permit);
        self.metrics
            .notifications_created_total
            .with_label_values(&[kind.as_str()])
            .inc();

        self.presence.invalidate_unread(&stored.recipient_id).await;

        let recipient_id = stored.recipient_id.clone();
        let enriched = self.enricher.enrich(stored).await;
        self.realtime.publish(&recipient_id, &enriched).await;
        let push = self.push.spawn_dispatch(enriched.clone());

        info!(notification_id = %enriched.notification.id, "Notification created");
        Ok(EmitOutcome::Created {
            notification: enriched,
            push,
        })
    }

    pub async fn create_follow_notification(
        &self,
        recipient_id: &str,
        sender_id: &str,
    ) -> Result<EmitOutcome> {
        self.create_and_emit_notification(NotificationEvent::follow(recipient_id, sender_id))
            .await
    }

    /// 后台创建：调用方不等待，失败在任务边界记录
    pub fn spawn_create_and_emit(self: &Arc<Self>, event: NotificationEvent) -> JoinHandle<()> {
        let service = Arc::clone(self);
        tokio::spawn(async move {
            let recipient_id = event.recipient_id.clone();
            let kind = event.kind;
            if let Err(err) = service.create_and_emit_notification(event).await {
                error!(
                    recipient_id = %recipient_id,
                    notification_type = %kind,
                    error = %err,
                    "Background notification creation failed"
                );
            }
        })
    }

    pub fn spawn_follow_notification(
        self: &Arc<Self>,
        recipient_id: &str,
        sender_id: &str,
    ) -> JoinHandle<()> {
        self.spawn_create_and_emit(NotificationEvent::follow(recipient_id, sender_id))
    }

    pub async fn list_notifications(
        &self,
        user_id: &str,
        page: u32,
        page_size: u32,
    ) -> Result<NotificationPage> {
        self.store.list_for_user(user_id, page, page_size).await
    }

    #[instrument(skip(self))]
    pub async fn mark_read(&self, notification_id: &str, user_id: &str) -> Result<bool> {
        let changed = self.store.mark_read(notification_id, user_id).await?;
        if changed {
            self.presence.refresh_unread(user_id).await;
        }
        Ok(changed)
    }

    #[instrument(skip(self))]
    pub async fn mark_all_read(&self, user_id: &str) -> Result<u64> {
        let updated = self.store.mark_all_read(user_id).await?;
        self.presence.refresh_unread(user_id).await;
        Ok(updated)
    }

    /// 目标被删除时级联删除通知，并失效受影响用户的未读数缓存
    #[instrument(skip(self))]
    pub async fn delete_by_target(&self, target_ref: &str) -> Result<u64> {
        let recipients = self.store.recipients_for_target(target_ref).await?;
        let deleted = self.store.delete_by_target(target_ref).await?;
        for recipient_id in &recipients {
            self.presence.invalidate_unread(recipient_id).await;
        }
        debug!(deleted, affected_users = recipients.len(), "Deleted notifications for target");
        Ok(deleted)
    }

    pub async fn get_unread_count(&self, user_id: &str) -> Result<i64> {
        self.presence.get_unread_count(user_id).await
    }
}
