use std::str::FromStr;

use anyhow::{Context, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};

use crate::domain::model::{
    DedupKey, Notification, NotificationPage, NotificationType, normalize_page,
};
use crate::domain::repository::NotificationRepository;
use crate::error::Result;

#[derive(Debug, FromRow)]
struct NotificationRow {
    id: String,
    recipient_id: String,
    sender_id: Option<String>,
    kind: String,
    target_ref: Option<String>,
    read: bool,
    created_at: DateTime<Utc>,
}

impl TryFrom<NotificationRow> for Notification {
    type Error = anyhow::Error;

    fn try_from(row: NotificationRow) -> std::result::Result<Self, Self::Error> {
        let kind = NotificationType::from_str(&row.kind)
            .map_err(|_| anyhow!("invalid notification type: {}", row.kind))?;
        Ok(Notification {
            id: row.id,
            recipient_id: row.recipient_id,
            sender_id: row.sender_id,
            kind,
            target_ref: row.target_ref,
            read: row.read,
            created_at: row.created_at,
        })
    }
}

const SELECT_COLUMNS: &str =
    "id, recipient_id, sender_id, kind, target_ref, read, created_at";

/// 通知存储（PostgreSQL）
pub struct PostgresNotificationRepository {
    pool: PgPool,
}

impl PostgresNotificationRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// 初始化数据库表
    pub async fn init_schema(&self) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS notifications (
                id TEXT PRIMARY KEY,
                recipient_id TEXT NOT NULL,
                sender_id TEXT,
                kind TEXT NOT NULL,
                target_ref TEXT,
                read BOOLEAN NOT NULL DEFAULT FALSE,
                created_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .context("failed to create notifications table")?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_notifications_recipient_created ON notifications(recipient_id, created_at DESC)",
        )
        .execute(&self.pool)
        .await
        .context("failed to create index idx_notifications_recipient_created")?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_notifications_target ON notifications(target_ref)",
        )
        .execute(&self.pool)
        .await
        .context("failed to create index idx_notifications_target")?;

        Ok(())
    }
}

#[async_trait]
impl NotificationRepository for PostgresNotificationRepository {
    async fn create(&self, notification: Notification) -> Result<Option<Notification>> {
        if notification.is_self_directed() {
            return Ok(None);
        }

        sqlx::query(
            r#"
            INSERT INTO notifications (id, recipient_id, sender_id, kind, target_ref, read, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(&notification.id)
        .bind(&notification.recipient_id)
        .bind(&notification.sender_id)
        .bind(notification.kind.as_str())
        .bind(&notification.target_ref)
        .bind(notification.read)
        .bind(notification.created_at)
        .execute(&self.pool)
        .await
        .context("failed to insert notification")?;

        Ok(Some(notification))
    }

    async fn find_recent_duplicate(
        &self,
        key: &DedupKey<'_>,
        since: DateTime<Utc>,
    ) -> Result<Option<Notification>> {
        let row = sqlx::query_as::<_, NotificationRow>(&format!(
            r#"
            SELECT {SELECT_COLUMNS} FROM notifications
            WHERE recipient_id = $1
              AND sender_id IS NOT DISTINCT FROM $2
              AND kind = $3
              AND target_ref IS NOT DISTINCT FROM $4
              AND created_at >= $5
            ORDER BY created_at DESC
            LIMIT 1
            "#
        ))
        .bind(key.recipient_id)
        .bind(key.sender_id)
        .bind(key.kind.as_str())
        .bind(key.target_ref)
        .bind(since)
        .fetch_optional(&self.pool)
        .await
        .context("failed to query recent duplicate notification")?;

        Ok(row.map(Notification::try_from).transpose()?)
    }

    async fn list_for_user(
        &self,
        user_id: &str,
        page: u32,
        page_size: u32,
    ) -> Result<NotificationPage> {
        let (page, page_size) = normalize_page(page, page_size);
        let offset = i64::from(page - 1) * i64::from(page_size);

        let total: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM notifications WHERE recipient_id = $1")
                .bind(user_id)
                .fetch_one(&self.pool)
                .await
                .context("failed to count notifications")?;

        let rows = sqlx::query_as::<_, NotificationRow>(&format!(
            r#"
            SELECT {SELECT_COLUMNS} FROM notifications
            WHERE recipient_id = $1
            ORDER BY created_at DESC, id DESC
            LIMIT $2 OFFSET $3
            "#
        ))
        .bind(user_id)
        .bind(i64::from(page_size))
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .context("failed to list notifications")?;

        let items = rows
            .into_iter()
            .map(Notification::try_from)
            .collect::<anyhow::Result<Vec<_>>>()?;
        let has_more = offset + (items.len() as i64) < total;

        Ok(NotificationPage {
            items,
            page,
            page_size,
            total: total.max(0) as u64,
            has_more,
        })
    }

    async fn unread_count(&self, user_id: &str) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM notifications WHERE recipient_id = $1 AND read = FALSE",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
        .context("failed to count unread notifications")?;
        Ok(count)
    }

    async fn mark_read(&self, id: &str, user_id: &str) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE notifications SET read = TRUE WHERE id = $1 AND recipient_id = $2 AND read = FALSE",
        )
        .bind(id)
        .bind(user_id)
        .execute(&self.pool)
        .await
        .context("failed to mark notification read")?;
        Ok(result.rows_affected() > 0)
    }

    async fn mark_all_read(&self, user_id: &str) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE notifications SET read = TRUE WHERE recipient_id = $1 AND read = FALSE",
        )
        .bind(user_id)
        .execute(&self.pool)
        .await
        .context("failed to mark all notifications read")?;
        Ok(result.rows_affected())
    }

    async fn recipients_for_target(&self, target_ref: &str) -> Result<Vec<String>> {
        let recipients: Vec<String> = sqlx::query_scalar(
            "SELECT DISTINCT recipient_id FROM notifications WHERE target_ref = $1",
        )
        .bind(target_ref)
        .fetch_all(&self.pool)
        .await
        .context("failed to query notification recipients for target")?;
        Ok(recipients)
    }

    async fn delete_by_target(&self, target_ref: &str) -> Result<u64> {
        let result = sqlx::query("DELETE FROM notifications WHERE target_ref = $1")
            .bind(target_ref)
            .execute(&self.pool)
            .await
            .context("failed to delete notifications by target")?;
        Ok(result.rows_affected())
    }
}
