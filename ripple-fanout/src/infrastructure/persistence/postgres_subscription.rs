use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};

use crate::domain::model::{NewPushSubscription, PushKeys, PushSubscription};
use crate::domain::repository::SubscriptionRepository;
use crate::error::Result;

#[derive(Debug, FromRow)]
struct SubscriptionRow {
    id: String,
    user_id: String,
    endpoint: String,
    p256dh: String,
    auth: String,
    user_agent: Option<String>,
    active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<SubscriptionRow> for PushSubscription {
    fn from(row: SubscriptionRow) -> Self {
        PushSubscription {
            id: row.id,
            user_id: row.user_id,
            endpoint: row.endpoint,
            keys: PushKeys {
                p256dh: row.p256dh,
                auth: row.auth,
            },
            user_agent: row.user_agent,
            active: row.active,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// 推送订阅注册表（PostgreSQL）
pub struct PostgresSubscriptionRepository {
    pool: PgPool,
}

impl PostgresSubscriptionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn init_schema(&self) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS push_subscriptions (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                endpoint TEXT NOT NULL,
                p256dh TEXT NOT NULL,
                auth TEXT NOT NULL,
                user_agent TEXT,
                active BOOLEAN NOT NULL DEFAULT TRUE,
                created_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT CURRENT_TIMESTAMP,
                UNIQUE(user_id, endpoint)
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .context("failed to create push_subscriptions table")?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_push_subscriptions_user_active ON push_subscriptions(user_id, active)",
        )
        .execute(&self.pool)
        .await
        .context("failed to create index idx_push_subscriptions_user_active")?;

        Ok(())
    }
}

#[async_trait]
impl SubscriptionRepository for PostgresSubscriptionRepository {
    async fn upsert(&self, subscription: NewPushSubscription) -> Result<PushSubscription> {
        subscription.validate()?;

        let row = sqlx::query_as::<_, SubscriptionRow>(
            r#"
            INSERT INTO push_subscriptions (id, user_id, endpoint, p256dh, auth, user_agent, active)
            VALUES ($1, $2, $3, $4, $5, $6, TRUE)
            ON CONFLICT (user_id, endpoint) DO UPDATE SET
                p256dh = EXCLUDED.p256dh,
                auth = EXCLUDED.auth,
                user_agent = EXCLUDED.user_agent,
                active = TRUE,
                updated_at = CURRENT_TIMESTAMP
            RETURNING *
            "#,
        )
        .bind(uuid::Uuid::new_v4().to_string())
        .bind(&subscription.user_id)
        .bind(&subscription.endpoint)
        .bind(&subscription.keys.p256dh)
        .bind(&subscription.keys.auth)
        .bind(&subscription.user_agent)
        .fetch_one(&self.pool)
        .await
        .context("failed to upsert push subscription")?;

        Ok(row.into())
    }

    async fn remove(&self, user_id: &str, endpoint: &str) -> Result<bool> {
        let result =
            sqlx::query("DELETE FROM push_subscriptions WHERE user_id = $1 AND endpoint = $2")
                .bind(user_id)
                .bind(endpoint)
                .execute(&self.pool)
                .await
                .context("failed to delete push subscription")?;
        Ok(result.rows_affected() > 0)
    }

    async fn active_for(&self, user_id: &str) -> Result<Vec<PushSubscription>> {
        let rows = sqlx::query_as::<_, SubscriptionRow>(
            "SELECT * FROM push_subscriptions WHERE user_id = $1 AND active = TRUE ORDER BY created_at",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .context("failed to load active push subscriptions")?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn list_for(&self, user_id: &str) -> Result<Vec<PushSubscription>> {
        let rows = sqlx::query_as::<_, SubscriptionRow>(
            "SELECT * FROM push_subscriptions WHERE user_id = $1 ORDER BY created_at",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .context("failed to list push subscriptions")?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn find(&self, subscription_id: &str) -> Result<Option<PushSubscription>> {
        let row = sqlx::query_as::<_, SubscriptionRow>(
            "SELECT * FROM push_subscriptions WHERE id = $1",
        )
        .bind(subscription_id)
        .fetch_optional(&self.pool)
        .await
        .context("failed to load push subscription")?;
        Ok(row.map(Into::into))
    }

    async fn deactivate(&self, subscription_id: &str) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE push_subscriptions SET active = FALSE, updated_at = CURRENT_TIMESTAMP WHERE id = $1 AND active = TRUE",
        )
        .bind(subscription_id)
        .execute(&self.pool)
        .await
        .context("failed to deactivate push subscription")?;
        Ok(result.rows_affected() > 0)
    }
}
