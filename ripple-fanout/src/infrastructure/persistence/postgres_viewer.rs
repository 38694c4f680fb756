use anyhow::Context;
use async_trait::async_trait;
use sqlx::{FromRow, PgPool};

use crate::domain::model::ViewerCounts;
use crate::domain::repository::ViewerCountRepository;
use crate::error::Result;

#[derive(Debug, FromRow)]
struct ViewerCountRow {
    current_viewers: i64,
    peak_viewers: i64,
}

impl From<ViewerCountRow> for ViewerCounts {
    fn from(row: ViewerCountRow) -> Self {
        ViewerCounts {
            current: row.current_viewers,
            peak: row.peak_viewers,
        }
    }
}

/// 直播观看人数（PostgreSQL）
///
/// 峰值在同一条 UPSERT 语句里与已存储的值比较，并发写入不会让峰值回退
pub struct PostgresViewerCountRepository {
    pool: PgPool,
}

impl PostgresViewerCountRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn init_schema(&self) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS stream_viewer_counts (
                stream_id TEXT PRIMARY KEY,
                current_viewers BIGINT NOT NULL DEFAULT 0,
                peak_viewers BIGINT NOT NULL DEFAULT 0,
                updated_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .context("failed to create stream_viewer_counts table")?;
        Ok(())
    }
}

#[async_trait]
impl ViewerCountRepository for PostgresViewerCountRepository {
    async fn record(&self, stream_id: &str, current: i64) -> Result<ViewerCounts> {
        let row = sqlx::query_as::<_, ViewerCountRow>(
            r#"
            INSERT INTO stream_viewer_counts (stream_id, current_viewers, peak_viewers)
            VALUES ($1, $2, $2)
            ON CONFLICT (stream_id) DO UPDATE SET
                current_viewers = EXCLUDED.current_viewers,
                peak_viewers = GREATEST(stream_viewer_counts.peak_viewers, EXCLUDED.current_viewers),
                updated_at = CURRENT_TIMESTAMP
            RETURNING current_viewers, peak_viewers
            "#,
        )
        .bind(stream_id)
        .bind(current)
        .fetch_one(&self.pool)
        .await
        .context("failed to record viewer count")?;
        Ok(row.into())
    }

    async fn load(&self, stream_id: &str) -> Result<Option<ViewerCounts>> {
        let row = sqlx::query_as::<_, ViewerCountRow>(
            "SELECT current_viewers, peak_viewers FROM stream_viewer_counts WHERE stream_id = $1",
        )
        .bind(stream_id)
        .fetch_optional(&self.pool)
        .await
        .context("failed to load viewer count")?;
        Ok(row.map(Into::into))
    }
}
