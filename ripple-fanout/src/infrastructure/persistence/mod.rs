pub mod memory;
pub mod postgres_notification;
pub mod postgres_subscription;
pub mod postgres_viewer;

use anyhow::{Context, Result};
use ripple_core::PostgresInstanceConfig;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

pub use memory::{
    MemoryNotificationRepository, MemorySubscriptionRepository, MemoryViewerCountRepository,
};
pub use postgres_notification::PostgresNotificationRepository;
pub use postgres_subscription::PostgresSubscriptionRepository;
pub use postgres_viewer::PostgresViewerCountRepository;

const DEFAULT_MAX_CONNECTIONS: u32 = 10;

/// 按配置创建连接池（三个仓储共享同一个池）
pub async fn connect_pool(config: &PostgresInstanceConfig) -> Result<PgPool> {
    let mut options =
        PgPoolOptions::new().max_connections(config.max_connections.unwrap_or(DEFAULT_MAX_CONNECTIONS));
    if let Some(min) = config.min_connections {
        options = options.min_connections(min);
    }
    options
        .connect(&config.url)
        .await
        .context("failed to connect to postgres")
}
