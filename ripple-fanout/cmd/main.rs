use ripple_core::{load_config_with_validation, tracing::init_tracing};
use ripple_fanout::service::wire;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let app_config = load_config_with_validation(Some("config"))?;
    init_tracing(&app_config.service.name, Some(&app_config.logging));

    let context = wire::initialize(app_config).await?;

    info!("Ripple fanout service started, press Ctrl+C to stop");
    tokio::signal::ctrl_c().await?;

    info!("Shutting down fanout service");
    context.cache.close().await;
    Ok(())
}
