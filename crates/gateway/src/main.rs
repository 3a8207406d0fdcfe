use std::sync::Arc;

use gateway::{sweeper, GatewayConfig, GatewayState};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gateway=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting linkgate gateway v{}", env!("CARGO_PKG_VERSION"));

    dotenvy::dotenv().ok();
    let config = GatewayConfig::from_env()?;

    info!("Listening on: {}:{}", config.host, config.port);
    info!("Sweeping every {:?}", config.sweep_interval);

    let sweep_interval = config.sweep_interval;
    let state = Arc::new(GatewayState::new(config)?);
    let _sweeper = sweeper::spawn(state.links.clone(), sweep_interval);

    gateway::run(state).await?;
    Ok(())
}
