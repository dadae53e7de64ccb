use rally_core::RallyCore;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let core = RallyCore::start().await?;
    tracing::info!(
        database = %core.config.database_path().display(),
        "rally core started"
    );

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutting down");

    core.shutdown().await
}
