//! Service registry binary

use anyhow::Context;
use registry_server::{Config, RegistryServer, setup_tracing};
use tracing::warn;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env is fine
    dotenvy::dotenv().ok();

    // Load configuration first (needed for log and telemetry settings)
    let config = Config::load().context("failed to load configuration")?;

    let _telemetry_guard = setup_tracing(&config).await?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        sweep_interval_ms = config.health.interval.as_millis(),
        probe_timeout_ms = config.health.probe_timeout.as_millis(),
        max_concurrent_probes = config.health.max_concurrent_probes,
        "Service registry starting"
    );

    let server = RegistryServer::new(config)?;
    server.run(shutdown_signal()).await?;

    // Telemetry guard will flush spans on drop

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for Ctrl-C, running until killed");
        std::future::pending::<()>().await;
    }
}
