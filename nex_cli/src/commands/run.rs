use anyhow::Result;
use colored::Colorize;
use nex_collector::{ExporterConfig, MetricsExporter};

use super::build_registry;

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

pub async fn run(config: ExporterConfig) -> Result<()> {
    println!("{}", "NATS Prometheus Exporter".bold().green());
    println!("{}", "=".repeat(50));
    println!("Servers: {}", config.servers.len().to_string().yellow());
    println!("Endpoints: {}", config.endpoints.join(", ").cyan());

    let registry = build_registry(&config).await?;

    let exporter = MetricsExporter::new(config.listen_addr, registry)
        .with_metrics_path(config.metrics_path.as_str());
    let (addr, server) = exporter.spawn(shutdown_signal())?;

    println!(
        "{} http://{}{}",
        "✓ Serving metrics on".green(),
        addr,
        config.metrics_path.cyan()
    );

    server.await??;
    Ok(())
}
