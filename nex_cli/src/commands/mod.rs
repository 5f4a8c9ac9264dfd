pub mod config;
pub mod run;
pub mod scrape;

use std::sync::Arc;

use anyhow::Result;
use nex_collector::{resolve_servers, ExporterConfig, ExporterRegistry, Fetcher, HttpFetcher};

/// Resolve server identities and register one collector per endpoint
pub async fn build_registry(config: &ExporterConfig) -> Result<Arc<ExporterRegistry>> {
    let fetcher: Arc<dyn Fetcher> = Arc::new(HttpFetcher::new());
    let servers = resolve_servers(
        config.collected_servers(),
        config.server_label,
        fetcher.as_ref(),
        config.timeout(),
    )
    .await;

    let descriptors = nex_core::global_descriptors();
    let registry = Arc::new(ExporterRegistry::with_descriptors(Arc::clone(&descriptors))?);
    for collector in config.build_collectors(&servers, fetcher, descriptors) {
        registry.register(Arc::new(collector));
    }

    Ok(registry)
}
