//! # nex_collector
//!
//! Scrape runtime for NATS monitoring endpoints: fetches documents, runs
//! them through `nex_core` and serves the result as a Prometheus exposition.

pub mod collector;
pub mod config;
pub mod exposition;
pub mod fetch;
pub mod logging;

pub use collector::{
    resolve_servers, CollectError, CollectOutcome, CollectedServer, NatsCollector, ScrapeCollector,
    ServerLabel, DEFAULT_TIMEOUT,
};
pub use config::{ConfigError, ExporterConfig, ExporterConfigBuilder, ServerConfig};
pub use exposition::{ExporterError, ExporterMetrics, ExporterRegistry, MetricsExporter};
pub use fetch::{
    endpoint_url, server_id_from_varz, server_name_from_varz, FetchError, Fetcher, HttpFetcher,
};
pub use logging::{
    init_dev_logging, init_logging, init_logging_with_filter, init_prod_logging, LogFormat,
};
