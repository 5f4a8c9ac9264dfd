//! Prometheus Exposition
//!
//! Scrape registry, text rendering, the `/metrics` HTTP exporter and the
//! exporter's own metrics.

pub mod exporter;
pub mod registry;
pub mod self_metrics;

pub use exporter::MetricsExporter;
pub use registry::ExporterRegistry;
pub use self_metrics::ExporterMetrics;

/// Exposition errors
#[derive(Debug, thiserror::Error)]
pub enum ExporterError {
    #[error("Prometheus error: {0}")]
    Prometheus(#[from] prometheus::Error),

    #[error("Exposition is not valid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),

    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: std::net::SocketAddr,
        #[source]
        source: hyper::Error,
    },

    #[error("HTTP server error: {0}")]
    Serve(#[from] hyper::Error),

    #[error("Metrics server task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}
