//! Metrics HTTP Exporter
//!
//! Provides the HTTP endpoint scraped by Prometheus.

use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Request, Response, Server, StatusCode};
use tokio::task::JoinHandle;

use super::{ExporterError, ExporterRegistry};

/// Path of the liveness check
pub const HEALTH_PATH: &str = "/health";

/// Metrics exporter server
pub struct MetricsExporter {
    addr: SocketAddr,
    metrics_path: String,
    registry: Arc<ExporterRegistry>,
}

impl MetricsExporter {
    /// Create a new metrics exporter serving `/metrics`
    pub fn new(addr: SocketAddr, registry: Arc<ExporterRegistry>) -> Self {
        Self {
            addr,
            metrics_path: "/metrics".to_string(),
            registry,
        }
    }

    pub fn with_metrics_path(mut self, path: impl Into<String>) -> Self {
        self.metrics_path = path.into();
        self
    }

    /// Serve until the process ends
    pub async fn start(self) -> Result<(), ExporterError> {
        let (_, server) = self.spawn(std::future::pending())?;
        server.await?
    }

    /// Bind and serve in the background until `shutdown` resolves.
    ///
    /// Returns the bound address, which differs from the configured one
    /// when binding port 0.
    pub fn spawn<F>(
        self,
        shutdown: F,
    ) -> Result<(SocketAddr, JoinHandle<Result<(), ExporterError>>), ExporterError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let registry = self.registry;
        let metrics_path: Arc<str> = Arc::from(self.metrics_path.as_str());

        let make_svc = make_service_fn(move |_conn| {
            let registry = Arc::clone(&registry);
            let metrics_path = Arc::clone(&metrics_path);
            async move {
                Ok::<_, Infallible>(service_fn(move |req| {
                    handle_request(req, Arc::clone(&registry), Arc::clone(&metrics_path))
                }))
            }
        });

        let server = Server::try_bind(&self.addr)
            .map_err(|source| ExporterError::Bind {
                addr: self.addr,
                source,
            })?
            .serve(make_svc);
        let local_addr = server.local_addr();

        tracing::info!("Metrics server listening on http://{}{}", local_addr, self.metrics_path);

        let handle = tokio::spawn(async move {
            server.with_graceful_shutdown(shutdown).await?;
            tracing::info!("Metrics server stopped");
            Ok::<(), ExporterError>(())
        });

        Ok((local_addr, handle))
    }
}

fn respond(
    status: StatusCode,
    content_type: &'static str,
    body: impl Into<Body>,
) -> Response<Body> {
    let mut response = Response::new(body.into());
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    response
}

/// Handle metrics HTTP request
async fn handle_request(
    req: Request<Body>,
    registry: Arc<ExporterRegistry>,
    metrics_path: Arc<str>,
) -> Result<Response<Body>, Infallible> {
    let path = req.uri().path().to_owned();

    if path.as_str() == &*metrics_path {
        return Ok(match registry.render().await {
            Ok(text) => respond(StatusCode::OK, prometheus::TEXT_FORMAT, text),
            Err(e) => {
                tracing::error!(error = %e, "Failed to export metrics");
                respond(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "text/plain",
                    format!("Error: {}", e),
                )
            }
        });
    }

    Ok(match path.as_str() {
        HEALTH_PATH => respond(StatusCode::OK, "text/plain", "OK"),
        _ => respond(StatusCode::NOT_FOUND, "text/plain", "Not Found"),
    })
}
