//! JSON Fetcher
//!
//! Retrieves one monitoring document per (server, endpoint) over HTTP.

use std::time::Duration;

use async_trait::async_trait;
use hyper::client::HttpConnector;
use hyper::{Body, Client, StatusCode, Uri};
use serde_json::Value;

/// Reasons a monitoring document could not be retrieved
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("Invalid monitoring URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: hyper::Error,
    },

    #[error("Request to {url} timed out after {timeout:?}")]
    Timeout { url: String, timeout: Duration },

    #[error("Unexpected HTTP status {status} from {url}")]
    Status { url: String, status: StatusCode },

    #[error("Malformed JSON from {url}: {source}")]
    Json {
        url: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Source of monitoring documents
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// GET `url` and parse the body as JSON, giving up after `timeout`
    async fn fetch_json(&self, url: &str, timeout: Duration) -> Result<Value, FetchError>;
}

/// Join a server base URL and an endpoint path
pub fn endpoint_url(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}

/// Validate a monitoring base URL
pub fn parse_url(url: &str) -> Result<Uri, FetchError> {
    let uri: Uri = url.parse().map_err(|e: hyper::http::uri::InvalidUri| FetchError::InvalidUrl {
        url: url.to_string(),
        reason: e.to_string(),
    })?;

    match uri.scheme_str() {
        Some("http") if uri.host().is_some() => Ok(uri),
        Some("http") => Err(FetchError::InvalidUrl {
            url: url.to_string(),
            reason: "missing host".to_string(),
        }),
        other => Err(FetchError::InvalidUrl {
            url: url.to_string(),
            reason: format!("unsupported scheme {:?}, expected http", other.unwrap_or("")),
        }),
    }
}

/// hyper-backed fetcher
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client<HttpConnector, Body>,
}

impl HttpFetcher {
    pub fn new() -> Self {
        Self { client: Client::new() }
    }

    async fn get(&self, uri: Uri, url: &str) -> Result<Value, FetchError> {
        let response = self.client.get(uri).await.map_err(|source| FetchError::Transport {
            url: url.to_string(),
            source,
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status,
            });
        }

        let body = hyper::body::to_bytes(response.into_body())
            .await
            .map_err(|source| FetchError::Transport {
                url: url.to_string(),
                source,
            })?;

        serde_json::from_slice(&body).map_err(|source| FetchError::Json {
            url: url.to_string(),
            source,
        })
    }
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch_json(&self, url: &str, timeout: Duration) -> Result<Value, FetchError> {
        let uri = parse_url(url)?;

        match tokio::time::timeout(timeout, self.get(uri, url)).await {
            Ok(result) => result,
            Err(_) => Err(FetchError::Timeout {
                url: url.to_string(),
                timeout,
            }),
        }
    }
}

async fn varz_string(fetcher: &dyn Fetcher, base: &str, field: &str, timeout: Duration) -> String {
    let url = endpoint_url(base, "varz");
    match fetcher.fetch_json(&url, timeout).await {
        Ok(varz) => varz
            .get(field)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        Err(e) => {
            tracing::warn!(url = %url, error = %e, "Could not resolve {} from varz", field);
            String::new()
        }
    }
}

/// `server_id` reported by the server's varz, or `""` on any failure
pub async fn server_id_from_varz(fetcher: &dyn Fetcher, base: &str, timeout: Duration) -> String {
    varz_string(fetcher, base, "server_id", timeout).await
}

/// `server_name` reported by the server's varz, or `""` on any failure
pub async fn server_name_from_varz(fetcher: &dyn Fetcher, base: &str, timeout: Duration) -> String {
    varz_string(fetcher, base, "server_name", timeout).await
}
