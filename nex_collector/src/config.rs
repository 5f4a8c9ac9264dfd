//! Exporter Configuration
//!
//! YAML-backed configuration: which servers to watch, which endpoints to
//! scrape and where to serve the exposition.

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use nex_core::{DescriptorCache, EndpointKind};

use crate::collector::{CollectedServer, NatsCollector, ServerLabel};
use crate::fetch::{parse_url, Fetcher};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration error: {0}")]
    Invalid(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_yaml::Error),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// One monitored server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// `server_id` label value; defaults to the URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Monitoring base URL
    pub url: String,
}

impl ServerConfig {
    pub fn new(id: Option<String>, url: impl Into<String>) -> Self {
        Self { id, url: url.into() }
    }

    /// Parse `id=url` or a bare `url`
    pub fn parse(spec: &str) -> Result<Self> {
        let spec = spec.trim();
        if spec.is_empty() {
            return Err(ConfigError::Invalid("Empty server specification".to_string()));
        }

        // A bare URL contains "://" before any '='
        match spec.split_once('=') {
            Some((id, url)) if !id.contains("://") => {
                let id = id.trim();
                Ok(Self::new((!id.is_empty()).then(|| id.to_string()), url.trim()))
            }
            _ => Ok(Self::new(None, spec)),
        }
    }

    pub fn collected(&self) -> CollectedServer {
        let id = self.id.clone().unwrap_or_else(|| self.url.clone());
        CollectedServer::new(id, self.url.clone())
    }
}

/// Top-level exporter configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExporterConfig {
    /// Address the exposition is served on
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,

    #[serde(default = "default_metrics_path")]
    pub metrics_path: String,

    /// Per-fetch timeout (milliseconds)
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Replaces the system segment of every metric name when non-empty
    #[serde(default)]
    pub metric_prefix: String,

    #[serde(default)]
    pub server_label: ServerLabel,

    #[serde(default)]
    pub servers: Vec<ServerConfig>,

    #[serde(default = "default_endpoints")]
    pub endpoints: Vec<String>,
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 7777))
}
fn default_metrics_path() -> String { "/metrics".to_string() }
fn default_timeout_ms() -> u64 { 5000 }
fn default_endpoints() -> Vec<String> { vec!["varz".to_string()] }

impl Default for ExporterConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            metrics_path: default_metrics_path(),
            timeout_ms: default_timeout_ms(),
            metric_prefix: String::new(),
            server_label: ServerLabel::Configured,
            servers: Vec::new(),
            endpoints: default_endpoints(),
        }
    }
}

fn is_metric_fragment(prefix: &str) -> bool {
    let mut chars = prefix.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    }
}

impl ExporterConfig {
    pub fn builder() -> ExporterConfigBuilder {
        ExporterConfigBuilder::default()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.servers.is_empty() {
            return Err(ConfigError::Invalid("No servers configured".to_string()));
        }
        if self.endpoints.is_empty() {
            return Err(ConfigError::Invalid("No endpoints configured".to_string()));
        }

        for (idx, server) in self.servers.iter().enumerate() {
            parse_url(&server.url).map_err(|e| {
                ConfigError::Invalid(format!("Server {} validation failed: {}", idx, e))
            })?;
        }

        if let Some(blank) = self.endpoints.iter().position(|e| e.trim().is_empty()) {
            return Err(ConfigError::Invalid(format!("Endpoint {} is empty", blank)));
        }
        if self.timeout_ms == 0 {
            return Err(ConfigError::Invalid("timeout_ms must be greater than 0".to_string()));
        }
        if !self.metrics_path.starts_with('/') {
            return Err(ConfigError::Invalid(format!(
                "metrics_path '{}' must start with '/'",
                self.metrics_path
            )));
        }
        if !self.metric_prefix.is_empty() && !is_metric_fragment(&self.metric_prefix) {
            return Err(ConfigError::Invalid(format!(
                "metric_prefix '{}' is not a valid metric name fragment",
                self.metric_prefix
            )));
        }

        Ok(())
    }

    /// Load configuration from YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let config = Self::read_yaml_file(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from YAML file without validating it, for callers
    /// that apply overrides first
    pub fn read_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&content)?)
    }

    /// Load configuration from YAML string
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to YAML file
    pub fn to_yaml_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    pub fn to_yaml_string(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Configured servers with ids defaulted
    pub fn collected_servers(&self) -> Vec<CollectedServer> {
        self.servers.iter().map(ServerConfig::collected).collect()
    }

    /// One collector per configured endpoint, each on the endpoint's
    /// default system
    pub fn build_collectors(
        &self,
        servers: &[CollectedServer],
        fetcher: Arc<dyn Fetcher>,
        descriptors: Arc<DescriptorCache>,
    ) -> Vec<NatsCollector> {
        self.endpoints
            .iter()
            .map(|endpoint| {
                let system = EndpointKind::parse(endpoint).default_system();
                NatsCollector::new(system, endpoint, &self.metric_prefix, servers.to_vec())
                    .with_fetcher(Arc::clone(&fetcher))
                    .with_timeout(self.timeout())
                    .with_descriptors(Arc::clone(&descriptors))
            })
            .collect()
    }
}

/// Builder for ExporterConfig
#[derive(Debug, Default)]
pub struct ExporterConfigBuilder {
    listen_addr: Option<SocketAddr>,
    metrics_path: Option<String>,
    timeout_ms: Option<u64>,
    metric_prefix: Option<String>,
    server_label: Option<ServerLabel>,
    servers: Vec<ServerConfig>,
    endpoints: Vec<String>,
}

impl ExporterConfigBuilder {
    pub fn listen_addr(mut self, addr: SocketAddr) -> Self {
        self.listen_addr = Some(addr);
        self
    }

    pub fn metrics_path(mut self, path: impl Into<String>) -> Self {
        self.metrics_path = Some(path.into());
        self
    }

    pub fn timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    pub fn metric_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.metric_prefix = Some(prefix.into());
        self
    }

    pub fn server_label(mut self, label: ServerLabel) -> Self {
        self.server_label = Some(label);
        self
    }

    pub fn server(mut self, id: impl Into<String>, url: impl Into<String>) -> Self {
        self.servers.push(ServerConfig::new(Some(id.into()), url));
        self
    }

    pub fn servers(mut self, servers: Vec<ServerConfig>) -> Self {
        self.servers.extend(servers);
        self
    }

    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoints.push(endpoint.into());
        self
    }

    pub fn build(self) -> ExporterConfig {
        let default = ExporterConfig::default();
        ExporterConfig {
            listen_addr: self.listen_addr.unwrap_or(default.listen_addr),
            metrics_path: self.metrics_path.unwrap_or(default.metrics_path),
            timeout_ms: self.timeout_ms.unwrap_or(default.timeout_ms),
            metric_prefix: self.metric_prefix.unwrap_or(default.metric_prefix),
            server_label: self.server_label.unwrap_or(default.server_label),
            servers: self.servers,
            endpoints: if self.endpoints.is_empty() {
                default.endpoints
            } else {
                self.endpoints
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::ScrapeCollector;
    use crate::fetch::HttpFetcher;

    const SAMPLE: &str = r#"
listen_addr: "127.0.0.1:9100"
timeout_ms: 2000
server_label: server_name
servers:
  - id: east
    url: http://10.0.0.1:8222
  - url: http://10.0.0.2:8222
endpoints: [varz, connz, jsz, accounts]
"#;

    #[test]
    fn test_defaults() {
        let config = ExporterConfig::default();
        assert_eq!(config.listen_addr.port(), 7777);
        assert_eq!(config.metrics_path, "/metrics");
        assert_eq!(config.timeout(), Duration::from_secs(5));
        assert!(config.metric_prefix.is_empty());
        assert_eq!(config.server_label, ServerLabel::Configured);
    }

    #[test]
    fn test_from_yaml_str() {
        let config = ExporterConfig::from_yaml_str(SAMPLE).unwrap();
        assert_eq!(config.listen_addr.port(), 9100);
        assert_eq!(config.metrics_path, "/metrics");
        assert_eq!(config.server_label, ServerLabel::ServerName);
        assert_eq!(config.endpoints.len(), 4);

        let servers = config.collected_servers();
        assert_eq!(servers[0].id, "east");
        assert_eq!(servers[1].id, "http://10.0.0.2:8222");
    }

    #[test]
    fn test_validation_failures() {
        assert!(ExporterConfig::builder().build().validate().is_err());

        let base = || ExporterConfig::builder().server("a", "http://localhost:8222");
        assert!(base().build().validate().is_ok());
        assert!(base().timeout_ms(0).build().validate().is_err());
        assert!(base().metrics_path("metrics").build().validate().is_err());
        assert!(base().metric_prefix("9lives").build().validate().is_err());
        assert!(base().metric_prefix("nats_east").build().validate().is_ok());
        assert!(base().endpoint(" ").build().validate().is_err());
        assert!(ExporterConfig::builder()
            .server("a", "https://localhost:8222")
            .build()
            .validate()
            .is_err());
    }

    #[test]
    fn test_server_spec_parsing() {
        let named = ServerConfig::parse("east=http://10.0.0.1:8222").unwrap();
        assert_eq!(named.id.as_deref(), Some("east"));
        assert_eq!(named.url, "http://10.0.0.1:8222");

        let bare = ServerConfig::parse("http://10.0.0.1:8222/?a=b").unwrap();
        assert_eq!(bare.id, None);
        assert_eq!(bare.url, "http://10.0.0.1:8222/?a=b");

        assert!(ServerConfig::parse("  ").is_err());
    }

    #[test]
    fn test_yaml_file_round_trip() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("nex.yaml");

        let config = ExporterConfig::builder()
            .server("a", "http://localhost:8222")
            .endpoint("healthz")
            .metric_prefix("edge")
            .build();
        config.to_yaml_file(&path)?;

        let loaded = ExporterConfig::from_yaml_file(&path)?;
        assert_eq!(loaded.endpoints, vec!["healthz"]);
        assert_eq!(loaded.metric_prefix, "edge");
        assert_eq!(loaded.servers, config.servers);
        Ok(())
    }

    #[test]
    fn test_build_collectors() {
        let config = ExporterConfig::from_yaml_str(SAMPLE).unwrap();
        let collectors = config.build_collectors(
            &config.collected_servers(),
            Arc::new(HttpFetcher::new()),
            Arc::new(DescriptorCache::new()),
        );

        let endpoints: Vec<&str> = collectors.iter().map(|c| c.endpoint()).collect();
        assert_eq!(endpoints, vec!["varz", "connz", "jsz", "accounts"]);
        assert_eq!(collectors[2].system(), nex_core::System::JetStream);
        assert_eq!(collectors[0].servers().len(), 2);
    }
}
