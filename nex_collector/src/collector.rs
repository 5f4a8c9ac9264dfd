//! NATS Collector
//!
//! One collector scrapes one endpoint across a fixed set of servers. Each
//! scrape fetches every server concurrently and streams the synthesized
//! samples of each server onto a bounded sink, one server at a time.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinSet;

use nex_core::{
    global_descriptors, server_labels, CoreError, Descriptor, DescriptorCache, EndpointSchema,
    Extraction, Extractor, MetricSample, Synthesizer, System,
};

use crate::fetch::{
    endpoint_url, server_id_from_varz, server_name_from_varz, FetchError, Fetcher, HttpFetcher,
};

/// Default per-fetch timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// A broker whose monitoring endpoint is scraped
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CollectedServer {
    /// Value of the `server_id` label
    pub id: String,
    /// Monitoring base URL, e.g. `http://localhost:8222`
    pub url: String,
}

impl CollectedServer {
    pub fn new(id: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            url: url.into(),
        }
    }
}

/// Source of the `server_id` label value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServerLabel {
    /// The configured id
    #[default]
    Configured,
    /// `server_id` reported by varz
    ServerId,
    /// `server_name` reported by varz
    ServerName,
}

/// Replace configured ids with the identity each server reports.
///
/// Servers whose identity cannot be resolved keep their configured id.
pub async fn resolve_servers(
    servers: Vec<CollectedServer>,
    mode: ServerLabel,
    fetcher: &dyn Fetcher,
    timeout: Duration,
) -> Vec<CollectedServer> {
    let mut resolved = Vec::with_capacity(servers.len());
    for server in servers {
        let reported = match mode {
            ServerLabel::Configured => String::new(),
            ServerLabel::ServerId => server_id_from_varz(fetcher, &server.url, timeout).await,
            ServerLabel::ServerName => server_name_from_varz(fetcher, &server.url, timeout).await,
        };

        if reported.is_empty() {
            resolved.push(server);
        } else {
            tracing::info!(
                configured = %server.id,
                resolved = %reported,
                "Resolved server identity"
            );
            resolved.push(CollectedServer::new(reported, server.url));
        }
    }
    resolved
}

/// Summary of one scrape
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CollectOutcome {
    pub servers: usize,
    pub failed: usize,
    pub samples: usize,
}

#[derive(Debug, thiserror::Error)]
pub enum CollectError {
    #[error("All {servers} servers failed to serve {endpoint}")]
    AllServersFailed { endpoint: String, servers: usize },

    #[error("Sample sink closed during scrape of {endpoint}")]
    SinkClosed { endpoint: String },
}

/// Why one server contributed nothing to a scrape
#[derive(Debug, thiserror::Error)]
enum ServerFailure {
    #[error(transparent)]
    Fetch(FetchError),

    #[error(transparent)]
    Document(CoreError),
}

/// A source of samples the registry can scrape
#[async_trait]
pub trait ScrapeCollector: Send + Sync {
    /// Stable identity; registering the same identity twice is a no-op
    fn id(&self) -> String;

    /// Endpoint name, used to label the registry's own metrics
    fn endpoint(&self) -> &str;

    /// Descriptors this collector has produced so far
    fn describe(&self) -> Vec<Arc<Descriptor>>;

    /// Run one scrape, streaming samples into `sink`
    async fn collect(
        &self,
        sink: mpsc::Sender<MetricSample>,
    ) -> Result<CollectOutcome, CollectError>;
}

/// Collector for one (system, endpoint) pair
pub struct NatsCollector {
    system: System,
    schema: EndpointSchema,
    prefix: String,
    servers: Vec<CollectedServer>,
    fetcher: Arc<dyn Fetcher>,
    timeout: Duration,
    descriptors: Arc<DescriptorCache>,
    synth: Synthesizer,
    stats: RwLock<HashMap<String, usize>>,
}

impl std::fmt::Debug for NatsCollector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NatsCollector")
            .field("system", &self.system)
            .field("endpoint", &self.schema.kind)
            .field("prefix", &self.prefix)
            .field("servers", &self.servers)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl NatsCollector {
    /// Create a collector.
    ///
    /// A non-empty `prefix` replaces the system segment of every metric
    /// name. Duplicate servers are collapsed. Unknown endpoint names are
    /// legal and flattened generically.
    pub fn new(
        system: System,
        endpoint: &str,
        prefix: &str,
        servers: Vec<CollectedServer>,
    ) -> Self {
        let schema = EndpointSchema::for_endpoint(endpoint);
        let descriptors = global_descriptors();

        let mut unique: Vec<CollectedServer> = Vec::with_capacity(servers.len());
        for server in servers {
            if !unique.contains(&server) {
                unique.push(server);
            }
        }

        let synth = Self::synthesizer(system, prefix, &schema, Arc::clone(&descriptors));
        tracing::debug!(
            system = %system,
            endpoint = %schema.kind,
            servers = unique.len(),
            "Created collector"
        );

        Self {
            system,
            schema,
            prefix: prefix.to_string(),
            servers: unique,
            fetcher: Arc::new(HttpFetcher::new()),
            timeout: DEFAULT_TIMEOUT,
            descriptors,
            synth,
            stats: RwLock::new(HashMap::new()),
        }
    }

    fn synthesizer(
        system: System,
        prefix: &str,
        schema: &EndpointSchema,
        cache: Arc<DescriptorCache>,
    ) -> Synthesizer {
        let segment = if prefix.is_empty() { system.prefix() } else { prefix };
        Synthesizer::for_schema(segment, schema, cache)
    }

    pub fn with_fetcher(mut self, fetcher: Arc<dyn Fetcher>) -> Self {
        self.fetcher = fetcher;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Use a private descriptor cache instead of the process-wide one
    pub fn with_descriptors(mut self, descriptors: Arc<DescriptorCache>) -> Self {
        self.synth =
            Self::synthesizer(self.system, &self.prefix, &self.schema, Arc::clone(&descriptors));
        self.descriptors = descriptors;
        self
    }

    pub fn system(&self) -> System {
        self.system
    }

    pub fn schema(&self) -> &EndpointSchema {
        &self.schema
    }

    pub fn servers(&self) -> &[CollectedServer] {
        &self.servers
    }

    /// Sample count of the latest successful scrape, per server id
    pub fn stats(&self) -> HashMap<String, usize> {
        self.stats.read().clone()
    }

    /// Emit one server's extracted samples.
    ///
    /// Returns the number of samples sent.
    async fn emit(
        &self,
        server: &CollectedServer,
        extraction: Extraction,
        sink: &mpsc::Sender<MetricSample>,
    ) -> Result<usize, CollectError> {
        if extraction.skipped > 0 {
            tracing::warn!(
                server_id = %server.id,
                endpoint = %self.schema.kind,
                skipped = extraction.skipped,
                "Skipped malformed entities"
            );
        }

        let mut sent = 0;
        for triple in &extraction.triples {
            for sample in self.synth.synthesize(triple) {
                sink.send(sample).await.map_err(|_| CollectError::SinkClosed {
                    endpoint: self.schema.kind.to_string(),
                })?;
                sent += 1;
            }
        }

        Ok(sent)
    }
}

#[async_trait]
impl ScrapeCollector for NatsCollector {
    fn id(&self) -> String {
        let servers: Vec<String> = self
            .servers
            .iter()
            .map(|server| format!("{}={}", server.id, server.url))
            .collect();
        format!(
            "{}/{}/{}/[{}]",
            self.system,
            self.schema.kind,
            self.prefix,
            servers.join(",")
        )
    }

    fn endpoint(&self) -> &str {
        self.schema.kind.name()
    }

    fn describe(&self) -> Vec<Arc<Descriptor>> {
        let mut found: Vec<Arc<Descriptor>> = self
            .synth
            .prefixes()
            .iter()
            .flat_map(|prefix| self.descriptors.with_prefix(prefix))
            .collect();
        found.sort_by(|a, b| a.name().cmp(b.name()));
        found.dedup_by(|a, b| a.name() == b.name());
        found
    }

    async fn collect(
        &self,
        sink: mpsc::Sender<MetricSample>,
    ) -> Result<CollectOutcome, CollectError> {
        let mut outcome = CollectOutcome {
            servers: self.servers.len(),
            ..Default::default()
        };

        let mut fetches: JoinSet<(CollectedServer, Result<Value, FetchError>)> = JoinSet::new();
        for server in &self.servers {
            let fetcher = Arc::clone(&self.fetcher);
            let url = endpoint_url(&server.url, &self.schema.path);
            let timeout = self.timeout;
            let server = server.clone();
            fetches.spawn(async move {
                let result = fetcher.fetch_json(&url, timeout).await;
                (server, result)
            });
        }

        while let Some(joined) = fetches.join_next().await {
            let (server, fetched) = match joined {
                Ok(done) => done,
                Err(e) => {
                    tracing::error!(endpoint = %self.schema.kind, error = %e, "Fetch task failed");
                    outcome.failed += 1;
                    continue;
                }
            };

            let extracted = fetched.map_err(ServerFailure::Fetch).and_then(|document| {
                Extractor::new(&self.schema)
                    .extract(&document, &server_labels(&server.id))
                    .map_err(ServerFailure::Document)
            });

            match extracted {
                Ok(extraction) => {
                    let sent = self.emit(&server, extraction, &sink).await?;
                    self.stats.write().insert(server.id.clone(), sent);
                    outcome.samples += sent;
                }
                Err(e) => {
                    tracing::warn!(
                        server_id = %server.id,
                        endpoint = %self.schema.kind,
                        error = %e,
                        "Server contributed no samples"
                    );
                    self.stats.write().remove(&server.id);
                    outcome.failed += 1;
                }
            }
        }

        if outcome.servers > 0 && outcome.failed == outcome.servers {
            return Err(CollectError::AllServersFailed {
                endpoint: self.schema.kind.to_string(),
                servers: outcome.servers,
            });
        }

        Ok(outcome)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use serde_json::json;

    /// Fetcher serving canned documents; unknown URLs time out
    pub(crate) struct CannedFetcher {
        documents: HashMap<String, Value>,
    }

    impl CannedFetcher {
        pub(crate) fn new(documents: Vec<(&str, Value)>) -> Self {
            Self {
                documents: documents
                    .into_iter()
                    .map(|(url, doc)| (url.to_string(), doc))
                    .collect(),
            }
        }
    }

    #[async_trait]
    impl Fetcher for CannedFetcher {
        async fn fetch_json(&self, url: &str, timeout: Duration) -> Result<Value, FetchError> {
            self.documents.get(url).cloned().ok_or_else(|| FetchError::Timeout {
                url: url.to_string(),
                timeout,
            })
        }
    }

    fn collector(
        endpoint: &str,
        servers: Vec<CollectedServer>,
        fetcher: CannedFetcher,
    ) -> NatsCollector {
        let system = nex_core::EndpointKind::parse(endpoint).default_system();
        NatsCollector::new(system, endpoint, "", servers)
            .with_fetcher(Arc::new(fetcher))
            .with_descriptors(Arc::new(DescriptorCache::new()))
    }

    async fn drain(
        collector: &NatsCollector,
    ) -> (Result<CollectOutcome, CollectError>, Vec<MetricSample>) {
        let (tx, mut rx) = mpsc::channel(16);
        let (result, samples) = tokio::join!(collector.collect(tx), async {
            let mut samples = Vec::new();
            while let Some(sample) = rx.recv().await {
                samples.push(sample);
            }
            samples
        });
        (result, samples)
    }

    fn value_of(samples: &[MetricSample], name: &str) -> Option<f64> {
        samples.iter().find(|s| s.name() == name).map(|s| s.value)
    }

    #[tokio::test]
    async fn test_unreachable_server_does_not_block_siblings() {
        let fetcher = CannedFetcher::new(vec![(
            "http://up:8222/varz",
            json!({"connections": 1, "subscriptions": 61, "in_bytes": 5, "out_bytes": 5}),
        )]);
        let servers = vec![
            CollectedServer::new("down", "http://down:8222"),
            CollectedServer::new("up", "http://up:8222"),
        ];
        let collector = collector("varz", servers, fetcher);

        let (result, samples) = drain(&collector).await;
        let outcome = result.unwrap();
        assert_eq!(outcome.failed, 1);
        assert_eq!(outcome.samples, 4);
        assert!(samples.iter().all(|s| s.label("server_id") == Some("up")));
        assert_eq!(value_of(&samples, "gnatsd_varz_connections"), Some(1.0));
        assert_eq!(value_of(&samples, "gnatsd_varz_subscriptions"), Some(61.0));

        let stats = collector.stats();
        assert_eq!(stats.get("up"), Some(&4));
        assert!(!stats.contains_key("down"));
    }

    #[tokio::test]
    async fn test_all_servers_failing_is_an_error() {
        let collector = collector(
            "varz",
            vec![CollectedServer::new("down", "http://down:8222")],
            CannedFetcher::new(vec![]),
        );

        let (result, samples) = drain(&collector).await;
        assert!(matches!(result, Err(CollectError::AllServersFailed { servers: 1, .. })));
        assert!(samples.is_empty());
    }

    #[tokio::test]
    async fn test_no_servers_is_quiet() {
        let collector = collector("varz", vec![], CannedFetcher::new(vec![]));
        let (result, samples) = drain(&collector).await;
        assert_eq!(result.unwrap(), CollectOutcome::default());
        assert!(samples.is_empty());
        assert!(collector.stats().is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_servers_are_collapsed() {
        let server = CollectedServer::new("myid", "http://a:8222");
        let collector = collector("varz", vec![server.clone(), server], CannedFetcher::new(vec![]));
        assert_eq!(collector.servers().len(), 1);
    }

    #[tokio::test]
    async fn test_prefix_replaces_system_segment() {
        let fetcher = CannedFetcher::new(vec![("http://a:8222/varz", json!({"mem": 10}))]);
        let collector = NatsCollector::new(
            System::Core,
            "varz",
            "nats_east",
            vec![CollectedServer::new("a", "http://a:8222")],
        )
        .with_fetcher(Arc::new(fetcher))
        .with_descriptors(Arc::new(DescriptorCache::new()));

        let (_, samples) = drain(&collector).await;
        assert_eq!(value_of(&samples, "nats_east_varz_mem"), Some(10.0));
        assert_eq!(collector.describe().len(), 1);
    }

    #[tokio::test]
    async fn test_health_status_metrics() {
        let fetcher = CannedFetcher::new(vec![("http://a:8222/healthz", json!({"status": "ok"}))]);
        let servers = vec![CollectedServer::new("a", "http://a:8222")];
        let collector = collector("healthz", servers, fetcher);

        let (_, samples) = drain(&collector).await;
        assert_eq!(value_of(&samples, "gnatsd_healthz_status"), Some(0.0));
        assert_eq!(value_of(&samples, "gnatsd_healthz_status_value"), Some(1.0));
    }

    #[tokio::test]
    async fn test_wrong_document_shape_counts_as_failure() {
        let fetcher = CannedFetcher::new(vec![
            ("http://list:8222/varz", json!([1, 2])),
            ("http://up:8222/varz", json!({"mem": 10})),
        ]);
        let servers = vec![
            CollectedServer::new("list", "http://list:8222"),
            CollectedServer::new("up", "http://up:8222"),
        ];
        let collector = collector("varz", servers, fetcher);

        let (result, samples) = drain(&collector).await;
        let outcome = result.unwrap();
        assert_eq!(outcome.failed, 1);
        assert!(samples.iter().all(|s| s.label("server_id") == Some("up")));

        let stats = collector.stats();
        assert!(!stats.contains_key("list"));
        assert_eq!(stats.get("up"), Some(&1));
    }

    #[tokio::test]
    async fn test_only_wrong_shapes_fail_the_scrape() {
        let fetcher = CannedFetcher::new(vec![("http://a:8222/varz", json!("not an object"))]);
        let servers = vec![CollectedServer::new("a", "http://a:8222")];
        let collector = collector("varz", servers, fetcher);

        let (result, samples) = drain(&collector).await;
        assert!(matches!(result, Err(CollectError::AllServersFailed { servers: 1, .. })));
        assert!(samples.is_empty());
        assert!(collector.stats().is_empty());
    }

    #[tokio::test]
    async fn test_describe_covers_everything_collected() {
        let fetcher = CannedFetcher::new(vec![(
            "http://a:8222/jsz?accounts=true&streams=true&consumers=true&config=true",
            json!({"account_details": [{
                "name": "account1",
                "id": "account1",
                "memory": 10,
                "stream_detail": [{
                    "name": "ORDERS",
                    "state": {"messages": 3},
                    "consumer_detail": [{"name": "worker", "num_pending": 2}]
                }]
            }]}),
        )]);
        let servers = vec![CollectedServer::new("a", "http://a:8222")];
        let collector = collector("accounts", servers, fetcher);

        let (_, samples) = drain(&collector).await;
        let mut emitted: Vec<&str> = samples.iter().map(|s| s.name()).collect();
        emitted.sort();
        emitted.dedup();
        assert!(emitted.contains(&"jetstream_stream_total_messages"));
        assert!(emitted.contains(&"jetstream_consumer_num_pending"));

        let described = collector.describe();
        let described: Vec<&str> = described.iter().map(|d| d.name()).collect();
        assert_eq!(described, emitted);
    }

    #[tokio::test]
    async fn test_closed_sink_aborts_scrape() {
        let fetcher =
            CannedFetcher::new(vec![("http://a:8222/varz", json!({"mem": 10, "cores": 2}))]);
        let servers = vec![CollectedServer::new("a", "http://a:8222")];
        let collector = collector("varz", servers, fetcher);

        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        assert!(matches!(collector.collect(tx).await, Err(CollectError::SinkClosed { .. })));
    }

    #[tokio::test]
    async fn test_collector_identity() {
        let servers = vec![CollectedServer::new("a", "http://a:8222")];
        let a = NatsCollector::new(System::Core, "varz", "", servers.clone());
        let b = NatsCollector::new(System::Core, "varz", "", servers.clone());
        let c = NatsCollector::new(System::Core, "connz", "", servers);
        assert_eq!(a.id(), b.id());
        assert_ne!(a.id(), c.id());
        assert_eq!(c.endpoint(), "connz");
    }

    #[tokio::test]
    async fn test_resolve_servers_from_varz() {
        let fetcher = CannedFetcher::new(vec![(
            "http://a:8222/varz",
            json!({"server_id": "NAAA", "server_name": "east-1"}),
        )]);
        let servers = vec![
            CollectedServer::new("a", "http://a:8222"),
            CollectedServer::new("b", "http://b:8222"),
        ];
        let timeout = Duration::from_millis(10);

        let by_id =
            resolve_servers(servers.clone(), ServerLabel::ServerId, &fetcher, timeout).await;
        assert_eq!(by_id[0].id, "NAAA");
        assert_eq!(by_id[1].id, "b");

        let by_name =
            resolve_servers(servers.clone(), ServerLabel::ServerName, &fetcher, timeout).await;
        assert_eq!(by_name[0].id, "east-1");

        let configured =
            resolve_servers(servers.clone(), ServerLabel::Configured, &fetcher, timeout).await;
        assert_eq!(configured, servers);
    }
}
