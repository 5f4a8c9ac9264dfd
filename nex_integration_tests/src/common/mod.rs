// Common test utilities for integration tests

pub mod fixtures;
pub mod mock_broker;

pub use mock_broker::MockBroker;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use nex_collector::{CollectError, CollectOutcome, CollectedServer, NatsCollector, ScrapeCollector};
use nex_core::{DescriptorCache, EndpointKind, MetricSample};
use tokio::sync::mpsc;

/// Fetch timeout used by tests
pub const TEST_TIMEOUT: Duration = Duration::from_millis(500);

/// Collector on the endpoint's default system with a private descriptor cache
pub fn collector(endpoint: &str, servers: Vec<CollectedServer>) -> NatsCollector {
    let system = EndpointKind::parse(endpoint).default_system();
    NatsCollector::new(system, endpoint, "", servers)
        .with_timeout(TEST_TIMEOUT)
        .with_descriptors(Arc::new(DescriptorCache::new()))
}

/// Run one scrape and gather everything it emitted
pub async fn scrape(
    collector: &dyn ScrapeCollector,
) -> (Result<CollectOutcome, CollectError>, Vec<MetricSample>) {
    let (tx, mut rx) = mpsc::channel(64);
    let (result, samples) = tokio::join!(collector.collect(tx), async {
        let mut samples = Vec::new();
        while let Some(sample) = rx.recv().await {
            samples.push(sample);
        }
        samples
    });
    (result, samples)
}

/// Value of the first sample named `name`
pub fn value_of(samples: &[MetricSample], name: &str) -> Option<f64> {
    samples.iter().find(|s| s.name() == name).map(|s| s.value)
}

/// All samples named `name`
pub fn named<'s>(samples: &'s [MetricSample], name: &str) -> Vec<&'s MetricSample> {
    samples.iter().filter(|s| s.name() == name).collect()
}

/// Label map of a sample, for whole-set comparisons
pub fn labels_of(sample: &MetricSample) -> BTreeMap<&str, &str> {
    sample
        .labels
        .iter()
        .map(|(k, v)| (k.as_str(), v.as_str()))
        .collect()
}
