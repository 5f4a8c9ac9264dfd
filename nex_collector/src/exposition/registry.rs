//! Scrape Registry
//!
//! Holds the registered collectors, runs them concurrently on every scrape
//! and folds their samples into Prometheus metric families.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::RwLock;
use prometheus::proto::{Gauge, LabelPair, Metric, MetricFamily, MetricType};
use prometheus::{Encoder, TextEncoder};
use tokio::sync::mpsc;
use tokio::task::JoinSet;

use nex_core::{global_descriptors, DescriptorCache, Labels, MetricSample};

use super::{ExporterError, ExporterMetrics};
use crate::collector::ScrapeCollector;

/// Capacity of the per-scrape sample channel
pub const DEFAULT_SINK_CAPACITY: usize = 1024;

/// Samples of one metric name in arrival order
#[derive(Debug)]
struct Family {
    help: String,
    label_names: BTreeSet<String>,
    samples: Vec<(Labels, f64)>,
}

/// Samples of one scrape, grouped by metric name
#[derive(Debug, Default)]
struct FamilyFolder {
    families: BTreeMap<String, Family>,
}

impl FamilyFolder {
    fn add(&mut self, sample: MetricSample) {
        let family = self
            .families
            .entry(sample.name().to_string())
            .or_insert_with(|| Family {
                help: sample.descriptor.help().to_string(),
                label_names: BTreeSet::new(),
                samples: Vec::new(),
            });
        family.label_names.extend(sample.descriptor.label_names().iter().cloned());
        family.label_names.extend(sample.labels.keys().cloned());
        family.samples.push((sample.labels, sample.value));
    }

    fn into_families(self) -> Vec<MetricFamily> {
        self.families
            .into_iter()
            .map(|(name, folded)| {
                let mut family = MetricFamily::new();
                family.set_name(name);
                family.set_help(folded.help);
                family.set_field_type(MetricType::GAUGE);

                // Every series carries the family's full label set; identical
                // label sets overwrite and the last sample wins
                let mut series: BTreeMap<Vec<(String, String)>, f64> = BTreeMap::new();
                for (mut labels, value) in folded.samples {
                    for label in &folded.label_names {
                        labels.entry(label.clone()).or_default();
                    }
                    series.insert(labels.into_iter().collect(), value);
                }

                for (labels, value) in series {
                    let mut metric = Metric::new();
                    for (name, value) in labels {
                        let mut pair = LabelPair::new();
                        pair.set_name(name);
                        pair.set_value(value);
                        metric.mut_label().push(pair);
                    }
                    let mut gauge = Gauge::new();
                    gauge.set_value(value);
                    metric.set_gauge(gauge);
                    family.mut_metric().push(metric);
                }

                family
            })
            .collect()
    }
}

/// Registry of scrape collectors
pub struct ExporterRegistry {
    collectors: RwLock<BTreeMap<String, Arc<dyn ScrapeCollector>>>,
    metrics: ExporterMetrics,
    descriptors: Arc<DescriptorCache>,
    sink_capacity: usize,
}

impl ExporterRegistry {
    /// Create a registry backed by the process-wide descriptor cache
    pub fn new() -> Result<Self, ExporterError> {
        Self::with_descriptors(global_descriptors())
    }

    pub fn with_descriptors(descriptors: Arc<DescriptorCache>) -> Result<Self, ExporterError> {
        Ok(Self {
            collectors: RwLock::new(BTreeMap::new()),
            metrics: ExporterMetrics::new()?,
            descriptors,
            sink_capacity: DEFAULT_SINK_CAPACITY,
        })
    }

    pub fn with_sink_capacity(mut self, capacity: usize) -> Self {
        self.sink_capacity = capacity.max(1);
        self
    }

    /// Register a collector. Returns `false` if one with the same identity
    /// is already registered; that is not an error.
    pub fn register(&self, collector: Arc<dyn ScrapeCollector>) -> bool {
        let id = collector.id();
        let mut collectors = self.collectors.write();
        if collectors.contains_key(&id) {
            tracing::debug!(collector = %id, "Collector already registered");
            return false;
        }

        tracing::info!(collector = %id, endpoint = collector.endpoint(), "Registered collector");
        collectors.insert(id, collector);
        true
    }

    pub fn unregister(&self, id: &str) -> bool {
        self.collectors.write().remove(id).is_some()
    }

    pub fn ids(&self) -> Vec<String> {
        self.collectors.read().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.collectors.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.collectors.read().is_empty()
    }

    pub fn metrics(&self) -> &ExporterMetrics {
        &self.metrics
    }

    /// Scrape every collector and return all metric families, sorted by name
    pub async fn gather(&self) -> Vec<MetricFamily> {
        let collectors: Vec<Arc<dyn ScrapeCollector>> =
            self.collectors.read().values().cloned().collect();

        let (sink, mut samples) = mpsc::channel(self.sink_capacity);
        let mut scrapes = JoinSet::new();
        for collector in collectors {
            let sink = sink.clone();
            scrapes.spawn(async move {
                let started = Instant::now();
                let result = collector.collect(sink).await;
                (collector.endpoint().to_string(), started.elapsed(), result)
            });
        }
        drop(sink);

        let mut folder = FamilyFolder::default();
        while let Some(sample) = samples.recv().await {
            folder.add(sample);
        }

        while let Some(joined) = scrapes.join_next().await {
            match joined {
                Ok((endpoint, elapsed, result)) => {
                    if let Err(e) = &result {
                        tracing::warn!(
                            endpoint = %endpoint,
                            error = %e,
                            "Scrape produced no samples"
                        );
                    }
                    self.metrics
                        .record_scrape(&endpoint, elapsed.as_secs_f64(), &result);
                }
                Err(e) => {
                    tracing::error!(error = %e, "Scrape task failed");
                }
            }
        }

        self.metrics.set_descriptors_cached(self.descriptors.len());

        let mut families = folder.into_families();
        families.extend(self.metrics.registry().gather());
        families.sort_by(|a, b| a.get_name().cmp(b.get_name()));
        families
    }

    /// Scrape and encode in the Prometheus text format
    pub async fn render(&self) -> Result<String, ExporterError> {
        let families = self.gather().await;
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}
