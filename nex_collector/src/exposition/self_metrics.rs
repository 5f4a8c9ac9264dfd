//! Exporter Self-Metrics
//!
//! Counters describing the exporter's own scrapes, appended to every
//! exposition.

use prometheus::{HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, Registry};

use crate::collector::{CollectError, CollectOutcome};

/// Metrics about the exporter itself
pub struct ExporterMetrics {
    registry: Registry,

    pub scrapes_total: IntCounterVec,
    pub fetch_failures_total: IntCounterVec,
    pub samples_emitted_total: IntCounterVec,
    pub scrape_duration: HistogramVec,
    pub descriptors_cached: IntGauge,
}

impl ExporterMetrics {
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();

        let scrapes_total = IntCounterVec::new(
            Opts::new("nex_scrapes_total", "Total number of endpoint scrapes"),
            &["endpoint"],
        )?;
        registry.register(Box::new(scrapes_total.clone()))?;

        let fetch_failures_total = IntCounterVec::new(
            Opts::new("nex_fetch_failures_total", "Total number of failed server fetches"),
            &["endpoint"],
        )?;
        registry.register(Box::new(fetch_failures_total.clone()))?;

        let samples_emitted_total = IntCounterVec::new(
            Opts::new("nex_samples_emitted_total", "Total number of samples emitted"),
            &["endpoint"],
        )?;
        registry.register(Box::new(samples_emitted_total.clone()))?;

        let scrape_duration = HistogramVec::new(
            HistogramOpts::new("nex_scrape_duration_seconds", "Endpoint scrape duration in seconds")
                .buckets(vec![0.005, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]),
            &["endpoint"],
        )?;
        registry.register(Box::new(scrape_duration.clone()))?;

        let descriptors_cached = IntGauge::with_opts(Opts::new(
            "nex_descriptors_cached",
            "Number of metric descriptors in the descriptor cache",
        ))?;
        registry.register(Box::new(descriptors_cached.clone()))?;

        Ok(Self {
            registry,
            scrapes_total,
            fetch_failures_total,
            samples_emitted_total,
            scrape_duration,
            descriptors_cached,
        })
    }

    /// Get the underlying Prometheus registry
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Record the result of one collector scrape
    pub fn record_scrape(
        &self,
        endpoint: &str,
        duration_secs: f64,
        result: &Result<CollectOutcome, CollectError>,
    ) {
        self.scrapes_total.with_label_values(&[endpoint]).inc();
        self.scrape_duration
            .with_label_values(&[endpoint])
            .observe(duration_secs);

        match result {
            Ok(outcome) => {
                self.fetch_failures_total
                    .with_label_values(&[endpoint])
                    .inc_by(outcome.failed as u64);
                self.samples_emitted_total
                    .with_label_values(&[endpoint])
                    .inc_by(outcome.samples as u64);
            }
            Err(CollectError::AllServersFailed { servers, .. }) => {
                self.fetch_failures_total
                    .with_label_values(&[endpoint])
                    .inc_by(*servers as u64);
            }
            Err(CollectError::SinkClosed { .. }) => {}
        }
    }

    /// Record descriptor cache size
    pub fn set_descriptors_cached(&self, count: usize) {
        self.descriptors_cached.set(count as i64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_scrape() {
        let metrics = ExporterMetrics::new().unwrap();
        let outcome = CollectOutcome {
            servers: 2,
            failed: 1,
            samples: 40,
        };

        metrics.record_scrape("varz", 0.01, &Ok(outcome));
        metrics.record_scrape(
            "varz",
            0.02,
            &Err(CollectError::AllServersFailed {
                endpoint: "varz".into(),
                servers: 2,
            }),
        );

        assert_eq!(metrics.scrapes_total.with_label_values(&["varz"]).get(), 2);
        assert_eq!(metrics.fetch_failures_total.with_label_values(&["varz"]).get(), 3);
        assert_eq!(metrics.samples_emitted_total.with_label_values(&["varz"]).get(), 40);
        assert_eq!(
            metrics.scrape_duration.with_label_values(&["varz"]).get_sample_count(),
            2
        );
    }

    #[test]
    fn test_independent_instances_do_not_collide() {
        let a = ExporterMetrics::new().unwrap();
        let b = ExporterMetrics::new().unwrap();
        a.set_descriptors_cached(3);
        b.set_descriptors_cached(5);
        assert_eq!(a.descriptors_cached.get(), 3);
        assert_eq!(a.registry().gather().len(), 1);
    }
}
