//! Metric Synthesizer
//!
//! Prefixes triple names, coerces raw values to gauge values and expands
//! status-style enum fields into a code metric plus a labeled status value.

use std::sync::Arc;

use serde_json::Value;

use crate::descriptor::DescriptorCache;
use crate::extract::MetricTriple;
use crate::sample::{Labels, MetricSample};
use crate::schema::{EndpointSchema, EnumField, Namespace};

/// Synthesizer for one (system, endpoint) pair
#[derive(Debug, Clone)]
pub struct Synthesizer {
    system: String,
    endpoint: String,
    enums: &'static [EnumField],
    subsystems: Vec<&'static str>,
    cache: Arc<DescriptorCache>,
}

impl Synthesizer {
    pub fn new(
        system: impl Into<String>,
        endpoint: impl Into<String>,
        enums: &'static [EnumField],
        cache: Arc<DescriptorCache>,
    ) -> Self {
        Self {
            system: system.into(),
            endpoint: endpoint.into(),
            enums,
            subsystems: Vec::new(),
            cache,
        }
    }

    /// Synthesizer using the name segment, enum table and subsystems of `schema`
    pub fn for_schema(system: &str, schema: &EndpointSchema, cache: Arc<DescriptorCache>) -> Self {
        Self {
            subsystems: schema.subsystems(),
            ..Self::new(system, schema.segment.as_str(), schema.enums, cache)
        }
    }

    /// Fully-qualified metric name of a triple
    pub fn metric_name(&self, namespace: Namespace, name: &str) -> String {
        let middle = match namespace {
            Namespace::Endpoint => self.endpoint.as_str(),
            Namespace::Subsystem(subsystem) => subsystem,
        };
        format!("{}_{}_{}", self.system, middle, name)
    }

    /// Common prefix of every metric this synthesizer names for its endpoint
    pub fn endpoint_prefix(&self) -> String {
        format!("{}_{}_", self.system, self.endpoint)
    }

    /// Every name prefix this synthesizer can produce: the endpoint's and
    /// one per subsystem
    pub fn prefixes(&self) -> Vec<String> {
        let mut prefixes = vec![self.endpoint_prefix()];
        prefixes.extend(
            self.subsystems
                .iter()
                .map(|subsystem| format!("{}_{}_", self.system, subsystem)),
        );
        prefixes
    }

    /// Turn one triple into zero, one or two samples.
    ///
    /// Never fails: unsupported values and rejected names are dropped with
    /// a debug diagnostic.
    pub fn synthesize(&self, triple: &MetricTriple) -> Vec<MetricSample> {
        let name = self.metric_name(triple.namespace, &triple.name);

        match &triple.value {
            Value::Number(n) => match n.as_f64() {
                Some(value) => self.sample(&name, value, &triple.labels).into_iter().collect(),
                None => {
                    tracing::debug!(metric = %name, raw = %n, "Number not representable as f64");
                    Vec::new()
                }
            },
            Value::Bool(flag) => self
                .sample(&name, if *flag { 1.0 } else { 0.0 }, &triple.labels)
                .into_iter()
                .collect(),
            Value::String(word) => match self.enum_field(triple) {
                Some(field) => self.enum_samples(&name, field, word, &triple.labels),
                None => {
                    tracing::debug!(metric = %name, "Dropping string value without enum mapping");
                    Vec::new()
                }
            },
            Value::Null | Value::Array(_) | Value::Object(_) => {
                tracing::debug!(metric = %name, "Dropping unsupported value type");
                Vec::new()
            }
        }
    }

    /// Synthesize every triple of an extraction, in order
    pub fn synthesize_all<'t, I>(&self, triples: I) -> Vec<MetricSample>
    where
        I: IntoIterator<Item = &'t MetricTriple>,
    {
        triples
            .into_iter()
            .flat_map(|triple| self.synthesize(triple))
            .collect()
    }

    fn enum_field(&self, triple: &MetricTriple) -> Option<&'static EnumField> {
        if triple.namespace != Namespace::Endpoint {
            return None;
        }
        self.enums.iter().find(|field| field.field == triple.name)
    }

    fn enum_samples(
        &self,
        name: &str,
        field: &EnumField,
        word: &str,
        labels: &Labels,
    ) -> Vec<MetricSample> {
        let mut samples = Vec::with_capacity(2);
        samples.extend(self.sample(name, field.code(word) as f64, labels));

        let mut status_labels = labels.clone();
        status_labels.insert(field.label.to_string(), word.to_string());
        let healthy = if field.is_healthy(word) { 1.0 } else { 0.0 };
        samples.extend(self.sample(&format!("{}_value", name), healthy, &status_labels));

        samples
    }

    fn sample(&self, name: &str, value: f64, labels: &Labels) -> Option<MetricSample> {
        let label_names: Vec<&str> = labels.keys().map(String::as_str).collect();
        let help = format!("{} {}", self.endpoint, name);

        match self.cache.describe(name, &help, &label_names) {
            Ok(descriptor) => {
                let labels = descriptor.pad_labels(labels);
                Some(MetricSample {
                    descriptor,
                    value,
                    labels,
                })
            }
            Err(e) => {
                tracing::debug!(
                    metric = %name,
                    error = %e,
                    "Dropping metric with rejected descriptor"
                );
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::Extractor;
    use crate::sample::server_labels;
    use serde_json::json;

    fn triple(name: &str, value: Value) -> MetricTriple {
        MetricTriple {
            namespace: Namespace::Endpoint,
            name: name.to_string(),
            value,
            labels: server_labels("id"),
        }
    }

    fn varz() -> Synthesizer {
        Synthesizer::new("gnatsd", "varz", &[], Arc::new(DescriptorCache::new()))
    }

    #[test]
    fn test_names_are_prefixed() {
        let synth = varz();
        assert_eq!(synth.metric_name(Namespace::Endpoint, "mem"), "gnatsd_varz_mem");
        assert_eq!(
            synth.metric_name(Namespace::Subsystem("stream"), "total_bytes"),
            "gnatsd_stream_total_bytes"
        );
        assert_eq!(synth.endpoint_prefix(), "gnatsd_varz_");
    }

    #[test]
    fn test_prefixes_include_subsystems() {
        let schema = EndpointSchema::for_endpoint("accounts");
        let synth = Synthesizer::for_schema("jetstream", &schema, Arc::new(DescriptorCache::new()));
        assert_eq!(
            synth.prefixes(),
            vec!["jetstream_account_", "jetstream_stream_", "jetstream_consumer_"]
        );
        assert_eq!(varz().prefixes(), vec!["gnatsd_varz_"]);
    }

    #[test]
    fn test_numeric_coercion() {
        let synth = varz();
        assert_eq!(synth.synthesize(&triple("cores", json!(8)))[0].value, 8.0);
        assert_eq!(synth.synthesize(&triple("cpu", json!(0.5)))[0].value, 0.5);
        assert_eq!(synth.synthesize(&triple("auth_required", json!(true)))[0].value, 1.0);

        let sample = &synth.synthesize(&triple("cores", json!(8)))[0];
        assert_eq!(sample.name(), "gnatsd_varz_cores");
        assert_eq!(sample.label("server_id"), Some("id"));
    }

    #[test]
    fn test_unsupported_values_are_dropped() {
        let synth = varz();
        assert!(synth.synthesize(&triple("version", json!("2.10.0"))).is_empty());
        assert!(synth.synthesize(&triple("urls", json!(["a"]))).is_empty());
        assert!(synth.synthesize(&triple("missing", Value::Null)).is_empty());
    }

    #[test]
    fn test_health_status_expands_to_code_and_value() {
        let schema = EndpointSchema::for_endpoint("healthz");
        let synth = Synthesizer::for_schema("gnatsd", &schema, Arc::new(DescriptorCache::new()));

        let samples = synth.synthesize(&triple("status", json!("ok")));
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0].name(), "gnatsd_healthz_status");
        assert_eq!(samples[0].value, 0.0);
        assert_eq!(samples[1].name(), "gnatsd_healthz_status_value");
        assert_eq!(samples[1].value, 1.0);
        assert_eq!(samples[1].label("status"), Some("ok"));

        let samples = synth.synthesize(&triple("status", json!("unavailable")));
        assert_eq!(samples[0].value, 1.0);
        assert_eq!(samples[1].value, 0.0);
        assert_eq!(samples[1].label("status"), Some("unavailable"));
    }

    #[test]
    fn test_labels_are_padded_to_first_descriptor() {
        let synth = varz();
        let mut wide = triple("mem", json!(1));
        wide.labels.insert("account".into(), "$G".into());
        synth.synthesize(&wide);

        let narrow = synth.synthesize(&triple("mem", json!(2)));
        assert_eq!(narrow[0].label("account"), Some(""));
        assert_eq!(narrow[0].label_values(), vec!["", "id"]);
    }

    #[test]
    fn test_later_wider_labels_are_kept() {
        let cache = Arc::new(DescriptorCache::new());
        let custom = Synthesizer::new("jetstream", "account", &[], Arc::clone(&cache));
        let accounts = Synthesizer::new("jetstream", "account", &[], Arc::clone(&cache));

        let narrow = custom.synthesize(&triple("memory_used", json!(5))).remove(0);
        assert_eq!(narrow.label_values(), vec!["id"]);

        let mut account1 = triple("memory_used", json!(10));
        account1.labels.insert("account".into(), "account1".into());
        let mut account2 = triple("memory_used", json!(20));
        account2.labels.insert("account".into(), "account2".into());

        let wide1 = accounts.synthesize(&account1).remove(0);
        let wide2 = accounts.synthesize(&account2).remove(0);
        assert_eq!(wide1.label("account"), Some("account1"));
        assert_eq!(wide2.label("account"), Some("account2"));
        assert_ne!(wide1.labels, wide2.labels);

        // Narrow samples after widening carry the superset
        let padded = custom.synthesize(&triple("memory_used", json!(5))).remove(0);
        assert!(Arc::ptr_eq(&padded.descriptor, &wide1.descriptor));
        assert_eq!(padded.label_values(), vec!["", "id"]);
    }

    #[test]
    fn test_shared_cache_shares_descriptors() {
        let cache = Arc::new(DescriptorCache::new());
        let a = Synthesizer::new("gnatsd", "varz", &[], Arc::clone(&cache));
        let b = Synthesizer::new("gnatsd", "varz", &[], Arc::clone(&cache));

        let first = a.synthesize(&triple("mem", json!(1))).remove(0);
        let second = b.synthesize(&triple("mem", json!(2))).remove(0);
        assert!(Arc::ptr_eq(&first.descriptor, &second.descriptor));
    }

    #[test]
    fn test_end_to_end_leaf_samples() {
        let schema = EndpointSchema::for_endpoint("leafz");
        let doc = json!({"leafnodes": 2, "leafs": [
            {"name": "a", "account": "$G", "ip": "127.0.0.1", "port": 6223, "out_msgs": 10000},
            {"account": "$G", "ip": "127.0.0.2", "port": 6224, "out_msgs": 10000}
        ]});
        let extraction = Extractor::new(&schema).extract(&doc, &server_labels("id")).unwrap();
        let synth = Synthesizer::for_schema("gnatsd", &schema, Arc::new(DescriptorCache::new()));

        let samples = synth.synthesize_all(&extraction.triples);
        let out_msgs: Vec<_> = samples
            .iter()
            .filter(|s| s.name() == "gnatsd_leafz_conn_out_msgs")
            .collect();
        assert_eq!(out_msgs.len(), 2);
        assert!(out_msgs.iter().all(|s| s.label("server_id") == Some("id")));
        assert_ne!(out_msgs[0].label("ip"), out_msgs[1].label("ip"));
    }
}
