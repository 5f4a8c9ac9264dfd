//! Synthesized metric samples

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::descriptor::Descriptor;

/// Label set ordered by label name
pub type Labels = BTreeMap<String, String>;

/// Label carried by every per-server sample
pub const SERVER_ID_LABEL: &str = "server_id";

/// One gauge observation produced during a scrape
#[derive(Debug, Clone)]
pub struct MetricSample {
    /// Descriptor shared by every sample with the same name
    pub descriptor: Arc<Descriptor>,
    pub value: f64,
    /// Label values, padded to the descriptor's label names
    pub labels: Labels,
}

impl MetricSample {
    /// Fully-qualified metric name
    pub fn name(&self) -> &str {
        self.descriptor.name()
    }

    pub fn label(&self, name: &str) -> Option<&str> {
        self.labels.get(name).map(String::as_str)
    }

    /// Label values in descriptor order
    pub fn label_values(&self) -> Vec<&str> {
        self.descriptor
            .label_names()
            .iter()
            .map(|name| self.label(name).unwrap_or_default())
            .collect()
    }
}

/// Build a label set holding only `server_id`
pub fn server_labels(server_id: &str) -> Labels {
    let mut labels = Labels::new();
    labels.insert(SERVER_ID_LABEL.to_string(), server_id.to_string());
    labels
}
