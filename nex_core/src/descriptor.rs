//! Metric descriptors and the process-wide descriptor cache
//!
//! A metric name maps to one descriptor whose label names are the union of
//! every label set seen for that name. A request carrying a label the cached
//! descriptor lacks widens it; labels are never dropped. Samples pad absent
//! labels with `""`.

use std::collections::HashMap;
use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use prometheus::core::Desc;

use crate::sample::Labels;
use crate::{CoreError, Result};

/// Process-wide descriptor cache
static GLOBAL_DESCRIPTORS: Lazy<Arc<DescriptorCache>> =
    Lazy::new(|| Arc::new(DescriptorCache::new()));

/// Get the process-wide descriptor cache
pub fn global_descriptors() -> Arc<DescriptorCache> {
    Arc::clone(&GLOBAL_DESCRIPTORS)
}

/// Metric identity: name, help text and sorted label names
#[derive(Debug)]
pub struct Descriptor {
    desc: Desc,
}

impl Descriptor {
    /// Create a descriptor. Label names are sorted and de-duplicated.
    pub fn new<I, S>(name: &str, help: &str, label_names: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut labels: Vec<String> = label_names.into_iter().map(Into::into).collect();
        labels.sort();
        labels.dedup();

        let desc = Desc::new(name.to_string(), help.to_string(), labels, HashMap::new())
            .map_err(|source| CoreError::Descriptor {
                name: name.to_string(),
                source,
            })?;

        Ok(Self { desc })
    }

    pub fn name(&self) -> &str {
        &self.desc.fq_name
    }

    pub fn help(&self) -> &str {
        &self.desc.help
    }

    /// Label names in sorted order
    pub fn label_names(&self) -> &[String] {
        &self.desc.variable_labels
    }

    /// Underlying prometheus descriptor
    pub fn desc(&self) -> &Desc {
        &self.desc
    }

    /// Whether every name in `label_names` is a label of this descriptor
    pub fn covers(&self, label_names: &[&str]) -> bool {
        label_names
            .iter()
            .all(|name| self.label_names().iter().any(|known| known == name))
    }

    /// Pad a label set to this descriptor: absent labels become `""`.
    /// Labels already present are kept as they are.
    pub fn pad_labels(&self, labels: &Labels) -> Labels {
        let mut padded = labels.clone();
        for name in self.label_names() {
            padded.entry(name.clone()).or_default();
        }
        padded
    }
}

/// Name-keyed descriptor cache, widened on demand, read-many
#[derive(Debug, Default)]
pub struct DescriptorCache {
    entries: RwLock<HashMap<String, Arc<Descriptor>>>,
}

impl DescriptorCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the descriptor for `name`, creating it on first use.
    ///
    /// The returned descriptor carries every name in `label_names`. When the
    /// cached one lacks some, it is replaced by one over the union. Concurrent
    /// first use of a name hands out a single instance.
    pub fn describe(
        &self,
        name: &str,
        help: &str,
        label_names: &[&str],
    ) -> Result<Arc<Descriptor>> {
        if let Some(existing) = self.entries.read().get(name) {
            if existing.covers(label_names) {
                return Ok(Arc::clone(existing));
            }
        }

        let mut entries = self.entries.write();
        let known: Vec<String> = match entries.get(name) {
            Some(existing) if existing.covers(label_names) => return Ok(Arc::clone(existing)),
            Some(existing) => existing.label_names().to_vec(),
            None => Vec::new(),
        };
        let widened = !known.is_empty();

        let labels = known
            .into_iter()
            .chain(label_names.iter().map(|label| label.to_string()));
        let descriptor = Arc::new(Descriptor::new(name, help, labels)?);
        entries.insert(name.to_string(), Arc::clone(&descriptor));

        if widened {
            tracing::debug!(
                metric = name,
                labels = ?descriptor.label_names(),
                "Widened descriptor"
            );
        } else {
            tracing::debug!(
                metric = name,
                labels = ?descriptor.label_names(),
                "Registered descriptor"
            );
        }

        Ok(descriptor)
    }

    pub fn get(&self, name: &str) -> Option<Arc<Descriptor>> {
        self.entries.read().get(name).cloned()
    }

    /// All cached descriptors whose name starts with `prefix`, sorted by name
    pub fn with_prefix(&self, prefix: &str) -> Vec<Arc<Descriptor>> {
        let mut found: Vec<Arc<Descriptor>> = self
            .entries
            .read()
            .values()
            .filter(|descriptor| descriptor.name().starts_with(prefix))
            .cloned()
            .collect();
        found.sort_by(|a, b| a.name().cmp(b.name()));
        found
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}
