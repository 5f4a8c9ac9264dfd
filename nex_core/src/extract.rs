//! Entity-Collection Extractor
//!
//! Turns a whole endpoint document into a set of metric triples: flattened
//! document scalars, collection aggregates, and one labeled group per
//! collection entity.

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use crate::flatten::{normalize_path, FlattenRules, Flattener};
use crate::sample::Labels;
use crate::schema::{
    CollectionRule, CollectionShape, EndpointSchema, LabelSource, MetricScope, Namespace,
};
use crate::{CoreError, Result};

/// Un-prefixed metric: name suffix, raw value and labels
#[derive(Debug, Clone, PartialEq)]
pub struct MetricTriple {
    pub namespace: Namespace,
    /// Name after `<system>_<namespace>_`
    pub name: String,
    pub value: Value,
    pub labels: Labels,
}

/// Result of extracting one document
#[derive(Debug, Default)]
pub struct Extraction {
    pub triples: Vec<MetricTriple>,
    /// Entities skipped because of malformed structure
    pub skipped: usize,
}

type SeriesKey = (Namespace, String, Labels);

/// Extractor bound to one endpoint schema
#[derive(Debug)]
pub struct Extractor<'a> {
    schema: &'a EndpointSchema,
}

impl<'a> Extractor<'a> {
    pub fn new(schema: &'a EndpointSchema) -> Self {
        Self { schema }
    }

    /// Extract every triple from `document`.
    ///
    /// `base_labels` (normally just `server_id`) are attached to everything.
    /// Triples with an identical name and label set collapse, last one wins.
    pub fn extract(&self, document: &Value, base_labels: &Labels) -> Result<Extraction> {
        let Value::Object(root) = document else {
            return Err(CoreError::Shape(format!(
                "{} document is not a JSON object",
                self.schema.kind
            )));
        };

        let mut series: BTreeMap<SeriesKey, Value> = BTreeMap::new();
        let mut skipped = 0;

        if self.schema.flatten_document {
            let mut labels = base_labels.clone();
            apply_label_sources(&mut labels, document, self.schema.document_labels);

            let flattener = Flattener::new(FlattenRules::for_document(self.schema));
            for (name, value) in flattener.flatten(document, "") {
                series.insert((Namespace::Endpoint, name, labels.clone()), value);
            }

            for aggregate in self.schema.aggregates {
                let Some(Value::Array(elements)) = root.get(aggregate.collection) else {
                    continue;
                };
                for field in aggregate.fields {
                    let total: f64 = elements
                        .iter()
                        .filter_map(|element| element.get(*field).and_then(Value::as_f64))
                        .sum();
                    series.insert(
                        (Namespace::Endpoint, (*field).to_string(), labels.clone()),
                        Value::from(total),
                    );
                }
            }
        }

        for rule in self.schema.collections {
            skipped += extract_collection(root, rule, base_labels, &mut series);
        }

        let triples = series
            .into_iter()
            .map(|((namespace, name, labels), value)| MetricTriple {
                namespace,
                name,
                value,
                labels,
            })
            .collect();

        Ok(Extraction { triples, skipped })
    }
}

/// Walk one collection of `container`; returns the number of skipped entities.
fn extract_collection(
    container: &Map<String, Value>,
    rule: &CollectionRule,
    inherited: &Labels,
    series: &mut BTreeMap<SeriesKey, Value>,
) -> usize {
    let Some(field) = container.get(rule.field) else {
        return 0;
    };

    let entities: Vec<(Option<&str>, &Value)> = match (rule.shape, field) {
        (CollectionShape::List, Value::Array(elements)) => {
            elements.iter().map(|element| (None, element)).collect()
        }
        (CollectionShape::Keyed { .. }, Value::Object(entries)) => entries
            .iter()
            .map(|(key, element)| (Some(key.as_str()), element))
            .collect(),
        (_, Value::Null) => return 0,
        _ => {
            tracing::warn!(collection = rule.field, "Collection has unexpected shape, skipping");
            return 1;
        }
    };

    let flattener = Flattener::new(element_rules(rule));
    let mut skipped = 0;

    for (key, element) in entities {
        let Value::Object(fields) = element else {
            tracing::warn!(collection = rule.field, "Skipping non-object entity");
            skipped += 1;
            continue;
        };

        let mut labels = inherited.clone();
        if let (CollectionShape::Keyed { key_label }, Some(key)) = (rule.shape, key) {
            labels.insert(key_label.to_string(), key.to_string());
        }
        apply_label_sources(&mut labels, element, rule.labels);

        let (namespace, prefix) = match rule.scope {
            MetricScope::Flat => (Namespace::Endpoint, ""),
            MetricScope::Nested(segment) => (Namespace::Endpoint, segment),
            MetricScope::Subsystem(subsystem) => (Namespace::Subsystem(subsystem), ""),
        };

        for (name, value) in flattener.flatten(element, prefix) {
            series.insert((namespace, name, labels.clone()), value);
        }

        for child in rule.children {
            skipped += extract_collection(fields, child, &labels, series);
        }
    }

    skipped
}

/// Flatten rules for elements of `rule`: identity fields and child
/// collections are not flattened.
fn element_rules(rule: &CollectionRule) -> FlattenRules<'static> {
    let exclude = rule
        .labels
        .iter()
        .map(|source| source.path)
        .chain(rule.exclude.iter().copied())
        .chain(rule.children.iter().map(|child| child.field))
        .map(normalize_path)
        .collect();

    FlattenRules {
        exclude,
        timestamps: &[],
        enums: &[],
        renames: rule.renames,
    }
}

fn apply_label_sources(labels: &mut Labels, node: &Value, sources: &[LabelSource]) {
    for source in sources {
        let value = lookup(node, source.path).map(label_value).unwrap_or_default();
        labels.insert(source.label.to_string(), value);
    }
}

/// Resolve a dotted path inside `node`
fn lookup<'v>(node: &'v Value, path: &str) -> Option<&'v Value> {
    path.split('.').try_fold(node, |current, key| current.get(key))
}

fn label_value(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(flag) => flag.to_string(),
        Value::Null | Value::Array(_) | Value::Object(_) => String::new(),
    }
}
