//! Path Flattener
//!
//! Walks a JSON object and maps every numeric leaf to an underscore-joined,
//! lower-cased path. Arrays are never indexed: collections are the
//! extractor's job.

use std::collections::BTreeMap;

use chrono::DateTime;
use serde_json::Value;

use crate::schema::{EndpointSchema, EnumField};

/// Normalize one JSON key into a metric name segment.
///
/// Lower-cases, maps anything outside `[a-z0-9_]` to `_` and trims
/// surrounding underscores. May return an empty string.
pub fn normalize_key(key: &str) -> String {
    let mapped: String = key
        .chars()
        .map(|c| {
            let c = c.to_ascii_lowercase();
            if c.is_ascii_alphanumeric() || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    mapped.trim_matches('_').to_string()
}

/// Normalize a dotted schema path (`connection.ip`) into a flattened path
pub(crate) fn normalize_path(path: &str) -> String {
    path.split('.')
        .map(normalize_key)
        .filter(|segment| !segment.is_empty())
        .collect::<Vec<_>>()
        .join("_")
}

fn join(prefix: &str, segment: &str) -> String {
    if prefix.is_empty() {
        segment.to_string()
    } else {
        format!("{}_{}", prefix, segment)
    }
}

/// Field-level rules applied while flattening
#[derive(Debug, Clone, Default)]
pub struct FlattenRules<'a> {
    /// Flattened paths to skip (dotted or underscored)
    pub exclude: Vec<String>,
    pub timestamps: &'a [&'a str],
    pub enums: &'a [EnumField],
    pub renames: &'a [(&'a str, &'a str)],
}

impl<'a> FlattenRules<'a> {
    /// Document-level rules of an endpoint. Collection fields are excluded.
    pub fn for_document(schema: &'a EndpointSchema) -> Self {
        let exclude = schema
            .exclude
            .iter()
            .copied()
            .chain(schema.collection_fields())
            .map(normalize_path)
            .collect();

        Self {
            exclude,
            timestamps: schema.timestamps,
            enums: schema.enums,
            renames: schema.renames,
        }
    }

    fn is_excluded(&self, path: &str) -> bool {
        self.exclude.iter().any(|excluded| excluded == path)
    }

    fn is_timestamp(&self, path: &str) -> bool {
        self.timestamps.iter().any(|field| normalize_path(field) == path)
    }

    fn is_enum(&self, path: &str) -> bool {
        self.enums.iter().any(|field| field.field == path)
    }

    fn output_name(&self, path: String) -> String {
        self.renames
            .iter()
            .find(|(from, _)| *from == path)
            .map(|(_, to)| to.to_string())
            .unwrap_or(path)
    }
}

/// Flattener bound to a rule set
#[derive(Debug, Clone, Default)]
pub struct Flattener<'a> {
    rules: FlattenRules<'a>,
}

impl<'a> Flattener<'a> {
    pub fn new(rules: FlattenRules<'a>) -> Self {
        Self { rules }
    }

    /// Flatten `node` under `prefix`.
    ///
    /// Numbers pass through, booleans become 0/1, timestamp fields become
    /// unix milliseconds, enum fields keep their string. Everything else is
    /// dropped. Non-object input yields an empty mapping. Rules match paths
    /// relative to `node`; `prefix` is only prepended to the output names.
    pub fn flatten(&self, node: &Value, prefix: &str) -> BTreeMap<String, Value> {
        let mut out = BTreeMap::new();
        match node {
            Value::Object(_) => self.walk(node, "", &mut out),
            Value::Array(_) => {
                tracing::debug!(prefix, "Refusing to flatten a bare array");
            }
            _ => {}
        }

        if prefix.is_empty() {
            out
        } else {
            out.into_iter()
                .map(|(name, value)| (join(prefix, &name), value))
                .collect()
        }
    }

    fn walk(&self, node: &Value, path_prefix: &str, out: &mut BTreeMap<String, Value>) {
        let Value::Object(fields) = node else {
            return;
        };

        for (key, value) in fields {
            let segment = normalize_key(key);
            if segment.is_empty() {
                continue;
            }
            let path = join(path_prefix, &segment);
            if self.rules.is_excluded(&path) {
                continue;
            }

            match value {
                Value::Object(_) => self.walk(value, &path, out),
                Value::Array(_) | Value::Null => {}
                Value::Number(_) => {
                    out.insert(self.rules.output_name(path), value.clone());
                }
                Value::Bool(flag) => {
                    out.insert(self.rules.output_name(path), Value::from(u8::from(*flag)));
                }
                Value::String(text) => {
                    if self.rules.is_timestamp(&path) {
                        match DateTime::parse_from_rfc3339(text) {
                            Ok(ts) => {
                                let millis = Value::from(ts.timestamp_millis());
                                out.insert(self.rules.output_name(path), millis);
                            }
                            Err(e) => {
                                tracing::debug!(field = %path, error = %e, "Unparseable timestamp");
                            }
                        }
                    } else if self.rules.is_enum(&path) {
                        out.insert(self.rules.output_name(path), value.clone());
                    }
                }
            }
        }
    }
}

/// Flatten with no exclusions, timestamps, enums or renames
pub fn flatten(node: &Value, prefix: &str) -> BTreeMap<String, Value> {
    Flattener::default().flatten(node, prefix)
}
