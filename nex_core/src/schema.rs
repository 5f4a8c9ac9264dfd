//! Endpoint Schemas
//!
//! Declarative description of every monitoring endpoint: which fields are
//! flattened generically, which are entity collections, and which element
//! fields become labels. Adding an endpoint is a data change here, not new
//! control flow in the extractor.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Broker subsystem family, used as the first metric name segment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum System {
    /// Core server (`gnatsd_*`)
    Core,
    /// Stream engine (`jetstream_*`)
    JetStream,
}

impl System {
    pub fn prefix(&self) -> &'static str {
        match self {
            System::Core => "gnatsd",
            System::JetStream => "jetstream",
        }
    }
}

impl fmt::Display for System {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.prefix())
    }
}

impl FromStr for System {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "core" | "gnatsd" => Ok(System::Core),
            "jetstream" | "js" => Ok(System::JetStream),
            other => Err(format!("unknown system '{}'", other)),
        }
    }
}

/// Monitoring endpoint kinds
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EndpointKind {
    Varz,
    Connz,
    Routez,
    Subsz,
    Healthz,
    Leafz,
    Gatewayz,
    Accstatz,
    /// Stream engine server status
    Jsz,
    /// Stream engine per-account usage
    JszAccounts,
    /// Any other endpoint, flattened generically
    Custom(String),
}

impl EndpointKind {
    /// Parse an endpoint name. Unknown names become [`EndpointKind::Custom`].
    pub fn parse(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "varz" => EndpointKind::Varz,
            "connz" => EndpointKind::Connz,
            "routez" => EndpointKind::Routez,
            "subsz" => EndpointKind::Subsz,
            "healthz" => EndpointKind::Healthz,
            "leafz" => EndpointKind::Leafz,
            "gatewayz" => EndpointKind::Gatewayz,
            "accstatz" => EndpointKind::Accstatz,
            "jsz" => EndpointKind::Jsz,
            "accounts" => EndpointKind::JszAccounts,
            _ => EndpointKind::Custom(name.trim().to_string()),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            EndpointKind::Varz => "varz",
            EndpointKind::Connz => "connz",
            EndpointKind::Routez => "routez",
            EndpointKind::Subsz => "subsz",
            EndpointKind::Healthz => "healthz",
            EndpointKind::Leafz => "leafz",
            EndpointKind::Gatewayz => "gatewayz",
            EndpointKind::Accstatz => "accstatz",
            EndpointKind::Jsz => "jsz",
            EndpointKind::JszAccounts => "accounts",
            EndpointKind::Custom(name) => name,
        }
    }

    /// System an endpoint belongs to when none is given explicitly
    pub fn default_system(&self) -> System {
        match self {
            EndpointKind::Jsz | EndpointKind::JszAccounts => System::JetStream,
            _ => System::Core,
        }
    }
}

impl From<String> for EndpointKind {
    fn from(name: String) -> Self {
        EndpointKind::parse(&name)
    }
}

impl From<EndpointKind> for String {
    fn from(kind: EndpointKind) -> Self {
        kind.name().to_string()
    }
}

impl fmt::Display for EndpointKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A label whose value is read from a dotted JSON path
#[derive(Debug, Clone, Copy)]
pub struct LabelSource {
    pub label: &'static str,
    pub path: &'static str,
}

const fn label(label: &'static str, path: &'static str) -> LabelSource {
    LabelSource { label, path }
}

/// Status-style string field with a closed word-to-code table.
///
/// Produces `<field>` carrying the code and `<field>_value{<label>=word}`
/// which is 1 for the healthy word and 0 otherwise.
#[derive(Debug, Clone, Copy)]
pub struct EnumField {
    pub field: &'static str,
    pub label: &'static str,
    pub codes: &'static [(&'static str, i64)],
    pub healthy: &'static str,
    pub unknown_code: i64,
}

impl EnumField {
    pub fn code(&self, word: &str) -> i64 {
        self.codes
            .iter()
            .find(|(known, _)| known.eq_ignore_ascii_case(word))
            .map(|(_, code)| *code)
            .unwrap_or(self.unknown_code)
    }

    pub fn is_healthy(&self, word: &str) -> bool {
        self.healthy.eq_ignore_ascii_case(word)
    }
}

/// How a collection field is laid out in the document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectionShape {
    /// JSON array of entity objects
    List,
    /// JSON object mapping an entity key to the entity object
    Keyed { key_label: &'static str },
}

/// Where collection metrics are named
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricScope {
    /// `<system>_<endpoint>_<field>`
    Flat,
    /// `<system>_<endpoint>_<segment>_<field>`
    Nested(&'static str),
    /// `<system>_<subsystem>_<field>`
    Subsystem(&'static str),
}

/// Second metric-name segment of a triple
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Namespace {
    /// The endpoint's own name segment
    Endpoint,
    Subsystem(&'static str),
}

/// Entity collection inside a document
#[derive(Debug, Clone, Copy)]
pub struct CollectionRule {
    pub field: &'static str,
    pub shape: CollectionShape,
    pub scope: MetricScope,
    /// Identity fields; each becomes a label and is not flattened
    pub labels: &'static [LabelSource],
    /// Element paths never flattened
    pub exclude: &'static [&'static str],
    /// Element path to metric suffix overrides
    pub renames: &'static [(&'static str, &'static str)],
    /// Collections nested in every element; they inherit the element's labels
    pub children: &'static [CollectionRule],
}

/// Sum of one field across a collection, exposed as a document-level metric
#[derive(Debug, Clone, Copy)]
pub struct Aggregate {
    pub collection: &'static str,
    pub fields: &'static [&'static str],
}

/// Static per-endpoint extraction rules
#[derive(Debug, Clone)]
pub struct EndpointSchema {
    pub kind: EndpointKind,
    /// URL path, relative to the server's base URL
    pub path: String,
    /// Metric name segment after the system
    pub segment: String,
    /// Whether document-level scalars are flattened
    pub flatten_document: bool,
    pub exclude: &'static [&'static str],
    /// RFC 3339 string fields emitted as unix milliseconds
    pub timestamps: &'static [&'static str],
    pub renames: &'static [(&'static str, &'static str)],
    pub enums: &'static [EnumField],
    /// Labels lifted from the document onto every document-level metric
    pub document_labels: &'static [LabelSource],
    pub aggregates: &'static [Aggregate],
    pub collections: &'static [CollectionRule],
}

impl EndpointSchema {
    fn generic(kind: EndpointKind, path: &str, segment: &str) -> Self {
        Self {
            kind,
            path: path.to_string(),
            segment: segment.to_string(),
            flatten_document: true,
            exclude: &[],
            timestamps: &[],
            renames: &[],
            enums: &[],
            document_labels: &[],
            aggregates: &[],
            collections: &[],
        }
    }

    /// Schema for an endpoint name
    pub fn for_endpoint(name: &str) -> Self {
        Self::for_kind(EndpointKind::parse(name))
    }

    pub fn for_kind(kind: EndpointKind) -> Self {
        match kind {
            EndpointKind::Varz => Self {
                exclude: VARZ_EXCLUDE,
                timestamps: &["start", "config_load_time"],
                ..Self::generic(kind, "varz", "varz")
            },
            EndpointKind::Connz => Self {
                exclude: &["now"],
                renames: &[("total", "total_connections")],
                aggregates: &[Aggregate {
                    collection: "connections",
                    fields: &[
                        "pending_bytes",
                        "subscriptions",
                        "in_msgs",
                        "out_msgs",
                        "in_bytes",
                        "out_bytes",
                    ],
                }],
                collections: &[CONNZ_CONNECTIONS],
                ..Self::generic(kind, "connz", "connz")
            },
            EndpointKind::Routez => Self {
                exclude: &["now"],
                collections: &[ROUTEZ_ROUTES],
                ..Self::generic(kind, "routez", "routez")
            },
            EndpointKind::Subsz => Self {
                exclude: &["now"],
                collections: &[SUBSZ_SUBSCRIPTIONS],
                ..Self::generic(kind, "subsz", "subsz")
            },
            EndpointKind::Healthz => Self {
                enums: &[HEALTH_STATUS],
                ..Self::generic(kind, "healthz", "healthz")
            },
            EndpointKind::Leafz => Self {
                exclude: &["now"],
                collections: &[LEAFZ_LEAFS],
                ..Self::generic(kind, "leafz", "leafz")
            },
            EndpointKind::Gatewayz => Self {
                exclude: &["now", "port", "inbound_gateways"],
                collections: &[GATEWAYZ_OUTBOUND],
                ..Self::generic(kind, "gatewayz", "gatewayz")
            },
            EndpointKind::Accstatz => Self {
                flatten_document: false,
                collections: &[ACCSTATZ_ACCOUNTS],
                ..Self::generic(kind, "accstatz?unused=1", "accstatz")
            },
            EndpointKind::Jsz => Self {
                exclude: &["now", "account_details"],
                renames: &[
                    ("streams", "total_streams"),
                    ("consumers", "total_consumers"),
                    ("messages", "total_messages"),
                    ("bytes", "total_message_bytes"),
                ],
                document_labels: JSZ_DOCUMENT_LABELS,
                ..Self::generic(kind, "jsz", "server")
            },
            EndpointKind::JszAccounts => Self {
                flatten_document: false,
                collections: &[JSZ_ACCOUNT_DETAILS],
                ..Self::generic(
                    kind,
                    "jsz?accounts=true&streams=true&consumers=true&config=true",
                    "account",
                )
            },
            EndpointKind::Custom(ref name) => {
                let segment = crate::flatten::normalize_key(name);
                let path = name.clone();
                Self::generic(kind, &path, &segment)
            }
        }
    }

    /// Top-level fields that hold collections
    pub fn collection_fields(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.collections.iter().map(|rule| rule.field)
    }

    /// Subsystem name segments used anywhere in the collection tree
    pub fn subsystems(&self) -> Vec<&'static str> {
        fn walk(rules: &[CollectionRule], out: &mut Vec<&'static str>) {
            for rule in rules {
                if let MetricScope::Subsystem(subsystem) = rule.scope {
                    if !out.contains(&subsystem) {
                        out.push(subsystem);
                    }
                }
                walk(rule.children, out);
            }
        }

        let mut out = Vec::new();
        walk(self.collections, &mut out);
        out
    }
}

const VARZ_EXCLUDE: &[&str] = &[
    "now",
    "port",
    "http_port",
    "https_port",
    "cluster_port",
    "cluster_cluster_port",
    "gateway_port",
    "leaf_port",
    "trusted_operators_claim",
];

const JSZ_DOCUMENT_LABELS: &[LabelSource] = &[
    label("cluster", "meta_cluster.name"),
    label("domain", "config.domain"),
    label("meta_leader", "meta_cluster.leader"),
];

const HEALTH_STATUS: EnumField = EnumField {
    field: "status",
    label: "status",
    codes: &[("ok", 0), ("unavailable", 1), ("error", 2)],
    healthy: "ok",
    unknown_code: 3,
};

const CONNZ_CONNECTIONS: CollectionRule = CollectionRule {
    field: "connections",
    shape: CollectionShape::List,
    scope: MetricScope::Nested("conn"),
    labels: &[
        label("cid", "cid"),
        label("name", "name"),
        label("ip", "ip"),
        label("port", "port"),
        label("lang", "lang"),
        label("version", "version"),
        label("account", "account"),
    ],
    exclude: &["start", "last_activity"],
    renames: &[],
    children: &[],
};

const ROUTEZ_ROUTES: CollectionRule = CollectionRule {
    field: "routes",
    shape: CollectionShape::List,
    scope: MetricScope::Nested("route"),
    labels: &[
        label("rid", "rid"),
        label("remote_id", "remote_id"),
        label("ip", "ip"),
        label("port", "port"),
    ],
    exclude: &[],
    renames: &[],
    children: &[],
};

const SUBSZ_SUBSCRIPTIONS: CollectionRule = CollectionRule {
    field: "subscriptions_list",
    shape: CollectionShape::List,
    scope: MetricScope::Nested("sub"),
    labels: &[
        label("subject", "subject"),
        label("queue", "qgroup"),
        label("account", "account"),
        label("cid", "cid"),
    ],
    exclude: &["sid"],
    renames: &[],
    children: &[],
};

const LEAFZ_LEAFS: CollectionRule = CollectionRule {
    field: "leafs",
    shape: CollectionShape::List,
    scope: MetricScope::Nested("conn"),
    labels: &[
        label("name", "name"),
        label("account", "account"),
        label("ip", "ip"),
        label("port", "port"),
    ],
    exclude: &[],
    renames: &[],
    children: &[],
};

const GATEWAYZ_OUTBOUND: CollectionRule = CollectionRule {
    field: "outbound_gateways",
    shape: CollectionShape::Keyed { key_label: "gateway" },
    scope: MetricScope::Nested("outbound"),
    labels: &[label("ip", "connection.ip"), label("port", "connection.port")],
    exclude: &["connection.cid", "connection.start", "connection.last_activity"],
    renames: &[],
    children: &[],
};

const ACCSTATZ_ACCOUNTS: CollectionRule = CollectionRule {
    field: "account_statz",
    shape: CollectionShape::List,
    scope: MetricScope::Flat,
    labels: &[label("account", "acc"), label("account_name", "name")],
    exclude: &[],
    renames: &[],
    children: &[],
};

const JSZ_CONSUMERS: CollectionRule = CollectionRule {
    field: "consumer_detail",
    shape: CollectionShape::List,
    scope: MetricScope::Subsystem("consumer"),
    labels: &[
        label("consumer_name", "name"),
        label("consumer_desc", "config.description"),
    ],
    exclude: &[],
    renames: &[],
    children: &[],
};

const JSZ_STREAMS: CollectionRule = CollectionRule {
    field: "stream_detail",
    shape: CollectionShape::List,
    scope: MetricScope::Subsystem("stream"),
    labels: &[
        label("stream_name", "name"),
        label("stream_leader", "cluster.leader"),
    ],
    exclude: &[],
    renames: &[
        ("state_messages", "total_messages"),
        ("state_bytes", "total_bytes"),
        ("state_first_seq", "first_seq"),
        ("state_last_seq", "last_seq"),
        ("state_consumer_count", "consumer_count"),
    ],
    children: &[JSZ_CONSUMERS],
};

const JSZ_ACCOUNT_DETAILS: CollectionRule = CollectionRule {
    field: "account_details",
    shape: CollectionShape::List,
    scope: MetricScope::Flat,
    labels: &[label("account", "name"), label("account_id", "id")],
    exclude: &[],
    renames: &[
        ("reserved_memory", "max_memory"),
        ("reserved_storage", "max_storage"),
        ("memory", "memory_used"),
        ("storage", "storage_used"),
    ],
    children: &[JSZ_STREAMS],
};
