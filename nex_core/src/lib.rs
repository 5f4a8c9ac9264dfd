//! # nex_core
//!
//! Extraction engine that turns NATS monitoring JSON documents into
//! labeled Prometheus samples.
//!
//! The engine is pure and synchronous. Fetching documents and driving
//! scrapes lives in `nex_collector`.
//!
//! ```text
//!  document ──► Flattener ─┐
//!                          ├──► MetricTriple set ──► Synthesizer ──► MetricSample
//!  document ──► Extractor ─┘                             │
//!                                                 DescriptorCache
//! ```

pub mod descriptor;
pub mod extract;
pub mod flatten;
pub mod sample;
pub mod schema;
pub mod synth;

pub use descriptor::{global_descriptors, Descriptor, DescriptorCache};
pub use extract::{Extraction, Extractor, MetricTriple};
pub use flatten::{flatten, normalize_key, FlattenRules, Flattener};
pub use sample::{server_labels, Labels, MetricSample, SERVER_ID_LABEL};
pub use schema::{
    CollectionRule, CollectionShape, EndpointKind, EndpointSchema, EnumField, LabelSource,
    MetricScope, Namespace, System,
};
pub use synth::Synthesizer;

/// Errors raised by the extraction engine
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Invalid metric descriptor for {name}: {source}")]
    Descriptor {
        name: String,
        #[source]
        source: prometheus::Error,
    },

    #[error("Unexpected document shape: {0}")]
    Shape(String),
}

pub type Result<T> = std::result::Result<T, CoreError>;
