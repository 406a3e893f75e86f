//! Error types for the tablet-graph store.
//!
//! The split follows the failure policy: [`ConfigError`] and schema errors
//! abort initialisation, [`CodecError`] is a per-element condition that
//! writers and retrievers log and skip, everything else terminates the
//! current operation and propagates.

use thiserror::Error;

use tablet_graph_core::error::{
    AggregationError, OperationError, SchemaError, SerialisationError,
};

/// Store configuration problems; fatal at initialisation.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configured key package identifier is not in the registry.
    #[error("unknown key package '{id}' (known: {known})")]
    UnknownKeyPackage { id: String, known: String },

    /// A required credential or connection field is empty.
    #[error("store configuration is missing '{field}'")]
    MissingField { field: &'static str },

    /// The configuration sources could not be read or merged.
    #[error("failed to load store configuration: {0}")]
    Load(#[from] config::ConfigError),
}

/// A single element failed to encode or decode.
///
/// Per-element: writers log the failure and continue with the rest of the
/// batch, retrievers log and skip the offending entry.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The element's group is not declared in the schema.
    #[error("element group '{group}' is not in the schema")]
    UnknownGroup { group: String },

    /// The element carries a property its group does not declare.
    #[error("group '{group}' does not declare property '{property}'")]
    UndeclaredProperty { group: String, property: String },

    /// A typed value failed its serialiser.
    #[error("property '{property}': {source}")]
    Property {
        property: String,
        #[source]
        source: SerialisationError,
    },

    /// A vertex identifier failed its serialiser.
    #[error("vertex: {source}")]
    Vertex {
        #[source]
        source: SerialisationError,
    },

    /// Two entries under one aggregation key could not be merged.
    #[error("aggregation: {0}")]
    Aggregation(#[from] AggregationError),

    /// A stored key does not parse under the configured layout.
    #[error("malformed key: {detail}")]
    MalformedKey { detail: String },

    /// Stored value bytes do not parse against the schema layout.
    #[error("malformed value: {detail}")]
    MalformedValue { detail: String },
}

impl CodecError {
    pub fn property(property: impl Into<String>, source: SerialisationError) -> Self {
        CodecError::Property {
            property: property.into(),
            source,
        }
    }

    pub fn malformed_key(detail: impl Into<String>) -> Self {
        CodecError::MalformedKey {
            detail: detail.into(),
        }
    }

    pub fn malformed_value(detail: impl Into<String>) -> Self {
        CodecError::MalformedValue {
            detail: detail.into(),
        }
    }
}

/// Failure to build or parse a server-side iterator's configuration.
#[derive(Debug, Error)]
pub enum IteratorConfigError {
    #[error("failed to encode iterator configuration: {0}")]
    Encode(String),

    #[error("failed to decode iterator configuration: {0}")]
    Decode(String),

    /// The engine was asked for an iterator the registry does not know.
    #[error("unknown server-side iterator '{name}'")]
    UnknownIterator { name: String },

    /// The serialised configuration carries an unsupported format version.
    #[error("iterator configuration version {found} is not supported (expected {expected})")]
    UnsupportedVersion { found: u8, expected: u8 },

    /// A pre-aggregation filter selected a property outside the group-by.
    /// Entries may already be merged on disk, so only group-by properties
    /// are stable below the query-time aggregator.
    #[error(
        "pre-aggregation filter on group '{group}' selects non-group-by property '{property}'; \
         use a post-aggregation filter"
    )]
    PreAggregationNotGroupBySafe { group: String, property: String },

    /// A transformer projects onto a property that lives in the key.
    #[error("transformer on group '{group}' projects onto key property '{property}'")]
    TransformOntoKeyProperty { group: String, property: String },
}

/// Top-level store error.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Operation(#[from] OperationError),

    #[error(transparent)]
    IteratorConfig(#[from] IteratorConfigError),

    #[error(transparent)]
    Codec(#[from] CodecError),

    /// Could not reach or open the tablet engine.
    #[error("tablet engine connection failed: {detail}")]
    Connection { detail: String },

    /// Credentials rejected by the tablet engine.
    #[error("authentication failed for user '{user}'")]
    Authentication { user: String },

    #[error("table '{table}' does not exist")]
    TableNotFound { table: String },

    /// A scan failed mid-stream.
    #[error("scan failed: {detail}")]
    Scan { detail: String },

    /// The engine rejected a mutation.
    #[error("mutation rejected: {detail}")]
    MutationRejected { detail: String },

    /// Any other engine-side failure.
    #[error("tablet engine error: {detail}")]
    Engine { detail: String },
}

impl StoreError {
    pub fn connection(detail: impl Into<String>) -> Self {
        StoreError::Connection {
            detail: detail.into(),
        }
    }

    pub fn scan(detail: impl Into<String>) -> Self {
        StoreError::Scan {
            detail: detail.into(),
        }
    }

    pub fn engine(detail: impl Into<String>) -> Self {
        StoreError::Engine {
            detail: detail.into(),
        }
    }
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
