//! Error types for tablet-graph-core.
//!
//! Each concern gets its own enum so callers can match precisely:
//! [`SchemaError`] is fatal at initialisation, [`OperationError`] is surfaced
//! synchronously before any scan begins, and [`SerialisationError`] /
//! [`AggregationError`] describe per-value failures that the store layer
//! wraps into its own codec errors.

use thiserror::Error;

/// An invalid or internally inconsistent schema.
///
/// Schema errors abort store initialisation; they are never recoverable
/// per-element conditions.
///
/// # Examples
///
/// ```rust
/// use tablet_graph_core::error::SchemaError;
///
/// let error = SchemaError::UnknownGroupByProperty {
///     group: "link".to_string(),
///     property: "count".to_string(),
/// };
///
/// match &error {
///     SchemaError::UnknownGroupByProperty { group, property } => {
///         assert_eq!(group, "link");
///         assert_eq!(property, "count");
///     }
///     _ => panic!("unexpected variant"),
/// }
///
/// assert!(error.to_string().contains("group-by"));
/// ```
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SchemaError {
    /// A group was declared with an empty name.
    #[error("schema group names must be non-empty")]
    EmptyGroupName,

    /// The same group name was declared as both an entity and an edge group.
    #[error("group '{group}' is declared as both an entity and an edge group")]
    DuplicateGroup { group: String },

    /// A property name appears more than once in a group's declaration.
    #[error("group '{group}' declares property '{property}' more than once")]
    DuplicateProperty { group: String, property: String },

    /// A group-by entry does not name a declared property.
    #[error("group '{group}' uses undeclared property '{property}' in its group-by")]
    UnknownGroupByProperty { group: String, property: String },

    /// The visibility property is not declared in the group's property list.
    #[error("group '{group}' names undeclared visibility property '{property}'")]
    UnknownVisibilityProperty { group: String, property: String },

    /// The timestamp property is not declared in the group's property list.
    #[error("group '{group}' names undeclared timestamp property '{property}'")]
    UnknownTimestampProperty { group: String, property: String },

    /// Visibility and timestamp properties live in the key, so they cannot
    /// also participate in the aggregation key.
    #[error("group '{group}' places key property '{property}' in its group-by")]
    KeyPropertyInGroupBy { group: String, property: String },

    /// The timestamp property must be declared with an integer serialiser.
    #[error("group '{group}' timestamp property '{property}' is not an integer")]
    NonIntegerTimestamp { group: String, property: String },

    /// Row keys carry no group tag, so every group's vertex positions must
    /// share one serialiser.
    #[error("groups '{first}' and '{second}' declare different vertex serialisers")]
    MixedVertexSerialisers { first: String, second: String },
}

/// An operation that cannot be run against the current schema or view.
///
/// Raised during validation, before any ranges are built or scanners opened.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum OperationError {
    /// The view references a group the schema does not declare.
    #[error("unknown group '{group}'")]
    UnknownGroup { group: String },

    /// A filter, transformer or group-by references an undeclared property.
    #[error("group '{group}' has no property '{property}'")]
    UnknownProperty { group: String, property: String },

    /// The view selects no groups at all.
    #[error("view selects no groups")]
    EmptyView,

    /// An operation chain wired a step to an incompatible predecessor.
    #[error("chain step {position} expects {expected} input but receives {actual}")]
    ChainTypeMismatch {
        position: usize,
        expected: &'static str,
        actual: &'static str,
    },

    /// An operation chain with no steps.
    #[error("operation chain is empty")]
    EmptyChain,

    /// The operation kind is not supported by the executing store.
    #[error("operation '{kind}' is not supported by this store")]
    Unsupported { kind: &'static str },
}

/// A typed value that cannot be serialised or deserialised.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SerialisationError {
    /// The value's variant does not match the declared serialiser.
    #[error("{serialiser} serialiser cannot encode a {actual} value")]
    WrongType {
        serialiser: &'static str,
        actual: &'static str,
    },

    /// The byte payload is the wrong length for a fixed-width codec.
    #[error("{serialiser} expects {expected} bytes, got {actual}")]
    WrongLength {
        serialiser: &'static str,
        expected: usize,
        actual: usize,
    },

    /// The byte payload is structurally invalid.
    #[error("{serialiser} payload is malformed: {detail}")]
    Malformed {
        serialiser: &'static str,
        detail: String,
    },
}

/// Two property values that cannot be folded together.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AggregationError {
    #[error("{aggregator} cannot combine {left} with {right}")]
    IncompatibleValues {
        aggregator: &'static str,
        left: &'static str,
        right: &'static str,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_error_display_names_the_group() {
        let err = SchemaError::UnknownGroupByProperty {
            group: "edge".to_string(),
            property: "count".to_string(),
        };
        assert!(err.to_string().contains("edge"));
        assert!(err.to_string().contains("count"));
    }

    #[test]
    fn chain_mismatch_display_includes_position() {
        let err = OperationError::ChainTypeMismatch {
            position: 2,
            expected: "elements",
            actual: "entity seeds",
        };
        assert!(err.to_string().contains("step 2"));
    }
}
