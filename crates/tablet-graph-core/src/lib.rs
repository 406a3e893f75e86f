//! Tablet Graph data model.
//!
//! A property graph expressed as typed elements over an ordered key-value
//! store. This crate holds everything that is independent of storage:
//!
//! - `types`: property values, entities, edges and query seeds
//! - `serialisation`: order-preserving typed codecs
//! - `aggregation`: per-property merge functions
//! - `filter` / `transform`: predicates and projections used by views
//! - `schema`: group definitions and the aggregation key
//! - `view`: per-query overlays
//! - `operation`: the declarative operation surface and typed chains
//!
//! The companion `tablet-graph-storage` crate turns these into ranged scans
//! and mutations against the tablet engine.

pub mod aggregation;
pub mod error;
pub mod filter;
pub mod operation;
pub mod schema;
pub mod serialisation;
pub mod transform;
pub mod types;
pub mod view;

pub use aggregation::Aggregator;
pub use error::{AggregationError, OperationError, SchemaError, SerialisationError};
pub use filter::{ElementFilter, FilterClause, Predicate};
pub use operation::chain::{ChainStep, OperationChain};
pub use operation::{
    AddElements, GetAdjacentEntitySeeds, GetAllElements, GetElements, GetElementsBetweenSets,
    GetElementsInRanges, GetElementsWithinSet, GraphOperation, IncludeEdgeType,
    IncludeIncomingOutgoingType, SummariseGroupOverRanges,
};
pub use schema::{
    EdgeDefinition, ElementDefinition, EntityDefinition, PropertyDefinition, Schema, SchemaBuilder,
};
pub use serialisation::TypeSerialiser;
pub use transform::{ElementTransformer, TransformFunction, TransformOp};
pub use types::{
    Edge, EdgeSeed, Element, ElementSeed, Entity, EntitySeed, MatchedVertex, Properties,
    PropertyValue, VertexRange,
};
pub use view::{View, ViewBuilder, ViewElementDefinition};
