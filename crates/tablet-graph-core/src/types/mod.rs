//! Core data types: property values, elements and seeds.

mod element;
mod property;
mod seed;

pub use element::{Edge, Element, Entity, MatchedVertex};
pub use property::{Properties, PropertyValue};
pub use seed::{EdgeSeed, ElementSeed, EntitySeed, VertexRange};
