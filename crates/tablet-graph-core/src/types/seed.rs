//! Query seeds: the starting points of ranged reads.

use serde::{Deserialize, Serialize};

use super::element::{Edge, Element, Entity};
use super::property::PropertyValue;

/// Seed identifying a single vertex.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntitySeed {
    pub vertex: PropertyValue,
}

impl EntitySeed {
    pub fn new(vertex: impl Into<PropertyValue>) -> Self {
        EntitySeed {
            vertex: vertex.into(),
        }
    }
}

/// Seed identifying a specific edge by its endpoints and directedness.
///
/// JSON form is the `[source, destination, directed]` triple from the
/// operation surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "(PropertyValue, PropertyValue, bool)")]
#[serde(into = "(PropertyValue, PropertyValue, bool)")]
pub struct EdgeSeed {
    pub source: PropertyValue,
    pub destination: PropertyValue,
    pub directed: bool,
}

impl EdgeSeed {
    pub fn new(
        source: impl Into<PropertyValue>,
        destination: impl Into<PropertyValue>,
        directed: bool,
    ) -> Self {
        EdgeSeed {
            source: source.into(),
            destination: destination.into(),
            directed,
        }
    }
}

impl From<(PropertyValue, PropertyValue, bool)> for EdgeSeed {
    fn from((source, destination, directed): (PropertyValue, PropertyValue, bool)) -> Self {
        EdgeSeed {
            source,
            destination,
            directed,
        }
    }
}

impl From<EdgeSeed> for (PropertyValue, PropertyValue, bool) {
    fn from(seed: EdgeSeed) -> Self {
        (seed.source, seed.destination, seed.directed)
    }
}

/// Either kind of seed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementSeed {
    Entity(EntitySeed),
    Edge(EdgeSeed),
}

impl ElementSeed {
    pub fn entity(vertex: impl Into<PropertyValue>) -> Self {
        ElementSeed::Entity(EntitySeed::new(vertex))
    }

    pub fn edge(
        source: impl Into<PropertyValue>,
        destination: impl Into<PropertyValue>,
        directed: bool,
    ) -> Self {
        ElementSeed::Edge(EdgeSeed::new(source, destination, directed))
    }

    /// Whether this seed's vertex (or either edge endpoint) matches an
    /// element's touching vertices.
    pub fn is_related(&self, element: &Element) -> bool {
        match (self, element) {
            (ElementSeed::Entity(seed), Element::Entity(Entity { vertex, .. })) => {
                &seed.vertex == vertex
            }
            (
                ElementSeed::Entity(seed),
                Element::Edge(Edge {
                    source,
                    destination,
                    ..
                }),
            ) => &seed.vertex == source || &seed.vertex == destination,
            (ElementSeed::Edge(seed), Element::Edge(edge)) => {
                seed.directed == edge.directed
                    && seed.source == edge.source
                    && seed.destination == edge.destination
            }
            (ElementSeed::Edge(_), Element::Entity(_)) => false,
        }
    }
}

impl From<EntitySeed> for ElementSeed {
    fn from(seed: EntitySeed) -> Self {
        ElementSeed::Entity(seed)
    }
}

impl From<EdgeSeed> for ElementSeed {
    fn from(seed: EdgeSeed) -> Self {
        ElementSeed::Edge(seed)
    }
}

/// Inclusive-start vertex range for the ranged scan operations.
///
/// The end vertex is inclusive at row-prefix granularity: every stored key
/// whose row begins with the end vertex's encoding is covered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VertexRange {
    pub start: PropertyValue,
    pub end: PropertyValue,
}

impl VertexRange {
    pub fn new(start: impl Into<PropertyValue>, end: impl Into<PropertyValue>) -> Self {
        VertexRange {
            start: start.into(),
            end: end.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entity_seed_relates_to_both_edge_ends() {
        let edge: Element = Edge::new("knows", "a", "b", true).into();
        assert!(ElementSeed::entity("a").is_related(&edge));
        assert!(ElementSeed::entity("b").is_related(&edge));
        assert!(!ElementSeed::entity("c").is_related(&edge));
    }

    #[test]
    fn edge_seed_requires_matching_direction() {
        let edge: Element = Edge::new("knows", "a", "b", true).into();
        assert!(ElementSeed::edge("a", "b", true).is_related(&edge));
        assert!(!ElementSeed::edge("a", "b", false).is_related(&edge));
    }

    #[test]
    fn seed_json_surface() {
        let seeds: Vec<ElementSeed> =
            serde_json::from_str(r#"[{"entity": 1}, {"edge": [1, 2, true]}]"#).unwrap();
        assert_eq!(seeds[0], ElementSeed::entity(1i64));
        assert_eq!(seeds[1], ElementSeed::edge(1i64, 2i64, true));
    }
}
