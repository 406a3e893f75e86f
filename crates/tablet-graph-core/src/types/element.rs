//! Graph elements: entities and edges.
//!
//! An [`Element`] is the unit the store reads and writes. Entities hang off a
//! single vertex; edges connect two vertices and are stored under both
//! endpoints so a single range scan per seed finds them (see the storage
//! crate's key packages).

use serde::{Deserialize, Serialize};

use super::property::{Properties, PropertyValue};

/// Which end of an edge a seed query matched.
///
/// Retrievers set this on edges returned from seed scans so callers (and the
/// adjacent-seeds projection) know which endpoint is the "far" one. It is a
/// query-time hint, not part of the edge's identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchedVertex {
    Source,
    Destination,
}

/// An entity: a vertex with a group and properties.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub group: String,
    pub vertex: PropertyValue,
    #[serde(default)]
    pub properties: Properties,
}

impl Entity {
    pub fn new(group: impl Into<String>, vertex: impl Into<PropertyValue>) -> Self {
        Entity {
            group: group.into(),
            vertex: vertex.into(),
            properties: Properties::new(),
        }
    }

    pub fn with_property(
        mut self,
        name: impl Into<String>,
        value: impl Into<PropertyValue>,
    ) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }
}

/// An edge between `source` and `destination`, directed or undirected.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Edge {
    pub group: String,
    pub source: PropertyValue,
    pub destination: PropertyValue,
    pub directed: bool,
    #[serde(default)]
    pub properties: Properties,
    /// Set by retrievers on seed queries; ignored by equality.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matched_vertex: Option<MatchedVertex>,
}

impl Edge {
    pub fn new(
        group: impl Into<String>,
        source: impl Into<PropertyValue>,
        destination: impl Into<PropertyValue>,
        directed: bool,
    ) -> Self {
        Edge {
            group: group.into(),
            source: source.into(),
            destination: destination.into(),
            directed,
            properties: Properties::new(),
            matched_vertex: None,
        }
    }

    pub fn with_property(
        mut self,
        name: impl Into<String>,
        value: impl Into<PropertyValue>,
    ) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }

    /// The endpoint opposite the matched vertex, defaulting to the
    /// destination when no hint is present.
    pub fn far_vertex(&self) -> &PropertyValue {
        match self.matched_vertex {
            Some(MatchedVertex::Destination) => &self.source,
            _ => &self.destination,
        }
    }
}

impl PartialEq for Edge {
    fn eq(&self, other: &Self) -> bool {
        self.group == other.group
            && self.source == other.source
            && self.destination == other.destination
            && self.directed == other.directed
            && self.properties == other.properties
    }
}

/// An entity or an edge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Element {
    Entity(Entity),
    Edge(Edge),
}

impl Element {
    pub fn group(&self) -> &str {
        match self {
            Element::Entity(e) => &e.group,
            Element::Edge(e) => &e.group,
        }
    }

    pub fn properties(&self) -> &Properties {
        match self {
            Element::Entity(e) => &e.properties,
            Element::Edge(e) => &e.properties,
        }
    }

    pub fn properties_mut(&mut self) -> &mut Properties {
        match self {
            Element::Entity(e) => &mut e.properties,
            Element::Edge(e) => &mut e.properties,
        }
    }

    pub fn is_edge(&self) -> bool {
        matches!(self, Element::Edge(_))
    }

    pub fn as_entity(&self) -> Option<&Entity> {
        match self {
            Element::Entity(e) => Some(e),
            Element::Edge(_) => None,
        }
    }

    pub fn as_edge(&self) -> Option<&Edge> {
        match self {
            Element::Edge(e) => Some(e),
            Element::Entity(_) => None,
        }
    }
}

impl From<Entity> for Element {
    fn from(e: Entity) -> Self {
        Element::Entity(e)
    }
}

impl From<Edge> for Element {
    fn from(e: Edge) -> Self {
        Element::Edge(e)
    }
}
