//! Declarative operations and their JSON surface.
//!
//! Operation kinds are a closed tagged enum ([`GraphOperation`]) so store
//! dispatch is an exhaustive match rather than runtime class lookup. The
//! serde shape follows the documented JSON surface: a `class` tag plus
//! camel-case option fields.

pub mod chain;

use serde::{Deserialize, Serialize};

use crate::types::{Element, ElementSeed, EntitySeed, VertexRange};
use crate::view::View;

/// Direction filter for edge results relative to the seed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IncludeIncomingOutgoingType {
    Incoming,
    Outgoing,
    #[default]
    Either,
}

/// Which edges an operation returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IncludeEdgeType {
    #[default]
    All,
    Directed,
    Undirected,
    None,
}

impl IncludeEdgeType {
    /// Whether an edge with the given directedness passes this inclusion.
    pub fn accepts(&self, directed: bool) -> bool {
        match self {
            IncludeEdgeType::All => true,
            IncludeEdgeType::Directed => directed,
            IncludeEdgeType::Undirected => !directed,
            IncludeEdgeType::None => false,
        }
    }
}

fn default_true() -> bool {
    true
}

/// Fetch elements touching each seed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetElements {
    #[serde(default)]
    pub seeds: Vec<ElementSeed>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub view: Option<View>,
    #[serde(default = "default_true")]
    pub include_entities: bool,
    #[serde(default)]
    pub include_edges: IncludeEdgeType,
    #[serde(default, rename = "includeIncomingOutgoingType")]
    pub include_incoming_outgoing: IncludeIncomingOutgoingType,
}

impl Default for GetElements {
    fn default() -> Self {
        GetElements::new([])
    }
}

impl GetElements {
    pub fn new<I: IntoIterator<Item = ElementSeed>>(seeds: I) -> Self {
        GetElements {
            seeds: seeds.into_iter().collect(),
            view: None,
            include_entities: true,
            include_edges: IncludeEdgeType::All,
            include_incoming_outgoing: IncludeIncomingOutgoingType::Either,
        }
    }

    pub fn with_view(mut self, view: View) -> Self {
        self.view = Some(view);
        self
    }

    pub fn entities_only(mut self) -> Self {
        self.include_entities = true;
        self.include_edges = IncludeEdgeType::None;
        self
    }

    pub fn edges_only(mut self) -> Self {
        self.include_entities = false;
        self.include_edges = IncludeEdgeType::All;
        self
    }

    pub fn with_direction(mut self, direction: IncludeIncomingOutgoingType) -> Self {
        self.include_incoming_outgoing = direction;
        self
    }
}

/// Scan the whole table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetAllElements {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub view: Option<View>,
    #[serde(default = "default_true")]
    pub include_entities: bool,
    #[serde(default)]
    pub include_edges: IncludeEdgeType,
}

impl Default for GetAllElements {
    fn default() -> Self {
        GetAllElements::new()
    }
}

impl GetAllElements {
    pub fn new() -> Self {
        GetAllElements {
            view: None,
            include_entities: true,
            include_edges: IncludeEdgeType::All,
        }
    }

    pub fn with_view(mut self, view: View) -> Self {
        self.view = Some(view);
        self
    }
}

/// Fetch the far endpoints of edges touching each seed, as new seeds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetAdjacentEntitySeeds {
    #[serde(default)]
    pub seeds: Vec<EntitySeed>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub view: Option<View>,
    #[serde(default, rename = "includeIncomingOutgoingType")]
    pub include_incoming_outgoing: IncludeIncomingOutgoingType,
}

impl Default for GetAdjacentEntitySeeds {
    fn default() -> Self {
        GetAdjacentEntitySeeds::new([])
    }
}

impl GetAdjacentEntitySeeds {
    pub fn new<I: IntoIterator<Item = EntitySeed>>(seeds: I) -> Self {
        GetAdjacentEntitySeeds {
            seeds: seeds.into_iter().collect(),
            view: None,
            include_incoming_outgoing: IncludeIncomingOutgoingType::Either,
        }
    }

    pub fn with_direction(mut self, direction: IncludeIncomingOutgoingType) -> Self {
        self.include_incoming_outgoing = direction;
        self
    }
}

/// Elements whose every endpoint lies inside the seed set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetElementsWithinSet {
    #[serde(default)]
    pub seeds: Vec<EntitySeed>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub view: Option<View>,
    #[serde(default = "default_true")]
    pub include_entities: bool,
    #[serde(default)]
    pub include_edges: IncludeEdgeType,
}

impl Default for GetElementsWithinSet {
    fn default() -> Self {
        GetElementsWithinSet::new([])
    }
}

impl GetElementsWithinSet {
    pub fn new<I: IntoIterator<Item = EntitySeed>>(seeds: I) -> Self {
        GetElementsWithinSet {
            seeds: seeds.into_iter().collect(),
            view: None,
            include_entities: true,
            include_edges: IncludeEdgeType::All,
        }
    }
}

/// Edges from set A whose far endpoint lies in set B (plus A's entities).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetElementsBetweenSets {
    #[serde(default)]
    pub seeds: Vec<EntitySeed>,
    #[serde(default, rename = "seedsB")]
    pub seeds_b: Vec<EntitySeed>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub view: Option<View>,
    #[serde(default = "default_true")]
    pub include_entities: bool,
    #[serde(default)]
    pub include_edges: IncludeEdgeType,
    #[serde(default, rename = "includeIncomingOutgoingType")]
    pub include_incoming_outgoing: IncludeIncomingOutgoingType,
}

impl Default for GetElementsBetweenSets {
    fn default() -> Self {
        GetElementsBetweenSets::new([], [])
    }
}

impl GetElementsBetweenSets {
    pub fn new<A, B>(seeds: A, seeds_b: B) -> Self
    where
        A: IntoIterator<Item = EntitySeed>,
        B: IntoIterator<Item = EntitySeed>,
    {
        GetElementsBetweenSets {
            seeds: seeds.into_iter().collect(),
            seeds_b: seeds_b.into_iter().collect(),
            view: None,
            include_entities: true,
            include_edges: IncludeEdgeType::All,
            include_incoming_outgoing: IncludeIncomingOutgoingType::Either,
        }
    }
}

/// Elements whose row falls inside any of the vertex ranges.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetElementsInRanges {
    #[serde(default)]
    pub ranges: Vec<VertexRange>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub view: Option<View>,
    #[serde(default = "default_true")]
    pub include_entities: bool,
    #[serde(default)]
    pub include_edges: IncludeEdgeType,
}

impl Default for GetElementsInRanges {
    fn default() -> Self {
        GetElementsInRanges::new([])
    }
}

impl GetElementsInRanges {
    pub fn new<I: IntoIterator<Item = VertexRange>>(ranges: I) -> Self {
        GetElementsInRanges {
            ranges: ranges.into_iter().collect(),
            view: None,
            include_entities: true,
            include_edges: IncludeEdgeType::All,
        }
    }
}

/// Ranged scan that forces query-time aggregation, collapsing each group's
/// elements to their summaries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SummariseGroupOverRanges {
    #[serde(default)]
    pub ranges: Vec<VertexRange>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub view: Option<View>,
    #[serde(default = "default_true")]
    pub include_entities: bool,
    #[serde(default)]
    pub include_edges: IncludeEdgeType,
}

impl Default for SummariseGroupOverRanges {
    fn default() -> Self {
        SummariseGroupOverRanges::new([])
    }
}

impl SummariseGroupOverRanges {
    pub fn new<I: IntoIterator<Item = VertexRange>>(ranges: I) -> Self {
        SummariseGroupOverRanges {
            ranges: ranges.into_iter().collect(),
            view: None,
            include_entities: true,
            include_edges: IncludeEdgeType::All,
        }
    }
}

/// Write a batch of elements.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddElements {
    #[serde(default)]
    pub elements: Vec<Element>,
}

impl AddElements {
    pub fn new<I: IntoIterator<Item = Element>>(elements: I) -> Self {
        AddElements {
            elements: elements.into_iter().collect(),
        }
    }
}

/// Every operation kind the store dispatches on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "class")]
pub enum GraphOperation {
    GetElements(GetElements),
    GetAllElements(GetAllElements),
    GetAdjacentEntitySeeds(GetAdjacentEntitySeeds),
    GetElementsWithinSet(GetElementsWithinSet),
    GetElementsBetweenSets(GetElementsBetweenSets),
    GetElementsInRanges(GetElementsInRanges),
    SummariseGroupOverRanges(SummariseGroupOverRanges),
    AddElements(AddElements),
}

impl GraphOperation {
    pub fn kind(&self) -> &'static str {
        match self {
            GraphOperation::GetElements(_) => "GetElements",
            GraphOperation::GetAllElements(_) => "GetAllElements",
            GraphOperation::GetAdjacentEntitySeeds(_) => "GetAdjacentEntitySeeds",
            GraphOperation::GetElementsWithinSet(_) => "GetElementsWithinSet",
            GraphOperation::GetElementsBetweenSets(_) => "GetElementsBetweenSets",
            GraphOperation::GetElementsInRanges(_) => "GetElementsInRanges",
            GraphOperation::SummariseGroupOverRanges(_) => "SummariseGroupOverRanges",
            GraphOperation::AddElements(_) => "AddElements",
        }
    }

    /// The chain input this operation consumes, for runtime chain checking.
    pub fn input_kind(&self) -> chain::IoKind {
        match self {
            GraphOperation::GetElements(_)
            | GraphOperation::GetAdjacentEntitySeeds(_)
            | GraphOperation::GetElementsWithinSet(_)
            | GraphOperation::GetElementsBetweenSets(_) => chain::IoKind::Seeds,
            GraphOperation::AddElements(_) => chain::IoKind::Elements,
            GraphOperation::GetAllElements(_)
            | GraphOperation::GetElementsInRanges(_)
            | GraphOperation::SummariseGroupOverRanges(_) => chain::IoKind::None,
        }
    }

    /// The chain output this operation produces.
    pub fn output_kind(&self) -> chain::IoKind {
        match self {
            GraphOperation::GetAdjacentEntitySeeds(_) => chain::IoKind::Seeds,
            GraphOperation::AddElements(_) => chain::IoKind::Report,
            _ => chain::IoKind::Elements,
        }
    }
}
