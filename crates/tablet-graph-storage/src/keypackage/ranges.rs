//! Range construction: from seeds to the row ranges that cover them.
//!
//! Ranges are deliberately coarse where the layout interleaves entity and
//! edge rows; the edge-entity/direction filter refines what a coarse range
//! over-fetches. Ranges come out sorted by start row so callers may
//! coalesce adjacent ones without changing the covered set.

use tablet_graph_core::serialisation::TypeSerialiser;
use tablet_graph_core::types::{EdgeSeed, ElementSeed, EntitySeed, PropertyValue, VertexRange};

use crate::engine::KeyRange;
use crate::error::CodecError;

use super::escape::{escape, DELIMITER};
use super::{EdgeMarker, LayoutKind, ENTITY_MARKER};

/// The smallest row byte strictly above every edge row of a vertex: edge
/// rows continue the escaped vertex with the 0x00 delimiter, and escaped
/// bytes never start with 0x00, so `esc(v) ‖ 0x01` bounds them all.
const VERTEX_ROWS_END: u8 = 0x01;

/// Builds row ranges for one layout. The vertex serialiser is schema-wide.
#[derive(Debug, Clone, Copy)]
pub struct RangeFactory {
    layout: LayoutKind,
    vertex: Option<TypeSerialiser>,
}

impl RangeFactory {
    pub fn new(layout: LayoutKind, vertex: Option<TypeSerialiser>) -> Self {
        RangeFactory { layout, vertex }
    }

    fn escaped_vertex(&self, vertex: &PropertyValue) -> Result<Vec<u8>, CodecError> {
        let serialiser = self
            .vertex
            .ok_or_else(|| CodecError::malformed_key("schema declares no groups"))?;
        let raw = serialiser
            .serialise(vertex)
            .map_err(|source| CodecError::Vertex { source })?;
        Ok(escape(&raw))
    }

    /// Ranges covering everything touching a seed vertex, narrowed to the
    /// entity row when edges are excluded.
    pub fn entity_seed_range(
        &self,
        seed: &EntitySeed,
        include_entities: bool,
        include_edges: bool,
    ) -> Result<KeyRange, CodecError> {
        let esc = self.escaped_vertex(&seed.vertex)?;
        let range = match (self.layout, include_entities, include_edges) {
            (LayoutKind::ByteEntity, true, false) => {
                let mut row = esc;
                row.push(DELIMITER);
                row.push(ENTITY_MARKER);
                point_range(row)
            }
            (LayoutKind::Classic, true, false) => point_range(esc),
            (LayoutKind::ByteEntity, _, true) => {
                // Entity and edge rows both continue `esc(v) ‖ 0x00`; the
                // direction filter drops entities when they are excluded.
                let mut start = esc.clone();
                start.push(DELIMITER);
                let mut end = esc;
                end.push(VERTEX_ROWS_END);
                KeyRange::new(start, end)
            }
            (LayoutKind::Classic, include_entities, true) => {
                let mut start = esc.clone();
                if !include_entities {
                    // The bare-vertex entity row sorts below every edge row.
                    start.push(DELIMITER);
                }
                let mut end = esc;
                end.push(VERTEX_ROWS_END);
                KeyRange::new(start, end)
            }
            (_, false, false) => point_range(Vec::new()),
        };
        Ok(range)
    }

    /// Point range for a specific edge's source-first row. Callers re-verify
    /// the decoded edge against the seed, since endpoints are shared across
    /// groups.
    pub fn edge_seed_range(&self, seed: &EdgeSeed) -> Result<KeyRange, CodecError> {
        let source = self.escaped_vertex(&seed.source)?;
        let destination = self.escaped_vertex(&seed.destination)?;
        let marker = if seed.directed {
            EdgeMarker::DirectedSourceFirst
        } else {
            EdgeMarker::Undirected
        };
        let mut row = Vec::with_capacity(source.len() + destination.len() + 3);
        row.extend_from_slice(&source);
        row.push(DELIMITER);
        row.extend_from_slice(&destination);
        row.push(DELIMITER);
        row.push(marker.byte());
        Ok(point_range(row))
    }

    /// Ranges for a mixed seed list, sorted by start row.
    pub fn element_seed_ranges(
        &self,
        seeds: &[ElementSeed],
        include_entities: bool,
        include_edges: bool,
    ) -> Result<Vec<KeyRange>, CodecError> {
        let mut ranges = Vec::with_capacity(seeds.len());
        for seed in seeds {
            match seed {
                ElementSeed::Entity(seed) => {
                    ranges.push(self.entity_seed_range(seed, include_entities, include_edges)?)
                }
                ElementSeed::Edge(seed) => ranges.push(self.edge_seed_range(seed)?),
            }
        }
        ranges.sort_by(|a, b| a.start.cmp(&b.start));
        Ok(ranges)
    }

    /// `[row(start), just-above-every-row-of(end))` for a vertex range.
    pub fn vertex_range(&self, range: &VertexRange) -> Result<KeyRange, CodecError> {
        let start = self.escaped_vertex(&range.start)?;
        let mut end = self.escaped_vertex(&range.end)?;
        end.push(VERTEX_ROWS_END);
        Ok(KeyRange::new(start, end))
    }

    pub fn vertex_ranges(&self, ranges: &[VertexRange]) -> Result<Vec<KeyRange>, CodecError> {
        let mut out = ranges
            .iter()
            .map(|r| self.vertex_range(r))
            .collect::<Result<Vec<_>, _>>()?;
        out.sort_by(|a, b| a.start.cmp(&b.start));
        Ok(out)
    }
}

fn point_range(row: Vec<u8>) -> KeyRange {
    let mut end = row.clone();
    end.push(DELIMITER);
    KeyRange::new(row, end)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use tablet_graph_core::aggregation::Aggregator;
    use tablet_graph_core::schema::{EdgeDefinition, EntityDefinition, PropertyDefinition, Schema};
    use tablet_graph_core::types::{Edge, Element, Entity};

    use crate::keypackage::converter::ElementConverter;

    fn schema() -> Arc<Schema> {
        Arc::new(
            Schema::builder()
                .entity("page", EntityDefinition::new(TypeSerialiser::Utf8String))
                .edge(
                    "link",
                    EdgeDefinition::new(TypeSerialiser::Utf8String, TypeSerialiser::Utf8String)
                        .with_property(PropertyDefinition::new(
                            "count",
                            TypeSerialiser::OrderedInt,
                            Aggregator::Sum,
                        )),
                )
                .build()
                .unwrap(),
        )
    }

    fn factory(layout: LayoutKind) -> RangeFactory {
        RangeFactory::new(layout, Some(TypeSerialiser::Utf8String))
    }

    fn rows_for(layout: LayoutKind) -> Vec<Vec<u8>> {
        let conv = ElementConverter::new(layout, schema());
        let mut rows = Vec::new();
        let entity: Element = Entity::new("page", "b").into();
        let (key, _) = conv.keys_from_element(&entity).unwrap();
        rows.push(key.row);
        for (src, dst, directed) in [("b", "c", true), ("a", "b", true), ("b", "d", false)] {
            let edge: Element = Edge::new("link", src, dst, directed).into();
            let (first, second) = conv.keys_from_element(&edge).unwrap();
            rows.push(first.row);
            rows.push(second.unwrap().row);
        }
        rows
    }

    #[test]
    fn combined_range_covers_every_row_touching_the_seed() {
        for layout in [LayoutKind::ByteEntity, LayoutKind::Classic] {
            let range = factory(layout)
                .entity_seed_range(&EntitySeed::new("b"), true, true)
                .unwrap();
            let covered: Vec<bool> = rows_for(layout).iter().map(|r| range.contains(r)).collect();
            // entity(b), b->c, (c->b form), a->b's second form (b-first),
            // b-d and d-b forms: all rows whose first part is b are covered.
            assert!(covered[0], "entity row covered ({layout:?})");
            assert!(covered[1], "b->c source-first covered");
            assert!(!covered[2], "c-first row not covered");
            assert!(!covered[3], "a-first row not covered");
            assert!(covered[4], "a->b destination-first covered");
            assert!(covered[5], "b~d covered");
            assert!(!covered[6], "d~b form not covered");
        }
    }

    #[test]
    fn entities_only_range_is_a_point_on_the_entity_row() {
        for layout in [LayoutKind::ByteEntity, LayoutKind::Classic] {
            let range = factory(layout)
                .entity_seed_range(&EntitySeed::new("b"), true, false)
                .unwrap();
            let rows = rows_for(layout);
            assert!(range.contains(&rows[0]), "entity row covered ({layout:?})");
            for row in &rows[1..] {
                assert!(!range.contains(row), "edge row excluded ({layout:?})");
            }
        }
    }

    #[test]
    fn classic_edges_only_range_excludes_the_entity_row() {
        let range = factory(LayoutKind::Classic)
            .entity_seed_range(&EntitySeed::new("b"), false, true)
            .unwrap();
        let rows = rows_for(LayoutKind::Classic);
        assert!(!range.contains(&rows[0]));
        assert!(range.contains(&rows[1]));
    }

    #[test]
    fn edge_seed_range_is_a_point_on_the_source_first_row() {
        let conv = ElementConverter::new(LayoutKind::ByteEntity, schema());
        let edge: Element = Edge::new("link", "a", "b", true).into();
        let (first, second) = conv.keys_from_element(&edge).unwrap();

        let range = factory(LayoutKind::ByteEntity)
            .edge_seed_range(&EdgeSeed::new("a", "b", true))
            .unwrap();
        assert!(range.contains(&first.row));
        assert!(!range.contains(&second.unwrap().row));
    }

    #[test]
    fn vertex_range_covers_inclusive_end_vertex() {
        let conv = ElementConverter::new(LayoutKind::ByteEntity, schema());
        let factory = factory(LayoutKind::ByteEntity);
        let range = factory
            .vertex_range(&VertexRange::new("b", "c"))
            .unwrap();

        let edge: Element = Edge::new("link", "c", "z", true).into();
        let (c_first, _) = conv.keys_from_element(&edge).unwrap();
        assert!(range.contains(&c_first.row), "rows of the end vertex are covered");

        let edge: Element = Edge::new("link", "ca", "z", true).into();
        let (ca_first, _) = conv.keys_from_element(&edge).unwrap();
        assert!(!range.contains(&ca_first.row), "vertices above the end are excluded");
    }

    #[test]
    fn seed_ranges_come_out_sorted() {
        let seeds = [
            ElementSeed::entity("z"),
            ElementSeed::entity("a"),
            ElementSeed::entity("m"),
        ];
        let ranges = factory(LayoutKind::ByteEntity)
            .element_seed_ranges(&seeds, true, true)
            .unwrap();
        for pair in ranges.windows(2) {
            assert!(pair[0].start <= pair[1].start);
        }
    }
}
