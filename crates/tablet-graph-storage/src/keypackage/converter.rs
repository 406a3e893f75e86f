//! The element⇄key codec.
//!
//! Serialises typed graph elements into tablet keys and value bytes and
//! back. The row layout varies with [`LayoutKind`]; the column qualifier
//! (group-by values), value (remaining properties), visibility and timestamp
//! handling are shared by both layouts.
//!
//! Property runs (the qualifier and the value) are laid out as one entry
//! per schema-declared property in order: a presence byte, then a two-byte
//! big-endian length and the serialised bytes when present. Equal group-by
//! tuples therefore collide byte-wise on the qualifier, which is what makes
//! the tuple `(row, family, qualifier, visibility)` the aggregation key.

use std::sync::Arc;

use chrono::Utc;

use tablet_graph_core::schema::{ElementDefinition, PropertyDefinition, Schema};
use tablet_graph_core::types::{
    Edge, Element, Entity, MatchedVertex, Properties, PropertyValue,
};

use crate::engine::TabletKey;
use crate::error::CodecError;

use super::escape::{escape, unescape, DELIMITER};
use super::{EdgeMarker, LayoutKind, RowKind, ENTITY_MARKER};

const PRESENT: u8 = 0x01;
const ABSENT: u8 = 0x00;

/// Milliseconds are coarsened to this bucket when no timestamp property is
/// declared, so repeated writes of one element tend to share a timestamp.
const TIMESTAMP_BUCKET_MS: u64 = 1_000;

pub(crate) fn coarsened_now() -> u64 {
    let now = Utc::now().timestamp_millis().max(0) as u64;
    now / TIMESTAMP_BUCKET_MS * TIMESTAMP_BUCKET_MS
}

/// Bijection between elements and their stored form, bound to one schema
/// and one layout.
pub struct ElementConverter {
    layout: LayoutKind,
    schema: Arc<Schema>,
}

impl ElementConverter {
    pub fn new(layout: LayoutKind, schema: Arc<Schema>) -> Self {
        ElementConverter { layout, schema }
    }

    pub fn layout(&self) -> LayoutKind {
        self.layout
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    // ------------------------------------------------------------------
    // Element -> keys/value
    // ------------------------------------------------------------------

    /// Builds the stored key(s) for an element: one for an entity, two for
    /// an edge (source-first and destination-first). An undirected self-loop
    /// collapses to a single key.
    pub fn keys_from_element(
        &self,
        element: &Element,
    ) -> Result<(TabletKey, Option<TabletKey>), CodecError> {
        match element {
            Element::Entity(entity) => self.entity_key(entity).map(|k| (k, None)),
            Element::Edge(edge) => self.edge_keys(edge),
        }
    }

    /// Serialises the non-group-by properties. `group_by` narrows the
    /// aggregation key at query time; `None` uses the schema's group-by.
    pub fn value_from_element(
        &self,
        element: &Element,
        group_by: Option<&[String]>,
    ) -> Result<Vec<u8>, CodecError> {
        let def = self.definition(element.group())?;
        let defs = self.value_definitions(def, group_by);
        encode_run(&defs, element.properties())
    }

    fn entity_key(&self, entity: &Entity) -> Result<TabletKey, CodecError> {
        let def = self
            .schema
            .entity_definition(&entity.group)
            .ok_or_else(|| CodecError::UnknownGroup {
                group: entity.group.clone(),
            })?;
        self.check_declared(&entity.group, &def.element, &entity.properties)?;

        let vertex = def
            .vertex
            .serialise(&entity.vertex)
            .map_err(|source| CodecError::Vertex { source })?;
        let mut row = escape(&vertex);
        if self.layout == LayoutKind::ByteEntity {
            row.push(DELIMITER);
            row.push(ENTITY_MARKER);
        }

        Ok(TabletKey {
            row,
            column_family: entity.group.clone().into_bytes(),
            column_qualifier: self.encode_qualifier_for(&def.element, &entity.properties)?,
            column_visibility: self.visibility_for(&def.element, &entity.properties)?,
            timestamp: self.timestamp_for(&def.element, &entity.properties)?,
        })
    }

    fn edge_keys(&self, edge: &Edge) -> Result<(TabletKey, Option<TabletKey>), CodecError> {
        let def = self
            .schema
            .edge_definition(&edge.group)
            .ok_or_else(|| CodecError::UnknownGroup {
                group: edge.group.clone(),
            })?;
        self.check_declared(&edge.group, &def.element, &edge.properties)?;

        let source = escape(
            &def.source
                .serialise(&edge.source)
                .map_err(|source| CodecError::Vertex { source })?,
        );
        let destination = escape(
            &def.destination
                .serialise(&edge.destination)
                .map_err(|source| CodecError::Vertex { source })?,
        );

        let (first_marker, second_marker) = if edge.directed {
            (
                EdgeMarker::DirectedSourceFirst,
                EdgeMarker::DirectedDestinationFirst,
            )
        } else {
            (EdgeMarker::Undirected, EdgeMarker::Undirected)
        };

        let row_one = edge_row(&source, &destination, first_marker);
        let row_two = edge_row(&destination, &source, second_marker);

        let qualifier = self.encode_qualifier_for(&def.element, &edge.properties)?;
        let visibility = self.visibility_for(&def.element, &edge.properties)?;
        let timestamp = self.timestamp_for(&def.element, &edge.properties)?;

        let first = TabletKey {
            row: row_one,
            column_family: edge.group.clone().into_bytes(),
            column_qualifier: qualifier.clone(),
            column_visibility: visibility.clone(),
            timestamp,
        };
        if first.row == row_two {
            // Undirected self-loop: both forms are the same key.
            return Ok((first, None));
        }
        let second = TabletKey {
            row: row_two,
            column_family: edge.group.clone().into_bytes(),
            column_qualifier: qualifier,
            column_visibility: visibility,
            timestamp,
        };
        Ok((first, Some(second)))
    }

    // ------------------------------------------------------------------
    // Key/value -> element
    // ------------------------------------------------------------------

    /// Decodes a stored entry back into an element. The returned edge has
    /// its endpoints in logical order regardless of which row form was
    /// read; `include_matched_vertex` additionally records which end the
    /// row's first part (the scanned seed) corresponds to.
    pub fn element_from_key_value(
        &self,
        key: &TabletKey,
        value: &[u8],
        group_by: Option<&[String]>,
        include_matched_vertex: bool,
    ) -> Result<Element, CodecError> {
        let group = group_name(&key.column_family)?;
        match self.classify_row(&key.row)? {
            RowKind::Entity { vertex } => {
                let def = self
                    .schema
                    .entity_definition(group)
                    .ok_or_else(|| CodecError::UnknownGroup {
                        group: group.to_string(),
                    })?;
                let vertex = def
                    .vertex
                    .deserialise(&unescape(vertex)?)
                    .map_err(|source| CodecError::Vertex { source })?;
                let properties = self.decode_properties(&def.element, key, value, group_by)?;
                Ok(Element::Entity(Entity {
                    group: group.to_string(),
                    vertex,
                    properties,
                }))
            }
            RowKind::Edge {
                first,
                second,
                marker,
            } => {
                let def = self
                    .schema
                    .edge_definition(group)
                    .ok_or_else(|| CodecError::UnknownGroup {
                        group: group.to_string(),
                    })?;
                let first = unescape(first)?;
                let second = unescape(second)?;
                // The serialisers for the two ends: the row-first part was
                // written with whichever end came first.
                let (source_bytes, destination_bytes, matched) = match marker {
                    EdgeMarker::DirectedSourceFirst | EdgeMarker::Undirected => {
                        (first, second, MatchedVertex::Source)
                    }
                    EdgeMarker::DirectedDestinationFirst => {
                        (second, first, MatchedVertex::Destination)
                    }
                };
                let source = def
                    .source
                    .deserialise(&source_bytes)
                    .map_err(|source| CodecError::Vertex { source })?;
                let destination = def
                    .destination
                    .deserialise(&destination_bytes)
                    .map_err(|source| CodecError::Vertex { source })?;
                let properties = self.decode_properties(&def.element, key, value, group_by)?;
                Ok(Element::Edge(Edge {
                    group: group.to_string(),
                    source,
                    destination,
                    directed: marker.directed(),
                    properties,
                    matched_vertex: include_matched_vertex.then_some(matched),
                }))
            }
        }
    }

    /// Group name plus the full decoded property map (qualifier, value,
    /// visibility and timestamp properties) without touching the row.
    /// Filters, validators and transformers only need this.
    pub fn properties_from_key_value(
        &self,
        key: &TabletKey,
        value: &[u8],
        group_by: Option<&[String]>,
    ) -> Result<(String, Properties), CodecError> {
        let group = group_name(&key.column_family)?;
        let def = self.definition(group)?;
        let properties = self.decode_properties(def, key, value, group_by)?;
        Ok((group.to_string(), properties))
    }

    fn decode_properties(
        &self,
        def: &ElementDefinition,
        key: &TabletKey,
        value: &[u8],
        group_by: Option<&[String]>,
    ) -> Result<Properties, CodecError> {
        let group_by_defs = self.group_by_definitions(def, group_by)?;
        let mut properties = decode_run(&group_by_defs, &key.column_qualifier)?;
        let value_defs = self.value_definitions(def, group_by);
        properties.append(&mut decode_run(&value_defs, value)?);

        if let Some(name) = &def.visibility_property {
            if !key.column_visibility.is_empty() {
                let prop = def.property(name).ok_or_else(|| CodecError::UndeclaredProperty {
                    group: group_name(&key.column_family)?.to_string(),
                    property: name.clone(),
                })?;
                let decoded = prop
                    .serialiser
                    .deserialise(&key.column_visibility)
                    .map_err(|e| CodecError::property(name.clone(), e))?;
                properties.insert(name.clone(), decoded);
            }
        }
        if let Some(name) = &def.timestamp_property {
            properties.insert(name.clone(), PropertyValue::Int(key.timestamp as i64));
        }
        Ok(properties)
    }

    // ------------------------------------------------------------------
    // Piecewise codecs used by server-side iterators
    // ------------------------------------------------------------------

    /// Decodes a column qualifier into the group-by properties it holds.
    pub fn qualifier_properties(
        &self,
        group: &str,
        qualifier: &[u8],
        group_by: Option<&[String]>,
    ) -> Result<Properties, CodecError> {
        let def = self.definition(group)?;
        let defs = self.group_by_definitions(def, group_by)?;
        decode_run(&defs, qualifier)
    }

    /// Encodes the group-by subset of `properties` as a column qualifier.
    pub fn encode_qualifier(
        &self,
        group: &str,
        properties: &Properties,
        group_by: Option<&[String]>,
    ) -> Result<Vec<u8>, CodecError> {
        let def = self.definition(group)?;
        let defs = self.group_by_definitions(def, group_by)?;
        encode_run(&defs, properties)
    }

    /// Decodes value bytes into the non-group-by properties they hold.
    pub fn value_properties(
        &self,
        group: &str,
        value: &[u8],
        group_by: Option<&[String]>,
    ) -> Result<Properties, CodecError> {
        let def = self.definition(group)?;
        let defs = self.value_definitions(def, group_by);
        decode_run(&defs, value)
    }

    /// Encodes the non-group-by subset of `properties` as value bytes.
    pub fn encode_value(
        &self,
        group: &str,
        properties: &Properties,
        group_by: Option<&[String]>,
    ) -> Result<Vec<u8>, CodecError> {
        let def = self.definition(group)?;
        let defs = self.value_definitions(def, group_by);
        encode_run(&defs, properties)
    }

    /// Folds `incoming`'s non-group-by properties into `accumulated` using
    /// each property's declared aggregator.
    pub fn fold_properties(
        &self,
        group: &str,
        accumulated: &mut Properties,
        incoming: &Properties,
        group_by: Option<&[String]>,
    ) -> Result<(), CodecError> {
        let def = self.definition(group)?;
        for prop in self.value_definitions(def, group_by) {
            let folded = match (accumulated.get(&prop.name), incoming.get(&prop.name)) {
                (Some(a), Some(b)) => Some(prop.aggregator.fold(a, b)?),
                (None, Some(b)) => Some(b.clone()),
                _ => None,
            };
            if let Some(folded) = folded {
                accumulated.insert(prop.name.clone(), folded);
            }
        }
        Ok(())
    }

    /// Parses a row's structure under this converter's layout.
    pub fn classify_row<'a>(&self, row: &'a [u8]) -> Result<RowKind<'a>, CodecError> {
        classify_row(self.layout, row)
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn definition(&self, group: &str) -> Result<&ElementDefinition, CodecError> {
        self.schema
            .element_definition(group)
            .ok_or_else(|| CodecError::UnknownGroup {
                group: group.to_string(),
            })
    }

    fn check_declared(
        &self,
        group: &str,
        def: &ElementDefinition,
        properties: &Properties,
    ) -> Result<(), CodecError> {
        for name in properties.keys() {
            if !def.has_property(name) {
                return Err(CodecError::UndeclaredProperty {
                    group: group.to_string(),
                    property: name.clone(),
                });
            }
        }
        Ok(())
    }

    fn group_by_definitions<'a>(
        &self,
        def: &'a ElementDefinition,
        group_by: Option<&[String]>,
    ) -> Result<Vec<&'a PropertyDefinition>, CodecError> {
        let names = group_by.unwrap_or(&def.group_by);
        names
            .iter()
            .map(|name| {
                def.property(name).ok_or_else(|| {
                    CodecError::malformed_key(format!(
                        "group-by names undeclared property '{name}'"
                    ))
                })
            })
            .collect()
    }

    fn value_definitions<'a>(
        &self,
        def: &'a ElementDefinition,
        group_by: Option<&[String]>,
    ) -> Vec<&'a PropertyDefinition> {
        let names = group_by.unwrap_or(&def.group_by);
        def.properties
            .iter()
            .filter(|p| {
                !names.contains(&p.name)
                    && def.visibility_property.as_deref() != Some(&p.name)
                    && def.timestamp_property.as_deref() != Some(&p.name)
            })
            .collect()
    }

    fn encode_qualifier_for(
        &self,
        def: &ElementDefinition,
        properties: &Properties,
    ) -> Result<Vec<u8>, CodecError> {
        let defs = self.group_by_definitions(def, None)?;
        encode_run(&defs, properties)
    }

    fn visibility_for(
        &self,
        def: &ElementDefinition,
        properties: &Properties,
    ) -> Result<Vec<u8>, CodecError> {
        let Some(name) = &def.visibility_property else {
            return Ok(Vec::new());
        };
        match (def.property(name), properties.get(name)) {
            (Some(prop), Some(value)) => prop
                .serialiser
                .serialise(value)
                .map_err(|e| CodecError::property(name.clone(), e)),
            _ => Ok(Vec::new()),
        }
    }

    fn timestamp_for(
        &self,
        def: &ElementDefinition,
        properties: &Properties,
    ) -> Result<u64, CodecError> {
        let Some(name) = &def.timestamp_property else {
            return Ok(coarsened_now());
        };
        match properties.get(name) {
            Some(PropertyValue::Int(v)) if *v >= 0 => Ok(*v as u64),
            Some(PropertyValue::Int(v)) => Err(CodecError::property(
                name.clone(),
                tablet_graph_core::error::SerialisationError::Malformed {
                    serialiser: "timestamp",
                    detail: format!("negative timestamp {v}"),
                },
            )),
            Some(other) => Err(CodecError::property(
                name.clone(),
                tablet_graph_core::error::SerialisationError::WrongType {
                    serialiser: "timestamp",
                    actual: other.type_name(),
                },
            )),
            None => Ok(coarsened_now()),
        }
    }
}

fn edge_row(first: &[u8], second: &[u8], marker: EdgeMarker) -> Vec<u8> {
    let mut row = Vec::with_capacity(first.len() + second.len() + 3);
    row.extend_from_slice(first);
    row.push(DELIMITER);
    row.extend_from_slice(second);
    row.push(DELIMITER);
    row.push(marker.byte());
    row
}

/// Layout-aware row parser, also usable without a schema in hand.
pub fn classify_row(layout: LayoutKind, row: &[u8]) -> Result<RowKind<'_>, CodecError> {
    let parts: Vec<&[u8]> = row.split(|&b| b == DELIMITER).collect();
    match (layout, parts.as_slice()) {
        (LayoutKind::ByteEntity, &[vertex, marker])
            if marker.len() == 1 && marker[0] == ENTITY_MARKER =>
        {
            Ok(RowKind::Entity { vertex })
        }
        (LayoutKind::Classic, &[vertex]) => Ok(RowKind::Entity { vertex }),
        (_, &[first, second, marker]) if marker.len() == 1 => Ok(RowKind::Edge {
            first,
            second,
            marker: EdgeMarker::from_byte(marker[0])?,
        }),
        _ => Err(CodecError::malformed_key(format!(
            "row does not parse under the {} layout",
            layout.id()
        ))),
    }
}

fn group_name(column_family: &[u8]) -> Result<&str, CodecError> {
    std::str::from_utf8(column_family)
        .map_err(|_| CodecError::malformed_key("column family is not UTF-8"))
}

fn encode_run(
    defs: &[&PropertyDefinition],
    properties: &Properties,
) -> Result<Vec<u8>, CodecError> {
    let mut out = Vec::new();
    for def in defs {
        match properties.get(&def.name) {
            Some(value) => {
                let bytes = def
                    .serialiser
                    .serialise(value)
                    .map_err(|e| CodecError::property(def.name.clone(), e))?;
                let len = u16::try_from(bytes.len()).map_err(|_| {
                    CodecError::malformed_value(format!(
                        "property '{}' serialises to {} bytes (limit 65535)",
                        def.name,
                        bytes.len()
                    ))
                })?;
                out.push(PRESENT);
                out.extend_from_slice(&len.to_be_bytes());
                out.extend_from_slice(&bytes);
            }
            None => out.push(ABSENT),
        }
    }
    Ok(out)
}

fn decode_run(defs: &[&PropertyDefinition], bytes: &[u8]) -> Result<Properties, CodecError> {
    let mut properties = Properties::new();
    let mut pos = 0;
    for def in defs {
        match bytes.get(pos) {
            Some(&ABSENT) => pos += 1,
            Some(&PRESENT) => {
                let len_bytes = bytes
                    .get(pos + 1..pos + 3)
                    .ok_or_else(|| CodecError::malformed_value("truncated length prefix"))?;
                let len = u16::from_be_bytes([len_bytes[0], len_bytes[1]]) as usize;
                let payload = bytes
                    .get(pos + 3..pos + 3 + len)
                    .ok_or_else(|| CodecError::malformed_value("truncated property payload"))?;
                let value = def
                    .serialiser
                    .deserialise(payload)
                    .map_err(|e| CodecError::property(def.name.clone(), e))?;
                properties.insert(def.name.clone(), value);
                pos += 3 + len;
            }
            Some(other) => {
                return Err(CodecError::malformed_value(format!(
                    "invalid presence byte {other:#04x}"
                )))
            }
            None => {
                return Err(CodecError::malformed_value(format!(
                    "value ends before property '{}'",
                    def.name
                )))
            }
        }
    }
    if pos != bytes.len() {
        return Err(CodecError::malformed_value(format!(
            "{} trailing bytes after the last property",
            bytes.len() - pos
        )));
    }
    Ok(properties)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tablet_graph_core::aggregation::Aggregator;
    use tablet_graph_core::schema::{EdgeDefinition, EntityDefinition, PropertyDefinition};
    use tablet_graph_core::serialisation::TypeSerialiser;

    fn schema() -> Arc<Schema> {
        Arc::new(
            Schema::builder()
                .entity(
                    "page",
                    EntityDefinition::new(TypeSerialiser::Utf8String)
                        .with_property(PropertyDefinition::new(
                            "views",
                            TypeSerialiser::OrderedInt,
                            Aggregator::Sum,
                        ))
                        .with_property(PropertyDefinition::new(
                            "vis",
                            TypeSerialiser::Utf8String,
                            Aggregator::First,
                        ))
                        .with_visibility_property("vis"),
                )
                .edge(
                    "link",
                    EdgeDefinition::new(TypeSerialiser::Utf8String, TypeSerialiser::Utf8String)
                        .with_property(PropertyDefinition::new(
                            "kind",
                            TypeSerialiser::Utf8String,
                            Aggregator::First,
                        ))
                        .with_property(PropertyDefinition::new(
                            "count",
                            TypeSerialiser::OrderedInt,
                            Aggregator::Sum,
                        ))
                        .with_group_by(["kind"]),
                )
                .build()
                .unwrap(),
        )
    }

    fn converter(layout: LayoutKind) -> ElementConverter {
        ElementConverter::new(layout, schema())
    }

    #[test]
    fn entity_round_trip_byte_entity() {
        let conv = converter(LayoutKind::ByteEntity);
        let entity: Element = Entity::new("page", "home")
            .with_property("views", 7i64)
            .with_property("vis", "public")
            .into();
        let (key, second) = conv.keys_from_element(&entity).unwrap();
        assert!(second.is_none());
        assert_eq!(key.column_visibility, b"public");
        assert_eq!(key.row.last(), Some(&ENTITY_MARKER));

        let value = conv.value_from_element(&entity, None).unwrap();
        let decoded = conv
            .element_from_key_value(&key, &value, None, false)
            .unwrap();
        assert_eq!(decoded, entity);
    }

    #[test]
    fn entity_round_trip_classic() {
        let conv = converter(LayoutKind::Classic);
        let entity: Element = Entity::new("page", "home").with_property("views", 1i64).into();
        let (key, _) = conv.keys_from_element(&entity).unwrap();
        assert_eq!(key.row, escape(b"home"));

        let value = conv.value_from_element(&entity, None).unwrap();
        let decoded = conv
            .element_from_key_value(&key, &value, None, false)
            .unwrap();
        assert_eq!(decoded, entity);
    }

    #[test]
    fn directed_edge_produces_both_row_forms() {
        let conv = converter(LayoutKind::ByteEntity);
        let edge: Element = Edge::new("link", "a", "b", true)
            .with_property("kind", "refers")
            .with_property("count", 3i64)
            .into();
        let (first, second) = conv.keys_from_element(&edge).unwrap();
        let second = second.expect("edges have two keys");

        assert_eq!(first.row.last(), Some(&EdgeMarker::DirectedSourceFirst.byte()));
        assert_eq!(
            second.row.last(),
            Some(&EdgeMarker::DirectedDestinationFirst.byte())
        );
        assert_eq!(first.column_qualifier, second.column_qualifier);
        assert_eq!(first.column_visibility, second.column_visibility);
        assert_eq!(first.timestamp, second.timestamp);

        let value = conv.value_from_element(&edge, None).unwrap();
        let from_first = conv
            .element_from_key_value(&first, &value, None, true)
            .unwrap();
        let from_second = conv
            .element_from_key_value(&second, &value, None, true)
            .unwrap();
        // Both forms decode to the same logical edge.
        assert_eq!(from_first, edge);
        assert_eq!(from_second, edge);
        assert_eq!(
            from_first.as_edge().unwrap().matched_vertex,
            Some(MatchedVertex::Source)
        );
        assert_eq!(
            from_second.as_edge().unwrap().matched_vertex,
            Some(MatchedVertex::Destination)
        );
    }

    #[test]
    fn undirected_self_loop_is_one_key() {
        let conv = converter(LayoutKind::ByteEntity);
        let edge: Element = Edge::new("link", "a", "a", false).into();
        let (_, second) = conv.keys_from_element(&edge).unwrap();
        assert!(second.is_none());
    }

    #[test]
    fn vertices_with_delimiter_bytes_round_trip() {
        let conv = converter(LayoutKind::ByteEntity);
        // Int serialisation contains 0x00 bytes for small values.
        let schema = Arc::new(
            Schema::builder()
                .edge(
                    "n",
                    EdgeDefinition::new(TypeSerialiser::OrderedInt, TypeSerialiser::OrderedInt),
                )
                .build()
                .unwrap(),
        );
        let conv = ElementConverter::new(conv.layout(), schema);
        let edge: Element = Edge::new("n", 1i64, 2i64, true).into();
        let (first, _) = conv.keys_from_element(&edge).unwrap();
        let decoded = conv
            .element_from_key_value(&first, &conv.value_from_element(&edge, None).unwrap(), None, false)
            .unwrap();
        assert_eq!(decoded, edge);
    }

    #[test]
    fn undeclared_property_is_a_codec_error() {
        let conv = converter(LayoutKind::ByteEntity);
        let entity: Element = Entity::new("page", "home")
            .with_property("bogus", 1i64)
            .into();
        assert!(matches!(
            conv.keys_from_element(&entity),
            Err(CodecError::UndeclaredProperty { .. })
        ));
    }

    #[test]
    fn wrong_vertex_type_is_a_codec_error() {
        let conv = converter(LayoutKind::ByteEntity);
        let entity: Element = Entity::new("page", 17i64).into();
        assert!(matches!(
            conv.keys_from_element(&entity),
            Err(CodecError::Vertex { .. })
        ));
    }

    #[test]
    fn narrowed_group_by_moves_properties_into_the_value() {
        let conv = converter(LayoutKind::ByteEntity);
        let edge: Element = Edge::new("link", "a", "b", true)
            .with_property("kind", "refers")
            .with_property("count", 3i64)
            .into();
        let narrowed: Vec<String> = vec![];
        let value = conv.value_from_element(&edge, Some(&narrowed)).unwrap();
        let properties = conv.value_properties("link", &value, Some(&narrowed)).unwrap();
        assert_eq!(properties.get("kind"), Some(&PropertyValue::Str("refers".into())));
        assert_eq!(properties.get("count"), Some(&PropertyValue::Int(3)));
    }

    #[test]
    fn malformed_value_is_rejected() {
        let conv = converter(LayoutKind::ByteEntity);
        let err = conv.value_properties("link", &[0x07], None).unwrap_err();
        assert!(matches!(err, CodecError::MalformedValue { .. }));
    }
}
