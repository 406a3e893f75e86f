//! Graph schema: group definitions, property layouts and the aggregation key.
//!
//! The schema is the contract between writers and every server-side
//! iterator: it fixes each group's property order (the value layout), the
//! group-by subset (the aggregation key), and the serialiser for every typed
//! position. Schemas are validated once at construction and shared immutably
//! afterwards (`Arc<Schema>` throughout the store).

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::aggregation::Aggregator;
use crate::error::SchemaError;
use crate::filter::Predicate;
use crate::serialisation::TypeSerialiser;
use crate::types::Properties;

/// One declared property: its codec, its merge behaviour, and an optional
/// validator evaluated by the store-validation iterator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyDefinition {
    pub name: String,
    pub serialiser: TypeSerialiser,
    pub aggregator: Aggregator,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validator: Option<Predicate>,
}

impl PropertyDefinition {
    pub fn new(name: impl Into<String>, serialiser: TypeSerialiser, aggregator: Aggregator) -> Self {
        PropertyDefinition {
            name: name.into(),
            serialiser,
            aggregator,
            validator: None,
        }
    }

    pub fn with_validator(mut self, validator: Predicate) -> Self {
        self.validator = Some(validator);
        self
    }
}

/// The part of a group definition shared by entities and edges.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementDefinition {
    #[serde(default)]
    pub properties: Vec<PropertyDefinition>,
    /// Property names whose values form the aggregation key, in key order.
    #[serde(default)]
    pub group_by: Vec<String>,
    /// Property stored as the key's visibility label instead of in the value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visibility_property: Option<String>,
    /// Integer property stored as the key's timestamp instead of in the value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp_property: Option<String>,
}

impl ElementDefinition {
    pub fn property(&self, name: &str) -> Option<&PropertyDefinition> {
        self.properties.iter().find(|p| p.name == name)
    }

    pub fn has_property(&self, name: &str) -> bool {
        self.property(name).is_some()
    }

    /// Group-by definitions in declared group-by order.
    pub fn group_by_definitions(&self) -> impl Iterator<Item = &PropertyDefinition> {
        self.group_by.iter().filter_map(|name| self.property(name))
    }

    /// Definitions serialised into the value: declared order, excluding
    /// group-by, visibility and timestamp properties (those live in the key).
    pub fn value_definitions(&self) -> impl Iterator<Item = &PropertyDefinition> {
        self.properties.iter().filter(|p| {
            !self.group_by.contains(&p.name)
                && self.visibility_property.as_deref() != Some(&p.name)
                && self.timestamp_property.as_deref() != Some(&p.name)
        })
    }

    /// True when every declared validator accepts its property's value.
    pub fn validate_properties(&self, properties: &Properties) -> bool {
        self.properties.iter().all(|def| {
            def.validator
                .as_ref()
                .is_none_or(|v| v.test(properties.get(&def.name)))
        })
    }

    fn validate(&self, group: &str) -> Result<(), SchemaError> {
        let mut seen = BTreeSet::new();
        for def in &self.properties {
            if !seen.insert(def.name.as_str()) {
                return Err(SchemaError::DuplicateProperty {
                    group: group.to_string(),
                    property: def.name.clone(),
                });
            }
        }
        for name in &self.group_by {
            if !self.has_property(name) {
                return Err(SchemaError::UnknownGroupByProperty {
                    group: group.to_string(),
                    property: name.clone(),
                });
            }
        }
        if let Some(name) = &self.visibility_property {
            if !self.has_property(name) {
                return Err(SchemaError::UnknownVisibilityProperty {
                    group: group.to_string(),
                    property: name.clone(),
                });
            }
            if self.group_by.contains(name) {
                return Err(SchemaError::KeyPropertyInGroupBy {
                    group: group.to_string(),
                    property: name.clone(),
                });
            }
        }
        if let Some(name) = &self.timestamp_property {
            let def = self.property(name).ok_or_else(|| SchemaError::UnknownTimestampProperty {
                group: group.to_string(),
                property: name.clone(),
            })?;
            if def.serialiser != TypeSerialiser::OrderedInt {
                return Err(SchemaError::NonIntegerTimestamp {
                    group: group.to_string(),
                    property: name.clone(),
                });
            }
            if self.group_by.contains(name) {
                return Err(SchemaError::KeyPropertyInGroupBy {
                    group: group.to_string(),
                    property: name.clone(),
                });
            }
        }
        Ok(())
    }
}

/// An entity group: vertex codec plus the shared element definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityDefinition {
    pub vertex: TypeSerialiser,
    pub element: ElementDefinition,
}

impl EntityDefinition {
    pub fn new(vertex: TypeSerialiser) -> Self {
        EntityDefinition {
            vertex,
            element: ElementDefinition::default(),
        }
    }

    pub fn with_property(mut self, def: PropertyDefinition) -> Self {
        self.element.properties.push(def);
        self
    }

    pub fn with_group_by<I: IntoIterator<Item = S>, S: Into<String>>(mut self, names: I) -> Self {
        self.element.group_by = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_visibility_property(mut self, name: impl Into<String>) -> Self {
        self.element.visibility_property = Some(name.into());
        self
    }

    pub fn with_timestamp_property(mut self, name: impl Into<String>) -> Self {
        self.element.timestamp_property = Some(name.into());
        self
    }
}

/// An edge group: endpoint codecs plus the shared element definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeDefinition {
    pub source: TypeSerialiser,
    pub destination: TypeSerialiser,
    pub element: ElementDefinition,
}

impl EdgeDefinition {
    pub fn new(source: TypeSerialiser, destination: TypeSerialiser) -> Self {
        EdgeDefinition {
            source,
            destination,
            element: ElementDefinition::default(),
        }
    }

    pub fn with_property(mut self, def: PropertyDefinition) -> Self {
        self.element.properties.push(def);
        self
    }

    pub fn with_group_by<I: IntoIterator<Item = S>, S: Into<String>>(mut self, names: I) -> Self {
        self.element.group_by = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_visibility_property(mut self, name: impl Into<String>) -> Self {
        self.element.visibility_property = Some(name.into());
        self
    }

    pub fn with_timestamp_property(mut self, name: impl Into<String>) -> Self {
        self.element.timestamp_property = Some(name.into());
        self
    }
}

/// The full schema: entity and edge groups by name.
///
/// Built through [`Schema::builder`], which validates on `build()`: group
/// names must be unique across kinds, group-by/visibility/timestamp entries
/// must name declared properties, and every vertex position must share one
/// serialiser (rows carry no group tag).
///
/// # Example
/// ```rust
/// use tablet_graph_core::aggregation::Aggregator;
/// use tablet_graph_core::schema::{EdgeDefinition, PropertyDefinition, Schema};
/// use tablet_graph_core::serialisation::TypeSerialiser;
///
/// let schema = Schema::builder()
///     .edge(
///         "link",
///         EdgeDefinition::new(TypeSerialiser::Utf8String, TypeSerialiser::Utf8String)
///             .with_property(PropertyDefinition::new(
///                 "count",
///                 TypeSerialiser::OrderedInt,
///                 Aggregator::Sum,
///             )),
///     )
///     .build()
///     .unwrap();
///
/// assert!(schema.has_group("link"));
/// assert_eq!(schema.vertex_serialiser(), Some(TypeSerialiser::Utf8String));
/// ```
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Schema {
    #[serde(default)]
    pub entities: BTreeMap<String, EntityDefinition>,
    #[serde(default)]
    pub edges: BTreeMap<String, EdgeDefinition>,
}

impl Schema {
    pub fn builder() -> SchemaBuilder {
        SchemaBuilder::default()
    }

    pub fn entity_definition(&self, group: &str) -> Option<&EntityDefinition> {
        self.entities.get(group)
    }

    pub fn edge_definition(&self, group: &str) -> Option<&EdgeDefinition> {
        self.edges.get(group)
    }

    pub fn has_group(&self, group: &str) -> bool {
        self.entities.contains_key(group) || self.edges.contains_key(group)
    }

    /// The shared element definition for a group of either kind.
    pub fn element_definition(&self, group: &str) -> Option<&ElementDefinition> {
        self.entities
            .get(group)
            .map(|d| &d.element)
            .or_else(|| self.edges.get(group).map(|d| &d.element))
    }

    /// The schema-wide vertex serialiser, shared by every vertex position.
    /// `None` for an empty schema.
    pub fn vertex_serialiser(&self) -> Option<TypeSerialiser> {
        self.entities
            .values()
            .map(|d| d.vertex)
            .chain(self.edges.values().map(|d| d.source))
            .next()
    }

    pub fn validate(&self) -> Result<(), SchemaError> {
        let vertex_positions: Vec<(&String, TypeSerialiser)> = self
            .entities
            .iter()
            .map(|(g, d)| (g, d.vertex))
            .chain(self.edges.iter().map(|(g, d)| (g, d.source)))
            .chain(self.edges.iter().map(|(g, d)| (g, d.destination)))
            .collect();
        if let Some((first, serialiser)) = vertex_positions.first() {
            for (group, other) in &vertex_positions[1..] {
                if other != serialiser {
                    return Err(SchemaError::MixedVertexSerialisers {
                        first: first.to_string(),
                        second: group.to_string(),
                    });
                }
            }
        }
        for (group, def) in &self.entities {
            if group.is_empty() {
                return Err(SchemaError::EmptyGroupName);
            }
            if self.edges.contains_key(group) {
                return Err(SchemaError::DuplicateGroup {
                    group: group.clone(),
                });
            }
            def.element.validate(group)?;
        }
        for (group, def) in &self.edges {
            if group.is_empty() {
                return Err(SchemaError::EmptyGroupName);
            }
            def.element.validate(group)?;
        }
        Ok(())
    }
}

/// Builder producing a validated [`Schema`].
#[derive(Debug, Default)]
pub struct SchemaBuilder {
    schema: Schema,
}

impl SchemaBuilder {
    pub fn entity(mut self, group: impl Into<String>, def: EntityDefinition) -> Self {
        self.schema.entities.insert(group.into(), def);
        self
    }

    pub fn edge(mut self, group: impl Into<String>, def: EdgeDefinition) -> Self {
        self.schema.edges.insert(group.into(), def);
        self
    }

    pub fn build(self) -> Result<Schema, SchemaError> {
        self.schema.validate()?;
        Ok(self.schema)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PropertyValue;

    fn edge_def() -> EdgeDefinition {
        EdgeDefinition::new(TypeSerialiser::Utf8String, TypeSerialiser::Utf8String)
            .with_property(PropertyDefinition::new(
                "count",
                TypeSerialiser::OrderedInt,
                Aggregator::Sum,
            ))
            .with_property(PropertyDefinition::new(
                "kind",
                TypeSerialiser::Utf8String,
                Aggregator::First,
            ))
            .with_group_by(["kind"])
    }

    #[test]
    fn build_and_look_up() {
        let schema = Schema::builder().edge("link", edge_def()).build().unwrap();
        assert!(schema.has_group("link"));
        let def = schema.element_definition("link").unwrap();
        assert_eq!(def.group_by_definitions().count(), 1);
        let value_names: Vec<_> = def.value_definitions().map(|p| p.name.as_str()).collect();
        assert_eq!(value_names, ["count"]);
    }

    #[test]
    fn group_by_must_be_declared() {
        let def = EdgeDefinition::new(TypeSerialiser::Utf8String, TypeSerialiser::Utf8String)
            .with_group_by(["missing"]);
        let err = Schema::builder().edge("link", def).build().unwrap_err();
        assert!(matches!(err, SchemaError::UnknownGroupByProperty { .. }));
    }

    #[test]
    fn timestamp_property_must_be_integer() {
        let def = EntityDefinition::new(TypeSerialiser::Utf8String)
            .with_property(PropertyDefinition::new(
                "ts",
                TypeSerialiser::Utf8String,
                Aggregator::First,
            ))
            .with_timestamp_property("ts");
        let err = Schema::builder().entity("page", def).build().unwrap_err();
        assert!(matches!(err, SchemaError::NonIntegerTimestamp { .. }));
    }

    #[test]
    fn group_name_unique_across_kinds() {
        let schema = Schema::builder()
            .entity("x", EntityDefinition::new(TypeSerialiser::Utf8String))
            .edge(
                "x",
                EdgeDefinition::new(TypeSerialiser::Utf8String, TypeSerialiser::Utf8String),
            )
            .build();
        assert!(matches!(schema, Err(SchemaError::DuplicateGroup { .. })));
    }

    #[test]
    fn validators_run_against_properties() {
        let def = EntityDefinition::new(TypeSerialiser::Utf8String).with_property(
            PropertyDefinition::new("count", TypeSerialiser::OrderedInt, Aggregator::Sum)
                .with_validator(Predicate::IsMoreThan(PropertyValue::Int(0))),
        );
        let mut ok = Properties::new();
        ok.insert("count".into(), PropertyValue::Int(1));
        let mut bad = Properties::new();
        bad.insert("count".into(), PropertyValue::Int(-1));
        assert!(def.element.validate_properties(&ok));
        assert!(!def.element.validate_properties(&bad));
    }
}
