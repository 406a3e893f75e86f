//! Query-time views: per-group filters, transformers and group-by overrides.
//!
//! A view never adds anything the schema does not declare; it only narrows.
//! Groups absent from the view are excluded from results entirely.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::OperationError;
use crate::filter::ElementFilter;
use crate::schema::{ElementDefinition, Schema};
use crate::transform::ElementTransformer;

/// Per-group overlay. Field names follow the operation JSON surface.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewElementDefinition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pre_aggregation_filter: Option<ElementFilter>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_aggregation_filter: Option<ElementFilter>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transformer: Option<ElementTransformer>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_transformation_filter: Option<ElementFilter>,
    /// Narrowed aggregation key; `None` keeps the schema's group-by.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_by: Option<Vec<String>>,
}

impl ViewElementDefinition {
    pub fn with_pre_aggregation_filter(mut self, filter: ElementFilter) -> Self {
        self.pre_aggregation_filter = Some(filter);
        self
    }

    pub fn with_post_aggregation_filter(mut self, filter: ElementFilter) -> Self {
        self.post_aggregation_filter = Some(filter);
        self
    }

    pub fn with_transformer(mut self, transformer: ElementTransformer) -> Self {
        self.transformer = Some(transformer);
        self
    }

    pub fn with_post_transformation_filter(mut self, filter: ElementFilter) -> Self {
        self.post_transformation_filter = Some(filter);
        self
    }

    pub fn with_group_by<I: IntoIterator<Item = S>, S: Into<String>>(mut self, names: I) -> Self {
        self.group_by = Some(names.into_iter().map(Into::into).collect());
        self
    }

    fn validate(&self, group: &str, def: &ElementDefinition) -> Result<(), OperationError> {
        let filters = [
            &self.pre_aggregation_filter,
            &self.post_aggregation_filter,
            &self.post_transformation_filter,
        ];
        for filter in filters.into_iter().flatten() {
            for selection in filter.selections() {
                if !def.has_property(selection) {
                    return Err(OperationError::UnknownProperty {
                        group: group.to_string(),
                        property: selection.to_string(),
                    });
                }
            }
        }
        if let Some(transformer) = &self.transformer {
            for selection in transformer.selections() {
                if !def.has_property(selection) {
                    return Err(OperationError::UnknownProperty {
                        group: group.to_string(),
                        property: selection.to_string(),
                    });
                }
            }
        }
        for name in self.group_by.iter().flatten() {
            if !def.has_property(name) {
                return Err(OperationError::UnknownProperty {
                    group: group.to_string(),
                    property: name.clone(),
                });
            }
        }
        Ok(())
    }
}

/// The query-time projection over entity and edge groups.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct View {
    #[serde(default)]
    pub entities: BTreeMap<String, ViewElementDefinition>,
    #[serde(default)]
    pub edges: BTreeMap<String, ViewElementDefinition>,
}

impl View {
    pub fn builder() -> ViewBuilder {
        ViewBuilder::default()
    }

    /// A view selecting every schema group with no filters, the default for
    /// operations that do not narrow their results.
    pub fn all_of(schema: &Schema) -> View {
        View {
            entities: schema
                .entities
                .keys()
                .map(|g| (g.clone(), ViewElementDefinition::default()))
                .collect(),
            edges: schema
                .edges
                .keys()
                .map(|g| (g.clone(), ViewElementDefinition::default()))
                .collect(),
        }
    }

    pub fn entity_definition(&self, group: &str) -> Option<&ViewElementDefinition> {
        self.entities.get(group)
    }

    pub fn edge_definition(&self, group: &str) -> Option<&ViewElementDefinition> {
        self.edges.get(group)
    }

    pub fn element_definition(&self, group: &str) -> Option<&ViewElementDefinition> {
        self.entities.get(group).or_else(|| self.edges.get(group))
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty() && self.edges.is_empty()
    }

    /// Whether any group carries any filter, transformer or group-by
    /// override; a plain group-selection view needs no scan iterators beyond
    /// the table-scoped ones.
    pub fn has_overlays(&self) -> bool {
        self.entities.values().chain(self.edges.values()).any(|d| {
            d.pre_aggregation_filter.is_some()
                || d.post_aggregation_filter.is_some()
                || d.transformer.is_some()
                || d.post_transformation_filter.is_some()
                || d.group_by.is_some()
        })
    }

    /// The narrowed group-by per group, for layers that need to decode or
    /// re-key under the view's aggregation key.
    pub fn group_by_overrides(&self) -> BTreeMap<String, Vec<String>> {
        self.entities
            .iter()
            .chain(self.edges.iter())
            .filter_map(|(group, def)| def.group_by.clone().map(|gb| (group.clone(), gb)))
            .collect()
    }

    /// Checks every referenced group and property against the schema.
    pub fn validate(&self, schema: &Schema) -> Result<(), OperationError> {
        if self.is_empty() {
            return Err(OperationError::EmptyView);
        }
        for (group, view_def) in &self.entities {
            let def = schema
                .entity_definition(group)
                .ok_or_else(|| OperationError::UnknownGroup {
                    group: group.clone(),
                })?;
            view_def.validate(group, &def.element)?;
        }
        for (group, view_def) in &self.edges {
            let def = schema
                .edge_definition(group)
                .ok_or_else(|| OperationError::UnknownGroup {
                    group: group.clone(),
                })?;
            view_def.validate(group, &def.element)?;
        }
        Ok(())
    }
}

/// Builder for [`View`].
#[derive(Debug, Default)]
pub struct ViewBuilder {
    view: View,
}

impl ViewBuilder {
    pub fn entity(mut self, group: impl Into<String>, def: ViewElementDefinition) -> Self {
        self.view.entities.insert(group.into(), def);
        self
    }

    pub fn edge(mut self, group: impl Into<String>, def: ViewElementDefinition) -> Self {
        self.view.edges.insert(group.into(), def);
        self
    }

    pub fn build(self) -> View {
        self.view
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregation::Aggregator;
    use crate::filter::{ElementFilter, Predicate};
    use crate::schema::{EdgeDefinition, PropertyDefinition};
    use crate::serialisation::TypeSerialiser;

    fn schema() -> Schema {
        Schema::builder()
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
            .unwrap()
    }

    #[test]
    fn all_of_selects_every_group() {
        let view = View::all_of(&schema());
        assert!(view.edge_definition("link").is_some());
        assert!(!view.has_overlays());
        view.validate(&schema()).unwrap();
    }

    #[test]
    fn unknown_group_is_rejected() {
        let view = View::builder()
            .edge("nope", ViewElementDefinition::default())
            .build();
        assert!(matches!(
            view.validate(&schema()),
            Err(OperationError::UnknownGroup { .. })
        ));
    }

    #[test]
    fn unknown_filter_property_is_rejected() {
        let view = View::builder()
            .edge(
                "link",
                ViewElementDefinition::default().with_post_aggregation_filter(
                    ElementFilter::new().select("missing", Predicate::Exists),
                ),
            )
            .build();
        assert!(matches!(
            view.validate(&schema()),
            Err(OperationError::UnknownProperty { .. })
        ));
    }

    #[test]
    fn view_json_field_names() {
        let json = r#"{
            "edges": {
                "link": {
                    "postAggregationFilter": [
                        {"selection": "count", "predicate": {"isMoreThan": 5}}
                    ],
                    "groupBy": []
                }
            }
        }"#;
        let view: View = serde_json::from_str(json).unwrap();
        let def = view.edge_definition("link").unwrap();
        assert!(def.post_aggregation_filter.is_some());
        assert_eq!(def.group_by.as_deref(), Some(&[][..]));
    }
}
