//! Builds server-side iterator settings from schema and view.
//!
//! The factory is where the stack's semantics are enforced before anything
//! reaches the engine: pre-aggregation filters may only select group-by
//! properties (rows on disk may already be merged), and transformers may not
//! project onto properties that live in the key.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use serde::Serialize;

use tablet_graph_core::filter::ElementFilter;
use tablet_graph_core::operation::{IncludeEdgeType, IncludeIncomingOutgoingType};
use tablet_graph_core::schema::Schema;
use tablet_graph_core::transform::ElementTransformer;
use tablet_graph_core::view::{View, ViewElementDefinition};

use crate::engine::iterators::{
    encode_config, names, priorities, AggregatorConfig, DirectionFilterConfig,
    FilterIteratorConfig, QueryAggregatorConfig, TransformerConfig, ValidatorConfig,
    CONFIG_OPTION,
};
use crate::engine::{IteratorSetting, TableConfig};
use crate::error::{IteratorConfigError, StoreResult};

use super::LayoutKind;

/// Which filter layer a setting is being built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FilterLayer {
    PreAggregation,
    PostAggregation,
    PostTransformation,
}

impl FilterLayer {
    fn name(&self) -> &'static str {
        match self {
            FilterLayer::PreAggregation => names::PRE_AGGREGATION_FILTER,
            FilterLayer::PostAggregation => names::POST_AGGREGATION_FILTER,
            FilterLayer::PostTransformation => names::POST_TRANSFORMATION_FILTER,
        }
    }

    fn priority(&self) -> u32 {
        match self {
            FilterLayer::PreAggregation => priorities::PRE_AGGREGATION_FILTER,
            FilterLayer::PostAggregation => priorities::POST_AGGREGATION_FILTER,
            FilterLayer::PostTransformation => priorities::POST_TRANSFORMATION_FILTER,
        }
    }

    fn select(&self, def: &ViewElementDefinition) -> Option<ElementFilter> {
        match self {
            FilterLayer::PreAggregation => def.pre_aggregation_filter.clone(),
            FilterLayer::PostAggregation => def.post_aggregation_filter.clone(),
            FilterLayer::PostTransformation => def.post_transformation_filter.clone(),
        }
    }
}

/// Produces the configured iterator settings for one layout and schema.
pub struct IteratorSettingsFactory {
    layout: LayoutKind,
    schema: Arc<Schema>,
}

impl IteratorSettingsFactory {
    pub fn new(layout: LayoutKind, schema: Arc<Schema>) -> Self {
        IteratorSettingsFactory { layout, schema }
    }

    fn setting<T: Serialize>(
        &self,
        name: &str,
        priority: u32,
        config: &T,
    ) -> Result<IteratorSetting, IteratorConfigError> {
        Ok(IteratorSetting::new(name, priority)
            .with_option(CONFIG_OPTION, encode_config(config)?))
    }

    /// The schema-validation iterator, installed with the table.
    pub fn validator_setting(&self) -> StoreResult<IteratorSetting> {
        Ok(self.setting(
            names::VALIDATOR,
            priorities::VALIDATOR,
            &ValidatorConfig {
                layout: self.layout,
                schema: (*self.schema).clone(),
            },
        )?)
    }

    /// The schema group-by aggregator, installed with the table.
    pub fn aggregator_setting(&self) -> StoreResult<IteratorSetting> {
        Ok(self.setting(
            names::AGGREGATOR,
            priorities::AGGREGATOR,
            &AggregatorConfig {
                layout: self.layout,
                schema: (*self.schema).clone(),
            },
        )?)
    }

    /// The table configuration derived from this key package: permanent
    /// iterator stack plus split hints (none for the bundled engine).
    pub fn table_config(&self, validation: bool, aggregation: bool) -> StoreResult<TableConfig> {
        let mut iterators = Vec::new();
        if validation {
            iterators.push(self.validator_setting()?);
        }
        if aggregation {
            iterators.push(self.aggregator_setting()?);
        }
        Ok(TableConfig {
            iterators,
            splits: Vec::new(),
        })
    }

    /// Scan-scoped settings a view asks for, in stack order: optional
    /// pre-aggregation filter, the query-time aggregator (always installed; it also
    /// enforces the view's group selection), then the post-aggregation,
    /// transformation and post-transformation layers.
    pub fn view_scan_settings(&self, view: &View) -> StoreResult<Vec<IteratorSetting>> {
        let mut settings = Vec::new();
        if let Some(setting) = self.filter_setting(view, FilterLayer::PreAggregation)? {
            settings.push(setting);
        }
        settings.push(self.query_aggregator_setting(view)?);
        if let Some(setting) = self.filter_setting(view, FilterLayer::PostAggregation)? {
            settings.push(setting);
        }
        if let Some(setting) = self.transformer_setting(view)? {
            settings.push(setting);
        }
        if let Some(setting) = self.filter_setting(view, FilterLayer::PostTransformation)? {
            settings.push(setting);
        }
        Ok(settings)
    }

    /// The query-time aggregator: re-aggregates under the view's narrowed
    /// group-by and drops groups the view does not select.
    pub fn query_aggregator_setting(&self, view: &View) -> StoreResult<IteratorSetting> {
        let groups: BTreeSet<String> = view
            .entities
            .keys()
            .chain(view.edges.keys())
            .cloned()
            .collect();
        Ok(self.setting(
            names::QUERY_AGGREGATOR,
            priorities::QUERY_AGGREGATOR,
            &QueryAggregatorConfig {
                layout: self.layout,
                schema: (*self.schema).clone(),
                groups,
                group_by_overrides: view.group_by_overrides(),
            },
        )?)
    }

    /// The edge-entity/direction filter for edge-oriented operations.
    pub fn direction_filter_setting(
        &self,
        include_entities: bool,
        include_edges: IncludeEdgeType,
        direction: IncludeIncomingOutgoingType,
    ) -> StoreResult<IteratorSetting> {
        Ok(self.setting(
            names::DIRECTION_FILTER,
            priorities::DIRECTION_FILTER,
            &DirectionFilterConfig {
                layout: self.layout,
                include_entities,
                include_edges,
                direction,
            },
        )?)
    }

    fn filter_setting(
        &self,
        view: &View,
        layer: FilterLayer,
    ) -> StoreResult<Option<IteratorSetting>> {
        let mut filters = BTreeMap::new();
        for (group, def) in view.entities.iter().chain(view.edges.iter()) {
            let Some(filter) = layer.select(def) else {
                continue;
            };
            if layer == FilterLayer::PreAggregation {
                self.check_group_by_safe(group, &filter)?;
            }
            filters.insert(group.clone(), filter);
        }
        if filters.is_empty() {
            return Ok(None);
        }
        // Below the query-time aggregator the stream is laid out under the
        // schema group-by; above it, under the view's.
        let group_by_overrides = match layer {
            FilterLayer::PreAggregation => BTreeMap::new(),
            _ => view.group_by_overrides(),
        };
        Ok(Some(self.setting(
            layer.name(),
            layer.priority(),
            &FilterIteratorConfig {
                layout: self.layout,
                schema: (*self.schema).clone(),
                filters,
                group_by_overrides,
            },
        )?))
    }

    /// A pre-aggregation clause over a non-group-by property would observe
    /// partially merged values depending on compaction state.
    fn check_group_by_safe(
        &self,
        group: &str,
        filter: &ElementFilter,
    ) -> Result<(), IteratorConfigError> {
        let Some(def) = self.schema.element_definition(group) else {
            return Ok(());
        };
        for selection in filter.selections() {
            if !def.group_by.iter().any(|name| name == selection) {
                return Err(IteratorConfigError::PreAggregationNotGroupBySafe {
                    group: group.to_string(),
                    property: selection.to_string(),
                });
            }
        }
        Ok(())
    }

    fn transformer_setting(&self, view: &View) -> StoreResult<Option<IteratorSetting>> {
        let mut transformers: BTreeMap<String, ElementTransformer> = BTreeMap::new();
        for (group, def) in view.entities.iter().chain(view.edges.iter()) {
            let Some(transformer) = &def.transformer else {
                continue;
            };
            self.check_transform_targets(group, def, transformer)?;
            transformers.insert(group.clone(), transformer.clone());
        }
        if transformers.is_empty() {
            return Ok(None);
        }
        Ok(Some(self.setting(
            names::TRANSFORMER,
            priorities::TRANSFORMER,
            &TransformerConfig {
                layout: self.layout,
                schema: (*self.schema).clone(),
                transformers,
                group_by_overrides: view.group_by_overrides(),
            },
        )?))
    }

    /// Transformed values are re-encoded into the stored value only; a
    /// projection onto a group-by, visibility or timestamp property would
    /// silently change the key.
    fn check_transform_targets(
        &self,
        group: &str,
        view_def: &ViewElementDefinition,
        transformer: &ElementTransformer,
    ) -> Result<(), IteratorConfigError> {
        let Some(def) = self.schema.element_definition(group) else {
            return Ok(());
        };
        let effective_group_by = view_def.group_by.as_ref().unwrap_or(&def.group_by);
        for op in &transformer.ops {
            let projection = op.projection.as_str();
            let in_key = effective_group_by.iter().any(|n| n == projection)
                || def.visibility_property.as_deref() == Some(projection)
                || def.timestamp_property.as_deref() == Some(projection);
            if in_key {
                return Err(IteratorConfigError::TransformOntoKeyProperty {
                    group: group.to_string(),
                    property: projection.to_string(),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tablet_graph_core::aggregation::Aggregator;
    use tablet_graph_core::filter::Predicate;
    use tablet_graph_core::schema::{EdgeDefinition, PropertyDefinition};
    use tablet_graph_core::serialisation::TypeSerialiser;
    use tablet_graph_core::transform::TransformFunction;
    use tablet_graph_core::view::ViewElementDefinition;

    fn schema() -> Arc<Schema> {
        Arc::new(
            Schema::builder()
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

    fn factory() -> IteratorSettingsFactory {
        IteratorSettingsFactory::new(LayoutKind::ByteEntity, schema())
    }

    #[test]
    fn table_config_installs_validator_then_aggregator() {
        let config = factory().table_config(true, true).unwrap();
        assert_eq!(config.iterators.len(), 2);
        assert!(config.iterators[0].priority < config.iterators[1].priority);
        assert_eq!(config.iterators[0].name, names::VALIDATOR);
    }

    #[test]
    fn plain_view_still_gets_the_query_aggregator() {
        let view = View::all_of(&schema());
        let settings = factory().view_scan_settings(&view).unwrap();
        assert_eq!(settings.len(), 1);
        assert_eq!(settings[0].name, names::QUERY_AGGREGATOR);
    }

    #[test]
    fn pre_aggregation_filter_on_group_by_property_is_allowed() {
        let view = View::builder()
            .edge(
                "link",
                ViewElementDefinition::default().with_pre_aggregation_filter(
                    ElementFilter::new().select("kind", Predicate::Exists),
                ),
            )
            .build();
        let settings = factory().view_scan_settings(&view).unwrap();
        assert!(settings.iter().any(|s| s.name == names::PRE_AGGREGATION_FILTER));
    }

    #[test]
    fn pre_aggregation_filter_on_value_property_is_rejected() {
        let view = View::builder()
            .edge(
                "link",
                ViewElementDefinition::default().with_pre_aggregation_filter(
                    ElementFilter::new().select("count", Predicate::IsMoreThan(0i64.into())),
                ),
            )
            .build();
        let err = factory().view_scan_settings(&view).unwrap_err();
        assert!(err
            .to_string()
            .contains("use a post-aggregation filter"));
    }

    #[test]
    fn transform_onto_group_by_property_is_rejected() {
        let view = View::builder()
            .edge(
                "link",
                ViewElementDefinition::default().with_transformer(
                    ElementTransformer::new().project(
                        "count",
                        TransformFunction::ToStr,
                        "kind",
                    ),
                ),
            )
            .build();
        let err = factory().view_scan_settings(&view).unwrap_err();
        assert!(err.to_string().contains("kind"));
    }

    #[test]
    fn settings_come_out_in_stack_order() {
        let view = View::builder()
            .edge(
                "link",
                ViewElementDefinition::default()
                    .with_post_aggregation_filter(
                        ElementFilter::new().select("count", Predicate::IsMoreThan(1i64.into())),
                    )
                    .with_transformer(ElementTransformer::new().project(
                        "count",
                        TransformFunction::ScaleInt { factor: 2 },
                        "count",
                    ))
                    .with_post_transformation_filter(
                        ElementFilter::new().select("count", Predicate::IsLessThan(100i64.into())),
                    ),
            )
            .build();
        let settings = factory().view_scan_settings(&view).unwrap();
        let priorities: Vec<u32> = settings.iter().map(|s| s.priority).collect();
        let mut sorted = priorities.clone();
        sorted.sort_unstable();
        assert_eq!(priorities, sorted);
    }
}
