//! Server-side iterator implementations.
//!
//! The engine accepts iterator configuration as string-keyed byte options;
//! each iterator's structured config (schema, view fragment, layout) is
//! bincode-serialised under the `conf` option with a leading format-version
//! byte. The registry here maps iterator names to constructors, an explicit
//! match, never reflective loading.
//!
//! Priorities fix the apply order, lower running closer to the data:
//! validator, table aggregator, pre-aggregation filter, query-time
//! aggregator, post-aggregation filter, transformer, post-transformation
//! filter, edge-entity/direction filter.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use tablet_graph_core::filter::ElementFilter;
use tablet_graph_core::operation::{IncludeEdgeType, IncludeIncomingOutgoingType};
use tablet_graph_core::schema::Schema;
use tablet_graph_core::transform::ElementTransformer;
use tablet_graph_core::types::Properties;

use crate::error::{IteratorConfigError, StoreResult};
use crate::keypackage::converter::{classify_row, ElementConverter};
use crate::keypackage::{EdgeMarker, LayoutKind, RowKind};

use super::{IteratorSetting, TabletKey};

/// A lazily evaluated stream of key/value entries.
pub type KvStream = Box<dyn Iterator<Item = StoreResult<(TabletKey, Vec<u8>)>> + Send>;

/// Format version of serialised iterator configuration payloads.
pub const CONFIG_VERSION: u8 = 1;

/// The option key each iterator's serialised config lives under.
pub const CONFIG_OPTION: &str = "conf";

/// Registry names of the known server-side iterators.
pub mod names {
    pub const VALIDATOR: &str = "element-validator";
    pub const AGGREGATOR: &str = "element-aggregator";
    pub const PRE_AGGREGATION_FILTER: &str = "element-pre-aggregation-filter";
    pub const QUERY_AGGREGATOR: &str = "element-query-aggregator";
    pub const POST_AGGREGATION_FILTER: &str = "element-post-aggregation-filter";
    pub const TRANSFORMER: &str = "element-transformer";
    pub const POST_TRANSFORMATION_FILTER: &str = "element-post-transformation-filter";
    pub const DIRECTION_FILTER: &str = "edge-entity-direction-filter";
}

/// Stack positions. The gaps leave room for engine-internal iterators.
pub mod priorities {
    pub const VALIDATOR: u32 = 10;
    pub const AGGREGATOR: u32 = 20;
    pub const PRE_AGGREGATION_FILTER: u32 = 30;
    pub const QUERY_AGGREGATOR: u32 = 40;
    pub const POST_AGGREGATION_FILTER: u32 = 50;
    pub const TRANSFORMER: u32 = 60;
    pub const POST_TRANSFORMATION_FILTER: u32 = 70;
    pub const DIRECTION_FILTER: u32 = 80;
}

// ---------------------------------------------------------------------------
// Configuration payloads
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidatorConfig {
    pub layout: LayoutKind,
    pub schema: Schema,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregatorConfig {
    pub layout: LayoutKind,
    pub schema: Schema,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryAggregatorConfig {
    pub layout: LayoutKind,
    pub schema: Schema,
    /// Groups the view selects; every other group is dropped here.
    pub groups: BTreeSet<String>,
    /// View-narrowed group-by per group; absent means the schema's.
    pub group_by_overrides: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterIteratorConfig {
    pub layout: LayoutKind,
    pub schema: Schema,
    /// Filter per group; groups without an entry pass through.
    pub filters: BTreeMap<String, ElementFilter>,
    /// Effective group-by for decoding at this stack position.
    pub group_by_overrides: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransformerConfig {
    pub layout: LayoutKind,
    pub schema: Schema,
    pub transformers: BTreeMap<String, ElementTransformer>,
    pub group_by_overrides: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectionFilterConfig {
    pub layout: LayoutKind,
    pub include_entities: bool,
    pub include_edges: IncludeEdgeType,
    pub direction: IncludeIncomingOutgoingType,
}

/// Serialises a config payload: version byte plus bincode body.
pub fn encode_config<T: Serialize>(config: &T) -> Result<Vec<u8>, IteratorConfigError> {
    let body =
        bincode::serialize(config).map_err(|e| IteratorConfigError::Encode(e.to_string()))?;
    let mut out = Vec::with_capacity(body.len() + 1);
    out.push(CONFIG_VERSION);
    out.extend_from_slice(&body);
    Ok(out)
}

/// Reads a config payload back out of an iterator setting.
pub fn decode_config<T: DeserializeOwned>(
    setting: &IteratorSetting,
) -> Result<T, IteratorConfigError> {
    let bytes = setting
        .option(CONFIG_OPTION)
        .ok_or_else(|| IteratorConfigError::Decode("missing 'conf' option".to_string()))?;
    let (&version, body) = bytes
        .split_first()
        .ok_or_else(|| IteratorConfigError::Decode("empty 'conf' option".to_string()))?;
    if version != CONFIG_VERSION {
        return Err(IteratorConfigError::UnsupportedVersion {
            found: version,
            expected: CONFIG_VERSION,
        });
    }
    bincode::deserialize(body).map_err(|e| IteratorConfigError::Decode(e.to_string()))
}

// ---------------------------------------------------------------------------
// Stack assembly
// ---------------------------------------------------------------------------

/// Builds the full stack over `input`, sorted by priority (lowest first).
pub fn apply_stack(input: KvStream, settings: &[IteratorSetting]) -> StoreResult<KvStream> {
    let mut sorted: Vec<&IteratorSetting> = settings.iter().collect();
    sorted.sort_by_key(|s| s.priority);
    let mut stream = input;
    for setting in sorted {
        stream = build_iterator(setting, stream)?;
    }
    Ok(stream)
}

/// Constructs one iterator from its setting. Unknown names are an explicit
/// configuration error.
pub fn build_iterator(setting: &IteratorSetting, input: KvStream) -> StoreResult<KvStream> {
    match setting.name.as_str() {
        names::VALIDATOR => {
            let config: ValidatorConfig = decode_config(setting)?;
            let converter = ElementConverter::new(config.layout, Arc::new(config.schema));
            Ok(Box::new(ValidationIter { converter, input }))
        }
        names::AGGREGATOR => {
            let config: AggregatorConfig = decode_config(setting)?;
            let converter = ElementConverter::new(config.layout, Arc::new(config.schema));
            Ok(Box::new(AggregationIter {
                converter,
                input,
                lookahead: None,
            }))
        }
        names::QUERY_AGGREGATOR => {
            let config: QueryAggregatorConfig = decode_config(setting)?;
            let converter = ElementConverter::new(config.layout, Arc::new(config.schema.clone()));
            Ok(Box::new(QueryAggregationIter {
                converter,
                groups: config.groups,
                overrides: config.group_by_overrides,
                input,
                lookahead: None,
                out: VecDeque::new(),
            }))
        }
        names::PRE_AGGREGATION_FILTER
        | names::POST_AGGREGATION_FILTER
        | names::POST_TRANSFORMATION_FILTER => {
            let config: FilterIteratorConfig = decode_config(setting)?;
            let converter = ElementConverter::new(config.layout, Arc::new(config.schema));
            Ok(Box::new(FilterIter {
                converter,
                filters: config.filters,
                overrides: config.group_by_overrides,
                input,
            }))
        }
        names::TRANSFORMER => {
            let config: TransformerConfig = decode_config(setting)?;
            let converter = ElementConverter::new(config.layout, Arc::new(config.schema));
            Ok(Box::new(TransformIter {
                converter,
                transformers: config.transformers,
                overrides: config.group_by_overrides,
                input,
            }))
        }
        names::DIRECTION_FILTER => {
            let config: DirectionFilterConfig = decode_config(setting)?;
            Ok(Box::new(DirectionFilterIter { config, input }))
        }
        other => Err(IteratorConfigError::UnknownIterator {
            name: other.to_string(),
        }
        .into()),
    }
}

fn group_of(key: &TabletKey) -> Option<&str> {
    std::str::from_utf8(&key.column_family).ok()
}

fn override_of<'a>(
    overrides: &'a BTreeMap<String, Vec<String>>,
    group: &str,
) -> Option<&'a [String]> {
    overrides.get(group).map(Vec::as_slice)
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Drops entries whose decoded properties fail a schema validator. Entries
/// that do not decode at all are dropped too; a malformed entry must not
/// poison the scan.
struct ValidationIter {
    converter: ElementConverter,
    input: KvStream,
}

impl Iterator for ValidationIter {
    type Item = StoreResult<(TabletKey, Vec<u8>)>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let (key, value) = match self.input.next()? {
                Ok(kv) => kv,
                Err(e) => return Some(Err(e)),
            };
            match self.converter.properties_from_key_value(&key, &value, None) {
                Ok((group, properties)) => {
                    let valid = self
                        .converter
                        .schema()
                        .element_definition(&group)
                        .is_some_and(|def| def.validate_properties(&properties));
                    if valid {
                        return Some(Ok((key, value)));
                    }
                    debug!(group = %group, "validator dropped an entry");
                }
                Err(e) => warn!(error = %e, "validator skipped an undecodable entry"),
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Aggregation (schema group-by, table scope)
// ---------------------------------------------------------------------------

/// Collapses adjacent entries sharing the full aggregation key, folding
/// value properties with their declared aggregators. The first entry of a
/// run is the newest (timestamps sort descending), so position-sensitive
/// aggregators see newest-first order.
struct AggregationIter {
    converter: ElementConverter,
    input: KvStream,
    lookahead: Option<StoreResult<(TabletKey, Vec<u8>)>>,
}

impl AggregationIter {
    fn pull(&mut self) -> Option<StoreResult<(TabletKey, Vec<u8>)>> {
        self.lookahead.take().or_else(|| self.input.next())
    }
}

impl Iterator for AggregationIter {
    type Item = StoreResult<(TabletKey, Vec<u8>)>;

    fn next(&mut self) -> Option<Self::Item> {
        let (key, value) = match self.pull()? {
            Ok(kv) => kv,
            Err(e) => return Some(Err(e)),
        };
        let Some(group) = group_of(&key).map(str::to_string) else {
            return Some(Ok((key, value)));
        };

        let mut accumulated: Option<Properties> = None;
        loop {
            match self.pull() {
                Some(Ok((next_key, next_value))) => {
                    if !key.shares_aggregation_key(&next_key) {
                        self.lookahead = Some(Ok((next_key, next_value)));
                        break;
                    }
                    // Lazily decode the accumulated value on first merge.
                    if accumulated.is_none() {
                        match self.converter.value_properties(&group, &value, None) {
                            Ok(properties) => accumulated = Some(properties),
                            Err(e) => {
                                warn!(error = %e, group = %group, "aggregator passed through an undecodable entry");
                                self.lookahead = Some(Ok((next_key, next_value)));
                                return Some(Ok((key, value)));
                            }
                        }
                    }
                    let incoming = match self
                        .converter
                        .value_properties(&group, &next_value, None)
                    {
                        Ok(properties) => properties,
                        Err(e) => {
                            warn!(error = %e, group = %group, "aggregator skipped an undecodable entry");
                            continue;
                        }
                    };
                    let Some(acc) = accumulated.as_mut() else {
                        continue;
                    };
                    if let Err(e) = self.converter.fold_properties(&group, acc, &incoming, None) {
                        warn!(error = %e, group = %group, "aggregator skipped an incompatible entry");
                    }
                }
                Some(Err(e)) => {
                    self.lookahead = Some(Err(e));
                    break;
                }
                None => break,
            }
        }

        match accumulated {
            None => Some(Ok((key, value))),
            Some(properties) => match self.converter.encode_value(&group, &properties, None) {
                Ok(folded) => Some(Ok((key, folded))),
                Err(e) => {
                    warn!(error = %e, group = %group, "aggregator failed to re-encode, passing newest entry");
                    Some(Ok((key, value)))
                }
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Query-time aggregation (view group-by, scan scope)
// ---------------------------------------------------------------------------

/// Re-aggregates under the view's narrowed group-by and enforces the view's
/// group selection. Entries are buffered per `(row, column family)`: a
/// narrowed group-by is not necessarily a prefix of the schema's, so equal
/// narrowed tuples need not be adjacent in qualifier order.
struct QueryAggregationIter {
    converter: ElementConverter,
    groups: BTreeSet<String>,
    overrides: BTreeMap<String, Vec<String>>,
    input: KvStream,
    lookahead: Option<StoreResult<(TabletKey, Vec<u8>)>>,
    out: VecDeque<StoreResult<(TabletKey, Vec<u8>)>>,
}

impl QueryAggregationIter {
    fn pull(&mut self) -> Option<StoreResult<(TabletKey, Vec<u8>)>> {
        self.lookahead.take().or_else(|| self.input.next())
    }

    fn fill(&mut self) -> Option<StoreResult<()>> {
        // Find the first entry of a selected group.
        let (key, value, group) = loop {
            match self.pull()? {
                Ok((key, value)) => {
                    let group = group_of(&key).map(str::to_string);
                    if let Some(group) = group.filter(|g| self.groups.contains(g)) {
                        break (key, value, group);
                    }
                }
                Err(e) => return Some(Err(e)),
            }
        };
        let narrowed = self.overrides.get(&group).cloned();
        let narrowed = narrowed.as_deref();

        // Buckets keyed by (narrowed qualifier, visibility), in key order.
        let mut buckets: BTreeMap<(Vec<u8>, Vec<u8>), (Properties, u64)> = BTreeMap::new();
        let mut entries = vec![(key.clone(), value)];
        loop {
            match self.pull() {
                Some(Ok((next_key, next_value))) => {
                    if next_key.row != key.row || next_key.column_family != key.column_family {
                        self.lookahead = Some(Ok((next_key, next_value)));
                        break;
                    }
                    entries.push((next_key, next_value));
                }
                Some(Err(e)) => {
                    self.lookahead = Some(Err(e));
                    break;
                }
                None => break,
            }
        }

        for (entry_key, entry_value) in entries {
            let decoded = self
                .converter
                .qualifier_properties(&group, &entry_key.column_qualifier, None)
                .and_then(|mut properties| {
                    let mut values =
                        self.converter
                            .value_properties(&group, &entry_value, None)?;
                    properties.append(&mut values);
                    Ok(properties)
                });
            let properties = match decoded {
                Ok(properties) => properties,
                Err(e) => {
                    warn!(error = %e, group = %group, "query aggregator skipped an undecodable entry");
                    continue;
                }
            };
            let qualifier = match self
                .converter
                .encode_qualifier(&group, &properties, narrowed)
            {
                Ok(qualifier) => qualifier,
                Err(e) => {
                    warn!(error = %e, group = %group, "query aggregator skipped an entry");
                    continue;
                }
            };
            let bucket = buckets
                .entry((qualifier, entry_key.column_visibility.clone()))
                .or_insert_with(|| (Properties::new(), 0));
            if bucket.0.is_empty() {
                bucket.0 = properties;
            } else if let Err(e) =
                self.converter
                    .fold_properties(&group, &mut bucket.0, &properties, narrowed)
            {
                warn!(error = %e, group = %group, "query aggregator skipped an incompatible entry");
            }
            bucket.1 = bucket.1.max(entry_key.timestamp);
        }

        for ((qualifier, visibility), (properties, timestamp)) in buckets {
            let rebuilt = self
                .converter
                .encode_value(&group, &properties, narrowed)
                .map(|value| {
                    (
                        TabletKey {
                            row: key.row.clone(),
                            column_family: key.column_family.clone(),
                            column_qualifier: qualifier,
                            column_visibility: visibility,
                            timestamp,
                        },
                        value,
                    )
                });
            match rebuilt {
                Ok(kv) => self.out.push_back(Ok(kv)),
                Err(e) => warn!(error = %e, group = %group, "query aggregator dropped a bucket"),
            }
        }
        Some(Ok(()))
    }
}

impl Iterator for QueryAggregationIter {
    type Item = StoreResult<(TabletKey, Vec<u8>)>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(item) = self.out.pop_front() {
                return Some(item);
            }
            match self.fill()? {
                Ok(()) => {}
                Err(e) => return Some(Err(e)),
            }
        }
    }
}

// ---------------------------------------------------------------------------
// View filters
// ---------------------------------------------------------------------------

/// Applies a per-group [`ElementFilter`]. Groups without a filter pass
/// through untouched; undecodable entries are dropped.
struct FilterIter {
    converter: ElementConverter,
    filters: BTreeMap<String, ElementFilter>,
    overrides: BTreeMap<String, Vec<String>>,
    input: KvStream,
}

impl Iterator for FilterIter {
    type Item = StoreResult<(TabletKey, Vec<u8>)>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let (key, value) = match self.input.next()? {
                Ok(kv) => kv,
                Err(e) => return Some(Err(e)),
            };
            let Some(group) = group_of(&key) else {
                return Some(Ok((key, value)));
            };
            let Some(filter) = self.filters.get(group) else {
                return Some(Ok((key, value)));
            };
            let group_by = override_of(&self.overrides, group);
            match self
                .converter
                .properties_from_key_value(&key, &value, group_by)
            {
                Ok((_, properties)) => {
                    if filter.test(&properties) {
                        return Some(Ok((key, value)));
                    }
                }
                Err(e) => warn!(error = %e, group = %group, "filter skipped an undecodable entry"),
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Transformation
// ---------------------------------------------------------------------------

/// Applies per-group transformers and re-encodes the value. Group-by, key
/// and visibility bytes never change here: the settings factory rejects
/// transformers that project onto key properties.
struct TransformIter {
    converter: ElementConverter,
    transformers: BTreeMap<String, ElementTransformer>,
    overrides: BTreeMap<String, Vec<String>>,
    input: KvStream,
}

impl Iterator for TransformIter {
    type Item = StoreResult<(TabletKey, Vec<u8>)>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let (key, value) = match self.input.next()? {
                Ok(kv) => kv,
                Err(e) => return Some(Err(e)),
            };
            let Some(group) = group_of(&key).map(str::to_string) else {
                return Some(Ok((key, value)));
            };
            let Some(transformer) = self.transformers.get(&group) else {
                return Some(Ok((key, value)));
            };
            let group_by = override_of(&self.overrides, &group);
            let transformed = self
                .converter
                .properties_from_key_value(&key, &value, group_by)
                .and_then(|(_, mut properties)| {
                    transformer
                        .apply(&mut properties)
                        .map_err(|e| crate::error::CodecError::property("transform", e))?;
                    self.converter.encode_value(&group, &properties, group_by)
                });
            match transformed {
                Ok(new_value) => return Some(Ok((key, new_value))),
                Err(e) => warn!(error = %e, group = %group, "transformer dropped an entry"),
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Edge-entity / direction filtering
// ---------------------------------------------------------------------------

/// Reads the row marker and drops entries that do not match the operation's
/// entity/edge inclusion and direction options.
struct DirectionFilterIter {
    config: DirectionFilterConfig,
    input: KvStream,
}

impl DirectionFilterIter {
    fn keeps(&self, key: &TabletKey) -> bool {
        match classify_row(self.config.layout, &key.row) {
            Ok(RowKind::Entity { .. }) => self.config.include_entities,
            Ok(RowKind::Edge { marker, .. }) => {
                if !self.config.include_edges.accepts(marker.directed()) {
                    return false;
                }
                match self.config.direction {
                    IncludeIncomingOutgoingType::Either => true,
                    IncludeIncomingOutgoingType::Outgoing => {
                        !marker.directed() || marker == EdgeMarker::DirectedSourceFirst
                    }
                    IncludeIncomingOutgoingType::Incoming => {
                        !marker.directed() || marker == EdgeMarker::DirectedDestinationFirst
                    }
                }
            }
            Err(e) => {
                warn!(error = %e, "direction filter dropped an unparseable row");
                false
            }
        }
    }
}

impl Iterator for DirectionFilterIter {
    type Item = StoreResult<(TabletKey, Vec<u8>)>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.input.next()? {
                Ok((key, value)) => {
                    if self.keeps(&key) {
                        return Some(Ok((key, value)));
                    }
                }
                Err(e) => return Some(Err(e)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tablet_graph_core::aggregation::Aggregator;
    use tablet_graph_core::filter::Predicate;
    use tablet_graph_core::schema::{EdgeDefinition, PropertyDefinition};
    use tablet_graph_core::serialisation::TypeSerialiser;
    use tablet_graph_core::types::{Edge, Element};

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

    fn converter() -> ElementConverter {
        ElementConverter::new(LayoutKind::ByteEntity, Arc::new(schema()))
    }

    fn edge_kv(src: &str, dst: &str, count: i64, ts: u64) -> (TabletKey, Vec<u8>) {
        let conv = converter();
        let edge: Element = Edge::new("link", src, dst, true)
            .with_property("count", count)
            .into();
        let (mut key, _) = conv.keys_from_element(&edge).unwrap();
        key.timestamp = ts;
        let value = conv.value_from_element(&edge, None).unwrap();
        (key, value)
    }

    fn stream(entries: Vec<(TabletKey, Vec<u8>)>) -> KvStream {
        Box::new(entries.into_iter().map(Ok))
    }

    #[test]
    fn config_round_trips_through_options() {
        let config = ValidatorConfig {
            layout: LayoutKind::ByteEntity,
            schema: schema(),
        };
        let setting = IteratorSetting::new(names::VALIDATOR, priorities::VALIDATOR)
            .with_option(CONFIG_OPTION, encode_config(&config).unwrap());
        let decoded: ValidatorConfig = decode_config(&setting).unwrap();
        assert_eq!(decoded.layout, LayoutKind::ByteEntity);
        assert!(decoded.schema.edge_definition("link").is_some());
    }

    #[test]
    fn version_mismatch_is_rejected() {
        let mut bytes = encode_config(&DirectionFilterConfig {
            layout: LayoutKind::ByteEntity,
            include_entities: true,
            include_edges: IncludeEdgeType::All,
            direction: IncludeIncomingOutgoingType::Either,
        })
        .unwrap();
        bytes[0] = 99;
        let setting = IteratorSetting::new(names::DIRECTION_FILTER, priorities::DIRECTION_FILTER)
            .with_option(CONFIG_OPTION, bytes);
        let err = decode_config::<DirectionFilterConfig>(&setting).unwrap_err();
        assert!(matches!(
            err,
            IteratorConfigError::UnsupportedVersion { found: 99, .. }
        ));
    }

    #[test]
    fn aggregator_folds_adjacent_entries() {
        let a = edge_kv("1", "2", 3, 200);
        let b = edge_kv("1", "2", 4, 100);
        let setting = IteratorSetting::new(names::AGGREGATOR, priorities::AGGREGATOR).with_option(
            CONFIG_OPTION,
            encode_config(&AggregatorConfig {
                layout: LayoutKind::ByteEntity,
                schema: schema(),
            })
            .unwrap(),
        );
        let out: Vec<_> = build_iterator(&setting, stream(vec![a.clone(), b]))
            .unwrap()
            .map(Result::unwrap)
            .collect();
        assert_eq!(out.len(), 1);
        let props = converter()
            .value_properties("link", &out[0].1, None)
            .unwrap();
        assert_eq!(
            props.get("count"),
            Some(&tablet_graph_core::types::PropertyValue::Int(7))
        );
        assert_eq!(out[0].0.timestamp, 200, "newest key wins");
    }

    #[test]
    fn aggregator_keeps_distinct_keys_apart() {
        let a = edge_kv("1", "2", 3, 100);
        let b = edge_kv("1", "3", 4, 100);
        let setting = IteratorSetting::new(names::AGGREGATOR, priorities::AGGREGATOR).with_option(
            CONFIG_OPTION,
            encode_config(&AggregatorConfig {
                layout: LayoutKind::ByteEntity,
                schema: schema(),
            })
            .unwrap(),
        );
        let out: Vec<_> = build_iterator(&setting, stream(vec![a, b]))
            .unwrap()
            .map(Result::unwrap)
            .collect();
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn query_aggregator_drops_unselected_groups() {
        let a = edge_kv("1", "2", 3, 100);
        let setting = IteratorSetting::new(names::QUERY_AGGREGATOR, priorities::QUERY_AGGREGATOR)
            .with_option(
                CONFIG_OPTION,
                encode_config(&QueryAggregatorConfig {
                    layout: LayoutKind::ByteEntity,
                    schema: schema(),
                    groups: BTreeSet::new(),
                    group_by_overrides: BTreeMap::new(),
                })
                .unwrap(),
            );
        let out: Vec<_> = build_iterator(&setting, stream(vec![a]))
            .unwrap()
            .collect();
        assert!(out.is_empty());
    }

    #[test]
    fn filter_drops_non_matching_entries() {
        let a = edge_kv("1", "2", 7, 100);
        let b = edge_kv("1", "3", 2, 100);
        let mut filters = BTreeMap::new();
        filters.insert(
            "link".to_string(),
            ElementFilter::new().select("count", Predicate::IsMoreThan(5i64.into())),
        );
        let setting = IteratorSetting::new(
            names::POST_AGGREGATION_FILTER,
            priorities::POST_AGGREGATION_FILTER,
        )
        .with_option(
            CONFIG_OPTION,
            encode_config(&FilterIteratorConfig {
                layout: LayoutKind::ByteEntity,
                schema: schema(),
                filters,
                group_by_overrides: BTreeMap::new(),
            })
            .unwrap(),
        );
        let out: Vec<_> = build_iterator(&setting, stream(vec![a.clone(), b]))
            .unwrap()
            .map(Result::unwrap)
            .collect();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].0, a.0);
    }

    #[test]
    fn direction_filter_honours_outgoing() {
        let conv = converter();
        let edge: Element = Edge::new("link", "1", "2", true).into();
        let (first, second) = conv.keys_from_element(&edge).unwrap();
        let second = second.unwrap();
        let value = conv.value_from_element(&edge, None).unwrap();

        let setting = IteratorSetting::new(names::DIRECTION_FILTER, priorities::DIRECTION_FILTER)
            .with_option(
                CONFIG_OPTION,
                encode_config(&DirectionFilterConfig {
                    layout: LayoutKind::ByteEntity,
                    include_entities: false,
                    include_edges: IncludeEdgeType::All,
                    direction: IncludeIncomingOutgoingType::Outgoing,
                })
                .unwrap(),
            );
        let out: Vec<_> = build_iterator(
            &setting,
            stream(vec![(first.clone(), value.clone()), (second, value)]),
        )
        .unwrap()
        .map(Result::unwrap)
        .collect();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].0, first);
    }

    #[test]
    fn unknown_iterator_name_is_rejected() {
        let setting = IteratorSetting::new("made-up", 5);
        let err = build_iterator(&setting, stream(vec![])).unwrap_err();
        assert!(matches!(
            err,
            crate::error::StoreError::IteratorConfig(IteratorConfigError::UnknownIterator { .. })
        ));
    }
}
