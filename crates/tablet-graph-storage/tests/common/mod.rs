//! Shared fixtures for the integration suites: a schema exercising every
//! key feature (aggregation, group-by, visibility, timestamp properties)
//! over a real engine instance in a temp directory.

#![allow(dead_code)]

use std::sync::Once;

use tempfile::TempDir;

use tablet_graph_core::aggregation::Aggregator;
use tablet_graph_core::operation::AddElements;
use tablet_graph_core::schema::{
    EdgeDefinition, EntityDefinition, PropertyDefinition, Schema,
};
use tablet_graph_core::serialisation::TypeSerialiser;
use tablet_graph_core::types::{Edge, Element, Entity};
use tablet_graph_storage::{
    AddElementsReport, Authorizations, StoreConfig, TabletGraphStore, User,
};

pub fn graph_schema() -> Schema {
    Schema::builder()
        .entity(
            "v",
            EntityDefinition::new(TypeSerialiser::Utf8String).with_property(
                PropertyDefinition::new("prop", TypeSerialiser::OrderedInt, Aggregator::Max),
            ),
        )
        .entity(
            "doc",
            EntityDefinition::new(TypeSerialiser::Utf8String)
                .with_property(PropertyDefinition::new(
                    "level",
                    TypeSerialiser::Utf8String,
                    Aggregator::First,
                ))
                .with_visibility_property("level"),
        )
        .entity(
            "ev",
            EntityDefinition::new(TypeSerialiser::Utf8String)
                .with_property(PropertyDefinition::new(
                    "at",
                    TypeSerialiser::OrderedInt,
                    Aggregator::Max,
                ))
                .with_timestamp_property("at"),
        )
        .edge(
            "e",
            EdgeDefinition::new(TypeSerialiser::Utf8String, TypeSerialiser::Utf8String)
                .with_property(PropertyDefinition::new(
                    "count",
                    TypeSerialiser::OrderedInt,
                    Aggregator::Sum,
                )),
        )
        .edge(
            "t",
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
        .expect("valid test schema")
}

static TRACING: Once = Once::new();

fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

pub fn open_store_with_layout(layout: &str) -> (TempDir, TabletGraphStore) {
    init_tracing();
    let tmp = TempDir::new().expect("temp dir");
    let config = StoreConfig::for_table("graph")
        .with_key_package(layout)
        .with_data_dir(tmp.path());
    let store = TabletGraphStore::initialise(graph_schema(), config).expect("store initialises");
    (tmp, store)
}

pub fn open_store() -> (TempDir, TabletGraphStore) {
    open_store_with_layout("byte-entity")
}

pub fn root() -> User {
    User::new("root", Authorizations::none())
}

pub fn counted_edge(source: &str, destination: &str, count: i64) -> Element {
    Edge::new("e", source, destination, true)
        .with_property("count", count)
        .into()
}

pub fn prop_entity(vertex: &str, prop: i64) -> Element {
    Entity::new("v", vertex).with_property("prop", prop).into()
}

pub fn add(store: &TabletGraphStore, elements: Vec<Element>) -> AddElementsReport {
    store
        .add_elements(&AddElements::new(elements), &root())
        .expect("add elements")
}

/// Collects a stream, failing the test on any scan error.
pub fn collect<T, I>(stream: I) -> Vec<T>
where
    I: Iterator<Item = tablet_graph_storage::StoreResult<T>>,
{
    stream
        .collect::<tablet_graph_storage::StoreResult<Vec<T>>>()
        .expect("stream yields no errors")
}
