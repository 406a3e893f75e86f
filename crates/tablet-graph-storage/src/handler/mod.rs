//! Operation handlers: one per operation kind.
//!
//! Each handler follows the same sequence (validate the view against the
//! schema, build ranges from the operation's seeds, build the scan iterator
//! stack from the view, open a retriever) and differs only in which
//! inclusion flags, de-duplication strategy and client-side verification it
//! applies. Dispatch is an exhaustive match over the operation enum.

mod add_elements;
mod get_adjacent_entity_seeds;
mod get_all_elements;
mod get_elements;
mod get_elements_between_sets;
mod get_elements_in_ranges;
mod get_elements_within_set;
mod summarise_group_over_ranges;

use std::collections::BTreeSet;
use std::sync::Arc;

use tablet_graph_core::operation::GraphOperation;
use tablet_graph_core::schema::Schema;
use tablet_graph_core::types::EntitySeed;
use tablet_graph_core::view::View;

use crate::engine::{TabletConnector, User};
use crate::error::StoreResult;
use crate::keypackage::KeyPackage;
use crate::retriever::{AdjacentSeedStream, ElementRetriever};
use crate::writer::AddElementsReport;

pub use self::add_elements::run as add_elements;
pub use self::get_adjacent_entity_seeds::run as get_adjacent_entity_seeds;
pub use self::get_all_elements::run as get_all_elements;
pub use self::get_elements::run as get_elements;
pub use self::get_elements_between_sets::run as get_elements_between_sets;
pub use self::get_elements_in_ranges::run as get_elements_in_ranges;
pub use self::get_elements_within_set::run as get_elements_within_set;
pub use self::summarise_group_over_ranges::run as summarise_group_over_ranges;

/// Everything a handler needs from the store.
pub struct HandlerContext<'a> {
    pub connector: &'a dyn TabletConnector,
    pub table: &'a str,
    pub schema: &'a Arc<Schema>,
    pub key_package: &'a KeyPackage,
    pub user: &'a User,
}

/// A handler's result, typed by operation kind.
pub enum OperationOutput {
    Elements(ElementRetriever),
    Seeds(AdjacentSeedStream),
    Report(AddElementsReport),
}

impl OperationOutput {
    pub fn kind(&self) -> &'static str {
        match self {
            OperationOutput::Elements(_) => "elements",
            OperationOutput::Seeds(_) => "entity seeds",
            OperationOutput::Report(_) => "an ingest report",
        }
    }
}

/// Exhaustive dispatch. Adding an operation kind without a handler is a
/// compile error, not a runtime surprise.
pub fn handle(ctx: &HandlerContext<'_>, operation: &GraphOperation) -> StoreResult<OperationOutput> {
    match operation {
        GraphOperation::GetElements(op) => {
            get_elements::run(ctx, op).map(OperationOutput::Elements)
        }
        GraphOperation::GetAllElements(op) => {
            get_all_elements::run(ctx, op).map(OperationOutput::Elements)
        }
        GraphOperation::GetAdjacentEntitySeeds(op) => {
            get_adjacent_entity_seeds::run(ctx, op).map(OperationOutput::Seeds)
        }
        GraphOperation::GetElementsWithinSet(op) => {
            get_elements_within_set::run(ctx, op).map(OperationOutput::Elements)
        }
        GraphOperation::GetElementsBetweenSets(op) => {
            get_elements_between_sets::run(ctx, op).map(OperationOutput::Elements)
        }
        GraphOperation::GetElementsInRanges(op) => {
            get_elements_in_ranges::run(ctx, op).map(OperationOutput::Elements)
        }
        GraphOperation::SummariseGroupOverRanges(op) => {
            summarise_group_over_ranges::run(ctx, op).map(OperationOutput::Elements)
        }
        GraphOperation::AddElements(op) => {
            add_elements::run(ctx, op).map(OperationOutput::Report)
        }
    }
}

/// Resolves an operation's optional view (absent means "every group") and
/// validates it before anything touches the engine.
fn resolve_view(schema: &Schema, view: &Option<View>) -> StoreResult<View> {
    let view = view.clone().unwrap_or_else(|| View::all_of(schema));
    view.validate(schema)?;
    Ok(view)
}

/// Serialises seed vertices with the schema-wide vertex serialiser for
/// byte-level set membership checks.
fn seed_vertex_set(schema: &Schema, seeds: &[EntitySeed]) -> BTreeSet<Vec<u8>> {
    let Some(serialiser) = schema.vertex_serialiser() else {
        return BTreeSet::new();
    };
    seeds
        .iter()
        .filter_map(|seed| serialiser.serialise(&seed.vertex).ok())
        .collect()
}
