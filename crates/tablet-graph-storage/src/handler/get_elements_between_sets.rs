//! `GetElementsBetweenSets`: edges from set A whose far endpoint is in set
//! B, plus (optionally) the entities of set A.

use std::sync::Arc;

use tablet_graph_core::operation::{GetElementsBetweenSets, IncludeEdgeType};
use tablet_graph_core::types::{Element, ElementSeed};

use crate::error::StoreResult;
use crate::retriever::{EdgeDedup, ElementRetriever};

use super::{resolve_view, seed_vertex_set, HandlerContext};

pub fn run(
    ctx: &HandlerContext<'_>,
    op: &GetElementsBetweenSets,
) -> StoreResult<ElementRetriever> {
    let view = resolve_view(ctx.schema, &op.view)?;
    let include_edges = op.include_edges != IncludeEdgeType::None;

    let seeds: Vec<ElementSeed> = op
        .seeds
        .iter()
        .cloned()
        .map(ElementSeed::Entity)
        .collect();
    let ranges = ctx.key_package.range_factory().element_seed_ranges(
        &seeds,
        op.include_entities,
        include_edges,
    )?;

    let settings_factory = ctx.key_package.iterator_settings();
    let mut iterators = settings_factory.view_scan_settings(&view)?;
    iterators.push(settings_factory.direction_filter_setting(
        op.include_entities,
        op.include_edges,
        op.include_incoming_outgoing,
    )?);

    let scanner = ctx
        .connector
        .scanner(ctx.table, ranges, &ctx.user.authorizations, iterators)?;

    let set_b = seed_vertex_set(ctx.schema, &op.seeds_b);
    let serialiser = ctx.schema.vertex_serialiser();

    Ok(ElementRetriever::new(
        scanner,
        Arc::clone(ctx.key_package.converter()),
        view.group_by_overrides(),
        true,
        EdgeDedup::SeenSet,
    )
    .with_predicate(Box::new(move |element| match element {
        // Entities come from set A's ranges by construction.
        Element::Entity(_) => true,
        // The matched-vertex hint marks the set-A end; the far endpoint
        // must land in set B.
        Element::Edge(edge) => serialiser
            .and_then(|s| s.serialise(edge.far_vertex()).ok())
            .is_some_and(|bytes| set_b.contains(&bytes)),
    })))
}
