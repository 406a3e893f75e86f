//! `GetElementsWithinSet`: elements entirely inside a seed set.
//!
//! The scan is bounded by ranges over the seed set; edges whose far
//! endpoint lies outside the set are dropped by client-side verification,
//! since the server cannot know the set membership of the non-row endpoint.

use std::sync::Arc;

use tablet_graph_core::operation::{
    GetElementsWithinSet, IncludeEdgeType, IncludeIncomingOutgoingType,
};
use tablet_graph_core::types::{Element, ElementSeed};

use crate::error::StoreResult;
use crate::keypackage::escape::escape;
use crate::retriever::{EdgeDedup, ElementRetriever};

use super::{resolve_view, seed_vertex_set, HandlerContext};

pub fn run(ctx: &HandlerContext<'_>, op: &GetElementsWithinSet) -> StoreResult<ElementRetriever> {
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
        IncludeIncomingOutgoingType::Either,
    )?);

    let scanner = ctx
        .connector
        .scanner(ctx.table, ranges, &ctx.user.authorizations, iterators)?;

    let set = seed_vertex_set(ctx.schema, &op.seeds);
    // Key-level membership prefilter on the row's bloom key, ahead of any
    // decoding.
    let escaped_set: std::collections::BTreeSet<Vec<u8>> =
        set.iter().map(|raw| escape(raw)).collect();
    let functor = *ctx.key_package.key_functor();

    let serialiser = ctx.schema.vertex_serialiser();
    let in_set = move |vertex: &tablet_graph_core::types::PropertyValue| {
        serialiser
            .and_then(|s| s.serialise(vertex).ok())
            .is_some_and(|bytes| set.contains(&bytes))
    };

    Ok(ElementRetriever::new(
        scanner,
        Arc::clone(ctx.key_package.converter()),
        view.group_by_overrides(),
        true,
        EdgeDedup::SeenSet,
    )
    .with_row_filter(Box::new(move |key| {
        escaped_set.contains(functor.vertex_prefix(&key.row))
    }))
    .with_predicate(Box::new(move |element| match element {
        Element::Entity(entity) => in_set(&entity.vertex),
        Element::Edge(edge) => in_set(&edge.source) && in_set(&edge.destination),
    })))
}
