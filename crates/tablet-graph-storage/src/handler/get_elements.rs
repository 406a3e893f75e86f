//! `GetElements`: everything touching each seed.

use std::sync::Arc;

use tablet_graph_core::operation::{GetElements, IncludeEdgeType};

use crate::error::StoreResult;
use crate::retriever::{EdgeDedup, ElementRetriever};

use super::{resolve_view, HandlerContext};

pub fn run(ctx: &HandlerContext<'_>, op: &GetElements) -> StoreResult<ElementRetriever> {
    let view = resolve_view(ctx.schema, &op.view)?;
    let include_edges = op.include_edges != IncludeEdgeType::None;

    let ranges = ctx.key_package.range_factory().element_seed_ranges(
        &op.seeds,
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

    // Re-verify against the seeds client-side: point ranges for edge seeds
    // can surface same-row entries from other groups.
    let seeds = op.seeds.clone();
    Ok(ElementRetriever::new(
        scanner,
        Arc::clone(ctx.key_package.converter()),
        view.group_by_overrides(),
        true,
        EdgeDedup::SeenSet,
    )
    .with_predicate(Box::new(move |element| {
        seeds.iter().any(|seed| seed.is_related(element))
    })))
}
