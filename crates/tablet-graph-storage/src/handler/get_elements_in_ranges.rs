//! `GetElementsInRanges`: scan arbitrary vertex ranges.

use std::sync::Arc;

use tablet_graph_core::operation::{GetElementsInRanges, IncludeIncomingOutgoingType};

use crate::error::StoreResult;
use crate::retriever::{EdgeDedup, ElementRetriever};

use super::{resolve_view, HandlerContext};

pub fn run(ctx: &HandlerContext<'_>, op: &GetElementsInRanges) -> StoreResult<ElementRetriever> {
    let view = resolve_view(ctx.schema, &op.view)?;

    let ranges = ctx.key_package.range_factory().vertex_ranges(&op.ranges)?;

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

    // A wide range may cover both row-forms of an edge; remember what has
    // been returned so each edge appears once.
    Ok(ElementRetriever::new(
        scanner,
        Arc::clone(ctx.key_package.converter()),
        view.group_by_overrides(),
        false,
        EdgeDedup::SeenSet,
    ))
}
