//! `SummariseGroupOverRanges`: ranged scan under a forced aggregation-only
//! view.
//!
//! Every selected group's group-by collapses to empty unless the view
//! explicitly narrows it, so each `(row, group)` pair folds down to a single
//! summary element.

use std::sync::Arc;

use tablet_graph_core::operation::{IncludeIncomingOutgoingType, SummariseGroupOverRanges};

use crate::error::StoreResult;
use crate::retriever::{EdgeDedup, ElementRetriever};

use super::{resolve_view, HandlerContext};

pub fn run(
    ctx: &HandlerContext<'_>,
    op: &SummariseGroupOverRanges,
) -> StoreResult<ElementRetriever> {
    let mut view = resolve_view(ctx.schema, &op.view)?;
    for def in view.entities.values_mut().chain(view.edges.values_mut()) {
        if def.group_by.is_none() {
            def.group_by = Some(Vec::new());
        }
    }

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

    Ok(ElementRetriever::new(
        scanner,
        Arc::clone(ctx.key_package.converter()),
        view.group_by_overrides(),
        false,
        EdgeDedup::SeenSet,
    ))
}
