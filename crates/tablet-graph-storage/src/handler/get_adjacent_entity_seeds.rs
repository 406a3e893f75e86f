//! `GetAdjacentEntitySeeds`: project edges touching the seeds onto their
//! far endpoints.

use std::sync::Arc;

use tablet_graph_core::operation::{GetAdjacentEntitySeeds, IncludeEdgeType};
use tablet_graph_core::types::ElementSeed;

use crate::error::StoreResult;
use crate::retriever::{AdjacentSeedStream, EdgeDedup, ElementRetriever};

use super::{resolve_view, HandlerContext};

pub fn run(
    ctx: &HandlerContext<'_>,
    op: &GetAdjacentEntitySeeds,
) -> StoreResult<AdjacentSeedStream> {
    let view = resolve_view(ctx.schema, &op.view)?;

    let seeds: Vec<ElementSeed> = op
        .seeds
        .iter()
        .cloned()
        .map(ElementSeed::Entity)
        .collect();
    let ranges = ctx
        .key_package
        .range_factory()
        .element_seed_ranges(&seeds, false, true)?;

    let settings_factory = ctx.key_package.iterator_settings();
    let mut iterators = settings_factory.view_scan_settings(&view)?;
    iterators.push(settings_factory.direction_filter_setting(
        false,
        IncludeEdgeType::All,
        op.include_incoming_outgoing,
    )?);

    let scanner = ctx
        .connector
        .scanner(ctx.table, ranges, &ctx.user.authorizations, iterators)?;

    // No edge-level de-duplication: when both endpoints are seeded, the two
    // row-forms project to different far vertices and both belong in the
    // result. The stream de-duplicates the emitted seeds instead.
    let retriever = ElementRetriever::new(
        scanner,
        Arc::clone(ctx.key_package.converter()),
        view.group_by_overrides(),
        true,
        EdgeDedup::None,
    );
    Ok(AdjacentSeedStream::new(retriever))
}
