//! `GetAllElements`: full-table scan.

use std::sync::Arc;

use tablet_graph_core::operation::{GetAllElements, IncludeIncomingOutgoingType};

use crate::engine::KeyRange;
use crate::error::StoreResult;
use crate::retriever::{EdgeDedup, ElementRetriever};

use super::{resolve_view, HandlerContext};

pub fn run(ctx: &HandlerContext<'_>, op: &GetAllElements) -> StoreResult<ElementRetriever> {
    let view = resolve_view(ctx.schema, &op.view)?;

    let settings_factory = ctx.key_package.iterator_settings();
    let mut iterators = settings_factory.view_scan_settings(&view)?;
    iterators.push(settings_factory.direction_filter_setting(
        op.include_entities,
        op.include_edges,
        IncludeIncomingOutgoingType::Either,
    )?);

    let scanner = ctx.connector.scanner(
        ctx.table,
        vec![KeyRange::unbounded()],
        &ctx.user.authorizations,
        iterators,
    )?;

    // A full scan always sees both row-forms of every edge, so the
    // stateless key-level rule suffices for de-duplication.
    Ok(ElementRetriever::new(
        scanner,
        Arc::clone(ctx.key_package.converter()),
        view.group_by_overrides(),
        false,
        EdgeDedup::RowForm,
    ))
}
