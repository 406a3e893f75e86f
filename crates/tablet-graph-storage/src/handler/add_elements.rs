//! `AddElements`: batched ingest.

use tablet_graph_core::operation::AddElements;

use crate::error::StoreResult;
use crate::writer::{write_elements, AddElementsReport};

use super::HandlerContext;

pub fn run(ctx: &HandlerContext<'_>, op: &AddElements) -> StoreResult<AddElementsReport> {
    write_elements(
        ctx.connector,
        ctx.table,
        ctx.key_package.converter(),
        op.elements.iter().cloned(),
    )
}
