//! Batched element writer.
//!
//! Converts a stream of elements into mutations (one or two per element)
//! and submits them through the engine's batch writer. A codec failure or a
//! rejected mutation is logged and skipped (one malformed element must not
//! poison a bulk load) while engine failures terminate the write. The
//! caller gets a summary report rather than silence about partial failure.

use serde::{Deserialize, Serialize};
use tracing::{error, warn};

use tablet_graph_core::types::Element;

use crate::engine::{Mutation, TabletConnector};
use crate::error::{StoreError, StoreResult};
use crate::keypackage::converter::ElementConverter;

/// Outcome of an `AddElements` operation.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AddElementsReport {
    /// Elements fully submitted (both row-forms for edges).
    pub written: usize,
    /// Elements dropped on codec failure or mutation rejection.
    pub skipped: usize,
    /// The first failure, for callers that surface one message.
    pub first_error: Option<String>,
}

impl AddElementsReport {
    fn skip(&mut self, detail: String) {
        self.skipped += 1;
        if self.first_error.is_none() {
            self.first_error = Some(detail);
        }
    }
}

/// Writes elements in batches. Element order within a batch is unspecified.
pub fn write_elements<I>(
    connector: &dyn TabletConnector,
    table: &str,
    converter: &ElementConverter,
    elements: I,
) -> StoreResult<AddElementsReport>
where
    I: IntoIterator<Item = Element>,
{
    let mut writer = connector.writer(table)?;
    let mut report = AddElementsReport::default();

    for element in elements {
        let keys = match converter.keys_from_element(&element) {
            Ok(keys) => keys,
            Err(e) => {
                error!(group = element.group(), error = %e, "failed to build keys for element");
                report.skip(e.to_string());
                continue;
            }
        };
        let value = match converter.value_from_element(&element, None) {
            Ok(value) => value,
            Err(e) => {
                error!(group = element.group(), error = %e, "failed to build value for element");
                report.skip(e.to_string());
                continue;
            }
        };

        let (first, second) = keys;
        let mut rejected = false;
        for key in std::iter::once(first).chain(second) {
            match writer.add_mutation(Mutation::put(key, value.clone())) {
                Ok(()) => {}
                Err(StoreError::MutationRejected { detail }) => {
                    error!(group = element.group(), detail = %detail, "mutation rejected");
                    if !rejected {
                        report.skip(detail.clone());
                        rejected = true;
                    }
                }
                Err(e) => {
                    // Engine-level failure: close what we can and surface it.
                    if let Err(close_err) = writer.close() {
                        warn!(error = %close_err, "batch writer failed to close");
                    }
                    return Err(e);
                }
            }
        }
        if !rejected {
            report.written += 1;
        }
    }

    if let Err(e) = writer.close() {
        warn!(error = %e, "batch writer failed to close");
    }
    Ok(report)
}
