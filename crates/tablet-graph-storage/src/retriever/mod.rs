//! Element retrievers: lazy streams over a scan.
//!
//! A retriever owns its scanner, decodes entries through the key package's
//! converter, de-duplicates the two row-forms of an edge, and optionally
//! applies a client-side verification predicate (seed membership checks the
//! server cannot do). Streams are single-pass and finite; closing releases
//! the scanner and is idempotent.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use tracing::warn;

use tablet_graph_core::types::{Element, EntitySeed};

use crate::engine::{TabletKey, TabletScanner};
use crate::error::StoreResult;
use crate::keypackage::converter::ElementConverter;
use crate::keypackage::{EdgeMarker, RowKind};

/// Client-side verification applied after decoding.
pub type ElementPredicate = Box<dyn FnMut(&Element) -> bool + Send>;

/// Key-level prefilter applied before decoding, for checks that only need
/// row bytes (seed-set membership via the bloom key prefix).
pub type RowPredicate = Box<dyn FnMut(&TabletKey) -> bool + Send>;

/// How the two row-forms of an edge collapse to one result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeDedup {
    /// No de-duplication; used when ranges cannot contain both forms.
    None,
    /// Remember returned edge identities. Correct for arbitrary range sets,
    /// at the cost of a seen-set held for the stream's lifetime.
    SeenSet,
    /// Key-level rule for full-table scans: both forms are always present,
    /// so drop destination-first directed rows and the non-canonical
    /// orientation of undirected rows. Holds no state.
    RowForm,
}

/// Lazily decodes a scan into elements.
pub struct ElementRetriever {
    scanner: Option<Box<dyn TabletScanner>>,
    converter: Arc<ElementConverter>,
    /// View-narrowed group-by per group, for decoding.
    overrides: BTreeMap<String, Vec<String>>,
    include_matched_vertex: bool,
    dedup: EdgeDedup,
    seen: BTreeSet<Vec<u8>>,
    row_filter: Option<RowPredicate>,
    predicate: Option<ElementPredicate>,
}

impl ElementRetriever {
    pub fn new(
        scanner: Box<dyn TabletScanner>,
        converter: Arc<ElementConverter>,
        overrides: BTreeMap<String, Vec<String>>,
        include_matched_vertex: bool,
        dedup: EdgeDedup,
    ) -> Self {
        ElementRetriever {
            scanner: Some(scanner),
            converter,
            overrides,
            include_matched_vertex,
            dedup,
            seen: BTreeSet::new(),
            row_filter: None,
            predicate: None,
        }
    }

    /// Installs a client-side verification predicate; elements failing it
    /// are silently dropped.
    pub fn with_predicate(mut self, predicate: ElementPredicate) -> Self {
        self.predicate = Some(predicate);
        self
    }

    /// Installs a key-level prefilter, run before any decoding.
    pub fn with_row_filter(mut self, filter: RowPredicate) -> Self {
        self.row_filter = Some(filter);
        self
    }

    /// Releases the scanner. Idempotent; also runs on drop.
    pub fn close(&mut self) {
        if let Some(mut scanner) = self.scanner.take() {
            scanner.close();
        }
    }

    /// Key-level duplicate suppression for full scans.
    fn row_form_duplicate(&self, key: &TabletKey) -> bool {
        match self.converter.classify_row(&key.row) {
            Ok(RowKind::Edge { first, second, marker }) => match marker {
                EdgeMarker::DirectedDestinationFirst => true,
                EdgeMarker::Undirected => first > second,
                EdgeMarker::DirectedSourceFirst => false,
            },
            _ => false,
        }
    }

    /// Identity under which the two row-forms of one edge collide: group,
    /// canonically ordered endpoint parts, directedness and the group-by
    /// bytes.
    fn edge_identity(&self, key: &TabletKey) -> Option<Vec<u8>> {
        match self.converter.classify_row(&key.row) {
            Ok(RowKind::Edge { first, second, marker }) => {
                let (a, b) = match marker {
                    EdgeMarker::DirectedSourceFirst => (first, second),
                    EdgeMarker::DirectedDestinationFirst => (second, first),
                    EdgeMarker::Undirected => {
                        if first <= second {
                            (first, second)
                        } else {
                            (second, first)
                        }
                    }
                };
                let mut identity = Vec::with_capacity(
                    a.len() + b.len() + key.column_family.len() + key.column_qualifier.len() + 4,
                );
                identity.push(marker.directed() as u8);
                identity.extend_from_slice(a);
                identity.push(0x00);
                identity.extend_from_slice(b);
                identity.push(0x00);
                identity.extend_from_slice(&key.column_family);
                identity.push(0x00);
                identity.extend_from_slice(&key.column_qualifier);
                Some(identity)
            }
            _ => None,
        }
    }

    fn group_by_for(&self, key: &TabletKey) -> Option<&[String]> {
        let group = std::str::from_utf8(&key.column_family).ok()?;
        self.overrides.get(group).map(Vec::as_slice)
    }
}

impl Iterator for ElementRetriever {
    type Item = StoreResult<Element>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let item = self.scanner.as_mut()?.next()?;
            let (key, value) = match item {
                Ok(kv) => kv,
                Err(e) => return Some(Err(e)),
            };

            if let Some(filter) = self.row_filter.as_mut() {
                if !filter(&key) {
                    continue;
                }
            }

            match self.dedup {
                EdgeDedup::None => {}
                EdgeDedup::RowForm => {
                    if self.row_form_duplicate(&key) {
                        continue;
                    }
                }
                EdgeDedup::SeenSet => {
                    if let Some(identity) = self.edge_identity(&key) {
                        if !self.seen.insert(identity) {
                            continue;
                        }
                    }
                }
            }

            let group_by = self.group_by_for(&key);
            let element = match self.converter.element_from_key_value(
                &key,
                &value,
                group_by,
                self.include_matched_vertex,
            ) {
                Ok(element) => element,
                Err(e) => {
                    warn!(error = %e, "retriever skipped an undecodable entry");
                    continue;
                }
            };

            if let Some(predicate) = self.predicate.as_mut() {
                if !predicate(&element) {
                    continue;
                }
            }
            return Some(Ok(element));
        }
    }
}

impl Drop for ElementRetriever {
    fn drop(&mut self) {
        self.close();
    }
}

/// Projects edges to their far endpoints, de-duplicating the emitted seeds.
pub struct AdjacentSeedStream {
    inner: ElementRetriever,
    seen: BTreeSet<Vec<u8>>,
}

impl AdjacentSeedStream {
    pub fn new(inner: ElementRetriever) -> Self {
        AdjacentSeedStream {
            inner,
            seen: BTreeSet::new(),
        }
    }

    pub fn close(&mut self) {
        self.inner.close();
    }
}

impl Iterator for AdjacentSeedStream {
    type Item = StoreResult<EntitySeed>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let element = match self.inner.next()? {
                Ok(element) => element,
                Err(e) => return Some(Err(e)),
            };
            let Element::Edge(edge) = element else {
                continue;
            };
            let far = edge.far_vertex().clone();
            let identity = match bincode::serialize(&far) {
                Ok(bytes) => bytes,
                Err(e) => {
                    warn!(error = %e, "adjacent seed projection skipped a vertex");
                    continue;
                }
            };
            if self.seen.insert(identity) {
                return Some(Ok(EntitySeed { vertex: far }));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tablet_graph_core::aggregation::Aggregator;
    use tablet_graph_core::schema::{EdgeDefinition, PropertyDefinition, Schema};
    use tablet_graph_core::serialisation::TypeSerialiser;
    use tablet_graph_core::types::Edge;

    use crate::engine::TabletKey;
    use crate::keypackage::LayoutKind;

    struct FixedScanner {
        entries: std::vec::IntoIter<(TabletKey, Vec<u8>)>,
    }

    impl Iterator for FixedScanner {
        type Item = StoreResult<(TabletKey, Vec<u8>)>;
        fn next(&mut self) -> Option<Self::Item> {
            self.entries.next().map(Ok)
        }
    }

    impl TabletScanner for FixedScanner {
        fn close(&mut self) {}
    }

    fn schema() -> Arc<Schema> {
        Arc::new(
            Schema::builder()
                .edge(
                    "link",
                    EdgeDefinition::new(TypeSerialiser::Utf8String, TypeSerialiser::Utf8String)
                        .with_property(PropertyDefinition::new(
                            "count",
                            TypeSerialiser::OrderedInt,
                            Aggregator::Sum,
                        )),
                )
                .build()
                .unwrap(),
        )
    }

    fn both_forms(edge: &Edge) -> Vec<(TabletKey, Vec<u8>)> {
        let conv = ElementConverter::new(LayoutKind::ByteEntity, schema());
        let element: Element = edge.clone().into();
        let (first, second) = conv.keys_from_element(&element).unwrap();
        let value = conv.value_from_element(&element, None).unwrap();
        vec![
            (first, value.clone()),
            (second.expect("two forms"), value),
        ]
    }

    fn retriever(
        entries: Vec<(TabletKey, Vec<u8>)>,
        dedup: EdgeDedup,
    ) -> ElementRetriever {
        ElementRetriever::new(
            Box::new(FixedScanner {
                entries: entries.into_iter(),
            }),
            Arc::new(ElementConverter::new(LayoutKind::ByteEntity, schema())),
            BTreeMap::new(),
            false,
            dedup,
        )
    }

    #[test]
    fn seen_set_returns_each_edge_once() {
        let edge = Edge::new("link", "a", "b", true);
        let elements: Vec<Element> = retriever(both_forms(&edge), EdgeDedup::SeenSet)
            .map(Result::unwrap)
            .collect();
        assert_eq!(elements.len(), 1);
        assert_eq!(elements[0], edge.clone().into());
    }

    #[test]
    fn seen_set_dedups_undirected_forms_too() {
        let edge = Edge::new("link", "b", "a", false);
        let elements: Vec<Element> = retriever(both_forms(&edge), EdgeDedup::SeenSet)
            .map(Result::unwrap)
            .collect();
        assert_eq!(elements.len(), 1);
    }

    #[test]
    fn row_form_keeps_only_the_canonical_form() {
        let directed = Edge::new("link", "a", "b", true);
        let undirected = Edge::new("link", "d", "c", false);
        let mut entries = both_forms(&directed);
        entries.extend(both_forms(&undirected));
        let elements: Vec<Element> = retriever(entries, EdgeDedup::RowForm)
            .map(Result::unwrap)
            .collect();
        assert_eq!(elements.len(), 2);
    }

    #[test]
    fn predicate_filters_client_side() {
        let edge = Edge::new("link", "a", "b", true);
        let stream = retriever(both_forms(&edge), EdgeDedup::SeenSet).with_predicate(Box::new(
            |element: &Element| element.as_edge().is_some_and(|e| e.directed),
        ));
        assert_eq!(stream.count(), 1);

        let edge2 = Edge::new("link", "a", "b", true);
        let stream = retriever(both_forms(&edge2), EdgeDedup::SeenSet)
            .with_predicate(Box::new(|_: &Element| false));
        assert_eq!(stream.count(), 0);
    }

    #[test]
    fn close_is_idempotent() {
        let mut r = retriever(vec![], EdgeDedup::None);
        r.close();
        r.close();
        assert!(r.next().is_none());
    }
}
