//! The tablet-engine contract.
//!
//! The store talks to an ordered key-value engine through the traits here:
//! ranged scans with pluggable server-side iterators, a batch writer, and
//! per-cell visibility labels evaluated against the caller's authorizations.
//! Key packages and handlers never see past these traits; `rocks` supplies
//! the bundled in-process implementation.

pub mod flatkey;
pub mod iterators;
pub mod rocks;

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::error::StoreResult;

/// A stored key: four byte fields plus a timestamp.
///
/// Ordering is (row, column family, column qualifier, column visibility)
/// ascending, then timestamp descending, so the newest entry of an
/// aggregation key is seen first by scans.
///
/// The key packages give the fields their graph meaning:
///
/// | Field | Carries |
/// |-------|---------|
/// | `row` | escaped vertex bytes plus layout markers |
/// | `column_family` | the element's group name |
/// | `column_qualifier` | serialised group-by property values |
/// | `column_visibility` | the visibility label, if any |
/// | `timestamp` | element timestamp, or a coarsened clock |
///
/// # Example
/// ```rust
/// use tablet_graph_storage::TabletKey;
///
/// let newer = TabletKey::new(b"r".to_vec(), b"g".to_vec(), vec![], vec![], 200);
/// let older = TabletKey::new(b"r".to_vec(), b"g".to_vec(), vec![], vec![], 100);
///
/// // Same aggregation key; the newer entry sorts first.
/// assert!(newer.shares_aggregation_key(&older));
/// assert!(newer < older);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TabletKey {
    /// Row byte-string; lexicographic order on rows is what makes one range
    /// scan per seed vertex sufficient.
    pub row: Vec<u8>,
    /// Groups entries of one element group within a row.
    pub column_family: Vec<u8>,
    /// The serialised aggregation-key suffix: entries equal on
    /// `(row, column_family, column_qualifier, column_visibility)` merge
    /// into a single logical element.
    pub column_qualifier: Vec<u8>,
    /// Visibility label evaluated against the caller's [`Authorizations`];
    /// empty means visible to everyone.
    pub column_visibility: Vec<u8>,
    /// Milliseconds; not part of the aggregation key. Scans see higher
    /// timestamps first.
    pub timestamp: u64,
}

impl TabletKey {
    pub fn new(
        row: impl Into<Vec<u8>>,
        column_family: impl Into<Vec<u8>>,
        column_qualifier: impl Into<Vec<u8>>,
        column_visibility: impl Into<Vec<u8>>,
        timestamp: u64,
    ) -> Self {
        TabletKey {
            row: row.into(),
            column_family: column_family.into(),
            column_qualifier: column_qualifier.into(),
            column_visibility: column_visibility.into(),
            timestamp,
        }
    }

    /// Entries equal under this tuple aggregate to a single logical element.
    pub fn shares_aggregation_key(&self, other: &TabletKey) -> bool {
        self.row == other.row
            && self.column_family == other.column_family
            && self.column_qualifier == other.column_qualifier
            && self.column_visibility == other.column_visibility
    }
}

impl Ord for TabletKey {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.row
            .cmp(&other.row)
            .then_with(|| self.column_family.cmp(&other.column_family))
            .then_with(|| self.column_qualifier.cmp(&other.column_qualifier))
            .then_with(|| self.column_visibility.cmp(&other.column_visibility))
            .then_with(|| other.timestamp.cmp(&self.timestamp))
    }
}

impl PartialOrd for TabletKey {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/// Half-open `[start, end)` range over row byte-strings. An empty `end`
/// means "to the end of the table".
///
/// Range factories emit these sorted by start row; [`KeyRange::coalesce`]
/// merges overlapping or adjacent ranges without changing the covered set.
///
/// # Example
/// ```rust
/// use tablet_graph_storage::KeyRange;
///
/// let merged = KeyRange::coalesce(vec![
///     KeyRange::new(b"d".to_vec(), b"f".to_vec()),
///     KeyRange::new(b"a".to_vec(), b"c".to_vec()),
///     KeyRange::new(b"b".to_vec(), b"e".to_vec()),
/// ]);
/// assert_eq!(merged, vec![KeyRange::new(b"a".to_vec(), b"f".to_vec())]);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyRange {
    /// First row covered (inclusive).
    pub start: Vec<u8>,
    /// First row past the range (exclusive); empty for an unbounded tail.
    pub end: Vec<u8>,
}

impl KeyRange {
    pub fn new(start: impl Into<Vec<u8>>, end: impl Into<Vec<u8>>) -> Self {
        KeyRange {
            start: start.into(),
            end: end.into(),
        }
    }

    /// The whole table.
    pub fn unbounded() -> Self {
        KeyRange {
            start: Vec::new(),
            end: Vec::new(),
        }
    }

    pub fn contains(&self, row: &[u8]) -> bool {
        row >= self.start.as_slice() && (self.end.is_empty() || row < self.end.as_slice())
    }

    /// Whether `other` starts inside or immediately at the end of `self`,
    /// so the two can merge into one scan.
    pub fn touches(&self, other: &KeyRange) -> bool {
        self.end.is_empty() || other.start <= self.end
    }

    /// Sorts ranges by start row and merges overlapping or adjacent ones.
    /// Callers may hand the result to a scanner knowing the union of covered
    /// rows is unchanged.
    pub fn coalesce(mut ranges: Vec<KeyRange>) -> Vec<KeyRange> {
        ranges.sort_by(|a, b| a.start.cmp(&b.start));
        let mut merged: Vec<KeyRange> = Vec::with_capacity(ranges.len());
        for range in ranges {
            match merged.last_mut() {
                Some(last) if last.touches(&range) => {
                    // An unbounded tail already covers everything after it.
                    if !last.end.is_empty() {
                        if range.end.is_empty() {
                            last.end = Vec::new();
                        } else if range.end > last.end {
                            last.end = range.end;
                        }
                    }
                }
                _ => merged.push(range),
            }
        }
        merged
    }
}

/// A single put: one key and its value bytes.
///
/// Writers submit one mutation per stored key, so an edge becomes two
/// mutations sharing the same value.
#[derive(Debug, Clone, PartialEq)]
pub struct Mutation {
    /// The full stored key, including visibility and timestamp.
    pub key: TabletKey,
    /// Serialised non-group-by properties.
    pub value: Vec<u8>,
}

impl Mutation {
    pub fn put(key: TabletKey, value: Vec<u8>) -> Self {
        Mutation { key, value }
    }
}

/// Configuration for one server-side iterator: a registry name, a priority
/// fixing its place in the stack (lower runs closer to the data), and
/// string-keyed opaque options.
///
/// The engine only transports these; the iterator registry interprets the
/// options, typically one `conf` entry holding a version-tagged bincode
/// payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IteratorSetting {
    /// Registry name; unknown names fail scan construction.
    pub name: String,
    /// Stack position, lower applied first.
    pub priority: u32,
    /// Opaque configuration bytes keyed by option name.
    pub options: BTreeMap<String, Vec<u8>>,
}

impl IteratorSetting {
    pub fn new(name: impl Into<String>, priority: u32) -> Self {
        IteratorSetting {
            name: name.into(),
            priority,
            options: BTreeMap::new(),
        }
    }

    pub fn with_option(mut self, key: impl Into<String>, value: Vec<u8>) -> Self {
        self.options.insert(key.into(), value);
        self
    }

    pub fn option(&self, key: &str) -> Option<&[u8]> {
        self.options.get(key).map(Vec::as_slice)
    }
}

/// The labels a caller is allowed to read.
///
/// An empty visibility label is public; otherwise the label must be one of
/// the caller's authorizations. Label evaluation is the engine's job and is
/// trusted by everything above it.
///
/// # Example
/// ```rust
/// use tablet_graph_storage::Authorizations;
///
/// let auths = Authorizations::of(["secret"]);
/// assert!(auths.allows(b""));
/// assert!(auths.allows(b"secret"));
/// assert!(!auths.allows(b"top-secret"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Authorizations(BTreeSet<String>);

impl Authorizations {
    pub fn none() -> Self {
        Authorizations::default()
    }

    pub fn of<I: IntoIterator<Item = S>, S: Into<String>>(labels: I) -> Self {
        Authorizations(labels.into_iter().map(Into::into).collect())
    }

    pub fn allows(&self, visibility: &[u8]) -> bool {
        if visibility.is_empty() {
            return true;
        }
        match std::str::from_utf8(visibility) {
            Ok(label) => self.0.contains(label),
            Err(_) => false,
        }
    }
}

/// Table-creation settings derived from the key package and schema: the
/// persistent iterator stack and optional split points.
///
/// Persisted with the table and re-applied to every scan, so validation and
/// aggregation behave identically across connections.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TableConfig {
    /// Iterators applied to every scan of the table (validation,
    /// aggregation), kept with the table itself.
    pub iterators: Vec<IteratorSetting>,
    /// Row split hints for tablet balancing.
    pub splits: Vec<Vec<u8>>,
}

/// A lazy scan over the engine.
///
/// Entries arrive in tablet key order, already visibility-filtered and run
/// through the table- and scan-scoped iterator stacks. Every `next()` may
/// block on engine I/O; there is no cooperative suspension.
///
/// # Resource Handling
/// `close` must interrupt any in-progress fetch and release server-side
/// resources. It is idempotent, and dropping the scanner closes it too.
///
/// # Thread Safety
/// Scanners are owned by a single query and are `Send` so a retriever can
/// move between threads; they are not shared concurrently.
pub trait TabletScanner: Iterator<Item = StoreResult<(TabletKey, Vec<u8>)>> + Send {
    fn close(&mut self);
}

/// Batched mutation submission.
///
/// Mutation order within a batch is unspecified; writes to the same
/// aggregation key must commute under the declared aggregators.
///
/// # Errors
/// `add_mutation` distinguishes a rejected mutation
/// ([`crate::error::StoreError::MutationRejected`], per-mutation, callers
/// log and skip) from engine failures, which abort the write.
pub trait TabletWriter: Send {
    fn add_mutation(&mut self, mutation: Mutation) -> StoreResult<()>;

    /// Flushes outstanding batches. Idempotent.
    fn close(&mut self) -> StoreResult<()>;
}

/// A live connection to the tablet engine.
///
/// Created once per store instance and shared across queries; scanners and
/// writers opened from it are per-query and owned by their caller.
///
/// # Object Safety
/// The trait is object-safe: all methods take `&self` and return boxed
/// scanners and writers, so stores hold a `dyn TabletConnector` and tests
/// inject their own engines.
///
/// # Thread Safety
/// Implementors must be `Send + Sync`; the store clones one shared handle
/// out to concurrently executing operations.
pub trait TabletConnector: Send + Sync {
    /// Creates the table if needed and installs its persistent iterator
    /// stack and split hints.
    fn ensure_table(&self, table: &str, config: &TableConfig) -> StoreResult<()>;

    /// Opens a scanner over the given row ranges with the caller's
    /// authorizations and any additional scan-scoped iterators.
    ///
    /// # Errors
    /// Fails with `TableNotFound` for an unknown table and
    /// `IteratorConfig` errors when a scan iterator cannot be built.
    fn scanner(
        &self,
        table: &str,
        ranges: Vec<KeyRange>,
        authorizations: &Authorizations,
        scan_iterators: Vec<IteratorSetting>,
    ) -> StoreResult<Box<dyn TabletScanner>>;

    /// Opens a batch writer for the table.
    fn writer(&self, table: &str) -> StoreResult<Box<dyn TabletWriter>>;
}

/// A caller identity: the name the connector authenticated and the labels
/// its scans may read.
#[derive(Debug, Clone, Default)]
pub struct User {
    /// Authenticated user name.
    pub name: String,
    /// Visibility labels this caller's scans may read.
    pub authorizations: Authorizations,
}

impl User {
    pub fn new(name: impl Into<String>, authorizations: Authorizations) -> Self {
        User {
            name: name.into(),
            authorizations,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_ordering_puts_newest_first_within_aggregation_key() {
        let older = TabletKey::new(b"r".to_vec(), b"g".to_vec(), b"q".to_vec(), vec![], 100);
        let newer = TabletKey::new(b"r".to_vec(), b"g".to_vec(), b"q".to_vec(), vec![], 200);
        assert!(newer < older);
        assert!(newer.shares_aggregation_key(&older));
    }

    #[test]
    fn key_ordering_is_row_major() {
        let a = TabletKey::new(b"a".to_vec(), b"z".to_vec(), vec![], vec![], 0);
        let b = TabletKey::new(b"b".to_vec(), b"a".to_vec(), vec![], vec![], u64::MAX);
        assert!(a < b);
    }

    #[test]
    fn coalesce_merges_overlapping_ranges() {
        let merged = KeyRange::coalesce(vec![
            KeyRange::new(b"d".to_vec(), b"f".to_vec()),
            KeyRange::new(b"a".to_vec(), b"c".to_vec()),
            KeyRange::new(b"b".to_vec(), b"e".to_vec()),
        ]);
        assert_eq!(merged, vec![KeyRange::new(b"a".to_vec(), b"f".to_vec())]);
    }

    #[test]
    fn coalesce_keeps_disjoint_ranges_sorted() {
        let merged = KeyRange::coalesce(vec![
            KeyRange::new(b"x".to_vec(), b"y".to_vec()),
            KeyRange::new(b"a".to_vec(), b"b".to_vec()),
        ]);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].start, b"a");
    }

    #[test]
    fn authorizations_allow_empty_labels() {
        let auths = Authorizations::none();
        assert!(auths.allows(b""));
        assert!(!auths.allows(b"secret"));
        assert!(Authorizations::of(["secret"]).allows(b"secret"));
    }
}
