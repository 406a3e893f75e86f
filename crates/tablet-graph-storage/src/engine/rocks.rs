//! The bundled in-process tablet engine, backed by RocksDB.
//!
//! Each tablet table is one column family (`table/<name>`); table-scoped
//! iterator settings and split hints are persisted in a `system` column
//! family and re-applied to every scan. Scans fetch flat-encoded entries in
//! batches (the raw iterator lives only inside a batch fetch, so scanners
//! own nothing borrowed), evaluate visibility labels against the caller's
//! authorizations, and then run the configured iterator stack.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use rocksdb::{
    BlockBasedOptions, Cache, ColumnFamilyDescriptor, DBWithThreadMode, Direction, IteratorMode,
    MultiThreaded, Options, WriteBatch,
};
use tracing::{debug, info, warn};

use crate::error::{StoreError, StoreResult};

use super::iterators::{apply_stack, KvStream};
use super::{
    flatkey, Authorizations, IteratorSetting, KeyRange, Mutation, TableConfig, TabletConnector,
    TabletScanner, TabletWriter,
};

type Db = DBWithThreadMode<MultiThreaded>;

const SYSTEM_CF: &str = "system";
const TABLE_CF_PREFIX: &str = "table/";
const TABLE_CONFIG_PREFIX: &str = "table:";

/// Entries fetched from RocksDB per batch. Matches the batched RPC fetching
/// of a real tablet engine scanner.
const SCAN_BATCH_SIZE: usize = 1_000;

/// Mutations buffered before a flush.
const WRITE_BATCH_SIZE: usize = 1_000;

const BLOCK_CACHE_BYTES: usize = 64 * 1024 * 1024;

fn table_cf_name(table: &str) -> String {
    format!("{TABLE_CF_PREFIX}{table}")
}

/// Column family options for tablet tables: shared block cache, 10-bit
/// bloom filter, LZ4.
fn table_options(cache: &Cache) -> Options {
    let mut block_opts = BlockBasedOptions::default();
    block_opts.set_block_cache(cache);
    block_opts.set_bloom_filter(10.0, false);
    block_opts.set_cache_index_and_filter_blocks(true);

    let mut opts = Options::default();
    opts.set_block_based_table_factory(&block_opts);
    opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
    opts.set_memtable_prefix_bloom_ratio(0.1);
    opts.create_if_missing(true);
    opts
}

fn system_options() -> Options {
    let mut opts = Options::default();
    opts.set_compression_type(rocksdb::DBCompressionType::None);
    opts.create_if_missing(true);
    opts
}

struct Inner {
    db: Db,
    cache: Cache,
    path: String,
    /// Registered credentials. An empty registry accepts any caller, which
    /// keeps throwaway test instances ergonomic.
    users: RwLock<std::collections::BTreeMap<String, String>>,
    /// Write sequence appended (inverted) to every stored flat key, so two
    /// mutations carrying the same tablet key do not overwrite each other
    /// before the aggregation stack has a chance to fold them. Within equal
    /// timestamps the higher (newer) sequence sorts first.
    sequence: AtomicU64,
}

/// Trailing bytes each stored flat key carries for the write sequence.
const SEQUENCE_LEN: usize = 8;

fn with_sequence(mut flat: Vec<u8>, sequence: u64) -> Vec<u8> {
    flat.extend_from_slice(&(!sequence).to_be_bytes());
    flat
}

fn strip_sequence(flat: &[u8]) -> StoreResult<&[u8]> {
    if flat.len() < SEQUENCE_LEN {
        return Err(StoreError::engine("stored key shorter than its sequence"));
    }
    Ok(&flat[..flat.len() - SEQUENCE_LEN])
}

/// An in-process tablet engine instance.
#[derive(Clone)]
pub struct RocksTablet {
    inner: Arc<Inner>,
}

impl RocksTablet {
    /// Opens (or creates) an engine instance at the given directory.
    pub fn open<P: AsRef<Path>>(path: P) -> StoreResult<RocksTablet> {
        let path_str = path.as_ref().to_string_lossy().to_string();
        let cache = Cache::new_lru_cache(BLOCK_CACHE_BYTES);

        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);

        let existing = Db::list_cf(&Options::default(), &path_str).unwrap_or_default();
        let mut descriptors: Vec<ColumnFamilyDescriptor> = existing
            .iter()
            .filter(|name| name.as_str() != SYSTEM_CF)
            .map(|name| {
                if name.starts_with(TABLE_CF_PREFIX) {
                    ColumnFamilyDescriptor::new(name, table_options(&cache))
                } else {
                    ColumnFamilyDescriptor::new(name, Options::default())
                }
            })
            .collect();
        descriptors.push(ColumnFamilyDescriptor::new(SYSTEM_CF, system_options()));

        let db = Db::open_cf_descriptors(&db_opts, &path_str, descriptors)
            .map_err(|e| StoreError::connection(format!("{path_str}: {e}")))?;
        info!(path = %path_str, "opened tablet engine");

        Ok(RocksTablet {
            inner: Arc::new(Inner {
                db,
                cache,
                path: path_str,
                users: RwLock::new(Default::default()),
                // Seeded from the clock so sequences stay monotonic across
                // reopens of the same instance.
                sequence: AtomicU64::new(
                    chrono::Utc::now().timestamp_nanos_opt().unwrap_or(0).max(0) as u64,
                ),
            }),
        })
    }

    pub fn path(&self) -> &str {
        &self.inner.path
    }

    /// Registers a user. Once any user is registered, connectors require
    /// matching credentials.
    pub fn register_user(&self, name: impl Into<String>, password: impl Into<String>) {
        self.inner.users.write().insert(name.into(), password.into());
    }

    /// Authenticates and returns a connector bound to this instance.
    pub fn connector(&self, user: &str, password: &str) -> StoreResult<RocksConnector> {
        let users = self.inner.users.read();
        if !users.is_empty() && users.get(user).map(String::as_str) != Some(password) {
            return Err(StoreError::Authentication {
                user: user.to_string(),
            });
        }
        Ok(RocksConnector {
            inner: Arc::clone(&self.inner),
        })
    }
}

/// A live, authenticated handle to a [`RocksTablet`].
#[derive(Clone)]
pub struct RocksConnector {
    inner: Arc<Inner>,
}

impl Inner {
    fn table_config(&self, table: &str) -> StoreResult<TableConfig> {
        let cf = self
            .db
            .cf_handle(SYSTEM_CF)
            .ok_or_else(|| StoreError::engine("system column family missing"))?;
        let key = format!("{TABLE_CONFIG_PREFIX}{table}");
        let bytes = self
            .db
            .get_cf(&cf, key.as_bytes())
            .map_err(|e| StoreError::engine(e.to_string()))?
            .ok_or_else(|| StoreError::TableNotFound {
                table: table.to_string(),
            })?;
        bincode::deserialize(&bytes)
            .map_err(|e| StoreError::engine(format!("corrupt table config: {e}")))
    }
}

impl TabletConnector for RocksConnector {
    fn ensure_table(&self, table: &str, config: &TableConfig) -> StoreResult<()> {
        let cf_name = table_cf_name(table);
        if self.inner.db.cf_handle(&cf_name).is_none() {
            self.inner
                .db
                .create_cf(&cf_name, &table_options(&self.inner.cache))
                .map_err(|e| StoreError::engine(e.to_string()))?;
            info!(table, "created tablet table");
        }
        let system = self
            .inner
            .db
            .cf_handle(SYSTEM_CF)
            .ok_or_else(|| StoreError::engine("system column family missing"))?;
        let key = format!("{TABLE_CONFIG_PREFIX}{table}");
        let bytes = bincode::serialize(config)
            .map_err(|e| StoreError::engine(format!("table config: {e}")))?;
        self.inner
            .db
            .put_cf(&system, key.as_bytes(), bytes)
            .map_err(|e| StoreError::engine(e.to_string()))?;
        Ok(())
    }

    fn scanner(
        &self,
        table: &str,
        ranges: Vec<KeyRange>,
        authorizations: &Authorizations,
        scan_iterators: Vec<IteratorSetting>,
    ) -> StoreResult<Box<dyn TabletScanner>> {
        let table_config = self.inner.table_config(table)?;
        let cf_name = table_cf_name(table);
        if self.inner.db.cf_handle(&cf_name).is_none() {
            return Err(StoreError::TableNotFound {
                table: table.to_string(),
            });
        }

        let ranges = KeyRange::coalesce(ranges);
        debug!(table, ranges = ranges.len(), "opening scanner");
        let raw = ChunkedScan::new(
            Arc::clone(&self.inner),
            cf_name,
            ranges,
            authorizations.clone(),
        );

        let mut settings = table_config.iterators;
        settings.extend(scan_iterators);
        let stream = apply_stack(Box::new(raw), &settings)?;
        Ok(Box::new(RocksScanner {
            stream: Some(stream),
        }))
    }

    fn writer(&self, table: &str) -> StoreResult<Box<dyn TabletWriter>> {
        let cf_name = table_cf_name(table);
        if self.inner.db.cf_handle(&cf_name).is_none() {
            return Err(StoreError::TableNotFound {
                table: table.to_string(),
            });
        }
        Ok(Box::new(RocksWriter {
            inner: Arc::clone(&self.inner),
            cf_name,
            batch: WriteBatch::default(),
            pending: 0,
            closed: false,
        }))
    }
}

/// Raw scan over the flat keyspace, fetched in batches so nothing borrows
/// the database across `next()` calls. Visibility labels are evaluated
/// here, below every configured iterator.
struct ChunkedScan {
    inner: Arc<Inner>,
    cf_name: String,
    ranges: Vec<KeyRange>,
    authorizations: Authorizations,
    range_index: usize,
    /// Flat key to resume strictly after within the current range.
    resume_after: Option<Vec<u8>>,
    buffer: VecDeque<(super::TabletKey, Vec<u8>)>,
    failed: bool,
}

impl ChunkedScan {
    fn new(
        inner: Arc<Inner>,
        cf_name: String,
        ranges: Vec<KeyRange>,
        authorizations: Authorizations,
    ) -> Self {
        ChunkedScan {
            inner,
            cf_name,
            ranges,
            authorizations,
            range_index: 0,
            resume_after: None,
            buffer: VecDeque::new(),
            failed: false,
        }
    }

    fn fetch_batch(&mut self) -> StoreResult<()> {
        // Hold our own handle on the engine so the column family borrow does
        // not pin `self` while the buffer is filled.
        let inner = Arc::clone(&self.inner);
        let cf = inner
            .db
            .cf_handle(&self.cf_name)
            .ok_or_else(|| StoreError::engine("table column family vanished"))?;

        while self.buffer.is_empty() && self.range_index < self.ranges.len() {
            let range = &self.ranges[self.range_index];
            let (range_lower, range_upper) = flatkey::flat_range_bounds(range);
            let seek = match &self.resume_after {
                Some(last) => {
                    let mut next = last.clone();
                    next.push(0x00);
                    next
                }
                None => range_lower,
            };

            let iter = inner
                .db
                .iterator_cf(&cf, IteratorMode::From(seek.as_slice(), Direction::Forward));
            let mut exhausted = true;
            for entry in iter {
                let (flat, value) =
                    entry.map_err(|e| StoreError::scan(e.to_string()))?;
                if !range_upper.is_empty() && flat.as_ref() >= range_upper.as_slice() {
                    break;
                }
                self.resume_after = Some(flat.to_vec());
                let key = flatkey::decode_flat_key(strip_sequence(&flat)?)?;
                if self.authorizations.allows(&key.column_visibility) {
                    self.buffer.push_back((key, value.to_vec()));
                }
                if self.buffer.len() >= SCAN_BATCH_SIZE {
                    exhausted = false;
                    break;
                }
            }
            if exhausted {
                self.range_index += 1;
                self.resume_after = None;
            }
        }
        Ok(())
    }
}

impl Iterator for ChunkedScan {
    type Item = StoreResult<(super::TabletKey, Vec<u8>)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        if self.buffer.is_empty() {
            if let Err(e) = self.fetch_batch() {
                self.failed = true;
                return Some(Err(e));
            }
        }
        self.buffer.pop_front().map(Ok)
    }
}

/// The composed scan handed back to retrievers.
struct RocksScanner {
    stream: Option<KvStream>,
}

impl Iterator for RocksScanner {
    type Item = StoreResult<(super::TabletKey, Vec<u8>)>;

    fn next(&mut self) -> Option<Self::Item> {
        self.stream.as_mut()?.next()
    }
}

impl TabletScanner for RocksScanner {
    fn close(&mut self) {
        self.stream = None;
    }
}

/// Batched writer over one table's column family.
struct RocksWriter {
    inner: Arc<Inner>,
    cf_name: String,
    batch: WriteBatch,
    pending: usize,
    closed: bool,
}

impl RocksWriter {
    fn flush(&mut self) -> StoreResult<()> {
        if self.pending == 0 {
            return Ok(());
        }
        let batch = std::mem::take(&mut self.batch);
        self.pending = 0;
        self.inner
            .db
            .write(batch)
            .map_err(|e| StoreError::engine(e.to_string()))
    }
}

impl TabletWriter for RocksWriter {
    fn add_mutation(&mut self, mutation: Mutation) -> StoreResult<()> {
        if mutation.key.row.is_empty() {
            return Err(StoreError::MutationRejected {
                detail: "empty row".to_string(),
            });
        }
        let inner = Arc::clone(&self.inner);
        let cf = inner
            .db
            .cf_handle(&self.cf_name)
            .ok_or_else(|| StoreError::engine("table column family vanished"))?;
        let sequence = inner.sequence.fetch_add(1, Ordering::Relaxed);
        self.batch.put_cf(
            &cf,
            with_sequence(flatkey::encode_flat_key(&mutation.key), sequence),
            mutation.value,
        );
        self.pending += 1;
        if self.pending >= WRITE_BATCH_SIZE {
            self.flush()?;
        }
        Ok(())
    }

    fn close(&mut self) -> StoreResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.flush()
    }
}

impl Drop for RocksWriter {
    fn drop(&mut self) {
        if !self.closed {
            if let Err(e) = self.flush() {
                warn!(error = %e, "tablet writer dropped with unflushed mutations");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    use crate::engine::TabletKey;

    fn open() -> (TempDir, RocksConnector) {
        let tmp = TempDir::new().expect("temp dir");
        let tablet = RocksTablet::open(tmp.path()).expect("open engine");
        let connector = tablet.connector("root", "").expect("connector");
        (tmp, connector)
    }

    fn key(row: &[u8], ts: u64) -> TabletKey {
        TabletKey::new(row.to_vec(), b"g".to_vec(), vec![], vec![], ts)
    }

    fn visible_key(row: &[u8], vis: &[u8]) -> TabletKey {
        TabletKey::new(row.to_vec(), b"g".to_vec(), vec![], vis.to_vec(), 1)
    }

    fn scan_all(connector: &RocksConnector, auths: &Authorizations) -> Vec<(TabletKey, Vec<u8>)> {
        connector
            .scanner("t", vec![KeyRange::unbounded()], auths, vec![])
            .expect("scanner")
            .map(Result::unwrap)
            .collect()
    }

    #[test]
    fn write_then_scan_in_key_order() {
        let (_tmp, connector) = open();
        connector.ensure_table("t", &TableConfig::default()).unwrap();

        let mut writer = connector.writer("t").unwrap();
        for row in [b"b".as_slice(), b"a", b"c"] {
            writer
                .add_mutation(Mutation::put(key(row, 1), row.to_vec()))
                .unwrap();
        }
        writer.close().unwrap();

        let rows: Vec<Vec<u8>> = scan_all(&connector, &Authorizations::none())
            .into_iter()
            .map(|(k, _)| k.row)
            .collect();
        assert_eq!(rows, vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec()]);
    }

    #[test]
    fn range_scan_is_bounded() {
        let (_tmp, connector) = open();
        connector.ensure_table("t", &TableConfig::default()).unwrap();
        let mut writer = connector.writer("t").unwrap();
        for row in [b"a".as_slice(), b"b", b"c", b"d"] {
            writer
                .add_mutation(Mutation::put(key(row, 1), vec![]))
                .unwrap();
        }
        writer.close().unwrap();

        let got: Vec<Vec<u8>> = connector
            .scanner(
                "t",
                vec![KeyRange::new(b"b".to_vec(), b"d".to_vec())],
                &Authorizations::none(),
                vec![],
            )
            .unwrap()
            .map(|r| r.unwrap().0.row)
            .collect();
        assert_eq!(got, vec![b"b".to_vec(), b"c".to_vec()]);
    }

    #[test]
    fn visibility_labels_are_enforced() {
        let (_tmp, connector) = open();
        connector.ensure_table("t", &TableConfig::default()).unwrap();
        let mut writer = connector.writer("t").unwrap();
        writer
            .add_mutation(Mutation::put(visible_key(b"open", b""), vec![]))
            .unwrap();
        writer
            .add_mutation(Mutation::put(visible_key(b"sealed", b"secret"), vec![]))
            .unwrap();
        writer.close().unwrap();

        let public = scan_all(&connector, &Authorizations::none());
        assert_eq!(public.len(), 1);
        assert_eq!(public[0].0.row, b"open");

        let cleared = scan_all(&connector, &Authorizations::of(["secret"]));
        assert_eq!(cleared.len(), 2);
    }

    #[test]
    fn scanning_a_missing_table_fails() {
        let (_tmp, connector) = open();
        let err = connector
            .scanner("missing", vec![], &Authorizations::none(), vec![])
            .err()
            .expect("missing table");
        assert!(matches!(err, StoreError::TableNotFound { .. }));
    }

    #[test]
    fn authentication_is_checked_once_users_exist() {
        let tmp = TempDir::new().unwrap();
        let tablet = RocksTablet::open(tmp.path()).unwrap();
        tablet.register_user("alice", "hunter2");
        assert!(tablet.connector("alice", "hunter2").is_ok());
        assert!(matches!(
            tablet.connector("alice", "wrong"),
            Err(StoreError::Authentication { .. })
        ));
        assert!(matches!(
            tablet.connector("bob", ""),
            Err(StoreError::Authentication { .. })
        ));
    }

    #[test]
    fn duplicate_aggregation_keys_return_newest_first() {
        let (_tmp, connector) = open();
        connector.ensure_table("t", &TableConfig::default()).unwrap();
        let mut writer = connector.writer("t").unwrap();
        writer
            .add_mutation(Mutation::put(key(b"r", 100), b"old".to_vec()))
            .unwrap();
        writer
            .add_mutation(Mutation::put(key(b"r", 200), b"new".to_vec()))
            .unwrap();
        writer.close().unwrap();

        let all = scan_all(&connector, &Authorizations::none());
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].1, b"new");
        assert_eq!(all[1].1, b"old");
    }
}
