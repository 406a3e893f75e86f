//! Tablet Graph storage layer.
//!
//! Stores a property graph on an ordered key-value engine ("the tablet
//! engine") with server-side iterators. The two load-bearing pieces are the
//! element⇄key codec (`keypackage`), where every edge is written under both of
//! its endpoints so one range scan per seed vertex finds everything
//! touching it, and the query pipeline (`engine::iterators`, `retriever`,
//! `handler`) that turns a declarative view into an ordered iterator stack
//! plus client-side range construction.
//!
//! # Architecture
//! - `engine`: the tablet-engine contract, plus the bundled RocksDB-backed
//!   implementation and the server-side iterator registry
//! - `keypackage`: the interchangeable on-disk layouts (byte-entity,
//!   classic): codec, range factory, iterator-settings factory, key functor
//! - `retriever`: lazy element streams with edge de-duplication
//! - `handler`: one handler per operation kind
//! - `writer`: batched ingest with per-element failure isolation
//! - `store`: the façade tying it all together
//! - `config`: layered store configuration

pub mod config;
pub mod engine;
pub mod error;
pub mod handler;
pub mod keypackage;
pub mod retriever;
pub mod store;
pub mod writer;

pub use config::StoreConfig;
pub use engine::rocks::{RocksConnector, RocksTablet};
pub use engine::{
    Authorizations, IteratorSetting, KeyRange, Mutation, TableConfig, TabletConnector, TabletKey,
    TabletScanner, TabletWriter, User,
};
pub use error::{CodecError, ConfigError, IteratorConfigError, StoreError, StoreResult};
pub use handler::OperationOutput;
pub use keypackage::{ElementConverter, KeyFunctor, KeyPackage, LayoutKind, RangeFactory};
pub use retriever::{AdjacentSeedStream, EdgeDedup, ElementRetriever};
pub use store::{StoreTrait, TabletGraphStore};
pub use writer::AddElementsReport;
