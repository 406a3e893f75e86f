//! The store façade: initialisation, operation execution and chains.
//!
//! Any edge a caller inserts is written twice, once with each endpoint
//! leading the row, so a single range scan per seed vertex recovers every
//! element touching it. The store wires schema, key package and connector
//! together and dispatches declarative operations to their handlers.

use std::collections::BTreeSet;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::info;

use tablet_graph_core::operation::chain::OperationChain;
use tablet_graph_core::operation::{
    AddElements, GetAdjacentEntitySeeds, GetAllElements, GetElements, GetElementsBetweenSets,
    GetElementsInRanges, GetElementsWithinSet, GraphOperation, SummariseGroupOverRanges,
};
use tablet_graph_core::schema::Schema;
use tablet_graph_core::types::{Element, ElementSeed};
use tablet_graph_core::error::OperationError;

use crate::config::StoreConfig;
use crate::engine::rocks::RocksTablet;
use crate::engine::{TabletConnector, User};
use crate::error::StoreResult;
use crate::handler::{self, HandlerContext, OperationOutput};
use crate::keypackage::KeyPackage;
use crate::retriever::{AdjacentSeedStream, ElementRetriever};
use crate::writer::AddElementsReport;

/// Capabilities this store advertises. The table-scoped iterator stack is
/// derived from these at table-creation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum StoreTrait {
    Aggregation,
    PreAggregationFiltering,
    PostAggregationFiltering,
    PostTransformationFiltering,
    Transformation,
    StoreValidation,
    Ordered,
    Visibility,
}

fn all_traits() -> BTreeSet<StoreTrait> {
    BTreeSet::from([
        StoreTrait::Aggregation,
        StoreTrait::PreAggregationFiltering,
        StoreTrait::PostAggregationFiltering,
        StoreTrait::PostTransformationFiltering,
        StoreTrait::Transformation,
        StoreTrait::StoreValidation,
        StoreTrait::Ordered,
        StoreTrait::Visibility,
    ])
}

type ConnectorFactory =
    Box<dyn Fn(&StoreConfig) -> StoreResult<Arc<dyn TabletConnector>> + Send + Sync>;

/// A property-graph store over one tablet-engine table.
///
/// # Architecture
/// Every read follows the same pipeline; writes short-circuit through the
/// codec into the batch writer:
///
/// ```text
///            ┌─► RangeFactory ──► row ranges ─────────┐
/// operation ─┤                                        ├─► scanner ─► retriever ─► elements
///            └─► IteratorSettingsFactory ─► iterator stack ─┘
///
/// elements ──► ElementConverter ──► mutations ──► batch writer
/// ```
///
/// # Thread Safety
/// The store is `Send + Sync`: schema and key package are immutable after
/// initialisation and the connector handle is shared behind a mutex-guarded
/// lazy cell. Queries run on the caller's thread; parallelism comes from
/// issuing independent operations.
///
/// # Example
/// ```rust
/// use tablet_graph_core::aggregation::Aggregator;
/// use tablet_graph_core::operation::{AddElements, GetElements};
/// use tablet_graph_core::schema::{EdgeDefinition, PropertyDefinition, Schema};
/// use tablet_graph_core::serialisation::TypeSerialiser;
/// use tablet_graph_core::types::{Edge, ElementSeed};
/// use tablet_graph_storage::{Authorizations, StoreConfig, TabletGraphStore, User};
///
/// let tmp = tempfile::TempDir::new().unwrap();
/// let schema = Schema::builder()
///     .edge(
///         "link",
///         EdgeDefinition::new(TypeSerialiser::Utf8String, TypeSerialiser::Utf8String)
///             .with_property(PropertyDefinition::new(
///                 "count",
///                 TypeSerialiser::OrderedInt,
///                 Aggregator::Sum,
///             )),
///     )
///     .build()
///     .unwrap();
/// let config = StoreConfig::for_table("graph").with_data_dir(tmp.path());
/// let store = TabletGraphStore::initialise(schema, config).unwrap();
/// let user = User::new("root", Authorizations::none());
///
/// let edge = Edge::new("link", "a", "b", true).with_property("count", 1i64);
/// let report = store
///     .add_elements(&AddElements::new([edge.into()]), &user)
///     .unwrap();
/// assert_eq!(report.written, 1);
///
/// let found: Vec<_> = store
///     .get_elements(&GetElements::new([ElementSeed::entity("a")]), &user)
///     .unwrap()
///     .collect::<Result<_, _>>()
///     .unwrap();
/// assert_eq!(found.len(), 1);
/// ```
pub struct TabletGraphStore {
    schema: Arc<Schema>,
    config: StoreConfig,
    key_package: KeyPackage,
    traits: BTreeSet<StoreTrait>,
    factory: ConnectorFactory,
    /// Created on first use, shared for the store's lifetime.
    connection: Mutex<Option<Arc<dyn TabletConnector>>>,
}

impl TabletGraphStore {
    /// Initialises a store over the bundled engine: validates schema and
    /// configuration, resolves the key package, connects and ensures the
    /// table exists with its permanent iterator stack.
    ///
    /// # Errors
    /// - `Config` for missing fields or an unknown key-package identifier
    /// - `Schema` for an internally inconsistent schema
    /// - `Connection` / `Authentication` when the engine cannot be reached
    ///
    /// All of these are fatal; no partially initialised store is returned.
    pub fn initialise(schema: Schema, config: StoreConfig) -> StoreResult<TabletGraphStore> {
        Self::with_connector_factory(
            schema,
            config,
            Box::new(|config: &StoreConfig| {
                let dir = config.data_dir.join(&config.instance);
                let tablet = RocksTablet::open(dir)?;
                let connector = tablet.connector(&config.user, &config.password)?;
                Ok(Arc::new(connector) as Arc<dyn TabletConnector>)
            }),
        )
    }

    /// Initialises a store over an already-connected engine. Used by tests
    /// and embedders that share one engine instance.
    pub fn with_connector(
        schema: Schema,
        config: StoreConfig,
        connector: Arc<dyn TabletConnector>,
    ) -> StoreResult<TabletGraphStore> {
        Self::with_connector_factory(
            schema,
            config,
            Box::new(move |_: &StoreConfig| Ok(Arc::clone(&connector))),
        )
    }

    fn with_connector_factory(
        schema: Schema,
        config: StoreConfig,
        factory: ConnectorFactory,
    ) -> StoreResult<TabletGraphStore> {
        config.validate()?;
        schema.validate()?;
        let schema = Arc::new(schema);
        let key_package = KeyPackage::create(&config.key_package, Arc::clone(&schema))?;

        let store = TabletGraphStore {
            schema,
            config,
            key_package,
            traits: all_traits(),
            factory,
            connection: Mutex::new(None),
        };

        let table_config = store.key_package.iterator_settings().table_config(
            store.traits.contains(&StoreTrait::StoreValidation),
            store.traits.contains(&StoreTrait::Aggregation),
        )?;
        store
            .connection()?
            .ensure_table(&store.config.table, &table_config)?;
        info!(
            table = %store.config.table,
            key_package = store.key_package.layout().id(),
            "store initialised"
        );
        Ok(store)
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn key_package(&self) -> &KeyPackage {
        &self.key_package
    }

    pub fn traits(&self) -> &BTreeSet<StoreTrait> {
        &self.traits
    }

    fn connection(&self) -> StoreResult<Arc<dyn TabletConnector>> {
        let mut guard = self.connection.lock();
        if let Some(connection) = guard.as_ref() {
            return Ok(Arc::clone(connection));
        }
        let connection = (self.factory)(&self.config)?;
        *guard = Some(Arc::clone(&connection));
        Ok(connection)
    }

    fn with_context<T>(
        &self,
        user: &User,
        f: impl FnOnce(&HandlerContext<'_>) -> StoreResult<T>,
    ) -> StoreResult<T> {
        let connection = self.connection()?;
        let ctx = HandlerContext {
            connector: connection.as_ref(),
            table: &self.config.table,
            schema: &self.schema,
            key_package: &self.key_package,
            user,
        };
        f(&ctx)
    }

    /// Dispatches one operation to its handler.
    ///
    /// Validation (view against schema, iterator configuration) happens
    /// before any scanner opens; read operations return lazily, so engine
    /// errors during iteration surface from the returned stream instead.
    ///
    /// # Example
    /// ```rust
    /// use tablet_graph_core::operation::{GetAllElements, GraphOperation};
    /// use tablet_graph_core::schema::{EntityDefinition, Schema};
    /// use tablet_graph_core::serialisation::TypeSerialiser;
    /// use tablet_graph_storage::{
    ///     Authorizations, OperationOutput, StoreConfig, TabletGraphStore, User,
    /// };
    ///
    /// let tmp = tempfile::TempDir::new().unwrap();
    /// let schema = Schema::builder()
    ///     .entity("page", EntityDefinition::new(TypeSerialiser::Utf8String))
    ///     .build()
    ///     .unwrap();
    /// let config = StoreConfig::for_table("graph").with_data_dir(tmp.path());
    /// let store = TabletGraphStore::initialise(schema, config).unwrap();
    ///
    /// let user = User::new("root", Authorizations::none());
    /// let output = store
    ///     .execute(&GraphOperation::GetAllElements(GetAllElements::new()), &user)
    ///     .unwrap();
    /// assert!(matches!(output, OperationOutput::Elements(_)));
    /// ```
    pub fn execute(&self, operation: &GraphOperation, user: &User) -> StoreResult<OperationOutput> {
        self.with_context(user, |ctx| handler::handle(ctx, operation))
    }

    // Typed conveniences mirroring the handler set.

    pub fn get_elements(&self, op: &GetElements, user: &User) -> StoreResult<ElementRetriever> {
        self.with_context(user, |ctx| handler::get_elements(ctx, op))
    }

    pub fn get_all_elements(
        &self,
        op: &GetAllElements,
        user: &User,
    ) -> StoreResult<ElementRetriever> {
        self.with_context(user, |ctx| handler::get_all_elements(ctx, op))
    }

    pub fn get_adjacent_entity_seeds(
        &self,
        op: &GetAdjacentEntitySeeds,
        user: &User,
    ) -> StoreResult<AdjacentSeedStream> {
        self.with_context(user, |ctx| handler::get_adjacent_entity_seeds(ctx, op))
    }

    pub fn get_elements_within_set(
        &self,
        op: &GetElementsWithinSet,
        user: &User,
    ) -> StoreResult<ElementRetriever> {
        self.with_context(user, |ctx| handler::get_elements_within_set(ctx, op))
    }

    pub fn get_elements_between_sets(
        &self,
        op: &GetElementsBetweenSets,
        user: &User,
    ) -> StoreResult<ElementRetriever> {
        self.with_context(user, |ctx| handler::get_elements_between_sets(ctx, op))
    }

    pub fn get_elements_in_ranges(
        &self,
        op: &GetElementsInRanges,
        user: &User,
    ) -> StoreResult<ElementRetriever> {
        self.with_context(user, |ctx| handler::get_elements_in_ranges(ctx, op))
    }

    pub fn summarise_group_over_ranges(
        &self,
        op: &SummariseGroupOverRanges,
        user: &User,
    ) -> StoreResult<ElementRetriever> {
        self.with_context(user, |ctx| handler::summarise_group_over_ranges(ctx, op))
    }

    pub fn add_elements(&self, op: &AddElements, user: &User) -> StoreResult<AddElementsReport> {
        self.with_context(user, |ctx| handler::add_elements(ctx, op))
    }

    /// Runs a chain, feeding each step's output into the next. Aborts at
    /// the first failure; dropping the intermediate streams releases their
    /// scanners. The unreachable-wiring arm backs the builder's compile-time
    /// guarantee for chains that arrive untyped from JSON.
    pub fn execute_chain<Out>(
        &self,
        chain: &OperationChain<Out>,
        user: &User,
    ) -> StoreResult<OperationOutput> {
        chain.validate_wiring()?;
        let mut current: Option<OperationOutput> = None;
        for (position, operation) in chain.operations.iter().enumerate() {
            current = Some(match current.take() {
                None => self.execute(operation, user)?,
                Some(OperationOutput::Seeds(seeds)) => {
                    let seeds: Vec<_> = seeds.collect::<StoreResult<_>>()?;
                    match operation {
                        GraphOperation::GetElements(op) => {
                            let mut op = op.clone();
                            op.seeds = seeds.into_iter().map(ElementSeed::Entity).collect();
                            self.execute(&GraphOperation::GetElements(op), user)?
                        }
                        GraphOperation::GetAdjacentEntitySeeds(op) => {
                            let mut op = op.clone();
                            op.seeds = seeds;
                            self.execute(&GraphOperation::GetAdjacentEntitySeeds(op), user)?
                        }
                        GraphOperation::GetElementsWithinSet(op) => {
                            let mut op = op.clone();
                            op.seeds = seeds;
                            self.execute(&GraphOperation::GetElementsWithinSet(op), user)?
                        }
                        GraphOperation::GetElementsBetweenSets(op) => {
                            let mut op = op.clone();
                            op.seeds = seeds;
                            self.execute(&GraphOperation::GetElementsBetweenSets(op), user)?
                        }
                        other => {
                            return Err(OperationError::ChainTypeMismatch {
                                position,
                                expected: other.input_kind().name(),
                                actual: "entity seeds",
                            }
                            .into())
                        }
                    }
                }
                Some(OperationOutput::Elements(elements)) => match operation {
                    GraphOperation::AddElements(_) => {
                        let elements: Vec<Element> = elements.collect::<StoreResult<_>>()?;
                        self.execute(
                            &GraphOperation::AddElements(AddElements::new(elements)),
                            user,
                        )?
                    }
                    other => {
                        return Err(OperationError::ChainTypeMismatch {
                            position,
                            expected: other.input_kind().name(),
                            actual: "elements",
                        }
                        .into())
                    }
                },
                Some(OperationOutput::Report(_)) => {
                    return Err(OperationError::ChainTypeMismatch {
                        position,
                        expected: operation.input_kind().name(),
                        actual: "an ingest report",
                    }
                    .into())
                }
            });
        }
        current.ok_or_else(|| OperationError::EmptyChain.into())
    }
}
