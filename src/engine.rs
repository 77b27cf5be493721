//! The DAO engine façade.
//!
//! [`DaoRegistry`] holds everything declarative: entity descriptors, the
//! naming policy and parameter style, CRUD statement shapes resolved at
//! registration time, compiled SQL templates and named join declarations.
//! [`DaoEngine`] executes against that registry: CRUD and batch variants,
//! lookups, listing, paging, streaming, template operations, join-entity
//! loading and transaction participation.
//!
//! Every call that can run inside a transaction takes an explicit
//! `Option<&mut TransactionContext>`; `None` means connection-per-call
//! autocommit. There is no ambient transaction state.

use crate::cache::EntityCache;
use crate::condition::{Col, ConditionNode, Criteria};
use crate::config::EngineConfig;
use crate::connection::{Connection, ConnectionProvider, Row};
use crate::descriptor::{DescriptorRegistry, Record};
use crate::error::GantryError;
use crate::executor::{
    resolve, BatchReport, ChunkPolicy, NoParams, QueryExecutor, RecordStream,
};
use crate::naming::NamingPolicy;
use crate::relation::{Cardinality, JoinSpec, JoinTarget};
use crate::sql::{ParameterStyle, SqlBuilder, SqlTemplate, StatementPlan};
use crate::transaction::{IsolationLevel, Propagation, TransactionContext};
use crate::value::{Value, ValueTuple};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// CRUD statement shapes resolved once at registration.
#[derive(Debug)]
struct ResolvedCrud {
    insert: Option<StatementPlan>,
    update_by_id: Option<StatementPlan>,
    delete_by_id: Option<StatementPlan>,
    select_by_id: Option<StatementPlan>,
}

/// Declarative operation registry handed to the engine at construction.
///
/// Registration resolves each entity's CRUD shapes into concrete statement
/// plans and compiles each template, so malformed declarations fail at
/// startup rather than on first use.
pub struct DaoRegistry {
    naming: NamingPolicy,
    style: ParameterStyle,
    descriptors: DescriptorRegistry,
    crud: HashMap<String, ResolvedCrud>,
    templates: HashMap<String, SqlTemplate>,
    joins: HashMap<String, JoinSpec>,
}

impl DaoRegistry {
    pub fn new(naming: NamingPolicy, style: ParameterStyle) -> Self {
        Self {
            naming,
            style,
            descriptors: DescriptorRegistry::new(),
            crud: HashMap::new(),
            templates: HashMap::new(),
            joins: HashMap::new(),
        }
    }

    pub fn naming(&self) -> NamingPolicy {
        self.naming
    }

    pub fn style(&self) -> ParameterStyle {
        self.style
    }

    /// Register an entity and resolve its generated CRUD shapes.
    ///
    /// Entities without an id column get no by-id shapes; entities with no
    /// insertable or updatable columns skip the corresponding shape.
    pub fn register_entity<R: Record>(&mut self) -> Result<(), GantryError> {
        let descriptor = R::descriptor();
        self.descriptors.register(descriptor)?;
        let builder = SqlBuilder::new(self.naming, self.style);

        let has_id = !descriptor.id_columns().is_empty();
        let insert = (!descriptor.insert_columns().is_empty())
            .then(|| builder.insert_plan(descriptor))
            .transpose()?;
        let update_by_id = (has_id && !descriptor.update_columns().is_empty())
            .then(|| builder.update_by_id_plan(descriptor))
            .transpose()?;
        let delete_by_id = has_id
            .then(|| builder.delete_by_id_plan(descriptor))
            .transpose()?;
        let select_by_id = has_id
            .then(|| builder.select_by_id_plan(descriptor))
            .transpose()?;

        log::info!("registered entity `{}`", descriptor.entity());
        self.crud.insert(
            descriptor.entity().to_string(),
            ResolvedCrud {
                insert,
                update_by_id,
                delete_by_id,
                select_by_id,
            },
        );
        Ok(())
    }

    /// Register a literal SQL template operation. The template is compiled
    /// and validated here, not at call time.
    pub fn register_template(
        &mut self,
        name: impl Into<String>,
        sql: &str,
    ) -> Result<(), GantryError> {
        let name = name.into();
        if self.templates.contains_key(&name) {
            return Err(GantryError::Configuration(format!(
                "template `{name}` is already registered"
            )));
        }
        let template = SqlTemplate::compile(name.clone(), sql)?;
        self.templates.insert(name, template);
        Ok(())
    }

    /// Register a named join declaration.
    pub fn register_join(
        &mut self,
        name: impl Into<String>,
        spec: JoinSpec,
    ) -> Result<(), GantryError> {
        let name = name.into();
        if self.joins.contains_key(&name) {
            return Err(GantryError::Configuration(format!(
                "join `{name}` is already registered"
            )));
        }
        self.joins.insert(name, spec);
        Ok(())
    }

    pub fn template(&self, name: &str) -> Result<&SqlTemplate, GantryError> {
        self.templates.get(name).ok_or_else(|| {
            GantryError::Configuration(format!("template `{name}` is not registered"))
        })
    }

    pub fn join(&self, name: &str) -> Result<&JoinSpec, GantryError> {
        self.joins
            .get(name)
            .ok_or_else(|| GantryError::Configuration(format!("join `{name}` is not registered")))
    }

    pub fn descriptors(&self) -> &DescriptorRegistry {
        &self.descriptors
    }

    fn crud(&self, entity: &str) -> Result<&ResolvedCrud, GantryError> {
        self.crud.get(entity).ok_or_else(|| {
            GantryError::Configuration(format!("entity `{entity}` is not registered"))
        })
    }
}

/// One page of a paged listing.
#[derive(Debug)]
pub struct Page<R> {
    pub items: Vec<R>,
    /// Zero-based page index.
    pub page: u64,
    pub page_size: u64,
    pub total_items: u64,
    pub total_pages: u64,
}

/// The DAO execution engine.
pub struct DaoEngine {
    provider: Arc<dyn ConnectionProvider>,
    registry: Arc<DaoRegistry>,
    config: EngineConfig,
    builder: SqlBuilder,
    executor: QueryExecutor,
    cache: Option<EntityCache>,
}

impl DaoEngine {
    /// Build an engine over a connection provider and a populated registry.
    pub fn new(
        provider: Arc<dyn ConnectionProvider>,
        registry: DaoRegistry,
        config: EngineConfig,
    ) -> Result<Self, GantryError> {
        let builder = SqlBuilder::new(registry.naming(), registry.style());
        let executor = QueryExecutor::new(
            registry.naming(),
            config.stream_fetch_size,
            config.statement_timeout(),
        );
        let cache = config
            .cache
            .enabled
            .then(|| EntityCache::new(config.cache_settings()))
            .transpose()?;
        Ok(Self {
            provider,
            registry: Arc::new(registry),
            config,
            builder,
            executor,
            cache,
        })
    }

    pub fn registry(&self) -> &DaoRegistry {
        &self.registry
    }

    pub fn builder(&self) -> &SqlBuilder {
        &self.builder
    }

    // ------------------------------------------------------------------
    // Connection routing
    // ------------------------------------------------------------------

    /// Run `f` on the transaction's connection, or acquire/release a
    /// provider connection around it in autocommit mode.
    fn on_connection<T>(
        &self,
        tx: Option<&mut TransactionContext>,
        f: impl FnOnce(&QueryExecutor, &mut dyn Connection) -> Result<T, GantryError>,
    ) -> Result<T, GantryError> {
        match tx {
            Some(ctx) => {
                let connection = ctx.connection()?;
                f(&self.executor, connection)
            }
            None => {
                let mut connection = self.provider.acquire()?;
                let result = f(&self.executor, connection.as_mut());
                self.provider.release(connection);
                result
            }
        }
    }

    // ------------------------------------------------------------------
    // Transactions
    // ------------------------------------------------------------------

    /// Run `f` in a transaction with default propagation (REQUIRED) and
    /// isolation, creating a fresh context.
    pub fn transaction<T>(
        &self,
        f: impl FnOnce(Option<&mut TransactionContext>) -> Result<T, GantryError>,
    ) -> Result<T, GantryError> {
        self.transaction_with(Propagation::Required, IsolationLevel::default(), None, f)
    }

    /// Run `f` under the given propagation rule.
    ///
    /// `f` receives the context the rule selected: a joined or fresh context
    /// for REQUIRED/REQUIRES_NEW, `None` (autocommit) for SUPPORTS without
    /// an active context and for NOT_SUPPORTED. A context created here gets
    /// exactly one terminal action on every exit path: commit when `f`
    /// succeeds, rollback when it fails or neglects to commit.
    pub fn transaction_with<T>(
        &self,
        propagation: Propagation,
        isolation: IsolationLevel,
        current: Option<&mut TransactionContext>,
        f: impl FnOnce(Option<&mut TransactionContext>) -> Result<T, GantryError>,
    ) -> Result<T, GantryError> {
        let active = current.filter(|ctx| ctx.is_active());
        match propagation {
            Propagation::Required => match active {
                Some(ctx) => Self::run_joined(ctx, f),
                None => self.run_new(isolation, f),
            },
            // An active outer context stays parked until the new one ends.
            Propagation::RequiresNew => self.run_new(isolation, f),
            Propagation::Supports => match active {
                Some(ctx) => Self::run_joined(ctx, f),
                None => f(None),
            },
            Propagation::NotSupported => f(None),
        }
    }

    fn run_joined<T>(
        ctx: &mut TransactionContext,
        f: impl FnOnce(Option<&mut TransactionContext>) -> Result<T, GantryError>,
    ) -> Result<T, GantryError> {
        ctx.enter_joined_scope();
        let result = f(Some(&mut *ctx));
        ctx.exit_joined_scope();
        result
    }

    fn run_new<T>(
        &self,
        isolation: IsolationLevel,
        f: impl FnOnce(Option<&mut TransactionContext>) -> Result<T, GantryError>,
    ) -> Result<T, GantryError> {
        let mut ctx = TransactionContext::begin(Arc::clone(&self.provider), isolation)?;
        let result = f(Some(&mut ctx));
        match &result {
            Ok(_) => {
                if ctx.is_active() {
                    ctx.commit()?;
                }
            }
            Err(_) => {
                if ctx.is_active() {
                    if let Err(rollback_err) = ctx.rollback() {
                        log::error!("rollback after failure also failed: {rollback_err}");
                    }
                }
            }
        }
        result
    }

    // ------------------------------------------------------------------
    // CRUD
    // ------------------------------------------------------------------

    /// Insert one entity; returns the database-generated key when the
    /// driver reports one.
    pub fn insert<R: Record>(
        &self,
        record: &R,
        tx: Option<&mut TransactionContext>,
    ) -> Result<Option<Value>, GantryError> {
        let descriptor = R::descriptor();
        let plan = self.require_plan::<R>(|crud| crud.insert.as_ref(), "insert")?;
        let statement = plan.bind(record)?;
        let result = self.on_connection(tx, |ex, conn| ex.execute(conn, &statement, &NoParams))?;
        self.note_mutation(descriptor.entity(), "insert");
        Ok(result.generated_key)
    }

    /// Update one entity by its primary key; returns rows affected.
    pub fn update<R: Record>(
        &self,
        record: &R,
        tx: Option<&mut TransactionContext>,
    ) -> Result<u64, GantryError> {
        let descriptor = R::descriptor();
        let plan = self.require_plan::<R>(|crud| crud.update_by_id.as_ref(), "update")?;
        let statement = plan.bind(record)?;
        let result = self.on_connection(tx, |ex, conn| ex.execute(conn, &statement, &NoParams))?;
        self.note_mutation(descriptor.entity(), "update");
        Ok(result.rows_affected)
    }

    /// Update the named properties of every row matching the criteria,
    /// taking the new values from `record`.
    pub fn update_where<R: Record>(
        &self,
        record: &R,
        properties: &[&str],
        criteria: &Criteria,
        tx: Option<&mut TransactionContext>,
    ) -> Result<u64, GantryError> {
        let descriptor = R::descriptor();
        let mut values = Vec::with_capacity(properties.len());
        for property in properties {
            values.push(record.get(property).ok_or_else(|| {
                GantryError::UnknownProperty {
                    entity: descriptor.entity().to_string(),
                    property: (*property).to_string(),
                }
            })?);
        }
        let statement = self
            .builder
            .update_where(descriptor, properties, values, criteria)?;
        let result = self.on_connection(tx, |ex, conn| ex.execute(conn, &statement, &NoParams))?;
        self.note_mutation(descriptor.entity(), "updateWhere");
        Ok(result.rows_affected)
    }

    /// Delete one entity by its primary key; returns rows affected.
    pub fn delete<R: Record>(
        &self,
        record: &R,
        tx: Option<&mut TransactionContext>,
    ) -> Result<u64, GantryError> {
        let descriptor = R::descriptor();
        let plan = self.require_plan::<R>(|crud| crud.delete_by_id.as_ref(), "delete")?;
        let statement = plan.bind(record)?;
        let result = self.on_connection(tx, |ex, conn| ex.execute(conn, &statement, &NoParams))?;
        self.note_mutation(descriptor.entity(), "delete");
        Ok(result.rows_affected)
    }

    /// Delete by an explicit key value:
    /// `engine.delete_by_id::<User>(7.into(), None)`.
    pub fn delete_by_id<R: Record>(
        &self,
        key: ValueTuple,
        tx: Option<&mut TransactionContext>,
    ) -> Result<u64, GantryError> {
        let descriptor = R::descriptor();
        let plan = self.require_plan::<R>(|crud| crud.delete_by_id.as_ref(), "delete")?;
        let statement = self.bind_key(plan, key, descriptor.entity())?;
        let result = self.on_connection(tx, |ex, conn| ex.execute(conn, &statement, &NoParams))?;
        self.note_mutation(descriptor.entity(), "delete");
        Ok(result.rows_affected)
    }

    /// Delete every row matching the criteria.
    pub fn delete_where<R: Record>(
        &self,
        criteria: &Criteria,
        tx: Option<&mut TransactionContext>,
    ) -> Result<u64, GantryError> {
        let descriptor = R::descriptor();
        let statement = self.builder.delete_where(descriptor, criteria)?;
        let result = self.on_connection(tx, |ex, conn| ex.execute(conn, &statement, &NoParams))?;
        self.note_mutation(descriptor.entity(), "deleteWhere");
        Ok(result.rows_affected)
    }

    // ------------------------------------------------------------------
    // Lookups
    // ------------------------------------------------------------------

    /// Find one entity by primary key. Served read-through from the cache
    /// when caching is enabled.
    pub fn find_by_id<R>(
        &self,
        key: impl Into<ValueTuple>,
        tx: Option<&mut TransactionContext>,
    ) -> Result<Option<R>, GantryError>
    where
        R: Record + Send + Sync + 'static,
    {
        let descriptor = R::descriptor();
        let key = key.into();
        if let Some(cache) = &self.cache {
            if let Some(hit) = cache.get::<R>(descriptor.entity(), &key) {
                log::debug!("cache hit for `{}`", descriptor.entity());
                return Ok(Some(hit));
            }
        }
        let plan = self.require_plan::<R>(|crud| crud.select_by_id.as_ref(), "findById")?;
        let statement = self.bind_key(plan, key.clone(), descriptor.entity())?;
        let found: Option<R> =
            self.on_connection(tx, |ex, conn| ex.query_optional(conn, &statement, &NoParams))?;
        if let (Some(cache), Some(record)) = (&self.cache, &found) {
            cache.put(descriptor.entity(), key, record.clone());
        }
        Ok(found)
    }

    /// First entity matching the criteria, if any.
    pub fn find_one<R: Record>(
        &self,
        criteria: &Criteria,
        tx: Option<&mut TransactionContext>,
    ) -> Result<Option<R>, GantryError> {
        let statement = self.builder.select(R::descriptor(), criteria)?;
        self.on_connection(tx, |ex, conn| ex.query_optional(conn, &statement, &NoParams))
    }

    /// All entities matching the criteria.
    pub fn list<R: Record>(
        &self,
        criteria: &Criteria,
        tx: Option<&mut TransactionContext>,
    ) -> Result<Vec<R>, GantryError> {
        let statement = self.builder.select(R::descriptor(), criteria)?;
        self.on_connection(tx, |ex, conn| ex.query_records(conn, &statement, &NoParams))
    }

    /// Count of rows matching the criteria.
    pub fn count<R: Record>(
        &self,
        criteria: &Criteria,
        tx: Option<&mut TransactionContext>,
    ) -> Result<u64, GantryError> {
        let statement = self.builder.count(R::descriptor(), criteria)?;
        let count: Option<i64> =
            self.on_connection(tx, |ex, conn| ex.query_scalar(conn, &statement, &NoParams))?;
        Ok(count.unwrap_or(0).max(0) as u64)
    }

    /// One page of entities plus the total count, both under the same
    /// criteria. `page` is zero-based.
    pub fn page<R: Record>(
        &self,
        criteria: &Criteria,
        page: u64,
        page_size: u64,
        mut tx: Option<&mut TransactionContext>,
    ) -> Result<Page<R>, GantryError> {
        if page_size == 0 {
            return Err(GantryError::Configuration(
                "page size must be at least 1".to_string(),
            ));
        }
        let total_items = self.count::<R>(criteria, tx.as_deref_mut())?;
        let window = criteria.clone().limit_offset(page * page_size, page_size);
        let items = self.list::<R>(&window, tx)?;
        Ok(Page {
            items,
            page,
            page_size,
            total_items,
            total_pages: total_items.div_ceil(page_size),
        })
    }

    /// Stream entities matching the criteria.
    ///
    /// The stream owns its own provider connection in autocommit mode until
    /// exhausted or dropped, so it never borrows an active transaction's
    /// connection. Bound the stream's lifetime: while it lives it holds a
    /// pool slot.
    pub fn stream<R: Record>(&self, criteria: &Criteria) -> Result<RecordStream<R>, GantryError> {
        let statement = self.builder.select(R::descriptor(), criteria)?;
        self.executor
            .open_stream(Arc::clone(&self.provider), &statement, &NoParams)
    }

    // ------------------------------------------------------------------
    // Batches
    // ------------------------------------------------------------------

    /// Insert many entities in chunks of `batch_size` (engine default when
    /// `None`). Generated keys come back in input order.
    pub fn insert_batch<R: Record>(
        &self,
        records: &[R],
        batch_size: Option<usize>,
        tx: Option<&mut TransactionContext>,
    ) -> Result<BatchReport, GantryError> {
        self.insert_batch_with(records, batch_size, ChunkPolicy::AbortOnError, tx)
    }

    /// [`insert_batch`](Self::insert_batch) with an explicit chunk-failure
    /// policy.
    pub fn insert_batch_with<R: Record>(
        &self,
        records: &[R],
        batch_size: Option<usize>,
        policy: ChunkPolicy,
        tx: Option<&mut TransactionContext>,
    ) -> Result<BatchReport, GantryError> {
        let plan = self.require_plan::<R>(|crud| crud.insert.as_ref(), "insertBatch")?;
        let report = self.run_plan_batch(plan, records, batch_size, policy, tx)?;
        self.note_mutation(R::descriptor().entity(), "insertBatch");
        Ok(report)
    }

    /// Update many entities by primary key, chunked.
    pub fn update_batch<R: Record>(
        &self,
        records: &[R],
        batch_size: Option<usize>,
        tx: Option<&mut TransactionContext>,
    ) -> Result<BatchReport, GantryError> {
        let plan = self.require_plan::<R>(|crud| crud.update_by_id.as_ref(), "updateBatch")?;
        let report =
            self.run_plan_batch(plan, records, batch_size, ChunkPolicy::AbortOnError, tx)?;
        self.note_mutation(R::descriptor().entity(), "updateBatch");
        Ok(report)
    }

    /// Delete many entities by primary key, chunked.
    pub fn delete_batch<R: Record>(
        &self,
        records: &[R],
        batch_size: Option<usize>,
        tx: Option<&mut TransactionContext>,
    ) -> Result<BatchReport, GantryError> {
        let plan = self.require_plan::<R>(|crud| crud.delete_by_id.as_ref(), "deleteBatch")?;
        let report =
            self.run_plan_batch(plan, records, batch_size, ChunkPolicy::AbortOnError, tx)?;
        self.note_mutation(R::descriptor().entity(), "deleteBatch");
        Ok(report)
    }

    fn run_plan_batch<R: Record>(
        &self,
        plan: &StatementPlan,
        records: &[R],
        batch_size: Option<usize>,
        policy: ChunkPolicy,
        tx: Option<&mut TransactionContext>,
    ) -> Result<BatchReport, GantryError> {
        if records.is_empty() {
            return Ok(BatchReport::default());
        }
        // Resolve the statement text once; per-record values follow the
        // plan's property order, which matches the token order.
        let first = plan.bind(&records[0])?;
        let (text, first_values) = resolve(&first, &NoParams)?;
        let mut param_sets = Vec::with_capacity(records.len());
        param_sets.push(first_values);
        for record in &records[1..] {
            param_sets.push(plan.bind(record)?.values().to_vec());
        }
        let size = batch_size.unwrap_or(self.config.default_batch_size);
        self.on_connection(tx, |ex, conn| {
            ex.run_batch(conn, &text, &param_sets, size, policy)
        })
    }

    // ------------------------------------------------------------------
    // Template operations
    // ------------------------------------------------------------------

    /// Run a registered template as a query mapped into entities.
    pub fn query_template<R: Record>(
        &self,
        name: &str,
        placeholders: &HashMap<String, String>,
        binds: &HashMap<String, Value>,
        tx: Option<&mut TransactionContext>,
    ) -> Result<Vec<R>, GantryError> {
        let statement = self.registry.template(name)?.render(placeholders)?;
        self.on_connection(tx, |ex, conn| ex.query_records(conn, &statement, binds))
    }

    /// Run a registered template as a query returning raw rows.
    pub fn query_template_rows(
        &self,
        name: &str,
        placeholders: &HashMap<String, String>,
        binds: &HashMap<String, Value>,
        tx: Option<&mut TransactionContext>,
    ) -> Result<Vec<Row>, GantryError> {
        let statement = self.registry.template(name)?.render(placeholders)?;
        self.on_connection(tx, |ex, conn| ex.query_rows(conn, &statement, binds))
    }

    /// Run a registered template as a mutation; returns rows affected.
    ///
    /// Template operations carry no entity scope, so a matching operation
    /// name invalidates every cache shard.
    pub fn execute_template(
        &self,
        name: &str,
        placeholders: &HashMap<String, String>,
        binds: &HashMap<String, Value>,
        tx: Option<&mut TransactionContext>,
    ) -> Result<u64, GantryError> {
        let statement = self.registry.template(name)?.render(placeholders)?;
        let result = self.on_connection(tx, |ex, conn| ex.execute(conn, &statement, binds))?;
        if let Some(cache) = &self.cache {
            cache.note_global_mutation(name);
        }
        Ok(result.rows_affected)
    }

    // ------------------------------------------------------------------
    // Join-entity loading
    // ------------------------------------------------------------------

    /// Load a registered join by name over many roots.
    pub fn load_related_named<T, R>(
        &self,
        name: &str,
        roots: &mut [T],
        only_if_null: bool,
        tx: Option<&mut TransactionContext>,
    ) -> Result<(), GantryError>
    where
        T: JoinTarget<R>,
        R: Record,
    {
        let spec = self.registry.join(name)?.clone();
        self.load_related(roots, &spec, only_if_null, tx)
    }

    /// Resolve a relation for many roots with one secondary query.
    ///
    /// All root key values are collected into a single `IN (...)` condition
    /// (an OR of AND-groups for composite keys), the secondary query runs
    /// once, its rows are partitioned by key and attached per root. With
    /// `only_if_null` set, roots whose relation is already loaded are
    /// skipped, so repeated loads are idempotent.
    pub fn load_related<T, R>(
        &self,
        roots: &mut [T],
        spec: &JoinSpec,
        only_if_null: bool,
        tx: Option<&mut TransactionContext>,
    ) -> Result<(), GantryError>
    where
        T: JoinTarget<R>,
        R: Record,
    {
        let root_desc = T::descriptor();
        let related_desc = R::descriptor();
        spec.validate(root_desc, related_desc)?;

        // Key per root, skipping already-loaded and NULL-keyed roots.
        let mut root_keys: Vec<Option<ValueTuple>> = Vec::with_capacity(roots.len());
        let mut distinct: Vec<ValueTuple> = Vec::new();
        let mut seen: HashSet<ValueTuple> = HashSet::new();
        for root in roots.iter() {
            if only_if_null && root.relation_loaded(spec.root_property()) {
                root_keys.push(None);
                continue;
            }
            let mut values = Vec::with_capacity(spec.root_keys().len());
            for property in spec.root_keys() {
                values.push(root.get(property).ok_or_else(|| {
                    GantryError::JoinConfiguration(format!(
                        "root `{}` has no value for key property `{property}`",
                        root_desc.entity()
                    ))
                })?);
            }
            let key = ValueTuple::from_values(values);
            if key.has_null() {
                root_keys.push(None);
                continue;
            }
            if seen.insert(key.clone()) {
                distinct.push(key.clone());
            }
            root_keys.push(Some(key));
        }
        if distinct.is_empty() {
            return Ok(());
        }

        let mut criteria = Criteria::new().filter(Self::key_condition(spec, &distinct));
        for (property, dir) in spec.ordering() {
            criteria = criteria.order_by(property.clone(), *dir);
        }
        let statement = self.builder.select(related_desc, &criteria)?;
        let related: Vec<R> =
            self.on_connection(tx, |ex, conn| ex.query_records(conn, &statement, &NoParams))?;

        // Partition by related-side key, preserving query order per key.
        let mut by_key: HashMap<ValueTuple, Vec<R>> = HashMap::new();
        for record in related {
            let mut values = Vec::with_capacity(spec.related_keys().len());
            for property in spec.related_keys() {
                values.push(record.get(property).ok_or_else(|| {
                    GantryError::JoinConfiguration(format!(
                        "related `{}` has no value for key property `{property}`",
                        related_desc.entity()
                    ))
                })?);
            }
            by_key
                .entry(ValueTuple::from_values(values))
                .or_default()
                .push(record);
        }

        for (root, key) in roots.iter_mut().zip(root_keys) {
            let Some(key) = key else { continue };
            let Some(matches) = by_key.get(&key) else {
                continue;
            };
            let attached = match spec.cardinality() {
                Cardinality::One => vec![matches[0].clone()],
                Cardinality::ManyList => matches.clone(),
                Cardinality::ManySet => Self::distinct_records(matches),
            };
            root.attach(spec.root_property(), attached);
        }
        Ok(())
    }

    /// [`load_related`](Self::load_related) for a single root.
    pub fn load_related_one<T, R>(
        &self,
        root: &mut T,
        spec: &JoinSpec,
        only_if_null: bool,
        tx: Option<&mut TransactionContext>,
    ) -> Result<(), GantryError>
    where
        T: JoinTarget<R>,
        R: Record,
    {
        self.load_related(std::slice::from_mut(root), spec, only_if_null, tx)
    }

    fn key_condition(spec: &JoinSpec, keys: &[ValueTuple]) -> ConditionNode {
        if spec.related_keys().len() == 1 {
            let values: Vec<Value> = keys
                .iter()
                .cloned()
                .map(|key| {
                    key.into_values()
                        .pop()
                        .expect("single-column key holds one value")
                })
                .collect();
            Col::new(spec.related_keys()[0].as_str()).is_in(values)
        } else {
            let groups = keys
                .iter()
                .cloned()
                .map(|key| {
                    ConditionNode::and(
                        spec.related_keys()
                            .iter()
                            .zip(key.into_values())
                            .map(|(property, value)| Col::new(property.as_str()).eq(value))
                            .collect(),
                    )
                })
                .collect();
            ConditionNode::or(groups)
        }
    }

    fn distinct_records<R: Record>(records: &[R]) -> Vec<R> {
        let descriptor = R::descriptor();
        let mut seen = HashSet::new();
        let mut out = Vec::with_capacity(records.len());
        for record in records {
            let signature: Vec<Value> = descriptor
                .columns()
                .iter()
                .map(|col| {
                    record
                        .get(col.property())
                        .unwrap_or(Value::Bool(None))
                })
                .collect();
            if seen.insert(ValueTuple::Many(signature)) {
                out.push(record.clone());
            }
        }
        out
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn require_plan<R: Record>(
        &self,
        pick: impl FnOnce(&ResolvedCrud) -> Option<&StatementPlan>,
        operation: &str,
    ) -> Result<&StatementPlan, GantryError> {
        let descriptor = R::descriptor();
        let crud = self.registry.crud(descriptor.entity())?;
        pick(crud).ok_or_else(|| {
            GantryError::Configuration(format!(
                "entity `{}` has no `{operation}` shape",
                descriptor.entity()
            ))
        })
    }

    fn bind_key(
        &self,
        plan: &StatementPlan,
        key: ValueTuple,
        entity: &str,
    ) -> Result<crate::sql::SqlStatement, GantryError> {
        if plan.properties().len() != key.arity() {
            return Err(GantryError::Configuration(format!(
                "entity `{entity}` has a {}-column key, got {} value(s)",
                plan.properties().len(),
                key.arity()
            )));
        }
        Ok(plan.bind_values(key.into_values()))
    }

    fn note_mutation(&self, entity: &str, operation: &str) {
        if let Some(cache) = &self.cache {
            cache.note_mutation(entity, operation);
        }
    }
}
