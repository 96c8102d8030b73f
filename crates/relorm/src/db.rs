//! The shared storage context.
//!
//! A [`Db`] bundles a [`Store`], the resolved model [`Registry`], the
//! prepared statement cache and the configuration. Every statement issued
//! through it is logged on the `relorm.sql` target before it runs, and
//! failures are logged before they are returned.

use crate::config::DbConfig;
use crate::dialect::Dialect;
use crate::error::{OrmError, OrmResult};
use crate::log::{log_failure, log_sql};
use crate::model::{Model, Registry};
use crate::qb::{Condition, QueryBuilder};
use crate::store::statement_cache::StatementCache;
use crate::store::{self, PreparedStatement, Store};
use crate::value::{Value, ValueMap};
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Weak};

struct DbInner {
    store: Box<dyn Store>,
    registry: Arc<Registry>,
    statements: StatementCache,
    config: DbConfig,
}

/// Cheaply clonable handle to a storage context.
#[derive(Clone)]
pub struct Db {
    inner: Arc<DbInner>,
}

/// Non-owning handle held by records.
#[derive(Clone, Default)]
pub struct WeakDb(Weak<DbInner>);

impl Db {
    pub fn new(store: Box<dyn Store>, registry: impl Into<Arc<Registry>>, config: DbConfig) -> Self {
        let statements = StatementCache::new(&config.statement_cache);
        Self {
            inner: Arc::new(DbInner {
                store,
                registry: registry.into(),
                statements,
                config,
            }),
        }
    }

    /// Open a store for `dsn` (see [`store::connect`]) and wrap it.
    pub async fn connect(
        dsn: &str,
        registry: impl Into<Arc<Registry>>,
        config: DbConfig,
    ) -> OrmResult<Self> {
        let store = store::connect(dsn).await?;
        Ok(Self::new(store, registry, config))
    }

    pub fn store(&self) -> &dyn Store {
        self.inner.store.as_ref()
    }

    pub fn dialect(&self) -> Dialect {
        self.inner.store.dialect()
    }

    pub fn registry(&self) -> &Registry {
        &self.inner.registry
    }

    /// Look up a registered model by name.
    pub fn model(&self, name: &str) -> OrmResult<Model> {
        self.inner.registry.model(name)
    }

    pub fn config(&self) -> &DbConfig {
        &self.inner.config
    }

    pub fn downgrade(&self) -> WeakDb {
        WeakDb(Arc::downgrade(&self.inner))
    }

    // ==================== Builders ====================

    /// A fresh query builder bound to this context.
    pub fn qb(&self) -> QueryBuilder {
        QueryBuilder::with_db(self.clone())
    }

    /// A fresh query builder with `entries` already in its filter.
    pub fn filter<K, C, I>(&self, entries: I) -> QueryBuilder
    where
        I: IntoIterator<Item = (K, C)>,
        K: Into<String>,
        C: Into<Condition>,
    {
        self.qb().filter(entries)
    }

    /// A fresh query builder with a raw where clause.
    pub fn where_sql(&self, sql: impl Into<String>) -> QueryBuilder {
        self.qb().where_sql(sql)
    }

    /// A fresh prepared query builder whose statements are named after `base_name`.
    pub fn prepare(&self, base_name: impl Into<String>) -> QueryBuilder {
        self.qb().prepared(base_name)
    }

    // ==================== Logged storage calls ====================

    async fn logged<T, F>(&self, sql: &str, name: Option<&str>, param_count: usize, call: F) -> OrmResult<T>
    where
        F: Future<Output = OrmResult<T>>,
    {
        let log = &self.inner.config.sql_log;
        log_sql(log, sql, name, param_count);
        let result = call.await;
        if let Err(err) = &result {
            log_failure(log, sql, err);
        }
        result
    }

    pub async fn query(&self, sql: &str) -> OrmResult<u64> {
        self.logged(sql, None, 0, self.store().query(sql)).await
    }

    pub async fn batch(&self, sql: &str) -> OrmResult<()> {
        self.logged(sql, None, 0, self.store().batch(sql)).await
    }

    pub async fn select(&self, sql: &str) -> OrmResult<Vec<ValueMap>> {
        self.logged(sql, None, 0, self.store().select(sql)).await
    }

    pub async fn select1(&self, sql: &str) -> OrmResult<Option<ValueMap>> {
        self.logged(sql, None, 0, self.store().select1(sql)).await
    }

    pub async fn select_kv(&self, sql: &str) -> OrmResult<ValueMap> {
        self.logged(sql, None, 0, self.store().select_kv(sql)).await
    }

    /// Run an INSERT and return the generated id.
    pub async fn insert(&self, sql: &str) -> OrmResult<Value> {
        self.logged(sql, None, 0, self.store().insert(sql)).await
    }

    /// Insert a row of column defaults into `table` and return the generated id.
    pub async fn insert_empty(&self, table: &str) -> OrmResult<Value> {
        let dialect = self.dialect();
        let sql = dialect.insert_empty_sql(&dialect.quote_ident(table));
        self.logged(&sql, None, 0, self.store().insert_empty(table)).await
    }

    pub async fn last_insert_id(&self) -> OrmResult<Value> {
        let sql = self.dialect().last_insert_id_sql();
        self.logged(sql, None, 0, self.store().last_insert_id()).await
    }

    pub async fn columns_for_table(&self, table: &str) -> OrmResult<Vec<String>> {
        self.store().columns_for_table(table).await
    }

    pub async fn all_tables(&self) -> OrmResult<Vec<String>> {
        self.store().all_tables().await
    }

    pub async fn begin(&self) -> OrmResult<()> {
        self.logged("BEGIN", None, 0, self.store().begin()).await
    }

    pub async fn commit(&self) -> OrmResult<()> {
        self.logged("COMMIT", None, 0, self.store().commit()).await
    }

    pub async fn rollback(&self) -> OrmResult<()> {
        self.logged("ROLLBACK", None, 0, self.store().rollback()).await
    }

    /// Drop the connection and forget every prepared statement.
    pub async fn disconnect(&self) -> OrmResult<()> {
        self.inner.statements.clear();
        self.store().disconnect().await
    }

    // ==================== Prepared statements ====================

    /// The statement cached under `name`, prepared again when missing or when its SQL changed.
    async fn prepared(&self, name: &str, sql: &str) -> OrmResult<PreparedStatement> {
        let statements = &self.inner.statements;
        if let Some(stmt) = statements.get(name).filter(|stmt| stmt.sql == sql) {
            return Ok(stmt);
        }
        let stmt = self
            .store()
            .prepare_statement(sql, name)
            .await
            .inspect_err(|err| log_failure(&self.inner.config.sql_log, sql, err))?;
        statements.insert(stmt.clone());
        Ok(stmt)
    }

    /// Execute `sql` through the prepared statement `name` and fetch its rows.
    pub async fn execute_prepared(&self, name: &str, sql: &str, params: &[Value]) -> OrmResult<Vec<ValueMap>> {
        let stmt = self.prepared(name, sql).await?;
        let result = self
            .logged(sql, Some(name), params.len(), self.store().execute(&stmt, params))
            .await;
        if result.is_err() {
            self.inner.statements.remove(name);
        }
        result
    }

    /// Execute `sql` through the prepared statement `name`; returns the affected row count.
    pub async fn execute_prepared_dml(&self, name: &str, sql: &str, params: &[Value]) -> OrmResult<u64> {
        let stmt = self.prepared(name, sql).await?;
        let result = self
            .logged(sql, Some(name), params.len(), self.store().execute_dml(&stmt, params))
            .await;
        if result.is_err() {
            self.inner.statements.remove(name);
        }
        result
    }
}

impl fmt::Debug for Db {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Db")
            .field("dialect", &self.dialect())
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

impl WeakDb {
    pub fn new() -> Self {
        Self::default()
    }

    /// The context this handle points to, if it is still alive.
    pub fn upgrade(&self) -> OrmResult<Db> {
        self.0
            .upgrade()
            .map(|inner| Db { inner })
            .ok_or_else(|| OrmError::Connection("storage context has been dropped".into()))
    }

    pub fn is_attached(&self) -> bool {
        self.0.strong_count() > 0
    }
}

impl fmt::Debug for WeakDb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("WeakDb")
            .field(&if self.is_attached() { "attached" } else { "detached" })
            .finish()
    }
}
