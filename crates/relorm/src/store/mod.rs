//! Storage interface.
//!
//! A [`Store`] is one relational connection. The query builder and the model
//! layer only ever talk to storage through this trait, so a backend needs to
//! provide statement execution, row fetching, the last generated id, schema
//! introspection and prepared statements. Everything else has a provided
//! default.

use crate::dialect::Dialect;
use crate::error::{OrmError, OrmResult};
use crate::value::{Value, ValueMap};

pub mod postgres;
#[cfg(feature = "sqlite")]
pub mod sqlite;
pub mod snapshot;
pub(crate) mod statement_cache;
pub mod time;

pub use postgres::PgStore;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;

/// A statement prepared on a store, addressed by name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedStatement {
    pub name: String,
    pub sql: String,
}

/// A relational connection.
#[async_trait::async_trait]
pub trait Store: Send + Sync {
    /// SQL flavour spoken by this store.
    fn dialect(&self) -> Dialect;

    /// Drop the underlying connection.
    async fn disconnect(&self) -> OrmResult<()>;

    /// Run a single statement that returns no rows; returns the affected row count.
    async fn query(&self, sql: &str) -> OrmResult<u64>;

    /// Run a script of one or more statements.
    async fn batch(&self, sql: &str) -> OrmResult<()>;

    /// Run a statement and fetch all rows.
    async fn select(&self, sql: &str) -> OrmResult<Vec<ValueMap>>;

    /// Id generated by the most recent insert on this connection.
    async fn last_insert_id(&self) -> OrmResult<Value>;

    /// Column names of `table`, in declaration order.
    async fn columns_for_table(&self, table: &str) -> OrmResult<Vec<String>>;

    /// Names of all user tables.
    async fn all_tables(&self) -> OrmResult<Vec<String>>;

    /// Prepare `sql` under `name`, replacing any statement previously prepared with that name.
    async fn prepare_statement(&self, sql: &str, name: &str) -> OrmResult<PreparedStatement>;

    /// Execute a prepared statement with positional parameters.
    async fn execute(&self, stmt: &PreparedStatement, params: &[Value]) -> OrmResult<Vec<ValueMap>>;

    /// Execute a prepared statement that returns no rows; returns the affected row count.
    async fn execute_dml(&self, stmt: &PreparedStatement, params: &[Value]) -> OrmResult<u64>;

    /// Escape a string for inclusion inside a single-quoted literal.
    fn clean(&self, value: &str) -> String {
        value.replace('\'', "''")
    }

    /// Collect `value` and return the placeholder token that refers to it.
    fn placeholder(&self, params: &mut Vec<Value>, value: Value) -> String {
        params.push(value);
        self.dialect().placeholder(params.len())
    }

    /// First row of a statement, if any.
    async fn select1(&self, sql: &str) -> OrmResult<Option<ValueMap>> {
        Ok(self.select(sql).await?.into_iter().next())
    }

    /// Pair the first two columns of every row into a map.
    async fn select_kv(&self, sql: &str) -> OrmResult<ValueMap> {
        let rows = self.select(sql).await?;
        pair_rows(rows)
    }

    /// Run an INSERT and return the generated id.
    async fn insert(&self, sql: &str) -> OrmResult<Value> {
        self.query(sql).await?;
        self.last_insert_id().await
    }

    /// Insert a row made only of defaults and return the generated id.
    async fn insert_empty(&self, table: &str) -> OrmResult<Value> {
        let dialect = self.dialect();
        let sql = dialect.insert_empty_sql(&dialect.quote_ident(table));
        self.insert(&sql).await
    }

    async fn begin(&self) -> OrmResult<()> {
        self.query("BEGIN").await.map(drop)
    }

    /// Commit the current transaction.
    ///
    /// A failed commit (typically: no transaction in progress) is logged and swallowed.
    async fn commit(&self) -> OrmResult<()> {
        if let Err(err) = self.query("COMMIT").await {
            tracing::warn!(target: "relorm", error = %err, "commit failed; ignoring");
        }
        Ok(())
    }

    async fn rollback(&self) -> OrmResult<()> {
        self.query("ROLLBACK").await.map(drop)
    }
}

pub(crate) fn pair_rows(rows: Vec<ValueMap>) -> OrmResult<ValueMap> {
    let mut out = ValueMap::with_capacity(rows.len());
    for row in rows {
        let mut values = row.into_iter().map(|(_, v)| v);
        let (Some(key), Some(value)) = (values.next(), values.next()) else {
            return Err(OrmError::decode(
                "select_kv",
                "key/value selection needs at least two columns",
            ));
        };
        out.insert(key.to_string(), value);
    }
    Ok(out)
}

/// Open a store for `dsn`, choosing the backend from its scheme.
///
/// `postgres://` and `postgresql://` open a [`PgStore`]; `sqlite:` opens a
/// `SqliteStore` when the `sqlite` feature is enabled.
pub async fn connect(dsn: &str) -> OrmResult<Box<dyn Store>> {
    if dsn.starts_with("postgres://") || dsn.starts_with("postgresql://") {
        return Ok(Box::new(PgStore::connect(dsn).await?));
    }
    #[cfg(feature = "sqlite")]
    if dsn.starts_with("sqlite:") {
        return Ok(Box::new(SqliteStore::connect(dsn).await?));
    }
    Err(OrmError::configuration(format!(
        "unsupported storage DSN scheme: {dsn}"
    )))
}
