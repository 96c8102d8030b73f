//! SQLite storage over `sqlx`.

use super::{PreparedStatement, Store};
use crate::dialect::Dialect;
use crate::error::{OrmError, OrmResult};
use crate::value::{Value, ValueMap};
use sqlx::sqlite::{SqliteArguments, SqliteConnection, SqliteRow};
use sqlx::{Column, Connection, Row, Sqlite, TypeInfo, ValueRef};
use std::collections::HashMap;
use std::sync::Mutex as StdMutex;
use tokio::sync::Mutex;

type SqliteQuery<'q> = sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>>;

/// A single SQLite connection.
///
/// All statements run on the same connection, which keeps
/// `last_insert_rowid()` and transactions coherent.
pub struct SqliteStore {
    conn: Mutex<Option<SqliteConnection>>,
    columns: StdMutex<HashMap<String, Vec<String>>>,
    prepared: StdMutex<HashMap<String, String>>,
}

impl SqliteStore {
    /// Open `dsn` (e.g. `sqlite::memory:` or `sqlite://data.db?mode=rwc`).
    pub async fn connect(dsn: &str) -> OrmResult<Self> {
        let conn = SqliteConnection::connect(dsn)
            .await
            .map_err(|e| OrmError::Connection(e.to_string()))?;
        Ok(Self {
            conn: Mutex::new(Some(conn)),
            columns: StdMutex::new(HashMap::new()),
            prepared: StdMutex::new(HashMap::new()),
        })
    }

    /// Open a private in-memory database.
    pub async fn in_memory() -> OrmResult<Self> {
        Self::connect("sqlite::memory:").await
    }

    fn columns_map(&self) -> std::sync::MutexGuard<'_, HashMap<String, Vec<String>>> {
        self.columns.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn prepared_map(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        self.prepared.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn prepared_sql(&self, stmt: &PreparedStatement) -> String {
        self.prepared_map()
            .get(&stmt.name)
            .cloned()
            .unwrap_or_else(|| stmt.sql.clone())
    }

    async fn fetch(&self, sql: &str, query: SqliteQuery<'_>) -> OrmResult<Vec<ValueMap>> {
        let mut guard = self.conn.lock().await;
        let conn = guard.as_mut().ok_or_else(closed)?;
        let rows = query
            .fetch_all(&mut *conn)
            .await
            .map_err(|e| OrmError::from_sqlx_error(sql, e))?;
        rows.iter().map(decode_row).collect()
    }
}

fn closed() -> OrmError {
    OrmError::Connection("sqlite connection is closed".into())
}

fn bind<'q>(query: SqliteQuery<'q>, value: &Value) -> SqliteQuery<'q> {
    match value {
        Value::Null => query.bind(None::<String>),
        Value::Bool(b) => query.bind(*b),
        Value::Int(i) => query.bind(*i),
        Value::Float(f) => query.bind(*f),
        Value::Text(s) | Value::Expr(s) => query.bind(s.clone()),
        Value::List(_) | Value::Map(_) => query.bind(value.encode_json()),
    }
}

fn decode_row(row: &SqliteRow) -> OrmResult<ValueMap> {
    let mut out = ValueMap::with_capacity(row.columns().len());
    for column in row.columns() {
        let idx = column.ordinal();
        let name = column.name();
        let err = |e: sqlx::Error| OrmError::decode(name, e.to_string());
        let type_name = {
            let raw = row.try_get_raw(idx).map_err(err)?;
            if raw.is_null() {
                out.insert(name, Value::Null);
                continue;
            }
            raw.type_info().name().to_ascii_uppercase()
        };
        let value = match type_name.as_str() {
            "INTEGER" | "INT" | "INT8" | "BIGINT" | "BOOLEAN" => {
                Value::Int(row.try_get::<i64, _>(idx).map_err(err)?)
            }
            "REAL" | "FLOAT" | "DOUBLE" | "NUMERIC" => {
                Value::Float(row.try_get::<f64, _>(idx).map_err(err)?)
            }
            "BLOB" => {
                let bytes = row.try_get::<Vec<u8>, _>(idx).map_err(err)?;
                Value::Text(String::from_utf8_lossy(&bytes).into_owned())
            }
            _ => Value::Text(row.try_get::<String, _>(idx).map_err(err)?),
        };
        out.insert(name, value);
    }
    Ok(out)
}

#[async_trait::async_trait]
impl Store for SqliteStore {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    async fn disconnect(&self) -> OrmResult<()> {
        let conn = self.conn.lock().await.take();
        if let Some(conn) = conn {
            conn.close()
                .await
                .map_err(|e| OrmError::Connection(e.to_string()))?;
        }
        Ok(())
    }

    async fn query(&self, sql: &str) -> OrmResult<u64> {
        let mut guard = self.conn.lock().await;
        let conn = guard.as_mut().ok_or_else(closed)?;
        let result = sqlx::Executor::execute(&mut *conn, sqlx::raw_sql(sql))
            .await
            .map_err(|e| OrmError::from_sqlx_error(sql, e))?;
        Ok(result.rows_affected())
    }

    async fn batch(&self, sql: &str) -> OrmResult<()> {
        self.query(sql).await.map(drop)
    }

    async fn select(&self, sql: &str) -> OrmResult<Vec<ValueMap>> {
        let mut guard = self.conn.lock().await;
        let conn = guard.as_mut().ok_or_else(closed)?;
        let rows = sqlx::Executor::fetch_all(&mut *conn, sqlx::raw_sql(sql))
            .await
            .map_err(|e| OrmError::from_sqlx_error(sql, e))?;
        rows.iter().map(decode_row).collect()
    }

    async fn last_insert_id(&self) -> OrmResult<Value> {
        let row = self.select1(Dialect::Sqlite.last_insert_id_sql()).await?;
        Ok(row.and_then(|r| r.get("id").cloned()).unwrap_or_default())
    }

    async fn columns_for_table(&self, table: &str) -> OrmResult<Vec<String>> {
        let cached = self.columns_map().get(table).cloned();
        if let Some(cols) = cached {
            return Ok(cols);
        }
        let (sql, field) = Dialect::Sqlite.columns_sql(table);
        let cols: Vec<String> = self
            .select(&sql)
            .await?
            .iter()
            .filter_map(|row| row.get(field).map(ToString::to_string))
            .collect();
        if !cols.is_empty() {
            self.columns_map().insert(table.to_string(), cols.clone());
        }
        Ok(cols)
    }

    async fn all_tables(&self) -> OrmResult<Vec<String>> {
        Ok(self
            .select(Dialect::Sqlite.tables_sql())
            .await?
            .iter()
            .filter_map(|row| row.get("name").map(ToString::to_string))
            .collect())
    }

    async fn prepare_statement(&self, sql: &str, name: &str) -> OrmResult<PreparedStatement> {
        // sqlx caches the compiled statement per connection on first execution.
        self.prepared_map().insert(name.to_string(), sql.to_string());
        Ok(PreparedStatement {
            name: name.to_string(),
            sql: sql.to_string(),
        })
    }

    async fn execute(&self, stmt: &PreparedStatement, params: &[Value]) -> OrmResult<Vec<ValueMap>> {
        let sql = self.prepared_sql(stmt);
        let query = params
            .iter()
            .fold(sqlx::query(&sql), |query, value| bind(query, value));
        self.fetch(&sql, query).await
    }

    async fn execute_dml(&self, stmt: &PreparedStatement, params: &[Value]) -> OrmResult<u64> {
        let sql = self.prepared_sql(stmt);
        let query = params
            .iter()
            .fold(sqlx::query(&sql), |query, value| bind(query, value));
        let mut guard = self.conn.lock().await;
        let conn = guard.as_mut().ok_or_else(closed)?;
        let result = query
            .execute(&mut *conn)
            .await
            .map_err(|e| OrmError::from_sqlx_error(&sql, e))?;
        Ok(result.rows_affected())
    }
}
