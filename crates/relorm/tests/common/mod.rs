#![allow(dead_code)]

use relorm::store::SqliteStore;
use relorm::{Db, DbConfig, Dialect, ModelDef, OrmResult, PreparedStatement, Registry, Store, Value, ValueMap};
use std::sync::{Arc, Mutex};

pub const SCHEMA: &str = "
CREATE TABLE people (id INTEGER PRIMARY KEY AUTOINCREMENT, name TEXT);
CREATE TABLE employees (id INTEGER PRIMARY KEY AUTOINCREMENT, person_id INTEGER, salary INTEGER NOT NULL DEFAULT 0);
CREATE TABLE managers (id INTEGER PRIMARY KEY AUTOINCREMENT, employee_id INTEGER, reports INTEGER NOT NULL DEFAULT 0);
CREATE TABLE posts (id INTEGER PRIMARY KEY AUTOINCREMENT, title TEXT NOT NULL DEFAULT '', author_id INTEGER, status TEXT NOT NULL DEFAULT 'draft');
CREATE TABLE tags (id INTEGER PRIMARY KEY AUTOINCREMENT, name TEXT NOT NULL DEFAULT '');
CREATE TABLE taggings (id INTEGER PRIMARY KEY AUTOINCREMENT, post_id INTEGER, tag_id INTEGER);
CREATE TABLE labels (id INTEGER PRIMARY KEY AUTOINCREMENT, post_id INTEGER, name TEXT NOT NULL DEFAULT '');
CREATE TABLE comments (id INTEGER PRIMARY KEY AUTOINCREMENT, post_id INTEGER, body TEXT NOT NULL DEFAULT '');
CREATE TABLE replies (id INTEGER PRIMARY KEY AUTOINCREMENT, comment_id INTEGER, body TEXT NOT NULL DEFAULT '');
";

pub fn registry() -> Registry {
    Registry::builder()
        .register(
            ModelDef::new("Person")
                .table("people")
                .field("name", Value::Null)
                .has_many("posts", ["Post"]),
        )
        .register(
            ModelDef::new("Employee")
                .extends("Person")
                .table("employees")
                .field("salary", 0)
                .is_a("person_id", "Person"),
        )
        .register(
            ModelDef::new("Manager")
                .extends("Employee")
                .table("managers")
                .field("reports", 0)
                .is_a("employee_id", "Employee"),
        )
        .register(
            ModelDef::new("Post")
                .table("posts")
                .field("title", "")
                .has_a("author", "Person", "author_id")
                .has_many("tags", ["Tagging", "Tag"])
                .has_many("labels", ["Label"])
                .has_many("comments", ["Comment"])
                .has_many("replies", ["Comment", "Reply"]),
        )
        .register(
            ModelDef::new("Tagging")
                .table("taggings")
                .has_a("post", "Post", "post_id")
                .has_a("tag", "Tag", "tag_id"),
        )
        .register(ModelDef::new("Tag").table("tags").field("name", ""))
        .register(
            ModelDef::new("Label")
                .table("labels")
                .field("name", "")
                .has_a("post", "Post", "post_id")
                .transform(|_, value| match value {
                    Value::Text(s) => Value::Text(s.trim().to_string()),
                    other => other,
                }),
        )
        .register(
            ModelDef::new("Comment")
                .table("comments")
                .field("body", "")
                .has_a("post", "Post", "post_id"),
        )
        .register(
            ModelDef::new("Reply")
                .table("replies")
                .field("body", "")
                .has_a("comment", "Comment", "comment_id"),
        )
        .build()
        .expect("registry")
}

/// Statements issued through a [`RecordingStore`], in order.
#[derive(Clone, Default)]
pub struct SqlLog(Arc<Mutex<Vec<String>>>);

impl SqlLog {
    fn push(&self, sql: impl Into<String>) {
        self.0.lock().unwrap().push(sql.into());
    }

    pub fn take(&self) -> Vec<String> {
        std::mem::take(&mut *self.0.lock().unwrap())
    }

    pub fn clear(&self) {
        self.0.lock().unwrap().clear();
    }
}

/// Wraps a store and records every statement sent through it.
pub struct RecordingStore {
    inner: SqliteStore,
    log: SqlLog,
}

#[async_trait::async_trait]
impl Store for RecordingStore {
    fn dialect(&self) -> Dialect {
        self.inner.dialect()
    }

    async fn disconnect(&self) -> OrmResult<()> {
        self.inner.disconnect().await
    }

    async fn query(&self, sql: &str) -> OrmResult<u64> {
        self.log.push(sql);
        self.inner.query(sql).await
    }

    async fn batch(&self, sql: &str) -> OrmResult<()> {
        self.log.push(sql);
        self.inner.batch(sql).await
    }

    async fn select(&self, sql: &str) -> OrmResult<Vec<ValueMap>> {
        self.log.push(sql);
        self.inner.select(sql).await
    }

    async fn last_insert_id(&self) -> OrmResult<Value> {
        self.inner.last_insert_id().await
    }

    async fn columns_for_table(&self, table: &str) -> OrmResult<Vec<String>> {
        self.inner.columns_for_table(table).await
    }

    async fn all_tables(&self) -> OrmResult<Vec<String>> {
        self.inner.all_tables().await
    }

    async fn prepare_statement(&self, sql: &str, name: &str) -> OrmResult<PreparedStatement> {
        self.log.push(format!("PREPARE {name}"));
        self.inner.prepare_statement(sql, name).await
    }

    async fn execute(&self, stmt: &PreparedStatement, params: &[Value]) -> OrmResult<Vec<ValueMap>> {
        self.log.push(stmt.sql.clone());
        self.inner.execute(stmt, params).await
    }

    async fn execute_dml(&self, stmt: &PreparedStatement, params: &[Value]) -> OrmResult<u64> {
        self.log.push(stmt.sql.clone());
        self.inner.execute_dml(stmt, params).await
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// A fresh in-memory database with the test schema, and its statement log.
pub async fn setup() -> (Db, SqlLog) {
    setup_with(DbConfig::default()).await
}

pub async fn setup_with(config: DbConfig) -> (Db, SqlLog) {
    init_tracing();
    let log = SqlLog::default();
    let store = RecordingStore {
        inner: SqliteStore::in_memory().await.expect("sqlite"),
        log: log.clone(),
    };
    let db = Db::new(Box::new(store), registry(), config);
    db.batch(SCHEMA).await.expect("schema");
    log.clear();
    (db, log)
}

/// Insert `rows` into `table` directly and return the generated ids.
pub async fn seed(db: &Db, table: &str, rows: Vec<ValueMap>) -> Vec<Value> {
    let mut ids = Vec::with_capacity(rows.len());
    for row in rows {
        let id = db.qb().from(format!("\"{table}\"")).insert(&row).await.expect("seed");
        ids.push(id);
    }
    ids
}

/// `column` of every record, in order.
pub fn column(records: &[relorm::Record], column: &str) -> Vec<Value> {
    records.iter().map(|r| r.value(column)).collect()
}

/// Text values of `column`, sorted.
pub fn sorted_text(records: &[relorm::Record], column: &str) -> Vec<String> {
    let mut out: Vec<String> = records.iter().map(|r| r.value(column).to_string()).collect();
    out.sort();
    out
}
