//! Fluent SQL assembly.
//!
//! A [`QueryBuilder`] accumulates a from-clause, joins, structured filters, a
//! raw where clause and an enforce clause, then renders SELECT, UPDATE,
//! INSERT or DELETE text against a [`Db`]. The WHERE clause always renders
//! as `(enforce) AND (where) AND term...`, so an `OR` inside the raw where
//! clause can never widen the enforce predicate.
//!
//! ```ignore
//! let rows = db
//!     .qb()
//!     .from("people p")
//!     .filter([("p.name", Condition::op("LIKE", "a%"))])
//!     .order_by("p.name")
//!     .select("p.*")
//!     .await?;
//! ```
//!
//! A builder created with [`Db::prepare`] renders every literal as a
//! placeholder instead and executes through a named, cached prepared
//! statement.

mod filter;

pub use filter::{Condition, format_value};

use crate::db::Db;
use crate::dialect::Dialect;
use crate::error::{OrmError, OrmResult};
use crate::model::{Model, Record};
use crate::store::pair_rows;
use crate::value::{Value, ValueMap};
use filter::{Binder, Filter};
use std::fmt;

const DEFAULT_WHERE: &str = "1=1";

/// SQL statement builder.
#[derive(Clone, Debug)]
pub struct QueryBuilder {
    db: Option<Db>,
    dialect: Dialect,
    from: String,
    joins: Vec<String>,
    columns: Vec<String>,
    where_clause: String,
    enforce: Option<String>,
    filter: Filter,
    group_by: String,
    having: String,
    order_by: String,
    limit: String,
    /// Base name of the prepared statements this builder executes through.
    statement: Option<String>,
}

impl QueryBuilder {
    /// A builder with no storage attached. It renders SQL but cannot execute it.
    pub fn new(dialect: Dialect) -> Self {
        Self {
            db: None,
            dialect,
            from: String::new(),
            joins: Vec::new(),
            columns: Vec::new(),
            where_clause: DEFAULT_WHERE.to_string(),
            enforce: None,
            filter: Filter::default(),
            group_by: String::new(),
            having: String::new(),
            order_by: String::new(),
            limit: String::new(),
            statement: None,
        }
    }

    pub(crate) fn with_db(db: Db) -> Self {
        let mut qb = Self::new(db.dialect());
        qb.db = Some(db);
        qb
    }

    /// Switch to placeholder rendering, executing through statements named `{name}_select1`,
    /// `{name}_update` and `{name}_insert`.
    pub fn prepared(mut self, name: impl Into<String>) -> Self {
        self.statement = Some(name.into());
        self
    }

    pub fn db(&self) -> OrmResult<&Db> {
        self.db
            .as_ref()
            .ok_or_else(|| OrmError::configuration("query builder has no storage attached"))
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    pub fn is_prepared(&self) -> bool {
        self.statement.is_some()
    }

    pub fn from_clause(&self) -> &str {
        &self.from
    }

    // ==================== Clauses ====================

    /// Set the from-clause (`table`, `table alias` or a nested select).
    pub fn from(mut self, from: impl Into<String>) -> Self {
        self.from = from.into();
        self
    }

    /// Merge structured conditions. A repeated column replaces its earlier condition.
    pub fn filter<K, C, I>(mut self, entries: I) -> Self
    where
        I: IntoIterator<Item = (K, C)>,
        K: Into<String>,
        C: Into<Condition>,
    {
        for (column, condition) in entries {
            self.filter.merge(column.into(), condition.into());
        }
        self
    }

    /// Merge a single condition.
    pub fn filter_by(self, column: impl Into<String>, condition: impl Into<Condition>) -> Self {
        self.filter([(column.into(), condition.into())])
    }

    /// Replace the filter with a predicate that matches nothing.
    pub fn fail(mut self) -> Self {
        self.filter.fail();
        self
    }

    /// Set the mandatory predicate that is ANDed ahead of everything else.
    pub fn enforce(mut self, sql: impl Into<String>) -> Self {
        let sql = sql.into();
        if let Some(old) = &self.enforce {
            tracing::warn!(target: "relorm", old = %old, new = %sql, "enforce clause overridden");
        }
        self.enforce = Some(sql);
        self
    }

    /// Set the raw where clause.
    pub fn where_sql(mut self, sql: impl Into<String>) -> Self {
        let sql = sql.into();
        if self.where_clause != DEFAULT_WHERE {
            tracing::warn!(
                target: "relorm",
                old = %self.where_clause,
                new = %sql,
                "WHERE clause overridden; did you mean enforce?"
            );
        }
        self.where_clause = sql;
        self
    }

    pub fn join(mut self, table: &str, on: &str) -> Self {
        self.joins.push(format!("JOIN {table} ON ({on})"));
        self
    }

    pub fn left_join(mut self, table: &str, on: &str) -> Self {
        self.joins.push(format!("LEFT JOIN {table} ON ({on})"));
        self
    }

    pub fn group_by(mut self, sql: &str) -> Self {
        self.group_by = format!("GROUP BY {sql}");
        self
    }

    pub fn having(mut self, sql: &str) -> Self {
        self.having = format!("HAVING ({sql})");
        self
    }

    pub fn order_by(mut self, sql: &str) -> Self {
        self.order_by = format!("ORDER BY {sql}");
        self
    }

    pub fn is_ordered(&self) -> bool {
        !self.order_by.is_empty()
    }

    pub fn limit(mut self, count: u64) -> Self {
        self.limit = format!("LIMIT {count}");
        self
    }

    /// Append `expr as alias` projections. Nothing is escaped.
    pub fn add_columns<A, E, I>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = (A, E)>,
        A: fmt::Display,
        E: fmt::Display,
    {
        self.columns.extend(
            columns
                .into_iter()
                .map(|(alias, expr)| format!("{expr} as {alias}")),
        );
        self
    }

    /// Append a bare projection. Nothing is escaped.
    pub fn add_column(mut self, expr: impl Into<String>) -> Self {
        self.columns.push(expr.into());
        self
    }

    /// Wrap this select as `(SELECT cols ...) as alias` in the from-clause of a fresh builder.
    pub fn nest_as(&self, cols: &str, alias: &str) -> Self {
        let mut qb = QueryBuilder::new(self.dialect);
        qb.db = self.db.clone();
        qb.from = format!("({}) as {alias}", self.select_statement(cols));
        qb
    }

    // ==================== Rendering ====================

    fn render_where(&self, binder: &mut Binder<'_>) -> String {
        let mut clause = match &self.enforce {
            Some(enforce) => format!("({enforce}) AND ({})", self.where_clause),
            None => format!("({})", self.where_clause),
        };
        for term in self.filter.render(self.dialect, binder) {
            clause.push_str(" AND ");
            clause.push_str(&term);
        }
        clause
    }

    fn render_select(&self, cols: &str, binder: &mut Binder<'_>) -> String {
        let mut column_clause = cols.to_string();
        if !self.columns.is_empty() {
            column_clause.push_str(", ");
            column_clause.push_str(&self.columns.join(","));
        }
        let parts = [
            format!("SELECT {column_clause}"),
            format!("FROM {}", self.from),
            self.joins.join(" "),
            format!("WHERE {}", self.render_where(binder)),
            self.group_by.clone(),
            self.having.clone(),
            self.order_by.clone(),
            self.limit.clone(),
        ];
        parts
            .into_iter()
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Render the WHERE clause with literals inlined.
    pub fn where_clause(&self) -> String {
        self.render_where(&mut Binder::Inline)
    }

    /// Render a SELECT with literals inlined.
    pub fn select_statement(&self, cols: &str) -> String {
        self.render_select(cols, &mut Binder::Inline)
    }

    /// Render a SELECT with placeholders, returning the SQL and its parameters.
    pub fn prepared_select_statement(&self, cols: &str) -> OrmResult<(String, Vec<Value>)> {
        self.check_prepared()?;
        let mut params = Vec::new();
        let sql = self.render_select(cols, &mut self.binder(&mut params));
        Ok((sql, params))
    }

    pub fn update_statement(&self, props: &ValueMap) -> String {
        self.render_update(props, &mut Binder::Inline)
    }

    pub fn insert_statement(&self, props: &ValueMap) -> String {
        self.render_insert(props, &mut Binder::Inline)
    }

    pub fn delete_statement(&self) -> String {
        format!("DELETE FROM {} WHERE {}", self.from, self.where_clause())
    }

    fn render_update(&self, props: &ValueMap, binder: &mut Binder<'_>) -> String {
        let set = props
            .iter()
            .map(|(column, value)| format!("{}={}", self.dialect.quote_ident(column), binder.bind(value)))
            .collect::<Vec<_>>()
            .join(",");
        format!("UPDATE {} SET {set} WHERE {}", self.from, self.render_where(binder))
    }

    fn render_insert(&self, props: &ValueMap, binder: &mut Binder<'_>) -> String {
        if props.is_empty() {
            return self.dialect.insert_empty_sql(&self.from);
        }
        let columns = props
            .keys()
            .map(|column| self.dialect.quote_ident(column))
            .collect::<Vec<_>>()
            .join(",");
        let values = props
            .values()
            .map(|value| binder.bind(value))
            .collect::<Vec<_>>()
            .join(",");
        format!("INSERT INTO {} ({columns}) VALUES ({values})", self.from)
    }

    fn binder<'a>(&'a self, params: &'a mut Vec<Value>) -> Binder<'a> {
        Binder::Prepared {
            dialect: self.dialect,
            store: self.db.as_ref().map(Db::store),
            params,
        }
    }

    fn check_prepared(&self) -> OrmResult<()> {
        if self.filter.has_transform() {
            return Err(OrmError::configuration(
                "transform functions are not allowed in prepared statements",
            ));
        }
        Ok(())
    }

    fn statement_name(&self, suffix: &str) -> Option<String> {
        self.statement.as_ref().map(|base| format!("{base}_{suffix}"))
    }

    // ==================== Execution ====================

    /// Fetch every matching row.
    pub async fn select(&self, cols: &str) -> OrmResult<Vec<ValueMap>> {
        let db = self.db()?;
        match self.statement_name("select1") {
            Some(name) => {
                let (sql, params) = self.prepared_select_statement(cols)?;
                db.execute_prepared(&name, &sql, &params).await
            }
            None => db.select(&self.select_statement(cols)).await,
        }
    }

    /// Fetch the first matching row, forcing `LIMIT 1`.
    pub async fn select1(&self, cols: &str) -> OrmResult<Option<ValueMap>> {
        let rows = self.clone().limit(1).select(cols).await?;
        Ok(rows.into_iter().next())
    }

    /// Pair the first two selected columns of every row.
    pub async fn select_kv(&self, cols: &str) -> OrmResult<ValueMap> {
        if self.is_prepared() {
            return pair_rows(self.select(cols).await?);
        }
        self.db()?.select_kv(&self.select_statement(cols)).await
    }

    /// Fetch matching rows as records of `model`.
    pub async fn select_as(&self, model: &Model, cols: &str) -> OrmResult<Vec<Record>> {
        let db = self.db()?;
        Ok(self
            .select(cols)
            .await?
            .into_iter()
            .map(|row| Record::from_params(model, db, row))
            .collect())
    }

    /// Count the rows of this select, nested so grouped and joined results count correctly.
    pub async fn count(&self, cols: &str) -> OrmResult<i64> {
        let db = self.db()?;
        let sql = self
            .nest_as(cols, "dt_countable")
            .select_statement("COUNT(*) as count");
        let row = db.select1(&sql).await?;
        Ok(row
            .and_then(|r| r.get("count").and_then(Value::as_i64))
            .unwrap_or(0))
    }

    /// `SUM(col)` over the matching rows.
    pub async fn sum(&self, col: &str) -> OrmResult<Value> {
        let db = self.db()?;
        let sql = self.clone().limit(1).select_statement(&format!("SUM({col}) as total"));
        let row = db.select1(&sql).await?;
        Ok(row.and_then(|r| r.get("total").cloned()).unwrap_or_default())
    }

    /// Update the matching rows; returns the affected count. Empty `props` is a no-op.
    pub async fn update(&self, props: &ValueMap) -> OrmResult<u64> {
        if props.is_empty() {
            return Ok(0);
        }
        let db = self.db()?;
        match self.statement_name("update") {
            Some(name) => {
                self.check_prepared()?;
                let mut params = Vec::new();
                let sql = self.render_update(props, &mut self.binder(&mut params));
                db.execute_prepared_dml(&name, &sql, &params).await
            }
            None => db.query(&self.update_statement(props)).await,
        }
    }

    /// Insert a row; returns the generated id. Empty `props` inserts column defaults.
    pub async fn insert(&self, props: &ValueMap) -> OrmResult<Value> {
        let db = self.db()?;
        match self.statement_name("insert") {
            Some(name) if !props.is_empty() => {
                let mut params = Vec::new();
                let sql = self.render_insert(props, &mut self.binder(&mut params));
                db.execute_prepared_dml(&name, &sql, &params).await?;
                db.last_insert_id().await
            }
            _ => db.insert(&self.insert_statement(props)).await,
        }
    }

    /// Delete the matching rows; returns the affected count.
    pub async fn delete(&self) -> OrmResult<u64> {
        self.db()?.query(&self.delete_statement()).await
    }
}

impl fmt::Display for QueryBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.select_statement("*"))
    }
}

#[cfg(test)]
mod tests;
