//! Copy whole tables between storage and memory.

use super::Store;
use crate::error::OrmResult;
use crate::qb::format_value;
use crate::value::ValueMap;
use std::collections::BTreeMap;

/// Tables keyed by name, each a list of rows.
pub type Tables = BTreeMap<String, Vec<ValueMap>>;

/// Read every user table into memory.
pub async fn pull_tables(store: &dyn Store) -> OrmResult<Tables> {
    let dialect = store.dialect();
    let mut tables = Tables::new();
    for table in store.all_tables().await? {
        let rows = store
            .select(&format!("SELECT * FROM {}", dialect.quote_ident(&table)))
            .await?;
        tables.insert(table, rows);
    }
    Ok(tables)
}

/// Write in-memory tables to storage.
///
/// Tables that already exist are skipped. New tables are created with one
/// text column per key seen across their rows; rows are inserted inline.
/// Returns the names of the tables created.
pub async fn push_tables(store: &dyn Store, tables: &Tables) -> OrmResult<Vec<String>> {
    let dialect = store.dialect();
    let existing = store.all_tables().await?;
    let mut created = Vec::new();

    for (table, rows) in tables {
        if existing.iter().any(|t| t == table) {
            continue;
        }

        let mut all_cols: Vec<&str> = Vec::new();
        for row in rows {
            for col in row.keys() {
                if !all_cols.contains(&col) {
                    all_cols.push(col);
                }
            }
        }
        if all_cols.is_empty() {
            continue;
        }

        let create_cols = all_cols
            .iter()
            .map(|c| format!("{} text", dialect.quote_ident(c)))
            .collect::<Vec<_>>()
            .join(",");
        store
            .query(&format!(
                "CREATE TABLE {} ({create_cols})",
                dialect.quote_ident(table)
            ))
            .await?;

        for row in rows {
            let cols = row
                .keys()
                .map(|c| dialect.quote_ident(c))
                .collect::<Vec<_>>()
                .join(",");
            let vals = row.values().map(format_value).collect::<Vec<_>>().join(",");
            store
                .query(&format!(
                    "INSERT INTO {} ({cols}) VALUES ({vals})",
                    dialect.quote_ident(table)
                ))
                .await?;
        }
        created.push(table.clone());
    }
    Ok(created)
}
