//! Per-backend SQL constants: identifier quoting, placeholders and introspection.

use std::fmt;

/// The SQL flavour a [`Store`](crate::Store) speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dialect {
    Postgres,
    MySql,
    Sqlite,
}

impl Dialect {
    /// Character used to quote identifiers.
    pub fn col_esc(self) -> char {
        match self {
            Dialect::MySql => '`',
            Dialect::Postgres | Dialect::Sqlite => '"',
        }
    }

    /// Case-insensitive LIKE keyword.
    pub fn ilike(self) -> &'static str {
        match self {
            Dialect::Postgres => "ILIKE",
            Dialect::MySql | Dialect::Sqlite => "LIKE",
        }
    }

    /// Placeholder token for the 1-based parameter `index`.
    pub fn placeholder(self, index: usize) -> String {
        match self {
            Dialect::Postgres => format!("${index}"),
            Dialect::MySql => "?".to_string(),
            Dialect::Sqlite => format!("?{index}"),
        }
    }

    /// Quote an identifier, dot-separated part by part.
    ///
    /// `*` parts are left alone so `Model.*` becomes `"Model".*`. Embedded
    /// escape characters are doubled.
    pub fn quote_ident(self, ident: &str) -> String {
        let esc = self.col_esc();
        let mut out = String::with_capacity(ident.len() + 4);
        for (i, part) in ident.split('.').enumerate() {
            if i > 0 {
                out.push('.');
            }
            if part == "*" {
                out.push('*');
                continue;
            }
            out.push(esc);
            for c in part.chars() {
                if c == esc {
                    out.push(esc);
                }
                out.push(c);
            }
            out.push(esc);
        }
        out
    }

    /// `table alias` with both parts quoted.
    pub fn table_alias(self, table: &str, alias: &str) -> String {
        format!("{} {}", self.quote_ident(table), self.quote_ident(alias))
    }

    /// Statement returning the id generated by the last insert, as column `id`.
    pub fn last_insert_id_sql(self) -> &'static str {
        match self {
            Dialect::Postgres => "SELECT LASTVAL() AS id",
            Dialect::MySql => "SELECT LAST_INSERT_ID() AS id",
            Dialect::Sqlite => "SELECT last_insert_rowid() AS id",
        }
    }

    /// Insert a row made only of column defaults into an already rendered `target`.
    pub fn insert_empty_sql(self, target: &str) -> String {
        match self {
            Dialect::MySql => format!("INSERT INTO {target} () VALUES ()"),
            Dialect::Postgres | Dialect::Sqlite => format!("INSERT INTO {target} DEFAULT VALUES"),
        }
    }

    /// Statement listing the columns of `table`, and the result column holding each name.
    pub fn columns_sql(self, table: &str) -> (String, &'static str) {
        let literal = table.replace('\'', "''");
        match self {
            Dialect::Postgres => (
                format!(
                    "SELECT column_name FROM information_schema.columns \
                     WHERE table_name = '{literal}' ORDER BY ordinal_position"
                ),
                "column_name",
            ),
            Dialect::MySql => (
                format!("SHOW COLUMNS FROM {}", self.quote_ident(table)),
                "Field",
            ),
            Dialect::Sqlite => (
                format!("PRAGMA table_info({})", self.quote_ident(table)),
                "name",
            ),
        }
    }

    /// Statement listing user tables, as column `name`.
    pub fn tables_sql(self) -> &'static str {
        match self {
            Dialect::Postgres => "SELECT relname AS name FROM pg_stat_user_tables ORDER BY relname",
            Dialect::MySql => "SELECT table_name AS name FROM information_schema.tables \
                 WHERE table_schema = DATABASE() ORDER BY table_name",
            Dialect::Sqlite => "SELECT name FROM sqlite_master \
                 WHERE type = 'table' AND name <> 'sqlite_sequence' ORDER BY name",
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Dialect::Postgres => "postgres",
            Dialect::MySql => "mysql",
            Dialect::Sqlite => "sqlite",
        })
    }
}
