//! `tracing` output for executed SQL.
//!
//! Every statement a store runs goes through [`log_sql`] before execution, and
//! every driver failure through [`log_failure`] before it is returned.

use crate::config::SqlLogConfig;
use tracing::Level;

pub(crate) const SQL_TARGET: &str = "relorm.sql";

/// The kind of statement being executed, detected from its leading keyword.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    Select,
    Insert,
    Update,
    Delete,
    Other,
}

impl StatementKind {
    pub fn from_sql(sql: &str) -> Self {
        let head = sql
            .trim_start()
            .split(|c: char| c.is_whitespace() || c == '(')
            .next()
            .unwrap_or_default();
        if head.eq_ignore_ascii_case("SELECT") {
            StatementKind::Select
        } else if head.eq_ignore_ascii_case("INSERT") {
            StatementKind::Insert
        } else if head.eq_ignore_ascii_case("UPDATE") {
            StatementKind::Update
        } else if head.eq_ignore_ascii_case("DELETE") {
            StatementKind::Delete
        } else {
            StatementKind::Other
        }
    }
}

pub(crate) fn truncate_sql_bytes(sql: &str, max_bytes: usize) -> &str {
    if sql.len() <= max_bytes {
        return sql;
    }
    let mut end = max_bytes;
    while end > 0 && !sql.is_char_boundary(end) {
        end -= 1;
    }
    &sql[..end]
}

fn display_sql(config: &SqlLogConfig, sql: &str) -> String {
    match config.max_sql_length {
        Some(max) if sql.len() > max => format!("{}...", truncate_sql_bytes(sql, max)),
        _ => sql.to_string(),
    }
}

/// Emit the statement about to run. `name` is the prepared statement name, if any.
pub(crate) fn log_sql(config: &SqlLogConfig, sql: &str, name: Option<&str>, param_count: usize) {
    /// Dispatch a tracing event at a runtime-determined level.
    macro_rules! emit_at_level {
        ($level:expr, $($field:tt)*) => {
            match $level {
                Level::ERROR => tracing::error!($($field)*),
                Level::WARN  => tracing::warn!($($field)*),
                Level::INFO  => tracing::info!($($field)*),
                Level::DEBUG => tracing::debug!($($field)*),
                Level::TRACE => tracing::trace!($($field)*),
            }
        };
    }

    let kind = StatementKind::from_sql(sql);
    let sql = display_sql(config, sql);
    let name = name.unwrap_or("-");
    emit_at_level!(
        config.level,
        target: SQL_TARGET,
        kind = ?kind,
        name,
        param_count,
        sql = %sql,
    );
}

/// Log a failed statement together with the driver's message.
pub(crate) fn log_failure(config: &SqlLogConfig, sql: &str, err: &crate::OrmError) {
    let sql = display_sql(config, sql);
    tracing::error!(target: SQL_TARGET, sql = %sql, error = %err, "statement failed");
}
