//! Storage-formatted timestamps.
//!
//! Postgres and SQLite values carry their zone (`UTC` or a numeric offset);
//! MySQL `DATETIME` columns reject a zone suffix, so its values are bare.

use crate::dialect::Dialect;
use chrono::{DateTime, Local, TimeZone, Utc};

fn utc(ts: Option<i64>) -> DateTime<Utc> {
    ts.and_then(|secs| Utc.timestamp_opt(secs, 0).single())
        .unwrap_or_else(Utc::now)
}

fn local(ts: Option<i64>) -> DateTime<Local> {
    ts.and_then(|secs| Local.timestamp_opt(secs, 0).single())
        .unwrap_or_else(Local::now)
}

/// Current UTC time in storage format.
pub fn now(dialect: Dialect) -> String {
    gmdate(dialect, None)
}

/// Local calendar day of `ts` (default: now).
pub fn day(dialect: Dialect, ts: Option<i64>) -> String {
    let ts = local(ts);
    match dialect {
        Dialect::MySql => ts.format("%Y-%m-%d").to_string(),
        _ => ts.format("%Y-%m-%d %:z").to_string(),
    }
}

/// Local date and time of `ts` (default: now).
pub fn date(dialect: Dialect, ts: Option<i64>) -> String {
    let ts = local(ts);
    match dialect {
        Dialect::MySql => ts.format("%Y-%m-%d %H:%M:%S").to_string(),
        _ => ts.format("%Y-%m-%d %H:%M:%S %:z").to_string(),
    }
}

/// UTC date and time of `ts` (default: now).
pub fn gmdate(dialect: Dialect, ts: Option<i64>) -> String {
    let ts = utc(ts);
    match dialect {
        Dialect::MySql => ts.format("%Y-%m-%d %H:%M:%S").to_string(),
        _ => ts.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
    }
}

/// Local wall-clock time of `ts` (default: now).
pub fn time(ts: Option<i64>) -> String {
    local(ts).format("%H:%M:%S").to_string()
}
