//! Structured filter conditions and literal rendering.

use crate::dialect::Dialect;
use crate::store::Store;
use crate::value::{Value, ValueMap};

/// A condition on one filter column.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// `col='v'`, or `col IS NULL` for [`Value::Null`].
    Eq(Value),
    /// `col op v`. A [`Value::List`] renders as `(a,b)`; a transform wraps the
    /// rendered operand as `transform(v)` and is rejected by prepared builders.
    Compare {
        op: String,
        value: Value,
        transform: Option<String>,
    },
}

impl Condition {
    pub fn eq(value: impl Into<Value>) -> Self {
        Condition::Eq(value.into())
    }

    pub fn is_null() -> Self {
        Condition::Eq(Value::Null)
    }

    pub fn op(op: impl Into<String>, value: impl Into<Value>) -> Self {
        Condition::Compare {
            op: op.into(),
            value: value.into(),
            transform: None,
        }
    }

    /// Comparison whose rendered operand is wrapped in a SQL function, e.g. `LOWER`.
    pub fn op_with(op: impl Into<String>, value: impl Into<Value>, transform: impl Into<String>) -> Self {
        Condition::Compare {
            op: op.into(),
            value: value.into(),
            transform: Some(transform.into()),
        }
    }

    /// `col IN (...)`.
    pub fn in_list<T: Into<Value>>(values: impl IntoIterator<Item = T>) -> Self {
        Condition::op("IN", Value::List(values.into_iter().map(Into::into).collect()))
    }

    fn has_transform(&self) -> bool {
        matches!(self, Condition::Compare { transform: Some(_), .. })
    }
}

macro_rules! condition_from_value {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for Condition {
                fn from(v: $ty) -> Self {
                    Condition::Eq(Value::from(v))
                }
            }
        )*
    };
}

condition_from_value!(Value, &str, String, &String, bool, i64, i32, u32, f64, ValueMap);

/// One accumulated filter entry.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct FilterEntry {
    pub(crate) column: String,
    /// Raw keys are emitted without identifier quoting.
    pub(crate) raw: bool,
    pub(crate) condition: Condition,
}

/// Ordered filter accumulator; a repeated column replaces its earlier entry in place.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct Filter {
    entries: Vec<FilterEntry>,
}

impl Filter {
    pub(crate) fn merge(&mut self, column: String, condition: Condition) {
        match self.entries.iter_mut().find(|e| !e.raw && e.column == column) {
            Some(entry) => entry.condition = condition,
            None => self.entries.push(FilterEntry {
                column,
                raw: false,
                condition,
            }),
        }
    }

    /// Replace everything with a term that never matches.
    pub(crate) fn fail(&mut self) {
        self.entries = vec![FilterEntry {
            column: "1".to_string(),
            raw: true,
            condition: Condition::Eq(Value::Int(0)),
        }];
    }

    pub(crate) fn has_transform(&self) -> bool {
        self.entries.iter().any(|e| e.condition.has_transform())
    }

    pub(crate) fn render(&self, dialect: Dialect, binder: &mut Binder<'_>) -> Vec<String> {
        self.entries
            .iter()
            .map(|entry| {
                let column = if entry.raw {
                    entry.column.clone()
                } else {
                    dialect.quote_ident(&entry.column)
                };
                render_term(&column, &entry.condition, binder)
            })
            .collect()
    }
}

fn render_term(column: &str, condition: &Condition, binder: &mut Binder<'_>) -> String {
    match condition {
        Condition::Eq(Value::Null) => format!("{column} IS NULL"),
        Condition::Eq(value) => format!("{column}={}", binder.bind(value)),
        Condition::Compare {
            op,
            value,
            transform,
        } => {
            let rendered = match value {
                Value::List(items) if items.is_empty() => "(NULL)".to_string(),
                Value::List(items) => {
                    let parts: Vec<String> = items.iter().map(|v| binder.bind(v)).collect();
                    format!("({})", parts.join(","))
                }
                Value::Null => "NULL".to_string(),
                other => binder.bind(other),
            };
            match transform {
                Some(tx) => format!("{column} {op} {tx}({rendered})"),
                None => format!("{column} {op} {rendered}"),
            }
        }
    }
}

/// How literals become SQL: quoted inline, or collected behind placeholders.
pub(crate) enum Binder<'a> {
    Inline,
    Prepared {
        dialect: Dialect,
        store: Option<&'a dyn Store>,
        params: &'a mut Vec<Value>,
    },
}

impl Binder<'_> {
    pub(crate) fn bind(&mut self, value: &Value) -> String {
        match self {
            Binder::Inline => format_value(value),
            // Trusted expressions stay verbatim in both modes.
            Binder::Prepared { .. } if matches!(value, Value::Expr(_)) => format_value(value),
            Binder::Prepared {
                dialect,
                store,
                params,
            } => match store {
                Some(store) => store.placeholder(params, value.clone()),
                None => {
                    params.push(value.clone());
                    dialect.placeholder(params.len())
                }
            },
        }
    }
}

fn quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

/// Render a value as an inline SQL literal.
///
/// `Null` becomes `NULL`, lists and maps become quoted JSON, [`Value::Expr`]
/// is emitted verbatim and everything else is single-quoted with embedded
/// quotes doubled.
pub fn format_value(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Expr(sql) => sql.clone(),
        Value::List(_) | Value::Map(_) => quote(&value.encode_json()),
        Value::Bool(b) => quote(if *b { "1" } else { "0" }),
        other => quote(&other.to_string()),
    }
}
