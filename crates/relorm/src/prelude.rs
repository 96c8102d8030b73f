//! Convenient imports for typical `relorm` usage.
//!
//! ```ignore
//! use relorm::prelude::*;
//! ```

pub use crate::{
    Condition, Db, DbConfig, Model, ModelDef, OrmError, OrmResult, Property, QueryBuilder, Record,
    Registry, Store, Value, ValueMap, params,
};
