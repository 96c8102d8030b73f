//! # relorm
//!
//! A manifest-driven relational model layer.
//!
//! ## Features
//!
//! - **Storage interface**: backends implement one async [`Store`] trait (Postgres and SQLite included)
//! - **Query builder**: filters, raw where clauses and an enforce clause an `OR` can never escape
//! - **Prepared mode**: the same builder renders placeholders and runs through cached named statements
//! - **Dynamic records**: getters, setters, declared fields and a property bag, with dirty tracking
//! - **Relationships**: has-a, has-many chains through link tables, and table-per-class is-a inheritance
//! - **Upserts**: select-then-insert-or-update, including replacing a whole has-many set in one call
//! - **SQL logging**: every statement goes through `tracing` on the `relorm.sql` target
//!
//! ## Models
//!
//! ```ignore
//! use relorm::prelude::*;
//!
//! let registry = Registry::builder()
//!     .register(ModelDef::new("Post").table("posts").has_many("tags", ["Tagging", "Tag"]))
//!     .register(
//!         ModelDef::new("Tagging")
//!             .table("taggings")
//!             .has_a("post", "Post", "post_id")
//!             .has_a("tag", "Tag", "tag_id"),
//!     )
//!     .register(ModelDef::new("Tag").table("tags").field("name", ""))
//!     .build()?;
//!
//! let db = Db::connect("sqlite::memory:", registry, DbConfig::default()).await?;
//! let posts = db.model("Post")?;
//!
//! let mut post = posts
//!     .upsert(db.filter([("Post.slug", "hello")]), params! { "slug" => "hello" }, params! {})
//!     .await?;
//! post.set("tags", Value::List(vec![1.into(), 2.into()])).await?;
//! let tags = post.get("tags").await?;
//! ```

pub mod config;
pub mod db;
pub mod dialect;
pub mod error;
pub(crate) mod log;
pub mod model;
pub mod prelude;
pub mod qb;
pub mod store;
pub mod value;

pub use config::{DbConfig, SqlLogConfig, StatementCacheConfig};
pub use db::{Db, WeakDb};
pub use dialect::Dialect;
pub use error::{OrmError, OrmResult};
pub use model::{
    Chain, Changes, HasA, IsA, Link, LinkSet, Model, ModelDef, Property, Purpose, Record, Registry,
    RegistryBuilder, RowBuilder,
};
pub use qb::{Condition, QueryBuilder, format_value};
pub use store::{PreparedStatement, Store, connect};
pub use value::{OrderedMap, Value, ValueMap};

#[cfg(feature = "sqlite")]
pub use store::SqliteStore;
pub use store::PgStore;
