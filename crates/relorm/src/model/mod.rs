//! Manifest-driven models.
//!
//! A model type is declared with a [`ModelDef`]: its table, primary key,
//! declared fields, accessors and relationship manifests. Definitions are
//! registered into a [`Registry`], which validates cross references and
//! resolves inheritance once into immutable [`Model`] handles. Rows are
//! materialized as dynamic [`Record`]s.
//!
//! ```ignore
//! let registry = Registry::builder()
//!     .register(ModelDef::new("Person").table("people").field("name", Value::Null))
//!     .register(
//!         ModelDef::new("Post")
//!             .table("posts")
//!             .has_a("author", "Person", "author_id")
//!             .has_many("tags", ["Tagging", "Tag"]),
//!     )
//!     .register(ModelDef::new("Tag").table("tags"))
//!     .register(
//!         ModelDef::new("Tagging")
//!             .table("taggings")
//!             .has_a("post", "Post", "post_id")
//!             .has_a("tag", "Tag", "tag_id"),
//!     )
//!     .build()?;
//! ```

mod manifest;
mod record;
mod registry;
mod relations;
mod upsert;

pub use manifest::{Chain, DEFAULT_HAS_A_DEPTH, HasA, IsA, Link};
pub use record::{Changes, Property, Purpose, Record};
pub use registry::{Registry, RegistryBuilder};
pub use relations::{LinkSet, RowBuilder};

use crate::db::Db;
use crate::error::{OrmError, OrmResult};
use crate::qb::{Condition, QueryBuilder};
use crate::value::{OrderedMap, Value, ValueMap};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Computed property read.
pub type Getter = Arc<dyn Fn(&Record) -> Value + Send + Sync>;
/// Property write that replaces the default storage of a value.
pub type Setter = Arc<dyn Fn(&mut Record, Value) + Send + Sync>;
/// Pre-storage transform applied by [`Record::clean`], keyed by column name.
pub type Transform = Arc<dyn Fn(&str, Value) -> Value + Send + Sync>;

/// Accessor lookup key for a property name: alphanumerics only, lowercased.
pub fn accessor_name(property: &str) -> String {
    property
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// Declaration of one model type, as registered.
#[derive(Clone)]
pub struct ModelDef {
    pub(crate) name: String,
    pub(crate) table: Option<String>,
    pub(crate) primary_key: Option<String>,
    pub(crate) strict: Option<bool>,
    pub(crate) extends: Option<String>,
    pub(crate) fields: ValueMap,
    pub(crate) has_a: OrderedMap<HasA>,
    pub(crate) has_many: OrderedMap<Chain>,
    pub(crate) is_a: Vec<IsA>,
    pub(crate) getters: HashMap<String, Getter>,
    pub(crate) setters: HashMap<String, Setter>,
    pub(crate) transform: Option<Transform>,
}

impl ModelDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            table: None,
            primary_key: None,
            strict: None,
            extends: None,
            fields: ValueMap::new(),
            has_a: OrderedMap::new(),
            has_many: OrderedMap::new(),
            is_a: Vec::new(),
            getters: HashMap::new(),
            setters: HashMap::new(),
            transform: None,
        }
    }

    /// Backing table; inherited from the parent type when unset.
    pub fn table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    /// Primary key column; `id` unless set here or on an ancestor.
    pub fn primary_key(mut self, column: impl Into<String>) -> Self {
        self.primary_key = Some(column.into());
        self
    }

    /// Refuse undeclared properties instead of keeping them in the bag.
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = Some(strict);
        self
    }

    /// Inherit fields, manifests and accessors from `parent`.
    pub fn extends(mut self, parent: impl Into<String>) -> Self {
        self.extends = Some(parent.into());
        self
    }

    /// Declare a field with its default value.
    pub fn field(mut self, name: impl Into<String>, default: impl Into<Value>) -> Self {
        self.fields.insert(name, default);
        self
    }

    pub fn has_a(self, name: impl Into<String>, target: &str, column: impl Into<String>) -> Self {
        self.has_a_entry(name.into(), target, column.into(), None)
    }

    pub fn has_a_depth(
        self,
        name: impl Into<String>,
        target: &str,
        column: impl Into<String>,
        depth: u32,
    ) -> Self {
        self.has_a_entry(name.into(), target, column.into(), Some(depth))
    }

    fn has_a_entry(mut self, name: String, target: &str, column: String, depth: Option<u32>) -> Self {
        self.has_a.insert(
            name,
            HasA {
                target: Link::parse(target),
                column,
                depth,
            },
        );
        self
    }

    /// Declare a has-many chain of `Model` / `Model.column` links. A trailing
    /// numeric element caps the recursion depth.
    pub fn has_many<I, S>(mut self, name: impl Into<String>, links: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.has_many.insert(name, Chain::parse(links));
        self
    }

    pub fn has_many_depth<I, S>(mut self, name: impl Into<String>, links: I, depth: u32) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut chain = Chain::parse(links);
        chain.depth = Some(depth);
        self.has_many.insert(name, chain);
        self
    }

    /// Declare that `column` references the parent row of `target` (`Model` or `Model.column`).
    pub fn is_a(mut self, column: impl Into<String>, target: &str) -> Self {
        let column = column.into();
        self.is_a.retain(|entry| entry.column != column);
        self.is_a.push(IsA {
            column,
            target: Link::parse(target),
        });
        self
    }

    pub fn getter<F>(mut self, property: &str, getter: F) -> Self
    where
        F: Fn(&Record) -> Value + Send + Sync + 'static,
    {
        self.getters.insert(accessor_name(property), Arc::new(getter));
        self
    }

    pub fn setter<F>(mut self, property: &str, setter: F) -> Self
    where
        F: Fn(&mut Record, Value) + Send + Sync + 'static,
    {
        self.setters.insert(accessor_name(property), Arc::new(setter));
        self
    }

    pub fn transform<F>(mut self, transform: F) -> Self
    where
        F: Fn(&str, Value) -> Value + Send + Sync + 'static,
    {
        self.transform = Some(Arc::new(transform));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Debug for ModelDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelDef")
            .field("name", &self.name)
            .field("table", &self.table)
            .field("extends", &self.extends)
            .finish_non_exhaustive()
    }
}

pub(crate) struct ModelInner {
    pub(crate) name: String,
    pub(crate) table: Option<String>,
    pub(crate) primary_key: String,
    pub(crate) strict: bool,
    pub(crate) parent: Option<String>,
    pub(crate) fields: ValueMap,
    pub(crate) has_a: OrderedMap<HasA>,
    pub(crate) has_many: OrderedMap<Chain>,
    pub(crate) is_a: Vec<IsA>,
    pub(crate) getters: HashMap<String, Getter>,
    pub(crate) setters: HashMap<String, Setter>,
    pub(crate) transform: Option<Transform>,
    /// Self first, then each parent up to the root.
    pub(crate) ancestors: Vec<String>,
}

/// A resolved model type. Cheap to clone.
#[derive(Clone)]
pub struct Model(pub(crate) Arc<ModelInner>);

impl Model {
    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub fn table(&self) -> Option<&str> {
        self.0.table.as_deref()
    }

    pub(crate) fn require_table(&self) -> OrmResult<&str> {
        self.table().ok_or_else(|| {
            OrmError::InvalidConstruction(format!("model {} has no storage table", self.name()))
        })
    }

    pub fn primary_key(&self) -> &str {
        &self.0.primary_key
    }

    pub fn is_strict(&self) -> bool {
        self.0.strict
    }

    pub fn parent(&self) -> Option<&str> {
        self.0.parent.as_deref()
    }

    /// Declared fields and their defaults, parents first.
    pub fn fields(&self) -> &ValueMap {
        &self.0.fields
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.0.fields.contains_key(name)
    }

    pub fn has_a(&self, name: &str) -> Option<&HasA> {
        self.0.has_a.get(name)
    }

    pub fn has_many(&self, name: &str) -> Option<&Chain> {
        self.0.has_many.get(name)
    }

    /// Is-a entries, own entries before inherited ones.
    pub fn is_a(&self) -> &[IsA] {
        &self.0.is_a
    }

    /// This type followed by its parents, most derived first.
    pub fn ancestors(&self) -> &[String] {
        &self.0.ancestors
    }

    pub(crate) fn getter(&self, property: &str) -> Option<Getter> {
        self.0.getters.get(&accessor_name(property)).cloned()
    }

    pub(crate) fn setter(&self, property: &str) -> Option<Setter> {
        self.0.setters.get(&accessor_name(property)).cloned()
    }

    pub(crate) fn transform(&self) -> Option<&Transform> {
        self.0.transform.as_ref()
    }

    fn quoted(&self, db: &Db, ident: &str) -> String {
        db.dialect().quote_ident(ident)
    }

    /// `table "Model"`, the aliased from-clause used for reads.
    pub(crate) fn aliased_table(&self, db: &Db) -> OrmResult<String> {
        Ok(db.dialect().table_alias(self.require_table()?, self.name()))
    }

    /// `"Model".column`, quoted.
    pub(crate) fn qualified(&self, db: &Db, column: &str) -> String {
        self.quoted(db, &format!("{}.{column}", self.name()))
    }

    // ==================== Relationship lookups ====================

    /// The column on this model that references `other` through a has-a entry,
    /// trying `other` and then each of its parents. Falls back to the primary key
    /// when this model holds no such reference.
    pub fn column_for_model(&self, registry: &Registry, other: &str) -> String {
        let mut current = Some(other.to_string());
        while let Some(name) = current {
            for (_, has_a) in self.0.has_a.iter() {
                let refers = registry
                    .get(&has_a.target.model)
                    .is_some_and(|target| target.ancestors().iter().any(|a| *a == name));
                if refers {
                    return has_a.column.clone();
                }
            }
            current = registry
                .get(&name)
                .and_then(|m| m.parent().map(str::to_string));
        }
        self.primary_key().to_string()
    }

    /// The alias `other`'s table is joined under when this model is read under its own name.
    pub fn alias_for_parent(&self, registry: &Registry, other: &str) -> Option<String> {
        if other == self.name() {
            return Some(self.name().to_string());
        }
        let mut model = self.clone();
        let mut alias = self.name().to_string();
        while let Some(is_a) = model.is_a().first() {
            let parent = registry.get(&is_a.target.model)?;
            alias = parent_alias(model.name(), &alias, parent.name());
            if parent.name() == other {
                return Some(alias);
            }
            model = parent;
        }
        None
    }

    // ==================== Reads ====================

    /// Join this model's nearest is-a parent (and, through it, every further
    /// ancestor) onto a select of this model aliased `alias`. With `project`,
    /// the parent's columns are added to the projection.
    pub fn is_a_join(&self, qb: QueryBuilder, alias: &str, project: bool) -> OrmResult<QueryBuilder> {
        let Some(is_a) = self.is_a().first() else {
            return Ok(qb);
        };
        let db = qb.db()?.clone();
        let parent = db.model(&is_a.target.model)?;
        let dst_col = is_a
            .target
            .column
            .clone()
            .unwrap_or_else(|| parent.primary_key().to_string());
        let dst_alias = parent_alias(self.name(), alias, parent.name());
        let dialect = db.dialect();
        let on = format!(
            "{}={}",
            dialect.quote_ident(&format!("{alias}.{}", is_a.column)),
            dialect.quote_ident(&format!("{dst_alias}.{dst_col}")),
        );
        let qb = qb.join(&dialect.table_alias(parent.require_table()?, &dst_alias), &on);
        let qb = parent.is_a_join(qb, &dst_alias, project)?;
        Ok(if project {
            qb.add_column(dialect.quote_ident(&format!("{dst_alias}.*")))
        } else {
            qb
        })
    }

    /// Point `qb` at this model's table, aliased by model name, with parent tables joined in.
    pub fn select_qb(&self, qb: QueryBuilder) -> OrmResult<QueryBuilder> {
        let db = qb.db()?.clone();
        let qb = qb.from(self.aliased_table(&db)?);
        let qb = self.is_a_join(qb, self.name(), true)?;
        if self.is_a().is_empty() {
            return Ok(qb);
        }
        // Re-project our own columns last so the child's primary key wins.
        Ok(qb.add_column(self.qualified(&db, "*")))
    }

    /// Construct a record from the single row `qb` matches.
    pub async fn find(&self, qb: QueryBuilder) -> OrmResult<Record> {
        self.require_table()?;
        let db = qb.db()?.clone();
        let qb = self.select_qb(qb)?;
        let cols = format!("*, {}", self.qualified(&db, "*"));
        match qb.select1(&cols).await? {
            Some(row) => Ok(Record::from_params(self, &db, row)),
            None => Err(OrmError::not_found(format!(
                "{} not found in storage: {qb}",
                self.name()
            ))),
        }
    }

    /// Matching records; `cols` defaults to `"Model".*`.
    pub async fn select(&self, qb: QueryBuilder, cols: Option<&str>) -> OrmResult<Vec<Record>> {
        let db = qb.db()?.clone();
        let qb = self.select_qb(qb)?;
        let cols = cols.map_or_else(|| self.qualified(&db, "*"), str::to_string);
        qb.select_as(self, &cols).await
    }

    pub async fn select_kv(&self, qb: QueryBuilder, cols: &str) -> OrmResult<ValueMap> {
        self.select_qb(qb)?.select_kv(cols).await
    }

    pub async fn count(&self, qb: QueryBuilder) -> OrmResult<i64> {
        let db = qb.db()?.clone();
        let qb = qb.from(self.aliased_table(&db)?);
        qb.count(&self.qualified(&db, "*")).await
    }

    pub async fn sum(&self, qb: QueryBuilder, col: &str) -> OrmResult<Value> {
        let db = qb.db()?.clone();
        qb.from(self.aliased_table(&db)?).sum(col).await
    }

    /// The record whose primary key is `id`, if any.
    pub async fn by_id(&self, db: &Db, id: impl Into<Value>) -> OrmResult<Option<Record>> {
        let key = format!("{}.{}", self.name(), self.primary_key());
        let qb = db.filter([(key, Condition::eq(id))]);
        Ok(self.select(qb, None).await?.into_iter().next())
    }

    // ==================== Writes ====================

    /// Update every row `qb` matches.
    pub async fn update_rows(&self, qb: QueryBuilder, params: &ValueMap) -> OrmResult<u64> {
        let db = qb.db()?.clone();
        let table = db.dialect().quote_ident(self.require_table()?);
        qb.from(table).update(params).await
    }

    /// Delete every row `qb` matches.
    pub async fn delete_rows(&self, qb: QueryBuilder) -> OrmResult<u64> {
        let db = qb.db()?.clone();
        let table = db.dialect().quote_ident(self.require_table()?);
        qb.from(table).delete().await
    }

    /// Keep only the keys of `params` that are columns of this model's table,
    /// qualified as `Model.column`.
    pub async fn search_filter(&self, db: &Db, params: &ValueMap) -> OrmResult<ValueMap> {
        let columns = db.columns_for_table(self.require_table()?).await?;
        Ok(params
            .iter()
            .filter(|(key, _)| columns.iter().any(|c| c == key))
            .map(|(key, value)| (format!("{}.{key}", self.name()), value.clone()))
            .collect())
    }

    /// Run `params` through a fresh record's setters and return its storage
    /// properties, minus the primary key.
    pub async fn process_for_storage(&self, db: &Db, params: ValueMap) -> OrmResult<ValueMap> {
        let mut record = Record::new(self, db);
        record.merge(params).await?;
        let mut props = record
            .storage_properties(Purpose::Update, ValueMap::new())
            .await?;
        props.remove(self.primary_key());
        Ok(props)
    }
}

/// Alias of a parent table joined under a child aliased `alias`.
fn parent_alias(model: &str, alias: &str, parent: &str) -> String {
    if alias == model {
        format!("{parent}_0")
    } else {
        format!("{alias}_{parent}")
    }
}

impl fmt::Debug for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Model")
            .field("name", &self.0.name)
            .field("table", &self.0.table)
            .field("primary_key", &self.0.primary_key)
            .field("ancestors", &self.0.ancestors)
            .finish_non_exhaustive()
    }
}

impl PartialEq for Model {
    fn eq(&self, other: &Self) -> bool {
        self.0.name == other.0.name
    }
}
