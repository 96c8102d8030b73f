//! Dynamic records: layered property access, dirty tracking and CRUD.

use super::Model;
use crate::db::{Db, WeakDb};
use crate::error::OrmResult;
use crate::qb::{Condition, QueryBuilder};
use crate::value::{OrderedMap, Value, ValueMap};
use serde_json::{Map as JsonMap, Value as JsonValue};
use std::fmt;

/// A property value: a scalar, or loaded related records.
#[derive(Debug, Clone, PartialEq)]
pub enum Property {
    Value(Value),
    One(Box<Record>),
    Many(Vec<Record>),
}

impl Default for Property {
    fn default() -> Self {
        Property::Value(Value::Null)
    }
}

impl Property {
    pub fn is_null(&self) -> bool {
        matches!(self, Property::Value(Value::Null))
    }

    /// The scalar form: related records collapse to their primary keys.
    pub fn to_value(&self) -> Value {
        match self {
            Property::Value(v) => v.clone(),
            Property::One(record) => record.primary_key(),
            Property::Many(records) => Value::List(records.iter().map(Record::primary_key).collect()),
        }
    }

    pub fn as_record(&self) -> Option<&Record> {
        match self {
            Property::One(record) => Some(record),
            _ => None,
        }
    }

    pub fn as_records(&self) -> Option<&[Record]> {
        match self {
            Property::Many(records) => Some(records),
            _ => None,
        }
    }

    fn to_json(&self) -> JsonValue {
        match self {
            Property::Value(v) => v.to_json(),
            Property::One(record) => JsonValue::Object(record.public_properties()),
            Property::Many(records) => JsonValue::Array(
                records
                    .iter()
                    .map(|r| JsonValue::Object(r.public_properties()))
                    .collect(),
            ),
        }
    }
}

macro_rules! property_from_value {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for Property {
                fn from(v: $ty) -> Self {
                    Property::Value(Value::from(v))
                }
            }
        )*
    };
}

property_from_value!(Value, &str, String, &String, bool, i64, i32, u32, f64, ValueMap, Vec<Value>);

impl From<Record> for Property {
    fn from(record: Record) -> Self {
        Property::One(Box::new(record))
    }
}

impl From<Vec<Record>> for Property {
    fn from(records: Vec<Record>) -> Self {
        Property::Many(records)
    }
}

impl From<Option<Record>> for Property {
    fn from(record: Option<Record>) -> Self {
        record.map_or_else(Property::default, Property::from)
    }
}

/// Old and new values of the backing columns a merge changed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Changes {
    pub old: ValueMap,
    pub new: ValueMap,
}

impl Changes {
    pub fn is_empty(&self) -> bool {
        self.new.is_empty()
    }

    /// Fold in later changes; the earliest old value of a column is kept.
    pub fn extend(&mut self, other: Changes) {
        for (column, old) in other.old {
            if !self.old.contains_key(&column) {
                self.old.insert(column, old);
            }
        }
        self.new.merge(other.new);
    }
}

/// What storage properties are being collected for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Purpose {
    /// A new row: the primary key is left to storage.
    Insert,
    Update,
    /// Normalizing a row just read back, see [`Record::clean`].
    Reinsertion,
}

/// One row of a model, with dynamic property access.
///
/// Reads go through a getter, then the declared field, then the bag, then
/// has-many and has-a resolution. Writes go through a setter, then has-many
/// and has-a (both write to storage immediately), then the declared field,
/// then the bag.
#[derive(Debug, Clone)]
pub struct Record {
    pub(crate) model: Model,
    pub(crate) db: WeakDb,
    fields: OrderedMap<Property>,
    bag: OrderedMap<Property>,
    appended: Vec<Property>,
    pub(crate) input: ValueMap,
    pub(crate) recursion_depth: Option<u32>,
    bypass_accessors: bool,
    pub(crate) unsanitary: bool,
}

impl Record {
    /// An empty record of `model` with declared defaults.
    pub fn new(model: &Model, db: &Db) -> Self {
        Self::detached(model).attach(db)
    }

    /// An empty record with no storage association.
    pub fn detached(model: &Model) -> Self {
        Self {
            model: model.clone(),
            db: WeakDb::new(),
            fields: model
                .fields()
                .iter()
                .map(|(k, v)| (k, Property::Value(v.clone())))
                .collect(),
            bag: OrderedMap::new(),
            appended: Vec::new(),
            input: ValueMap::new(),
            recursion_depth: None,
            bypass_accessors: false,
            unsanitary: true,
        }
    }

    /// Populate declared fields and the bag directly, skipping setters and relationships.
    pub fn from_params(model: &Model, db: &Db, params: ValueMap) -> Self {
        let mut record = Self::new(model, db);
        record.bypass_accessors = true;
        for (key, value) in params {
            record.assign(&key, Property::Value(value));
        }
        record.bypass_accessors = false;
        record
    }

    fn attach(mut self, db: &Db) -> Self {
        self.db = db.downgrade();
        self
    }

    pub fn model(&self) -> &Model {
        &self.model
    }

    /// The storage context this record came from.
    pub fn db(&self) -> OrmResult<Db> {
        self.db.upgrade()
    }

    pub fn primary_key(&self) -> Value {
        self.value(self.model.primary_key())
    }

    pub fn recursion_depth(&self) -> Option<u32> {
        self.recursion_depth
    }

    /// The params given to the last [`merge`](Self::merge).
    pub fn input(&self) -> &ValueMap {
        &self.input
    }

    /// Values pushed without a key.
    pub fn appended(&self) -> &[Property] {
        &self.appended
    }

    /// True once [`clean`](Self::clean) has run.
    pub fn is_clean(&self) -> bool {
        !self.unsanitary
    }

    /// Declared fields and bag entries are dirty: they are written back to storage.
    pub fn is_dirty(&self, name: &str) -> bool {
        self.fields.contains_key(name) || self.bag.contains_key(name)
    }

    // ==================== Local access ====================

    /// Field or bag content, ignoring getters. Meant for use inside accessors.
    pub fn raw(&self, name: &str) -> Option<&Property> {
        if let Some(p) = self.fields.get(name).filter(|p| !p.is_null()) {
            return Some(p);
        }
        if self.model.is_strict() {
            return None;
        }
        self.bag.get(name).filter(|p| !p.is_null())
    }

    /// Getter, then field, then bag. Never touches storage.
    pub fn value(&self, name: &str) -> Value {
        if let Some(getter) = self.model.getter(name) {
            return getter(self);
        }
        self.raw(name).map(Property::to_value).unwrap_or_default()
    }

    /// Store into the declared field, or the bag unless the model is strict.
    pub fn set_raw(&mut self, name: &str, value: impl Into<Property>) {
        let value = value.into();
        if let Some(slot) = self.fields.get_mut(name) {
            *slot = value;
        } else if !self.model.is_strict() {
            self.bag.insert(name, value);
        } else {
            tracing::debug!(
                target: "relorm",
                model = self.model.name(),
                property = name,
                "ignoring undeclared property on strict model"
            );
        }
    }

    /// Setter (unless bypassed), then field, then bag. Relationships are not consulted.
    pub(crate) fn assign(&mut self, name: &str, value: Property) {
        if !self.bypass_accessors {
            if let Some(setter) = self.model.setter(name) {
                setter(self, value.to_value());
                return;
            }
        }
        self.set_raw(name, value);
    }

    /// Append a value without a key.
    pub fn push(&mut self, value: impl Into<Property>) {
        self.appended.push(value.into());
    }

    // ==================== Full access ====================

    /// Read a property, resolving has-many and has-a relationships on demand.
    ///
    /// Loaded relationships are cached on the record and bounded by the
    /// recursion depth: loaded children get one level less than their parent.
    pub async fn get(&mut self, name: &str) -> OrmResult<Property> {
        if let Some(getter) = self.model.getter(name) {
            return Ok(Property::Value(getter(self)));
        }
        if let Some(p) = self.raw(name) {
            return Ok(p.clone());
        }

        if let Some(chain) = self.model.has_many(name).cloned() {
            let depth = *self
                .recursion_depth
                .get_or_insert_with(|| chain.effective_depth());
            if depth > 0 {
                let mut records = self.get_many(&chain, None).await?;
                for record in &mut records {
                    record.recursion_depth = Some(depth - 1);
                }
                let value = Property::Many(records);
                self.set_raw_cached(name, value.clone());
                return Ok(value);
            }
        }

        if let Some(has_a) = self.model.has_a(name).cloned() {
            let depth = *self
                .recursion_depth
                .get_or_insert_with(|| has_a.effective_depth());
            if depth > 0 {
                let mut record = self.get_a(name).await?;
                if let Some(record) = &mut record {
                    record.recursion_depth = Some(depth - 1);
                }
                let value = Property::from(record);
                self.set_raw_cached(name, value.clone());
                return Ok(value);
            }
        }

        Ok(Property::default())
    }

    fn set_raw_cached(&mut self, name: &str, value: Property) {
        if let Some(slot) = self.fields.get_mut(name) {
            *slot = value;
        } else {
            self.bag.insert(name, value);
        }
    }

    /// Write a property.
    ///
    /// Has-many and has-a names write to storage immediately: a has-many value
    /// replaces the linked set (see [`set_many`](Self::set_many)), a has-a value
    /// upserts the referenced record (see [`set_a`](Self::set_a)). The stored
    /// property is returned.
    pub async fn set(&mut self, name: &str, value: impl Into<Property>) -> OrmResult<Property> {
        let mut value = value.into();
        if !self.bypass_accessors {
            if let Some(setter) = self.model.setter(name) {
                setter(self, value.to_value());
                return Ok(value);
            }
            if let Some(chain) = self.model.has_many(name).cloned() {
                value = if value.is_null() {
                    Property::default()
                } else {
                    Property::Many(self.set_many(&chain, &value.to_value(), None).await?)
                };
            }
            if self.model.has_a(name).is_some() {
                value = Property::from(self.set_a(name, value).await?);
            }
        }
        self.set_raw(name, value.clone());
        Ok(value)
    }

    // ==================== Merging ====================

    /// Apply `params` through [`set`](Self::set), skipping the primary key.
    ///
    /// Returns the number of keys applied and the changes to backing columns,
    /// compared with [`Value::loose_eq`].
    pub async fn merge(&mut self, params: ValueMap) -> OrmResult<(usize, Changes)> {
        self.input = params.clone();
        let db = self.db()?;
        let columns = db.columns_for_table(self.model.require_table()?).await?;
        let mut changes = Changes::default();
        let mut applied = 0;
        for (key, value) in params {
            if key == self.model.primary_key() {
                continue;
            }
            let old = self.value(&key);
            if columns.iter().any(|c| *c == key) && !old.loose_eq(&value) {
                changes.old.insert(key.clone(), old);
                changes.new.insert(key.clone(), value.clone());
            }
            Box::pin(self.set(&key, value)).await?;
            applied += 1;
        }
        Ok((applied, changes))
    }

    /// The dirty backing columns of this record, overlaid on `defaults`.
    pub async fn storage_properties(&self, purpose: Purpose, defaults: ValueMap) -> OrmResult<ValueMap> {
        let db = self.db()?;
        let table = self.model.require_table()?;
        let columns = db.columns_for_table(table).await?;
        if columns.is_empty() {
            tracing::error!(target: "relorm", table, "found 0 columns for table");
        }
        let mut props = defaults;
        for column in columns {
            if purpose == Purpose::Insert && column == self.model.primary_key() {
                continue;
            }
            if self.is_dirty(&column) {
                let value = self.value(&column);
                props.insert(column, value);
            }
        }
        Ok(props)
    }

    /// Normalize the record for storage: every backing column is passed
    /// through the model's transform and written back through [`set`](Self::set).
    pub async fn clean(&mut self) -> OrmResult<()> {
        let props = self
            .storage_properties(Purpose::Reinsertion, ValueMap::new())
            .await?;
        let transform = self.model.transform().cloned();
        for (column, value) in props {
            let value = match &transform {
                Some(transform) => transform(&column, value),
                None => value,
            };
            self.set(&column, value).await?;
        }
        self.unsanitary = false;
        Ok(())
    }

    // ==================== CRUD ====================

    /// Insert this record and adopt the generated primary key.
    pub async fn insert(&mut self, qb: Option<QueryBuilder>) -> OrmResult<Value> {
        let db = self.db()?;
        let qb = qb.unwrap_or_else(|| db.qb());
        let props = self.storage_properties(Purpose::Insert, ValueMap::new()).await?;
        let table = db.dialect().quote_ident(self.model.require_table()?);
        let id = qb.from(table).insert(&props).await?;
        let pk = self.model.primary_key().to_string();
        self.assign(&pk, Property::Value(id.clone()));
        Ok(id)
    }

    /// Write this record's storage properties to the rows `qb` matches,
    /// by default the row with this record's primary key.
    pub async fn update(&self, qb: Option<QueryBuilder>) -> OrmResult<u64> {
        let db = self.db()?;
        if self.unsanitary && db.config().warn_unsanitary_updates {
            tracing::warn!(
                target: "relorm",
                model = self.model.name(),
                id = %self.primary_key(),
                "record updated without calling clean()"
            );
        }
        let qb = qb.unwrap_or_else(|| self.by_primary_key(&db));
        let props = self.storage_properties(Purpose::Update, ValueMap::new()).await?;
        let table = db.dialect().quote_ident(self.model.require_table()?);
        qb.from(table).update(&props).await
    }

    /// Delete the rows `qb` matches, by default the row with this record's primary key.
    pub async fn delete(&self, qb: Option<QueryBuilder>) -> OrmResult<u64> {
        let db = self.db()?;
        let qb = qb.unwrap_or_else(|| self.by_primary_key(&db));
        let table = db.dialect().quote_ident(self.model.require_table()?);
        qb.from(table).delete().await
    }

    fn by_primary_key(&self, db: &Db) -> QueryBuilder {
        db.filter([(self.model.primary_key(), Condition::eq(self.primary_key()))])
    }

    // ==================== Rendering ====================

    /// Declared fields, with loaded relationships rendered recursively.
    pub fn public_properties(&self) -> JsonMap<String, JsonValue> {
        self.model
            .fields()
            .keys()
            .map(|name| {
                let json = match self.model.getter(name) {
                    Some(getter) => getter(self).to_json(),
                    None => self
                        .fields
                        .get(name)
                        .map_or(JsonValue::Null, Property::to_json),
                };
                (name.to_string(), json)
            })
            .collect()
    }

    /// Same model and loosely equal primary keys.
    pub fn is_equal(&self, other: &Record) -> bool {
        self.model == other.model && self.primary_key().loose_eq(&other.primary_key())
    }
}

impl PartialEq for Record {
    fn eq(&self, other: &Self) -> bool {
        self.model == other.model && self.fields == other.fields && self.bag == other.bag
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", JsonValue::Object(self.public_properties()))
    }
}
