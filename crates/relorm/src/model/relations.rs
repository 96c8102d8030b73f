//! Has-many chain resolution, link closures, chained upserts and has-a access.

use super::{Chain, Model, Property, Record, Registry};
use crate::error::{OrmError, OrmResult};
use crate::qb::{Condition, QueryBuilder};
use crate::value::{Value, ValueMap};

/// Turns one element of a `set_many` value list into the parameter row
/// upserted at the target hop. Receives the element and the target's primary
/// key column.
pub type RowBuilder<'a> = &'a (dyn Fn(&Value, &str) -> ValueMap + Send + Sync);

/// Rows linked at one hop of a chain: `(linked id, previous-level id)` pairs
/// in discovery order. Ids are compared with [`Value::loose_eq`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LinkSet {
    entries: Vec<(Value, Value)>,
}

impl LinkSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn position(&self, id: &Value) -> Option<usize> {
        self.entries.iter().position(|(k, _)| k.loose_eq(id))
    }

    /// Record `id` as linked to `previous`; a repeated id keeps its position
    /// and takes the new previous-level id.
    pub fn insert(&mut self, id: Value, previous: Value) {
        match self.position(&id) {
            Some(pos) => self.entries[pos].1 = previous,
            None => self.entries.push((id, previous)),
        }
    }

    pub fn contains(&self, id: &Value) -> bool {
        self.position(id).is_some()
    }

    /// The previous-level id `id` is linked to.
    pub fn get(&self, id: &Value) -> Option<&Value> {
        self.position(id).map(|pos| &self.entries[pos].1)
    }

    pub fn remove(&mut self, id: &Value) -> Option<Value> {
        let pos = self.position(id)?;
        Some(self.entries.remove(pos).1)
    }

    /// Linked ids, in discovery order.
    pub fn ids(&self) -> impl Iterator<Item = &Value> {
        self.entries.iter().map(|(k, _)| k)
    }
}

fn default_row(item: &Value, key: &str) -> ValueMap {
    match item {
        Value::Map(map) => map.clone(),
        other => ValueMap::from_iter([(key, other.clone())]),
    }
}

fn empty_chain(model: &Model) -> OrmError {
    OrmError::configuration(format!("empty has-many chain on model {}", model.name()))
}

impl Record {
    /// The id `link_model` holds in `col` for this record: our own primary key,
    /// or the id of the is-a ancestor that `col` actually references.
    fn lineage_key(&self, registry: &Registry, link_model: &Model, col: &str) -> Value {
        let referenced = link_model
            .0
            .has_a
            .values()
            .find(|has_a| has_a.column == col)
            .and_then(|has_a| registry.get(&has_a.target.model));
        let Some(referenced) = referenced else {
            return self.primary_key();
        };

        let mut model = self.model.clone();
        let mut key = self.primary_key();
        loop {
            if referenced.ancestors().iter().any(|a| a == model.name()) {
                return key;
            }
            let Some(is_a) = model.is_a().first().cloned() else {
                return self.primary_key();
            };
            key = self.value(&is_a.column);
            match registry.get(&is_a.target.model) {
                Some(parent) => model = parent,
                None => return self.primary_key(),
            }
        }
    }

    // ==================== Has-many ====================

    /// Join every hop of `chain` onto `qb`, from the target back to the first
    /// link, and filter the first link on this record's key.
    ///
    /// Each intermediate hop is aliased `{Model}_{remaining hops}`. With more
    /// than one hop the result is grouped by the target's primary key.
    pub fn get_many_qb(&self, chain: &Chain, qb: QueryBuilder) -> OrmResult<QueryBuilder> {
        let db = self.db()?;
        let registry = db.registry();
        let dialect = db.dialect();
        let (Some(first), Some(target_link)) = (chain.links.first(), chain.target()) else {
            return Err(empty_chain(&self.model));
        };

        let first_model = registry.model(&first.model)?;
        let key_col = first
            .column
            .clone()
            .unwrap_or_else(|| first_model.column_for_model(registry, self.model.name()));
        let key_val = self.lineage_key(registry, &first_model, &key_col);

        let target = registry.model(&target_link.model)?;
        let inner = &chain.links[..chain.hops() - 1];
        let mut last_col = match (&target_link.column, inner.last()) {
            (Some(col), _) => col.clone(),
            (None, Some(prev)) => target.column_for_model(registry, &prev.model),
            (None, None) => target.primary_key().to_string(),
        };
        let mut last_alias = target.name().to_string();
        let mut last_model = target.clone();

        let mut qb = qb;
        if !inner.is_empty() {
            qb = qb.group_by(&target.qualified(&db, target.primary_key()));
        }
        for (remaining, link) in inner.iter().enumerate().rev() {
            let model = registry.model(&link.model)?;
            let col = link
                .column
                .clone()
                .unwrap_or_else(|| model.column_for_model(registry, last_model.name()));
            let alias = format!("{}_{remaining}", model.name());
            let on = format!(
                "{}={}",
                dialect.quote_ident(&format!("{last_alias}.{last_col}")),
                dialect.quote_ident(&format!("{alias}.{col}")),
            );
            qb = qb.join(&dialect.table_alias(model.require_table()?, &alias), &on);
            qb = model.is_a_join(qb, &alias, false)?;
            last_alias = alias;
            last_model = model;
            last_col = col;
        }

        Ok(qb.filter_by(format!("{last_alias}.{key_col}"), Condition::eq(key_val)))
    }

    /// Records at the end of `chain` linked to this record, ordered by the
    /// target's primary key unless `qb` already carries an order.
    pub async fn get_many(&self, chain: &Chain, qb: Option<QueryBuilder>) -> OrmResult<Vec<Record>> {
        let db = self.db()?;
        let target_link = chain.target().ok_or_else(|| empty_chain(&self.model))?;
        let target = db.model(&target_link.model)?;
        let mut qb = self.get_many_qb(chain, qb.unwrap_or_else(|| db.qb()))?;
        if !qb.is_ordered() {
            qb = qb.order_by(&target.qualified(&db, target.primary_key()));
        }
        let cols = target.qualified(&db, "*");
        target.select(qb, Some(&cols)).await
    }

    /// The ids currently linked at every hop of `chain`, and the fallback
    /// previous-level id per hop (the first id found one level up).
    ///
    /// A hop whose model references the previous level (through an explicit
    /// column or a has-a entry) is looked up by that column. Otherwise the
    /// previous rows hold the reference and their column is followed instead.
    pub async fn closure(&self, chain: &Chain) -> OrmResult<(Vec<LinkSet>, Vec<Option<Value>>)> {
        let db = self.db()?;
        let registry = db.registry();
        let mut sets = Vec::with_capacity(chain.hops());
        let mut defaults = Vec::with_capacity(chain.hops());
        let mut last_model = self.model.clone();
        let mut last_rows: Vec<(Value, Record)> = Vec::new();

        for (hop, link) in chain.links.iter().enumerate() {
            let model = registry.model(&link.model)?;
            let col = link
                .column
                .clone()
                .unwrap_or_else(|| model.column_for_model(registry, last_model.name()));
            if hop == 0 {
                last_rows.push((self.lineage_key(registry, &model, &col), self.clone()));
            }
            defaults.push(last_rows.first().map(|(id, _)| id.clone()));

            let mut set = LinkSet::new();
            let mut rows = Vec::new();
            if col != model.primary_key() {
                for (prev_id, _) in &last_rows {
                    let key = format!("{}.{col}", model.name());
                    let qb = db.filter([(key, Condition::eq(prev_id.clone()))]);
                    for row in model.select(qb, None).await? {
                        let id = row.primary_key();
                        set.insert(id.clone(), prev_id.clone());
                        rows.push((id, row));
                    }
                }
            } else {
                let back = last_model.column_for_model(registry, model.name());
                let key = format!("{}.{}", model.name(), model.primary_key());
                for (prev_id, prev) in &last_rows {
                    let linked = prev.value(&back);
                    if linked.is_null() {
                        continue;
                    }
                    let qb = db.filter([(key.clone(), Condition::eq(linked))]);
                    for row in model.select(qb, None).await? {
                        let id = row.primary_key();
                        set.insert(id.clone(), prev_id.clone());
                        rows.push((id, row));
                    }
                }
            }

            sets.push(set);
            last_rows = rows;
            last_model = model;
        }
        Ok((sets, defaults))
    }

    /// Replace the set of records linked through `chain` with `vals`.
    ///
    /// Each element of `vals` becomes a parameter row (a map as-is, a scalar
    /// as `{pk: value}`, or whatever `builder` returns) that is upserted at the
    /// target. Hops are then processed back toward this record, upserting the
    /// link rows that connect each level. Links that are no longer wanted are
    /// deleted, except at the target of a multi-hop chain: target rows may be
    /// shared, so there the back reference is cleared instead (when the target
    /// holds one).
    ///
    /// Returns the records upserted at the target.
    pub async fn set_many(
        &self,
        chain: &Chain,
        vals: &Value,
        builder: Option<RowBuilder<'_>>,
    ) -> OrmResult<Vec<Record>> {
        if vals.is_null() {
            return Ok(Vec::new());
        }
        let db = self.db()?;
        let registry = db.registry();
        let target_link = chain.target().ok_or_else(|| empty_chain(&self.model))?;
        let target = registry.model(&target_link.model)?;
        let key = target.primary_key();

        let items = match vals {
            Value::List(items) => items.as_slice(),
            other => std::slice::from_ref(other),
        };
        let mut params: Vec<ValueMap> = items
            .iter()
            .map(|item| match builder {
                Some(build) => build(item, key),
                None => default_row(item, key),
            })
            .collect();

        let (mut stale_sets, defaults) = self.closure(chain).await?;

        let mut delete_stale = chain.hops() == 1;
        let mut first_link = true;
        let mut inserted = Vec::new();
        for hop in (0..chain.hops()).rev() {
            let link = &chain.links[hop];
            let model = registry.model(&link.model)?;
            let (next_model, next_link_col) = match hop.checked_sub(1) {
                Some(prev) => {
                    let prev = &chain.links[prev];
                    (registry.model(&prev.model)?, prev.column.clone())
                }
                None => (self.model.clone(), None),
            };
            let col = link
                .column
                .clone()
                .unwrap_or_else(|| model.column_for_model(registry, next_model.name()));
            let next_col = next_link_col
                .unwrap_or_else(|| next_model.column_for_model(registry, model.name()));
            let links_back = col != model.primary_key();

            let stale = &mut stale_sets[hop];
            let fallback = defaults[hop].clone().unwrap_or(Value::Int(0));
            let mut next_params = Vec::with_capacity(params.len());
            for mut row in params {
                if links_back {
                    let first = row.first().map(|(_, v)| v.clone()).unwrap_or_default();
                    let previous = stale.get(&first).cloned().unwrap_or_else(|| fallback.clone());
                    row.insert(col.clone(), previous);
                }
                let search = model.search_filter(&db, &row).await?;
                let obj = model.upsert(db.filter(search), row.clone(), ValueMap::new()).await?;
                stale.remove(&obj.primary_key());

                let carried = if next_col != next_model.primary_key() {
                    obj.value(&col)
                } else {
                    row.get(&col).cloned().unwrap_or_default()
                };
                next_params.push(ValueMap::from_iter([(next_col.clone(), carried)]));
                if first_link {
                    inserted.push(obj);
                }
            }

            if !stale.is_empty() {
                let ids: Vec<Value> = stale.ids().cloned().collect();
                let by_pk = || db.filter([(model.primary_key(), Condition::in_list(ids.clone()))]);
                if delete_stale {
                    tracing::debug!(target: "relorm", model = model.name(), count = ids.len(), "deleting stale links");
                    model.delete_rows(by_pk()).await?;
                } else if first_link && links_back {
                    tracing::debug!(target: "relorm", model = model.name(), count = ids.len(), "unlinking stale rows");
                    model
                        .update_rows(by_pk(), &ValueMap::from_iter([(col.clone(), Value::Null)]))
                        .await?;
                }
            }

            delete_stale = true;
            first_link = false;
            params = next_params;
        }
        Ok(inserted)
    }

    // ==================== Has-a ====================

    /// The record referenced through the has-a entry `name`, if it exists.
    pub async fn get_a(&self, name: &str) -> OrmResult<Option<Record>> {
        let Some(has_a) = self.model.has_a(name) else {
            return Ok(None);
        };
        let id = self.value(&has_a.column);
        if id.is_null() {
            return Ok(None);
        }
        let db = self.db()?;
        let target = db.model(&has_a.target.model)?;
        let key = format!("{}.{}", target.name(), target.primary_key());
        match target.find(db.filter([(key, Condition::eq(id))])).await {
            Ok(record) => Ok(Some(record)),
            Err(err) if err.is_not_found() => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Upsert the record referenced through the has-a entry `name` and point
    /// its column at it.
    ///
    /// A map is upserted as given, a scalar or record as `{pk: id}`, and a
    /// blank value upserts this record's last merge input as processed by the
    /// target model. `Null` leaves everything unchanged.
    pub async fn set_a(&mut self, name: &str, value: Property) -> OrmResult<Option<Record>> {
        let Some(has_a) = self.model.has_a(name).cloned() else {
            return Ok(None);
        };
        let db = self.db()?;
        let target = db.model(&has_a.target.model)?;
        let params = match value {
            Property::Value(Value::Null) => return Ok(None),
            Property::Value(v) if v.is_blank() => {
                Box::pin(target.process_for_storage(&db, self.input.clone())).await?
            }
            Property::Value(Value::Map(map)) => map,
            Property::Value(v) => ValueMap::from_iter([(target.primary_key(), v)]),
            Property::One(record) => ValueMap::from_iter([(target.primary_key(), record.primary_key())]),
            Property::Many(_) => {
                return Err(OrmError::validation(format!(
                    "has-a {name} on {} takes a single record",
                    self.model.name()
                )));
            }
        };
        let search = target.search_filter(&db, &params).await?;
        let obj = target.upsert(db.filter(search), params, ValueMap::new()).await?;
        self.assign(&has_a.column, Property::Value(obj.primary_key()));
        Ok(Some(obj))
    }
}
