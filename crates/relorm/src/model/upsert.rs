//! The upsert state machine and is-a ancestor propagation.

use super::{Changes, Model, Property, Record};
use crate::error::{OrmError, OrmResult};
use crate::qb::{Condition, QueryBuilder};
use crate::value::ValueMap;
use futures_util::future::{BoxFuture, FutureExt};

impl Model {
    /// Update the single row `qb` matches with `params`, or insert a new row
    /// built from `defaults` and `params` when nothing matches. The stored row
    /// is read back by primary key so storage-computed columns are visible.
    ///
    /// A match with empty `params` is returned as read, with no writes.
    pub async fn upsert(&self, qb: QueryBuilder, params: ValueMap, defaults: ValueMap) -> OrmResult<Record> {
        Ok(self.upsert_tracked(qb, params, defaults).await?.0)
    }

    /// [`upsert`](Self::upsert), also reporting which backing columns changed.
    ///
    /// Not atomic: the row is selected first, then inserted or updated.
    pub fn upsert_tracked(
        &self,
        qb: QueryBuilder,
        params: ValueMap,
        defaults: ValueMap,
    ) -> BoxFuture<'static, OrmResult<(Record, Changes)>> {
        let model = self.clone();
        async move {
            let db = qb.db()?.clone();
            let mut changes = Changes::default();

            let id = match model.find(qb).await {
                Ok(mut record) => {
                    if params.is_empty() {
                        return Ok((record, changes));
                    }
                    let (_, plain) = model.split_has_many(&params);
                    record.clean().await?;
                    let (_, merged) = record.merge(params).await?;
                    changes.extend(merged);
                    record.upsert_ancestors(&plain).await?;
                    // Always by primary key: the merge may have changed the filtered columns.
                    record.update(None).await?;
                    record.primary_key()
                }
                Err(err) if err.is_not_found() => {
                    let mut record = Record::new(&model, &db);
                    record.unsanitary = false;
                    let (many, plain) = model.split_has_many(&params);

                    let (_, merged) = record.merge(defaults).await?;
                    changes.extend(merged);
                    let (_, merged) = record.merge(plain.clone()).await?;
                    changes.extend(merged);
                    record.upsert_ancestors(&plain).await?;
                    record.insert(None).await?;
                    // Has-many links need the new primary key.
                    if !many.is_empty() {
                        record.merge(many).await?;
                    }
                    record.primary_key()
                }
                Err(err) => return Err(err),
            };

            let record = model.by_id(&db, id.clone()).await?.ok_or_else(|| {
                OrmError::not_found(format!("{} {id} vanished after upsert", model.name()))
            })?;
            Ok((record, changes))
        }
        .boxed()
    }

    /// Split `params` into has-many entries and everything else. Has-many
    /// keys stay with this model: ancestors only see the plain entries.
    pub(crate) fn split_has_many(&self, params: &ValueMap) -> (ValueMap, ValueMap) {
        params
            .iter()
            .map(|(k, v)| (k, v.clone()))
            .partition(|(k, _)| self.has_many(k).is_some())
    }
}

impl Record {
    /// Upsert the nearest is-a parent row with `params` and point the is-a
    /// column at it. Further ancestors are handled by the parent's own upsert.
    pub(crate) async fn upsert_ancestors(&mut self, params: &ValueMap) -> OrmResult<()> {
        let Some(is_a) = self.model.is_a().first().cloned() else {
            return Ok(());
        };
        let db = self.db()?;
        let parent = db.model(&is_a.target.model)?;
        let dst_col = is_a
            .target
            .column
            .clone()
            .unwrap_or_else(|| parent.primary_key().to_string());
        let key = format!("{}.{dst_col}", parent.name());
        let qb = db.filter([(key, Condition::eq(self.value(&is_a.column)))]);
        let record = parent.upsert(qb, params.clone(), ValueMap::new()).await?;
        self.assign(&is_a.column, Property::Value(record.value(&dst_col)));
        Ok(())
    }
}
