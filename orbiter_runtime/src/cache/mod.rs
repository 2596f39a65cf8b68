// /////////////////////////////////////////////////////////////////////////////
// Orbiter
// Copyright (c) 2025 A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Record Cache
//!
//! The normalized, in-memory record graph: applies operation batches
//! atomically, derives and maintains the inverse-relationship index,
//! answers structured queries, and publishes the change notifications
//! live queries subscribe to. The store itself never holds a direct
//! reference between records — only `(type, id)` identities — so cyclic
//! graphs need no special handling (design note in `orbiter-model`).

pub mod live_query;
pub mod query_engine;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use indexmap::IndexMap;
use orbiter_model::error::OrbitError;
use orbiter_model::identity::RecordIdentity;
use orbiter_model::operations::Operation;
use orbiter_model::processors::{self, RecordLookup};
use orbiter_model::query::{PageSpecifier, Query, QueryExpression};
use orbiter_model::record::{Record, RelationshipData, RelationshipValue};
use orbiter_model::schema::Schema;
use parking_lot::RwLock;
use serde_json::Value;
use tracing::instrument;

pub use live_query::LiveQuery;

/// One applied operation paired with the operation that undoes it, in
/// application order (forward operation first, then its mirrors — design
/// note Open Question (b)).
#[derive(Debug, Clone, PartialEq)]
pub struct AppliedOperation {
    pub operation: Operation,
    pub inverse: Operation,
}

/// The result of one `patch()` call: every operation actually applied
/// (forward plus mirrors) together with its inverse, and the per-top-level-op
/// "data" a caller's query/update response surfaces.
#[derive(Debug, Clone, Default)]
pub struct PatchOutcome {
    pub applied: Vec<AppliedOperation>,
    pub data: Vec<Option<Value>>,
}

#[derive(Debug, Default)]
struct Store {
    /// Insertion-ordered so `findRecords`' "ties break by insertion order"
    /// falls out of iteration order directly.
    records: IndexMap<RecordIdentity, Record>,
    /// `target -> {(source, relationship)}`: every edge currently pointing
    /// at `target`. Derived, never the primary source of truth.
    inverse_index: HashMap<RecordIdentity, HashSet<(RecordIdentity, String)>>,
}

/// A read-only view over the cache's current store, handed to
/// `orbiter-model`'s pure operation processors.
struct StoreLookup<'a>(&'a Store);

impl RecordLookup for StoreLookup<'_> {
    fn get(&self, identity: &RecordIdentity) -> Option<Record> {
        self.0.records.get(identity).cloned()
    }

    fn back_edges(&self, identity: &RecordIdentity) -> Vec<(RecordIdentity, String)> {
        self.0
            .inverse_index
            .get(identity)
            .map(|edges| edges.iter().cloned().collect())
            .unwrap_or_default()
    }
}

/// The in-memory, normalized Record Cache.
pub struct RecordCache {
    schema: Arc<Schema>,
    allow_create_placeholders: bool,
    store: RwLock<Store>,
    change_tx: tokio::sync::broadcast::Sender<()>,
}

impl RecordCache {
    pub fn new(schema: Arc<Schema>, allow_create_placeholders: bool) -> Self {
        let (change_tx, _) = tokio::sync::broadcast::channel(64);
        Self {
            schema,
            allow_create_placeholders,
            store: RwLock::new(Store::default()),
            change_tx,
        }
    }

    /// A receiver that fires once per successful `patch()` call — the
    /// coarse "something changed" signal live queries debounce over.
    pub fn subscribe_changes(&self) -> tokio::sync::broadcast::Receiver<()> {
        self.change_tx.subscribe()
    }

    pub fn subscribe_live(self: &Arc<Self>, expression: QueryExpression, debounce: bool) -> LiveQuery {
        LiveQuery::new(Arc::clone(self), expression, debounce)
    }

    /// Discards every record and the derived inverse index, then notifies
    /// live queries the same way a `patch()` would. Used when a source
    /// reacts to a schema upgrade it cannot migrate records across.
    pub fn reset(&self) {
        *self.store.write() = Store::default();
        let _ = self.change_tx.send(());
    }

    // ---------------------------------------------------------------- patch

    /// Atomically applies a batch of operations. On any error, no partial
    /// state persists: the whole batch is evaluated against a scratch copy
    /// first, and only committed once every operation (forward and mirror
    /// alike) succeeds.
    #[instrument(skip(self, operations))]
    pub fn patch(&self, operations: &[Operation]) -> Result<PatchOutcome, OrbitError> {
        let mut scratch = {
            let guard = self.store.read();
            Store {
                records: guard.records.clone(),
                inverse_index: guard.inverse_index.clone(),
            }
        };

        let mut outcome = PatchOutcome::default();
        for op in operations {
            let applied = self.apply_one(&mut scratch, op, true)?;
            outcome.data.push(describe(&scratch, &applied[0].operation));
            outcome.applied.extend(applied);
        }

        *self.store.write() = scratch;
        let _ = self.change_tx.send(());
        Ok(outcome)
    }

    /// Applies `op` against `scratch`, synthesizing and (when
    /// `synthesize_mirrors`) recursively applying its mirror operations.
    /// Mirrors are applied without further mirror synthesis of their own —
    /// a mirror's own inverse is still computed, but its mirrors are
    /// discarded, which is what keeps this one level deep instead of
    /// bouncing forever between two sides of one relationship.
    fn apply_one(&self, scratch: &mut Store, op: &Operation, synthesize_mirrors: bool) -> Result<Vec<AppliedOperation>, OrbitError> {
        let processed = {
            let lookup = StoreLookup(scratch);
            processors::process_operation(&lookup, &self.schema, op, self.allow_create_placeholders)?
        };

        mutate(scratch, op)?;
        reindex(scratch, op);

        let mut applied = vec![AppliedOperation {
            operation: op.clone(),
            inverse: processed.inverse,
        }];

        if synthesize_mirrors {
            for mirror in &processed.mirrors {
                applied.extend(self.apply_one(scratch, mirror, false)?);
            }
        }

        Ok(applied)
    }

    // ---------------------------------------------------------------- query

    /// Evaluates one or more expressions against the current store.
    /// Multi-expression queries return one [`Value`] per expression.
    pub fn query(&self, query: &Query) -> Result<Vec<Value>, OrbitError> {
        let store = self.store.read();
        query.expressions.iter().map(|expr| self.evaluate(&store, expr)).collect()
    }

    fn evaluate(&self, store: &Store, expr: &QueryExpression) -> Result<Value, OrbitError> {
        match expr {
            QueryExpression::FindRecord { record } => {
                let found = store
                    .records
                    .get(record)
                    .ok_or_else(|| OrbitError::record_not_found(&record.type_name, &record.id))?;
                Ok(serde_json::to_value(found)?)
            }
            QueryExpression::FindRecordsById { records } => {
                let found: Vec<&Record> = records.iter().filter_map(|id| store.records.get(id)).collect();
                Ok(serde_json::to_value(found)?)
            }
            QueryExpression::FindRecords { type_name, modifiers } => {
                let candidates: Vec<&Record> = store
                    .records
                    .values()
                    .filter(|r| type_name.as_deref().map(|t| t == r.identity.type_name).unwrap_or(true))
                    .collect();
                let result = query_engine::evaluate(candidates, &modifiers.filter, &modifiers.sort, modifiers.page.as_ref());
                Ok(serde_json::to_value(result)?)
            }
            QueryExpression::FindRelatedRecord { record, relationship } => {
                let source = store
                    .records
                    .get(record)
                    .ok_or_else(|| OrbitError::record_not_found(&record.type_name, &record.id))?;
                let Some(data) = source.relationship(relationship) else {
                    return Ok(Value::Null);
                };
                match &data.data {
                    RelationshipValue::One(None) => Ok(Value::Null),
                    RelationshipValue::One(Some(target)) => {
                        let found = store
                            .records
                            .get(target)
                            .ok_or_else(|| OrbitError::related_record_not_found(&record.type_name, &record.id, relationship))?;
                        Ok(serde_json::to_value(found)?)
                    }
                    RelationshipValue::Many(ids) => {
                        let Some(first) = ids.first() else { return Ok(Value::Null) };
                        let found = store
                            .records
                            .get(first)
                            .ok_or_else(|| OrbitError::related_record_not_found(&record.type_name, &record.id, relationship))?;
                        Ok(serde_json::to_value(found)?)
                    }
                }
            }
            QueryExpression::FindRelatedRecords {
                record,
                relationship,
                modifiers,
            } => {
                let source = store
                    .records
                    .get(record)
                    .ok_or_else(|| OrbitError::record_not_found(&record.type_name, &record.id))?;
                let Some(data) = source.relationship(relationship) else {
                    return Ok(Value::Array(Vec::new()));
                };
                let candidates: Vec<&Record> = data.data.identities().iter().filter_map(|id| store.records.get(id)).collect();
                let result = query_engine::evaluate(candidates, &modifiers.filter, &modifiers.sort, modifiers.page.as_ref());
                Ok(serde_json::to_value(result)?)
            }
        }
    }

    #[cfg(test)]
    fn get(&self, identity: &RecordIdentity) -> Option<Record> {
        self.store.read().records.get(identity).cloned()
    }

    #[cfg(test)]
    fn back_edges(&self, identity: &RecordIdentity) -> Vec<(RecordIdentity, String)> {
        StoreLookup(&self.store.read()).back_edges(identity)
    }
}

fn describe(store: &Store, op: &Operation) -> Option<Value> {
    let identity = op.record_identity();
    store.records.get(identity).and_then(|r| serde_json::to_value(r).ok())
}

/// Mutates `scratch` to reflect `op`, exactly as written (no inverse or
/// mirror computation — that's `process_operation`'s job, run beforehand).
fn mutate(scratch: &mut Store, op: &Operation) -> Result<(), OrbitError> {
    match op {
        Operation::AddRecord { record } => {
            if scratch.records.contains_key(&record.identity) {
                return Err(OrbitError::record_already_exists(&record.identity.type_name, &record.identity.id));
            }
            scratch.records.insert(record.identity.clone(), record.clone());
        }
        Operation::UpdateRecord { record } => {
            require(scratch, &record.identity)?;
            scratch.records.insert(record.identity.clone(), record.clone());
        }
        Operation::RemoveRecord { record } => {
            require(scratch, record)?;
            scratch.records.shift_remove(record);
        }
        Operation::ReplaceKey { record, key, value } => {
            let entry = require_mut(scratch, record)?;
            entry.keys.get_or_insert_with(HashMap::new).insert(key.clone(), value.clone());
        }
        Operation::ReplaceAttribute { record, attribute, value } => {
            let entry = require_mut(scratch, record)?;
            let attributes = entry.attributes.get_or_insert_with(HashMap::new);
            match value {
                Some(v) => {
                    attributes.insert(attribute.clone(), v.clone());
                }
                None => {
                    attributes.remove(attribute);
                }
            }
        }
        Operation::AddToRelatedRecords {
            record,
            relationship,
            related_record,
        } => {
            let entry = require_mut(scratch, record)?;
            let data = entry
                .relationships
                .get_or_insert_with(HashMap::new)
                .entry(relationship.clone())
                .or_insert_with(|| RelationshipData::many(Vec::new()));
            match &mut data.data {
                RelationshipValue::Many(ids) => {
                    if !ids.contains(related_record) {
                        ids.push(related_record.clone());
                    }
                }
                RelationshipValue::One(_) => data.data = RelationshipValue::Many(vec![related_record.clone()]),
            }
        }
        Operation::RemoveFromRelatedRecords {
            record,
            relationship,
            related_record,
        } => {
            let entry = require_mut(scratch, record)?;
            if let Some(data) = entry.relationships.as_mut().and_then(|r| r.get_mut(relationship)) {
                if let RelationshipValue::Many(ids) = &mut data.data {
                    ids.retain(|id| id != related_record);
                }
            }
        }
        Operation::ReplaceRelatedRecords {
            record,
            relationship,
            related_records,
        } => {
            let entry = require_mut(scratch, record)?;
            entry
                .relationships
                .get_or_insert_with(HashMap::new)
                .insert(relationship.clone(), RelationshipData::many(related_records.clone()));
        }
        Operation::ReplaceRelatedRecord {
            record,
            relationship,
            related_record,
        } => {
            let entry = require_mut(scratch, record)?;
            entry
                .relationships
                .get_or_insert_with(HashMap::new)
                .insert(relationship.clone(), RelationshipData::one(related_record.clone()));
        }
    }
    Ok(())
}

fn require<'a>(scratch: &'a Store, identity: &RecordIdentity) -> Result<&'a Record, OrbitError> {
    scratch
        .records
        .get(identity)
        .ok_or_else(|| OrbitError::record_not_found(&identity.type_name, &identity.id))
}

fn require_mut<'a>(scratch: &'a mut Store, identity: &RecordIdentity) -> Result<&'a mut Record, OrbitError> {
    scratch
        .records
        .get_mut(identity)
        .ok_or_else(|| OrbitError::record_not_found(&identity.type_name, &identity.id))
}

/// Recomputes the inverse index's back-edges affected by `op`, after
/// `mutate` has already applied it to the store.
fn reindex(scratch: &mut Store, op: &Operation) {
    match op {
        Operation::AddRecord { record } => {
            if let Some(relationships) = &record.relationships {
                for (relationship, data) in relationships {
                    for target in data.data.identities() {
                        scratch
                            .inverse_index
                            .entry(target)
                            .or_default()
                            .insert((record.identity.clone(), relationship.clone()));
                    }
                }
            }
        }
        Operation::UpdateRecord { record } => {
            // `mutate` already replaced the record wholesale; reconcile the
            // inverse index against whatever relationships it now has by
            // dropping every stale edge this record used to own, then
            // re-adding its current ones. Cheap for the record counts this
            // cache targets; a byte-for-byte diff isn't worth the
            // complexity here.
            drop_outgoing_edges(scratch, &record.identity);
            if let Some(relationships) = &record.relationships {
                for (relationship, data) in relationships {
                    for target in data.data.identities() {
                        scratch
                            .inverse_index
                            .entry(target)
                            .or_default()
                            .insert((record.identity.clone(), relationship.clone()));
                    }
                }
            }
        }
        Operation::RemoveRecord { record } => {
            drop_outgoing_edges(scratch, record);
            scratch.inverse_index.remove(record);
        }
        Operation::ReplaceKey { .. } | Operation::ReplaceAttribute { .. } => {}
        Operation::AddToRelatedRecords {
            record,
            relationship,
            related_record,
        } => {
            scratch
                .inverse_index
                .entry(related_record.clone())
                .or_default()
                .insert((record.clone(), relationship.clone()));
        }
        Operation::RemoveFromRelatedRecords {
            record,
            relationship,
            related_record,
        } => {
            if let Some(edges) = scratch.inverse_index.get_mut(related_record) {
                edges.remove(&(record.clone(), relationship.clone()));
            }
        }
        Operation::ReplaceRelatedRecords {
            record, relationship, ..
        }
        | Operation::ReplaceRelatedRecord {
            record, relationship, ..
        } => {
            // Drop every edge this (record, relationship) used to own
            // before re-adding the current targets — the old identities
            // are no longer on hand here (the store already holds the new
            // value), so sweep the whole index for this edge's signature.
            for edges in scratch.inverse_index.values_mut() {
                edges.retain(|(source, rel)| !(source == record && rel == relationship));
            }
            if let Some(current) = scratch.records.get(record).and_then(|r| r.relationship(relationship)) {
                for target in current.data.identities() {
                    scratch
                        .inverse_index
                        .entry(target)
                        .or_default()
                        .insert((record.clone(), relationship.clone()));
                }
            }
        }
    }
}

fn drop_outgoing_edges(scratch: &mut Store, source: &RecordIdentity) {
    for edges in scratch.inverse_index.values_mut() {
        edges.retain(|(s, _)| s != source);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orbiter_model::schema::{ModelDefinition, RelationshipKind};
    use serde_json::json;
    use std::collections::HashMap as StdHashMap;

    fn planet_moon_schema() -> Schema {
        let mut models = StdHashMap::new();
        models.insert(
            "planet".to_string(),
            ModelDefinition::new()
                .with_attribute("name", "string")
                .with_relationship("moons", RelationshipKind::HasMany, vec!["moon".into()], Some("planet".into())),
        );
        models.insert(
            "moon".to_string(),
            ModelDefinition::new().with_relationship(
                "planet",
                RelationshipKind::HasOne,
                vec!["planet".into()],
                Some("moons".into()),
            ),
        );
        Schema::new(models)
    }

    fn cache() -> RecordCache {
        RecordCache::new(Arc::new(planet_moon_schema()), false)
    }

    #[test]
    fn add_record_then_find_record_round_trips() {
        let cache = cache();
        let earth = RecordIdentity::new("planet", "earth");
        cache
            .patch(&[Operation::AddRecord {
                record: Record::new(earth.clone()).with_attribute("name", json!("earth")),
            }])
            .unwrap();

        let query = Query::single(QueryExpression::FindRecord { record: earth });
        let result = cache.query(&query).unwrap();
        assert_eq!(result[0]["attributes"]["name"], "earth");
    }

    #[test]
    fn find_record_missing_raises_not_found() {
        let cache = cache();
        let query = Query::single(QueryExpression::FindRecord {
            record: RecordIdentity::new("planet", "missing"),
        });
        assert!(matches!(cache.query(&query), Err(OrbitError::RecordNotFound { .. })));
    }

    #[test]
    fn inverse_cascade_nullifies_to_one_on_removal_scenario_7() {
        let cache = cache();
        let earth = RecordIdentity::new("planet", "earth");
        let luna = RecordIdentity::new("moon", "luna");

        cache.patch(&[Operation::AddRecord { record: Record::new(earth.clone()) }]).unwrap();
        cache
            .patch(&[Operation::AddRecord {
                record: Record::new(luna.clone()).with_relationship("planet", RelationshipData::one(Some(earth.clone()))),
            }])
            .unwrap();

        assert!(cache.back_edges(&earth).contains(&(luna.clone(), "moons".to_string())));

        cache.patch(&[Operation::RemoveRecord { record: earth.clone() }]).unwrap();

        let moon = cache.get(&luna).unwrap();
        assert_eq!(moon.relationship("planet").unwrap().data, RelationshipValue::One(None));
        assert!(!cache.back_edges(&earth).contains(&(luna, "moons".to_string())));
    }

    #[test]
    fn mirror_add_keeps_inverse_side_in_sync() {
        let cache = cache();
        let earth = RecordIdentity::new("planet", "earth");
        let luna = RecordIdentity::new("moon", "luna");
        cache.patch(&[Operation::AddRecord { record: Record::new(earth.clone()) }]).unwrap();

        cache
            .patch(&[Operation::AddToRelatedRecords {
                record: earth.clone(),
                relationship: "moons".into(),
                related_record: luna.clone(),
            }])
            .unwrap();

        let added_moon = cache.get(&luna);
        assert!(added_moon.is_none(), "mirror should not materialize a placeholder by default");

        // Re-run with placeholders enabled to confirm the mirrored side.
        let cache = RecordCache::new(Arc::new(planet_moon_schema()), true);
        cache.patch(&[Operation::AddRecord { record: Record::new(earth.clone()) }]).unwrap();
        cache
            .patch(&[Operation::AddToRelatedRecords {
                record: earth,
                relationship: "moons".into(),
                related_record: luna.clone(),
            }])
            .unwrap();
        let moon = cache.get(&luna).unwrap();
        assert_eq!(
            moon.relationship("planet").unwrap().data,
            RelationshipValue::One(Some(RecordIdentity::new("planet", "earth")))
        );
    }

    #[test]
    fn patch_batch_is_all_or_nothing() {
        let cache = cache();
        let earth = RecordIdentity::new("planet", "earth");
        cache.patch(&[Operation::AddRecord { record: Record::new(earth.clone()) }]).unwrap();

        let result = cache.patch(&[
            Operation::ReplaceAttribute {
                record: earth.clone(),
                attribute: "name".into(),
                value: Some(json!("earth")),
            },
            Operation::AddRecord {
                record: Record::new(earth.clone()),
            },
        ]);
        assert!(result.is_err());
        // The first op in the failed batch must not have been committed.
        assert!(cache.get(&earth).unwrap().attribute("name").is_none());
    }

    #[test]
    fn find_related_records_returns_empty_when_relation_absent_p7() {
        let cache = cache();
        let earth = RecordIdentity::new("planet", "earth");
        cache.patch(&[Operation::AddRecord { record: Record::new(earth.clone()) }]).unwrap();

        let query = Query::single(QueryExpression::FindRelatedRecords {
            record: earth,
            relationship: "moons".into(),
            modifiers: Default::default(),
        });
        let result = cache.query(&query).unwrap();
        assert_eq!(result[0], Value::Array(Vec::new()));
    }

    #[test]
    fn find_related_records_on_missing_record_raises_not_found() {
        let cache = cache();
        let query = Query::single(QueryExpression::FindRelatedRecords {
            record: RecordIdentity::new("planet", "missing"),
            relationship: "moons".into(),
            modifiers: Default::default(),
        });
        assert!(matches!(cache.query(&query), Err(OrbitError::RecordNotFound { .. })));
    }

    #[test]
    fn find_records_by_id_silently_skips_missing() {
        let cache = cache();
        let earth = RecordIdentity::new("planet", "earth");
        cache.patch(&[Operation::AddRecord { record: Record::new(earth.clone()) }]).unwrap();

        let query = Query::single(QueryExpression::FindRecordsById {
            records: vec![earth, RecordIdentity::new("planet", "missing")],
        });
        let result = cache.query(&query).unwrap();
        assert_eq!(result[0].as_array().unwrap().len(), 1);
    }

    #[test]
    fn multi_expression_query_returns_one_value_per_expression() {
        let cache = cache();
        let earth = RecordIdentity::new("planet", "earth");
        cache.patch(&[Operation::AddRecord { record: Record::new(earth.clone()) }]).unwrap();

        let query = Query::new(vec![
            QueryExpression::FindRecord { record: earth.clone() },
            QueryExpression::FindRecords {
                type_name: Some("planet".into()),
                modifiers: Default::default(),
            },
        ]);
        let result = cache.query(&query).unwrap();
        assert_eq!(result.len(), 2);
    }

    #[test]
    fn page_default_limit_is_unbounded() {
        let cache = cache();
        for name in ["a", "b", "c"] {
            cache
                .patch(&[Operation::AddRecord {
                    record: Record::new(RecordIdentity::new("planet", name)),
                }])
                .unwrap();
        }
        let query = Query::single(QueryExpression::FindRecords {
            type_name: Some("planet".into()),
            modifiers: orbiter_model::query::FindRecordsModifiers {
                page: Some(PageSpecifier { offset: None, limit: None }),
                ..Default::default()
            },
        });
        let result = cache.query(&query).unwrap();
        assert_eq!(result[0].as_array().unwrap().len(), 3);
    }
}
