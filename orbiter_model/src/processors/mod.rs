// /////////////////////////////////////////////////////////////////////////////
// Orbiter
// Copyright (c) 2025 A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Operation Processors
//!
//! Pure functions mapping `(state, operation) -> (inverse, derived ops)`.
//! These never touch a store directly — they read through the read-only
//! [`RecordLookup`] port the cache implements, and return data the cache
//! then applies. Keeping this pure is what makes P1 (inverse-consistency)
//! and R2 (apply-then-inverse round-trips) checkable without spinning up a
//! whole cache in a property test.
//!
//! Mirror operations are always returned forward-op-first: the caller
//! applies `inverse`'s *source* operation, then each mirror in order (design
//! note: mirror-operation ordering is fixed here as "forward op, then
//! mirrors" — see DESIGN.md Open Question (b)).

use std::collections::HashSet;

use crate::error::OrbitError;
use crate::identity::RecordIdentity;
use crate::operations::Operation;
use crate::record::{Record, RelationshipData};
use crate::schema::{RelationshipDefinition, RelationshipKind, Schema};

/// Read-only access to cache state, as seen by a processor. Implemented by
/// the runtime's Record Cache; never owned by this crate.
pub trait RecordLookup {
    fn get(&self, identity: &RecordIdentity) -> Option<Record>;

    fn exists(&self, identity: &RecordIdentity) -> bool {
        self.get(identity).is_some()
    }

    /// Every `(other, relationship)` pair whose value currently references
    /// `identity`, used to cascade a removal into the other side's
    /// relationships.
    fn back_edges(&self, identity: &RecordIdentity) -> Vec<(RecordIdentity, String)>;
}

/// Result of processing one operation: what undoes it, and what mirror
/// operations inverse-relationship maintenance requires.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessedOperation {
    pub inverse: Operation,
    pub mirrors: Vec<Operation>,
}

/// Computes the inverse and any mirror operations for `op`, without
/// mutating anything. `allow_create_placeholders` controls whether a
/// mirror addition targeting a record absent from `lookup` synthesizes a
/// placeholder `AddRecord` ahead of the mirror, or is simply skipped.
pub fn process_operation(
    lookup: &dyn RecordLookup,
    schema: &Schema,
    op: &Operation,
    allow_create_placeholders: bool,
) -> Result<ProcessedOperation, OrbitError> {
    match op {
        Operation::AddRecord { record } => process_add_record(lookup, schema, record, allow_create_placeholders),
        Operation::UpdateRecord { record } => process_update_record(lookup, schema, record, allow_create_placeholders),
        Operation::RemoveRecord { record } => process_remove_record(lookup, record),
        Operation::ReplaceKey { record, key, value } => process_replace_key(lookup, record, key, value),
        Operation::ReplaceAttribute {
            record,
            attribute,
            value,
        } => process_replace_attribute(lookup, record, attribute, value.clone()),
        Operation::AddToRelatedRecords {
            record,
            relationship,
            related_record,
        } => process_add_to_related_records(lookup, schema, record, relationship, related_record, allow_create_placeholders),
        Operation::RemoveFromRelatedRecords {
            record,
            relationship,
            related_record,
        } => process_remove_from_related_records(lookup, schema, record, relationship, related_record),
        Operation::ReplaceRelatedRecords {
            record,
            relationship,
            related_records,
        } => process_replace_related_records(lookup, schema, record, relationship, related_records, allow_create_placeholders),
        Operation::ReplaceRelatedRecord {
            record,
            relationship,
            related_record,
        } => process_replace_related_record(lookup, schema, record, relationship, related_record.clone(), allow_create_placeholders),
    }
}

fn require_record(lookup: &dyn RecordLookup, identity: &RecordIdentity) -> Result<Record, OrbitError> {
    lookup
        .get(identity)
        .ok_or_else(|| OrbitError::record_not_found(&identity.type_name, &identity.id))
}

/// Builds the mirror operation that keeps `target`'s declared inverse
/// relationship in sync with an addition of `source` on the forward side.
/// Returns `None` when the target record doesn't exist and placeholders
/// are disallowed (the forward edge stands alone).
fn mirror_add(
    inverse_def: &RelationshipDefinition,
    inverse_name: &str,
    target: &RecordIdentity,
    source: &RecordIdentity,
    target_exists: bool,
    allow_create_placeholders: bool,
) -> (Option<Operation>, Option<Operation>) {
    if !target_exists {
        if !allow_create_placeholders {
            return (None, None);
        }
        let placeholder = Operation::AddRecord {
            record: Record::new(target.clone()),
        };
        let mirror = mirror_add_op(inverse_def, inverse_name, target, source);
        return (Some(placeholder), Some(mirror));
    }
    (None, Some(mirror_add_op(inverse_def, inverse_name, target, source)))
}

fn mirror_add_op(inverse_def: &RelationshipDefinition, inverse_name: &str, target: &RecordIdentity, source: &RecordIdentity) -> Operation {
    match inverse_def.kind {
        RelationshipKind::HasMany => Operation::AddToRelatedRecords {
            record: target.clone(),
            relationship: inverse_name.to_string(),
            related_record: source.clone(),
        },
        RelationshipKind::HasOne => Operation::ReplaceRelatedRecord {
            record: target.clone(),
            relationship: inverse_name.to_string(),
            related_record: Some(source.clone()),
        },
    }
}

fn mirror_remove_op(inverse_def: &RelationshipDefinition, inverse_name: &str, target: &RecordIdentity, source: &RecordIdentity) -> Operation {
    match inverse_def.kind {
        RelationshipKind::HasMany => Operation::RemoveFromRelatedRecords {
            record: target.clone(),
            relationship: inverse_name.to_string(),
            related_record: source.clone(),
        },
        RelationshipKind::HasOne => Operation::ReplaceRelatedRecord {
            record: target.clone(),
            relationship: inverse_name.to_string(),
            related_record: None,
        },
    }
}

/// Looks up the inverse relationship declaration for `relationship` on
/// `source`'s type, if the schema declares one.
fn inverse_of<'a>(
    schema: &'a Schema,
    source_type: &str,
    relationship: &str,
) -> Result<Option<(&'a str, &'a RelationshipDefinition, &'a str)>, OrbitError> {
    let def = schema.relationship_definition(source_type, relationship)?;
    let Some(inverse_name) = def.inverse.as_deref() else {
        return Ok(None);
    };
    // The inverse is declared on the *target* type(s); we only support a
    // single target type per relationship for inverse resolution (the
    // common case — a polymorphic relationship with mirrored inverses on
    // more than one type is out of scope).
    let target_type = def
        .target_types
        .first()
        .ok_or_else(|| OrbitError::SchemaError(format!("relationship '{relationship}' declares no target type")))?;
    let inverse_def = schema.relationship_definition(target_type, inverse_name)?;
    Ok(Some((inverse_name, inverse_def, target_type.as_str())))
}

fn process_add_record(
    lookup: &dyn RecordLookup,
    schema: &Schema,
    record: &Record,
    allow_create_placeholders: bool,
) -> Result<ProcessedOperation, OrbitError> {
    if lookup.exists(&record.identity) {
        return Err(OrbitError::record_already_exists(&record.identity.type_name, &record.identity.id));
    }

    let mut mirrors = Vec::new();
    if let Some(relationships) = &record.relationships {
        for (relationship, data) in relationships {
            if let Some((inverse_name, inverse_def, _)) = inverse_of(schema, &record.identity.type_name, relationship)? {
                for target in data.data.identities() {
                    let (placeholder, mirror) =
                        mirror_add(inverse_def, inverse_name, &target, &record.identity, lookup.exists(&target), allow_create_placeholders);
                    mirrors.extend(placeholder);
                    mirrors.extend(mirror);
                }
            }
        }
    }

    Ok(ProcessedOperation {
        inverse: Operation::RemoveRecord {
            record: record.identity.clone(),
        },
        mirrors,
    })
}

fn process_update_record(
    lookup: &dyn RecordLookup,
    schema: &Schema,
    record: &Record,
    allow_create_placeholders: bool,
) -> Result<ProcessedOperation, OrbitError> {
    let previous = require_record(lookup, &record.identity)?;

    let mut mirrors = Vec::new();
    let touched_relationships: HashSet<&String> = record
        .relationships
        .as_ref()
        .map(|r| r.keys().collect())
        .unwrap_or_default();

    for relationship in touched_relationships {
        let old_ids: HashSet<RecordIdentity> = previous.related_identities(relationship).into_iter().collect();
        let new_ids: HashSet<RecordIdentity> = record.related_identities(relationship).into_iter().collect();

        if let Some((inverse_name, inverse_def, _)) = inverse_of(schema, &record.identity.type_name, relationship)? {
            for removed in old_ids.difference(&new_ids) {
                mirrors.push(mirror_remove_op(inverse_def, inverse_name, removed, &record.identity));
            }
            for added in new_ids.difference(&old_ids) {
                let (placeholder, mirror) =
                    mirror_add(inverse_def, inverse_name, added, &record.identity, lookup.exists(added), allow_create_placeholders);
                mirrors.extend(placeholder);
                mirrors.extend(mirror);
            }
        }
    }

    Ok(ProcessedOperation {
        inverse: Operation::UpdateRecord { record: previous },
        mirrors,
    })
}

fn process_remove_record(lookup: &dyn RecordLookup, identity: &RecordIdentity) -> Result<ProcessedOperation, OrbitError> {
    let previous = require_record(lookup, identity)?;

    let mut mirrors = Vec::new();
    for (other, relationship) in lookup.back_edges(identity) {
        let other_record = require_record(lookup, &other)?;
        let is_to_many = other_record
            .relationship(&relationship)
            .map(|r| r.data.is_to_many())
            .unwrap_or(false);
        mirrors.push(if is_to_many {
            Operation::RemoveFromRelatedRecords {
                record: other,
                relationship,
                related_record: identity.clone(),
            }
        } else {
            Operation::ReplaceRelatedRecord {
                record: other,
                relationship,
                related_record: None,
            }
        });
    }

    Ok(ProcessedOperation {
        inverse: Operation::AddRecord { record: previous },
        mirrors,
    })
}

fn process_replace_key(lookup: &dyn RecordLookup, identity: &RecordIdentity, key: &str, _value: &str) -> Result<ProcessedOperation, OrbitError> {
    let previous = require_record(lookup, identity)?;
    let old_value = previous.keys.as_ref().and_then(|k| k.get(key)).cloned().unwrap_or_default();

    Ok(ProcessedOperation {
        inverse: Operation::ReplaceKey {
            record: identity.clone(),
            key: key.to_string(),
            value: old_value,
        },
        mirrors: Vec::new(),
    })
}

fn process_replace_attribute(
    lookup: &dyn RecordLookup,
    identity: &RecordIdentity,
    attribute: &str,
    _value: Option<serde_json::Value>,
) -> Result<ProcessedOperation, OrbitError> {
    let previous = require_record(lookup, identity)?;
    let old_value = previous.attribute(attribute).cloned();

    Ok(ProcessedOperation {
        inverse: Operation::ReplaceAttribute {
            record: identity.clone(),
            attribute: attribute.to_string(),
            value: old_value,
        },
        mirrors: Vec::new(),
    })
}

fn process_add_to_related_records(
    lookup: &dyn RecordLookup,
    schema: &Schema,
    identity: &RecordIdentity,
    relationship: &str,
    related_record: &RecordIdentity,
    allow_create_placeholders: bool,
) -> Result<ProcessedOperation, OrbitError> {
    require_record(lookup, identity)?;
    let def = schema.relationship_definition(&identity.type_name, relationship)?;
    if def.kind != RelationshipKind::HasMany {
        return Err(OrbitError::OperationNotAllowed(format!(
            "addToRelatedRecords requires a hasMany relationship, '{relationship}' is hasOne"
        )));
    }

    let mut mirrors = Vec::new();
    if let Some((inverse_name, inverse_def, _)) = inverse_of(schema, &identity.type_name, relationship)? {
        let (placeholder, mirror) = mirror_add(
            inverse_def,
            inverse_name,
            related_record,
            identity,
            lookup.exists(related_record),
            allow_create_placeholders,
        );
        mirrors.extend(placeholder);
        mirrors.extend(mirror);
    }

    Ok(ProcessedOperation {
        inverse: Operation::RemoveFromRelatedRecords {
            record: identity.clone(),
            relationship: relationship.to_string(),
            related_record: related_record.clone(),
        },
        mirrors,
    })
}

fn process_remove_from_related_records(
    lookup: &dyn RecordLookup,
    schema: &Schema,
    identity: &RecordIdentity,
    relationship: &str,
    related_record: &RecordIdentity,
) -> Result<ProcessedOperation, OrbitError> {
    require_record(lookup, identity)?;
    let def = schema.relationship_definition(&identity.type_name, relationship)?;
    if def.kind != RelationshipKind::HasMany {
        return Err(OrbitError::OperationNotAllowed(format!(
            "removeFromRelatedRecords requires a hasMany relationship, '{relationship}' is hasOne"
        )));
    }

    let mut mirrors = Vec::new();
    if let Some((inverse_name, inverse_def, _)) = inverse_of(schema, &identity.type_name, relationship)? {
        mirrors.push(mirror_remove_op(inverse_def, inverse_name, related_record, identity));
    }

    Ok(ProcessedOperation {
        inverse: Operation::AddToRelatedRecords {
            record: identity.clone(),
            relationship: relationship.to_string(),
            related_record: related_record.clone(),
        },
        mirrors,
    })
}

fn process_replace_related_records(
    lookup: &dyn RecordLookup,
    schema: &Schema,
    identity: &RecordIdentity,
    relationship: &str,
    related_records: &[RecordIdentity],
    allow_create_placeholders: bool,
) -> Result<ProcessedOperation, OrbitError> {
    let previous = require_record(lookup, identity)?;
    let def = schema.relationship_definition(&identity.type_name, relationship)?;
    if def.kind != RelationshipKind::HasMany {
        return Err(OrbitError::OperationNotAllowed(format!(
            "replaceRelatedRecords requires a hasMany relationship, '{relationship}' is hasOne"
        )));
    }

    let old_ids: HashSet<RecordIdentity> = previous.related_identities(relationship).into_iter().collect();
    let new_ids: HashSet<RecordIdentity> = related_records.iter().cloned().collect();

    let mut mirrors = Vec::new();
    if let Some((inverse_name, inverse_def, _)) = inverse_of(schema, &identity.type_name, relationship)? {
        for removed in old_ids.difference(&new_ids) {
            mirrors.push(mirror_remove_op(inverse_def, inverse_name, removed, identity));
        }
        for added in new_ids.difference(&old_ids) {
            let (placeholder, mirror) =
                mirror_add(inverse_def, inverse_name, added, identity, lookup.exists(added), allow_create_placeholders);
            mirrors.extend(placeholder);
            mirrors.extend(mirror);
        }
    }

    Ok(ProcessedOperation {
        inverse: Operation::ReplaceRelatedRecords {
            record: identity.clone(),
            relationship: relationship.to_string(),
            related_records: old_ids.into_iter().collect(),
        },
        mirrors,
    })
}

fn process_replace_related_record(
    lookup: &dyn RecordLookup,
    schema: &Schema,
    identity: &RecordIdentity,
    relationship: &str,
    related_record: Option<RecordIdentity>,
    allow_create_placeholders: bool,
) -> Result<ProcessedOperation, OrbitError> {
    let previous = require_record(lookup, identity)?;
    let def = schema.relationship_definition(&identity.type_name, relationship)?;
    if def.kind != RelationshipKind::HasOne {
        return Err(OrbitError::OperationNotAllowed(format!(
            "replaceRelatedRecord requires a hasOne relationship, '{relationship}' is hasMany"
        )));
    }

    let old_value = previous
        .relationship(relationship)
        .and_then(|r| match &r.data {
            crate::record::RelationshipValue::One(id) => id.clone(),
            crate::record::RelationshipValue::Many(_) => None,
        });

    let mut mirrors = Vec::new();
    if let Some((inverse_name, inverse_def, _)) = inverse_of(schema, &identity.type_name, relationship)? {
        if old_value != related_record {
            if let Some(old_target) = &old_value {
                mirrors.push(mirror_remove_op(inverse_def, inverse_name, old_target, identity));
            }
            if let Some(new_target) = &related_record {
                let (placeholder, mirror) = mirror_add(
                    inverse_def,
                    inverse_name,
                    new_target,
                    identity,
                    lookup.exists(new_target),
                    allow_create_placeholders,
                );
                mirrors.extend(placeholder);
                mirrors.extend(mirror);
            }
        }
    }

    Ok(ProcessedOperation {
        inverse: Operation::ReplaceRelatedRecord {
            record: identity.clone(),
            relationship: relationship.to_string(),
            related_record: old_value,
        },
        mirrors,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::RelationshipData;
    use crate::schema::ModelDefinition;
    use std::collections::HashMap;

    struct FakeStore {
        records: HashMap<RecordIdentity, Record>,
    }

    impl RecordLookup for FakeStore {
        fn get(&self, identity: &RecordIdentity) -> Option<Record> {
            self.records.get(identity).cloned()
        }

        fn back_edges(&self, identity: &RecordIdentity) -> Vec<(RecordIdentity, String)> {
            let mut edges = Vec::new();
            for record in self.records.values() {
                let Some(relationships) = &record.relationships else {
                    continue;
                };
                for (rel, data) in relationships {
                    if data.data.identities().contains(identity) {
                        edges.push((record.identity.clone(), rel.clone()));
                    }
                }
            }
            edges
        }
    }

    fn schema_with_planet_moon() -> Schema {
        let mut models = HashMap::new();
        models.insert(
            "planet".to_string(),
            ModelDefinition::new().with_relationship(
                "moons",
                RelationshipKind::HasMany,
                vec!["moon".into()],
                Some("planet".into()),
            ),
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

    #[test]
    fn add_record_mirrors_into_existing_inverse() {
        let schema = schema_with_planet_moon();
        let earth = RecordIdentity::new("planet", "earth");
        let store = FakeStore {
            records: HashMap::from([(earth.clone(), Record::new(earth.clone()))]),
        };

        let moon = Record::new(RecordIdentity::new("moon", "luna")).with_relationship("planet", RelationshipData::one(Some(earth.clone())));
        let processed = process_add_record(&store, &schema, &moon, false).unwrap();

        assert_eq!(
            processed.mirrors,
            vec![Operation::AddToRelatedRecords {
                record: earth,
                relationship: "moons".into(),
                related_record: moon.identity,
            }]
        );
    }

    #[test]
    fn add_record_skips_mirror_when_target_missing_and_placeholders_disallowed() {
        let schema = schema_with_planet_moon();
        let store = FakeStore { records: HashMap::new() };

        let moon = Record::new(RecordIdentity::new("moon", "luna"))
            .with_relationship("planet", RelationshipData::one(Some(RecordIdentity::new("planet", "earth"))));
        let processed = process_add_record(&store, &schema, &moon, false).unwrap();

        assert!(processed.mirrors.is_empty());
    }

    #[test]
    fn add_record_creates_placeholder_when_allowed() {
        let schema = schema_with_planet_moon();
        let store = FakeStore { records: HashMap::new() };
        let earth = RecordIdentity::new("planet", "earth");

        let moon = Record::new(RecordIdentity::new("moon", "luna")).with_relationship("planet", RelationshipData::one(Some(earth.clone())));
        let processed = process_add_record(&store, &schema, &moon, true).unwrap();

        assert_eq!(processed.mirrors.len(), 2);
        assert_eq!(processed.mirrors[0], Operation::AddRecord { record: Record::new(earth.clone()) });
    }

    #[test]
    fn remove_record_cascades_to_many_and_to_one_back_edges() {
        let schema = schema_with_planet_moon();
        let earth = RecordIdentity::new("planet", "earth");
        let luna = RecordIdentity::new("moon", "luna");

        let earth_record = Record::new(earth.clone()).with_relationship("moons", RelationshipData::many(vec![luna.clone()]));
        let moon_record = Record::new(luna.clone()).with_relationship("planet", RelationshipData::one(Some(earth.clone())));

        let store = FakeStore {
            records: HashMap::from([(earth.clone(), earth_record), (luna.clone(), moon_record)]),
        };

        let processed = process_remove_record(&store, &earth).unwrap();
        assert_eq!(
            processed.mirrors,
            vec![Operation::ReplaceRelatedRecord {
                record: luna,
                relationship: "planet".into(),
                related_record: None,
            }]
        );
    }

    #[test]
    fn remove_record_missing_raises_not_found() {
        let store = FakeStore { records: HashMap::new() };
        let result = process_remove_record(&store, &RecordIdentity::new("planet", "missing"));
        assert!(matches!(result, Err(OrbitError::RecordNotFound { .. })));
    }

    #[test]
    fn add_record_rejects_duplicate_identity() {
        let schema = schema_with_planet_moon();
        let earth = RecordIdentity::new("planet", "earth");
        let store = FakeStore {
            records: HashMap::from([(earth.clone(), Record::new(earth.clone()))]),
        };
        let result = process_add_record(&store, &schema, &Record::new(earth), false);
        assert!(matches!(result, Err(OrbitError::RecordAlreadyExists { .. })));
    }
}
