// /////////////////////////////////////////////////////////////////////////////
// Orbiter
// Copyright (c) 2025 A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Record
//!
//! The normalized unit the cache stores one of, per `(type, id)`. Relationship
//! values are always identities, never nested records (see `identity.rs`).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::identity::RecordIdentity;

/// A to-one or to-many relationship value. `One(None)` is an explicit null
/// link (the relationship is declared but points at nothing); `Many` is
/// always an ordered sequence, even when empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RelationshipValue {
    One(Option<RecordIdentity>),
    Many(Vec<RecordIdentity>),
}

impl RelationshipValue {
    /// All identities referenced by this value, to-one or to-many alike.
    pub fn identities(&self) -> Vec<RecordIdentity> {
        match self {
            RelationshipValue::One(Some(id)) => vec![id.clone()],
            RelationshipValue::One(None) => Vec::new(),
            RelationshipValue::Many(ids) => ids.clone(),
        }
    }

    pub fn is_to_many(&self) -> bool {
        matches!(self, RelationshipValue::Many(_))
    }
}

/// A single declared relationship slot on a record: `{ data: ... }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationshipData {
    pub data: RelationshipValue,
}

impl RelationshipData {
    pub fn one(identity: Option<RecordIdentity>) -> Self {
        Self {
            data: RelationshipValue::One(identity),
        }
    }

    pub fn many(identities: Vec<RecordIdentity>) -> Self {
        Self {
            data: RelationshipValue::Many(identities),
        }
    }
}

/// Identity plus the optional bags of data the schema allows for its type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    #[serde(flatten)]
    pub identity: RecordIdentity,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attributes: Option<HashMap<String, Value>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keys: Option<HashMap<String, String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relationships: Option<HashMap<String, RelationshipData>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub links: Option<Value>,
}

impl Record {
    pub fn new(identity: RecordIdentity) -> Self {
        Self {
            identity,
            attributes: None,
            keys: None,
            relationships: None,
            meta: None,
            links: None,
        }
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: Value) -> Self {
        self.attributes
            .get_or_insert_with(HashMap::new)
            .insert(name.into(), value);
        self
    }

    pub fn with_key(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.keys
            .get_or_insert_with(HashMap::new)
            .insert(name.into(), value.into());
        self
    }

    pub fn with_relationship(mut self, name: impl Into<String>, data: RelationshipData) -> Self {
        self.relationships
            .get_or_insert_with(HashMap::new)
            .insert(name.into(), data);
        self
    }

    pub fn attribute(&self, name: &str) -> Option<&Value> {
        self.attributes.as_ref().and_then(|a| a.get(name))
    }

    pub fn relationship(&self, name: &str) -> Option<&RelationshipData> {
        self.relationships.as_ref().and_then(|r| r.get(name))
    }

    /// The set of related identities a relationship currently points at,
    /// used by the cache to diff old vs. new outgoing edges when maintaining
    /// the inverse index. Absent relationship counts as empty.
    pub fn related_identities(&self, relationship: &str) -> Vec<RecordIdentity> {
        self.relationship(relationship)
            .map(|r| r.data.identities())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relationship_value_one_none_has_no_identities() {
        let value = RelationshipValue::One(None);
        assert!(value.identities().is_empty());
    }

    #[test]
    fn relationship_value_many_preserves_order() {
        let ids = vec![
            RecordIdentity::new("moon", "phobos"),
            RecordIdentity::new("moon", "deimos"),
        ];
        let value = RelationshipValue::Many(ids.clone());
        assert_eq!(value.identities(), ids);
    }

    #[test]
    fn builder_methods_compose() {
        let record = Record::new(RecordIdentity::new("planet", "1"))
            .with_attribute("name", Value::String("earth".into()))
            .with_key("remoteId", "abc")
            .with_relationship(
                "moons",
                RelationshipData::many(vec![RecordIdentity::new("moon", "luna")]),
            );

        assert_eq!(record.attribute("name").unwrap(), "earth");
        assert_eq!(
            record.related_identities("moons"),
            vec![RecordIdentity::new("moon", "luna")]
        );
    }
}
