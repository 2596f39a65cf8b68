// /////////////////////////////////////////////////////////////////////////////
// Orbiter
// Copyright (c) 2025 A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Query / Query Expression
//!
//! The declarative read side of the data model: a closed set of four
//! expression kinds, each extensible with filter/sort/page modifiers.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::identity::RecordIdentity;
use crate::value_objects::QueryId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AttributeFilterOp {
    Equal,
    Gt,
    Gte,
    Lt,
    Lte,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RelatedRecordsFilterOp {
    Equal,
    All,
    Some,
    None,
}

/// Either a single identity or a list, matching the shape a `relatedRecord`
/// filter may compare against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RelatedRecordFilterValue {
    One(Option<RecordIdentity>),
    Many(Vec<RecordIdentity>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Filter {
    Attribute {
        attribute: String,
        op: AttributeFilterOp,
        value: Value,
    },
    RelatedRecord {
        relationship: String,
        record: RelatedRecordFilterValue,
    },
    RelatedRecords {
        relationship: String,
        op: RelatedRecordsFilterOp,
        records: Vec<RecordIdentity>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SortOrder {
    Asc,
    Desc,
}

impl Default for SortOrder {
    fn default() -> Self {
        SortOrder::Asc
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SortSpecifier {
    pub attribute: String,
    #[serde(default)]
    pub order: SortOrder,
}

impl SortSpecifier {
    pub fn asc(attribute: impl Into<String>) -> Self {
        Self {
            attribute: attribute.into(),
            order: SortOrder::Asc,
        }
    }

    pub fn desc(attribute: impl Into<String>) -> Self {
        Self {
            attribute: attribute.into(),
            order: SortOrder::Desc,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageSpecifier {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
}

/// Selector for either a single identity or an enumeration by type used by
/// `findRecords`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RecordsSelector {
    Type(String),
    Identities(Vec<RecordIdentity>),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FindRecordsModifiers {
    #[serde(default)]
    pub filter: Vec<Filter>,
    #[serde(default)]
    pub sort: Vec<SortSpecifier>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<PageSpecifier>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum QueryExpression {
    FindRecord {
        record: RecordIdentity,
    },
    /// A list-of-identities form silently skips missing records, unlike
    /// `FindRecord`'s single-identity form which raises `RecordNotFound`.
    FindRecordsById {
        records: Vec<RecordIdentity>,
    },
    FindRecords {
        #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
        type_name: Option<String>,
        #[serde(flatten)]
        modifiers: FindRecordsModifiers,
    },
    FindRelatedRecord {
        record: RecordIdentity,
        relationship: String,
    },
    FindRelatedRecords {
        record: RecordIdentity,
        relationship: String,
        #[serde(flatten)]
        modifiers: FindRecordsModifiers,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Query {
    pub id: QueryId,
    pub expressions: Vec<QueryExpression>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Value>,
}

impl Query {
    pub fn new(expressions: Vec<QueryExpression>) -> Self {
        Self {
            id: QueryId::new(),
            expressions,
            options: None,
        }
    }

    pub fn single(expression: QueryExpression) -> Self {
        Self::new(vec![expression])
    }

    pub fn with_options(mut self, options: Value) -> Self {
        self.options = Some(options);
        self
    }

    pub fn is_batch(&self) -> bool {
        self.expressions.len() > 1
    }
}
