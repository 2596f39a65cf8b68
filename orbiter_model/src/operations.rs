// /////////////////////////////////////////////////////////////////////////////
// Orbiter
// Copyright (c) 2025 A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Operations
//!
//! The closed set of nine atomic mutations the cache understands. Kept as a
//! single tagged enum rather than a trait object hierarchy: the set is
//! closed and fixed, so exhaustive `match` at the processor and query-engine
//! boundaries is the right tool, not dynamic dispatch (design note: "Dynamic
//! operation dispatch").

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::identity::RecordIdentity;
use crate::record::Record;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum Operation {
    AddRecord {
        record: Record,
    },
    UpdateRecord {
        record: Record,
    },
    RemoveRecord {
        record: RecordIdentity,
    },
    ReplaceKey {
        record: RecordIdentity,
        key: String,
        value: String,
    },
    ReplaceAttribute {
        record: RecordIdentity,
        attribute: String,
        #[serde(default)]
        value: Option<Value>,
    },
    AddToRelatedRecords {
        record: RecordIdentity,
        relationship: String,
        related_record: RecordIdentity,
    },
    RemoveFromRelatedRecords {
        record: RecordIdentity,
        relationship: String,
        related_record: RecordIdentity,
    },
    ReplaceRelatedRecords {
        record: RecordIdentity,
        relationship: String,
        related_records: Vec<RecordIdentity>,
    },
    ReplaceRelatedRecord {
        record: RecordIdentity,
        relationship: String,
        #[serde(default)]
        related_record: Option<RecordIdentity>,
    },
}

impl Operation {
    /// The identity of the record this operation targets. For `AddRecord`
    /// and `UpdateRecord` this is the identity embedded in `record`.
    pub fn record_identity(&self) -> &RecordIdentity {
        match self {
            Operation::AddRecord { record } => &record.identity,
            Operation::UpdateRecord { record } => &record.identity,
            Operation::RemoveRecord { record } => record,
            Operation::ReplaceKey { record, .. } => record,
            Operation::ReplaceAttribute { record, .. } => record,
            Operation::AddToRelatedRecords { record, .. } => record,
            Operation::RemoveFromRelatedRecords { record, .. } => record,
            Operation::ReplaceRelatedRecords { record, .. } => record,
            Operation::ReplaceRelatedRecord { record, .. } => record,
        }
    }

    /// The relationship name this operation touches, if any. Used to decide
    /// whether mirror-operation synthesis applies.
    pub fn relationship_name(&self) -> Option<&str> {
        match self {
            Operation::AddToRelatedRecords { relationship, .. }
            | Operation::RemoveFromRelatedRecords { relationship, .. }
            | Operation::ReplaceRelatedRecords { relationship, .. }
            | Operation::ReplaceRelatedRecord { relationship, .. } => Some(relationship),
            _ => None,
        }
    }

    pub fn op_name(&self) -> &'static str {
        match self {
            Operation::AddRecord { .. } => "addRecord",
            Operation::UpdateRecord { .. } => "updateRecord",
            Operation::RemoveRecord { .. } => "removeRecord",
            Operation::ReplaceKey { .. } => "replaceKey",
            Operation::ReplaceAttribute { .. } => "replaceAttribute",
            Operation::AddToRelatedRecords { .. } => "addToRelatedRecords",
            Operation::RemoveFromRelatedRecords { .. } => "removeFromRelatedRecords",
            Operation::ReplaceRelatedRecords { .. } => "replaceRelatedRecords",
            Operation::ReplaceRelatedRecord { .. } => "replaceRelatedRecord",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_identity_resolves_for_every_variant() {
        let identity = RecordIdentity::new("planet", "1");
        let ops = vec![
            Operation::RemoveRecord {
                record: identity.clone(),
            },
            Operation::ReplaceKey {
                record: identity.clone(),
                key: "remoteId".into(),
                value: "99".into(),
            },
            Operation::ReplaceAttribute {
                record: identity.clone(),
                attribute: "name".into(),
                value: None,
            },
        ];
        for op in ops {
            assert_eq!(op.record_identity(), &identity);
        }
    }

    #[test]
    fn serializes_with_op_tag() {
        let op = Operation::RemoveRecord {
            record: RecordIdentity::new("planet", "1"),
        };
        let json = serde_json::to_value(&op).unwrap();
        assert_eq!(json["op"], "removeRecord");
    }
}
