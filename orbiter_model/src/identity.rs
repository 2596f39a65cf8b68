// /////////////////////////////////////////////////////////////////////////////
// Orbiter
// Copyright (c) 2025 A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Record Identity
//!
//! The only pointer type that ever crosses a record boundary. Relationships
//! never hold a direct reference to another [`crate::record::Record`] — only
//! its `(type, id)` identity — so the store stays a flat map and cyclic
//! record graphs (A refers to B refers to A) require no special handling.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A stable `(type, id)` pointer to a record.
///
/// `id` is the canonical local identifier minted by the schema's
/// [`crate::schema::IdGenerator`] when the record was first added; it never
/// changes for the lifetime of the record (invariant I3). Secondary remote
/// keys live in [`crate::record::Record::keys`] and are reconciled by the
/// [`crate::keymap::KeyMap`], not here.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordIdentity {
    #[serde(rename = "type")]
    pub type_name: String,
    pub id: String,
}

impl RecordIdentity {
    pub fn new(type_name: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            id: id.into(),
        }
    }
}

impl fmt::Display for RecordIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.type_name, self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_type_as_json_field_type() {
        let identity = RecordIdentity::new("planet", "1");
        let json = serde_json::to_value(&identity).unwrap();
        assert_eq!(json["type"], "planet");
        assert_eq!(json["id"], "1");
    }

    #[test]
    fn equality_is_structural() {
        assert_eq!(
            RecordIdentity::new("planet", "1"),
            RecordIdentity::new("planet", "1")
        );
        assert_ne!(
            RecordIdentity::new("planet", "1"),
            RecordIdentity::new("planet", "2")
        );
    }
}
