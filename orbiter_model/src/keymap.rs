// /////////////////////////////////////////////////////////////////////////////
// Orbiter
// Copyright (c) 2025 A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # KeyMap
//!
//! Reconciles the two-id world: a stable local identity and zero or more
//! named remote secondary keys. Generation of a fresh local id is always
//! the schema's job (see [`crate::schema::Schema::generate_id`]) — the
//! KeyMap only ever records mappings it is told about, it never mints one.

use std::collections::HashMap;

use crate::record::Record;

type ForwardKey = (String, String, String); // (type, keyName, keyValue)
type ReverseKey = (String, String, String); // (type, keyName, localId)

/// Bidirectional `(type, keyName, keyValue) <-> localId` index.
///
/// An insertion that introduces a new remote key for an already-mapped
/// local id MERGES into the existing entry set. A later insertion that
/// reassigns a key already pointing at a different id overwrites it
/// (last-writer-wins).
#[derive(Debug, Default)]
pub struct KeyMap {
    forward: HashMap<ForwardKey, String>,
    reverse: HashMap<ReverseKey, String>,
}

impl KeyMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers every `(keyName, keyValue)` pair on `record` against its
    /// local id, overwriting any stale bindings to get the bijection
    /// back in sync (P5).
    pub fn push_record(&mut self, record: &Record) {
        let Some(keys) = &record.keys else {
            return;
        };
        for (key_name, key_value) in keys {
            self.set(&record.identity.type_name, key_name, key_value, &record.identity.id);
        }
    }

    pub fn set(&mut self, type_name: &str, key_name: &str, key_value: &str, local_id: &str) {
        let forward_key = (type_name.to_string(), key_name.to_string(), key_value.to_string());
        let reverse_key = (type_name.to_string(), key_name.to_string(), local_id.to_string());

        // A previous mapping for this (type, keyName, keyValue) pointing at
        // a different id is replaced: drop its stale reverse entry.
        if let Some(old_id) = self.forward.get(&forward_key) {
            if old_id != local_id {
                self.reverse
                    .remove(&(type_name.to_string(), key_name.to_string(), old_id.clone()));
            }
        }

        self.forward.insert(forward_key, local_id.to_string());
        self.reverse.insert(reverse_key, key_value.to_string());
    }

    /// Deterministic lookup of a local id from a set of `(keyName,
    /// keyValue)` pairs. The first pair with a known mapping wins; returns
    /// `None` when no pair is known.
    pub fn id_from_keys(&self, type_name: &str, keys: &HashMap<String, String>) -> Option<String> {
        keys.iter()
            .find_map(|(key_name, key_value)| self.key_to_id(type_name, key_name, key_value))
    }

    pub fn id_to_key(&self, type_name: &str, key_name: &str, id: &str) -> Option<String> {
        self.reverse
            .get(&(type_name.to_string(), key_name.to_string(), id.to_string()))
            .cloned()
    }

    pub fn key_to_id(&self, type_name: &str, key_name: &str, key_value: &str) -> Option<String> {
        self.forward
            .get(&(type_name.to_string(), key_name.to_string(), key_value.to_string()))
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::RecordIdentity;

    #[test]
    fn push_record_registers_both_directions() {
        let mut keymap = KeyMap::new();
        let record = Record::new(RecordIdentity::new("planet", "1")).with_key("remoteId", "99");
        keymap.push_record(&record);

        assert_eq!(keymap.key_to_id("planet", "remoteId", "99"), Some("1".into()));
        assert_eq!(keymap.id_to_key("planet", "remoteId", "1"), Some("99".into()));
    }

    #[test]
    fn reassigning_a_key_is_last_writer_wins() {
        let mut keymap = KeyMap::new();
        keymap.set("planet", "remoteId", "99", "1");
        keymap.set("planet", "remoteId", "99", "2");

        assert_eq!(keymap.key_to_id("planet", "remoteId", "99"), Some("2".into()));
        assert_eq!(keymap.id_to_key("planet", "remoteId", "1"), None);
        assert_eq!(keymap.id_to_key("planet", "remoteId", "2"), Some("99".into()));
    }

    #[test]
    fn merges_additional_keys_for_the_same_local_id() {
        let mut keymap = KeyMap::new();
        keymap.set("planet", "remoteId", "99", "1");
        keymap.set("planet", "legacyId", "old-99", "1");

        assert_eq!(keymap.key_to_id("planet", "remoteId", "99"), Some("1".into()));
        assert_eq!(keymap.key_to_id("planet", "legacyId", "old-99"), Some("1".into()));
    }

    #[test]
    fn unknown_keys_resolve_to_none() {
        let keymap = KeyMap::new();
        assert_eq!(keymap.key_to_id("planet", "remoteId", "missing"), None);
    }
}
