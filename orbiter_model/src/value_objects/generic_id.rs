// /////////////////////////////////////////////////////////////////////////////
// Orbiter
// Copyright (c) 2025 A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Generic ULID-Backed Identifier
//!
//! `GenericId<T>` is a phantom-typed wrapper around a [`Ulid`] shared by every
//! identifier in the crate that benefits from ULID's monotonic-by-time
//! ordering (transform ids, query ids). The phantom parameter `T` prevents a
//! `TransformId` and a `QueryId` from being accidentally interchanged even
//! though both are, underneath, the same 128-bit value.

use std::fmt;
use std::marker::PhantomData;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use ulid::Ulid;

use crate::error::OrbitError;

/// Per-category hooks a [`GenericId`] instantiation must provide.
pub trait IdCategory {
    /// Human-readable name used in error messages (e.g. `"transform"`).
    fn category_name() -> &'static str;
}

/// A ULID wrapped with a zero-sized marker type so ids of different
/// categories are distinct Rust types.
pub struct GenericId<T: IdCategory> {
    value: Ulid,
    _phantom: PhantomData<T>,
}

impl<T: IdCategory> GenericId<T> {
    /// Generates a new id from the current time.
    pub fn new() -> Self {
        Self {
            value: Ulid::new(),
            _phantom: PhantomData,
        }
    }

    pub fn from_ulid(value: Ulid) -> Self {
        Self {
            value,
            _phantom: PhantomData,
        }
    }

    pub fn as_ulid(&self) -> Ulid {
        self.value
    }

    /// Milliseconds since the Unix epoch encoded in the id's timestamp bits.
    pub fn timestamp_ms(&self) -> u64 {
        self.value.timestamp_ms()
    }

    pub fn from_string(s: &str) -> Result<Self, OrbitError> {
        Ulid::from_str(s)
            .map(Self::from_ulid)
            .map_err(|e| OrbitError::SchemaError(format!("invalid {} id '{}': {}", T::category_name(), s, e)))
    }
}

impl<T: IdCategory> Default for GenericId<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: IdCategory> Clone for GenericId<T> {
    fn clone(&self) -> Self {
        *self
    }
}
impl<T: IdCategory> Copy for GenericId<T> {}

impl<T: IdCategory> PartialEq for GenericId<T> {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}
impl<T: IdCategory> Eq for GenericId<T> {}

impl<T: IdCategory> PartialOrd for GenericId<T> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl<T: IdCategory> Ord for GenericId<T> {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.value.cmp(&other.value)
    }
}

impl<T: IdCategory> std::hash::Hash for GenericId<T> {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.value.hash(state);
    }
}

impl<T: IdCategory> fmt::Debug for GenericId<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}Id({})", T::category_name(), self.value)
    }
}

impl<T: IdCategory> fmt::Display for GenericId<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value)
    }
}

impl<T: IdCategory> FromStr for GenericId<T> {
    type Err = OrbitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_string(s)
    }
}

impl<T: IdCategory> From<Ulid> for GenericId<T> {
    fn from(value: Ulid) -> Self {
        Self::from_ulid(value)
    }
}

impl<T: IdCategory> Serialize for GenericId<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.value.to_string())
    }
}

impl<'de, T: IdCategory> Deserialize<'de> for GenericId<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ulid::from_str(&s)
            .map(Self::from_ulid)
            .map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct TestMarker;
    impl IdCategory for TestMarker {
        fn category_name() -> &'static str {
            "test"
        }
    }
    type TestId = GenericId<TestMarker>;

    #[test]
    fn round_trips_through_display_and_parse() {
        let id = TestId::new();
        let parsed: TestId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn orders_monotonically_with_time() {
        let a = TestId::new();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let b = TestId::new();
        assert!(a < b);
    }

    #[test]
    fn rejects_garbage_strings() {
        assert!(TestId::from_string("not-a-ulid").is_err());
    }
}
