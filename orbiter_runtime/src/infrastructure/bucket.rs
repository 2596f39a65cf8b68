// /////////////////////////////////////////////////////////////////////////////
// Orbiter
// Copyright (c) 2025 A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Bucket Implementations
//!
//! Two `Bucket` ports ship here: [`MemoryBucket`] (the default — state
//! lives only as long as the process) and [`FileBucket`] (one JSON file per
//! bucket, for durability across restarts) — an in-memory test double and
//! a persisted repository implementation behind the same trait.

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use orbiter_model::error::OrbitError;
use orbiter_model::interfaces::Bucket;
use parking_lot::RwLock;
use serde_json::Value;
use tokio::fs;

/// An in-process, non-persistent `Bucket`. Writes never leave memory; a
/// process restart loses everything, which is fine for an in-memory Record
/// Cache that rebuilds its state from a remote sync on startup anyway.
#[derive(Debug, Default)]
pub struct MemoryBucket {
    state: RwLock<HashMap<String, Value>>,
}

impl MemoryBucket {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Bucket for MemoryBucket {
    async fn get_item(&self, key: &str) -> Result<Option<Value>, OrbitError> {
        Ok(self.state.read().get(key).cloned())
    }

    async fn set_item(&self, key: &str, value: Value) -> Result<(), OrbitError> {
        self.state.write().insert(key.to_string(), value);
        Ok(())
    }

    async fn remove_item(&self, key: &str) -> Result<(), OrbitError> {
        self.state.write().remove(key);
        Ok(())
    }

    async fn clear(&self) -> Result<(), OrbitError> {
        self.state.write().clear();
        Ok(())
    }

    async fn get_keys(&self) -> Result<Vec<String>, OrbitError> {
        Ok(self.state.read().keys().cloned().collect())
    }
}

/// A `Bucket` backed by one JSON file per key under `directory`, so queue
/// and log state survive process restarts. Keys are sanitized to a safe
/// filename; the bucket does not attempt cross-key atomicity — callers
/// must not assume it.
#[derive(Debug)]
pub struct FileBucket {
    directory: PathBuf,
}

impl FileBucket {
    pub async fn new(directory: impl Into<PathBuf>) -> Result<Self, OrbitError> {
        let directory = directory.into();
        fs::create_dir_all(&directory)
            .await
            .map_err(|e| OrbitError::InvalidConfiguration(format!("cannot create bucket directory: {e}")))?;
        Ok(Self { directory })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let sanitized: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.directory.join(format!("{sanitized}.json"))
    }
}

#[async_trait]
impl Bucket for FileBucket {
    async fn get_item(&self, key: &str) -> Result<Option<Value>, OrbitError> {
        match fs::read(self.path_for(key)).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(OrbitError::InvalidConfiguration(format!("bucket read failed: {e}"))),
        }
    }

    async fn set_item(&self, key: &str, value: Value) -> Result<(), OrbitError> {
        let bytes = serde_json::to_vec(&value)?;
        fs::write(self.path_for(key), bytes)
            .await
            .map_err(|e| OrbitError::InvalidConfiguration(format!("bucket write failed: {e}")))
    }

    async fn remove_item(&self, key: &str) -> Result<(), OrbitError> {
        match fs::remove_file(self.path_for(key)).await {
            Ok(()) | Err(_) => Ok(()),
        }
    }

    async fn clear(&self) -> Result<(), OrbitError> {
        let mut entries = fs::read_dir(&self.directory)
            .await
            .map_err(|e| OrbitError::InvalidConfiguration(format!("bucket clear failed: {e}")))?;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| OrbitError::InvalidConfiguration(format!("bucket clear failed: {e}")))?
        {
            let _ = fs::remove_file(entry.path()).await;
        }
        Ok(())
    }

    async fn get_keys(&self) -> Result<Vec<String>, OrbitError> {
        let mut keys = Vec::new();
        let mut entries = fs::read_dir(&self.directory)
            .await
            .map_err(|e| OrbitError::InvalidConfiguration(format!("bucket list failed: {e}")))?;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| OrbitError::InvalidConfiguration(format!("bucket list failed: {e}")))?
        {
            if let Some(name) = entry.path().file_stem().and_then(|s| s.to_str()) {
                keys.push(name.to_string());
            }
        }
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_bucket_round_trips_a_value() {
        let bucket = MemoryBucket::new();
        bucket.set_item("requests", Value::String("hello".into())).await.unwrap();
        assert_eq!(bucket.get_item("requests").await.unwrap(), Some(Value::String("hello".into())));
    }

    #[tokio::test]
    async fn memory_bucket_clear_removes_everything() {
        let bucket = MemoryBucket::new();
        bucket.set_item("a", Value::Bool(true)).await.unwrap();
        bucket.clear().await.unwrap();
        assert!(bucket.get_keys().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn file_bucket_persists_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        {
            let bucket = FileBucket::new(dir.path()).await.unwrap();
            bucket.set_item("log", Value::Array(vec![Value::String("t1".into())])).await.unwrap();
        }
        let bucket = FileBucket::new(dir.path()).await.unwrap();
        assert_eq!(
            bucket.get_item("log").await.unwrap(),
            Some(Value::Array(vec![Value::String("t1".into())]))
        );
    }

    #[tokio::test]
    async fn file_bucket_missing_key_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let bucket = FileBucket::new(dir.path()).await.unwrap();
        assert_eq!(bucket.get_item("missing").await.unwrap(), None);
    }
}
