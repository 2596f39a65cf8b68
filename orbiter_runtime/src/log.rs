// /////////////////////////////////////////////////////////////////////////////
// Orbiter
// Copyright (c) 2025 A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Transform Log
//!
//! An append-only, totally-ordered sequence of applied transform ids,
//! persisted under `<source-name>-log` in the bucket. This is the authority
//! a source consults to decide "have I already applied this transform?"
//! during replication.

use std::collections::HashSet;
use std::sync::Arc;

use orbiter_model::error::OrbitError;
use orbiter_model::interfaces::Bucket;
use orbiter_model::value_objects::TransformId;
use parking_lot::RwLock;
use tracing::instrument;

struct LogState {
    /// Totally ordered by append time (I4); `ids[i]` was logged before
    /// `ids[i + 1]`.
    ids: Vec<TransformId>,
    /// Mirrors `ids` for O(1) `contains`.
    index: HashSet<TransformId>,
}

/// The append-only log of applied transforms for one source.
pub struct TransformLog {
    name: String,
    bucket: Arc<dyn Bucket>,
    state: RwLock<LogState>,
}

impl TransformLog {
    pub fn new(name: impl Into<String>, bucket: Arc<dyn Bucket>) -> Self {
        Self {
            name: name.into(),
            bucket,
            state: RwLock::new(LogState {
                ids: Vec::new(),
                index: HashSet::new(),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Restores the log's ordered id list from the bucket, if present.
    pub async fn hydrate(&self) -> Result<(), OrbitError> {
        let Some(value) = self.bucket.get_item(&self.name).await? else {
            return Ok(());
        };
        let raw: Vec<String> = serde_json::from_value(value)?;
        let ids: Vec<TransformId> = raw
            .iter()
            .map(|s| TransformId::from_string(s))
            .collect::<Result<_, _>>()?;
        let mut state = self.state.write();
        state.index = ids.iter().copied().collect();
        state.ids = ids;
        Ok(())
    }

    async fn persist(&self, ids: &[TransformId]) -> Result<(), OrbitError> {
        let raw: Vec<String> = ids.iter().map(|id| id.to_string()).collect();
        self.bucket.set_item(&self.name, serde_json::to_value(raw)?).await
    }

    /// Appends one or more ids to the end of the log, in order. Duplicates
    /// (an id already present) are a no-op for that id, keeping P2
    /// (`contains` is monotonic) trivially true even under replays.
    #[instrument(skip(self, ids), fields(log = %self.name))]
    pub async fn append(&self, ids: &[TransformId]) -> Result<(), OrbitError> {
        let snapshot = {
            let mut state = self.state.write();
            for id in ids {
                if state.index.insert(*id) {
                    state.ids.push(*id);
                }
            }
            state.ids.clone()
        };
        self.persist(&snapshot).await
    }

    pub fn contains(&self, id: &TransformId) -> bool {
        self.state.read().index.contains(id)
    }

    /// All ids logged strictly before `id`'s position. If `id` has never
    /// been logged, returns the ids known so far (there is no reference
    /// point to be "before").
    pub fn before(&self, id: &TransformId) -> Vec<TransformId> {
        let state = self.state.read();
        match state.ids.iter().position(|i| i == id) {
            Some(pos) => state.ids[..pos].to_vec(),
            None => state.ids.clone(),
        }
    }

    /// All ids logged strictly after `id`'s position.
    pub fn after(&self, id: &TransformId) -> Vec<TransformId> {
        let state = self.state.read();
        match state.ids.iter().position(|i| i == id) {
            Some(pos) => state.ids[pos + 1..].to_vec(),
            None => Vec::new(),
        }
    }

    /// Drops every id logged at or before `id` — a compaction, not a
    /// correction: it never removes ids the log hasn't already applied.
    pub async fn truncate(&self, id: &TransformId) -> Result<(), OrbitError> {
        let snapshot = {
            let mut state = self.state.write();
            match state.ids.iter().position(|i| i == id) {
                Some(pos) => {
                    let retained: Vec<TransformId> = state.ids[pos + 1..].to_vec();
                    state.index = retained.iter().copied().collect();
                    state.ids = retained;
                }
                None => {}
            }
            state.ids.clone()
        };
        self.persist(&snapshot).await
    }

    /// Drops every id logged strictly after `id`. Unlike `truncate`, this
    /// is a correction — it un-learns transforms a caller has decided to
    /// roll back — so it is the one operation here that corresponds to a
    /// `rollback` event at the source level.
    pub async fn rollback(&self, id: &TransformId) -> Result<(), OrbitError> {
        let snapshot = {
            let mut state = self.state.write();
            match state.ids.iter().position(|i| i == id) {
                Some(pos) => {
                    let retained: Vec<TransformId> = state.ids[..=pos].to_vec();
                    state.index = retained.iter().copied().collect();
                    state.ids = retained;
                }
                None => {
                    state.ids.clear();
                    state.index.clear();
                }
            }
            state.ids.clone()
        };
        self.persist(&snapshot).await
    }

    pub async fn clear(&self) -> Result<(), OrbitError> {
        {
            let mut state = self.state.write();
            state.ids.clear();
            state.index.clear();
        }
        self.persist(&[]).await
    }

    pub fn len(&self) -> usize {
        self.state.read().ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn ids(&self) -> Vec<TransformId> {
        self.state.read().ids.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::bucket::MemoryBucket;

    fn log() -> TransformLog {
        TransformLog::new("source-log", Arc::new(MemoryBucket::new()))
    }

    #[tokio::test]
    async fn contains_is_monotonic_until_explicit_rollback() {
        let log = log();
        let id = TransformId::new();
        assert!(!log.contains(&id));
        log.append(&[id]).await.unwrap();
        assert!(log.contains(&id));
        log.rollback(&TransformId::new()).await.ok();
    }

    #[tokio::test]
    async fn append_preserves_enqueue_order() {
        let log = log();
        let a = TransformId::new();
        let b = TransformId::new();
        let c = TransformId::new();
        log.append(&[a, b, c]).await.unwrap();
        assert_eq!(log.ids(), vec![a, b, c]);
    }

    #[tokio::test]
    async fn rollback_drops_everything_after_the_given_id() {
        let log = log();
        let a = TransformId::new();
        let b = TransformId::new();
        let c = TransformId::new();
        log.append(&[a, b, c]).await.unwrap();

        log.rollback(&a).await.unwrap();
        assert_eq!(log.ids(), vec![a]);
        assert!(!log.contains(&b));
        assert!(!log.contains(&c));
    }

    #[tokio::test]
    async fn truncate_drops_everything_at_or_before_the_given_id() {
        let log = log();
        let a = TransformId::new();
        let b = TransformId::new();
        let c = TransformId::new();
        log.append(&[a, b, c]).await.unwrap();

        log.truncate(&a).await.unwrap();
        assert_eq!(log.ids(), vec![b, c]);
    }

    #[tokio::test]
    async fn before_and_after_split_around_the_given_id() {
        let log = log();
        let a = TransformId::new();
        let b = TransformId::new();
        let c = TransformId::new();
        log.append(&[a, b, c]).await.unwrap();

        assert_eq!(log.before(&b), vec![a]);
        assert_eq!(log.after(&b), vec![c]);
    }

    #[tokio::test]
    async fn hydrate_restores_persisted_ids() {
        let bucket = Arc::new(MemoryBucket::new());
        let a = TransformId::new();
        {
            let log = TransformLog::new("source-log", bucket.clone());
            log.append(&[a]).await.unwrap();
        }
        let log = TransformLog::new("source-log", bucket);
        log.hydrate().await.unwrap();
        assert!(log.contains(&a));
    }

    #[tokio::test]
    async fn duplicate_append_is_a_no_op() {
        let log = log();
        let a = TransformId::new();
        log.append(&[a]).await.unwrap();
        log.append(&[a]).await.unwrap();
        assert_eq!(log.ids(), vec![a]);
    }
}
