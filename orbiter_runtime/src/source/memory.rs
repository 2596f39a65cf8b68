// /////////////////////////////////////////////////////////////////////////////
// Orbiter
// Copyright (c) 2025 A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # In-Memory Source Backend
//!
//! The `_X` half of the pipeline for a Source whose store is a local
//! [`RecordCache`] — no network, no serialization beyond what the cache
//! itself already does. `perform_pull`/`perform_push` are left at the
//! `SourceBackend` defaults (`OperationNotAllowed`): an in-memory source has
//! no peer to replicate with.

use std::sync::Arc;

use async_trait::async_trait;
use orbiter_model::error::OrbitError;
use orbiter_model::events::Hints;
use orbiter_model::interfaces::{AppliedOperations, SourceBackend};
use orbiter_model::query::Query;
use orbiter_model::transform::Transform;
use serde_json::Value;

use crate::cache::RecordCache;

pub struct MemorySourceBackend {
    cache: Arc<RecordCache>,
}

impl MemorySourceBackend {
    pub fn new(cache: Arc<RecordCache>) -> Self {
        Self { cache }
    }

    pub fn cache(&self) -> &Arc<RecordCache> {
        &self.cache
    }
}

#[async_trait]
impl SourceBackend for MemorySourceBackend {
    async fn perform_query(&self, query: &Query, _hints: &Hints) -> Result<Value, OrbitError> {
        let mut results = self.cache.query(query)?;
        if query.is_batch() {
            Ok(Value::Array(results))
        } else {
            Ok(results.remove(0))
        }
    }

    async fn perform_update(&self, transform: &Transform, _hints: &Hints) -> Result<AppliedOperations, OrbitError> {
        let outcome = self.cache.patch(&transform.operations)?;
        // `outcome.data` is positionally aligned with `transform.operations`
        // (one entry per top-level op, mirrors excluded). A single-operation
        // transform unwraps to that one op's data; a batch keeps the array
        // shape so the caller can still read data[i] for operation i.
        let data = if transform.is_batch() {
            Some(Value::Array(outcome.data.into_iter().map(|d| d.unwrap_or(Value::Null)).collect()))
        } else {
            outcome.data.into_iter().next().flatten()
        };
        Ok(AppliedOperations {
            data,
            applied_operations: outcome.applied.iter().map(|a| a.operation.clone()).collect(),
            inverse_operations: outcome.applied.iter().map(|a| a.inverse.clone()).collect(),
        })
    }

    async fn reset(&self) -> Result<(), OrbitError> {
        self.cache.reset();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orbiter_model::identity::RecordIdentity;
    use orbiter_model::operations::Operation;
    use orbiter_model::record::Record;
    use orbiter_model::schema::{ModelDefinition, Schema};
    use std::collections::HashMap;

    fn backend() -> MemorySourceBackend {
        let mut models = HashMap::new();
        models.insert("planet".to_string(), ModelDefinition::new().with_attribute("name", "string"));
        MemorySourceBackend::new(Arc::new(RecordCache::new(Arc::new(Schema::new(models)), false)))
    }

    #[tokio::test]
    async fn perform_update_surfaces_applied_and_inverse_operations() {
        let backend = backend();
        let record = Record::new(RecordIdentity::new("planet", "earth"));
        let transform = Transform::new(vec![Operation::AddRecord { record }]);

        let applied = backend.perform_update(&transform, &Hints::new()).await.unwrap();
        assert_eq!(applied.applied_operations.len(), 1);
        assert_eq!(
            applied.inverse_operations[0],
            Operation::RemoveRecord {
                record: RecordIdentity::new("planet", "earth")
            }
        );
    }

    #[tokio::test]
    async fn perform_update_keeps_batch_data_positionally_aligned_with_operations() {
        let backend = backend();
        let earth = Record::new(RecordIdentity::new("planet", "earth")).with_attribute("name", serde_json::json!("earth"));
        let mars = Record::new(RecordIdentity::new("planet", "mars")).with_attribute("name", serde_json::json!("mars"));
        let transform = Transform::new(vec![Operation::AddRecord { record: earth }, Operation::AddRecord { record: mars }]);

        let applied = backend.perform_update(&transform, &Hints::new()).await.unwrap();
        let data = applied.data.unwrap();
        let entries = data.as_array().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0]["id"], "earth");
        assert_eq!(entries[1]["id"], "mars");
    }

    #[tokio::test]
    async fn perform_pull_is_unsupported_by_default() {
        let backend = backend();
        let query = Query::single(orbiter_model::query::QueryExpression::FindRecords {
            type_name: Some("planet".into()),
            modifiers: Default::default(),
        });
        let result = backend.perform_pull(&query, &Hints::new()).await;
        assert!(matches!(result, Err(OrbitError::OperationNotAllowed(_))));
    }
}
