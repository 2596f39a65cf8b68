// /////////////////////////////////////////////////////////////////////////////
// Orbiter
// Copyright (c) 2025 A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Live Queries
//!
//! A subscription that re-evaluates one query expression every time the
//! cache changes. The cache only ever broadcasts a coarse "something
//! changed" signal (it has no idea which subscriptions care about which
//! records), so a live query re-runs its own expression on each tick rather
//! than receiving a pre-computed diff — a stateless re-evaluation in favor
//! of incremental diffing.

use std::sync::Arc;

use async_stream::stream;
use futures::Stream;
use orbiter_model::error::OrbitError;
use orbiter_model::query::{Query, QueryExpression};
use serde_json::Value;
use tokio::sync::broadcast::error::RecvError;

use super::RecordCache;

/// A live subscription to one query expression. Drop it (or let it go out
/// of scope) to unsubscribe — there is no persisted registration to clean
/// up, just the broadcast receiver this struct owns.
pub struct LiveQuery {
    cache: Arc<RecordCache>,
    expression: QueryExpression,
    debounce: bool,
}

impl LiveQuery {
    pub(super) fn new(cache: Arc<RecordCache>, expression: QueryExpression, debounce: bool) -> Self {
        Self { cache, expression, debounce }
    }

    /// Evaluates the expression once, without waiting for a change.
    pub fn current(&self) -> Result<Value, OrbitError> {
        let query = Query::single(self.expression.clone());
        Ok(self.cache.query(&query)?.remove(0))
    }

    /// A stream that yields the expression's result every time the cache
    /// changes. When `debounce` was requested at construction, a burst of
    /// patches arriving before a consumer next polls the stream collapses
    /// into a single re-evaluation, instead of one emission per patch.
    pub fn subscribe(&self) -> impl Stream<Item = Result<Value, OrbitError>> + Send + 'static {
        let cache = Arc::clone(&self.cache);
        let expression = self.expression.clone();
        let debounce = self.debounce;
        let mut changes = cache.subscribe_changes();

        stream! {
            loop {
                match changes.recv().await {
                    Ok(()) => {}
                    Err(RecvError::Lagged(_)) => continue,
                    Err(RecvError::Closed) => break,
                }

                if debounce {
                    // Collapse whatever else arrived while this task wasn't
                    // polling: drain pending notifications, yield once to
                    // let any in-flight patch() calls land, then drain again.
                    while changes.try_recv().is_ok() {}
                    tokio::task::yield_now().await;
                    while changes.try_recv().is_ok() {}
                }

                let query = Query::single(expression.clone());
                yield cache.query(&query).map(|mut results| results.remove(0));
            }
        }
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

    use futures::StreamExt;

    fn cache() -> Arc<RecordCache> {
        let mut models = HashMap::new();
        models.insert("planet".to_string(), ModelDefinition::new().with_attribute("name", "string"));
        Arc::new(RecordCache::new(Arc::new(Schema::new(models)), false))
    }

    #[tokio::test]
    async fn live_query_emits_after_each_patch_scenario_4() {
        let cache = cache();
        let live = cache.subscribe_live(
            QueryExpression::FindRecords {
                type_name: Some("planet".into()),
                modifiers: Default::default(),
            },
            false,
        );
        let mut stream = Box::pin(live.subscribe());

        cache
            .patch(&[Operation::AddRecord {
                record: Record::new(RecordIdentity::new("planet", "earth")),
            }])
            .unwrap();

        let result = stream.next().await.unwrap().unwrap();
        assert_eq!(result.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn debounced_subscription_collapses_a_burst_into_one_emission() {
        let cache = cache();
        let live = cache.subscribe_live(
            QueryExpression::FindRecords {
                type_name: Some("planet".into()),
                modifiers: Default::default(),
            },
            true,
        );
        let mut stream = Box::pin(live.subscribe());

        for name in ["a", "b", "c"] {
            cache
                .patch(&[Operation::AddRecord {
                    record: Record::new(RecordIdentity::new("planet", name)),
                }])
                .unwrap();
        }

        let result = stream.next().await.unwrap().unwrap();
        assert_eq!(result.as_array().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn current_reflects_state_without_waiting_for_a_change() {
        let cache = cache();
        cache
            .patch(&[Operation::AddRecord {
                record: Record::new(RecordIdentity::new("planet", "earth")),
            }])
            .unwrap();

        let live = cache.subscribe_live(
            QueryExpression::FindRecord {
                record: RecordIdentity::new("planet", "earth"),
            },
            false,
        );
        assert_eq!(live.current().unwrap()["id"], "earth");
    }
}
