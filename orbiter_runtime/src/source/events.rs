// /////////////////////////////////////////////////////////////////////////////
// Orbiter
// Copyright (c) 2025 A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Event Bus
//!
//! Dispatch machinery for [`orbiter_model::events::SourceEvent`]. Two
//! registries, matching the two listener shapes the pipeline contract
//! needs:
//!
//! - **Before** listeners are phase-keyed, run serially in registration
//!   order, and fold a shared [`Hints`] bag — any one of them failing aborts
//!   the whole pipeline call with an `XFail`.
//! - **After** listeners see every event, run concurrently, and cannot fail
//!   the call — they are purely informational.
//!
//! Reuses the `Arc<dyn Fn(...) -> BoxFuture<...> + Send + Sync>` shape
//! `queue::Performer` established for async callback storage.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::{join_all, BoxFuture};
use orbiter_model::error::OrbitError;
use orbiter_model::events::{Hints, SourceEvent};
use parking_lot::RwLock;

/// Runs ahead of `_X`; may inspect/extend `hints` and may veto the call by
/// returning `Err`.
pub type BeforeListener = Arc<dyn Fn(SourceEvent, Hints) -> BoxFuture<'static, Result<Hints, OrbitError>> + Send + Sync>;

/// Runs after the outcome of `_X` is known; cannot veto anything.
pub type AfterListener = Arc<dyn Fn(SourceEvent) -> BoxFuture<'static, ()> + Send + Sync>;

#[derive(Default)]
struct Registry {
    before: HashMap<String, Vec<BeforeListener>>,
    after: Vec<AfterListener>,
}

/// Per-source pub/sub hub. Cheap to share via `Arc` — registration only
/// ever appends, so a plain `RwLock` over `Vec`s is enough.
#[derive(Default)]
pub struct EventBus {
    registry: RwLock<Registry>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a `beforeX` listener for the named phase (e.g. `"query"`,
    /// `"update"`).
    pub fn on_before(&self, phase: impl Into<String>, listener: BeforeListener) {
        self.registry.write().before.entry(phase.into()).or_default().push(listener);
    }

    /// Registers an after-the-fact listener observing every event.
    pub fn subscribe(&self, listener: AfterListener) {
        self.registry.write().after.push(listener);
    }

    /// Runs every `beforeX` listener registered for `phase` serially,
    /// threading `hints` through each in turn. The first listener to fail
    /// aborts the fold; listeners after it never run.
    pub async fn run_before(&self, phase: &str, event: SourceEvent, mut hints: Hints) -> Result<Hints, OrbitError> {
        let listeners = self.registry.read().before.get(phase).cloned().unwrap_or_default();
        for listener in listeners {
            hints = listener(event.clone(), hints).await?;
        }
        Ok(hints)
    }

    /// Dispatches `event` to every subscribed after-listener concurrently,
    /// awaiting them all before returning — the pipeline contract emits
    /// `transform`/`X` synchronously before the caller's future resolves,
    /// so this must not fire-and-forget.
    pub async fn emit(&self, event: SourceEvent) {
        let listeners = self.registry.read().after.clone();
        join_all(listeners.into_iter().map(|listener| listener(event.clone()))).await;
    }
}

impl Clone for Registry {
    fn clone(&self) -> Self {
        Self {
            before: self.before.clone(),
            after: self.after.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orbiter_model::events::EventMeta;
    use orbiter_model::query::{Query, QueryExpression};
    use orbiter_model::identity::RecordIdentity;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn sample_event() -> SourceEvent {
        SourceEvent::BeforeQuery {
            meta: EventMeta::new("test"),
            query: Query::single(QueryExpression::FindRecord {
                record: RecordIdentity::new("planet", "earth"),
            }),
        }
    }

    #[tokio::test]
    async fn before_listeners_run_in_registration_order() {
        let bus = EventBus::new();
        let order = Arc::new(parking_lot::Mutex::new(Vec::new()));

        for tag in ["a", "b"] {
            let order = Arc::clone(&order);
            bus.on_before(
                "query",
                Arc::new(move |_event, mut hints: Hints| {
                    let order = Arc::clone(&order);
                    Box::pin(async move {
                        order.lock().push(tag);
                        hints.set("seen", serde_json::json!(tag));
                        Ok(hints)
                    })
                }),
            );
        }

        bus.run_before("query", sample_event(), Hints::new()).await.unwrap();
        assert_eq!(*order.lock(), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn a_failing_before_listener_aborts_the_fold() {
        let bus = EventBus::new();
        let ran_second = Arc::new(AtomicUsize::new(0));

        bus.on_before(
            "query",
            Arc::new(|_event, _hints| Box::pin(async move { Err(OrbitError::OperationNotAllowed("nope".into())) })),
        );
        let flag = Arc::clone(&ran_second);
        bus.on_before(
            "query",
            Arc::new(move |_event, hints| {
                let flag = Arc::clone(&flag);
                Box::pin(async move {
                    flag.fetch_add(1, Ordering::SeqCst);
                    Ok(hints)
                })
            }),
        );

        let result = bus.run_before("query", sample_event(), Hints::new()).await;
        assert!(result.is_err());
        assert_eq!(ran_second.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn after_listeners_all_observe_the_event() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let count = Arc::clone(&count);
            bus.subscribe(Arc::new(move |_event| {
                let count = Arc::clone(&count);
                Box::pin(async move {
                    count.fetch_add(1, Ordering::SeqCst);
                })
            }));
        }

        bus.emit(sample_event()).await;
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }
}
