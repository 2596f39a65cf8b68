// /////////////////////////////////////////////////////////////////////////////
// Orbiter
// Copyright (c) 2025 A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Source Kernel
//!
//! The uniform lifecycle, queues, log, and event pipeline every concrete
//! source inherits. `Source` is a concrete struct generic over a
//! `SourceBackend` trait object rather than a trait itself — the kernel
//! (queues, log, event bus) is the same regardless of whether the backend
//! is an in-memory cache or a remote adapter: an aggregate-like coordinator
//! sitting in front of the repository-like port it delegates storage to.

pub mod builders;
pub mod events;
pub mod memory;

use std::collections::HashMap;
use std::sync::Arc;

use orbiter_model::error::OrbitError;
use orbiter_model::events::{EventMeta, Hints, SourceEvent};
use orbiter_model::interfaces::{Bucket, FullResponse, Pullable, Pushable, Queryable, SourceBackend, Syncable, Updatable};
use orbiter_model::query::Query;
use orbiter_model::transform::Transform;
use serde::{Deserialize, Serialize};
use tokio::sync::{oneshot, Mutex};
use tracing::instrument;
use uuid::Uuid;

use crate::queue::{Performer, Task, TaskQueue, TaskQueueSettings};
use crate::log::TransformLog;
use builders::{build_query, build_transform, QueryBuilder, QueryInput, TransformBuilder, TransformInput};
use events::{AfterListener, BeforeListener, EventBus};

/// Construction options a host may override; every field has a sensible
/// default.
#[derive(Debug, Clone)]
pub struct SourceOptions {
    pub name: String,
    pub auto_activate: bool,
    pub auto_upgrade: bool,
    pub debounce_live_queries: bool,
    pub request_queue_settings: TaskQueueSettings,
    pub sync_queue_settings: TaskQueueSettings,
}

impl Default for SourceOptions {
    fn default() -> Self {
        Self {
            name: format!("source-{}", Uuid::new_v4()),
            auto_activate: true,
            auto_upgrade: true,
            debounce_live_queries: true,
            request_queue_settings: TaskQueueSettings::default(),
            sync_queue_settings: TaskQueueSettings::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
enum RequestPayload {
    Query { call_id: Uuid, query: Query, hints: Hints },
    Update { call_id: Uuid, transform: Transform, hints: Hints },
    Sync { call_id: Uuid, transform: Transform, hints: Hints },
    Pull { call_id: Uuid, query: Query, hints: Hints },
    Push { call_id: Uuid, transform: Transform, hints: Hints },
}

impl RequestPayload {
    fn call_id(&self) -> Uuid {
        match self {
            RequestPayload::Query { call_id, .. }
            | RequestPayload::Update { call_id, .. }
            | RequestPayload::Sync { call_id, .. }
            | RequestPayload::Pull { call_id, .. }
            | RequestPayload::Push { call_id, .. } => *call_id,
        }
    }

    async fn invoke(&self, backend: &dyn SourceBackend) -> Result<PipelineOutcome, OrbitError> {
        match self {
            RequestPayload::Query { query, hints, .. } => backend.perform_query(query, hints).await.map(PipelineOutcome::Query),
            RequestPayload::Update { transform, hints, .. } => backend.perform_update(transform, hints).await.map(PipelineOutcome::Applied),
            RequestPayload::Sync { transform, hints, .. } => backend.perform_sync(transform, hints).await.map(PipelineOutcome::Applied),
            RequestPayload::Pull { query, hints, .. } => backend.perform_pull(query, hints).await.map(PipelineOutcome::Pull),
            RequestPayload::Push { transform, hints, .. } => backend.perform_push(transform, hints).await.map(PipelineOutcome::Push),
        }
    }
}

#[derive(Debug, Clone)]
enum PipelineOutcome {
    Query(serde_json::Value),
    Applied(orbiter_model::interfaces::AppliedOperations),
    Pull(Vec<Transform>),
    Push(Vec<Transform>),
}

type PendingMap = Mutex<HashMap<Uuid, oneshot::Sender<Result<PipelineOutcome, OrbitError>>>>;

/// The concrete lifecycle coordinator: queues, log, event bus, and a
/// pluggable backend. One instance per named source.
pub struct Source {
    name: String,
    backend: Arc<dyn SourceBackend>,
    events: Arc<EventBus>,
    transform_log: Arc<TransformLog>,
    request_queue: Arc<TaskQueue<RequestPayload>>,
    sync_queue: Arc<TaskQueue<RequestPayload>>,
    pending: Arc<PendingMap>,
    query_builder: QueryBuilder,
    transform_builder: TransformBuilder,
    auto_upgrade: bool,
    debounce_live_queries: bool,
}

impl Source {
    /// Builds a new source. Callers should `hydrate().await` immediately
    /// after construction (mirroring `TaskQueue`/`TransformLog`'s own
    /// hydrate-on-start contract) before issuing any pipeline calls.
    pub fn new(options: SourceOptions, backend: Box<dyn SourceBackend>, bucket: Arc<dyn Bucket>) -> Self {
        let name = options.name.clone();
        let backend: Arc<dyn SourceBackend> = Arc::from(backend);
        let pending: Arc<PendingMap> = Arc::new(Mutex::new(HashMap::new()));
        let events = Arc::new(EventBus::new());

        let request_queue = Arc::new(TaskQueue::new(
            format!("{name}-requests"),
            Arc::clone(&bucket),
            options.request_queue_settings,
            Self::performer(Arc::clone(&backend), Arc::clone(&pending)),
        ));
        let sync_queue = Arc::new(TaskQueue::new(
            format!("{name}-sync"),
            Arc::clone(&bucket),
            options.sync_queue_settings,
            Self::performer(Arc::clone(&backend), Arc::clone(&pending)),
        ));
        let transform_log = Arc::new(TransformLog::new(format!("{name}-log"), bucket));

        Self {
            name,
            backend,
            events,
            transform_log,
            request_queue,
            sync_queue,
            pending,
            query_builder: QueryBuilder,
            transform_builder: TransformBuilder,
            auto_upgrade: options.auto_upgrade,
            debounce_live_queries: options.debounce_live_queries,
        }
    }

    /// Whether live queries subscribed against this source's backing store
    /// should coalesce same-turn patches into one notification. Mirrors the
    /// `debounceLiveQueries` construction option for hosts that wire a
    /// [`crate::cache::RecordCache`] live query up themselves (the Record
    /// Cache, not the kernel, owns live-query subscription).
    pub fn debounce_live_queries(&self) -> bool {
        self.debounce_live_queries
    }

    fn performer(backend: Arc<dyn SourceBackend>, pending: Arc<PendingMap>) -> Performer<RequestPayload> {
        Arc::new(move |task: Task<RequestPayload>| {
            let backend = Arc::clone(&backend);
            let pending = Arc::clone(&pending);
            Box::pin(async move {
                let payload = task.data;
                let call_id = payload.call_id();
                let result = payload.invoke(backend.as_ref()).await;
                if let Some(tx) = pending.lock().await.remove(&call_id) {
                    let _ = tx.send(result.clone());
                }
                result.map(|_| ())
            })
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    pub fn transform_log(&self) -> &Arc<TransformLog> {
        &self.transform_log
    }

    pub fn on_before(&self, phase: impl Into<String>, listener: BeforeListener) {
        self.events.on_before(phase, listener);
    }

    pub fn subscribe(&self, listener: AfterListener) {
        self.events.subscribe(listener);
    }

    /// Hydrates the request/sync queues and transform log from the bucket,
    /// resuming processing if `autoActivate` held at construction.
    pub async fn hydrate(&self, auto_activate: bool) -> Result<(), OrbitError> {
        self.transform_log.hydrate().await?;
        self.request_queue.hydrate(auto_activate).await?;
        self.sync_queue.hydrate(auto_activate).await?;
        Ok(())
    }

    pub async fn activate(&self) -> Result<(), OrbitError> {
        self.request_queue.activate().await?;
        self.sync_queue.activate().await
    }

    /// Reacts to a schema version bump. Always emits `upgrade`; when the
    /// source was constructed with `auto_upgrade` (the default), also asks
    /// the backend to discard any state it cannot migrate and emits `reset`
    /// once it has.
    #[instrument(skip(self), fields(source = %self.name))]
    pub async fn upgrade(&self, version: u64) -> Result<(), OrbitError> {
        let meta = self.meta();
        self.events.emit(SourceEvent::Upgrade { meta: meta.clone(), version }).await;
        if self.auto_upgrade {
            self.backend.reset().await?;
            self.events.emit(SourceEvent::Reset { meta }).await;
        }
        Ok(())
    }

    /// Rolls the transform log back past `id`, discarding every transform
    /// applied after it, and emits `rollback`. Does not touch the backend's
    /// own state — a caller that wants the store to match is expected to
    /// re-derive it (e.g. by re-running `sync` from the remaining log).
    #[instrument(skip(self), fields(source = %self.name))]
    pub async fn rollback(&self, id: &orbiter_model::value_objects::TransformId) -> Result<(), OrbitError> {
        self.transform_log.rollback(id).await?;
        self.events
            .emit(SourceEvent::Rollback { meta: self.meta(), transform_id: *id })
            .await;
        Ok(())
    }

    async fn submit(&self, queue: &TaskQueue<RequestPayload>, kind: &'static str, payload: RequestPayload) -> Result<PipelineOutcome, OrbitError> {
        let call_id = payload.call_id();
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(call_id, tx);
        queue.push(Task::new(kind, payload)).await?;
        rx.await
            .unwrap_or_else(|_| Err(OrbitError::OperationNotAllowed("pipeline result channel closed before completion".to_string())))
    }

    fn meta(&self) -> EventMeta {
        EventMeta::new(self.name.clone())
    }
}

#[async_trait::async_trait]
impl Queryable for Source {
    #[instrument(skip(self, query), fields(source = %self.name))]
    async fn query(&self, query: Query, full_response: bool) -> Result<FullResponse<serde_json::Value>, OrbitError> {
        let meta = self.meta();

        let hints = match self
            .events
            .run_before("query", SourceEvent::BeforeQuery { meta: meta.clone(), query: query.clone() }, Hints::new())
            .await
        {
            Ok(hints) => hints,
            Err(err) => {
                self.events
                    .emit(SourceEvent::QueryFail { meta, query, error: err.to_string() })
                    .await;
                return Err(err);
            }
        };
        let details = hints.get("details").cloned();

        let call_id = Uuid::new_v4();
        let outcome = self
            .submit(&self.request_queue, "query", RequestPayload::Query { call_id, query: query.clone(), hints })
            .await;

        let data = match outcome {
            Ok(PipelineOutcome::Query(value)) => value,
            Ok(_) => unreachable!("query payload always yields PipelineOutcome::Query"),
            Err(err) => {
                self.events
                    .emit(SourceEvent::QueryFail { meta, query, error: err.to_string() })
                    .await;
                return Err(err);
            }
        };

        self.events.emit(SourceEvent::Query { meta, query }).await;
        // A query never produces a transform; `transforms` stays unset
        // either way, but `details` is surfaced once full_response is
        // requested, the same as the mutating pipelines below.
        Ok(if full_response {
            FullResponse { data, details, transforms: None }
        } else {
            FullResponse::data_only(data)
        })
    }
}

#[async_trait::async_trait]
impl Updatable for Source {
    #[instrument(skip(self, transform), fields(source = %self.name))]
    async fn update(&self, transform: Transform, full_response: bool) -> Result<FullResponse<Option<serde_json::Value>>, OrbitError> {
        let meta = self.meta();

        let hints = match self
            .events
            .run_before(
                "update",
                SourceEvent::BeforeUpdate { meta: meta.clone(), transform: transform.clone() },
                Hints::new(),
            )
            .await
        {
            Ok(hints) => hints,
            Err(err) => {
                self.events
                    .emit(SourceEvent::UpdateFail { meta, transform, error: err.to_string() })
                    .await;
                return Err(err);
            }
        };
        let details = hints.get("details").cloned();

        let call_id = Uuid::new_v4();
        let outcome = self
            .submit(
                &self.request_queue,
                "update",
                RequestPayload::Update { call_id, transform: transform.clone(), hints },
            )
            .await;

        let applied = match outcome {
            Ok(PipelineOutcome::Applied(applied)) => applied,
            Ok(_) => unreachable!("update payload always yields PipelineOutcome::Applied"),
            Err(err) => {
                self.events
                    .emit(SourceEvent::UpdateFail { meta, transform, error: err.to_string() })
                    .await;
                return Err(err);
            }
        };

        self.transform_log.append(&[transform.id]).await?;
        for applied_op in applied.applied_operations.iter().zip(applied.inverse_operations.iter()) {
            let (operation, inverse) = applied_op;
            self.events
                .emit(SourceEvent::Patch {
                    meta: meta.clone(),
                    operation: operation.clone(),
                    inverse: inverse.clone(),
                })
                .await;
        }
        self.events
            .emit(SourceEvent::Transform { meta: meta.clone(), transform: transform.clone() })
            .await;
        let applied_transform = transform.clone();
        self.events.emit(SourceEvent::Update { meta, transform }).await;

        Ok(if full_response {
            FullResponse {
                data: applied.data,
                details,
                transforms: Some(vec![applied_transform]),
            }
        } else {
            FullResponse::data_only(applied.data)
        })
    }
}

#[async_trait::async_trait]
impl Syncable for Source {
    #[instrument(skip(self, transform), fields(source = %self.name))]
    async fn sync(&self, transform: Transform) -> Result<(), OrbitError> {
        let meta = self.meta();

        if self.transform_log.contains(&transform.id) {
            return Ok(());
        }

        let hints = match self
            .events
            .run_before("sync", SourceEvent::BeforeSync { meta: meta.clone(), transform: transform.clone() }, Hints::new())
            .await
        {
            Ok(hints) => hints,
            Err(err) => {
                self.events
                    .emit(SourceEvent::SyncFail { meta, transform, error: err.to_string() })
                    .await;
                return Err(err);
            }
        };

        let call_id = Uuid::new_v4();
        let outcome = self
            .submit(&self.sync_queue, "sync", RequestPayload::Sync { call_id, transform: transform.clone(), hints })
            .await;

        let applied = match outcome {
            Ok(PipelineOutcome::Applied(applied)) => applied,
            Ok(_) => unreachable!("sync payload always yields PipelineOutcome::Applied"),
            Err(err) => {
                self.events
                    .emit(SourceEvent::SyncFail { meta, transform, error: err.to_string() })
                    .await;
                return Err(err);
            }
        };

        self.transform_log.append(&[transform.id]).await?;
        for (operation, inverse) in applied.applied_operations.iter().zip(applied.inverse_operations.iter()) {
            self.events
                .emit(SourceEvent::Patch {
                    meta: meta.clone(),
                    operation: operation.clone(),
                    inverse: inverse.clone(),
                })
                .await;
        }
        self.events
            .emit(SourceEvent::Transform { meta: meta.clone(), transform: transform.clone() })
            .await;
        self.events.emit(SourceEvent::Sync { meta, transform }).await;
        Ok(())
    }
}

#[async_trait::async_trait]
impl Pullable for Source {
    #[instrument(skip(self, query), fields(source = %self.name))]
    async fn pull(&self, query: Query, full_response: bool) -> Result<FullResponse<Vec<Transform>>, OrbitError> {
        let meta = self.meta();

        let hints = match self
            .events
            .run_before("pull", SourceEvent::BeforePull { meta: meta.clone(), query: query.clone() }, Hints::new())
            .await
        {
            Ok(hints) => hints,
            Err(err) => {
                self.events.emit(SourceEvent::PullFail { meta, query, error: err.to_string() }).await;
                return Err(err);
            }
        };
        let details = hints.get("details").cloned();

        let call_id = Uuid::new_v4();
        let outcome = self
            .submit(&self.request_queue, "pull", RequestPayload::Pull { call_id, query: query.clone(), hints })
            .await;

        let transforms = match outcome {
            Ok(PipelineOutcome::Pull(transforms)) => transforms,
            Ok(_) => unreachable!("pull payload always yields PipelineOutcome::Pull"),
            Err(err) => {
                self.events.emit(SourceEvent::PullFail { meta, query, error: err.to_string() }).await;
                return Err(err);
            }
        };

        for transform in &transforms {
            if !self.transform_log.contains(&transform.id) {
                self.transform_log.append(&[transform.id]).await?;
                self.events
                    .emit(SourceEvent::Transform { meta: meta.clone(), transform: transform.clone() })
                    .await;
            }
        }
        self.events.emit(SourceEvent::Pull { meta, query }).await;
        Ok(if full_response {
            FullResponse {
                transforms: Some(transforms.clone()),
                details,
                data: transforms,
            }
        } else {
            FullResponse::data_only(transforms)
        })
    }
}

#[async_trait::async_trait]
impl Pushable for Source {
    #[instrument(skip(self, transform), fields(source = %self.name))]
    async fn push(&self, transform: Transform, full_response: bool) -> Result<FullResponse<Vec<Transform>>, OrbitError> {
        let meta = self.meta();

        let hints = match self
            .events
            .run_before(
                "push",
                SourceEvent::BeforePush { meta: meta.clone(), transform: transform.clone() },
                Hints::new(),
            )
            .await
        {
            Ok(hints) => hints,
            Err(err) => {
                self.events
                    .emit(SourceEvent::PushFail { meta, transform, error: err.to_string() })
                    .await;
                return Err(err);
            }
        };
        let details = hints.get("details").cloned();

        let call_id = Uuid::new_v4();
        let outcome = self
            .submit(&self.request_queue, "push", RequestPayload::Push { call_id, transform: transform.clone(), hints })
            .await;

        let transforms = match outcome {
            Ok(PipelineOutcome::Push(transforms)) => transforms,
            Ok(_) => unreachable!("push payload always yields PipelineOutcome::Push"),
            Err(err) => {
                self.events
                    .emit(SourceEvent::PushFail { meta, transform, error: err.to_string() })
                    .await;
                return Err(err);
            }
        };

        for returned in &transforms {
            if !self.transform_log.contains(&returned.id) {
                self.transform_log.append(&[returned.id]).await?;
                self.events
                    .emit(SourceEvent::Transform { meta: meta.clone(), transform: returned.clone() })
                    .await;
            }
        }
        self.events.emit(SourceEvent::Push { meta, transform }).await;
        Ok(if full_response {
            FullResponse {
                transforms: Some(transforms.clone()),
                details,
                data: transforms,
            }
        } else {
            FullResponse::data_only(transforms)
        })
    }
}

impl Source {
    /// Convenience entry points accepting any [`QueryInput`]/[`TransformInput`]
    /// shape, running it through the builder normalization step before
    /// handing off to the [`Queryable`]/[`Updatable`] trait methods.
    pub async fn query_with(&self, input: impl Into<QueryInput>, full_response: bool) -> Result<FullResponse<serde_json::Value>, OrbitError> {
        let query = build_query(input.into(), &self.query_builder)?;
        Queryable::query(self, query, full_response).await
    }

    pub async fn update_with(
        &self,
        input: impl Into<TransformInput>,
        full_response: bool,
    ) -> Result<FullResponse<Option<serde_json::Value>>, OrbitError> {
        let transform = build_transform(input.into(), &self.transform_builder)?;
        Updatable::update(self, transform, full_response).await
    }
}
