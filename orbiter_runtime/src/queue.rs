// /////////////////////////////////////////////////////////////////////////////
// Orbiter
// Copyright (c) 2025 A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Task Queue
//!
//! A named, persistent FIFO. Every push is serialized to the bucket before
//! the call completes; on construction the queue hydrates itself from that
//! same key. Processing is strictly sequential — a single `tokio::sync::Mutex`
//! around the queue state is what gives the request/sync queues their
//! head-of-line blocking — a single logical executor without requiring
//! literal single-threading.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use futures::future::BoxFuture;
use orbiter_model::error::OrbitError;
use orbiter_model::interfaces::Bucket;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, Notify};
use tracing::{error, instrument, warn};

/// One unit of queued work: a discriminant tag plus its payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task<T> {
    #[serde(rename = "type")]
    pub kind: String,
    pub data: T,
}

impl<T> Task<T> {
    pub fn new(kind: impl Into<String>, data: T) -> Self {
        Self { kind: kind.into(), data }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct TaskQueueSettings {
    pub auto_process: bool,
}

impl Default for TaskQueueSettings {
    fn default() -> Self {
        Self { auto_process: true }
    }
}

struct QueueState<T> {
    tasks: VecDeque<Task<T>>,
    /// Set when the queue was constructed with `autoActivate = false`;
    /// cleared by `activate()`.
    paused: bool,
    /// Set when the head task's performer rejected; processing halts until
    /// `skip`/`retry`/`clear` resolves it.
    parked_error: Option<String>,
    /// Set while a performer is running. Without this, two concurrent
    /// `push()` calls could both observe an idle queue and both start
    /// draining it, breaking the at-most-one-task-executing guarantee.
    processing: bool,
}

/// A performer executes one task; the queue advances past it on `Ok`,
/// parks on `Err`.
pub type Performer<T> = Arc<dyn Fn(Task<T>) -> BoxFuture<'static, Result<(), OrbitError>> + Send + Sync>;

pub struct TaskQueue<T> {
    name: String,
    bucket: Arc<dyn Bucket>,
    settings: TaskQueueSettings,
    state: Mutex<QueueState<T>>,
    performer: Performer<T>,
    reified: Notify,
    hydrated: std::sync::atomic::AtomicBool,
}

impl<T> fmt::Debug for TaskQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskQueue").field("name", &self.name).finish()
    }
}

impl<T> TaskQueue<T>
where
    T: Clone + Send + Sync + Serialize + DeserializeOwned + 'static,
{
    pub fn new(name: impl Into<String>, bucket: Arc<dyn Bucket>, settings: TaskQueueSettings, performer: Performer<T>) -> Self {
        Self {
            name: name.into(),
            bucket,
            settings,
            state: Mutex::new(QueueState {
                tasks: VecDeque::new(),
                paused: false,
                parked_error: None,
                processing: false,
            }),
            performer,
            reified: Notify::new(),
            hydrated: std::sync::atomic::AtomicBool::new(false),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Loads any previously persisted tasks from the bucket and, if
    /// `autoProcess` and `autoActivate` both hold, kicks off processing.
    #[instrument(skip(self), fields(queue = %self.name))]
    pub async fn hydrate(&self, auto_activate: bool) -> Result<(), OrbitError> {
        if let Some(value) = self.bucket.get_item(&self.name).await? {
            let tasks: VecDeque<Task<T>> = serde_json::from_value(value)?;
            self.state.lock().await.tasks = tasks;
        }
        self.hydrated.store(true, std::sync::atomic::Ordering::SeqCst);
        self.reified.notify_waiters();

        if self.settings.auto_process && auto_activate {
            self.process_if_idle().await?;
        }
        Ok(())
    }

    /// Resolves once hydration from the bucket has completed.
    pub async fn reified(&self) {
        if self.hydrated.load(std::sync::atomic::Ordering::SeqCst) {
            return;
        }
        self.reified.notified().await;
    }

    async fn persist(&self, state: &QueueState<T>) -> Result<(), OrbitError> {
        let value = serde_json::to_value(&state.tasks)?;
        self.bucket.set_item(&self.name, value).await
    }

    /// Enqueues a task, persists the updated queue, and (if idle and
    /// auto-processing) starts working through it.
    #[instrument(skip(self, task), fields(queue = %self.name, kind = %task.kind))]
    pub async fn push(&self, task: Task<T>) -> Result<(), OrbitError> {
        {
            let mut state = self.state.lock().await;
            state.tasks.push_back(task);
            self.persist(&state).await?;
        }
        if self.settings.auto_process {
            self.process_if_idle().await?;
        }
        Ok(())
    }

    fn is_idle(state: &QueueState<T>) -> bool {
        !state.paused && !state.processing && state.parked_error.is_none() && !state.tasks.is_empty()
    }

    async fn process_if_idle(&self) -> Result<(), OrbitError> {
        loop {
            let task = {
                let mut state = self.state.lock().await;
                if !Self::is_idle(&state) {
                    return Ok(());
                }
                let task = state.tasks.front().cloned();
                if task.is_some() {
                    state.processing = true;
                }
                task
            };
            let Some(task) = task else { return Ok(()) };

            let outcome = (self.performer)(task).await;
            let mut state = self.state.lock().await;
            state.processing = false;
            match outcome {
                Ok(()) => {
                    state.tasks.pop_front();
                    self.persist(&state).await?;
                }
                Err(err) => {
                    error!(queue = %self.name, error = %err, "task rejected, parking queue at head-of-line");
                    state.parked_error = Some(err.to_string());
                    return Err(err);
                }
            }
        }
    }

    /// Discards the head task (whatever its fate) and resumes processing.
    pub async fn skip(&self, error: Option<OrbitError>) -> Result<(), OrbitError> {
        if let Some(err) = &error {
            warn!(queue = %self.name, error = %err, "skipping head task");
        }
        {
            let mut state = self.state.lock().await;
            state.tasks.pop_front();
            state.parked_error = None;
            self.persist(&state).await?;
        }
        if self.settings.auto_process {
            self.process_if_idle().await?;
        }
        Ok(())
    }

    /// Discards the head task without emitting any error context and
    /// without resuming automatically.
    pub async fn shift(&self) -> Result<Option<Task<T>>, OrbitError> {
        let mut state = self.state.lock().await;
        let removed = state.tasks.pop_front();
        state.parked_error = None;
        self.persist(&state).await?;
        Ok(removed)
    }

    /// Re-runs the head task (the usual response to a parked error once the
    /// underlying condition is believed fixed).
    pub async fn retry(&self) -> Result<(), OrbitError> {
        self.state.lock().await.parked_error = None;
        self.process_if_idle().await
    }

    pub async fn clear(&self) -> Result<(), OrbitError> {
        let mut state = self.state.lock().await;
        state.tasks.clear();
        state.parked_error = None;
        self.persist(&state).await
    }

    pub async fn pause(&self) {
        self.state.lock().await.paused = true;
    }

    pub async fn activate(&self) -> Result<(), OrbitError> {
        self.state.lock().await.paused = false;
        if self.settings.auto_process {
            self.process_if_idle().await?;
        }
        Ok(())
    }

    pub async fn len(&self) -> usize {
        self.state.lock().await.tasks.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn is_parked(&self) -> bool {
        self.state.lock().await.parked_error.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::bucket::MemoryBucket;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_performer(counter: Arc<AtomicUsize>) -> Performer<String> {
        Arc::new(move |_task: Task<String>| {
            let counter = counter.clone();
            Box::pin(async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
        })
    }

    fn failing_performer() -> Performer<String> {
        Arc::new(|_task: Task<String>| Box::pin(async move { Err(OrbitError::QueueBusy) }))
    }

    #[tokio::test]
    async fn fifo_completion_order_matches_enqueue_order() {
        let bucket = Arc::new(MemoryBucket::new());
        let counter = Arc::new(AtomicUsize::new(0));
        let queue = TaskQueue::new("requests", bucket, TaskQueueSettings::default(), counting_performer(counter.clone()));
        queue.hydrate(true).await.unwrap();

        queue.push(Task::new("query", "a".to_string())).await.unwrap();
        queue.push(Task::new("query", "b".to_string())).await.unwrap();
        queue.push(Task::new("query", "c".to_string())).await.unwrap();

        assert_eq!(counter.load(Ordering::SeqCst), 3);
        assert!(queue.is_empty().await);
    }

    #[tokio::test]
    async fn rejected_task_parks_at_head_of_line() {
        let bucket = Arc::new(MemoryBucket::new());
        let queue = TaskQueue::new("requests", bucket, TaskQueueSettings::default(), failing_performer());
        queue.hydrate(true).await.unwrap();

        let result = queue.push(Task::new("query", "a".to_string())).await;
        assert!(result.is_err());
        assert!(queue.is_parked().await);
        assert_eq!(queue.len().await, 1);
    }

    #[tokio::test]
    async fn skip_discards_head_and_resumes() {
        let bucket = Arc::new(MemoryBucket::new());
        let queue = TaskQueue::new("requests", bucket, TaskQueueSettings::default(), failing_performer());
        queue.hydrate(true).await.unwrap();
        let _ = queue.push(Task::new("query", "a".to_string())).await;

        queue.skip(Some(OrbitError::QueueBusy)).await.unwrap();
        assert!(queue.is_empty().await);
        assert!(!queue.is_parked().await);
    }

    #[tokio::test]
    async fn hydrate_restores_persisted_tasks() {
        let bucket = Arc::new(MemoryBucket::new());
        {
            let queue = TaskQueue::new(
                "requests",
                bucket.clone(),
                TaskQueueSettings { auto_process: false },
                failing_performer(),
            );
            queue.hydrate(false).await.unwrap();
            queue.push(Task::new("query", "a".to_string())).await.unwrap();
        }

        let counter = Arc::new(AtomicUsize::new(0));
        let queue = TaskQueue::new("requests", bucket, TaskQueueSettings::default(), counting_performer(counter.clone()));
        queue.hydrate(true).await.unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }
}
