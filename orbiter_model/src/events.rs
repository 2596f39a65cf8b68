// /////////////////////////////////////////////////////////////////////////////
// Orbiter
// Copyright (c) 2025 A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Source Events
//!
//! The pub/sub vocabulary emitted by a Source kernel. Kept as plain data
//! here; the actual subscription/dispatch machinery (which must support
//! async listeners a pipeline awaits and can fail on) lives in
//! `orbiter-runtime`'s `source` module, since that's an I/O-adjacent
//! concern the pure domain has no business owning.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::operations::Operation;
use crate::query::Query;
use crate::transform::Transform;
use crate::value_objects::TransformId;

/// Bookkeeping common to every emitted event.
#[derive(Debug, Clone, PartialEq)]
pub struct EventMeta {
    pub event_id: Uuid,
    pub occurred_at: DateTime<Utc>,
    pub source_name: String,
}

impl EventMeta {
    pub fn new(source_name: impl Into<String>) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            occurred_at: Utc::now(),
            source_name: source_name.into(),
        }
    }
}

/// A shared, mutable, request-scoped bag that `beforeX` listeners can
/// populate and `_X` handlers can read — how a listener "pre-supplies data"
/// to the handler that runs after it, without either side knowing about
/// the other's concrete type. Serializable so a queued task carrying hints
/// can be persisted to the bucket along with the rest of its payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Hints(Map<String, Value>);

impl Hints {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        self.0.insert(key.into(), value);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Every event a Source kernel may emit — a closed vocabulary.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceEvent {
    BeforeQuery { meta: EventMeta, query: Query },
    Query { meta: EventMeta, query: Query },
    QueryFail { meta: EventMeta, query: Query, error: String },

    BeforeUpdate { meta: EventMeta, transform: Transform },
    Update { meta: EventMeta, transform: Transform },
    UpdateFail { meta: EventMeta, transform: Transform, error: String },

    BeforeSync { meta: EventMeta, transform: Transform },
    Sync { meta: EventMeta, transform: Transform },
    SyncFail { meta: EventMeta, transform: Transform, error: String },

    BeforePush { meta: EventMeta, transform: Transform },
    Push { meta: EventMeta, transform: Transform },
    PushFail { meta: EventMeta, transform: Transform, error: String },

    BeforePull { meta: EventMeta, query: Query },
    Pull { meta: EventMeta, query: Query },
    PullFail { meta: EventMeta, query: Query, error: String },

    Transform { meta: EventMeta, transform: Transform },
    Patch { meta: EventMeta, operation: Operation, inverse: Operation },
    Reset { meta: EventMeta },
    Upgrade { meta: EventMeta, version: u64 },
    Rollback { meta: EventMeta, transform_id: TransformId },
}

impl SourceEvent {
    /// The event name as it appears in the pub/sub vocabulary, usable for
    /// logging or host-side filtering without a full match.
    pub fn name(&self) -> &'static str {
        match self {
            SourceEvent::BeforeQuery { .. } => "beforeQuery",
            SourceEvent::Query { .. } => "query",
            SourceEvent::QueryFail { .. } => "queryFail",
            SourceEvent::BeforeUpdate { .. } => "beforeUpdate",
            SourceEvent::Update { .. } => "update",
            SourceEvent::UpdateFail { .. } => "updateFail",
            SourceEvent::BeforeSync { .. } => "beforeSync",
            SourceEvent::Sync { .. } => "sync",
            SourceEvent::SyncFail { .. } => "syncFail",
            SourceEvent::BeforePush { .. } => "beforePush",
            SourceEvent::Push { .. } => "push",
            SourceEvent::PushFail { .. } => "pushFail",
            SourceEvent::BeforePull { .. } => "beforePull",
            SourceEvent::Pull { .. } => "pull",
            SourceEvent::PullFail { .. } => "pullFail",
            SourceEvent::Transform { .. } => "transform",
            SourceEvent::Patch { .. } => "patch",
            SourceEvent::Reset { .. } => "reset",
            SourceEvent::Upgrade { .. } => "upgrade",
            SourceEvent::Rollback { .. } => "rollback",
        }
    }
}
