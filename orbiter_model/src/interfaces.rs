// /////////////////////////////////////////////////////////////////////////////
// Orbiter
// Copyright (c) 2025 A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Source Interfaces
//!
//! The mixin contracts a Source kernel layers on top of its pipeline
//! (`Queryable`, `Updatable`, `Syncable`, `Pullable`, `Pushable`), plus the
//! `Bucket` persistence port and the `SourceBackend` port each concrete
//! source (in-memory cache, remote adapter) implements to supply the
//! `_X` half of the pipeline. Declared here, implemented in
//! `orbiter-runtime`, keeping the trait separate from its storage-backed
//! implementation.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::OrbitError;
use crate::events::Hints;
use crate::operations::Operation;
use crate::query::Query;
use crate::transform::Transform;

/// A pluggable key/value persistence provider. Values are opaque
/// JSON-serializable blobs; the source never interprets their shape itself.
#[async_trait]
pub trait Bucket: Send + Sync {
    async fn get_item(&self, key: &str) -> Result<Option<Value>, OrbitError>;
    async fn set_item(&self, key: &str, value: Value) -> Result<(), OrbitError>;
    async fn remove_item(&self, key: &str) -> Result<(), OrbitError>;
    async fn clear(&self) -> Result<(), OrbitError>;
    async fn get_keys(&self) -> Result<Vec<String>, OrbitError>;
}

/// Envelope returned when a caller opts into `fullResponse`; otherwise only
/// `data` is surfaced.
#[derive(Debug, Clone, PartialEq)]
pub struct FullResponse<T> {
    pub data: T,
    pub details: Option<Value>,
    pub transforms: Option<Vec<Transform>>,
}

impl<T> FullResponse<T> {
    pub fn data_only(data: T) -> Self {
        Self {
            data,
            details: None,
            transforms: None,
        }
    }
}

/// The result of a successful update/sync/push: the data produced (if any)
/// plus every operation actually applied, for the caller's transform log
/// and `transform` event emission.
///
/// `inverse_operations` is aligned positionally with `applied_operations`
/// (one inverse per applied op, mirrors included) so the kernel can emit a
/// `patch(operation, inverse)` event for each without recomputing anything.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AppliedOperations {
    pub data: Option<Value>,
    pub applied_operations: Vec<Operation>,
    pub inverse_operations: Vec<Operation>,
}

/// The backend port a concrete source supplies. The kernel is generic over
/// `Box<dyn SourceBackend>` so `MemorySource` and a remote-adapter-backed
/// source share one pipeline implementation.
#[async_trait]
pub trait SourceBackend: Send + Sync {
    async fn perform_query(&self, query: &Query, hints: &Hints) -> Result<Value, OrbitError>;
    async fn perform_update(&self, transform: &Transform, hints: &Hints) -> Result<AppliedOperations, OrbitError>;

    async fn perform_sync(&self, transform: &Transform, hints: &Hints) -> Result<AppliedOperations, OrbitError> {
        self.perform_update(transform, hints).await
    }

    async fn perform_pull(&self, _query: &Query, _hints: &Hints) -> Result<Vec<Transform>, OrbitError> {
        Err(OrbitError::OperationNotAllowed("this source does not support pull".to_string()))
    }

    async fn perform_push(&self, _transform: &Transform, _hints: &Hints) -> Result<Vec<Transform>, OrbitError> {
        Err(OrbitError::OperationNotAllowed("this source does not support push".to_string()))
    }

    /// Reacts to a schema upgrade the kernel decided to auto-propagate.
    /// The default is a no-op; a store that cannot migrate its records
    /// across schema versions (e.g. the in-memory cache) overrides this to
    /// discard its state.
    async fn reset(&self) -> Result<(), OrbitError> {
        Ok(())
    }
}

#[async_trait]
pub trait Queryable {
    async fn query(&self, query: Query, full_response: bool) -> Result<FullResponse<Value>, OrbitError>;
}

#[async_trait]
pub trait Updatable {
    async fn update(&self, transform: Transform, full_response: bool) -> Result<FullResponse<Option<Value>>, OrbitError>;
}

#[async_trait]
pub trait Syncable {
    async fn sync(&self, transform: Transform) -> Result<(), OrbitError>;
}

#[async_trait]
pub trait Pullable {
    async fn pull(&self, query: Query, full_response: bool) -> Result<FullResponse<Vec<Transform>>, OrbitError>;
}

#[async_trait]
pub trait Pushable {
    async fn push(&self, transform: Transform, full_response: bool) -> Result<FullResponse<Vec<Transform>>, OrbitError>;
}
