// /////////////////////////////////////////////////////////////////////////////
// Orbiter
// Copyright (c) 2025 A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Domain Error Taxonomy
//!
//! The closed set of failures a source, cache, or builder can raise. Every
//! variant carries enough context to produce a display string a host can
//! show directly to a user, and every propagation path (kernel pipeline,
//! cache patch/query, builders) rejects with one of these rather than a
//! generic string or `anyhow::Error`.

use thiserror::Error;

/// Errors raised anywhere in the orchestration core.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum OrbitError {
    #[error("Record not found: {type_name}:{id}")]
    RecordNotFound { type_name: String, id: String },

    #[error("Related record not found: {type_name}:{id} via relationship '{relationship}'")]
    RelatedRecordNotFound {
        type_name: String,
        id: String,
        relationship: String,
    },

    #[error("Record already exists: {type_name}:{id}")]
    RecordAlreadyExists { type_name: String, id: String },

    #[error("Schema error: {0}")]
    SchemaError(String),

    #[error("Model not defined: {0}")]
    ModelNotDefined(String),

    #[error("Operation not allowed: {0}")]
    OperationNotAllowed(String),

    #[error("Query expression parse error: {0}")]
    QueryExpressionParseError(String),

    #[error("Transform not allowed: {0}")]
    TransformNotAllowed(String),

    #[error("Network error: {description}")]
    NetworkError { description: String },

    #[error("Client error ({status}): {description}")]
    ClientError { status: u16, description: String },

    #[error("Server error ({status}): {description}")]
    ServerError { status: u16, description: String },

    #[error("Queue is empty")]
    QueueEmpty,

    #[error("Queue is busy processing another task")]
    QueueBusy,

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
}

impl OrbitError {
    pub fn record_not_found(type_name: impl Into<String>, id: impl Into<String>) -> Self {
        Self::RecordNotFound {
            type_name: type_name.into(),
            id: id.into(),
        }
    }

    pub fn related_record_not_found(
        type_name: impl Into<String>,
        id: impl Into<String>,
        relationship: impl Into<String>,
    ) -> Self {
        Self::RelatedRecordNotFound {
            type_name: type_name.into(),
            id: id.into(),
            relationship: relationship.into(),
        }
    }

    pub fn record_already_exists(type_name: impl Into<String>, id: impl Into<String>) -> Self {
        Self::RecordAlreadyExists {
            type_name: type_name.into(),
            id: id.into(),
        }
    }

    /// A display string suitable for showing directly to a user.
    pub fn description(&self) -> String {
        self.to_string()
    }

    /// Coarse category, used by hosts that want to group errors for metrics
    /// or presentation without matching on every variant.
    pub fn category(&self) -> &'static str {
        match self {
            OrbitError::RecordNotFound { .. } => "not_found",
            OrbitError::RelatedRecordNotFound { .. } => "not_found",
            OrbitError::RecordAlreadyExists { .. } => "conflict",
            OrbitError::SchemaError(_) => "schema",
            OrbitError::ModelNotDefined(_) => "schema",
            OrbitError::OperationNotAllowed(_) => "validation",
            OrbitError::QueryExpressionParseError(_) => "validation",
            OrbitError::TransformNotAllowed(_) => "validation",
            OrbitError::NetworkError { .. } => "network",
            OrbitError::ClientError { .. } => "network",
            OrbitError::ServerError { .. } => "network",
            OrbitError::QueueEmpty => "queue",
            OrbitError::QueueBusy => "queue",
            OrbitError::SerializationError(_) => "serialization",
            OrbitError::InvalidConfiguration(_) => "configuration",
        }
    }

    /// Whether a caller might reasonably retry the same request unchanged.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            OrbitError::NetworkError { .. } | OrbitError::ServerError { .. } | OrbitError::QueueBusy
        )
    }
}

impl From<serde_json::Error> for OrbitError {
    fn from(err: serde_json::Error) -> Self {
        OrbitError::SerializationError(err.to_string())
    }
}
