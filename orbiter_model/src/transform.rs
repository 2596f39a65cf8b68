// /////////////////////////////////////////////////////////////////////////////
// Orbiter
// Copyright (c) 2025 A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::operations::Operation;
use crate::value_objects::TransformId;

/// A grouped batch of operations applied atomically and recorded together
/// in the transform log under one id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    pub id: TransformId,
    pub operations: Vec<Operation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Value>,
}

impl Transform {
    pub fn new(operations: Vec<Operation>) -> Self {
        Self {
            id: TransformId::new(),
            operations,
            options: None,
        }
    }

    pub fn with_options(mut self, options: Value) -> Self {
        self.options = Some(options);
        self
    }

    pub fn is_batch(&self) -> bool {
        self.operations.len() > 1
    }
}
