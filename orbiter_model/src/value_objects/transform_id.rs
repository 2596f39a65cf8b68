// /////////////////////////////////////////////////////////////////////////////
// Orbiter
// Copyright (c) 2025 A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

use super::generic_id::{GenericId, IdCategory};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TransformMarker;

impl IdCategory for TransformMarker {
    fn category_name() -> &'static str {
        "transform"
    }
}

/// Identifies one grouped batch of operations in the transform log.
///
/// ULID ordering gives transform ids a natural time-ordering that the
/// transform log's total order falls out of directly.
pub type TransformId = GenericId<TransformMarker>;
