// /////////////////////////////////////////////////////////////////////////////
// Orbiter
// Copyright (c) 2025 A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

use super::generic_id::{GenericId, IdCategory};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct QueryMarker;

impl IdCategory for QueryMarker {
    fn category_name() -> &'static str {
        "query"
    }
}

/// Identifies one (possibly multi-expression) query request.
pub type QueryId = GenericId<QueryMarker>;
