// /////////////////////////////////////////////////////////////////////////////
// Orbiter
// Copyright (c) 2025 A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Logging
//!
//! Installs a `tracing-subscriber` `fmt` layer reading its filter from
//! `RUST_LOG` (falling back to `info`). The kernel emits spans/events at
//! each pipeline phase (`beforeX`, `_X`, `X`/`XFail`, `transform`, `patch`)
//! through the `tracing` macros directly — this module only wires up where
//! those events go, it does not itself track throughput or alert.

use tracing_subscriber::EnvFilter;

/// Installs the global subscriber. Safe to call more than once — later
/// calls are no-ops if a subscriber is already set.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
