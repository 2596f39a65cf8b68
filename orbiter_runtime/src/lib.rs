// /////////////////////////////////////////////////////////////////////////////
// Orbiter
// Copyright (c) 2025 A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Orbiter Runtime
//!
//! The application/infrastructure layer: everything `orbiter-model`'s pure
//! domain types need to become a running data-orchestration process.
//!
//! ## Layout
//!
//! - [`cache`] — the normalized Record Cache, its query engine, and live
//!   query subscriptions.
//! - [`source`] — the Source kernel: event pipeline, task queues, builders,
//!   and the in-memory backend.
//! - [`queue`] — the persistent task queue every source's request/sync
//!   pipeline is built on.
//! - [`log`] — the append-only transform log a source consults to decide
//!   whether a transform has already been applied.
//! - [`infrastructure`] — the `Bucket` persistence ports (`MemoryBucket`,
//!   `FileBucket`) and logging setup.
//!
//! Async throughout (`tokio`); the domain crate underneath stays synchronous
//! and I/O-free.

pub mod cache;
pub mod infrastructure;
pub mod log;
pub mod queue;
pub mod source;

pub use cache::{LiveQuery, RecordCache};
pub use log::TransformLog;
pub use queue::{Performer, Task, TaskQueue, TaskQueueSettings};
pub use source::{Source, SourceOptions};
