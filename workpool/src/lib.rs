// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>
//! # workpool
//!
//! Two small concurrency building blocks:
//!
//! - [`Dispatcher`]: a fixed set of worker threads fed from one bounded job queue.
//!   Jobs are handed to the workers in strict round-robin order.
//! - [`Batch`]: a thread-safe accumulator that collects single records into
//!   groups of a fixed size and hands every full group to a callback.
//!   [`BatchSource`] and [`BatchDestination`] describe what usually feeds a
//!   batch and what its groups end up in.
//!
//! A [`MutexFunction`] is a dispatcher with exactly one worker. It runs its work
//! function asynchronously, but never concurrently with itself.
//!
//!```text
//!   producer ──enqueue──► [ bounded queue ] ──dispatch loop──► worker 0
//!                                                 │  (cursor) ─► worker 1
//!                                                 └──────────► worker N-1
//!
//!   producer ──push──► [ buffer (C) ] ──full──► push handler (outside the lock)
//!             flush ─────────────────────────► flush handler
//!```

pub mod batch;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod job;
pub mod mutex_function;
pub mod sink;

pub use batch::{
    Batch, BatchDestination, BatchHandler, BatchInfo, BatchSource, BatchSourceFactory,
    BytesSource, DEFAULT_BATCH_SIZE,
};
pub use config::{BatchConfig, DispatcherConfig};
pub use dispatcher::Dispatcher;
pub use error::{BatchError, DispatcherError};
pub use job::{Job, WorkFn};
pub use mutex_function::MutexFunction;
pub use sink::{ErrorSink, LogSink, NoopSink};
