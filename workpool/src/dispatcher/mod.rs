// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>
//! # Design: Fixed-size Round-Robin Worker Pool
//!
//! ## Overview
//! - One bounded job queue per dispatcher (backpressure at `queue_capacity`).
//! - N worker threads, created in a stopped state and started by `run()`.
//! - One dispatch thread takes jobs from the queue in FIFO order and hands each
//!   job to the worker at the cursor, then moves the cursor to the next worker.
//! - Every worker has a private one-job slot and announces when it is ready.
//!   The dispatch loop waits for that announcement, so a worker never holds
//!   more than one job.
//! - An in-flight counter (accepted minus completed) backs `wait_until_idle()`.
//!
//! ## Round-robin and slow jobs
//! The assignment order is fixed. If the worker at the cursor is still busy,
//! the dispatch loop waits for it even when other workers are idle. A single
//! slow job therefore stalls the queue until its worker comes around again.
//! There is no work stealing; the observable assignment order stays
//! `0, 1, .., N-1, 0, 1, ..`.
//!
//! ```text
//! +--------------------------------------+
//! |   enqueue_job_allow_wait / _drop     |
//! +------------------+-------------------+
//!                    |
//!                    v
//! +------------------+-------------------+
//! |        bounded job queue (M)         |
//! +------------------+-------------------+
//!                    |  dispatch loop, cursor = (cursor + 1) mod N
//!      +-------------+-------------+
//!      |             |             |
//! +----v----+   +----v----+   +----v----+
//! | worker 0|   | worker 1|   |worker N-1|
//! +---------+   +---------+   +---------+
//! ```

mod in_flight;
mod pool;
mod worker;

pub use pool::Dispatcher;
