// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>
//! Thread-safe accumulator that turns single records into fixed-size groups.
//!
//! Records are appended to a preallocated buffer under a lock. When the buffer
//! reaches its capacity it is swapped for a fresh one and the full buffer is
//! handed to the push handler *after* the lock has been released, so slow
//! handlers (I/O) do not stop other threads from filling the next buffer.
//!
//! Consequences:
//! - only the `push()` that completed the group sees the handler's error,
//!   every other `push()` that just appended returns `Ok(())`;
//! - handlers may run concurrently when several threads complete groups;
//! - groups keep insertion order internally, but two groups delivered by
//!   different threads may arrive out of order.
//!
//! A batch is never closed. Call [`Batch::flush`] to deliver the last partial group.

use std::fmt;
use std::mem;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::config::BatchConfig;
use crate::error::BatchError;

mod contracts;

pub use contracts::{
    destination_handler, BatchDestination, BatchInfo, BatchSource, BatchSourceFactory,
    BytesSource, ChunkedBytes, VecSource,
};

/// Group size used when a batch is configured with a capacity of 0.
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// Receives a group of records, in insertion order.
pub type BatchHandler<T> = Arc<dyn Fn(Vec<T>) -> anyhow::Result<()> + Send + Sync + 'static>;

pub struct Batch<T> {
    capacity: usize,
    push_handler: Option<BatchHandler<T>>,
    flush_handler: Option<BatchHandler<T>>,
    buffer: Mutex<Option<Vec<T>>>,
}

impl<T> Default for Batch<T> {
    /// An uninitialized batch. `push()` and `flush()` fail until `init()` was called.
    fn default() -> Self {
        Self {
            capacity: 0,
            push_handler: None,
            flush_handler: None,
            buffer: Mutex::new(None),
        }
    }
}

impl<T> fmt::Debug for Batch<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Batch")
            .field("capacity", &self.capacity)
            .field("position", &self.position())
            .field("initialized", &self.push_handler.is_some())
            .finish()
    }
}

impl<T> Batch<T> {
    /// A batch that hands full and flushed groups to the same handler.
    pub fn new<F>(capacity: usize, push_handler: F) -> Self
    where
        F: Fn(Vec<T>) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let mut batch = Self::default();
        batch.init(capacity, Arc::new(push_handler), None);
        batch
    }

    pub fn with_flush_handler<P, F>(capacity: usize, push_handler: P, flush_handler: F) -> Self
    where
        P: Fn(Vec<T>) -> anyhow::Result<()> + Send + Sync + 'static,
        F: Fn(Vec<T>) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let mut batch = Self::default();
        batch.init(
            capacity,
            Arc::new(push_handler),
            Some(Arc::new(flush_handler)),
        );
        batch
    }

    pub fn from_config<F>(config: &BatchConfig, push_handler: F) -> Self
    where
        F: Fn(Vec<T>) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Self::new(config.size, push_handler)
    }

    /// (Re)configure the batch. Records that are still buffered are discarded.
    pub fn init(
        &mut self,
        capacity: usize,
        push_handler: BatchHandler<T>,
        flush_handler: Option<BatchHandler<T>>,
    ) {
        self.capacity = if capacity == 0 {
            DEFAULT_BATCH_SIZE
        } else {
            capacity
        };
        self.flush_handler = Some(flush_handler.unwrap_or_else(|| push_handler.clone()));
        self.push_handler = Some(push_handler);
        *self.buffer.get_mut().unwrap_or_else(PoisonError::into_inner) = None;
    }

    pub fn push(&self, record: T) -> Result<(), BatchError> {
        let Some(push_handler) = &self.push_handler else {
            return Err(BatchError::Uninitialized);
        };

        // no need to buffer anything
        if self.capacity == 1 {
            push_handler(vec![record])?;
            return Ok(());
        }

        let full = {
            let mut buffer = self.lock_buffer();
            let items = buffer.get_or_insert_with(|| Vec::with_capacity(self.capacity));
            items.push(record);
            if items.len() < self.capacity {
                return Ok(());
            }
            mem::replace(items, Vec::with_capacity(self.capacity))
        };

        push_handler(full)?;
        Ok(())
    }

    /// Hand the buffered records, if any, to the flush handler.
    pub fn flush(&self) -> Result<(), BatchError> {
        let Some(flush_handler) = &self.flush_handler else {
            return Err(BatchError::Uninitialized);
        };

        let partial = {
            let mut buffer = self.lock_buffer();
            match buffer.as_mut() {
                Some(items) if !items.is_empty() => {
                    mem::replace(items, Vec::with_capacity(self.capacity))
                }
                _ => return Ok(()),
            }
        };

        flush_handler(partial)?;
        Ok(())
    }

    /// Number of records currently buffered.
    pub fn position(&self) -> usize {
        self.lock_buffer().as_ref().map_or(0, Vec::len)
    }

    /// Group size, 0 for an uninitialized batch.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_initialized(&self) -> bool {
        self.push_handler.is_some()
    }

    fn lock_buffer(&self) -> MutexGuard<'_, Option<Vec<T>>> {
        self.buffer.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
