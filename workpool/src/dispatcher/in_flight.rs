// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

use std::sync::{Condvar, Mutex, PoisonError};

/// Number of jobs that were accepted but have not completed yet.
#[derive(Debug, Default)]
pub(crate) struct InFlight {
    count: Mutex<usize>,
    idle: Condvar,
}

impl InFlight {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn begin(&self) {
        let mut count = self.count.lock().unwrap_or_else(PoisonError::into_inner);
        *count += 1;
    }

    /// Counts the job only if `insert` succeeds. `insert` runs under the
    /// counter lock and must not block.
    pub(crate) fn begin_if<T, E>(&self, insert: impl FnOnce() -> Result<T, E>) -> Result<T, E> {
        let mut count = self.count.lock().unwrap_or_else(PoisonError::into_inner);
        let inserted = insert();
        if inserted.is_ok() {
            *count += 1;
        }
        inserted
    }

    /// Marks one job as done. Also used to roll back a `begin()` for a job
    /// that never made it into the queue.
    pub(crate) fn complete(&self) {
        let mut count = self.count.lock().unwrap_or_else(PoisonError::into_inner);
        *count = count.saturating_sub(1);
        if *count == 0 {
            self.idle.notify_all();
        }
    }

    pub(crate) fn get(&self) -> usize {
        *self.count.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn wait_until_zero(&self) {
        // pattern is described on https://doc.rust-lang.org/stable/std/sync/struct.Condvar.html
        let mut count = self.count.lock().unwrap_or_else(PoisonError::into_inner);
        while *count > 0 {
            count = self
                .idle
                .wait(count)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }
}
