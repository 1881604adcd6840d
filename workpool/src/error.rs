// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DispatcherError {
    #[error("a dispatcher needs at least one worker")]
    InvalidWorkerCount,

    #[error("the job queue needs a capacity of at least one")]
    InvalidQueueCapacity,

    #[error("dispatcher is already running")]
    AlreadyRunning,

    /// The dispatcher has been closed and does not accept jobs anymore.
    #[error("dispatcher has been closed")]
    Closed,

    #[error("failed to spawn thread {name}")]
    Spawn {
        name: String,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Error)]
pub enum BatchError {
    #[error("batch not initialized")]
    Uninitialized,

    /// Error returned by the push or flush handler.
    #[error(transparent)]
    Handler(#[from] anyhow::Error),
}

impl BatchError {
    pub fn is_uninitialized(&self) -> bool {
        matches!(self, BatchError::Uninitialized)
    }
}
