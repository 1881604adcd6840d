// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

use serde::{Deserialize, Serialize};

use crate::batch::DEFAULT_BATCH_SIZE;

/// Construction parameters of a [`crate::Dispatcher`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct DispatcherConfig {
    /// Number of jobs that may wait for a worker.
    pub queue_capacity: usize,
    /// Number of worker threads. Fixed for the lifetime of the dispatcher.
    pub worker_count: usize,
    /// Prefix of the thread names, e.g. `workpool-worker-3`.
    pub thread_name: String,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 100,
            worker_count: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
            thread_name: "workpool".to_string(),
        }
    }
}

impl DispatcherConfig {
    pub fn new(queue_capacity: usize, worker_count: usize) -> Self {
        Self {
            queue_capacity,
            worker_count,
            ..Default::default()
        }
    }

    pub fn with_thread_name(mut self, thread_name: impl Into<String>) -> Self {
        self.thread_name = thread_name.into();
        self
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}

/// Construction parameters of a [`crate::Batch`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Number of records per delivered group. 0 falls back to [`DEFAULT_BATCH_SIZE`].
    pub size: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            size: DEFAULT_BATCH_SIZE,
        }
    }
}

impl BatchConfig {
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}
