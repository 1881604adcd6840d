// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

//! Helpers shared by the integration tests.

use std::fmt;
use std::sync::{Arc, Mutex, Once};

use workpool::BatchHandler;

static INIT_LOG: Once = Once::new();

/// Route `log` output of the crate under test to the test harness.
pub fn init_log() {
    INIT_LOG.call_once(|| {
        let _ = env_logger::Builder::from_env(
            env_logger::Env::default().default_filter_or("debug"),
        )
        .is_test(true)
        .try_init();
    });
}

/// Keeps every group handed to a batch handler.
#[derive(Debug)]
pub struct GroupRecorder<T> {
    groups: Arc<Mutex<Vec<Vec<T>>>>,
}

impl<T> Clone for GroupRecorder<T> {
    fn clone(&self) -> Self {
        Self {
            groups: self.groups.clone(),
        }
    }
}

impl<T: Clone + Send + 'static> GroupRecorder<T> {
    pub fn new() -> Self {
        Self {
            groups: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn handler(&self) -> BatchHandler<T> {
        let groups = self.groups.clone();
        Arc::new(move |group: Vec<T>| {
            groups.lock().unwrap().push(group);
            Ok(())
        })
    }

    pub fn groups(&self) -> Vec<Vec<T>> {
        self.groups.lock().unwrap().clone()
    }

    pub fn records(&self) -> Vec<T> {
        self.groups().into_iter().flatten().collect()
    }
}

impl<T: Clone + Send + 'static> Default for GroupRecorder<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Error sink that keeps every reported message.
#[derive(Debug, Clone, Default)]
pub struct CollectingSink {
    messages: Arc<Mutex<Vec<String>>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }
}

impl workpool::ErrorSink for CollectingSink {
    fn report(&self, message: fmt::Arguments<'_>) {
        self.messages.lock().unwrap().push(message.to_string());
    }
}
