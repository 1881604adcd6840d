// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

use std::sync::Arc;

/// One unit of work handed to the work function of a [`crate::Dispatcher`].
///
/// The dispatcher never looks into `context` and attaches no behavior to
/// `is_end_of_stream`; any termination protocol belongs to the producer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job<C> {
    context: C,
    is_end_of_stream: bool,
}

impl<C> Job<C> {
    pub fn new(context: C) -> Self {
        Self {
            context,
            is_end_of_stream: false,
        }
    }

    /// A job that carries the producer's end-of-stream marker.
    pub fn end_of_stream(context: C) -> Self {
        Self {
            context,
            is_end_of_stream: true,
        }
    }

    pub fn context(&self) -> &C {
        &self.context
    }

    pub fn is_end_of_stream(&self) -> bool {
        self.is_end_of_stream
    }

    pub fn into_context(self) -> C {
        self.context
    }
}

impl<C> From<C> for Job<C> {
    fn from(context: C) -> Self {
        Job::new(context)
    }
}

/// The user supplied work function. It is called from up to N worker threads at once.
pub type WorkFn<C> = Arc<dyn Fn(Job<C>) -> anyhow::Result<()> + Send + Sync + 'static>;
