// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

use crate::config::DispatcherConfig;
use crate::dispatcher::Dispatcher;
use crate::error::DispatcherError;
use crate::job::Job;
use crate::sink::ErrorSink;

/// Runs a function asynchronously, but never concurrently with itself.
///
/// This is a [`Dispatcher`] with exactly one worker, e.g. for serialized writes
/// into a single file from several producers.
#[derive(Debug)]
pub struct MutexFunction<C> {
    dispatcher: Dispatcher<C>,
}

impl<C: Send + 'static> MutexFunction<C> {
    /// Create and start the single worker.
    pub fn new<F, S>(queue_capacity: usize, f: F, error_sink: S) -> Result<Self, DispatcherError>
    where
        F: Fn(Job<C>) -> anyhow::Result<()> + Send + Sync + 'static,
        S: ErrorSink,
    {
        let config =
            DispatcherConfig::new(queue_capacity, 1).with_thread_name("workpool-mutex-fn");
        let dispatcher = Dispatcher::from_config(&config, f, error_sink)?;
        dispatcher.run()?;
        Ok(Self { dispatcher })
    }

    /// Queue a call, waiting for room if the queue is full.
    pub fn call(&self, context: C) -> Result<(), DispatcherError> {
        self.dispatcher.enqueue_job_allow_wait(Job::new(context))
    }

    /// Queue a call unless the queue is full. Returns whether it was queued.
    pub fn try_call(&self, context: C) -> bool {
        self.dispatcher.enqueue_job_allow_drop(Job::new(context))
    }

    pub fn wait_until_idle(&self) {
        self.dispatcher.wait_until_idle()
    }

    pub fn wait_until_finished(&self) {
        self.dispatcher.wait_until_finished()
    }

    pub fn dispatcher(&self) -> &Dispatcher<C> {
        &self.dispatcher
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::NoopSink;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    #[test]
    fn test_calls_never_overlap() {
        let running = Arc::new(AtomicUsize::new(0));
        let max_running = Arc::new(AtomicUsize::new(0));
        let lines = Arc::new(Mutex::new(Vec::new()));

        let (r, m, l) = (running.clone(), max_running.clone(), lines.clone());
        let write = MutexFunction::new(
            4,
            move |job: Job<usize>| {
                let now = r.fetch_add(1, Ordering::SeqCst) + 1;
                m.fetch_max(now, Ordering::SeqCst);
                std::thread::sleep(Duration::from_millis(1));
                l.lock().unwrap().push(*job.context());
                r.fetch_sub(1, Ordering::SeqCst);
                Ok(())
            },
            NoopSink,
        )
        .unwrap();

        let write = Arc::new(write);
        let producers: Vec<_> = (0..4)
            .map(|p| {
                let write = write.clone();
                std::thread::spawn(move || {
                    for i in 0..10 {
                        write.call(p * 10 + i).unwrap();
                    }
                })
            })
            .collect();
        for producer in producers {
            producer.join().unwrap();
        }
        write.wait_until_idle();

        assert_eq!(max_running.load(Ordering::SeqCst), 1);
        let mut lines = lines.lock().unwrap().clone();
        lines.sort();
        assert_eq!(lines, (0..40).collect::<Vec<_>>());
        write.wait_until_finished();
    }

    #[test]
    fn test_single_worker_keeps_submission_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = seen.clone();
        let write = MutexFunction::new(
            2,
            move |job: Job<&'static str>| {
                s.lock().unwrap().push(job.into_context());
                Ok(())
            },
            NoopSink,
        )
        .unwrap();

        for word in ["a", "b", "c", "d", "e"] {
            write.call(word).unwrap();
        }
        write.wait_until_idle();

        assert_eq!(*seen.lock().unwrap(), vec!["a", "b", "c", "d", "e"]);
        assert_eq!(write.dispatcher().worker_count(), 1);
    }
}
