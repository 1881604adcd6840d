// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

use std::io;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};

use async_channel::{Receiver, Sender, TrySendError};
use log::{debug, info, warn};

use crate::config::DispatcherConfig;
use crate::dispatcher::in_flight::InFlight;
use crate::dispatcher::worker::{worker_pair, Worker, WorkerHandle};
use crate::error::DispatcherError;
use crate::job::{Job, WorkFn};
use crate::sink::ErrorSink;

/// Everything that only exists between `new()` and `run()`.
struct Stopped<C> {
    queue_rx: Receiver<Job<C>>,
    handles: Vec<WorkerHandle<C>>,
    workers: Vec<Worker<C>>,
}

/// Fixed-size worker pool with a bounded job queue and round-robin assignment.
///
/// The dispatcher is `Sync`; share it with `Arc` to enqueue from several threads.
pub struct Dispatcher<C> {
    thread_name: String,
    worker_count: usize,
    queue_tx: Sender<Job<C>>,
    in_flight: Arc<InFlight>,
    sink: Arc<dyn ErrorSink>,
    stopped: Mutex<Option<Stopped<C>>>,
    thread_handles: Mutex<Vec<JoinHandle<()>>>,
}

impl<C> std::fmt::Debug for Dispatcher<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("thread_name", &self.thread_name)
            .field("worker_count", &self.worker_count)
            .field("queue_capacity", &self.queue_capacity())
            .field("queued_jobs", &self.queued_jobs())
            .field("in_flight", &self.in_flight())
            .finish()
    }
}

impl<C: Send + 'static> Dispatcher<C> {
    /// Create a dispatcher whose workers are not started yet.
    pub fn new<F, S>(
        queue_capacity: usize,
        worker_count: usize,
        work_fn: F,
        error_sink: S,
    ) -> Result<Self, DispatcherError>
    where
        F: Fn(Job<C>) -> anyhow::Result<()> + Send + Sync + 'static,
        S: ErrorSink,
    {
        Self::from_config(
            &DispatcherConfig::new(queue_capacity, worker_count),
            work_fn,
            error_sink,
        )
    }

    pub fn from_config<F, S>(
        config: &DispatcherConfig,
        work_fn: F,
        error_sink: S,
    ) -> Result<Self, DispatcherError>
    where
        F: Fn(Job<C>) -> anyhow::Result<()> + Send + Sync + 'static,
        S: ErrorSink,
    {
        if config.worker_count == 0 {
            return Err(DispatcherError::InvalidWorkerCount);
        }
        if config.queue_capacity == 0 {
            return Err(DispatcherError::InvalidQueueCapacity);
        }

        let (queue_tx, queue_rx) = async_channel::bounded(config.queue_capacity);
        let work_fn: WorkFn<C> = Arc::new(work_fn);
        let sink: Arc<dyn ErrorSink> = Arc::new(error_sink);
        let in_flight = Arc::new(InFlight::new());

        let (handles, workers): (Vec<_>, Vec<_>) = (0..config.worker_count)
            .map(|index| worker_pair(index, work_fn.clone(), sink.clone(), in_flight.clone()))
            .unzip();

        Ok(Self {
            thread_name: config.thread_name.clone(),
            worker_count: config.worker_count,
            queue_tx,
            in_flight,
            sink,
            stopped: Mutex::new(Some(Stopped {
                queue_rx,
                handles,
                workers,
            })),
            thread_handles: Mutex::new(Vec::new()),
        })
    }

    /// Start the workers and the dispatch loop.
    pub fn run(&self) -> Result<(), DispatcherError> {
        self.run_with(|name, f| thread::Builder::new().name(name).spawn(f))
    }

    /// `run()` with a custom thread spawner. If a thread cannot be spawned the
    /// job queue is closed, so producers get `Closed` instead of blocking on a
    /// dispatcher that will never drain.
    pub(crate) fn run_with<S>(&self, mut spawn: S) -> Result<(), DispatcherError>
    where
        S: FnMut(String, Box<dyn FnOnce() + Send + 'static>) -> io::Result<JoinHandle<()>>,
    {
        let stopped = self
            .stopped
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or(DispatcherError::AlreadyRunning)?;

        let mut thread_handles = self
            .thread_handles
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        if let Err(e) = self.spawn_threads(stopped, &mut thread_handles, &mut spawn) {
            // Dropping the unused worker handles lets the started workers exit.
            self.queue_tx.close();
            warn!("Dispatcher {} failed to start: {}", self.thread_name, e);
            return Err(e);
        }

        info!(
            "Started dispatcher {} with {} workers",
            self.thread_name, self.worker_count
        );
        Ok(())
    }

    fn spawn_threads<S>(
        &self,
        stopped: Stopped<C>,
        thread_handles: &mut Vec<JoinHandle<()>>,
        spawn: &mut S,
    ) -> Result<(), DispatcherError>
    where
        S: FnMut(String, Box<dyn FnOnce() + Send + 'static>) -> io::Result<JoinHandle<()>>,
    {
        for (index, worker) in stopped.workers.into_iter().enumerate() {
            let name = format!("{}-worker-{}", self.thread_name, index);
            let handle = spawn(name.clone(), Box::new(move || worker.run()))
                .map_err(|source| DispatcherError::Spawn { name, source })?;
            thread_handles.push(handle);
        }

        let name = format!("{}-dispatch", self.thread_name);
        let queue_rx = stopped.queue_rx;
        let handles = stopped.handles;
        let in_flight = self.in_flight.clone();
        let sink = self.sink.clone();
        let handle = spawn(
            name.clone(),
            Box::new(move || dispatch_loop(queue_rx, handles, in_flight, sink)),
        )
        .map_err(|source| DispatcherError::Spawn { name, source })?;
        thread_handles.push(handle);
        Ok(())
    }

    /// Insert the job, waiting for room in the queue if necessary. Never drops the job.
    pub fn enqueue_job_allow_wait(&self, job: Job<C>) -> Result<(), DispatcherError> {
        // Counted before the insertion so a fast worker cannot complete it first.
        self.in_flight.begin();
        match self.queue_tx.send_blocking(job) {
            Ok(()) => Ok(()),
            Err(_) => {
                self.in_flight.complete();
                warn!("Dispatcher {} is closed, job rejected", self.thread_name);
                Err(DispatcherError::Closed)
            }
        }
    }

    /// Insert the job if the queue has room. Otherwise the job is dropped
    /// silently and `false` is returned.
    pub fn enqueue_job_allow_drop(&self, job: Job<C>) -> bool {
        // The counter lock is held across the insertion, so a worker cannot
        // complete the job before it was counted and a dropped job is never counted.
        match self.in_flight.begin_if(|| self.queue_tx.try_send(job)) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => false,
            Err(TrySendError::Closed(_)) => {
                warn!("Dispatcher {} is closed, job rejected", self.thread_name);
                false
            }
        }
    }

    pub fn is_job_queue_full(&self) -> bool {
        self.queue_tx.is_full()
    }

    /// Blocks until the queue is empty and no worker executes a job.
    ///
    /// This is not a shutdown. Jobs may be enqueued again after it returns.
    pub fn wait_until_idle(&self) {
        self.in_flight.wait_until_zero();
    }

    /// Stop accepting jobs. Jobs that are already queued still run.
    pub fn close(&self) {
        if self.queue_tx.close() {
            debug!("Dispatcher {} closed", self.thread_name);
        }
    }

    /// Close the dispatcher and join the dispatch and worker threads.
    pub fn wait_until_finished(&self) {
        self.close();
        // A dispatcher that never ran still owns its workers; drop them here.
        drop(
            self.stopped
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take(),
        );
        let handles: Vec<JoinHandle<()>> = self
            .thread_handles
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();
        for handle in handles {
            if handle.join().is_err() {
                warn!("A thread of dispatcher {} panicked", self.thread_name);
            }
        }
        info!("Dispatcher {} finished", self.thread_name);
    }
}

impl<C> Dispatcher<C> {
    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    pub fn queue_capacity(&self) -> usize {
        self.queue_tx.capacity().unwrap_or(0)
    }

    /// Jobs waiting in the queue, not counting jobs already handed to a worker.
    pub fn queued_jobs(&self) -> usize {
        self.queue_tx.len()
    }

    /// Jobs accepted but not completed yet.
    pub fn in_flight(&self) -> usize {
        self.in_flight.get()
    }

    pub fn is_closed(&self) -> bool {
        self.queue_tx.is_closed()
    }
}

impl<C> Drop for Dispatcher<C> {
    fn drop(&mut self) {
        // The threads drain the queue and exit on their own.
        self.queue_tx.close();
    }
}

fn dispatch_loop<C>(
    queue_rx: Receiver<Job<C>>,
    workers: Vec<WorkerHandle<C>>,
    in_flight: Arc<InFlight>,
    sink: Arc<dyn ErrorSink>,
) {
    debug!("Dispatch loop started");
    let mut cursor = 0;
    while let Ok(job) = queue_rx.recv_blocking() {
        let worker = &workers[cursor];
        if worker.assign(job).is_err() {
            sink.report(format_args!(
                "worker {} is gone, job discarded",
                worker.index()
            ));
            in_flight.complete();
        }
        cursor = (cursor + 1) % workers.len();
    }
    debug!("Dispatch loop ended, job queue closed");
}
