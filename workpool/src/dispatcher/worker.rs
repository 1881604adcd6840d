// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use async_channel::{Receiver, Sender};
use log::debug;

use crate::dispatcher::in_flight::InFlight;
use crate::job::{Job, WorkFn};
use crate::sink::ErrorSink;

/// The dispatcher's side of a worker.
pub(crate) struct WorkerHandle<C> {
    index: usize,
    job_tx: Sender<Job<C>>,
    ready_rx: Receiver<()>,
}

/// Executes the jobs handed to it, one at a time.
pub(crate) struct Worker<C> {
    index: usize,
    job_rx: Receiver<Job<C>>,
    ready_tx: Sender<()>,
    work_fn: WorkFn<C>,
    sink: Arc<dyn ErrorSink>,
    in_flight: Arc<InFlight>,
}

pub(crate) fn worker_pair<C: Send + 'static>(
    index: usize,
    work_fn: WorkFn<C>,
    sink: Arc<dyn ErrorSink>,
    in_flight: Arc<InFlight>,
) -> (WorkerHandle<C>, Worker<C>) {
    // A single slot: the dispatch loop only sends after the worker announced it is ready.
    let (job_tx, job_rx) = async_channel::bounded(1);
    let (ready_tx, ready_rx) = async_channel::bounded(1);
    (
        WorkerHandle {
            index,
            job_tx,
            ready_rx,
        },
        Worker {
            index,
            job_rx,
            ready_tx,
            work_fn,
            sink,
            in_flight,
        },
    )
}

impl<C> WorkerHandle<C> {
    pub(crate) fn index(&self) -> usize {
        self.index
    }

    /// Blocks until the worker is idle, then hands the job over.
    /// Gives the job back if the worker is gone.
    pub(crate) fn assign(&self, job: Job<C>) -> Result<(), Job<C>> {
        if self.ready_rx.recv_blocking().is_err() {
            return Err(job);
        }
        self.job_tx.send_blocking(job).map_err(|e| e.into_inner())
    }
}

impl<C> Worker<C> {
    pub(crate) fn run(self) {
        debug!("Worker {} started", self.index);
        loop {
            if self.ready_tx.send_blocking(()).is_err() {
                break;
            }
            match self.job_rx.recv_blocking() {
                Ok(job) => self.execute(job),
                Err(_) => break,
            }
        }
        debug!("Worker {} stopped", self.index);
    }

    fn execute(&self, job: Job<C>) {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| (self.work_fn)(job)));
        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(err)) => self
                .sink
                .report(format_args!("worker {}: job failed: {:#}", self.index, err)),
            Err(payload) => self.sink.report(format_args!(
                "worker {}: job panicked: {}",
                self.index,
                panic_message(payload.as_ref())
            )),
        }
        self.in_flight.complete();
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "unknown panic payload"
    }
}
