// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

use std::fmt;

/// Receives the failures of work functions.
///
/// The sink is called synchronously on the worker thread that ran the job.
pub trait ErrorSink: Send + Sync + 'static {
    fn report(&self, message: fmt::Arguments<'_>);
}

/// Silently ignores every failure.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl ErrorSink for NoopSink {
    fn report(&self, _message: fmt::Arguments<'_>) {}
}

/// Forwards failures to `log::error!`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl ErrorSink for LogSink {
    fn report(&self, message: fmt::Arguments<'_>) {
        log::error!("{}", message);
    }
}

impl<F> ErrorSink for F
where
    F: Fn(fmt::Arguments<'_>) + Send + Sync + 'static,
{
    fn report(&self, message: fmt::Arguments<'_>) {
        self(message)
    }
}
