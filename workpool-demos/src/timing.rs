// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

use std::time::{Duration, Instant};

use log::info;

/// Measures named phases of a run.
#[derive(Debug)]
pub struct Stopwatch {
    label: String,
    started: Instant,
    last_lap: Instant,
    laps: Vec<(String, Duration)>,
}

impl Stopwatch {
    pub fn start(label: impl Into<String>) -> Self {
        let now = Instant::now();
        Self {
            label: label.into(),
            started: now,
            last_lap: now,
            laps: Vec::new(),
        }
    }

    /// Record the time since the previous lap (or the start) under `name`.
    pub fn lap(&mut self, name: impl Into<String>) -> Duration {
        let now = Instant::now();
        let duration = now.duration_since(self.last_lap);
        self.last_lap = now;
        self.laps.push((name.into(), duration));
        duration
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn laps(&self) -> &[(String, Duration)] {
        &self.laps
    }

    pub fn report(&self) {
        for (name, duration) in &self.laps {
            info!("{}: {} took {:?}", self.label, name, duration);
        }
        info!("{}: total {:?}", self.label, self.elapsed());
    }
}
