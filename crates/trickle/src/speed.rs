//! # Throughput Estimation
//!
//! Sliding-window download speed measurement used to size the stash buffer.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::time::Instant;

const WINDOW: Duration = Duration::from_millis(1000);
const MIN_EXTRAPOLATION: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy)]
struct SpeedSample {
    at: Instant,
    bytes: u64,
}

/// Bytes-per-second over the trailing second.
#[derive(Debug, Clone)]
pub struct ThroughputEstimator {
    samples: VecDeque<SpeedSample>,
    started: Option<Instant>,
    total_bytes: u64,
}

impl Default for ThroughputEstimator {
    fn default() -> Self {
        Self::new()
    }
}

impl ThroughputEstimator {
    pub fn new() -> Self {
        Self {
            samples: VecDeque::new(),
            started: None,
            total_bytes: 0,
        }
    }

    /// Drop every sample. Post-reset measurements start a fresh window.
    pub fn reset(&mut self) {
        self.samples.clear();
        self.started = None;
        self.total_bytes = 0;
    }

    pub fn add_bytes(&mut self, bytes: u64) {
        self.add_bytes_at(bytes, Instant::now());
    }

    pub fn add_bytes_at(&mut self, bytes: u64, now: Instant) {
        self.started.get_or_insert(now);
        self.total_bytes = self.total_bytes.saturating_add(bytes);
        self.samples.push_back(SpeedSample { at: now, bytes });
        self.evict(now);
    }

    /// Total bytes recorded since the last reset.
    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    pub fn last_second_throughput(&mut self) -> u64 {
        self.last_second_throughput_at(Instant::now())
    }

    /// Bytes per second at `now`.
    ///
    /// Returns 0 when no sample falls inside the window. While the estimator
    /// is younger than one second the rate is extrapolated from elapsed time,
    /// but only once half a second has passed.
    pub fn last_second_throughput_at(&mut self, now: Instant) -> u64 {
        self.evict(now);
        let Some(started) = self.started else {
            return 0;
        };
        let in_window: u64 = self.samples.iter().map(|s| s.bytes).sum();
        if in_window == 0 {
            return 0;
        }

        let age = now.saturating_duration_since(started);
        if age >= WINDOW {
            in_window
        } else if age >= MIN_EXTRAPOLATION {
            (in_window as f64 / age.as_secs_f64()) as u64
        } else {
            0
        }
    }

    pub fn last_second_kbps(&mut self) -> u64 {
        self.last_second_throughput() / 1024
    }

    pub fn last_second_kbps_at(&mut self, now: Instant) -> u64 {
        self.last_second_throughput_at(now) / 1024
    }

    fn evict(&mut self, now: Instant) {
        while let Some(front) = self.samples.front() {
            if now.saturating_duration_since(front.at) > WINDOW {
                self.samples.pop_front();
            } else {
                break;
            }
        }
    }
}
