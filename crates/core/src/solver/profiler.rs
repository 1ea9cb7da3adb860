/// Timing helpers for the per-tick pipeline.
///
/// Stage scopes report through `tracing` at trace level; the tick timer keeps the
/// last and smoothed tick durations for periodic debug logging.
use std::time::Instant;
use tracing::trace;

/// A profiling scope that measures one stage using RAII.
///
/// Elapsed time is logged when dropped. GPU stages only measure submission, not
/// device execution.
pub struct StageTimer {
    start: Instant,
    name: &'static str,
}

impl StageTimer {
    /// Starts timing a stage.
    #[must_use]
    pub fn new(name: &'static str) -> Self {
        Self {
            start: Instant::now(),
            name,
        }
    }

    /// Gets elapsed time in milliseconds.
    #[must_use]
    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }
}

impl Drop for StageTimer {
    fn drop(&mut self) {
        trace!(stage = self.name, elapsed_ms = self.elapsed_ms(), "stage done");
    }
}

/// Tick duration tracker.
#[derive(Debug, Clone)]
pub struct TickTimer {
    last_tick_ms: f64,
    average_tick_ms: f64,
    ticks: u64,
}

impl TickTimer {
    /// Smoothing factor of the running average
    const SMOOTHING: f64 = 0.1;

    /// Creates a new tick timer.
    #[must_use]
    pub fn new() -> Self {
        Self {
            last_tick_ms: 0.0,
            average_tick_ms: 0.0,
            ticks: 0,
        }
    }

    /// Records a tick duration in milliseconds.
    pub fn record(&mut self, time_ms: f64) {
        self.last_tick_ms = time_ms;
        self.average_tick_ms = if self.ticks == 0 {
            time_ms
        } else {
            self.average_tick_ms + (time_ms - self.average_tick_ms) * Self::SMOOTHING
        };
        self.ticks += 1;
    }

    #[must_use]
    pub fn last_tick_ms(&self) -> f64 {
        self.last_tick_ms
    }

    /// Exponentially smoothed tick duration.
    #[must_use]
    pub fn average_tick_ms(&self) -> f64 {
        self.average_tick_ms
    }

    /// Number of recorded ticks.
    #[must_use]
    pub fn ticks(&self) -> u64 {
        self.ticks
    }
}

impl Default for TickTimer {
    fn default() -> Self {
        Self::new()
    }
}
