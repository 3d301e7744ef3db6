//! Per-stage profiling: operation timers and frame rate logging.

use std::{
    cell::Cell,
    fmt,
    time::{Duration, Instant},
};

use itertools::Itertools;

/// Accumulates how long a recurring operation takes.
///
/// Formatting the timer with `{}` prints the average since the last time it was formatted, and
/// starts a new averaging window.
pub struct Timer {
    name: &'static str,
    total: Cell<Duration>,
    count: Cell<u32>,
}

impl Timer {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            total: Cell::new(Duration::ZERO),
            count: Cell::new(0),
        }
    }

    /// Runs `op` and records its duration.
    pub fn time<T>(&mut self, op: impl FnOnce() -> T) -> T {
        let _guard = self.start();
        op()
    }

    /// Records the time until the returned guard is dropped.
    pub fn start(&mut self) -> TimerGuard<'_> {
        TimerGuard {
            start: Instant::now(),
            timer: self,
        }
    }

    /// Number of measurements recorded since the timer was last displayed.
    pub fn count(&self) -> u32 {
        self.count.get()
    }

    fn stop(&mut self, start: Instant) {
        let total = self.total.get_mut();
        *total = total.saturating_add(start.elapsed());
        *self.count.get_mut() += 1;
    }
}

/// Displays the average recorded time and resets it.
impl fmt::Display for Timer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let total = self.total.replace(Duration::ZERO);
        let count = self.count.replace(0);
        let avg_ms = if count == 0 {
            0.0
        } else {
            total.as_secs_f32() * 1000.0 / count as f32
        };

        write!(f, "{}: {count}x{avg_ms:.01}ms", self.name)
    }
}

/// Guard returned by [`Timer::start`]. Stops timing the operation when dropped.
pub struct TimerGuard<'a> {
    start: Instant,
    timer: &'a mut Timer,
}

impl Drop for TimerGuard<'_> {
    fn drop(&mut self) {
        self.timer.stop(self.start);
    }
}

/// Counts ticks and logs the rate once per second.
///
/// Created by [`Telemetry::fps_counter`](crate::telemetry::Telemetry::fps_counter), which
/// determines the log target.
pub struct FpsCounter {
    name: String,
    target: &'static str,
    frames: u32,
    window_start: Instant,
}

impl FpsCounter {
    const WINDOW: Duration = Duration::from_secs(1);

    pub(crate) fn new(name: String, target: &'static str) -> Self {
        Self {
            name,
            target,
            frames: 0,
            window_start: Instant::now(),
        }
    }

    /// Counts one frame.
    pub fn tick(&mut self) {
        self.tick_with(std::iter::empty::<&Timer>());
    }

    /// Counts one frame, appending `extra` to the log line when one is due.
    ///
    /// Passing [`Timer`]s as `extra` logs their averages and resets them. Nothing is formatted
    /// (and no timer reset) between log lines.
    pub fn tick_with<D: fmt::Display, I: IntoIterator<Item = D>>(&mut self, extra: I) {
        self.frames += 1;
        if self.window_start.elapsed() <= Self::WINDOW {
            return;
        }

        let extra = extra.into_iter().join(", ");
        if extra.is_empty() {
            log::debug!(target: self.target, "{}: {} FPS", self.name, self.frames);
        } else {
            log::debug!(target: self.target, "{}: {} FPS ({extra})", self.name, self.frames);
        }
        self.frames = 0;
        self.window_start = Instant::now();
    }
}
