//! Logging setup and the per-stage telemetry handle.
//!
//! The logger backend is installed once by the binary via [`init_logger`]. Pipeline stages never
//! pick a log target or level on their own: they are handed a [`Telemetry`] value when they are
//! constructed and log through it.

use std::fmt;

use log::{Level, LevelFilter};

use crate::timer::{FpsCounter, Timer};

/// Initializes logging to *stderr*.
///
/// This crate logs at *debug* level unless overridden via `RUST_LOG`. If a global logger is
/// already registered, this does nothing.
pub fn init_logger() {
    env_logger::Builder::new()
        .filter(Some(env!("CARGO_CRATE_NAME")), LevelFilter::Debug)
        .parse_default_env()
        .try_init()
        .ok();
}

/// Logging handle of a single pipeline stage.
///
/// Cloning is cheap. All messages logged through a handle use its target, so the output of the
/// capture and detection stages can be told apart (and filtered) independently.
#[derive(Debug, Clone)]
pub struct Telemetry {
    target: &'static str,
    max_level: LevelFilter,
}

impl Telemetry {
    /// Target used by the capture and display stage.
    pub const CAPTURE: &'static str = "handtrace::capture";
    /// Target used by the detection worker.
    pub const DETECT: &'static str = "handtrace::detect";

    pub fn new(target: &'static str) -> Self {
        Self {
            target,
            max_level: LevelFilter::Trace,
        }
    }

    /// Handle for the capture and display stage.
    pub fn capture() -> Self {
        Self::new(Self::CAPTURE)
    }

    /// Handle for the detection worker.
    pub fn detect() -> Self {
        Self::new(Self::DETECT)
    }

    /// Drops every message less severe than `level`, in addition to the global filter.
    pub fn with_max_level(self, level: LevelFilter) -> Self {
        Self {
            max_level: level,
            ..self
        }
    }

    #[inline]
    pub fn target(&self) -> &'static str {
        self.target
    }

    pub fn log(&self, level: Level, args: fmt::Arguments<'_>) {
        if level <= self.max_level {
            log::log!(target: self.target, level, "{}", args);
        }
    }

    pub fn error(&self, args: fmt::Arguments<'_>) {
        self.log(Level::Error, args);
    }

    pub fn warn(&self, args: fmt::Arguments<'_>) {
        self.log(Level::Warn, args);
    }

    pub fn info(&self, args: fmt::Arguments<'_>) {
        self.log(Level::Info, args);
    }

    pub fn debug(&self, args: fmt::Arguments<'_>) {
        self.log(Level::Debug, args);
    }

    pub fn trace(&self, args: fmt::Arguments<'_>) {
        self.log(Level::Trace, args);
    }

    /// Creates a [`Timer`] for profiling an operation of this stage.
    pub fn timer(&self, name: &'static str) -> Timer {
        Timer::new(name)
    }

    /// Creates an [`FpsCounter`] logging through this handle's target.
    pub fn fps_counter(&self, name: impl Into<String>) -> FpsCounter {
        FpsCounter::new(name.into(), self.target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_targets() {
        assert_eq!(Telemetry::capture().target(), "handtrace::capture");
        assert_eq!(Telemetry::detect().target(), "handtrace::detect");
        let quiet = Telemetry::detect().with_max_level(LevelFilter::Off);
        assert_eq!(quiet.target(), Telemetry::DETECT);
        // logging through a muted handle is a no-op
        quiet.error(format_args!("not shown"));
    }
}
