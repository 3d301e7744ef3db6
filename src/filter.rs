//! Smoothing of noisy per-frame measurements, such as the dashboard frame rate.

mod ema;

pub use ema::Ema;

/// Turns a stream of `V` samples into a smoothed stream.
pub trait Filter<V> {
    /// Feeds one sample and returns the smoothed value.
    fn push(&mut self, value: V) -> V;

    /// Forgets every sample pushed so far.
    fn reset(&mut self);
}
