//! Frame sources.

mod sequence;
mod webcam;

pub use sequence::FrameSequence;
pub use webcam::{ParamPreference, Webcam, WebcamOptions};

use crate::{error::FrameReadFailure, image::Frame, timer::Timer};

/// Something that produces [`Frame`]s on demand.
pub trait FrameSource {
    /// Returns the next frame, blocking until one is available.
    ///
    /// An error ends the stream: callers are expected to shut down instead of retrying.
    fn read(&mut self) -> Result<Frame, FrameReadFailure>;

    /// Profiling timers of the source, reported along with the display loop's own.
    fn timers(&self) -> Vec<&Timer> {
        Vec::new()
    }
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn read(&mut self) -> Result<Frame, FrameReadFailure> {
        (**self).read()
    }

    fn timers(&self) -> Vec<&Timer> {
        (**self).timers()
    }
}
