use std::{
    collections::VecDeque,
    fs,
    path::{Path, PathBuf},
    thread,
    time::{Duration, Instant},
};

use anyhow::{bail, Context};

use crate::{
    error::FrameReadFailure,
    image::{self, Frame},
    timer::Timer,
};

use super::FrameSource;

enum Entry {
    Frame(Frame),
    File(PathBuf),
}

/// A finite [`FrameSource`] playing back prerecorded frames.
///
/// Frames come either from memory or from image files in a directory, which are decoded lazily.
/// After the last frame, [`FrameReadFailure::EndOfStream`] is returned.
pub struct FrameSequence {
    entries: VecDeque<Entry>,
    interval: Option<Duration>,
    last_read: Option<Instant>,
    t_load: Timer,
}

impl FrameSequence {
    /// Creates a sequence playing back `frames` in order.
    pub fn new(frames: impl IntoIterator<Item = Frame>) -> Self {
        Self {
            entries: frames.into_iter().map(Entry::Frame).collect(),
            interval: None,
            last_read: None,
            t_load: Timer::new("load"),
        }
    }

    /// Creates a sequence from every JPEG and PNG file in `dir`, ordered by file name.
    pub fn from_dir(dir: impl AsRef<Path>) -> anyhow::Result<Self> {
        let dir = dir.as_ref();
        let mut paths = Vec::new();
        let entries =
            fs::read_dir(dir).with_context(|| format!("failed to read '{}'", dir.display()))?;
        for entry in entries {
            let path = entry?.path();
            if path.is_file() && image::is_supported_path(&path) {
                paths.push(path);
            }
        }
        if paths.is_empty() {
            bail!("no JPEG or PNG images found in '{}'", dir.display());
        }
        paths.sort();

        Ok(Self {
            entries: paths.into_iter().map(Entry::File).collect(),
            interval: None,
            last_read: None,
            t_load: Timer::new("load"),
        })
    }

    /// Paces playback so that consecutive [`FrameSource::read`] calls return at most once per
    /// `interval`.
    pub fn with_interval(self, interval: Duration) -> Self {
        Self {
            interval: Some(interval),
            ..self
        }
    }

    /// Number of frames left.
    pub fn remaining(&self) -> usize {
        self.entries.len()
    }

    fn pace(&mut self) {
        if let (Some(interval), Some(last)) = (self.interval, self.last_read) {
            let elapsed = last.elapsed();
            if elapsed < interval {
                thread::sleep(interval - elapsed);
            }
        }
        self.last_read = Some(Instant::now());
    }
}

impl FrameSource for FrameSequence {
    fn read(&mut self) -> Result<Frame, FrameReadFailure> {
        let entry = self.entries.pop_front().ok_or(FrameReadFailure::EndOfStream)?;
        self.pace();
        self.t_load.time(|| match entry {
            Entry::Frame(frame) => Ok(frame),
            Entry::File(path) => Frame::load(&path)
                .map_err(|e| FrameReadFailure::device(format_args!("{}: {e:#}", path.display()))),
        })
    }

    fn timers(&self) -> Vec<&Timer> {
        vec![&self.t_load]
    }
}

#[cfg(test)]
mod tests {
    use crate::image::Color;

    use super::*;

    #[test]
    fn plays_back_in_order_then_ends() {
        let frames = [Color::RED, Color::GREEN].map(|color| {
            let mut frame = Frame::new(2, 2);
            frame.clear(color);
            frame
        });
        let mut seq = FrameSequence::new(frames);
        assert_eq!(seq.remaining(), 2);

        assert_eq!(seq.read().unwrap().get(0, 0), Color::RED);
        assert_eq!(seq.read().unwrap().get(0, 0), Color::GREEN);
        assert!(matches!(seq.read(), Err(FrameReadFailure::EndOfStream)));
        assert!(matches!(seq.read(), Err(FrameReadFailure::EndOfStream)));
    }

    #[test]
    fn boxed_source_reports_load_timer() {
        let mut source: Box<dyn FrameSource> =
            Box::new(FrameSequence::new((0..2).map(|_| Frame::new(1, 1))));
        source.read().unwrap();
        source.read().unwrap();

        let timers = source.timers();
        assert_eq!(timers.len(), 1);
        assert_eq!(timers[0].count(), 2);
        assert!(timers[0].to_string().starts_with("load: 2x"));
    }

    #[test]
    fn interval_paces_reads() {
        let mut seq = FrameSequence::new((0..3).map(|_| Frame::new(1, 1)))
            .with_interval(Duration::from_millis(20));
        let start = Instant::now();
        while seq.read().is_ok() {}
        // the first frame is returned immediately
        assert!(start.elapsed() >= Duration::from_millis(40));
    }

    #[test]
    fn from_dir_requires_images() {
        let dir = std::env::temp_dir().join(format!("handtrace-empty-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("notes.txt"), "not an image").unwrap();
        assert!(FrameSequence::from_dir(&dir).is_err());
        fs::remove_dir_all(&dir).unwrap();

        assert!(FrameSequence::from_dir("/does/not/exist").is_err());
    }
}
