//! [`RenderSink`] implementations.

use std::time::Duration;

use anyhow::anyhow;
use minifb::{Key, KeyRepeat, Window, WindowOptions};

use crate::{dashboard::RenderSink, image::Frame, telemetry::Telemetry};

/// Displays the dashboard in a desktop window.
///
/// The window is opened with the size of the first frame shown. Pressing `Q` or `Escape`, or
/// closing the window, requests a quit.
pub struct WindowSink {
    title: String,
    window: Option<Window>,
    quit: bool,
}

impl WindowSink {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            window: None,
            quit: false,
        }
    }

    fn window_for(&mut self, frame: &Frame) -> anyhow::Result<&mut Window> {
        if self.window.is_none() {
            let mut window = Window::new(
                &self.title,
                frame.width() as usize,
                frame.height() as usize,
                WindowOptions {
                    resize: true,
                    ..WindowOptions::default()
                },
            )
            .map_err(|e| anyhow!("failed to create window: {e}"))?;
            window.limit_update_rate(Some(Duration::from_micros(16600)));
            self.window = Some(window);
        }
        self.window
            .as_mut()
            .ok_or_else(|| anyhow!("window was not created"))
    }

    fn poll_keys(&mut self) {
        if let Some(window) = &self.window {
            let quit_key = window
                .get_keys_pressed(KeyRepeat::No)
                .into_iter()
                .any(|key| matches!(key, Key::Q | Key::Escape));
            if quit_key || !window.is_open() {
                self.quit = true;
            }
        }
    }
}

impl RenderSink for WindowSink {
    fn show(&mut self, frame: &Frame, _finger_count: u32) -> anyhow::Result<()> {
        let buffer = frame.to_0rgb();
        let (width, height) = (frame.width() as usize, frame.height() as usize);
        self.window_for(frame)?
            .update_with_buffer(&buffer, width, height)
            .map_err(|e| anyhow!("failed to update window: {e}"))?;
        self.poll_keys();
        Ok(())
    }

    fn idle(&mut self) -> anyhow::Result<()> {
        if let Some(window) = &mut self.window {
            window.update();
        }
        self.poll_keys();
        Ok(())
    }

    fn quit_requested(&mut self) -> bool {
        self.quit
    }
}

/// Logs finger counts instead of displaying anything.
///
/// Never requests a quit; the pipeline runs until the frame source ends.
pub struct HeadlessSink {
    telemetry: Telemetry,
    last_count: Option<u32>,
    frames: u64,
}

impl HeadlessSink {
    pub fn new(telemetry: Telemetry) -> Self {
        Self {
            telemetry,
            last_count: None,
            frames: 0,
        }
    }

    /// Number of dashboard frames received.
    pub fn frames(&self) -> u64 {
        self.frames
    }
}

impl RenderSink for HeadlessSink {
    fn show(&mut self, _frame: &Frame, finger_count: u32) -> anyhow::Result<()> {
        self.frames += 1;
        if self.last_count != Some(finger_count) {
            self.telemetry
                .info(format_args!("Fingers: {finger_count}"));
            self.last_count = Some(finger_count);
        }
        Ok(())
    }

    fn quit_requested(&mut self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn headless_sink_counts_frames() {
        let mut sink = HeadlessSink::new(Telemetry::capture());
        let frame = Frame::new(4, 4);
        sink.show(&frame, 1).unwrap();
        sink.show(&frame, 1).unwrap();
        sink.idle().unwrap();
        sink.show(&frame, 3).unwrap();
        assert_eq!(sink.frames(), 3);
        assert_eq!(sink.last_count, Some(3));
        assert!(!sink.quit_requested());
    }

    #[test]
    fn window_sink_starts_without_window() {
        let mut sink = WindowSink::new("test");
        sink.idle().unwrap();
        assert!(!sink.quit_requested());
    }
}
