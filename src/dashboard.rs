//! The display loop.
//!
//! Each tick, [`DisplayLoop`] reads a frame, mirrors it, hands it to the [`Pipeline`], and renders
//! the newest [`DetectionResult`] if one arrived. It never waits for the detection worker.
//!
//! The mirroring is not cosmetic: the thumb test in [`crate::hand::fingers`] assumes a mirrored
//! frame, so the two must only ever change together.

use std::time::Instant;

use crate::{
    detection::DetectionResult,
    error::{FrameReadFailure, PipelineError},
    filter::{Ema, Filter},
    image::{draw, Color, Frame},
    pipeline::Pipeline,
    telemetry::Telemetry,
    timer::{FpsCounter, Timer},
    video::FrameSource,
};

/// Title of the dashboard window.
pub const WINDOW_TITLE: &str = "Hand Detection Dashboard";

/// Where composed dashboard frames go.
pub trait RenderSink {
    /// Displays a composed dashboard frame.
    fn show(&mut self, frame: &Frame, finger_count: u32) -> anyhow::Result<()>;

    /// Called on ticks without a new result, so the sink can keep processing events.
    fn idle(&mut self) -> anyhow::Result<()> {
        Ok(())
    }

    /// Non-blocking check whether the user asked to quit.
    fn quit_requested(&mut self) -> bool;
}

impl<R: RenderSink + ?Sized> RenderSink for Box<R> {
    fn show(&mut self, frame: &Frame, finger_count: u32) -> anyhow::Result<()> {
        (**self).show(frame, finger_count)
    }

    fn idle(&mut self) -> anyhow::Result<()> {
        (**self).idle()
    }

    fn quit_requested(&mut self) -> bool {
        (**self).quit_requested()
    }
}

/// Why the display loop stopped without an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    /// The render sink reported a quit request.
    UserQuit,
    /// The frame source ran out of frames or failed.
    EndOfStream,
}

/// Dashboard settings.
#[derive(Debug, Clone, Copy)]
pub struct DashboardConfig {
    display_height: u32,
    show_fps: bool,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            display_height: 480,
            show_fps: true,
        }
    }
}

impl DashboardConfig {
    /// Sets the height every panel is scaled to. Defaults to 480.
    pub fn display_height(self, display_height: u32) -> Self {
        Self {
            display_height: display_height.max(1),
            ..self
        }
    }

    /// Sets whether a smoothed frame rate is drawn below the finger count.
    pub fn show_fps(self, show_fps: bool) -> Self {
        Self { show_fps, ..self }
    }
}

/// Composes the dashboard: annotated frame, mask and contour side by side, all scaled to
/// `display_height`.
///
/// `Fingers: N` is drawn onto the annotated panel, followed by the frame rate if given.
pub fn compose(result: &DetectionResult, display_height: u32, fps: Option<f32>) -> Frame {
    let mut annotated = result.frame.resize_to_height(display_height);
    draw::text(
        &mut annotated,
        50,
        50,
        &format!("Fingers: {}", result.finger_count),
    )
    .color(Color::BLUE)
    .large()
    .align_left();
    if let Some(fps) = fps {
        draw::text(&mut annotated, 50, 80, &format!("FPS: {fps:.1}"))
            .color(Color::BLUE)
            .large()
            .align_left();
    }

    let mask = result.mask.to_frame().resize_to_height(display_height);
    let contour = result.contour.resize_to_height(display_height);
    Frame::hconcat(&[&annotated, &mask, &contour])
}

/// Drives a [`FrameSource`], a [`Pipeline`] and a [`RenderSink`].
pub struct DisplayLoop<S, R> {
    source: S,
    sink: R,
    config: DashboardConfig,
    telemetry: Telemetry,
    fps: Ema,
    last_render: Option<Instant>,
    fps_counter: FpsCounter,
    t_read: Timer,
    t_compose: Timer,
}

impl<S: FrameSource, R: RenderSink> DisplayLoop<S, R> {
    pub fn new(source: S, sink: R, config: DashboardConfig, telemetry: Telemetry) -> Self {
        Self {
            source,
            sink,
            config,
            fps: Ema::new(0.3),
            last_render: None,
            fps_counter: telemetry.fps_counter("display"),
            t_read: telemetry.timer("read"),
            t_compose: telemetry.timer("compose"),
            telemetry,
        }
    }

    /// Runs until the user quits, the source ends, or the worker dies.
    ///
    /// A dead worker is an error ([`PipelineError::WorkerUnresponsive`]), never a clean exit.
    pub fn run(&mut self, pipeline: &mut Pipeline) -> Result<ShutdownReason, PipelineError> {
        loop {
            if self.sink.quit_requested() {
                self.telemetry.info(format_args!("quit requested"));
                return Ok(ShutdownReason::UserQuit);
            }
            if !pipeline.is_worker_alive() {
                self.telemetry
                    .error(format_args!("detection worker died unexpectedly"));
                return Err(PipelineError::WorkerUnresponsive);
            }

            let frame = match self.t_read.time(|| self.source.read()) {
                Ok(frame) => frame,
                Err(FrameReadFailure::EndOfStream) => {
                    self.telemetry.info(format_args!("end of stream"));
                    return Ok(ShutdownReason::EndOfStream);
                }
                Err(e) => {
                    self.telemetry.warn(format_args!("{e}, stopping"));
                    return Ok(ShutdownReason::EndOfStream);
                }
            };
            pipeline.submit(frame.flip_horizontal())?;

            match pipeline.try_result()? {
                Some(result) => self.render(&result)?,
                None => self.sink.idle().map_err(PipelineError::Display)?,
            }

            let own = [&self.t_read, &self.t_compose];
            self.fps_counter
                .tick_with(self.source.timers().into_iter().chain(own));
        }
    }

    fn render(&mut self, result: &DetectionResult) -> Result<(), PipelineError> {
        let now = Instant::now();
        if let Some(last) = self.last_render.replace(now) {
            let dt = now.duration_since(last).as_secs_f32();
            if dt > 0.0 {
                self.fps.push(1.0 / dt);
            }
        }
        let fps = if self.config.show_fps {
            self.fps.value()
        } else {
            None
        };

        let display_height = self.config.display_height;
        let composite = self
            .t_compose
            .time(|| compose(result, display_height, fps));
        self.sink
            .show(&composite, result.finger_count)
            .map_err(PipelineError::Display)
    }

    /// Returns the frame source and render sink.
    pub fn into_parts(self) -> (S, R) {
        (self.source, self.sink)
    }
}
