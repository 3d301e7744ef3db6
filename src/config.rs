//! Command line configuration of the `handtrace` binary.
//!
//! [`Args`] is only the parsing layer. It converts into the plain config structs used by the
//! library ([`PipelineConfig`], [`WebcamOptions`], [`DashboardConfig`], [`ModelOptions`]), which
//! don't depend on `clap`.

use std::{path::PathBuf, time::Duration};

use clap::{Parser, ValueEnum};

use crate::{
    bridge::Overflow,
    dashboard::DashboardConfig,
    image::Resolution,
    model::ModelOptions,
    pipeline::PipelineConfig,
    video::{ParamPreference, WebcamOptions},
};

/// Real-time hand tracking dashboard: counts extended fingers in a webcam stream.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Name of the webcam to open (defaults to the first supported one)
    #[arg(long, env = "HANDTRACE_WEBCAM_NAME")]
    pub camera: Option<String>,

    /// Desired capture width (requires --height)
    #[arg(long, requires = "height")]
    pub width: Option<u32>,

    /// Desired capture height (requires --width)
    #[arg(long, requires = "width")]
    pub height: Option<u32>,

    /// Desired capture frame rate
    #[arg(long)]
    pub fps: Option<u32>,

    /// Which camera parameter to keep when both can't be satisfied
    #[arg(long, value_enum, default_value_t = Prefer::Resolution)]
    pub prefer: Prefer,

    /// Palm detection network in ONNX format
    #[arg(
        long,
        env = "HANDTRACE_PALM_MODEL",
        default_value = "models/palm_detection_full.onnx"
    )]
    pub palm_model: PathBuf,

    /// Hand landmark network in ONNX format
    #[arg(long, env = "HANDTRACE_MODEL", default_value = "models/hand_landmark_full.onnx")]
    pub model: PathBuf,

    /// Minimum palm detection score
    #[arg(long, default_value_t = 0.7)]
    pub min_confidence: f32,

    /// Maximum number of hands reported per frame
    #[arg(long, default_value_t = 2)]
    pub max_hands: usize,

    /// Play back the JPEG/PNG images in this directory instead of opening a camera
    #[arg(long)]
    pub images: Option<PathBuf>,

    /// Delay between played back images, in milliseconds
    #[arg(long, default_value_t = 33)]
    pub frame_interval_ms: u64,

    /// What to do when a frame arrives while the worker is still busy
    #[arg(long, value_enum, default_value_t = OverflowArg::EvictOldest)]
    pub input_overflow: OverflowArg,

    /// What to do when a result arrives before the previous one was displayed
    #[arg(long, value_enum, default_value_t = OverflowArg::EvictOldest)]
    pub output_overflow: OverflowArg,

    /// How long the worker waits for a frame before polling again, in milliseconds
    #[arg(long, default_value_t = 50)]
    pub poll_ms: u64,

    /// How long to wait for the worker on shutdown, in milliseconds
    #[arg(long, default_value_t = 2000)]
    pub join_timeout_ms: u64,

    /// Height of each dashboard panel, in pixels
    #[arg(long, default_value_t = 480)]
    pub display_height: u32,

    /// Don't draw the frame rate onto the dashboard
    #[arg(long, default_value_t = false)]
    pub hide_fps: bool,

    /// Log finger counts instead of opening a window
    #[arg(long, default_value_t = false)]
    pub headless: bool,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Prefer {
    Resolution,
    Framerate,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverflowArg {
    EvictOldest,
    DropNewest,
}

impl From<OverflowArg> for Overflow {
    fn from(arg: OverflowArg) -> Self {
        match arg {
            OverflowArg::EvictOldest => Overflow::EvictOldest,
            OverflowArg::DropNewest => Overflow::DropNewest,
        }
    }
}

impl Args {
    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig::default()
            .input_overflow(self.input_overflow.into())
            .output_overflow(self.output_overflow.into())
            .poll_interval(Duration::from_millis(self.poll_ms.max(1)))
            .join_timeout(Duration::from_millis(self.join_timeout_ms))
    }

    pub fn webcam_options(&self) -> WebcamOptions {
        let mut options = WebcamOptions::default().prefer(match self.prefer {
            Prefer::Resolution => ParamPreference::Resolution,
            Prefer::Framerate => ParamPreference::Framerate,
        });
        if let Some(name) = &self.camera {
            options = options.name(name);
        }
        if let (Some(width), Some(height)) = (self.width, self.height) {
            options = options.resolution(Resolution::new(width, height));
        }
        if let Some(fps) = self.fps {
            options = options.fps(fps);
        }
        options
    }

    pub fn model_options(&self) -> ModelOptions {
        ModelOptions::default()
            .min_confidence(self.min_confidence)
            .max_hands(self.max_hands)
    }

    pub fn dashboard_config(&self) -> DashboardConfig {
        DashboardConfig::default()
            .display_height(self.display_height)
            .show_fps(!self.hide_fps)
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_interval_ms)
    }
}
