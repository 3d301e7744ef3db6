//! Real-time hand tracking: counts extended fingers in a live camera stream.
//!
//! Frames are captured on the main thread and handed to a single detection worker through a
//! latest-wins [`bridge`]. The worker runs the hand tracking networks, counts fingers, and sends a
//! [`detection::DetectionResult`] back, which the [`dashboard`] renders next to a hull mask and a
//! contour view.
//!
//! # Environment variables
//!
//! - `HANDTRACE_WEBCAM_NAME`: name of the webcam to open.
//! - `HANDTRACE_PALM_MODEL`: path to the palm detection ONNX network.
//! - `HANDTRACE_MODEL`: path to the hand landmark ONNX network.
//! - `RUST_LOG`: log filter, in the usual `env_logger` syntax.

pub mod bridge;
pub mod config;
pub mod dashboard;
pub mod detection;
pub mod drop;
pub mod error;
pub mod filter;
pub mod gui;
pub mod hand;
pub mod image;
pub mod model;
pub mod pipeline;
pub mod telemetry;
pub mod timer;
pub mod video;
pub mod worker;
