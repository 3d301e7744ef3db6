//! Error types shared by the pipeline stages.
//!
//! Only the fatal kinds in here ever leave the stage that produced them. Per-frame detection
//! failures are absorbed by the detection worker and never show up as an error value outside of
//! it; a full channel is not an error at all (see [`crate::bridge::Sent`]).

use std::{fmt, io};

use thiserror::Error;

/// The landmark model could not be initialized.
///
/// This is fatal: the detection worker exits before it starts consuming frames.
#[derive(Debug, Clone, Error)]
#[error("failed to initialize landmark model: {message}")]
pub struct ModelInitError {
    message: String,
}

impl ModelInitError {
    pub fn new(message: impl fmt::Display) -> Self {
        Self {
            message: message.to_string(),
        }
    }

    /// Creates a [`ModelInitError`] from an [`anyhow::Error`], keeping its whole cause chain.
    pub fn from_anyhow(error: &anyhow::Error) -> Self {
        Self::new(format_args!("{error:#}"))
    }

    #[inline]
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// No camera matching the configured options could be opened.
#[derive(Debug, Error)]
#[error("camera unavailable: {reason}")]
pub struct CameraUnavailable {
    reason: String,
}

impl CameraUnavailable {
    pub fn new(reason: impl fmt::Display) -> Self {
        Self {
            reason: reason.to_string(),
        }
    }

    pub fn from_anyhow(error: &anyhow::Error) -> Self {
        Self::new(format_args!("{error:#}"))
    }
}

/// A [`FrameSource`](crate::video::FrameSource) stopped producing frames.
///
/// Both variants end the stream. Neither is a crash: the dashboard shuts the pipeline down in an
/// orderly fashion when it sees one.
#[derive(Debug, Error)]
pub enum FrameReadFailure {
    #[error("end of stream")]
    EndOfStream,
    #[error("failed to read frame: {0}")]
    Device(String),
}

impl FrameReadFailure {
    pub fn device(error: impl fmt::Display) -> Self {
        Self::Device(error.to_string())
    }
}

/// A fatal error that terminates the whole pipeline.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    ModelInit(#[from] ModelInitError),
    #[error(transparent)]
    CameraUnavailable(#[from] CameraUnavailable),
    #[error("detection worker is no longer running")]
    WorkerUnresponsive,
    #[error("detection worker did not stop within {timeout_ms}ms")]
    ShutdownTimeout { timeout_ms: u128 },
    #[error("failed to spawn detection worker: {0}")]
    Spawn(#[source] io::Error),
    #[error("display failure: {0:#}")]
    Display(anyhow::Error),
}

impl PipelineError {
    /// The process exit code this error maps to.
    pub fn exit_code(&self) -> u8 {
        match self {
            PipelineError::ModelInit(_) => 2,
            PipelineError::CameraUnavailable(_) => 3,
            PipelineError::WorkerUnresponsive | PipelineError::ShutdownTimeout { .. } => 4,
            PipelineError::Spawn(_) | PipelineError::Display(_) => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_init_error_keeps_cause_chain() {
        let error = anyhow::anyhow!("file not found").context("loading 'hand.onnx'");
        let error = ModelInitError::from_anyhow(&error);
        assert_eq!(
            error.to_string(),
            "failed to initialize landmark model: loading 'hand.onnx': file not found"
        );
    }

    #[test]
    fn fatal_errors_exit_non_zero() {
        let errors = [
            PipelineError::ModelInit(ModelInitError::new("bad graph")),
            PipelineError::CameraUnavailable(CameraUnavailable::new("no device")),
            PipelineError::WorkerUnresponsive,
            PipelineError::ShutdownTimeout { timeout_ms: 10 },
            PipelineError::Display(anyhow::anyhow!("no display")),
        ];
        for error in errors {
            assert_ne!(error.exit_code(), 0, "{error}");
        }
    }
}
