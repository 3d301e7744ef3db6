//! Hand landmark estimation.
//!
//! [`LandmarkModel`] is the interface the detection worker drives. [`OnnxHandModel`] implements it
//! with the two MediaPipe hand networks executed by `tract`: a palm detector locates up to
//! [`ModelOptions::max_hands`] hands in the whole frame, then the landmark network runs once on a
//! square region around each of them.

mod landmark;
mod network;
mod palm;

use std::path::Path;

use anyhow::Context;

use crate::{error::ModelInitError, hand::Hand, image::Frame, telemetry::Telemetry};

use self::{
    landmark::Landmarker,
    network::{Network, Region},
    palm::PalmDetector,
};

/// An estimator that finds hands and their landmarks in a frame.
///
/// Initialization happens when the model is constructed. [`LandmarkModel::detect`] is then invoked
/// once per frame, for as long as the pipeline runs.
pub trait LandmarkModel: Send {
    /// Returns every hand found in `frame`, in no particular order.
    ///
    /// Landmarks are normalized to `[0, 1]` relative to `frame`'s dimensions. An error only affects
    /// the current frame.
    fn detect(&mut self, frame: &Frame) -> anyhow::Result<Vec<Hand>>;
}

impl<M: LandmarkModel + ?Sized> LandmarkModel for Box<M> {
    fn detect(&mut self, frame: &Frame) -> anyhow::Result<Vec<Hand>> {
        (**self).detect(frame)
    }
}

/// Detection thresholds applied to the network output.
#[derive(Debug, Clone, Copy)]
pub struct ModelOptions {
    min_confidence: f32,
    max_hands: usize,
}

impl Default for ModelOptions {
    fn default() -> Self {
        Self {
            min_confidence: 0.7,
            max_hands: 2,
        }
    }
}

impl ModelOptions {
    /// Sets the minimum palm detection score a hand needs to be reported. Defaults to 0.7.
    pub fn min_confidence(self, min_confidence: f32) -> Self {
        Self {
            min_confidence,
            ..self
        }
    }

    /// Sets the maximum number of hands reported per frame. Defaults to 2.
    pub fn max_hands(self, max_hands: usize) -> Self {
        Self { max_hands, ..self }
    }

    #[inline]
    pub fn get_min_confidence(&self) -> f32 {
        self.min_confidence
    }

    #[inline]
    pub fn get_max_hands(&self) -> usize {
        self.max_hands
    }
}

/// MediaPipe hand tracking networks loaded from ONNX files.
///
/// Every frame is letterboxed into the palm detector's square input. Each of the detected palms
/// is grown into a square region around the whole hand, and the landmark network runs on that
/// region. A hand is reported when its palm scores at least [`ModelOptions::min_confidence`] and
/// the landmark network's presence score is at least [`OnnxHandModel::MIN_PRESENCE`].
pub struct OnnxHandModel {
    palm: PalmDetector,
    landmarker: Landmarker,
    options: ModelOptions,
    telemetry: Telemetry,
}

impl OnnxHandModel {
    /// Presence score below which the landmark network's output is discarded.
    pub const MIN_PRESENCE: f32 = 0.5;

    /// Loads both networks from ONNX file paths.
    ///
    /// The paths must have an `.onnx` extension.
    pub fn load(
        palm_path: impl AsRef<Path>,
        landmark_path: impl AsRef<Path>,
        options: ModelOptions,
        telemetry: Telemetry,
    ) -> Result<Self, ModelInitError> {
        let (palm_path, landmark_path) = (palm_path.as_ref(), landmark_path.as_ref());
        let load = |path: &Path, outputs| {
            Network::load(path, outputs)
                .with_context(|| format!("failed to load '{}'", path.display()))
                .map_err(|e| ModelInitError::from_anyhow(&e))
        };
        let palm = load(palm_path, 2)?;
        let landmarks = load(landmark_path, 3)?;
        Ok(Self::new(palm, landmarks, options, telemetry))
    }

    /// Loads both networks from in-memory ONNX files.
    pub fn from_onnx(
        palm: &[u8],
        landmarks: &[u8],
        options: ModelOptions,
        telemetry: Telemetry,
    ) -> anyhow::Result<Self> {
        let palm = Network::from_onnx(palm, 2).context("failed to load palm detector")?;
        let landmarks =
            Network::from_onnx(landmarks, 3).context("failed to load landmark network")?;
        Ok(Self::new(palm, landmarks, options, telemetry))
    }

    fn new(
        palm: Network,
        landmarks: Network,
        options: ModelOptions,
        telemetry: Telemetry,
    ) -> Self {
        telemetry.debug(format_args!(
            "loaded hand networks: palm input {}, landmark input {}",
            palm.input_resolution(),
            landmarks.input_resolution(),
        ));
        let palm = PalmDetector::new(palm);
        telemetry.trace(format_args!("{} palm anchors", palm.num_anchors()));

        Self {
            palm,
            landmarker: Landmarker::new(landmarks),
            options,
            telemetry,
        }
    }
}

impl LandmarkModel for OnnxHandModel {
    fn detect(&mut self, frame: &Frame) -> anyhow::Result<Vec<Hand>> {
        if self.options.max_hands == 0 {
            return Ok(Vec::new());
        }

        let regions: Vec<Region> = self.palm.detect(
            frame,
            self.options.max_hands,
            self.options.min_confidence,
        )?;
        let mut hands = Vec::with_capacity(regions.len());
        for region in regions {
            let estimate = self.landmarker.estimate(frame, region)?;
            self.telemetry.trace(format_args!(
                "hand in {region:?}: presence={:.2} handedness={}",
                estimate.presence,
                estimate.hand.handedness(),
            ));
            if estimate.presence >= Self::MIN_PRESENCE {
                hands.push(estimate.hand);
            }
        }
        Ok(hands)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_rejects_bad_paths() {
        let load = |palm: &str, landmarks: &str| {
            OnnxHandModel::load(palm, landmarks, ModelOptions::default(), Telemetry::detect())
                .err()
                .unwrap()
        };

        let error = load("palm_detection.tflite", "hand_landmark.onnx");
        assert!(error.message().contains("`.onnx` extension"), "{error}");
        assert!(error.message().contains("palm_detection.tflite"), "{error}");

        let error = load("does/not/exist.onnx", "hand_landmark.onnx");
        assert!(error.message().contains("does/not/exist.onnx"), "{error}");
    }

    #[test]
    fn load_rejects_garbage() {
        let result = OnnxHandModel::from_onnx(
            b"not a network",
            b"not a network either",
            ModelOptions::default(),
            Telemetry::detect(),
        );
        let error = result.err().unwrap();
        assert!(format!("{error:#}").contains("palm detector"), "{error:#}");
    }

    #[test]
    fn options() {
        let options = ModelOptions::default().min_confidence(0.5).max_hands(4);
        assert_eq!(options.get_min_confidence(), 0.5);
        assert_eq!(options.get_max_hands(), 4);
    }
}
