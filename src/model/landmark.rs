//! Hand landmark estimation inside a hand region.

use anyhow::{bail, ensure};

use crate::{
    hand::{Hand, Handedness, LandmarkPoint, NUM_LANDMARKS},
    image::{Frame, Resolution},
};

use super::network::{Network, Region};

/// Runs the landmark network on one hand region.
///
/// Expected outputs, in order: 21 screen landmarks as `x, y, z` in input pixels (`[1, 63]`), the
/// hand presence score (`[1, 1]`) and the handedness score (`[1, 1]`, above 0.5 means right hand).
/// Further outputs (eg. metric landmarks) are ignored.
pub struct Landmarker {
    network: Network,
}

/// A hand found by the [`Landmarker`], with the network's confidence that it is one.
pub struct Estimate {
    pub presence: f32,
    pub hand: Hand,
}

impl Landmarker {
    pub fn new(network: Network) -> Self {
        Self { network }
    }

    pub fn estimate(&self, frame: &Frame, region: Region) -> anyhow::Result<Estimate> {
        let outputs = self.network.run(frame, region)?;
        ensure!(outputs.len() >= 3, "landmark network returned {} outputs", outputs.len());

        let landmarks = outputs[0].as_slice::<f32>()?;
        let presence = outputs[1].as_slice::<f32>()?;
        let handedness = outputs[2].as_slice::<f32>()?;
        let (Some(&presence), Some(&handedness)) = (presence.first(), handedness.first()) else {
            bail!("network returned empty presence or handedness output");
        };

        let hand = to_hand(
            landmarks,
            handedness,
            self.network.input_resolution(),
            region,
            frame.resolution(),
        )?;
        Ok(Estimate { presence, hand })
    }
}

/// Maps landmarks in input pixels of `region` to normalized coordinates of the whole frame.
fn to_hand(
    landmarks: &[f32],
    handedness: f32,
    input: Resolution,
    region: Region,
    frame: Resolution,
) -> anyhow::Result<Hand> {
    ensure!(
        landmarks.len() == NUM_LANDMARKS * 3,
        "expected {} landmark coordinates, got {}",
        NUM_LANDMARKS * 3,
        landmarks.len()
    );

    let handedness = if handedness > 0.5 {
        Handedness::Right
    } else {
        Handedness::Left
    };
    let (in_w, in_h) = (input.width() as f32, input.height() as f32);
    let (w, h) = (frame.width() as f32, frame.height() as f32);
    let points = landmarks.chunks_exact(3).map(|xyz| {
        let (x, y) = region.to_frame(xyz[0] / in_w, xyz[1] / in_h);
        LandmarkPoint::new(x / w, y / h)
    });
    Ok(Hand::from_points(points, handedness)?)
}
