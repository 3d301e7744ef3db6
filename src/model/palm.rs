//! Palm detection.
//!
//! The palm detector is a Single Shot MultiBox Detector (SSD): for every anchor it predicts a
//! score and a box relative to the anchor center. Overlapping boxes of the same palm are removed
//! with Non-Maximum Suppression, and every remaining palm is grown into a square region that
//! contains the whole hand, which is where the landmark network runs next.

use anyhow::ensure;
use itertools::Itertools;

use crate::image::{Frame, Resolution};

use super::network::{Network, Region};

/// Strides of the output layers. Consecutive layers with the same stride share a feature map.
const STRIDES: [u32; 4] = [8, 16, 16, 16];

/// Anchors per feature map cell of each output layer.
const BOXES_PER_LAYER: u32 = 2;

/// Detections overlapping a more confident one by at least this much are dropped.
const IOU_THRESH: f32 = 0.3;

/// Size of the hand region relative to the larger side of the palm box.
const HAND_SCALE: f32 = 2.6;

/// Shift of the hand region towards the fingers, relative to the palm box height.
const HAND_SHIFT_Y: f32 = 0.5;

/// Center of an SSD anchor, normalized to the network input.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Anchor {
    xc: f32,
    yc: f32,
}

fn anchors(input: Resolution) -> Vec<Anchor> {
    let mut anchors = Vec::new();
    for (layers, &stride) in STRIDES.iter().dedup_with_count() {
        let width = (input.width() + stride - 1) / stride;
        let height = (input.height() + stride - 1) / stride;
        let boxes_per_cell = layers as u32 * BOXES_PER_LAYER;

        for y in 0..height {
            for x in 0..width {
                let xc = (x as f32 + 0.5) / width as f32;
                let yc = (y as f32 + 0.5) / height as f32;
                for _ in 0..boxes_per_cell {
                    anchors.push(Anchor { xc, yc });
                }
            }
        }
    }
    anchors
}

/// A detected palm, normalized to the region the detector ran on.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Palm {
    xc: f32,
    yc: f32,
    w: f32,
    h: f32,
    score: f32,
}

impl Palm {
    fn area(&self) -> f32 {
        self.w * self.h
    }

    fn iou(&self, other: &Palm) -> f32 {
        let overlap_w = (self.xc + self.w / 2.0).min(other.xc + other.w / 2.0)
            - (self.xc - self.w / 2.0).max(other.xc - other.w / 2.0);
        let overlap_h = (self.yc + self.h / 2.0).min(other.yc + other.h / 2.0)
            - (self.yc - self.h / 2.0).max(other.yc - other.h / 2.0);
        if overlap_w <= 0.0 || overlap_h <= 0.0 {
            return 0.0;
        }

        let intersection = overlap_w * overlap_h;
        let union = self.area() + other.area() - intersection;
        if union <= 0.0 {
            0.0
        } else {
            intersection / union
        }
    }

    /// Square region around the whole hand, in pixels of the frame `input` was cut from.
    fn hand_region(&self, input: Region) -> Region {
        let (xc, yc) = input.to_frame(self.xc, self.yc - HAND_SHIFT_Y * self.h);
        let size = self.w.max(self.h) * input.size() * HAND_SCALE;
        Region::from_center(xc, yc, size)
    }
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

/// Turns raw network output into palms scoring at least `min_score`.
///
/// `boxes` holds one row per anchor, starting with the box center offset and size in input
/// pixels. `scores` holds one logit per anchor.
fn decode(
    boxes: &[f32],
    scores: &[f32],
    anchors: &[Anchor],
    input: Resolution,
    min_score: f32,
) -> anyhow::Result<Vec<Palm>> {
    ensure!(
        scores.len() == anchors.len(),
        "expected {} palm scores, got {}",
        anchors.len(),
        scores.len()
    );
    let row = boxes.len() / anchors.len().max(1);
    ensure!(
        row >= 4 && boxes.len() == row * anchors.len(),
        "expected {} palm boxes, got {} values",
        anchors.len(),
        boxes.len()
    );

    let (w, h) = (input.width() as f32, input.height() as f32);
    let palms = anchors
        .iter()
        .zip(boxes.chunks_exact(row))
        .zip(scores)
        .filter_map(|((anchor, raw), &logit)| {
            let score = sigmoid(logit.clamp(-100.0, 100.0));
            (score >= min_score).then(|| Palm {
                xc: anchor.xc + raw[0] / w,
                yc: anchor.yc + raw[1] / h,
                w: raw[2] / w,
                h: raw[3] / h,
                score,
            })
        })
        .collect();
    Ok(palms)
}

/// Keeps the `max` most confident palms that don't overlap a more confident one.
fn suppress(mut palms: Vec<Palm>, max: usize) -> Vec<Palm> {
    palms.sort_unstable_by(|a, b| b.score.total_cmp(&a.score));

    let mut kept: Vec<Palm> = Vec::with_capacity(max);
    for palm in palms {
        if kept.len() == max {
            break;
        }
        if kept.iter().all(|k| k.iou(&palm) < IOU_THRESH) {
            kept.push(palm);
        }
    }
    kept
}

/// Finds palms in a whole frame.
///
/// Expected outputs, in order: boxes (`[1, N, 18]`: center offset, size and 7 keypoints in input
/// pixels) and score logits (`[1, N, 1]`), where `N` is the number of anchors.
pub struct PalmDetector {
    network: Network,
    anchors: Vec<Anchor>,
}

impl PalmDetector {
    pub fn new(network: Network) -> Self {
        let anchors = anchors(network.input_resolution());
        Self { network, anchors }
    }

    #[inline]
    pub fn num_anchors(&self) -> usize {
        self.anchors.len()
    }

    /// Returns the hand regions of up to `max_hands` palms scoring at least `min_score`, most
    /// confident first.
    pub fn detect(
        &self,
        frame: &Frame,
        max_hands: usize,
        min_score: f32,
    ) -> anyhow::Result<Vec<Region>> {
        let input = Region::enclosing(frame.resolution());
        let outputs = self.network.run(frame, input)?;
        ensure!(outputs.len() >= 2, "palm detector returned {} outputs", outputs.len());

        let palms = decode(
            outputs[0].as_slice::<f32>()?,
            outputs[1].as_slice::<f32>()?,
            &self.anchors,
            self.network.input_resolution(),
            min_score,
        )?;
        Ok(suppress(palms, max_hands)
            .iter()
            .map(|palm| palm.hand_region(input))
            .collect())
    }
}
