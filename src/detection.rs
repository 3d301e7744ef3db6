//! Per-frame detection results.

use crate::{
    hand::{
        fingers::{self, HandReading},
        Hand,
    },
    image::{draw, Color, Frame, Mask},
};

/// Everything the detection worker produces for one frame.
///
/// Created once per processed frame and consumed once by the display loop.
#[derive(Debug, Clone)]
pub struct DetectionResult {
    /// The input frame with hand landmarks and connections drawn on top.
    pub frame: Frame,
    /// Filled convex hulls of all hands. Same size as `frame`.
    pub mask: Mask,
    /// Black frame with the hull outlines of all hands. Same size as `frame`.
    pub contour: Frame,
    /// Extended fingers, summed over all hands.
    pub finger_count: u32,
    /// Per-hand details.
    pub readings: Vec<HandReading>,
}

impl DetectionResult {
    /// A result for a frame in which no hands were found.
    pub fn empty(frame: Frame) -> Self {
        let (width, height) = (frame.width(), frame.height());
        Self {
            frame,
            mask: Mask::new(width, height),
            contour: Frame::new(width, height),
            finger_count: 0,
            readings: Vec::new(),
        }
    }

    #[inline]
    pub fn num_hands(&self) -> usize {
        self.readings.len()
    }
}

/// Counts fingers of every hand in `hands` and renders the visualizations for `frame`.
///
/// A hand whose hull is degenerate still counts; it just leaves no trace in the mask and contour.
pub fn process(frame: Frame, hands: &[Hand]) -> DetectionResult {
    let mut result = DetectionResult::empty(frame);
    let res = result.frame.resolution();

    for hand in hands {
        let reading = fingers::count(hand, res);
        if let Some(hull) = reading.hull() {
            draw::fill_convex(&mut result.mask, hull);
            draw::polygon(&mut result.contour, hull)
                .color(Color::GREEN)
                .stroke_width(2);
        }
        hand.draw(&mut result.frame);
        result.readings.push(reading);
    }

    result.finger_count = fingers::total(&result.readings);
    result
}
