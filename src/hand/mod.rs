//! Hand landmarks and finger counting.
//!
//! A [`Hand`] is what a [`LandmarkModel`] reports for every hand it finds in a frame: 21 landmark
//! positions in normalized image coordinates, plus whether the hand is a left or right one.
//!
//! [`LandmarkModel`]: crate::model::LandmarkModel

pub mod fingers;
pub mod hull;

use std::fmt;

use embedded_graphics::prelude::Point;
use nalgebra::Point2;

use crate::image::{draw, Color, Frame, Resolution};

/// Number of landmarks per [`Hand`].
pub const NUM_LANDMARKS: usize = 21;

/// A single landmark position in normalized image coordinates.
///
/// `(0.0, 0.0)` is the top left corner of the frame, `(1.0, 1.0)` the bottom right one. Models may
/// report positions slightly outside of that range for hands at the image border.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct LandmarkPoint {
    pub x: f32,
    pub y: f32,
}

impl LandmarkPoint {
    #[inline]
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Converts the normalized position to pixel coordinates of a frame with resolution `res`.
    #[inline]
    pub fn to_pixel(&self, res: Resolution) -> Point2<f32> {
        Point2::new(self.x * res.width() as f32, self.y * res.height() as f32)
    }
}

/// Anatomical handedness of a detected hand.
///
/// This is a property of the hand, not of where it is in the (mirrored) image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Handedness {
    Left,
    Right,
}

impl fmt::Display for Handedness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Left => "L",
            Self::Right => "R",
        })
    }
}

/// Names for the hand pose landmarks.
///
/// # Terminology
///
/// - **CMC**: [Carpometacarpal joint], the lowest joint of the thumb, located near the wrist.
/// - **MCP**: [Metacarpophalangeal joint], the lower joint forming the knuckles near the palm of
///   the hand.
/// - **IP**: Interphalangeal joint of the thumb, right below its tip.
/// - **PIP**: Proximal Interphalangeal joint, the joint between the MCP and DIP.
/// - **DIP**: Distal Interphalangeal joint, the highest joint of a finger.
/// - **Tip**: This landmark is just placed on the tip of the finger, above the DIP.
///
/// [Carpometacarpal joint]: https://en.wikipedia.org/wiki/Carpometacarpal_joint
/// [Metacarpophalangeal joint]: https://en.wikipedia.org/wiki/Metacarpophalangeal_joint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LandmarkIdx {
    Wrist,
    ThumbCmc,
    ThumbMcp,
    ThumbIp,
    ThumbTip,
    IndexFingerMcp,
    IndexFingerPip,
    IndexFingerDip,
    IndexFingerTip,
    MiddleFingerMcp,
    MiddleFingerPip,
    MiddleFingerDip,
    MiddleFingerTip,
    RingFingerMcp,
    RingFingerPip,
    RingFingerDip,
    RingFingerTip,
    PinkyMcp,
    PinkyPip,
    PinkyDip,
    PinkyTip,
}

const CONNECTIVITY: &[(LandmarkIdx, LandmarkIdx)] = {
    use LandmarkIdx::*;
    &[
        // Surround the palm:
        (Wrist, ThumbCmc),
        (ThumbCmc, IndexFingerMcp),
        (IndexFingerMcp, MiddleFingerMcp),
        (MiddleFingerMcp, RingFingerMcp),
        (RingFingerMcp, PinkyMcp),
        (PinkyMcp, Wrist),
        // Thumb:
        (ThumbCmc, ThumbMcp),
        (ThumbMcp, ThumbIp),
        (ThumbIp, ThumbTip),
        // Index:
        (IndexFingerMcp, IndexFingerPip),
        (IndexFingerPip, IndexFingerDip),
        (IndexFingerDip, IndexFingerTip),
        // Middle:
        (MiddleFingerMcp, MiddleFingerPip),
        (MiddleFingerPip, MiddleFingerDip),
        (MiddleFingerDip, MiddleFingerTip),
        // Ring:
        (RingFingerMcp, RingFingerPip),
        (RingFingerPip, RingFingerDip),
        (RingFingerDip, RingFingerTip),
        // Pinky:
        (PinkyMcp, PinkyPip),
        (PinkyPip, PinkyDip),
        (PinkyDip, PinkyTip),
    ]
};

/// Error returned when a landmark list does not describe a valid [`Hand`].
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MalformedHand {
    #[error("expected 21 hand landmarks, got {0}")]
    WrongCount(usize),
    #[error("hand landmark {index} has a non-finite position ({x}, {y})")]
    NonFinite { index: usize, x: f32, y: f32 },
}

/// A detected hand: 21 ordered landmarks and a handedness label.
#[derive(Debug, Clone, PartialEq)]
pub struct Hand {
    landmarks: [LandmarkPoint; NUM_LANDMARKS],
    handedness: Handedness,
}

impl Hand {
    /// Creates a hand from exactly [`NUM_LANDMARKS`] points, ordered as in [`LandmarkIdx`].
    pub fn new(landmarks: [LandmarkPoint; NUM_LANDMARKS], handedness: Handedness) -> Self {
        Self {
            landmarks,
            handedness,
        }
    }

    /// Creates a hand from a list of points, validating the count and that every coordinate is
    /// finite.
    pub fn from_points<I>(points: I, handedness: Handedness) -> Result<Self, MalformedHand>
    where
        I: IntoIterator<Item = LandmarkPoint>,
    {
        let points = points.into_iter().collect::<Vec<_>>();
        let landmarks: [LandmarkPoint; NUM_LANDMARKS] = points
            .as_slice()
            .try_into()
            .map_err(|_| MalformedHand::WrongCount(points.len()))?;
        if let Some((index, p)) = landmarks
            .iter()
            .enumerate()
            .find(|(_, p)| !p.x.is_finite() || !p.y.is_finite())
        {
            return Err(MalformedHand::NonFinite {
                index,
                x: p.x,
                y: p.y,
            });
        }
        Ok(Self::new(landmarks, handedness))
    }

    #[inline]
    pub fn handedness(&self) -> Handedness {
        self.handedness
    }

    #[inline]
    pub fn landmarks(&self) -> &[LandmarkPoint; NUM_LANDMARKS] {
        &self.landmarks
    }

    #[inline]
    pub fn landmark(&self, idx: LandmarkIdx) -> LandmarkPoint {
        self.landmarks[idx as usize]
    }

    /// Returns all landmark positions converted to pixel coordinates.
    pub fn pixel_positions(&self, res: Resolution) -> [Point2<f32>; NUM_LANDMARKS] {
        self.landmarks.map(|lm| lm.to_pixel(res))
    }

    /// Draws the hand skeleton and landmark markers onto `frame`.
    pub fn draw(&self, frame: &mut Frame) {
        let res = frame.resolution();
        let pixels = self.pixel_positions(res).map(|p| to_draw_point(p, res));

        for (a, b) in CONNECTIVITY {
            draw::line(frame, pixels[*a as usize], pixels[*b as usize]).color(Color::GREEN);
        }
        for p in pixels {
            draw::marker(frame, p.x, p.y);
        }

        let wrist = pixels[LandmarkIdx::Wrist as usize];
        let label = self.handedness.to_string();
        draw::text(frame, wrist.x, wrist.y + 10, &label).color(Color::WHITE);
    }
}

/// Rounds a pixel position to the integer grid used by the drawing functions.
///
/// Positions are clamped to one frame size beyond each border of a `res` frame, so that shapes
/// built from them stay within the coordinate range the rasterizers can handle.
pub(crate) fn to_draw_point(p: Point2<f32>, res: Resolution) -> Point {
    let (w, h) = (res.width() as f32, res.height() as f32);
    Point::new(
        p.x.clamp(-w, 2.0 * w).round() as i32,
        p.y.clamp(-h, 2.0 * h).round() as i32,
    )
}
