//! Counting extended fingers from landmark geometry.
//!
//! The rules are purely geometric and operate in pixel coordinates of the (mirrored) frame:
//!
//! - The four fingers count as extended when their tip is above (smaller `y`) their PIP joint.
//! - The thumb counts as extended when its tip is further out sideways than its IP joint. "Out"
//!   depends on the hand: in a mirrored frame the right thumb points towards smaller `x`, the left
//!   one towards larger `x`. Comparing `x` without looking at the handedness miscounts one of the
//!   two thumbs.
//!
//! The convex hull computed alongside the count is only used for visualization. Failing to compute
//! it never affects the count.

use std::fmt;

use embedded_graphics::prelude::Point;
use nalgebra::Point2;

use crate::image::Resolution;

use super::{hull, to_draw_point, Hand, Handedness, LandmarkIdx};

/// The five digits of a hand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Digit {
    Thumb,
    Index,
    Middle,
    Ring,
    Pinky,
}

impl Digit {
    pub const ALL: [Digit; 5] = [
        Digit::Thumb,
        Digit::Index,
        Digit::Middle,
        Digit::Ring,
        Digit::Pinky,
    ];

    /// The landmark at the tip of this digit.
    pub fn tip(self) -> LandmarkIdx {
        match self {
            Digit::Thumb => LandmarkIdx::ThumbTip,
            Digit::Index => LandmarkIdx::IndexFingerTip,
            Digit::Middle => LandmarkIdx::MiddleFingerTip,
            Digit::Ring => LandmarkIdx::RingFingerTip,
            Digit::Pinky => LandmarkIdx::PinkyTip,
        }
    }

    /// The joint the tip is compared against: the IP joint for the thumb, the PIP joint for every
    /// other finger.
    pub fn reference_joint(self) -> LandmarkIdx {
        match self {
            Digit::Thumb => LandmarkIdx::ThumbIp,
            Digit::Index => LandmarkIdx::IndexFingerPip,
            Digit::Middle => LandmarkIdx::MiddleFingerPip,
            Digit::Ring => LandmarkIdx::RingFingerPip,
            Digit::Pinky => LandmarkIdx::PinkyPip,
        }
    }
}

/// Set of extended digits of a single hand.
#[derive(Clone, Copy, PartialEq, Eq, Default)]
pub struct Extended([bool; 5]);

impl Extended {
    #[inline]
    pub fn contains(&self, digit: Digit) -> bool {
        self.0[digit as usize]
    }

    fn insert(&mut self, digit: Digit) {
        self.0[digit as usize] = true;
    }

    /// Number of extended digits (0 to 5).
    pub fn count(&self) -> u32 {
        self.0.iter().filter(|&&b| b).count() as u32
    }

    pub fn iter(&self) -> impl Iterator<Item = Digit> + '_ {
        Digit::ALL.into_iter().filter(|d| self.contains(*d))
    }
}

impl fmt::Debug for Extended {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

/// Returns whether a thumb is extended, given the `x` pixel coordinates of its tip and IP joint.
#[inline]
pub fn thumb_extended(handedness: Handedness, tip_x: f32, joint_x: f32) -> bool {
    match handedness {
        Handedness::Right => tip_x < joint_x,
        Handedness::Left => tip_x > joint_x,
    }
}

/// Returns whether a finger other than the thumb is extended, given the `y` pixel coordinates of
/// its tip and PIP joint.
#[inline]
pub fn finger_extended(tip_y: f32, pip_y: f32) -> bool {
    tip_y < pip_y
}

/// Finger count of one hand plus the outline used for visualization.
#[derive(Debug, Clone)]
pub struct HandReading {
    handedness: Handedness,
    extended: Extended,
    pixels: [Point2<f32>; 21],
    hull: Option<Vec<Point>>,
}

impl HandReading {
    #[inline]
    pub fn handedness(&self) -> Handedness {
        self.handedness
    }

    #[inline]
    pub fn extended(&self) -> Extended {
        self.extended
    }

    /// Number of extended digits of this hand (0 to 5).
    #[inline]
    pub fn count(&self) -> u32 {
        self.extended.count()
    }

    /// Landmark positions in pixel coordinates.
    #[inline]
    pub fn pixels(&self) -> &[Point2<f32>; 21] {
        &self.pixels
    }

    /// Convex hull of the landmarks in pixel coordinates, in counter-clockwise order.
    ///
    /// Returns `None` if the landmarks are degenerate (eg. all on one line).
    #[inline]
    pub fn hull(&self) -> Option<&[Point]> {
        self.hull.as_deref()
    }
}

/// Counts the extended digits of `hand` in a frame of resolution `res`.
pub fn count(hand: &Hand, res: Resolution) -> HandReading {
    let pixels = hand.pixel_positions(res);
    let handedness = hand.handedness();

    let mut extended = Extended::default();
    for digit in Digit::ALL {
        let tip = pixels[digit.tip() as usize];
        let joint = pixels[digit.reference_joint() as usize];
        let is_extended = match digit {
            Digit::Thumb => thumb_extended(handedness, tip.x, joint.x),
            _ => finger_extended(tip.y, joint.y),
        };
        if is_extended {
            extended.insert(digit);
        }
    }

    let hull = hull::convex_hull(&pixels.map(|p| to_draw_point(p, res)));

    HandReading {
        handedness,
        extended,
        pixels,
        hull,
    }
}

/// Sums the finger counts of all `readings`.
pub fn total(readings: &[HandReading]) -> u32 {
    readings.iter().map(HandReading::count).sum()
}
