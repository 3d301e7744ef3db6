//! Frame and mask buffers.
//!
//! This module provides:
//!
//! - [`Frame`], an owned 8-bit RGB image as produced by a [`FrameSource`].
//! - [`Mask`], a single-channel binary image with the same dimensions as the frame it belongs to.
//! - [`Resolution`] and [`Color`].
//! - A handful of [`draw`] functions used to annotate frames and masks.
//!
//! [`FrameSource`]: crate::video::FrameSource

pub mod draw;

#[cfg(test)]
mod tests;

use std::{fmt, path::Path};

use embedded_graphics::{pixelcolor::raw::RawU24, prelude::PixelColor};
use image::{imageops::FilterType, GrayImage, ImageBuffer, Luma, Rgb, RgbImage};

#[derive(Debug, Clone, Copy)]
enum ImageFormat {
    Jpeg,
    Png,
}

impl ImageFormat {
    fn from_path(path: &Path) -> anyhow::Result<Self> {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("jpg" | "jpeg") => Ok(Self::Jpeg),
            Some("png") => Ok(Self::Png),
            _ => anyhow::bail!(
                "invalid image path '{}' (must have one of the supported extensions)",
                path.display()
            ),
        }
    }

    fn to_image_format(self) -> image::ImageFormat {
        match self {
            Self::Jpeg => image::ImageFormat::Jpeg,
            Self::Png => image::ImageFormat::Png,
        }
    }
}

/// Returns whether `path` has an extension [`Frame::load`] understands.
pub fn is_supported_path(path: &Path) -> bool {
    ImageFormat::from_path(path).is_ok()
}

/// Resolution (`width x height`) of a frame, mask, camera, or window.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Resolution {
    width: u32,
    height: u32,
}

impl Resolution {
    /// 720p resolution: `1280x720`
    pub const RES_720P: Self = Self {
        width: 1280,
        height: 720,
    };

    /// VGA resolution: `640x480`
    pub const RES_VGA: Self = Self {
        width: 640,
        height: 480,
    };

    /// Creates a new [`Resolution`] of `width x height`.
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    #[inline]
    pub fn num_pixels(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }

    /// Scales `self` to the given height, keeping the aspect ratio.
    ///
    /// The resulting width is rounded down, but never drops below 1.
    pub fn scale_to_height(&self, height: u32) -> Self {
        if self.height == 0 {
            return Self::new(self.width, height);
        }
        let width = (u64::from(self.width) * u64::from(height) / u64::from(self.height)) as u32;
        Self::new(width.max(1), height)
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

impl fmt::Debug for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// An 8-bit RGB color.
#[derive(PartialEq, Eq, Clone, Copy)]
pub struct Color(pub(crate) [u8; 3]);

impl Color {
    pub const BLACK: Self = Self([0, 0, 0]);
    pub const WHITE: Self = Self([255, 255, 255]);
    pub const RED: Self = Self([255, 0, 0]);
    pub const GREEN: Self = Self([0, 255, 0]);
    pub const BLUE: Self = Self([0, 0, 255]);

    #[inline]
    pub const fn from_rgb8(r: u8, g: u8, b: u8) -> Self {
        Self([r, g, b])
    }

    #[inline]
    pub fn r(&self) -> u8 {
        self.0[0]
    }

    #[inline]
    pub fn g(&self) -> u8 {
        self.0[1]
    }

    #[inline]
    pub fn b(&self) -> u8 {
        self.0[2]
    }
}

impl fmt::Debug for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}", self.r(), self.g(), self.b())
    }
}

impl PixelColor for Color {
    type Raw = RawU24;
}

/// An 8-bit RGB frame (`height x width x 3`).
///
/// Frames are plain owned buffers. Handing a frame to another pipeline stage moves it, so the
/// sending stage keeps no reference to the pixels afterwards.
#[derive(Clone)]
pub struct Frame {
    pub(crate) buf: RgbImage,
}

impl Frame {
    /// Creates a black frame of the given size.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            buf: ImageBuffer::new(width, height),
        }
    }

    /// Loads a frame from the filesystem.
    ///
    /// The path must have a supported file extension (`jpeg`, `jpg` or `png`).
    pub fn load<A: AsRef<Path>>(path: A) -> anyhow::Result<Self> {
        Self::load_impl(path.as_ref())
    }

    fn load_impl(path: &Path) -> anyhow::Result<Self> {
        let format = ImageFormat::from_path(path)?;
        let data = std::fs::read(path)?;
        let buf = image::load_from_memory_with_format(&data, format.to_image_format())?.to_rgb8();
        Ok(Self { buf })
    }

    /// Decodes a JFIF JPEG or Motion JPEG from a byte slice.
    pub fn decode_jpeg(data: &[u8]) -> anyhow::Result<Self> {
        let buf = image::load_from_memory_with_format(data, image::ImageFormat::Jpeg)?.to_rgb8();
        Ok(Self { buf })
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.buf.width()
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.buf.height()
    }

    #[inline]
    pub fn resolution(&self) -> Resolution {
        Resolution::new(self.width(), self.height())
    }

    /// Gets the color at the given pixel coordinates.
    ///
    /// # Panics
    ///
    /// This will panic if `(x, y)` is outside the bounds of this frame.
    pub fn get(&self, x: u32, y: u32) -> Color {
        Color(self.buf[(x, y)].0)
    }

    /// Sets the color at the given pixel coordinates.
    ///
    /// # Panics
    ///
    /// This will panic if `(x, y)` is outside the bounds of this frame.
    pub fn set(&mut self, x: u32, y: u32, color: Color) {
        self.buf[(x, y)] = Rgb(color.0);
    }

    /// Clears the frame, setting every pixel value to `color`.
    pub fn clear(&mut self, color: Color) {
        self.buf.pixels_mut().for_each(|pix| pix.0 = color.0);
    }

    /// Returns a left-right mirrored copy of this frame.
    pub fn flip_horizontal(&self) -> Frame {
        Frame {
            buf: image::imageops::flip_horizontal(&self.buf),
        }
    }

    /// Returns a copy of this frame scaled to `height`, keeping the aspect ratio.
    pub fn resize_to_height(&self, height: u32) -> Frame {
        let res = self.resolution().scale_to_height(height);
        if res == self.resolution() {
            return self.clone();
        }
        Frame {
            buf: image::imageops::resize(
                &self.buf,
                res.width(),
                res.height(),
                FilterType::Triangle,
            ),
        }
    }

    /// Places `frames` next to each other, left to right.
    ///
    /// The result is as tall as the tallest input; shorter inputs are padded with black at the
    /// bottom.
    pub fn hconcat(frames: &[&Frame]) -> Frame {
        let width = frames.iter().map(|f| f.width()).sum();
        let height = frames.iter().map(|f| f.height()).max().unwrap_or(0);
        let mut out = Frame::new(width, height);
        let mut x = 0;
        for frame in frames {
            image::imageops::replace(&mut out.buf, &frame.buf, i64::from(x), 0);
            x += frame.width();
        }
        out
    }

    /// Converts the frame to `0RGB` words as expected by window framebuffers.
    pub fn to_0rgb(&self) -> Vec<u32> {
        self.buf
            .pixels()
            .map(|Rgb([r, g, b])| u32::from(*r) << 16 | u32::from(*g) << 8 | u32::from(*b))
            .collect()
    }

    #[inline]
    pub fn data(&self) -> &[u8] {
        self.buf.as_raw()
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{} Frame", self.width(), self.height())
    }
}

/// A single-channel binary image whose pixels are either 0 or 255.
#[derive(Clone)]
pub struct Mask {
    pub(crate) buf: GrayImage,
}

impl Mask {
    /// The value of a pixel inside the mask.
    pub const SET: u8 = 255;

    /// Creates an all-zero mask.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            buf: ImageBuffer::new(width, height),
        }
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.buf.width()
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.buf.height()
    }

    #[inline]
    pub fn resolution(&self) -> Resolution {
        Resolution::new(self.width(), self.height())
    }

    /// Returns the mask value at `(x, y)`.
    ///
    /// # Panics
    ///
    /// This will panic if `(x, y)` is outside the bounds of this mask.
    pub fn get(&self, x: u32, y: u32) -> u8 {
        self.buf[(x, y)].0[0]
    }

    pub(crate) fn set(&mut self, x: u32, y: u32) {
        self.buf[(x, y)] = Luma([Self::SET]);
    }

    /// Returns the number of set pixels.
    pub fn count_set(&self) -> usize {
        self.buf.as_raw().iter().filter(|&&v| v != 0).count()
    }

    /// Returns `true` if no pixel is set.
    pub fn is_empty(&self) -> bool {
        self.buf.as_raw().iter().all(|&v| v == 0)
    }

    /// Expands the mask into a 3-channel grayscale [`Frame`] for display.
    pub fn to_frame(&self) -> Frame {
        let mut buf = RgbImage::new(self.width(), self.height());
        for (dest, src) in buf.pixels_mut().zip(self.buf.pixels()) {
            let v = src.0[0];
            dest.0 = [v, v, v];
        }
        Frame { buf }
    }
}

impl fmt::Debug for Mask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}x{} Mask ({} set)",
            self.width(),
            self.height(),
            self.count_set()
        )
    }
}
