//! Drawing onto [`Frame`]s and [`Mask`]s.
//!
//! Like the rest of the drawing API, every function returns a guard that performs the drawing
//! when dropped, so options can be chained onto the call.

use std::convert::Infallible;

use embedded_graphics::{
    draw_target::DrawTarget,
    mono_font::{ascii, MonoFont, MonoTextStyle},
    pixelcolor::BinaryColor,
    prelude::*,
    primitives::{Line, PrimitiveStyle, Rectangle, Triangle},
    text::{Alignment, Baseline, Text, TextStyleBuilder},
};
use itertools::Itertools;

use crate::image::{Color, Frame, Mask};

/// Guard returned by [`marker`]; draws the marker when dropped and allows customization.
pub struct DrawMarker<'a> {
    frame: &'a mut Frame,
    x: i32,
    y: i32,
    color: Color,
    size: u32,
}

impl DrawMarker<'_> {
    /// Sets the marker's color.
    pub fn color(&mut self, color: Color) -> &mut Self {
        self.color = color;
        self
    }

    /// Sets the width and height of the marker.
    ///
    /// The default size is 5. The size must be *uneven* and *non-zero*. A size of 1 will result in
    /// a single pixel getting drawn.
    pub fn size(&mut self, size: u32) -> &mut Self {
        assert!(size != 0, "marker size must be greater than zero");
        assert!(size % 2 == 1, "marker size must be an uneven number");
        self.size = size;
        self
    }
}

impl Drop for DrawMarker<'_> {
    fn drop(&mut self) {
        let offset = ((self.size - 1) / 2) as i32;
        let pixels = (-offset..=offset)
            .zip(-offset..=offset)
            .chain((-offset..=offset).rev().zip(-offset..=offset))
            .map(|(xoff, yoff)| Pixel(Point::new(self.x + xoff, self.y + yoff), self.color));
        match FrameTarget(&mut *self.frame).draw_iter(pixels) {
            Ok(()) => {}
            Err(infallible) => match infallible {},
        }
    }
}

/// Guard returned by [`line`]; draws the line when dropped and allows customization.
pub struct DrawLine<'a> {
    frame: &'a mut Frame,
    start: Point,
    end: Point,
    color: Color,
    stroke_width: u32,
}

impl DrawLine<'_> {
    /// Sets the line's color.
    pub fn color(&mut self, color: Color) -> &mut Self {
        self.color = color;
        self
    }

    /// Sets the line's stroke width.
    ///
    /// By default, a stroke width of 1 is used.
    pub fn stroke_width(&mut self, width: u32) -> &mut Self {
        self.stroke_width = width;
        self
    }
}

impl Drop for DrawLine<'_> {
    fn drop(&mut self) {
        match Line::new(self.start, self.end)
            .into_styled(PrimitiveStyle::with_stroke(self.color, self.stroke_width))
            .draw(&mut FrameTarget(&mut *self.frame))
        {
            Ok(()) => {}
            Err(infallible) => match infallible {},
        }
    }
}

/// Guard returned by [`polygon`]; draws the closed outline when dropped.
pub struct DrawPolygon<'a> {
    frame: &'a mut Frame,
    points: &'a [Point],
    color: Color,
    stroke_width: u32,
}

impl DrawPolygon<'_> {
    /// Sets the outline color.
    pub fn color(&mut self, color: Color) -> &mut Self {
        self.color = color;
        self
    }

    /// Sets the outline stroke width.
    ///
    /// By default, a stroke width of 1 is used.
    pub fn stroke_width(&mut self, width: u32) -> &mut Self {
        self.stroke_width = width;
        self
    }
}

impl Drop for DrawPolygon<'_> {
    fn drop(&mut self) {
        if self.points.len() < 2 {
            return;
        }
        let style = PrimitiveStyle::with_stroke(self.color, self.stroke_width);
        for (start, end) in self.points.iter().circular_tuple_windows() {
            match Line::new(*start, *end)
                .into_styled(style)
                .draw(&mut FrameTarget(&mut *self.frame))
            {
                Ok(()) => {}
                Err(infallible) => match infallible {},
            }
        }
    }
}

/// Guard returned by [`text`]; draws the text when dropped and allows customization.
pub struct DrawText<'a> {
    frame: &'a mut Frame,
    x: i32,
    y: i32,
    text: &'a str,
    color: Color,
    font: &'static MonoFont<'static>,
    alignment: Alignment,
    baseline: Baseline,
}

impl DrawText<'_> {
    /// Sets the text color.
    pub fn color(&mut self, color: Color) -> &mut Self {
        self.color = color;
        self
    }

    /// Uses a 10x20 pixel font instead of the default 6x10 one.
    pub fn large(&mut self) -> &mut Self {
        self.font = &ascii::FONT_10X20;
        self
    }

    /// Aligns the top of the text with the `y` coordinate.
    pub fn align_top(&mut self) -> &mut Self {
        self.baseline = Baseline::Top;
        self
    }

    /// Aligns the left side of the text with the `x` coordinate.
    pub fn align_left(&mut self) -> &mut Self {
        self.alignment = Alignment::Left;
        self
    }
}

impl Drop for DrawText<'_> {
    fn drop(&mut self) {
        let character_style = MonoTextStyle::new(self.font, self.color);
        let text_style = TextStyleBuilder::new()
            .alignment(self.alignment)
            .baseline(self.baseline)
            .build();
        match Text::with_text_style(
            self.text,
            Point::new(self.x, self.y),
            character_style,
            text_style,
        )
        .draw(&mut FrameTarget(&mut *self.frame))
        {
            Ok(_) => {}
            Err(infallible) => match infallible {},
        }
    }
}

/// Draws a marker onto a frame.
///
/// This is used to visualize hand landmarks.
pub fn marker(frame: &mut Frame, x: i32, y: i32) -> DrawMarker<'_> {
    DrawMarker {
        frame,
        x,
        y,
        color: Color::RED,
        size: 5,
    }
}

/// Draws a line onto a frame.
pub fn line(frame: &mut Frame, start: Point, end: Point) -> DrawLine<'_> {
    DrawLine {
        frame,
        start,
        end,
        color: Color::BLUE,
        stroke_width: 1,
    }
}

/// Draws the closed outline of a polygon onto a frame.
///
/// The last point is connected back to the first one. Fewer than 2 points draw nothing.
pub fn polygon<'a>(frame: &'a mut Frame, points: &'a [Point]) -> DrawPolygon<'a> {
    DrawPolygon {
        frame,
        points,
        color: Color::GREEN,
        stroke_width: 1,
    }
}

/// Draws a text string onto a frame.
///
/// By default, the text is drawn centered horizontally and vertically around `x` and `y`.
pub fn text<'a>(frame: &'a mut Frame, x: i32, y: i32, text: &'a str) -> DrawText<'a> {
    DrawText {
        frame,
        x,
        y,
        text,
        color: Color::RED,
        font: &ascii::FONT_6X10,
        alignment: Alignment::Center,
        baseline: Baseline::Middle,
    }
}

/// Fills a convex polygon in `mask`.
///
/// The polygon is rasterized as a triangle fan around its first vertex, so the result is only
/// correct for convex input. Fewer than 3 points fill nothing.
pub fn fill_convex(mask: &mut Mask, points: &[Point]) {
    let Some((&first, rest)) = points.split_first() else {
        return;
    };
    let style = PrimitiveStyle::with_fill(BinaryColor::On);
    for (&b, &c) in rest.iter().tuple_windows() {
        match Triangle::new(first, b, c)
            .into_styled(style)
            .draw(&mut MaskTarget(mask))
        {
            Ok(()) => {}
            Err(infallible) => match infallible {},
        }
    }
}

struct FrameTarget<'a>(&'a mut Frame);

impl Dimensions for FrameTarget<'_> {
    fn bounding_box(&self) -> Rectangle {
        Rectangle {
            top_left: Point { x: 0, y: 0 },
            size: Size {
                width: self.0.width(),
                height: self.0.height(),
            },
        }
    }
}

impl DrawTarget for FrameTarget<'_> {
    type Color = Color;

    type Error = Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        for Pixel(pos, color) in pixels {
            if pos.x >= 0
                && (pos.x as u32) < self.0.width()
                && pos.y >= 0
                && (pos.y as u32) < self.0.height()
            {
                self.0.set(pos.x as u32, pos.y as u32, color);
            }
        }

        Ok(())
    }
}

struct MaskTarget<'a>(&'a mut Mask);

impl Dimensions for MaskTarget<'_> {
    fn bounding_box(&self) -> Rectangle {
        Rectangle {
            top_left: Point { x: 0, y: 0 },
            size: Size {
                width: self.0.width(),
                height: self.0.height(),
            },
        }
    }
}

impl DrawTarget for MaskTarget<'_> {
    type Color = BinaryColor;

    type Error = Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        for Pixel(pos, color) in pixels {
            if color.is_on()
                && pos.x >= 0
                && (pos.x as u32) < self.0.width()
                && pos.y >= 0
                && (pos.y as u32) < self.0.height()
            {
                self.0.set(pos.x as u32, pos.y as u32);
            }
        }

        Ok(())
    }
}
