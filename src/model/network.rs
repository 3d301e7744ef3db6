//! Running `tract` networks on square regions of a frame.

use std::{path::Path, sync::Arc};

use anyhow::{bail, ensure};
use image::{imageops, imageops::FilterType, RgbImage};
use tract_onnx::prelude::{
    tvec, Framework, Graph, InferenceModelExt, SimplePlan, TValue, TVec, Tensor, TypedFact,
    TypedOp,
};

use crate::image::{Frame, Resolution};

type Plan = SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InputLayout {
    /// `[1, 3, H, W]`
    Nchw,
    /// `[1, H, W, 3]`
    Nhwc,
}

impl InputLayout {
    fn detect(shape: &[usize]) -> anyhow::Result<(Self, Resolution)> {
        match *shape {
            [1, 3, h, w] => Ok((Self::Nchw, Resolution::new(w as u32, h as u32))),
            [1, h, w, 3] => Ok((Self::Nhwc, Resolution::new(w as u32, h as u32))),
            _ => bail!("unsupported network input shape {shape:?}, expected an RGB image"),
        }
    }
}

/// A square area of a frame, in pixels.
///
/// Regions may extend past the frame borders. Whatever lies outside of the frame is fed to the
/// network as black.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Region {
    x: f32,
    y: f32,
    size: f32,
}

impl Region {
    pub fn from_center(xc: f32, yc: f32, size: f32) -> Self {
        Self {
            x: xc - size / 2.0,
            y: yc - size / 2.0,
            size,
        }
    }

    /// The smallest square centered on a frame of resolution `res` that contains all of it.
    pub fn enclosing(res: Resolution) -> Self {
        let (w, h) = (res.width() as f32, res.height() as f32);
        Self::from_center(w / 2.0, h / 2.0, w.max(h))
    }

    #[inline]
    pub fn size(&self) -> f32 {
        self.size
    }

    /// Maps a position relative to the region (`0.0..=1.0` on both axes) to frame pixels.
    pub fn to_frame(&self, u: f32, v: f32) -> (f32, f32) {
        (self.x + u * self.size, self.y + v * self.size)
    }
}

/// A loaded network with a single RGB image input.
pub struct Network {
    plan: Plan,
    layout: InputLayout,
    input_res: Resolution,
}

impl Network {
    /// Loads a network from an ONNX file path with an `.onnx` extension.
    pub fn load(path: &Path, min_outputs: usize) -> anyhow::Result<Self> {
        match path.extension() {
            Some(ext) if ext == "onnx" => {}
            _ => bail!("neural network path must have `.onnx` extension"),
        }

        let model_data = std::fs::read(path)?;
        Self::from_onnx(&model_data, min_outputs)
    }

    /// Loads a network from an in-memory ONNX file.
    pub fn from_onnx(raw: &[u8], min_outputs: usize) -> anyhow::Result<Self> {
        let graph = tract_onnx::onnx().model_for_read(&mut &*raw)?;
        let plan = graph.into_optimized()?.into_runnable()?;

        let model = plan.model();
        ensure!(
            model.inputs.len() == 1,
            "expected a network with 1 input, got {}",
            model.inputs.len()
        );
        ensure!(
            model.outputs.len() >= min_outputs,
            "expected a network with at least {min_outputs} outputs, got {}",
            model.outputs.len()
        );
        let fact = model.input_fact(0)?;
        let Some(shape) = fact.shape.as_concrete() else {
            bail!("network input has a symbolic shape");
        };
        let (layout, input_res) = InputLayout::detect(shape)?;

        Ok(Self {
            plan,
            layout,
            input_res,
        })
    }

    #[inline]
    pub fn input_resolution(&self) -> Resolution {
        self.input_res
    }

    /// Runs the network on `region` of `frame`, scaled to the input resolution.
    pub fn run(&self, frame: &Frame, region: Region) -> anyhow::Result<TVec<TValue>> {
        let input = to_tensor(&crop(frame, region, self.input_res), self.layout)?;
        Ok(self.plan.run(tvec![TValue::from_const(Arc::new(input))])?)
    }
}

/// Cuts `region` out of `frame` and scales it to `res`.
fn crop(frame: &Frame, region: Region, res: Resolution) -> RgbImage {
    let (w, h) = (res.width(), res.height());
    let mut canvas = RgbImage::new(w, h);
    let (scale_x, scale_y) = (w as f32 / region.size, h as f32 / region.size);

    // part of the region covered by the frame
    let x0 = region.x.max(0.0);
    let y0 = region.y.max(0.0);
    let x1 = (region.x + region.size).min(frame.width() as f32);
    let y1 = (region.y + region.size).min(frame.height() as f32);
    if x1 - x0 < 1.0 || y1 - y0 < 1.0 {
        return canvas;
    }

    let visible = imageops::crop_imm(
        &frame.buf,
        x0 as u32,
        y0 as u32,
        (x1 - x0) as u32,
        (y1 - y0) as u32,
    )
    .to_image();
    let scaled_w = (((x1 - x0) * scale_x).round() as u32).clamp(1, w);
    let scaled_h = (((y1 - y0) * scale_y).round() as u32).clamp(1, h);
    let scaled = imageops::resize(&visible, scaled_w, scaled_h, FilterType::Triangle);
    imageops::overlay(
        &mut canvas,
        &scaled,
        ((x0 - region.x) * scale_x).round() as i64,
        ((y0 - region.y) * scale_y).round() as i64,
    );
    canvas
}

fn to_tensor(image: &RgbImage, layout: InputLayout) -> anyhow::Result<Tensor> {
    let (w, h) = (image.width() as usize, image.height() as usize);
    let mut data = vec![0.0; w * h * 3];
    for (x, y, pixel) in image.enumerate_pixels() {
        let (x, y) = (x as usize, y as usize);
        for (c, value) in pixel.0.iter().enumerate() {
            let index = match layout {
                InputLayout::Nchw => c * w * h + y * w + x,
                InputLayout::Nhwc => (y * w + x) * 3 + c,
            };
            data[index] = f32::from(*value) / 255.0;
        }
    }

    let shape = match layout {
        InputLayout::Nchw => [1, 3, h, w],
        InputLayout::Nhwc => [1, h, w, 3],
    };
    Ok(Tensor::from_shape(&shape, &data)?)
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use crate::image::Color;

    use super::*;

    #[test]
    fn input_layouts() {
        assert_eq!(
            InputLayout::detect(&[1, 3, 224, 192]).unwrap(),
            (InputLayout::Nchw, Resolution::new(192, 224))
        );
        assert_eq!(
            InputLayout::detect(&[1, 224, 224, 3]).unwrap(),
            (InputLayout::Nhwc, Resolution::new(224, 224))
        );
        assert!(InputLayout::detect(&[1, 1, 224, 224]).is_err());
        assert!(InputLayout::detect(&[224, 224]).is_err());
    }

    #[test]
    fn enclosing_region_letterboxes() {
        let region = Region::enclosing(Resolution::new(640, 480));
        assert_eq!(region.size(), 640.0);
        assert_eq!(region.to_frame(0.0, 0.0), (0.0, -80.0));
        assert_eq!(region.to_frame(1.0, 1.0), (640.0, 560.0));

        let (x, y) = Region::from_center(100.0, 50.0, 20.0).to_frame(0.5, 0.25);
        assert_relative_eq!(x, 100.0);
        assert_relative_eq!(y, 45.0);
    }

    #[test]
    fn crop_pads_with_black() {
        let mut frame = Frame::new(40, 20);
        frame.clear(Color::WHITE);

        let image = crop(&frame, Region::enclosing(frame.resolution()), Resolution::new(8, 8));
        // the frame covers the middle half of the square
        assert_eq!(image.get_pixel(4, 0).0, [0, 0, 0]);
        assert_eq!(image.get_pixel(4, 4).0, [255, 255, 255]);
        assert_eq!(image.get_pixel(4, 7).0, [0, 0, 0]);

        let far_away = Region::from_center(-100.0, -100.0, 10.0);
        let outside = crop(&frame, far_away, Resolution::new(4, 4));
        assert!(outside.pixels().all(|p| p.0 == [0, 0, 0]));
    }

    #[test]
    fn tensor_layouts() {
        let mut image = RgbImage::new(2, 1);
        image.put_pixel(1, 0, image::Rgb([255, 0, 51]));

        let nchw = to_tensor(&image, InputLayout::Nchw).unwrap();
        assert_eq!(nchw.shape(), &[1, 3, 1, 2]);
        assert_eq!(nchw.as_slice::<f32>().unwrap(), &[0.0, 1.0, 0.0, 0.0, 0.0, 0.2]);

        let nhwc = to_tensor(&image, InputLayout::Nhwc).unwrap();
        assert_eq!(nhwc.shape(), &[1, 1, 2, 3]);
        assert_eq!(nhwc.as_slice::<f32>().unwrap(), &[0.0, 0.0, 0.0, 1.0, 0.0, 0.2]);
    }

    #[test]
    fn load_rejects_bad_paths() {
        let error = Network::load(Path::new("hand_landmark.tflite"), 1).err().unwrap();
        assert!(error.to_string().contains("`.onnx` extension"), "{error}");
        assert!(Network::load(Path::new("does/not/exist.onnx"), 1).is_err());
    }

    #[test]
    fn load_rejects_garbage() {
        assert!(Network::from_onnx(b"not a network", 1).is_err());
    }
}
