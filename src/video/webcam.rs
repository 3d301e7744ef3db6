//! V4L2 webcam access.
//!
//! Only V4L2 `VIDEO_CAPTURE` devices yielding JFIF JPEG or Motion JPEG frames are supported.

use std::env;

use anyhow::bail;
use linuxvideo::{
    format::{FrameIntervals, FrameSizes, PixFormat, Pixelformat},
    stream::ReadStream,
    BufType, CapabilityFlags, Device, Fract,
};

use crate::{
    error::{CameraUnavailable, FrameReadFailure},
    image::{Frame, Resolution},
    telemetry::Telemetry,
    timer::Timer,
};

use super::FrameSource;

/// Indicates whether to prefer a higher resolution or frame rate.
///
/// By default, [`ParamPreference::Resolution`] is used, selecting the maximum resolution at the
/// desired frame rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParamPreference {
    /// Prefer increased resolution over higher frame rates.
    #[default]
    Resolution,
    /// Prefer higher frame rate over higher image resolution.
    Framerate,
}

#[derive(Debug, Default, Clone, Copy)]
struct FramePrefs {
    resolution: Option<Resolution>,
    fps: Option<u32>,
    pref: ParamPreference,
}

/// Device selection and format negotiation options.
#[derive(Debug, Default, Clone)]
pub struct WebcamOptions {
    name: Option<String>,
    frame: FramePrefs,
}

impl WebcamOptions {
    /// Sets the name of the webcam device to open.
    ///
    /// If no webcam with the given name can be found, opening the webcam will result in an error.
    #[inline]
    pub fn name(self, name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..self
        }
    }

    /// Sets the desired image resolution.
    ///
    /// A lower resolution might be selected if the webcam cannot deliver the desired resolution.
    #[inline]
    pub fn resolution(mut self, resolution: Resolution) -> Self {
        self.frame.resolution = Some(resolution);
        self
    }

    /// Sets the desired frame rate.
    ///
    /// A lower frame rate might be selected if the webcam cannot deliver the desired one.
    #[inline]
    pub fn fps(mut self, fps: u32) -> Self {
        self.frame.fps = Some(fps);
        self
    }

    /// Selects whether to prefer a higher resolution or frame rate.
    ///
    /// When the camera cannot deliver both, this controls which one is maintained.
    #[inline]
    pub fn prefer(mut self, pref: ParamPreference) -> Self {
        self.frame.pref = pref;
        self
    }
}

#[derive(Clone, Copy)]
struct FrameFormat {
    resolution: Resolution,
    frame_interval: Fract,
}

impl FrameFormat {
    fn fps(&self) -> f32 {
        1.0 / self.frame_interval.as_f32()
    }
}

fn negotiate_format(
    device: &Device,
    prefs: FramePrefs,
    telemetry: &Telemetry,
) -> anyhow::Result<(PixFormat, Fract)> {
    let mut pixel_format = None;
    for format in device.formats(BufType::VIDEO_CAPTURE) {
        let format = format?;
        if format.pixelformat() == Pixelformat::JPEG || format.pixelformat() == Pixelformat::MJPG {
            pixel_format = Some(format.pixelformat());
            break;
        }
    }

    let Some(pixel_format) = pixel_format else {
        bail!("no supported pixel format found");
    };

    let mut formats = Vec::new();
    match device.frame_sizes(pixel_format)? {
        FrameSizes::Discrete(sizes) => {
            for size in sizes {
                let intervals =
                    match device.frame_intervals(pixel_format, size.width(), size.height())? {
                        FrameIntervals::Discrete(intervals) => intervals,
                        FrameIntervals::Stepwise(_) | FrameIntervals::Continuous(_) => {
                            bail!("stepwise or continuous frame rates are not supported")
                        }
                    };
                for rate in intervals {
                    formats.push(FrameFormat {
                        resolution: Resolution::new(size.width(), size.height()),
                        frame_interval: *rate.fract(),
                    });
                }
            }
        }
        FrameSizes::Stepwise(_) | FrameSizes::Continuous(_) => {
            bail!("stepwise or continuous resolutions are not supported");
        }
    }

    match negotiate(&formats, prefs, telemetry) {
        Some(fmt) => Ok((
            PixFormat::new(
                fmt.resolution.width(),
                fmt.resolution.height(),
                pixel_format,
            ),
            fmt.frame_interval,
        )),
        None => bail!("failed to negotiate a webcam format"),
    }
}

/// Picks the best format, dropping the less preferred constraint first when nothing matches.
fn negotiate(
    formats: &[FrameFormat],
    mut prefs: FramePrefs,
    telemetry: &Telemetry,
) -> Option<FrameFormat> {
    loop {
        if let Some(fmt) = negotiate_step(formats, prefs) {
            return Some(fmt);
        }

        telemetry.debug(format_args!("failed to negotiate format with prefs {prefs:?}"));
        let relaxed = match prefs.pref {
            ParamPreference::Resolution => {
                prefs.fps.take().is_some() || prefs.resolution.take().is_some()
            }
            ParamPreference::Framerate => {
                prefs.resolution.take().is_some() || prefs.fps.take().is_some()
            }
        };
        if !relaxed {
            return None;
        }
        telemetry.debug(format_args!("retrying with new prefs {prefs:?}"));
    }
}

fn negotiate_step(formats: &[FrameFormat], prefs: FramePrefs) -> Option<FrameFormat> {
    let mut formats = formats
        .iter()
        .filter(|fmt| {
            prefs.resolution.map_or(true, |res| {
                fmt.resolution.width() >= res.width() && fmt.resolution.height() >= res.height()
            }) && prefs.fps.map_or(true, |fps| fmt.fps().round() >= fps as f32)
        })
        .copied()
        .collect::<Vec<_>>();
    match prefs.pref {
        ParamPreference::Resolution => formats.sort_by(|a, b| {
            a.resolution
                .num_pixels()
                .cmp(&b.resolution.num_pixels())
                .then(a.fps().total_cmp(&b.fps()))
        }),
        ParamPreference::Framerate => formats.sort_by(|a, b| {
            a.fps()
                .total_cmp(&b.fps())
                .then(a.resolution.num_pixels().cmp(&b.resolution.num_pixels()))
        }),
    }
    formats.last().copied()
}

/// A webcam yielding a stream of [`Frame`]s.
pub struct Webcam {
    stream: ReadStream,
    width: u32,
    height: u32,
    telemetry: Telemetry,
    t_dequeue: Timer,
    t_decode: Timer,
}

const ENV_VAR_WEBCAM_NAME: &str = "HANDTRACE_WEBCAM_NAME";

impl Webcam {
    /// Opens the first supported webcam found.
    ///
    /// If `options` name no device, the `HANDTRACE_WEBCAM_NAME` environment variable may select
    /// one. This can block for a significant amount of time while the webcam initializes (on the
    /// order of hundreds of milliseconds).
    pub fn open(options: WebcamOptions, telemetry: Telemetry) -> Result<Self, CameraUnavailable> {
        let name = options.name.clone().or_else(|| {
            let name = env::var(ENV_VAR_WEBCAM_NAME).ok()?;
            telemetry.debug(format_args!(
                "webcam override: `{ENV_VAR_WEBCAM_NAME}` is set to '{name}'"
            ));
            Some(name)
        });

        let devices = linuxvideo::list().map_err(CameraUnavailable::new)?;
        for res in devices {
            match res {
                Ok(dev) => match Self::open_impl(dev, name.as_deref(), &options, &telemetry) {
                    Ok(Some(webcam)) => return Ok(webcam),
                    Ok(None) => {}
                    Err(e) => telemetry.debug(format_args!("{e:#}")),
                },
                Err(e) => telemetry.warn(format_args!("{e}")),
            }
        }

        Err(match name {
            Some(name) => {
                CameraUnavailable::new(format_args!("no supported webcam named '{name}'"))
            }
            None => CameraUnavailable::new("no supported webcam device found"),
        })
    }

    fn open_impl(
        dev: Device,
        name: Option<&str>,
        options: &WebcamOptions,
        telemetry: &Telemetry,
    ) -> anyhow::Result<Option<Self>> {
        let caps = dev.capabilities()?;
        if let Some(name) = name {
            if caps.card() != name {
                return Ok(None);
            }
        }

        let cap_flags = caps.device_capabilities();
        let path = dev.path()?;
        telemetry.debug(format_args!(
            "device {} ({}) capabilities: {:?}",
            caps.card(),
            path.display(),
            cap_flags,
        ));

        if !cap_flags.contains(CapabilityFlags::VIDEO_CAPTURE) {
            return Ok(None);
        }

        let (pixfmt, fract) = negotiate_format(&dev, options.frame, telemetry)?;

        let capture = dev.video_capture(pixfmt)?;

        let format = capture.format();
        let width = format.width();
        let height = format.height();

        let actual = capture.set_frame_interval(fract)?;

        telemetry.info(format_args!(
            "opened {} ({}), {}x{} @ {:.1}Hz",
            caps.card(),
            path.display(),
            width,
            height,
            1.0 / actual.as_f32(),
        ));

        let stream = capture.into_stream(2)?;

        Ok(Some(Self {
            stream,
            width,
            height,
            telemetry: telemetry.clone(),
            t_dequeue: telemetry.timer("dequeue"),
            t_decode: telemetry.timer("decode"),
        }))
    }

}

impl FrameSource for Webcam {
    /// Returns profiling timers for webcam access and decoding.
    fn timers(&self) -> Vec<&Timer> {
        vec![&self.t_dequeue, &self.t_decode]
    }

    /// Reads the next frame from the camera, blocking until one is available.
    ///
    /// A frame that fails to decode is replaced by a black one. Webcams occasionally deliver
    /// corrupted MJPG data, and skipping the frame would only add latency.
    fn read(&mut self) -> Result<Frame, FrameReadFailure> {
        let dequeue_guard = self.t_dequeue.start();
        self.stream
            .dequeue(|buf| {
                drop(dequeue_guard);
                let frame = match self.t_decode.time(|| Frame::decode_jpeg(&buf)) {
                    Ok(frame) => frame,
                    Err(e) => {
                        self.telemetry
                            .error(format_args!("webcam decode error: {e}"));
                        Frame::new(self.width, self.height)
                    }
                };
                Ok(frame)
            })
            .map_err(FrameReadFailure::device)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn format(width: u32, height: u32, fps: u32) -> FrameFormat {
        FrameFormat {
            resolution: Resolution::new(width, height),
            frame_interval: Fract::new(1, fps),
        }
    }

    /// Resolution and rounded frame rate of a negotiated format.
    fn summary(fmt: Option<FrameFormat>) -> Option<(Resolution, u32)> {
        fmt.map(|fmt| (fmt.resolution, fmt.fps().round() as u32))
    }

    fn prefs(
        resolution: Option<Resolution>,
        fps: Option<u32>,
        pref: ParamPreference,
    ) -> FramePrefs {
        FramePrefs {
            resolution,
            fps,
            pref,
        }
    }

    #[test]
    fn negotiation_prefers_resolution_or_framerate() {
        let formats = [
            format(640, 480, 30),
            format(640, 480, 60),
            format(1280, 720, 30),
            format(1920, 1080, 5),
        ];
        let telemetry = Telemetry::capture();

        let fmt = negotiate(
            &formats,
            prefs(None, Some(30), ParamPreference::Resolution),
            &telemetry,
        );
        assert_eq!(summary(fmt), Some((Resolution::new(1280, 720), 30)));

        let fmt = negotiate(
            &formats,
            prefs(Some(Resolution::RES_VGA), None, ParamPreference::Framerate),
            &telemetry,
        );
        assert_eq!(summary(fmt), Some((Resolution::new(640, 480), 60)));
    }

    #[test]
    fn negotiation_relaxes_constraints() {
        let formats = [format(640, 480, 30), format(1280, 720, 10)];
        let telemetry = Telemetry::capture();

        // 720p@30 doesn't exist: keep the resolution, drop the frame rate
        let fmt = negotiate(
            &formats,
            prefs(
                Some(Resolution::RES_720P),
                Some(30),
                ParamPreference::Resolution,
            ),
            &telemetry,
        );
        assert_eq!(summary(fmt), Some((Resolution::new(1280, 720), 10)));

        // ...or keep the frame rate, drop the resolution
        let fmt = negotiate(
            &formats,
            prefs(
                Some(Resolution::RES_720P),
                Some(30),
                ParamPreference::Framerate,
            ),
            &telemetry,
        );
        assert_eq!(summary(fmt), Some((Resolution::new(640, 480), 30)));

        let any = prefs(None, None, ParamPreference::Resolution);
        assert!(negotiate(&[], any, &telemetry).is_none());
    }
}
