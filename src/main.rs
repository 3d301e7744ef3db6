use std::process::ExitCode;

use clap::Parser;
use handtrace::{
    config::Args,
    dashboard::{DisplayLoop, RenderSink, WINDOW_TITLE},
    error::{CameraUnavailable, PipelineError},
    gui::{HeadlessSink, WindowSink},
    model::OnnxHandModel,
    pipeline::Pipeline,
    telemetry::{self, Telemetry},
    video::{FrameSequence, FrameSource, Webcam},
};

fn main() -> ExitCode {
    telemetry::init_logger();
    let args = Args::parse();

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{e}");
            ExitCode::from(e.exit_code())
        }
    }
}

fn run(args: &Args) -> Result<(), PipelineError> {
    let config = args.pipeline_config();
    let capture = config.capture_telemetry().clone();
    let detect = config.detect_telemetry().clone();

    // the model is loaded before the camera is opened, so a broken model never holds the device
    let (palm_path, landmark_path) = (args.palm_model.clone(), args.model.clone());
    let model_options = args.model_options();
    let mut pipeline = Pipeline::start(config, move || {
        OnnxHandModel::load(palm_path, landmark_path, model_options, detect)
    })?;

    let source = open_source(args, &capture)?;
    let sink: Box<dyn RenderSink> = if args.headless {
        Box::new(HeadlessSink::new(capture.clone()))
    } else {
        Box::new(WindowSink::new(WINDOW_TITLE))
    };

    let mut display = DisplayLoop::new(source, sink, args.dashboard_config(), capture.clone());
    let outcome = display.run(&mut pipeline);
    // release the camera before waiting for the worker
    drop(display);

    match outcome {
        Ok(reason) => {
            capture.info(format_args!("shutting down: {reason:?}"));
            pipeline.shutdown()?;
            Ok(())
        }
        Err(e) => {
            if let Err(shutdown) = pipeline.shutdown() {
                capture.warn(format_args!("shutdown after failure: {shutdown}"));
            }
            Err(e)
        }
    }
}

fn open_source(args: &Args, capture: &Telemetry) -> Result<Box<dyn FrameSource>, PipelineError> {
    if let Some(dir) = &args.images {
        let sequence = FrameSequence::from_dir(dir)
            .map_err(|e| CameraUnavailable::from_anyhow(&e))?
            .with_interval(args.frame_interval());
        capture.info(format_args!(
            "playing back {} images from '{}'",
            sequence.remaining(),
            dir.display()
        ));
        return Ok(Box::new(sequence));
    }

    let webcam = Webcam::open(args.webcam_options(), capture.clone())?;
    Ok(Box::new(webcam))
}
