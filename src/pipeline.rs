//! The capture side of the two-stage pipeline.
//!
//! [`Pipeline`] owns the capture end of the frame bridge and the handle of the detection worker.
//! The worker thread owns the other end, so when either thread goes away the other one finds out
//! through its channel.
//!
//! Nothing in here blocks on the worker while it is running: [`Pipeline::submit`] and
//! [`Pipeline::try_result`] return immediately. Only [`Pipeline::shutdown`] waits, and only for a
//! bounded amount of time.

use std::time::Duration;

use crate::{
    bridge::{frame_bridge, CaptureEnd, Disconnected, Overflow, Sent},
    detection::DetectionResult,
    error::{ModelInitError, PipelineError},
    image::Frame,
    model::LandmarkModel,
    telemetry::Telemetry,
    worker::{DetectionWorker, WorkerConfig, WorkerReport},
};

/// Pipeline settings.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    input_overflow: Overflow,
    output_overflow: Overflow,
    poll_interval: Duration,
    join_timeout: Duration,
    capture: Telemetry,
    detect: Telemetry,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            input_overflow: Overflow::EvictOldest,
            output_overflow: Overflow::EvictOldest,
            poll_interval: Duration::from_millis(50),
            join_timeout: Duration::from_secs(2),
            capture: Telemetry::capture(),
            detect: Telemetry::detect(),
        }
    }
}

impl PipelineConfig {
    /// Sets the overflow policy of the frame channel (capture to worker).
    pub fn input_overflow(self, input_overflow: Overflow) -> Self {
        Self {
            input_overflow,
            ..self
        }
    }

    /// Sets the overflow policy of the result channel (worker to capture).
    pub fn output_overflow(self, output_overflow: Overflow) -> Self {
        Self {
            output_overflow,
            ..self
        }
    }

    /// Sets how long the worker waits for a frame before polling again.
    ///
    /// This bounds how long the worker takes to notice the Sentinel while idle.
    pub fn poll_interval(self, poll_interval: Duration) -> Self {
        Self {
            poll_interval,
            ..self
        }
    }

    /// Sets how long [`Pipeline::shutdown`] waits for the worker to exit.
    pub fn join_timeout(self, join_timeout: Duration) -> Self {
        Self {
            join_timeout,
            ..self
        }
    }

    /// Sets the telemetry handles of the capture stage and the detection worker.
    pub fn telemetry(self, capture: Telemetry, detect: Telemetry) -> Self {
        Self {
            capture,
            detect,
            ..self
        }
    }

    #[inline]
    pub fn capture_telemetry(&self) -> &Telemetry {
        &self.capture
    }

    #[inline]
    pub fn detect_telemetry(&self) -> &Telemetry {
        &self.detect
    }
}

/// A running detection worker plus the capture end of its bridge.
pub struct Pipeline {
    capture: CaptureEnd<Frame, DetectionResult>,
    worker: Option<DetectionWorker>,
    join_timeout: Duration,
    telemetry: Telemetry,
}

impl Pipeline {
    /// Starts the detection worker and waits for its model to be initialized.
    ///
    /// `init` creates the model on the worker thread.
    pub fn start<M, F>(config: PipelineConfig, init: F) -> Result<Self, PipelineError>
    where
        M: LandmarkModel + 'static,
        F: FnOnce() -> Result<M, ModelInitError> + Send + 'static,
    {
        let (capture, detect) = frame_bridge(config.input_overflow, config.output_overflow);
        config.capture.debug(format_args!(
            "starting pipeline: input {:?}, output {:?}, poll interval {:?}",
            config.input_overflow, config.output_overflow, config.poll_interval
        ));
        let worker = DetectionWorker::spawn(
            WorkerConfig::default().poll_interval(config.poll_interval),
            init,
            detect,
            config.detect,
        )?;

        Ok(Self {
            capture,
            worker: Some(worker),
            join_timeout: config.join_timeout,
            telemetry: config.capture,
        })
    }

    /// Hands a frame to the worker without blocking.
    ///
    /// A full channel is resolved by its overflow policy. Fails only if the worker is gone.
    pub fn submit(&mut self, frame: Frame) -> Result<Sent, PipelineError> {
        match self.capture.send(frame) {
            Ok(sent) => {
                if sent != Sent::Delivered {
                    self.telemetry
                        .trace(format_args!("frame channel full: {sent:?}"));
                }
                Ok(sent)
            }
            Err(Disconnected) => Err(self.worker_gone()),
        }
    }

    /// Takes the most recent result, if one is waiting.
    pub fn try_result(&mut self) -> Result<Option<DetectionResult>, PipelineError> {
        self.capture.try_recv().map_err(|Disconnected| self.worker_gone())
    }

    /// Returns whether the detection worker thread is still running.
    pub fn is_worker_alive(&self) -> bool {
        self.worker.as_ref().map_or(false, DetectionWorker::is_alive)
    }

    /// Stops the worker by sending the Sentinel and waits for it to exit.
    pub fn shutdown(mut self) -> Result<WorkerReport, PipelineError> {
        self.stop()
    }

    fn worker_gone(&self) -> PipelineError {
        self.telemetry
            .error(format_args!("detection worker is no longer running"));
        PipelineError::WorkerUnresponsive
    }

    fn stop(&mut self) -> Result<WorkerReport, PipelineError> {
        let Some(worker) = self.worker.take() else {
            return Err(PipelineError::WorkerUnresponsive);
        };

        match self.capture.send_sentinel(self.join_timeout) {
            Ok(Sent::Dropped) => self.telemetry.warn(format_args!(
                "frame channel stayed full, worker did not take the sentinel"
            )),
            Ok(_) => self.telemetry.debug(format_args!("sentinel sent")),
            Err(Disconnected) => self
                .telemetry
                .debug(format_args!("worker exited before the sentinel was sent")),
        }

        let report = worker.join_timeout(self.join_timeout)?;
        self.telemetry.info(format_args!(
            "detection worker stopped: {} frames, {} failed, {} results published, {} dropped",
            report.frames, report.detection_errors, report.published, report.dropped_results
        ));
        Ok(report)
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        if self.worker.is_some() {
            if let Err(e) = self.stop() {
                self.telemetry
                    .error(format_args!("pipeline shutdown failed: {e}"));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{
            atomic::{AtomicBool, Ordering},
            Arc,
        },
        thread,
        time::Instant,
    };

    use crate::hand::{test_hands, Hand};

    use super::*;

    struct FixedModel(Vec<Hand>);

    impl LandmarkModel for FixedModel {
        fn detect(&mut self, _frame: &Frame) -> anyhow::Result<Vec<Hand>> {
            Ok(self.0.clone())
        }
    }

    /// Blocks inside `detect` until released, like a model stuck in an external call.
    struct StuckModel(Arc<AtomicBool>);

    impl LandmarkModel for StuckModel {
        fn detect(&mut self, _frame: &Frame) -> anyhow::Result<Vec<Hand>> {
            while !self.0.load(Ordering::SeqCst) {
                thread::sleep(Duration::from_millis(1));
            }
            Ok(Vec::new())
        }
    }

    fn config() -> PipelineConfig {
        PipelineConfig::default()
            .poll_interval(Duration::from_millis(10))
            .join_timeout(Duration::from_secs(2))
    }

    fn wait_for_result(pipeline: &mut Pipeline) -> DetectionResult {
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            if let Some(result) = pipeline.try_result().unwrap() {
                return result;
            }
            assert!(Instant::now() < deadline, "no result within 5s");
            thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn round_trip_and_shutdown() {
        let hands = vec![test_hands::right_thumb_and_index()];
        let mut pipeline = Pipeline::start(config(), move || Ok(FixedModel(hands))).unwrap();
        assert!(pipeline.is_worker_alive());
        assert_eq!(pipeline.try_result().unwrap().map(|r| r.finger_count), None);

        pipeline.submit(Frame::new(64, 64)).unwrap();
        assert_eq!(wait_for_result(&mut pipeline).finger_count, 2);

        let report = pipeline.shutdown().unwrap();
        assert_eq!(report.frames, 1);
    }

    #[test]
    fn model_init_error_is_fatal() {
        let result = Pipeline::start(config(), || {
            Err::<FixedModel, _>(ModelInitError::new("bad graph"))
        });
        match result {
            Err(e @ PipelineError::ModelInit(_)) => assert_eq!(e.exit_code(), 2),
            _ => panic!("expected a model init error"),
        }
    }

    #[test]
    fn stuck_worker_is_abnormal_shutdown() {
        let release = Arc::new(AtomicBool::new(false));
        let model = StuckModel(release.clone());
        let mut pipeline = Pipeline::start(
            config().join_timeout(Duration::from_millis(50)),
            move || Ok(model),
        )
        .unwrap();

        pipeline.submit(Frame::new(8, 8)).unwrap();
        // wait until the worker took the frame and is stuck in `detect`
        thread::sleep(Duration::from_millis(50));

        let start = Instant::now();
        match pipeline.shutdown() {
            Err(e @ PipelineError::ShutdownTimeout { .. }) => assert_ne!(e.exit_code(), 0),
            other => panic!("unexpected shutdown result: {other:?}"),
        }
        assert!(start.elapsed() < Duration::from_secs(2));
        release.store(true, Ordering::SeqCst);
    }

    #[test]
    fn drop_stops_worker() {
        let pipeline = Pipeline::start(config(), || Ok(FixedModel(Vec::new()))).unwrap();
        drop(pipeline);
    }
}
