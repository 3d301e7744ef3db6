//! The detection worker thread.
//!
//! A [`DetectionWorker`] owns the [`LandmarkModel`] and moves through four states:
//!
//! - **Starting**: the model is created. Failure is fatal and reported through the startup
//!   [`promise`] before any frame is accepted.
//! - **Running**: the worker waits for input with a timeout, processes frames and publishes results
//!   without ever blocking on the output channel.
//! - **Draining**: entered when the Sentinel arrives or the capture side disappears. Nothing is
//!   read or published anymore; the model is dropped.
//! - **Stopped**: the thread returns its [`WorkerReport`].
//!
//! A single bad frame (a model error, or a panic in the model or in rendering) yields a zero-hand
//! result and the loop continues.

use std::{
    any::Any,
    fmt,
    panic::{catch_unwind, AssertUnwindSafe},
    thread::{self, JoinHandle},
    time::Duration,
};

use crossbeam::channel::{Receiver, RecvTimeoutError};

use crate::{
    bridge::{DetectEnd, Disconnected, Message, Sent},
    detection::{self, DetectionResult},
    drop::defer,
    error::{ModelInitError, PipelineError},
    image::Frame,
    model::LandmarkModel,
    telemetry::Telemetry,
};

/// Creates a connected pair of [`Promise`] and [`PromiseHandle`].
pub fn promise<T>() -> (Promise<T>, PromiseHandle<T>) {
    // Capacity of 1 means that `Promise::fulfill` will never block.
    let (sender, recv) = crossbeam::channel::bounded(1);
    (Promise { inner: sender }, PromiseHandle { recv })
}

/// An empty slot that can be filled with a `T`, fulfilling the promise.
///
/// Fulfilling a [`Promise`] lets the connected [`PromiseHandle`] retrieve the value.
pub struct Promise<T> {
    inner: crossbeam::channel::Sender<T>,
}

impl<T> Promise<T> {
    /// Fulfills the promise with a value, consuming it.
    ///
    /// This never blocks or fails. If the connected [`PromiseHandle`] was dropped, `value` is
    /// dropped and nothing happens.
    pub fn fulfill(self, value: T) {
        self.inner.send(value).ok();
    }
}

/// A handle connected to a [`Promise`] that will eventually resolve to a value of type `T`.
pub struct PromiseHandle<T> {
    recv: crossbeam::channel::Receiver<T>,
}

impl<T> PromiseHandle<T> {
    /// Blocks the calling thread until the [`Promise`] is fulfilled.
    ///
    /// Fails if the [`Promise`] was dropped without being fulfilled, eg. because the thread
    /// holding it panicked.
    pub fn block(self) -> Result<T, PromiseDropped> {
        self.recv.recv().map_err(|_| PromiseDropped { _priv: () })
    }

    /// Returns whether the associated [`Promise`] has been fulfilled.
    ///
    /// If this returns `true`, calling [`PromiseHandle::block`] on `self` will return immediately.
    pub fn is_fulfilled(&self) -> bool {
        !self.recv.is_empty()
    }
}

/// An error returned by [`PromiseHandle::block`] indicating that the connected [`Promise`] object
/// was dropped without being fulfilled.
#[derive(Debug, Clone, Copy)]
pub struct PromiseDropped {
    _priv: (),
}

/// Lifecycle of the detection worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Starting,
    Running,
    Draining,
    Stopped,
}

impl WorkerState {
    fn can_become(self, next: WorkerState) -> bool {
        use WorkerState::*;
        matches!(
            (self, next),
            (Starting, Running) | (Starting, Stopped) | (Running, Draining) | (Draining, Stopped)
        )
    }
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Statistics returned by the worker thread when it stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerReport {
    /// Frames taken from the input channel.
    pub frames: u64,
    /// Frames whose detection failed or panicked.
    pub detection_errors: u64,
    /// Results placed into the output channel.
    pub published: u64,
    /// Results lost to the output channel's overflow policy.
    pub dropped_results: u64,
}

/// Worker settings.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    name: String,
    poll_interval: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            name: "detection".into(),
            poll_interval: Duration::from_millis(50),
        }
    }
}

impl WorkerConfig {
    /// Sets the name of the worker thread.
    pub fn name(self, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..self
        }
    }

    /// Sets how long the worker waits for input before checking its channel again.
    pub fn poll_interval(self, poll_interval: Duration) -> Self {
        Self {
            poll_interval,
            ..self
        }
    }
}

/// The worker's side of the bridge.
pub type WorkerEnd = DetectEnd<Frame, DetectionResult>;

/// Handle to the detection worker thread.
pub struct DetectionWorker {
    handle: JoinHandle<WorkerReport>,
    /// Disconnects when the thread exits, normally or by unwinding. Nothing is ever sent.
    exited: Receiver<()>,
    telemetry: Telemetry,
}

impl DetectionWorker {
    /// Spawns the worker thread and waits until its model is initialized.
    ///
    /// `init` runs on the worker thread. If it fails (or panics), the thread exits without
    /// touching `end` and the error is returned here.
    pub fn spawn<M, F>(
        config: WorkerConfig,
        init: F,
        end: WorkerEnd,
        telemetry: Telemetry,
    ) -> Result<Self, PipelineError>
    where
        M: LandmarkModel + 'static,
        F: FnOnce() -> Result<M, ModelInitError> + Send + 'static,
    {
        let (started, startup) = promise();
        let (exit_guard, exited) = crossbeam::channel::bounded::<()>(0);
        let poll_interval = config.poll_interval;
        let tel = telemetry.clone();
        let handle = thread::Builder::new()
            .name(config.name)
            .spawn(move || {
                let _exit_guard = exit_guard;
                let mut state = StateMachine::new(tel);
                let model = match catch_unwind(AssertUnwindSafe(init)) {
                    Ok(Ok(model)) => model,
                    Ok(Err(e)) => {
                        started.fulfill(Err(e));
                        state.enter(WorkerState::Stopped);
                        return WorkerReport::default();
                    }
                    Err(payload) => {
                        started.fulfill(Err(ModelInitError::new(format_args!(
                            "model initialization panicked: {}",
                            panic_message(&*payload)
                        ))));
                        state.enter(WorkerState::Stopped);
                        return WorkerReport::default();
                    }
                };
                started.fulfill(Ok(()));
                run(model, end, poll_interval, &mut state)
            })
            .map_err(PipelineError::Spawn)?;

        let startup = startup.block().unwrap_or_else(|_| {
            Err(ModelInitError::new("detection worker exited during startup"))
        });
        if let Err(e) = startup {
            // the thread is about to return, its report is empty
            handle.join().ok();
            telemetry.error(format_args!("{e}"));
            return Err(e.into());
        }

        Ok(Self {
            handle,
            exited,
            telemetry,
        })
    }

    /// Returns whether the worker thread is still running.
    pub fn is_alive(&self) -> bool {
        !self.handle.is_finished()
    }

    /// Waits up to `timeout` for the worker thread to exit.
    ///
    /// A worker that is still running afterwards is detached and reported as
    /// [`PipelineError::ShutdownTimeout`]; this is an abnormal shutdown. A worker that panicked
    /// outside of frame processing is reported as [`PipelineError::WorkerUnresponsive`].
    pub fn join_timeout(self, timeout: Duration) -> Result<WorkerReport, PipelineError> {
        if let Err(RecvTimeoutError::Timeout) = self.exited.recv_timeout(timeout) {
            self.telemetry.error(format_args!(
                "abnormal shutdown: detection worker did not stop within {timeout:?}, \
                 detaching it"
            ));
            return Err(PipelineError::ShutdownTimeout {
                timeout_ms: timeout.as_millis(),
            });
        }

        match self.handle.join() {
            Ok(report) => Ok(report),
            Err(payload) => {
                self.telemetry.error(format_args!(
                    "detection worker panicked: {}",
                    panic_message(&*payload)
                ));
                Err(PipelineError::WorkerUnresponsive)
            }
        }
    }
}

/// Tracks and logs the worker state.
struct StateMachine {
    state: WorkerState,
    telemetry: Telemetry,
}

impl StateMachine {
    fn new(telemetry: Telemetry) -> Self {
        telemetry.debug(format_args!("worker {}", WorkerState::Starting));
        Self {
            state: WorkerState::Starting,
            telemetry,
        }
    }

    fn enter(&mut self, next: WorkerState) {
        debug_assert!(
            self.state.can_become(next),
            "invalid worker transition {} -> {}",
            self.state,
            next
        );
        self.telemetry
            .debug(format_args!("worker {} -> {}", self.state, next));
        self.state = next;
    }
}

/// The `Running` and `Draining` states.
fn run<M: LandmarkModel>(
    mut model: M,
    mut end: WorkerEnd,
    poll_interval: Duration,
    state: &mut StateMachine,
) -> WorkerReport {
    let telemetry = state.telemetry.clone();
    let _guard = defer({
        let telemetry = telemetry.clone();
        move || telemetry.trace(format_args!("worker thread exiting"))
    });

    state.enter(WorkerState::Running);
    let mut report = WorkerReport::default();
    let mut fps = telemetry.fps_counter("detect");
    let mut t_detect = telemetry.timer("detect");
    let mut t_process = telemetry.timer("process");

    loop {
        let frame = match end.recv_timeout(poll_interval) {
            Ok(None) => continue,
            Ok(Some(Message::Data(frame))) => frame,
            Ok(Some(Message::Sentinel)) => {
                telemetry.debug(format_args!("received sentinel"));
                break;
            }
            Err(Disconnected) => {
                telemetry.debug(format_args!("capture side disconnected"));
                break;
            }
        };
        report.frames += 1;

        let hands = match t_detect.time(|| catch_unwind(AssertUnwindSafe(|| model.detect(&frame))))
        {
            Ok(Ok(hands)) => hands,
            Ok(Err(e)) => {
                report.detection_errors += 1;
                telemetry.warn(format_args!("detection failed, assuming no hands: {e:#}"));
                Vec::new()
            }
            Err(payload) => {
                report.detection_errors += 1;
                telemetry.warn(format_args!(
                    "detection panicked, assuming no hands: {}",
                    panic_message(&*payload)
                ));
                Vec::new()
            }
        };

        // the frame is consumed by drawing, keep a copy for the fallback result
        let fallback = frame.clone();
        let processed = t_process
            .time(|| catch_unwind(AssertUnwindSafe(|| detection::process(frame, &hands))));
        let result = match processed {
            Ok(result) => result,
            Err(payload) => {
                report.detection_errors += 1;
                telemetry.warn(format_args!(
                    "processing {} hands panicked, assuming no hands: {}",
                    hands.len(),
                    panic_message(&*payload)
                ));
                DetectionResult::empty(fallback)
            }
        };
        match end.publish(result) {
            Ok(Sent::Delivered) => report.published += 1,
            Ok(Sent::Evicted) => {
                report.published += 1;
                report.dropped_results += 1;
                telemetry.trace(format_args!("result channel full, evicted stale result"));
            }
            Ok(Sent::Dropped) => {
                report.dropped_results += 1;
                telemetry.trace(format_args!("result channel full, dropped new result"));
            }
            Err(Disconnected) => {
                telemetry.debug(format_args!("display side disconnected"));
                break;
            }
        }

        fps.tick_with([&t_detect, &t_process]);
    }

    state.enter(WorkerState::Draining);
    drop(model);
    drop(end);
    state.enter(WorkerState::Stopped);
    telemetry.debug(format_args!("worker report: {report:?}"));
    report
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s
    } else {
        "<non-string panic payload>"
    }
}

#[cfg(test)]
mod tests {
    use std::{
        io,
        sync::{
            atomic::{AtomicUsize, Ordering},
            Arc,
        },
        time::Instant,
    };

    use crate::{
        bridge::{frame_bridge, CaptureEnd, Overflow},
        hand::{test_hands, Hand},
    };

    use super::*;

    const POLL: Duration = Duration::from_millis(10);

    /// Stands in for a worker thread that never looks at its channel again.
    fn spawn_named<T: Send + 'static>(
        name: &str,
        f: impl FnOnce() -> T + Send + 'static,
    ) -> io::Result<JoinHandle<T>> {
        thread::Builder::new().name(name.into()).spawn(f)
    }

    enum Step {
        Hands(Vec<Hand>),
        Fail,
        Panic,
    }

    struct ScriptedModel {
        script: Vec<Step>,
        calls: Arc<AtomicUsize>,
    }

    impl LandmarkModel for ScriptedModel {
        fn detect(&mut self, _frame: &Frame) -> anyhow::Result<Vec<Hand>> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            match self.script.get(call % self.script.len().max(1)) {
                None => Ok(Vec::new()),
                Some(Step::Hands(hands)) => Ok(hands.clone()),
                Some(Step::Fail) => anyhow::bail!("scripted failure"),
                Some(Step::Panic) => std::panic::resume_unwind(Box::new("scripted panic")),
            }
        }
    }

    fn start(
        script: Vec<Step>,
    ) -> (
        DetectionWorker,
        CaptureEnd<Frame, DetectionResult>,
        Arc<AtomicUsize>,
    ) {
        let (capture, end) = frame_bridge(Overflow::EvictOldest, Overflow::EvictOldest);
        let calls = Arc::new(AtomicUsize::new(0));
        let model = ScriptedModel {
            script,
            calls: calls.clone(),
        };
        let worker = DetectionWorker::spawn(
            WorkerConfig::default().poll_interval(POLL),
            move || Ok(model),
            end,
            Telemetry::detect(),
        )
        .unwrap();
        (worker, capture, calls)
    }

    fn wait_for_result(capture: &CaptureEnd<Frame, DetectionResult>) -> DetectionResult {
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            if let Some(result) = capture.try_recv().unwrap() {
                return result;
            }
            assert!(Instant::now() < deadline, "no result within 5s");
            thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn promise_is_fulfilled() {
        let (p, handle) = promise();
        assert!(!handle.is_fulfilled());
        p.fulfill(());
        assert!(handle.is_fulfilled());
        handle.block().unwrap();

        let (p, handle) = promise::<()>();
        drop(p);
        handle.block().unwrap_err();
    }

    #[test]
    fn state_transitions() {
        use WorkerState::*;
        assert!(Starting.can_become(Running));
        assert!(Starting.can_become(Stopped));
        assert!(Running.can_become(Draining));
        assert!(Draining.can_become(Stopped));
        assert!(!Running.can_become(Stopped));
        assert!(!Stopped.can_become(Running));
        assert!(!Draining.can_become(Running));
    }

    #[test]
    fn init_failure_is_reported() {
        let (_capture, end) = frame_bridge(Overflow::EvictOldest, Overflow::EvictOldest);
        let result = DetectionWorker::spawn(
            WorkerConfig::default(),
            || Err::<ScriptedModel, _>(ModelInitError::new("missing weights")),
            end,
            Telemetry::detect(),
        );
        match result {
            Err(PipelineError::ModelInit(e)) => assert_eq!(e.message(), "missing weights"),
            Err(e) => panic!("unexpected error: {e}"),
            Ok(_) => panic!("worker started without a model"),
        }
    }

    #[test]
    fn init_panic_is_reported() {
        let (_capture, end) = frame_bridge(Overflow::EvictOldest, Overflow::EvictOldest);
        let result = DetectionWorker::spawn(
            WorkerConfig::default(),
            || -> Result<ScriptedModel, ModelInitError> {
                std::panic::resume_unwind(Box::new("no GPU"))
            },
            end,
            Telemetry::detect(),
        );
        match result {
            Err(PipelineError::ModelInit(e)) => assert!(e.message().contains("no GPU"), "{e}"),
            _ => panic!("expected a model init error"),
        }
    }

    #[test]
    fn processes_frames() {
        let (worker, capture, calls) =
            start(vec![Step::Hands(vec![test_hands::right_thumb_and_index()])]);

        capture.send(Frame::new(64, 48)).unwrap();
        let result = wait_for_result(&capture);
        assert_eq!(result.finger_count, 2);
        assert_eq!(result.frame.resolution(), Frame::new(64, 48).resolution());

        capture.send_sentinel(Duration::ZERO).unwrap();
        let report = worker.join_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(report.frames, 1);
        assert_eq!(report.published, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn frame_failures_yield_empty_results() {
        let (worker, capture, _calls) = start(vec![
            Step::Fail,
            Step::Panic,
            Step::Hands(vec![test_hands::right_thumb_and_index()]),
        ]);

        let mut counts = Vec::new();
        for _ in 0..3 {
            capture.send(Frame::new(32, 32)).unwrap();
            let result = wait_for_result(&capture);
            assert_eq!(result.mask.is_empty(), result.finger_count == 0);
            counts.push(result.finger_count);
        }
        assert_eq!(counts, [0, 0, 2]);
        assert!(worker.is_alive());

        capture.send_sentinel(Duration::ZERO).unwrap();
        let report = worker.join_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(report.detection_errors, 2);
    }

    #[test]
    fn sentinel_stops_worker_within_poll_interval() {
        let (worker, capture, calls) = start(vec![]);

        // let the worker settle into its receive loop
        thread::sleep(POLL * 3);
        capture.send_sentinel(Duration::ZERO).unwrap();
        let start = Instant::now();
        let report = worker.join_timeout(Duration::from_secs(5)).unwrap();
        assert!(start.elapsed() < POLL * 20, "{:?}", start.elapsed());
        assert_eq!(report, WorkerReport::default());

        // frames sent after the sentinel are never processed
        let _ = capture.send(Frame::new(8, 8));
        thread::sleep(POLL * 3);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn dropping_capture_end_stops_worker() {
        let (worker, capture, _calls) = start(vec![]);
        drop(capture);
        worker.join_timeout(Duration::from_secs(5)).unwrap();
    }

    #[test]
    fn join_timeout_wakes_up_when_thread_exits() {
        let (exit_guard, exited) = crossbeam::channel::bounded::<()>(0);
        let handle = spawn_named("short-lived", move || {
            let _exit_guard = exit_guard;
            thread::sleep(POLL * 2);
            WorkerReport {
                frames: 3,
                ..WorkerReport::default()
            }
        })
        .unwrap();
        let worker = DetectionWorker {
            handle,
            exited,
            telemetry: Telemetry::detect(),
        };

        let start = Instant::now();
        let report = worker.join_timeout(Duration::from_secs(30)).unwrap();
        assert_eq!(report.frames, 3);
        assert!(start.elapsed() < Duration::from_secs(5), "{:?}", start.elapsed());
    }

    #[test]
    fn join_timeout_detaches_stuck_thread() {
        let (release, blocked) = crossbeam::channel::bounded::<()>(0);
        let (exit_guard, exited) = crossbeam::channel::bounded::<()>(0);
        let handle = spawn_named("stuck", move || {
            let _exit_guard = exit_guard;
            blocked.recv().ok();
            WorkerReport::default()
        })
        .unwrap();
        let worker = DetectionWorker {
            handle,
            exited,
            telemetry: Telemetry::detect(),
        };
        assert!(worker.is_alive());

        let start = Instant::now();
        match worker.join_timeout(Duration::from_millis(30)) {
            Err(PipelineError::ShutdownTimeout { timeout_ms: 30 }) => {}
            other => panic!("unexpected result: {other:?}"),
        }
        assert!(start.elapsed() >= Duration::from_millis(30));
        drop(release);
    }
}
