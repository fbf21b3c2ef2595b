//! Pixet Acquisition Logic
//!
//! Session state machine, acquisition worker and frame consumer.
//!
//! ## Threads
//!
//! Each session runs two threads:
//!
//! - the **worker** makes the single blocking `do_advanced_acquisition` call and
//!   reports its outcome;
//! - the **frame consumer** receives events over an `mpsc` channel in delivery
//!   order and is the only place where frame-side state (counter, per-frame
//!   status flip) changes.
//!
//! SDK callback threads only fetch the completed frame and send it to the
//! consumer. Shared state sits behind a `parking_lot::Mutex`; a generation
//! number tags every event so a detached worker from an older session cannot
//! touch a newer one.
//!
//! Callbacks may land after the blocking call has returned. The consumer
//! therefore applies the worker's outcome only once the event channel has
//! disconnected, i.e. once the worker and every callback clone are gone.
//!
//! A worker detached by a forced terminate stays tracked until it leaves the
//! SDK; no new session is prepared on the device before that.
//!
//! ## Status transitions
//!
//! ```text
//! READY --start_acq--> RUNNING --frame (per-frame trigger)--> READY
//! RUNNING --stop_acq / worker done--> READY
//! any --SDK fault / panic / geometry mismatch / forced terminate--> ERROR
//! ERROR --hard_reset--> READY
//! ```

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use pixet_core::limits::validate_exposure;
use pixet_core::{BufferManager, CameraError, CameraResult};
use tracing::{debug, error, info, trace, warn};

use crate::components::bridge::{Delivery, FrameBridge};
use crate::error::SdkError;
use crate::family::{FamilyCaps, TriggerMode};
use crate::sdk::{AcquiredFrame, AcquisitionRequest, FrameCallback, PixetDevice};

/// Camera-level acquisition status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CameraStatus {
    /// A fault is latched until a hard reset.
    Error,
    /// Idle, or waiting for the next per-frame start.
    Ready,
    /// Acquiring.
    Running,
}

impl CameraStatus {
    /// Name used in logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            CameraStatus::Error => "Error",
            CameraStatus::Ready => "Ready",
            CameraStatus::Running => "Running",
        }
    }
}

/// Requested acquisition parameters, captured into a session at prepare time.
#[derive(Debug, Clone, Copy, PartialEq)]
struct AcqSettings {
    nb_frames: u64,
    exposure_s: f64,
    trigger_mode: TriggerMode,
}

impl Default for AcqSettings {
    fn default() -> Self {
        Self {
            nb_frames: 1,
            exposure_s: 1.0,
            trigger_mode: TriggerMode::Normal,
        }
    }
}

#[derive(Debug)]
struct SessionState {
    status: CameraStatus,
    acquired_frames: u64,
    dropped_frames: u64,
    prepared: bool,
    aborting: bool,
    worker_active: bool,
    fault: Option<String>,
    generation: u64,
    trigger_mode: TriggerMode,
}

impl SessionState {
    fn latch_fault(&mut self, reason: String) {
        error!(reason = %reason, "Camera fault");
        self.status = CameraStatus::Error;
        self.fault.get_or_insert(reason);
    }
}

enum WorkerOutcome {
    Completed,
    Failed(SdkError),
    Panicked(String),
}

enum AcqEvent {
    FrameCompleted {
        generation: u64,
        hw_index: u64,
        frame: Box<dyn AcquiredFrame>,
    },
    FrameUnavailable {
        generation: u64,
        hw_index: u64,
        error: SdkError,
    },
    Finished {
        generation: u64,
        outcome: WorkerOutcome,
    },
}

struct ActiveSession {
    generation: u64,
    request: AcquisitionRequest,
    buffer: Option<Weak<dyn BufferManager>>,
    /// Handed to the worker at start; dropped on teardown otherwise.
    event_tx: Option<mpsc::Sender<AcqEvent>>,
    dispatcher: Option<JoinHandle<()>>,
    worker: Option<JoinHandle<()>>,
    worker_done: Option<mpsc::Receiver<()>>,
}

/// Threads of a session whose worker outlived the stop timeout.
struct DetachedSession {
    generation: u64,
    worker: JoinHandle<()>,
    worker_done: mpsc::Receiver<()>,
    dispatcher: Option<JoinHandle<()>>,
}

/// Acquisition state machine for one detector.
pub struct PixetAcquisition {
    device: Arc<dyn PixetDevice>,
    caps: &'static FamilyCaps,
    shape: (usize, usize),
    state: Arc<Mutex<SessionState>>,
    settings: Mutex<AcqSettings>,
    buffer: Mutex<Option<Weak<dyn BufferManager>>>,
    session: Mutex<Option<ActiveSession>>,
    detached: Mutex<Option<DetachedSession>>,
    stop_timeout: Duration,
    start_settle: Duration,
}

impl PixetAcquisition {
    /// `shape` is the detector geometry as (height, width).
    pub fn new(
        device: Arc<dyn PixetDevice>,
        caps: &'static FamilyCaps,
        shape: (usize, usize),
        stop_timeout: Duration,
        start_settle: Duration,
    ) -> Self {
        Self {
            device,
            caps,
            shape,
            state: Arc::new(Mutex::new(SessionState {
                status: CameraStatus::Ready,
                acquired_frames: 0,
                dropped_frames: 0,
                prepared: false,
                aborting: false,
                worker_active: false,
                fault: None,
                generation: 0,
                trigger_mode: TriggerMode::Normal,
            })),
            settings: Mutex::new(AcqSettings::default()),
            buffer: Mutex::new(None),
            session: Mutex::new(None),
            detached: Mutex::new(None),
            stop_timeout,
            start_settle,
        }
    }

    // =========================================================================
    // Settings
    // =========================================================================

    /// Attach the host buffer manager used by subsequent sessions.
    pub fn attach_buffer(&self, buffer: Weak<dyn BufferManager>) {
        *self.buffer.lock() = Some(buffer);
    }

    /// Frames requested for the next session.
    pub fn set_nb_frames(&self, nb_frames: u64) {
        self.settings.lock().nb_frames = nb_frames;
    }

    /// Frames requested for the next session.
    pub fn nb_frames(&self) -> u64 {
        self.settings.lock().nb_frames
    }

    /// Exposure per frame in seconds, validated against the detector limits.
    pub fn set_exposure(&self, exposure_s: f64) -> CameraResult<()> {
        self.settings.lock().exposure_s = validate_exposure(exposure_s)?;
        Ok(())
    }

    /// Exposure per frame in seconds.
    pub fn exposure(&self) -> f64 {
        self.settings.lock().exposure_s
    }

    /// Trigger mode for the next session.
    pub fn set_trigger_mode(&self, mode: TriggerMode) {
        self.settings.lock().trigger_mode = mode;
    }

    /// Trigger mode for the next session.
    pub fn trigger_mode(&self) -> TriggerMode {
        self.settings.lock().trigger_mode
    }

    // =========================================================================
    // Status
    // =========================================================================

    /// Current status. Never touches the hardware.
    pub fn status(&self) -> CameraStatus {
        self.state.lock().status
    }

    /// Frames acquired in the current session.
    pub fn nb_acquired_frames(&self) -> u64 {
        self.state.lock().acquired_frames
    }

    /// Frames dropped because the host buffer had been released.
    pub fn nb_dropped_frames(&self) -> u64 {
        self.state.lock().dropped_frames
    }

    /// Reason of the latched fault, if any.
    pub fn fault(&self) -> Option<String> {
        self.state.lock().fault.clone()
    }

    /// Whether `prepare_acq` has run and the session has not ended yet.
    pub fn is_prepared(&self) -> bool {
        self.state.lock().prepared
    }

    /// True while a worker's blocking SDK call is in flight, including a worker
    /// detached by a forced terminate.
    pub fn is_worker_active(&self) -> bool {
        self.state.lock().worker_active || self.detached.lock().is_some()
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Create a new session: reset the counter, register the frame callback and
    /// start the frame consumer.
    ///
    /// A no-op when a session is already prepared.
    pub fn prepare_acq(&self) -> CameraResult<()> {
        let mut session = self.session.lock();
        {
            let state = self.state.lock();
            if state.status == CameraStatus::Error {
                return Err(CameraError::InvalidState(format!(
                    "camera fault latched ({}); hard reset required",
                    state.fault.as_deref().unwrap_or("unknown")
                )));
            }
            if state.prepared {
                debug!("prepare_acq: session already prepared");
                return Ok(());
            }
            if state.worker_active {
                return Err(CameraError::InvalidState(
                    "previous acquisition still running".into(),
                ));
            }
        }
        if !self.reap_detached(self.stop_timeout) {
            return Err(CameraError::InvalidState(
                "a detached acquisition worker is still inside the SDK".into(),
            ));
        }

        // The previous session finished on its own; reap its threads.
        if let Some(finished) = session.take() {
            self.join_session(finished)?;
        }

        let settings = *self.settings.lock();
        let generation = {
            let mut state = self.state.lock();
            state.generation += 1;
            state.generation
        };
        let request = AcquisitionRequest {
            frame_count: settings.nb_frames,
            exposure_s: settings.exposure_s,
            acq_type: self.caps.acq_type,
            trigger_mode: settings.trigger_mode,
        };
        let buffer = self.buffer.lock().clone();

        let (event_tx, event_rx) = mpsc::channel();
        let bridge = FrameBridge::new(buffer.clone(), self.caps.pixel_source, self.shape);
        let consumer = FrameConsumer {
            state: Arc::clone(&self.state),
            device: Arc::downgrade(&self.device),
            bridge,
            generation,
        };
        let dispatcher = thread::Builder::new()
            .name("pixet-frames".into())
            .spawn(move || consumer.run(event_rx))?;

        let callback_tx = event_tx.clone();
        let device = Arc::downgrade(&self.device);
        let callback: FrameCallback = Arc::new(move |hw_index| {
            let Some(device) = device.upgrade() else {
                return;
            };
            let event = match device.last_acq_frame() {
                Ok(frame) => AcqEvent::FrameCompleted {
                    generation,
                    hw_index,
                    frame,
                },
                Err(error) => AcqEvent::FrameUnavailable {
                    generation,
                    hw_index,
                    error,
                },
            };
            // The consumer is gone once the session is torn down.
            let _ = callback_tx.send(event);
        });

        if let Err(e) = self.device.register_frame_callback(callback) {
            // The callback was dropped with the error; this is the last sender.
            drop(event_tx);
            let _ = dispatcher.join();
            return Err(e.into());
        }

        {
            let mut state = self.state.lock();
            state.acquired_frames = 0;
            state.dropped_frames = 0;
            state.prepared = true;
            state.aborting = false;
            state.trigger_mode = settings.trigger_mode;
        }

        *session = Some(ActiveSession {
            generation,
            request,
            buffer,
            event_tx: Some(event_tx),
            dispatcher: Some(dispatcher),
            worker: None,
            worker_done: None,
        });

        info!(
            generation,
            frames = settings.nb_frames,
            exposure_s = settings.exposure_s,
            trigger = settings.trigger_mode.as_str(),
            "Acquisition prepared"
        );
        Ok(())
    }

    /// Start the burst, or release the next frame in per-frame trigger mode.
    pub fn start_acq(&self) -> CameraResult<()> {
        let mut session_guard = self.session.lock();
        {
            let state = self.state.lock();
            if state.status == CameraStatus::Error {
                return Err(CameraError::InvalidState(
                    "camera fault latched; hard reset required".into(),
                ));
            }
            if !state.prepared {
                return Err(CameraError::InvalidState(
                    "start_acq called without prepare_acq".into(),
                ));
            }
        }
        let session = session_guard.as_mut().ok_or_else(|| {
            CameraError::InvalidState("start_acq called without prepare_acq".into())
        })?;

        if session.worker.is_none() {
            {
                let mut state = self.state.lock();
                state.status = CameraStatus::Running;
                state.worker_active = true;
            }
            match self.spawn_worker(session) {
                Ok(()) => thread::sleep(self.start_settle),
                Err(e) => {
                    self.state.lock().latch_fault(e.to_string());
                    return Err(e);
                }
            }
        } else {
            self.state.lock().status = CameraStatus::Running;
        }

        if let Err(e) = self.device.do_software_trigger() {
            let err = CameraError::from(e);
            self.state.lock().latch_fault(err.to_string());
            return Err(err);
        }
        trace!(
            next_frame = self.nb_acquired_frames() + 1,
            "Software trigger issued"
        );
        Ok(())
    }

    fn spawn_worker(&self, session: &mut ActiveSession) -> CameraResult<()> {
        let event_tx = session.event_tx.take().ok_or_else(|| {
            CameraError::InvalidState("session event channel already closed".into())
        })?;
        let (done_tx, done_rx) = mpsc::channel::<()>();
        let device = Arc::clone(&self.device);
        let request = session.request;
        let buffer = session.buffer.clone();
        let generation = session.generation;

        let worker = thread::Builder::new()
            .name("pixet-acq".into())
            .spawn(move || {
                // Dropped on exit; the stopping thread waits for the disconnect.
                let _done = done_tx;
                debug!(generation, "Acquisition worker started");

                let result = panic::catch_unwind(AssertUnwindSafe(|| {
                    if let Some(buffer) = buffer.as_ref().and_then(Weak::upgrade) {
                        buffer.set_start_timestamp(Utc::now());
                    }
                    device.do_advanced_acquisition(&request)
                }));
                let outcome = match result {
                    Ok(Ok(())) => WorkerOutcome::Completed,
                    Ok(Err(e)) => WorkerOutcome::Failed(e),
                    Err(payload) => WorkerOutcome::Panicked(panic_message(payload.as_ref())),
                };
                let _ = event_tx.send(AcqEvent::Finished {
                    generation,
                    outcome,
                });
                debug!(generation, "Acquisition worker finished");
            })?;

        session.worker = Some(worker);
        session.worker_done = Some(done_rx);
        info!(generation, frames = request.frame_count, "Acquisition started");
        Ok(())
    }

    /// Abort the session: unregister the callback, abort the SDK call and join
    /// the worker within the stop timeout.
    ///
    /// On timeout the worker is detached, the status latches ERROR and
    /// [`CameraError::ForcedTerminate`] is returned.
    pub fn stop_acq(&self) -> CameraResult<()> {
        let mut session_guard = self.session.lock();
        let session = session_guard.take();
        self.state.lock().aborting = true;

        if let Err(e) = self.device.unregister_frame_callback() {
            warn!(error = %e, "Failed to unregister frame callback");
        }

        let result = match session {
            Some(session) => {
                if session.worker.is_some() {
                    if let Err(e) = self.device.abort_operation() {
                        warn!(error = %e, "SDK abort failed");
                    }
                }
                self.join_session(session)
            }
            None => Ok(()),
        };

        let mut state = self.state.lock();
        state.generation += 1;
        state.prepared = false;
        state.aborting = false;
        match &result {
            Ok(()) => {
                state.worker_active = false;
                if state.status != CameraStatus::Error {
                    state.status = CameraStatus::Ready;
                }
            }
            Err(e) => state.latch_fault(e.to_string()),
        }
        info!(
            frames = state.acquired_frames,
            status = state.status.as_str(),
            "Acquisition stopped"
        );
        result
    }

    fn join_session(&self, mut session: ActiveSession) -> CameraResult<()> {
        // Once started, the worker holds the session's only sender.
        drop(session.event_tx.take());

        if let (Some(worker), Some(done)) = (session.worker.take(), session.worker_done.take()) {
            match done.recv_timeout(self.stop_timeout) {
                Err(RecvTimeoutError::Timeout) => {
                    error!(
                        generation = session.generation,
                        timeout = ?self.stop_timeout,
                        "Acquisition worker did not stop; detaching"
                    );
                    // The consumer exits on its own once the worker leaves the SDK.
                    *self.detached.lock() = Some(DetachedSession {
                        generation: session.generation,
                        worker,
                        worker_done: done,
                        dispatcher: session.dispatcher.take(),
                    });
                    return Err(CameraError::ForcedTerminate(self.stop_timeout));
                }
                Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                    if worker.join().is_err() {
                        error!("Acquisition worker panicked outside the SDK call");
                    }
                }
            }
        }

        if let Some(dispatcher) = session.dispatcher.take() {
            if dispatcher.join().is_err() {
                error!("Frame consumer panicked");
            }
        }
        Ok(())
    }

    /// Wait up to `wait` for a detached worker to leave the SDK and reap its
    /// threads. Returns `true` when no detached worker remains.
    fn reap_detached(&self, wait: Duration) -> bool {
        let mut detached = self.detached.lock();
        let Some(pending) = detached.as_ref() else {
            return true;
        };
        if let Err(RecvTimeoutError::Timeout) = pending.worker_done.recv_timeout(wait) {
            warn!(
                generation = pending.generation,
                "Detached acquisition worker still inside the SDK"
            );
            return false;
        }
        if let Some(pending) = detached.take() {
            if pending.worker.join().is_err() {
                error!("Detached acquisition worker panicked");
            }
            if let Some(dispatcher) = pending.dispatcher {
                if dispatcher.join().is_err() {
                    error!("Frame consumer panicked");
                }
            }
            info!(generation = pending.generation, "Detached acquisition worker reaped");
        }
        true
    }

    /// Abort any session and clear a latched fault.
    ///
    /// Waits up to the stop timeout for a detached worker. If it is still
    /// inside the SDK afterwards, `prepare_acq` keeps failing until it exits.
    pub fn hard_reset(&self) -> CameraResult<()> {
        if let Err(e) = self.stop_acq() {
            warn!(error = %e, "Stop during hard reset failed");
        }
        self.reap_detached(self.stop_timeout);
        let mut state = self.state.lock();
        state.status = CameraStatus::Ready;
        state.fault = None;
        state.worker_active = false;
        info!("Hard reset: fault cleared");
        Ok(())
    }

    /// Whether a session (prepared or running) is held.
    pub fn has_session(&self) -> bool {
        self.session.lock().is_some()
    }
}

impl Drop for PixetAcquisition {
    fn drop(&mut self) {
        if self.has_session() {
            if let Err(e) = self.stop_acq() {
                error!("Error stopping acquisition on drop: {}", e);
            }
        }
    }
}

/// Single consumer of a session's events.
struct FrameConsumer {
    state: Arc<Mutex<SessionState>>,
    device: Weak<dyn PixetDevice>,
    bridge: FrameBridge,
    generation: u64,
}

impl FrameConsumer {
    fn run(self, events: mpsc::Receiver<AcqEvent>) {
        let mut outcome = None;
        // Ends when the worker and every callback clone have dropped their sender.
        for event in events {
            match event {
                AcqEvent::FrameCompleted {
                    generation,
                    hw_index,
                    frame,
                } => {
                    if generation == self.generation {
                        self.on_frame(hw_index, frame);
                    }
                }
                AcqEvent::FrameUnavailable {
                    generation,
                    hw_index,
                    error,
                } => {
                    if generation == self.generation {
                        self.with_state(|state| {
                            state.latch_fault(format!("frame {}: {}", hw_index, error))
                        });
                    }
                }
                AcqEvent::Finished {
                    generation,
                    outcome: finished,
                } => {
                    if generation == self.generation {
                        self.unregister_callback();
                        outcome = Some(finished);
                    }
                }
            }
        }
        if let Some(outcome) = outcome {
            self.on_finished(outcome);
        }
        trace!(generation = self.generation, "Frame consumer exiting");
    }

    /// Drop the device's callback so the channel can disconnect. Skipped once
    /// the session is superseded, as the callback may belong to a newer one.
    fn unregister_callback(&self) {
        if self.state.lock().generation != self.generation {
            return;
        }
        if let Some(device) = self.device.upgrade() {
            if let Err(e) = device.unregister_frame_callback() {
                warn!(error = %e, "Failed to unregister frame callback");
            }
        }
    }

    fn with_state(&self, f: impl FnOnce(&mut SessionState)) {
        let mut state = self.state.lock();
        if state.generation == self.generation {
            f(&mut state);
        }
    }

    fn on_frame(&self, hw_index: u64, frame: Box<dyn AcquiredFrame>) {
        let slot = {
            let state = self.state.lock();
            if state.generation != self.generation || state.status == CameraStatus::Error {
                return;
            }
            state.acquired_frames
        };

        let delivery = self.bridge.deliver(slot, frame.as_ref());
        // Release the SDK frame before touching shared state.
        drop(frame);

        self.with_state(|state| {
            match delivery {
                Ok(Delivery::Delivered) | Ok(Delivery::NoBuffer) => {}
                Ok(Delivery::BufferReleased) => {
                    warn!(frame = slot, "Host buffer released; frame dropped");
                    state.dropped_frames += 1;
                }
                Err(e) => {
                    state.latch_fault(e.to_string());
                    return;
                }
            }
            state.acquired_frames = state.acquired_frames.max(hw_index);
            if state.trigger_mode == TriggerMode::SoftwareStart
                && state.status == CameraStatus::Running
            {
                state.status = CameraStatus::Ready;
            }
            debug!(frame = slot, acquired = state.acquired_frames, "Frame acquired");
        });
    }

    fn on_finished(&self, outcome: WorkerOutcome) {
        self.with_state(|state| {
            state.prepared = false;
            state.worker_active = false;
            match outcome {
                WorkerOutcome::Completed => {}
                WorkerOutcome::Failed(e) if state.aborting || e.is_aborted() => {
                    debug!("Acquisition aborted");
                }
                WorkerOutcome::Failed(e) => state.latch_fault(e.to_string()),
                WorkerOutcome::Panicked(msg) => {
                    state.latch_fault(format!("acquisition worker panicked: {}", msg))
                }
            }
            if state.status != CameraStatus::Error {
                state.status = CameraStatus::Ready;
            }
            info!(frames = state.acquired_frames, "Acquisition finished");
        });
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}
