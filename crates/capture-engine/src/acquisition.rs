//! The acquisition state machine.
//!
//! ```text
//! INIT ──► ARMED ──► RUNNING ──► DRAINING ──► STOPPED
//!  │         │                                   ▲
//!  └─────────┴──────── startup failure ──────────┘
//! ```
//!
//! One thread polls every camera in registry order, once per trigger cycle,
//! and hands each frame to that camera's writer. A retrieve timeout on any
//! camera ends the run for all of them: the trigger fans out identically to
//! every camera, so a partial recording would not be synchronized.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use trigcam_camera::{
    CameraRegistry, CameraSettings, CameraSystem, Frame, FrameSource, PixelFormat,
    ResolvedCamera, TriggerMode,
};
use trigcam_common::clock::{RateController, RecordingClock};
use trigcam_common::config::AppConfig;
use trigcam_common::error::{TrigcamError, TrigcamResult};
use trigcam_trigger::{TriggerConnector, TriggerController};
use trigcam_writer::{AsyncFrameWriter, DefaultEncoderFactory, EncoderFactory};

use crate::overlay;
use crate::preview::PreviewCompositor;
use crate::report::{CameraReport, SessionOutcome, SessionReport, StopReason};
use crate::session::{RecordingSession, TakeDirectory};
use crate::show::list_cameras;
use crate::telemetry::AcquisitionStats;

/// Camera input line wired to the trigger output.
const TRIGGER_INPUT_LINE: u8 = 1;

const STATE_LOG_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AcquisitionState {
    Init,
    Armed,
    Running,
    Draining,
    Stopped,
}

/// Asks a session to stop at the next cycle boundary. A request made before
/// the session starts recording ends it before the first cycle.
#[derive(Debug, Clone, Default)]
pub struct StopHandle {
    flag: Arc<AtomicBool>,
}

impl StopHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request_stop(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_requested(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    fn reset(&self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

/// Stop conditions checked at cycle boundaries, in addition to the
/// external stop signal.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RunLimits {
    pub max_cycles: Option<u64>,
    pub max_duration: Option<Duration>,
}

impl RunLimits {
    pub fn cycles(max_cycles: u64) -> Self {
        Self {
            max_cycles: Some(max_cycles),
            max_duration: None,
        }
    }

    fn reached(&self, cycles: u64, elapsed: Duration) -> Option<StopReason> {
        if self.max_cycles.is_some_and(|max| cycles >= max) {
            return Some(StopReason::CycleLimit);
        }
        if self.max_duration.is_some_and(|max| elapsed >= max) {
            return Some(StopReason::DurationLimit);
        }
        None
    }
}

struct ActiveCamera {
    resolved: ResolvedCamera,
    source: Box<dyn FrameSource>,
}

impl ActiveCamera {
    fn name(&self) -> &str {
        &self.resolved.descriptor.name
    }
}

/// Composition root: cameras, one writer per camera, and the trigger.
pub struct AcquisitionLoop {
    config: AppConfig,
    registry: CameraRegistry,
    cameras: Box<dyn CameraSystem>,
    connector: Box<dyn TriggerConnector>,
    encoders: Box<dyn EncoderFactory>,
    preview: Option<PreviewCompositor>,
    take: TakeDirectory,
    state: AcquisitionState,
    stop: StopHandle,
    last_stats: Option<AcquisitionStats>,
}

impl AcquisitionLoop {
    /// Validate the configuration and create the take directory. No hardware
    /// is touched until [`record`](Self::record).
    pub fn new(
        config: AppConfig,
        cameras: Box<dyn CameraSystem>,
        connector: Box<dyn TriggerConnector>,
    ) -> TrigcamResult<Self> {
        config.validate()?;
        let registry = CameraRegistry::new(config.cameras.clone())?;
        let take = TakeDirectory::create(
            &config.output_root,
            &config.take_name,
            &RecordingClock::start(),
        )?;
        Ok(Self {
            config,
            registry,
            cameras,
            connector,
            encoders: Box::new(DefaultEncoderFactory),
            preview: None,
            take,
            state: AcquisitionState::Init,
            stop: StopHandle::new(),
            last_stats: None,
        })
    }

    pub fn with_encoders(mut self, encoders: Box<dyn EncoderFactory>) -> Self {
        self.encoders = encoders;
        self
    }

    pub fn with_preview(mut self, preview: PreviewCompositor) -> Self {
        self.preview = Some(preview);
        self
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn state(&self) -> AcquisitionState {
        self.state
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    pub fn take_dir(&self) -> &Path {
        self.take.path()
    }

    pub fn next_run_index(&self) -> u32 {
        self.take.next_run_index()
    }

    /// Counters of the most recent run.
    pub fn last_stats(&self) -> Option<&AcquisitionStats> {
        self.last_stats.as_ref()
    }

    /// Set the rate for the next run, clamped into the configured bounds.
    /// Returns the rate actually applied.
    pub fn set_fps(&mut self, fps: f64) -> f64 {
        let applied = self.config.fps_bounds.clamp(fps);
        if applied != fps {
            tracing::warn!(
                requested = fps,
                applied,
                min_fps = self.config.fps_bounds.min_fps,
                max_fps = self.config.fps_bounds.max_fps,
                "Requested fps clamped into bounds"
            );
        }
        self.config.fps = applied;
        applied
    }

    /// Run one complete session: arm, record until stopped or a limit is
    /// reached, drain, and write the run report.
    ///
    /// Startup failures (unknown camera, trigger unreachable) are returned
    /// as errors. A camera timeout during recording is not an error: the run
    /// is drained and reported with an aborted outcome.
    pub fn record(&mut self, limits: RunLimits) -> TrigcamResult<SessionReport> {
        if !matches!(
            self.state,
            AcquisitionState::Init | AcquisitionState::Stopped
        ) {
            return Err(TrigcamError::invalid_state(format!(
                "cannot start recording in state {:?}",
                self.state
            )));
        }
        self.transition(AcquisitionState::Init);

        let mut cameras = match self.open_cameras() {
            Ok(cameras) => cameras,
            Err(e) => {
                self.transition(AcquisitionState::Stopped);
                return Err(e);
            }
        };
        let names: Vec<String> = cameras.iter().map(|c| c.name().to_string()).collect();
        let session = match self.take.begin_run(&names, self.config.codec) {
            Ok(session) => session,
            Err(e) => {
                close_all(&mut cameras);
                self.transition(AcquisitionState::Stopped);
                return Err(e);
            }
        };
        let mut writers = match self.open_writers(&session, &cameras) {
            Ok(writers) => writers,
            Err(e) => {
                close_all(&mut cameras);
                self.transition(AcquisitionState::Stopped);
                return Err(e);
            }
        };

        self.transition(AcquisitionState::Armed);
        let mut trigger = match self.arm_trigger() {
            Ok(trigger) => trigger,
            Err(e) => {
                close_all(&mut cameras);
                for writer in &mut writers {
                    finish_writer(writer);
                }
                self.transition(AcquisitionState::Stopped);
                return Err(e);
            }
        };

        self.transition(AcquisitionState::Running);
        tracing::info!(
            run = session.run_index,
            fps = self.config.fps,
            cameras = cameras.len(),
            "Recording"
        );
        let started = Instant::now();
        let mut stats = AcquisitionStats::new(names);
        let outcome = self.run_cycles(&mut cameras, &writers, &mut stats, limits, started);
        let duration = started.elapsed();

        // The trigger must be silent before any camera is released.
        self.transition(AcquisitionState::Draining);
        let trigger_result = trigger.end();
        if let Err(e) = &trigger_result {
            tracing::error!(error = %e, "Trigger did not stop cleanly");
        }
        close_all(&mut cameras);
        let camera_reports = drain_writers(&mut writers, &cameras, &stats);

        let report = SessionReport {
            run_index: session.run_index,
            take_dir: session.take_dir.clone(),
            started_at: session.started_at,
            duration_secs: duration.as_secs_f64(),
            cycles: stats.cycles,
            fps: self.config.fps,
            trigger: trigger.variant(),
            outcome,
            cameras: camera_reports,
        };
        self.finish(&session, &report, stats);
        trigger_result?;
        Ok(report)
    }

    /// Reaching STOPPED consumes a pending stop request, so one request ends
    /// exactly one run, including a run that has not reached RUNNING yet.
    fn transition(&mut self, next: AcquisitionState) {
        tracing::info!(from = ?self.state, to = ?next, "Acquisition state");
        if next == AcquisitionState::Stopped {
            self.stop.reset();
        }
        self.state = next;
    }

    /// INIT: resolve every discovered camera against the registry, then open
    /// and configure each one for hardware triggering.
    fn open_cameras(&self) -> TrigcamResult<Vec<ActiveCamera>> {
        let resolved = list_cameras(self.cameras.as_ref(), &self.registry)?;
        let mut active = Vec::with_capacity(resolved.len());
        for camera in resolved {
            tracing::info!(
                index = camera.index,
                name = %camera.descriptor.name,
                serial = %camera.device.serial,
                model = %camera.device.model,
                "Using camera"
            );
            match self.prepare_camera(&camera) {
                Ok(source) => active.push(ActiveCamera {
                    resolved: camera,
                    source,
                }),
                Err(e) => {
                    close_all(&mut active);
                    return Err(e);
                }
            }
        }
        Ok(active)
    }

    fn prepare_camera(&self, camera: &ResolvedCamera) -> TrigcamResult<Box<dyn FrameSource>> {
        let mut source = self.cameras.create(&camera.device)?;
        source.open()?;
        let settings = CameraSettings {
            exposure_us: camera.descriptor.exposure_us,
            gain: camera.descriptor.gain,
            pixel_format: PixelFormat::for_sensor(camera.device.is_color),
            trigger_mode: TriggerMode::Hardware {
                line: TRIGGER_INPUT_LINE,
                max_fps: self.config.fps_bounds.max_fps,
            },
        };
        let configured = source
            .configure(&settings)
            .and_then(|_| source.start_grabbing(self.config.grab.into()));
        if let Err(e) = configured {
            if let Err(close_err) = source.close() {
                tracing::warn!(error = %close_err, "Camera close failed after configure error");
            }
            return Err(e);
        }
        Ok(source)
    }

    fn open_writers(
        &self,
        session: &RecordingSession,
        cameras: &[ActiveCamera],
    ) -> TrigcamResult<Vec<AsyncFrameWriter>> {
        let mut writers = Vec::with_capacity(cameras.len());
        for (camera, path) in cameras.iter().zip(&session.outputs) {
            let writer = self
                .encoders
                .open(path, self.config.fps, self.config.codec)
                .and_then(|encoder| {
                    AsyncFrameWriter::new(
                        camera.name(),
                        encoder,
                        self.config.writer_queue_capacity,
                    )
                });
            match writer {
                Ok(writer) => writers.push(writer),
                Err(e) => {
                    for writer in &mut writers {
                        finish_writer(writer);
                    }
                    return Err(e);
                }
            }
        }
        Ok(writers)
    }

    /// ARMED: connect, probe, and start the trigger.
    fn arm_trigger(&self) -> TrigcamResult<TriggerController> {
        let mut trigger = TriggerController::connect(
            &self.config.trigger,
            self.config.fps_bounds,
            self.config.fps,
            self.connector.as_ref(),
        )?;
        trigger.ping();
        trigger.start()?;
        Ok(trigger)
    }

    /// RUNNING: one iteration per trigger cycle until a stop condition holds
    /// at a cycle boundary or a camera fails.
    fn run_cycles(
        &mut self,
        cameras: &mut [ActiveCamera],
        writers: &[AsyncFrameWriter],
        stats: &mut AcquisitionStats,
        limits: RunLimits,
        started: Instant,
    ) -> SessionOutcome {
        let timeout = Duration::from_millis(self.config.camera_timeout_ms);
        let diagnostics = self.config.diagnostics;
        let mut state_log = RateController::new(STATE_LOG_INTERVAL);
        let mut preview_set: Vec<Frame> = Vec::with_capacity(cameras.len());

        loop {
            if self.stop.is_requested() {
                return SessionOutcome::Completed {
                    reason: StopReason::Requested,
                };
            }
            if let Some(reason) = limits.reached(stats.cycles, started.elapsed()) {
                return SessionOutcome::Completed { reason };
            }

            let cycle = stats.cycles;
            let want_preview = self
                .preview
                .as_ref()
                .is_some_and(|p| p.is_due(Instant::now()));
            preview_set.clear();

            for (index, (camera, writer)) in cameras.iter_mut().zip(writers).enumerate() {
                let grab = match camera.source.retrieve(timeout) {
                    Ok(grab) => grab,
                    Err(e) => {
                        tracing::error!(
                            camera = %camera.name(),
                            cycle,
                            error = %e,
                            "Retrieve failed, aborting session"
                        );
                        return SessionOutcome::Aborted {
                            camera: camera.name().to_string(),
                            reason: e.to_string(),
                        };
                    }
                };
                let now = Instant::now();

                if grab.skipped > 0 {
                    writer.record_skipped(grab.skipped);
                    if diagnostics.warn_frame_missing {
                        tracing::warn!(
                            camera = %camera.name(),
                            skipped = grab.skipped,
                            cycle,
                            "Frames skipped at source"
                        );
                    }
                }

                let mut frame = grab.frame;
                frame.cycle = cycle;
                if diagnostics.stamp_frame_id {
                    overlay::stamp_frame_id(&mut frame, camera.name());
                }
                if want_preview {
                    preview_set.push(frame.clone());
                }
                if let Err(e) = writer.feed(frame) {
                    tracing::error!(
                        camera = %camera.name(),
                        cycle,
                        error = %e,
                        "Writer refused frame, aborting session"
                    );
                    return SessionOutcome::Aborted {
                        camera: camera.name().to_string(),
                        reason: e.to_string(),
                    };
                }

                stats.record_frame(index, now, grab.skipped);
                stats.record_queue(index, writer.get_state());
            }
            stats.cycles += 1;

            if want_preview {
                if let Some(preview) = self.preview.as_mut() {
                    preview.offer(&preview_set, Instant::now());
                }
            }
            if diagnostics.print_acquisition_state && state_log.should_tick(Instant::now()) {
                stats.log_state();
            }
        }
    }

    /// STOPPED: persist the report and keep the counters.
    fn finish(&mut self, session: &RecordingSession, report: &SessionReport, stats: AcquisitionStats) {
        if let Err(e) = report.save(&session.report_path()) {
            tracing::warn!(error = %e, "Failed to write run report");
        }
        for camera in &report.cameras {
            tracing::info!(
                camera = %camera.name,
                frames = camera.frames,
                skipped = camera.skipped,
                clean = camera.writer_clean,
                "Run totals"
            );
        }
        match &report.outcome {
            SessionOutcome::Completed { reason } => {
                tracing::info!(run = report.run_index, cycles = report.cycles, ?reason, "Run complete");
            }
            SessionOutcome::Aborted { camera, reason } => {
                tracing::error!(run = report.run_index, %camera, %reason, "Run aborted");
            }
        }
        self.last_stats = Some(stats);
        self.transition(AcquisitionState::Stopped);
    }
}

fn close_all(cameras: &mut [ActiveCamera]) {
    for camera in cameras {
        if let Err(e) = camera.source.close() {
            tracing::warn!(camera = %camera.name(), error = %e, "Camera close failed");
        }
    }
}

/// Drain and close a writer, logging instead of propagating.
fn finish_writer(writer: &mut AsyncFrameWriter) -> Option<String> {
    let waited = writer.wait_to_finish();
    let stopped = writer.stop();
    let error = waited.err().or(stopped.err()).map(|e| e.to_string());
    if let Some(e) = &error {
        tracing::error!(camera = %writer.name(), error = %e, "Writer did not finish cleanly");
    }
    error
}

/// DRAINING: every writer, in polling order, drains before it is released.
fn drain_writers(
    writers: &mut [AsyncFrameWriter],
    cameras: &[ActiveCamera],
    stats: &AcquisitionStats,
) -> Vec<CameraReport> {
    writers
        .iter_mut()
        .zip(cameras)
        .enumerate()
        .map(|(index, (writer, camera))| {
            let error = finish_writer(writer);
            let state = writer.get_state();
            CameraReport {
                index,
                name: camera.name().to_string(),
                serial: camera.resolved.device.serial.clone(),
                path: writer.path().to_path_buf(),
                frames: state.written,
                skipped: stats.cameras().get(index).map_or(0, |c| c.skipped),
                writer_state: state,
                writer_clean: error.is_none(),
                writer_error: error,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limits_are_checked_in_order() {
        let limits = RunLimits {
            max_cycles: Some(5),
            max_duration: Some(Duration::from_secs(1)),
        };
        assert_eq!(limits.reached(4, Duration::ZERO), None);
        assert_eq!(limits.reached(5, Duration::ZERO), Some(StopReason::CycleLimit));
        assert_eq!(
            limits.reached(0, Duration::from_secs(2)),
            Some(StopReason::DurationLimit)
        );
        assert_eq!(RunLimits::default().reached(u64::MAX, Duration::MAX), None);
    }

    #[test]
    fn stop_handle_is_shared() {
        let handle = StopHandle::new();
        let clone = handle.clone();
        clone.request_stop();
        assert!(handle.is_requested());
        handle.reset();
        assert!(!clone.is_requested());
    }
}
