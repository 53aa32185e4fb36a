//! Simulated machine-vision cameras.

use std::time::{Duration, Instant};

use trigcam_camera::{
    CameraSettings, CameraSystem, DeviceInfo, Frame, FrameSource, Grab, GrabSettings, PixelFormat,
    TriggerMode,
};
use trigcam_common::error::{TrigcamError, TrigcamResult};

use crate::pulse::PulseLine;

/// Make a camera go silent once it has delivered `after_frames` images.
/// Pulses arriving while it is stalled are lost.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StallPlan {
    pub after_frames: u64,
    pub duration: Duration,
}

/// Static description of one simulated device.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulatedCameraSpec {
    pub serial: String,
    pub model: String,
    pub width: u32,
    pub height: u32,
    pub is_color: bool,
    pub stall: Option<StallPlan>,
}

impl SimulatedCameraSpec {
    pub fn new(serial: impl Into<String>) -> Self {
        Self {
            serial: serial.into(),
            model: "SIM-acA640".to_string(),
            width: 64,
            height: 48,
            is_color: false,
            stall: None,
        }
    }

    pub fn device_info(&self) -> DeviceInfo {
        DeviceInfo {
            serial: self.serial.clone(),
            model: self.model.clone(),
            is_color: self.is_color,
        }
    }
}

#[derive(Debug)]
struct Grabbing {
    grab: GrabSettings,
    /// Edge count (or free-run tick) when grabbing started.
    origin: u64,
    /// Edges already consumed or skipped.
    consumed: u64,
    started: Instant,
    stall_until: Option<Instant>,
    stall_done: bool,
}

/// A camera exposing once per rising edge of a [`PulseLine`], or on its own
/// clock in free-run mode.
///
/// Buffering follows the "keep newest" policy: when more than
/// `queue_capacity` images are waiting, the oldest are recycled and reported
/// as skipped. The first eight bytes of every image hold its sequence number
/// (little endian).
#[derive(Debug)]
pub struct SimulatedCamera {
    spec: SimulatedCameraSpec,
    line: PulseLine,
    open: bool,
    settings: Option<CameraSettings>,
    grabbing: Option<Grabbing>,
    delivered: u64,
}

impl SimulatedCamera {
    pub fn new(spec: SimulatedCameraSpec, line: PulseLine) -> Self {
        Self {
            spec,
            line,
            open: false,
            settings: None,
            grabbing: None,
            delivered: 0,
        }
    }

    fn ticks(&self, settings: &CameraSettings, started: Instant, now: Instant) -> u64 {
        match settings.trigger_mode {
            TriggerMode::Hardware { .. } => self.line.pulses(),
            TriggerMode::FreeRun { fps } => {
                (now.saturating_duration_since(started).as_secs_f64() * fps).floor() as u64
            }
        }
    }

    /// Block until tick count exceeds `seen` or the deadline passes.
    fn wait_for_tick(&self, settings: &CameraSettings, started: Instant, seen: u64, deadline: Instant) -> u64 {
        match settings.trigger_mode {
            TriggerMode::Hardware { .. } => self.line.wait_past(seen, deadline),
            TriggerMode::FreeRun { fps } => {
                let due = started + Duration::from_secs_f64((seen + 1) as f64 / fps);
                std::thread::sleep(due.min(deadline).saturating_duration_since(Instant::now()));
                self.ticks(settings, started, Instant::now())
            }
        }
    }

    fn render(&self, format: PixelFormat, sequence: u64) -> Frame {
        let (w, h) = (self.spec.width, self.spec.height);
        let mut frame = Frame::filled(w, h, format, sequence, 0);
        let shift = (sequence % 256) as u32;
        for y in 0..h {
            for x in 0..w {
                let v = ((x + y + shift) % 256) as u8;
                frame.put_pixel(x, y, [v, v / 2, 255 - v]);
            }
        }
        let data = frame.data_mut();
        let stamp = sequence.to_le_bytes();
        let n = stamp.len().min(data.len());
        data[..n].copy_from_slice(&stamp[..n]);
        frame
    }

    fn timeout_error(&self, timeout: Duration) -> TrigcamError {
        TrigcamError::device_timeout(&self.spec.serial, timeout.as_millis() as u64)
    }
}

/// Sequence number stored in a simulated image.
pub fn embedded_sequence(data: &[u8]) -> Option<u64> {
    let bytes: [u8; 8] = data.get(..8)?.try_into().ok()?;
    Some(u64::from_le_bytes(bytes))
}

impl FrameSource for SimulatedCamera {
    fn serial(&self) -> &str {
        &self.spec.serial
    }

    fn open(&mut self) -> TrigcamResult<()> {
        if self.open {
            return Err(TrigcamError::camera(format!("camera {} already open", self.spec.serial)));
        }
        self.open = true;
        tracing::debug!(serial = %self.spec.serial, "Simulated camera opened");
        Ok(())
    }

    fn configure(&mut self, settings: &CameraSettings) -> TrigcamResult<()> {
        if !self.open {
            return Err(TrigcamError::camera(format!("camera {} is not open", self.spec.serial)));
        }
        if settings.exposure_us <= 0.0 || settings.gain < 0.0 {
            return Err(TrigcamError::camera(format!(
                "exposure {} us / gain {} rejected",
                settings.exposure_us, settings.gain
            )));
        }
        if settings.pixel_format == PixelFormat::Bgr8 && !self.spec.is_color {
            return Err(TrigcamError::camera(format!(
                "camera {} has a mono sensor",
                self.spec.serial
            )));
        }
        if let TriggerMode::FreeRun { fps } = settings.trigger_mode {
            if !(fps.is_finite() && fps > 0.0) {
                return Err(TrigcamError::camera(format!("free-run rate {fps} rejected")));
            }
        }
        self.settings = Some(*settings);
        Ok(())
    }

    fn start_grabbing(&mut self, grab: GrabSettings) -> TrigcamResult<()> {
        grab.validate()?;
        let Some(settings) = self.settings else {
            return Err(TrigcamError::camera(format!(
                "camera {} must be configured before grabbing",
                self.spec.serial
            )));
        };
        let started = Instant::now();
        let origin = self.ticks(&settings, started, started);
        self.grabbing = Some(Grabbing {
            grab,
            origin,
            consumed: origin,
            started,
            stall_until: None,
            stall_done: false,
        });
        self.delivered = 0;
        Ok(())
    }

    fn retrieve(&mut self, timeout: Duration) -> TrigcamResult<Grab> {
        let (Some(settings), Some(mut state)) = (self.settings, self.grabbing.take()) else {
            return Err(TrigcamError::invalid_state(format!(
                "camera {} is not grabbing",
                self.spec.serial
            )));
        };
        let result = self.retrieve_inner(&settings, &mut state, timeout);
        self.grabbing = Some(state);
        result
    }

    fn close(&mut self) -> TrigcamResult<()> {
        if self.open {
            self.grabbing = None;
            self.open = false;
            tracing::debug!(serial = %self.spec.serial, delivered = self.delivered, "Simulated camera closed");
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open
    }
}

impl SimulatedCamera {
    fn retrieve_inner(
        &mut self,
        settings: &CameraSettings,
        state: &mut Grabbing,
        timeout: Duration,
    ) -> TrigcamResult<Grab> {
        let deadline = Instant::now() + timeout;
        let mut skipped = 0;

        if let Some(plan) = self.spec.stall {
            if !state.stall_done && self.delivered >= plan.after_frames {
                state.stall_done = true;
                state.stall_until = Some(Instant::now() + plan.duration);
                tracing::debug!(serial = %self.spec.serial, "Simulated camera stalling");
            }
        }
        if let Some(until) = state.stall_until {
            if until > deadline {
                std::thread::sleep(deadline.saturating_duration_since(Instant::now()));
                return Err(self.timeout_error(timeout));
            }
            std::thread::sleep(until.saturating_duration_since(Instant::now()));
            state.stall_until = None;
            let now_ticks = self.ticks(settings, state.started, Instant::now());
            skipped += now_ticks.saturating_sub(state.consumed);
            state.consumed = state.consumed.max(now_ticks);
        }

        let mut ticks = self.ticks(settings, state.started, Instant::now());
        while ticks <= state.consumed {
            if Instant::now() >= deadline {
                return Err(self.timeout_error(timeout));
            }
            ticks = self.wait_for_tick(settings, state.started, state.consumed, deadline);
        }

        let waiting = ticks - state.consumed;
        let capacity = state.grab.queue_capacity as u64;
        if waiting > capacity {
            let recycled = waiting - capacity;
            skipped += recycled;
            state.consumed += recycled;
        }

        let sequence = state.consumed - state.origin;
        state.consumed += 1;
        self.delivered += 1;
        Ok(Grab {
            frame: self.render(settings.pixel_format, sequence),
            skipped,
        })
    }
}

/// Enumerates a fixed set of simulated devices on one trigger line.
#[derive(Debug, Clone)]
pub struct SimulatedCameraSystem {
    specs: Vec<SimulatedCameraSpec>,
    line: PulseLine,
}

impl SimulatedCameraSystem {
    pub fn new(specs: Vec<SimulatedCameraSpec>, line: PulseLine) -> Self {
        Self { specs, line }
    }
}

impl CameraSystem for SimulatedCameraSystem {
    fn enumerate(&self) -> TrigcamResult<Vec<DeviceInfo>> {
        Ok(self.specs.iter().map(SimulatedCameraSpec::device_info).collect())
    }

    fn create(&self, device: &DeviceInfo) -> TrigcamResult<Box<dyn FrameSource>> {
        let spec = self
            .specs
            .iter()
            .find(|s| s.serial == device.serial)
            .ok_or_else(|| TrigcamError::camera(format!("no device with serial {}", device.serial)))?;
        Ok(Box::new(SimulatedCamera::new(spec.clone(), self.line.clone())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hardware_settings() -> CameraSettings {
        CameraSettings {
            exposure_us: 5000.0,
            gain: 3.5,
            pixel_format: PixelFormat::Mono8,
            trigger_mode: TriggerMode::Hardware {
                line: 1,
                max_fps: 100.0,
            },
        }
    }

    fn grabbing_camera(spec: SimulatedCameraSpec, line: &PulseLine) -> SimulatedCamera {
        let mut camera = SimulatedCamera::new(spec, line.clone());
        camera.open().unwrap();
        camera.configure(&hardware_settings()).unwrap();
        camera
            .start_grabbing(GrabSettings {
                buffer_pool_size: 4,
                queue_capacity: 2,
            })
            .unwrap();
        camera
    }

    #[test]
    fn one_frame_per_pulse() {
        let line = PulseLine::new();
        let mut camera = grabbing_camera(SimulatedCameraSpec::new("S1"), &line);
        for expected in 0..3 {
            line.pulse();
            let grab = camera.retrieve(Duration::from_millis(100)).unwrap();
            assert_eq!(grab.frame.sequence, expected);
            assert_eq!(grab.skipped, 0);
            assert_eq!(embedded_sequence(grab.frame.data()), Some(expected));
        }
    }

    #[test]
    fn pulses_before_grabbing_are_ignored() {
        let line = PulseLine::new();
        line.pulse();
        line.pulse();
        let mut camera = grabbing_camera(SimulatedCameraSpec::new("S1"), &line);
        let err = camera.retrieve(Duration::from_millis(20)).unwrap_err();
        assert!(matches!(err, TrigcamError::DeviceTimeout { .. }));
    }

    #[test]
    fn slow_consumer_keeps_newest() {
        let line = PulseLine::new();
        let mut camera = grabbing_camera(SimulatedCameraSpec::new("S1"), &line);
        for _ in 0..5 {
            line.pulse();
        }
        let grab = camera.retrieve(Duration::from_millis(100)).unwrap();
        assert_eq!(grab.skipped, 3);
        assert_eq!(grab.frame.sequence, 3);
        let grab = camera.retrieve(Duration::from_millis(100)).unwrap();
        assert_eq!(grab.skipped, 0);
        assert_eq!(grab.frame.sequence, 4);
    }

    #[test]
    fn stall_longer_than_timeout_times_out() {
        let line = PulseLine::new();
        let mut spec = SimulatedCameraSpec::new("S2");
        spec.stall = Some(StallPlan {
            after_frames: 1,
            duration: Duration::from_millis(200),
        });
        let mut camera = grabbing_camera(spec, &line);
        line.pulse();
        camera.retrieve(Duration::from_millis(50)).unwrap();
        line.pulse();
        let started = Instant::now();
        let err = camera.retrieve(Duration::from_millis(50)).unwrap_err();
        assert!(matches!(err, TrigcamError::DeviceTimeout { ref camera, timeout_ms: 50 } if camera == "S2"));
        assert!(started.elapsed() < Duration::from_millis(150));
    }

    #[test]
    fn free_run_produces_frames_without_pulses() {
        let line = PulseLine::new();
        let mut camera = SimulatedCamera::new(SimulatedCameraSpec::new("S3"), line);
        camera.open().unwrap();
        let mut settings = hardware_settings();
        settings.trigger_mode = TriggerMode::FreeRun { fps: 100.0 };
        camera.configure(&settings).unwrap();
        camera.start_grabbing(GrabSettings::latest_only()).unwrap();
        let first = camera.retrieve(Duration::from_millis(200)).unwrap();
        let second = camera.retrieve(Duration::from_millis(200)).unwrap();
        assert!(second.frame.sequence > first.frame.sequence);
    }

    #[test]
    fn mono_sensor_rejects_color_format() {
        let mut camera = SimulatedCamera::new(SimulatedCameraSpec::new("S4"), PulseLine::new());
        camera.open().unwrap();
        let mut settings = hardware_settings();
        settings.pixel_format = PixelFormat::Bgr8;
        assert!(camera.configure(&settings).is_err());
    }

    #[test]
    fn retrieve_requires_grabbing() {
        let mut camera = SimulatedCamera::new(SimulatedCameraSpec::new("S5"), PulseLine::new());
        camera.open().unwrap();
        assert!(camera.retrieve(Duration::from_millis(1)).is_err());
        camera.close().unwrap();
        camera.close().unwrap();
        assert!(!camera.is_open());
    }
}
