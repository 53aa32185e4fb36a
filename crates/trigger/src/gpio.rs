//! Self-timed trigger driving a USB GPIO module.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use trigcam_common::clock::sleep_until;
use trigcam_common::config::TriggerConfig;
use trigcam_common::error::{TrigcamError, TrigcamResult};

use crate::port::{normalize_response, read_response, send_command, TriggerPort};

const PING_SETTLE: Duration = Duration::from_millis(100);
const SLEEP_STEP: Duration = Duration::from_millis(1);

type SharedPort = Arc<Mutex<Box<dyn TriggerPort>>>;

/// Generates the pulse locally: line high for half a period, low for the rest.
pub struct GpioTrigger {
    port: SharedPort,
    fps_bits: Arc<AtomicU64>,
    pin: u8,
    latency: Duration,
    settle_delay: Duration,
    stop_flag: Arc<AtomicBool>,
    worker: Option<JoinHandle<TrigcamResult<u64>>>,
}

impl GpioTrigger {
    /// Take ownership of the port and drive the line low.
    pub fn new(
        port: Box<dyn TriggerPort>,
        config: &TriggerConfig,
        fps: f64,
    ) -> TrigcamResult<Self> {
        let trigger = Self {
            port: Arc::new(Mutex::new(port)),
            fps_bits: Arc::new(AtomicU64::new(fps.to_bits())),
            pin: config.gpio_pin,
            latency: Duration::from_millis(config.device_latency_ms),
            settle_delay: Duration::from_millis(config.settle_delay_ms),
            stop_flag: Arc::new(AtomicBool::new(false)),
            worker: None,
        };
        write_locked(&trigger.port, &clear_command(trigger.pin))?;
        Ok(trigger)
    }

    pub fn fps(&self) -> f64 {
        f64::from_bits(self.fps_bits.load(Ordering::Acquire))
    }

    /// Store an already validated rate; a running loop picks it up next period.
    pub(crate) fn store_fps(&self, fps: f64) {
        self.fps_bits.store(fps.to_bits(), Ordering::Release);
    }

    pub fn is_running(&self) -> bool {
        self.worker.is_some()
    }

    pub fn ping(&self) -> TrigcamResult<String> {
        let mut port = self.port.lock().unwrap_or_else(PoisonError::into_inner);
        send_command(&mut **port, b"ver\r")?;
        let raw = read_response(&mut **port, PING_SETTLE, 100)?;
        Ok(normalize_response(&raw))
    }

    pub fn start(&mut self) -> TrigcamResult<()> {
        if self.worker.is_some() {
            return Err(TrigcamError::invalid_state("GPIO trigger already running"));
        }
        if !self.settle_delay.is_zero() {
            tracing::debug!(
                delay_ms = self.settle_delay.as_millis() as u64,
                "Waiting for cameras to settle"
            );
            std::thread::sleep(self.settle_delay);
        }

        let stop_flag = Arc::new(AtomicBool::new(false));
        self.stop_flag = stop_flag.clone();
        let port = self.port.clone();
        let fps_bits = self.fps_bits.clone();
        let pin = self.pin;
        let latency = self.latency;

        let handle = std::thread::Builder::new()
            .name("trigger-gpio".to_string())
            .spawn(move || pulse_loop(&port, &fps_bits, pin, latency, &stop_flag))?;
        self.worker = Some(handle);
        tracing::info!(fps = self.fps(), pin, "GPIO trigger started");
        Ok(())
    }

    /// Stop the timing loop and join it. No pulse is emitted after this returns.
    pub fn end(&mut self) -> TrigcamResult<()> {
        let Some(handle) = self.worker.take() else {
            tracing::debug!("GPIO trigger not running; nothing to end");
            return Ok(());
        };
        self.stop_flag.store(true, Ordering::Release);
        match handle.join() {
            Ok(Ok(pulses)) => {
                tracing::info!(pulses, "GPIO trigger stopped");
                Ok(())
            }
            Ok(Err(e)) => Err(e),
            Err(_) => Err(TrigcamError::trigger("GPIO timing thread panicked")),
        }
    }
}

impl Drop for GpioTrigger {
    fn drop(&mut self) {
        if let Err(e) = self.end() {
            tracing::warn!(error = %e, "GPIO trigger ended with error during drop");
        }
    }
}

fn set_command(pin: u8) -> Vec<u8> {
    format!("gpio set {pin}\r").into_bytes()
}

fn clear_command(pin: u8) -> Vec<u8> {
    format!("gpio clear {pin}\r").into_bytes()
}

fn write_locked(port: &SharedPort, command: &[u8]) -> TrigcamResult<()> {
    let mut port = port.lock().unwrap_or_else(PoisonError::into_inner);
    send_command(&mut **port, command)
}

/// One iteration per pulse. Deadlines are measured from the rising-edge
/// command and shortened by the module's command latency.
fn pulse_loop(
    port: &SharedPort,
    fps_bits: &AtomicU64,
    pin: u8,
    latency: Duration,
    stop_flag: &AtomicBool,
) -> TrigcamResult<u64> {
    let set = set_command(pin);
    let clear = clear_command(pin);
    let stopped = || stop_flag.load(Ordering::Acquire);
    let mut pulses = 0u64;

    while !stopped() {
        let start = Instant::now();
        let fps = f64::from_bits(fps_bits.load(Ordering::Acquire));
        let period = Duration::from_secs_f64(1.0 / fps);
        let high_until = start + (period / 2).saturating_sub(latency);
        let period_end = start + period.saturating_sub(latency);

        write_locked(port, &set)?;
        pulses += 1;
        let completed = sleep_until(high_until, SLEEP_STEP, stopped);
        write_locked(port, &clear)?;
        if !completed {
            break;
        }
        sleep_until(period_end, SLEEP_STEP, stopped);
    }
    Ok(pulses)
}
