//! Delegated trigger: a microcontroller free-runs the pulse.

use std::time::Duration;

use trigcam_common::config::TriggerConfig;
use trigcam_common::error::{TrigcamError, TrigcamResult};

use crate::port::{normalize_response, read_response, send_command, TriggerPort};

const PING_SETTLE: Duration = Duration::from_millis(100);

/// Sends `S<fps>` once and `Q` at the end; the device does the timing.
pub struct ArduinoTrigger {
    port: Box<dyn TriggerPort>,
    fps: f64,
    settle_delay: Duration,
    running: bool,
}

impl ArduinoTrigger {
    pub fn new(port: Box<dyn TriggerPort>, config: &TriggerConfig, fps: f64) -> Self {
        Self {
            port,
            fps,
            settle_delay: Duration::from_millis(config.settle_delay_ms),
            running: false,
        }
    }

    pub fn fps(&self) -> f64 {
        self.fps
    }

    pub(crate) fn store_fps(&mut self, fps: f64) {
        if self.running {
            tracing::warn!(fps, "Rate change takes effect at the next start");
        }
        self.fps = fps;
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn ping(&mut self) -> TrigcamResult<String> {
        send_command(&mut *self.port, b"P\r")?;
        let raw = read_response(&mut *self.port, PING_SETTLE, 100)?;
        Ok(normalize_response(&raw))
    }

    pub fn start(&mut self) -> TrigcamResult<()> {
        if self.running {
            return Err(TrigcamError::invalid_state("Arduino trigger already running"));
        }
        if !self.settle_delay.is_zero() {
            std::thread::sleep(self.settle_delay);
        }

        // firmware parses an integer rate
        let rate = self.fps.trunc() as u32;
        if (self.fps - rate as f64).abs() > f64::EPSILON {
            tracing::warn!(fps = self.fps, rate, "Trigger firmware only accepts whole fps");
        }
        send_command(&mut *self.port, format!("S{rate}\r").as_bytes())?;
        self.running = true;
        tracing::info!(rate, "Arduino trigger started");
        Ok(())
    }

    pub fn end(&mut self) -> TrigcamResult<()> {
        if !self.running {
            tracing::debug!("Arduino trigger not running; nothing to end");
            return Ok(());
        }
        send_command(&mut *self.port, b"Q\r")?;
        self.running = false;
        tracing::info!("Arduino trigger stopped");
        Ok(())
    }

    /// Forward free text to the device, e.g. a take marker for its display.
    pub fn send_string(&mut self, text: &str) -> TrigcamResult<()> {
        send_command(&mut *self.port, format!("T{text}\r").as_bytes())
    }
}

impl Drop for ArduinoTrigger {
    fn drop(&mut self) {
        if let Err(e) = self.end() {
            tracing::warn!(error = %e, "Arduino trigger stop failed during drop");
        }
    }
}
