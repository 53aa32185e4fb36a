//! A complete simulated setup built from configuration.

use std::time::Duration;

use trigcam_common::config::{AppConfig, TriggerConfig, TriggerVariant};
use trigcam_common::error::TrigcamResult;
use trigcam_trigger::{TriggerConnector, TriggerPort};

use crate::camera::{SimulatedCameraSpec, SimulatedCameraSystem, StallPlan};
use crate::devices::{CommandLog, SimulatedArduino, SimulatedGpioModule};
use crate::pulse::PulseLine;

/// Opens simulated trigger devices wired to a shared line.
#[derive(Debug, Clone)]
pub struct SimulatedConnector {
    line: PulseLine,
    log: CommandLog,
}

impl SimulatedConnector {
    pub fn new(line: PulseLine, log: CommandLog) -> Self {
        Self { line, log }
    }
}

impl TriggerConnector for SimulatedConnector {
    fn connect(&self, config: &TriggerConfig) -> TrigcamResult<Box<dyn TriggerPort>> {
        tracing::debug!(variant = ?config.variant, port = %config.port, "Opening simulated trigger");
        Ok(match config.variant {
            TriggerVariant::Gpio => Box::new(SimulatedGpioModule::new(
                self.line.clone(),
                config.gpio_pin,
                self.log.clone(),
            )),
            TriggerVariant::Arduino => {
                Box::new(SimulatedArduino::new(self.line.clone(), self.log.clone()))
            }
        })
    }
}

/// One simulated camera per registry entry, all on the same trigger line.
#[derive(Debug, Clone)]
pub struct SimulatedRig {
    line: PulseLine,
    log: CommandLog,
    cameras: Vec<SimulatedCameraSpec>,
}

impl SimulatedRig {
    pub fn from_config(config: &AppConfig) -> Self {
        let cameras = config
            .cameras
            .iter()
            .map(|descriptor| SimulatedCameraSpec::new(&descriptor.serial))
            .collect();
        Self {
            line: PulseLine::new(),
            log: CommandLog::default(),
            cameras,
        }
    }

    /// Resolution applied to every camera.
    pub fn with_resolution(mut self, width: u32, height: u32) -> Self {
        for camera in &mut self.cameras {
            camera.width = width;
            camera.height = height;
        }
        self
    }

    pub fn with_stall(mut self, serial: &str, after_frames: u64, duration: Duration) -> Self {
        if let Some(camera) = self.cameras.iter_mut().find(|c| c.serial == serial) {
            camera.stall = Some(StallPlan {
                after_frames,
                duration,
            });
        }
        self
    }

    /// Add a device that has no registry entry.
    pub fn with_extra_camera(mut self, serial: &str) -> Self {
        self.cameras.push(SimulatedCameraSpec::new(serial));
        self
    }

    pub fn line(&self) -> &PulseLine {
        &self.line
    }

    /// Commands received by the trigger device.
    pub fn trigger_log(&self) -> &CommandLog {
        &self.log
    }

    pub fn camera_system(&self) -> SimulatedCameraSystem {
        SimulatedCameraSystem::new(self.cameras.clone(), self.line.clone())
    }

    pub fn connector(&self) -> SimulatedConnector {
        SimulatedConnector::new(self.line.clone(), self.log.clone())
    }
}
