//! The trigger capability shared by both variants.

use trigcam_common::config::{FpsBounds, TriggerConfig, TriggerVariant};
use trigcam_common::error::{TrigcamError, TrigcamResult};

use crate::arduino::ArduinoTrigger;
use crate::gpio::GpioTrigger;
use crate::port::{TriggerConnector, TriggerPort};

/// Pulse generator selected at construction time.
///
/// `end()` is synchronous for both variants: once it returns, no further
/// pulse is produced and cameras may be closed.
pub enum TriggerController {
    SelfTimed {
        trigger: GpioTrigger,
        bounds: FpsBounds,
    },
    Delegated {
        trigger: ArduinoTrigger,
        bounds: FpsBounds,
    },
}

impl TriggerController {
    /// Build the configured variant on top of an open port.
    pub fn new(
        config: &TriggerConfig,
        bounds: FpsBounds,
        fps: f64,
        port: Box<dyn TriggerPort>,
    ) -> TrigcamResult<Self> {
        if !bounds.contains(fps) {
            return Err(TrigcamError::configuration(format!(
                "trigger fps {fps} outside [{}, {})",
                bounds.min_fps, bounds.max_fps
            )));
        }
        Ok(match config.variant {
            TriggerVariant::Gpio => Self::SelfTimed {
                trigger: GpioTrigger::new(port, config, fps)?,
                bounds,
            },
            TriggerVariant::Arduino => Self::Delegated {
                trigger: ArduinoTrigger::new(port, config, fps),
                bounds,
            },
        })
    }

    /// Open the port through `connector`, then build the variant.
    pub fn connect(
        config: &TriggerConfig,
        bounds: FpsBounds,
        fps: f64,
        connector: &dyn TriggerConnector,
    ) -> TrigcamResult<Self> {
        let port = connector.connect(config)?;
        Self::new(config, bounds, fps, port)
    }

    pub fn variant(&self) -> TriggerVariant {
        match self {
            Self::SelfTimed { .. } => TriggerVariant::Gpio,
            Self::Delegated { .. } => TriggerVariant::Arduino,
        }
    }

    /// Liveness probe. Failures are logged, never propagated.
    pub fn ping(&mut self) -> Option<String> {
        let result = match self {
            Self::SelfTimed { trigger, .. } => trigger.ping(),
            Self::Delegated { trigger, .. } => trigger.ping(),
        };
        match result {
            Ok(pong) => {
                tracing::info!(pong = %pong, "Trigger answered ping");
                Some(pong)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Trigger ping failed");
                None
            }
        }
    }

    /// Accept `fps` if it lies in `[min_fps, max_fps)`. Otherwise log, keep the
    /// previous rate, and return false.
    pub fn set_fps(&mut self, fps: f64) -> bool {
        let bounds = self.bounds();
        if !bounds.contains(fps) {
            tracing::warn!(
                fps,
                min_fps = bounds.min_fps,
                max_fps = bounds.max_fps,
                retained = self.fps(),
                "Invalid fps value rejected"
            );
            return false;
        }
        match self {
            Self::SelfTimed { trigger, .. } => trigger.store_fps(fps),
            Self::Delegated { trigger, .. } => trigger.store_fps(fps),
        }
        true
    }

    pub fn fps(&self) -> f64 {
        match self {
            Self::SelfTimed { trigger, .. } => trigger.fps(),
            Self::Delegated { trigger, .. } => trigger.fps(),
        }
    }

    pub fn bounds(&self) -> FpsBounds {
        match self {
            Self::SelfTimed { bounds, .. } | Self::Delegated { bounds, .. } => *bounds,
        }
    }

    pub fn is_running(&self) -> bool {
        match self {
            Self::SelfTimed { trigger, .. } => trigger.is_running(),
            Self::Delegated { trigger, .. } => trigger.is_running(),
        }
    }

    /// Begin pulsing, after the configured settle delay.
    pub fn start(&mut self) -> TrigcamResult<()> {
        match self {
            Self::SelfTimed { trigger, .. } => trigger.start(),
            Self::Delegated { trigger, .. } => trigger.start(),
        }
    }

    /// Stop pulsing; returns only once pulse generation has ceased.
    pub fn end(&mut self) -> TrigcamResult<()> {
        match self {
            Self::SelfTimed { trigger, .. } => trigger.end(),
            Self::Delegated { trigger, .. } => trigger.end(),
        }
    }

    /// Send free text to a delegated trigger.
    pub fn send_string(&mut self, text: &str) -> TrigcamResult<()> {
        match self {
            Self::SelfTimed { .. } => Err(TrigcamError::trigger(
                "the GPIO module does not accept text messages",
            )),
            Self::Delegated { trigger, .. } => trigger.send_string(text),
        }
    }
}
