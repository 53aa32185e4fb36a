//! The frame-source boundary over a vendor camera SDK.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use trigcam_common::config::GrabConfig;
use trigcam_common::error::{TrigcamError, TrigcamResult};

use crate::frame::{Frame, PixelFormat};

/// A device reported by enumeration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub serial: String,
    pub model: String,
    /// Whether the sensor offers a color pixel format.
    pub is_color: bool,
}

/// What starts an exposure.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum TriggerMode {
    /// Rising edge on an input line. The camera's internal rate limit is
    /// raised to `max_fps` so the pulse alone sets the cadence.
    Hardware { line: u8, max_fps: f64 },
    /// Internal clock at a fixed rate.
    FreeRun { fps: f64 },
}

/// Acquisition parameters applied by `configure`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CameraSettings {
    pub exposure_us: f64,
    pub gain: f64,
    pub pixel_format: PixelFormat,
    pub trigger_mode: TriggerMode,
}

/// Camera-side buffering for `start_grabbing`.
///
/// The camera owns `buffer_pool_size` buffers and keeps at most
/// `queue_capacity` filled ones. When the consumer falls behind, the oldest
/// filled buffer is recycled and reported as skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrabSettings {
    pub buffer_pool_size: usize,
    pub queue_capacity: usize,
}

impl GrabSettings {
    /// Keep only the newest image; used for live viewing.
    pub fn latest_only() -> Self {
        Self {
            buffer_pool_size: 2,
            queue_capacity: 1,
        }
    }

    pub fn validate(&self) -> TrigcamResult<()> {
        if self.queue_capacity == 0 || self.buffer_pool_size <= self.queue_capacity {
            return Err(TrigcamError::camera(format!(
                "grab buffers: pool {} must exceed queue {} (> 0)",
                self.buffer_pool_size, self.queue_capacity
            )));
        }
        Ok(())
    }
}

impl From<GrabConfig> for GrabSettings {
    fn from(config: GrabConfig) -> Self {
        Self {
            buffer_pool_size: config.buffer_pool_size,
            queue_capacity: config.queue_capacity,
        }
    }
}

/// Result of a successful retrieve.
#[derive(Debug)]
pub struct Grab {
    pub frame: Frame,
    /// Images the camera recycled since the previous retrieve.
    pub skipped: u64,
}

/// Per-camera adapter over the vendor SDK.
pub trait FrameSource: Send {
    /// Serial number of the underlying device.
    fn serial(&self) -> &str;

    fn open(&mut self) -> TrigcamResult<()>;

    fn configure(&mut self, settings: &CameraSettings) -> TrigcamResult<()>;

    fn start_grabbing(&mut self, grab: GrabSettings) -> TrigcamResult<()>;

    /// Block up to `timeout` for the next image. A timeout is reported as
    /// `TrigcamError::DeviceTimeout`.
    fn retrieve(&mut self, timeout: Duration) -> TrigcamResult<Grab>;

    /// Stop grabbing and release the device. Closing twice is a no-op.
    fn close(&mut self) -> TrigcamResult<()>;

    fn is_open(&self) -> bool;
}

/// Device discovery, the transport-layer side of the SDK.
pub trait CameraSystem: Send {
    fn enumerate(&self) -> TrigcamResult<Vec<DeviceInfo>>;

    /// Create an unopened source for a discovered device.
    fn create(&self, device: &DeviceInfo) -> TrigcamResult<Box<dyn FrameSource>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grab_settings_from_config() {
        let grab = GrabSettings::from(GrabConfig::default());
        assert_eq!(grab.buffer_pool_size, 16);
        assert_eq!(grab.queue_capacity, 8);
        grab.validate().unwrap();
        GrabSettings::latest_only().validate().unwrap();
    }

    #[test]
    fn grab_settings_need_spare_buffers() {
        let grab = GrabSettings {
            buffer_pool_size: 4,
            queue_capacity: 4,
        };
        assert!(grab.validate().is_err());
    }
}
