//! Application configuration.
//!
//! The configuration is loaded once at startup and handed to every component
//! by value or reference. Nothing in the workspace reads process-wide mutable
//! settings.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::error::{TrigcamError, TrigcamResult};

/// Global application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Root directory that receives one sub-directory per take.
    pub output_root: PathBuf,

    /// Human-readable take name, prefixed to the take directory.
    pub take_name: String,

    /// Requested acquisition rate.
    pub fps: f64,

    /// Valid fps range, `[min_fps, max_fps)`.
    pub fps_bounds: FpsBounds,

    /// Bounded wait for a single camera retrieve, in milliseconds.
    pub camera_timeout_ms: u64,

    /// Output video codec.
    pub codec: Codec,

    /// Number of frames each writer may buffer before `feed` blocks.
    pub writer_queue_capacity: usize,

    /// Camera-side buffering.
    pub grab: GrabConfig,

    /// Trigger device settings.
    pub trigger: TriggerConfig,

    /// Live preview settings.
    pub preview: PreviewConfig,

    /// Debugging switches.
    pub diagnostics: DiagnosticsConfig,

    /// Camera registry: serial number to logical name and defaults.
    pub cameras: Vec<CameraDescriptor>,

    /// Logging configuration.
    pub logging: LoggingConfig,
}

/// Static description of one registered camera.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraDescriptor {
    /// Vendor serial number, unique across the registry.
    pub serial: String,
    /// Logical name used for output files and overlays.
    pub name: String,
    /// Default exposure time in microseconds.
    pub exposure_us: f64,
    /// Default analog gain.
    pub gain: f64,
}

impl CameraDescriptor {
    pub fn new(serial: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            serial: serial.into(),
            name: name.into(),
            exposure_us: 5000.0,
            gain: 3.5,
        }
    }
}

/// Accepted fps range. The lower bound is inclusive, the upper bound exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FpsBounds {
    pub min_fps: f64,
    pub max_fps: f64,
}

impl FpsBounds {
    pub fn contains(&self, fps: f64) -> bool {
        fps.is_finite() && fps >= self.min_fps && fps < self.max_fps
    }

    /// Clamp a requested rate into the accepted range.
    pub fn clamp(&self, fps: f64) -> f64 {
        if fps.is_nan() || fps < self.min_fps {
            self.min_fps
        } else if fps >= self.max_fps {
            // largest f64 strictly below the exclusive upper bound
            f64::from_bits(self.max_fps.to_bits() - 1)
        } else {
            fps
        }
    }
}

/// Output container and codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Codec {
    /// Uncompressed YUV4MPEG2 stream.
    #[default]
    Y4m,
    /// H.264 in Matroska, encoded through GStreamer.
    H264Mkv,
}

impl Codec {
    /// File extension without the leading dot.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Y4m => "y4m",
            Self::H264Mkv => "mkv",
        }
    }
}

/// Camera-side buffer pool sizing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrabConfig {
    /// Total buffers, empty and filled.
    pub buffer_pool_size: usize,
    /// Maximum filled buffers waiting for retrieval.
    pub queue_capacity: usize,
}

/// Which trigger implementation drives the pulse line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TriggerVariant {
    /// Local timing thread toggling a USB GPIO module.
    Gpio,
    /// Microcontroller that free-runs the pulse after a start command.
    #[default]
    Arduino,
}

/// Trigger device settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TriggerConfig {
    pub variant: TriggerVariant,
    /// Serial device where the trigger hardware registers.
    pub port: String,
    pub baud_rate: u32,
    /// Wait between arming the cameras and the first pulse.
    pub settle_delay_ms: u64,
    /// Command round-trip latency of the GPIO module.
    pub device_latency_ms: u64,
    /// GPIO line toggled by the self-timed trigger.
    pub gpio_pin: u8,
}

/// Live preview settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreviewConfig {
    pub enabled: bool,
    /// Minimum time between two composed previews.
    pub min_interval_ms: u64,
    pub width: u32,
    pub height: u32,
}

/// Debugging switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiagnosticsConfig {
    /// Stamp `<camera>_<sequence>` into every recorded frame.
    pub stamp_frame_id: bool,
    /// Warn whenever a camera reports skipped frames.
    pub warn_frame_missing: bool,
    /// Periodically log polling rate and writer queue state.
    pub print_acquisition_state: bool,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "trigcam=debug,warn").
    pub level: String,

    /// Whether to output structured JSON logs.
    pub json: bool,

    /// Optional log file path.
    pub file: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            output_root: dirs_default_recordings(),
            take_name: "take".to_string(),
            fps: 10.0,
            fps_bounds: FpsBounds::default(),
            camera_timeout_ms: 1000,
            codec: Codec::default(),
            writer_queue_capacity: 64,
            grab: GrabConfig::default(),
            trigger: TriggerConfig::default(),
            preview: PreviewConfig::default(),
            diagnostics: DiagnosticsConfig::default(),
            cameras: Vec::new(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for FpsBounds {
    fn default() -> Self {
        Self {
            min_fps: 0.1,
            max_fps: 100.0,
        }
    }
}

impl Default for GrabConfig {
    fn default() -> Self {
        Self {
            buffer_pool_size: 16,
            queue_capacity: 8,
        }
    }
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self {
            variant: TriggerVariant::default(),
            port: "/dev/ttyACM0".to_string(),
            baud_rate: 115_200,
            settle_delay_ms: 0,
            device_latency_ms: 1,
            gpio_pin: 0,
        }
    }
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_interval_ms: 500,
            width: 1000,
            height: 800,
        }
    }
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            stamp_frame_id: false,
            warn_frame_missing: true,
            print_acquisition_state: false,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            file: None,
        }
    }
}

impl AppConfig {
    /// Load config from the standard location, falling back to defaults.
    pub fn load() -> Self {
        let config_path = config_file_path();
        if config_path.exists() {
            match Self::load_from(&config_path) {
                Ok(config) => return config,
                Err(e) => {
                    tracing::warn!("Failed to load config at {:?}: {}", config_path, e);
                }
            }
        }
        Self::default()
    }

    /// Load config from an explicit path. Errors are returned, not defaulted.
    pub fn load_from(path: &Path) -> TrigcamResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Save config to the standard location.
    pub fn save(&self) -> Result<(), std::io::Error> {
        self.save_to(&config_file_path())
    }

    /// Save config to an explicit path.
    pub fn save_to(&self, config_path: &Path) -> Result<(), std::io::Error> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(config_path, json)
    }

    /// Check internal consistency. Called once before a session is built.
    pub fn validate(&self) -> TrigcamResult<()> {
        let bounds = self.fps_bounds;
        if !(bounds.min_fps > 0.0 && bounds.min_fps < bounds.max_fps) {
            return Err(TrigcamError::configuration(format!(
                "invalid fps bounds [{}, {})",
                bounds.min_fps, bounds.max_fps
            )));
        }
        if !bounds.contains(self.fps) {
            return Err(TrigcamError::configuration(format!(
                "fps {} outside [{}, {})",
                self.fps, bounds.min_fps, bounds.max_fps
            )));
        }
        if self.camera_timeout_ms == 0 {
            return Err(TrigcamError::configuration(
                "camera_timeout_ms must be positive",
            ));
        }
        if self.writer_queue_capacity == 0 {
            return Err(TrigcamError::configuration(
                "writer_queue_capacity must be positive",
            ));
        }
        if self.grab.queue_capacity == 0 || self.grab.buffer_pool_size <= self.grab.queue_capacity
        {
            return Err(TrigcamError::configuration(format!(
                "buffer pool ({}) must exceed output queue ({}) and the queue must be non-empty",
                self.grab.buffer_pool_size, self.grab.queue_capacity
            )));
        }

        let mut serials = HashSet::new();
        let mut names = HashSet::new();
        for camera in &self.cameras {
            if camera.serial.trim().is_empty() || camera.name.trim().is_empty() {
                return Err(TrigcamError::configuration(
                    "camera entries need a serial and a name",
                ));
            }
            if camera.name.contains(['/', '\\']) {
                return Err(TrigcamError::configuration(format!(
                    "camera name {} is used in file names and may not contain path separators",
                    camera.name
                )));
            }
            if !serials.insert(camera.serial.as_str()) {
                return Err(TrigcamError::configuration(format!(
                    "duplicate camera serial {}",
                    camera.serial
                )));
            }
            if !names.insert(camera.name.as_str()) {
                return Err(TrigcamError::configuration(format!(
                    "duplicate camera name {}",
                    camera.name
                )));
            }
        }
        Ok(())
    }
}

/// Standard config file location.
pub fn config_file_path() -> PathBuf {
    let base = std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".config")
        });
    base.join("trigcam").join("config.json")
}

/// Default recordings directory.
fn dirs_default_recordings() -> PathBuf {
    let base = std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local").join("share")
        });
    base.join("trigcam").join("recordings")
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn config_with_cameras(cameras: Vec<CameraDescriptor>) -> AppConfig {
        AppConfig {
            cameras,
            ..AppConfig::default()
        }
    }

    #[test]
    fn default_config_is_valid() {
        AppConfig::default().validate().unwrap();
    }

    #[test]
    fn duplicate_serials_are_rejected() {
        let config = config_with_cameras(vec![
            CameraDescriptor::new("22382608", "cam0"),
            CameraDescriptor::new("22382608", "cam1"),
        ]);
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("duplicate camera serial"));
    }

    #[test]
    fn pool_must_exceed_queue() {
        let mut config = AppConfig::default();
        config.grab = GrabConfig {
            buffer_pool_size: 8,
            queue_capacity: 8,
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn clamp_stays_inside_half_open_range() {
        let bounds = FpsBounds::default();
        assert_eq!(bounds.clamp(0.01), 0.1);
        assert_eq!(bounds.clamp(42.0), 42.0);
        let top = bounds.clamp(250.0);
        assert!(top < 100.0);
        assert!(bounds.contains(top));
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config: AppConfig = serde_json::from_str(
            r#"{ "fps": 30.0, "trigger": { "variant": "gpio" },
                 "cameras": [{ "serial": "22551262", "name": "cam1", "exposure_us": 4000.0, "gain": 2.0 }] }"#,
        )
        .unwrap();
        assert_eq!(config.fps, 30.0);
        assert_eq!(config.trigger.variant, TriggerVariant::Gpio);
        assert_eq!(config.trigger.device_latency_ms, 1);
        assert_eq!(config.cameras.len(), 1);
        assert_eq!(config.codec, Codec::Y4m);
        config.validate().unwrap();
    }

    #[test]
    fn save_and_load_from_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let config = config_with_cameras(vec![CameraDescriptor::new("22561089", "cam2")]);
        config.save_to(&path).unwrap();

        let loaded = AppConfig::load_from(&path).unwrap();
        assert_eq!(loaded.cameras, config.cameras);
        assert_eq!(loaded.take_name, "take");
    }

    proptest! {
        #[test]
        fn clamp_result_is_always_accepted(fps in -1000.0f64..1000.0) {
            let bounds = FpsBounds::default();
            prop_assert!(bounds.contains(bounds.clamp(fps)));
        }
    }
}
