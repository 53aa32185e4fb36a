//! Error types shared across trigcam crates.

use std::path::PathBuf;

/// Top-level error type for trigcam operations.
#[derive(Debug, thiserror::Error)]
pub enum TrigcamError {
    /// A camera or setting is missing from, or inconsistent with, the configuration.
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// No frame arrived within the bounded retrieve timeout.
    #[error("Camera {camera} delivered no frame within {timeout_ms} ms")]
    DeviceTimeout { camera: String, timeout_ms: u64 },

    /// Writing to or reading from the trigger device failed.
    #[error("Trigger communication error: {message}")]
    TriggerCommunication { message: String },

    /// The video encoder rejected a frame or failed to finalize.
    #[error("Encoder error for {}: {message}", path.display())]
    Encoder { path: PathBuf, message: String },

    /// The camera SDK refused an open/configure/grab request.
    #[error("Camera error: {message}")]
    Camera { message: String },

    #[error("Writer for {name} no longer accepts frames")]
    WriterClosed { name: String },

    #[error("Invalid state: {message}")]
    InvalidState { message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias using TrigcamError.
pub type TrigcamResult<T> = Result<T, TrigcamError>;

impl TrigcamError {
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration {
            message: msg.into(),
        }
    }

    pub fn device_timeout(camera: impl Into<String>, timeout_ms: u64) -> Self {
        Self::DeviceTimeout {
            camera: camera.into(),
            timeout_ms,
        }
    }

    pub fn trigger(msg: impl Into<String>) -> Self {
        Self::TriggerCommunication {
            message: msg.into(),
        }
    }

    pub fn encoder(path: impl Into<PathBuf>, msg: impl Into<String>) -> Self {
        Self::Encoder {
            path: path.into(),
            message: msg.into(),
        }
    }

    pub fn camera(msg: impl Into<String>) -> Self {
        Self::Camera {
            message: msg.into(),
        }
    }

    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState {
            message: msg.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_timeout_message_names_camera() {
        let err = TrigcamError::device_timeout("cam2", 1000);
        assert_eq!(
            err.to_string(),
            "Camera cam2 delivered no frame within 1000 ms"
        );
    }

    #[test]
    fn encoder_error_names_path() {
        let err = TrigcamError::encoder("/tmp/run000_cam0.y4m", "frame size changed");
        assert_eq!(
            err.to_string(),
            "Encoder error for /tmp/run000_cam0.y4m: frame size changed"
        );
    }
}
