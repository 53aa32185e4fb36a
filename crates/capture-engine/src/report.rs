//! Per-run summary written next to the videos.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use trigcam_common::config::TriggerVariant;
use trigcam_common::error::TrigcamResult;
use trigcam_writer::QueueState;

/// Why the cycle loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// The external stop signal.
    Requested,
    CycleLimit,
    DurationLimit,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SessionOutcome {
    Completed { reason: StopReason },
    /// A fatal camera or writer error ended the run for every camera.
    Aborted { camera: String, reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraReport {
    pub index: usize,
    pub name: String,
    pub serial: String,
    pub path: PathBuf,
    /// Frames durably written.
    pub frames: u64,
    /// Frames the camera dropped at the source.
    pub skipped: u64,
    pub writer_state: QueueState,
    /// Whether the writer drained and closed without error.
    pub writer_clean: bool,
    pub writer_error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionReport {
    pub run_index: u32,
    pub take_dir: PathBuf,
    pub started_at: DateTime<Local>,
    pub duration_secs: f64,
    pub cycles: u64,
    pub fps: f64,
    pub trigger: TriggerVariant,
    pub outcome: SessionOutcome,
    pub cameras: Vec<CameraReport>,
}

impl SessionReport {
    pub fn is_aborted(&self) -> bool {
        matches!(self.outcome, SessionOutcome::Aborted { .. })
    }

    pub fn camera(&self, name: &str) -> Option<&CameraReport> {
        self.cameras.iter().find(|c| c.name == name)
    }

    pub fn save(&self, path: &Path) -> TrigcamResult<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn load(path: &Path) -> TrigcamResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_survives_disk() {
        let dir = tempfile::tempdir().unwrap();
        let report = SessionReport {
            run_index: 3,
            take_dir: dir.path().to_path_buf(),
            started_at: Local::now(),
            duration_secs: 1.5,
            cycles: 15,
            fps: 10.0,
            trigger: TriggerVariant::Gpio,
            outcome: SessionOutcome::Aborted {
                camera: "cam1".to_string(),
                reason: "timeout".to_string(),
            },
            cameras: vec![CameraReport {
                index: 0,
                name: "cam0".to_string(),
                serial: "100".to_string(),
                path: dir.path().join("run003_cam0.y4m"),
                frames: 15,
                skipped: 0,
                writer_state: QueueState::default(),
                writer_clean: true,
                writer_error: None,
            }],
        };
        let path = dir.path().join("run003_report.json");
        report.save(&path).unwrap();
        let loaded = SessionReport::load(&path).unwrap();
        assert_eq!(loaded, report);
        assert!(loaded.is_aborted());
        assert_eq!(loaded.camera("cam0").unwrap().frames, 15);

        let json = std::fs::read_to_string(&path).unwrap();
        assert!(json.contains("\"kind\": \"aborted\""));
    }
}
