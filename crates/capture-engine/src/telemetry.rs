//! Per-camera acquisition counters.

use std::time::Instant;

use serde::{Deserialize, Serialize};
use trigcam_common::clock::PollingRate;
use trigcam_writer::QueueState;

/// Counters for one camera, indexed by polling position.
#[derive(Debug, Clone, Default)]
pub struct CameraStats {
    pub name: String,
    pub frames: u64,
    pub skipped: u64,
    pub polling: PollingRate,
    pub queue: QueueState,
}

/// Serializable view of [`CameraStats`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraStatsSnapshot {
    pub name: String,
    pub frames: u64,
    pub skipped: u64,
    pub polling_hz: Option<f64>,
    pub queue: QueueState,
}

#[derive(Debug, Clone, Default)]
pub struct AcquisitionStats {
    pub cycles: u64,
    cameras: Vec<CameraStats>,
}

impl AcquisitionStats {
    /// Zeroed counters for each camera.
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            cycles: 0,
            cameras: names
                .into_iter()
                .map(|name| CameraStats {
                    name: name.into(),
                    ..CameraStats::default()
                })
                .collect(),
        }
    }

    pub fn cameras(&self) -> &[CameraStats] {
        &self.cameras
    }

    /// A frame from camera `index` was retrieved at `now`.
    pub fn record_frame(&mut self, index: usize, now: Instant, skipped: u64) {
        if let Some(camera) = self.cameras.get_mut(index) {
            camera.frames += 1;
            camera.skipped += skipped;
            camera.polling.record(now);
        }
    }

    pub fn record_queue(&mut self, index: usize, queue: QueueState) {
        if let Some(camera) = self.cameras.get_mut(index) {
            camera.queue = queue;
        }
    }

    pub fn total_skipped(&self) -> u64 {
        self.cameras.iter().map(|c| c.skipped).sum()
    }

    pub fn snapshot(&self) -> Vec<CameraStatsSnapshot> {
        self.cameras
            .iter()
            .map(|c| CameraStatsSnapshot {
                name: c.name.clone(),
                frames: c.frames,
                skipped: c.skipped,
                polling_hz: c.polling.hz(),
                queue: c.queue,
            })
            .collect()
    }

    /// One log line per camera with polling rate and queue fill.
    pub fn log_state(&self) {
        for camera in &self.cameras {
            tracing::info!(
                camera = %camera.name,
                polling_hz = camera.polling.hz().unwrap_or(0.0),
                frames = camera.frames,
                skipped = camera.skipped,
                queue_depth = camera.queue.depth,
                queue_capacity = camera.queue.capacity,
                "Acquisition state"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn counters_are_per_camera() {
        let mut stats = AcquisitionStats::new(["cam0", "cam1"]);
        let t0 = Instant::now();
        stats.record_frame(0, t0, 0);
        stats.record_frame(0, t0 + Duration::from_millis(100), 2);
        stats.record_frame(1, t0, 1);
        stats.record_frame(7, t0, 1);

        let snapshot = stats.snapshot();
        assert_eq!(snapshot[0].frames, 2);
        assert_eq!(snapshot[0].skipped, 2);
        assert!((snapshot[0].polling_hz.unwrap() - 10.0).abs() < 1e-6);
        assert_eq!(snapshot[1].polling_hz, None);
        assert_eq!(stats.total_skipped(), 3);
    }
}
