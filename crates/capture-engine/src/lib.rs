//! Trigcam Capture Engine
//!
//! Records synchronized video from several hardware-triggered cameras. One
//! trigger pulse exposes every camera once; the acquisition loop collects the
//! resulting frames in a fixed order and hands each to its camera's
//! asynchronous writer, so frame `i` of every video belongs to the same pulse.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │                   AcquisitionLoop                    │
//! │  ┌───────────────┐      pulse      ┌──────────────┐  │
//! │  │ Trigger       │ ──────────────► │ FrameSource  │  │
//! │  │ Controller    │                 │ x N cameras  │  │
//! │  └───────────────┘                 └──────┬───────┘  │
//! │                          retrieve, in registry order │
//! │              ┌──────────────┬─────────────┤          │
//! │              ▼              ▼             ▼          │
//! │  ┌──────────────────┐ ┌───────────┐ ┌────────────┐   │
//! │  │ AsyncFrameWriter │ │ Preview   │ │ Acquisition│   │
//! │  │ x N (threads)    │ │ Compositor│ │ Stats      │   │
//! │  └────────┬─────────┘ └───────────┘ └────────────┘   │
//! │           ▼                                          │
//! │  <take>_<stamp>/run000_cam0.y4m  run000_report.json  │
//! └──────────────────────────────────────────────────────┘
//! ```

pub mod acquisition;
pub mod overlay;
pub mod preview;
pub mod report;
pub mod session;
pub mod show;
pub mod telemetry;

pub use acquisition::{AcquisitionLoop, AcquisitionState, RunLimits, StopHandle};
pub use preview::{compose_grid, PngFileSink, PreviewCompositor, PreviewSink};
pub use report::{CameraReport, SessionOutcome, SessionReport, StopReason};
pub use session::{video_path, RecordingSession, TakeDirectory};
pub use show::{list_cameras, show_camera};
pub use telemetry::{AcquisitionStats, CameraStats, CameraStatsSnapshot};
