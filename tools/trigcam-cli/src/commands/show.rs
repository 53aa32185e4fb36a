//! Live view of one camera.

use std::time::Duration;

use trigcam_camera::CameraRegistry;
use trigcam_capture_engine::{show_camera, PngFileSink, PreviewCompositor, StopHandle};
use trigcam_common::config::AppConfig;
use trigcam_simulator::SimulatedRig;

pub async fn run(
    config: AppConfig,
    camera: String,
    fps: f64,
    frames: Option<u64>,
) -> anyhow::Result<()> {
    let registry = CameraRegistry::new(config.cameras.clone())?;
    let rig = SimulatedRig::from_config(&config);
    let fps = config.fps_bounds.clamp(fps);
    let timeout = Duration::from_millis(config.camera_timeout_ms);

    std::fs::create_dir_all(&config.output_root)?;
    let preview_path = config.output_root.join("preview.png");
    let mut preview = PreviewCompositor::new(
        &config.preview,
        Box::new(PngFileSink::new(&preview_path)),
    );

    println!("Showing {camera} at {fps} fps");
    println!("  Preview: {}", preview_path.display());
    println!("  Rig: {}", super::SIMULATED_RIG);
    println!("Press Ctrl+C to stop...");

    let stop = StopHandle::new();
    let worker_stop = stop.clone();
    let mut task = tokio::task::spawn_blocking(move || {
        show_camera(
            &rig.camera_system(),
            &registry,
            &camera,
            fps,
            timeout,
            &mut preview,
            &worker_stop,
            frames,
        )
    });

    let retrieved = tokio::select! {
        joined = &mut task => joined??,
        _ = tokio::signal::ctrl_c() => {
            stop.request_stop();
            task.await??
        }
    };
    println!("{retrieved} frames retrieved");
    Ok(())
}
