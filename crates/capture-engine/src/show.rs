//! Camera discovery and single-camera live view.

use std::time::{Duration, Instant};

use trigcam_camera::{
    CameraRegistry, CameraSettings, CameraSystem, FrameSource, GrabSettings, PixelFormat,
    ResolvedCamera, TriggerMode,
};
use trigcam_common::error::{TrigcamError, TrigcamResult};

use crate::acquisition::StopHandle;
use crate::preview::PreviewCompositor;

/// Enumerate attached cameras and resolve them against the registry, in
/// registry order. Any unregistered camera is a configuration error.
pub fn list_cameras(
    system: &dyn CameraSystem,
    registry: &CameraRegistry,
) -> TrigcamResult<Vec<ResolvedCamera>> {
    let devices = system.enumerate()?;
    tracing::debug!(count = devices.len(), "Enumerated cameras");
    registry.resolve(&devices)
}

/// Stream one camera, free-running at `fps`, into `preview` until `stop` is
/// requested or `max_frames` have been shown. Only the newest image is kept.
///
/// `camera` matches a registered name or serial. Returns the number of
/// frames retrieved.
#[allow(clippy::too_many_arguments)]
pub fn show_camera(
    system: &dyn CameraSystem,
    registry: &CameraRegistry,
    camera: &str,
    fps: f64,
    timeout: Duration,
    preview: &mut PreviewCompositor,
    stop: &StopHandle,
    max_frames: Option<u64>,
) -> TrigcamResult<u64> {
    let resolved = list_cameras(system, registry)?
        .into_iter()
        .find(|c| c.descriptor.name == camera || c.device.serial == camera)
        .ok_or_else(|| TrigcamError::configuration(format!("no attached camera {camera}")))?;

    let mut source = system.create(&resolved.device)?;
    source.open()?;
    tracing::info!(
        name = %resolved.descriptor.name,
        serial = %resolved.device.serial,
        fps,
        "Showing camera"
    );

    let result = stream(source.as_mut(), &resolved, fps, timeout, preview, stop, max_frames);
    if let Err(e) = source.close() {
        tracing::warn!(error = %e, "Camera close failed");
    }
    result
}

fn stream(
    source: &mut dyn FrameSource,
    camera: &ResolvedCamera,
    fps: f64,
    timeout: Duration,
    preview: &mut PreviewCompositor,
    stop: &StopHandle,
    max_frames: Option<u64>,
) -> TrigcamResult<u64> {
    source.configure(&CameraSettings {
        exposure_us: camera.descriptor.exposure_us,
        gain: camera.descriptor.gain,
        pixel_format: PixelFormat::for_sensor(camera.device.is_color),
        trigger_mode: TriggerMode::FreeRun { fps },
    })?;
    source.start_grabbing(GrabSettings::latest_only())?;

    let mut retrieved = 0u64;
    while !stop.is_requested() && max_frames.map_or(true, |max| retrieved < max) {
        let grab = source.retrieve(timeout)?;
        retrieved += 1;
        preview.offer(std::slice::from_ref(&grab.frame), Instant::now());
    }
    tracing::info!(retrieved, shown = preview.shown(), "Live view ended");
    Ok(retrieved)
}
