//! List attached cameras.

use trigcam_camera::CameraRegistry;
use trigcam_capture_engine::list_cameras;
use trigcam_common::config::AppConfig;
use trigcam_simulator::SimulatedRig;

pub fn run(config: &AppConfig) -> anyhow::Result<()> {
    let registry = CameraRegistry::new(config.cameras.clone())?;
    let rig = SimulatedRig::from_config(config);
    let cameras = list_cameras(&rig.camera_system(), &registry)?;

    println!("Rig: {}", super::SIMULATED_RIG);
    println!("{:<6} {:<16} {:<20} MODEL", "INDEX", "NAME", "SERIAL");
    for camera in &cameras {
        println!(
            "{:<6} {:<16} {:<20} {}{}",
            camera.index,
            camera.descriptor.name,
            camera.device.serial,
            camera.device.model,
            if camera.device.is_color { " (color)" } else { "" }
        );
    }
    Ok(())
}
