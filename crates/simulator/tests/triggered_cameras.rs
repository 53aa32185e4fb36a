use std::time::Duration;

use trigcam_camera::{CameraSettings, CameraSystem, PixelFormat, TriggerMode};
use trigcam_common::config::{AppConfig, CameraDescriptor, TriggerVariant};
use trigcam_simulator::SimulatedRig;
use trigcam_trigger::TriggerController;

fn config(variant: TriggerVariant) -> AppConfig {
    let mut config = AppConfig::default();
    config.fps = 50.0;
    config.trigger.variant = variant;
    config.cameras = vec![
        CameraDescriptor::new("100", "cam0"),
        CameraDescriptor::new("101", "cam1"),
    ];
    config
}

fn drive(variant: TriggerVariant) {
    let config = config(variant);
    let rig = SimulatedRig::from_config(&config);
    let system = rig.camera_system();

    let mut cameras = Vec::new();
    for device in system.enumerate().unwrap() {
        let mut camera = system.create(&device).unwrap();
        camera.open().unwrap();
        camera
            .configure(&CameraSettings {
                exposure_us: 5000.0,
                gain: 3.5,
                pixel_format: PixelFormat::Mono8,
                trigger_mode: TriggerMode::Hardware {
                    line: 1,
                    max_fps: 100.0,
                },
            })
            .unwrap();
        camera.start_grabbing(config.grab.into()).unwrap();
        cameras.push(camera);
    }

    let mut trigger =
        TriggerController::connect(&config.trigger, config.fps_bounds, config.fps, &rig.connector())
            .unwrap();
    trigger.start().unwrap();
    for expected in 0..10 {
        for camera in &mut cameras {
            let grab = camera.retrieve(Duration::from_millis(500)).unwrap();
            assert_eq!(grab.frame.sequence, expected, "camera {}", camera.serial());
            assert_eq!(grab.skipped, 0);
        }
    }
    trigger.end().unwrap();

    let after_end = rig.line().pulses();
    std::thread::sleep(Duration::from_millis(60));
    assert_eq!(rig.line().pulses(), after_end);
    for camera in &mut cameras {
        camera.close().unwrap();
    }
}

#[test]
fn gpio_trigger_drives_simulated_cameras() {
    drive(TriggerVariant::Gpio);
}

#[test]
fn arduino_trigger_drives_simulated_cameras() {
    drive(TriggerVariant::Arduino);
}

