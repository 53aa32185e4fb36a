//! Probe the trigger device.

use trigcam_common::config::AppConfig;
use trigcam_simulator::SimulatedRig;
use trigcam_trigger::{SerialConnector, TriggerConnector, TriggerController};

pub fn run(config: &AppConfig, serial: bool) -> anyhow::Result<()> {
    let connector: Box<dyn TriggerConnector> = if serial {
        Box::new(SerialConnector)
    } else {
        Box::new(SimulatedRig::from_config(config).connector())
    };
    let mut trigger = TriggerController::connect(
        &config.trigger,
        config.fps_bounds,
        config.fps,
        connector.as_ref(),
    )?;

    match trigger.ping() {
        Some(response) => {
            println!(
                "{:?} trigger on {}: {response}",
                trigger.variant(),
                config.trigger.port
            );
            Ok(())
        }
        None => anyhow::bail!("no response from trigger on {}", config.trigger.port),
    }
}
