//! Hardware stand-ins for trigcam.
//!
//! A [`PulseLine`] plays the trigger wire. Simulated GPIO and Arduino devices
//! drive it through the real serial command protocol, and simulated cameras
//! expose once per rising edge. Together they let complete recording sessions
//! run without hardware.

pub mod camera;
pub mod devices;
pub mod pulse;
pub mod rig;

pub use camera::{
    embedded_sequence, SimulatedCamera, SimulatedCameraSpec, SimulatedCameraSystem, StallPlan,
};
pub use devices::{CommandLog, SimulatedArduino, SimulatedGpioModule};
pub use pulse::PulseLine;
pub use rig::{SimulatedConnector, SimulatedRig};
