pub mod cameras;
pub mod config;
pub mod ping;
pub mod record;
pub mod show;

/// Printed by every command that drives cameras. No vendor camera SDK is
/// bound, so cameras and the trigger line are simulated in-process.
pub const SIMULATED_RIG: &str = "simulated cameras and trigger (no camera hardware attached)";
