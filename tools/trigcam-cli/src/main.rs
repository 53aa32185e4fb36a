//! trigcam CLI: record synchronized video from hardware-triggered cameras.
//!
//! Usage:
//!   trigcam record [OPTIONS]     Record one run into a new take directory
//!   trigcam cameras              List attached cameras by logical name
//!   trigcam ping                 Probe the trigger device
//!   trigcam show <CAMERA>        Live view of one free-running camera
//!   trigcam config init|show     Write or print the configuration

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use trigcam_common::config::AppConfig;

mod commands;

#[derive(Parser)]
#[command(
    name = "trigcam",
    about = "Hardware-triggered multi-camera recorder",
    version,
    author
)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Configuration file (defaults to $XDG_CONFIG_HOME/trigcam/config.json)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Record one run on the simulated rig until Ctrl+C or a limit is reached
    Record {
        /// Take name, prefixed to the take directory
        #[arg(short, long)]
        take: Option<String>,

        /// Output root directory
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Trigger rate; clamped into the configured bounds
        #[arg(long)]
        fps: Option<f64>,

        /// Stop after this many trigger cycles
        #[arg(long)]
        frames: Option<u64>,

        /// Stop after this many seconds
        #[arg(long)]
        duration_secs: Option<f64>,

        /// Wait before arming the trigger
        #[arg(long, default_value = "0")]
        delay_secs: f64,
    },

    /// List attached cameras in registry order
    Cameras,

    /// Send a liveness probe to the trigger device
    Ping {
        /// Use the configured serial port instead of the simulated device
        #[arg(long)]
        serial: bool,
    },

    /// Stream one camera in free-run mode to the preview image
    Show {
        /// Logical name or serial
        camera: String,

        /// Free-run rate; clamped into the configured bounds
        #[arg(long, default_value = "10")]
        fps: f64,

        /// Stop after this many frames
        #[arg(long)]
        frames: Option<u64>,
    },

    /// Manage the configuration file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Write a default configuration
    Init {
        /// Replace an existing file
        #[arg(long)]
        force: bool,
    },
    /// Print the effective configuration
    Show,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // init must work even when the existing file no longer parses
    if let Commands::Config {
        action: ConfigAction::Init { force },
    } = cli.command
    {
        trigcam_common::logging::init_default_logging();
        return commands::config::init(cli.config.as_deref(), force);
    }

    let config = load_config(cli.config.as_deref())?;

    let mut logging = config.logging.clone();
    if cli.verbose {
        logging.level = "debug".to_string();
    }
    trigcam_common::logging::init_logging(&logging);

    match cli.command {
        Commands::Record {
            take,
            output,
            fps,
            frames,
            duration_secs,
            delay_secs,
        } => {
            commands::record::run(
                config,
                commands::record::RecordArgs {
                    take,
                    output,
                    fps,
                    frames,
                    duration_secs,
                    delay_secs,
                },
            )
            .await
        }
        Commands::Cameras => commands::cameras::run(&config),
        Commands::Ping { serial } => commands::ping::run(&config, serial),
        Commands::Show {
            camera,
            fps,
            frames,
        } => commands::show::run(config, camera, fps, frames).await,
        Commands::Config { action } => match action {
            ConfigAction::Init { force } => commands::config::init(cli.config.as_deref(), force),
            ConfigAction::Show => commands::config::show(&config),
        },
    }
}

/// An explicit path must parse; the default location falls back to defaults.
fn load_config(path: Option<&Path>) -> anyhow::Result<AppConfig> {
    Ok(match path {
        Some(path) if path.exists() => AppConfig::load_from(path)?,
        Some(_) => AppConfig::default(),
        None => AppConfig::load(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn record_help_names_the_simulated_rig() {
        let mut cli = Cli::command();
        let record = cli.find_subcommand_mut("record").unwrap();
        let help = record.render_help().to_string();
        assert!(help.contains("simulated rig"), "{help}");
        assert!(commands::SIMULATED_RIG.contains("simulated"));
    }
}
