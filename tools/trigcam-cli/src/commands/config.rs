//! Write or print the configuration file.

use std::path::Path;

use trigcam_common::config::{config_file_path, AppConfig, CameraDescriptor};

pub fn init(path: Option<&Path>, force: bool) -> anyhow::Result<()> {
    let path = path.map_or_else(config_file_path, Path::to_path_buf);
    if path.exists() && !force {
        anyhow::bail!(
            "{} already exists; pass --force to replace it",
            path.display()
        );
    }

    let config = AppConfig {
        cameras: vec![
            CameraDescriptor::new("40012345", "cam0"),
            CameraDescriptor::new("40012346", "cam1"),
        ],
        ..AppConfig::default()
    };
    config.save_to(&path)?;

    println!("Configuration written to {}", path.display());
    println!("  Cameras: {}", config.cameras.len());
    println!("  Output root: {}", config.output_root.display());
    println!("  Trigger: {:?} on {}", config.trigger.variant, config.trigger.port);
    Ok(())
}

pub fn show(config: &AppConfig) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(config)?);
    Ok(())
}
