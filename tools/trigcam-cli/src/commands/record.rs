//! Record one run.

use std::path::PathBuf;
use std::time::Duration;

use trigcam_capture_engine::{
    AcquisitionLoop, PngFileSink, PreviewCompositor, RunLimits, SessionOutcome,
};
use trigcam_common::config::AppConfig;
use trigcam_simulator::SimulatedRig;

use super::SIMULATED_RIG;

pub struct RecordArgs {
    pub take: Option<String>,
    pub output: Option<PathBuf>,
    pub fps: Option<f64>,
    pub frames: Option<u64>,
    pub duration_secs: Option<f64>,
    pub delay_secs: f64,
}

pub async fn run(mut config: AppConfig, args: RecordArgs) -> anyhow::Result<()> {
    anyhow::ensure!(
        args.delay_secs.is_finite() && args.delay_secs >= 0.0,
        "--delay-secs must be a non-negative number"
    );
    let max_duration = match args.duration_secs {
        Some(secs) if secs.is_finite() && secs > 0.0 => Some(Duration::from_secs_f64(secs)),
        Some(_) => anyhow::bail!("--duration-secs must be a positive number"),
        None => None,
    };
    if let Some(take) = args.take {
        config.take_name = take;
    }
    if let Some(output) = args.output {
        config.output_root = output;
    }

    let rig = SimulatedRig::from_config(&config);
    let preview = config.preview;
    let mut acquisition = AcquisitionLoop::new(
        config,
        Box::new(rig.camera_system()),
        Box::new(rig.connector()),
    )?;
    if let Some(fps) = args.fps {
        acquisition.set_fps(fps);
    }
    if preview.enabled {
        let sink = PngFileSink::new(acquisition.take_dir().join("preview.png"));
        acquisition = acquisition.with_preview(PreviewCompositor::new(&preview, Box::new(sink)));
    }

    println!("Recording take: {}", acquisition.take_dir().display());
    println!("  Run: {:03}", acquisition.next_run_index());
    println!("  FPS: {}", acquisition.config().fps);
    println!("  Cameras: {}", acquisition.config().cameras.len());
    println!("  Trigger: {:?}", acquisition.config().trigger.variant);
    println!("  Rig: {SIMULATED_RIG}");
    println!();

    if args.delay_secs > 0.0 {
        println!("Arming in {} s...", args.delay_secs);
        tokio::time::sleep(Duration::from_secs_f64(args.delay_secs)).await;
    }

    let limits = RunLimits {
        max_cycles: args.frames,
        max_duration,
    };
    let stop = acquisition.stop_handle();
    let mut task = tokio::task::spawn_blocking(move || acquisition.record(limits));

    println!("Press Ctrl+C to stop recording...");
    let report = tokio::select! {
        joined = &mut task => joined??,
        _ = tokio::signal::ctrl_c() => {
            println!();
            println!("Stopping at the next cycle...");
            tracing::info!("Stop requested from terminal");
            stop.request_stop();
            task.await??
        }
    };

    println!();
    match &report.outcome {
        SessionOutcome::Completed { reason } => {
            println!("Run {:03} complete ({reason:?})", report.run_index)
        }
        SessionOutcome::Aborted { camera, reason } => {
            println!("Run {:03} aborted by {camera}: {reason}", report.run_index)
        }
    }
    println!(
        "  {} cycles in {:.1} s",
        report.cycles, report.duration_secs
    );
    for camera in &report.cameras {
        println!(
            "  {:<16} {:>8} frames {:>6} skipped  {}{}",
            camera.name,
            camera.frames,
            camera.skipped,
            camera.path.display(),
            if camera.writer_clean { "" } else { "  [writer error]" }
        );
    }

    if report.is_aborted() {
        anyhow::bail!("recording aborted");
    }
    Ok(())
}
