//! Rate-limited live preview.
//!
//! The compositor tiles the latest frame of every camera into one fixed-size
//! image. It is purely observational: composition or sink failures are
//! logged and never reach the acquisition loop.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use image::imageops::{self, FilterType};
use image::{ImageFormat, RgbImage};
use trigcam_camera::Frame;
use trigcam_common::clock::RateController;
use trigcam_common::config::PreviewConfig;
use trigcam_common::error::TrigcamResult;

/// Receives composed preview images.
pub trait PreviewSink: Send {
    fn show(&mut self, image: &RgbImage) -> TrigcamResult<()>;
}

/// Keeps the latest preview as a PNG file, replaced atomically.
#[derive(Debug, Clone)]
pub struct PngFileSink {
    path: PathBuf,
}

impl PngFileSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl PreviewSink for PngFileSink {
    fn show(&mut self, image: &RgbImage) -> TrigcamResult<()> {
        let staging = self.path.with_extension("png.partial");
        image
            .save_with_format(&staging, ImageFormat::Png)
            .map_err(anyhow::Error::from)?;
        std::fs::rename(&staging, &self.path)?;
        Ok(())
    }
}

pub struct PreviewCompositor {
    rate: RateController,
    width: u32,
    height: u32,
    sink: Box<dyn PreviewSink>,
    shown: u64,
}

impl PreviewCompositor {
    pub fn new(config: &PreviewConfig, sink: Box<dyn PreviewSink>) -> Self {
        Self {
            rate: RateController::new(Duration::from_millis(config.min_interval_ms)),
            width: config.width.max(1),
            height: config.height.max(1),
            sink,
            shown: 0,
        }
    }

    /// Whether the next `offer` at `now` would render.
    pub fn is_due(&self, now: Instant) -> bool {
        self.rate.is_due(now)
    }

    /// Previews delivered to the sink so far.
    pub fn shown(&self) -> u64 {
        self.shown
    }

    /// Render `frames` if the minimum interval has elapsed. Returns whether a
    /// preview was delivered.
    pub fn offer(&mut self, frames: &[Frame], now: Instant) -> bool {
        if frames.is_empty() || !self.rate.should_tick(now) {
            return false;
        }
        let grid = compose_grid(frames, self.width, self.height);
        match self.sink.show(&grid) {
            Ok(()) => {
                self.shown += 1;
                true
            }
            Err(e) => {
                tracing::warn!(error = %e, "Preview sink failed");
                false
            }
        }
    }
}

/// Tile frames row-major into a `width` x `height` canvas. Each tile keeps
/// its aspect ratio; mono frames are expanded to three channels.
pub fn compose_grid(frames: &[Frame], width: u32, height: u32) -> RgbImage {
    let mut canvas = RgbImage::new(width, height);
    if frames.is_empty() {
        return canvas;
    }

    let n = frames.len() as u32;
    let cols = (n as f64).sqrt().ceil() as u32;
    let rows = n.div_ceil(cols);
    let (cell_w, cell_h) = (width / cols, height / rows);
    if cell_w == 0 || cell_h == 0 {
        return canvas;
    }

    for (i, frame) in frames.iter().enumerate() {
        let Some(tile) = RgbImage::from_raw(frame.width, frame.height, frame.to_rgb()) else {
            tracing::debug!(sequence = frame.sequence, "Skipping malformed preview frame");
            continue;
        };
        let scale = f64::min(
            cell_w as f64 / frame.width.max(1) as f64,
            cell_h as f64 / frame.height.max(1) as f64,
        );
        let tw = ((frame.width as f64 * scale) as u32).clamp(1, cell_w);
        let th = ((frame.height as f64 * scale) as u32).clamp(1, cell_h);
        let tile = imageops::resize(&tile, tw, th, FilterType::Triangle);

        let (col, row) = (i as u32 % cols, i as u32 / cols);
        let x = col * cell_w + (cell_w - tw) / 2;
        let y = row * cell_h + (cell_h - th) / 2;
        imageops::overlay(&mut canvas, &tile, x as i64, y as i64);
    }
    canvas
}
