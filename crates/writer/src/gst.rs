//! H.264/Matroska output through a GStreamer `appsrc` pipeline.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::{Duration, Instant};

use gst::prelude::*;
use gstreamer as gst;
use gstreamer_app as gst_app;
use trigcam_camera::{Frame, PixelFormat};
use trigcam_common::error::{TrigcamError, TrigcamResult};

use crate::encoder::{fps_rational, VideoEncoder};

const EOS_TIMEOUT: Duration = Duration::from_secs(10);

pub struct GstEncoder {
    path: PathBuf,
    pipeline: gst::Pipeline,
    appsrc: gst_app::AppSrc,
    rate: (u32, u32),
    geometry: Option<(u32, u32, PixelFormat)>,
    frames_written: u64,
    closed: bool,
}

impl GstEncoder {
    /// Build the pipeline. Caps are negotiated with the first frame.
    pub fn create(path: &Path, fps: f64) -> TrigcamResult<Self> {
        init_gstreamer(path)?;
        let rate = fps_rational(fps)?;
        if path.exists() {
            return Err(TrigcamError::encoder(path, "output file already exists"));
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let launch = format!(
            "appsrc name=src format=time is-live=false block=true ! videoconvert ! \
             x264enc tune=zerolatency speed-preset=veryfast ! matroskamux ! \
             filesink location=\"{}\"",
            path.display()
        );
        let pipeline = gst::parse::launch(&launch)
            .map_err(|e| TrigcamError::encoder(path, format!("failed to build pipeline: {e}")))?
            .dynamic_cast::<gst::Pipeline>()
            .map_err(|_| TrigcamError::encoder(path, "launch string did not produce a pipeline"))?;
        let appsrc = pipeline
            .by_name("src")
            .and_then(|e| e.dynamic_cast::<gst_app::AppSrc>().ok())
            .ok_or_else(|| TrigcamError::encoder(path, "pipeline has no appsrc"))?;

        Ok(Self {
            path: path.to_path_buf(),
            pipeline,
            appsrc,
            rate,
            geometry: None,
            frames_written: 0,
            closed: false,
        })
    }

    fn negotiate(&mut self, frame: &Frame) -> TrigcamResult<()> {
        let format = match frame.format {
            PixelFormat::Mono8 => "GRAY8",
            PixelFormat::Bgr8 => "BGR",
        };
        let caps = gst::Caps::builder("video/x-raw")
            .field("format", format)
            .field("width", frame.width as i32)
            .field("height", frame.height as i32)
            .field(
                "framerate",
                gst::Fraction::new(self.rate.0 as i32, self.rate.1 as i32),
            )
            .build();
        self.appsrc.set_caps(Some(&caps));
        self.pipeline
            .set_state(gst::State::Playing)
            .map_err(|e| TrigcamError::encoder(&self.path, format!("failed to start: {e:?}")))?;
        self.geometry = Some((frame.width, frame.height, frame.format));
        Ok(())
    }

    fn frame_time(&self, index: u64) -> gst::ClockTime {
        let (num, den) = (self.rate.0 as u64, self.rate.1 as u64);
        gst::ClockTime::from_nseconds(index * 1_000_000_000 * den / num)
    }

    fn wait_for_eos(&self) {
        let Some(bus) = self.pipeline.bus() else {
            return;
        };
        let started = Instant::now();
        loop {
            let Some(remaining) = EOS_TIMEOUT.checked_sub(started.elapsed()) else {
                tracing::warn!(path = %self.path.display(), "EOS drain timed out");
                return;
            };
            let timeout = gst::ClockTime::from_nseconds(remaining.as_nanos() as u64);
            match bus.timed_pop(timeout) {
                Some(msg) => match msg.view() {
                    gst::MessageView::Eos(_) => return,
                    gst::MessageView::Error(e) => {
                        tracing::warn!(
                            path = %self.path.display(),
                            error = %e.error(),
                            "Pipeline error during EOS drain"
                        );
                        return;
                    }
                    _ => {}
                },
                None => {
                    tracing::warn!(path = %self.path.display(), "EOS drain timed out");
                    return;
                }
            }
        }
    }
}

impl VideoEncoder for GstEncoder {
    fn write(&mut self, frame: &Frame) -> TrigcamResult<()> {
        if self.closed {
            return Err(TrigcamError::encoder(&self.path, "encoder already closed"));
        }
        match self.geometry {
            None => self.negotiate(frame)?,
            Some(g) if g == (frame.width, frame.height, frame.format) => {}
            Some((w, h, _)) => {
                return Err(TrigcamError::encoder(
                    &self.path,
                    format!(
                        "frame {} is {}x{}, stream is {w}x{h}",
                        frame.sequence, frame.width, frame.height
                    ),
                ));
            }
        }

        let mut buffer = gst::Buffer::from_mut_slice(aligned_rows(frame));
        if let Some(meta) = buffer.get_mut() {
            meta.set_pts(self.frame_time(self.frames_written));
            meta.set_duration(self.frame_time(1));
        }
        self.appsrc
            .push_buffer(buffer)
            .map_err(|e| TrigcamError::encoder(&self.path, format!("push failed: {e:?}")))?;
        self.frames_written += 1;
        Ok(())
    }

    fn close(&mut self) -> TrigcamResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        if self.geometry.is_some() {
            if self.appsrc.end_of_stream().is_ok() {
                self.wait_for_eos();
            } else {
                tracing::warn!(path = %self.path.display(), "Failed to send EOS; output may be truncated");
            }
        }
        self.pipeline
            .set_state(gst::State::Null)
            .map_err(|e| TrigcamError::encoder(&self.path, format!("failed to stop: {e:?}")))?;
        Ok(())
    }

    fn frames_written(&self) -> u64 {
        self.frames_written
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for GstEncoder {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::warn!(error = %e, "GStreamer encoder close failed during drop");
        }
    }
}

/// Raw video rows are 4-byte aligned in GStreamer's default layout.
fn aligned_rows(frame: &Frame) -> Vec<u8> {
    let stride = frame.stride();
    let padded = (stride + 3) & !3;
    if padded == stride {
        return frame.data().to_vec();
    }
    let mut out = vec![0u8; padded * frame.height as usize];
    for (src, dst) in frame.data().chunks_exact(stride).zip(out.chunks_exact_mut(padded)) {
        dst[..stride].copy_from_slice(src);
    }
    out
}

fn init_gstreamer(path: &Path) -> TrigcamResult<()> {
    static GST_INIT: OnceLock<Result<(), String>> = OnceLock::new();
    match GST_INIT.get_or_init(|| gst::init().map_err(|e| e.to_string())) {
        Ok(()) => Ok(()),
        Err(e) => Err(TrigcamError::encoder(
            path,
            format!("failed to initialize GStreamer: {e}"),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rows_are_padded_to_four_bytes() {
        let frame = Frame::filled(3, 2, PixelFormat::Mono8, 0, 9);
        let rows = aligned_rows(&frame);
        assert_eq!(rows, [9, 9, 9, 0, 9, 9, 9, 0]);

        let aligned = Frame::filled(4, 2, PixelFormat::Bgr8, 0, 1);
        assert_eq!(aligned_rows(&aligned).len(), 24);
    }
}
