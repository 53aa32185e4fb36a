//! The video encoder boundary.

use std::path::Path;

use trigcam_camera::Frame;
use trigcam_common::config::Codec;
use trigcam_common::error::{TrigcamError, TrigcamResult};

use crate::y4m::Y4mEncoder;

/// A single growing video container.
///
/// Implementations are driven from one writer thread and see frames in
/// exactly the order they were fed.
pub trait VideoEncoder: Send {
    /// Append one frame.
    fn write(&mut self, frame: &Frame) -> TrigcamResult<()>;

    /// Push buffered frames to the operating system.
    fn flush(&mut self) -> TrigcamResult<()> {
        Ok(())
    }

    /// Finalize the container. Further writes fail.
    fn close(&mut self) -> TrigcamResult<()>;

    fn frames_written(&self) -> u64;

    fn path(&self) -> &Path;
}

/// Opens encoders for a recording session.
pub trait EncoderFactory: Send + Sync {
    fn open(&self, path: &Path, fps: f64, codec: Codec) -> TrigcamResult<Box<dyn VideoEncoder>>;
}

/// Built-in encoders: Y4M always, Matroska/H.264 with the `gstreamer` feature.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultEncoderFactory;

impl EncoderFactory for DefaultEncoderFactory {
    fn open(&self, path: &Path, fps: f64, codec: Codec) -> TrigcamResult<Box<dyn VideoEncoder>> {
        match codec {
            Codec::Y4m => Ok(Box::new(Y4mEncoder::create(path, fps)?)),
            #[cfg(feature = "gstreamer")]
            Codec::H264Mkv => Ok(Box::new(crate::gst::GstEncoder::create(path, fps)?)),
            #[cfg(not(feature = "gstreamer"))]
            Codec::H264Mkv => Err(TrigcamError::configuration(
                "codec h264_mkv requires trigcam to be built with the `gstreamer` feature",
            )),
        }
    }
}

/// Express a frame rate as a reduced `numerator / denominator` pair.
///
/// Whole rates map to `fps / 1`; fractional rates keep millihertz precision.
pub fn fps_rational(fps: f64) -> TrigcamResult<(u32, u32)> {
    if !fps.is_finite() || fps <= 0.0 {
        return Err(TrigcamError::configuration(format!(
            "cannot encode at {fps} fps"
        )));
    }
    let (num, den) = if fps.fract() == 0.0 {
        (fps as u64, 1u64)
    } else {
        ((fps * 1000.0).round() as u64, 1000u64)
    };
    let divisor = gcd(num, den);
    let (num, den) = (num / divisor, den / divisor);
    match (u32::try_from(num), u32::try_from(den)) {
        (Ok(num), Ok(den)) if num > 0 => Ok((num, den)),
        _ => Err(TrigcamError::configuration(format!(
            "cannot encode at {fps} fps"
        ))),
    }
}

fn gcd(mut a: u64, mut b: u64) -> u64 {
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a.max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn whole_rates_have_unit_denominator() {
        assert_eq!(fps_rational(10.0).unwrap(), (10, 1));
        assert_eq!(fps_rational(100.0).unwrap(), (100, 1));
    }

    #[test]
    fn fractional_rates_are_reduced() {
        assert_eq!(fps_rational(2.5).unwrap(), (5, 2));
        assert_eq!(fps_rational(0.1).unwrap(), (1, 10));
        assert_eq!(fps_rational(29.97).unwrap(), (2997, 100));
    }

    #[test]
    fn invalid_rates_are_rejected() {
        assert!(fps_rational(0.0).is_err());
        assert!(fps_rational(-1.0).is_err());
        assert!(fps_rational(f64::NAN).is_err());
        assert!(fps_rational(0.0001).is_err());
    }

    #[cfg(not(feature = "gstreamer"))]
    #[test]
    fn mkv_needs_gstreamer_feature() {
        let dir = tempfile::tempdir().unwrap();
        let result = DefaultEncoderFactory.open(&dir.path().join("a.mkv"), 10.0, Codec::H264Mkv);
        assert!(matches!(result, Err(TrigcamError::Configuration { .. })));
    }
}
