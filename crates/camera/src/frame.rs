//! Captured frames.

use serde::{Deserialize, Serialize};
use trigcam_common::error::{TrigcamError, TrigcamResult};

/// Pixel layout of a frame buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PixelFormat {
    /// 8-bit monochrome.
    Mono8,
    /// 8-bit interleaved blue, green, red.
    Bgr8,
}

impl PixelFormat {
    pub fn channels(&self) -> usize {
        match self {
            Self::Mono8 => 1,
            Self::Bgr8 => 3,
        }
    }

    /// Preferred format for a sensor: color cameras deliver demosaiced BGR.
    pub fn for_sensor(is_color: bool) -> Self {
        if is_color {
            Self::Bgr8
        } else {
            Self::Mono8
        }
    }
}

/// One captured image.
///
/// A frame has exactly one owner at a time. The acquisition loop holds it
/// while in transit and hands it to a writer by value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    /// Per-camera image number, strictly increasing. Gaps are at-source skips.
    pub sequence: u64,
    /// Acquisition cycle that retrieved this frame.
    pub cycle: u64,
}

impl Frame {
    /// Wrap a pixel buffer. The buffer length must match the dimensions.
    pub fn new(
        data: Vec<u8>,
        width: u32,
        height: u32,
        format: PixelFormat,
        sequence: u64,
    ) -> TrigcamResult<Self> {
        let expected = width as usize * height as usize * format.channels();
        if data.len() != expected {
            return Err(TrigcamError::camera(format!(
                "frame buffer holds {} bytes, {width}x{height} {format:?} needs {expected}",
                data.len()
            )));
        }
        Ok(Self {
            data,
            width,
            height,
            format,
            sequence,
            cycle: 0,
        })
    }

    /// A frame filled with a single value.
    pub fn filled(width: u32, height: u32, format: PixelFormat, sequence: u64, value: u8) -> Self {
        let len = width as usize * height as usize * format.channels();
        Self {
            data: vec![value; len],
            width,
            height,
            format,
            sequence,
            cycle: 0,
        }
    }

    pub fn channels(&self) -> usize {
        self.format.channels()
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    /// Bytes per image row.
    pub fn stride(&self) -> usize {
        self.width as usize * self.channels()
    }

    /// Set one pixel to a BGR color. Mono frames receive the green component.
    /// Out-of-bounds coordinates are ignored.
    pub fn put_pixel(&mut self, x: u32, y: u32, bgr: [u8; 3]) {
        if x >= self.width || y >= self.height {
            return;
        }
        let offset = y as usize * self.stride() + x as usize * self.channels();
        match self.format {
            PixelFormat::Mono8 => self.data[offset] = bgr[1],
            PixelFormat::Bgr8 => self.data[offset..offset + 3].copy_from_slice(&bgr),
        }
    }

    /// Expand to interleaved RGB, the layout image tooling expects.
    pub fn to_rgb(&self) -> Vec<u8> {
        match self.format {
            PixelFormat::Mono8 => self.data.iter().flat_map(|&v| [v, v, v]).collect(),
            PixelFormat::Bgr8 => self
                .data
                .chunks_exact(3)
                .flat_map(|px| [px[2], px[1], px[0]])
                .collect(),
        }
    }
}
