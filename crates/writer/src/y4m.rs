//! Uncompressed YUV4MPEG2 output.
//!
//! Mono frames are stored verbatim as `Cmono`. BGR frames are converted to
//! full-range BT.601 4:4:4 planes (`C444`). The stream header is written with
//! the first frame, once the geometry is known. A frame is appended whole
//! or not at all: a failed write truncates the file back to the last
//! complete frame.

use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use trigcam_camera::{Frame, PixelFormat};
use trigcam_common::error::{TrigcamError, TrigcamResult};

use crate::encoder::{fps_rational, VideoEncoder};

const STREAM_MAGIC: &str = "YUV4MPEG2";
const FRAME_MARKER: &[u8] = b"FRAME\n";

pub struct Y4mEncoder {
    file: Option<File>,
    path: PathBuf,
    /// Length of the stream up to the last complete frame.
    committed: u64,
    rate: (u32, u32),
    geometry: Option<(u32, u32, PixelFormat)>,
    planes: Vec<u8>,
    frames_written: u64,
}

impl Y4mEncoder {
    /// Create the output file. An existing file is never overwritten.
    pub fn create(path: &Path, fps: f64) -> TrigcamResult<Self> {
        let rate = fps_rational(fps)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .map_err(|e| match e.kind() {
                ErrorKind::AlreadyExists => TrigcamError::encoder(path, "output file already exists"),
                _ => TrigcamError::encoder(path, format!("cannot create output: {e}")),
            })?;

        tracing::debug!(path = %path.display(), fps, "Opened Y4M output");
        Ok(Self {
            file: Some(file),
            path: path.to_path_buf(),
            committed: 0,
            rate,
            geometry: None,
            planes: Vec::new(),
            frames_written: 0,
        })
    }

    fn io_error(&self, what: &str, e: std::io::Error) -> TrigcamError {
        TrigcamError::encoder(&self.path, format!("{what}: {e}"))
    }
}

impl VideoEncoder for Y4mEncoder {
    fn write(&mut self, frame: &Frame) -> TrigcamResult<()> {
        let geometry = (frame.width, frame.height, frame.format);
        let header = match self.geometry {
            None => Some(stream_header(geometry, self.rate)),
            Some(existing) if existing == geometry => None,
            Some((w, h, format)) => {
                return Err(TrigcamError::encoder(
                    &self.path,
                    format!(
                        "frame {} is {}x{} {:?}, stream is {w}x{h} {format:?}",
                        frame.sequence, frame.width, frame.height, frame.format
                    ),
                ));
            }
        };

        let payload: &[u8] = match frame.format {
            PixelFormat::Mono8 => frame.data(),
            PixelFormat::Bgr8 => {
                bgr_to_planar_ycbcr(frame.data(), &mut self.planes);
                &self.planes
            }
        };

        let Some(file) = self.file.as_mut() else {
            return Err(TrigcamError::encoder(&self.path, "encoder already closed"));
        };
        let parts = [
            header.as_deref().map_or(&[][..], str::as_bytes),
            FRAME_MARKER,
            payload,
        ];
        match append_whole(file, self.committed, &parts) {
            Ok(len) => self.committed = len,
            Err(e) => return Err(self.io_error("frame write failed", e)),
        }

        self.geometry = Some(geometry);
        self.frames_written += 1;
        Ok(())
    }

    fn flush(&mut self) -> TrigcamResult<()> {
        let result = match self.file.as_mut() {
            Some(file) => file.flush(),
            None => Ok(()),
        };
        result.map_err(|e| self.io_error("flush failed", e))
    }

    fn close(&mut self) -> TrigcamResult<()> {
        let Some(file) = self.file.take() else {
            return Ok(());
        };
        file.sync_all()
            .map_err(|e| self.io_error("finalize failed", e))?;
        tracing::debug!(
            path = %self.path.display(),
            frames = self.frames_written,
            "Closed Y4M output"
        );
        Ok(())
    }

    fn frames_written(&self) -> u64 {
        self.frames_written
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

/// Output that can be cut back to a known length.
trait Truncate {
    fn truncate_to(&mut self, len: u64) -> io::Result<()>;
}

impl Truncate for File {
    fn truncate_to(&mut self, len: u64) -> io::Result<()> {
        self.set_len(len)?;
        self.seek(SeekFrom::Start(len))?;
        Ok(())
    }
}

/// Append `parts` after `committed` bytes and return the new length. On
/// failure the output is truncated back to `committed`.
fn append_whole<W: Write + Truncate>(out: &mut W, committed: u64, parts: &[&[u8]]) -> io::Result<u64> {
    let written = parts
        .iter()
        .try_for_each(|part| out.write_all(part))
        .and_then(|_| out.flush());
    match written {
        Ok(()) => Ok(committed + parts.iter().map(|p| p.len() as u64).sum::<u64>()),
        Err(e) => {
            if let Err(rollback) = out.truncate_to(committed) {
                tracing::error!(error = %rollback, committed, "Could not remove partial frame");
            }
            Err(e)
        }
    }
}

fn stream_header((width, height, format): (u32, u32, PixelFormat), (num, den): (u32, u32)) -> String {
    let colorspace = match format {
        PixelFormat::Mono8 => "mono",
        PixelFormat::Bgr8 => "444",
    };
    format!("{STREAM_MAGIC} W{width} H{height} F{num}:{den} Ip A1:1 C{colorspace}\n")
}

/// Full-range BT.601, written as three consecutive planes.
fn bgr_to_planar_ycbcr(bgr: &[u8], out: &mut Vec<u8>) {
    let pixels = bgr.len() / 3;
    out.clear();
    out.resize(pixels * 3, 0);
    let (y_plane, rest) = out.split_at_mut(pixels);
    let (cb_plane, cr_plane) = rest.split_at_mut(pixels);

    for (i, px) in bgr.chunks_exact(3).enumerate() {
        let (b, g, r) = (px[0] as f32, px[1] as f32, px[2] as f32);
        y_plane[i] = to_u8(0.299 * r + 0.587 * g + 0.114 * b);
        cb_plane[i] = to_u8(128.0 - 0.168_736 * r - 0.331_264 * g + 0.5 * b);
        cr_plane[i] = to_u8(128.0 + 0.5 * r - 0.418_688 * g - 0.081_312 * b);
    }
}

fn to_u8(v: f32) -> u8 {
    v.round().clamp(0.0, 255.0) as u8
}

/// A decoded YUV4MPEG2 file: stream geometry and raw frame payloads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Y4mStream {
    pub width: u32,
    pub height: u32,
    pub rate: (u32, u32),
    pub colorspace: String,
    pub frames: Vec<Vec<u8>>,
}

/// Read back a stream written by [`Y4mEncoder`].
pub fn read_stream(path: &Path) -> TrigcamResult<Y4mStream> {
    let bad = |msg: String| TrigcamError::encoder(path, msg);
    let mut reader = BufReader::new(File::open(path)?);

    let mut header = String::new();
    reader.read_line(&mut header)?;
    let mut fields = header.trim_end().split(' ');
    if fields.next() != Some(STREAM_MAGIC) {
        return Err(bad("not a YUV4MPEG2 stream".to_string()));
    }

    let (mut width, mut height, mut rate, mut colorspace) = (0u32, 0u32, (0u32, 0u32), None);
    for field in fields {
        let mut chars = field.chars();
        let tag = chars.next();
        let value = chars.as_str();
        match tag {
            Some('W') => width = value.parse().map_err(|_| bad(format!("bad width {value}")))?,
            Some('H') => height = value.parse().map_err(|_| bad(format!("bad height {value}")))?,
            Some('F') => {
                let (n, d) = value
                    .split_once(':')
                    .ok_or_else(|| bad(format!("bad rate {value}")))?;
                rate = (
                    n.parse().map_err(|_| bad(format!("bad rate {value}")))?,
                    d.parse().map_err(|_| bad(format!("bad rate {value}")))?,
                );
            }
            Some('C') => colorspace = Some(value.to_string()),
            _ => {}
        }
    }
    let colorspace = colorspace.unwrap_or_else(|| "420jpeg".to_string());
    let frame_len = width as usize
        * height as usize
        * match colorspace.as_str() {
            "mono" => 1,
            "444" => 3,
            other => return Err(bad(format!("unsupported colorspace {other}"))),
        };

    let mut frames = Vec::new();
    let mut marker = Vec::new();
    loop {
        marker.clear();
        if reader.read_until(b'\n', &mut marker)? == 0 {
            break;
        }
        if !marker.starts_with(b"FRAME") {
            return Err(bad(format!("expected frame marker after {} frames", frames.len())));
        }
        let mut payload = vec![0u8; frame_len];
        reader
            .read_exact(&mut payload)
            .map_err(|e| bad(format!("truncated frame {}: {e}", frames.len())))?;
        frames.push(payload);
    }

    Ok(Y4mStream {
        width,
        height,
        rate,
        colorspace,
        frames,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Accepts `room` bytes, then fails like a full disk.
    struct FullDisk {
        data: Vec<u8>,
        room: usize,
    }

    impl Write for FullDisk {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            let n = buf.len().min(self.room.saturating_sub(self.data.len()));
            if n == 0 {
                return Err(io::Error::other("no space left"));
            }
            self.data.extend_from_slice(&buf[..n]);
            Ok(n)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Truncate for FullDisk {
        fn truncate_to(&mut self, len: u64) -> io::Result<()> {
            self.data.truncate(len as usize);
            Ok(())
        }
    }

    #[test]
    fn failed_append_leaves_only_complete_frames() {
        let mut out = FullDisk {
            data: Vec::new(),
            room: 20,
        };
        let first = append_whole(&mut out, 0, &[b"FRAME\n", b"abcd"]).unwrap();
        assert_eq!(first, 10);

        let err = append_whole(&mut out, first, &[b"FRAME\n", b"0123456789abcdef"]).unwrap_err();
        assert_eq!(err.to_string(), "no space left");
        assert_eq!(out.data, b"FRAME\nabcd");
    }

    #[test]
    fn file_append_tracks_stream_length() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("append.y4m");
        let mut encoder = Y4mEncoder::create(&path, 10.0).unwrap();
        encoder.write(&mono(0, 1)).unwrap();
        encoder.write(&mono(1, 2)).unwrap();
        let on_disk = std::fs::metadata(&path).unwrap().len();
        assert_eq!(encoder.committed, on_disk);

        // rolling back to the committed length is a no-op for a healthy stream
        let file = encoder.file.as_mut().unwrap();
        file.truncate_to(on_disk).unwrap();
        encoder.write(&mono(2, 3)).unwrap();
        encoder.close().unwrap();
        assert_eq!(read_stream(&path).unwrap().frames.len(), 3);
    }

    fn mono(sequence: u64, value: u8) -> Frame {
        Frame::filled(4, 2, PixelFormat::Mono8, sequence, value)
    }

    #[test]
    fn header_is_written_with_first_frame() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run000_cam0.y4m");
        let mut encoder = Y4mEncoder::create(&path, 10.0).unwrap();
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 0);

        encoder.write(&mono(0, 7)).unwrap();
        encoder.write(&mono(1, 9)).unwrap();
        encoder.close().unwrap();

        let bytes = std::fs::read(&path).unwrap();
        let header = b"YUV4MPEG2 W4 H2 F10:1 Ip A1:1 Cmono\n";
        assert!(bytes.starts_with(header));
        assert_eq!(bytes.len(), header.len() + 2 * (FRAME_MARKER.len() + 8));
        assert_eq!(encoder.frames_written(), 2);
    }

    #[test]
    fn stream_reads_back_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ordered.y4m");
        let mut encoder = Y4mEncoder::create(&path, 2.5).unwrap();
        for value in [3u8, 1, 2] {
            encoder.write(&mono(value as u64, value)).unwrap();
        }
        encoder.close().unwrap();

        let stream = read_stream(&path).unwrap();
        assert_eq!((stream.width, stream.height), (4, 2));
        assert_eq!(stream.rate, (5, 2));
        assert_eq!(stream.colorspace, "mono");
        let firsts: Vec<u8> = stream.frames.iter().map(|f| f[0]).collect();
        assert_eq!(firsts, [3, 1, 2]);
    }

    #[test]
    fn color_frames_become_444_planes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("color.y4m");
        let mut encoder = Y4mEncoder::create(&path, 10.0).unwrap();
        let mut frame = Frame::filled(2, 1, PixelFormat::Bgr8, 0, 0);
        frame.put_pixel(0, 0, [255, 255, 255]);
        frame.put_pixel(1, 0, [0, 0, 255]);
        encoder.write(&frame).unwrap();
        encoder.close().unwrap();

        let stream = read_stream(&path).unwrap();
        assert_eq!(stream.colorspace, "444");
        let planes = &stream.frames[0];
        // Y plane: white, red
        assert_eq!(&planes[0..2], &[255, 76]);
        // Cb plane
        assert_eq!(&planes[2..4], &[128, 85]);
        // Cr plane
        assert_eq!(&planes[4..6], &[128, 255]);
    }

    #[test]
    fn geometry_change_is_an_encoder_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("resize.y4m");
        let mut encoder = Y4mEncoder::create(&path, 10.0).unwrap();
        encoder.write(&mono(0, 0)).unwrap();
        let bigger = Frame::filled(8, 2, PixelFormat::Mono8, 1, 0);
        let err = encoder.write(&bigger).unwrap_err();
        assert!(matches!(err, TrigcamError::Encoder { .. }));
        assert_eq!(encoder.frames_written(), 1);
    }

    #[test]
    fn existing_file_is_not_overwritten() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("taken.y4m");
        std::fs::write(&path, b"keep").unwrap();
        let result = Y4mEncoder::create(&path, 10.0);
        assert!(matches!(result, Err(TrigcamError::Encoder { .. })));
        assert_eq!(std::fs::read(&path).unwrap(), b"keep");
    }

    #[test]
    fn write_after_close_fails() {
        let dir = tempfile::tempdir().unwrap();
        let mut encoder = Y4mEncoder::create(&dir.path().join("closed.y4m"), 10.0).unwrap();
        encoder.close().unwrap();
        encoder.close().unwrap();
        assert!(encoder.write(&mono(0, 0)).is_err());
    }
}
