//! Video writing for trigcam.
//!
//! Each camera owns one [`AsyncFrameWriter`]: a bounded queue drained by a
//! dedicated thread into a [`VideoEncoder`]. Feeding blocks when the queue is
//! full, so a frame accepted by the writer is never lost.

pub mod encoder;
#[cfg(feature = "gstreamer")]
pub mod gst;
pub mod writer;
pub mod y4m;

pub use encoder::{fps_rational, DefaultEncoderFactory, EncoderFactory, VideoEncoder};
pub use writer::{AsyncFrameWriter, QueueState};
pub use y4m::Y4mEncoder;
