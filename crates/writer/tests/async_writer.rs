use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use proptest::prelude::*;
use trigcam_camera::{Frame, PixelFormat};
use trigcam_common::error::{TrigcamError, TrigcamResult};
use trigcam_writer::y4m::read_stream;
use trigcam_writer::{AsyncFrameWriter, VideoEncoder, Y4mEncoder};

/// Records sequence numbers, optionally slowing down or failing.
struct RecordingEncoder {
    path: PathBuf,
    written: Arc<Mutex<Vec<u64>>>,
    delays: Vec<Duration>,
    fail_at: Option<u64>,
    closed: Arc<AtomicUsize>,
}

impl RecordingEncoder {
    fn new(written: Arc<Mutex<Vec<u64>>>) -> Self {
        Self {
            path: PathBuf::from("memory"),
            written,
            delays: Vec::new(),
            fail_at: None,
            closed: Arc::new(AtomicUsize::new(0)),
        }
    }
}

impl VideoEncoder for RecordingEncoder {
    fn write(&mut self, frame: &Frame) -> TrigcamResult<()> {
        if self.fail_at == Some(frame.sequence) {
            return Err(TrigcamError::encoder(&self.path, "disk full"));
        }
        let mut written = self.written.lock().unwrap();
        if let Some(delay) = self.delays.get(written.len()) {
            std::thread::sleep(*delay);
        }
        written.push(frame.sequence);
        Ok(())
    }

    fn close(&mut self) -> TrigcamResult<()> {
        self.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn frames_written(&self) -> u64 {
        self.written.lock().unwrap().len() as u64
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

fn frame(sequence: u64) -> Frame {
    Frame::filled(4, 4, PixelFormat::Mono8, sequence, 0)
}

#[test]
fn zero_capacity_is_rejected() {
    let encoder = RecordingEncoder::new(Arc::default());
    let result = AsyncFrameWriter::new("cam0", Box::new(encoder), 0);
    assert!(matches!(result, Err(TrigcamError::Configuration { .. })));
}

#[test]
fn depth_never_exceeds_capacity_under_slow_encoder() {
    let written = Arc::new(Mutex::new(Vec::new()));
    let mut encoder = RecordingEncoder::new(written.clone());
    encoder.delays = vec![Duration::from_millis(3); 40];
    let mut writer = AsyncFrameWriter::new("cam0", Box::new(encoder), 4).unwrap();

    for seq in 0..40 {
        writer.feed(frame(seq)).unwrap();
        let state = writer.get_state();
        assert!(state.depth <= state.capacity, "{state:?}");
        assert_eq!(state.capacity, 4);
    }
    writer.wait_to_finish().unwrap();
    assert_eq!(writer.get_state().depth, 0);
    writer.stop().unwrap();

    assert_eq!(*written.lock().unwrap(), (0..40).collect::<Vec<_>>());
    let state = writer.get_state();
    assert_eq!(state.written, 40);
    assert_eq!(state.dropped_at_writer, 0);
}

#[test]
fn skipped_frames_are_only_counted() {
    let writer = AsyncFrameWriter::new("cam1", Box::new(RecordingEncoder::new(Arc::default())), 2)
        .unwrap();
    writer.record_skipped(0);
    writer.record_skipped(3);
    writer.record_skipped(2);
    assert_eq!(writer.get_state().skipped_at_source, 5);
}

#[test]
fn encoder_failure_keeps_written_frames_and_refuses_more() {
    let written = Arc::new(Mutex::new(Vec::new()));
    let mut encoder = RecordingEncoder::new(written.clone());
    encoder.fail_at = Some(3);
    let writer = AsyncFrameWriter::new("cam2", Box::new(encoder), 8).unwrap();

    for seq in 0..6 {
        // feeds after the failure is observed are refused
        if writer.feed(frame(seq)).is_err() {
            break;
        }
    }
    let err = writer.wait_to_finish().unwrap_err();
    assert!(matches!(err, TrigcamError::Encoder { .. }));
    assert_eq!(err.to_string(), "Encoder error for memory: disk full");
    assert!(writer.is_failed());
    assert!(matches!(
        writer.feed(frame(99)),
        Err(TrigcamError::Encoder { .. })
    ));

    assert_eq!(*written.lock().unwrap(), vec![0, 1, 2]);
    let state = writer.get_state();
    assert_eq!(state.written, 3);
    assert!(state.dropped_at_writer >= 1);
}

#[test]
fn feed_after_stop_is_refused() {
    let closed = Arc::new(AtomicUsize::new(0));
    let mut encoder = RecordingEncoder::new(Arc::default());
    encoder.closed = closed.clone();
    let mut writer = AsyncFrameWriter::new("cam3", Box::new(encoder), 2).unwrap();
    writer.feed(frame(0)).unwrap();
    writer.wait_to_finish().unwrap();
    writer.stop().unwrap();
    writer.stop().unwrap();

    assert_eq!(closed.load(Ordering::SeqCst), 1);
    assert!(matches!(
        writer.feed(frame(1)),
        Err(TrigcamError::WriterClosed { .. })
    ));
}

#[test]
fn drop_finalizes_encoder() {
    let closed = Arc::new(AtomicUsize::new(0));
    let written = Arc::new(Mutex::new(Vec::new()));
    let mut encoder = RecordingEncoder::new(written.clone());
    encoder.closed = closed.clone();
    {
        let writer = AsyncFrameWriter::new("cam4", Box::new(encoder), 2).unwrap();
        for seq in 0..5 {
            writer.feed(frame(seq)).unwrap();
        }
    }
    assert_eq!(closed.load(Ordering::SeqCst), 1);
    assert_eq!(written.lock().unwrap().len(), 5);
}

#[test]
fn y4m_output_matches_feed_order() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("run000_cam0.y4m");
    let encoder = Y4mEncoder::create(&path, 10.0).unwrap();
    let mut writer = AsyncFrameWriter::new("cam0", Box::new(encoder), 3).unwrap();

    for seq in 0..20u64 {
        let mut f = frame(seq);
        f.data_mut()[0] = seq as u8;
        writer.feed(f).unwrap();
    }
    writer.wait_to_finish().unwrap();
    writer.stop().unwrap();

    let stream = read_stream(&path).unwrap();
    let order: Vec<u8> = stream.frames.iter().map(|f| f[0]).collect();
    assert_eq!(order, (0..20).collect::<Vec<u8>>());
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn output_order_equals_feed_order(
        sequences in prop::collection::vec(any::<u64>(), 1..40),
        delays_us in prop::collection::vec(0u64..2_000, 40),
        capacity in 1usize..6,
    ) {
        let written = Arc::new(Mutex::new(Vec::new()));
        let mut encoder = RecordingEncoder::new(written.clone());
        encoder.delays = delays_us.into_iter().map(Duration::from_micros).collect();
        let mut writer = AsyncFrameWriter::new("prop", Box::new(encoder), capacity).unwrap();

        for &seq in &sequences {
            writer.feed(frame(seq)).unwrap();
            prop_assert!(writer.get_state().depth <= capacity);
        }
        writer.wait_to_finish().unwrap();
        writer.stop().unwrap();

        prop_assert_eq!(&*written.lock().unwrap(), &sequences);
    }
}
