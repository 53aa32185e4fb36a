//! Bounded, lossless per-camera writer.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender};
use serde::{Deserialize, Serialize};
use trigcam_camera::Frame;
use trigcam_common::error::{TrigcamError, TrigcamResult};

use crate::encoder::VideoEncoder;

const WORKER_CHECK_INTERVAL: Duration = Duration::from_millis(100);

/// Snapshot of one writer's queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueState {
    /// Frames waiting for the encoder.
    pub depth: usize,
    pub capacity: usize,
    /// Frames the camera dropped before they reached the writer.
    pub skipped_at_source: u64,
    /// Accepted frames that were never encoded. Non-zero only after an
    /// encoder failure.
    pub dropped_at_writer: u64,
    pub written: u64,
}

/// Bookkeeping shared between the feeding thread and the drain thread.
#[derive(Default)]
struct Shared {
    pending: Mutex<usize>,
    drained: Condvar,
    failure: Mutex<Option<String>>,
    failed: AtomicBool,
    written: AtomicU64,
    dropped: AtomicU64,
    skipped: AtomicU64,
}

impl Shared {
    fn fail(&self, message: String) {
        let mut failure = self.failure.lock().unwrap_or_else(PoisonError::into_inner);
        failure.get_or_insert(message);
        self.failed.store(true, Ordering::Release);
    }

    fn failure(&self) -> Option<String> {
        self.failure
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn add_pending(&self) {
        *self.pending.lock().unwrap_or_else(PoisonError::into_inner) += 1;
    }

    fn finish_one(&self) {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        *pending = pending.saturating_sub(1);
        if *pending == 0 {
            self.drained.notify_all();
        }
    }
}

/// One camera's output pipeline.
///
/// `feed` blocks while the queue is full. Frames reach the encoder strictly
/// in feed order. After an encoder error the writer refuses new frames but
/// keeps everything already written.
pub struct AsyncFrameWriter {
    name: String,
    path: PathBuf,
    capacity: usize,
    sender: Option<Sender<Frame>>,
    worker: Option<JoinHandle<Box<dyn VideoEncoder>>>,
    shared: Arc<Shared>,
}

impl AsyncFrameWriter {
    /// Spawn the drain thread for `encoder`.
    pub fn new(
        name: impl Into<String>,
        encoder: Box<dyn VideoEncoder>,
        capacity: usize,
    ) -> TrigcamResult<Self> {
        let name = name.into();
        if capacity == 0 {
            return Err(TrigcamError::configuration(format!(
                "writer {name} needs a queue capacity of at least 1"
            )));
        }

        let path = encoder.path().to_path_buf();
        let (sender, receiver) = crossbeam_channel::bounded(capacity);
        let shared = Arc::new(Shared::default());
        let worker_shared = shared.clone();
        let worker_name = name.clone();
        let worker = std::thread::Builder::new()
            .name(format!("writer-{name}"))
            .spawn(move || drain(&worker_name, receiver, encoder, &worker_shared))?;

        tracing::debug!(camera = %name, path = %path.display(), capacity, "Writer started");
        Ok(Self {
            name,
            path,
            capacity,
            sender: Some(sender),
            worker: Some(worker),
            shared,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Hand a frame to the writer, blocking while the queue is full.
    pub fn feed(&self, frame: Frame) -> TrigcamResult<()> {
        let Some(sender) = self.sender.as_ref() else {
            return Err(TrigcamError::WriterClosed {
                name: self.name.clone(),
            });
        };
        if self.shared.failed.load(Ordering::Acquire) {
            return Err(self.failure_error());
        }

        self.shared.add_pending();
        if sender.send(frame).is_err() {
            self.shared.finish_one();
            return Err(TrigcamError::WriterClosed {
                name: self.name.clone(),
            });
        }
        Ok(())
    }

    /// Add frames the camera reported as skipped.
    pub fn record_skipped(&self, skipped: u64) {
        if skipped > 0 {
            self.shared.skipped.fetch_add(skipped, Ordering::Relaxed);
        }
    }

    /// Non-blocking telemetry read.
    pub fn get_state(&self) -> QueueState {
        QueueState {
            depth: self.sender.as_ref().map_or(0, Sender::len),
            capacity: self.capacity,
            skipped_at_source: self.shared.skipped.load(Ordering::Relaxed),
            dropped_at_writer: self.shared.dropped.load(Ordering::Relaxed),
            written: self.shared.written.load(Ordering::Acquire),
        }
    }

    pub fn frames_written(&self) -> u64 {
        self.shared.written.load(Ordering::Acquire)
    }

    pub fn is_failed(&self) -> bool {
        self.shared.failed.load(Ordering::Acquire)
    }

    /// Block until every accepted frame has been handed to the encoder and
    /// flushed. Returns the encoder error if the writer failed.
    pub fn wait_to_finish(&self) -> TrigcamResult<()> {
        let mut pending = self
            .shared
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        while *pending > 0 {
            let (guard, _) = self
                .shared
                .drained
                .wait_timeout(pending, WORKER_CHECK_INTERVAL)
                .unwrap_or_else(PoisonError::into_inner);
            pending = guard;
            if *pending > 0 && self.worker.as_ref().map_or(true, JoinHandle::is_finished) {
                return Err(TrigcamError::WriterClosed {
                    name: self.name.clone(),
                });
            }
        }
        drop(pending);

        if self.is_failed() {
            return Err(self.failure_error());
        }
        tracing::debug!(camera = %self.name, frames = self.frames_written(), "Writer drained");
        Ok(())
    }

    /// Close the queue, join the drain thread and finalize the container.
    ///
    /// Call after [`wait_to_finish`](Self::wait_to_finish); frames still queued
    /// are drained first. Calling twice is a no-op.
    pub fn stop(&mut self) -> TrigcamResult<()> {
        self.sender.take();
        let Some(worker) = self.worker.take() else {
            return Ok(());
        };
        let mut encoder = worker.join().map_err(|_| {
            TrigcamError::encoder(&self.path, "writer thread panicked")
        })?;
        let closed = encoder.close();

        let state = self.get_state();
        tracing::info!(
            camera = %self.name,
            path = %self.path.display(),
            written = state.written,
            skipped = state.skipped_at_source,
            dropped = state.dropped_at_writer,
            "Writer stopped"
        );

        if self.is_failed() {
            return Err(self.failure_error());
        }
        closed
    }

    fn failure_error(&self) -> TrigcamError {
        let message = self
            .shared
            .failure()
            .unwrap_or_else(|| "encoder failed".to_string());
        TrigcamError::encoder(&self.path, message)
    }
}

impl Drop for AsyncFrameWriter {
    fn drop(&mut self) {
        if self.worker.is_some() {
            if let Err(e) = self.stop() {
                tracing::warn!(camera = %self.name, error = %e, "Writer stop failed during drop");
            }
        }
    }
}

/// The failure is re-raised as an encoder error for this writer's path, so
/// keep only the inner message of encoder errors.
fn failure_message(error: TrigcamError) -> String {
    match error {
        TrigcamError::Encoder { message, .. } => message,
        other => other.to_string(),
    }
}

/// Drain loop. Runs until the sender side is dropped and the queue is empty.
fn drain(
    name: &str,
    receiver: Receiver<Frame>,
    mut encoder: Box<dyn VideoEncoder>,
    shared: &Shared,
) -> Box<dyn VideoEncoder> {
    for frame in receiver.iter() {
        if shared.failed.load(Ordering::Acquire) {
            shared.dropped.fetch_add(1, Ordering::Relaxed);
        } else {
            match encoder.write(&frame) {
                Ok(()) => {
                    shared.written.fetch_add(1, Ordering::Release);
                    if receiver.is_empty() {
                        if let Err(e) = encoder.flush() {
                            tracing::error!(camera = %name, error = %e, "Flush failed");
                            shared.fail(failure_message(e));
                        }
                    }
                }
                Err(e) => {
                    tracing::error!(
                        camera = %name,
                        sequence = frame.sequence,
                        error = %e,
                        "Frame write failed"
                    );
                    shared.dropped.fetch_add(1, Ordering::Relaxed);
                    shared.fail(failure_message(e));
                }
            }
        }
        drop(frame);
        shared.finish_one();
    }
    encoder
}
