//! Clock and rate utilities.
//!
//! Sessions anchor their telemetry to a monotonic epoch taken when recording
//! starts. This module provides:
//! - The session clock and its wall-clock stamp used for take directories
//! - Rate limiting for preview and telemetry output
//! - A smoothed polling-interval estimate
//! - Fine-grained sleeping towards a deadline

use std::time::{Duration, Instant};

use chrono::{DateTime, Local};

/// A recording clock that provides monotonic timestamps relative to
/// a fixed epoch (the moment the session started).
#[derive(Debug, Clone)]
pub struct RecordingClock {
    /// The instant the session started.
    epoch: Instant,

    /// Wall-clock time at epoch.
    epoch_wall: DateTime<Local>,
}

impl RecordingClock {
    /// Create a new recording clock anchored to now.
    pub fn start() -> Self {
        Self {
            epoch: Instant::now(),
            epoch_wall: Local::now(),
        }
    }

    /// Get seconds elapsed since session start.
    pub fn elapsed_secs(&self) -> f64 {
        self.epoch.elapsed().as_secs_f64()
    }

    /// Time elapsed since session start.
    pub fn elapsed(&self) -> Duration {
        self.epoch.elapsed()
    }

    /// Wall-clock time at session start.
    pub fn epoch_wall(&self) -> DateTime<Local> {
        self.epoch_wall
    }

    /// Minute-resolution stamp used to name take directories.
    pub fn take_stamp(&self) -> String {
        self.epoch_wall.format("%Y-%m-%d_%H-%M").to_string()
    }
}

/// Minimum-interval gate for periodic work.
#[derive(Debug)]
pub struct RateController {
    interval: Duration,
    last_tick: Option<Instant>,
}

impl RateController {
    /// Create a controller that fires at most once per `interval`.
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_tick: None,
        }
    }

    /// Create a controller targeting the given Hz rate.
    pub fn from_hz(target_hz: f64) -> Self {
        Self::new(Duration::from_secs_f64(1.0 / target_hz.max(f64::MIN_POSITIVE)))
    }

    /// Check if enough time has passed for the next tick without consuming it.
    pub fn is_due(&self, now: Instant) -> bool {
        match self.last_tick {
            None => true,
            Some(last) => now.saturating_duration_since(last) >= self.interval,
        }
    }

    /// Returns true and updates internal state if ready.
    /// The first call always returns true.
    pub fn should_tick(&mut self, now: Instant) -> bool {
        if self.is_due(now) {
            self.last_tick = Some(now);
            true
        } else {
            false
        }
    }

    /// Minimum interval between ticks.
    pub fn interval(&self) -> Duration {
        self.interval
    }
}

/// Exponentially smoothed interval between successive polls.
#[derive(Debug, Clone, Copy, Default)]
pub struct PollingRate {
    last_poll: Option<Instant>,
    interval_secs: Option<f64>,
}

impl PollingRate {
    const KEEP: f64 = 0.85;

    /// Register a poll at `now`.
    pub fn record(&mut self, now: Instant) {
        if let Some(last) = self.last_poll {
            let sample = now.saturating_duration_since(last).as_secs_f64();
            self.interval_secs = Some(match self.interval_secs {
                Some(prev) if prev > 0.0 => Self::KEEP * prev + (1.0 - Self::KEEP) * sample,
                _ => sample,
            });
        }
        self.last_poll = Some(now);
    }

    /// Smoothed interval, once two polls have been seen.
    pub fn interval_secs(&self) -> Option<f64> {
        self.interval_secs
    }

    /// Smoothed polling frequency in Hz.
    pub fn hz(&self) -> Option<f64> {
        self.interval_secs
            .filter(|secs| *secs > 0.0)
            .map(|secs| 1.0 / secs)
    }
}

/// Sleep in steps of at most `granularity` until `deadline` passes or
/// `cancelled` returns true. Returns false when cancelled early.
pub fn sleep_until(deadline: Instant, granularity: Duration, cancelled: impl Fn() -> bool) -> bool {
    loop {
        if cancelled() {
            return false;
        }
        let now = Instant::now();
        if now >= deadline {
            return true;
        }
        std::thread::sleep((deadline - now).min(granularity));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clock_elapsed() {
        let clock = RecordingClock::start();
        assert!(clock.elapsed() < Duration::from_secs(1));
        assert_eq!(clock.take_stamp().len(), "2026-01-01_12-30".len());
    }

    #[test]
    fn test_rate_controller() {
        let start = Instant::now();
        let mut ctrl = RateController::from_hz(60.0);
        assert!(ctrl.should_tick(start)); // first tick always fires
        assert!(!ctrl.should_tick(start + Duration::from_millis(1)));
        assert!(ctrl.should_tick(start + Duration::from_millis(17)));
    }

    #[test]
    fn test_polling_rate_smoothing() {
        let start = Instant::now();
        let mut rate = PollingRate::default();
        rate.record(start);
        assert!(rate.hz().is_none());

        rate.record(start + Duration::from_millis(100));
        assert!((rate.interval_secs().unwrap() - 0.1).abs() < 1e-9);

        rate.record(start + Duration::from_millis(300));
        // 0.85 * 0.1 + 0.15 * 0.2
        assert!((rate.interval_secs().unwrap() - 0.115).abs() < 1e-9);
    }

    #[test]
    fn test_sleep_until_honours_cancel() {
        let deadline = Instant::now() + Duration::from_secs(5);
        let started = Instant::now();
        assert!(!sleep_until(deadline, Duration::from_millis(1), || true));
        assert!(started.elapsed() < Duration::from_secs(1));

        let short = Instant::now() + Duration::from_millis(5);
        assert!(sleep_until(short, Duration::from_millis(1), || false));
        assert!(Instant::now() >= short);
    }
}
