//! The shared trigger wire between simulated devices and cameras.

use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::Instant;

#[derive(Debug, Default)]
struct LineState {
    high: bool,
    rising_edges: u64,
}

/// A digital line that counts rising edges.
///
/// Trigger devices drive it; every simulated camera wired to the same line
/// exposes once per rising edge.
#[derive(Debug, Clone, Default)]
pub struct PulseLine {
    inner: Arc<(Mutex<LineState>, Condvar)>,
}

impl PulseLine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_level(&self, high: bool) {
        let (state, edge) = &*self.inner;
        let mut state = state.lock().unwrap_or_else(PoisonError::into_inner);
        if high && !state.high {
            state.rising_edges += 1;
            edge.notify_all();
        }
        state.high = high;
    }

    /// A complete high-low pulse.
    pub fn pulse(&self) {
        self.set_level(true);
        self.set_level(false);
    }

    pub fn is_high(&self) -> bool {
        self.lock().high
    }

    /// Rising edges seen since the line was created.
    pub fn pulses(&self) -> u64 {
        self.lock().rising_edges
    }

    /// Block until the edge count exceeds `seen` or `deadline` passes.
    /// Returns the current count either way.
    pub fn wait_past(&self, seen: u64, deadline: Instant) -> u64 {
        let (state, edge) = &*self.inner;
        let mut state = state.lock().unwrap_or_else(PoisonError::into_inner);
        while state.rising_edges <= seen {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            state = edge
                .wait_timeout(state, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        state.rising_edges
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, LineState> {
        self.inner.0.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn only_rising_edges_count() {
        let line = PulseLine::new();
        line.set_level(true);
        line.set_level(true);
        line.set_level(false);
        line.pulse();
        assert_eq!(line.pulses(), 2);
        assert!(!line.is_high());
    }

    #[test]
    fn wait_past_wakes_on_pulse() {
        let line = PulseLine::new();
        let driver = line.clone();
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            driver.pulse();
        });
        let count = line.wait_past(0, Instant::now() + Duration::from_secs(2));
        assert_eq!(count, 1);
        handle.join().unwrap();
    }

    #[test]
    fn wait_past_gives_up_at_deadline() {
        let line = PulseLine::new();
        let started = Instant::now();
        assert_eq!(line.wait_past(0, started + Duration::from_millis(30)), 0);
        assert!(started.elapsed() >= Duration::from_millis(30));
    }
}
