//! Moving average of successful first factor durations
//!
//! The average is the baseline used by the timing compensation step. Only
//! complete successful authentications feed it: failure paths exit at very
//! different points and would drag the baseline towards fast-fail timings.

use std::sync::Mutex;
use std::time::Duration;

struct Window {
    samples: Vec<Duration>,
    cursor: usize,
    recorded: u64,
}

impl Window {
    fn record(&mut self, sample: Duration) {
        self.samples[self.cursor] = sample;
        self.cursor = (self.cursor + 1) % self.samples.len();
        self.recorded += 1;
    }

    fn average_ms(&self) -> u64 {
        let sum: u128 = self.samples.iter().map(Duration::as_millis).sum();
        (sum / self.samples.len() as u128) as u64
    }
}

/// Fixed-size ring buffer of recent successful processing durations
///
/// One instance is shared by every request handled by a gate. The lock is
/// only ever held for the O(W) record/sum, never across a sleep or an
/// awaited collaborator call.
pub struct LatencyTracker {
    window: Mutex<Window>,
    size: usize,
}

impl LatencyTracker {
    /// Create a tracker of `size` slots, each seeded with `initial`
    ///
    /// # Panics
    ///
    /// Panics if `size` is zero.
    pub fn new(size: usize, initial: Duration) -> Self {
        assert!(size > 0, "latency window must hold at least one sample");
        Self {
            window: Mutex::new(Window {
                samples: vec![initial; size],
                cursor: 0,
                recorded: 0,
            }),
            size,
        }
    }

    /// Overwrite the oldest slot with `sample`
    pub fn record_success(&self, sample: Duration) {
        self.lock().record(sample);
    }

    /// Truncated integer average of the window in milliseconds
    pub fn current_average_ms(&self) -> u64 {
        self.lock().average_ms()
    }

    /// Record `sample` when present, then read the average, in one critical section
    pub fn observe(&self, sample: Option<Duration>) -> u64 {
        let mut window = self.lock();
        if let Some(sample) = sample {
            window.record(sample);
        }
        window.average_ms()
    }

    /// Number of slots in the window
    pub fn window_size(&self) -> usize {
        self.size
    }

    /// Total number of samples recorded since creation
    pub fn recorded(&self) -> u64 {
        self.lock().recorded
    }

    /// Copy of the window, oldest slot first
    pub fn snapshot(&self) -> Vec<Duration> {
        let window = self.lock();
        let (newest, oldest) = window.samples.split_at(window.cursor);
        oldest.iter().chain(newest.iter()).copied().collect()
    }

    // A poisoned lock means a panic happened while summing a handful of
    // integers: the invariant is broken for the whole process.
    fn lock(&self) -> std::sync::MutexGuard<'_, Window> {
        self.window
            .lock()
            .expect("latency tracker mutex poisoned")
    }
}
