//! Timing attack protection utilities
//!
//! Every first factor response is held back until roughly the time a full
//! successful authentication takes, plus random jitter, so that response
//! latency does not reveal which branch the request took.

use rand::rngs::OsRng;
use rand::Rng;
use std::time::{Duration, Instant};

use crate::core::latency::LatencyTracker;

/// Turn the current baseline and the time already spent into a wait
///
/// `target = max(average, floor) + jitter`, result `max(target - elapsed, 1)`.
pub fn actual_delay_ms(average_ms: u64, elapsed_ms: u64, minimum_ms: u64, jitter_ms: u64) -> u64 {
    let target_ms = average_ms.max(minimum_ms).saturating_add(jitter_ms);
    target_ms.saturating_sub(elapsed_ms).max(1)
}

/// Draw a jitter in `[0, maximum_ms)` from the operating system CSPRNG
pub fn random_jitter_ms(maximum_ms: u64) -> u64 {
    if maximum_ms == 0 {
        return 0;
    }
    OsRng.gen_range(0..maximum_ms)
}

/// Static floor and jitter bounds of the compensating delay
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DelayPolicy {
    pub minimum_ms: u64,
    pub maximum_jitter_ms: u64,
}

impl DelayPolicy {
    pub fn new(minimum_ms: u64, maximum_jitter_ms: u64) -> Self {
        Self {
            minimum_ms,
            maximum_jitter_ms,
        }
    }

    /// Compute the delay for a request, drawing a fresh jitter
    pub fn delay_for(&self, average_ms: u64, elapsed: Duration) -> Duration {
        let jitter_ms = random_jitter_ms(self.maximum_jitter_ms);
        let elapsed_ms = elapsed.as_millis() as u64;
        let delay_ms = actual_delay_ms(average_ms, elapsed_ms, self.minimum_ms, jitter_ms);
        log::trace!(
            "exec duration ms: {}, avg execution duration ms: {}, random delay ms: {}, actual delay ms: {}",
            elapsed_ms,
            average_ms,
            jitter_ms,
            delay_ms
        );
        Duration::from_millis(delay_ms)
    }
}

/// Start timestamp and outcome flag of one request
///
/// The gate creates one at the top of a request, marks it successful only
/// once the full pipeline passed, and hands it to `compensate` whatever the
/// exit point was.
#[derive(Debug)]
pub struct AuthTimer {
    start: Instant,
    successful: bool,
}

impl AuthTimer {
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
            successful: false,
        }
    }

    pub fn mark_successful(&mut self) {
        self.successful = true;
    }

    /// Forget a success recorded by a request that did not complete
    pub fn mark_unsuccessful(&mut self) {
        self.successful = false;
    }

    pub fn is_successful(&self) -> bool {
        self.successful
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Feed the tracker, compute the delay and wait it out
    ///
    /// The tracker lock is released inside `observe`, before the sleep.
    /// Returns the delay that was applied.
    pub async fn compensate(self, tracker: &LatencyTracker, policy: &DelayPolicy) -> Duration {
        log::trace!("Hit first factor deferred delay to prevent timing attacks start");
        let sample = self.successful.then(|| self.start.elapsed());
        let average_ms = tracker.observe(sample);
        let delay = policy.delay_for(average_ms, self.start.elapsed());

        log::trace!(
            "attempt successful: {}, sleeping {} ms",
            self.successful,
            delay.as_millis()
        );
        tokio::time::sleep(delay).await;
        log::trace!("Hit first factor deferred delay to prevent timing attacks complete");
        delay
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_floor_applies_over_low_average() {
        assert_eq!(actual_delay_ms(0, 10, 250, 0), 240);
    }

    #[test]
    fn test_average_above_floor_wins() {
        assert_eq!(actual_delay_ms(400, 100, 250, 20), 320);
    }

    #[test]
    fn test_delay_never_below_one_ms() {
        assert_eq!(actual_delay_ms(100, 10_000, 250, 84), 1);
        assert_eq!(actual_delay_ms(0, u64::MAX, 0, 0), 1);
        assert_eq!(actual_delay_ms(250, 250, 250, 0), 1);
        assert_eq!(actual_delay_ms(u64::MAX, 0, 0, u64::MAX), u64::MAX);
    }

    #[test]
    fn test_jitter_stays_in_bounds() {
        assert_eq!(random_jitter_ms(0), 0);
        assert_eq!(random_jitter_ms(1), 0);
        for _ in 0..1000 {
            assert!(random_jitter_ms(85) < 85);
        }
    }

    #[test]
    fn test_policy_delay_bounds() {
        let policy = DelayPolicy::new(250, 85);
        for _ in 0..100 {
            let delay = policy.delay_for(100, Duration::from_millis(50));
            assert!(delay >= Duration::from_millis(200));
            assert!(delay < Duration::from_millis(285));
        }
    }

    #[tokio::test]
    async fn test_failed_attempt_waits_without_recording() {
        let tracker = LatencyTracker::new(3, Duration::from_millis(20));
        let policy = DelayPolicy::new(10, 0);

        let timer = AuthTimer::start();
        let started = Instant::now();
        let delay = timer.compensate(&tracker, &policy).await;

        assert!(delay >= Duration::from_millis(1));
        assert!(started.elapsed() >= delay);
        assert_eq!(tracker.recorded(), 0);
        assert_eq!(tracker.current_average_ms(), 20);
    }

    #[tokio::test]
    async fn test_successful_attempt_records_elapsed() {
        let tracker = LatencyTracker::new(1, Duration::from_millis(500));
        let policy = DelayPolicy::new(1, 0);

        let mut timer = AuthTimer::start();
        tokio::time::sleep(Duration::from_millis(15)).await;
        timer.mark_successful();
        assert!(timer.is_successful());
        timer.compensate(&tracker, &policy).await;

        assert_eq!(tracker.recorded(), 1);
        let average = tracker.current_average_ms();
        assert!(average >= 15 && average < 500);
    }

    #[tokio::test]
    async fn test_withdrawn_success_is_not_recorded() {
        let tracker = LatencyTracker::new(2, Duration::from_millis(20));
        let policy = DelayPolicy::new(1, 0);

        let mut timer = AuthTimer::start();
        timer.mark_successful();
        timer.mark_unsuccessful();
        assert!(!timer.is_successful());
        timer.compensate(&tracker, &policy).await;

        assert_eq!(tracker.recorded(), 0);
        assert_eq!(tracker.current_average_ms(), 20);
    }
}
