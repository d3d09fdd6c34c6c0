//! Reconnect pacing for the relay link.
//!
//! One schedule lives for the whole life of a bridge. Every failed
//! connection widens the wait window (doubling from the floor up to the
//! ceiling) and counts toward the give-up cap; an authenticated
//! connection puts the schedule back at the start. The actual wait is
//! drawn from the upper half of the window so a fleet of workstations
//! losing the same relay does not reconnect in lockstep.

use std::time::Duration;

/// Tracks consecutive connection failures and paces retries.
pub(crate) struct ReconnectSchedule {
    floor: Duration,
    ceiling: Duration,
    max_failures: u32,
    failures: u32,
}

impl ReconnectSchedule {
    pub(crate) fn new(floor: Duration, ceiling: Duration, max_failures: u32) -> Self {
        Self {
            floor,
            ceiling,
            max_failures,
            failures: 0,
        }
    }

    /// Record a failed connection.
    ///
    /// Returns how long to wait before the next attempt, or `None` once
    /// the failure cap is reached and the bridge should give up.
    pub(crate) fn next_failure(&mut self) -> Option<Duration> {
        self.failures = self.failures.saturating_add(1);
        if self.failures >= self.max_failures {
            return None;
        }

        let doublings = self.failures.saturating_sub(1).min(10);
        let window = self
            .floor
            .saturating_mul(2u32.saturating_pow(doublings))
            .min(self.ceiling);
        let window_ms = u64::try_from(window.as_millis()).unwrap_or(u64::MAX);
        if window_ms == 0 {
            return Some(Duration::ZERO);
        }
        let wait = fastrand::u64(window_ms.saturating_div(2)..=window_ms);
        Some(Duration::from_millis(wait))
    }

    /// A connection made it through auth; start over.
    pub(crate) fn connected(&mut self) {
        self.failures = 0;
    }

    /// Consecutive failures so far.
    pub(crate) fn failures(&self) -> u32 {
        self.failures
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn waits_fall_in_the_doubling_window() {
        let mut schedule =
            ReconnectSchedule::new(Duration::from_millis(100), Duration::from_secs(60), 32);

        let first = schedule.next_failure().unwrap();
        assert!(first >= Duration::from_millis(50));
        assert!(first <= Duration::from_millis(100));

        let second = schedule.next_failure().unwrap();
        assert!(second >= Duration::from_millis(100));
        assert!(second <= Duration::from_millis(200));
    }

    #[test]
    fn ceiling_bounds_late_attempts() {
        let mut schedule =
            ReconnectSchedule::new(Duration::from_millis(100), Duration::from_millis(300), 32);

        let mut last = Duration::ZERO;
        for _ in 0..8_u8 {
            last = schedule.next_failure().unwrap();
        }
        assert!(last >= Duration::from_millis(150));
        assert!(last <= Duration::from_millis(300));
    }

    #[test]
    fn gives_up_at_the_failure_cap() {
        let mut schedule =
            ReconnectSchedule::new(Duration::from_millis(1), Duration::from_millis(1), 3);

        assert!(schedule.next_failure().is_some());
        assert!(schedule.next_failure().is_some());
        assert!(schedule.next_failure().is_none());
        assert_eq!(schedule.failures(), 3);
    }

    #[test]
    fn successful_connection_restarts_the_schedule() {
        let mut schedule =
            ReconnectSchedule::new(Duration::from_millis(100), Duration::from_secs(60), 32);
        for _ in 0..5_u8 {
            let _ = schedule.next_failure();
        }
        assert_eq!(schedule.failures(), 5);

        schedule.connected();
        assert_eq!(schedule.failures(), 0);

        // Back in the first window.
        let wait = schedule.next_failure().unwrap();
        assert!(wait <= Duration::from_millis(100));
    }

    #[test]
    fn zero_floor_never_panics() {
        let mut schedule = ReconnectSchedule::new(Duration::ZERO, Duration::ZERO, 8);
        for _ in 0..5_u8 {
            assert_eq!(schedule.next_failure(), Some(Duration::ZERO));
        }
    }
}
