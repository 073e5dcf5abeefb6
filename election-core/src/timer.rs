//! Election alarm and leader heartbeat schedule.
//!
//! Both are plain deadlines on the monotonic clock. The node runtime sleeps
//! until the earliest armed deadline instead of polling a countdown.

use rand::Rng;
use std::time::Duration;
use tokio::time::Instant;

/// Generates a random election timeout within `[min, max]`.
pub fn random_election_timeout(min: Duration, max: Duration) -> Duration {
    if min >= max {
        return min;
    }
    let ms = rand::rng().random_range(min.as_millis() as u64..=max.as_millis() as u64);
    Duration::from_millis(ms)
}

/// Resettable election alarm. Every reset draws a fresh random timeout so
/// peers that reset together do not expire together.
#[derive(Debug, Clone)]
pub struct ElectionTimer {
    min: Duration,
    max: Duration,
    timeout: Duration,
    deadline: Option<Instant>,
}

impl ElectionTimer {
    /// Creates a timer armed from `now`.
    pub fn new(min: Duration, max: Duration, now: Instant) -> Self {
        let mut timer = Self {
            min,
            max,
            timeout: min,
            deadline: None,
        };
        timer.reset(now);
        timer
    }

    /// Re-arms the alarm from `now` with a newly drawn timeout.
    pub fn reset(&mut self, now: Instant) {
        self.timeout = random_election_timeout(self.min, self.max);
        self.deadline = Some(now + self.timeout);
    }

    /// Disarms the alarm until the next reset.
    pub fn cancel(&mut self) {
        self.deadline = None;
    }

    /// The timeout drawn at the last reset.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_expired(&self, now: Instant) -> bool {
        self.deadline.is_some_and(|deadline| now >= deadline)
    }
}

/// Fixed-interval schedule for leader heartbeats.
#[derive(Debug, Clone)]
pub struct HeartbeatTicker {
    interval: Duration,
    next: Option<Instant>,
}

impl HeartbeatTicker {
    /// Creates a stopped ticker.
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            next: None,
        }
    }

    /// Starts ticking; the first tick is due one interval after `now`.
    pub fn start(&mut self, now: Instant) {
        self.next = Some(now + self.interval);
    }

    pub fn stop(&mut self) {
        self.next = None;
    }

    pub fn is_running(&self) -> bool {
        self.next.is_some()
    }

    pub fn is_due(&self, now: Instant) -> bool {
        self.next.is_some_and(|next| now >= next)
    }

    /// Schedules the next tick one interval after `now`.
    pub fn advance(&mut self, now: Instant) {
        if self.next.is_some() {
            self.next = Some(now + self.interval);
        }
    }

    pub fn next_tick(&self) -> Option<Instant> {
        self.next
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_timeout_stays_in_range() {
        let min = Duration::from_millis(150);
        let max = Duration::from_millis(300);
        for _ in 0..200 {
            let t = random_election_timeout(min, max);
            assert!(t >= min && t <= max, "{t:?} outside range");
        }
        assert_eq!(random_election_timeout(min, min), min);
    }

    #[test]
    fn election_timer_expires_and_resets() {
        let now = Instant::now();
        let mut timer =
            ElectionTimer::new(Duration::from_millis(100), Duration::from_millis(100), now);
        assert_eq!(timer.deadline(), Some(now + Duration::from_millis(100)));
        assert!(!timer.is_expired(now + Duration::from_millis(99)));
        assert!(timer.is_expired(now + Duration::from_millis(100)));

        let later = now + Duration::from_millis(150);
        timer.reset(later);
        assert!(!timer.is_expired(later));
        assert_eq!(timer.deadline(), Some(later + Duration::from_millis(100)));
    }

    #[test]
    fn cancelled_timer_never_expires() {
        let now = Instant::now();
        let mut timer =
            ElectionTimer::new(Duration::from_millis(10), Duration::from_millis(20), now);
        timer.cancel();
        assert_eq!(timer.deadline(), None);
        assert!(!timer.is_expired(now + Duration::from_secs(60)));
    }

    #[test]
    fn heartbeat_ticker_schedule() {
        let now = Instant::now();
        let interval = Duration::from_millis(50);
        let mut ticker = HeartbeatTicker::new(interval);
        assert!(!ticker.is_running());
        assert!(!ticker.is_due(now + Duration::from_secs(1)));

        ticker.start(now);
        assert!(!ticker.is_due(now));
        assert!(ticker.is_due(now + interval));

        ticker.advance(now + interval);
        assert_eq!(ticker.next_tick(), Some(now + interval * 2));

        ticker.stop();
        ticker.advance(now);
        assert_eq!(ticker.next_tick(), None);
    }
}
