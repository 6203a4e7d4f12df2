use ringbuffer::{AllocRingBuffer, RingBuffer};
use std::time::{Duration, Instant};

/// Sliding window limiter over the instants of the last `limit` requests.
pub(crate) struct RateLimiter {
    times: AllocRingBuffer<Instant>,
    limit: usize,
    window: Duration,
}

impl RateLimiter {
    pub(crate) fn new(limit: usize, window: Duration) -> Self {
        Self {
            times: AllocRingBuffer::new(limit),
            limit,
            window,
        }
    }

    /// Takes a slot at `now` if one is free, otherwise returns how long to wait for the next one.
    pub(crate) fn check_and_update(&mut self, now: Instant) -> Option<Duration> {
        if self.times.len() < self.limit {
            self.times.push(now);
            return None;
        }

        let oldest = *self.times.get(0)?;
        let next_slot = oldest + self.window;

        if now >= next_slot {
            self.times.dequeue();
            self.times.push(now);
            None
        } else {
            Some(next_slot - now)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limit_within_window() {
        let mut limiter = RateLimiter::new(2, Duration::from_secs(1));
        let start = Instant::now();

        assert_eq!(limiter.check_and_update(start), None);
        assert_eq!(limiter.check_and_update(start), None);
        assert_eq!(
            limiter.check_and_update(start + Duration::from_millis(400)),
            Some(Duration::from_millis(600))
        );
    }

    #[test]
    fn test_slot_frees_after_window() {
        let mut limiter = RateLimiter::new(1, Duration::from_secs(1));
        let start = Instant::now();

        assert_eq!(limiter.check_and_update(start), None);
        assert_eq!(limiter.check_and_update(start + Duration::from_secs(1)), None);
        assert!(limiter
            .check_and_update(start + Duration::from_millis(1500))
            .is_some());
    }
}
