//! Per-client rate accounting: bytes and messages over a sliding minute.

use std::time::{Duration, Instant};

use crate::config::Limits;

// -----------------------------------------------------------------------------
// ----- RateWindow ------------------------------------------------------------

const WINDOW_SECS: usize = 60;

/// Sixty one-second buckets. Old buckets decay only as time moves on.
#[derive(Debug, Clone)]
pub struct RateWindow {
    origin: Instant,
    buckets: [u64; WINDOW_SECS],
    head: u64,
    total: u64,
}

impl RateWindow {
    pub fn new(origin: Instant) -> Self {
        Self {
            origin,
            buckets: [0; WINDOW_SECS],
            head: 0,
            total: 0,
        }
    }

    pub fn add(&mut self, now: Instant, amount: u64) {
        let second = self.advance(now);
        self.buckets[second % WINDOW_SECS] += amount;
        self.total += amount;
    }

    /// Sum over the last minute as of `now`.
    pub fn total(&mut self, now: Instant) -> u64 {
        self.advance(now);
        self.total
    }

    fn advance(&mut self, now: Instant) -> usize {
        let second = now.saturating_duration_since(self.origin).as_secs();
        if second > self.head {
            let steps = (second - self.head).min(WINDOW_SECS as u64);
            for step in 1..=steps {
                let slot = ((self.head + step) % WINDOW_SECS as u64) as usize;
                self.total -= self.buckets[slot];
                self.buckets[slot] = 0;
            }
            self.head = second;
        }
        self.head as usize
    }
}

// -----------------------------------------------------------------------------
// ----- Throttle --------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Throttle {
    bytes: RateWindow,
    pdus: RateWindow,
}

impl Throttle {
    pub fn new(now: Instant) -> Self {
        Self {
            bytes: RateWindow::new(now),
            pdus: RateWindow::new(now),
        }
    }

    /// Accounts one inbound message and returns how long to hold it, if the
    /// client is over either ceiling.
    pub fn record(&mut self, now: Instant, len: usize, limits: &Limits) -> Option<Duration> {
        self.bytes.add(now, len as u64);
        self.pdus.add(now, 1);

        let mut delay = 0;

        let bytes = self.bytes.total(now);
        if limits.bandwidth > 0 && bytes > limits.bandwidth {
            delay = bytes / limits.bandwidth;
        }

        let pdus = self.pdus.total(now);
        if limits.pdu > 0 && pdus > limits.pdu {
            delay = delay.max((60 / limits.pdu).max(1));
        }

        (delay > 0).then(|| Duration::from_secs(delay))
    }
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn limits(bandwidth: u64, pdu: u64) -> Limits {
        Limits {
            bandwidth,
            pdu,
            retrieve: 0,
        }
    }

    #[test]
    fn window_forgets_after_a_minute() {
        let t0 = Instant::now();
        let mut w = RateWindow::new(t0);

        w.add(t0, 100);
        w.add(t0 + Duration::from_secs(30), 50);
        assert_eq!(w.total(t0 + Duration::from_secs(59)), 150);
        assert_eq!(w.total(t0 + Duration::from_secs(60)), 50);
        assert_eq!(w.total(t0 + Duration::from_secs(300)), 0);
    }

    #[test]
    fn unlimited_never_delays() {
        let t0 = Instant::now();
        let mut t = Throttle::new(t0);
        for _ in 0..1000 {
            assert_eq!(t.record(t0, 10_000, &Limits::default()), None);
        }
    }

    #[test]
    fn byte_overage_scales_with_volume() {
        let t0 = Instant::now();
        let mut t = Throttle::new(t0);
        let l = limits(1000, 0);

        assert_eq!(t.record(t0, 600, &l), None);
        assert_eq!(t.record(t0, 600, &l), Some(Duration::from_secs(1)));
        assert_eq!(t.record(t0, 1000, &l), Some(Duration::from_secs(2)));
    }

    #[test]
    fn message_overage_waits_a_share_of_the_minute() {
        let t0 = Instant::now();
        let mut t = Throttle::new(t0);
        let l = limits(0, 2);

        assert_eq!(t.record(t0, 1, &l), None);
        assert_eq!(t.record(t0, 1, &l), None);
        assert_eq!(t.record(t0, 1, &l), Some(Duration::from_secs(30)));

        let mut fast = Throttle::new(t0);
        let l = limits(0, 120);
        for _ in 0..120 {
            fast.record(t0, 1, &l);
        }
        assert_eq!(fast.record(t0, 1, &l), Some(Duration::from_secs(1)));
    }

    #[test]
    fn larger_delay_wins() {
        let t0 = Instant::now();
        let mut t = Throttle::new(t0);
        let l = limits(100, 1);

        t.record(t0, 10, &l);
        assert_eq!(t.record(t0, 1000, &l), Some(Duration::from_secs(60)));
    }
}

// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
