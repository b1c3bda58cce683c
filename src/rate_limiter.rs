//! Dispatch rate limiting.
//!
//! A [`DispatchRateLimiter`] is a permit bucket the dispatcher charges after
//! handing messages to consumer transports. Acquisition is best-effort and
//! non-blocking: the bucket may be driven negative ("borrowed"), in which
//! case subsequent cycles find no quota until the next refill. The
//! dispatcher never sleeps on the limiter; starved reads resume when permits
//! or acknowledgements arrive.
//!
//! Limiters apply only when non-backlog throttling is enabled for the
//! subscription or the cursor is inactive; the dispatcher makes that call.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::config::DispatchRate;

/// Mutable bucket state, refilled lazily on access.
#[derive(Debug)]
struct Bucket {
    msg_permits: i64,
    byte_permits: i64,
    last_refill: Instant,
}

/// A best-effort permit bucket for dispatch throttling.
///
/// Thread-safe; permits are charged under a short internal lock with no
/// await points.
#[derive(Debug)]
pub struct DispatchRateLimiter {
    rate: DispatchRate,
    bucket: Mutex<Bucket>,
}

impl DispatchRateLimiter {
    /// Create a limiter for the given rate.
    pub fn new(rate: DispatchRate) -> Self {
        Self {
            rate,
            bucket: Mutex::new(Bucket {
                msg_permits: rate.msgs_per_period as i64,
                byte_permits: rate.bytes_per_period as i64,
                last_refill: Instant::now(),
            }),
        }
    }

    /// The configured rate.
    pub fn rate(&self) -> DispatchRate {
        self.rate
    }

    /// Whether this limiter constrains anything.
    pub fn is_enabled(&self) -> bool {
        self.rate.is_limiting()
    }

    /// Charge `msgs` messages and `bytes` bytes against the bucket.
    ///
    /// Returns whether quota remained before the charge. The charge is
    /// applied either way: the bucket borrows below zero so a large batch is
    /// paid back out of future refills rather than rejected.
    pub fn try_dispatch_permit(&self, msgs: u64, bytes: u64) -> bool {
        if !self.is_enabled() {
            return true;
        }

        let mut bucket = self.bucket.lock().expect("rate limiter lock poisoned");
        self.refill(&mut bucket);

        let had_quota = (self.rate.msgs_per_period == 0 || bucket.msg_permits > 0)
            && (self.rate.bytes_per_period == 0 || bucket.byte_permits > 0);

        if self.rate.msgs_per_period > 0 {
            bucket.msg_permits -= msgs as i64;
        }
        if self.rate.bytes_per_period > 0 {
            bucket.byte_permits -= bytes as i64;
        }

        had_quota
    }

    /// Whether quota remains right now, without charging.
    pub fn has_dispatch_quota(&self) -> bool {
        if !self.is_enabled() {
            return true;
        }
        let mut bucket = self.bucket.lock().expect("rate limiter lock poisoned");
        self.refill(&mut bucket);
        (self.rate.msgs_per_period == 0 || bucket.msg_permits > 0)
            && (self.rate.bytes_per_period == 0 || bucket.byte_permits > 0)
    }

    fn refill(&self, bucket: &mut Bucket) {
        let period = Duration::from_secs(self.rate.period_secs.max(1));
        if bucket.last_refill.elapsed() >= period {
            bucket.msg_permits = self.rate.msgs_per_period as i64;
            bucket.byte_permits = self.rate.bytes_per_period as i64;
            bucket.last_refill = Instant::now();
        }
    }
}
