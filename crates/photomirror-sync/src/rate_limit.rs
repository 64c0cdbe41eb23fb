//! Rate limiting for remote metadata listings
//!
//! Provides proactive pacing of listing calls so a run over a large
//! library does not trip the service's request throttling.
//!
//! [`MetadataBucket`] is a classic token bucket: `count` tokens refill
//! every `interval_ms`, callers take one token per listing call and wait
//! for refill when the bucket runs dry.

use std::sync::Mutex;
use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

use photomirror_core::config::MetadataRate;

/// Internal mutable state, protected by a Mutex.
#[derive(Debug)]
struct BucketInner {
    /// Current number of available tokens (fractional for smooth refill)
    tokens: f64,
    /// Timestamp of the last refill calculation
    last_refill: Instant,
}

/// Token bucket pacing metadata fetches
///
/// The lock is only held for the refill arithmetic; waiting happens
/// outside it, so concurrent callers queue on the sleep rather than on
/// the mutex.
#[derive(Debug)]
pub struct MetadataBucket {
    /// Maximum (and refill) token count per interval
    capacity: u32,
    /// Refill interval
    interval: Duration,
    inner: Mutex<BucketInner>,
}

impl MetadataBucket {
    pub fn new(rate: MetadataRate) -> Self {
        Self {
            capacity: rate.count.max(1),
            interval: Duration::from_millis(rate.interval_ms.max(1)),
            inner: Mutex::new(BucketInner {
                tokens: rate.count.max(1) as f64,
                last_refill: Instant::now(),
            }),
        }
    }

    /// Take one token, waiting for refill when none is available.
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut inner = self.inner.lock().expect("bucket lock");

                // refill proportionally to elapsed time, capped at capacity
                let elapsed = inner.last_refill.elapsed();
                let refill =
                    elapsed.as_secs_f64() / self.interval.as_secs_f64() * self.capacity as f64;
                inner.tokens = (inner.tokens + refill).min(self.capacity as f64);
                inner.last_refill = Instant::now();

                if inner.tokens >= 1.0 {
                    inner.tokens -= 1.0;
                    return;
                }

                // time until one full token is available
                let deficit = 1.0 - inner.tokens;
                Duration::from_secs_f64(
                    deficit / self.capacity as f64 * self.interval.as_secs_f64(),
                )
            };

            debug!(wait_ms = wait.as_millis() as u64, "metadata bucket dry, waiting");
            tokio::time::sleep(wait).await;
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn acquire_within_capacity_is_immediate() {
        let bucket = MetadataBucket::new(MetadataRate {
            count: 5,
            interval_ms: 60_000,
        });

        let start = std::time::Instant::now();
        for _ in 0..5 {
            bucket.acquire().await;
        }
        assert!(start.elapsed() < Duration::from_millis(100));
    }

    #[tokio::test]
    async fn acquire_beyond_capacity_waits_for_refill() {
        let bucket = MetadataBucket::new(MetadataRate {
            count: 2,
            interval_ms: 100,
        });

        bucket.acquire().await;
        bucket.acquire().await;

        // third token needs half an interval to accrue
        let start = std::time::Instant::now();
        bucket.acquire().await;
        assert!(start.elapsed() >= Duration::from_millis(30));
    }

    #[tokio::test]
    async fn refill_never_exceeds_capacity() {
        let bucket = MetadataBucket::new(MetadataRate {
            count: 2,
            interval_ms: 10,
        });

        // plenty of idle time accrues at most `capacity` tokens
        tokio::time::sleep(Duration::from_millis(100)).await;
        let start = std::time::Instant::now();
        bucket.acquire().await;
        bucket.acquire().await;
        bucket.acquire().await;
        assert!(start.elapsed() >= Duration::from_millis(3));
    }
}
