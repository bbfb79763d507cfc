//! Rate limiting for Bot API calls
//!
//! Telegram throttles bots that post to a channel too quickly. Uploads go
//! through a limiter that caps concurrency and spaces out requests, and
//! failed calls are retried with exponential backoff.

use crate::error::{Error, Result};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::{Semaphore, SemaphorePermit};
use tokio::time::sleep;

/// Longest spacing a flood-control penalty can push the limiter to
const MAX_SPACING_US: u64 = 30_000_000;

/// Concurrency cap plus minimum spacing between operations
pub struct RateLimiter {
    concurrency: Semaphore,
    /// Current minimum delay between operations (microseconds)
    spacing_us: AtomicU64,
    /// Spacing the limiter returns to after a penalty
    base_spacing_us: u64,
    last_op: parking_lot::Mutex<Instant>,
}

impl RateLimiter {
    /// Create a new rate limiter
    ///
    /// # Arguments
    /// * `max_concurrent` - Maximum concurrent operations
    /// * `ops_per_second` - Target operations per second (0 = no spacing)
    pub fn new(max_concurrent: usize, ops_per_second: f64) -> Self {
        let spacing_us = spacing_for(ops_per_second);

        RateLimiter {
            concurrency: Semaphore::new(max_concurrent.max(1)),
            spacing_us: AtomicU64::new(spacing_us),
            base_spacing_us: spacing_us,
            last_op: parking_lot::Mutex::new(Instant::now() - Duration::from_micros(spacing_us)),
        }
    }

    /// Wait for a slot, holding it until the guard drops
    pub async fn acquire(&self) -> Result<RateLimitGuard<'_>> {
        let permit = self
            .concurrency
            .acquire()
            .await
            .map_err(|e| Error::Internal(format!("Rate limiter closed: {}", e)))?;

        let spacing = Duration::from_micros(self.spacing_us.load(Ordering::Relaxed));
        if !spacing.is_zero() {
            let wait = {
                let last_op = self.last_op.lock();
                spacing.saturating_sub(last_op.elapsed())
            };

            if !wait.is_zero() {
                sleep(wait).await;
            }

            *self.last_op.lock() = Instant::now();
        }

        Ok(RateLimitGuard { _permit: permit })
    }

    /// Stretch the spacing after Telegram asked us to slow down
    pub fn penalize(&self, retry_after: Duration) {
        let requested = retry_after.as_micros().min(MAX_SPACING_US as u128) as u64;
        let current = self.spacing_us.load(Ordering::Relaxed);
        self.spacing_us
            .store(current.max(requested).min(MAX_SPACING_US), Ordering::Relaxed);
    }

    /// Return to the configured spacing
    pub fn reset(&self) {
        self.spacing_us.store(self.base_spacing_us, Ordering::Relaxed);
    }

    /// Current spacing between operations
    pub fn spacing(&self) -> Duration {
        Duration::from_micros(self.spacing_us.load(Ordering::Relaxed))
    }
}

fn spacing_for(ops_per_second: f64) -> u64 {
    if ops_per_second > 0.0 {
        (1_000_000.0 / ops_per_second) as u64
    } else {
        0
    }
}

/// Guard that releases rate limit permit on drop
pub struct RateLimitGuard<'a> {
    _permit: SemaphorePermit<'a>,
}

/// Exponential backoff helper
pub struct ExponentialBackoff {
    base_delay: Duration,
    max_delay: Duration,
    max_attempts: u32,
    current_attempt: u32,
}

impl ExponentialBackoff {
    pub fn new(base_delay_ms: u64, max_attempts: u32) -> Self {
        ExponentialBackoff {
            base_delay: Duration::from_millis(base_delay_ms),
            max_delay: Duration::from_secs(60),
            max_attempts,
            current_attempt: 0,
        }
    }

    /// Get the next delay, or None if max attempts reached
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.current_attempt >= self.max_attempts {
            return None;
        }

        let delay = self.base_delay * 2u32.saturating_pow(self.current_attempt);
        self.current_attempt += 1;

        Some(delay.min(self.max_delay))
    }

    /// Consume an attempt but wait as long as the server asked
    pub fn next_delay_at_least(&mut self, floor: Duration) -> Option<Duration> {
        self.next_delay().map(|d| d.max(floor))
    }

    pub fn attempts(&self) -> u32 {
        self.current_attempt
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_rate_limiter_concurrency() {
        let limiter = RateLimiter::new(2, 0.0);

        let _g1 = limiter.acquire().await.unwrap();
        let _g2 = limiter.acquire().await.unwrap();

        let third = tokio::time::timeout(Duration::from_millis(50), limiter.acquire()).await;
        assert!(third.is_err());
    }

    #[tokio::test]
    async fn test_permit_released_on_drop() {
        let limiter = RateLimiter::new(1, 0.0);

        {
            let _guard = limiter.acquire().await.unwrap();
        }

        let again = tokio::time::timeout(Duration::from_millis(50), limiter.acquire()).await;
        assert!(again.is_ok());
    }

    #[test]
    fn test_penalize_and_reset() {
        let limiter = RateLimiter::new(1, 2.0);
        assert_eq!(limiter.spacing(), Duration::from_millis(500));

        limiter.penalize(Duration::from_secs(3));
        assert_eq!(limiter.spacing(), Duration::from_secs(3));

        // A smaller penalty never shortens the spacing
        limiter.penalize(Duration::from_secs(1));
        assert_eq!(limiter.spacing(), Duration::from_secs(3));

        limiter.reset();
        assert_eq!(limiter.spacing(), Duration::from_millis(500));
    }

    #[test]
    fn test_penalty_is_capped() {
        let limiter = RateLimiter::new(1, 0.0);
        limiter.penalize(Duration::from_secs(3600));
        assert_eq!(limiter.spacing(), Duration::from_micros(MAX_SPACING_US));
    }

    #[test]
    fn test_exponential_backoff() {
        let mut backoff = ExponentialBackoff::new(100, 3);

        assert_eq!(backoff.next_delay(), Some(Duration::from_millis(100)));
        assert_eq!(backoff.next_delay(), Some(Duration::from_millis(200)));
        assert_eq!(backoff.next_delay(), Some(Duration::from_millis(400)));
        assert!(backoff.next_delay().is_none());
        assert_eq!(backoff.attempts(), 3);
    }

    #[test]
    fn test_backoff_floor() {
        let mut backoff = ExponentialBackoff::new(100, 2);

        assert_eq!(
            backoff.next_delay_at_least(Duration::from_secs(5)),
            Some(Duration::from_secs(5))
        );
        assert_eq!(
            backoff.next_delay_at_least(Duration::from_millis(10)),
            Some(Duration::from_millis(200))
        );
        assert!(backoff.next_delay_at_least(Duration::ZERO).is_none());
    }
}
