//! Token bucket rate limiter for outbound download requests.

use tokio::sync::Mutex;
use tokio::time::{Duration, Instant};

/// Token bucket for a single request stream.
///
/// Tokens are added at a constant rate and consumed when requests are made.
/// If no tokens are available, the caller must wait.
struct TokenBucket {
    /// Max tokens (= requests per minute).
    capacity: f32,
    /// Current available tokens.
    tokens: f32,
    /// Tokens added per second.
    refill_rate: f32,
    /// Last refill time.
    last_refill: Instant,
}

impl TokenBucket {
    /// The bucket starts full, allowing immediate requests up to the capacity.
    fn new(requests_per_minute: u32) -> Self {
        let capacity = requests_per_minute as f32;
        Self {
            capacity,
            tokens: capacity,
            refill_rate: capacity / 60.0,
            last_refill: Instant::now(),
        }
    }

    /// Try to acquire a token.
    ///
    /// Returns `Ok(())` if a token was acquired successfully.
    /// Returns `Err(wait_duration)` if rate limited, with the duration to wait.
    fn try_acquire(&mut self) -> Result<(), Duration> {
        self.refill();

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            Ok(())
        } else {
            let tokens_needed = 1.0 - self.tokens;
            let wait_secs = tokens_needed / self.refill_rate;
            Err(Duration::from_secs_f32(wait_secs))
        }
    }

    /// Refill tokens based on elapsed time.
    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f32();
        self.tokens = (self.tokens + elapsed * self.refill_rate).min(self.capacity);
        self.last_refill = now;
    }
}

/// Rate limiter that delays callers instead of rejecting them.
///
/// `acquire` suspends until issuing one more request stays within the
/// configured requests-per-minute ceiling. Token accounting is serialized
/// behind a mutex, so the limiter is safe to share across tasks if claim
/// processing is ever parallelized.
pub struct RateLimiter {
    bucket: Mutex<TokenBucket>,
}

impl RateLimiter {
    pub fn new(requests_per_minute: u32) -> Self {
        Self {
            bucket: Mutex::new(TokenBucket::new(requests_per_minute)),
        }
    }

    /// Wait until a request token is available, then consume it.
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut bucket = self.bucket.lock().await;
                match bucket.try_acquire() {
                    Ok(()) => return,
                    Err(wait) => wait,
                }
            };
            // Lock is released while sleeping.
            tokio::time::sleep(wait).await;
        }
    }

    /// Non-blocking acquire, exposed for tests and diagnostics.
    pub async fn try_acquire(&self) -> Result<(), Duration> {
        self.bucket.lock().await.try_acquire()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_bucket_starts_full() {
        let mut bucket = TokenBucket::new(10);

        for _ in 0..10 {
            assert!(bucket.try_acquire().is_ok());
        }

        // 11th should fail
        assert!(bucket.try_acquire().is_err());
    }

    #[test]
    fn test_token_bucket_returns_wait_time() {
        let mut bucket = TokenBucket::new(10);

        for _ in 0..10 {
            bucket.try_acquire().unwrap();
        }

        // At 10 rpm, 1 token takes 6 seconds to refill
        let wait = bucket.try_acquire().unwrap_err();
        assert!(wait.as_secs() <= 6);
        assert!(wait.as_millis() > 0);
    }

    #[tokio::test]
    async fn test_token_bucket_refill() {
        let mut bucket = TokenBucket::new(60); // 1 token per second

        for _ in 0..60 {
            bucket.try_acquire().unwrap();
        }
        assert!(bucket.tokens < 1.0);

        tokio::time::sleep(Duration::from_millis(100)).await;
        bucket.refill();

        // Should have refilled ~0.1 tokens
        assert!(bucket.tokens > 0.05);
        assert!(bucket.tokens < 0.2);
    }

    #[tokio::test]
    async fn test_limiter_try_acquire() {
        let limiter = RateLimiter::new(2);

        assert!(limiter.try_acquire().await.is_ok());
        assert!(limiter.try_acquire().await.is_ok());
        assert!(limiter.try_acquire().await.is_err());
    }

    #[tokio::test]
    async fn test_limiter_acquire_waits_then_succeeds() {
        // 600 rpm = 10 tokens per second, so a drained bucket recovers fast
        // enough for a test.
        let limiter = RateLimiter::new(600);
        for _ in 0..600 {
            limiter.try_acquire().await.unwrap();
        }

        let start = Instant::now();
        limiter.acquire().await;
        let elapsed = start.elapsed();

        // One token takes 100ms to refill at this rate.
        assert!(elapsed >= Duration::from_millis(50));
        assert!(elapsed < Duration::from_secs(2));
    }
}
