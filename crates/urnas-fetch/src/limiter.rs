//! Token bucket shared by every request of one client.

use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::{Instant, sleep};

/// Continuous-refill token bucket.
///
/// Waiters queue on the bucket's lock, so tokens are handed out in
/// arrival order. Over any window the number of acquisitions is bounded
/// by `burst + rate * window_secs`.
#[derive(Debug)]
pub struct RateLimiter {
    rate: f64,
    burst: f64,
    bucket: Mutex<Bucket>,
}

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

impl RateLimiter {
    /// `rate` requests per second. The bucket holds a tenth of a second
    /// of tokens and starts full.
    pub fn new(rate: u32) -> Self {
        let rate = rate.max(1);
        Self::build(rate, (rate / 10).max(1))
    }

    /// Override the bucket capacity.
    pub fn with_burst(self, burst: u32) -> Self {
        Self::build(self.rate as u32, burst.max(1))
    }

    fn build(rate: u32, burst: u32) -> Self {
        Self {
            rate: f64::from(rate),
            burst: f64::from(burst),
            bucket: Mutex::new(Bucket {
                tokens: f64::from(burst),
                last_refill: Instant::now(),
            }),
        }
    }

    pub fn rate(&self) -> u32 {
        self.rate as u32
    }

    pub fn burst(&self) -> u32 {
        self.burst as u32
    }

    /// Wait until one token is available and take it.
    pub async fn acquire(&self) {
        let mut bucket = self.bucket.lock().await;
        self.refill(&mut bucket);
        if bucket.tokens < 1.0 {
            let wait = Duration::from_secs_f64((1.0 - bucket.tokens) / self.rate);
            sleep(wait).await;
            self.refill(&mut bucket);
        }
        bucket.tokens = (bucket.tokens - 1.0).max(0.0);
    }

    fn refill(&self, bucket: &mut Bucket) {
        let now = Instant::now();
        let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * self.rate).min(self.burst);
        bucket.last_refill = now;
    }
}
