//! Bounded retry with exponential backoff and jitter.
//!
//! Callers are synchronous, so the backoff blocks the calling thread.

use rand::{thread_rng, Rng};
use std::time::Duration;
use tracing::debug;

use crate::metrics::PROMOTION_METRICS;

#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Retries after the first attempt. Zero means a single attempt.
    pub max_retries: usize,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub jitter: f64, // 0.0 - 1.0
}
impl Default for RetryConfig { fn default() -> Self { Self { max_retries: 3, base_delay: Duration::from_millis(10), max_delay: Duration::from_millis(250), jitter: 0.25 } } }

impl RetryConfig {
    /// Backoff before retry number `attempt + 1`, before jitter is applied.
    pub fn backoff(&self, attempt: usize) -> Duration {
        let exp = self.base_delay.mul_f64(2f64.powi(attempt.min(30) as i32));
        std::cmp::min(exp, self.max_delay)
    }

    fn jittered(&self, attempt: usize) -> Duration {
        let delay = self.backoff(attempt);
        if self.jitter <= 0.0 { return delay; }
        let jitter_ms = (delay.as_millis() as f64 * self.jitter) as i64;
        let offset: i64 = thread_rng().gen_range(-jitter_ms..=jitter_ms);
        Duration::from_millis((delay.as_millis() as i64 + offset).max(0) as u64)
    }
}

/// Run `op` until it succeeds, fails with an error `retryable` rejects, or retries run out.
///
/// `op` receives the zero-based attempt number. The last error is returned unchanged.
pub fn retry_with_backoff<T, E, F, P>(cfg: &RetryConfig, mut retryable: P, mut op: F) -> Result<T, E>
where
    F: FnMut(usize) -> Result<T, E>,
    P: FnMut(&E) -> bool,
{
    let mut attempt = 0;
    loop {
        match op(attempt) {
            Ok(v) => return Ok(v),
            Err(e) if attempt >= cfg.max_retries || !retryable(&e) => return Err(e),
            Err(_) => {
                let delay = cfg.jittered(attempt);
                PROMOTION_METRICS.retries_total.add(1, &[]);
                debug!(attempt, delay_ms = delay.as_millis() as u64, "retrying after retryable failure");
                if !delay.is_zero() { std::thread::sleep(delay); }
            }
        }
        attempt += 1;
    }
}
